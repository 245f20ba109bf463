//! Validation gateway.
//!
//! Pure predicates applied to every inbound command before it may touch
//! shared state, plus the free-text sanitizer. Checks operate on raw
//! [`serde_json::Value`] payloads because that is what crosses the trust
//! boundary -- typed deserialization happens only after a payload passes.
//!
//! Fail-closed: a single bad key or value invalidates the whole payload.

use serde_json::Value;

/// Maximum accepted identifier length.
pub const MAX_ID_LEN: usize = 100;

/// The only camera-setting keys a payload may carry (wire names).
pub const SETTING_KEYS: [&str; 5] = ["exposure", "gain", "whiteBalance", "focus", "zoom"];

/// Inclusive bounds for every camera-setting value.
pub const SETTING_MIN: f64 = 0.0;
pub const SETTING_MAX: f64 = 1000.0;

/// Recognized video-quality values for a recording config.
pub const QUALITY_VALUES: [&str; 3] = ["low", "medium", "high"];

/// Check an identifier against the fleet-wide id format:
/// 1..=100 characters drawn from `[A-Za-z0-9_-]`.
///
/// This is the sole identity-format invariant enforced everywhere an id
/// crosses the trust boundary.
pub fn validate_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Check a camera-settings payload.
///
/// Valid iff the payload is an object, every key is one of
/// [`SETTING_KEYS`], and every value is a finite number in
/// `[SETTING_MIN, SETTING_MAX]`. An empty object is valid (no-op patch).
pub fn validate_camera_settings(payload: &Value) -> bool {
    let Some(map) = payload.as_object() else {
        return false;
    };
    for (key, value) in map {
        if !SETTING_KEYS.contains(&key.as_str()) {
            return false;
        }
        let Some(number) = value.as_f64() else {
            return false;
        };
        if !number.is_finite() || !(SETTING_MIN..=SETTING_MAX).contains(&number) {
            return false;
        }
    }
    true
}

/// Check a recording-config payload.
///
/// Every field is optional; absent fields are always acceptable (defaults
/// are applied downstream). When present: `videoQuality` must be one of
/// [`QUALITY_VALUES`], `codec` must be a string, `lidarPointDensity` must
/// be a finite non-negative number. A JSON `null` counts as absent.
/// Unrecognized keys are ignored rather than rejected.
pub fn validate_recording_config(payload: &Value) -> bool {
    let Some(map) = payload.as_object() else {
        return false;
    };

    match map.get("videoQuality") {
        None | Some(Value::Null) => {}
        Some(Value::String(quality)) if QUALITY_VALUES.contains(&quality.as_str()) => {}
        Some(_) => return false,
    }

    match map.get("codec") {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(_) => return false,
    }

    match map.get("lidarPointDensity") {
        None | Some(Value::Null) => {}
        Some(value) => match value.as_f64() {
            Some(density) if density.is_finite() && density >= 0.0 => {}
            _ => return false,
        },
    }

    true
}

/// Strip angle brackets and surrounding whitespace from a free-text field.
///
/// Defense in depth before storage, not a parser -- no attempt at full
/// HTML/script sanitization.
pub fn sanitize_text(input: &str) -> String {
    input
        .trim()
        .chars()
        .filter(|c| *c != '<' && *c != '>')
        .collect()
}
