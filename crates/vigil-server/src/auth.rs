// ── Connection admission ──
//
// Credential verification is a future collaborator. The gateway consults
// an injected policy on every connection, so swapping the stub for a real
// verifier never touches the gateway itself.

/// Capability check consulted before a connection may subscribe to the
/// channel or submit commands.
pub trait AdmissionPolicy: Send + Sync {
    /// Decide whether a caller presenting `token` may join.
    fn admit(&self, token: Option<&str>) -> bool;
}

/// Pass-through policy: admits every caller, token or not.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AdmissionPolicy for AllowAll {
    fn admit(&self, _token: Option<&str>) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RequireToken;

    impl AdmissionPolicy for RequireToken {
        fn admit(&self, token: Option<&str>) -> bool {
            token == Some("expected")
        }
    }

    #[test]
    fn allow_all_admits_with_and_without_token() {
        assert!(AllowAll.admit(None));
        assert!(AllowAll.admit(Some("anything")));
    }

    #[test]
    fn policies_are_swappable_behind_the_trait() {
        let policy: &dyn AdmissionPolicy = &RequireToken;
        assert!(policy.admit(Some("expected")));
        assert!(!policy.admit(Some("wrong")));
        assert!(!policy.admit(None));
    }
}
