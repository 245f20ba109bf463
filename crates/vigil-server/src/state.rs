// ── Shared server context ──
//
// One context object threaded through every handler and background task.
// Nothing in the server is a module-level singleton, so multi-tenant or
// test-isolated instances are just multiple `AppState::new` calls.

use std::sync::Arc;

use tokio::sync::broadcast;

use vigil_config::Config;
use vigil_core::protocol::ServerEvent;
use vigil_core::{DeviceRegistry, RateLimiter, SessionTracker};

use crate::auth::AdmissionPolicy;

/// Fan-out buffer per observer. A subscriber further behind than this
/// starts losing snapshots instead of blocking the broadcaster.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Cheaply cloneable handle to the server's shared state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<StateInner>,
}

struct StateInner {
    config: Config,
    registry: DeviceRegistry,
    sessions: SessionTracker,
    limiter: RateLimiter,
    events: broadcast::Sender<Arc<ServerEvent>>,
    admission: Arc<dyn AdmissionPolicy>,
}

impl AppState {
    /// Build the full context: seeded registry, idle session slot, fresh
    /// rate-limit table, and the event fan-out channel.
    pub fn new(config: Config, admission: Arc<dyn AdmissionPolicy>) -> Self {
        let limiter = RateLimiter::new(config.rate_limit());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(StateInner {
                registry: DeviceRegistry::seeded(),
                sessions: SessionTracker::new(),
                limiter,
                events,
                admission,
                config,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.inner.registry
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.inner.sessions
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    pub fn admission(&self) -> &dyn AdmissionPolicy {
        self.inner.admission.as_ref()
    }

    /// New receiver on the observer fan-out channel.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Arc<ServerEvent>> {
        self.inner.events.subscribe()
    }

    /// Push an event to every connected observer. A send with no
    /// subscribers is not an error -- nobody is watching right now.
    pub fn publish(&self, event: ServerEvent) {
        let _ = self.inner.events.send(Arc::new(event));
    }

    /// Number of currently connected observers.
    pub fn observer_count(&self) -> usize {
        self.inner.events.receiver_count()
    }
}
