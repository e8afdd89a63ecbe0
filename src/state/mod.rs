pub mod countdown;
mod hub;
pub mod race;
pub mod registry;
pub mod serializer;
pub mod state_machine;
pub mod transitions;

use std::sync::Arc;

use crate::{config::AppConfig, dao::race_store::RaceStore};

pub use self::countdown::CountdownScheduler;
pub use self::hub::EventHub;
pub use self::registry::ActiveRaceRegistry;
pub use self::serializer::GroupSerializer;

/// Cheaply clonable handle on [`AppState`].
pub type SharedState = Arc<AppState>;

/// Capacity of the broadcast channel feeding SSE and WebSocket subscribers.
const EVENT_CAPACITY: usize = 64;

/// Central application state: configuration, race storage, the per-group
/// mutation machinery and the event fan-out.
pub struct AppState {
    config: Arc<AppConfig>,
    store: Arc<dyn RaceStore>,
    registry: ActiveRaceRegistry,
    serializer: GroupSerializer,
    countdowns: CountdownScheduler,
    events: EventHub,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// Every configured group starts without an active race.
    pub fn new(config: AppConfig, store: Arc<dyn RaceStore>) -> SharedState {
        let registry = ActiveRaceRegistry::new(config.groups().keys().cloned());
        Arc::new(Self {
            config: Arc::new(config),
            store,
            registry,
            serializer: GroupSerializer::new(),
            countdowns: CountdownScheduler::new(),
            events: EventHub::new(EVENT_CAPACITY),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Race persistence backend.
    pub fn store(&self) -> &dyn RaceStore {
        self.store.as_ref()
    }

    /// Active race pointer per group.
    pub fn registry(&self) -> &ActiveRaceRegistry {
        &self.registry
    }

    /// Per-group FIFO executor every mutation goes through.
    pub fn serializer(&self) -> &GroupSerializer {
        &self.serializer
    }

    /// Armed countdowns.
    pub fn countdowns(&self) -> &CountdownScheduler {
        &self.countdowns
    }

    /// Broadcast hub shared by the SSE and WebSocket streams.
    pub fn events(&self) -> &EventHub {
        &self.events
    }
}
