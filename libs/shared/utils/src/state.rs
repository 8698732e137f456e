use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared_config::AppConfig;
use shared_database::{InMemoryStore, SchedulingStore, SupabaseStore};
use tracing::{info, warn};

/// Where handlers read the current instant from. Never taken from the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(instant) => *instant,
        }
    }
}

/// Shared router state: configuration plus the scheduling store every cell reads from.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn SchedulingStore>,
    pub clock: Clock,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn SchedulingStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            clock: Clock::System,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Picks the PostgREST store when Supabase is configured, the in-memory one otherwise.
    pub fn from_config(config: AppConfig) -> Self {
        let store: Arc<dyn SchedulingStore> = if config.is_configured() {
            info!("Using Supabase scheduling store at {}", config.supabase_url);
            Arc::new(SupabaseStore::new(&config))
        } else {
            warn!("Supabase is not configured, falling back to the in-memory scheduling store");
            Arc::new(InMemoryStore::new())
        };
        Self::new(config, store)
    }
}
