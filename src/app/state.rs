//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::ArenaSlot;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub arenas: Arc<ArenaSlot>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            arenas: Arc::new(ArenaSlot::new()),
        }
    }
}
