//! Time utilities for the arena simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 30;
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SIMULATION_TPS as u64;

/// Fixed step length in seconds
pub fn tick_delta() -> f32 {
    1.0 / SIMULATION_TPS as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_delta_matches_rate() {
        assert!((tick_delta() * SIMULATION_TPS as f32 - 1.0).abs() < 1e-6);
        assert_eq!(TICK_DURATION_MICROS, 33_333);
    }

    #[test]
    fn uptime_starts_after_init() {
        init_server_time();
        assert!(uptime_secs() < 60);
        assert!(unix_millis() > 0);
    }
}
