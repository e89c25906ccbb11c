//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::arena::{ArenaConfig, GameRules};
use crate::game::physics::Bounds;
use crate::session::{ColorPolicy, SessionConfig, MAX_PLAYERS};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma-separated. Any origin when unset.
    pub client_origin: Option<String>,

    /// Roster size that starts the match
    pub min_players: usize,
    /// Pickups kept in play
    pub pickup_count: usize,
    /// Half the side length of the square arena
    pub arena_half_extent: f32,
    /// Palette size
    pub color_count: u8,
    pub color_policy: ColorPolicy,
    /// Fixed seed for reproducible placement
    pub match_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|o| !o.trim().is_empty()),

            min_players: parse_or("MIN_PLAYERS", 2)?,
            pickup_count: parse_or("PICKUP_COUNT", 7)?,
            arena_half_extent: parse_or("ARENA_HALF_EXTENT", 10.0)?,
            color_count: parse_or("COLOR_COUNT", 6)?,
            color_policy: match env::var("COLOR_POLICY").as_deref() {
                Err(_) | Ok("first_fit") => ColorPolicy::FirstFit,
                Ok("random") => ColorPolicy::Random,
                Ok(_) => return Err(ConfigError::Invalid("COLOR_POLICY")),
            },
            match_seed: env::var("MATCH_SEED")
                .ok()
                .map(|s| s.parse().map_err(|_| ConfigError::Invalid("MATCH_SEED")))
                .transpose()?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PLAYERS).contains(&self.min_players) {
            return Err(ConfigError::Invalid("MIN_PLAYERS"));
        }
        if !(self.arena_half_extent.is_finite() && self.arena_half_extent > 0.0) {
            return Err(ConfigError::Invalid("ARENA_HALF_EXTENT"));
        }
        if (self.color_count as usize) < MAX_PLAYERS {
            return Err(ConfigError::Invalid("COLOR_COUNT"));
        }
        Ok(())
    }

    /// Arena settings derived from this configuration
    pub fn arena_config(&self) -> ArenaConfig {
        ArenaConfig {
            session: SessionConfig {
                min_players: self.min_players,
                color_count: self.color_count,
                color_policy: self.color_policy,
                ..SessionConfig::default()
            },
            rules: GameRules {
                bounds: Bounds::square(self.arena_half_extent),
                ..GameRules::default()
            },
            pickup_count: self.pickup_count,
            seed: self.match_seed.unwrap_or(0),
        }
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            server_addr: "127.0.0.1:8080".parse().expect("addr"),
            log_level: "info".into(),
            client_origin: None,
            min_players: 2,
            pickup_count: 7,
            arena_half_extent: 10.0,
            color_count: 6,
            color_policy: ColorPolicy::FirstFit,
            match_seed: Some(9),
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn out_of_range_values_rejected() {
        let config = Config {
            min_players: 5,
            ..base()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid("MIN_PLAYERS"))));

        let config = Config {
            color_count: 3,
            ..base()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid("COLOR_COUNT"))));

        let config = Config {
            arena_half_extent: 0.0,
            ..base()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid("ARENA_HALF_EXTENT"))));
    }

    #[test]
    fn arena_config_carries_settings() {
        let arena = Config {
            arena_half_extent: 5.0,
            pickup_count: 3,
            ..base()
        }
        .arena_config();
        assert_eq!(arena.rules.bounds, Bounds::square(5.0));
        assert_eq!(arena.pickup_count, 3);
        assert_eq!(arena.seed, 9);
        assert_eq!(arena.session.max_players, MAX_PLAYERS);
    }
}
