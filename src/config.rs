//! Round-topology and batching parameters.

use std::{env, num::ParseIntError};

use serde::{Deserialize, Serialize};

/// The maximum number of opened values buffered before a MAC check is forced.
pub const POPEN_MAX: usize = 1_000_000;

/// An environment variable held a value that is not a non-negative integer.
#[derive(Debug, thiserror::Error)]
#[error("{var} must be a non-negative integer: {source}")]
pub struct ConfigError {
    var: &'static str,
    source: ParseIntError,
}

/// Parameters that shape how values are summed and when checks run.
///
/// `opening_sum` and `max_broadcast` values below 2 stand for "all players" inside the tree. The
/// stored values are never rewritten. The topology is chosen from the configured `opening_sum`,
/// so a value below 2 always selects the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum fan-in when summing up the tree, also selects ring vs. rotated-star.
    pub opening_sum: usize,
    /// Maximum fan-out when broadcasting the sum down the tree.
    pub max_broadcast: usize,
    /// The root of the aggregation tree.
    pub base_player: usize,
    /// Number of opened values after which a MAC check is run automatically.
    pub popen_max: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            opening_sum: 0,
            max_broadcast: 0,
            base_player: 0,
            popen_max: POPEN_MAX,
        }
    }
}

impl Config {
    /// Reads the configuration from `MACOPEN_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Reads the `MACOPEN_*` variables through `lookup`, keeping defaults for absent ones.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        let vars: [(&'static str, &mut usize); 4] = [
            ("MACOPEN_OPENING_SUM", &mut config.opening_sum),
            ("MACOPEN_MAX_BROADCAST", &mut config.max_broadcast),
            ("MACOPEN_BASE_PLAYER", &mut config.base_player),
            ("MACOPEN_POPEN_MAX", &mut config.popen_max),
        ];
        for (var, field) in vars {
            if let Some(value) = lookup(var) {
                *field = value
                    .trim()
                    .parse()
                    .map_err(|source| ConfigError { var, source })?;
            }
        }
        Ok(config)
    }

    /// Sets the maximum fan-in of the summing tree.
    pub fn with_opening_sum(mut self, opening_sum: usize) -> Self {
        self.opening_sum = opening_sum;
        self
    }

    /// Sets the maximum fan-out of the broadcast tree.
    pub fn with_max_broadcast(mut self, max_broadcast: usize) -> Self {
        self.max_broadcast = max_broadcast;
        self
    }

    /// Sets the root of the aggregation tree.
    pub fn with_base_player(mut self, base_player: usize) -> Self {
        self.base_player = base_player;
        self
    }

    /// Sets the batch size that triggers an automatic MAC check.
    pub fn with_popen_max(mut self, popen_max: usize) -> Self {
        self.popen_max = popen_max;
        self
    }
}

/// Replaces a fan-in/fan-out below 2 by the number of players.
pub(crate) fn normalize(param: usize, num_players: usize) -> usize {
    if param < 2 { num_players } else { param }
}
