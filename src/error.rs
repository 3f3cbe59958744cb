//! Errors raised while opening or checking values.

use crate::{buf, channel, config};

/// A custom error type for the opening and MAC check protocols.
///
/// None of these errors is recoverable within a running batch: the caller has to abort the
/// computation (or restart it from scratch).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error("channel error: {0}")]
    Channel(#[from] channel::Error),
    /// A received message could not be decoded.
    #[error("malformed message: {0}")]
    Serialization(#[from] buf::Error),
    /// The opened values are inconsistent with their MACs, at least one party cheated.
    #[error("MAC check failed")]
    MacCheckFailed,
    /// The opened check value disagrees with the partial openings of the batch.
    #[error("opened check value is inconsistent with the partial openings")]
    InconsistentOpening,
    /// A party opened a value that does not match its earlier commitment.
    #[error("commitment could not be opened")]
    CommitmentMismatch,
    /// A party sent different broadcast messages to different parties.
    #[error("broadcast messages differ between parties")]
    InconsistentBroadcast,
    /// The player index or player count is invalid.
    #[error("player {my_num} does not exist among {num_players} players")]
    InvalidPlayer {
        /// The index of the local player.
        my_num: usize,
        /// The number of players.
        num_players: usize,
    },
    /// The ring check needs a source of random masks, but none was set.
    #[error("no preprocessing source has been set")]
    MissingPreprocessing,
    /// The preprocessing source ran out of random masks.
    #[error("preprocessing source is exhausted")]
    PreprocessingExhausted,
    /// The configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),
}
