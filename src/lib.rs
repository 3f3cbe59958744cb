//! Authenticated opening of secret-shared values for SPDZ-style multi-party computation.
//!
//! Every player holds an additive share of each secret together with an additive share of its
//! MAC, `alpha * secret` for a global key `alpha` that nobody knows. Opening a batch of secrets
//! sums the shares of all players, and a later MAC check over the whole batch detects whether
//! any party lied about its shares.
//!
//! ## Main Components
//!
//! * [`tree_sum`]: The aggregator [`tree_sum::TreeSum`], summing vectors of shares over a tree,
//!   a ring or a rotated star of players.
//! * [`mac_check`]: The opening accumulator [`mac_check::MacCheck`] for prime fields, opening
//!   through the aggregator or by direct exchange.
//! * [`ring_check`]: [`ring_check::RingMacCheck`], the same for rings `Z/2^(k+s)`, consuming
//!   random masks from a [`prep::Preprocessing`] source.
//! * [`channel`]: Communication abstractions for exchanging data between parties.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use macopen::{channel::SimpleChannel, config::Config, mac_check::MacCheck, player::Player};
//!
//! let player = Player::new(&channel, my_num, num_players)?;
//! let mut opening = MacCheck::new(mac_key_share, &Config::from_env()?);
//! let opened = opening.open(&shares, &player).await?;
//! // ... use the opened values, open more ...
//! opening.check(&player).await?;
//! ```
//!
//! ## Security Properties
//!
//! Openings are secure against a malicious majority: a party that sends wrong shares is caught
//! by the check with overwhelming probability, and the computation must then be aborted. Opened
//! values must not influence anything outside the computation before they have been checked.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod buf;
pub mod channel;
pub mod commit;
pub mod config;
pub mod error;
pub mod field;
pub mod mac_check;
pub mod player;
pub mod prep;
pub mod ring_check;
pub mod tree_sum;
pub mod value;
pub mod z2k;

pub use error::Error;
