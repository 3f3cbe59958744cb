//! Correlated randomness consumed by the opening protocols.
//!
//! Real deployments obtain MAC key shares and random masks from a preprocessing phase; this
//! module only fixes the interface ([`Preprocessing`]) and provides a [`Dealer`] that plays the
//! role of a trusted dealer for simulations and tests.

use std::collections::VecDeque;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::debug;

use crate::{
    error::Error,
    value::{MacValue, Share},
};

/// A source of authenticated random sharings.
pub trait Preprocessing<T> {
    /// Returns this player's share of a fresh random value, together with its MAC share.
    fn random_share(&mut self) -> Result<Share<T>, Error>;
}

/// A finite queue of random sharings handed out by a dealer.
#[derive(Debug, Clone, Default)]
pub struct MaskQueue<T>(VecDeque<Share<T>>);

impl<T> MaskQueue<T> {
    /// The number of masks left.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no mask is left.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> FromIterator<Share<T>> for MaskQueue<T> {
    fn from_iter<I: IntoIterator<Item = Share<T>>>(iter: I) -> Self {
        MaskQueue(iter.into_iter().collect())
    }
}

impl<T> Preprocessing<T> for MaskQueue<T> {
    fn random_share(&mut self) -> Result<Share<T>, Error> {
        self.0.pop_front().ok_or(Error::PreprocessingExhausted)
    }
}

/// A trusted dealer that knows the global MAC key and hands out authenticated sharings.
#[derive(Debug)]
pub struct Dealer<T> {
    alpha: T,
    key_shares: Vec<T>,
    rng: ChaCha20Rng,
}

impl<T: MacValue> Dealer<T> {
    /// Creates a dealer for `num_players` players with a MAC key derived from `seed`.
    pub fn new(num_players: usize, seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let key_shares: Vec<T> = (0..num_players).map(|_| T::random(&mut rng)).collect();
        let alpha = key_shares
            .iter()
            .copied()
            .fold(T::default(), |acc, share| acc + share);
        debug!(num_players, "dealer created MAC key shares");
        Self {
            alpha,
            key_shares,
            rng,
        }
    }

    /// The global MAC key, only known to the dealer.
    pub fn mac_key(&self) -> T {
        self.alpha
    }

    /// The MAC key share of every player, indexed by player.
    pub fn mac_key_shares(&self) -> &[T] {
        &self.key_shares
    }

    /// Splits `secret` into random authenticated shares, one per player.
    pub fn share(&mut self, secret: T) -> Vec<Share<T>> {
        let n = self.key_shares.len();
        let mut values: Vec<T> = (1..n).map(|_| T::random(&mut self.rng)).collect();
        let rest = values
            .iter()
            .copied()
            .fold(secret, |acc, share| acc - share);
        values.push(rest);
        self.authenticate(&values)
    }

    /// Authenticates the given value shares: MAC shares are random but sum to `alpha * secret`.
    pub fn authenticate(&mut self, value_shares: &[T]) -> Vec<Share<T>> {
        let secret = value_shares
            .iter()
            .copied()
            .fold(T::default(), |acc, share| acc + share);
        let mut macs: Vec<T> = (1..value_shares.len())
            .map(|_| T::random(&mut self.rng))
            .collect();
        let rest = macs
            .iter()
            .copied()
            .fold(self.alpha * secret, |acc, share| acc - share);
        macs.push(rest);
        value_shares
            .iter()
            .zip(macs)
            .map(|(value, mac)| Share::new(*value, mac))
            .collect()
    }

    /// Creates `count` random sharings and returns them as one mask queue per player.
    pub fn masks(&mut self, count: usize) -> Vec<MaskQueue<T>> {
        let n = self.key_shares.len();
        let mut queues = vec![VecDeque::with_capacity(count); n];
        for _ in 0..count {
            let secret = T::random(&mut self.rng);
            for (queue, share) in queues.iter_mut().zip(self.share(secret)) {
                queue.push_back(share);
            }
        }
        queues.into_iter().map(MaskQueue).collect()
    }
}
