#![allow(dead_code)]

use macopen::{
    prep::Dealer,
    value::{MacValue, Share},
};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Shares every secret, returning the shares grouped by player.
pub fn deal<T: MacValue>(dealer: &mut Dealer<T>, secrets: &[T]) -> Vec<Vec<Share<T>>> {
    let n = dealer.mac_key_shares().len();
    let mut per_player = vec![Vec::with_capacity(secrets.len()); n];
    for secret in secrets {
        for (shares, share) in per_player.iter_mut().zip(dealer.share(*secret)) {
            shares.push(share);
        }
    }
    per_player
}

/// Elementwise sum of the vectors of all players.
pub fn sum_columns<T: MacValue>(inputs: &[Vec<T>]) -> Vec<T> {
    let len = inputs.first().map_or(0, Vec::len);
    (0..len)
        .map(|i| {
            inputs
                .iter()
                .fold(T::default(), |acc, values| acc + values[i])
        })
        .collect()
}
