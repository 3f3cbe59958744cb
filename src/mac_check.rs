//! Opening authenticated shares and checking their MACs in batches.
//!
//! [`MacCheck`] buffers shares between [`MacCheck::init_open`] and [`MacCheck::exchange`], opens
//! them all at once and keeps every opened value together with its MAC share until the next
//! [`MacCheck::check`]. The check runs automatically once `popen_max` values are waiting, but the
//! caller must run it explicitly before any result leaves the computation.

use std::mem;

use tracing::{Level, debug, instrument, warn};

use crate::{
    buf::ByteBuf,
    channel::Channel,
    commit::{commit_and_open, shared_rng},
    config::Config,
    error::Error,
    player::Player,
    tree_sum::{Combine, TreeSum, pack_range, unpack_range},
    value::{MacValue, Share, declared_len},
};

/// How shares are exchanged when opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    /// Sum the shares through the [`TreeSum`] aggregator.
    Aggregated,
    /// Every player sends its shares directly to every other player.
    Direct,
}

/// The state of the current batch of openings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No openings are being prepared.
    Idle,
    /// Shares are being collected by [`MacCheck::prepare_open`].
    Accumulating,
    /// The shares have been opened, the values can be retrieved by [`MacCheck::finalize_open`].
    Exchanged,
}

/// The opening accumulator for fields: opens shares and verifies their MACs.
#[derive(Debug)]
pub struct MacCheck<T> {
    alpha: T,
    aggregator: TreeSum,
    exchange: Exchange,
    popen_max: usize,
    os: ByteBuf,
    opened: Vec<T>,
    lengths: Vec<Option<usize>>,
    pending_macs: Vec<T>,
    vals: Vec<T>,
    macs: Vec<T>,
    phase: Phase,
}

impl<T: MacValue> MacCheck<T> {
    /// Creates an accumulator that opens through the aggregator, given this player's MAC key
    /// share.
    pub fn new(mac_key_share: T, config: &Config) -> Self {
        Self::with_exchange(mac_key_share, config, Exchange::Aggregated)
    }

    /// Creates an accumulator that opens by direct all-to-all exchange.
    pub fn direct(mac_key_share: T, config: &Config) -> Self {
        Self::with_exchange(mac_key_share, config, Exchange::Direct)
    }

    fn with_exchange(mac_key_share: T, config: &Config, exchange: Exchange) -> Self {
        Self {
            alpha: mac_key_share,
            aggregator: TreeSum::new(config),
            exchange,
            popen_max: config.popen_max,
            os: ByteBuf::new(),
            opened: vec![],
            lengths: vec![],
            pending_macs: vec![],
            vals: vec![],
            macs: vec![],
            phase: Phase::Idle,
        }
    }

    /// This player's share of the MAC key.
    pub fn mac_key_share(&self) -> T {
        self.alpha
    }

    /// How shares are exchanged.
    pub fn exchange_mode(&self) -> Exchange {
        self.exchange
    }

    /// The state of the current batch.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The aggregator, e.g. to change its topology parameters.
    pub fn aggregator_mut(&mut self) -> &mut TreeSum {
        &mut self.aggregator
    }

    /// Starts a new batch, reserving room for `n` openings.
    pub fn init_open(&mut self, n: usize) {
        self.opened.clear();
        self.lengths.clear();
        self.pending_macs.clear();
        self.opened.reserve(n);
        self.lengths.reserve(n);
        self.pending_macs.reserve(n);
        self.phase = Phase::Accumulating;
    }

    /// Adds a share to the batch, to be sent using `len` bytes (or the full size).
    pub fn prepare_open(&mut self, share: Share<T>, len: Option<usize>) {
        if self.phase != Phase::Accumulating {
            self.init_open(0);
        }
        self.opened.push(share.value);
        self.lengths.push(len);
        self.pending_macs.push(share.mac);
    }

    /// Opens all shares of the batch, then runs the MAC check if enough values are waiting.
    pub async fn exchange<C: Channel>(&mut self, player: &Player<'_, C>) -> Result<(), Error> {
        self.exchange_shares(player).await?;
        self.record_opened();
        self.check_if_needed(player).await
    }

    /// Returns the values opened by the last exchange, in the order they were prepared.
    pub fn finalize_open(&mut self) -> Vec<T> {
        self.phase = Phase::Idle;
        mem::take(&mut self.opened)
    }

    /// Opens `shares` as one batch.
    pub async fn open<C: Channel>(
        &mut self,
        shares: &[Share<T>],
        player: &Player<'_, C>,
    ) -> Result<Vec<T>, Error> {
        self.init_open(shares.len());
        for share in shares {
            self.prepare_open(*share, None);
        }
        self.exchange(player).await?;
        Ok(self.finalize_open())
    }

    /// Opens a single share.
    pub async fn open_one<C: Channel>(
        &mut self,
        share: Share<T>,
        player: &Player<'_, C>,
    ) -> Result<T, Error> {
        let opened = self.open(&[share], player).await?;
        Ok(opened[0])
    }

    /// Schedules a value that was opened elsewhere for the next check.
    pub async fn add_to_check<C: Channel>(
        &mut self,
        share: Share<T>,
        opened: T,
        player: &Player<'_, C>,
    ) -> Result<(), Error> {
        self.push_to_check(share.mac, opened);
        self.check_if_needed(player).await
    }

    /// The number of opened values whose MACs have not been checked yet.
    pub fn waiting_for_check(&self) -> usize {
        self.macs.len().max(self.vals.len())
    }

    /// Runs [`MacCheck::check`] once at least `popen_max` values are waiting.
    pub async fn check_if_needed<C: Channel>(
        &mut self,
        player: &Player<'_, C>,
    ) -> Result<(), Error> {
        if self.waiting_for_check() >= self.popen_max {
            self.check(player).await
        } else {
            Ok(())
        }
    }

    /// Verifies the MACs of all opened values waiting for the check.
    ///
    /// All players agree on random coefficients `chi_j` by a coin toss. Each player then
    /// computes `sigma = sum_j chi_j * mac_j - alpha * sum_j chi_j * v_j` and the shares of
    /// `sigma` are opened by commit-and-open. If they do not sum to zero, at least one party
    /// cheated and the computation must be aborted. The waiting values are discarded either way.
    #[instrument(level = Level::DEBUG, skip_all, fields(player = player.my_num(), values = self.waiting_for_check()))]
    pub async fn check<C: Channel>(&mut self, player: &Player<'_, C>) -> Result<(), Error> {
        if self.waiting_for_check() == 0 {
            return Ok(());
        }
        let (vals, macs) = self.take_check_state();
        let (me, n) = (player.my_num(), player.num_players());

        let mut rng = shared_rng(player.channel(), me, n).await?;
        let mut a = T::default();
        let mut gamma = T::default();
        for (val, mac) in vals.iter().zip(&macs) {
            let chi = T::random(&mut rng);
            a = a + chi * *val;
            gamma = gamma + chi * *mac;
        }
        let sigma = gamma - self.alpha * a;

        let sigmas = commit_and_open(player.channel(), me, n, "MAC check", &sigma).await?;
        let total = sigmas.into_iter().fold(T::default(), |acc, s| acc + s);
        if !total.is_zero() {
            warn!(values = vals.len(), "MAC check failed");
            return Err(Error::MacCheckFailed);
        }
        debug!(values = vals.len(), "MAC check passed");
        Ok(())
    }

    pub(crate) fn push_to_check(&mut self, mac: T, opened: T) {
        self.macs.push(mac);
        self.vals.push(opened);
    }

    /// Removes all values waiting for the check and returns them with their MAC shares.
    pub(crate) fn take_check_state(&mut self) -> (Vec<T>, Vec<T>) {
        (mem::take(&mut self.vals), mem::take(&mut self.macs))
    }

    /// The values of the current batch; after an exchange, the opened values.
    pub(crate) fn opened_mut(&mut self) -> &mut [T] {
        &mut self.opened
    }

    pub(crate) fn popen_max(&self) -> usize {
        self.popen_max
    }

    /// Sums the shares of the batch over all players, in place.
    ///
    /// On failure the batch is discarded and the accumulator is idle again.
    #[instrument(level = Level::DEBUG, skip_all, fields(player = player.my_num(), opens = self.opened.len()))]
    pub(crate) async fn exchange_shares<C: Channel>(
        &mut self,
        player: &Player<'_, C>,
    ) -> Result<(), Error> {
        debug!(mode = ?self.exchange, "opening shares");
        let result = match self.exchange {
            Exchange::Aggregated => {
                self.aggregator
                    .run_with_lengths(&mut self.opened, &self.lengths, player)
                    .await
            }
            Exchange::Direct => self.exchange_direct(player).await,
        };
        if result.is_err() {
            self.opened.clear();
            self.lengths.clear();
            self.pending_macs.clear();
            self.phase = Phase::Idle;
        }
        result
    }

    /// Appends the opened values of the batch and their MAC shares to the values to check.
    pub(crate) fn record_opened(&mut self) {
        self.vals.extend_from_slice(&self.opened);
        self.macs.append(&mut self.pending_macs);
        self.phase = Phase::Exchanged;
    }

    async fn exchange_direct<C: Channel>(&mut self, player: &Player<'_, C>) -> Result<(), Error> {
        for len in &self.lengths {
            declared_len(*len, T::SIZE)?;
        }
        let all = 0..self.opened.len();
        pack_range(&mut self.os, &self.opened, &self.lengths, all.clone());
        player.send_all(&self.os).await?;

        let others: Vec<usize> = (0..player.num_players())
            .filter(|p| *p != player.my_num())
            .collect();
        for mut buf in player.receive_all_of(&others).await? {
            unpack_range(
                &mut buf,
                &mut self.opened,
                &self.lengths,
                all.clone(),
                Combine::Add,
            )?;
        }
        Ok(())
    }
}
