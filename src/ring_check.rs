//! The MAC check over rings `Z/2^(k+s)`.
//!
//! Over a ring, a linear combination of MAC'd values with random coefficients is not uniformly
//! distributed, so opening it could leak the secrets' high bits. [`RingMacCheck`] therefore only
//! opens the low `k` bits of every share and masks the checked combination with a random
//! sharing `r` taken from preprocessing: the value opened by the check is
//! `sum_j chi_j * x_j + 2^k * r`, whose low `k` bits must agree with the partial openings.

use std::mem;

use tracing::{Level, debug, instrument, warn};

use crate::{
    channel::Channel,
    commit::{commit_and_open, shared_rng},
    config::Config,
    error::Error,
    mac_check::{MacCheck, Phase},
    player::Player,
    prep::Preprocessing,
    tree_sum::TreeSum,
    value::{RingValue, Share},
};

/// The opening accumulator for rings, opening `k` bits per share.
pub struct RingMacCheck<R> {
    inner: MacCheck<R>,
    prep: Option<Box<dyn Preprocessing<R> + Send>>,
    pending_shares: Vec<R>,
    shares: Vec<R>,
}

impl<R: RingValue> RingMacCheck<R> {
    /// Creates an accumulator that opens through the aggregator.
    ///
    /// A mask source has to be set by [`RingMacCheck::set_prep`] before the first check.
    pub fn new(mac_key_share: R, config: &Config) -> Self {
        Self::wrap(MacCheck::new(mac_key_share, config))
    }

    /// Creates an accumulator that opens by direct all-to-all exchange.
    pub fn direct(mac_key_share: R, config: &Config) -> Self {
        Self::wrap(MacCheck::direct(mac_key_share, config))
    }

    fn wrap(inner: MacCheck<R>) -> Self {
        Self {
            inner,
            prep: None,
            pending_shares: vec![],
            shares: vec![],
        }
    }

    /// Sets the source of the random masks consumed by every check.
    pub fn set_prep(&mut self, prep: impl Preprocessing<R> + Send + 'static) {
        self.prep = Some(Box::new(prep));
    }

    /// The state of the current batch.
    pub fn phase(&self) -> Phase {
        self.inner.phase()
    }

    /// The aggregator, e.g. to change its topology parameters.
    pub fn aggregator_mut(&mut self) -> &mut TreeSum {
        self.inner.aggregator_mut()
    }

    /// Starts a new batch, reserving room for `n` openings.
    pub fn init_open(&mut self, n: usize) {
        self.inner.init_open(n);
        self.pending_shares.clear();
        self.pending_shares.reserve(n);
    }

    /// Adds a share to the batch; only its low `k` bits will be sent.
    pub fn prepare_open(&mut self, share: Share<R>) {
        if self.inner.phase() != Phase::Accumulating {
            self.init_open(0);
        }
        self.inner.prepare_open(share, Some(R::K_BYTES));
        self.pending_shares.push(share.value);
    }

    /// Opens the low `k` bits of all shares of the batch, then checks if enough are waiting.
    pub async fn exchange<C: Channel>(&mut self, player: &Player<'_, C>) -> Result<(), Error> {
        if let Err(e) = self.inner.exchange_shares(player).await {
            self.pending_shares.clear();
            return Err(e);
        }
        for value in self.inner.opened_mut() {
            *value = value.low_k();
        }
        self.inner.record_opened();
        self.shares.append(&mut self.pending_shares);
        self.check_if_needed(player).await
    }

    /// Returns the values opened by the last exchange, reduced modulo `2^k`.
    pub fn finalize_open(&mut self) -> Vec<R> {
        self.inner.finalize_open()
    }

    /// Opens `shares` as one batch.
    pub async fn open<C: Channel>(
        &mut self,
        shares: &[Share<R>],
        player: &Player<'_, C>,
    ) -> Result<Vec<R>, Error> {
        self.init_open(shares.len());
        for share in shares {
            self.prepare_open(*share);
        }
        self.exchange(player).await?;
        Ok(self.finalize_open())
    }

    /// Schedules a value that was (partially) opened elsewhere for the next check.
    pub async fn add_to_check<C: Channel>(
        &mut self,
        share: Share<R>,
        opened: R,
        player: &Player<'_, C>,
    ) -> Result<(), Error> {
        self.shares.push(share.value);
        self.inner.push_to_check(share.mac, opened.low_k());
        self.check_if_needed(player).await
    }

    /// The number of opened values whose MACs have not been checked yet.
    pub fn waiting_for_check(&self) -> usize {
        self.inner.waiting_for_check()
    }

    async fn check_if_needed<C: Channel>(&mut self, player: &Player<'_, C>) -> Result<(), Error> {
        if self.waiting_for_check() >= self.inner.popen_max() {
            self.check(player).await
        } else {
            Ok(())
        }
    }

    /// Verifies the MACs of all values waiting for the check.
    ///
    /// Fails with [`Error::InconsistentOpening`] if the masked combination disagrees with the
    /// partial openings, and with [`Error::MacCheckFailed`] if its MAC does not verify.
    #[instrument(level = Level::DEBUG, skip_all, fields(player = player.my_num(), values = self.waiting_for_check()))]
    pub async fn check<C: Channel>(&mut self, player: &Player<'_, C>) -> Result<(), Error> {
        if self.waiting_for_check() == 0 {
            return Ok(());
        }
        let (vals, macs) = self.inner.take_check_state();
        let shares = mem::take(&mut self.shares);
        if vals.len() != shares.len() || macs.len() != shares.len() {
            warn!(
                values = vals.len(),
                shares = shares.len(),
                "values waiting for the check do not match their shares"
            );
            return Err(Error::InconsistentOpening);
        }
        let mask = self
            .prep
            .as_mut()
            .ok_or(Error::MissingPreprocessing)?
            .random_share()?;
        let (me, n) = (player.my_num(), player.num_players());

        let mut rng = shared_rng(player.channel(), me, n).await?;
        let mut y = R::default();
        let mut z = R::default();
        let mut m = R::default();
        for ((val, share), mac) in vals.iter().zip(&shares).zip(&macs) {
            let chi = R::random_challenge(&mut rng);
            y = y + chi * *val;
            z = z + chi * *share;
            m = m + chi * *mac;
        }

        let masked = z + mask.value.shift_k();
        let opened = self.inner.aggregator_mut().run_one(masked, player).await?;
        if opened.low_k() != y.low_k() {
            warn!(values = vals.len(), "check value disagrees with the opened values");
            return Err(Error::InconsistentOpening);
        }

        let sigma = m + mask.mac.shift_k() - self.inner.mac_key_share() * opened;
        let sigmas = commit_and_open(player.channel(), me, n, "ring MAC check", &sigma).await?;
        let total = sigmas.into_iter().fold(R::default(), |acc, s| acc + s);
        if !total.is_zero() {
            warn!(values = vals.len(), "MAC check failed");
            return Err(Error::MacCheckFailed);
        }
        debug!(values = vals.len(), "MAC check passed");
        Ok(())
    }
}

impl<R: std::fmt::Debug> std::fmt::Debug for RingMacCheck<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingMacCheck")
            .field("inner", &self.inner)
            .field("has_prep", &self.prep.is_some())
            .field("waiting", &self.shares.len())
            .finish()
    }
}
