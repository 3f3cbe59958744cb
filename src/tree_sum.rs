//! Summing a vector of shares across all players.
//!
//! [`TreeSum`] turns every player's local vector into the elementwise sum over all players,
//! identical at every player. Which communication pattern is used depends on the configured
//! fan-in, the number of players and the batch size, see [`Topology::select`].

use std::ops::Range;

use futures::future::try_join_all;
use tracing::{Level, debug, instrument};

use crate::{
    buf::{ByteBuf, ReportType},
    channel::Channel,
    config::{Config, normalize},
    error::Error,
    player::{Player, positive_modulo},
    value::{Value, declared_len},
};

/// The communication pattern of one aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Reduce up a tree of fan-in `opening_sum`, then broadcast down a tree of fan-out
    /// `max_broadcast`.
    Tree,
    /// Reduce-scatter followed by allgather along the ring `0 -> 1 -> ... -> N-1 -> 0`.
    Ring,
    /// Reduce-scatter and allgather where round `j` connects every player `i` with `i +- j`.
    RotatedStar,
}

impl Topology {
    /// Chooses the topology for `values_size` values among `num_players` players.
    ///
    /// The tree is used if the configured fan-in is smaller than the number of players or the
    /// batch is smaller than the fan-in. Otherwise an odd fan-in selects the ring, an even one
    /// the rotated star. A fan-in below 2 is only replaced by the number of players inside the
    /// tree, so it always selects the tree here.
    pub fn select(opening_sum: usize, num_players: usize, values_size: usize) -> Self {
        if opening_sum < num_players || values_size < opening_sum {
            Topology::Tree
        } else if opening_sum % 2 == 1 {
            Topology::Ring
        } else {
            Topology::RotatedStar
        }
    }
}

/// Whether received values are added to or replace the local ones.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Combine {
    Add,
    Replace,
}

/// One round of the ring or rotated-star schedule, seen from a single player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Step {
    to: usize,
    send_block: usize,
    from: usize,
    recv_block: usize,
    send_first: bool,
}

/// The aggregator: sums vectors of values over all players.
///
/// The send buffer is kept between calls so that repeated aggregations do not reallocate.
#[derive(Debug, Clone)]
pub struct TreeSum {
    opening_sum: usize,
    max_broadcast: usize,
    base_player: usize,
    os: ByteBuf,
}

impl TreeSum {
    /// Creates an aggregator with the topology parameters of `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            opening_sum: config.opening_sum,
            max_broadcast: config.max_broadcast,
            base_player: config.base_player,
            os: ByteBuf::new(),
        }
    }

    /// Sets the maximum fan-in of the summing tree (values below 2 mean all players).
    pub fn set_opening_sum(&mut self, opening_sum: usize) {
        self.opening_sum = opening_sum;
    }

    /// Sets the maximum fan-out of the broadcast tree (values below 2 mean all players).
    pub fn set_max_broadcast(&mut self, max_broadcast: usize) {
        self.max_broadcast = max_broadcast;
    }

    /// Sets the root of the tree.
    pub fn set_base_player(&mut self, base_player: usize) {
        self.base_player = base_player;
    }

    /// The topology that a batch of `values_size` values among `num_players` players uses.
    pub fn topology(&self, num_players: usize, values_size: usize) -> Topology {
        Topology::select(self.opening_sum, num_players, values_size)
    }

    /// The capacity or the used length of the send buffer.
    pub fn report_size(&self, report: ReportType) -> usize {
        self.os.report_size(report)
    }

    /// Replaces every value by its sum over all players.
    pub async fn run<T: Value, C: Channel>(
        &mut self,
        values: &mut [T],
        player: &Player<'_, C>,
    ) -> Result<(), Error> {
        self.run_with_lengths(values, &[], player).await
    }

    /// Sums a single value over all players.
    pub async fn run_one<T: Value, C: Channel>(
        &mut self,
        value: T,
        player: &Player<'_, C>,
    ) -> Result<T, Error> {
        let mut values = [value];
        self.run(&mut values, player).await?;
        let [value] = values;
        Ok(value)
    }

    /// Like [`TreeSum::run`], but every value is sent using its declared byte length.
    ///
    /// The lengths are only used if there is exactly one per value, `None` stands for the full
    /// size of the value type.
    #[instrument(level = Level::DEBUG, skip_all, fields(player = player.my_num(), values = values.len()))]
    pub async fn run_with_lengths<T: Value, C: Channel>(
        &mut self,
        values: &mut [T],
        lengths: &[Option<usize>],
        player: &Player<'_, C>,
    ) -> Result<(), Error> {
        let lengths: &[Option<usize>] = if lengths.len() == values.len() {
            lengths
        } else {
            &[]
        };
        for len in lengths {
            declared_len(*len, T::SIZE)?;
        }

        let n = player.num_players();
        let me = player.my_num();
        let topology = self.topology(n, values.len());
        debug!(?topology, num_players = n, "summing values");
        match topology {
            Topology::Tree => {
                self.reduce_tree(values, lengths, player).await?;
                self.broadcast_tree(values, lengths, player).await
            }
            Topology::Ring => {
                let reduce = ring_reduce_steps(me, n);
                self.run_steps(values, lengths, player, &reduce, Combine::Add)
                    .await?;
                let gather = ring_gather_steps(me, n);
                self.run_steps(values, lengths, player, &gather, Combine::Replace)
                    .await
            }
            Topology::RotatedStar => {
                let reduce = star_reduce_steps(me, n);
                self.run_steps(values, lengths, player, &reduce, Combine::Add)
                    .await?;
                let gather = star_gather_steps(me, n);
                self.run_steps(values, lengths, player, &gather, Combine::Replace)
                    .await
            }
        }
    }

    /// Sums all values up the tree, after which the root holds the total.
    async fn reduce_tree<T: Value, C: Channel>(
        &mut self,
        values: &mut [T],
        lengths: &[Option<usize>],
        player: &Player<'_, C>,
    ) -> Result<(), Error> {
        let n = player.num_players();
        let base = self.base_player % n;
        // a fan-in above n sums everything in one round, like n itself
        let opening_sum = normalize(self.opening_sum, n).min(n);
        let rel = player.relative_num(base);

        let mut sum_players = n;
        loop {
            let last_sum_players = sum_players;
            sum_players = (sum_players + opening_sum - 2) / opening_sum;
            if sum_players == 0 {
                break;
            }
            if rel >= sum_players && rel < last_sum_players {
                pack_range(&mut self.os, values, lengths, 0..values.len());
                let receiver = player.absolute_num(base, rel % sum_players);
                player.send_to(receiver, &self.os).await?;
            } else if rel < sum_players {
                let senders: Vec<usize> = (rel + sum_players..last_sum_players)
                    .step_by(sum_players)
                    .map(|sender| player.absolute_num(base, sender))
                    .collect();
                for mut buf in player.receive_all_of(&senders).await? {
                    let all = 0..values.len();
                    unpack_range(&mut buf, values, lengths, all, Combine::Add)?;
                }
            }
        }
        Ok(())
    }

    /// Sends the total from the root down the broadcast tree.
    async fn broadcast_tree<T: Value, C: Channel>(
        &mut self,
        values: &mut [T],
        lengths: &[Option<usize>],
        player: &Player<'_, C>,
    ) -> Result<(), Error> {
        let n = player.num_players();
        let base = self.base_player % n;
        let max_broadcast = normalize(self.max_broadcast, n);
        let rel = player.relative_num(base);

        let received = if rel == 0 {
            pack_range(&mut self.os, values, lengths, 0..values.len());
            None
        } else {
            let parent = player.absolute_num(base, rel / max_broadcast);
            let mut buf = player.receive_player(parent).await?;
            unpack_range(&mut buf, values, lengths, 0..values.len(), Combine::Replace)?;
            Some(buf)
        };
        let msg = received.as_ref().unwrap_or(&self.os);

        let first_child = rel.saturating_mul(max_broadcast);
        let end = first_child.saturating_add(max_broadcast).min(n);
        try_join_all(
            (first_child..end)
                .filter(|child| *child != rel)
                .map(|child| player.send_to(player.absolute_num(base, child), msg)),
        )
        .await?;
        Ok(())
    }

    async fn run_steps<T: Value, C: Channel>(
        &mut self,
        values: &mut [T],
        lengths: &[Option<usize>],
        player: &Player<'_, C>,
        steps: &[Step],
        combine: Combine,
    ) -> Result<(), Error> {
        let n = player.num_players();
        for step in steps {
            pack_range(
                &mut self.os,
                values,
                lengths,
                block_range(step.send_block, n, values.len()),
            );
            let mut buf = if step.send_first {
                player.send_to(step.to, &self.os).await?;
                player.receive_player(step.from).await?
            } else {
                let buf = player.receive_player(step.from).await?;
                player.send_to(step.to, &self.os).await?;
                buf
            };
            let range = block_range(step.recv_block, n, values.len());
            unpack_range(&mut buf, values, lengths, range, combine)?;
        }
        Ok(())
    }
}

pub(crate) fn length_at(lengths: &[Option<usize>], i: usize) -> Option<usize> {
    lengths.get(i).copied().flatten()
}

/// Writes the values in `range` followed by the terminator into the (cleared) buffer.
pub(crate) fn pack_range<T: Value>(
    buf: &mut ByteBuf,
    values: &[T],
    lengths: &[Option<usize>],
    range: Range<usize>,
) {
    buf.reset_write_head();
    let start = range.start;
    for (i, value) in values[range].iter().enumerate() {
        value.pack(buf, length_at(lengths, start + i));
    }
    buf.append_terminator();
}

/// Reads as many values as `range` holds and adds them to (or stores them in) `values`.
pub(crate) fn unpack_range<T: Value>(
    buf: &mut ByteBuf,
    values: &mut [T],
    lengths: &[Option<usize>],
    range: Range<usize>,
    combine: Combine,
) -> Result<(), Error> {
    let start = range.start;
    for (i, value) in values[range].iter_mut().enumerate() {
        let len = length_at(lengths, start + i);
        match combine {
            Combine::Add => value.add_from(buf, len)?,
            Combine::Replace => *value = T::unpack(buf, len)?,
        }
    }
    buf.expect_terminator()?;
    buf.expect_end()?;
    Ok(())
}

/// The values of block `idx` when `values_size` values are split into `n` blocks.
///
/// All blocks have `values_size / n` values, the last one also takes the remainder.
fn block_range(idx: usize, n: usize, values_size: usize) -> Range<usize> {
    let block_size = values_size / n;
    let start = idx * block_size;
    if idx + 1 == n {
        start..values_size
    } else {
        start..start + block_size
    }
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Colors player `p` within its cycle of the permutation `x -> x + step (mod n)`.
///
/// Neighbours in a cycle get different colors, except at the wrap-around of an odd cycle.
/// Together with sending first on color 0, this avoids circular waits on blocking sends.
fn star_color(p: usize, n: usize, step: usize) -> usize {
    let start = p % gcd(n, step);
    let mut x = start;
    let mut position = 0;
    while x != p {
        x = (x + step) % n;
        position += 1;
    }
    position % 2
}

/// Reduce-scatter along the ring, after which player `me` holds the total of block `me + 1`.
fn ring_reduce_steps(me: usize, n: usize) -> Vec<Step> {
    let to = (me + 1) % n;
    let from = positive_modulo(me as isize - 1, n);
    (0..n.saturating_sub(1))
        .map(|round| Step {
            to,
            send_block: positive_modulo(me as isize - round as isize, n),
            from,
            recv_block: positive_modulo(me as isize - 1 - round as isize, n),
            send_first: me % 2 == 0,
        })
        .collect()
}

/// Allgather along the ring: every player forwards the block it completed last.
fn ring_gather_steps(me: usize, n: usize) -> Vec<Step> {
    let to = (me + 1) % n;
    let from = positive_modulo(me as isize - 1, n);
    (0..n.saturating_sub(1))
        .map(|round| Step {
            to,
            send_block: positive_modulo(me as isize + 1 - round as isize, n),
            from,
            recv_block: positive_modulo(me as isize - round as isize, n),
            send_first: me % 2 == 0,
        })
        .collect()
}

/// Round `j` sends block `me - j` to its owner and receives block `me` from `me + j`.
fn star_reduce_steps(me: usize, n: usize) -> Vec<Step> {
    (1..n)
        .map(|j| {
            let to = (me + n - j) % n;
            Step {
                to,
                send_block: to,
                from: (me + j) % n,
                recv_block: me,
                send_first: star_color(me, n, n - j) == 0,
            }
        })
        .collect()
}

/// Round `j` sends the own block to `me + j` and receives block `me - j` from its owner.
fn star_gather_steps(me: usize, n: usize) -> Vec<Step> {
    (1..n)
        .map(|j| {
            let from = (me + n - j) % n;
            Step {
                to: (me + j) % n,
                send_block: me,
                from,
                recv_block: from,
                send_first: star_color(me, n, j) == 0,
            }
        })
        .collect()
}
