//! The positional view of one player onto the transport.

use futures::future::try_join_all;

use crate::{
    buf::ByteBuf,
    channel::{self, Channel, recv_raw_from, send_raw_to},
    error::Error,
};

/// `a mod n`, always in `0..n`.
pub(crate) fn positive_modulo(a: isize, n: usize) -> usize {
    a.rem_euclid(n as isize) as usize
}

/// A player's communication handle: the transport plus its position among all players.
///
/// All relationships between players are positional, the protocols never look at anything but
/// [`Player::my_num`] and [`Player::num_players`].
#[derive(Debug)]
pub struct Player<'a, C: Channel> {
    channel: &'a C,
    my_num: usize,
    num_players: usize,
}

impl<'a, C: Channel> Player<'a, C> {
    /// Creates the handle of player `my_num` out of `num_players`.
    pub fn new(channel: &'a C, my_num: usize, num_players: usize) -> Result<Self, Error> {
        if my_num >= num_players {
            return Err(Error::InvalidPlayer {
                my_num,
                num_players,
            });
        }
        Ok(Self {
            channel,
            my_num,
            num_players,
        })
    }

    /// The index of the local player.
    pub fn my_num(&self) -> usize {
        self.my_num
    }

    /// The number of players.
    pub fn num_players(&self) -> usize {
        self.num_players
    }

    /// The underlying transport.
    pub fn channel(&self) -> &'a C {
        self.channel
    }

    /// The position of this player relative to `base` (`(my_num - base) mod N`).
    pub fn relative_num(&self, base: usize) -> usize {
        positive_modulo(self.my_num as isize - base as isize, self.num_players)
    }

    /// The player at position `relative` counted from `base`.
    pub fn absolute_num(&self, base: usize, relative: usize) -> usize {
        (base + relative) % self.num_players
    }

    /// Sends the written content of `buf` to `party`.
    pub async fn send_to(&self, party: usize, buf: &ByteBuf) -> Result<(), channel::Error> {
        send_raw_to(self.channel, party, "opening", buf.as_bytes().to_vec()).await
    }

    /// Sends the written content of `buf` to every other player.
    pub async fn send_all(&self, buf: &ByteBuf) -> Result<(), channel::Error> {
        try_join_all(
            (0..self.num_players)
                .filter(|p| *p != self.my_num)
                .map(|p| self.send_to(p, buf)),
        )
        .await?;
        Ok(())
    }

    /// Waits for the next message from `party`.
    pub async fn receive_player(&self, party: usize) -> Result<ByteBuf, channel::Error> {
        let bytes = recv_raw_from(self.channel, party, "opening").await?;
        Ok(ByteBuf::from(bytes))
    }

    /// Receives one message from each of `parties`, returned in the same order.
    pub async fn receive_all_of(&self, parties: &[usize]) -> Result<Vec<ByteBuf>, channel::Error> {
        try_join_all(parties.iter().map(|p| self.receive_player(*p))).await
    }
}
