//! Capabilities required from the algebraic structure that values are shared over.
//!
//! The aggregation layer only needs [`Value`]: addition, packing/unpacking with an optional
//! declared byte length and equality. The MAC check additionally multiplies and samples random
//! elements ([`MacValue`]); the ring-consistency check also needs partial openings
//! ([`RingValue`]).

use std::{
    fmt::Debug,
    ops::{Add, AddAssign, Mul, Sub},
};

use rand::Rng;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::buf::{self, ByteBuf};

/// An element that can be summed across players and sent over the wire.
pub trait Value: Clone + Default + PartialEq + Debug + Send + Sync + AddAssign {
    /// The full serialized size in bytes.
    const SIZE: usize;

    /// Appends the value to `buf`, using `len` bytes if a length is declared.
    fn pack(&self, buf: &mut ByteBuf, len: Option<usize>);

    /// Reads a value of `len` bytes (or [`Value::SIZE`] bytes) from `buf`.
    fn unpack(buf: &mut ByteBuf, len: Option<usize>) -> Result<Self, buf::Error>;

    /// Reads a value from `buf` and adds it to `self`.
    fn add_from(&mut self, buf: &mut ByteBuf, len: Option<usize>) -> Result<(), buf::Error> {
        let other = Self::unpack(buf, len)?;
        *self += other;
        Ok(())
    }
}

/// A [`Value`] that supports the arithmetic of a linear MAC check.
pub trait MacValue:
    Value
    + Copy
    + Serialize
    + DeserializeOwned
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
{
    /// Samples a uniformly random element.
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self;

    /// Returns `true` for the additive identity.
    fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// A [`MacValue`] over a ring `Z/2^(k+s)` whose openings only reveal the low `k` bits.
pub trait RingValue: MacValue {
    /// The number of bytes revealed by a partial opening (`k / 8`).
    const K_BYTES: usize;

    /// Multiplies by `2^k`.
    fn shift_k(self) -> Self;

    /// Reduces modulo `2^k`.
    fn low_k(self) -> Self;

    /// Samples a challenge coefficient from `Z/2^s`.
    fn random_challenge<R: Rng + ?Sized>(rng: &mut R) -> Self;
}

/// Resolves a declared byte length against the full size of a value type.
pub(crate) fn declared_len(len: Option<usize>, size: usize) -> Result<usize, buf::Error> {
    match len {
        None => Ok(size),
        Some(declared) if declared <= size => Ok(declared),
        Some(declared) => Err(buf::Error::LengthTooLarge { declared, size }),
    }
}

/// One player's authenticated share: a share of the value and a share of its MAC.
///
/// Summed over all players, `mac == alpha * value` for the global MAC key `alpha`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share<T> {
    /// The additive share of the secret.
    pub value: T,
    /// The additive share of `alpha * secret`.
    pub mac: T,
}

impl<T> Share<T> {
    /// Bundles a value share and its MAC share.
    pub fn new(value: T, mac: T) -> Self {
        Self { value, mac }
    }
}

impl<T: MacValue> Add for Share<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Share::new(self.value + rhs.value, self.mac + rhs.mac)
    }
}

impl<T: MacValue> Sub for Share<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Share::new(self.value - rhs.value, self.mac - rhs.mac)
    }
}

impl<T: MacValue> Mul<T> for Share<T> {
    type Output = Self;

    fn mul(self, rhs: T) -> Self::Output {
        Share::new(self.value * rhs, self.mac * rhs)
    }
}

impl<T: MacValue> Share<T> {
    /// Adds a public constant: player 0 adds it to its value share, everyone adjusts the MAC.
    pub fn add_public(self, constant: T, mac_key_share: T, my_num: usize) -> Self {
        let value = if my_num == 0 {
            self.value + constant
        } else {
            self.value
        };
        Share::new(value, self.mac + mac_key_share * constant)
    }
}
