//! The ring `Z/2^128`, used with `k = 64` value bits and `s = 64` security bits.

use std::{
    fmt,
    ops::{Add, AddAssign, Mul, Neg, Sub},
};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    buf::{self, ByteBuf},
    value::{MacValue, RingValue, Value, declared_len},
};

/// An element of `Z/2^128`; the opened part of a secret lives in the low 64 bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Z2k(u128);

impl Z2k {
    /// Number of bits of a secret that openings reveal.
    pub const K: u32 = 64;

    /// Number of extra bits that protect the MAC.
    pub const S: u32 = 64;

    /// The raw 128-bit representative.
    pub fn value(self) -> u128 {
        self.0
    }
}

impl From<u64> for Z2k {
    fn from(x: u64) -> Self {
        Z2k(x as u128)
    }
}

impl From<u128> for Z2k {
    fn from(x: u128) -> Self {
        Z2k(x)
    }
}

impl fmt::Display for Z2k {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Z2k {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Z2k(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for Z2k {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.wrapping_add(rhs.0);
    }
}

impl Sub for Z2k {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Z2k(self.0.wrapping_sub(rhs.0))
    }
}

impl Neg for Z2k {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Z2k(self.0.wrapping_neg())
    }
}

impl Mul for Z2k {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Z2k(self.0.wrapping_mul(rhs.0))
    }
}

impl Value for Z2k {
    const SIZE: usize = 16;

    fn pack(&self, buf: &mut ByteBuf, len: Option<usize>) {
        let n = len.map_or(Self::SIZE, |n| n.min(Self::SIZE));
        buf.append(&self.0.to_le_bytes()[..n]);
    }

    fn unpack(buf: &mut ByteBuf, len: Option<usize>) -> Result<Self, buf::Error> {
        let n = declared_len(len, Self::SIZE)?;
        let mut bytes = [0; 16];
        bytes[..n].copy_from_slice(buf.consume(n)?);
        Ok(Z2k(u128::from_le_bytes(bytes)))
    }
}

impl MacValue for Z2k {
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Z2k(rng.random())
    }
}

impl RingValue for Z2k {
    const K_BYTES: usize = (Self::K / 8) as usize;

    fn shift_k(self) -> Self {
        Z2k(self.0 << Self::K)
    }

    fn low_k(self) -> Self {
        Z2k(self.0 & u64::MAX as u128)
    }

    fn random_challenge<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Z2k(rng.random::<u64>() as u128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_opening_keeps_low_bits() {
        let x = Z2k::from((7u128 << 64) | 42);
        let mut buf = ByteBuf::new();
        x.pack(&mut buf, Some(Z2k::K_BYTES));
        assert_eq!(buf.len(), 8);
        assert_eq!(Z2k::unpack(&mut buf, Some(Z2k::K_BYTES)), Ok(x.low_k()));
        assert_eq!(x.low_k(), Z2k::from(42u64));
    }

    #[test]
    fn shift_clears_low_bits() {
        let r = Z2k::from(u128::MAX);
        assert_eq!(r.shift_k().low_k(), Z2k::default());
        assert_eq!((Z2k::from(5u64) + r.shift_k()).low_k(), Z2k::from(5u64));
    }
}
