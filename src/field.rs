//! The prime field modulo the Mersenne prime `2^61 - 1`.

use std::{
    fmt,
    ops::{Add, AddAssign, Mul, Neg, Sub},
};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    buf::{self, ByteBuf},
    value::{MacValue, Value, declared_len},
};

/// An element of `GF(2^61 - 1)`, always kept in canonical form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fp(u64);

impl Fp {
    /// The modulus `2^61 - 1`.
    pub const MODULUS: u64 = (1 << 61) - 1;

    /// The additive identity.
    pub const ZERO: Fp = Fp(0);

    /// The multiplicative identity.
    pub const ONE: Fp = Fp(1);

    /// The canonical representative in `0..MODULUS`.
    pub fn value(self) -> u64 {
        self.0
    }

    fn reduce(x: u64) -> u64 {
        let reduced = (x & Self::MODULUS) + (x >> 61);
        if reduced >= Self::MODULUS {
            reduced - Self::MODULUS
        } else {
            reduced
        }
    }

    fn reduce128(x: u128) -> u64 {
        let lo = (x as u64) & Self::MODULUS;
        let mid = ((x >> 61) as u64) & Self::MODULUS;
        let hi = (x >> 122) as u64;
        Self::reduce(lo + mid + hi)
    }
}

impl From<u64> for Fp {
    fn from(x: u64) -> Self {
        Fp(Self::reduce(x))
    }
}

impl fmt::Display for Fp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Fp {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Fp(Self::reduce(self.0 + rhs.0))
    }
}

impl AddAssign for Fp {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Fp {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        if self.0 >= rhs.0 {
            Fp(self.0 - rhs.0)
        } else {
            Fp(Self::MODULUS - (rhs.0 - self.0))
        }
    }
}

impl Neg for Fp {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Fp::ZERO - self
    }
}

impl Mul for Fp {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Fp(Self::reduce128(self.0 as u128 * rhs.0 as u128))
    }
}

impl Value for Fp {
    const SIZE: usize = 8;

    fn pack(&self, buf: &mut ByteBuf, len: Option<usize>) {
        let n = len.map_or(Self::SIZE, |n| n.min(Self::SIZE));
        buf.append(&self.0.to_le_bytes()[..n]);
    }

    fn unpack(buf: &mut ByteBuf, len: Option<usize>) -> Result<Self, buf::Error> {
        let n = declared_len(len, Self::SIZE)?;
        let mut bytes = [0; 8];
        bytes[..n].copy_from_slice(buf.consume(n)?);
        let x = u64::from_le_bytes(bytes);
        if x >= Self::MODULUS {
            return Err(buf::Error::NonCanonical);
        }
        Ok(Fp(x))
    }
}

impl MacValue for Fp {
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Fp(rng.random_range(0..Self::MODULUS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_wraps_at_modulus() {
        let max = Fp::from(Fp::MODULUS - 1);
        assert_eq!(max + Fp::ONE, Fp::ZERO);
        assert_eq!(Fp::ZERO - Fp::ONE, max);
        assert_eq!(-Fp::ONE, max);
        assert_eq!(max * max, Fp::ONE);
        assert_eq!(Fp::from(Fp::MODULUS), Fp::ZERO);
    }

    #[test]
    fn unpack_rejects_non_canonical_bytes() {
        let mut buf = ByteBuf::from(u64::MAX.to_le_bytes().to_vec());
        assert_eq!(Fp::unpack(&mut buf, None), Err(buf::Error::NonCanonical));
    }

    #[test]
    fn declared_length_truncates_and_zero_extends() {
        let mut buf = ByteBuf::new();
        Fp::from(0x0102).pack(&mut buf, Some(2));
        assert_eq!(buf.as_bytes(), &[0x02, 0x01]);
        assert_eq!(Fp::unpack(&mut buf, Some(2)), Ok(Fp::from(0x0102)));
        assert!(matches!(
            Fp::unpack(&mut buf, Some(9)),
            Err(buf::Error::LengthTooLarge { declared: 9, .. })
        ));
    }
}
