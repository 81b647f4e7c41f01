/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Proof-of-work targets and chain weight.
//!
//! A [`Target`] is a 256-bit unsigned number. A block meets a target when its [id](BlockID), read as a
//! big-endian integer, is not greater than the target. Lower targets are harder to meet, so the
//! [`Weight`] a block contributes to its chain is the exact rational `1 / target`. Weights are summed
//! along a chain without rounding, so two chains compare equal only if their sums are mathematically
//! equal.

use borsh::{BorshDeserialize, BorshSerialize};
use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use num_traits::{One, Zero};
use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::Add,
};

use super::basic::BlockID;

/// The difficulty a block id must satisfy.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Target([u8; 32]);

impl Target {
    /// The easiest possible target. Every block id meets it.
    pub const MAX: Target = Target([0xff; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    /// Convert `int` into a target, saturating at [`Target::MAX`].
    pub fn from_biguint(int: &BigUint) -> Target {
        let be_bytes = int.to_bytes_be();
        if be_bytes.len() > 32 {
            return Target::MAX;
        }
        let mut bytes = [0u8; 32];
        bytes[32 - be_bytes.len()..].copy_from_slice(&be_bytes);
        Target(bytes)
    }

    /// Whether a block with `id` satisfies this target.
    pub fn is_met_by(&self, id: &BlockID) -> bool {
        // Byte-wise comparison of equal-length big-endian arrays is numeric comparison.
        id.bytes() <= self.0
    }

    /// The weight a block meeting this target adds to its chain. A zero target is treated as one.
    pub fn inverse(&self) -> Weight {
        let denominator = BigInt::from(self.to_biguint().max(BigUint::one()));
        Weight(BigRational::new(BigInt::one(), denominator))
    }

    /// Multiply this target by `ratio`, rounding down and saturating at [`Target::MAX`].
    pub fn mul_ratio(&self, ratio: &BigRational) -> Target {
        let product = BigRational::from_integer(BigInt::from(self.to_biguint())) * ratio;
        match product.floor().to_integer().to_biguint() {
            Some(int) => Target::from_biguint(&int),
            None => Target::new([0; 32]),
        }
    }

    /// The target for the children of a block whose own target is `self`.
    ///
    /// The ratio `secs_passed / secs_expected` is clamped to `[max_down, max_up]` before being applied,
    /// and the result never exceeds `ceiling`. If `secs_expected` is zero the target is unchanged.
    pub fn adjusted(
        &self,
        secs_passed: u64,
        secs_expected: u64,
        max_up: &BigRational,
        max_down: &BigRational,
        ceiling: &Target,
    ) -> Target {
        if secs_expected == 0 {
            return (*self).min(*ceiling);
        }
        let ratio = BigRational::new(BigInt::from(secs_passed), BigInt::from(secs_expected));
        let clamped = if &ratio > max_up {
            max_up.clone()
        } else if &ratio < max_down {
            max_down.clone()
        } else {
            ratio
        };
        self.mul_ratio(&clamped).min(*ceiling)
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Debug for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Target({})", self)
    }
}

/// Cumulative work of a chain: the sum of the inverses of the targets met by its blocks.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Weight(BigRational);

impl Weight {
    pub fn zero() -> Weight {
        Weight(BigRational::zero())
    }

    pub fn ratio(&self) -> &BigRational {
        &self.0
    }
}

impl Add<&Weight> for &Weight {
    type Output = Weight;
    fn add(self, rhs: &Weight) -> Self::Output {
        Weight(&self.0 + &rhs.0)
    }
}

impl Display for Weight {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}
