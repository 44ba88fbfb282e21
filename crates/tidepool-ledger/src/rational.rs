// Copyright 2026 Tidepool Maintainers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Exact rational arithmetic for pool rates and account tallies.
//!
//! Rates are kept as exact rationals rather than scaled fixed-point so that
//! no division ever rounds mid-computation; results are identical across
//! replicas by construction. The single rounding point of the whole crate is
//! [`floor_to_amount`], applied when a reward is paid out.

use crate::Amount;
use num::{rational::Ratio, BigInt, BigUint, Integer};
use std::fmt;

/// Exact non-negative rational, used for pool-wide rates.
pub type SafeRatio = Ratio<BigUint>;

/// Exact signed rational, used for per-account reward tallies, which may
/// transiently dip below zero during withdrawal bookkeeping.
pub type SignedRatio = Ratio<BigInt>;

pub fn safe_ratio(numerator: Amount, denominator: Amount) -> SafeRatio {
    SafeRatio::new(BigUint::from(numerator), BigUint::from(denominator))
}

/// Product of a pool rate with a stake amount, as a signed tally increment.
pub fn rate_times(rate: &SafeRatio, amount: Amount) -> SignedRatio {
    SignedRatio::new(
        BigInt::from(rate.numer().clone()) * amount,
        BigInt::from(rate.denom().clone()),
    )
}

pub fn to_signed(rate: &SafeRatio) -> SignedRatio {
    SignedRatio::new(
        BigInt::from(rate.numer().clone()),
        BigInt::from(rate.denom().clone()),
    )
}

/// Round a reward down to a payable amount. The sub-unit remainder is the
/// caller's to keep accruing; it is never destroyed.
pub fn floor_to_amount(reward: &SignedRatio) -> Amount {
    Amount::try_from(reward.floor().to_integer())
        .unwrap_or_else(|_| unreachable!("computed rewards are never negative"))
}

/// Render a rational as `"numerator/denominator"`, the form used when pool
/// state is serialized for external storage.
pub fn render_ratio<T>(ratio: &Ratio<T>) -> String
where
    T: Clone + Integer + fmt::Display,
{
    format!("{}/{}", ratio.numer(), ratio.denom())
}

#[cfg(test)]
mod tests {
    use super::*;
    use num::traits::Zero;

    #[test]
    fn floor_keeps_the_remainder_out_of_the_payout() {
        let third = rate_times(&safe_ratio(1, 3), 100);
        assert_eq!(floor_to_amount(&third), 33);
    }

    #[test]
    fn rate_times_is_exact() {
        let rate = safe_ratio(10, 150);
        assert_eq!(rate_times(&rate, 50), to_signed(&safe_ratio(10, 3)));
    }

    #[test]
    fn render_reduced_form() {
        assert_eq!(render_ratio(&safe_ratio(10, 150)), "1/15");
        assert_eq!(render_ratio(&SafeRatio::zero()), "0/1");
    }
}
