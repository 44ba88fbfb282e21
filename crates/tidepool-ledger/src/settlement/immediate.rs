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

//! Immediate settlement with lost-reward recycling.
//!
//! Deposited stake counts towards the pool total right away, so a
//! distribution always rewards exactly the stake present at that instant.
//! The payout of the most recent distribution is withheld until the next
//! one: an account only collects a distribution's share once a later
//! distribution confirms the stake was kept at risk. The withheld portion is
//! `last_rate * rewarded_stake`, where `rewarded_stake` is the stake that
//! was present at the most recent distribution.
//!
//! Withdrawing stake that was already counted in the most recent
//! distribution forfeits its withheld share. Rather than letting that
//! reward vanish, it accumulates in the pool's `lost_reward` and rides
//! along the next distribution's rate, deferred exactly like fresh reward.

use crate::{
    ledger::LedgerError,
    rational::{floor_to_amount, rate_times, render_ratio, to_signed, SafeRatio, SignedRatio},
    settlement::Settlement,
    Amount, DistributionId,
};
use num::{traits::Zero, BigUint};
use serde::ser::SerializeStruct;
use tracing::debug;

const EVENT_TARGET: &str = "tidepool::ledger::immediate";

/// Pool-wide accumulator state.
#[derive(Debug)]
#[cfg_attr(test, derive(Clone, PartialEq))]
pub struct Pool {
    /// Sum of all accounts' active stake.
    pub total_stake: Amount,

    /// Reward per unit of stake, summed over every distribution so far.
    /// Never decreases.
    pub reward_per_token: SafeRatio,

    /// Rate increment of the most recent distribution; the per-token amount
    /// still withheld from every account.
    pub last_rate: SafeRatio,

    /// Reward forfeited by withdrawals of already-rewarded stake, waiting to
    /// be folded into the next distribution's rate. Kept exact so no
    /// fraction of it is ever dropped.
    pub lost_reward: SafeRatio,

    /// Epoch counter, advanced by one per distribution.
    pub distribution_id: DistributionId,
}

impl Default for Pool {
    fn default() -> Self {
        Pool {
            total_stake: 0,
            reward_per_token: SafeRatio::zero(),
            last_rate: SafeRatio::zero(),
            lost_reward: SafeRatio::zero(),
            distribution_id: 0,
        }
    }
}

impl serde::Serialize for Pool {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Pool", 5)?;
        s.serialize_field("total_stake", &self.total_stake)?;
        s.serialize_field("reward_per_token", &render_ratio(&self.reward_per_token))?;
        s.serialize_field("last_rate", &render_ratio(&self.last_rate))?;
        s.serialize_field("lost_reward", &render_ratio(&self.lost_reward))?;
        s.serialize_field("distribution_id", &self.distribution_id)?;
        s.end()
    }
}

/// Per-address bookkeeping.
#[derive(Debug)]
#[cfg_attr(test, derive(Clone, PartialEq))]
pub struct Account {
    /// Active stake as of the last settlement.
    pub stake: Amount,

    /// Offset cancelling the accumulator growth that predates each deposit,
    /// plus everything already paid out.
    pub reward_tally: SignedRatio,

    /// Portion of `stake` that was at risk in the most recent distribution.
    /// Meaningful only relative to `distribution_id`.
    pub rewarded_stake: Amount,

    /// Epoch at which this record was last settled.
    pub distribution_id: DistributionId,
}

impl Default for Account {
    fn default() -> Self {
        Account {
            stake: 0,
            reward_tally: SignedRatio::zero(),
            rewarded_stake: 0,
            distribution_id: 0,
        }
    }
}

impl serde::Serialize for Account {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Account", 4)?;
        s.serialize_field("stake", &self.stake)?;
        s.serialize_field("reward_tally", &render_ratio(&self.reward_tally))?;
        s.serialize_field("rewarded_stake", &self.rewarded_stake)?;
        s.serialize_field("distribution_id", &self.distribution_id)?;
        s.end()
    }
}

impl Account {
    /// Catch-up: once a distribution has happened since the last settlement,
    /// all of the account's current stake was at risk in it.
    fn update_rewarded_stake(&mut self, pool: &Pool) {
        if self.distribution_id != pool.distribution_id {
            self.rewarded_stake = self.stake;
            self.distribution_id = pool.distribution_id;
        }
    }

    /// The stake to weigh against `last_rate`: the same value a settlement
    /// would stamp, read without persisting it.
    fn effective_rewarded_stake(&self, pool: &Pool) -> Amount {
        if self.distribution_id != pool.distribution_id {
            self.stake
        } else {
            self.rewarded_stake
        }
    }

    /// Unclaimed reward before rounding, with the most recent distribution's
    /// share withheld.
    fn exact_reward(&self, pool: &Pool) -> SignedRatio {
        rate_times(&pool.reward_per_token, self.stake)
            - &self.reward_tally
            - rate_times(&pool.last_rate, self.effective_rewarded_stake(pool))
    }
}

/// Marker type implementing [`Settlement`] for this policy.
pub struct ImmediateSettlement;

impl Settlement for ImmediateSettlement {
    type Account = Account;
    type Pool = Pool;

    fn distribute(pool: &mut Pool, reward: Amount) -> Result<(), LedgerError> {
        if pool.total_stake == 0 {
            return Err(LedgerError::EmptyPool);
        }

        pool.last_rate = (SafeRatio::from_integer(BigUint::from(reward)) + &pool.lost_reward)
            / SafeRatio::from_integer(BigUint::from(pool.total_stake));
        pool.reward_per_token += pool.last_rate.clone();
        pool.lost_reward = SafeRatio::zero();
        pool.distribution_id += 1;

        debug!(
            target: EVENT_TARGET,
            distribution_id = pool.distribution_id,
            reward,
            total_stake = pool.total_stake,
            rate = %render_ratio(&pool.last_rate),
            "distribute",
        );

        Ok(())
    }

    fn deposit_stake(account: &mut Account, pool: &mut Pool, amount: Amount) {
        account.update_rewarded_stake(pool);

        account.stake += amount;
        account.reward_tally += rate_times(&pool.reward_per_token, amount);
        pool.total_stake += amount;
    }

    fn withdraw_stake(account: &mut Account, pool: &mut Pool, amount: Amount) {
        account.update_rewarded_stake(pool);

        // Stake deposited since the last distribution leaves for free; the
        // rest forfeits its withheld share, which goes back to the pool.
        let unrewarded = account.stake - account.rewarded_stake;
        let rewarded_amount = amount - amount.min(unrewarded);
        let lost = &pool.last_rate * SafeRatio::from_integer(BigUint::from(rewarded_amount));

        account.stake -= amount;
        account.reward_tally -= rate_times(&pool.reward_per_token, amount);
        account.reward_tally += to_signed(&lost);
        account.rewarded_stake -= rewarded_amount;

        pool.total_stake -= amount;
        pool.lost_reward += lost;
    }

    fn compute_reward(account: &Account, pool: &Pool) -> Amount {
        floor_to_amount(&account.exact_reward(pool))
    }

    fn claim_reward(account: &mut Account, pool: &Pool) -> Amount {
        account.update_rewarded_stake(pool);

        let paid = floor_to_amount(&account.exact_reward(pool));
        account.reward_tally += SignedRatio::from_integer(paid.into());
        paid
    }

    fn claimable_stake(account: &Account) -> Amount {
        account.stake
    }

    fn pool_stake(pool: &Pool) -> Amount {
        pool.total_stake
    }
}
