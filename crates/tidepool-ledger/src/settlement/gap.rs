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

//! Gap settlement: deposits wait one distribution before earning.
//!
//! Newly deposited stake sits in a pending bucket until the next
//! distribution folds it into the active total, so no distribution ever
//! rewards stake that was not at risk for its whole epoch, and no withdrawal
//! can un-earn an already-distributed reward. Settling an account that
//! skipped N epochs needs the accumulator value at the epoch its pending
//! stake became active, which is what the per-epoch rate history records.

use crate::{
    ledger::LedgerError,
    rational::{floor_to_amount, rate_times, render_ratio, safe_ratio, SafeRatio, SignedRatio},
    settlement::Settlement,
    Amount, DistributionId,
};
use num::traits::Zero;
use serde::ser::SerializeStruct;
use std::collections::BTreeMap;
use tracing::debug;

const EVENT_TARGET: &str = "tidepool::ledger::gap";

/// Pool-wide accumulator state.
#[derive(Debug)]
#[cfg_attr(test, derive(Clone, PartialEq))]
pub struct Pool {
    /// Sum of all accounts' active (reward-earning) stake.
    pub total_stake: Amount,

    /// Stake deposited during the current epoch, not yet earning.
    pub total_pending_stake: Amount,

    /// Reward per unit of active stake, summed over every distribution so
    /// far. Never decreases.
    pub reward_per_token: SafeRatio,

    /// Accumulator value recorded at each past distribution, keyed by epoch.
    /// Append-only; needed to settle accounts that skipped epochs.
    pub reward_per_token_history: BTreeMap<DistributionId, SafeRatio>,

    /// Epoch counter, advanced by one per distribution.
    pub distribution_id: DistributionId,
}

impl Default for Pool {
    fn default() -> Self {
        Pool {
            total_stake: 0,
            total_pending_stake: 0,
            reward_per_token: SafeRatio::zero(),
            reward_per_token_history: BTreeMap::new(),
            distribution_id: 0,
        }
    }
}

impl Pool {
    /// Accumulator value at the epoch a record was last settled, i.e. the
    /// point its pending stake became active. An entry exists for every
    /// epoch a stale record can be stamped with, since staleness only arises
    /// from a distribution at that very epoch.
    fn activation_rate(&self, distribution_id: DistributionId) -> SafeRatio {
        self.reward_per_token_history
            .get(&distribution_id)
            .cloned()
            .unwrap_or_else(|| unreachable!("every settled epoch has a recorded rate"))
    }
}

impl serde::Serialize for Pool {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Pool", 5)?;
        s.serialize_field("total_stake", &self.total_stake)?;
        s.serialize_field("total_pending_stake", &self.total_pending_stake)?;
        s.serialize_field("reward_per_token", &render_ratio(&self.reward_per_token))?;
        s.serialize_field(
            "reward_per_token_history",
            &self
                .reward_per_token_history
                .iter()
                .map(|(epoch, rate)| (epoch.to_string(), render_ratio(rate)))
                .collect::<BTreeMap<_, _>>(),
        )?;
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

    /// Offset cancelling the accumulator growth that predates each stake
    /// activation, plus everything already paid out.
    pub reward_tally: SignedRatio,

    /// Stake deposited during the epoch of the last settlement, not yet
    /// active.
    pub pending_stake: Amount,

    /// Epoch at which this record was last settled.
    pub distribution_id: DistributionId,
}

impl Default for Account {
    fn default() -> Self {
        Account {
            stake: 0,
            reward_tally: SignedRatio::zero(),
            pending_stake: 0,
            distribution_id: 0,
        }
    }
}

impl serde::Serialize for Account {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Account", 4)?;
        s.serialize_field("stake", &self.stake)?;
        s.serialize_field("reward_tally", &render_ratio(&self.reward_tally))?;
        s.serialize_field("pending_stake", &self.pending_stake)?;
        s.serialize_field("distribution_id", &self.distribution_id)?;
        s.end()
    }
}

impl Account {
    /// Catch-up: fold pending stake into the active stake, crediting the
    /// tally at the historical rate of the epoch the stake activated, not
    /// today's.
    fn update_state(&mut self, pool: &Pool) {
        if self.distribution_id != pool.distribution_id {
            let activation_rate = pool.activation_rate(self.distribution_id);
            self.reward_tally += rate_times(&activation_rate, self.pending_stake);
            self.stake += self.pending_stake;
            self.pending_stake = 0;
            self.distribution_id = pool.distribution_id;
        }
    }

    /// Unclaimed reward before rounding, applying the same correction a
    /// settlement would, without persisting it.
    fn exact_reward(&self, pool: &Pool) -> SignedRatio {
        if self.distribution_id != pool.distribution_id {
            let activation_rate = pool.activation_rate(self.distribution_id);
            rate_times(&pool.reward_per_token, self.stake + self.pending_stake)
                - &self.reward_tally
                - rate_times(&activation_rate, self.pending_stake)
        } else {
            rate_times(&pool.reward_per_token, self.stake) - &self.reward_tally
        }
    }
}

/// Marker type implementing [`Settlement`] for this policy.
pub struct GapSettlement;

impl Settlement for GapSettlement {
    type Account = Account;
    type Pool = Pool;

    fn distribute(pool: &mut Pool, reward: Amount) -> Result<(), LedgerError> {
        // With no active stake there is nobody to reward; the epoch still
        // advances so pending stake activates.
        if pool.total_stake > 0 {
            pool.reward_per_token += safe_ratio(reward, pool.total_stake);
        }

        pool.reward_per_token_history
            .insert(pool.distribution_id, pool.reward_per_token.clone());
        pool.total_stake += pool.total_pending_stake;
        pool.total_pending_stake = 0;
        pool.distribution_id += 1;

        debug!(
            target: EVENT_TARGET,
            distribution_id = pool.distribution_id,
            reward,
            total_stake = pool.total_stake,
            accumulator = %render_ratio(&pool.reward_per_token),
            "distribute",
        );

        Ok(())
    }

    fn deposit_stake(account: &mut Account, pool: &mut Pool, amount: Amount) {
        account.update_state(pool);

        account.pending_stake += amount;
        pool.total_pending_stake += amount;
    }

    fn withdraw_stake(account: &mut Account, pool: &mut Pool, amount: Amount) {
        account.update_state(pool);

        // Pending stake is not earning anything yet and leaves for free.
        let from_pending = amount.min(account.pending_stake);
        account.pending_stake -= from_pending;
        pool.total_pending_stake -= from_pending;

        let from_active = amount - from_pending;
        account.stake -= from_active;
        account.reward_tally -= rate_times(&pool.reward_per_token, from_active);
        pool.total_stake -= from_active;
    }

    fn compute_reward(account: &Account, pool: &Pool) -> Amount {
        floor_to_amount(&account.exact_reward(pool))
    }

    fn claim_reward(account: &mut Account, pool: &Pool) -> Amount {
        account.update_state(pool);

        let paid = floor_to_amount(&account.exact_reward(pool));
        account.reward_tally += SignedRatio::from_integer(paid.into());
        paid
    }

    fn claimable_stake(account: &Account) -> Amount {
        account.stake + account.pending_stake
    }

    fn pool_stake(pool: &Pool) -> Amount {
        pool.total_stake + pool.total_pending_stake
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;

    const ALICE: &str = "alice";
    const BOB: &str = "bob";

    fn ledger() -> Ledger<&'static str, GapSettlement> {
        Ledger::new()
    }

    #[test]
    fn pending_stake_earns_from_the_next_epoch() {
        let mut ledger = ledger();

        ledger.deposit_stake(&ALICE, 1000);
        assert_eq!(ledger.compute_reward(&ALICE), 0);

        // Nothing is active yet: the reward has nobody to go to and is
        // skipped, but the epoch advances and the deposit activates.
        ledger.distribute(100).unwrap();
        assert_eq!(ledger.compute_reward(&ALICE), 0);

        ledger.distribute(100).unwrap();
        assert_eq!(ledger.compute_reward(&ALICE), 100);
        assert_eq!(ledger.withdraw_reward(&ALICE), 100);
        assert_eq!(ledger.withdraw_reward(&ALICE), 0);

        ledger.distribute(100).unwrap();
        assert_eq!(ledger.withdraw_reward(&ALICE), 100);
    }

    #[test]
    fn late_deposit_is_excluded_from_the_epoch_in_flight() {
        let mut ledger = ledger();

        ledger.deposit_stake(&ALICE, 100);
        ledger.deposit_stake(&BOB, 50);
        ledger.distribute(0).unwrap();

        ledger.withdraw_stake(&ALICE, 100).unwrap();
        ledger.deposit_stake(&ALICE, 50);
        ledger.distribute(10).unwrap();

        // Alice's re-deposit was pending while the 10 was distributed, so
        // the whole reward goes to Bob; nothing was un-earned or lost.
        assert_eq!(ledger.withdraw_reward(&ALICE), 0);
        assert_eq!(ledger.withdraw_reward(&BOB), 10);
    }

    #[test]
    fn settlement_over_a_multi_epoch_gap_uses_historical_rates() {
        let mut ledger = ledger();

        ledger.deposit_stake(&ALICE, 100);
        ledger.distribute(0).unwrap();

        ledger.deposit_stake(&BOB, 300);
        ledger.distribute(100).unwrap();
        ledger.distribute(100).unwrap();

        // Neither account was touched since its deposit. Alice earned the
        // full second distribution and a quarter of the third; Bob's stake
        // activated at the accumulator value of epoch 1, so he only earned
        // the third.
        assert_eq!(ledger.withdraw_reward(&ALICE), 125);
        assert_eq!(ledger.withdraw_reward(&BOB), 75);
    }

    #[test]
    fn withdrawal_draws_from_pending_stake_first() {
        let mut ledger = ledger();

        ledger.deposit_stake(&ALICE, 100);
        ledger.withdraw_stake(&ALICE, 30).unwrap();
        assert_eq!(ledger.total_stake(), 70);
        assert_eq!(ledger.pool().total_pending_stake, 70);

        ledger.distribute(0).unwrap();
        assert_eq!(ledger.pool().total_stake, 70);
        assert_eq!(ledger.pool().total_pending_stake, 0);

        ledger.deposit_stake(&ALICE, 50);
        ledger.withdraw_stake(&ALICE, 100).unwrap();

        // 50 came out of pending, the remaining 50 out of active stake.
        assert_eq!(ledger.pool().total_stake, 20);
        assert_eq!(ledger.pool().total_pending_stake, 0);
        assert_eq!(ledger.account_stake(&ALICE), 20);
    }

    #[test]
    fn history_records_one_entry_per_distribution() {
        let mut ledger = ledger();

        ledger.deposit_stake(&ALICE, 10);
        for _ in 0..5 {
            ledger.distribute(7).unwrap();
        }

        let history = &ledger.pool().reward_per_token_history;
        assert_eq!(history.len(), 5);
        assert_eq!(history[&0], SafeRatio::zero());
        assert_eq!(history[&4], safe_ratio(28, 10));
    }

    #[test]
    fn pool_state_serializes_with_exact_rates() {
        let mut ledger = ledger();
        ledger.deposit_stake(&ALICE, 30);
        ledger.distribute(0).unwrap();
        ledger.distribute(10).unwrap();

        let json = serde_json::to_value(ledger.pool()).unwrap();
        assert_eq!(json["total_stake"], 30);
        assert_eq!(json["total_pending_stake"], 0);
        assert_eq!(json["reward_per_token"], "1/3");
        assert_eq!(json["reward_per_token_history"]["0"], "0/1");
        assert_eq!(json["reward_per_token_history"]["1"], "1/3");
        assert_eq!(json["distribution_id"], 2);
    }
}
