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

use crate::{settlement::Settlement, Amount};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::trace;

const EVENT_TARGET: &str = "tidepool::ledger";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Distributing over a pool with no active stake (immediate settlement
    /// only; gap settlement skips the reward and advances the epoch).
    #[error("cannot distribute rewards over an empty pool")]
    EmptyPool,

    /// Withdrawing more stake than the account holds. Raised before any
    /// state is touched.
    #[error("withdrawal of {requested} exceeds the claimable stake of {claimable}")]
    InsufficientStake {
        requested: Amount,
        claimable: Amount,
    },
}

/// The reward ledger of a single staking pool, generic over the settlement
/// policy and over an opaque, comparable address type.
///
/// Account records are created zero-initialised on first touch and never
/// destroyed; an account withdrawn to zero is reusable on redeposit. Every
/// account-touching operation settles the record against the pool
/// accumulator before mutating it, and every validation happens before any
/// mutation, so a failed call has no observable effect.
///
/// A ledger is a plain value: construct one per pool, persist its state
/// through [`Ledger::pool`] and [`Ledger::account`] as needed, and serialize
/// calls to it externally. It holds no locks and performs no I/O.
pub struct Ledger<A, S: Settlement> {
    pool: S::Pool,
    accounts: BTreeMap<A, S::Account>,
}

impl<A: Ord + Clone, S: Settlement> Default for Ledger<A, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Ord + Clone, S: Settlement> Ledger<A, S> {
    pub fn new() -> Self {
        Ledger {
            pool: S::Pool::default(),
            accounts: BTreeMap::new(),
        }
    }

    /// Split `reward` proportionally among the stake currently at risk and
    /// advance the distribution epoch.
    pub fn distribute(&mut self, reward: Amount) -> Result<(), LedgerError> {
        S::distribute(&mut self.pool, reward)
    }

    /// Credit `amount` of new stake to `address`. A zero amount is a no-op
    /// that still settles the account.
    pub fn deposit_stake(&mut self, address: &A, amount: Amount) {
        let account = self.accounts.entry(address.clone()).or_default();
        S::deposit_stake(account, &mut self.pool, amount);
    }

    /// Remove `amount` of stake from `address`, drawing from pending stake
    /// first where the policy distinguishes it.
    pub fn withdraw_stake(&mut self, address: &A, amount: Amount) -> Result<(), LedgerError> {
        let claimable = self
            .accounts
            .get(address)
            .map(S::claimable_stake)
            .unwrap_or_default();
        if amount > claimable {
            return Err(LedgerError::InsufficientStake {
                requested: amount,
                claimable,
            });
        }

        let account = self.accounts.entry(address.clone()).or_default();
        S::withdraw_stake(account, &mut self.pool, amount);
        Ok(())
    }

    /// The unclaimed reward of `address`, rounded down, without mutating
    /// anything. Unknown addresses read as zero-state records.
    pub fn compute_reward(&self, address: &A) -> Amount {
        self.accounts
            .get(address)
            .map(|account| S::compute_reward(account, &self.pool))
            .unwrap_or_default()
    }

    /// Pay out the unclaimed reward of `address`, rounded down, and mark it
    /// as paid. The sub-unit remainder stays on the account and keeps
    /// accruing.
    pub fn withdraw_reward(&mut self, address: &A) -> Amount {
        let account = self.accounts.entry(address.clone()).or_default();
        let paid = S::claim_reward(account, &self.pool);

        trace!(target: EVENT_TARGET, paid, "withdraw_reward");
        paid
    }

    /// Stake currently claimable by `address`, active and pending alike.
    pub fn account_stake(&self, address: &A) -> Amount {
        self.accounts
            .get(address)
            .map(S::claimable_stake)
            .unwrap_or_default()
    }

    /// Total stake held by the pool, active and pending alike.
    pub fn total_stake(&self) -> Amount {
        S::pool_stake(&self.pool)
    }

    /// Pool-wide state, e.g. for persistence by a storage collaborator.
    pub fn pool(&self) -> &S::Pool {
        &self.pool
    }

    /// The record for `address`, if it was ever touched.
    pub fn account(&self, address: &A) -> Option<&S::Account> {
        self.accounts.get(address)
    }
}

#[cfg(test)]
impl<A: Ord + Clone, S: Settlement> Clone for Ledger<A, S>
where
    S::Pool: Clone,
    S::Account: Clone,
{
    fn clone(&self) -> Self {
        Ledger {
            pool: self.pool.clone(),
            accounts: self.accounts.clone(),
        }
    }
}

#[cfg(test)]
impl<A: Ord, S: Settlement> PartialEq for Ledger<A, S>
where
    S::Pool: PartialEq,
    S::Account: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.pool == other.pool && self.accounts == other.accounts
    }
}
