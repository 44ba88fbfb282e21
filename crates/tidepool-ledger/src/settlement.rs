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

pub mod gap;
pub mod immediate;

use crate::{ledger::LedgerError, Amount};

/// A settlement policy decides when deposited stake starts earning and how a
/// possibly-stale account record is reconciled with the pool accumulator
/// before use.
///
/// Every account-touching operation settles first, then applies its
/// mutation; [`Settlement::compute_reward`] applies the same epoch-aware
/// correction without persisting it. Implementations never iterate over
/// accounts: each operation touches one account and the pool, nothing else.
pub trait Settlement {
    /// Pool-wide accumulator state.
    type Pool: Default;

    /// Per-address bookkeeping, zero-initialised on first touch.
    type Account: Default;

    /// Split `reward` proportionally over the stake at risk and advance the
    /// distribution epoch. Touches no account record.
    fn distribute(pool: &mut Self::Pool, reward: Amount) -> Result<(), LedgerError>;

    /// Settle the account, then credit `amount` of new stake to it.
    fn deposit_stake(account: &mut Self::Account, pool: &mut Self::Pool, amount: Amount);

    /// Settle the account, then remove `amount` of stake. Callers must have
    /// checked `amount` against [`Settlement::claimable_stake`] beforehand.
    fn withdraw_stake(account: &mut Self::Account, pool: &mut Self::Pool, amount: Amount);

    /// The account's unclaimed reward, rounded down, without mutating
    /// anything.
    fn compute_reward(account: &Self::Account, pool: &Self::Pool) -> Amount;

    /// Settle the account, pay out its unclaimed reward (rounded down) and
    /// mark the paid portion as settled. Returns the amount paid.
    fn claim_reward(account: &mut Self::Account, pool: &Self::Pool) -> Amount;

    /// Total stake the account could withdraw right now, active and pending
    /// alike.
    fn claimable_stake(account: &Self::Account) -> Amount;

    /// Total stake held by the pool, active and pending alike.
    fn pool_stake(pool: &Self::Pool) -> Amount;
}
