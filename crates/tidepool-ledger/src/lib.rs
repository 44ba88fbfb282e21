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

//! Constant-time reward distribution for staking pools.
//!
//! An operator periodically injects a reward that is split proportionally
//! among current stakers; stakers query or claim their accrued share. No
//! operation ever iterates over the set of stakers: a pool-wide
//! reward-per-token accumulator plus a per-account tally makes every
//! operation O(1) in time and space.
//!
//! Two interchangeable [`Settlement`] policies govern when stake starts
//! earning and how stale accounts are caught up:
//!
//! - [`ImmediateSettlement`]: stake counts towards the pool total from the
//!   moment it is deposited; the payout of the most recent distribution is
//!   withheld until the next one, and reward forfeited by early withdrawal
//!   of already-rewarded stake is recycled into the next distribution.
//! - [`GapSettlement`]: newly deposited stake waits in a pending bucket
//!   until the next distribution folds it into the active total, so no
//!   withdrawal can ever un-earn an already-distributed reward.
//!
//! The ledger is a pure, sequential state machine: it performs no I/O,
//! holds no locks and assumes a single logical writer per call. Transport,
//! persistence, authorization and fund movement are the host's concern.

pub mod ledger;
pub mod rational;
pub mod settlement;

pub use ledger::{Ledger, LedgerError};
pub use settlement::{gap::GapSettlement, immediate::ImmediateSettlement, Settlement};

/// Stake and reward quantities, in the pool's smallest indivisible unit.
pub type Amount = u64;

/// Identifier of a single `distribute` call, advanced by exactly one per
/// distribution. Staleness of an account is decided by comparing its stamp
/// against the pool's, never by wall-clock time.
pub type DistributionId = u64;
