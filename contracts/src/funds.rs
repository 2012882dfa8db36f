//! # Value Forwarding
//!
//! The sale does not hold contributed value. Each purchase forwards its
//! contribution to the fund recipient through a [`ValueTransfer`]
//! implementation supplied by the host. If that call fails, the purchase is
//! rolled back as a whole.
//!
//! [`ValueBank`] is the in-memory implementation used by the node host and
//! by tests: a flat map of value balances with checked arithmetic.

use std::collections::{HashMap, HashSet};

use crate::address::Address;
use crate::error::TransferError;

/// Moves value between accounts on behalf of the sale.
pub trait ValueTransfer: Send {
    /// Moves `amount` from `from` to `to`.
    ///
    /// Must be all-or-nothing: on error neither account changes.
    fn forward(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), TransferError>;
}

/// In-memory value accounts.
#[derive(Debug, Clone, Default)]
pub struct ValueBank {
    balances: HashMap<Address, u128>,
    /// Recipients that refuse incoming transfers.
    rejected: HashSet<Address>,
}

impl ValueBank {
    /// Creates an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `amount` to `account` out of thin air. Used to seed devnet
    /// accounts and test fixtures.
    pub fn deposit(&mut self, account: Address, amount: u128) -> Result<u128, TransferError> {
        let balance = self.balances.entry(account).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;
        Ok(*balance)
    }

    /// Value held by `account`, or 0.
    pub fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Makes every future transfer to `account` fail with
    /// [`TransferError::Rejected`].
    pub fn reject_recipient(&mut self, account: Address) {
        self.rejected.insert(account);
    }

    /// Lifts a previous [`reject_recipient`](Self::reject_recipient).
    pub fn accept_recipient(&mut self, account: &Address) {
        self.rejected.remove(account);
    }
}

impl ValueTransfer for ValueBank {
    fn forward(&mut self, from: &Address, to: &Address, amount: u128) -> Result<(), TransferError> {
        if self.rejected.contains(to) {
            return Err(TransferError::Rejected(*to));
        }

        let available = self.balance_of(from);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                available,
                required: amount,
            });
        }
        if from == to {
            return Ok(());
        }

        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;

        self.balances.insert(*from, available - amount);
        self.balances.insert(*to, credited);
        Ok(())
    }
}
