//! # Serialized Sale Host
//!
//! [`SaleHost`] shares one [`TokenSale`] between threads and async handlers.
//! Each operation runs start to finish under a single lock, which gives the
//! same guarantee as a chain executing one transaction at a time: two
//! purchases never interleave, and an observer never sees a half-applied
//! purchase.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::address::Address;
use crate::clock::Clock;
use crate::error::{FinalizeError, LedgerError, PurchaseError};
use crate::funds::ValueTransfer;
use crate::token_sale::{PurchaseReceipt, SaleEvent, SaleSnapshot, TokenSale};

/// A cloneable handle to a lock-serialized sale.
pub struct SaleHost<C, V> {
    sale: Arc<Mutex<TokenSale<C, V>>>,
}

impl<C, V> Clone for SaleHost<C, V> {
    fn clone(&self) -> Self {
        Self {
            sale: Arc::clone(&self.sale),
        }
    }
}

impl<C: Clock, V: ValueTransfer> SaleHost<C, V> {
    /// Takes ownership of a deployed sale.
    pub fn new(sale: TokenSale<C, V>) -> Self {
        Self {
            sale: Arc::new(Mutex::new(sale)),
        }
    }

    /// See [`TokenSale::purchase_for`].
    pub fn purchase_for(
        &self,
        sender: Address,
        beneficiary: Address,
        contribution: u128,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        self.sale.lock().purchase_for(sender, beneficiary, contribution)
    }

    /// See [`TokenSale::contribute`].
    pub fn contribute(&self, sender: Address, contribution: u128) -> Result<PurchaseReceipt, PurchaseError> {
        self.sale.lock().contribute(sender, contribution)
    }

    /// See [`TokenSale::finalize`].
    pub fn finalize(&self, caller: &Address) -> Result<(), FinalizeError> {
        self.sale.lock().finalize(caller)
    }

    /// See [`TokenSale::transfer`].
    pub fn transfer(&self, from: Address, to: Address, amount: u128) -> Result<(), LedgerError> {
        self.sale.lock().transfer(from, to, amount)
    }

    pub fn snapshot(&self) -> SaleSnapshot {
        self.sale.lock().snapshot()
    }

    pub fn balance_of(&self, address: &Address) -> u128 {
        self.sale.lock().balance_of(address)
    }

    pub fn tokens_sold(&self) -> u128 {
        self.sale.lock().tokens_sold()
    }

    pub fn is_finalized(&self) -> bool {
        self.sale.lock().is_finalized()
    }

    pub fn events(&self) -> Vec<SaleEvent> {
        self.sale.lock().events().to_vec()
    }

    /// Runs `f` with exclusive access to the sale. Use for reads that must
    /// observe several values from the same state, or for host-level
    /// bookkeeping on the value backend.
    pub fn with_sale<R>(&self, f: impl FnOnce(&mut TokenSale<C, V>) -> R) -> R {
        let mut sale = self.sale.lock();
        f(&mut sale)
    }
}
