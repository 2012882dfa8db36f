//! # Token Ledger
//!
//! The balance ledger for the sale token. Exactly one address, the owner,
//! can mint; the owner is fixed when the ledger is created and is never
//! transferred. Holders can move tokens between themselves with
//! [`TokenLedger::transfer`].
//!
//! ## Invariants
//!
//! - `total_supply` equals the sum of all balances, exactly, at every
//!   observable point.
//! - Every mutation uses checked arithmetic and either applies fully or
//!   not at all.
//!
//! ## Staged minting
//!
//! [`TokenLedger::stage_mints`] validates a batch of mints and computes the
//! resulting balances without touching the ledger. The caller can then run
//! fallible side effects and only [`commit`](TokenLedger::commit) when they
//! all succeed. Because staging borrows the ledger immutably and committing
//! borrows it mutably, nothing can slip in between the two through the same
//! owner.

use std::collections::{BTreeMap, HashMap};

use crate::address::Address;
use crate::error::LedgerError;

/// A validated, not-yet-applied batch of mints.
///
/// Holds the post-mint balance of every touched account and the post-mint
/// supply. Produced by [`TokenLedger::stage_mints`], consumed by
/// [`TokenLedger::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a staged mint does nothing until committed"]
pub struct StagedMint {
    balances: BTreeMap<Address, u128>,
    total_supply: u128,
    minted: u128,
}

impl StagedMint {
    /// Total amount this batch adds to the supply.
    pub fn minted(&self) -> u128 {
        self.minted
    }

    /// Balance `account` will hold once committed, if the batch touches it.
    pub fn balance_after(&self, account: &Address) -> Option<u128> {
        self.balances.get(account).copied()
    }
}

/// The sale token's balance ledger.
#[derive(Debug, Clone)]
pub struct TokenLedger {
    /// The ledger's own address.
    address: Address,
    /// The only address allowed to mint.
    owner: Address,
    /// Per-holder balances. Absent means zero.
    balances: HashMap<Address, u128>,
    /// Sum of all balances.
    total_supply: u128,
}

impl TokenLedger {
    /// Creates an empty ledger at `address`, mintable only by `owner`.
    pub fn new(address: Address, owner: Address) -> Self {
        Self {
            address,
            owner,
            balances: HashMap::new(),
            total_supply: 0,
        }
    }

    /// Mints `amount` new tokens to `recipient`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] if `caller` is not the owner,
    /// [`LedgerError::InvalidRecipient`] for the null address,
    /// [`LedgerError::ZeroAmount`] for a zero amount, and
    /// [`LedgerError::Overflow`] if the balance or supply would overflow.
    pub fn mint(&mut self, caller: &Address, recipient: Address, amount: u128) -> Result<(), LedgerError> {
        let staged = self.stage_mints(caller, &[(recipient, amount)])?;
        self.commit(staged);
        Ok(())
    }

    /// Validates a batch of mints without applying it.
    ///
    /// Each entry is checked exactly as [`mint`](Self::mint) would check it.
    /// A recipient appearing more than once accumulates, so overflow is
    /// detected across the whole batch.
    pub fn stage_mints(
        &self,
        caller: &Address,
        mints: &[(Address, u128)],
    ) -> Result<StagedMint, LedgerError> {
        if *caller != self.owner {
            return Err(LedgerError::Unauthorized);
        }

        let mut balances = BTreeMap::new();
        let mut total_supply = self.total_supply;
        let mut minted: u128 = 0;

        for &(recipient, amount) in mints {
            if recipient.is_null() {
                return Err(LedgerError::InvalidRecipient);
            }
            if amount == 0 {
                return Err(LedgerError::ZeroAmount);
            }

            let current = balances
                .get(&recipient)
                .copied()
                .unwrap_or_else(|| self.balance_of(&recipient));
            let next = current
                .checked_add(amount)
                .ok_or(LedgerError::Overflow { amount })?;
            total_supply = total_supply
                .checked_add(amount)
                .ok_or(LedgerError::Overflow { amount })?;
            minted = minted
                .checked_add(amount)
                .ok_or(LedgerError::Overflow { amount })?;
            balances.insert(recipient, next);
        }

        Ok(StagedMint {
            balances,
            total_supply,
            minted,
        })
    }

    /// Applies a batch produced by [`stage_mints`](Self::stage_mints) on this
    /// ledger.
    ///
    /// The batch carries absolute post-mint balances, so it must be committed
    /// before any other mutation of the ledger.
    pub fn commit(&mut self, staged: StagedMint) {
        for (account, balance) in staged.balances {
            self.balances.insert(account, balance);
        }
        self.total_supply = staged.total_supply;
    }

    /// Moves `amount` tokens from `from` to `to`.
    ///
    /// Supply is unchanged. Moving tokens to oneself succeeds without effect.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRecipient`] for the null address,
    /// [`LedgerError::ZeroAmount`] for a zero amount, and
    /// [`LedgerError::InsufficientBalance`] if `from` holds less than `amount`.
    pub fn transfer(&mut self, from: &Address, to: Address, amount: u128) -> Result<(), LedgerError> {
        if to.is_null() {
            return Err(LedgerError::InvalidRecipient);
        }
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }

        let balance = self.balance_of(from);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance { balance, amount });
        }
        if *from == to {
            return Ok(());
        }

        // Cannot overflow: `to` and `from` together hold at most total_supply.
        let credited = self.balance_of(&to) + amount;
        self.balances.insert(*from, balance - amount);
        self.balances.insert(to, credited);
        Ok(())
    }

    /// Returns the balance of `address`, or 0.
    pub fn balance_of(&self, address: &Address) -> u128 {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Returns the sum of all balances.
    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    /// Returns the minting authority.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Returns the ledger's own address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Number of accounts with a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.values().filter(|b| **b > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Address = Address::from_low_u8(0xee);
    const ALICE: Address = Address::from_low_u8(1);
    const BOB: Address = Address::from_low_u8(2);

    fn ledger() -> TokenLedger {
        TokenLedger::new(Address::from_low_u8(0xaa), OWNER)
    }

    #[test]
    fn mint_increases_supply_and_balance() {
        let mut ledger = ledger();
        ledger.mint(&OWNER, ALICE, 1_000_000).unwrap();
        assert_eq!(ledger.total_supply(), 1_000_000);
        assert_eq!(ledger.balance_of(&ALICE), 1_000_000);
        assert_eq!(ledger.holder_count(), 1);
    }

    #[test]
    fn mint_by_non_owner_rejected() {
        let mut ledger = ledger();
        assert_eq!(
            ledger.mint(&ALICE, ALICE, 100),
            Err(LedgerError::Unauthorized)
        );
        assert_eq!(ledger.total_supply(), 0);
    }

    #[test]
    fn mint_to_null_rejected() {
        let mut ledger = ledger();
        assert_eq!(
            ledger.mint(&OWNER, Address::ZERO, 100),
            Err(LedgerError::InvalidRecipient)
        );
    }

    #[test]
    fn zero_mint_rejected() {
        let mut ledger = ledger();
        assert_eq!(ledger.mint(&OWNER, ALICE, 0), Err(LedgerError::ZeroAmount));
    }

    #[test]
    fn mint_overflow_rejected() {
        let mut ledger = ledger();
        ledger.mint(&OWNER, ALICE, u128::MAX).unwrap();
        assert_eq!(
            ledger.mint(&OWNER, BOB, 1),
            Err(LedgerError::Overflow { amount: 1 })
        );
        assert_eq!(ledger.balance_of(&BOB), 0);
        assert_eq!(ledger.total_supply(), u128::MAX);
    }

    #[test]
    fn staging_does_not_mutate_until_commit() {
        let mut ledger = ledger();
        let staged = ledger
            .stage_mints(&OWNER, &[(ALICE, 10), (BOB, 10)])
            .unwrap();
        assert_eq!(staged.minted(), 20);
        assert_eq!(staged.balance_after(&ALICE), Some(10));
        assert_eq!(ledger.total_supply(), 0);
        assert_eq!(ledger.balance_of(&ALICE), 0);

        ledger.commit(staged);
        assert_eq!(ledger.total_supply(), 20);
        assert_eq!(ledger.balance_of(&BOB), 10);
    }

    #[test]
    fn staging_accumulates_repeated_recipient() {
        let mut ledger = ledger();
        ledger.mint(&OWNER, ALICE, 5).unwrap();
        let staged = ledger
            .stage_mints(&OWNER, &[(ALICE, 10), (ALICE, 10)])
            .unwrap();
        assert_eq!(staged.balance_after(&ALICE), Some(25));
        ledger.commit(staged);
        assert_eq!(ledger.balance_of(&ALICE), 25);
        assert_eq!(ledger.total_supply(), 25);
    }

    #[test]
    fn staging_rejects_whole_batch_on_any_bad_entry() {
        let ledger = ledger();
        assert_eq!(
            ledger.stage_mints(&OWNER, &[(ALICE, 10), (Address::ZERO, 10)]),
            Err(LedgerError::InvalidRecipient)
        );
    }

    #[test]
    fn transfer_moves_tokens_without_changing_supply() {
        let mut ledger = ledger();
        ledger.mint(&OWNER, ALICE, 100).unwrap();
        ledger.transfer(&ALICE, BOB, 30).unwrap();
        assert_eq!(ledger.balance_of(&ALICE), 70);
        assert_eq!(ledger.balance_of(&BOB), 30);
        assert_eq!(ledger.total_supply(), 100);
    }

    #[test]
    fn transfer_more_than_balance_rejected() {
        let mut ledger = ledger();
        ledger.mint(&OWNER, ALICE, 100).unwrap();
        assert_eq!(
            ledger.transfer(&ALICE, BOB, 200),
            Err(LedgerError::InsufficientBalance {
                balance: 100,
                amount: 200
            })
        );
        assert_eq!(ledger.balance_of(&ALICE), 100);
    }

    #[test]
    fn transfer_to_null_rejected() {
        let mut ledger = ledger();
        ledger.mint(&OWNER, ALICE, 100).unwrap();
        assert_eq!(
            ledger.transfer(&ALICE, Address::ZERO, 1),
            Err(LedgerError::InvalidRecipient)
        );
    }

    #[test]
    fn absent_account_has_zero_balance() {
        let ledger = ledger();
        assert_eq!(ledger.balance_of(&BOB), 0);
        assert_eq!(ledger.holder_count(), 0);
    }
}
