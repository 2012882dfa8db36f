//! # Token Sale Contract
//!
//! A fixed-window, capped sale. Contributions received while the counter is
//! inside `[start, end]` are converted into tokens at a fixed exchange rate.
//! Every purchase:
//!
//! 1. mints `contribution * exchange_rate` tokens to the beneficiary,
//! 2. mints the same amount again to the reserve recipient (the reserve
//!    mirror),
//! 3. adds the buyer-side amount to `tokens_sold`,
//! 4. forwards the contribution to the fund recipient.
//!
//! The four effects are one unit. Ledger credits are staged first, the value
//! is forwarded, and only then are the credits and the sold counter
//! committed. A failed forward leaves no trace.
//!
//! ## Lifecycle
//!
//! ```text
//!  Pending --(counter reaches start)--> Active --(counter passes end)--> Ended
//!                                         |                               |
//!                                         +--finalize (cap reached)--+    |
//!                                                                    v    v
//!                                                                  Finalized
//! ```
//!
//! `finalize` is restricted to the sale owner and is one-way. Note that the
//! cap bounds only the buyer side: with the reserve mirror, the ledger's
//! total supply is always twice `tokens_sold`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::address::Address;
use crate::clock::Clock;
use crate::config::SaleConfig;
use crate::error::{ConstructionError, FinalizeError, LedgerError, PurchaseError};
use crate::funds::ValueTransfer;
use crate::token_ledger::{StagedMint, TokenLedger};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where the sale stands relative to its window and finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalePhase {
    /// The window has not opened yet.
    Pending,
    /// Purchases are accepted.
    Active,
    /// The window has closed; waiting for the owner to finalize.
    Ended,
    /// Terminal. Nothing more can happen.
    Finalized,
}

impl std::fmt::Display for SalePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SalePhase::Pending => write!(f, "Pending"),
            SalePhase::Active => write!(f, "Active"),
            SalePhase::Ended => write!(f, "Ended"),
            SalePhase::Finalized => write!(f, "Finalized"),
        }
    }
}

/// Proof of a settled purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    /// Unique identifier for this purchase.
    pub receipt_id: Uuid,
    /// Account whose value was forwarded.
    pub sender: Address,
    /// Account credited with the purchased tokens.
    pub beneficiary: Address,
    /// Value forwarded to the fund recipient.
    pub contribution: u128,
    /// Tokens credited to the beneficiary.
    pub tokens: u128,
    /// Tokens mirrored to the reserve recipient.
    pub reserve_tokens: u128,
    /// Counter value at settlement.
    pub counter: u64,
    /// `tokens_sold` after this purchase.
    pub tokens_sold: u128,
}

/// Entries of the sale's append-only event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SaleEvent {
    /// A purchase settled.
    TokensIssued {
        beneficiary: Address,
        contribution: u128,
        tokens: u128,
        counter: u64,
    },
    /// A holder moved tokens to another account.
    Transferred {
        from: Address,
        to: Address,
        amount: u128,
        counter: u64,
    },
    /// The sale was finalized.
    Finalized { tokens_sold: u128, counter: u64 },
}

/// Read-only summary of the sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleSnapshot {
    pub phase: SalePhase,
    pub counter: u64,
    pub start: u64,
    pub end: u64,
    pub exchange_rate: u128,
    pub cap: u128,
    pub tokens_sold: u128,
    pub total_supply: u128,
    pub value_raised: u128,
    pub is_finalized: bool,
    pub sale_address: Address,
    pub ledger_address: Address,
}

// ---------------------------------------------------------------------------
// TokenSale
// ---------------------------------------------------------------------------

/// The sale controller. Owns the token ledger for its whole lifetime.
///
/// `C` is the host's monotonic counter and `V` the host's value-forwarding
/// mechanism. Every mutating method takes `&mut self`, so calls on one
/// instance are serialized; share it across threads through
/// [`SaleHost`](crate::host::SaleHost).
#[derive(Debug)]
pub struct TokenSale<C, V> {
    /// The sale's own address; the only minter of `ledger`.
    address: Address,
    /// Administrative authority allowed to finalize.
    owner: Address,
    config: SaleConfig,
    ledger: TokenLedger,
    tokens_sold: u128,
    value_raised: u128,
    is_finalized: bool,
    events: Vec<SaleEvent>,
    clock: C,
    funds: V,
}

impl<C: Clock, V: ValueTransfer> TokenSale<C, V> {
    /// Deploys a sale and the ledger it owns.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::InvalidAddress`] if either recipient is
    /// null, [`ConstructionError::InvalidWindow`] unless
    /// `now < start < end`, and [`ConstructionError::InvalidParameter`] for a
    /// zero exchange rate or cap.
    pub fn new(owner: Address, config: SaleConfig, clock: C, funds: V) -> Result<Self, ConstructionError> {
        if config.fund_recipient.is_null() {
            return Err(ConstructionError::InvalidAddress("fund_recipient"));
        }
        if config.reserve_recipient.is_null() {
            return Err(ConstructionError::InvalidAddress("reserve_recipient"));
        }

        let now = clock.now();
        if config.start <= now || config.end <= config.start {
            return Err(ConstructionError::InvalidWindow {
                start: config.start,
                end: config.end,
                now,
            });
        }

        if config.exchange_rate == 0 {
            return Err(ConstructionError::InvalidParameter("exchange_rate"));
        }
        if config.cap == 0 {
            return Err(ConstructionError::InvalidParameter("cap"));
        }

        let address = Address::derive(
            "token-sale",
            &[
                owner.as_bytes(),
                config.fund_recipient.as_bytes(),
                config.reserve_recipient.as_bytes(),
                &config.start.to_be_bytes(),
                &config.end.to_be_bytes(),
            ],
        );
        let ledger = TokenLedger::new(Address::derive("token-ledger", &[address.as_bytes()]), address);

        info!(
            sale = %address,
            ledger = %ledger.address(),
            start = config.start,
            end = config.end,
            exchange_rate = %config.exchange_rate,
            cap = %config.cap,
            "token sale deployed"
        );

        Ok(Self {
            address,
            owner,
            config,
            ledger,
            tokens_sold: 0,
            value_raised: 0,
            is_finalized: false,
            events: Vec::new(),
            clock,
            funds,
        })
    }

    /// Buys tokens for `beneficiary` with `contribution` value taken from
    /// `sender`.
    ///
    /// # Errors
    ///
    /// Preconditions are checked in order and the first failure is returned:
    /// [`PurchaseError::OutsideWindow`], [`PurchaseError::AlreadyFinalized`],
    /// [`PurchaseError::ZeroContribution`], [`PurchaseError::CapExceeded`],
    /// then [`PurchaseError::Ledger`] if the ledger refuses the credits and
    /// [`PurchaseError::ForwardingFailed`] if the value cannot be forwarded.
    /// On any error nothing changes.
    pub fn purchase_for(
        &mut self,
        sender: Address,
        beneficiary: Address,
        contribution: u128,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        let result = self.settle(sender, beneficiary, contribution);
        if let Err(e) = &result {
            debug!(%sender, %beneficiary, %contribution, error = %e, "purchase rejected");
        }
        result
    }

    /// Buys tokens for `sender` itself. Same rules as
    /// [`purchase_for`](Self::purchase_for).
    pub fn contribute(&mut self, sender: Address, contribution: u128) -> Result<PurchaseReceipt, PurchaseError> {
        self.purchase_for(sender, sender, contribution)
    }

    /// Closes the sale for good.
    ///
    /// # Errors
    ///
    /// Returns [`FinalizeError::Unauthorized`] unless `caller` is the owner,
    /// [`FinalizeError::AlreadyFinalized`] on a second call, and
    /// [`FinalizeError::SaleStillActive`] while the counter is at or before
    /// `end` and the cap has not been reached.
    pub fn finalize(&mut self, caller: &Address) -> Result<(), FinalizeError> {
        let now = match self.check_finalize(caller) {
            Ok(now) => now,
            Err(e) => {
                debug!(%caller, error = %e, "finalize rejected");
                return Err(e);
            }
        };

        self.is_finalized = true;
        self.events.push(SaleEvent::Finalized {
            tokens_sold: self.tokens_sold,
            counter: now,
        });
        info!(
            sale = %self.address,
            tokens_sold = %self.tokens_sold,
            total_supply = %self.ledger.total_supply(),
            counter = now,
            "token sale finalized"
        );
        Ok(())
    }

    /// Moves `amount` of `from`'s tokens to `to` on the sale's ledger.
    ///
    /// Transfers are open in every phase; they never touch `tokens_sold` or
    /// the supply.
    ///
    /// # Errors
    ///
    /// See [`TokenLedger::transfer`].
    pub fn transfer(&mut self, from: Address, to: Address, amount: u128) -> Result<(), LedgerError> {
        if let Err(e) = self.ledger.transfer(&from, to, amount) {
            debug!(%from, %to, %amount, error = %e, "transfer rejected");
            return Err(e);
        }

        let counter = self.clock.now();
        self.events.push(SaleEvent::Transferred {
            from,
            to,
            amount,
            counter,
        });
        info!(%from, %to, %amount, counter, "tokens transferred");
        Ok(())
    }

    fn settle(
        &mut self,
        sender: Address,
        beneficiary: Address,
        contribution: u128,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        let now = self.clock.now();
        let (tokens, staged) = self.stage_purchase(now, beneficiary, contribution)?;

        // The only fallible external effect. Nothing has been written yet.
        self.funds
            .forward(&sender, &self.config.fund_recipient, contribution)
            .map_err(PurchaseError::ForwardingFailed)?;

        // Bounded by the cap check in `stage_purchase`.
        let tokens_sold = self.tokens_sold + tokens;
        self.ledger.commit(staged);
        self.tokens_sold = tokens_sold;
        self.value_raised = self.value_raised.saturating_add(contribution);
        self.events.push(SaleEvent::TokensIssued {
            beneficiary,
            contribution,
            tokens,
            counter: now,
        });

        info!(
            %sender,
            %beneficiary,
            %contribution,
            %tokens,
            tokens_sold = %tokens_sold,
            counter = now,
            "tokens issued"
        );

        Ok(PurchaseReceipt {
            receipt_id: Uuid::new_v4(),
            sender,
            beneficiary,
            contribution,
            tokens,
            reserve_tokens: tokens,
            counter: now,
            tokens_sold,
        })
    }

    /// Runs every purchase precondition and stages the ledger credits.
    fn stage_purchase(
        &self,
        now: u64,
        beneficiary: Address,
        contribution: u128,
    ) -> Result<(u128, StagedMint), PurchaseError> {
        if now < self.config.start || now > self.config.end {
            return Err(PurchaseError::OutsideWindow {
                now,
                start: self.config.start,
                end: self.config.end,
            });
        }
        if self.is_finalized {
            return Err(PurchaseError::AlreadyFinalized);
        }
        if contribution == 0 {
            return Err(PurchaseError::ZeroContribution);
        }

        let remaining = self.remaining();
        let tokens = contribution
            .checked_mul(self.config.exchange_rate)
            .filter(|t| *t <= remaining)
            .ok_or(PurchaseError::CapExceeded {
                requested: contribution.saturating_mul(self.config.exchange_rate),
                remaining,
            })?;

        let staged = self.ledger.stage_mints(
            &self.address,
            &[(beneficiary, tokens), (self.config.reserve_recipient, tokens)],
        )?;

        Ok((tokens, staged))
    }

    /// Returns the counter value if the owner may finalize now.
    fn check_finalize(&self, caller: &Address) -> Result<u64, FinalizeError> {
        if *caller != self.owner {
            return Err(FinalizeError::Unauthorized);
        }
        if self.is_finalized {
            return Err(FinalizeError::AlreadyFinalized);
        }

        let now = self.clock.now();
        if now <= self.config.end && self.tokens_sold < self.config.cap {
            return Err(FinalizeError::SaleStillActive {
                now,
                end: self.config.end,
                tokens_sold: self.tokens_sold,
                cap: self.config.cap,
            });
        }
        Ok(now)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current phase, derived from the counter and the finalized flag.
    pub fn phase(&self) -> SalePhase {
        if self.is_finalized {
            return SalePhase::Finalized;
        }
        let now = self.clock.now();
        if now < self.config.start {
            SalePhase::Pending
        } else if now <= self.config.end {
            SalePhase::Active
        } else {
            SalePhase::Ended
        }
    }

    /// Buyer-side tokens issued so far.
    pub fn tokens_sold(&self) -> u128 {
        self.tokens_sold
    }

    /// Tokens still available under the cap.
    pub fn remaining(&self) -> u128 {
        self.config.cap.saturating_sub(self.tokens_sold)
    }

    /// Total value forwarded to the fund recipient.
    pub fn value_raised(&self) -> u128 {
        self.value_raised
    }

    pub fn is_finalized(&self) -> bool {
        self.is_finalized
    }

    /// The sale's own address (the ledger's minting authority).
    pub fn address(&self) -> Address {
        self.address
    }

    /// The administrative owner.
    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn ledger_address(&self) -> Address {
        self.ledger.address()
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    /// Token balance of `address` on the sale's ledger.
    pub fn balance_of(&self, address: &Address) -> u128 {
        self.ledger.balance_of(address)
    }

    pub fn total_supply(&self) -> u128 {
        self.ledger.total_supply()
    }

    pub fn config(&self) -> &SaleConfig {
        &self.config
    }

    pub fn events(&self) -> &[SaleEvent] {
        &self.events
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn funds(&self) -> &V {
        &self.funds
    }

    /// Mutable access to the value-transfer backend, for hosts that seed
    /// accounts. Does not touch any sale state.
    pub fn funds_mut(&mut self) -> &mut V {
        &mut self.funds
    }

    /// Serializable summary of the current state.
    pub fn snapshot(&self) -> SaleSnapshot {
        SaleSnapshot {
            phase: self.phase(),
            counter: self.clock.now(),
            start: self.config.start,
            end: self.config.end,
            exchange_rate: self.config.exchange_rate,
            cap: self.config.cap,
            tokens_sold: self.tokens_sold,
            total_supply: self.ledger.total_supply(),
            value_raised: self.value_raised,
            is_finalized: self.is_finalized,
            sale_address: self.address,
            ledger_address: self.ledger.address(),
        }
    }
}
