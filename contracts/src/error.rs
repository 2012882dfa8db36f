//! Error types for the token sale.
//!
//! One enum per operation family. Every variant describes a rejected
//! operation that left state untouched: nothing in this crate reports a
//! partial success.

use thiserror::Error;

use crate::address::Address;

/// Errors from [`TokenLedger`](crate::token_ledger::TokenLedger) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The caller is not the ledger owner.
    #[error("unauthorized: only the ledger owner can mint")]
    Unauthorized,

    /// The recipient is the null address.
    #[error("invalid recipient: the null address cannot hold tokens")]
    InvalidRecipient,

    /// Mints and transfers must move a positive amount.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// A balance or the total supply would exceed `u128::MAX`.
    #[error("ledger overflow: crediting {amount} would exceed u128::MAX")]
    Overflow {
        /// The amount that was attempted.
        amount: u128,
    },

    /// The sender does not hold enough tokens.
    #[error("insufficient balance: account has {balance}, tried to move {amount}")]
    InsufficientBalance {
        /// Current balance of the account.
        balance: u128,
        /// Amount the caller tried to move.
        amount: u128,
    },
}

/// Errors from the host's value-forwarding mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The source account holds less value than the transfer requires.
    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds {
        /// Value held by the source account.
        available: u128,
        /// Value the transfer needed.
        required: u128,
    },

    /// The destination balance would overflow.
    #[error("value overflow while crediting the destination")]
    Overflow,

    /// The destination refused the transfer.
    #[error("transfer rejected by recipient {0}")]
    Rejected(Address),
}

/// Errors raised while constructing a [`TokenSale`](crate::token_sale::TokenSale).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    /// A required address was null. Carries the parameter name.
    #[error("invalid address: {0} must not be the null address")]
    InvalidAddress(&'static str),

    /// The sale window is empty or does not start in the future.
    #[error("invalid window: start {start}, end {end}, current counter {now}")]
    InvalidWindow {
        /// Requested start counter.
        start: u64,
        /// Requested end counter.
        end: u64,
        /// Counter observed at construction.
        now: u64,
    },

    /// Exchange rate or cap is zero. Carries the parameter name.
    #[error("invalid parameter: {0} must be greater than zero")]
    InvalidParameter(&'static str),
}

/// Errors raised by the purchase entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurchaseError {
    /// The counter is outside `[start, end]`.
    #[error("outside sale window: counter {now} not in [{start}, {end}]")]
    OutsideWindow {
        /// Counter at the time of the call.
        now: u64,
        /// First accepted counter.
        start: u64,
        /// Last accepted counter.
        end: u64,
    },

    /// The sale was finalized.
    #[error("sale already finalized")]
    AlreadyFinalized,

    /// The contribution carried no value.
    #[error("contribution must be greater than zero")]
    ZeroContribution,

    /// The purchase would push buyer-side issuance above the cap.
    #[error("cap exceeded: requested {requested} tokens, {remaining} remaining")]
    CapExceeded {
        /// Tokens the purchase would issue to the buyer.
        requested: u128,
        /// Tokens still available under the cap.
        remaining: u128,
    },

    /// Forwarding the contribution to the fund recipient failed.
    #[error("forwarding failed: {0}")]
    ForwardingFailed(#[source] TransferError),

    /// The ledger refused the staged credits.
    #[error("ledger rejected credit: {0}")]
    Ledger(#[from] LedgerError),
}

/// Errors raised by `finalize`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FinalizeError {
    /// The caller is not the sale's administrative owner.
    #[error("unauthorized: only the sale owner can finalize")]
    Unauthorized,

    /// The sale was already finalized.
    #[error("sale already finalized")]
    AlreadyFinalized,

    /// Neither the window has closed nor the cap been reached.
    #[error("sale still active: counter {now} <= end {end} and {tokens_sold} < cap {cap}")]
    SaleStillActive {
        /// Counter at the time of the call.
        now: u64,
        /// Last counter of the window.
        end: u64,
        /// Tokens sold so far.
        tokens_sold: u128,
        /// Issuance cap.
        cap: u128,
    },
}
