//! # Sale Configuration & Constants
//!
//! Deployment-time constants for the sale and the [`SaleConfig`] that carries
//! the per-deployment parameters into [`TokenSale::new`](crate::token_sale::TokenSale::new).
//!
//! The reference cap is a fixed USD raise converted into token base units at
//! a fixed value-unit price:
//!
//! ```text
//! TOKEN_SALE_CAP = floor(USD_RAISE_CAP / VALUE_UNIT_PRICE_USD) * EXCHANGE_RATE * TOKEN_UNIT
//! ```

use serde::{Deserialize, Serialize};

use crate::address::Address;

// ---------------------------------------------------------------------------
// Token Denomination
// ---------------------------------------------------------------------------

/// Decimal places of the sale token.
pub const TOKEN_DECIMALS: u32 = 18;

/// One whole token in base units.
pub const TOKEN_UNIT: u128 = 10u128.pow(TOKEN_DECIMALS);

/// One whole value unit in its base units. Contributions are denominated in
/// base units, so the exchange rate applies to base units directly.
pub const VALUE_UNIT: u128 = 10u128.pow(18);

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Token base units credited per value base unit.
pub const EXCHANGE_RATE: u128 = 200;

/// USD price of one value unit used to size the cap.
pub const VALUE_UNIT_PRICE_USD: u128 = 227;

/// Total USD the sale is allowed to raise.
pub const USD_RAISE_CAP: u128 = 30_000_000;

/// Maximum cumulative buyer-side issuance, in token base units.
pub const TOKEN_SALE_CAP: u128 = (USD_RAISE_CAP / VALUE_UNIT_PRICE_USD) * EXCHANGE_RATE * TOKEN_UNIT;

// ---------------------------------------------------------------------------
// Host Timing
// ---------------------------------------------------------------------------

/// Default interval between counter ticks on the node host.
pub const DEFAULT_BLOCK_TIME_MS: u64 = 1_000;

// ---------------------------------------------------------------------------
// SaleConfig
// ---------------------------------------------------------------------------

/// Per-deployment sale parameters. Immutable once the sale is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleConfig {
    /// Receives every forwarded contribution.
    pub fund_recipient: Address,
    /// Receives the reserve mirror of every buyer credit.
    pub reserve_recipient: Address,
    /// First counter value at which purchases are accepted.
    pub start: u64,
    /// Last counter value at which purchases are accepted.
    pub end: u64,
    /// Token base units per value base unit.
    pub exchange_rate: u128,
    /// Cap on cumulative buyer-side issuance.
    pub cap: u128,
}

impl SaleConfig {
    /// Builds a config with the reference exchange rate and cap.
    pub fn new(fund_recipient: Address, reserve_recipient: Address, start: u64, end: u64) -> Self {
        Self {
            fund_recipient,
            reserve_recipient,
            start,
            end,
            exchange_rate: EXCHANGE_RATE,
            cap: TOKEN_SALE_CAP,
        }
    }

    /// Overrides the exchange rate.
    pub fn with_exchange_rate(mut self, exchange_rate: u128) -> Self {
        self.exchange_rate = exchange_rate;
        self
    }

    /// Overrides the cap.
    pub fn with_cap(mut self, cap: u128) -> Self {
        self.cap = cap;
        self
    }
}
