//! # Token Sale Contracts
//!
//! A fixed-window, capped token sale and the token ledger it controls.
//!
//! - **Token Ledger**: Balance ledger minted exclusively by its owner.
//! - **Token Sale**: Converts contributions into tokens at a fixed rate,
//!   mirrors every buyer credit to a reserve account, forwards value to the
//!   fund recipient, and finalizes one way once the window closes or the cap
//!   is reached.
//! - **Host seams**: The monotonic counter ([`clock::Clock`]) and the value
//!   mover ([`funds::ValueTransfer`]) are injected, and [`host::SaleHost`]
//!   serializes access across threads.
//!
//! ## Design Principles
//!
//! 1. All token and value arithmetic is checked. Amounts are `u128` because
//!    18-decimal base units outgrow `u64` quickly.
//! 2. An operation applies every effect or none. Ledger credits are staged
//!    and committed only after the value forward succeeds.
//! 3. Authority is explicit: the sale address is the only minter, and the
//!    owner address is checked on every `finalize`.
//! 4. Time is a counter handed in by the host, never the wall clock.

pub mod address;
pub mod clock;
pub mod config;
pub mod error;
pub mod funds;
pub mod host;
pub mod token_ledger;
pub mod token_sale;

pub use address::Address;
pub use clock::{Clock, ManualClock};
pub use config::SaleConfig;
pub use error::{ConstructionError, FinalizeError, LedgerError, PurchaseError, TransferError};
pub use funds::{ValueBank, ValueTransfer};
pub use host::SaleHost;
pub use token_ledger::TokenLedger;
pub use token_sale::{PurchaseReceipt, SaleEvent, SalePhase, SaleSnapshot, TokenSale};
