//! Integration tests for the token sale contract.
//!
//! These tests drive the sale through its whole lifecycle with a manual
//! counter clock and an in-memory value bank: construction checks, window
//! enforcement, cap enforcement, multi-buyer accounting, finalization, and
//! the all-or-nothing settlement of every purchase.

use tokensale_contracts::config::{EXCHANGE_RATE, TOKEN_SALE_CAP, VALUE_UNIT};
use tokensale_contracts::{
    Address, Clock, ConstructionError, FinalizeError, LedgerError, ManualClock, PurchaseError, SaleConfig, SalePhase,
    TokenSale, TransferError, ValueBank, ValueTransfer,
};

const OWNER: Address = Address::from_low_u8(0xa0);
const FUND: Address = Address::from_low_u8(0xa8);
const RESERVE: Address = Address::from_low_u8(0xa9);

/// Offsets of the window relative to the counter at deployment.
const START_FROM: u64 = 10;
const END_TO: u64 = 30;

/// Counter at deployment.
const GENESIS: u64 = 1_000;

type Sale = TokenSale<ManualClock, ValueBank>;

fn buyer(n: u8) -> Address {
    Address::from_low_u8(n)
}

/// Helper: a bank where buyers 1..=5 each hold `per_buyer` value.
fn funded_bank(per_buyer: u128) -> ValueBank {
    let mut bank = ValueBank::new();
    for n in 1..=5 {
        bank.deposit(buyer(n), per_buyer).unwrap();
    }
    bank
}

/// Helper: deploys a sale with the reference rate and the given cap.
fn deploy(cap: u128, bank: ValueBank) -> (Sale, ManualClock) {
    let clock = ManualClock::new(GENESIS);
    let config = SaleConfig::new(FUND, RESERVE, GENESIS + START_FROM, GENESIS + END_TO).with_cap(cap);
    let sale = TokenSale::new(OWNER, config, clock.clone(), bank).unwrap();
    (sale, clock)
}

/// Helper: deploys the reference sale and moves the counter to its start.
fn active_reference_sale() -> (Sale, ManualClock) {
    let (sale, clock) = deploy(TOKEN_SALE_CAP, funded_bank(200_000 * VALUE_UNIT));
    clock.set(GENESIS + START_FROM);
    (sale, clock)
}

/// Checks every observable effect of one purchase against the state before it.
fn buy_and_verify(sale: &mut Sale, from: Address, value: u128) {
    let tokens = value * EXCHANGE_RATE;

    let fund_before = sale.funds().balance_of(&FUND);
    let reserve_before = sale.balance_of(&RESERVE);
    let buyer_value_before = sale.funds().balance_of(&from);
    let buyer_tokens_before = sale.balance_of(&from);
    let sold_before = sale.tokens_sold();

    let receipt = sale.contribute(from, value).unwrap();

    assert_eq!(receipt.tokens, tokens);
    assert_eq!(receipt.tokens_sold, sold_before + tokens);
    assert_eq!(sale.tokens_sold(), sold_before + tokens);
    assert!(sale.tokens_sold() <= sale.config().cap);
    assert_eq!(sale.funds().balance_of(&FUND), fund_before + value);
    assert_eq!(sale.balance_of(&RESERVE), reserve_before + tokens);
    assert_eq!(sale.funds().balance_of(&from), buyer_value_before - value);
    assert_eq!(sale.balance_of(&from), buyer_tokens_before + tokens);
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[test]
fn construction_requires_fund_recipient() {
    let clock = ManualClock::new(GENESIS);
    let config = SaleConfig::new(Address::ZERO, RESERVE, GENESIS + 10, GENESIS + 100);
    assert_eq!(
        TokenSale::new(OWNER, config, clock, ValueBank::new()).unwrap_err(),
        ConstructionError::InvalidAddress("fund_recipient")
    );
}

#[test]
fn construction_requires_reserve_recipient() {
    let clock = ManualClock::new(GENESIS);
    let config = SaleConfig::new(FUND, Address::ZERO, GENESIS + 10, GENESIS + 100);
    assert_eq!(
        TokenSale::new(OWNER, config, clock, ValueBank::new()).unwrap_err(),
        ConstructionError::InvalidAddress("reserve_recipient")
    );
}

#[test]
fn construction_requires_future_start() {
    for start in [GENESIS - 1, GENESIS] {
        let clock = ManualClock::new(GENESIS);
        let config = SaleConfig::new(FUND, RESERVE, start, GENESIS + 200);
        assert!(matches!(
            TokenSale::new(OWNER, config, clock, ValueBank::new()),
            Err(ConstructionError::InvalidWindow { .. })
        ));
    }
}

#[test]
fn construction_requires_end_after_start() {
    for end in [GENESIS - 1, GENESIS + 100] {
        let clock = ManualClock::new(GENESIS);
        let config = SaleConfig::new(FUND, RESERVE, GENESIS + 100, end);
        assert!(matches!(
            TokenSale::new(OWNER, config, clock, ValueBank::new()),
            Err(ConstructionError::InvalidWindow { .. })
        ));
    }
}

#[test]
fn construction_rejects_zero_rate_or_cap() {
    let config = SaleConfig::new(FUND, RESERVE, GENESIS + 10, GENESIS + 100);
    assert_eq!(
        TokenSale::new(
            OWNER,
            config.clone().with_exchange_rate(0),
            ManualClock::new(GENESIS),
            ValueBank::new()
        )
        .unwrap_err(),
        ConstructionError::InvalidParameter("exchange_rate")
    );
    assert_eq!(
        TokenSale::new(OWNER, config.with_cap(0), ManualClock::new(GENESIS), ValueBank::new()).unwrap_err(),
        ConstructionError::InvalidParameter("cap")
    );
}

#[test]
fn fresh_sale_is_pending_and_empty() {
    let (sale, _) = deploy(TOKEN_SALE_CAP, ValueBank::new());
    assert_eq!(sale.tokens_sold(), 0);
    assert!(!sale.is_finalized());
    assert_eq!(sale.phase(), SalePhase::Pending);
    assert_eq!(sale.total_supply(), 0);
    assert_eq!(sale.owner(), OWNER);
    assert_eq!(sale.ledger().owner(), sale.address());
}

// ---------------------------------------------------------------------------
// Window & State Enforcement
// ---------------------------------------------------------------------------

#[test]
fn purchase_before_start_fails() {
    let (mut sale, clock) = deploy(TOKEN_SALE_CAP, funded_bank(VALUE_UNIT));
    clock.set(GENESIS + START_FROM - 1);
    assert!(matches!(
        sale.contribute(buyer(1), 1_000),
        Err(PurchaseError::OutsideWindow { .. })
    ));
    assert!(matches!(
        sale.purchase_for(buyer(1), buyer(2), 1_000),
        Err(PurchaseError::OutsideWindow { .. })
    ));
}

#[test]
fn purchase_after_end_fails() {
    let (mut sale, clock) = deploy(TOKEN_SALE_CAP, funded_bank(VALUE_UNIT));
    clock.set(GENESIS + END_TO + 1);
    assert_eq!(sale.phase(), SalePhase::Ended);
    assert!(matches!(
        sale.contribute(buyer(1), 1_000),
        Err(PurchaseError::OutsideWindow { .. })
    ));
}

#[test]
fn window_bounds_are_inclusive() {
    let (mut sale, clock) = deploy(TOKEN_SALE_CAP, funded_bank(VALUE_UNIT));
    clock.set(GENESIS + START_FROM);
    sale.contribute(buyer(1), 1_000).unwrap();
    clock.set(GENESIS + END_TO);
    sale.contribute(buyer(1), 1_000).unwrap();
    assert_eq!(sale.tokens_sold(), 2 * 1_000 * EXCHANGE_RATE);
}

#[test]
fn purchase_after_finalize_fails() {
    let (mut sale, clock) = deploy(1_000 * EXCHANGE_RATE, funded_bank(VALUE_UNIT));
    clock.set(GENESIS + START_FROM);
    sale.contribute(buyer(1), 1_000).unwrap();
    sale.finalize(&OWNER).unwrap();
    // Still inside the window, but finalized.
    assert_eq!(sale.contribute(buyer(1), 1), Err(PurchaseError::AlreadyFinalized));
}

#[test]
fn zero_contribution_fails() {
    let (mut sale, _) = active_reference_sale();
    assert_eq!(sale.contribute(buyer(1), 0), Err(PurchaseError::ZeroContribution));
    assert_eq!(
        sale.purchase_for(buyer(1), buyer(2), 0),
        Err(PurchaseError::ZeroContribution)
    );
}

// ---------------------------------------------------------------------------
// Cap Enforcement
// ---------------------------------------------------------------------------

#[test]
fn exact_cap_purchase_succeeds_and_allows_early_finalize() {
    let (mut sale, clock) = active_reference_sale();
    let contribution = TOKEN_SALE_CAP / EXCHANGE_RATE;
    sale.contribute(buyer(3), contribution).unwrap();

    assert_eq!(sale.tokens_sold(), TOKEN_SALE_CAP);
    assert!(clock.now() < GENESIS + END_TO);
    sale.finalize(&OWNER).unwrap();
    assert!(sale.is_finalized());
}

#[test]
fn over_cap_purchase_fails_with_zero_state_change() {
    let (mut sale, _) = active_reference_sale();
    let contribution = TOKEN_SALE_CAP / EXCHANGE_RATE + 1_000;

    let snapshot = sale.snapshot();
    let result = sale.contribute(buyer(3), contribution);

    assert!(matches!(result, Err(PurchaseError::CapExceeded { .. })));
    assert_eq!(sale.snapshot(), snapshot);
    assert_eq!(sale.balance_of(&buyer(3)), 0);
    assert_eq!(sale.balance_of(&RESERVE), 0);
    assert_eq!(sale.funds().balance_of(&FUND), 0);
    assert_eq!(sale.funds().balance_of(&buyer(3)), 200_000 * VALUE_UNIT);
}

#[test]
fn cap_reached_in_four_quarters() {
    let (mut sale, _) = active_reference_sale();
    let quarter = TOKEN_SALE_CAP / EXCHANGE_RATE / 4;
    for _ in 0..4 {
        buy_and_verify(&mut sale, buyer(3), quarter);
    }
    assert_eq!(sale.tokens_sold(), quarter * 4 * EXCHANGE_RATE);
    assert!(matches!(
        sale.contribute(buyer(3), TOKEN_SALE_CAP / EXCHANGE_RATE),
        Err(PurchaseError::CapExceeded { .. })
    ));
}

#[test]
fn purchase_after_cap_reached_fails() {
    let (mut sale, _) = active_reference_sale();
    sale.contribute(buyer(3), TOKEN_SALE_CAP / EXCHANGE_RATE).unwrap();
    assert_eq!(
        sale.contribute(buyer(1), 1),
        Err(PurchaseError::CapExceeded {
            requested: EXCHANGE_RATE,
            remaining: 0
        })
    );
}

// ---------------------------------------------------------------------------
// Multi-Buyer Accounting
// ---------------------------------------------------------------------------

#[test]
fn repeated_and_distinct_buyers_accumulate() {
    let (mut sale, _) = active_reference_sale();
    let orders = [
        (buyer(1), VALUE_UNIT),
        (buyer(1), VALUE_UNIT),
        (buyer(1), VALUE_UNIT),
        (buyer(2), 150 * VALUE_UNIT),
    ];
    for (from, value) in orders {
        buy_and_verify(&mut sale, from, value);
    }
    assert_eq!(sale.balance_of(&buyer(1)), 3 * VALUE_UNIT * EXCHANGE_RATE);
    assert_eq!(sale.balance_of(&buyer(2)), 150 * VALUE_UNIT * EXCHANGE_RATE);
}

#[test]
fn mixed_fractional_orders_accumulate() {
    let (mut sale, _) = active_reference_sale();
    let milli = VALUE_UNIT / 1_000;
    let orders = [
        (buyer(1), VALUE_UNIT),
        (buyer(2), 900 * milli),
        (buyer(3), 200 * VALUE_UNIT),
        (buyer(2), 50 * VALUE_UNIT),
        (buyer(4), milli),
        (buyer(5), 12_250 * milli),
        (buyer(2), 110 * milli),
        (buyer(2), 15_000 * VALUE_UNIT),
        (buyer(1), 1_010 * milli),
    ];

    let mut expected = std::collections::HashMap::new();
    let mut total = 0u128;
    for (from, value) in orders {
        buy_and_verify(&mut sale, from, value);
        *expected.entry(from).or_insert(0u128) += value * EXCHANGE_RATE;
        total += value * EXCHANGE_RATE;
    }

    for (from, tokens) in expected {
        assert_eq!(sale.balance_of(&from), tokens);
    }
    assert_eq!(sale.tokens_sold(), total);
    assert_eq!(sale.balance_of(&RESERVE), total);
}

#[test]
fn explicit_beneficiary_receives_tokens_sender_pays() {
    let (mut sale, _) = active_reference_sale();
    let receipt = sale.purchase_for(buyer(1), buyer(9), 5 * VALUE_UNIT).unwrap();

    assert_eq!(receipt.sender, buyer(1));
    assert_eq!(receipt.beneficiary, buyer(9));
    assert_eq!(sale.balance_of(&buyer(9)), 5 * VALUE_UNIT * EXCHANGE_RATE);
    assert_eq!(sale.balance_of(&buyer(1)), 0);
    assert_eq!(
        sale.funds().balance_of(&buyer(1)),
        200_000 * VALUE_UNIT - 5 * VALUE_UNIT
    );
}

#[test]
fn total_supply_is_twice_tokens_sold() {
    let (mut sale, _) = active_reference_sale();
    sale.contribute(buyer(1), 3 * VALUE_UNIT).unwrap();
    sale.contribute(buyer(2), 7 * VALUE_UNIT).unwrap();
    assert_eq!(sale.total_supply(), 2 * sale.tokens_sold());
}

#[test]
fn reserve_as_beneficiary_receives_both_credits() {
    let (mut sale, _) = active_reference_sale();
    sale.purchase_for(buyer(1), RESERVE, 10).unwrap();
    assert_eq!(sale.balance_of(&RESERVE), 2 * 10 * EXCHANGE_RATE);
    assert_eq!(sale.tokens_sold(), 10 * EXCHANGE_RATE);
}

// ---------------------------------------------------------------------------
// Atomic Settlement
// ---------------------------------------------------------------------------

/// A value mover that refuses every transfer.
#[derive(Debug, Default)]
struct RejectingTransfer {
    attempts: usize,
}

impl ValueTransfer for RejectingTransfer {
    fn forward(&mut self, _from: &Address, to: &Address, _amount: u128) -> Result<(), TransferError> {
        self.attempts += 1;
        Err(TransferError::Rejected(*to))
    }
}

#[test]
fn failed_forward_leaves_no_credits() {
    let clock = ManualClock::new(GENESIS);
    let config = SaleConfig::new(FUND, RESERVE, GENESIS + 1, GENESIS + 10);
    let mut sale = TokenSale::new(OWNER, config, clock.clone(), RejectingTransfer::default()).unwrap();
    clock.set(GENESIS + 1);

    let result = sale.contribute(buyer(1), 10);

    assert_eq!(
        result,
        Err(PurchaseError::ForwardingFailed(TransferError::Rejected(FUND)))
    );
    assert_eq!(sale.funds().attempts, 1);
    assert_eq!(sale.tokens_sold(), 0);
    assert_eq!(sale.total_supply(), 0);
    assert_eq!(sale.balance_of(&buyer(1)), 0);
    assert_eq!(sale.balance_of(&RESERVE), 0);
    assert!(sale.events().is_empty());
}

#[test]
fn unfunded_sender_is_rejected_and_can_retry() {
    let (mut sale, _) = active_reference_sale();
    let broke = buyer(42);

    assert!(matches!(
        sale.contribute(broke, VALUE_UNIT),
        Err(PurchaseError::ForwardingFailed(TransferError::InsufficientFunds { .. }))
    ));
    assert_eq!(sale.tokens_sold(), 0);

    sale.funds_mut().deposit(broke, VALUE_UNIT).unwrap();
    buy_and_verify(&mut sale, broke, VALUE_UNIT);
}

#[test]
fn validation_failure_never_calls_forward() {
    let clock = ManualClock::new(GENESIS);
    let config = SaleConfig::new(FUND, RESERVE, GENESIS + 1, GENESIS + 10);
    let mut sale = TokenSale::new(OWNER, config, clock, RejectingTransfer::default()).unwrap();

    assert!(sale.contribute(buyer(1), 10).is_err());
    assert_eq!(sale.funds().attempts, 0);
}

// ---------------------------------------------------------------------------
// Finalization
// ---------------------------------------------------------------------------

#[test]
fn finalize_before_end_without_cap_fails() {
    let (mut sale, clock) = deploy(TOKEN_SALE_CAP, funded_bank(VALUE_UNIT));
    assert!(matches!(
        sale.finalize(&OWNER),
        Err(FinalizeError::SaleStillActive { .. })
    ));
    clock.set(GENESIS + START_FROM);
    sale.contribute(buyer(1), 1_000).unwrap();
    assert!(matches!(
        sale.finalize(&OWNER),
        Err(FinalizeError::SaleStillActive { .. })
    ));
    assert!(!sale.is_finalized());
}

#[test]
fn finalize_after_end_succeeds_once() {
    let (mut sale, clock) = deploy(TOKEN_SALE_CAP, ValueBank::new());
    clock.set(GENESIS + END_TO + 1);

    assert!(!sale.is_finalized());
    sale.finalize(&OWNER).unwrap();
    assert!(sale.is_finalized());

    assert_eq!(sale.finalize(&OWNER), Err(FinalizeError::AlreadyFinalized));
    clock.advance(1_000);
    assert_eq!(sale.finalize(&OWNER), Err(FinalizeError::AlreadyFinalized));
    assert!(sale.is_finalized());
    assert_eq!(sale.phase(), SalePhase::Finalized);
}

#[test]
fn finalize_by_buyer_rejected_even_when_allowed() {
    let (mut sale, clock) = deploy(TOKEN_SALE_CAP, ValueBank::new());
    clock.set(GENESIS + END_TO + 1);
    assert_eq!(sale.finalize(&buyer(1)), Err(FinalizeError::Unauthorized));
    assert!(!sale.is_finalized());
}

#[test]
fn event_log_records_purchases_then_finalization() {
    let (mut sale, clock) = active_reference_sale();
    sale.contribute(buyer(1), 10).unwrap();
    sale.purchase_for(buyer(2), buyer(3), 20).unwrap();
    clock.set(GENESIS + END_TO + 1);
    sale.finalize(&OWNER).unwrap();

    let events = sale.events();
    assert_eq!(events.len(), 3);
    let json = serde_json::to_value(&events[2]).unwrap();
    assert_eq!(json["type"], "finalized");
    assert_eq!(json["counter"], GENESIS + END_TO + 1);
}

// ---------------------------------------------------------------------------
// Holder transfers
// ---------------------------------------------------------------------------

#[test]
fn purchased_tokens_stay_transferable_after_finalize() {
    let (mut sale, clock) = active_reference_sale();
    buy_and_verify(&mut sale, buyer(1), VALUE_UNIT);
    clock.set(GENESIS + END_TO + 1);
    sale.finalize(&OWNER).unwrap();

    let amount = 5 * VALUE_UNIT;
    sale.transfer(buyer(1), buyer(4), amount).unwrap();
    assert_eq!(sale.balance_of(&buyer(1)), VALUE_UNIT * EXCHANGE_RATE - amount);
    assert_eq!(sale.balance_of(&buyer(4)), amount);
    assert_eq!(sale.total_supply(), 2 * sale.tokens_sold());

    let json = serde_json::to_string(sale.events().last().unwrap()).unwrap();
    assert!(json.contains(r#""type":"transferred""#));
}

#[test]
fn transfer_without_tokens_fails() {
    let (mut sale, _clock) = active_reference_sale();
    assert_eq!(
        sale.transfer(buyer(1), buyer(2), 1),
        Err(LedgerError::InsufficientBalance { balance: 0, amount: 1 })
    );
    assert!(sale.events().is_empty());
}
