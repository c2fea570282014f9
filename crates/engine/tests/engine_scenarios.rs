//! End-to-end engine checks against in-memory collaborators.
//!
//! Covers each state handler, failure handling, and the position
//! invariants across a full wheel cycle.

mod common;

use common::{contract, days_from_today, today, Harness};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use wheel_trade_core::{NotificationLevel, OptionRight, OrderType};
use wheel_trade_engine::{CheckOutcome, StateStore, TradeAction, WheelState};

// =============================================================================
// IDLE
// =============================================================================

#[tokio::test]
async fn idle_sells_the_selected_put() {
    let h = Harness::new(&["XYZ"]);
    h.market.add(contract(OptionRight::Put, dec!(50), dec!(1.15), dec!(1.25), days_from_today(30)));

    let outcome = h.engine.check_on("XYZ", today()).await;
    assert_eq!(
        outcome,
        CheckOutcome::Transitioned {
            from: WheelState::Idle,
            to: WheelState::PutOpen,
            action: TradeAction::SellToOpen,
        }
    );

    let p = h.store.get("XYZ").unwrap();
    assert_eq!(p.state, WheelState::PutOpen);
    assert_eq!(p.total_premium_collected, dec!(120.00));
    assert_eq!(p.trades.len(), 1);
    assert_eq!(p.trades[0].action, TradeAction::SellToOpen);
    let option = p.active_option.as_ref().unwrap();
    assert_eq!(option.strike, dec!(50));
    assert_eq!(option.premium, dec!(1.20));
    assert_eq!(option.quantity, -1);

    // sold at the bid
    let orders = h.broker.inner.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].0.order_type, OrderType::Limit { price: dec!(1.15) });
    assert_eq!(orders[0].0.quantity, 1);

    assert!(h.recorder.titles().contains(&"Trade: SELL PUT XYZ".to_string()));
}

#[tokio::test]
async fn lower_case_ticker_reaches_market_data_upper_cased() {
    let h = Harness::with_config(&["XYZ"], |cfg| {
        cfg.symbols[0].symbol = "xyz".into();
    });
    h.market.add(contract(OptionRight::Put, dec!(50), dec!(1.15), dec!(1.25), days_from_today(30)));

    let outcome = h.engine.check_on("xyz", today()).await;
    assert!(matches!(outcome, CheckOutcome::Transitioned { to: WheelState::PutOpen, .. }));

    let requested = h.market.requested.lock().clone();
    assert!(!requested.is_empty());
    assert!(requested.iter().all(|s| s == "XYZ"));
    assert_eq!(h.engine.config().symbols[0].symbol, "XYZ");
    assert_eq!(h.store.all()[0].symbol, "XYZ");
}

#[tokio::test]
async fn idle_without_buying_power_does_nothing() {
    let h = Harness::with_config(&["XYZ"], |cfg| {
        cfg.safety.min_buying_power_reserve = dec!(99000);
    });
    h.market.add(contract(OptionRight::Put, dec!(50), dec!(1.15), dec!(1.25), days_from_today(30)));

    let outcome = h.engine.check_on("XYZ", today()).await;
    assert!(matches!(outcome, CheckOutcome::NoAction { state: WheelState::Idle, .. }));
    assert!(h.broker.inner.orders().is_empty());
    assert!(h.store.get("XYZ").unwrap().trades.is_empty());
}

#[tokio::test]
async fn idle_respects_the_total_capital_cap() {
    let h = Harness::with_config(&["XYZ"], |cfg| {
        cfg.safety.max_total_capital = dec!(4000);
    });
    h.market.add(contract(OptionRight::Put, dec!(50), dec!(1.15), dec!(1.25), days_from_today(30)));

    let outcome = h.engine.check_on("XYZ", today()).await;
    assert!(matches!(outcome, CheckOutcome::NoAction { .. }));
    assert!(h.broker.inner.orders().is_empty());
}

#[tokio::test]
async fn idle_with_no_candidates_stays_idle() {
    let h = Harness::new(&["XYZ"]);
    // outside the DTE window
    h.market.add(contract(OptionRight::Put, dec!(50), dec!(1.15), dec!(1.25), days_from_today(90)));

    let outcome = h.engine.check_on("XYZ", today()).await;
    assert!(matches!(outcome, CheckOutcome::NoAction { state: WheelState::Idle, .. }));
    assert_eq!(h.broker.calls(), 0);
}

#[tokio::test]
async fn rejected_order_does_not_advance_state() {
    let h = Harness::new(&["XYZ"]);
    h.broker.inner.set_reject_orders(true);
    h.market.add(contract(OptionRight::Put, dec!(50), dec!(1.15), dec!(1.25), days_from_today(30)));

    let outcome = h.engine.check_on("XYZ", today()).await;
    assert!(matches!(outcome, CheckOutcome::NoAction { .. }));
    let p = h.store.get("XYZ").unwrap();
    assert_eq!(p.state, WheelState::Idle);
    assert_eq!(p.total_premium_collected, Decimal::ZERO);
}

// =============================================================================
// PUT_OPEN
// =============================================================================

#[tokio::test]
async fn assigned_put_moves_to_holding_shares() {
    let h = Harness::new(&["XYZ"]);
    h.seed_put_open(days_from_today(30));
    h.broker.inner.set_position("XYZ", 100, dec!(50));

    h.engine.check_on("XYZ", today()).await;

    let p = h.store.get("XYZ").unwrap();
    assert_eq!(p.state, WheelState::HoldingShares);
    assert_eq!(p.shares_owned, 100);
    assert_eq!(p.cost_basis, dec!(48.80));
    assert!(p.active_option.is_none());
    assert_eq!(p.trades.last().unwrap().action, TradeAction::Assigned);

    let seen = h.recorder.seen.lock();
    let alert = seen.iter().find(|n| n.title.as_deref() == Some("Assignment: XYZ Put")).unwrap();
    assert_eq!(alert.level, NotificationLevel::Warning);
}

#[tokio::test]
async fn expired_put_returns_to_idle() {
    let h = Harness::new(&["XYZ"]);
    h.seed_put_open(today());

    h.engine.check_on("XYZ", today()).await;

    let p = h.store.get("XYZ").unwrap();
    assert_eq!(p.state, WheelState::Idle);
    assert!(p.active_option.is_none());
    assert_eq!(p.trades.last().unwrap().action, TradeAction::Expired);
    // premium was counted when the put was sold
    assert_eq!(p.total_premium_collected, dec!(120));
    assert!(h.recorder.titles().contains(&"Put Expired: XYZ".to_string()));
}

#[tokio::test]
async fn open_put_without_assignment_waits() {
    let h = Harness::new(&["XYZ"]);
    let before = h.seed_put_open(days_from_today(12));

    let outcome = h.engine.check_on("XYZ", today()).await;
    assert!(matches!(outcome, CheckOutcome::NoAction { state: WheelState::PutOpen, .. }));
    assert_eq!(h.store.get("XYZ").unwrap(), before);
}

// =============================================================================
// HOLDING_SHARES
// =============================================================================

#[tokio::test]
async fn holding_shares_sells_a_call_above_cost_basis() {
    let h = Harness::new(&["XYZ"]);
    let p = h.seed_put_open(days_from_today(30));
    h.store.transition_to(&p, wheel_trade_engine::Transition::PutAssigned).unwrap();
    h.broker.inner.set_position("XYZ", 100, dec!(50));
    *h.market.spot.lock() = dec!(49);
    h.market.add(contract(OptionRight::Call, dec!(47), dec!(2.40), dec!(2.50), days_from_today(30)));
    h.market.add(contract(OptionRight::Call, dec!(52), dec!(0.60), dec!(0.70), days_from_today(30)));

    let outcome = h.engine.check_on("XYZ", today()).await;
    assert!(matches!(
        outcome,
        CheckOutcome::Transitioned { to: WheelState::CallOpen, .. }
    ));

    let p = h.store.get("XYZ").unwrap();
    let call = p.active_option.as_ref().unwrap();
    assert_eq!(call.option_type, OptionRight::Call);
    assert!(call.strike >= dec!(48.80));
    assert_eq!(p.shares_owned, 100);
    assert_eq!(p.total_premium_collected, dec!(120) + dec!(65));
    assert!(p.check_invariants().is_empty());
}

#[tokio::test]
async fn holding_shares_with_nothing_at_broker_is_liquidated() {
    let h = Harness::new(&["XYZ"]);
    let p = h.seed_put_open(days_from_today(30));
    h.store.transition_to(&p, wheel_trade_engine::Transition::PutAssigned).unwrap();

    h.engine.check_on("XYZ", today()).await;

    let p = h.store.get("XYZ").unwrap();
    assert_eq!(p.state, WheelState::Idle);
    assert_eq!(p.shares_owned, 0);
    assert_eq!(p.trades.last().unwrap().action, TradeAction::Liquidated);
    assert_eq!(h.market.calls(), 0);
}

// =============================================================================
// CALL_OPEN
// =============================================================================

#[tokio::test]
async fn called_away_completes_the_cycle() {
    let h = Harness::new(&["XYZ"]);
    h.seed_call_open(days_from_today(20));

    h.engine.check_on("XYZ", today()).await;

    let p = h.store.get("XYZ").unwrap();
    assert_eq!(p.state, WheelState::Idle);
    assert_eq!(p.cycle_count, 1);
    assert_eq!(p.shares_owned, 0);
    assert_eq!(p.cost_basis, Decimal::ZERO);
    assert!(p.active_option.is_none());
    assert_eq!(p.trades.last().unwrap().action, TradeAction::CalledAway);

    let titles = h.recorder.titles();
    assert!(titles.contains(&"Called Away: XYZ".to_string()));
    assert!(titles.contains(&"Cycle Complete: XYZ".to_string()));
}

#[tokio::test]
async fn expired_call_returns_to_holding_shares() {
    let h = Harness::new(&["XYZ"]);
    h.seed_call_open(today());
    h.broker.inner.set_position("XYZ", 100, dec!(50));

    h.engine.check_on("XYZ", today()).await;

    let p = h.store.get("XYZ").unwrap();
    assert_eq!(p.state, WheelState::HoldingShares);
    assert_eq!(p.shares_owned, 100);
    assert_eq!(p.cost_basis, dec!(48.80));
    assert_eq!(p.cycle_count, 0);
}

#[tokio::test]
async fn open_call_with_shares_waits() {
    let h = Harness::new(&["XYZ"]);
    let before = h.seed_call_open(days_from_today(20));
    h.broker.inner.set_position("XYZ", 100, dec!(50));

    let outcome = h.engine.check_on("XYZ", today()).await;
    assert!(matches!(outcome, CheckOutcome::NoAction { state: WheelState::CallOpen, .. }));
    assert_eq!(h.store.get("XYZ").unwrap(), before);
}

// =============================================================================
// Failures and skipping
// =============================================================================

#[tokio::test]
async fn collaborator_failure_leaves_persisted_state_untouched() {
    let h = Harness::new(&["XYZ"]);
    h.store.get("XYZ").unwrap();
    let path = h.store.path().to_path_buf();
    let on_disk = std::fs::read_to_string(&path).unwrap();
    h.market.fail.store(true, std::sync::atomic::Ordering::SeqCst);

    let outcome = h.engine.check_on("XYZ", today()).await;
    assert!(outcome.is_failure());

    assert_eq!(std::fs::read_to_string(&path).unwrap(), on_disk);
    let reopened = StateStore::open(&path).unwrap();
    assert_eq!(reopened.get("XYZ").unwrap().state, WheelState::Idle);

    let seen = h.recorder.seen.lock();
    let alert = seen.iter().find(|n| n.level == NotificationLevel::Error).unwrap();
    assert_eq!(alert.title.as_deref(), Some("Wheel Automation Error"));
    assert_eq!(alert.data["symbol"], "XYZ");
    assert_eq!(alert.data["state"], "IDLE");
}

#[tokio::test]
async fn unknown_and_disabled_symbols_are_skipped() {
    let h = Harness::with_config(&["XYZ", "ABC"], |cfg| {
        cfg.symbols[1].enabled = false;
    });

    assert_eq!(h.engine.check_on("QQQ", today()).await, CheckOutcome::Skipped);
    assert_eq!(h.engine.check_on("ABC", today()).await, CheckOutcome::Skipped);
    assert!(h.store.all().is_empty());
    assert_eq!(h.market.calls(), 0);
}

// =============================================================================
// Invariants across a full cycle
// =============================================================================

#[tokio::test]
async fn invariants_hold_through_a_full_wheel() {
    let h = Harness::new(&["XYZ"]);
    let exp = days_from_today(30);
    h.market.add(contract(OptionRight::Put, dec!(50), dec!(1.15), dec!(1.25), exp));
    h.market.add(contract(OptionRight::Call, dec!(55), dec!(0.85), dec!(0.95), exp));

    let mut last_premium = Decimal::ZERO;
    let mut last_cycles = 0;
    let mut step = |label: &str, store: &StateStore| {
        let p = store.get("XYZ").unwrap();
        assert!(p.check_invariants().is_empty(), "{label}: {:?}", p.check_invariants());
        assert!(p.total_premium_collected >= last_premium, "{label}: premium decreased");
        let completed_cycle = p.trades.last().map(|t| t.action) == Some(TradeAction::CalledAway);
        if completed_cycle {
            assert_eq!(p.cycle_count, last_cycles + 1, "{label}");
        } else {
            assert_eq!(p.cycle_count, last_cycles, "{label}");
        }
        last_premium = p.total_premium_collected;
        last_cycles = p.cycle_count;
    };

    h.engine.check_on("XYZ", today()).await;
    step("put sold", &h.store);

    // the short put shows up at the broker; assignment swaps it for shares
    h.broker.inner.set_position(&h.store.get("XYZ").unwrap().active_option.unwrap().contract_symbol, 0, dec!(0));
    h.broker.inner.set_position("XYZ", 100, dec!(50));
    h.engine.check_on("XYZ", today()).await;
    step("assigned", &h.store);

    h.engine.check_on("XYZ", today()).await;
    step("call sold", &h.store);
    assert_eq!(h.store.get("XYZ").unwrap().state, WheelState::CallOpen);

    h.broker.inner.set_position("XYZ", 0, dec!(0));
    h.engine.check_on("XYZ", today()).await;
    step("called away", &h.store);

    let p = h.store.get("XYZ").unwrap();
    assert_eq!(p.state, WheelState::Idle);
    assert_eq!(p.cycle_count, 1);
    assert_eq!(p.trades.len(), 4);
    assert_eq!(p.total_premium_collected, dec!(120) + dec!(90));
}
