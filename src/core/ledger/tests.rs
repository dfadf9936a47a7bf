use chrono::NaiveDate;

use super::*;
use crate::core::error::ChatError;
use crate::core::models::{ActionKind, ModelTier};

fn day(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn ledger_on(date: &str) -> Ledger {
    let state = LedgerState {
        usage: DailyUsage::for_date(day(date)),
        wallet: Wallet::default(),
    };
    Ledger::load(Box::new(MemoryLedgerStore::new(state))).unwrap()
}

#[test]
fn under_quota_is_allowed_and_counted() {
    let mut ledger = ledger_on("2024-01-01");
    let today = day("2024-01-01");

    let decision = ledger.check_limit_on(today, ModelTier::Fast, ActionKind::Text);
    assert!(decision.is_allowed());

    ledger.consume_on(today, ModelTier::Fast, ActionKind::Text);
    assert_eq!(ledger.usage().fast.text, 1);
    assert_eq!(ledger.remaining_text(ModelTier::Fast), 19);
}

#[test]
fn exhausted_quota_without_credits_is_denied_with_limit_in_message() {
    let mut ledger = ledger_on("2024-01-01");
    let today = day("2024-01-01");

    for _ in 0..15 {
        assert!(ledger
            .check_limit_on(today, ModelTier::Balanced, ActionKind::Text)
            .is_allowed());
        ledger.consume_on(today, ModelTier::Balanced, ActionKind::Text);
    }
    assert_eq!(ledger.usage().balanced.text, 15);

    match ledger.check_limit_on(today, ModelTier::Balanced, ActionKind::Text) {
        LimitDecision::Denied { message } => {
            assert!(message.contains("15"), "message must name the limit: {message}");
            assert!(message.contains("Palaver Pro"));
            assert!(message.contains("message"));
        }
        LimitDecision::Allowed => panic!("expected denial"),
    }
}

#[test]
fn exhausted_quota_with_credits_spends_a_credit_not_the_counter() {
    let mut ledger = ledger_on("2024-01-01");
    let today = day("2024-01-01");
    ledger.state_mut().usage.balanced.text = 15;
    ledger.state_mut().wallet.pro_credits = 2;

    assert!(ledger
        .check_limit_on(today, ModelTier::Balanced, ActionKind::Text)
        .is_allowed());

    ledger.consume_on(today, ModelTier::Balanced, ActionKind::Text);
    assert_eq!(ledger.wallet().pro_credits, 1);
    assert_eq!(ledger.usage().balanced.text, 15);
}

#[test]
fn credits_never_apply_to_ineligible_tiers_or_non_text_actions() {
    let mut ledger = ledger_on("2024-01-01");
    let today = day("2024-01-01");
    ledger.state_mut().wallet.pro_credits = 5;

    ledger.state_mut().usage.fast.text = 20;
    assert!(!ledger
        .check_limit_on(today, ModelTier::Fast, ActionKind::Text)
        .is_allowed());

    ledger.state_mut().usage.balanced.image_gen = 1;
    assert!(!ledger
        .check_limit_on(today, ModelTier::Balanced, ActionKind::ImageGen)
        .is_allowed());
}

#[test]
fn credits_floor_at_zero() {
    let mut ledger = ledger_on("2024-01-01");
    let today = day("2024-01-01");
    ledger.state_mut().usage.deep_reasoning.text = 3;
    ledger.state_mut().wallet.pro_credits = 0;

    // Contract violation (no check_limit first); accounting still must not
    // underflow.
    ledger.consume_on(today, ModelTier::DeepReasoning, ActionKind::Text);
    assert_eq!(ledger.wallet().pro_credits, 0);
}

#[test]
fn stale_date_resets_counters_and_allows_without_touching_wallet() {
    let mut ledger = ledger_on("2024-01-01");
    ledger.state_mut().usage.fast.text = 20;
    ledger.state_mut().usage.coder.text = 5;
    ledger.state_mut().wallet = Wallet {
        balance: 42.0,
        pro_credits: 3,
    };

    let tomorrow = day("2024-01-02");
    assert!(ledger
        .check_limit_on(tomorrow, ModelTier::Fast, ActionKind::Text)
        .is_allowed());

    assert_eq!(ledger.usage().date, tomorrow);
    for tier in ModelTier::ALL {
        assert_eq!(*ledger.usage().counters(tier), UsageCounters::default());
    }
    assert_eq!(ledger.wallet().balance, 42.0);
    assert_eq!(ledger.wallet().pro_credits, 3);
}

#[test]
fn consume_also_rolls_over_a_stale_date() {
    let mut ledger = ledger_on("2024-01-01");
    ledger.state_mut().usage.balanced.text = 15;

    ledger.consume_on(day("2024-01-02"), ModelTier::Balanced, ActionKind::Text);
    assert_eq!(ledger.usage().date, day("2024-01-02"));
    // Fresh day, so the counter is charged rather than a credit.
    assert_eq!(ledger.usage().balanced.text, 1);
}

#[test]
fn zero_quota_action_is_denied_outright() {
    let mut ledger = ledger_on("2024-01-01");
    match ledger.check_limit_on(day("2024-01-01"), ModelTier::Coder, ActionKind::ImageGen) {
        LimitDecision::Denied { message } => assert!(message.contains("0")),
        LimitDecision::Allowed => panic!("coder has no image generation allowance"),
    }
}

#[test]
fn alternating_check_and_consume_never_goes_negative() {
    let mut ledger = ledger_on("2024-01-01");
    let today = day("2024-01-01");
    ledger.state_mut().wallet.pro_credits = 2;

    for _ in 0..40 {
        for tier in ModelTier::ALL {
            for action in [ActionKind::Text, ActionKind::ImageGen, ActionKind::Vision] {
                if ledger.check_limit_on(today, tier, action).is_allowed() {
                    ledger.consume_on(today, tier, action);
                }
            }
        }
    }

    // u32 counters cannot underflow; assert the credit floor and that no
    // counter ran away past quota + spent credits.
    assert_eq!(ledger.wallet().pro_credits, 0);
    for tier in ModelTier::ALL {
        let counters = ledger.usage().counters(tier);
        assert!(counters.text <= tier.quota().text);
        assert!(counters.image_gen <= tier.quota().image_gen);
        assert!(counters.vision <= tier.quota().vision);
    }
}

#[test]
fn deposit_and_purchase_move_balance_into_credits() {
    let mut ledger = ledger_on("2024-01-01");
    let package = CREDIT_PACKAGES[0];

    let err = ledger.purchase_credits(package).unwrap_err();
    assert!(matches!(err, ChatError::InsufficientBalance { .. }));

    ledger.deposit(50.0);
    ledger.purchase_credits(package).unwrap();
    assert_eq!(ledger.wallet().balance, 0.0);
    assert_eq!(ledger.wallet().pro_credits, 10);
}

#[test]
fn persist_writes_through_the_injected_store() {
    let store = std::sync::Arc::new(MemoryLedgerStore::default());
    let mut ledger = Ledger::load(Box::new(std::sync::Arc::clone(&store))).unwrap();
    let today = ledger.usage().date;

    ledger.consume_on(today, ModelTier::Fast, ActionKind::Text);
    assert_eq!(
        store.snapshot().usage.fast.text,
        0,
        "consume alone does not write; the turn layer persists after charging"
    );

    ledger.persist().unwrap();
    assert_eq!(store.snapshot().usage.fast.text, 1);

    ledger.deposit(10.0);
    assert_eq!(
        store.snapshot().wallet.balance,
        10.0,
        "shop mutations write through immediately"
    );
}
