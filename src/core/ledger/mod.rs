//! Usage/wallet ledger.
//!
//! A deterministic state machine gating the four request kinds against a
//! per-tier daily quota, with overflow fallback to wallet credits on
//! credit-eligible tiers. State is mutated only from the single UI-driven
//! call path; `check_limit` followed by `consume` is a check-then-act pair
//! that is not atomic, so a multi-threaded port must wrap the ledger in a
//! mutex or rebuild it as an actor.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::core::error::ChatError;
use crate::core::models::{ActionKind, ModelTier};

pub mod store;
#[cfg(test)]
mod tests;

pub use store::{LedgerStore, MemoryLedgerStore, StoreError, TomlLedgerStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageCounters {
    pub text: u32,
    pub image_gen: u32,
    pub vision: u32,
}

impl UsageCounters {
    fn get(&self, action: ActionKind) -> u32 {
        match action {
            ActionKind::Text => self.text,
            ActionKind::ImageGen => self.image_gen,
            ActionKind::Vision => self.vision,
        }
    }

    fn bump(&mut self, action: ActionKind) {
        match action {
            ActionKind::Text => self.text += 1,
            ActionKind::ImageGen => self.image_gen += 1,
            ActionKind::Vision => self.vision += 1,
        }
    }
}

/// Per-tier counters for one calendar day. The `date` invariant ("always
/// today") is maintained lazily: any read or write on a stale date resets
/// the counters first. No scheduler involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub fast: UsageCounters,
    pub balanced: UsageCounters,
    pub deep_reasoning: UsageCounters,
    pub coder: UsageCounters,
}

impl DailyUsage {
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            date,
            fast: UsageCounters::default(),
            balanced: UsageCounters::default(),
            deep_reasoning: UsageCounters::default(),
            coder: UsageCounters::default(),
        }
    }

    pub fn counters(&self, tier: ModelTier) -> &UsageCounters {
        match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Balanced => &self.balanced,
            ModelTier::DeepReasoning => &self.deep_reasoning,
            ModelTier::Coder => &self.coder,
        }
    }

    fn counters_mut(&mut self, tier: ModelTier) -> &mut UsageCounters {
        match tier {
            ModelTier::Fast => &mut self.fast,
            ModelTier::Balanced => &mut self.balanced,
            ModelTier::DeepReasoning => &mut self.deep_reasoning,
            ModelTier::Coder => &mut self.coder,
        }
    }
}

impl Default for DailyUsage {
    fn default() -> Self {
        Self::for_date(Local::now().date_naive())
    }
}

/// Play-money wallet. `pro_credits` are the overflow consumable spent when a
/// credit-eligible tier's daily text quota is exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Wallet {
    pub balance: f64,
    pub pro_credits: u32,
}

/// Everything the store persists, in one record. Missing fields merge with
/// defaults on load; there is no further migration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerState {
    pub usage: DailyUsage,
    pub wallet: Wallet,
}

/// Outcome of a pre-flight limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitDecision {
    Allowed,
    Denied { message: String },
}

impl LimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LimitDecision::Allowed)
    }

    pub fn into_result(self) -> Result<(), ChatError> {
        match self {
            LimitDecision::Allowed => Ok(()),
            LimitDecision::Denied { message } => Err(ChatError::QuotaExceeded { message }),
        }
    }
}

/// Fixed credit-package catalog offered by the shop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreditPackage {
    pub credits: u32,
    pub price: f64,
}

pub const CREDIT_PACKAGES: [CreditPackage; 3] = [
    CreditPackage {
        credits: 10,
        price: 50.0,
    },
    CreditPackage {
        credits: 20,
        price: 100.0,
    },
    CreditPackage {
        credits: 60,
        price: 350.0,
    },
];

/// The ledger proper: state plus the injected store it loads from and saves
/// back to at defined boundaries.
pub struct Ledger {
    state: LedgerState,
    store: Box<dyn LedgerStore>,
}

impl Ledger {
    /// Loads persisted state through the store; a missing record yields
    /// defaults.
    pub fn load(store: Box<dyn LedgerStore>) -> Result<Self, StoreError> {
        let state = store.load()?;
        Ok(Self { state, store })
    }

    pub fn usage(&self) -> &DailyUsage {
        &self.state.usage
    }

    pub fn wallet(&self) -> &Wallet {
        &self.state.wallet
    }

    /// Remaining daily text allowance for UI display. Credits are not
    /// included; they are a fallback, not part of the quota.
    pub fn remaining_text(&self, tier: ModelTier) -> u32 {
        let quota = tier.quota().text;
        quota.saturating_sub(self.state.usage.counters(tier).text)
    }

    pub fn check_limit(&mut self, tier: ModelTier, action: ActionKind) -> LimitDecision {
        self.check_limit_on(Local::now().date_naive(), tier, action)
    }

    /// Side effect: a stale usage date resets all counters to `today`
    /// before the check (self-healing rollover). The wallet is untouched.
    pub(crate) fn check_limit_on(
        &mut self,
        today: NaiveDate,
        tier: ModelTier,
        action: ActionKind,
    ) -> LimitDecision {
        if self.rollover(today) {
            return LimitDecision::Allowed;
        }

        let used = self.state.usage.counters(tier).get(action);
        let limit = tier.quota().for_action(action);
        if used < limit {
            return LimitDecision::Allowed;
        }

        if action == ActionKind::Text
            && tier.credit_eligible()
            && self.state.wallet.pro_credits > 0
        {
            // The credit is spent on consume, not here.
            return LimitDecision::Allowed;
        }

        LimitDecision::Denied {
            message: format!(
                "Daily {} limit ({}) reached for {}.",
                action.label(),
                limit,
                tier.display_name()
            ),
        }
    }

    pub fn consume(&mut self, tier: ModelTier, action: ActionKind) {
        self.consume_on(Local::now().date_naive(), tier, action)
    }

    /// Accounting only; never fails. Callers invoke this exactly once per
    /// successfully-initiated action, after `check_limit` allowed it.
    pub(crate) fn consume_on(&mut self, today: NaiveDate, tier: ModelTier, action: ActionKind) {
        self.rollover(today);

        let counters = self.state.usage.counters_mut(tier);
        if action == ActionKind::Text
            && tier.credit_eligible()
            && counters.text >= tier.quota().text
        {
            let credits = &mut self.state.wallet.pro_credits;
            *credits = credits.saturating_sub(1);
            tracing::debug!(
                tier = tier.id(),
                remaining = *credits,
                "spent one pro credit"
            );
        } else {
            counters.bump(action);
        }
    }

    fn rollover(&mut self, today: NaiveDate) -> bool {
        if self.state.usage.date == today {
            return false;
        }
        tracing::debug!(%today, stale = %self.state.usage.date, "daily usage rollover");
        self.state.usage = DailyUsage::for_date(today);
        true
    }

    /// Adds funds to the wallet balance. The payment flow in front of this
    /// is simulated; this is the accounting half only.
    pub fn deposit(&mut self, amount: f64) {
        self.state.wallet.balance += amount;
        self.persist_or_log();
    }

    /// Converts balance into pro credits at the package's price.
    pub fn purchase_credits(&mut self, package: CreditPackage) -> Result<(), ChatError> {
        let wallet = &mut self.state.wallet;
        if wallet.balance < package.price {
            return Err(ChatError::InsufficientBalance {
                required: package.price,
                available: wallet.balance,
            });
        }
        wallet.balance -= package.price;
        wallet.pro_credits += package.credits;
        self.persist_or_log();
        Ok(())
    }

    fn persist_or_log(&self) {
        if let Err(err) = self.persist() {
            tracing::warn!("failed to persist ledger: {err}");
        }
    }

    /// Writes the current state back through the store. Called after every
    /// mutation boundary (turn charged, shop transaction).
    pub fn persist(&self) -> Result<(), StoreError> {
        self.store.save(&self.state)
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut LedgerState {
        &mut self.state
    }
}
