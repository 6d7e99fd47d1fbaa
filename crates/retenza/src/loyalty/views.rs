use serde::Serialize;

use super::domain::{
    BusinessId, CustomerLoyalty, LoyaltyProgram, Mission, RegistryStatus, Reward, Transaction,
};

/// A customer's standing at one enrolled shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoyaltyView {
    pub business_id: BusinessId,
    pub business_name: String,
    pub points: u64,
    pub current_tier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_to_next_tier: Option<u64>,
    pub rewards: Vec<Reward>,
}

/// Outcome of recording a bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionReceipt {
    pub transaction: Transaction,
    pub loyalty: CustomerLoyalty,
    pub enrolled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_tier: Option<String>,
}

impl TransactionReceipt {
    pub fn tier_changed(&self) -> bool {
        self.previous_tier
            .as_deref()
            .is_some_and(|previous| previous != self.loyalty.current_tier_name)
    }
}

/// Program as stored after an edit, with the number of balances whose tier moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramUpdate {
    pub program: LoyaltyProgram,
    pub recalculated: usize,
}

/// A mission offered to a customer alongside any progress they have on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissionView {
    #[serde(flatten)]
    pub mission: Mission,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_status: Option<RegistryStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotificationReceipt {
    pub delivered: usize,
    pub failed: usize,
}
