use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::tiers::TierLadder;

/// Identifier wrapper for enrolled businesses (tenants).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BusinessId(pub String);

/// Identifier wrapper for customers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomerId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TierId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MissionId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryId(pub String);

macro_rules! display_id {
    ($($id:ty),+) => {
        $(impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })+
    };
}

display_id!(BusinessId, CustomerId, TierId, TransactionId, MissionId, RegistryId);

/// Admin review state gating what a business may do on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessStatus {
    Pending,
    Approved,
    Rejected,
}

impl BusinessStatus {
    pub const fn label(self) -> &'static str {
        match self {
            BusinessStatus::Pending => "pending",
            BusinessStatus::Approved => "approved",
            BusinessStatus::Rejected => "rejected",
        }
    }
}

/// A shop enrolled on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessAccount {
    pub id: BusinessId,
    pub name: String,
    pub category: String,
    pub status: BusinessStatus,
    pub registered_at: DateTime<Utc>,
}

/// Payload used when a business signs up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessRegistration {
    pub name: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Female,
    Male,
    Other,
}

/// Customer attributes consulted by mission audience predicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub id: CustomerId,
    pub name: String,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub location: Option<String>,
}

impl CustomerProfile {
    /// Age in whole years on the given date, if a birth date is on file.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let birth = self.birth_date?;
        let mut years = today.year() - birth.year();
        if (today.month(), today.day()) < (birth.month(), birth.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}

/// Benefit attached to a tier, discriminated by reward type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reward {
    FreeItem {
        item: String,
        #[serde(default)]
        usage_limit: Option<u32>,
    },
    Discount {
        percent: u8,
        #[serde(default)]
        usage_limit: Option<u32>,
    },
    Cashback {
        amount: u64,
        #[serde(default)]
        usage_limit: Option<u32>,
    },
}

impl Reward {
    pub fn usage_limit(&self) -> Option<u32> {
        match self {
            Reward::FreeItem { usage_limit, .. }
            | Reward::Discount { usage_limit, .. }
            | Reward::Cashback { usage_limit, .. } => *usage_limit,
        }
    }
}

/// A named loyalty level unlocked at a points threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub id: TierId,
    pub name: String,
    pub points_to_unlock: u64,
    #[serde(default)]
    pub rewards: Vec<Reward>,
}

/// Business-owned program converting spend into points and tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyProgram {
    pub business_id: BusinessId,
    pub points_rate: u32,
    pub tiers: TierLadder,
}

/// Payload used when a business configures or edits its program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramDefinition {
    pub points_rate: u32,
    pub tiers: Vec<Tier>,
}

/// Per-business running balance and cached tier for a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerLoyalty {
    pub customer_id: CustomerId,
    pub business_id: BusinessId,
    pub points: u64,
    pub current_tier_name: String,
    /// Incremented on every save; repositories reject writes carrying a stale value.
    pub version: u64,
    pub enrolled_at: DateTime<Utc>,
}

/// Append-only record of a bill and the points it earned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub customer_id: CustomerId,
    pub business_id: BusinessId,
    pub bill_amount: u64,
    pub points_awarded: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Tier restriction on a mission: the `"all"` wildcard or an explicit list of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum ApplicableTiers {
    All,
    Named(Vec<String>),
}

pub const ALL_TIERS_SENTINEL: &str = "all";

impl ApplicableTiers {
    pub fn admits(&self, tier_name: Option<&str>) -> bool {
        match self {
            ApplicableTiers::All => true,
            ApplicableTiers::Named(names) => {
                tier_name.is_some_and(|tier| names.iter().any(|name| name == tier))
            }
        }
    }
}

impl From<Vec<String>> for ApplicableTiers {
    fn from(names: Vec<String>) -> Self {
        if names
            .iter()
            .any(|name| name.trim().eq_ignore_ascii_case(ALL_TIERS_SENTINEL))
        {
            ApplicableTiers::All
        } else {
            ApplicableTiers::Named(names)
        }
    }
}

impl From<ApplicableTiers> for Vec<String> {
    fn from(value: ApplicableTiers) -> Self {
        match value {
            ApplicableTiers::All => vec![ALL_TIERS_SENTINEL.to_string()],
            ApplicableTiers::Named(names) => names,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerType {
    #[default]
    Any,
    /// No transactions recorded with the business yet.
    New,
    /// At least one transaction recorded with the business.
    Returning,
}

/// Demographic predicate narrowing who sees a mission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionAudience {
    #[serde(default)]
    pub genders: Vec<Gender>,
    #[serde(default)]
    pub min_age: Option<u32>,
    #[serde(default)]
    pub max_age: Option<u32>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub customer_type: CustomerType,
}

/// Time-bounded promotional offer owned by a business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: MissionId,
    pub business_id: BusinessId,
    pub title: String,
    pub description: String,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
    pub applicable_tiers: ApplicableTiers,
    pub audience: MissionAudience,
}

impl Mission {
    /// Active and not yet expired at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at > now
    }
}

/// Payload used when a business publishes a mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub expires_at: DateTime<Utc>,
    pub applicable_tiers: ApplicableTiers,
    #[serde(default)]
    pub audience: MissionAudience,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryStatus {
    InProgress,
    Completed,
    Failed,
}

impl RegistryStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RegistryStatus::InProgress => "in_progress",
            RegistryStatus::Completed => "completed",
            RegistryStatus::Failed => "failed",
        }
    }
}

/// A customer's progress on a single mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionRegistry {
    pub id: RegistryId,
    pub customer_id: CustomerId,
    pub mission_id: MissionId,
    pub business_id: BusinessId,
    pub status: RegistryStatus,
    pub updated_at: DateTime<Utc>,
}

/// Payload used when a customer signs up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSignup {
    pub name: String,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub location: Option<String>,
}

/// A bill rung up at a business for a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub customer_id: CustomerId,
    pub bill_amount: u64,
}

/// Push broadcast from a business; an empty `tiers` list targets every enrolled customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tiers: Vec<String>,
}
