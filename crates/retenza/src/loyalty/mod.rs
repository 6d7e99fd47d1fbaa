//! Loyalty programs, point awards, tier resolution, and missions for enrolled businesses.
//!
//! The rules themselves (`tiers`, `points`, `missions`) are pure functions over in-memory
//! values. `LoyaltyService` wires them to the repository and publisher traits, and
//! `loyalty_router` exposes the service over HTTP.

pub mod domain;
pub mod import;
pub mod memory;
pub mod missions;
pub mod points;
pub mod repository;
pub mod router;
pub mod service;
pub mod tiers;
pub mod views;

#[cfg(test)]
mod tests;

pub use domain::{
    ApplicableTiers, BusinessAccount, BusinessId, BusinessRegistration, BusinessStatus,
    CustomerId, CustomerLoyalty, CustomerProfile, CustomerSignup, CustomerType, Gender,
    LoyaltyProgram, Mission, MissionAudience, MissionDraft, MissionId, MissionRegistry,
    NotificationRequest, ProgramDefinition, RegistryId, RegistryStatus, ReviewDecision, Reward,
    Tier, TierId, Transaction, TransactionId, TransactionRequest,
};
pub use import::{ImportSummary, RowRejection, TransactionImportError, TransactionImporter};
pub use memory::{InMemoryLoyaltyStore, InMemoryNotificationPublisher};
pub use missions::{filter_eligible, AudienceFacts, EligibilityContext};
pub use points::{award_points, PointsError};
pub use repository::{
    LoyaltyRepository, MissionRepository, NotificationPublisher, PublishError, PushMessage,
    RepositoryError,
};
pub use router::loyalty_router;
pub use service::{LoyaltyService, LoyaltyServiceError};
pub use tiers::{resolve_tier, TierError, TierLadder};
pub use views::{LoyaltyView, MissionView, NotificationReceipt, ProgramUpdate, TransactionReceipt};
