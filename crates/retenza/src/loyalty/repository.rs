use serde::{Deserialize, Serialize};

use super::domain::{
    BusinessAccount, BusinessId, CustomerId, CustomerLoyalty, CustomerProfile, LoyaltyProgram,
    Mission, MissionId, MissionRegistry, RegistryId, Transaction,
};

/// Storage for tenants, their programs, customers, balances, and transactions.
pub trait LoyaltyRepository: Send + Sync {
    fn insert_business(&self, account: BusinessAccount)
        -> Result<BusinessAccount, RepositoryError>;
    fn update_business(&self, account: BusinessAccount) -> Result<(), RepositoryError>;
    fn fetch_business(&self, id: &BusinessId) -> Result<Option<BusinessAccount>, RepositoryError>;

    fn save_program(&self, program: LoyaltyProgram) -> Result<(), RepositoryError>;
    fn fetch_program(&self, id: &BusinessId) -> Result<Option<LoyaltyProgram>, RepositoryError>;

    fn insert_customer(&self, profile: CustomerProfile)
        -> Result<CustomerProfile, RepositoryError>;
    fn fetch_customer(&self, id: &CustomerId) -> Result<Option<CustomerProfile>, RepositoryError>;

    fn fetch_loyalty(
        &self,
        customer_id: &CustomerId,
        business_id: &BusinessId,
    ) -> Result<Option<CustomerLoyalty>, RepositoryError>;
    /// Store a balance read at `loyalty.version` (0 for a new enrollment).
    ///
    /// Fails with [`RepositoryError::StaleWrite`] when the stored version moved on, or
    /// [`RepositoryError::Conflict`] when a version 0 write finds an existing record. The
    /// returned record carries the bumped version.
    fn save_loyalty(&self, loyalty: CustomerLoyalty) -> Result<CustomerLoyalty, RepositoryError>;
    fn loyalties_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<CustomerLoyalty>, RepositoryError>;
    fn loyalties_for_business(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<CustomerLoyalty>, RepositoryError>;

    fn append_transaction(&self, transaction: Transaction) -> Result<(), RepositoryError>;
    /// Oldest first; `business_id` narrows to a single shop.
    fn transactions_for(
        &self,
        customer_id: &CustomerId,
        business_id: Option<&BusinessId>,
    ) -> Result<Vec<Transaction>, RepositoryError>;
}

/// Storage for missions and customers' progress on them.
pub trait MissionRepository: Send + Sync {
    fn insert_mission(&self, mission: Mission) -> Result<Mission, RepositoryError>;
    fn fetch_mission(&self, id: &MissionId) -> Result<Option<Mission>, RepositoryError>;
    fn missions_for_businesses(
        &self,
        business_ids: &[BusinessId],
    ) -> Result<Vec<Mission>, RepositoryError>;

    /// Fails with [`RepositoryError::Conflict`] if the customer already has an
    /// in-progress registry for the same mission.
    fn insert_registry(&self, registry: MissionRegistry)
        -> Result<MissionRegistry, RepositoryError>;
    fn update_registry(&self, registry: MissionRegistry) -> Result<(), RepositoryError>;
    fn fetch_registry(&self, id: &RegistryId) -> Result<Option<MissionRegistry>, RepositoryError>;
    fn registries_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<MissionRegistry>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record was modified concurrently")]
    StaleWrite,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound push hook; delivery itself belongs to the adapter.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, message: PushMessage) -> Result<(), PublishError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub business_id: BusinessId,
    pub customer_id: CustomerId,
    pub title: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("push transport unavailable: {0}")]
    Transport(String),
}
