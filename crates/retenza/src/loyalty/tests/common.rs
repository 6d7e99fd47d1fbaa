use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::config::LoyaltyConfig;
use crate::loyalty::domain::{
    ApplicableTiers, BusinessAccount, BusinessId, BusinessRegistration, CustomerId,
    CustomerLoyalty, CustomerProfile, LoyaltyProgram, Mission, MissionAudience, MissionId,
    MissionRegistry, ProgramDefinition, RegistryId, RegistryStatus, ReviewDecision, Reward, Tier,
    TierId, Transaction,
};
use crate::loyalty::memory::{InMemoryLoyaltyStore, InMemoryNotificationPublisher};
use crate::loyalty::repository::{
    LoyaltyRepository, NotificationPublisher, PublishError, PushMessage, RepositoryError,
};
use crate::loyalty::service::LoyaltyService;

pub(super) type MemoryService =
    LoyaltyService<InMemoryLoyaltyStore, InMemoryLoyaltyStore, InMemoryNotificationPublisher>;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn tier(name: &str, points_to_unlock: u64) -> Tier {
    Tier {
        id: TierId(format!("tier-{}", name.to_ascii_lowercase())),
        name: name.to_string(),
        points_to_unlock,
        rewards: Vec::new(),
    }
}

pub(super) fn standard_tiers() -> Vec<Tier> {
    let mut gold = tier("Gold", 500);
    gold.rewards = vec![
        Reward::Discount {
            percent: 10,
            usage_limit: None,
        },
        Reward::FreeItem {
            item: "Coffee".to_string(),
            usage_limit: Some(1),
        },
    ];
    vec![tier("Bronze", 0), tier("Silver", 100), gold]
}

pub(super) fn standard_program() -> ProgramDefinition {
    ProgramDefinition {
        points_rate: 2,
        tiers: standard_tiers(),
    }
}

pub(super) fn build_service() -> (
    MemoryService,
    Arc<InMemoryLoyaltyStore>,
    Arc<InMemoryNotificationPublisher>,
) {
    let store = Arc::new(InMemoryLoyaltyStore::default());
    let publisher = Arc::new(InMemoryNotificationPublisher::default());
    let service = LoyaltyService::new(
        store.clone(),
        store.clone(),
        publisher.clone(),
        LoyaltyConfig::default(),
    );
    (service, store, publisher)
}

/// Register and approve a business, optionally configuring the standard program.
pub(super) fn approved_business(service: &MemoryService, with_program: bool) -> BusinessId {
    let account = service
        .register_business(
            BusinessRegistration {
                name: "Corner Bakery".to_string(),
                category: "food".to_string(),
            },
            now(),
        )
        .expect("business registers");
    service
        .review_business(&account.id, ReviewDecision::Approve)
        .expect("business approved");
    if with_program {
        service
            .configure_program(&account.id, standard_program())
            .expect("program configures");
    }
    account.id
}

pub(super) fn loyalty(customer: &str, business: &str, points: u64, tier: &str) -> CustomerLoyalty {
    CustomerLoyalty {
        customer_id: CustomerId(customer.to_string()),
        business_id: BusinessId(business.to_string()),
        points,
        current_tier_name: tier.to_string(),
        version: 1,
        enrolled_at: now(),
    }
}

pub(super) fn mission(id: &str, business: &str, tiers: ApplicableTiers) -> Mission {
    Mission {
        id: MissionId(id.to_string()),
        business_id: BusinessId(business.to_string()),
        title: format!("Mission {id}"),
        description: String::new(),
        expires_at: now() + Duration::days(7),
        active: true,
        applicable_tiers: tiers,
        audience: MissionAudience::default(),
    }
}

pub(super) fn registry(customer: &str, mission: &str, status: RegistryStatus) -> MissionRegistry {
    MissionRegistry {
        id: RegistryId(format!("reg-{customer}-{mission}")),
        customer_id: CustomerId(customer.to_string()),
        mission_id: MissionId(mission.to_string()),
        business_id: BusinessId("biz-1".to_string()),
        status,
        updated_at: now(),
    }
}

pub(super) fn named(tiers: &[&str]) -> ApplicableTiers {
    ApplicableTiers::Named(tiers.iter().map(|name| name.to_string()).collect())
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("valid json body")
}

/// Store wrapper that reports the first `stale_writes` balance saves as concurrent conflicts.
#[derive(Default)]
pub(super) struct StaleStore {
    pub(super) inner: InMemoryLoyaltyStore,
    pub(super) stale_writes: AtomicUsize,
}

impl StaleStore {
    pub(super) fn failing(stale_writes: usize) -> Self {
        Self {
            inner: InMemoryLoyaltyStore::default(),
            stale_writes: AtomicUsize::new(stale_writes),
        }
    }
}

impl LoyaltyRepository for StaleStore {
    fn insert_business(
        &self,
        account: BusinessAccount,
    ) -> Result<BusinessAccount, RepositoryError> {
        self.inner.insert_business(account)
    }

    fn update_business(&self, account: BusinessAccount) -> Result<(), RepositoryError> {
        self.inner.update_business(account)
    }

    fn fetch_business(&self, id: &BusinessId) -> Result<Option<BusinessAccount>, RepositoryError> {
        self.inner.fetch_business(id)
    }

    fn save_program(&self, program: LoyaltyProgram) -> Result<(), RepositoryError> {
        self.inner.save_program(program)
    }

    fn fetch_program(&self, id: &BusinessId) -> Result<Option<LoyaltyProgram>, RepositoryError> {
        self.inner.fetch_program(id)
    }

    fn insert_customer(
        &self,
        profile: CustomerProfile,
    ) -> Result<CustomerProfile, RepositoryError> {
        self.inner.insert_customer(profile)
    }

    fn fetch_customer(&self, id: &CustomerId) -> Result<Option<CustomerProfile>, RepositoryError> {
        self.inner.fetch_customer(id)
    }

    fn fetch_loyalty(
        &self,
        customer_id: &CustomerId,
        business_id: &BusinessId,
    ) -> Result<Option<CustomerLoyalty>, RepositoryError> {
        self.inner.fetch_loyalty(customer_id, business_id)
    }

    fn save_loyalty(&self, loyalty: CustomerLoyalty) -> Result<CustomerLoyalty, RepositoryError> {
        let remaining = self.stale_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.stale_writes.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::StaleWrite);
        }
        self.inner.save_loyalty(loyalty)
    }

    fn loyalties_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<CustomerLoyalty>, RepositoryError> {
        self.inner.loyalties_for_customer(customer_id)
    }

    fn loyalties_for_business(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<CustomerLoyalty>, RepositoryError> {
        self.inner.loyalties_for_business(business_id)
    }

    fn append_transaction(&self, transaction: Transaction) -> Result<(), RepositoryError> {
        self.inner.append_transaction(transaction)
    }

    fn transactions_for(
        &self,
        customer_id: &CustomerId,
        business_id: Option<&BusinessId>,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        self.inner.transactions_for(customer_id, business_id)
    }
}

/// Repository whose every call fails as if the database were down.
pub(super) struct UnavailableRepository;

fn unavailable<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl LoyaltyRepository for UnavailableRepository {
    fn insert_business(&self, _: BusinessAccount) -> Result<BusinessAccount, RepositoryError> {
        unavailable()
    }

    fn update_business(&self, _: BusinessAccount) -> Result<(), RepositoryError> {
        unavailable()
    }

    fn fetch_business(&self, _: &BusinessId) -> Result<Option<BusinessAccount>, RepositoryError> {
        unavailable()
    }

    fn save_program(&self, _: LoyaltyProgram) -> Result<(), RepositoryError> {
        unavailable()
    }

    fn fetch_program(&self, _: &BusinessId) -> Result<Option<LoyaltyProgram>, RepositoryError> {
        unavailable()
    }

    fn insert_customer(&self, _: CustomerProfile) -> Result<CustomerProfile, RepositoryError> {
        unavailable()
    }

    fn fetch_customer(&self, _: &CustomerId) -> Result<Option<CustomerProfile>, RepositoryError> {
        unavailable()
    }

    fn fetch_loyalty(
        &self,
        _: &CustomerId,
        _: &BusinessId,
    ) -> Result<Option<CustomerLoyalty>, RepositoryError> {
        unavailable()
    }

    fn save_loyalty(&self, _: CustomerLoyalty) -> Result<CustomerLoyalty, RepositoryError> {
        unavailable()
    }

    fn loyalties_for_customer(
        &self,
        _: &CustomerId,
    ) -> Result<Vec<CustomerLoyalty>, RepositoryError> {
        unavailable()
    }

    fn loyalties_for_business(
        &self,
        _: &BusinessId,
    ) -> Result<Vec<CustomerLoyalty>, RepositoryError> {
        unavailable()
    }

    fn append_transaction(&self, _: Transaction) -> Result<(), RepositoryError> {
        unavailable()
    }

    fn transactions_for(
        &self,
        _: &CustomerId,
        _: Option<&BusinessId>,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        unavailable()
    }
}

/// Publisher that rejects messages for one customer.
pub(super) struct FlakyPublisher {
    pub(super) reject: CustomerId,
    pub(super) delivered: InMemoryNotificationPublisher,
}

impl NotificationPublisher for FlakyPublisher {
    fn publish(&self, message: PushMessage) -> Result<(), PublishError> {
        if message.customer_id == self.reject {
            return Err(PublishError::Transport("device token expired".to_string()));
        }
        self.delivered.publish(message)
    }
}
