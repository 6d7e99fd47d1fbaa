//! Process-local adapters backing the service in the API binary, demos, and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    BusinessAccount, BusinessId, CustomerId, CustomerLoyalty, CustomerProfile, LoyaltyProgram,
    Mission, MissionId, MissionRegistry, RegistryId, RegistryStatus, Transaction,
};
use super::repository::{
    LoyaltyRepository, MissionRepository, NotificationPublisher, PublishError, PushMessage,
    RepositoryError,
};

#[derive(Default)]
struct StoreState {
    businesses: HashMap<BusinessId, BusinessAccount>,
    programs: HashMap<BusinessId, LoyaltyProgram>,
    customers: HashMap<CustomerId, CustomerProfile>,
    loyalties: HashMap<(CustomerId, BusinessId), CustomerLoyalty>,
    transactions: Vec<Transaction>,
    missions: Vec<Mission>,
    registries: Vec<MissionRegistry>,
}

/// Mutex-guarded store implementing both repository traits.
#[derive(Default, Clone)]
pub struct InMemoryLoyaltyStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryLoyaltyStore {
    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl LoyaltyRepository for InMemoryLoyaltyStore {
    fn insert_business(
        &self,
        account: BusinessAccount,
    ) -> Result<BusinessAccount, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.businesses.contains_key(&account.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.businesses.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    fn update_business(&self, account: BusinessAccount) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        match guard.businesses.get_mut(&account.id) {
            Some(existing) => {
                *existing = account;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_business(&self, id: &BusinessId) -> Result<Option<BusinessAccount>, RepositoryError> {
        Ok(self.lock()?.businesses.get(id).cloned())
    }

    fn save_program(&self, program: LoyaltyProgram) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        guard.programs.insert(program.business_id.clone(), program);
        Ok(())
    }

    fn fetch_program(&self, id: &BusinessId) -> Result<Option<LoyaltyProgram>, RepositoryError> {
        Ok(self.lock()?.programs.get(id).cloned())
    }

    fn insert_customer(
        &self,
        profile: CustomerProfile,
    ) -> Result<CustomerProfile, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.customers.contains_key(&profile.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.customers.insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }

    fn fetch_customer(&self, id: &CustomerId) -> Result<Option<CustomerProfile>, RepositoryError> {
        Ok(self.lock()?.customers.get(id).cloned())
    }

    fn fetch_loyalty(
        &self,
        customer_id: &CustomerId,
        business_id: &BusinessId,
    ) -> Result<Option<CustomerLoyalty>, RepositoryError> {
        let key = (customer_id.clone(), business_id.clone());
        Ok(self.lock()?.loyalties.get(&key).cloned())
    }

    fn save_loyalty(
        &self,
        mut loyalty: CustomerLoyalty,
    ) -> Result<CustomerLoyalty, RepositoryError> {
        let mut guard = self.lock()?;
        let key = (loyalty.customer_id.clone(), loyalty.business_id.clone());
        match guard.loyalties.get(&key) {
            Some(stored) if stored.version != loyalty.version => {
                return Err(if loyalty.version == 0 {
                    RepositoryError::Conflict
                } else {
                    RepositoryError::StaleWrite
                });
            }
            None if loyalty.version != 0 => return Err(RepositoryError::NotFound),
            _ => {}
        }

        loyalty.version += 1;
        guard.loyalties.insert(key, loyalty.clone());
        Ok(loyalty)
    }

    fn loyalties_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<CustomerLoyalty>, RepositoryError> {
        let guard = self.lock()?;
        let mut loyalties: Vec<CustomerLoyalty> = guard
            .loyalties
            .values()
            .filter(|loyalty| &loyalty.customer_id == customer_id)
            .cloned()
            .collect();
        loyalties.sort_by(|a, b| a.business_id.cmp(&b.business_id));
        Ok(loyalties)
    }

    fn loyalties_for_business(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<CustomerLoyalty>, RepositoryError> {
        let guard = self.lock()?;
        let mut loyalties: Vec<CustomerLoyalty> = guard
            .loyalties
            .values()
            .filter(|loyalty| &loyalty.business_id == business_id)
            .cloned()
            .collect();
        loyalties.sort_by(|a, b| a.customer_id.cmp(&b.customer_id));
        Ok(loyalties)
    }

    fn append_transaction(&self, transaction: Transaction) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        if guard
            .transactions
            .iter()
            .any(|existing| existing.id == transaction.id)
        {
            return Err(RepositoryError::Conflict);
        }
        guard.transactions.push(transaction);
        Ok(())
    }

    fn transactions_for(
        &self,
        customer_id: &CustomerId,
        business_id: Option<&BusinessId>,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .transactions
            .iter()
            .filter(|txn| &txn.customer_id == customer_id)
            .filter(|txn| business_id.map_or(true, |id| &txn.business_id == id))
            .cloned()
            .collect())
    }
}

impl MissionRepository for InMemoryLoyaltyStore {
    fn insert_mission(&self, mission: Mission) -> Result<Mission, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.missions.iter().any(|existing| existing.id == mission.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.missions.push(mission.clone());
        Ok(mission)
    }

    fn fetch_mission(&self, id: &MissionId) -> Result<Option<Mission>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.missions.iter().find(|mission| &mission.id == id).cloned())
    }

    fn missions_for_businesses(
        &self,
        business_ids: &[BusinessId],
    ) -> Result<Vec<Mission>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .missions
            .iter()
            .filter(|mission| business_ids.contains(&mission.business_id))
            .cloned()
            .collect())
    }

    fn insert_registry(
        &self,
        registry: MissionRegistry,
    ) -> Result<MissionRegistry, RepositoryError> {
        let mut guard = self.lock()?;
        let already_active = guard.registries.iter().any(|existing| {
            existing.id == registry.id
                || (existing.customer_id == registry.customer_id
                    && existing.mission_id == registry.mission_id
                    && existing.status == RegistryStatus::InProgress)
        });
        if already_active {
            return Err(RepositoryError::Conflict);
        }
        guard.registries.push(registry.clone());
        Ok(registry)
    }

    fn update_registry(&self, registry: MissionRegistry) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        match guard
            .registries
            .iter_mut()
            .find(|existing| existing.id == registry.id)
        {
            Some(existing) => {
                *existing = registry;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_registry(&self, id: &RegistryId) -> Result<Option<MissionRegistry>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .registries
            .iter()
            .find(|registry| &registry.id == id)
            .cloned())
    }

    fn registries_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<MissionRegistry>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .registries
            .iter()
            .filter(|registry| &registry.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

/// Publisher that records messages instead of delivering them.
#[derive(Default, Clone)]
pub struct InMemoryNotificationPublisher {
    messages: Arc<Mutex<Vec<PushMessage>>>,
}

impl NotificationPublisher for InMemoryNotificationPublisher {
    fn publish(&self, message: PushMessage) -> Result<(), PublishError> {
        let mut guard = self
            .messages
            .lock()
            .map_err(|_| PublishError::Transport("publisher mutex poisoned".to_string()))?;
        guard.push(message);
        Ok(())
    }
}

impl InMemoryNotificationPublisher {
    pub fn messages(&self) -> Vec<PushMessage> {
        self.messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}
