use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::domain::{
    ApplicableTiers, BusinessAccount, BusinessId, BusinessRegistration, BusinessStatus,
    CustomerId, CustomerLoyalty, CustomerProfile, CustomerSignup, LoyaltyProgram, Mission,
    MissionDraft, MissionId, MissionRegistry, NotificationRequest, ProgramDefinition, RegistryId,
    RegistryStatus, ReviewDecision, Transaction, TransactionId, TransactionRequest,
};
use super::missions::{filter_eligible, AudienceFacts, EligibilityContext};
use super::points::{award_points, credit_balance, PointsError};
use super::repository::{
    LoyaltyRepository, MissionRepository, NotificationPublisher, PushMessage, RepositoryError,
};
use super::tiers::{TierError, TierLadder};
use super::views::{
    LoyaltyView, MissionView, NotificationReceipt, ProgramUpdate, TransactionReceipt,
};
use crate::config::LoyaltyConfig;

static BUSINESS_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static CUSTOMER_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static TRANSACTION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static MISSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static REGISTRY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_sequence(prefix: &str, sequence: &AtomicU64) -> String {
    let id = sequence.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}

/// Service composing the loyalty rules with storage and push adapters.
pub struct LoyaltyService<R, M, N> {
    loyalty: Arc<R>,
    missions: Arc<M>,
    notifier: Arc<N>,
    config: LoyaltyConfig,
}

impl<R, M, N> LoyaltyService<R, M, N>
where
    R: LoyaltyRepository + 'static,
    M: MissionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        loyalty: Arc<R>,
        missions: Arc<M>,
        notifier: Arc<N>,
        config: LoyaltyConfig,
    ) -> Self {
        Self {
            loyalty,
            missions,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &LoyaltyConfig {
        &self.config
    }

    /// Sign up a business; it stays pending until an admin reviews it.
    pub fn register_business(
        &self,
        registration: BusinessRegistration,
        now: DateTime<Utc>,
    ) -> Result<BusinessAccount, LoyaltyServiceError> {
        let name = require_text(&registration.name, "business name")?;
        let account = BusinessAccount {
            id: BusinessId(next_sequence("biz", &BUSINESS_SEQUENCE)),
            name,
            category: registration.category.trim().to_string(),
            status: BusinessStatus::Pending,
            registered_at: now,
        };

        let stored = self.loyalty.insert_business(account)?;
        info!(business_id = %stored.id, "business registered, awaiting review");
        Ok(stored)
    }

    pub fn review_business(
        &self,
        business_id: &BusinessId,
        decision: ReviewDecision,
    ) -> Result<BusinessAccount, LoyaltyServiceError> {
        let mut account = self.business(business_id)?;
        account.status = match decision {
            ReviewDecision::Approve => BusinessStatus::Approved,
            ReviewDecision::Reject => BusinessStatus::Rejected,
        };
        self.loyalty.update_business(account.clone())?;
        info!(business_id = %account.id, status = account.status.label(), "business reviewed");
        Ok(account)
    }

    pub fn business(
        &self,
        business_id: &BusinessId,
    ) -> Result<BusinessAccount, LoyaltyServiceError> {
        self.loyalty
            .fetch_business(business_id)?
            .ok_or_else(|| LoyaltyServiceError::BusinessNotFound(business_id.clone()))
    }

    /// Replace a business's points rate and tiers, then bring every balance's cached tier in line.
    pub fn configure_program(
        &self,
        business_id: &BusinessId,
        definition: ProgramDefinition,
    ) -> Result<ProgramUpdate, LoyaltyServiceError> {
        self.approved_business(business_id)?;
        if definition.points_rate == 0 {
            return Err(PointsError::NonPositiveRate.into());
        }

        let program = LoyaltyProgram {
            business_id: business_id.clone(),
            points_rate: definition.points_rate,
            tiers: TierLadder::new(definition.tiers)?,
        };
        self.loyalty.save_program(program.clone())?;

        let recalculated = self.recalculate_tiers(&program)?;
        info!(
            business_id = %business_id,
            points_rate = program.points_rate,
            tiers = program.tiers.tiers().len(),
            recalculated,
            "loyalty program updated"
        );

        Ok(ProgramUpdate {
            program,
            recalculated,
        })
    }

    pub fn program(
        &self,
        business_id: &BusinessId,
    ) -> Result<LoyaltyProgram, LoyaltyServiceError> {
        self.loyalty
            .fetch_program(business_id)?
            .ok_or_else(|| LoyaltyServiceError::ProgramNotConfigured(business_id.clone()))
    }

    /// Enroll a customer with zero points at the lowest tier (or the default tier name).
    ///
    /// The customer id is taken as given; a registered profile is optional.
    pub fn enroll_customer(
        &self,
        business_id: &BusinessId,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<CustomerLoyalty, LoyaltyServiceError> {
        self.approved_business(business_id)?;
        if self.loyalty.fetch_loyalty(customer_id, business_id)?.is_some() {
            return Err(LoyaltyServiceError::AlreadyEnrolled {
                customer_id: customer_id.clone(),
                business_id: business_id.clone(),
            });
        }

        let tiers = self
            .loyalty
            .fetch_program(business_id)?
            .map(|program| program.tiers)
            .unwrap_or_default();
        let loyalty = CustomerLoyalty {
            customer_id: customer_id.clone(),
            business_id: business_id.clone(),
            points: 0,
            current_tier_name: tiers.resolve_name_or(0, &self.config.default_tier_name),
            version: 0,
            enrolled_at: now,
        };

        let stored = match self.loyalty.save_loyalty(loyalty) {
            Err(RepositoryError::Conflict) => {
                return Err(LoyaltyServiceError::AlreadyEnrolled {
                    customer_id: customer_id.clone(),
                    business_id: business_id.clone(),
                })
            }
            other => other?,
        };
        info!(
            customer_id = %customer_id,
            business_id = %business_id,
            tier = %stored.current_tier_name,
            "customer enrolled"
        );
        Ok(stored)
    }

    /// Credit a purchase's points, refresh the cached tier, then append the transaction.
    ///
    /// A customer with no loyalty record is enrolled on the spot. Point-of-sale
    /// enrollment does not require a registered [`CustomerProfile`]; such customers
    /// fail any mission audience criterion that needs profile data.
    pub fn record_transaction(
        &self,
        business_id: &BusinessId,
        request: TransactionRequest,
        now: DateTime<Utc>,
    ) -> Result<TransactionReceipt, LoyaltyServiceError> {
        self.approved_business(business_id)?;
        let program = self.program(business_id)?;
        let points_awarded = award_points(request.bill_amount, program.points_rate)?;

        let default_tier = self.config.default_tier_name.as_str();
        let mut previous_tier = None;
        let loyalty = self.write_loyalty(&request.customer_id, business_id, |current| {
            previous_tier = current
                .as_ref()
                .map(|loyalty| loyalty.current_tier_name.clone());
            let mut next = current.unwrap_or_else(|| CustomerLoyalty {
                customer_id: request.customer_id.clone(),
                business_id: business_id.clone(),
                points: 0,
                current_tier_name: String::new(),
                version: 0,
                enrolled_at: now,
            });
            next.points = credit_balance(next.points, points_awarded)?;
            next.current_tier_name = program.tiers.resolve_name_or(next.points, default_tier);
            Ok(next)
        })?;

        // History only gains rows whose points were actually credited.
        let transaction = Transaction {
            id: TransactionId(next_sequence("txn", &TRANSACTION_SEQUENCE)),
            customer_id: request.customer_id.clone(),
            business_id: business_id.clone(),
            bill_amount: request.bill_amount,
            points_awarded,
            recorded_at: now,
        };
        self.loyalty.append_transaction(transaction.clone())?;

        let receipt = TransactionReceipt {
            transaction,
            enrolled: previous_tier.is_none(),
            previous_tier,
            loyalty,
        };

        info!(
            customer_id = %receipt.loyalty.customer_id,
            business_id = %business_id,
            bill_amount = receipt.transaction.bill_amount,
            points_awarded,
            balance = receipt.loyalty.points,
            "transaction recorded"
        );
        if receipt.enrolled {
            info!(
                customer_id = %receipt.loyalty.customer_id,
                business_id = %business_id,
                "customer auto-enrolled"
            );
        } else if receipt.tier_changed() {
            info!(
                customer_id = %receipt.loyalty.customer_id,
                business_id = %business_id,
                tier = %receipt.loyalty.current_tier_name,
                "customer changed tier"
            );
        }

        Ok(receipt)
    }

    pub fn register_customer(
        &self,
        signup: CustomerSignup,
    ) -> Result<CustomerProfile, LoyaltyServiceError> {
        let profile = CustomerProfile {
            id: CustomerId(next_sequence("cus", &CUSTOMER_SEQUENCE)),
            name: require_text(&signup.name, "customer name")?,
            gender: signup.gender,
            birth_date: signup.birth_date,
            location: signup
                .location
                .map(|location| location.trim().to_string())
                .filter(|location| !location.is_empty()),
        };
        let stored = self.loyalty.insert_customer(profile)?;
        debug!(customer_id = %stored.id, "customer registered");
        Ok(stored)
    }

    /// Every shop the customer is enrolled with, with progress toward the next tier.
    pub fn customer_overview(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<LoyaltyView>, LoyaltyServiceError> {
        let mut views = Vec::new();
        for loyalty in self.loyalty.loyalties_for_customer(customer_id)? {
            let business_name = self
                .loyalty
                .fetch_business(&loyalty.business_id)?
                .map(|account| account.name)
                .unwrap_or_default();
            let program = self.loyalty.fetch_program(&loyalty.business_id)?;

            let (next_tier, points_to_next_tier, rewards) = match &program {
                Some(program) => {
                    let next = program.tiers.next_after(loyalty.points);
                    let rewards = program
                        .tiers
                        .resolve(loyalty.points)
                        .map(|tier| tier.rewards.clone())
                        .unwrap_or_default();
                    (
                        next.map(|tier| tier.name.clone()),
                        next.map(|tier| tier.points_to_unlock - loyalty.points),
                        rewards,
                    )
                }
                None => (None, None, Vec::new()),
            };

            views.push(LoyaltyView {
                business_id: loyalty.business_id,
                business_name,
                points: loyalty.points,
                current_tier: loyalty.current_tier_name,
                next_tier,
                points_to_next_tier,
                rewards,
            });
        }
        Ok(views)
    }

    pub fn customer_transactions(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Transaction>, LoyaltyServiceError> {
        Ok(self.loyalty.transactions_for(customer_id, None)?)
    }

    pub fn create_mission(
        &self,
        business_id: &BusinessId,
        draft: MissionDraft,
        now: DateTime<Utc>,
    ) -> Result<Mission, LoyaltyServiceError> {
        self.approved_business(business_id)?;
        let title = require_text(&draft.title, "mission title")?;
        if draft.expires_at <= now {
            return Err(LoyaltyServiceError::Invalid(
                "mission must expire in the future".to_string(),
            ));
        }

        if let ApplicableTiers::Named(names) = &draft.applicable_tiers {
            if names.is_empty() {
                return Err(LoyaltyServiceError::Invalid(
                    "mission must name at least one tier or \"all\"".to_string(),
                ));
            }
            let program = self.program(business_id)?;
            if let Some(unknown) = names.iter().find(|name| !program.tiers.contains(name)) {
                return Err(LoyaltyServiceError::Invalid(format!(
                    "unknown tier '{unknown}'"
                )));
            }
        }

        let mission = Mission {
            id: MissionId(next_sequence("mis", &MISSION_SEQUENCE)),
            business_id: business_id.clone(),
            title,
            description: draft.description.trim().to_string(),
            expires_at: draft.expires_at,
            active: true,
            applicable_tiers: draft.applicable_tiers,
            audience: draft.audience,
        };
        let stored = self.missions.insert_mission(mission)?;
        info!(mission_id = %stored.id, business_id = %business_id, "mission published");
        Ok(stored)
    }

    /// Live missions from the customer's shops that pass the tier and audience checks.
    pub fn eligible_missions(
        &self,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Vec<MissionView>, LoyaltyServiceError> {
        let loyalties = self.loyalty.loyalties_for_customer(customer_id)?;
        if loyalties.is_empty() {
            return Ok(Vec::new());
        }

        let business_ids: Vec<BusinessId> = loyalties
            .iter()
            .map(|loyalty| loyalty.business_id.clone())
            .collect();
        let missions = self.missions.missions_for_businesses(&business_ids)?;
        let registries = self.missions.registries_for_customer(customer_id)?;
        let profile = self.loyalty.fetch_customer(customer_id)?;
        let transaction_counts = self.transaction_counts(customer_id)?;

        let context = EligibilityContext::new(&loyalties, &registries);
        let views = filter_eligible(&missions, &context, now)
            .into_iter()
            .filter(|mission| {
                mission.audience.matches(&AudienceFacts {
                    profile: profile.as_ref(),
                    transaction_count: transaction_counts
                        .get(&mission.business_id)
                        .copied()
                        .unwrap_or_default(),
                    now,
                })
            })
            .map(|mission| MissionView {
                registry_status: registries
                    .iter()
                    .filter(|registry| registry.mission_id == mission.id)
                    .map(|registry| registry.status)
                    .last(),
                mission: mission.clone(),
            })
            .collect();

        Ok(views)
    }

    /// Start a mission for a customer. Only one in-progress registry may exist per mission.
    pub fn opt_into_mission(
        &self,
        customer_id: &CustomerId,
        mission_id: &MissionId,
        now: DateTime<Utc>,
    ) -> Result<MissionRegistry, LoyaltyServiceError> {
        let mission = self
            .missions
            .fetch_mission(mission_id)?
            .ok_or_else(|| LoyaltyServiceError::MissionNotFound(mission_id.clone()))?;

        let registries = self.missions.registries_for_customer(customer_id)?;
        let same_mission = |status| {
            registries
                .iter()
                .any(|registry| &registry.mission_id == mission_id && registry.status == status)
        };
        if same_mission(RegistryStatus::Completed) {
            return Err(LoyaltyServiceError::MissionAlreadyCompleted(mission_id.clone()));
        }
        if same_mission(RegistryStatus::InProgress) {
            return Err(LoyaltyServiceError::MissionAlreadyInProgress(mission_id.clone()));
        }

        let eligible = self
            .eligible_missions(customer_id, now)?
            .iter()
            .any(|view| &view.mission.id == mission_id);
        if !eligible {
            return Err(LoyaltyServiceError::MissionUnavailable(mission_id.clone()));
        }

        let registry = MissionRegistry {
            id: RegistryId(next_sequence("reg", &REGISTRY_SEQUENCE)),
            customer_id: customer_id.clone(),
            mission_id: mission_id.clone(),
            business_id: mission.business_id,
            status: RegistryStatus::InProgress,
            updated_at: now,
        };
        let stored = match self.missions.insert_registry(registry) {
            Err(RepositoryError::Conflict) => {
                return Err(LoyaltyServiceError::MissionAlreadyInProgress(
                    mission_id.clone(),
                ))
            }
            other => other?,
        };
        info!(
            customer_id = %customer_id,
            mission_id = %mission_id,
            "customer opted into mission"
        );
        Ok(stored)
    }

    /// Close an in-progress registry as completed or failed.
    pub fn update_registry_status(
        &self,
        registry_id: &RegistryId,
        status: RegistryStatus,
        now: DateTime<Utc>,
    ) -> Result<MissionRegistry, LoyaltyServiceError> {
        let mut registry = self
            .missions
            .fetch_registry(registry_id)?
            .ok_or_else(|| LoyaltyServiceError::RegistryNotFound(registry_id.clone()))?;

        if registry.status != RegistryStatus::InProgress || status == RegistryStatus::InProgress {
            return Err(LoyaltyServiceError::InvalidRegistryTransition {
                from: registry.status,
                to: status,
            });
        }

        registry.status = status;
        registry.updated_at = now;
        self.missions.update_registry(registry.clone())?;
        info!(registry_id = %registry_id, status = status.label(), "mission registry updated");
        Ok(registry)
    }

    /// Push a message to the business's customers, optionally narrowed to some tiers.
    pub fn notify_customers(
        &self,
        business_id: &BusinessId,
        request: NotificationRequest,
    ) -> Result<NotificationReceipt, LoyaltyServiceError> {
        self.approved_business(business_id)?;
        let title = require_text(&request.title, "notification title")?;

        let mut receipt = NotificationReceipt {
            delivered: 0,
            failed: 0,
        };
        for loyalty in self.loyalty.loyalties_for_business(business_id)? {
            if !request.tiers.is_empty() && !request.tiers.contains(&loyalty.current_tier_name) {
                continue;
            }

            let message = PushMessage {
                business_id: business_id.clone(),
                customer_id: loyalty.customer_id,
                title: title.clone(),
                body: request.body.clone(),
            };
            match self.notifier.publish(message) {
                Ok(()) => receipt.delivered += 1,
                Err(err) => {
                    warn!(business_id = %business_id, error = %err, "push notification failed");
                    receipt.failed += 1;
                }
            }
        }

        info!(
            business_id = %business_id,
            delivered = receipt.delivered,
            failed = receipt.failed,
            "notification broadcast"
        );
        Ok(receipt)
    }

    fn approved_business(
        &self,
        business_id: &BusinessId,
    ) -> Result<BusinessAccount, LoyaltyServiceError> {
        let account = self.business(business_id)?;
        if account.status != BusinessStatus::Approved {
            return Err(LoyaltyServiceError::BusinessNotApproved {
                business_id: business_id.clone(),
                status: account.status,
            });
        }
        Ok(account)
    }

    fn recalculate_tiers(&self, program: &LoyaltyProgram) -> Result<usize, LoyaltyServiceError> {
        let default_tier = self.config.default_tier_name.as_str();
        let mut changed = 0;

        for loyalty in self.loyalty.loyalties_for_business(&program.business_id)? {
            let resolved = program.tiers.resolve_name_or(loyalty.points, default_tier);
            if resolved == loyalty.current_tier_name {
                continue;
            }

            self.write_loyalty(&loyalty.customer_id, &program.business_id, |current| {
                let mut next = current.ok_or(RepositoryError::NotFound)?;
                next.current_tier_name = program.tiers.resolve_name_or(next.points, default_tier);
                Ok(next)
            })?;
            changed += 1;
        }

        Ok(changed)
    }

    /// Read-modify-write of one balance, retrying when another writer got there first.
    fn write_loyalty<F>(
        &self,
        customer_id: &CustomerId,
        business_id: &BusinessId,
        mut update: F,
    ) -> Result<CustomerLoyalty, LoyaltyServiceError>
    where
        F: FnMut(Option<CustomerLoyalty>) -> Result<CustomerLoyalty, LoyaltyServiceError>,
    {
        let mut attempt: u8 = 0;
        loop {
            let current = self.loyalty.fetch_loyalty(customer_id, business_id)?;
            let next = update(current)?;
            match self.loyalty.save_loyalty(next) {
                Ok(saved) => return Ok(saved),
                Err(RepositoryError::StaleWrite | RepositoryError::Conflict)
                    if attempt < self.config.write_retries =>
                {
                    attempt += 1;
                    warn!(
                        customer_id = %customer_id,
                        business_id = %business_id,
                        attempt,
                        "loyalty balance changed underneath write, retrying"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn transaction_counts(
        &self,
        customer_id: &CustomerId,
    ) -> Result<HashMap<BusinessId, usize>, LoyaltyServiceError> {
        let mut counts = HashMap::new();
        for transaction in self.loyalty.transactions_for(customer_id, None)? {
            *counts.entry(transaction.business_id).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

fn require_text(value: &str, field: &str) -> Result<String, LoyaltyServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LoyaltyServiceError::Invalid(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}

/// Error raised by the loyalty service.
#[derive(Debug, thiserror::Error)]
pub enum LoyaltyServiceError {
    #[error(transparent)]
    Tier(#[from] TierError),
    #[error(transparent)]
    Points(#[from] PointsError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("{0}")]
    Invalid(String),
    #[error("business {0} not found")]
    BusinessNotFound(BusinessId),
    #[error("business {business_id} is {}", .status.label())]
    BusinessNotApproved {
        business_id: BusinessId,
        status: BusinessStatus,
    },
    #[error("business {0} has no loyalty program configured")]
    ProgramNotConfigured(BusinessId),
    #[error("customer {customer_id} is already enrolled with business {business_id}")]
    AlreadyEnrolled {
        customer_id: CustomerId,
        business_id: BusinessId,
    },
    #[error("mission {0} not found")]
    MissionNotFound(MissionId),
    #[error("mission {0} is not available to this customer")]
    MissionUnavailable(MissionId),
    #[error("mission {0} was already completed")]
    MissionAlreadyCompleted(MissionId),
    #[error("mission {0} is already in progress")]
    MissionAlreadyInProgress(MissionId),
    #[error("registry {0} not found")]
    RegistryNotFound(RegistryId),
    #[error("registry cannot move from {} to {}", .from.label(), .to.label())]
    InvalidRegistryTransition {
        from: RegistryStatus,
        to: RegistryStatus,
    },
}
