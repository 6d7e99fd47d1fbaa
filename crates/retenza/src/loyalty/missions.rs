use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use super::domain::{
    BusinessId, CustomerLoyalty, CustomerProfile, CustomerType, Mission, MissionAudience,
    MissionId, MissionRegistry, RegistryStatus,
};

/// Per-customer state the eligibility filter consults.
pub struct EligibilityContext<'a> {
    tiers_by_business: HashMap<&'a BusinessId, &'a str>,
    completed: HashSet<&'a MissionId>,
}

impl<'a> EligibilityContext<'a> {
    pub fn new(loyalties: &'a [CustomerLoyalty], registries: &'a [MissionRegistry]) -> Self {
        let tiers_by_business = loyalties
            .iter()
            .map(|loyalty| (&loyalty.business_id, loyalty.current_tier_name.as_str()))
            .collect();
        let completed = registries
            .iter()
            .filter(|registry| registry.status == RegistryStatus::Completed)
            .map(|registry| &registry.mission_id)
            .collect();

        Self {
            tiers_by_business,
            completed,
        }
    }

    pub fn tier_for(&self, business_id: &BusinessId) -> Option<&'a str> {
        self.tiers_by_business.get(business_id).copied()
    }

    /// Tier admission plus the not-yet-completed check. Liveness is filtered upstream.
    pub fn is_eligible(&self, mission: &Mission) -> bool {
        let tier = self.tier_for(&mission.business_id);
        mission.applicable_tiers.admits(tier) && !self.completed.contains(&mission.id)
    }
}

/// Keep the live missions the customer may see, in the order given.
pub fn filter_eligible<'m>(
    missions: &'m [Mission],
    context: &EligibilityContext<'_>,
    now: DateTime<Utc>,
) -> Vec<&'m Mission> {
    missions
        .iter()
        .filter(|mission| mission.is_live(now))
        .filter(|mission| context.is_eligible(mission))
        .collect()
}

/// Facts about the customer relative to one business, used by audience predicates.
#[derive(Debug, Clone, Copy)]
pub struct AudienceFacts<'a> {
    pub profile: Option<&'a CustomerProfile>,
    pub transaction_count: usize,
    pub now: DateTime<Utc>,
}

impl MissionAudience {
    /// Unset criteria match everyone; set criteria fail when the profile lacks the data.
    pub fn matches(&self, facts: &AudienceFacts<'_>) -> bool {
        let profile = facts.profile;

        if !self.genders.is_empty() {
            let gender = profile.and_then(|profile| profile.gender);
            if !gender.is_some_and(|gender| self.genders.contains(&gender)) {
                return false;
            }
        }

        if self.min_age.is_some() || self.max_age.is_some() {
            let age = profile.and_then(|profile| profile.age_on(facts.now.date_naive()));
            let Some(age) = age else {
                return false;
            };
            if self.min_age.is_some_and(|min| age < min) || self.max_age.is_some_and(|max| age > max)
            {
                return false;
            }
        }

        if !self.locations.is_empty() {
            let location = profile.and_then(|profile| profile.location.as_deref());
            let matched = location.is_some_and(|location| {
                self.locations
                    .iter()
                    .any(|candidate| candidate.trim().eq_ignore_ascii_case(location.trim()))
            });
            if !matched {
                return false;
            }
        }

        match self.customer_type {
            CustomerType::Any => true,
            CustomerType::New => facts.transaction_count == 0,
            CustomerType::Returning => facts.transaction_count > 0,
        }
    }
}
