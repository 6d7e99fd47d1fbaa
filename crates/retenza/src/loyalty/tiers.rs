//! Tier resolution over a business's point thresholds.
//!
//! Among tiers sharing a threshold, the one listed last wins: the ladder is sorted stably
//! and scanned from the top down.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::domain::Tier;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TierError {
    #[error("tier list is empty")]
    EmptyLadder,
    #[error("tier names must not be blank")]
    BlankName,
    #[error("tier name '{0}' is used more than once")]
    DuplicateName(String),
}

/// Return the highest tier whose threshold `points` meets, or the lowest tier when none does.
pub fn resolve_tier(points: u64, tiers: &[Tier]) -> Result<&Tier, TierError> {
    let mut sorted: Vec<&Tier> = tiers.iter().collect();
    sorted.sort_by_key(|tier| tier.points_to_unlock);

    let lowest = *sorted.first().ok_or(TierError::EmptyLadder)?;
    let reached = sorted
        .iter()
        .rev()
        .find(|tier| tier.points_to_unlock <= points)
        .copied();

    Ok(reached.unwrap_or(lowest))
}

/// Validated tier list kept in ascending threshold order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Tier>", into = "Vec<Tier>")]
pub struct TierLadder {
    tiers: Vec<Tier>,
}

impl TierLadder {
    /// Validate names and sort by threshold. An empty list is accepted; resolving against it is not.
    pub fn new(mut tiers: Vec<Tier>) -> Result<Self, TierError> {
        let mut seen = HashSet::new();
        for tier in &mut tiers {
            let trimmed = tier.name.trim();
            if trimmed.is_empty() {
                return Err(TierError::BlankName);
            }
            if trimmed.len() != tier.name.len() {
                tier.name = trimmed.to_string();
            }
            if !seen.insert(tier.name.clone()) {
                return Err(TierError::DuplicateName(tier.name.clone()));
            }
        }

        tiers.sort_by_key(|tier| tier.points_to_unlock);
        Ok(Self { tiers })
    }

    pub fn resolve(&self, points: u64) -> Result<&Tier, TierError> {
        resolve_tier(points, &self.tiers)
    }

    /// Resolve to a tier name, falling back to `default_name` when the ladder is empty.
    pub fn resolve_name_or(&self, points: u64, default_name: &str) -> String {
        match self.resolve(points) {
            Ok(tier) => tier.name.clone(),
            Err(_) => default_name.to_string(),
        }
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tiers.iter().any(|tier| tier.name == name)
    }

    /// The tier after the one a balance currently sits in, if any.
    ///
    /// Balances below every threshold sit in the lowest tier, so the next tier is the one
    /// above it rather than the lowest tier itself.
    pub fn next_after(&self, points: u64) -> Option<&Tier> {
        let floor = self
            .resolve(points)
            .map_or(points, |current| current.points_to_unlock.max(points));
        self.tiers.iter().find(|tier| tier.points_to_unlock > floor)
    }
}

impl TryFrom<Vec<Tier>> for TierLadder {
    type Error = TierError;

    fn try_from(tiers: Vec<Tier>) -> Result<Self, Self::Error> {
        Self::new(tiers)
    }
}

impl From<TierLadder> for Vec<Tier> {
    fn from(ladder: TierLadder) -> Self {
        ladder.tiers
    }
}
