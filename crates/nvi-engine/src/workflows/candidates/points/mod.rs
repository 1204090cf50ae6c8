mod rules;
mod table;

use std::collections::BTreeSet;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::domain::{
    ChannelType, CreatorIdentity, InstanceType, OrganizationId, PublicationChannel,
    PublicationFacts, ScientificValue,
};
use super::organization::{OrganizationFetchError, OrganizationHierarchy};

/// Number of decimal places every point value is stored with.
pub const POINT_SCALE: u32 = 4;

/// Round half-up to [`POINT_SCALE`] places and pad so equal values serialize identically.
pub fn round_points(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(POINT_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(POINT_SCALE);
    rounded
}

/// Stateless calculator turning publication facts into a point breakdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointCalculator;

impl PointCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn compute(
        &self,
        facts: &PublicationFacts,
        hierarchy: &OrganizationHierarchy,
    ) -> Result<PointEvaluation, PointCalculationError> {
        let evaluation = rules::calculate(facts, hierarchy)?;
        rules::verify(&evaluation.calculation)?;
        Ok(evaluation)
    }
}

/// Points credited to one creator through one direct affiliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreatorAffiliationPoints {
    pub creator: CreatorIdentity,
    pub affiliation_id: OrganizationId,
    pub points: Decimal,
}

/// Share of a candidate's points belonging to one top-level institution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstitutionPoints {
    pub institution_id: OrganizationId,
    pub institution_points: Decimal,
    pub creator_affiliation_points: Vec<CreatorAffiliationPoints>,
}

impl InstitutionPoints {
    /// Sub-organizations of the institution that creators were directly affiliated with.
    pub fn involved_organizations(&self) -> BTreeSet<OrganizationId> {
        self.creator_affiliation_points
            .iter()
            .map(|entry| entry.affiliation_id.clone())
            .filter(|affiliation| affiliation != &self.institution_id)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointCalculation {
    pub instance_type: InstanceType,
    pub channel: PublicationChannel,
    pub is_international_collaboration: bool,
    pub collaboration_factor: Decimal,
    pub base_points: Decimal,
    pub creator_share_count: u32,
    pub total_points: Decimal,
    pub institution_points: Vec<InstitutionPoints>,
}

impl PointCalculation {
    pub fn institution(&self, institution_id: &OrganizationId) -> Option<&InstitutionPoints> {
        self.institution_points
            .iter()
            .find(|entry| &entry.institution_id == institution_id)
    }

    pub fn institution_ids(&self) -> impl Iterator<Item = &OrganizationId> {
        self.institution_points
            .iter()
            .map(|entry| &entry.institution_id)
    }
}

/// Why an affiliation did not count toward any institution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExclusionReason {
    NotInSnapshot,
    FetchFailed(String),
    InconsistentHierarchy(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedAffiliation {
    pub creator: CreatorIdentity,
    pub affiliation_id: OrganizationId,
    pub reason: ExclusionReason,
}

/// Calculation result together with the warnings recorded while producing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointEvaluation {
    pub calculation: PointCalculation,
    pub excluded_affiliations: Vec<ExcludedAffiliation>,
}

impl PointEvaluation {
    /// Replace generic exclusion reasons with the registry failure that caused them.
    pub fn attribute_fetch_failures(
        &mut self,
        failures: &[(OrganizationId, OrganizationFetchError)],
    ) {
        for excluded in &mut self.excluded_affiliations {
            if let Some((_, error)) = failures
                .iter()
                .find(|(affiliation, _)| affiliation == &excluded.affiliation_id)
            {
                excluded.reason = match error {
                    OrganizationFetchError::Inconsistent(conflict) => {
                        ExclusionReason::InconsistentHierarchy(conflict.to_string())
                    }
                    other => ExclusionReason::FetchFailed(other.to_string()),
                };
            }
        }
    }
}

/// Reasons a publication is not a valid scoring candidate.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidPublicationFacts {
    #[error("publication channel is not rated ({0:?})")]
    ChannelNotRated(ScientificValue),
    #[error("{instance_type:?} cannot be published in a {channel_type:?} channel")]
    IncompatibleChannel {
        instance_type: InstanceType,
        channel_type: ChannelType,
    },
    #[error("no creator is affiliated with a known institution")]
    NoResolvableCreators,
    #[error("creator at position {index} has neither identifier nor name")]
    BlankCreator { index: usize },
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PointCalculationError {
    #[error("publication is not applicable: {0}")]
    InvalidPublicationFacts(#[from] InvalidPublicationFacts),
    #[error("calculation invariant violated: {0}")]
    CalculationInvariantViolation(String),
}
