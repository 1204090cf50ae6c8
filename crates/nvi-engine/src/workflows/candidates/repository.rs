use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::aggregate::CandidateAggregate;
use super::approval::{Approval, GlobalApprovalStatus};
use super::domain::{CandidateId, OrganizationId, Username};
use super::points::InstitutionPoints;

/// Stored candidate together with the version token it was read at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedCandidate {
    pub candidate: CandidateAggregate,
    pub version: u64,
}

impl VersionedCandidate {
    pub fn view(&self) -> CandidateView {
        CandidateView::from_versioned(self)
    }
}

/// Storage abstraction with compare-and-swap writes.
///
/// `save` with `expected_version = None` creates the candidate; with `Some(v)` it
/// replaces the stored candidate only if the stored version is still `v`. Versions
/// start at 1 and grow by one per successful write.
pub trait CandidateRepository: Send + Sync {
    fn load(&self, id: &CandidateId) -> Result<Option<VersionedCandidate>, RepositoryError>;
    fn save(
        &self,
        candidate: CandidateAggregate,
        expected_version: Option<u64>,
    ) -> Result<u64, RepositoryError>;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error(
        "candidate {id} was modified concurrently (expected version {expected:?}, found {actual:?})"
    )]
    ConcurrentModification {
        id: CandidateId,
        expected: Option<u64>,
        actual: Option<u64>,
    },
    #[error("candidate not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound "candidate updated" hook consumed by indexing.
pub trait CandidateUpdatePublisher: Send + Sync {
    fn publish(&self, update: CandidateUpdated) -> Result<(), PublishError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateUpdated {
    pub candidate: CandidateAggregate,
    pub version: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Read projection of a candidate for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateView {
    pub candidate_id: CandidateId,
    pub version: u64,
    pub applicable: bool,
    pub global_status: &'static str,
    pub total_points: Decimal,
    pub is_international_collaboration: bool,
    pub institutions: Vec<InstitutionView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstitutionView {
    pub institution_id: OrganizationId,
    pub points: Decimal,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Username>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_by: Option<Username>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub involved_organizations: BTreeSet<OrganizationId>,
}

impl CandidateView {
    pub fn from_versioned(versioned: &VersionedCandidate) -> Self {
        let candidate = &versioned.candidate;
        let institutions = candidate
            .points
            .institution_points
            .iter()
            .filter_map(|points| {
                candidate
                    .approvals
                    .get(&points.institution_id)
                    .map(|approval| InstitutionView::new(points, approval))
            })
            .collect();

        Self {
            candidate_id: candidate.id.clone(),
            version: versioned.version,
            applicable: candidate.applicable,
            global_status: GlobalApprovalStatus::label(candidate.global_status()),
            total_points: candidate.points.total_points,
            is_international_collaboration: candidate.points.is_international_collaboration,
            institutions,
        }
    }
}

impl InstitutionView {
    fn new(points: &InstitutionPoints, approval: &Approval) -> Self {
        Self {
            institution_id: points.institution_id.clone(),
            points: points.institution_points,
            status: approval.status.label(),
            assignee: approval.assignee.clone(),
            finalized_by: approval.finalized_by.clone(),
            finalized_date: approval.finalized_date,
            reason: approval.reason.clone(),
            involved_organizations: approval.involved_organizations.clone(),
        }
    }
}
