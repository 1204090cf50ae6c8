use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::approval::{
    Approval, ApprovalConsensusEngine, ApprovalError, ApprovalRequest, ApprovalStatus,
    GlobalApprovalStatus,
};
use super::domain::{CandidateId, OrganizationId, PublicationId};
use super::points::PointCalculation;

/// A publication's computed points together with every institution's approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAggregate {
    pub id: CandidateId,
    pub publication_id: PublicationId,
    pub applicable: bool,
    pub points: PointCalculation,
    pub approvals: BTreeMap<OrganizationId, Approval>,
}

/// Change requested against a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateEvent {
    PointsCalculated(PointCalculation),
    Approval {
        request: ApprovalRequest,
        at: DateTime<Utc>,
    },
    NotApplicable,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CandidateError {
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error("candidate {0} is not applicable for approval")]
    NotApplicable(CandidateId),
}

impl CandidateAggregate {
    /// New candidate with one fresh approval per institution holding points.
    pub fn create(publication_id: PublicationId, points: PointCalculation) -> Self {
        let approvals = points
            .institution_points
            .iter()
            .map(|institution| {
                (
                    institution.institution_id.clone(),
                    Approval::new(
                        institution.institution_id.clone(),
                        institution.involved_organizations(),
                    ),
                )
            })
            .collect();

        Self {
            id: CandidateId::from(&publication_id),
            publication_id,
            applicable: true,
            points,
            approvals,
        }
    }

    pub fn global_status(&self) -> GlobalApprovalStatus {
        ApprovalConsensusEngine::new().global_status(self.approvals.values())
    }

    pub fn approval(&self, institution_id: &OrganizationId) -> Option<&Approval> {
        self.approvals.get(institution_id)
    }

    /// Apply `event` and return the resulting candidate; `self` is left untouched.
    pub fn apply(&self, event: &CandidateEvent) -> Result<CandidateAggregate, CandidateError> {
        match event {
            CandidateEvent::PointsCalculated(points) => {
                Ok(self.apply_point_calculation(points.clone()))
            }
            CandidateEvent::Approval { request, at } => self.apply_approval_event(request, *at),
            CandidateEvent::NotApplicable => Ok(self.mark_not_applicable()),
        }
    }

    /// Replace the point calculation and reconcile approvals with the new institution set.
    ///
    /// Institutions present before and after keep status, assignee and decision.
    pub fn apply_point_calculation(&self, points: PointCalculation) -> CandidateAggregate {
        let mut approvals = BTreeMap::new();
        for institution in &points.institution_points {
            let involved = institution.involved_organizations();
            let approval = match self.approvals.get(&institution.institution_id) {
                Some(existing) => Approval {
                    involved_organizations: involved,
                    ..existing.clone()
                },
                None => Approval::new(institution.institution_id.clone(), involved),
            };
            approvals.insert(institution.institution_id.clone(), approval);
        }

        for removed in self
            .approvals
            .keys()
            .filter(|institution_id| !approvals.contains_key(*institution_id))
        {
            tracing::info!(
                candidate_id = %self.id,
                institution_id = %removed,
                "institution lost its points; approval removed"
            );
        }

        CandidateAggregate {
            id: self.id.clone(),
            publication_id: self.publication_id.clone(),
            applicable: true,
            points,
            approvals,
        }
    }

    pub fn apply_approval_event(
        &self,
        request: &ApprovalRequest,
        at: DateTime<Utc>,
    ) -> Result<CandidateAggregate, CandidateError> {
        if !self.applicable {
            return Err(CandidateError::NotApplicable(self.id.clone()));
        }
        let approvals = ApprovalConsensusEngine::new().apply(&self.approvals, request, at)?;
        Ok(CandidateAggregate {
            approvals,
            ..self.clone()
        })
    }

    pub fn mark_not_applicable(&self) -> CandidateAggregate {
        CandidateAggregate {
            applicable: false,
            ..self.clone()
        }
    }

    /// Restore the `New`-with-assignee rule on approvals read back from storage.
    pub fn normalized(mut self) -> Self {
        self.approvals = self
            .approvals
            .into_iter()
            .map(|(institution_id, approval)| (institution_id, approval.normalized()))
            .collect();
        self
    }

    pub fn count_with_status(&self, status: ApprovalStatus) -> usize {
        self.approvals
            .values()
            .filter(|approval| approval.status == status)
            .count()
    }
}
