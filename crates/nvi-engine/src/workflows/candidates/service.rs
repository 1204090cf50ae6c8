use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::aggregate::{CandidateAggregate, CandidateError, CandidateEvent};
use super::approval::ApprovalRequest;
use super::domain::{CandidateId, PublicationFacts};
use super::organization::{OrganizationHierarchy, OrganizationProvider};
use super::points::{
    ExcludedAffiliation, InvalidPublicationFacts, PointCalculationError, PointCalculator,
};
use super::repository::{
    CandidateRepository, CandidateUpdatePublisher, CandidateUpdated, PublishError,
    RepositoryError, VersionedCandidate,
};
use crate::config::CandidateConfig;

/// Service composing the organization registry, point calculator, and candidate store.
pub struct CandidateService<R, P, O> {
    repository: Arc<R>,
    publisher: Arc<P>,
    organizations: Arc<O>,
    calculator: PointCalculator,
    max_recalculation_attempts: u32,
}

/// Result of evaluating publication facts against the stored candidate.
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub candidate: VersionedCandidate,
    pub excluded_affiliations: Vec<ExcludedAffiliation>,
    /// `false` when the stored candidate already matched the new calculation.
    pub changed: bool,
}

impl<R, P, O> CandidateService<R, P, O>
where
    R: CandidateRepository + 'static,
    P: CandidateUpdatePublisher + 'static,
    O: OrganizationProvider + 'static,
{
    pub fn new(
        repository: Arc<R>,
        publisher: Arc<P>,
        organizations: Arc<O>,
        config: &CandidateConfig,
    ) -> Self {
        Self {
            repository,
            publisher,
            organizations,
            calculator: PointCalculator::new(),
            max_recalculation_attempts: config.max_recalculation_attempts.max(1),
        }
    }

    /// Score the publication and store the result.
    ///
    /// Recalculation is idempotent, so store conflicts are retried from a fresh read.
    /// Facts that do not describe a valid candidate mark any stored candidate as not
    /// applicable and are returned as an error.
    pub fn evaluate(
        &self,
        facts: PublicationFacts,
    ) -> Result<EvaluationReport, CandidateServiceError> {
        let candidate_id = facts.candidate_id();
        let (hierarchy, failures) =
            OrganizationHierarchy::snapshot(self.organizations.as_ref(), &facts.affiliations());

        let mut evaluation = match self.calculator.compute(&facts, &hierarchy) {
            Ok(evaluation) => evaluation,
            Err(PointCalculationError::InvalidPublicationFacts(reason)) => {
                info!(candidate_id = %candidate_id, %reason, "publication is not applicable");
                self.mark_not_applicable(&candidate_id)?;
                return Err(CandidateServiceError::NotApplicable(reason));
            }
            Err(other) => return Err(other.into()),
        };
        evaluation.attribute_fetch_failures(&failures);
        for excluded in &evaluation.excluded_affiliations {
            warn!(
                candidate_id = %candidate_id,
                creator = %excluded.creator,
                affiliation = %excluded.affiliation_id,
                reason = ?excluded.reason,
                "affiliation excluded from scoring"
            );
        }

        let points = evaluation.calculation;
        let publication_id = facts.publication_id;
        let (candidate, changed) = self
            .write_with_retry(&candidate_id, |existing| {
                let event = CandidateEvent::PointsCalculated(points.clone());
                Ok(Some(match existing {
                    Some(current) => current.apply(&event)?,
                    None => CandidateAggregate::create(publication_id.clone(), points.clone()),
                }))
            })?
            .ok_or(RepositoryError::NotFound)?;

        Ok(EvaluationReport {
            candidate,
            excluded_affiliations: evaluation.excluded_affiliations,
            changed,
        })
    }

    pub fn update_approval(
        &self,
        candidate_id: &CandidateId,
        request: ApprovalRequest,
    ) -> Result<VersionedCandidate, CandidateServiceError> {
        self.update_approval_at(candidate_id, request, Utc::now())
    }

    /// Apply one approval request against the version the caller read.
    ///
    /// A conflicting write is surfaced to the caller, never retried here.
    pub fn update_approval_at(
        &self,
        candidate_id: &CandidateId,
        request: ApprovalRequest,
        at: DateTime<Utc>,
    ) -> Result<VersionedCandidate, CandidateServiceError> {
        let current = self
            .repository
            .load(candidate_id)?
            .ok_or(RepositoryError::NotFound)?;

        if let Some(expected) = request.expected_version {
            if expected != current.version {
                info!(
                    candidate_id = %candidate_id,
                    expected,
                    actual = current.version,
                    "approval request based on stale candidate"
                );
                return Err(RepositoryError::ConcurrentModification {
                    id: candidate_id.clone(),
                    expected: Some(expected),
                    actual: Some(current.version),
                }
                .into());
            }
        }

        let action = request.action.label();
        let institution_id = request.institution_id.clone();
        let next = current
            .candidate
            .apply(&CandidateEvent::Approval { request, at })?;
        let version = self.repository.save(next.clone(), Some(current.version))?;

        info!(
            candidate_id = %candidate_id,
            institution_id = %institution_id,
            action,
            version,
            global_status = next.global_status().label(),
            "approval updated"
        );

        let stored = VersionedCandidate {
            candidate: next,
            version,
        };
        self.notify(&stored)?;
        Ok(stored)
    }

    pub fn get(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<VersionedCandidate, CandidateServiceError> {
        let candidate = self
            .repository
            .load(candidate_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(candidate)
    }

    fn mark_not_applicable(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<(), CandidateServiceError> {
        self.write_with_retry(candidate_id, |existing| {
            Ok(match existing {
                Some(current) if current.applicable => {
                    Some(current.apply(&CandidateEvent::NotApplicable)?)
                }
                _ => None,
            })
        })?;
        Ok(())
    }

    /// Read, transform, and compare-and-swap until the write lands or attempts run out.
    ///
    /// `next` returns `None` when nothing should be written.
    fn write_with_retry<F>(
        &self,
        candidate_id: &CandidateId,
        mut next: F,
    ) -> Result<Option<(VersionedCandidate, bool)>, CandidateServiceError>
    where
        F: FnMut(
            Option<&CandidateAggregate>,
        ) -> Result<Option<CandidateAggregate>, CandidateError>,
    {
        for attempt in 1..=self.max_recalculation_attempts {
            let current = self.repository.load(candidate_id)?;
            let proposed = match next(current.as_ref().map(|stored| &stored.candidate))? {
                Some(proposed) => proposed,
                None => return Ok(current.map(|stored| (stored, false))),
            };

            if let Some(stored) = &current {
                if stored.candidate == proposed {
                    debug!(
                        candidate_id = %candidate_id,
                        version = stored.version,
                        "candidate unchanged"
                    );
                    return Ok(Some((stored.clone(), false)));
                }
            }

            let expected = current.as_ref().map(|stored| stored.version);
            match self.repository.save(proposed.clone(), expected) {
                Ok(version) => {
                    info!(candidate_id = %candidate_id, version, "candidate stored");
                    let stored = VersionedCandidate {
                        candidate: proposed,
                        version,
                    };
                    self.notify(&stored)?;
                    return Ok(Some((stored, true)));
                }
                Err(RepositoryError::ConcurrentModification { .. }) => {
                    warn!(
                        candidate_id = %candidate_id,
                        attempt,
                        "concurrent modification; retrying"
                    );
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(CandidateServiceError::RetriesExhausted {
            id: candidate_id.clone(),
            attempts: self.max_recalculation_attempts,
        })
    }

    fn notify(&self, stored: &VersionedCandidate) -> Result<(), CandidateServiceError> {
        self.publisher
            .publish(CandidateUpdated {
                candidate: stored.candidate.clone(),
                version: stored.version,
            })
            .map_err(|error| {
                warn!(
                    candidate_id = %stored.candidate.id,
                    %error,
                    "candidate update not published"
                );
                CandidateServiceError::from(error)
            })
    }
}

/// Error raised by the candidate service.
#[derive(Debug, thiserror::Error)]
pub enum CandidateServiceError {
    #[error("publication is not applicable: {0}")]
    NotApplicable(InvalidPublicationFacts),
    #[error(transparent)]
    Calculation(#[from] PointCalculationError),
    #[error(transparent)]
    Candidate(#[from] CandidateError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("candidate {id} kept changing; gave up after {attempts} attempts")]
    RetriesExhausted { id: CandidateId, attempts: u32 },
}
