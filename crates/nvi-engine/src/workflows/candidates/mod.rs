//! NVI candidate scoring and multi-institution approval.
//!
//! Publication facts are scored per top-level institution by the [`PointCalculator`],
//! stored as a [`CandidateAggregate`], and reviewed independently by every institution
//! holding points. The [`CandidateService`] ties these to a versioned store so that
//! concurrent writers never overwrite each other's decisions.

pub mod aggregate;
pub mod approval;
pub mod domain;
pub mod organization;
pub mod points;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use aggregate::{CandidateAggregate, CandidateError, CandidateEvent};
pub use approval::{
    Approval, ApprovalAction, ApprovalConsensusEngine, ApprovalDecision, ApprovalError,
    ApprovalRequest, ApprovalStatus, GlobalApprovalStatus,
};
pub use domain::{
    CandidateId, ChannelType, Creator, CreatorIdentity, InstanceType, OrganizationId,
    PublicationChannel, PublicationFacts, PublicationId, ScientificValue, Username,
};
pub use organization::{
    HierarchyError, Organization, OrganizationFetchError, OrganizationHierarchy,
    OrganizationProvider,
};
pub use points::{
    round_points, CreatorAffiliationPoints, ExcludedAffiliation, ExclusionReason,
    InstitutionPoints, InvalidPublicationFacts, PointCalculation, PointCalculationError,
    PointCalculator, PointEvaluation,
};
pub use repository::{
    CandidateRepository, CandidateUpdatePublisher, CandidateUpdated, CandidateView,
    InstitutionView, PublishError, RepositoryError, VersionedCandidate,
};
pub use router::candidate_router;
pub use service::{CandidateService, CandidateServiceError, EvaluationReport};
