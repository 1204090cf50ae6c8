use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::config::CandidateConfig;
use crate::workflows::candidates::aggregate::CandidateAggregate;
use crate::workflows::candidates::approval::{ApprovalAction, ApprovalDecision, ApprovalRequest};
use crate::workflows::candidates::domain::{
    CandidateId, ChannelType, Creator, InstanceType, OrganizationId, PublicationChannel,
    PublicationFacts, PublicationId, ScientificValue, Username,
};
use crate::workflows::candidates::organization::{
    Organization, OrganizationFetchError, OrganizationHierarchy, OrganizationProvider,
};
use crate::workflows::candidates::repository::{
    CandidateRepository, CandidateUpdatePublisher, CandidateUpdated, PublishError,
    RepositoryError, VersionedCandidate,
};
use crate::workflows::candidates::service::CandidateService;

pub(super) type MemoryService = CandidateService<MemoryRepository, MemoryPublisher, MapOrganizations>;

pub(super) fn id(value: &str) -> OrganizationId {
    OrganizationId::new(value)
}

pub(super) fn user(value: &str) -> Username {
    Username::new(value)
}

pub(super) fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// uio > uio.med > uio.med.cardio, ntnu > ntnu.ie, and a standalone sintef.
pub(super) fn organizations() -> Vec<Organization> {
    let uio = id("uio");
    let med = id("uio.med");
    let ntnu = id("ntnu");
    vec![
        Organization::root("uio"),
        Organization::child_of("uio.med", &uio),
        Organization::child_of("uio.med.cardio", &med),
        Organization::root("ntnu"),
        Organization::child_of("ntnu.ie", &ntnu),
        Organization::root("sintef"),
    ]
}

pub(super) fn hierarchy() -> OrganizationHierarchy {
    OrganizationHierarchy::from_organizations(organizations()).expect("valid hierarchy")
}

pub(super) fn article(publication: &str, creators: Vec<Creator>) -> PublicationFacts {
    PublicationFacts {
        publication_id: PublicationId(publication.to_string()),
        instance_type: InstanceType::AcademicArticle,
        channel: PublicationChannel {
            id: "journal-1".to_string(),
            channel_type: ChannelType::Journal,
            scientific_value: ScientificValue::LevelOne,
        },
        creators,
    }
}

pub(super) fn single_creator_article() -> PublicationFacts {
    article(
        "pub-a",
        vec![Creator::verified("alice", vec![id("uio.med")])],
    )
}

pub(super) fn two_institution_article() -> PublicationFacts {
    article(
        "pub-b",
        vec![
            Creator::verified("alice", vec![id("uio.med")]),
            Creator::verified("bob", vec![id("ntnu.ie")]),
        ],
    )
}

pub(super) fn candidate_id(facts: &PublicationFacts) -> CandidateId {
    facts.candidate_id()
}

pub(super) fn request(institution: &str, action: ApprovalAction, actor: &str) -> ApprovalRequest {
    ApprovalRequest {
        institution_id: id(institution),
        action,
        actor: user(actor),
        expected_version: None,
    }
}

pub(super) fn assign(institution: &str, reviewer: &str) -> ApprovalRequest {
    request(
        institution,
        ApprovalAction::Assign {
            assignee: user(reviewer),
        },
        reviewer,
    )
}

pub(super) fn decide(institution: &str, decision: ApprovalDecision, actor: &str) -> ApprovalRequest {
    request(
        institution,
        ApprovalAction::Decide {
            decision,
            reason: None,
        },
        actor,
    )
}

pub(super) fn reject_with_reason(institution: &str, actor: &str, reason: &str) -> ApprovalRequest {
    request(
        institution,
        ApprovalAction::Decide {
            decision: ApprovalDecision::Rejected,
            reason: Some(reason.to_string()),
        },
        actor,
    )
}

pub(super) fn reopen(institution: &str, actor: &str) -> ApprovalRequest {
    request(institution, ApprovalAction::Reopen, actor)
}

pub(super) fn candidate_for(facts: &PublicationFacts) -> CandidateAggregate {
    let evaluation = crate::workflows::candidates::points::PointCalculator::new()
        .compute(facts, &hierarchy())
        .expect("facts score");
    CandidateAggregate::create(facts.publication_id.clone(), evaluation.calculation)
}

/// Registry double answering with the requested organization and its ancestors.
/// `chains` overrides the answer for one affiliation verbatim.
#[derive(Default)]
pub(super) struct MapOrganizations {
    organizations: BTreeMap<OrganizationId, Organization>,
    unavailable: BTreeSet<OrganizationId>,
    chains: BTreeMap<OrganizationId, Vec<Organization>>,
}

impl MapOrganizations {
    pub(super) fn new(organizations: Vec<Organization>) -> Self {
        Self {
            organizations: organizations
                .into_iter()
                .map(|organization| (organization.id.clone(), organization))
                .collect(),
            unavailable: BTreeSet::new(),
            chains: BTreeMap::new(),
        }
    }

    pub(super) fn with_outage(mut self, affiliation: &str) -> Self {
        self.unavailable.insert(id(affiliation));
        self
    }

    pub(super) fn with_chain(mut self, affiliation: &str, chain: Vec<Organization>) -> Self {
        self.chains.insert(id(affiliation), chain);
        self
    }
}

impl OrganizationProvider for MapOrganizations {
    fn fetch(
        &self,
        affiliation: &OrganizationId,
    ) -> Result<Vec<Organization>, OrganizationFetchError> {
        if self.unavailable.contains(affiliation) {
            return Err(OrganizationFetchError::Unavailable(
                "registry timed out".to_string(),
            ));
        }
        if let Some(chain) = self.chains.get(affiliation) {
            return Ok(chain.clone());
        }
        let mut chain = Vec::new();
        let mut next = Some(affiliation.clone());
        while let Some(current) = next {
            let organization = self
                .organizations
                .get(&current)
                .ok_or_else(|| OrganizationFetchError::NotFound(current.clone()))?;
            next = organization.part_of.clone();
            chain.push(organization.clone());
        }
        Ok(chain)
    }
}

/// Versioned in-memory store. `injected_conflicts` makes the next saves fail as if
/// another writer got there first.
#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<CandidateId, VersionedCandidate>>>,
    pub(super) injected_conflicts: Arc<Mutex<u32>>,
}

impl MemoryRepository {
    pub(super) fn inject_conflicts(&self, count: u32) {
        *self.injected_conflicts.lock().expect("conflict mutex poisoned") = count;
    }

    pub(super) fn stored(&self, id: &CandidateId) -> Option<VersionedCandidate> {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(id)
            .cloned()
    }
}

impl CandidateRepository for MemoryRepository {
    fn load(&self, id: &CandidateId) -> Result<Option<VersionedCandidate>, RepositoryError> {
        Ok(self.stored(id))
    }

    fn save(
        &self,
        candidate: CandidateAggregate,
        expected_version: Option<u64>,
    ) -> Result<u64, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let actual = guard.get(&candidate.id).map(|stored| stored.version);

        let mut conflicts = self
            .injected_conflicts
            .lock()
            .expect("conflict mutex poisoned");
        if *conflicts > 0 || actual != expected_version {
            *conflicts = conflicts.saturating_sub(1);
            return Err(RepositoryError::ConcurrentModification {
                id: candidate.id.clone(),
                expected: expected_version,
                actual,
            });
        }

        let version = actual.unwrap_or(0) + 1;
        guard.insert(
            candidate.id.clone(),
            VersionedCandidate { candidate, version },
        );
        Ok(version)
    }
}

pub(super) struct UnavailableRepository;

impl CandidateRepository for UnavailableRepository {
    fn load(&self, _id: &CandidateId) -> Result<Option<VersionedCandidate>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn save(
        &self,
        _candidate: CandidateAggregate,
        _expected_version: Option<u64>,
    ) -> Result<u64, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryPublisher {
    events: Arc<Mutex<Vec<CandidateUpdated>>>,
}

impl MemoryPublisher {
    pub(super) fn events(&self) -> Vec<CandidateUpdated> {
        self.events.lock().expect("publisher mutex poisoned").clone()
    }
}

impl CandidateUpdatePublisher for MemoryPublisher {
    fn publish(&self, update: CandidateUpdated) -> Result<(), PublishError> {
        self.events
            .lock()
            .expect("publisher mutex poisoned")
            .push(update);
        Ok(())
    }
}

pub(super) struct OfflinePublisher;

impl CandidateUpdatePublisher for OfflinePublisher {
    fn publish(&self, _update: CandidateUpdated) -> Result<(), PublishError> {
        Err(PublishError::Transport("broker offline".to_string()))
    }
}

pub(super) fn candidate_config(attempts: u32) -> CandidateConfig {
    CandidateConfig {
        max_recalculation_attempts: attempts,
        organizations_path: None,
    }
}

pub(super) fn build_service() -> (MemoryService, Arc<MemoryRepository>, Arc<MemoryPublisher>) {
    build_service_with(MapOrganizations::new(organizations()))
}

pub(super) fn build_service_with(
    registry: MapOrganizations,
) -> (MemoryService, Arc<MemoryRepository>, Arc<MemoryPublisher>) {
    let repository = Arc::new(MemoryRepository::default());
    let publisher = Arc::new(MemoryPublisher::default());
    let service = CandidateService::new(
        repository.clone(),
        publisher.clone(),
        Arc::new(registry),
        &candidate_config(3),
    );
    (service, repository, publisher)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
