use metrics_exporter_prometheus::PrometheusHandle;
use nvi_engine::error::AppError;
use nvi_engine::workflows::candidates::{
    CandidateAggregate, CandidateId, CandidateRepository, CandidateUpdatePublisher,
    CandidateUpdated, Organization, OrganizationFetchError, OrganizationId, OrganizationProvider,
    PublishError, RepositoryError, VersionedCandidate,
};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Versioned candidate store kept in process memory.
#[derive(Default, Clone)]
pub(crate) struct InMemoryCandidateRepository {
    records: Arc<Mutex<HashMap<CandidateId, VersionedCandidate>>>,
}

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Unavailable("candidate store lock poisoned".to_string())
}

impl CandidateRepository for InMemoryCandidateRepository {
    fn load(&self, id: &CandidateId) -> Result<Option<VersionedCandidate>, RepositoryError> {
        let guard = self.records.lock().map_err(poisoned)?;
        Ok(guard.get(id).cloned().map(|stored| VersionedCandidate {
            candidate: stored.candidate.normalized(),
            version: stored.version,
        }))
    }

    fn save(
        &self,
        candidate: CandidateAggregate,
        expected_version: Option<u64>,
    ) -> Result<u64, RepositoryError> {
        let mut guard = self.records.lock().map_err(poisoned)?;
        let actual = guard.get(&candidate.id).map(|stored| stored.version);
        if actual != expected_version {
            return Err(RepositoryError::ConcurrentModification {
                id: candidate.id.clone(),
                expected: expected_version,
                actual,
            });
        }

        let version = actual.map_or(1, |current| current + 1);
        guard.insert(
            candidate.id.clone(),
            VersionedCandidate { candidate, version },
        );
        Ok(version)
    }
}

/// Stand-in for the search indexing hook: every update becomes a log event.
#[derive(Default, Clone)]
pub(crate) struct TracingUpdatePublisher;

impl CandidateUpdatePublisher for TracingUpdatePublisher {
    fn publish(&self, update: CandidateUpdated) -> Result<(), PublishError> {
        info!(
            candidate_id = %update.candidate.id,
            version = update.version,
            applicable = update.candidate.applicable,
            global_status = update.candidate.global_status().label(),
            institutions = update.candidate.approvals.len(),
            "candidate updated"
        );
        Ok(())
    }
}

/// Organization registry answering with the requested organization and its ancestors.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryOrganizationRegistry {
    organizations: BTreeMap<OrganizationId, Organization>,
}

impl InMemoryOrganizationRegistry {
    pub(crate) fn new(organizations: Vec<Organization>) -> Self {
        let mut registry = Self::default();
        for organization in organizations {
            for part in &organization.has_part {
                registry
                    .organizations
                    .entry(part.clone())
                    .or_insert_with(|| Organization {
                        id: part.clone(),
                        part_of: None,
                        has_part: Vec::new(),
                    })
                    .part_of
                    .get_or_insert_with(|| organization.id.clone());
            }
            let entry = registry
                .organizations
                .entry(organization.id.clone())
                .or_insert_with(|| Organization {
                    id: organization.id.clone(),
                    part_of: None,
                    has_part: Vec::new(),
                });
            if organization.part_of.is_some() {
                entry.part_of = organization.part_of.clone();
            }
            entry.has_part = organization.has_part.clone();
        }
        registry
    }

    /// Load a JSON array of organizations.
    pub(crate) fn from_json_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        let organizations: Vec<Organization> = serde_json::from_str(&raw)?;
        Ok(Self::new(organizations))
    }

    /// Registry used when no organization file is configured.
    pub(crate) fn sample() -> Self {
        let uio = OrganizationId::new("https://org.example/uio");
        let uio_med = OrganizationId::new("https://org.example/uio/med");
        let ntnu = OrganizationId::new("https://org.example/ntnu");
        Self::new(vec![
            Organization::root(uio.as_str()),
            Organization::child_of(uio_med.as_str(), &uio),
            Organization::child_of("https://org.example/uio/med/cardio", &uio_med),
            Organization::root(ntnu.as_str()),
            Organization::child_of("https://org.example/ntnu/ie", &ntnu),
            Organization::root("https://org.example/sintef"),
        ])
    }

    pub(crate) fn len(&self) -> usize {
        self.organizations.len()
    }
}

impl OrganizationProvider for InMemoryOrganizationRegistry {
    fn fetch(
        &self,
        affiliation: &OrganizationId,
    ) -> Result<Vec<Organization>, OrganizationFetchError> {
        let mut chain: Vec<Organization> = Vec::new();
        let mut next = Some(affiliation.clone());
        while let Some(current) = next {
            if chain.iter().any(|seen| seen.id == current) {
                break;
            }
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
