//! Read-only view of organization "part-of" trees.
//!
//! Nodes live in an arena and refer to their parent and children by index, so a
//! snapshot can be cloned cheaply and never forms reference cycles.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::domain::OrganizationId;

/// Organization record as delivered by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    #[serde(default)]
    pub part_of: Option<OrganizationId>,
    #[serde(default)]
    pub has_part: Vec<OrganizationId>,
}

impl Organization {
    pub fn root(id: impl Into<String>) -> Self {
        Self {
            id: OrganizationId::new(id),
            part_of: None,
            has_part: Vec::new(),
        }
    }

    pub fn child_of(id: impl Into<String>, parent: &OrganizationId) -> Self {
        Self {
            id: OrganizationId::new(id),
            part_of: Some(parent.clone()),
            has_part: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("organization {0} not found in snapshot")]
    OrganizationNotFound(OrganizationId),
    #[error("organization {id} has conflicting parents {first} and {second}")]
    ConflictingParents {
        id: OrganizationId,
        first: OrganizationId,
        second: OrganizationId,
    },
    #[error("organization {0} is part of its own ancestry")]
    Cycle(OrganizationId),
}

/// Failure reported by the organization registry for a single affiliation.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum OrganizationFetchError {
    #[error("organization {0} not found in registry")]
    NotFound(OrganizationId),
    #[error("organization registry unavailable: {0}")]
    Unavailable(String),
    #[error("organization chain is inconsistent with the snapshot: {0}")]
    Inconsistent(HierarchyError),
}

/// Source of organization records; returns the requested organization together
/// with all of its ancestors.
pub trait OrganizationProvider: Send + Sync {
    fn fetch(
        &self,
        affiliation: &OrganizationId,
    ) -> Result<Vec<Organization>, OrganizationFetchError>;
}

#[derive(Debug, Clone)]
struct OrganizationNode {
    organization: Organization,
    parent: Option<usize>,
    children: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct OrganizationHierarchy {
    nodes: Vec<OrganizationNode>,
    index: BTreeMap<OrganizationId, usize>,
}

impl OrganizationHierarchy {
    pub fn from_organizations(
        organizations: impl IntoIterator<Item = Organization>,
    ) -> Result<Self, HierarchyError> {
        let organizations: Vec<Organization> = organizations.into_iter().collect();
        let mut hierarchy = Self::default();
        hierarchy.extend_with(&organizations)?;
        Ok(hierarchy)
    }

    /// Fetch every affiliation from `provider` and add each chain to one snapshot.
    ///
    /// Chains are added one at a time. An affiliation the provider cannot deliver,
    /// or whose chain contradicts what is already linked, is left out of the
    /// snapshot and returned alongside it.
    pub fn snapshot<P>(
        provider: &P,
        affiliations: &[OrganizationId],
    ) -> (Self, Vec<(OrganizationId, OrganizationFetchError)>)
    where
        P: OrganizationProvider + ?Sized,
    {
        let mut hierarchy = Self::default();
        let mut failures = Vec::new();
        let mut requested = BTreeSet::new();

        for affiliation in affiliations {
            if !requested.insert(affiliation.clone()) {
                continue;
            }
            let extended = provider.fetch(affiliation).and_then(|chain| {
                let mut next = hierarchy.clone();
                next.extend_with(&chain).map_err(OrganizationFetchError::Inconsistent)?;
                Ok(next)
            });
            match extended {
                Ok(next) => hierarchy = next,
                Err(error) => {
                    tracing::warn!(
                        affiliation = %affiliation,
                        %error,
                        "organization chain unusable; affiliation excluded"
                    );
                    failures.push((affiliation.clone(), error));
                }
            }
        }

        (hierarchy, failures)
    }

    pub fn contains(&self, id: &OrganizationId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &OrganizationId) -> Option<&Organization> {
        self.index
            .get(id)
            .map(|slot| &self.nodes[*slot].organization)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Walk parent links from `affiliation` to the root of its tree.
    pub fn resolve_top_level(
        &self,
        affiliation: &OrganizationId,
    ) -> Result<&Organization, HierarchyError> {
        let mut slot = self.slot(affiliation)?;
        while let Some(parent) = self.nodes[slot].parent {
            slot = parent;
        }
        Ok(&self.nodes[slot].organization)
    }

    pub fn is_top_level_of(
        &self,
        candidate_root: &OrganizationId,
        affiliation: &OrganizationId,
    ) -> bool {
        self.resolve_top_level(affiliation)
            .map(|root| &root.id == candidate_root)
            .unwrap_or(false)
    }

    /// Immediate children of `root_id`.
    pub fn direct_sub_organizations_of(
        &self,
        root_id: &OrganizationId,
    ) -> Result<BTreeSet<OrganizationId>, HierarchyError> {
        let slot = self.slot(root_id)?;
        Ok(self.nodes[slot]
            .children
            .iter()
            .map(|child| self.nodes[*child].organization.id.clone())
            .collect())
    }

    /// Every organization below `root_id`, at any depth.
    pub fn sub_organizations_of(
        &self,
        root_id: &OrganizationId,
    ) -> Result<BTreeSet<OrganizationId>, HierarchyError> {
        let slot = self.slot(root_id)?;
        let mut found = BTreeSet::new();
        let mut pending: Vec<usize> = self.nodes[slot].children.clone();
        while let Some(next) = pending.pop() {
            if found.insert(self.nodes[next].organization.id.clone()) {
                pending.extend(self.nodes[next].children.iter().copied());
            }
        }
        Ok(found)
    }

    fn extend_with(&mut self, organizations: &[Organization]) -> Result<(), HierarchyError> {
        for organization in organizations {
            self.ensure_node(&organization.id);
            if let Some(parent) = &organization.part_of {
                self.link(&organization.id, parent)?;
            }
            for child in &organization.has_part {
                self.link(child, &organization.id)?;
            }
        }
        self.check_acyclic()
    }

    fn slot(&self, id: &OrganizationId) -> Result<usize, HierarchyError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| HierarchyError::OrganizationNotFound(id.clone()))
    }

    fn ensure_node(&mut self, id: &OrganizationId) -> usize {
        if let Some(slot) = self.index.get(id) {
            return *slot;
        }
        let slot = self.nodes.len();
        self.nodes.push(OrganizationNode {
            organization: Organization {
                id: id.clone(),
                part_of: None,
                has_part: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
        });
        self.index.insert(id.clone(), slot);
        slot
    }

    fn link(
        &mut self,
        child: &OrganizationId,
        parent: &OrganizationId,
    ) -> Result<(), HierarchyError> {
        if child == parent {
            return Err(HierarchyError::Cycle(child.clone()));
        }
        let child_slot = self.ensure_node(child);
        let parent_slot = self.ensure_node(parent);

        match self.nodes[child_slot].parent {
            Some(existing) if existing == parent_slot => return Ok(()),
            Some(existing) => {
                return Err(HierarchyError::ConflictingParents {
                    id: child.clone(),
                    first: self.nodes[existing].organization.id.clone(),
                    second: parent.clone(),
                })
            }
            None => {}
        }

        self.nodes[child_slot].parent = Some(parent_slot);
        self.nodes[child_slot].organization.part_of = Some(parent.clone());
        self.nodes[parent_slot].children.push(child_slot);
        let parent_node = &mut self.nodes[parent_slot].organization;
        if !parent_node.has_part.contains(child) {
            parent_node.has_part.push(child.clone());
        }
        Ok(())
    }

    fn check_acyclic(&self) -> Result<(), HierarchyError> {
        for start in 0..self.nodes.len() {
            let mut steps = 0;
            let mut slot = start;
            while let Some(parent) = self.nodes[slot].parent {
                steps += 1;
                if steps > self.nodes.len() {
                    return Err(HierarchyError::Cycle(
                        self.nodes[start].organization.id.clone(),
                    ));
                }
                slot = parent;
            }
        }
        Ok(())
    }
}
