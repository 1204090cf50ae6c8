use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{OrganizationId, Username};

/// Review state of one institution's share of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    New,
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApprovalStatus::New => "new",
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::Rejected)
    }
}

/// Status of the candidate as a whole, derived from every institution's approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Dispute,
}

impl GlobalApprovalStatus {
    pub const fn label(self) -> &'static str {
        match self {
            GlobalApprovalStatus::Pending => "pending",
            GlobalApprovalStatus::Approved => "approved",
            GlobalApprovalStatus::Rejected => "rejected",
            GlobalApprovalStatus::Dispute => "dispute",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub institution_id: OrganizationId,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Username>,
    #[serde(default)]
    pub involved_organizations: BTreeSet<OrganizationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_by: Option<Username>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Approval {
    /// Fresh, unassigned approval for an institution that gained points.
    pub fn new(
        institution_id: OrganizationId,
        involved_organizations: BTreeSet<OrganizationId>,
    ) -> Self {
        Self {
            institution_id,
            status: ApprovalStatus::New,
            assignee: None,
            involved_organizations,
            finalized_by: None,
            finalized_date: None,
            reason: None,
        }
    }

    /// An approval marked `New` that already has an assignee is `Pending`.
    pub fn normalized(mut self) -> Self {
        if self.status == ApprovalStatus::New && self.assignee.is_some() {
            self.status = ApprovalStatus::Pending;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl From<ApprovalDecision> for ApprovalStatus {
    fn from(value: ApprovalDecision) -> Self {
        match value {
            ApprovalDecision::Approved => ApprovalStatus::Approved,
            ApprovalDecision::Rejected => ApprovalStatus::Rejected,
        }
    }
}

/// Operation a reviewer requests on an institution's approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApprovalAction {
    Assign {
        assignee: Username,
    },
    Unassign,
    Decide {
        decision: ApprovalDecision,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Reopen,
}

impl ApprovalAction {
    pub const fn label(&self) -> &'static str {
        match self {
            ApprovalAction::Assign { .. } => "assign",
            ApprovalAction::Unassign => "unassign",
            ApprovalAction::Decide { .. } => "decide",
            ApprovalAction::Reopen => "reopen",
        }
    }
}

/// Inbound approval message targeting one institution of a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub institution_id: OrganizationId,
    pub action: ApprovalAction,
    pub actor: Username,
    /// Version of the candidate the actor based the request on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("no approval exists for institution {0}")]
    NotFound(OrganizationId),
    #[error("cannot {action} approval for {institution_id} while it is {status:?}")]
    InvalidState {
        institution_id: OrganizationId,
        action: &'static str,
        status: ApprovalStatus,
    },
}

/// Stateless rules for per-institution approval transitions and the global status.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApprovalConsensusEngine;

impl ApprovalConsensusEngine {
    pub fn new() -> Self {
        Self
    }

    /// Apply `request` to the matching approval, returning the updated set.
    ///
    /// The input is never modified; a failed request leaves no partial change behind.
    pub fn apply(
        &self,
        approvals: &BTreeMap<OrganizationId, Approval>,
        request: &ApprovalRequest,
        at: DateTime<Utc>,
    ) -> Result<BTreeMap<OrganizationId, Approval>, ApprovalError> {
        let current = approvals
            .get(&request.institution_id)
            .ok_or_else(|| ApprovalError::NotFound(request.institution_id.clone()))?;

        let updated = match &request.action {
            ApprovalAction::Assign { assignee } => self.assign(current, assignee)?,
            ApprovalAction::Unassign => self.unassign(current),
            ApprovalAction::Decide { decision, reason } => {
                self.decide(current, *decision, &request.actor, reason.clone(), at)?
            }
            ApprovalAction::Reopen => self.reopen(current)?,
        };

        let mut next = approvals.clone();
        next.insert(request.institution_id.clone(), updated);
        Ok(next)
    }

    pub fn assign(
        &self,
        approval: &Approval,
        reviewer: &Username,
    ) -> Result<Approval, ApprovalError> {
        if approval.status.is_terminal() {
            return Err(invalid(approval, "assign"));
        }
        let mut next = approval.clone();
        next.assignee = Some(reviewer.clone());
        next.status = ApprovalStatus::Pending;
        Ok(next)
    }

    /// Clearing the assignee never touches a recorded decision.
    pub fn unassign(&self, approval: &Approval) -> Approval {
        let mut next = approval.clone();
        next.assignee = None;
        if !next.status.is_terminal() {
            next.status = ApprovalStatus::New;
        }
        next
    }

    pub fn decide(
        &self,
        approval: &Approval,
        decision: ApprovalDecision,
        reviewer: &Username,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Approval, ApprovalError> {
        if approval.status.is_terminal() {
            return Err(invalid(approval, "decide"));
        }
        let mut next = approval.clone();
        next.status = decision.into();
        next.finalized_by = Some(reviewer.clone());
        next.finalized_date = Some(at);
        next.reason = match decision {
            ApprovalDecision::Rejected => reason,
            ApprovalDecision::Approved => None,
        };
        Ok(next)
    }

    pub fn reopen(&self, approval: &Approval) -> Result<Approval, ApprovalError> {
        if !approval.status.is_terminal() {
            return Err(invalid(approval, "reopen"));
        }
        let mut next = approval.clone();
        next.status = ApprovalStatus::Pending;
        next.finalized_by = None;
        next.finalized_date = None;
        next.reason = None;
        Ok(next)
    }

    /// Derive the candidate status. A dispute outranks unanimity.
    pub fn global_status<'a>(
        &self,
        approvals: impl IntoIterator<Item = &'a Approval>,
    ) -> GlobalApprovalStatus {
        let mut count = 0usize;
        let mut approved = 0usize;
        let mut rejected = 0usize;
        for approval in approvals {
            count += 1;
            match approval.status {
                ApprovalStatus::Approved => approved += 1,
                ApprovalStatus::Rejected => rejected += 1,
                ApprovalStatus::New | ApprovalStatus::Pending => {}
            }
        }

        if count == 0 {
            GlobalApprovalStatus::Pending
        } else if approved > 0 && rejected > 0 {
            GlobalApprovalStatus::Dispute
        } else if approved == count {
            GlobalApprovalStatus::Approved
        } else if rejected == count {
            GlobalApprovalStatus::Rejected
        } else {
            GlobalApprovalStatus::Pending
        }
    }
}

fn invalid(approval: &Approval, action: &'static str) -> ApprovalError {
    ApprovalError::InvalidState {
        institution_id: approval.institution_id.clone(),
        action,
        status: approval.status,
    }
}
