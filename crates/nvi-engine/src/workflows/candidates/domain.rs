use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an organization in the external registry (URI-like, opaque).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrganizationId(pub String);

impl OrganizationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the publication the facts describe.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicationId(pub String);

/// Identifier of a candidate aggregate. One candidate exists per publication.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub String);

impl From<&PublicationId> for CandidateId {
    fn from(value: &PublicationId) -> Self {
        Self(value.0.clone())
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a reviewer acting on behalf of an institution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Username(pub String);

impl Username {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Publication categories that can be scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InstanceType {
    AcademicArticle,
    AcademicLiteratureReview,
    AcademicMonograph,
    AcademicCommentary,
    AcademicChapter,
}

impl InstanceType {
    pub const fn label(self) -> &'static str {
        match self {
            InstanceType::AcademicArticle => "AcademicArticle",
            InstanceType::AcademicLiteratureReview => "AcademicLiteratureReview",
            InstanceType::AcademicMonograph => "AcademicMonograph",
            InstanceType::AcademicCommentary => "AcademicCommentary",
            InstanceType::AcademicChapter => "AcademicChapter",
        }
    }

    /// Channel types a publication of this category may be published in.
    pub const fn accepts_channel(self, channel_type: ChannelType) -> bool {
        match self {
            InstanceType::AcademicArticle | InstanceType::AcademicLiteratureReview => {
                matches!(channel_type, ChannelType::Journal)
            }
            InstanceType::AcademicMonograph
            | InstanceType::AcademicCommentary
            | InstanceType::AcademicChapter => {
                matches!(channel_type, ChannelType::Series | ChannelType::Publisher)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    Journal,
    Series,
    Publisher,
}

/// Level assigned to a publication channel by the national register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScientificValue {
    Unassigned,
    LevelZero,
    LevelOne,
    LevelTwo,
}

impl ScientificValue {
    pub const fn is_rated(self) -> bool {
        matches!(self, ScientificValue::LevelOne | ScientificValue::LevelTwo)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicationChannel {
    pub id: String,
    pub channel_type: ChannelType,
    pub scientific_value: ScientificValue,
}

/// How a contributor is identified on the publication.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CreatorIdentity {
    Verified(String),
    Unverified(String),
}

impl CreatorIdentity {
    pub fn key(&self) -> &str {
        match self {
            CreatorIdentity::Verified(id) => id,
            CreatorIdentity::Unverified(name) => name,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, CreatorIdentity::Verified(_))
    }

    pub(crate) fn is_blank(&self) -> bool {
        self.key().trim().is_empty()
    }
}

impl fmt::Display for CreatorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub identity: CreatorIdentity,
    #[serde(default)]
    pub affiliations: Vec<OrganizationId>,
}

impl Creator {
    pub fn verified(id: impl Into<String>, affiliations: Vec<OrganizationId>) -> Self {
        Self {
            identity: CreatorIdentity::Verified(id.into()),
            affiliations,
        }
    }

    pub fn unverified(name: impl Into<String>, affiliations: Vec<OrganizationId>) -> Self {
        Self {
            identity: CreatorIdentity::Unverified(name.into()),
            affiliations,
        }
    }
}

/// Raw facts about a publication as supplied by the upstream evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationFacts {
    pub publication_id: PublicationId,
    pub instance_type: InstanceType,
    pub channel: PublicationChannel,
    pub creators: Vec<Creator>,
}

impl PublicationFacts {
    pub fn candidate_id(&self) -> CandidateId {
        CandidateId::from(&self.publication_id)
    }

    /// Every affiliation mentioned by any creator, deduplicated, in first-seen order.
    pub fn affiliations(&self) -> Vec<OrganizationId> {
        let mut seen = Vec::new();
        for affiliation in self
            .creators
            .iter()
            .flat_map(|creator| creator.affiliations.iter())
        {
            if !seen.contains(affiliation) {
                seen.push(affiliation.clone());
            }
        }
        seen
    }
}
