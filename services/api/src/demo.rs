use crate::infra::{InMemoryCandidateRepository, InMemoryOrganizationRegistry, TracingUpdatePublisher};
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use nvi_engine::config::CandidateConfig;
use nvi_engine::error::AppError;
use nvi_engine::workflows::candidates::{
    ApprovalAction, ApprovalDecision, ApprovalRequest, CandidateService, CandidateServiceError,
    ChannelType, Creator, InstanceType, OrganizationHierarchy, OrganizationId,
    PointCalculationError, PointCalculator, PointEvaluation, PublicationChannel, PublicationFacts,
    PublicationId, ScientificValue, Username, VersionedCandidate,
};
use std::path::PathBuf;
use std::sync::Arc;

type DemoService =
    CandidateService<InMemoryCandidateRepository, TracingUpdatePublisher, InMemoryOrganizationRegistry>;

const UIO: &str = "https://org.example/uio";
const UIO_MED: &str = "https://org.example/uio/med";
const NTNU: &str = "https://org.example/ntnu";
const NTNU_IE: &str = "https://org.example/ntnu/ie";
const SINTEF: &str = "https://org.example/sintef";

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// JSON file with the publication facts to score
    #[arg(long)]
    pub(crate) facts: PathBuf,
    /// JSON array of organizations (defaults to the built-in sample registry)
    #[arg(long)]
    pub(crate) organizations: Option<PathBuf>,
    /// Print the full calculation as JSON instead of a summary
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Run a single scenario instead of all four
    #[arg(long, value_enum)]
    pub(crate) scenario: Option<Scenario>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Scenario {
    /// One creator, one institution
    A,
    /// Two institutions share the collaboration bonus
    B,
    /// A rejection disputes an approval until it is reopened and decided again
    C,
    /// Recalculation removes an institution that had already approved
    D,
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let ScoreArgs {
        facts,
        organizations,
        json,
    } = args;

    let facts: PublicationFacts = serde_json::from_str(&std::fs::read_to_string(facts)?)?;
    let registry = match organizations {
        Some(path) => InMemoryOrganizationRegistry::from_json_file(&path)?,
        None => InMemoryOrganizationRegistry::sample(),
    };

    let evaluation = score_facts(&facts, &registry)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&evaluation)?);
    } else {
        render_evaluation(&facts, &evaluation);
    }
    Ok(())
}

pub(crate) fn score_facts(
    facts: &PublicationFacts,
    registry: &InMemoryOrganizationRegistry,
) -> Result<PointEvaluation, AppError> {
    let (hierarchy, failures) = OrganizationHierarchy::snapshot(registry, &facts.affiliations());
    let mut evaluation = PointCalculator::new()
        .compute(facts, &hierarchy)
        .map_err(|error| match error {
            PointCalculationError::InvalidPublicationFacts(reason) => {
                CandidateServiceError::NotApplicable(reason)
            }
            other => CandidateServiceError::from(other),
        })?;
    evaluation.attribute_fetch_failures(&failures);
    Ok(evaluation)
}

fn render_evaluation(facts: &PublicationFacts, evaluation: &PointEvaluation) {
    let calculation = &evaluation.calculation;
    println!("Publication {}", facts.publication_id.0);
    println!(
        "- {} in {:?} channel {} ({:?})",
        calculation.instance_type.label(),
        calculation.channel.channel_type,
        calculation.channel.id,
        calculation.channel.scientific_value
    );
    println!(
        "- base {} x factor {} over {} creator shares = {} points",
        calculation.base_points,
        calculation.collaboration_factor,
        calculation.creator_share_count,
        calculation.total_points
    );
    println!("Institutions");
    for institution in &calculation.institution_points {
        println!(
            "  - {}: {}",
            institution.institution_id, institution.institution_points
        );
        for entry in &institution.creator_affiliation_points {
            println!(
                "      {} via {}: {}",
                entry.creator, entry.affiliation_id, entry.points
            );
        }
    }
    if evaluation.excluded_affiliations.is_empty() {
        println!("Excluded affiliations: none");
    } else {
        println!("Excluded affiliations");
        for excluded in &evaluation.excluded_affiliations {
            println!(
                "  - {} via {}: {:?}",
                excluded.creator, excluded.affiliation_id, excluded.reason
            );
        }
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let scenarios = match args.scenario {
        Some(scenario) => vec![scenario],
        None => vec![Scenario::A, Scenario::B, Scenario::C, Scenario::D],
    };

    println!("NVI candidate engine demo");
    for scenario in scenarios {
        let service = demo_service();
        let at = Utc::now();
        let (title, candidate) = match scenario {
            Scenario::A => ("A: single creator", scenario_single_creator(&service)?),
            Scenario::B => (
                "B: two institutions",
                scenario_two_institutions(&service)?,
            ),
            Scenario::C => ("C: dispute and reopen", scenario_dispute(&service, at)?),
            Scenario::D => (
                "D: institution loses its points",
                scenario_recalculation(&service, at)?,
            ),
        };
        println!("\nScenario {title}");
        render_candidate(&candidate);
    }
    Ok(())
}

fn demo_service() -> DemoService {
    CandidateService::new(
        Arc::new(InMemoryCandidateRepository::default()),
        Arc::new(TracingUpdatePublisher),
        Arc::new(InMemoryOrganizationRegistry::sample()),
        &CandidateConfig::default(),
    )
}

fn article(publication: &str, creators: Vec<Creator>) -> PublicationFacts {
    PublicationFacts {
        publication_id: PublicationId(publication.to_string()),
        instance_type: InstanceType::AcademicArticle,
        channel: PublicationChannel {
            id: "https://channels.example/journal/4711".to_string(),
            channel_type: ChannelType::Journal,
            scientific_value: ScientificValue::LevelOne,
        },
        creators,
    }
}

fn creator(name: &str, affiliation: &str) -> Creator {
    Creator::verified(name, vec![OrganizationId::new(affiliation)])
}

fn decision(institution: &str, decision: ApprovalDecision) -> ApprovalRequest {
    ApprovalRequest {
        institution_id: OrganizationId::new(institution),
        action: ApprovalAction::Decide {
            decision,
            reason: None,
        },
        actor: Username::new("demo-curator"),
        expected_version: None,
    }
}

fn scenario_single_creator(service: &DemoService) -> Result<VersionedCandidate, AppError> {
    let report = service.evaluate(article("demo-a", vec![creator("alice", UIO_MED)]))?;
    Ok(report.candidate)
}

fn scenario_two_institutions(service: &DemoService) -> Result<VersionedCandidate, AppError> {
    let report = service.evaluate(article(
        "demo-b",
        vec![creator("alice", UIO_MED), creator("bob", NTNU_IE)],
    ))?;
    Ok(report.candidate)
}

fn scenario_dispute(
    service: &DemoService,
    at: DateTime<Utc>,
) -> Result<VersionedCandidate, AppError> {
    let facts = article(
        "demo-c",
        vec![creator("alice", UIO_MED), creator("bob", NTNU_IE)],
    );
    let id = facts.candidate_id();
    service.evaluate(facts)?;

    service.update_approval_at(&id, decision(UIO, ApprovalDecision::Approved), at)?;
    let disputed =
        service.update_approval_at(&id, decision(NTNU, ApprovalDecision::Rejected), at)?;
    println!(
        "\n  after {NTNU} rejects: {}",
        disputed.candidate.global_status().label()
    );
    let reopened = service.update_approval_at(
        &id,
        ApprovalRequest {
            action: ApprovalAction::Reopen,
            ..decision(NTNU, ApprovalDecision::Rejected)
        },
        at,
    )?;
    println!(
        "  after {NTNU} reopens: {}",
        reopened.candidate.global_status().label()
    );
    Ok(service.update_approval_at(&id, decision(NTNU, ApprovalDecision::Approved), at)?)
}

fn scenario_recalculation(
    service: &DemoService,
    at: DateTime<Utc>,
) -> Result<VersionedCandidate, AppError> {
    let facts = article(
        "demo-d",
        vec![creator("alice", UIO_MED), creator("zed", SINTEF)],
    );
    let id = facts.candidate_id();
    service.evaluate(facts)?;
    service.update_approval_at(&id, decision(SINTEF, ApprovalDecision::Approved), at)?;

    let report = service.evaluate(article("demo-d", vec![creator("alice", UIO_MED)]))?;
    println!(
        "\n  after recalculation: {} institution(s), {}",
        report.candidate.candidate.approvals.len(),
        report.candidate.candidate.global_status().label()
    );
    Ok(report.candidate)
}

fn render_candidate(stored: &VersionedCandidate) {
    let view = stored.view();
    println!(
        "  candidate {} v{} | {} points | international: {} | status: {}",
        view.candidate_id,
        view.version,
        view.total_points,
        view.is_international_collaboration,
        view.global_status
    );
    for institution in &view.institutions {
        println!(
            "  - {}: {} points, {}",
            institution.institution_id, institution.points, institution.status
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvi_engine::workflows::candidates::{ExclusionReason, GlobalApprovalStatus};

    #[test]
    fn scenarios_reach_expected_states() {
        let single = scenario_single_creator(&demo_service()).expect("scenario A");
        assert_eq!(single.candidate.points.total_points.to_string(), "1.0000");

        let shared = scenario_two_institutions(&demo_service()).expect("scenario B");
        assert!(shared.candidate.points.is_international_collaboration);
        assert_eq!(shared.candidate.points.total_points.to_string(), "1.3000");

        let settled = scenario_dispute(&demo_service(), Utc::now()).expect("scenario C");
        assert_eq!(
            settled.candidate.global_status(),
            GlobalApprovalStatus::Approved
        );

        let trimmed = scenario_recalculation(&demo_service(), Utc::now()).expect("scenario D");
        assert_eq!(trimmed.candidate.approvals.len(), 1);
        assert!(trimmed
            .candidate
            .approval(&OrganizationId::new(SINTEF))
            .is_none());
        assert_eq!(
            trimmed.candidate.global_status(),
            GlobalApprovalStatus::Pending
        );
    }

    #[test]
    fn run_demo_covers_all_scenarios() {
        assert!(run_demo(DemoArgs::default()).is_ok());
    }

    #[test]
    fn score_reports_unknown_affiliations() {
        let facts = article(
            "score-1",
            vec![Creator::verified(
                "alice",
                vec![
                    OrganizationId::new(UIO_MED),
                    OrganizationId::new("https://org.example/gone"),
                ],
            )],
        );
        let evaluation =
            score_facts(&facts, &InMemoryOrganizationRegistry::sample()).expect("scores");
        assert_eq!(evaluation.calculation.total_points.to_string(), "1.0000");
        assert!(matches!(
            evaluation.excluded_affiliations[0].reason,
            ExclusionReason::FetchFailed(_)
        ));
    }

    #[test]
    fn score_rejects_unrated_channels() {
        let mut facts = article("score-2", vec![creator("alice", UIO_MED)]);
        facts.channel.scientific_value = ScientificValue::Unassigned;
        assert!(matches!(
            score_facts(&facts, &InMemoryOrganizationRegistry::sample()),
            Err(AppError::Candidate(CandidateServiceError::NotApplicable(_)))
        ));
    }
}
