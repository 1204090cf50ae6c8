use std::collections::BTreeMap;

use rust_decimal::Decimal;

use super::super::domain::{CreatorIdentity, OrganizationId, PublicationFacts};
use super::super::organization::OrganizationHierarchy;
use super::table::base_points;
use super::{
    round_points, CreatorAffiliationPoints, ExcludedAffiliation, ExclusionReason,
    InstitutionPoints, InvalidPublicationFacts, PointCalculation, PointCalculationError,
    PointEvaluation, POINT_SCALE,
};

const INTERNATIONAL_COLLABORATION_FACTOR: Decimal = Decimal::from_parts(13, 0, 0, false, 1);

/// A creator after merging duplicate entries, with affiliations grouped by institution.
struct EligibleCreator {
    identity: CreatorIdentity,
    institutions: Vec<(OrganizationId, Vec<OrganizationId>)>,
}

pub(crate) fn calculate(
    facts: &PublicationFacts,
    hierarchy: &OrganizationHierarchy,
) -> Result<PointEvaluation, PointCalculationError> {
    let channel = &facts.channel;
    let base = base_points(facts.instance_type, channel.scientific_value)
        .ok_or(InvalidPublicationFacts::ChannelNotRated(channel.scientific_value))?;
    if !facts.instance_type.accepts_channel(channel.channel_type) {
        return Err(InvalidPublicationFacts::IncompatibleChannel {
            instance_type: facts.instance_type,
            channel_type: channel.channel_type,
        }
        .into());
    }

    let creators = merge_creators(facts)?;
    let mut excluded = Vec::new();
    let mut eligible = Vec::new();

    for (identity, affiliations) in creators {
        let mut institutions: Vec<(OrganizationId, Vec<OrganizationId>)> = Vec::new();
        for affiliation in affiliations {
            match hierarchy.resolve_top_level(&affiliation) {
                Ok(root) => match institutions.iter_mut().find(|(id, _)| id == &root.id) {
                    Some((_, direct)) => direct.push(affiliation),
                    None => institutions.push((root.id.clone(), vec![affiliation])),
                },
                Err(_) => excluded.push(ExcludedAffiliation {
                    creator: identity.clone(),
                    affiliation_id: affiliation,
                    reason: ExclusionReason::NotInSnapshot,
                }),
            }
        }
        if !institutions.is_empty() {
            eligible.push(EligibleCreator {
                identity,
                institutions,
            });
        }
    }

    if eligible.is_empty() {
        return Err(InvalidPublicationFacts::NoResolvableCreators.into());
    }

    let creator_share_count = eligible.len() as u32;
    let mut distinct_institutions: Vec<&OrganizationId> = eligible
        .iter()
        .flat_map(|creator| creator.institutions.iter().map(|(id, _)| id))
        .collect();
    distinct_institutions.sort();
    distinct_institutions.dedup();

    let is_international_collaboration = distinct_institutions.len() >= 2;
    let collaboration_factor = if is_international_collaboration {
        INTERNATIONAL_COLLABORATION_FACTOR
    } else {
        Decimal::ONE
    };

    let creator_share = base
        .checked_mul(collaboration_factor)
        .and_then(|points| points.checked_div(Decimal::from(creator_share_count)))
        .ok_or_else(|| overflow("creator share"))?;

    let mut grouped: BTreeMap<OrganizationId, Vec<CreatorAffiliationPoints>> = BTreeMap::new();
    for creator in &eligible {
        let institution_share = creator_share
            .checked_div(Decimal::from(creator.institutions.len() as u32))
            .ok_or_else(|| overflow("institution share"))?;
        for (institution_id, affiliations) in &creator.institutions {
            let affiliation_share = institution_share
                .checked_div(Decimal::from(affiliations.len() as u32))
                .ok_or_else(|| overflow("affiliation share"))?;
            let entries = grouped.entry(institution_id.clone()).or_default();
            for affiliation in affiliations {
                entries.push(CreatorAffiliationPoints {
                    creator: creator.identity.clone(),
                    affiliation_id: affiliation.clone(),
                    points: round_points(affiliation_share),
                });
            }
        }
    }

    let mut institution_points = Vec::new();
    for (institution_id, entries) in grouped {
        let total = sum(entries.iter().map(|entry| entry.points))?;
        if total.is_zero() {
            tracing::debug!(institution = %institution_id, "institution share rounds to zero");
            continue;
        }
        institution_points.push(InstitutionPoints {
            institution_id,
            institution_points: round_points(total),
            creator_affiliation_points: entries,
        });
    }

    let total_points = round_points(sum(
        institution_points
            .iter()
            .map(|entry| entry.institution_points),
    )?);

    Ok(PointEvaluation {
        calculation: PointCalculation {
            instance_type: facts.instance_type,
            channel: channel.clone(),
            is_international_collaboration,
            collaboration_factor,
            base_points: round_points(base),
            creator_share_count,
            total_points,
            institution_points,
        },
        excluded_affiliations: excluded,
    })
}

/// Post-conditions every calculation must satisfy before it may be stored.
pub(crate) fn verify(calculation: &PointCalculation) -> Result<(), PointCalculationError> {
    if calculation.total_points.is_sign_negative() || calculation.base_points.is_sign_negative() {
        return Err(PointCalculationError::CalculationInvariantViolation(
            "negative point value".to_string(),
        ));
    }

    let mut institution_total = Decimal::ZERO;
    for institution in &calculation.institution_points {
        if institution.institution_points <= Decimal::ZERO {
            return Err(PointCalculationError::CalculationInvariantViolation(format!(
                "institution {} has non-positive points",
                institution.institution_id
            )));
        }
        if institution.institution_points.scale() != POINT_SCALE {
            return Err(PointCalculationError::CalculationInvariantViolation(format!(
                "institution {} points not stored with {POINT_SCALE} decimals",
                institution.institution_id
            )));
        }
        let entries = sum(
            institution
                .creator_affiliation_points
                .iter()
                .map(|entry| entry.points),
        )?;
        if institution
            .creator_affiliation_points
            .iter()
            .any(|entry| entry.points.is_sign_negative())
            || entries != institution.institution_points
        {
            return Err(PointCalculationError::CalculationInvariantViolation(format!(
                "creator points for {} do not add up to {}",
                institution.institution_id, institution.institution_points
            )));
        }
        institution_total = institution_total
            .checked_add(institution.institution_points)
            .ok_or_else(|| overflow("institution total"))?;
    }

    let tolerance = Decimal::new(1, POINT_SCALE)
        * Decimal::from(calculation.institution_points.len().max(1) as u32);
    if (institution_total - calculation.total_points).abs() > tolerance {
        return Err(PointCalculationError::CalculationInvariantViolation(format!(
            "institution points {} differ from total {}",
            institution_total, calculation.total_points
        )));
    }
    Ok(())
}

fn merge_creators(
    facts: &PublicationFacts,
) -> Result<Vec<(CreatorIdentity, Vec<OrganizationId>)>, InvalidPublicationFacts> {
    let mut merged: Vec<(CreatorIdentity, Vec<OrganizationId>)> = Vec::new();
    for (index, creator) in facts.creators.iter().enumerate() {
        if creator.identity.is_blank() {
            return Err(InvalidPublicationFacts::BlankCreator { index });
        }
        let slot = match merged
            .iter()
            .position(|(identity, _)| identity == &creator.identity)
        {
            Some(slot) => slot,
            None => {
                merged.push((creator.identity.clone(), Vec::new()));
                merged.len() - 1
            }
        };
        let affiliations = &mut merged[slot].1;
        for affiliation in &creator.affiliations {
            if !affiliations.contains(affiliation) {
                affiliations.push(affiliation.clone());
            }
        }
    }
    Ok(merged)
}

fn sum(mut values: impl Iterator<Item = Decimal>) -> Result<Decimal, PointCalculationError> {
    values.try_fold(Decimal::ZERO, |acc, value| {
        acc.checked_add(value).ok_or_else(|| overflow("sum"))
    })
}

fn overflow(stage: &str) -> PointCalculationError {
    PointCalculationError::CalculationInvariantViolation(format!("arithmetic overflow in {stage}"))
}
