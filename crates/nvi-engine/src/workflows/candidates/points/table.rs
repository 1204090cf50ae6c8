use rust_decimal::Decimal;

use super::super::domain::{InstanceType, ScientificValue};

/// Base points awarded to a publication category on a channel of the given level.
///
/// Returns `None` for channels that are not rated (Unassigned, LevelZero).
pub(crate) fn base_points(instance_type: InstanceType, value: ScientificValue) -> Option<Decimal> {
    use InstanceType::*;
    use ScientificValue::*;

    let points = match (instance_type, value) {
        (_, Unassigned) | (_, LevelZero) => return None,
        (AcademicArticle, LevelOne) | (AcademicLiteratureReview, LevelOne) => Decimal::ONE,
        (AcademicArticle, LevelTwo) | (AcademicLiteratureReview, LevelTwo) => Decimal::from(3),
        (AcademicMonograph, LevelOne) | (AcademicCommentary, LevelOne) => Decimal::from(5),
        (AcademicMonograph, LevelTwo) | (AcademicCommentary, LevelTwo) => Decimal::from(8),
        (AcademicChapter, LevelOne) => Decimal::new(7, 1),
        (AcademicChapter, LevelTwo) => Decimal::ONE,
    };
    Some(points)
}
