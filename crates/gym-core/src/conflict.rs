//! Trainer schedule conflict detection

use gym_api::Class;
use gym_util::{ClassId, Schedule, TrainerId};

/// Classes of `trainer_id` whose schedule overlaps `candidate`, in the
/// order given.
///
/// Archived classes, `exclude`, and classes with freeform schedules are
/// skipped. Freeform schedules carry no day information, so matching them
/// is best-effort by construction.
pub fn find_conflicts<'a>(
    classes: &'a [Class],
    trainer_id: &TrainerId,
    candidate: &Schedule,
    exclude: Option<&ClassId>,
) -> Vec<&'a Class> {
    classes
        .iter()
        .filter(|class| &class.trainer_id == trainer_id)
        .filter(|class| !class.archived)
        .filter(|class| exclude != Some(&class.class_id))
        .filter(|class| {
            class
                .schedule
                .as_schedule()
                .is_some_and(|existing| existing.overlaps(candidate))
        })
        .collect()
}

/// First conflicting class, if any
pub fn find_conflict<'a>(
    classes: &'a [Class],
    trainer_id: &TrainerId,
    candidate: &Schedule,
    exclude: Option<&ClassId>,
) -> Option<&'a Class> {
    find_conflicts(classes, trainer_id, candidate, exclude)
        .into_iter()
        .next()
}
