use std::collections::BTreeSet;

use crate::models::{
    availability::{Availability, ModuleAvailability},
    question::Question,
};

/// Aggregates a subject's pool by module. Questions whose CO tag has no
/// module number are counted as unbucketable and left out of every grid.
pub fn compute_availability(subject: &str, questions: &[Question]) -> Availability {
    let mut availability = Availability {
        subject: subject.to_string(),
        ..Default::default()
    };
    let mut marks_values = BTreeSet::new();
    let mut rbt_levels = BTreeSet::new();
    let mut types = BTreeSet::new();

    for question in questions {
        let Some(module) = question.module() else {
            tracing::debug!(
                question_id = %question.id,
                co = %question.co,
                "Question has no module number in its CO tag, skipping"
            );
            availability.unbucketable += 1;
            continue;
        };

        let entry = availability
            .per_module
            .entry(module)
            .or_insert_with(ModuleAvailability::default);

        *entry.by_marks.entry(question.marks).or_insert(0) += 1;
        marks_values.insert(question.marks);

        if let Some(level) = question.rbt {
            *entry.by_rbt.entry(level).or_insert(0) += 1;
            rbt_levels.insert(level);
        }

        let question_type = question.question_type.trim();
        if !question_type.is_empty() {
            *entry.by_type.entry(question_type.to_string()).or_insert(0) += 1;
            types.insert(question_type.to_string());
        }
    }

    availability.modules = availability.per_module.keys().copied().collect();
    availability.marks_values = marks_values.into_iter().collect();
    availability.rbt_levels = rbt_levels.into_iter().collect();
    availability.types = types.into_iter().collect();
    availability
}
