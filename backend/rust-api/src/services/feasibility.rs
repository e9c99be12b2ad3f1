use crate::error::AppError;
use crate::models::{
    availability::Availability,
    blueprint::{Distribution, DistributionTotals, Shortfall, MAX_QUESTIONS_PER_CELL},
};

/// Every (module, marks) cell whose required count exceeds what the pool
/// holds. An empty result means the distribution is feasible.
pub fn find_shortfalls(distribution: &Distribution, availability: &Availability) -> Vec<Shortfall> {
    let mut shortfalls = Vec::new();
    for (module, marks_map) in distribution {
        for (marks, required) in marks_map {
            let available = availability.count(*module, *marks);
            if *required > available {
                shortfalls.push(Shortfall {
                    module: *module,
                    marks: *marks,
                    required: *required,
                    available,
                });
            }
        }
    }
    shortfalls
}

/// Structural checks on a distribution against the declared totals.
pub fn check_distribution(
    distribution: &Distribution,
    total_marks: u32,
    total_questions: Option<u32>,
) -> Result<DistributionTotals, AppError> {
    if distribution.is_empty() {
        return Err(AppError::Validation("distribution is required".to_string()));
    }
    if distribution.contains_key(&0) {
        return Err(AppError::Validation(
            "Module numbers must be positive integers".to_string(),
        ));
    }
    if distribution.values().any(|m| m.contains_key(&0)) {
        return Err(AppError::Validation(
            "Marks values must be positive integers".to_string(),
        ));
    }

    let oversized = distribution
        .values()
        .flat_map(|marks_map| marks_map.values())
        .any(|count| *count > MAX_QUESTIONS_PER_CELL);
    if oversized {
        return Err(AppError::Validation(format!(
            "A module/marks cell may request at most {} questions",
            MAX_QUESTIONS_PER_CELL
        )));
    }

    let totals = DistributionTotals::of(distribution)
        .ok_or_else(|| AppError::Validation("distribution totals overflow".to_string()))?;
    if totals.total_questions == 0 {
        return Err(AppError::Validation(
            "distribution must request at least one question".to_string(),
        ));
    }
    if totals.total_marks != total_marks {
        return Err(AppError::Validation(format!(
            "Distribution total marks ({}) does not match blueprint total marks ({})",
            totals.total_marks, total_marks
        )));
    }
    if let Some(expected) = total_questions {
        if totals.total_questions != expected {
            return Err(AppError::Validation(format!(
                "Distribution question count ({}) does not match blueprint total questions ({})",
                totals.total_questions, expected
            )));
        }
    }
    Ok(totals)
}
