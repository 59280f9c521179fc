//! Class index post-processing
//!
//! Turns raw model output into a predicted class and maps the class to
//! its recommendation text.

use crate::error::ClassifyError;
use crate::models::Classification;

/// Recommendation per predicted class; the index is the class
pub const RECOMMENDATIONS: [&str; 4] = [
    "No changes needed",
    "Increase kernel parameters",
    "Decrease kernel parameters",
    "Upgrade resources (RAM/CPU/Disk)",
];

/// Build the classification for `class`, failing on any index outside the table
pub fn recommendation_for(class: i64) -> Result<Classification, ClassifyError> {
    let index = usize::try_from(class).map_err(|_| ClassifyError::UnknownClass(class))?;
    let recommendation = RECOMMENDATIONS
        .get(index)
        .ok_or(ClassifyError::UnknownClass(class))?;

    Ok(Classification {
        predicted_class: index as u32,
        recommendation: (*recommendation).to_string(),
    })
}

/// Index of the highest score; the first wins on ties
pub fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (i, &s)| match best {
            Some((_, b)) if b >= s => best,
            _ => Some((i, s)),
        })
        .map(|(i, _)| i)
}
