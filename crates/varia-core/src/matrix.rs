//! Variant matrix expansion.
//!
//! A matrix expands to the cartesian product of its axes, taken in
//! declaration order, minus every combination that subset-matches an
//! exclusion. Expansion is pure: the partial assignment is threaded by value
//! through the recursion and nothing is shared between branches.

use varia_schema::{VariantMatrix, VariantParameters};

/// Expand `matrix` into every non-excluded combination.
///
/// An empty matrix expands to nothing. Output order is deterministic: the
/// first axis varies slowest.
pub fn expand(matrix: &VariantMatrix, exclusions: &[VariantParameters]) -> Vec<VariantParameters> {
    if matrix.is_empty() {
        return Vec::new();
    }
    let axes: Vec<(&str, &[String])> = matrix.axes().collect();
    expand_axes(&axes, VariantParameters::new(), exclusions)
}

fn expand_axes(
    axes: &[(&str, &[String])],
    partial: VariantParameters,
    exclusions: &[VariantParameters],
) -> Vec<VariantParameters> {
    let Some(((key, candidates), rest)) = axes.split_first() else {
        if is_excluded(&partial, exclusions) {
            return Vec::new();
        }
        return vec![partial];
    };

    candidates
        .iter()
        .flat_map(|value| expand_axes(rest, partial.with(*key, value.as_str()), exclusions))
        .collect()
}

/// Whether `combination` is forbidden by any exclusion. Stops at the first hit.
pub fn is_excluded(combination: &VariantParameters, exclusions: &[VariantParameters]) -> bool {
    exclusions
        .iter()
        .any(|exclusion| subset_matches(combination, exclusion))
}

/// Every key of `exclusion` is present in `combination` with the same value.
///
/// Keys absent from the exclusion are ignored, so an empty exclusion matches
/// everything.
pub fn subset_matches(combination: &VariantParameters, exclusion: &VariantParameters) -> bool {
    exclusion
        .iter()
        .all(|(key, value)| combination.get(key) == Some(value))
}
