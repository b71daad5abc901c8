//! Variant resolution policy.
//!
//! Given a package's ordered variant definitions and a consumer's
//! parameters, pick the first definition that matches and render its
//! pattern into a new descriptor. Matching can be customised per parameter
//! with a [`ParameterComparator`]; rendering always substitutes the
//! consumer's literal values.

use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use varia_schema::{Descriptor, VariantDefinition, VariantParameters};

use crate::error::ResolveError;
use crate::matrix::expand;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%[A-Za-z_][A-Za-z0-9_]*").expect("token pattern is valid"));

/// Decides whether a consumer's value is acceptable for a candidate value.
pub trait ParameterComparator: Send + Sync {
    fn matches(&self, consumer: &str, candidate: &str) -> bool;
}

impl<F> ParameterComparator for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn matches(&self, consumer: &str, candidate: &str) -> bool {
        self(consumer, candidate)
    }
}

/// String equality. The default for every parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exact;

impl ParameterComparator for Exact {
    fn matches(&self, consumer: &str, candidate: &str) -> bool {
        consumer == candidate
    }
}

/// Numeric `consumer >= candidate`, for backwards-compatible levels such as
/// ABI versions. Non-numeric values never match.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtLeast;

impl ParameterComparator for AtLeast {
    fn matches(&self, consumer: &str, candidate: &str) -> bool {
        match (consumer.trim().parse::<f64>(), candidate.trim().parse::<f64>()) {
            (Ok(consumer), Ok(candidate)) => consumer >= candidate,
            _ => false,
        }
    }
}

static EXACT: Exact = Exact;

/// Named registry of comparators, falling back to [`Exact`].
#[derive(Clone, Default)]
pub struct Comparators {
    by_key: HashMap<String, Arc<dyn ParameterComparator>>,
}

impl Comparators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `comparator` for parameter `key`.
    pub fn with(mut self, key: impl Into<String>, comparator: impl ParameterComparator + 'static) -> Self {
        self.by_key.insert(key.into(), Arc::new(comparator));
        self
    }

    pub fn get(&self, key: &str) -> &dyn ParameterComparator {
        match self.by_key.get(key) {
            Some(comparator) => comparator.as_ref(),
            None => &EXACT,
        }
    }
}

impl fmt::Debug for Comparators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.by_key.keys().collect();
        keys.sort();
        f.debug_struct("Comparators").field("custom", &keys).finish()
    }
}

/// The outcome of a successful policy run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantMatch {
    /// Position of the winning definition.
    pub index: usize,
    /// The matched combination; `None` for a fallback.
    pub combination: Option<VariantParameters>,
    /// The rendered pattern.
    pub descriptor: Descriptor,
}

/// First combination whose every key is supplied by the consumer and
/// accepted by that key's comparator. Consumer keys outside the combination
/// are ignored.
pub fn find_match<'a>(
    combinations: &'a [VariantParameters],
    parameters: &VariantParameters,
    comparators: &Comparators,
) -> Option<&'a VariantParameters> {
    combinations.iter().find(|combination| {
        combination.iter().all(|(key, candidate)| {
            parameters
                .get(key)
                .is_some_and(|consumer| comparators.get(key).matches(consumer, candidate))
        })
    })
}

/// Substitute every `%key` in `pattern` with the consumer's value.
///
/// Keys are applied longest first so `%par1` cannot clobber `%par10`.
pub fn render_pattern(
    pattern: &str,
    parameters: &VariantParameters,
) -> Result<Descriptor, ResolveError> {
    let mut keys: Vec<(&str, &str)> = parameters.iter().collect();
    keys.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

    let mut rendered = pattern.to_string();
    for (key, value) in keys {
        rendered = rendered.replace(&format!("%{key}"), value);
    }

    parse_rendered(pattern, &rendered)
}

fn parse_rendered(pattern: &str, rendered: &str) -> Result<Descriptor, ResolveError> {
    if let Some(token) = TOKEN.find(rendered) {
        return Err(ResolveError::TemplateContract {
            pattern: pattern.to_string(),
            reason: format!("unresolved token `{}`", token.as_str()),
        });
    }
    Descriptor::parse(rendered).map_err(|err| ResolveError::TemplateContract {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    })
}

/// Run the policy over `definitions` in declared order.
///
/// Returns `Ok(None)` when nothing matches. Callers decide what "no match"
/// means for them; nothing here falls back to the original dependency.
pub fn resolve_variant(
    definitions: &[VariantDefinition],
    parameters: &VariantParameters,
    comparators: &Comparators,
) -> Result<Option<VariantMatch>, ResolveError> {
    for (index, definition) in definitions.iter().enumerate() {
        match definition {
            VariantDefinition::Fallback { pattern } => {
                return Ok(Some(VariantMatch {
                    index,
                    combination: None,
                    descriptor: parse_rendered(pattern, pattern)?,
                }));
            }
            VariantDefinition::Matrix {
                pattern,
                matrix,
                exclude,
            } => {
                let combinations = expand(matrix, exclude);
                if let Some(combination) = find_match(&combinations, parameters, comparators) {
                    return Ok(Some(VariantMatch {
                        index,
                        combination: Some(combination.clone()),
                        descriptor: render_pattern(pattern, parameters)?,
                    }));
                }
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use varia_schema::VariantMatrix;

    fn params(pairs: &[(&str, &str)]) -> VariantParameters {
        pairs.iter().copied().collect()
    }

    fn matrix_def(pattern: &str, matrix: VariantMatrix, exclude: Vec<VariantParameters>) -> VariantDefinition {
        VariantDefinition::Matrix {
            pattern: pattern.into(),
            matrix,
            exclude,
        }
    }

    fn abc_by_one() -> VariantMatrix {
        VariantMatrix::new()
            .with_axis("par1", ["a", "b", "c"])
            .with_axis("par2", ["1"])
    }

    #[test]
    fn matrix_match_renders_consumer_values() {
        let defs = [matrix_def("name-%par1-%par2@1.0.0", abc_by_one(), vec![])];
        let found = resolve_variant(&defs, &params(&[("par1", "a"), ("par2", "1")]), &Comparators::new())
            .unwrap()
            .unwrap();

        assert_eq!(found.index, 0);
        assert_eq!(found.descriptor.to_string(), "name-a-1@1.0.0");
        assert_eq!(found.combination, Some(params(&[("par1", "a"), ("par2", "1")])));
    }

    #[test]
    fn fallback_matches_anything_unchanged() {
        let defs = [VariantDefinition::Fallback {
            pattern: "name-fallback@1.0.0".into(),
        }];
        for consumer in [params(&[]), params(&[("par1", "zzz")])] {
            let found = resolve_variant(&defs, &consumer, &Comparators::new())
                .unwrap()
                .unwrap();
            assert_eq!(found.descriptor.to_string(), "name-fallback@1.0.0");
            assert!(found.combination.is_none());
        }
    }

    #[test]
    fn fallback_with_token_fails_loudly() {
        let defs = [VariantDefinition::Fallback {
            pattern: "name-%par1@1.0.0".into(),
        }];
        let err = resolve_variant(&defs, &params(&[("par1", "a")]), &Comparators::new()).unwrap_err();
        assert!(matches!(err, ResolveError::TemplateContract { .. }));
    }

    #[test]
    fn first_matching_definition_wins() {
        let defs = [
            matrix_def("first-%par1@1.0.0", VariantMatrix::new().with_axis("par1", ["x"]), vec![]),
            matrix_def("second-%par1@1.0.0", abc_by_one(), vec![]),
            matrix_def("third-%par1@1.0.0", abc_by_one(), vec![]),
        ];
        let found = resolve_variant(&defs, &params(&[("par1", "b"), ("par2", "1")]), &Comparators::new())
            .unwrap()
            .unwrap();
        assert_eq!(found.index, 1);
        assert_eq!(found.descriptor.to_string(), "second-b@1.0.0");
    }

    #[test]
    fn excluded_combination_falls_through() {
        let defs = [
            matrix_def("name-%par1-%par2@1.0.0", abc_by_one(), vec![params(&[("par1", "c")])]),
            VariantDefinition::Fallback {
                pattern: "name-fallback@1.0.0".into(),
            },
        ];
        let found = resolve_variant(&defs, &params(&[("par1", "c"), ("par2", "1")]), &Comparators::new())
            .unwrap()
            .unwrap();
        assert_eq!(found.descriptor.to_string(), "name-fallback@1.0.0");
    }

    #[test]
    fn extraneous_consumer_keys_are_ignored() {
        let defs = [matrix_def("name-%par1-%par2@1.0.0", abc_by_one(), vec![])];
        let consumer = params(&[("par1", "a"), ("par2", "1"), ("debug", "true")]);
        let found = resolve_variant(&defs, &consumer, &Comparators::new()).unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn missing_consumer_key_is_no_match() {
        let defs = [matrix_def("name-%par1-%par2@1.0.0", abc_by_one(), vec![])];
        let found = resolve_variant(&defs, &params(&[("par1", "a")]), &Comparators::new()).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn custom_comparator_affects_matching_not_rendering() {
        let matrix = VariantMatrix::new().with_axis("abi", ["93", "108"]);
        let defs = [matrix_def("native-abi%abi@1.0.0", matrix, vec![])];
        let consumer = params(&[("abi", "115")]);

        let exact = resolve_variant(&defs, &consumer, &Comparators::new()).unwrap();
        assert!(exact.is_none());

        let comparators = Comparators::new().with("abi", AtLeast);
        let found = resolve_variant(&defs, &consumer, &comparators).unwrap().unwrap();
        assert_eq!(found.combination, Some(params(&[("abi", "93")])));
        assert_eq!(found.descriptor.to_string(), "native-abi115@1.0.0");
    }

    #[test]
    fn closures_are_comparators() {
        let comparators = Comparators::new().with("os", |consumer: &str, candidate: &str| {
            consumer.eq_ignore_ascii_case(candidate)
        });
        let matrix = VariantMatrix::new().with_axis("os", ["linux"]);
        let defs = [matrix_def("pkg-%os@1.0.0", matrix, vec![])];
        let found = resolve_variant(&defs, &params(&[("os", "Linux")]), &comparators)
            .unwrap()
            .unwrap();
        assert_eq!(found.descriptor.to_string(), "pkg-Linux@1.0.0");
    }

    #[test]
    fn longer_keys_render_first() {
        let rendered = render_pattern(
            "pkg-%par1-%par10-%par1@1.0.0",
            &params(&[("par1", "a"), ("par10", "z")]),
        )
        .unwrap();
        assert_eq!(rendered.to_string(), "pkg-a-z-a@1.0.0");
    }

    #[test]
    fn unknown_token_after_render_is_a_contract_error() {
        let err = render_pattern("pkg-%missing@1.0.0", &params(&[("par1", "a")])).unwrap_err();
        assert!(err.to_string().contains("%missing"));
    }

    #[test]
    fn no_definitions_is_no_match() {
        assert!(resolve_variant(&[], &params(&[]), &Comparators::new()).unwrap().is_none());
    }
}
