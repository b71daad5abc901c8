//! Variant definitions, parameter matrices and exclusions.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// A manifest-level parameter value.
///
/// Manifests write `par2: 1` and `par2: "1"` interchangeably; both
/// normalise to the string `"1"`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ParameterValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<ParameterValue> for String {
    fn from(value: ParameterValue) -> Self {
        match value {
            ParameterValue::Str(s) => s,
            ParameterValue::Int(i) => i.to_string(),
            ParameterValue::Float(f) => f.to_string(),
            ParameterValue::Bool(b) => b.to_string(),
        }
    }
}

/// An ordered mapping of parameter name to value.
///
/// Used both for consumer preferences (`dependenciesMeta.<name>.parameters`)
/// and for the combinations produced by matrix expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VariantParameters(IndexMap<String, String>);

impl VariantParameters {
    /// An empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of `self` with `key` set to `value`.
    ///
    /// The original is left untouched; matrix expansion threads partial
    /// assignments through this.
    pub fn with(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.0.clone();
        next.insert(key.into(), value.into());
        Self(next)
    }

    /// Value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether `key` has a value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterate `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of assigned keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no key is assigned.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VariantParameters {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<'de> Deserialize<'de> for VariantParameters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<String, ParameterValue>::deserialize(deserializer)?;
        Ok(Self(raw.into_iter().map(|(k, v)| (k, v.into())).collect()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAxis {
    Candidates { candidates: Vec<ParameterValue> },
    List(Vec<ParameterValue>),
}

#[derive(Serialize)]
struct AxisOut<'a> {
    candidates: &'a [String],
}

/// A mapping of parameter name to its candidate values, in declaration order.
///
/// Accepts both `{"p": {"candidates": [..]}}` and the shorthand `{"p": [..]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantMatrix(IndexMap<String, Vec<String>>);

impl VariantMatrix {
    /// An empty matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of `self` with another axis appended.
    pub fn with_axis<I, S>(&self, key: impl Into<String>, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.0.clone();
        next.insert(key.into(), candidates.into_iter().map(Into::into).collect());
        Self(next)
    }

    /// Axes in declaration order.
    pub fn axes(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Whether the matrix has no axes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for VariantMatrix {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, candidates) in &self.0 {
            map.serialize_entry(key, &AxisOut { candidates })?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for VariantMatrix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<String, RawAxis>::deserialize(deserializer)?;
        Ok(Self(
            raw.into_iter()
                .map(|(key, axis)| {
                    let values = match axis {
                        RawAxis::Candidates { candidates } => candidates,
                        RawAxis::List(values) => values,
                    };
                    (key, values.into_iter().map(String::from).collect())
                })
                .collect(),
        ))
    }
}

/// One alternative in a package's ordered `variants` list.
///
/// A definition either carries a matrix to match against or is an
/// unconditional fallback. An absent, `null` or empty matrix all deserialize
/// to [`VariantDefinition::Fallback`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDefinition", into = "RawDefinition")]
pub enum VariantDefinition {
    /// Matches when a non-excluded combination satisfies the consumer.
    Matrix {
        /// Descriptor template with `%param` tokens.
        pattern: String,
        /// Parameter space.
        matrix: VariantMatrix,
        /// Partial assignments removed from the parameter space.
        exclude: Vec<VariantParameters>,
    },
    /// Matches unconditionally. The pattern must contain no `%` tokens.
    Fallback {
        /// Literal descriptor.
        pattern: String,
    },
}

impl VariantDefinition {
    /// The pattern, whichever kind of definition this is.
    pub fn pattern(&self) -> &str {
        match self {
            Self::Matrix { pattern, .. } | Self::Fallback { pattern } => pattern,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct RawDefinition {
    pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    matrix: Option<VariantMatrix>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    exclude: Vec<VariantParameters>,
}

impl From<RawDefinition> for VariantDefinition {
    fn from(raw: RawDefinition) -> Self {
        match raw.matrix {
            Some(matrix) if !matrix.is_empty() => Self::Matrix {
                pattern: raw.pattern,
                matrix,
                exclude: raw.exclude,
            },
            _ => Self::Fallback {
                pattern: raw.pattern,
            },
        }
    }
}

impl From<VariantDefinition> for RawDefinition {
    fn from(def: VariantDefinition) -> Self {
        match def {
            VariantDefinition::Matrix {
                pattern,
                matrix,
                exclude,
            } => Self {
                pattern,
                matrix: Some(matrix),
                exclude,
            },
            VariantDefinition::Fallback { pattern } => Self {
                pattern,
                matrix: None,
                exclude: Vec::new(),
            },
        }
    }
}
