//! Samples keyed by the true distance they were taken at.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// A true separation distance in whole centimeters. Written out as the label
/// `"<n> cm"`, and ordered by the number rather than the label text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistanceKey(pub u32);

/// Samples collected at each distance.
pub type DistanceMap = BTreeMap<DistanceKey, Vec<f64>>;

impl DistanceKey {
    /// The distance in centimeters.
    pub fn cm(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DistanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cm", self.0)
    }
}

/// A map key that is not `"<n> cm"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadLabel(pub String);

impl fmt::Display for BadLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a distance label: {:?}", self.0)
    }
}

impl std::error::Error for BadLabel {}

impl FromStr for DistanceKey {
    type Err = BadLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_suffix(" cm")
            .and_then(|n| n.parse().ok())
            .map(DistanceKey)
            .ok_or_else(|| BadLabel(s.to_owned()))
    }
}

impl TryFrom<String> for DistanceKey {
    type Error = BadLabel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DistanceKey> for String {
    fn from(value: DistanceKey) -> Self {
        value.to_string()
    }
}

/// Arithmetic mean of a sample list.
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}
