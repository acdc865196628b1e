//! Hazard taxonomy: class name → severity tier.
//!
//! The taxonomy is built once from configuration and shared read-only for
//! the lifetime of the pipeline. Lookups are case-insensitive and total:
//! classes absent from the map (including empty class names) resolve to an
//! explicitly configured default tier, never to an implicit "missing" state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Severity tier for a detected class.
///
/// The derived `Ord` gives the fixed priority order used everywhere in the
/// cascade: `Critical > High > Standard > None`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HazardTier {
    #[default]
    None,
    Standard,
    High,
    Critical,
}

impl HazardTier {
    pub const ALL: [HazardTier; 4] = [
        HazardTier::None,
        HazardTier::Standard,
        HazardTier::High,
        HazardTier::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HazardTier::None => "none",
            HazardTier::Standard => "standard",
            HazardTier::High => "high",
            HazardTier::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Some(HazardTier::None),
            "standard" => Some(HazardTier::Standard),
            "high" => Some(HazardTier::High),
            "critical" => Some(HazardTier::Critical),
            _ => None,
        }
    }

    /// Numeric risk weight, kept consistent with the weight-based prompt
    /// routing thresholds.
    pub fn risk_weight(&self) -> f32 {
        match self {
            HazardTier::Critical => 3.0,
            HazardTier::High => 2.0,
            HazardTier::Standard => 1.0,
            HazardTier::None => 0.0,
        }
    }
}

impl std::fmt::Display for HazardTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable class-name → tier mapping with an explicit default tier.
#[derive(Clone, Debug)]
pub struct HazardTaxonomy {
    mapping: HashMap<String, HazardTier>,
    default_tier: HazardTier,
}

impl HazardTaxonomy {
    /// Build from tier → class-name lists (the configuration shape).
    /// Later tiers win if a class appears under more than one tier.
    pub fn from_tier_lists(
        tiers: &[(HazardTier, Vec<String>)],
        default_tier: HazardTier,
    ) -> Self {
        let mut mapping = HashMap::new();
        for (tier, classes) in tiers {
            for class in classes {
                mapping.insert(class.to_ascii_lowercase(), *tier);
            }
        }
        Self {
            mapping,
            default_tier,
        }
    }

    /// Built-in workplace-hazard taxonomy used when configuration does not
    /// supply one.
    pub fn builtin() -> Self {
        let tiers = vec![
            (
                HazardTier::Critical,
                vec!["fire", "smoke", "collapse", "explosion"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            ),
            (
                HazardTier::High,
                vec!["forklift", "crane", "machinery", "fall"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            ),
            (
                HazardTier::Standard,
                vec!["person", "vehicle", "helmet", "vest"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            ),
        ];
        Self::from_tier_lists(&tiers, HazardTier::None)
    }

    /// Case-insensitive tier lookup. Total over all strings.
    pub fn classify(&self, class_name: &str) -> HazardTier {
        self.mapping
            .get(&class_name.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default_tier)
    }

}
