//! Adaptive box dilation from class shape-variance priors.
//!
//! Amorphous classes (fire, smoke) have high intraclass shape variance and
//! get larger expansion factors than rigid ones (vehicle, helmet):
//!
//! ```text
//! alpha = alpha_base * (1 + beta * sigma(class))
//! ```
//!
//! With `alpha_base >= 1` and `beta >= 0` the factor is monotone in sigma
//! and never shrinks a box.

use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::taxonomy::HazardTier;

/// Shape-variance values for classes absent from configuration,
/// precomputed offline from detector training data.
const BUILTIN_VARIANCE: &[(&str, f32)] = &[
    // Amorphous (high variance)
    ("fire", 0.42),
    ("smoke", 0.38),
    ("explosion", 0.45),
    ("dust", 0.35),
    // Semi-rigid
    ("collapse", 0.28),
    ("debris", 0.25),
    ("crane", 0.20),
    ("forklift", 0.15),
    // Rigid
    ("person", 0.12),
    ("vehicle", 0.08),
    ("car", 0.08),
    ("truck", 0.10),
    ("helmet", 0.06),
    ("vest", 0.08),
];

pub const DEFAULT_ALPHA_BASE: f32 = 1.2;
pub const DEFAULT_BETA: f32 = 0.5;
pub const DEFAULT_SIGMA: f32 = 0.15;

/// Class-name → shape-variance map with an explicit default.
#[derive(Clone, Debug)]
pub struct DilationProfile {
    variance: HashMap<String, f32>,
    sigma_default: f32,
}

impl DilationProfile {
    /// Builtin table merged with configured overrides (overrides win).
    pub fn new(overrides: &HashMap<String, f32>, sigma_default: f32) -> Self {
        let mut variance: HashMap<String, f32> = BUILTIN_VARIANCE
            .iter()
            .map(|(class, sigma)| (class.to_string(), *sigma))
            .collect();
        for (class, sigma) in overrides {
            variance.insert(class.to_ascii_lowercase(), *sigma);
        }
        Self {
            variance,
            sigma_default,
        }
    }

    pub fn builtin() -> Self {
        Self::new(&HashMap::new(), DEFAULT_SIGMA)
    }

    /// Case-insensitive variance lookup. Total over all strings.
    pub fn variance(&self, class_name: &str) -> f32 {
        self.variance
            .get(&class_name.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.sigma_default)
    }
}

/// Adaptive dilation model.
#[derive(Clone, Debug)]
pub struct AdaptiveDilation {
    profile: DilationProfile,
    alpha_base: f32,
    beta: f32,
}

impl AdaptiveDilation {
    pub fn new(profile: DilationProfile, alpha_base: f32, beta: f32) -> Result<Self> {
        if alpha_base < 1.0 {
            return Err(anyhow!(
                "dilation alpha_base must be >= 1.0 (got {alpha_base})"
            ));
        }
        if beta < 0.0 {
            return Err(anyhow!("dilation beta must be >= 0.0 (got {beta})"));
        }
        Ok(Self {
            profile,
            alpha_base,
            beta,
        })
    }

    pub fn dilation(&self, class_name: &str) -> f32 {
        self.alpha_base * (1.0 + self.beta * self.profile.variance(class_name))
    }

    /// Tier-level fallback for callers without a class name. Uses
    /// representative sigma values per tier; critical hazards are most
    /// often amorphous and get the widest expansion.
    pub fn dilation_for_tier(&self, tier: HazardTier) -> f32 {
        let sigma = match tier {
            HazardTier::Critical => 0.40,
            HazardTier::High => 0.20,
            HazardTier::Standard => 0.10,
            HazardTier::None => 0.15,
        };
        self.alpha_base * (1.0 + self.beta * sigma)
    }
}

/// Dilation strategy selected at construction. `Fixed` is the non-adaptive
/// baseline used for ablation runs.
#[derive(Clone, Debug)]
pub enum DilationPolicy {
    Adaptive(AdaptiveDilation),
    Fixed(f32),
}

impl DilationPolicy {
    pub fn fixed(factor: f32) -> Result<Self> {
        if factor < 1.0 {
            return Err(anyhow!("fixed dilation must be >= 1.0 (got {factor})"));
        }
        Ok(Self::Fixed(factor))
    }

    pub fn dilation(&self, class_name: &str) -> f32 {
        match self {
            DilationPolicy::Adaptive(model) => model.dilation(class_name),
            DilationPolicy::Fixed(factor) => *factor,
        }
    }

    pub fn dilation_for_tier(&self, tier: HazardTier) -> f32 {
        match self {
            DilationPolicy::Adaptive(model) => model.dilation_for_tier(tier),
            DilationPolicy::Fixed(factor) => *factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adaptive(alpha_base: f32, beta: f32) -> AdaptiveDilation {
        AdaptiveDilation::new(DilationProfile::builtin(), alpha_base, beta).unwrap()
    }

    #[test]
    fn amorphous_classes_dilate_more_than_rigid() {
        let model = adaptive(1.2, 0.5);
        assert!(model.dilation("fire") > model.dilation("vehicle"));
        assert!(model.dilation("smoke") > model.dilation("helmet"));
    }

    #[test]
    fn unknown_class_uses_default_sigma() {
        let model = adaptive(1.2, 0.5);
        let expected = 1.2 * (1.0 + 0.5 * DEFAULT_SIGMA);
        assert!((model.dilation("zeppelin") - expected).abs() < 1e-6);
    }

    #[test]
    fn dilation_is_monotone_in_variance() {
        let mut overrides = HashMap::new();
        overrides.insert("a".to_string(), 0.1);
        overrides.insert("b".to_string(), 0.3);
        overrides.insert("c".to_string(), 0.9);
        let profile = DilationProfile::new(&overrides, DEFAULT_SIGMA);
        let model = AdaptiveDilation::new(profile, 1.2, 0.5).unwrap();
        assert!(model.dilation("a") <= model.dilation("b"));
        assert!(model.dilation("b") <= model.dilation("c"));
    }

    #[test]
    fn zero_beta_collapses_to_alpha_base() {
        let model = adaptive(1.3, 0.0);
        assert!((model.dilation("fire") - 1.3).abs() < 1e-6);
        assert!((model.dilation("vehicle") - 1.3).abs() < 1e-6);
    }

    #[test]
    fn tier_fallback_orders_critical_widest() {
        let model = adaptive(1.2, 0.5);
        assert!(
            model.dilation_for_tier(HazardTier::Critical)
                > model.dilation_for_tier(HazardTier::High)
        );
        assert!(
            model.dilation_for_tier(HazardTier::High)
                > model.dilation_for_tier(HazardTier::Standard)
        );
    }

    #[test]
    fn invalid_constants_are_rejected() {
        assert!(AdaptiveDilation::new(DilationProfile::builtin(), 0.9, 0.5).is_err());
        assert!(AdaptiveDilation::new(DilationProfile::builtin(), 1.2, -0.1).is_err());
        assert!(DilationPolicy::fixed(0.5).is_err());
    }

    #[test]
    fn fixed_policy_ignores_class() {
        let policy = DilationPolicy::fixed(1.2).unwrap();
        assert_eq!(policy.dilation("fire"), policy.dilation("vehicle"));
    }
}
