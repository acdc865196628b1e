//! Static pipeline configuration.
//!
//! Loaded once at startup: a TOML file named by `CASCADE_CONFIG` (all
//! fields optional, falling back to the builtin defaults), then environment
//! overrides, then validation. Anything malformed fails here, at
//! construction time; per-frame code never sees invalid configuration.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::dilation::{
    AdaptiveDilation, DilationPolicy, DilationProfile, DEFAULT_ALPHA_BASE, DEFAULT_BETA,
    DEFAULT_SIGMA,
};
use crate::mask::PatchGrid;
use crate::prompt::{PromptBank, PromptStrategy, PromptTemplate};
use crate::taxonomy::{HazardTaxonomy, HazardTier};

const DEFAULT_IMAGE_SIZE: u32 = 336;
const DEFAULT_PATCH_SIZE: u32 = 14;
const DEFAULT_MIN_TOKENS: usize = 64;
const DEFAULT_TAU_HIGH: f32 = 1.5;
const DEFAULT_TAU_CRITICAL: f32 = 2.5;
const DEFAULT_SAMPLE_FPS: f64 = 1.0;
const DEFAULT_MAX_FRAMES: usize = 300;

// ----------------------------------------------------------------------------
// File schema (everything optional)
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct CascadeConfigFile {
    taxonomy: Option<TaxonomyFile>,
    dilation: Option<DilationFile>,
    pruning: Option<PruningFile>,
    prompting: Option<PromptingFile>,
    video: Option<VideoFile>,
}

#[derive(Debug, Deserialize, Default)]
struct TaxonomyFile {
    default_tier: Option<String>,
    critical: Option<Vec<String>>,
    high: Option<Vec<String>>,
    standard: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct DilationFile {
    alpha_base: Option<f32>,
    beta: Option<f32>,
    sigma_default: Option<f32>,
    /// When set, the non-adaptive baseline with this fixed factor is used.
    fixed: Option<f32>,
    variance: Option<HashMap<String, f32>>,
}

#[derive(Debug, Deserialize, Default)]
struct PruningFile {
    enabled: Option<bool>,
    image_size: Option<u32>,
    patch_size: Option<u32>,
    min_tokens: Option<usize>,
    preserve_summary_token: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct PromptingFile {
    strategy: Option<String>,
    tau_high: Option<f32>,
    tau_critical: Option<f32>,
    templates: Option<HashMap<String, PromptTemplate>>,
}

#[derive(Debug, Deserialize, Default)]
struct VideoFile {
    sample_fps: Option<f64>,
    max_frames: Option<usize>,
}

// ----------------------------------------------------------------------------
// Resolved configuration
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct CascadeConfig {
    pub taxonomy: TaxonomySettings,
    pub dilation: DilationSettings,
    pub pruning: PruningSettings,
    pub prompting: PromptSettings,
    pub video: VideoSettings,
}

#[derive(Clone, Debug)]
pub struct TaxonomySettings {
    pub default_tier: HazardTier,
    pub tiers: Vec<(HazardTier, Vec<String>)>,
}

#[derive(Clone, Debug)]
pub struct DilationSettings {
    pub alpha_base: f32,
    pub beta: f32,
    pub sigma_default: f32,
    pub fixed: Option<f32>,
    pub variance: HashMap<String, f32>,
}

#[derive(Clone, Debug)]
pub struct PruningSettings {
    pub enabled: bool,
    pub image_size: u32,
    pub patch_size: u32,
    pub min_tokens: usize,
    pub preserve_summary_token: bool,
}

#[derive(Clone, Debug)]
pub struct PromptSettings {
    pub strategy: PromptStrategy,
    pub tau_high: f32,
    pub tau_critical: f32,
    pub template_overrides: Vec<(HazardTier, PromptTemplate)>,
}

#[derive(Clone, Debug)]
pub struct VideoSettings {
    pub sample_fps: f64,
    pub max_frames: Option<usize>,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            taxonomy: TaxonomySettings {
                default_tier: HazardTier::None,
                tiers: vec![
                    (
                        HazardTier::Critical,
                        to_strings(&["fire", "smoke", "collapse", "explosion"]),
                    ),
                    (
                        HazardTier::High,
                        to_strings(&["forklift", "crane", "machinery", "fall"]),
                    ),
                    (
                        HazardTier::Standard,
                        to_strings(&["person", "vehicle", "helmet", "vest"]),
                    ),
                ],
            },
            dilation: DilationSettings {
                alpha_base: DEFAULT_ALPHA_BASE,
                beta: DEFAULT_BETA,
                sigma_default: DEFAULT_SIGMA,
                fixed: None,
                variance: HashMap::new(),
            },
            pruning: PruningSettings {
                enabled: true,
                image_size: DEFAULT_IMAGE_SIZE,
                patch_size: DEFAULT_PATCH_SIZE,
                min_tokens: DEFAULT_MIN_TOKENS,
                preserve_summary_token: true,
            },
            prompting: PromptSettings {
                strategy: PromptStrategy::HazardPriority,
                tau_high: DEFAULT_TAU_HIGH,
                tau_critical: DEFAULT_TAU_CRITICAL,
                template_overrides: Vec::new(),
            },
            video: VideoSettings {
                sample_fps: DEFAULT_SAMPLE_FPS,
                max_frames: Some(DEFAULT_MAX_FRAMES),
            },
        }
    }
}

impl CascadeConfig {
    /// Load from the path in `CASCADE_CONFIG` (builtin defaults when the
    /// variable is unset), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let file_cfg = match std::env::var("CASCADE_CONFIG").ok() {
            Some(path) => read_config_file(Path::new(&path))?,
            None => CascadeConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit file path, then env overrides and validation.
    pub fn load_path(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CascadeConfigFile) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(tax) = file.taxonomy {
            if let Some(raw) = tax.default_tier.as_deref() {
                cfg.taxonomy.default_tier = HazardTier::parse(raw)
                    .ok_or_else(|| anyhow!("unknown default_tier '{}'", raw))?;
            }
            for (tier, classes) in [
                (HazardTier::Critical, tax.critical),
                (HazardTier::High, tax.high),
                (HazardTier::Standard, tax.standard),
            ] {
                if let Some(classes) = classes {
                    if let Some(entry) =
                        cfg.taxonomy.tiers.iter_mut().find(|(t, _)| *t == tier)
                    {
                        entry.1 = classes;
                    }
                }
            }
        }

        if let Some(dil) = file.dilation {
            if let Some(alpha_base) = dil.alpha_base {
                cfg.dilation.alpha_base = alpha_base;
            }
            if let Some(beta) = dil.beta {
                cfg.dilation.beta = beta;
            }
            if let Some(sigma_default) = dil.sigma_default {
                cfg.dilation.sigma_default = sigma_default;
            }
            cfg.dilation.fixed = dil.fixed;
            if let Some(variance) = dil.variance {
                cfg.dilation.variance = variance;
            }
        }

        if let Some(pruning) = file.pruning {
            if let Some(enabled) = pruning.enabled {
                cfg.pruning.enabled = enabled;
            }
            if let Some(image_size) = pruning.image_size {
                cfg.pruning.image_size = image_size;
            }
            if let Some(patch_size) = pruning.patch_size {
                cfg.pruning.patch_size = patch_size;
            }
            if let Some(min_tokens) = pruning.min_tokens {
                cfg.pruning.min_tokens = min_tokens;
            }
            if let Some(preserve) = pruning.preserve_summary_token {
                cfg.pruning.preserve_summary_token = preserve;
            }
        }

        if let Some(prompting) = file.prompting {
            if let Some(raw) = prompting.strategy.as_deref() {
                cfg.prompting.strategy = PromptStrategy::parse(raw)?;
            }
            if let Some(tau_high) = prompting.tau_high {
                cfg.prompting.tau_high = tau_high;
            }
            if let Some(tau_critical) = prompting.tau_critical {
                cfg.prompting.tau_critical = tau_critical;
            }
            if let Some(templates) = prompting.templates {
                for (tier_name, template) in templates {
                    let tier = HazardTier::parse(&tier_name)
                        .ok_or_else(|| anyhow!("unknown template tier '{}'", tier_name))?;
                    cfg.prompting.template_overrides.push((tier, template));
                }
            }
        }

        if let Some(video) = file.video {
            if let Some(sample_fps) = video.sample_fps {
                cfg.video.sample_fps = sample_fps;
            }
            if let Some(max_frames) = video.max_frames {
                cfg.video.max_frames = Some(max_frames);
            }
        }

        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(strategy) = std::env::var("CASCADE_STRATEGY") {
            if !strategy.trim().is_empty() {
                self.prompting.strategy = PromptStrategy::parse(&strategy)?;
            }
        }
        if let Ok(min_tokens) = std::env::var("CASCADE_MIN_TOKENS") {
            self.pruning.min_tokens = min_tokens
                .parse()
                .map_err(|_| anyhow!("CASCADE_MIN_TOKENS must be an integer"))?;
        }
        if let Ok(max_frames) = std::env::var("CASCADE_MAX_FRAMES") {
            self.video.max_frames = Some(
                max_frames
                    .parse()
                    .map_err(|_| anyhow!("CASCADE_MAX_FRAMES must be an integer"))?,
            );
        }
        if let Ok(sample_fps) = std::env::var("CASCADE_SAMPLE_FPS") {
            self.video.sample_fps = sample_fps
                .parse()
                .map_err(|_| anyhow!("CASCADE_SAMPLE_FPS must be a number"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        // Exercise the constructors that hold the real invariants so load
        // fails instead of pipeline construction.
        self.build_grid()?;
        self.build_dilation()?;
        if self.prompting.tau_high >= self.prompting.tau_critical {
            return Err(anyhow!(
                "prompting thresholds must satisfy tau_high < tau_critical"
            ));
        }
        if self.video.sample_fps <= 0.0 {
            return Err(anyhow!("video sample_fps must be positive"));
        }
        Ok(())
    }

    pub fn build_taxonomy(&self) -> HazardTaxonomy {
        HazardTaxonomy::from_tier_lists(&self.taxonomy.tiers, self.taxonomy.default_tier)
    }

    pub fn build_grid(&self) -> Result<PatchGrid> {
        PatchGrid::new(self.pruning.image_size, self.pruning.patch_size)
    }

    pub fn build_dilation(&self) -> Result<DilationPolicy> {
        if let Some(factor) = self.dilation.fixed {
            return DilationPolicy::fixed(factor);
        }
        let profile = DilationProfile::new(&self.dilation.variance, self.dilation.sigma_default);
        Ok(DilationPolicy::Adaptive(AdaptiveDilation::new(
            profile,
            self.dilation.alpha_base,
            self.dilation.beta,
        )?))
    }

    pub fn build_prompt_bank(&self) -> PromptBank {
        let mut bank = PromptBank::default();
        for (tier, template) in &self.prompting.template_overrides {
            bank.replace(*tier, template.clone());
        }
        bank
    }
}

fn read_config_file(path: &Path) -> Result<CascadeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = CascadeConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pruning.min_tokens, 64);
        assert_eq!(cfg.build_grid().unwrap().side(), 24);
        assert_eq!(cfg.prompting.strategy, PromptStrategy::HazardPriority);
    }

    #[test]
    fn bad_strategy_string_is_rejected() {
        let file: CascadeConfigFile = toml::from_str(
            r#"
            [prompting]
            strategy = "improvised"
            "#,
        )
        .unwrap();
        assert!(CascadeConfig::from_file(file).is_err());
    }

    #[test]
    fn fixed_dilation_override_builds_fixed_policy() {
        let file: CascadeConfigFile = toml::from_str(
            r#"
            [dilation]
            fixed = 1.3
            "#,
        )
        .unwrap();
        let cfg = CascadeConfig::from_file(file).unwrap();
        match cfg.build_dilation().unwrap() {
            DilationPolicy::Fixed(factor) => assert!((factor - 1.3).abs() < 1e-6),
            other => panic!("expected fixed policy, got {:?}", other),
        }
    }

    #[test]
    fn template_override_replaces_bank_entry() {
        let file: CascadeConfigFile = toml::from_str(
            r#"
            [prompting.templates.critical]
            system = "sys"
            instructions = "inst"
            keywords = ["k"]
            "#,
        )
        .unwrap();
        let cfg = CascadeConfig::from_file(file).unwrap();
        let bank = cfg.build_prompt_bank();
        assert_eq!(bank.template(HazardTier::Critical).system, "sys");
        // Other tiers keep the builtin templates.
        assert!(bank
            .template(HazardTier::High)
            .system
            .contains("safety expert"));
    }

    #[test]
    fn non_dividing_grid_fails_validation() {
        let file: CascadeConfigFile = toml::from_str(
            r#"
            [pruning]
            image_size = 330
            patch_size = 14
            "#,
        )
        .unwrap();
        let cfg = CascadeConfig::from_file(file).unwrap();
        assert!(cfg.validate().is_err());
    }
}
