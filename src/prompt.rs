//! Hazard-priority prompt routing.
//!
//! Stage three's instruction selection. A prompt bank owns one template per
//! tier; the router picks a template from the gate's tier (or a numeric
//! risk weight) and formats it, optionally suffixed with the detected class
//! names. Strategy validation happens at construction, never per frame.

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::taxonomy::HazardTier;

/// Generic instruction used by the baseline strategy, which bypasses the
/// template bank entirely.
pub const BASELINE_PROMPT: &str = "Describe what is happening in this surveillance footage. \
     Focus on safety-relevant observations.";

/// Class names appended to a formatted prompt are capped at the first five
/// distinct names.
pub const MAX_PROMPT_CLASSES: usize = 5;

/// One tier's template: system framing, structured instructions, and a
/// keyword list for optional downstream relevance checks (the keywords do
/// not participate in selection).
#[derive(Clone, Debug, Deserialize)]
pub struct PromptTemplate {
    pub system: String,
    pub instructions: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl PromptTemplate {
    pub fn format(&self) -> String {
        format!("{}\n\n{}", self.system, self.instructions)
    }
}

/// Exactly one active template per tier.
#[derive(Clone, Debug)]
pub struct PromptBank {
    critical: PromptTemplate,
    high: PromptTemplate,
    standard: PromptTemplate,
    none: PromptTemplate,
}

impl PromptBank {
    pub fn new(
        critical: PromptTemplate,
        high: PromptTemplate,
        standard: PromptTemplate,
        none: PromptTemplate,
    ) -> Self {
        Self {
            critical,
            high,
            standard,
            none,
        }
    }

    pub fn template(&self, tier: HazardTier) -> &PromptTemplate {
        match tier {
            HazardTier::Critical => &self.critical,
            HazardTier::High => &self.high,
            HazardTier::Standard => &self.standard,
            HazardTier::None => &self.none,
        }
    }

    pub fn replace(&mut self, tier: HazardTier, template: PromptTemplate) {
        match tier {
            HazardTier::Critical => self.critical = template,
            HazardTier::High => self.high = template,
            HazardTier::Standard => self.standard = template,
            HazardTier::None => self.none = template,
        }
    }
}

impl Default for PromptBank {
    fn default() -> Self {
        Self::new(
            PromptTemplate {
                system: "You are a safety expert analyzing surveillance footage. \
                         This is a CRITICAL safety event requiring immediate attention."
                    .to_string(),
                instructions: "Analyze this safety-critical scene in detail:\n\
                               1. Identify the primary hazard type (fire, smoke, explosion, collapse)\n\
                               2. Describe the hazard's current state and spread direction\n\
                               3. Identify any personnel in immediate danger\n\
                               4. Recommend immediate evacuation or intervention actions\n\
                               5. Note any secondary hazards or risks\n\n\
                               Provide a concise but comprehensive safety report."
                    .to_string(),
                keywords: to_strings(&["fire", "smoke", "explosion", "collapse", "danger", "evacuate"]),
            },
            PromptTemplate {
                system: "You are a safety expert analyzing surveillance footage. \
                         This involves heavy equipment or machinery that poses safety risks."
                    .to_string(),
                instructions: "Analyze this workplace safety scene:\n\
                               1. Identify the equipment or machinery involved\n\
                               2. Describe any unsafe operations or positioning\n\
                               3. Identify personnel at risk and their proximity to hazards\n\
                               4. Note any safety protocol violations\n\
                               5. Suggest corrective actions\n\n\
                               Provide a safety incident report."
                    .to_string(),
                keywords: to_strings(&["forklift", "crane", "machinery", "equipment", "collision", "struck"]),
            },
            PromptTemplate {
                system: "You are a safety observer analyzing surveillance footage.".to_string(),
                instructions: "Describe what is happening in this surveillance footage:\n\
                               1. Identify any people and their activities\n\
                               2. Note any vehicles or equipment present\n\
                               3. Observe any potential safety concerns\n\
                               4. Describe the overall scene and environment\n\n\
                               Focus on safety-relevant observations."
                    .to_string(),
                keywords: to_strings(&["person", "worker", "activity", "observe"]),
            },
            PromptTemplate {
                system: "You are analyzing surveillance footage.".to_string(),
                instructions: "Briefly describe the scene. Note if anything unusual is occurring."
                    .to_string(),
                keywords: vec![],
            },
        )
    }
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// Prompt selection strategy, fixed at pipeline construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptStrategy {
    /// Select a template tier-by-tier.
    HazardPriority,
    /// Always use the standard-tier template.
    Standard,
    /// Bypass the bank; fixed generic instruction.
    Baseline,
}

impl PromptStrategy {
    /// Parse the configured mode. Unknown modes are a configuration error,
    /// surfaced at construction rather than per frame.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hazard_priority" => Ok(PromptStrategy::HazardPriority),
            "standard" => Ok(PromptStrategy::Standard),
            "none" | "baseline" => Ok(PromptStrategy::Baseline),
            other => Err(anyhow!(
                "unknown prompt strategy '{}' (expected hazard_priority, standard, or none)",
                other
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptStrategy::HazardPriority => "hazard_priority",
            PromptStrategy::Standard => "standard",
            PromptStrategy::Baseline => "none",
        }
    }
}

/// Prompt router. Immutable configuration, pure per-frame selection.
#[derive(Clone, Debug)]
pub struct PromptRouter {
    bank: PromptBank,
    strategy: PromptStrategy,
    tau_high: f32,
    tau_critical: f32,
}

impl PromptRouter {
    pub fn new(
        bank: PromptBank,
        strategy: PromptStrategy,
        tau_high: f32,
        tau_critical: f32,
    ) -> Result<Self> {
        if tau_high >= tau_critical {
            return Err(anyhow!(
                "prompt thresholds must satisfy tau_high < tau_critical (got {} >= {})",
                tau_high,
                tau_critical
            ));
        }
        Ok(Self {
            bank,
            strategy,
            tau_high,
            tau_critical,
        })
    }

    pub fn with_defaults(strategy: PromptStrategy) -> Self {
        // Defaults satisfy the threshold ordering, so this cannot fail.
        Self {
            bank: PromptBank::default(),
            strategy,
            tau_high: 1.5,
            tau_critical: 2.5,
        }
    }

    pub fn strategy(&self) -> PromptStrategy {
        self.strategy
    }

    /// Select and format the instruction for a detected tier.
    pub fn select(&self, tier: HazardTier, detected_classes: &[String]) -> String {
        let tier = match self.strategy {
            PromptStrategy::HazardPriority => tier,
            PromptStrategy::Standard => HazardTier::Standard,
            PromptStrategy::Baseline => {
                return BASELINE_PROMPT.to_string();
            }
        };
        with_class_suffix(self.bank.template(tier).format(), detected_classes)
    }

    /// Weight-based variant: compare a numeric risk weight against the two
    /// thresholds instead of using a tier.
    pub fn select_by_weight(&self, weight: f32, detected_classes: &[String]) -> String {
        let tier = if weight >= self.tau_critical {
            HazardTier::Critical
        } else if weight >= self.tau_high {
            HazardTier::High
        } else if weight > 0.0 {
            HazardTier::Standard
        } else {
            HazardTier::None
        };
        self.select(tier, detected_classes)
    }
}

/// Append at most the first five distinct class names, in input order.
fn with_class_suffix(prompt: String, detected_classes: &[String]) -> String {
    let mut distinct: Vec<&str> = Vec::new();
    for class in detected_classes {
        if distinct.len() == MAX_PROMPT_CLASSES {
            break;
        }
        if !class.is_empty() && !distinct.contains(&class.as_str()) {
            distinct.push(class);
        }
    }
    if distinct.is_empty() {
        return prompt;
    }
    format!("{}\n\nDetected objects: {}", prompt, distinct.join(", "))
}
