//! Event gate: decides whether a frame deserves the expensive stages.
//!
//! The decision is a pure function of the frame's detections and the
//! taxonomy. No event means the orchestrator short-circuits to a cheap
//! result without touching the mask builder, router, or generation backend.

use serde::Serialize;

use crate::detect::Detection;
use crate::taxonomy::{HazardTaxonomy, HazardTier};

/// Outcome of the gating stage for one frame.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct TriggerDecision {
    /// True iff `max_tier != None`.
    pub is_event: bool,
    /// Highest-priority tier among the detections.
    pub max_tier: HazardTier,
    /// Maximum confidence among detections at `max_tier`.
    pub trigger_confidence: f32,
}

/// Gating stage. Owns a read-only taxonomy for the pipeline lifetime.
#[derive(Clone, Debug)]
pub struct EventGate {
    taxonomy: HazardTaxonomy,
}

impl EventGate {
    pub fn new(taxonomy: HazardTaxonomy) -> Self {
        Self { taxonomy }
    }

    /// Classify every detection, track the maximum tier and the maximum
    /// confidence at that tier. The confidence is tracked even at the none
    /// tier, so a non-triggering frame still reports how confident the
    /// detector was about its unmapped classes.
    ///
    /// Tie-break: a later detection replaces the tracked one only when its
    /// tier or confidence is strictly greater, so among equal-tier,
    /// equal-confidence detections the first in input order wins.
    pub fn decide(&self, detections: &[Detection]) -> TriggerDecision {
        let mut max_tier = HazardTier::None;
        let mut max_conf = 0.0f32;

        for det in detections {
            let tier = self.taxonomy.classify(&det.class_name);
            if tier > max_tier {
                max_tier = tier;
                max_conf = det.confidence;
            } else if tier == max_tier && det.confidence > max_conf {
                max_conf = det.confidence;
            }
        }

        TriggerDecision {
            is_event: max_tier != HazardTier::None,
            max_tier,
            trigger_confidence: max_conf,
        }
    }
}
