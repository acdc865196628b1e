//! Event-triggered cascade controller for video understanding.
//!
//! Running a generative vision-language model on every frame of a video is
//! wasteful; most frames are background. This crate implements the control
//! logic that decides *when* and *how much* generative compute to spend and
//! *what* to ask for, as a cascade of three deterministic stages:
//!
//! 1. **Event gate**: a hazard taxonomy maps detected classes to severity
//!    tiers; frames with no tiered detection are skipped outright.
//! 2. **Token pruning**: detection boxes, dilated by a class shape-variance
//!    prior, are projected onto the vision encoder's patch grid to build a
//!    boolean keep-mask, with a hard minimum-token floor.
//! 3. **Prompt routing**: the instruction handed to generation is selected
//!    from a per-tier template bank (or a numeric risk weight).
//!
//! The detector and the generative model are external collaborators behind
//! the [`detect::DetectorBackend`] and [`generate::GenerationBackend`]
//! seams; the core only consumes detections and produces a keep-mask plus a
//! prompt. All decision components are pure functions over immutable
//! configuration, safe to share across threads; the orchestrator is
//! sequential per video, parallel across videos.
//!
//! # Module Structure
//!
//! - `taxonomy` / `gate`: severity tiers and the event-trigger decision
//! - `dilation` / `mask`: adaptive box dilation and the patch keep-mask
//! - `prompt`: hazard-priority prompt routing
//! - `pipeline`: per-frame state machine, batch and streaming video modes
//! - `detect` / `generate` / `source`: seams for the external stages
//! - `config`: TOML + env configuration, validated at load

pub mod config;
pub mod detect;
pub mod dilation;
pub mod gate;
pub mod generate;
pub mod mask;
pub mod pipeline;
pub mod prompt;
pub mod source;
pub mod taxonomy;

pub use config::CascadeConfig;
pub use detect::{Detection, DetectorBackend, NormBox, StubBackend};
pub use dilation::{AdaptiveDilation, DilationPolicy, DilationProfile};
pub use gate::{EventGate, TriggerDecision};
pub use generate::{GenerationBackend, GenerationOutput, StubGenerator};
pub use mask::{MaskBuilder, MaskOutcome, PatchGrid, SpatialMask};
pub use pipeline::{
    CascadePipeline, FrameDisposition, FrameResult, FrameStream, ProcessOptions, VideoResult,
};
pub use prompt::{PromptBank, PromptRouter, PromptStrategy, PromptTemplate};
pub use source::{open_source, Frame, FrameSource, SyntheticConfig, SyntheticSource};
pub use taxonomy::{HazardTaxonomy, HazardTier};
