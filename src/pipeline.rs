//! Frame and video orchestration.
//!
//! Per frame the orchestrator is a two-state machine: the gate either
//! short-circuits to a cheap skip result or the full path runs the mask
//! builder and prompt router (order-independent, both read-only over the
//! same detections) and hands their outputs to the generation backend.
//!
//! Per video, frames are visited strictly in temporal order and all
//! counters are scoped to one invocation. Batch and streaming modes share
//! the same per-frame path; streaming only changes when results are
//! materialized. A failing detector or generator call marks that one frame
//! as failed and processing continues; the frame cap is the only early
//! termination the orchestrator knows.

use std::time::Instant;

use anyhow::Result;
use serde::Serialize;

use crate::config::CascadeConfig;
use crate::detect::{Detection, DetectorBackend};
use crate::gate::EventGate;
use crate::generate::GenerationBackend;
use crate::mask::MaskBuilder;
use crate::prompt::PromptRouter;
use crate::source::{Frame, FrameSource};
use crate::taxonomy::HazardTier;

/// How a frame left the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameDisposition {
    /// Gate said no event; nothing expensive ran.
    Skipped,
    /// Full path ran: mask, prompt, generation.
    Full,
    /// Detector or generator failed; recorded, video continues.
    Failed,
}

/// Result for one processed frame. Immutable once emitted.
#[derive(Clone, Debug, Serialize)]
pub struct FrameResult {
    pub frame_idx: u64,
    pub timestamp: f64,
    pub is_event: bool,
    pub detections: Vec<Detection>,
    pub tier: HazardTier,
    pub caption: Option<String>,
    pub tokens_used: usize,
    pub tokens_total: usize,
    /// Wall-clock seconds spent on this frame inside the pipeline.
    pub processing_time: f64,
    pub disposition: FrameDisposition,
    /// Error text when `disposition == Failed`.
    pub error: Option<String>,
}

impl FrameResult {
    pub fn token_reduction(&self) -> f64 {
        if self.tokens_total == 0 {
            return 0.0;
        }
        1.0 - self.tokens_used as f64 / self.tokens_total as f64
    }
}

/// Result for a complete video run.
#[derive(Clone, Debug, Serialize)]
pub struct VideoResult {
    pub source: String,
    pub processed_frames: usize,
    pub event_frames: usize,
    pub failed_frames: usize,
    pub frames: Vec<FrameResult>,
    pub total_time: f64,
    pub fps: f64,
}

impl VideoResult {
    pub fn event_ratio(&self) -> f64 {
        self.event_frames as f64 / self.processed_frames.max(1) as f64
    }

    pub fn captions(&self) -> Vec<&str> {
        self.frames
            .iter()
            .filter_map(|f| f.caption.as_deref())
            .collect()
    }

    /// Mean token reduction over full-path frames.
    pub fn mean_token_reduction(&self) -> f64 {
        let full: Vec<&FrameResult> = self
            .frames
            .iter()
            .filter(|f| f.disposition == FrameDisposition::Full)
            .collect();
        if full.is_empty() {
            return 0.0;
        }
        full.iter().map(|f| f.token_reduction()).sum::<f64>() / full.len() as f64
    }
}

/// Per-invocation knobs. Defaults come from the loaded configuration.
#[derive(Clone, Copy, Debug)]
pub struct ProcessOptions {
    /// Target sample rate; the source is decimated down to this.
    pub sample_fps: f64,
    /// Cap on processed (sampled) frames; the sole early-termination
    /// mechanism.
    pub max_frames: Option<usize>,
    /// Run the full path even when the gate says no event.
    pub force_full: bool,
}

/// The cascade pipeline: gate, mask builder, prompt router, and the two
/// external backends behind their seams.
///
/// The decision components are immutable after construction; the backends
/// are the only stateful members, which keeps each video invocation's
/// counters independent.
pub struct CascadePipeline {
    gate: EventGate,
    mask_builder: MaskBuilder,
    router: PromptRouter,
    detector: Box<dyn DetectorBackend>,
    generator: Box<dyn GenerationBackend>,
    pruning_enabled: bool,
    defaults: ProcessOptions,
}

impl CascadePipeline {
    pub fn new(
        config: &CascadeConfig,
        detector: Box<dyn DetectorBackend>,
        generator: Box<dyn GenerationBackend>,
    ) -> Result<Self> {
        let gate = EventGate::new(config.build_taxonomy());
        let mask_builder = MaskBuilder::new(
            config.build_grid()?,
            config.build_dilation()?,
            config.pruning.min_tokens,
            config.pruning.preserve_summary_token,
        );
        let router = PromptRouter::new(
            config.build_prompt_bank(),
            config.prompting.strategy,
            config.prompting.tau_high,
            config.prompting.tau_critical,
        )?;
        log::info!(
            "cascade pipeline: detector={} generator={} strategy={} grid={}x{}",
            detector.name(),
            generator.name(),
            router.strategy().as_str(),
            mask_builder.grid().side(),
            mask_builder.grid().side(),
        );
        Ok(Self {
            gate,
            mask_builder,
            router,
            detector,
            generator,
            pruning_enabled: config.pruning.enabled,
            defaults: ProcessOptions {
                sample_fps: config.video.sample_fps,
                max_frames: config.video.max_frames,
                force_full: false,
            },
        })
    }

    pub fn default_options(&self) -> ProcessOptions {
        self.defaults
    }

    /// Run one frame through the state machine.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        frame_idx: u64,
        timestamp: f64,
        force_full: bool,
    ) -> FrameResult {
        let started = Instant::now();
        let tokens_total = self.mask_builder.grid().patch_count()
            + usize::from(self.mask_builder.preserves_summary_token());

        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!("detector failed on frame {}: {:#}", frame_idx, e);
                return FrameResult {
                    frame_idx,
                    timestamp,
                    is_event: false,
                    detections: vec![],
                    tier: HazardTier::None,
                    caption: None,
                    tokens_used: 0,
                    tokens_total,
                    processing_time: started.elapsed().as_secs_f64(),
                    disposition: FrameDisposition::Failed,
                    error: Some(format!("{:#}", e)),
                };
            }
        };

        let decision = self.gate.decide(&detections);

        if !decision.is_event && !force_full {
            return FrameResult {
                frame_idx,
                timestamp,
                is_event: false,
                detections,
                tier: decision.max_tier,
                caption: None,
                tokens_used: 0,
                tokens_total,
                processing_time: started.elapsed().as_secs_f64(),
                disposition: FrameDisposition::Skipped,
                error: None,
            };
        }

        let mask_outcome = if self.pruning_enabled {
            self.mask_builder.build(&detections)
        } else {
            self.mask_builder.passthrough()
        };

        let classes: Vec<String> = detections.iter().map(|d| d.class_name.clone()).collect();
        let prompt = self.router.select(decision.max_tier, &classes);

        match self.generator.generate(frame, &prompt, &mask_outcome) {
            Ok(output) => FrameResult {
                frame_idx,
                timestamp,
                is_event: decision.is_event,
                detections,
                tier: decision.max_tier,
                caption: Some(output.caption),
                tokens_used: output.tokens_used.min(tokens_total),
                tokens_total,
                processing_time: started.elapsed().as_secs_f64(),
                disposition: FrameDisposition::Full,
                error: None,
            },
            Err(e) => {
                log::warn!("generation failed on frame {}: {:#}", frame_idx, e);
                FrameResult {
                    frame_idx,
                    timestamp,
                    is_event: decision.is_event,
                    detections,
                    tier: decision.max_tier,
                    caption: None,
                    tokens_used: 0,
                    tokens_total,
                    processing_time: started.elapsed().as_secs_f64(),
                    disposition: FrameDisposition::Failed,
                    error: Some(format!("{:#}", e)),
                }
            }
        }
    }

    /// Batch mode: consume the whole source (or hit the frame cap) and
    /// return the aggregated `VideoResult`.
    pub fn process_video(
        &mut self,
        source: Box<dyn FrameSource>,
        options: ProcessOptions,
    ) -> Result<VideoResult> {
        let started = Instant::now();
        let label = source.describe();

        let mut frames = Vec::new();
        let mut events = 0usize;
        let mut failed = 0usize;

        for item in self.stream(source, options) {
            let result = item?;
            if result.is_event {
                events += 1;
            }
            if result.disposition == FrameDisposition::Failed {
                failed += 1;
            }
            frames.push(result);
        }

        let total_time = started.elapsed().as_secs_f64();
        let processed = frames.len();
        log::info!(
            "{}: {} frames processed, {} events, {} failed in {:.2}s",
            label,
            processed,
            events,
            failed,
            total_time
        );
        Ok(VideoResult {
            source: label,
            processed_frames: processed,
            event_frames: events,
            failed_frames: failed,
            frames,
            total_time,
            fps: processed as f64 / total_time.max(1e-6),
        })
    }

    /// Streaming mode: a pull-based iterator yielding one frame result at a
    /// time. The caller controls pacing; dropping the stream releases the
    /// source whether iteration completed, was cancelled, or errored.
    pub fn stream(
        &mut self,
        source: Box<dyn FrameSource>,
        options: ProcessOptions,
    ) -> FrameStream<'_> {
        let source_fps = source.fps().max(1e-6);
        // Truncating division, so 10 fps decimated to 4 fps keeps every
        // 2nd frame rather than every 3rd.
        let interval = ((source_fps / options.sample_fps.max(1e-6)) as u64).max(1);
        FrameStream {
            pipeline: self,
            source,
            options,
            source_fps,
            interval,
            raw_idx: 0,
            processed: 0,
            done: false,
        }
    }
}

/// Pull-based frame result stream. See [`CascadePipeline::stream`].
pub struct FrameStream<'p> {
    pipeline: &'p mut CascadePipeline,
    source: Box<dyn FrameSource>,
    options: ProcessOptions,
    source_fps: f64,
    /// Keep every `interval`-th raw frame.
    interval: u64,
    raw_idx: u64,
    processed: usize,
    done: bool,
}

impl Iterator for FrameStream<'_> {
    type Item = Result<FrameResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(cap) = self.options.max_frames {
            if self.processed >= cap {
                self.done = true;
                return None;
            }
        }
        loop {
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    // A broken source ends the stream; per-frame backend
                    // failures are handled inside process_frame instead.
                    self.done = true;
                    return Some(Err(e));
                }
            };
            let idx = self.raw_idx;
            self.raw_idx += 1;
            if idx % self.interval != 0 {
                continue;
            }
            let timestamp = idx as f64 / self.source_fps;
            let result =
                self.pipeline
                    .process_frame(&frame, idx, timestamp, self.options.force_full);
            self.processed += 1;
            return Some(Ok(result));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{NormBox, StubBackend};
    use crate::generate::StubGenerator;
    use crate::source::{SyntheticConfig, SyntheticSource};
    use anyhow::anyhow;

    fn pipeline() -> CascadePipeline {
        CascadePipeline::new(
            &CascadeConfig::default(),
            Box::new(StubBackend::new()),
            Box::new(StubGenerator::new()),
        )
        .unwrap()
    }

    fn frame() -> Frame {
        Frame {
            pixels: vec![1; 64 * 64 * 3],
            width: 64,
            height: 64,
        }
    }

    struct ScriptedDetector {
        detections: Vec<Detection>,
    }

    impl DetectorBackend for ScriptedDetector {
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Ok(self.detections.clone())
        }
    }

    struct FailingDetector;

    impl DetectorBackend for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Err(anyhow!("device lost"))
        }
    }

    fn scripted(detections: Vec<Detection>) -> CascadePipeline {
        CascadePipeline::new(
            &CascadeConfig::default(),
            Box::new(ScriptedDetector { detections }),
            Box::new(StubGenerator::new()),
        )
        .unwrap()
    }

    #[test]
    fn no_event_takes_the_skip_path() {
        let mut p = scripted(vec![]);
        let result = p.process_frame(&frame(), 0, 0.0, false);
        assert_eq!(result.disposition, FrameDisposition::Skipped);
        assert!(!result.is_event);
        assert_eq!(result.tokens_used, 0);
        assert!(result.caption.is_none());
    }

    #[test]
    fn force_full_overrides_the_gate() {
        let mut p = scripted(vec![]);
        let result = p.process_frame(&frame(), 0, 0.0, true);
        assert_eq!(result.disposition, FrameDisposition::Full);
        assert!(!result.is_event);
        assert!(result.caption.is_some());
    }

    #[test]
    fn event_frame_runs_the_full_path() {
        let mut p = scripted(vec![Detection::new(
            NormBox::new(0.2, 0.2, 0.8, 0.8),
            "fire",
            0.9,
        )]);
        let result = p.process_frame(&frame(), 3, 1.5, false);
        assert_eq!(result.disposition, FrameDisposition::Full);
        assert!(result.is_event);
        assert_eq!(result.tier, HazardTier::Critical);
        assert!(result.tokens_used > 0);
        assert!(result.tokens_used <= result.tokens_total);
    }

    #[test]
    fn detector_failure_is_recorded_not_fatal() {
        let mut p = CascadePipeline::new(
            &CascadeConfig::default(),
            Box::new(FailingDetector),
            Box::new(StubGenerator::new()),
        )
        .unwrap();
        let result = p.process_frame(&frame(), 0, 0.0, false);
        assert_eq!(result.disposition, FrameDisposition::Failed);
        assert!(result.error.as_deref().unwrap().contains("device lost"));

        // Video-level run keeps going and counts the failures.
        let source = SyntheticSource::new(SyntheticConfig {
            total_frames: 5,
            fps: 1.0,
            ..SyntheticConfig::default()
        });
        let opts = ProcessOptions {
            sample_fps: 1.0,
            max_frames: None,
            force_full: false,
        };
        let video = p.process_video(Box::new(source), opts).unwrap();
        assert_eq!(video.processed_frames, 5);
        assert_eq!(video.failed_frames, 5);
    }

    #[test]
    fn frame_cap_stops_the_stream() {
        let mut p = pipeline();
        let source = SyntheticSource::new(SyntheticConfig {
            total_frames: 100,
            fps: 1.0,
            ..SyntheticConfig::default()
        });
        let opts = ProcessOptions {
            sample_fps: 1.0,
            max_frames: Some(7),
            force_full: false,
        };
        let video = p.process_video(Box::new(source), opts).unwrap();
        assert_eq!(video.processed_frames, 7);
    }

    #[test]
    fn sampling_decimates_and_timestamps_from_position() {
        let mut p = pipeline();
        let source = SyntheticSource::new(SyntheticConfig {
            total_frames: 30,
            fps: 10.0,
            ..SyntheticConfig::default()
        });
        let opts = ProcessOptions {
            sample_fps: 2.0,
            max_frames: None,
            force_full: false,
        };
        let video = p.process_video(Box::new(source), opts).unwrap();
        // Every 5th raw frame at 10 fps.
        assert_eq!(video.processed_frames, 6);
        let timestamps: Vec<f64> = video.frames.iter().map(|f| f.timestamp).collect();
        assert!((timestamps[1] - 0.5).abs() < 1e-9);
        let mut sorted = timestamps.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(timestamps, sorted);
    }

    #[test]
    fn decimation_interval_truncates() {
        // 10 fps source at a 4 fps target: 10/4 truncates to every 2nd
        // raw frame, so 30 frames yield 15 results.
        let mut p = pipeline();
        let source = SyntheticSource::new(SyntheticConfig {
            total_frames: 30,
            fps: 10.0,
            ..SyntheticConfig::default()
        });
        let opts = ProcessOptions {
            sample_fps: 4.0,
            max_frames: None,
            force_full: false,
        };
        let video = p.process_video(Box::new(source), opts).unwrap();
        assert_eq!(video.processed_frames, 15);
        assert_eq!(video.frames[1].frame_idx, 2);
    }

    #[test]
    fn streaming_matches_batch_per_frame() {
        let opts = ProcessOptions {
            sample_fps: 5.0,
            max_frames: Some(10),
            force_full: false,
        };
        let cfg = SyntheticConfig {
            total_frames: 40,
            fps: 10.0,
            ..SyntheticConfig::default()
        };

        let mut batch_pipeline = pipeline();
        let batch = batch_pipeline
            .process_video(Box::new(SyntheticSource::new(cfg.clone())), opts)
            .unwrap();

        let mut stream_pipeline = pipeline();
        let streamed: Vec<FrameResult> = stream_pipeline
            .stream(Box::new(SyntheticSource::new(cfg)), opts)
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert_eq!(batch.frames.len(), streamed.len());
        for (a, b) in batch.frames.iter().zip(&streamed) {
            assert_eq!(a.frame_idx, b.frame_idx);
            assert_eq!(a.is_event, b.is_event);
            assert_eq!(a.tier, b.tier);
            assert_eq!(a.tokens_used, b.tokens_used);
        }
    }

    #[test]
    fn early_drop_of_stream_is_clean() {
        let mut p = pipeline();
        let source = SyntheticSource::new(SyntheticConfig {
            total_frames: 1000,
            ..SyntheticConfig::default()
        });
        let opts = p.default_options();
        let mut stream = p.stream(Box::new(source), opts);
        let _first = stream.next();
        drop(stream);
        // Pipeline stays usable for the next video.
        let source = SyntheticSource::new(SyntheticConfig {
            total_frames: 2,
            fps: 1.0,
            ..SyntheticConfig::default()
        });
        let opts = ProcessOptions {
            sample_fps: 1.0,
            max_frames: None,
            force_full: false,
        };
        let video = p.process_video(Box::new(source), opts).unwrap();
        assert_eq!(video.processed_frames, 2);
    }
}
