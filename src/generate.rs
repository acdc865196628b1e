//! Generation backends.
//!
//! The core hands a keep-mask and a formatted prompt to a generation
//! backend and records what comes back. Model loading, quantization, image
//! encoding, and sampling all live behind this seam.

use anyhow::Result;

use crate::mask::MaskOutcome;
use crate::source::Frame;

/// What the generation stage returns for one frame.
#[derive(Clone, Debug)]
pub struct GenerationOutput {
    pub caption: String,
    /// Visual tokens actually consumed.
    pub tokens_used: usize,
}

/// Generation backend trait.
///
/// `generate` takes `&mut self` for the same reason the detector does:
/// real backends hold model and device state.
pub trait GenerationBackend: Send {
    fn name(&self) -> &'static str;

    fn generate(
        &mut self,
        frame: &Frame,
        prompt: &str,
        mask: &MaskOutcome,
    ) -> Result<GenerationOutput>;
}

/// Stub generator for tests and synthetic runs. Consumes exactly the kept
/// patches (plus the summary token when preserved) and echoes a canned
/// caption.
pub struct StubGenerator {
    calls: u64,
}

impl StubGenerator {
    pub fn new() -> Self {
        Self { calls: 0 }
    }
}

impl Default for StubGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationBackend for StubGenerator {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn generate(
        &mut self,
        _frame: &Frame,
        prompt: &str,
        mask: &MaskOutcome,
    ) -> Result<GenerationOutput> {
        self.calls += 1;
        let tokens_used = mask.kept + usize::from(mask.summary_token_kept);
        let first_line = prompt.lines().next().unwrap_or_default();
        Ok(GenerationOutput {
            caption: format!(
                "[stub caption {}] {} ({} of {} patches attended)",
                self.calls, first_line, mask.kept, mask.total
            ),
            tokens_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dilation::DilationPolicy;
    use crate::mask::{MaskBuilder, PatchGrid};

    #[test]
    fn stub_generator_consumes_kept_tokens() {
        let grid = PatchGrid::new(336, 14).unwrap();
        let builder = MaskBuilder::new(grid, DilationPolicy::fixed(1.0).unwrap(), 0, true);
        let outcome = builder.build(&[]);
        let frame = Frame {
            pixels: vec![0; 12],
            width: 2,
            height: 2,
        };
        let mut generator = StubGenerator::new();
        let out = generator.generate(&frame, "prompt", &outcome).unwrap();
        // Empty mask plus the preserved summary token.
        assert_eq!(out.tokens_used, 1);
        assert!(!out.caption.is_empty());
    }
}
