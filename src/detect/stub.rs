use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::{Detection, NormBox};
use crate::source::Frame;

/// Stub backend for tests and the synthetic demo. Derives a scripted scene
/// deterministically from the frame's pixel hash, so identical frames always
/// produce identical detections.
pub struct StubBackend {
    frames_seen: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { frames_seen: 0 }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.frames_seen += 1;

        let hash: [u8; 32] = Sha256::digest(&frame.pixels).into();
        let scene = hash[0] % 4;
        let jitter = hash[1] as f32 / 255.0 * 0.05;

        let detections = match scene {
            // Quiet scene: nothing of interest.
            0 => vec![],
            // Routine activity.
            1 => vec![Detection::new(
                NormBox::new(0.30 + jitter, 0.40, 0.45 + jitter, 0.80),
                "person",
                0.72,
            )],
            // Equipment near a worker.
            2 => vec![
                Detection::new(
                    NormBox::new(0.10, 0.35, 0.40, 0.85),
                    "forklift",
                    0.81,
                ),
                Detection::new(
                    NormBox::new(0.45 + jitter, 0.40, 0.58 + jitter, 0.82),
                    "person",
                    0.68,
                ),
            ],
            // Critical hazard.
            _ => vec![
                Detection::new(
                    NormBox::new(0.55, 0.05 + jitter, 0.90, 0.50),
                    "smoke",
                    0.77,
                ),
                Detection::new(NormBox::new(0.60, 0.30, 0.85, 0.60), "fire", 0.83),
            ],
        };

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(fill: u8) -> Frame {
        Frame {
            pixels: vec![fill; 64],
            width: 8,
            height: 8,
        }
    }

    #[test]
    fn identical_frames_yield_identical_detections() {
        let mut backend = StubBackend::new();
        let a = backend.detect(&frame(7)).unwrap();
        let b = backend.detect(&frame(7)).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.class_name, y.class_name);
            assert_eq!(x.bbox, y.bbox);
        }
    }

    #[test]
    fn detections_are_normalized() {
        let mut backend = StubBackend::new();
        for fill in 0..16u8 {
            for det in backend.detect(&frame(fill)).unwrap() {
                assert!(det.bbox.x1 >= 0.0 && det.bbox.x2 <= 1.0);
                assert!((0.0..=1.0).contains(&det.confidence));
            }
        }
    }
}
