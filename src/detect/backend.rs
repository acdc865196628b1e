use anyhow::Result;

use crate::detect::Detection;
use crate::source::Frame;

/// Detector backend trait.
///
/// The cascade core never loads or runs a detection model itself; it only
/// consumes the normalized detections a backend produces. Concrete neural
/// backends (ONNX, remote inference servers) implement this trait outside
/// the core.
///
/// `detect` takes `&mut self` because real backends keep device state and
/// warm caches between frames.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame, returning normalized detections.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
