//! Detector backends.
//!
//! The core consumes normalized detections; it does not produce them. This
//! module holds the backend seam (`DetectorBackend`), the detection types,
//! and a deterministic stub backend for tests and synthetic runs.

pub mod backend;
mod result;
pub mod stub;

pub use backend::DetectorBackend;
pub use result::{Detection, NormBox};
pub use stub::StubBackend;
