use serde::Serialize;

/// Axis-aligned box with corners normalized to [0, 1].
///
/// Construction is total: corners are clamped into the unit square and
/// reordered when reversed, so downstream projection never sees a malformed
/// box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct NormBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl NormBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        let (x1, x2) = ordered(clamp01(x1), clamp01(x2));
        let (y1, y2) = ordered(clamp01(y1), clamp01(y2));
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn size(&self) -> (f32, f32) {
        (self.x2 - self.x1, self.y2 - self.y1)
    }

    /// Expand around the center by a multiplicative factor, re-clamping to
    /// the unit square. A factor of 1.0 is the identity.
    pub fn dilated(&self, factor: f32) -> Self {
        let (cx, cy) = self.center();
        let (w, h) = self.size();
        let hw = w * factor / 2.0;
        let hh = h * factor / 2.0;
        Self::new(cx - hw, cy - hh, cx + hw, cy + hh)
    }
}

fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

fn ordered(a: f32, b: f32) -> (f32, f32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Single detection produced by a detector backend.
///
/// The confidence is clamped into [0, 1] at construction so the gate never
/// has to handle out-of-range scores.
#[derive(Clone, Debug, Serialize)]
pub struct Detection {
    pub bbox: NormBox,
    pub class_name: String,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: NormBox, class_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            class_name: class_name.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}
