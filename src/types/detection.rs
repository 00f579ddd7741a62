//! Structured detection results.
//!
//! This is the output shape of the object-detection style predictor: a list
//! of labeled bounding boxes, serialized as JSON for the wire.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::types::Outbound;

/// One detected object: a bounding box and a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// Bounding box as `(x0, y0, x1, y1)` in image coordinates
    #[serde(rename = "box")]
    pub bounding_box: (f32, f32, f32, f32),

    /// Class label
    pub label: String,
}

/// Full detection result for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detections {
    pub objects: Vec<DetectedObject>,
}

impl Detections {
    /// Result with no detected objects.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Serialize to the JSON wire form.
    pub fn to_outbound(&self) -> Result<Outbound> {
        Outbound::json(self)
    }
}
