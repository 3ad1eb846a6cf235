use serde::{Deserialize, Serialize};

/// One recognized object instance, in the model's input coordinate space.
///
/// `x`/`y` are the box center; `width`/`height` the box extent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Detection {
    pub fn new(
        class: impl Into<String>,
        confidence: f32,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Self {
        Self {
            class: class.into(),
            confidence,
            x,
            y,
            width,
            height,
        }
    }

    /// Overlay label, e.g. `car 93.2%`.
    pub fn label(&self) -> String {
        format!("{} {:.1}%", self.class, self.confidence * 100.0)
    }

    /// Clamp confidence and box size into range. Returns `None` for non-finite values.
    fn normalized(mut self) -> Option<Self> {
        let fields = [self.confidence, self.x, self.y, self.width, self.height];
        if fields.iter().any(|value| !value.is_finite()) {
            return None;
        }
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self.width = self.width.max(0.0);
        self.height = self.height.max(0.0);
        Some(self)
    }
}

/// Ordered detections produced by exactly one inference call.
///
/// A set is replaced wholesale by the next completed call; it is never merged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionSet {
    detections: Vec<Detection>,
}

impl DetectionSet {
    pub fn new(detections: Vec<Detection>) -> Self {
        let received = detections.len();
        let detections: Vec<Detection> = detections
            .into_iter()
            .filter_map(Detection::normalized)
            .collect();
        if detections.len() != received {
            log::debug!(
                "dropped {} detection(s) with non-finite fields",
                received - detections.len()
            );
        }
        Self { detections }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.detections
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.iter()
    }
}

/// Body returned by `POST /detect`.
///
/// Everything except `predictions` is kept as-is, since the proxy passes the
/// provider's response through untouched.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct InferenceResponse {
    #[serde(default)]
    pub predictions: Vec<Detection>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl InferenceResponse {
    pub fn into_detection_set(self) -> DetectionSet {
        DetectionSet::new(self.predictions)
    }
}

/// Human-readable geometry of a detection relative to the frame center.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionSummary {
    pub label: String,
    /// Rounded box size, e.g. `40x20px`.
    pub size: String,
    /// Distance in pixels from the frame center to the box center.
    pub distance: f32,
    /// Direction from the frame center, degrees in (-180, 180].
    pub angle_deg: f32,
}

impl DetectionSummary {
    pub fn describe(detection: &Detection, natural_width: u32, natural_height: u32) -> Self {
        let cx = natural_width as f32 / 2.0;
        let cy = natural_height as f32 / 2.0;
        let dx = detection.x - cx;
        let dy = detection.y - cy;
        Self {
            label: detection.label(),
            size: format!(
                "{}x{}px",
                detection.width.round() as i64,
                detection.height.round() as i64
            ),
            distance: (dx * dx + dy * dy).sqrt(),
            angle_deg: dy.atan2(dx).to_degrees(),
        }
    }
}

impl std::fmt::Display for DetectionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | size: {} | distance: {}px | angle: {:.1}°",
            self.label,
            self.size,
            self.distance.round() as i64,
            self.angle_deg
        )
    }
}
