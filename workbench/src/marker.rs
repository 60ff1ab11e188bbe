use common::{id_type, EntityKey};
use serde::{Deserialize, Serialize};

use crate::data_files::HduId;
use crate::sources::SourceId;

id_type!(
    /// Marker key. Derived markers get ids stable across refreshes.
    MarkerId
);

const PLOTTER_LINE: u128 = 0x504c_4f54;
const SONIFIER_REGION: u128 = 0x534f_4e52;
const SONIFIER_PROGRESS: u128 = 0x534f_4e50;

impl MarkerId {
    pub fn plotter_line(hdu_id: HduId) -> MarkerId {
        MarkerId::derived(hdu_id.as_uuid(), PLOTTER_LINE)
    }

    pub fn sonifier_region(hdu_id: HduId) -> MarkerId {
        MarkerId::derived(hdu_id.as_uuid(), SONIFIER_REGION)
    }

    pub fn sonifier_progress(hdu_id: HduId) -> MarkerId {
        MarkerId::derived(hdu_id.as_uuid(), SONIFIER_PROGRESS)
    }

    pub fn photometry_source(hdu_id: HduId, source_id: SourceId) -> MarkerId {
        MarkerId::derived(hdu_id.as_uuid(), source_id.as_uuid().as_u128().rotate_left(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarkerShape {
    Circle { x: f64, y: f64, radius: f64 },
    /// `theta` is the pointing direction in degrees.
    Teardrop { x: f64, y: f64, radius: f64, theta: f64 },
    Line { x1: f64, y1: f64, x2: f64, y2: f64 },
    Rectangle { x: f64, y: f64, width: f64, height: f64 },
}

impl MarkerShape {
    pub fn circle(x: f64, y: f64, radius: f64) -> Self {
        MarkerShape::Circle { x, y, radius }
    }

    pub fn line(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        MarkerShape::Line { x1, y1, x2, y2 }
    }

    /// Rectangle spanning two corner points.
    pub fn rectangle_between(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        MarkerShape::Rectangle {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }
}

/// Overlay element handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    #[serde(flatten)]
    pub shape: MarkerShape,
    pub label: Option<String>,
    pub label_gap: f64,
    pub label_theta: f64,
    pub selected: bool,
    pub source_id: Option<SourceId>,
}

impl EntityKey<MarkerId> for Marker {
    fn key(&self) -> &MarkerId {
        &self.id
    }
}

impl Marker {
    pub fn new(shape: MarkerShape) -> Self {
        Self::with_id(MarkerId::unique(), shape)
    }

    pub fn with_id(id: MarkerId, shape: MarkerShape) -> Self {
        Self {
            id,
            shape,
            label: None,
            label_gap: 0.0,
            label_theta: 0.0,
            selected: false,
            source_id: None,
        }
    }

    pub fn labeled(mut self, label: Option<String>, label_gap: f64) -> Self {
        self.label = label;
        self.label_gap = label_gap;
        self
    }
}
