use common::{EntityCollection, EntityKey};
use glam::DVec2;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::data_files::{HduId, HduType, Histogram};
use crate::marker::{Marker, MarkerId};
use crate::sources::PosType;
use crate::transform::{Region, Transform, Transformation, ViewportSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum NormalizerMode {
    #[default]
    Percentile,
    Pixel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum StretchMode {
    #[default]
    Linear,
    Log,
    Sqrt,
    ArcSinh,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelNormalizer {
    pub mode: NormalizerMode,
    pub background_percentile: f64,
    pub peak_percentile: f64,
    pub background_level: f64,
    pub peak_level: f64,
    pub stretch_mode: StretchMode,
    pub scale: f64,
    pub offset: f64,
}

impl PixelNormalizer {
    pub fn with_percentiles(background_percentile: f64, peak_percentile: f64) -> Self {
        Self {
            mode: NormalizerMode::Percentile,
            background_percentile,
            peak_percentile,
            background_level: 0.0,
            peak_level: 0.0,
            stretch_mode: StretchMode::Linear,
            scale: 1.0,
            offset: 0.0,
        }
    }
}

/// Partial update of a normalizer; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizerChanges {
    pub mode: Option<NormalizerMode>,
    pub background_percentile: Option<f64>,
    pub peak_percentile: Option<f64>,
    pub background_level: Option<f64>,
    pub peak_level: Option<f64>,
    pub stretch_mode: Option<StretchMode>,
    pub scale: Option<f64>,
    pub offset: Option<f64>,
}

impl NormalizerChanges {
    fn apply(&self, normalizer: &mut PixelNormalizer) {
        if let Some(mode) = self.mode {
            normalizer.mode = mode;
        }
        if let Some(value) = self.background_percentile {
            normalizer.background_percentile = value;
        }
        if let Some(value) = self.peak_percentile {
            normalizer.peak_percentile = value;
        }
        if let Some(value) = self.background_level {
            normalizer.background_level = value;
        }
        if let Some(value) = self.peak_level {
            normalizer.peak_level = value;
        }
        if let Some(stretch_mode) = self.stretch_mode {
            normalizer.stretch_mode = stretch_mode;
        }
        if let Some(value) = self.scale {
            normalizer.scale = value;
        }
        if let Some(value) = self.offset {
            normalizer.offset = value;
        }
    }

    fn touches_percentiles(&self) -> bool {
        self.mode.is_some() || self.background_percentile.is_some() || self.peak_percentile.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub normalizer: PixelNormalizer,
    pub initialized: bool,
}

impl Normalization {
    /// Recomputes the levels from the percentiles when in percentile mode.
    fn renormalize(&mut self, histogram: &Histogram) {
        let normalizer = &mut self.normalizer;
        if normalizer.mode == NormalizerMode::Percentile {
            normalizer.background_level = histogram.level_at_percentile(normalizer.background_percentile);
            normalizer.peak_level = histogram.level_at_percentile(normalizer.peak_percentile);
        }
        self.initialized = true;
    }
}

#[derive(Debug, Clone, Default)]
pub struct CustomMarkerPanelState {
    pub markers: EntityCollection<MarkerId, Marker>,
}

impl CustomMarkerPanelState {
    pub fn selected_ids(&self) -> Vec<MarkerId> {
        self.markers
            .iter()
            .filter(|marker| marker.selected)
            .map(|marker| marker.id)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotterPoint {
    pub pos_type: PosType,
    pub primary: f64,
    pub secondary: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlottingPanelState {
    pub line_measure_start: Option<PlotterPoint>,
    pub line_measure_end: Option<PlotterPoint>,
    pub measuring: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum SonifierRegionMode {
    #[default]
    Viewport,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressLine {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SonificationPanelState {
    pub region_history: Vec<Region>,
    pub region_history_index: Option<usize>,
    pub region_history_initialized: bool,
    pub region_mode: SonifierRegionMode,
    pub progress_line: Option<ProgressLine>,
}

impl SonificationPanelState {
    pub fn current_region(&self) -> Option<&Region> {
        self.region_history.get(self.region_history_index?)
    }
}

/// Workbench-side state of one open HDU.
#[derive(Debug, Clone)]
pub struct HduState {
    pub hdu_id: HduId,
    pub hdu_type: HduType,
    pub transformation: Transformation,
    pub normalization: Normalization,
    pub custom_marker_panel_state: CustomMarkerPanelState,
    pub plotting_panel_state: PlottingPanelState,
    pub sonification_panel_state: SonificationPanelState,
}

impl EntityKey<HduId> for HduState {
    fn key(&self) -> &HduId {
        &self.hdu_id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HduAction {
    UpdateNormalizer(NormalizerChanges),
    RenormalizeImageHdu,
    SetImageTransform(Transform),
    SetViewportTransform(Transform),
    SetViewportSize(ViewportSize),
    MoveBy { dx: f64, dy: f64 },
    ZoomBy { factor: f64, anchor: Option<DVec2> },
    ZoomTo { scale: f64, anchor: Option<DVec2> },
    RotateBy { degrees: f64 },
    Flip,
    ResetImageTransform,
    CenterRegionInViewport(Region),
    AddRegionToHistory(Region),
    ClearRegionHistory,
    UndoRegionSelection,
    RedoRegionSelection,
    SetSonifierRegionMode(SonifierRegionMode),
    SetProgressLine(Option<ProgressLine>),
    StartLine(PlotterPoint),
    UpdateLine(PlotterPoint),
    UpdatePlotterFileState(PlottingPanelState),
    AddCustomMarkers(Vec<Marker>),
    UpdateCustomMarker(Marker),
    RemoveCustomMarkers(Vec<MarkerId>),
    SelectCustomMarkers(Vec<MarkerId>),
    DeselectCustomMarkers(Vec<MarkerId>),
    SetCustomMarkerSelection(Vec<MarkerId>),
}

/// What the reducer needs to know about the HDU itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct HduContext<'a> {
    pub image_size: Option<(f64, f64)>,
    pub histogram: Option<&'a Histogram>,
}

impl HduState {
    pub fn new(hdu_id: HduId, hdu_type: HduType, normalizer: PixelNormalizer) -> Self {
        Self {
            hdu_id,
            hdu_type,
            transformation: Transformation::default(),
            normalization: Normalization {
                normalizer,
                initialized: false,
            },
            custom_marker_panel_state: CustomMarkerPanelState::default(),
            plotting_panel_state: PlottingPanelState::default(),
            sonification_panel_state: SonificationPanelState::default(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.hdu_type == HduType::Image
    }

    /// Applies one action. Returns false when the action does not apply to
    /// this HDU, e.g. image actions on a table.
    pub fn apply(&mut self, action: HduAction, ctx: HduContext<'_>) -> bool {
        if !self.is_image() {
            return false;
        }

        let transformation = &mut self.transformation;
        match action {
            HduAction::UpdateNormalizer(changes) => {
                changes.apply(&mut self.normalization.normalizer);
                if changes.touches_percentiles() {
                    if let Some(histogram) = ctx.histogram {
                        self.normalization.renormalize(histogram);
                    }
                }
            }
            HduAction::RenormalizeImageHdu => {
                let Some(histogram) = ctx.histogram else {
                    return false;
                };
                self.normalization.renormalize(histogram);
            }
            HduAction::SetImageTransform(transform) => transformation.image_transform = transform,
            HduAction::SetViewportTransform(transform) => {
                transformation.viewport_transform = transform
            }
            HduAction::SetViewportSize(size) => transformation.viewport_size = Some(size),
            HduAction::MoveBy { dx, dy } => transformation.move_by(dx, dy),
            HduAction::ZoomBy { factor, anchor } => transformation.zoom_by(factor, anchor),
            HduAction::ZoomTo { scale, anchor } => transformation.zoom_to(scale, anchor),
            HduAction::RotateBy { degrees } => transformation.rotate_by(degrees, ctx.image_size),
            HduAction::Flip => transformation.flip(ctx.image_size),
            HduAction::ResetImageTransform => transformation.reset(ctx.image_size),
            HduAction::CenterRegionInViewport(region) => {
                return transformation.fit_region(&region);
            }
            HduAction::AddRegionToHistory(region) => {
                let sonification = &mut self.sonification_panel_state;
                sonification.region_history.push(region);
                sonification.region_history_index = Some(sonification.region_history.len() - 1);
                sonification.region_history_initialized = true;
            }
            HduAction::ClearRegionHistory => {
                let sonification = &mut self.sonification_panel_state;
                sonification.region_history.clear();
                sonification.region_history_index = None;
                sonification.region_history_initialized = false;
            }
            HduAction::UndoRegionSelection => {
                let sonification = &mut self.sonification_panel_state;
                match sonification.region_history_index {
                    Some(idx) if idx > 0 => sonification.region_history_index = Some(idx - 1),
                    _ => return false,
                }
            }
            HduAction::RedoRegionSelection => {
                let sonification = &mut self.sonification_panel_state;
                match sonification.region_history_index {
                    Some(idx) if idx + 1 < sonification.region_history.len() => {
                        sonification.region_history_index = Some(idx + 1)
                    }
                    _ => return false,
                }
            }
            HduAction::SetSonifierRegionMode(mode) => {
                self.sonification_panel_state.region_mode = mode
            }
            HduAction::SetProgressLine(line) => self.sonification_panel_state.progress_line = line,
            HduAction::StartLine(point) => {
                let plotting = &mut self.plotting_panel_state;
                if !plotting.measuring {
                    plotting.line_measure_start = Some(point);
                }
                plotting.line_measure_end = Some(point);
                plotting.measuring = !plotting.measuring;
            }
            HduAction::UpdateLine(point) => {
                let plotting = &mut self.plotting_panel_state;
                if !plotting.measuring {
                    return false;
                }
                plotting.line_measure_end = Some(point);
            }
            HduAction::UpdatePlotterFileState(state) => self.plotting_panel_state = state,
            HduAction::AddCustomMarkers(markers) => {
                self.custom_marker_panel_state.markers.add_many(markers);
            }
            HduAction::UpdateCustomMarker(marker) => {
                let markers = &mut self.custom_marker_panel_state.markers;
                if !markers.contains(&marker.id) {
                    return false;
                }
                markers.upsert(marker);
            }
            HduAction::RemoveCustomMarkers(ids) => {
                self.custom_marker_panel_state.markers.remove_many(&ids);
            }
            HduAction::SelectCustomMarkers(ids) => self.set_marker_selection(&ids, true),
            HduAction::DeselectCustomMarkers(ids) => self.set_marker_selection(&ids, false),
            HduAction::SetCustomMarkerSelection(ids) => {
                for marker in self.custom_marker_panel_state.markers.iter_mut() {
                    marker.selected = ids.contains(&marker.id);
                }
            }
        }
        true
    }

    fn set_marker_selection(&mut self, ids: &[MarkerId], selected: bool) {
        for id in ids {
            self.custom_marker_panel_state
                .markers
                .update_one(id, |marker| marker.selected = selected);
        }
    }
}
