//! Pointer handling for the active tool.
//!
//! The renderer reports clicks and moves in image pixel coordinates; these
//! are turned into ordinary actions against the current state.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::actions::{Action, ConfigAction, SourcesAction};
use crate::config::WorkbenchConfig;
use crate::data_files::{Hdu, HduId};
use crate::hdu_state::{HduAction, PlotterPoint};
use crate::layout::ViewerId;
use crate::marker::{Marker, MarkerShape};
use crate::panels::{CentroidSettings, WorkbenchTool};
use crate::sources::{PosType, Source};
use crate::store::WorkbenchState;

pub const CUSTOM_MARKER_LABEL_GAP: f64 = 8.0;

/// Refines a clicked pixel position to the nearby light centroid.
pub trait Centroider: Debug + Send + Sync {
    /// `disk` selects planetary-disk centroiding instead of PSF fitting.
    fn centroid(&self, hdu: &Hdu, x: f64, y: f64, settings: &CentroidSettings, disk: bool) -> (f64, f64);
}

/// Leaves positions untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCentroid;

impl Centroider for NoCentroid {
    fn centroid(&self, _hdu: &Hdu, x: f64, y: f64, _settings: &CentroidSettings, _disk: bool) -> (f64, f64) {
        (x, y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    pub alt: bool,
    pub ctrl: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointerEvent {
    ImageClick {
        viewer_id: ViewerId,
        hdu_id: HduId,
        x: f64,
        y: f64,
        hit_image: bool,
        modifiers: Modifiers,
    },
    ImageMove {
        viewer_id: ViewerId,
        hdu_id: HduId,
        x: f64,
        y: f64,
    },
    MarkerClick {
        viewer_id: ViewerId,
        hdu_id: HduId,
        marker: Marker,
        modifiers: Modifiers,
    },
}

/// Pixel position as a plotter point, in sky coordinates when the HDU has a
/// valid WCS.
pub fn plotter_point(hdu: &Hdu, x: f64, y: f64) -> PlotterPoint {
    match hdu.valid_wcs().and_then(|wcs| wcs.pix_to_world([x, y])) {
        Some([ra, dec]) => PlotterPoint {
            pos_type: PosType::Sky,
            primary: ra,
            secondary: dec,
        },
        None => PlotterPoint {
            pos_type: PosType::Pixel,
            primary: x,
            secondary: y,
        },
    }
}

/// Actions produced by a pointer event under the active tool. Tools without
/// pointer behaviour, and events on unknown HDUs, produce nothing.
pub fn pointer_actions(
    state: &WorkbenchState,
    config: &WorkbenchConfig,
    centroider: &dyn Centroider,
    event: &PointerEvent,
) -> Vec<Action> {
    match (state.active_tool, event) {
        (
            WorkbenchTool::CustomMarker,
            PointerEvent::ImageClick {
                hdu_id,
                x,
                y,
                hit_image: true,
                modifiers,
                ..
            },
        ) => custom_marker_click(state, config, centroider, *hdu_id, *x, *y, *modifiers),
        (
            WorkbenchTool::Plotter,
            PointerEvent::ImageClick {
                hdu_id,
                x,
                y,
                hit_image: true,
                ..
            },
        ) => {
            let Some(hdu) = state.data_files.hdu(hdu_id) else {
                return Vec::new();
            };
            let panel_config = &state.plotting_panel_config;
            let (x, y) = if panel_config.centroid_clicks {
                centroider.centroid(hdu, *x, *y, &state.settings.centroid, panel_config.planet_centroiding)
            } else {
                (*x, *y)
            };
            vec![hdu_action(*hdu_id, HduAction::StartLine(plotter_point(hdu, x, y)))]
        }
        (
            WorkbenchTool::Photometry,
            PointerEvent::ImageClick {
                hdu_id,
                x,
                y,
                hit_image: true,
                modifiers,
                ..
            },
        ) => photometry_click(state, centroider, *hdu_id, *x, *y, *modifiers),
        (WorkbenchTool::Plotter, PointerEvent::ImageMove { hdu_id, x, y, .. }) => {
            let measuring = state
                .hdu_state(hdu_id)
                .is_some_and(|hdu_state| hdu_state.plotting_panel_state.measuring);
            match state.data_files.hdu(hdu_id) {
                Some(hdu) if measuring => {
                    vec![hdu_action(*hdu_id, HduAction::UpdateLine(plotter_point(hdu, *x, *y)))]
                }
                _ => Vec::new(),
            }
        }
        (
            WorkbenchTool::CustomMarker,
            PointerEvent::MarkerClick {
                hdu_id,
                marker,
                modifiers,
                ..
            },
        ) => custom_marker_marker_click(state, *hdu_id, marker, *modifiers),
        (WorkbenchTool::Photometry, PointerEvent::MarkerClick { marker, modifiers, .. }) => {
            photometry_marker_click(state, marker, *modifiers)
        }
        _ => Vec::new(),
    }
}

fn hdu_action(hdu_id: HduId, action: HduAction) -> Action {
    Action::Hdu { hdu_id, action }
}

fn custom_marker_click(
    state: &WorkbenchState,
    config: &WorkbenchConfig,
    centroider: &dyn Centroider,
    hdu_id: HduId,
    x: f64,
    y: f64,
    modifiers: Modifiers,
) -> Vec<Action> {
    let (Some(hdu), Some(hdu_state)) = (state.data_files.hdu(&hdu_id), state.hdu_state(&hdu_id)) else {
        return Vec::new();
    };
    let has_selection = !hdu_state.custom_marker_panel_state.selected_ids().is_empty();
    if has_selection && !modifiers.alt {
        return vec![hdu_action(hdu_id, HduAction::SetCustomMarkerSelection(Vec::new()))];
    }

    let panel_config = &state.custom_marker_panel_config;
    let (x, y) = if panel_config.centroid_clicks {
        centroider.centroid(hdu, x, y, &state.settings.centroid, panel_config.use_planet_centroiding)
    } else {
        (x, y)
    };
    let marker = Marker::new(MarkerShape::circle(x, y, config.custom_marker_radius))
        .labeled(None, CUSTOM_MARKER_LABEL_GAP);
    vec![hdu_action(hdu_id, HduAction::AddCustomMarkers(vec![marker]))]
}

fn photometry_click(
    state: &WorkbenchState,
    centroider: &dyn Centroider,
    hdu_id: HduId,
    x: f64,
    y: f64,
    modifiers: Modifiers,
) -> Vec<Action> {
    let Some(hdu) = state.data_files.hdu(&hdu_id) else {
        return Vec::new();
    };
    let panel_config = &state.photometry_panel_config;
    if !panel_config.selected_source_ids.is_empty() && !modifiers.alt {
        return vec![ConfigAction::SetSelectedSources(Vec::new()).into()];
    }

    let (x, y) = if panel_config.centroid_clicks {
        centroider.centroid(hdu, x, y, &state.settings.centroid, false)
    } else {
        (x, y)
    };
    let sky = match panel_config.coord_mode {
        PosType::Sky => hdu.valid_wcs().and_then(|wcs| wcs.pix_to_world([x, y])),
        PosType::Pixel => None,
    };
    let source = match sky {
        Some([ra, dec]) => Source::new(PosType::Sky, ra, dec),
        None => Source::new(PosType::Pixel, x, y),
    }
    .on_hdu(hdu_id)
    .at_epoch(hdu.center_time());

    vec![SourcesAction::AddSources(vec![source]).into()]
}

fn custom_marker_marker_click(
    state: &WorkbenchState,
    hdu_id: HduId,
    marker: &Marker,
    modifiers: Modifiers,
) -> Vec<Action> {
    if modifiers.alt {
        return Vec::new();
    }
    let Some(custom) = state
        .hdu_state(&hdu_id)
        .and_then(|hdu_state| hdu_state.custom_marker_panel_state.markers.get_by_id(&marker.id))
    else {
        return Vec::new();
    };

    let action = match (modifiers.ctrl, custom.selected) {
        (true, false) => HduAction::SelectCustomMarkers(vec![custom.id]),
        (true, true) => HduAction::DeselectCustomMarkers(vec![custom.id]),
        (false, _) => HduAction::SetCustomMarkerSelection(vec![custom.id]),
    };
    vec![hdu_action(hdu_id, action)]
}

fn photometry_marker_click(state: &WorkbenchState, marker: &Marker, modifiers: Modifiers) -> Vec<Action> {
    if modifiers.alt {
        return Vec::new();
    }
    let Some(source_id) = marker
        .source_id
        .filter(|source_id| state.sources.sources.contains(source_id))
    else {
        return Vec::new();
    };

    let selected = &state.photometry_panel_config.selected_source_ids;
    let selection = if !modifiers.ctrl {
        vec![source_id]
    } else if selected.contains(&source_id) {
        selected.iter().copied().filter(|id| *id != source_id).collect()
    } else {
        selected.iter().copied().chain([source_id]).collect()
    };
    vec![ConfigAction::SetSelectedSources(selection).into()]
}
