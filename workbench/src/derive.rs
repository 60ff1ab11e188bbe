//! Overlay markers derived from workbench state.
//!
//! Markers are never stored on their own. Every refresh recomputes them from
//! sources, per-HDU tool state and the active tool, and each viewer receives
//! its full list in one write.

use crate::config::WorkbenchConfig;
use crate::coords::source_coordinates;
use crate::data_files::{Hdu, HduId};
use crate::hdu_state::{HduState, PlotterPoint, SonifierRegionMode};
use crate::layout::ViewerId;
use crate::marker::{Marker, MarkerId, MarkerShape};
use crate::panels::{PlotMode, WorkbenchTool};
use crate::sources::PosType;
use crate::store::WorkbenchState;

const SOURCE_LABEL_GAP: f64 = 14.0;

/// Marker list of every viewer. Viewers that are not visible, or whose HDU
/// is not loaded yet, get an empty list.
pub fn viewer_markers(state: &WorkbenchState, config: &WorkbenchConfig) -> Vec<(ViewerId, Vec<Marker>)> {
    let visible = state.visible_viewer_hdus();
    state
        .layout
        .viewers
        .iter()
        .map(|viewer| {
            let markers = visible
                .iter()
                .find(|(viewer_id, _)| *viewer_id == viewer.id)
                .map(|(_, hdu_id)| hdu_markers(state, config, hdu_id))
                .unwrap_or_default();
            (viewer.id, markers)
        })
        .collect()
}

/// Markers of the active tool on one HDU.
pub fn hdu_markers(state: &WorkbenchState, config: &WorkbenchConfig, hdu_id: &HduId) -> Vec<Marker> {
    let (Some(hdu), Some(hdu_state)) = (state.data_files.hdu(hdu_id), state.hdu_state(hdu_id)) else {
        return Vec::new();
    };
    if !hdu.header_loaded() {
        return Vec::new();
    }

    match state.active_tool {
        WorkbenchTool::CustomMarker => custom_markers(hdu_state),
        WorkbenchTool::Plotter => plotter_markers(state, hdu, hdu_state),
        WorkbenchTool::Sonifier => sonifier_markers(hdu_state),
        WorkbenchTool::Photometry => photometry_markers(state, config, hdu),
        WorkbenchTool::Viewer
        | WorkbenchTool::FileInfo
        | WorkbenchTool::PixelOps
        | WorkbenchTool::Aligner
        | WorkbenchTool::Stacker => Vec::new(),
    }
}

pub fn custom_markers(hdu_state: &HduState) -> Vec<Marker> {
    hdu_state
        .custom_marker_panel_state
        .markers
        .iter()
        .cloned()
        .collect()
}

/// The measurement line, or its bounding rectangle in 2D mode. Sky
/// endpoints are projected and clamped to the image; they drop the marker
/// when the WCS is not usable.
pub fn plotter_markers(state: &WorkbenchState, hdu: &Hdu, hdu_state: &HduState) -> Vec<Marker> {
    let plotting = &hdu_state.plotting_panel_state;
    let (Some(start), Some(end)) = (plotting.line_measure_start, plotting.line_measure_end) else {
        return Vec::new();
    };
    let (Some([x1, y1]), Some([x2, y2])) = (plotter_pixel(hdu, start), plotter_pixel(hdu, end)) else {
        return Vec::new();
    };

    let shape = match state.plotting_panel_config.plot_mode {
        PlotMode::OneD => MarkerShape::line(x1, y1, x2, y2),
        PlotMode::TwoD => MarkerShape::rectangle_between(x1, y1, x2, y2),
    };
    vec![Marker::with_id(MarkerId::plotter_line(hdu.id), shape)]
}

fn plotter_pixel(hdu: &Hdu, point: PlotterPoint) -> Option<[f64; 2]> {
    match point.pos_type {
        PosType::Pixel => Some([point.primary, point.secondary]),
        PosType::Sky => {
            let (width, height) = hdu.image_size()?;
            let [x, y] = hdu.valid_wcs()?.world_to_pix([point.primary, point.secondary])?;
            Some([x.clamp(0.0, width), y.clamp(0.0, height)])
        }
    }
}

pub fn sonifier_markers(hdu_state: &HduState) -> Vec<Marker> {
    let sonification = &hdu_state.sonification_panel_state;
    let mut markers = Vec::new();
    if sonification.region_mode == SonifierRegionMode::Custom {
        if let Some(region) = sonification.current_region() {
            markers.push(Marker::with_id(
                MarkerId::sonifier_region(hdu_state.hdu_id),
                MarkerShape::Rectangle {
                    x: region.x,
                    y: region.y,
                    width: region.width,
                    height: region.height,
                },
            ));
        }
    }
    if let Some(line) = sonification.progress_line {
        markers.push(Marker::with_id(
            MarkerId::sonifier_progress(hdu_state.hdu_id),
            MarkerShape::line(line.x1, line.y1, line.x2, line.y2),
        ));
    }
    markers
}

/// One marker per source that lands on `hdu`. Moving sources are drawn as
/// teardrops pointing along their motion.
pub fn photometry_markers(state: &WorkbenchState, config: &WorkbenchConfig, hdu: &Hdu) -> Vec<Marker> {
    let panel = &state.photometry_panel_config;
    let mode = if hdu.valid_wcs().is_some() {
        panel.coord_mode
    } else {
        PosType::Pixel
    };

    state
        .sources
        .sources
        .iter()
        .filter(|source| source.hdu_id == Some(hdu.id) || panel.show_sources_from_all_files)
        .filter(|source| source.pos_type == mode)
        .filter_map(|source| {
            let coords = source_coordinates(hdu, source)?;
            let radius = config.marker_radius;
            let shape = if source.pm.is_some_and(|pm| pm != 0.0) {
                MarkerShape::Teardrop {
                    x: coords.x,
                    y: coords.y,
                    radius,
                    theta: coords.theta.or(source.pm_pos_angle).unwrap_or(0.0),
                }
            } else {
                MarkerShape::circle(coords.x, coords.y, radius)
            };
            let label = panel.show_source_labels.then(|| source.label.clone()).flatten();

            let mut marker = Marker::with_id(MarkerId::photometry_source(hdu.id, source.id), shape)
                .labeled(label, SOURCE_LABEL_GAP);
            marker.selected = panel.selected_source_ids.contains(&source.id);
            marker.source_id = Some(source.id);
            Some(marker)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hdu_state::{HduAction, ProgressLine};
    use crate::layout::Viewer;
    use crate::sources::Source;
    use crate::testing::{image_hdu, library_of};
    use crate::transform::Region;

    fn state_with_viewer(with_wcs: bool) -> (WorkbenchState, HduId, ViewerId) {
        let config = WorkbenchConfig::default();
        let mut state = WorkbenchState::new(&config);
        let hdu = image_hdu("a.fits", 200.0, 100.0, with_wcs);
        let hdu_id = hdu.id;
        state.load_library(library_of(vec![hdu]));
        let viewer = Viewer::new(vec![hdu_id]);
        let viewer_id = viewer.id;
        state.layout.create_viewer(viewer, None);
        (state, hdu_id, viewer_id)
    }

    fn markers_of(state: &WorkbenchState, viewer_id: ViewerId) -> Vec<Marker> {
        viewer_markers(state, &WorkbenchConfig::default())
            .into_iter()
            .find(|(id, _)| *id == viewer_id)
            .map(|(_, markers)| markers)
            .unwrap()
    }

    #[test]
    fn only_the_active_tool_contributes() {
        let (mut state, hdu_id, viewer_id) = state_with_viewer(false);
        state.apply_hdu_action(
            &hdu_id,
            HduAction::AddCustomMarkers(vec![Marker::new(MarkerShape::circle(5.0, 5.0, 10.0))]),
        );
        state
            .sources
            .add_sources(vec![Source::new(PosType::Pixel, 20.0, 30.0).on_hdu(hdu_id)]);

        state.active_tool = WorkbenchTool::CustomMarker;
        assert_eq!(markers_of(&state, viewer_id).len(), 1);

        state.active_tool = WorkbenchTool::Photometry;
        let markers = markers_of(&state, viewer_id);
        assert_eq!(markers.len(), 1);
        assert!(markers[0].source_id.is_some());

        state.active_tool = WorkbenchTool::Viewer;
        assert!(markers_of(&state, viewer_id).is_empty());
    }

    #[test]
    fn sky_sources_fall_back_to_pixel_mode_without_wcs() {
        let (mut state, hdu_id, viewer_id) = state_with_viewer(false);
        state.active_tool = WorkbenchTool::Photometry;
        state.sources.add_sources(vec![
            Source::new(PosType::Sky, 10.0, 30.0),
            Source::new(PosType::Pixel, 50.0, 50.0).on_hdu(hdu_id),
        ]);

        let markers = markers_of(&state, viewer_id);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].shape, MarkerShape::circle(50.0, 50.0, 15.0));
    }

    #[test]
    fn moving_source_is_a_teardrop_with_label() {
        let (mut state, hdu_id, viewer_id) = state_with_viewer(false);
        state.active_tool = WorkbenchTool::Photometry;
        state.photometry_panel_config.show_source_labels = true;
        let mut source = Source::new(PosType::Pixel, 40.0, 40.0).on_hdu(hdu_id);
        source.pm = Some(0.001);
        source.pm_pos_angle = Some(90.0);
        let ids = state.sources.add_sources(vec![source]);
        state.photometry_panel_config.selected_source_ids = ids.clone();

        let markers = markers_of(&state, viewer_id);
        assert_eq!(markers.len(), 1);
        let marker = &markers[0];
        assert!(matches!(marker.shape, MarkerShape::Teardrop { theta, .. } if theta == 90.0));
        assert_eq!(marker.label.as_deref(), Some("1"));
        assert_eq!(marker.label_gap, SOURCE_LABEL_GAP);
        assert!(marker.selected);
        assert_eq!(marker.id, MarkerId::photometry_source(hdu_id, ids[0]));
    }

    #[test]
    fn sources_of_other_files_can_be_hidden() {
        let (mut state, _, viewer_id) = state_with_viewer(false);
        state.active_tool = WorkbenchTool::Photometry;
        state
            .sources
            .add_sources(vec![Source::new(PosType::Pixel, 20.0, 20.0).on_hdu(HduId::unique())]);
        assert_eq!(markers_of(&state, viewer_id).len(), 1);

        state.photometry_panel_config.show_sources_from_all_files = false;
        assert!(markers_of(&state, viewer_id).is_empty());
    }

    #[test]
    fn plotter_line_and_rectangle() {
        let (mut state, hdu_id, viewer_id) = state_with_viewer(false);
        state.active_tool = WorkbenchTool::Plotter;
        let point = |x, y| PlotterPoint {
            pos_type: PosType::Pixel,
            primary: x,
            secondary: y,
        };
        state.apply_hdu_action(&hdu_id, HduAction::StartLine(point(10.0, 80.0)));
        state.apply_hdu_action(&hdu_id, HduAction::UpdateLine(point(30.0, 20.0)));

        let markers = markers_of(&state, viewer_id);
        assert_eq!(markers[0].shape, MarkerShape::line(10.0, 80.0, 30.0, 20.0));
        assert_eq!(markers[0].id, MarkerId::plotter_line(hdu_id));

        state.plotting_panel_config.plot_mode = PlotMode::TwoD;
        assert_eq!(
            markers_of(&state, viewer_id)[0].shape,
            MarkerShape::rectangle_between(10.0, 80.0, 30.0, 20.0)
        );
    }

    #[test]
    fn sky_plotter_endpoints_need_a_wcs() {
        let (mut state, hdu_id, viewer_id) = state_with_viewer(false);
        state.active_tool = WorkbenchTool::Plotter;
        state.hdu_states.update_one(&hdu_id, |hdu_state| {
            let sky = PlotterPoint {
                pos_type: PosType::Sky,
                primary: 10.0,
                secondary: 30.0,
            };
            hdu_state.plotting_panel_state.line_measure_start = Some(sky);
            hdu_state.plotting_panel_state.line_measure_end = Some(sky);
        });
        assert!(markers_of(&state, viewer_id).is_empty());
    }

    #[test]
    fn sonifier_region_only_in_custom_mode() {
        let (mut state, hdu_id, viewer_id) = state_with_viewer(false);
        state.active_tool = WorkbenchTool::Sonifier;
        state.apply_hdu_action(
            &hdu_id,
            HduAction::AddRegionToHistory(Region::new(10.0, 10.0, 50.0, 40.0)),
        );
        state.apply_hdu_action(
            &hdu_id,
            HduAction::SetProgressLine(Some(ProgressLine {
                x1: 20.0,
                y1: 10.0,
                x2: 20.0,
                y2: 50.0,
            })),
        );
        assert_eq!(markers_of(&state, viewer_id).len(), 1);

        state.apply_hdu_action(&hdu_id, HduAction::SetSonifierRegionMode(SonifierRegionMode::Custom));
        let markers = markers_of(&state, viewer_id);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].id, MarkerId::sonifier_region(hdu_id));
        assert_eq!(markers[1].id, MarkerId::sonifier_progress(hdu_id));
    }

    #[test]
    fn hidden_viewers_get_no_markers() {
        let (mut state, hdu_id, first) = state_with_viewer(false);
        state.active_tool = WorkbenchTool::Photometry;
        state
            .sources
            .add_sources(vec![Source::new(PosType::Pixel, 20.0, 20.0).on_hdu(hdu_id)]);
        let second = Viewer::new(vec![hdu_id]);
        let second_id = second.id;
        state.layout.create_viewer(second, None);
        state.layout.focus_viewer(&second_id).unwrap();

        assert!(markers_of(&state, first).is_empty());
        assert_eq!(markers_of(&state, second_id).len(), 1);
    }
}
