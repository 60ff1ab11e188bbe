use crate::actions::{Action, ConfigAction, DataFilesAction, FileListItem, LayoutAction};
use crate::data_files::HduId;
use crate::hdu_state::{HduAction, NormalizerChanges};
use crate::layout::SplitDirection;
use crate::store::{Workbench, WorkbenchState};
use crate::testing::image_hdu_at;
use crate::transform::ViewportSize;

use super::workbench_with;

fn hdu(hdu_id: HduId, action: HduAction) -> Action {
    Action::Hdu { hdu_id, action }
}

fn center_sky(state: &WorkbenchState, hdu_id: HduId) -> [f64; 2] {
    let pixel = state
        .hdu_state(&hdu_id)
        .unwrap()
        .transformation
        .viewport_center_pixel()
        .unwrap();
    let hdu = state.data_files.hdu(&hdu_id).unwrap();
    hdu.valid_wcs().unwrap().pix_to_world(pixel.to_array()).unwrap()
}

/// Two overlapping images, each in its own panel, A focused.
fn side_by_side() -> (Workbench, HduId, HduId) {
    let (mut workbench, ids) = workbench_with(vec![
        image_hdu_at("a.fits", 100.0, 100.0, [150.0, 30.0]),
        image_hdu_at("b.fits", 100.0, 100.0, [150.004, 30.002]),
    ]);
    let (a, b) = (ids[0], ids[1]);

    workbench.dispatch(DataFilesAction::SelectDataFileListItem(FileListItem::Hdu(a)));
    let viewer_a = workbench.state().focused_viewer_id().unwrap();
    workbench.dispatch(LayoutAction::KeepViewerOpen(viewer_a));
    workbench.dispatch(DataFilesAction::SelectDataFileListItem(FileListItem::Hdu(b)));
    let viewer_b = workbench.state().focused_viewer_id().unwrap();
    assert_ne!(viewer_a, viewer_b);
    workbench.dispatch(LayoutAction::SplitViewerPanel {
        viewer_id: viewer_b,
        direction: SplitDirection::Right,
    });

    let size = ViewportSize {
        width: 80.0,
        height: 60.0,
    };
    for hdu_id in [a, b] {
        workbench.dispatch_all([
            hdu(hdu_id, HduAction::SetViewportSize(size)),
            hdu(hdu_id, HduAction::ResetImageTransform),
        ]);
    }
    workbench.dispatch(LayoutAction::SetFocusedViewer(viewer_a));
    assert_eq!(workbench.state().visible_viewer_hdus().len(), 2);
    (workbench, a, b)
}

#[test]
fn panning_the_focused_image_keeps_the_same_sky_in_view() {
    let (mut workbench, a, b) = side_by_side();
    workbench.dispatch(ConfigAction::SetViewerSyncEnabled(true));
    workbench.dispatch(hdu(a, HduAction::MoveBy { dx: 10.0, dy: 0.0 }));

    let sky_a = center_sky(workbench.state(), a);
    let sky_b = center_sky(workbench.state(), b);
    assert!((sky_a[0] - sky_b[0]).abs() * 15.0 * 3600.0 < 1e-3);
    assert!((sky_a[1] - sky_b[1]).abs() * 3600.0 < 1e-3);

    workbench.dispatch(hdu(a, HduAction::ZoomBy {
        factor: 2.0,
        anchor: None,
    }));
    let sky_a = center_sky(workbench.state(), a);
    let sky_b = center_sky(workbench.state(), b);
    assert!((sky_a[0] - sky_b[0]).abs() * 15.0 * 3600.0 < 1e-3);
    assert!((sky_a[1] - sky_b[1]).abs() * 3600.0 < 1e-3);
}

#[test]
fn disabled_sync_leaves_other_viewers_alone() {
    let (mut workbench, a, b) = side_by_side();
    let before = workbench.state().hdu_state(&b).unwrap().transformation;
    workbench.dispatch(hdu(a, HduAction::MoveBy { dx: 10.0, dy: 0.0 }));
    assert_eq!(workbench.state().hdu_state(&b).unwrap().transformation, before);
}

#[test]
fn normalization_follows_the_focused_image() {
    let (mut workbench, a, b) = side_by_side();
    workbench.dispatch(ConfigAction::SetNormalizationSyncEnabled(true));
    workbench.dispatch(hdu(
        a,
        HduAction::UpdateNormalizer(NormalizerChanges {
            peak_percentile: Some(98.5),
            ..Default::default()
        }),
    ));
    let normalizer = workbench.state().hdu_state(&b).unwrap().normalization.normalizer;
    assert_eq!(normalizer.peak_percentile, 98.5);
}
