//! Pushes the focused HDU's view state onto the other visible HDUs.
//!
//! Each pipeline remembers what it last pushed (reference HDU, reference
//! value, target set) and only runs again when one of those changes. It
//! always reads the current state, so a burst of changes collapses into one
//! push of the latest values.

use glam::DVec2;
use tracing::debug;

use crate::data_files::HduId;
use crate::hdu_state::{PixelNormalizer, PlottingPanelState};
use crate::store::WorkbenchState;
use crate::transform::Transformation;
use crate::wcs::{has_overlap, relative_pixel_transform};

#[derive(Debug, Clone, PartialEq)]
struct Pushed<T> {
    reference: HduId,
    value: T,
    targets: Vec<HduId>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncMemo {
    transformation: Option<Pushed<Transformation>>,
    normalization: Option<Pushed<PixelNormalizer>>,
    plotter: Option<Pushed<PlottingPanelState>>,
}

/// Runs every enabled pipeline against the current focus.
pub fn run(state: &mut WorkbenchState, memo: &mut SyncMemo) {
    let Some(reference) = state.focused_hdu_id().filter(|id| is_syncable(state, id)) else {
        return;
    };
    let targets = sync_targets(state, reference);
    let Some(reference_state) = state.hdu_state(&reference) else {
        return;
    };
    let transformation = reference_state.transformation;
    let normalizer = reference_state.normalization.normalizer;
    let plotting = reference_state.plotting_panel_state;

    if state.viewer_sync_enabled {
        let pushed = Pushed {
            reference,
            value: transformation,
            targets: targets.clone(),
        };
        if memo.transformation.as_ref() != Some(&pushed) {
            for target in &targets {
                sync_transformation(state, reference, *target);
            }
            memo.transformation = Some(pushed);
        }
    } else {
        memo.transformation = None;
    }

    if state.normalization_sync_enabled {
        let pushed = Pushed {
            reference,
            value: normalizer,
            targets: targets.clone(),
        };
        if memo.normalization.as_ref() != Some(&pushed) {
            for target in &targets {
                sync_normalization(state, reference, *target);
            }
            memo.normalization = Some(pushed);
        }
    } else {
        memo.normalization = None;
    }

    if state.plotting_panel_config.plotter_sync_enabled {
        let pushed = Pushed {
            reference,
            value: plotting,
            targets: targets.clone(),
        };
        if memo.plotter.as_ref() != Some(&pushed) {
            for target in &targets {
                sync_plotting(state, reference, *target);
            }
            memo.plotter = Some(pushed);
        }
    } else {
        memo.plotter = None;
    }
}

/// Applies every enabled pipeline from `reference` to `target` right away.
pub fn sync_pair(state: &mut WorkbenchState, reference: HduId, target: HduId) {
    if reference == target || !is_syncable(state, &reference) || !is_syncable(state, &target) {
        return;
    }
    if state.viewer_sync_enabled {
        sync_transformation(state, reference, target);
    }
    if state.normalization_sync_enabled {
        sync_normalization(state, reference, target);
    }
    if state.plotting_panel_config.plotter_sync_enabled {
        sync_plotting(state, reference, target);
    }
}

fn is_syncable(state: &WorkbenchState, hdu_id: &HduId) -> bool {
    state
        .data_files
        .hdu(hdu_id)
        .is_some_and(|hdu| hdu.is_image() && hdu.is_ready())
        && state.hdu_state(hdu_id).is_some()
}

/// Ready image HDUs shown by a visible viewer, other than `reference`.
fn sync_targets(state: &WorkbenchState, reference: HduId) -> Vec<HduId> {
    let mut targets: Vec<HduId> = Vec::new();
    for (_, hdu_id) in state.visible_viewer_hdus() {
        if hdu_id != reference && !targets.contains(&hdu_id) && is_syncable(state, &hdu_id) {
            targets.push(hdu_id);
        }
    }
    targets
}

/// Gives `target` the view of `reference`. With a valid WCS on both sides the
/// target is re-projected so it shows the same sky; without one the
/// transforms are copied as they are. Images that do not overlap on the sky
/// are left alone.
pub fn sync_transformation(state: &mut WorkbenchState, reference: HduId, target: HduId) -> bool {
    let (Some(reference_hdu), Some(target_hdu)) =
        (state.data_files.hdu(&reference), state.data_files.hdu(&target))
    else {
        return false;
    };
    let Some(source) = state.hdu_state(&reference).map(|hdu_state| hdu_state.transformation) else {
        return false;
    };

    let image_transform = match (reference_hdu.valid_wcs(), target_hdu.valid_wcs()) {
        (Some(reference_wcs), Some(target_wcs)) => {
            let (Some(reference_size), Some(target_size)) =
                (reference_hdu.image_size(), target_hdu.image_size())
            else {
                return false;
            };
            if !has_overlap(reference_wcs, reference_size, target_wcs, target_size) {
                debug!(%reference, %target, "Skipping transform sync, images do not overlap");
                return false;
            }
            let anchor = source
                .viewport_center_pixel()
                .unwrap_or(DVec2::new(reference_size.0 / 2.0, reference_size.1 / 2.0));
            let Some(to_reference) = relative_pixel_transform(reference_wcs, target_wcs, anchor)
                .and_then(|relative| relative.invert())
            else {
                debug!(%reference, %target, "Skipping transform sync, degenerate WCS mapping");
                return false;
            };
            source.image_transform.compose(&to_reference)
        }
        _ => source.image_transform,
    };

    state.hdu_states.update_one(&target, |hdu_state| {
        let transformation = &mut hdu_state.transformation;
        transformation.image_transform = image_transform;
        transformation.viewport_transform = source.viewport_transform;
        transformation.initialized = true;
    })
}

pub fn sync_normalization(state: &mut WorkbenchState, reference: HduId, target: HduId) -> bool {
    let Some(normalizer) = state
        .hdu_state(&reference)
        .map(|hdu_state| hdu_state.normalization.normalizer)
    else {
        return false;
    };
    state.hdu_states.update_one(&target, |hdu_state| {
        hdu_state.normalization.normalizer = normalizer;
        hdu_state.normalization.initialized = true;
    })
}

pub fn sync_plotting(state: &mut WorkbenchState, reference: HduId, target: HduId) -> bool {
    let Some(plotting) = state
        .hdu_state(&reference)
        .map(|hdu_state| hdu_state.plotting_panel_state)
    else {
        return false;
    };
    state
        .hdu_states
        .update_one(&target, |hdu_state| hdu_state.plotting_panel_state = plotting)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkbenchConfig;
    use crate::testing::{image_hdu, image_hdu_at, library_of};
    use crate::transform::{Transform, ViewportSize};

    fn two_images() -> (WorkbenchState, HduId, HduId) {
        let config = WorkbenchConfig::default();
        let mut state = WorkbenchState::new(&config);
        let a = image_hdu("a.fits", 100.0, 100.0, false);
        let b = image_hdu("b.fits", 100.0, 100.0, false);
        let (a_id, b_id) = (a.id, b.id);
        state.load_library(library_of(vec![a, b]));
        (state, a_id, b_id)
    }

    #[test]
    fn transforms_are_copied_without_wcs() {
        let (mut state, a, b) = two_images();
        let moved = Transform::from_translation(12.0, -3.0);
        state
            .hdu_states
            .update_one(&a, |hdu_state| hdu_state.transformation.viewport_transform = moved);

        assert!(sync_transformation(&mut state, a, b));
        let target = state.hdu_state(&b).unwrap().transformation;
        assert_eq!(target.viewport_transform, moved);
        assert!(target.initialized);
    }

    #[test]
    fn far_apart_images_are_not_synced() {
        let config = WorkbenchConfig::default();
        let mut state = WorkbenchState::new(&config);
        let a = image_hdu_at("a.fits", 100.0, 100.0, [150.0, 0.0]);
        let b = image_hdu_at("b.fits", 100.0, 100.0, [10.0, 45.0]);
        let (a_id, b_id) = (a.id, b.id);
        state.load_library(library_of(vec![a, b]));

        state.hdu_states.update_one(&a_id, |hdu_state| {
            hdu_state.transformation.viewport_transform = Transform::from_translation(5.0, 5.0)
        });
        assert!(!sync_transformation(&mut state, a_id, b_id));
        assert_eq!(
            state.hdu_state(&b_id).unwrap().transformation.viewport_transform,
            Transform::IDENTITY
        );
    }

    #[test]
    fn wcs_sync_shows_the_same_sky_at_the_centre() {
        let config = WorkbenchConfig::default();
        let mut state = WorkbenchState::new(&config);
        let a_hdu = image_hdu_at("a.fits", 100.0, 100.0, [150.0, 30.0]);
        let b_hdu = image_hdu_at("b.fits", 100.0, 100.0, [150.005, 30.003]);
        let (a, b) = (a_hdu.id, b_hdu.id);
        state.load_library(library_of(vec![a_hdu, b_hdu]));
        let size = ViewportSize {
            width: 80.0,
            height: 60.0,
        };
        for hdu_id in [a, b] {
            state.hdu_states.update_one(&hdu_id, |hdu_state| {
                hdu_state.transformation.viewport_size = Some(size);
                hdu_state.transformation.reset(Some((100.0, 100.0)));
            });
        }
        state
            .hdu_states
            .update_one(&a, |hdu_state| hdu_state.transformation.move_by(7.0, 4.0));

        assert!(sync_transformation(&mut state, a, b));

        let center_sky = |hdu_id: HduId| {
            let pixel = state.hdu_state(&hdu_id).unwrap().transformation.viewport_center_pixel().unwrap();
            let hdu = state.data_files.hdu(&hdu_id).unwrap();
            hdu.valid_wcs().unwrap().pix_to_world(pixel.to_array()).unwrap()
        };
        let (sky_a, sky_b) = (center_sky(a), center_sky(b));
        assert!((sky_a[0] - sky_b[0]).abs() * 15.0 * 3600.0 < 1e-3);
        assert!((sky_a[1] - sky_b[1]).abs() * 3600.0 < 1e-3);
    }

    #[test]
    fn normalization_and_plotter_are_copied() {
        let (mut state, a, b) = two_images();
        state.hdu_states.update_one(&a, |hdu_state| {
            hdu_state.normalization.normalizer.peak_percentile = 97.0;
            hdu_state.plotting_panel_state.measuring = true;
        });

        assert!(sync_normalization(&mut state, a, b));
        assert!(sync_plotting(&mut state, a, b));
        let target = state.hdu_state(&b).unwrap();
        assert_eq!(target.normalization.normalizer.peak_percentile, 97.0);
        assert!(target.normalization.initialized);
        assert!(target.plotting_panel_state.measuring);
    }
}
