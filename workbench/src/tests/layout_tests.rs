use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data_files::HduId;
use crate::layout::{LayoutItemId, LayoutState, SplitDirection, Viewer, ViewerId, ROOT_CONTAINER_ID};

const DIRECTIONS: [SplitDirection; 4] = [
    SplitDirection::Up,
    SplitDirection::Down,
    SplitDirection::Left,
    SplitDirection::Right,
];

fn pick<T: Copy>(rng: &mut StdRng, items: &[T]) -> Option<T> {
    if items.is_empty() {
        None
    } else {
        Some(items[rng.random_range(0..items.len())])
    }
}

fn random_step(layout: &mut LayoutState, rng: &mut StdRng) {
    let viewer_ids: Vec<ViewerId> = layout.viewers.ids();
    let panel_ids: Vec<LayoutItemId> = layout.panels().map(|panel| panel.id).collect();
    let item_ids: Vec<LayoutItemId> = layout
        .items
        .ids()
        .into_iter()
        .filter(|id| *id != ROOT_CONTAINER_ID)
        .collect();

    match rng.random_range(0..6) {
        0 | 1 => {
            let panel_id = if rng.random_bool(0.5) {
                pick(rng, &panel_ids)
            } else {
                None
            };
            layout.create_viewer(Viewer::new(vec![HduId::unique()]), panel_id);
        }
        2 => {
            if let Some(viewer_id) = pick(rng, &viewer_ids) {
                layout.close_viewer(&viewer_id).unwrap();
            }
        }
        3 => {
            if let (Some(viewer_id), Some(direction)) = (pick(rng, &viewer_ids), pick(rng, &DIRECTIONS)) {
                // single-viewer panels refuse to split
                let _ = layout.split_viewer_panel(&viewer_id, direction);
            }
        }
        4 => {
            if let (Some(viewer_id), Some(target)) = (pick(rng, &viewer_ids), pick(rng, &viewer_ids)) {
                let _ = layout.move_viewer(&viewer_id, &target);
            }
        }
        _ => {
            if let Some(item_id) = pick(rng, &item_ids) {
                layout.remove_item(&item_id).unwrap();
            }
        }
    }
}

#[test]
fn random_edits_keep_the_tree_valid() {
    for seed in 0..32 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut layout = LayoutState::default();
        for step in 0..200 {
            random_step(&mut layout, &mut rng);
            if let Err(err) = layout.validate() {
                panic!("seed {seed}, step {step}: {err}");
            }
        }
    }
}

#[test]
fn every_panel_shows_one_of_its_viewers() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut layout = LayoutState::default();
    for _ in 0..300 {
        random_step(&mut layout, &mut rng);
        for panel in layout.panels() {
            let selected = panel.selected_viewer_id.unwrap();
            assert!(panel.viewer_ids.contains(&selected));
        }
        if let Some(viewer_id) = layout.focused_viewer_id() {
            assert!(layout.visible_viewer_ids().contains(&viewer_id));
        }
    }
}
