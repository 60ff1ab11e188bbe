use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::actions::{ConfigAction, SourcesAction, WorkflowAction};
use crate::sources::{PosType, Source};
use crate::store::Workbench;

use super::workbench_with;

fn epoch(seconds: i64) -> Option<DateTime<Utc>> {
    Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds))
}

fn add_and_select(workbench: &mut Workbench, sources: Vec<Source>) {
    workbench.dispatch(SourcesAction::AddSources(sources));
    let ids = workbench.state().sources.sources.ids();
    workbench.dispatch(ConfigAction::SetSelectedSources(ids));
}

#[test]
fn merging_linear_track_fits_proper_motion() {
    let (mut workbench, _) = workbench_with(Vec::new());
    let track = [0, 10, 20]
        .into_iter()
        .map(|t| Source::new(PosType::Pixel, t as f64, 2.0 * t as f64).at_epoch(epoch(t)))
        .collect();
    add_and_select(&mut workbench, track);
    let first = workbench.state().sources.sources.ids()[0];

    workbench.dispatch(WorkflowAction::MergeSelectedSources);

    let state = workbench.state();
    assert_eq!(state.merge_error, None);
    assert_eq!(state.sources.sources.ids(), vec![first]);
    assert_eq!(state.photometry_panel_config.selected_source_ids, vec![first]);
    let merged = state.sources.sources.get_by_id(&first).unwrap();
    assert!((merged.pm.unwrap() - 5.0_f64.sqrt()).abs() < 1e-9);
    // measured from +y towards +x
    assert!((merged.pm_pos_angle.unwrap() - 1.0_f64.atan2(2.0).to_degrees()).abs() < 1e-9);
}

#[test]
fn merging_duplicate_epochs_fails_without_changes() {
    let (mut workbench, _) = workbench_with(Vec::new());
    add_and_select(
        &mut workbench,
        vec![
            Source::new(PosType::Pixel, 0.0, 0.0).at_epoch(epoch(5)),
            Source::new(PosType::Pixel, 3.0, 4.0).at_epoch(epoch(5)),
        ],
    );
    let before: Vec<Source> = workbench.state().sources.sources.get_all().to_vec();

    workbench.dispatch(WorkflowAction::MergeSelectedSources);

    let state = workbench.state();
    assert!(state.merge_error.as_deref().unwrap().contains("unique"));
    assert_eq!(state.sources.sources.get_all(), before.as_slice());
    assert_eq!(state.photometry_panel_config.selected_source_ids.len(), 2);
}

#[test]
fn successful_merge_clears_previous_error() {
    let (mut workbench, _) = workbench_with(Vec::new());
    add_and_select(
        &mut workbench,
        vec![Source::new(PosType::Pixel, 0.0, 0.0).at_epoch(epoch(0))],
    );
    workbench.dispatch(WorkflowAction::MergeSelectedSources);
    assert!(workbench.state().merge_error.is_some());

    workbench.dispatch(SourcesAction::AddSources(vec![
        Source::new(PosType::Pixel, 1.0, 0.0).at_epoch(epoch(1))
    ]));
    let ids = workbench.state().sources.sources.ids();
    workbench.dispatch(ConfigAction::SetSelectedSources(ids));
    workbench.dispatch(WorkflowAction::MergeSelectedSources);
    assert_eq!(workbench.state().merge_error, None);
    assert_eq!(workbench.state().sources.sources.len(), 1);
}
