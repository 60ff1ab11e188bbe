//! Workbench state and the single-threaded reducer that owns it.
//!
//! Every change goes through [`Workbench::dispatch`]. Actions are reduced in
//! FIFO order, follow-up actions queued by a reducer run before `dispatch`
//! returns, and derived state (sync, markers, HDU loads) is refreshed once
//! the queue is empty. Work that has to leave the process is recorded as
//! [`Effect`]s for the runtime to pick up.

use std::collections::VecDeque;
use std::sync::Arc;

use common::EntityCollection;
use hashbrown::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

use crate::actions::{
    Action, ConfigAction, DataFilesAction, Effect, FileListItem, LayoutAction, SourcesAction,
};
use crate::config::WorkbenchConfig;
use crate::data_files::{DataFilesState, Hdu, HduId, Library, LibraryDiff};
use crate::derive;
use crate::error::LayoutError;
use crate::hdu_state::{HduAction, HduContext, HduState, PixelNormalizer};
use crate::jobs::{CorrelationId, JobsState};
use crate::layout::{LayoutState, Viewer, ViewerId};
use crate::marker::Marker;
use crate::panels::{
    AligningPanelConfig, CustomMarkerPanelConfig, PhotometryPanelConfig, PixelOpsPanelConfig,
    PlottingPanelConfig, StackingPanelConfig, WorkbenchSettings, WorkbenchTool,
};
use crate::sources::SourcesState;
use crate::sync::{self, SyncMemo};
use crate::tools::{pointer_actions, Centroider, NoCentroid};
use crate::transform::Region;

/// Everything the workbench knows. Cloned into snapshots for readers.
#[derive(Debug, Clone)]
pub struct WorkbenchState {
    pub data_files: DataFilesState,
    pub hdu_states: EntityCollection<HduId, HduState>,
    pub layout: LayoutState,
    pub sources: SourcesState,
    pub jobs: JobsState,

    pub active_tool: WorkbenchTool,
    pub viewer_sync_enabled: bool,
    pub normalization_sync_enabled: bool,

    pub custom_marker_panel_config: CustomMarkerPanelConfig,
    pub plotting_panel_config: PlottingPanelConfig,
    pub photometry_panel_config: PhotometryPanelConfig,
    pub pixel_ops_panel_config: PixelOpsPanelConfig,
    pub aligning_panel_config: AligningPanelConfig,
    pub stacking_panel_config: StackingPanelConfig,
    pub settings: WorkbenchSettings,

    pub merge_error: Option<String>,
    pub extraction_error: Option<String>,
    pub dss_import_loading: bool,

    default_normalizer: PixelNormalizer,
}

impl WorkbenchState {
    pub fn new(config: &WorkbenchConfig) -> Self {
        Self {
            data_files: DataFilesState::default(),
            hdu_states: EntityCollection::default(),
            layout: LayoutState::default(),
            sources: SourcesState::default(),
            jobs: JobsState::default(),
            active_tool: WorkbenchTool::default(),
            viewer_sync_enabled: false,
            normalization_sync_enabled: false,
            custom_marker_panel_config: CustomMarkerPanelConfig::default(),
            plotting_panel_config: PlottingPanelConfig::default(),
            photometry_panel_config: PhotometryPanelConfig::default(),
            pixel_ops_panel_config: PixelOpsPanelConfig::default(),
            aligning_panel_config: AligningPanelConfig::default(),
            stacking_panel_config: StackingPanelConfig::default(),
            settings: WorkbenchSettings::default(),
            merge_error: None,
            extraction_error: None,
            dss_import_loading: false,
            default_normalizer: PixelNormalizer::with_percentiles(
                config.lower_percentile_default,
                config.upper_percentile_default,
            ),
        }
    }

    pub fn hdu_state(&self, hdu_id: &HduId) -> Option<&HduState> {
        self.hdu_states.get_by_id(hdu_id)
    }

    pub fn focused_viewer_id(&self) -> Option<ViewerId> {
        self.layout.focused_viewer_id()
    }

    pub fn focused_hdu_id(&self) -> Option<HduId> {
        self.layout.focused_viewer()?.hdu_id()
    }

    pub fn focused_hdu(&self) -> Option<&Hdu> {
        self.data_files.hdu(&self.focused_hdu_id()?)
    }

    /// Visible viewers paired with the HDU each one shows.
    pub fn visible_viewer_hdus(&self) -> Vec<(ViewerId, HduId)> {
        self.layout
            .visible_viewer_ids()
            .into_iter()
            .filter_map(|viewer_id| Some((viewer_id, self.layout.viewer(&viewer_id)?.hdu_id()?)))
            .collect()
    }

    pub fn viewer_markers(&self, viewer_id: &ViewerId) -> &[Marker] {
        self.layout
            .viewer(viewer_id)
            .map(|viewer| viewer.markers.as_slice())
            .unwrap_or_default()
    }

    /// Replaces the library and keeps one [`HduState`] per HDU in it.
    pub fn load_library(&mut self, library: Library) -> LibraryDiff {
        let diff = self.data_files.load_library_success(library);
        self.hdu_states.remove_many(&diff.removed);

        let added: Vec<HduState> = diff
            .added
            .iter()
            .filter_map(|hdu_id| self.data_files.hdu(hdu_id))
            .map(|hdu| HduState::new(hdu.id, hdu.hdu_type, self.default_normalizer))
            .collect();
        self.hdu_states.add_many(added);
        diff
    }

    pub fn apply_hdu_action(&mut self, hdu_id: &HduId, action: HduAction) -> bool {
        let Some(hdu) = self.data_files.hdu(hdu_id) else {
            return false;
        };
        let ctx = HduContext {
            image_size: hdu.image_size(),
            histogram: hdu.histogram.as_ref(),
        };
        match self.hdu_states.get_by_id_mut(hdu_id) {
            Some(hdu_state) => hdu_state.apply(action, ctx),
            None => false,
        }
    }
}

/// A viewer waiting for its HDU to become ready.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PendingLoad {
    pub hdu_id: HduId,
    /// HDU focused before the switch, synced onto the new one once loaded.
    pub reference: Option<HduId>,
}

#[derive(Debug)]
pub struct Workbench {
    pub(crate) state: WorkbenchState,
    pub(crate) config: WorkbenchConfig,
    pub(crate) centroider: Arc<dyn Centroider>,
    pub(crate) queue: VecDeque<Action>,
    pub(crate) effects: Vec<Effect>,
    pub(crate) pending_loads: HashMap<ViewerId, PendingLoad>,
    pub(crate) failed_loads: HashSet<HduId>,
    pub(crate) pending_selection: Option<HduId>,
    pub(crate) sync_memo: SyncMemo,
}

impl Workbench {
    pub fn new(config: WorkbenchConfig) -> Self {
        Self::with_centroider(config, Arc::new(NoCentroid))
    }

    pub fn with_centroider(config: WorkbenchConfig, centroider: Arc<dyn Centroider>) -> Self {
        Self {
            state: WorkbenchState::new(&config),
            config,
            centroider,
            queue: VecDeque::new(),
            effects: Vec::new(),
            pending_loads: HashMap::new(),
            failed_loads: HashSet::new(),
            pending_selection: None,
            sync_memo: SyncMemo::default(),
        }
    }

    pub fn state(&self) -> &WorkbenchState {
        &self.state
    }

    pub fn config(&self) -> &WorkbenchConfig {
        &self.config
    }

    pub fn dispatch(&mut self, action: impl Into<Action>) {
        self.queue.push_back(action.into());
        self.process();
    }

    pub fn dispatch_all(&mut self, actions: impl IntoIterator<Item = Action>) {
        self.queue.extend(actions);
        self.process();
    }

    /// Effects produced since the last call, in the order they were emitted.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    fn process(&mut self) {
        while let Some(action) = self.queue.pop_front() {
            debug!(%action, "Reducing");
            self.reduce(action);
        }
        self.refresh_derived();
    }

    fn reduce(&mut self, action: Action) {
        match action {
            Action::Layout(action) => self.reduce_layout(action),
            Action::Hdu { hdu_id, action } => {
                if !self.state.apply_hdu_action(&hdu_id, action) {
                    debug!(%hdu_id, "HDU action had no effect");
                }
            }
            Action::DataFiles(action) => self.reduce_data_files(action),
            Action::Jobs(action) => self.reduce_jobs(action),
            Action::Sources(action) => self.reduce_sources(action),
            Action::Config(action) => self.reduce_config(action),
            Action::Workflow(action) => self.reduce_workflow(action),
            Action::Pointer(event) => {
                let actions = pointer_actions(&self.state, &self.config, self.centroider.as_ref(), &event);
                self.queue.extend(actions);
            }
        }
    }

    /// Loads what visible viewers need, runs the sync pipelines and rebuilds
    /// viewer markers.
    fn refresh_derived(&mut self) {
        for (_, hdu_id) in self.state.visible_viewer_hdus() {
            self.request_hdu_load(hdu_id);
        }
        sync::run(&mut self.state, &mut self.sync_memo);
        for (viewer_id, markers) in derive::viewer_markers(&self.state, &self.config) {
            self.state.layout.set_viewer_markers(&viewer_id, markers);
        }
    }

    fn reduce_layout(&mut self, action: LayoutAction) {
        let result = match action {
            LayoutAction::CreateViewer { viewer, panel_id } => {
                let viewer_id = viewer.id;
                let hdu_id = viewer.hdu_id();
                self.state.layout.create_viewer(viewer, panel_id);
                match hdu_id {
                    Some(hdu_id) => self.set_viewer_file(viewer_id, hdu_id),
                    None => self.focus_viewer(viewer_id),
                }
            }
            LayoutAction::CloseViewer(viewer_id) => {
                self.pending_loads.remove(&viewer_id);
                self.state.layout.close_viewer(&viewer_id).map(|_| ())
            }
            LayoutAction::KeepViewerOpen(viewer_id) => self.state.layout.keep_viewer_open(&viewer_id),
            LayoutAction::SplitViewerPanel {
                viewer_id,
                direction,
            } => self
                .state
                .layout
                .split_viewer_panel(&viewer_id, direction)
                .map(|_| ()),
            LayoutAction::MoveViewer {
                viewer_id,
                target_viewer_id,
            } => self.state.layout.move_viewer(&viewer_id, &target_viewer_id),
            LayoutAction::RemoveViewerLayoutItem(item_id) => {
                self.state.layout.remove_item(&item_id).map(|closed| {
                    for viewer in closed {
                        self.pending_loads.remove(&viewer.id);
                    }
                })
            }
            LayoutAction::SetFocusedViewer(viewer_id) => self.focus_viewer(viewer_id),
            LayoutAction::SetViewerFile { viewer_id, hdu_id } => self.set_viewer_file(viewer_id, hdu_id),
            LayoutAction::SetViewerMarkers { viewer_id, markers } => {
                self.state.layout.set_viewer_markers(&viewer_id, markers);
                Ok(())
            }
            LayoutAction::ClearViewerMarkers => {
                self.state.layout.clear_viewer_markers();
                Ok(())
            }
        };

        if let Err(err) = result {
            debug!(%err, "Layout action rejected");
        }
    }

    /// Focuses the viewer. The HDU focused before is synced onto the newly
    /// focused one first.
    fn focus_viewer(&mut self, viewer_id: ViewerId) -> Result<(), LayoutError> {
        let next = self
            .state
            .layout
            .viewer(&viewer_id)
            .ok_or(LayoutError::UnknownViewer(viewer_id))?
            .hdu_id();
        if let (Some(previous), Some(next)) = (self.state.focused_hdu_id(), next) {
            sync::sync_pair(&mut self.state, previous, next);
        }
        self.state.layout.focus_viewer(&viewer_id)?;
        Ok(())
    }

    fn set_viewer_file(&mut self, viewer_id: ViewerId, hdu_id: HduId) -> Result<(), LayoutError> {
        if self.state.data_files.hdu(&hdu_id).is_none() {
            debug!(%viewer_id, %hdu_id, "Viewer asked to show an unknown HDU");
            return Ok(());
        }

        let reference = self.state.focused_hdu_id().filter(|id| *id != hdu_id);
        self.state.layout.set_viewer_hdus(&viewer_id, vec![hdu_id])?;
        self.state.layout.focus_viewer(&viewer_id)?;
        self.pending_loads.insert(viewer_id, PendingLoad { hdu_id, reference });

        if self.state.data_files.hdu(&hdu_id).is_some_and(Hdu::is_ready) {
            self.complete_viewer_load(viewer_id);
        } else {
            self.request_hdu_load(hdu_id);
        }
        Ok(())
    }

    fn complete_viewer_load(&mut self, viewer_id: ViewerId) {
        let Some(load) = self.pending_loads.remove(&viewer_id) else {
            return;
        };
        let showing = self.state.layout.viewer(&viewer_id).and_then(Viewer::hdu_id);
        if showing != Some(load.hdu_id) {
            debug!(%viewer_id, hdu_id = %load.hdu_id, "Dropping stale viewer load");
            return;
        }
        self.on_hdu_ready(load.hdu_id, load.reference);
    }

    /// First-display initialisation of an image HDU, then sync from the
    /// previously focused HDU.
    fn on_hdu_ready(&mut self, hdu_id: HduId, reference: Option<HduId>) {
        let Some((width, height)) = self
            .state
            .data_files
            .hdu(&hdu_id)
            .filter(|hdu| hdu.is_image())
            .and_then(Hdu::image_size)
        else {
            return;
        };
        let Some(hdu_state) = self.state.hdu_state(&hdu_id) else {
            return;
        };

        let mut actions = Vec::new();
        if !hdu_state.normalization.initialized {
            actions.push(HduAction::RenormalizeImageHdu);
        }
        if !hdu_state.sonification_panel_state.region_history_initialized {
            actions.push(HduAction::AddRegionToHistory(Region::new(0.5, 0.5, width, height)));
        }
        if !hdu_state.transformation.initialized {
            actions.push(HduAction::ResetImageTransform);
        }
        for action in actions {
            self.state.apply_hdu_action(&hdu_id, action);
        }

        if let Some(reference) = reference {
            sync::sync_pair(&mut self.state, reference, hdu_id);
        }
    }

    /// Requests the missing header and histogram of an HDU. HDUs whose load
    /// failed are skipped until their cache is cleared.
    pub(crate) fn request_hdu_load(&mut self, hdu_id: HduId) {
        if self.failed_loads.contains(&hdu_id) {
            return;
        }
        let Some(hdu) = self.state.data_files.hdu(&hdu_id) else {
            return;
        };
        let need_header = !hdu.header_loaded() && !hdu.header_loading;
        let need_histogram = hdu.is_image() && !hdu.hist_loaded() && !hdu.hist_loading;

        if need_header {
            self.state.data_files.load_header_start(&hdu_id);
            self.effects.push(Effect::LoadHeader(hdu_id));
        }
        if need_histogram {
            self.state.data_files.load_histogram_start(&hdu_id);
            self.effects.push(Effect::LoadHistogram(hdu_id));
        }
    }

    fn hdu_data_arrived(&mut self, hdu_id: HduId) {
        if !self.state.data_files.hdu(&hdu_id).is_some_and(Hdu::is_ready) {
            return;
        }
        let waiting: Vec<ViewerId> = self
            .pending_loads
            .iter()
            .filter(|(_, load)| load.hdu_id == hdu_id)
            .map(|(viewer_id, _)| *viewer_id)
            .collect();
        for viewer_id in waiting {
            self.complete_viewer_load(viewer_id);
        }
    }

    fn reduce_data_files(&mut self, action: DataFilesAction) {
        match action {
            DataFilesAction::LoadLibrary => {
                self.state.data_files.library_loading = true;
                self.effects.push(Effect::LoadLibrary);
            }
            DataFilesAction::LoadLibrarySuccess(library) => {
                let diff = self.state.load_library(library);
                info!(
                    added = diff.added.len(),
                    removed = diff.removed.len(),
                    "Library loaded"
                );
                self.forget_hdus(&diff.removed);

                if let Some(hdu_id) = self.pending_selection {
                    if self.state.data_files.hdu(&hdu_id).is_some() {
                        self.pending_selection = None;
                        self.select_hdu(hdu_id);
                    }
                }
            }
            DataFilesAction::LoadLibraryFail(error) => {
                self.state.data_files.library_loading = false;
                error!(%error, "Failed to load library");
            }
            DataFilesAction::LoadHdu(hdu_id) => self.request_hdu_load(hdu_id),
            DataFilesAction::LoadHduHeaderSuccess { hdu_id, header } => {
                self.state.data_files.load_header_success(&hdu_id, header);
                self.hdu_data_arrived(hdu_id);
            }
            DataFilesAction::LoadHduHeaderFail { hdu_id, error } => {
                self.state.data_files.load_header_fail(&hdu_id);
                self.failed_loads.insert(hdu_id);
                warn!(%hdu_id, %error, "Failed to load HDU header");
            }
            DataFilesAction::LoadHduHistogramSuccess { hdu_id, histogram } => {
                self.state.data_files.load_histogram_success(&hdu_id, histogram);
                self.hdu_data_arrived(hdu_id);
            }
            DataFilesAction::LoadHduHistogramFail { hdu_id, error } => {
                self.state.data_files.load_histogram_fail(&hdu_id);
                self.failed_loads.insert(hdu_id);
                warn!(%hdu_id, %error, "Failed to load HDU histogram");
            }
            DataFilesAction::CloseHdu(hdu_id) => {
                if self.state.data_files.close_hdu(&hdu_id).is_some() {
                    self.forget_hdus(&[hdu_id]);
                }
            }
            DataFilesAction::CloseDataFile(file_id) => {
                let removed = self.state.data_files.close_file(&file_id);
                self.forget_hdus(&removed);
            }
            DataFilesAction::ClearImageDataCache(hdu_ids) => {
                self.state.data_files.clear_image_data_cache(&hdu_ids);
                for hdu_id in &hdu_ids {
                    self.failed_loads.remove(hdu_id);
                }
            }
            DataFilesAction::SelectDataFileListItem(item) => {
                let hdu_id = match item {
                    FileListItem::File(file_id) => self
                        .state
                        .data_files
                        .files
                        .get_by_id(&file_id)
                        .and_then(|file| file.hdu_ids.first().copied()),
                    FileListItem::Hdu(hdu_id) => Some(hdu_id),
                };
                match hdu_id {
                    Some(hdu_id) => self.select_hdu(hdu_id),
                    None => debug!(?item, "Selected file list item has no HDU"),
                }
            }
            DataFilesAction::ImportFromSurvey { provider_id, path } => {
                self.state.dss_import_loading = true;
                self.effects.push(Effect::ImportAssets {
                    correlation_id: CorrelationId::unique(),
                    provider_id,
                    path,
                });
            }
            DataFilesAction::ImportAssetsCompleted {
                correlation_id,
                hdu_ids,
            } => {
                self.state.dss_import_loading = false;
                info!(%correlation_id, count = hdu_ids.len(), "Survey import completed");
                self.pending_selection = hdu_ids.first().copied();
                self.queue.push_back(DataFilesAction::LoadLibrary.into());
            }
            DataFilesAction::ImportAssetsFail {
                correlation_id,
                error,
            } => {
                self.state.dss_import_loading = false;
                error!(%correlation_id, %error, "Survey import failed");
            }
        }
    }

    /// Shows the HDU: focuses a viewer already showing it, else reuses a
    /// preview viewer, else opens a new viewer in the focused panel.
    fn select_hdu(&mut self, hdu_id: HduId) {
        if self.state.data_files.hdu(&hdu_id).is_none() {
            debug!(%hdu_id, "Ignoring selection of an unknown HDU");
            return;
        }
        let viewers = &self.state.layout.viewers;
        let showing = viewers
            .iter()
            .find(|viewer| viewer.hdu_ids == [hdu_id])
            .map(|viewer| viewer.id);
        let preview = viewers.iter().find(|viewer| !viewer.keep_open).map(|viewer| viewer.id);

        match (showing, preview) {
            (Some(viewer_id), _) => self.reduce_layout(LayoutAction::SetFocusedViewer(viewer_id)),
            (None, Some(viewer_id)) => {
                self.reduce_layout(LayoutAction::SetViewerFile { viewer_id, hdu_id })
            }
            (None, None) => self.reduce_layout(LayoutAction::CreateViewer {
                viewer: Viewer::new(vec![hdu_id]),
                panel_id: self.state.layout.focused_panel_id,
            }),
        }
    }

    /// Drops everything that refers to HDUs no longer in the library.
    fn forget_hdus(&mut self, hdu_ids: &[HduId]) {
        if hdu_ids.is_empty() {
            return;
        }
        self.state.hdu_states.remove_many(hdu_ids);
        for hdu_id in hdu_ids {
            self.failed_loads.remove(hdu_id);
        }

        let viewer_ids: Vec<ViewerId> = self
            .state
            .layout
            .viewers
            .iter()
            .filter(|viewer| viewer.hdu_id().is_some_and(|id| hdu_ids.contains(&id)))
            .map(|viewer| viewer.id)
            .collect();
        for viewer_id in viewer_ids {
            self.pending_loads.remove(&viewer_id);
            if let Err(err) = self.state.layout.close_viewer(&viewer_id) {
                debug!(%viewer_id, %err, "Failed to close viewer of a removed HDU");
            }
        }

        let keep = |id: &HduId| !hdu_ids.contains(id);
        let state = &mut self.state;
        state.aligning_panel_config.selected_hdu_ids.retain(keep);
        state.stacking_panel_config.selected_hdu_ids.retain(keep);
        state.photometry_panel_config.batch_hdu_ids.retain(keep);
        let form = &mut state.pixel_ops_panel_config.form;
        form.hdu_ids.retain(keep);
        form.aux_hdu_ids.retain(keep);
        form.aux_hdu_id = form.aux_hdu_id.filter(keep);
    }

    fn reduce_sources(&mut self, action: SourcesAction) {
        let sources = &mut self.state.sources;
        let selection = &mut self.state.photometry_panel_config.selected_source_ids;
        match action {
            SourcesAction::AddSources(new_sources) => {
                sources.add_sources(new_sources);
            }
            SourcesAction::UpdateSource(source) => {
                let source_id = source.id;
                if !sources.update_source(&source_id, |existing| *existing = source) {
                    debug!(%source_id, "Ignoring update of an unknown source");
                }
            }
            SourcesAction::RemoveSources(source_ids) => {
                sources.remove_sources(&source_ids);
                selection.retain(|id| !source_ids.contains(id));
            }
            SourcesAction::RemoveAllSources => {
                sources.remove_all();
                selection.clear();
            }
            SourcesAction::AddPhotData(data) => sources.add_phot_data(data),
            SourcesAction::RemoveAllPhotData => sources.phot_data.remove_all(),
        }
    }

    fn reduce_config(&mut self, action: ConfigAction) {
        let state = &mut self.state;
        match action {
            ConfigAction::SetActiveTool(tool) => state.active_tool = tool,
            ConfigAction::SetViewerSyncEnabled(enabled) => state.viewer_sync_enabled = enabled,
            ConfigAction::SetNormalizationSyncEnabled(enabled) => {
                state.normalization_sync_enabled = enabled
            }
            ConfigAction::SetPlotterSyncEnabled(enabled) => {
                state.plotting_panel_config.plotter_sync_enabled = enabled
            }
            ConfigAction::UpdateCustomMarkerPanelConfig(config) => {
                state.custom_marker_panel_config = config
            }
            ConfigAction::UpdatePlottingPanelConfig(config) => state.plotting_panel_config = config,
            ConfigAction::UpdatePhotometryPanelConfig(config) => {
                state.photometry_panel_config = config
            }
            ConfigAction::SetSelectedSources(source_ids) => {
                let known = &state.sources.sources;
                state.photometry_panel_config.selected_source_ids =
                    source_ids.into_iter().filter(|id| known.contains(id)).collect();
            }
            ConfigAction::UpdatePixelOpsFormData(form) => state.pixel_ops_panel_config.form = form,
            ConfigAction::UpdateAligningPanelConfig(config) => state.aligning_panel_config = config,
            ConfigAction::UpdateStackingPanelConfig(config) => state.stacking_panel_config = config,
            ConfigAction::UpdatePhotometrySettings(settings) => state.settings.photometry = settings,
            ConfigAction::UpdateSourceExtractionSettings(settings) => {
                state.settings.source_extraction = settings
            }
            ConfigAction::UpdateCentroidSettings(settings) => state.settings.centroid = settings,
        }
    }
}
