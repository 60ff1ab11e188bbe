use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::data_files::{DataFileId, HduId, Header, Histogram, Library};
use crate::hdu_state::HduAction;
use crate::jobs::{CatalogQueryJob, CorrelationId, Job, JobId, JobPurpose};
use crate::layout::{LayoutItemId, SplitDirection, Viewer, ViewerId};
use crate::marker::Marker;
use crate::panels::{
    AligningPanelConfig, CentroidSettings, CustomMarkerPanelConfig, PhotometryPanelConfig,
    PhotometrySettings, PixelOpsFormData, PlottingPanelConfig, SourceExtractionSettings,
    StackingPanelConfig, WorkbenchTool,
};
use crate::sources::{PhotData, Source, SourceId};
use crate::tools::PointerEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutAction {
    CreateViewer {
        viewer: Viewer,
        panel_id: Option<LayoutItemId>,
    },
    CloseViewer(ViewerId),
    KeepViewerOpen(ViewerId),
    SplitViewerPanel {
        viewer_id: ViewerId,
        direction: SplitDirection,
    },
    MoveViewer {
        viewer_id: ViewerId,
        target_viewer_id: ViewerId,
    },
    RemoveViewerLayoutItem(LayoutItemId),
    SetFocusedViewer(ViewerId),
    /// Shows `hdu_id` in the viewer once its header and histogram are loaded.
    SetViewerFile {
        viewer_id: ViewerId,
        hdu_id: HduId,
    },
    SetViewerMarkers {
        viewer_id: ViewerId,
        markers: Vec<Marker>,
    },
    ClearViewerMarkers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum FileListItem {
    File(DataFileId),
    Hdu(HduId),
}

#[derive(Debug, Clone)]
pub enum DataFilesAction {
    LoadLibrary,
    LoadLibrarySuccess(Library),
    LoadLibraryFail(String),
    /// Requests whatever of the header and histogram is missing.
    LoadHdu(HduId),
    LoadHduHeaderSuccess { hdu_id: HduId, header: Header },
    LoadHduHeaderFail { hdu_id: HduId, error: String },
    LoadHduHistogramSuccess { hdu_id: HduId, histogram: Histogram },
    LoadHduHistogramFail { hdu_id: HduId, error: String },
    CloseHdu(HduId),
    CloseDataFile(DataFileId),
    ClearImageDataCache(Vec<HduId>),
    SelectDataFileListItem(FileListItem),
    ImportFromSurvey {
        provider_id: String,
        path: String,
    },
    ImportAssetsCompleted {
        correlation_id: CorrelationId,
        hdu_ids: Vec<HduId>,
    },
    ImportAssetsFail {
        correlation_id: CorrelationId,
        error: String,
    },
}

#[derive(Debug, Clone)]
pub enum JobAction {
    CreateJob {
        correlation_id: CorrelationId,
        job: Job,
        purpose: JobPurpose,
    },
    /// The backend assigned an id; polling starts.
    CreateJobSuccess {
        correlation_id: CorrelationId,
        job: Job,
    },
    CreateJobFail {
        correlation_id: CorrelationId,
        error: String,
    },
    UpdateJobSuccess {
        correlation_id: CorrelationId,
        job: Job,
    },
    UpdateJobFail {
        correlation_id: CorrelationId,
        error: String,
    },
    CancelJob(CorrelationId),
}

#[derive(Debug, Clone)]
pub enum SourcesAction {
    AddSources(Vec<Source>),
    UpdateSource(Source),
    /// Also drops the ids from the photometry selection.
    RemoveSources(Vec<SourceId>),
    RemoveAllSources,
    AddPhotData(Vec<PhotData>),
    RemoveAllPhotData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigAction {
    SetActiveTool(WorkbenchTool),
    SetViewerSyncEnabled(bool),
    SetNormalizationSyncEnabled(bool),
    SetPlotterSyncEnabled(bool),
    UpdateCustomMarkerPanelConfig(CustomMarkerPanelConfig),
    UpdatePlottingPanelConfig(PlottingPanelConfig),
    UpdatePhotometryPanelConfig(PhotometryPanelConfig),
    SetSelectedSources(Vec<SourceId>),
    UpdatePixelOpsFormData(PixelOpsFormData),
    UpdateAligningPanelConfig(AligningPanelConfig),
    UpdateStackingPanelConfig(StackingPanelConfig),
    UpdatePhotometrySettings(PhotometrySettings),
    UpdateSourceExtractionSettings(SourceExtractionSettings),
    UpdateCentroidSettings(CentroidSettings),
}

/// Builds a job from the current panel state and submits it.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowAction {
    CreatePixelOpsJob,
    CreateAdvPixelOpsJob,
    CreateAlignmentJob,
    CreateStackingJob,
    ExtractSources {
        hdu_id: HduId,
    },
    PhotometerSources {
        source_ids: Vec<SourceId>,
        hdu_ids: Vec<HduId>,
        batch: bool,
    },
    ImportCatalogSources(CatalogQueryJob),
    MergeSelectedSources,
}

/// Everything that can change workbench state.
#[derive(Debug, Clone, Display)]
pub enum Action {
    Layout(LayoutAction),
    Hdu { hdu_id: HduId, action: HduAction },
    DataFiles(DataFilesAction),
    Jobs(JobAction),
    Sources(SourcesAction),
    Config(ConfigAction),
    Workflow(WorkflowAction),
    Pointer(PointerEvent),
}

impl From<LayoutAction> for Action {
    fn from(action: LayoutAction) -> Self {
        Action::Layout(action)
    }
}

impl From<DataFilesAction> for Action {
    fn from(action: DataFilesAction) -> Self {
        Action::DataFiles(action)
    }
}

impl From<JobAction> for Action {
    fn from(action: JobAction) -> Self {
        Action::Jobs(action)
    }
}

impl From<SourcesAction> for Action {
    fn from(action: SourcesAction) -> Self {
        Action::Sources(action)
    }
}

impl From<ConfigAction> for Action {
    fn from(action: ConfigAction) -> Self {
        Action::Config(action)
    }
}

impl From<WorkflowAction> for Action {
    fn from(action: WorkflowAction) -> Self {
        Action::Workflow(action)
    }
}

impl From<PointerEvent> for Action {
    fn from(event: PointerEvent) -> Self {
        Action::Pointer(event)
    }
}

/// Asynchronous request produced by a reducer, executed by the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    LoadLibrary,
    LoadHeader(HduId),
    LoadHistogram(HduId),
    ImportAssets {
        correlation_id: CorrelationId,
        provider_id: String,
        path: String,
    },
    CreateJob {
        correlation_id: CorrelationId,
        job: Job,
    },
    StartPolling {
        correlation_id: CorrelationId,
        job_id: JobId,
        interval_ms: u64,
    },
    StopPolling(CorrelationId),
    CancelJob {
        correlation_id: CorrelationId,
        job_id: JobId,
    },
}
