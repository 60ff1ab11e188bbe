use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumDiscriminants, EnumIter};

use crate::data_files::HduId;
use crate::jobs::JobId;
use crate::sources::SourceId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub status: JobStatus,
    /// Percent, 0 to 100.
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelOpsJob {
    pub file_ids: Vec<HduId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aux_file_ids: Vec<HduId>,
    pub op: String,
    pub inplace: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentJob {
    pub file_ids: Vec<HduId>,
    pub inplace: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StackingMode {
    #[default]
    Average,
    Percentile,
    Median,
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StackingScaling {
    Average,
    Median,
    Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StackingRejection {
    Chauvenet,
    Iraf,
    Minmax,
    Sigclip,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StackingSettings {
    pub mode: StackingMode,
    pub scaling: Option<StackingScaling>,
    pub rejection: Option<StackingRejection>,
    pub percentile: f64,
    pub lo: f64,
    pub hi: f64,
}

impl Default for StackingSettings {
    fn default() -> Self {
        Self {
            mode: StackingMode::Average,
            scaling: None,
            rejection: None,
            percentile: 50.0,
            lo: 0.0,
            hi: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackingJob {
    pub file_ids: Vec<HduId>,
    pub stacking_settings: StackingSettings,
}

/// Detection settings sent with an extraction job. The optional window is
/// in 1-based pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceExtractionJobSettings {
    pub threshold: f64,
    pub fwhm: f64,
    pub deblend: bool,
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceExtractionJob {
    pub file_ids: Vec<HduId>,
    pub source_extraction_settings: SourceExtractionJobSettings,
    pub merge_sources: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PhotometryAperture {
    /// Apertures scaled by the Kron radius.
    Auto { a: f64, a_in: f64, a_out: f64 },
    Aperture {
        a: f64,
        b: f64,
        a_in: f64,
        a_out: f64,
        b_out: f64,
        theta: f64,
        theta_out: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhotometryJobSettings {
    #[serde(flatten)]
    pub aperture: PhotometryAperture,
    pub gain: f64,
    pub centroid_radius: f64,
    pub zero_point: f64,
}

/// Source position as sent to the photometry backend. Sky proper motion is
/// in arcseconds per second on our side and degrees per second on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JobSource {
    pub id: SourceId,
    pub pm_epoch: Option<DateTime<Utc>>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub pm_pixel: Option<f64>,
    pub pm_pos_angle_pixel: Option<f64>,
    pub ra_hours: Option<f64>,
    pub dec_degs: Option<f64>,
    pub pm_sky: Option<f64>,
    pub pm_pos_angle_sky: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotometryJob {
    pub file_ids: Vec<HduId>,
    pub settings: PhotometryJobSettings,
    pub sources: Vec<JobSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogQueryJob {
    pub file_ids: Vec<HduId>,
    pub catalogs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumDiscriminants)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum_discriminants(name(JobType), derive(Display, EnumIter, Hash))]
pub enum JobPayload {
    PixelOps(PixelOpsJob),
    Alignment(AlignmentJob),
    Stacking(StackingJob),
    SourceExtraction(SourceExtractionJob),
    Photometry(PhotometryJob),
    CatalogQuery(CatalogQueryJob),
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        JobType::from(self)
    }

    pub fn file_ids(&self) -> &[HduId] {
        match self {
            JobPayload::PixelOps(job) => &job.file_ids,
            JobPayload::Alignment(job) => &job.file_ids,
            JobPayload::Stacking(job) => &job.file_ids,
            JobPayload::SourceExtraction(job) => &job.file_ids,
            JobPayload::Photometry(job) => &job.file_ids,
            JobPayload::CatalogQuery(job) => &job.file_ids,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSource {
    pub file_id: HduId,
    pub x: f64,
    pub y: f64,
    pub ra_hours: Option<f64>,
    pub dec_degs: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PhotometryRecord {
    pub id: SourceId,
    pub file_id: HduId,
    pub time: Option<DateTime<Utc>>,
    pub filter: Option<String>,
    pub telescope: Option<String>,
    pub exp_length: Option<f64>,
    pub ra_hours: Option<f64>,
    pub dec_degs: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub mag: Option<f64>,
    pub mag_error: Option<f64>,
    pub flux: Option<f64>,
    pub flux_error: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResultData {
    #[default]
    None,
    FileIds { file_ids: Vec<HduId> },
    Sources { data: Vec<ExtractedSource> },
    Photometry { data: Vec<PhotometryRecord> },
}

/// Outcome reported by a finished job. `errors` are computation failures
/// of an otherwise successful job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(flatten)]
    pub data: JobResultData,
}

impl JobResult {
    pub fn file_ids(&self) -> &[HduId] {
        match &self.data {
            JobResultData::FileIds { file_ids } => file_ids,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Assigned by the backend on creation.
    pub id: Option<JobId>,
    #[serde(flatten)]
    pub payload: JobPayload,
    #[serde(default)]
    pub state: JobState,
    #[serde(default)]
    pub result: Option<JobResult>,
}

impl Job {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            id: None,
            payload,
            state: JobState::default(),
            result: None,
        }
    }

    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }
}
