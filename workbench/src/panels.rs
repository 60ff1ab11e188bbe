use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::data_files::HduId;
use crate::jobs::{
    JobId, PhotometryAperture, PhotometryJobSettings, SourceExtractionJobSettings, StackingSettings,
};
use crate::sources::{PosType, SourceId};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkbenchTool {
    #[default]
    Viewer,
    CustomMarker,
    Plotter,
    Sonifier,
    FileInfo,
    Photometry,
    PixelOps,
    Aligner,
    Stacker,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CustomMarkerPanelConfig {
    pub centroid_clicks: bool,
    pub use_planet_centroiding: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum PlotMode {
    /// Line profile between the two measured points.
    #[default]
    OneD,
    /// Rectangle spanned by the two measured points.
    TwoD,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlottingPanelConfig {
    pub interpolate_pixels: bool,
    pub centroid_clicks: bool,
    pub planet_centroiding: bool,
    pub plotter_sync_enabled: bool,
    pub plot_mode: PlotMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotometryPanelConfig {
    pub selected_source_ids: Vec<SourceId>,
    pub coord_mode: PosType,
    pub show_source_labels: bool,
    pub show_sources_from_all_files: bool,
    pub centroid_clicks: bool,
    pub batch_hdu_ids: Vec<HduId>,
    /// Percent; `Some` while a batch photometry job runs.
    pub batch_phot_progress: Option<f64>,
    pub batch_phot_job_id: Option<JobId>,
}

impl Default for PhotometryPanelConfig {
    fn default() -> Self {
        Self {
            selected_source_ids: Vec::new(),
            coord_mode: PosType::Sky,
            show_source_labels: false,
            show_sources_from_all_files: true,
            centroid_clicks: true,
            batch_hdu_ids: Vec::new(),
            batch_phot_progress: None,
            batch_phot_job_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelOpsMode {
    Scalar,
    #[default]
    Image,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelOpsFormData {
    pub operand: String,
    pub mode: PixelOpsMode,
    pub scalar_value: f64,
    pub aux_hdu_id: Option<HduId>,
    pub aux_hdu_ids: Vec<HduId>,
    pub hdu_ids: Vec<HduId>,
    pub inplace: bool,
    /// Free-form expression used by the advanced form.
    pub op_string: String,
}

impl Default for PixelOpsFormData {
    fn default() -> Self {
        Self {
            operand: "+".to_string(),
            mode: PixelOpsMode::Image,
            scalar_value: 1.0,
            aux_hdu_id: None,
            aux_hdu_ids: Vec::new(),
            hdu_ids: Vec::new(),
            inplace: false,
            op_string: String::new(),
        }
    }
}

impl PixelOpsFormData {
    /// Expression for the simple form, plus the auxiliary image it needs.
    pub fn simple_op(&self) -> (String, Vec<HduId>) {
        match self.mode {
            PixelOpsMode::Scalar => (format!("img {} {}", self.operand, self.scalar_value), Vec::new()),
            PixelOpsMode::Image => (
                format!("img {} aux_img", self.operand),
                self.aux_hdu_id.into_iter().collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelOpsPanelConfig {
    pub form: PixelOpsFormData,
    pub current_job_id: Option<JobId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AligningPanelConfig {
    pub selected_hdu_ids: Vec<HduId>,
    pub inplace: bool,
    pub current_job_id: Option<JobId>,
}

impl Default for AligningPanelConfig {
    fn default() -> Self {
        Self {
            selected_hdu_ids: Vec::new(),
            inplace: true,
            current_job_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StackingPanelConfig {
    pub selected_hdu_ids: Vec<HduId>,
    pub stacking_settings: StackingSettings,
    pub current_job_id: Option<JobId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotometryMode {
    /// Apertures scaled by the Kron radius.
    Adaptive,
    #[default]
    Constant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhotometrySettings {
    pub mode: PhotometryMode,
    pub gain: f64,
    pub zero_point: f64,
    pub centroid_radius: f64,
    pub a: f64,
    pub b: f64,
    pub theta: f64,
    pub a_in: f64,
    pub a_out: f64,
    pub b_out: f64,
    pub theta_out: f64,
    pub a_kr_factor: f64,
    pub a_in_kr_factor: f64,
    pub a_out_kr_factor: f64,
}

impl Default for PhotometrySettings {
    fn default() -> Self {
        Self {
            mode: PhotometryMode::Constant,
            gain: 1.0,
            zero_point: 20.0,
            centroid_radius: 5.0,
            a: 5.0,
            b: 5.0,
            theta: 0.0,
            a_in: 10.0,
            a_out: 15.0,
            b_out: 15.0,
            theta_out: 0.0,
            a_kr_factor: 1.0,
            a_in_kr_factor: 1.0,
            a_out_kr_factor: 1.5,
        }
    }
}

impl PhotometrySettings {
    pub fn to_job_settings(&self) -> PhotometryJobSettings {
        let aperture = match self.mode {
            PhotometryMode::Adaptive => PhotometryAperture::Auto {
                a: self.a_kr_factor,
                a_in: self.a_in_kr_factor,
                a_out: self.a_out_kr_factor,
            },
            PhotometryMode::Constant => PhotometryAperture::Aperture {
                a: self.a,
                b: self.b,
                a_in: self.a_in,
                a_out: self.a_out,
                b_out: self.b_out,
                theta: self.theta,
                theta_out: self.theta_out,
            },
        };
        PhotometryJobSettings {
            aperture,
            gain: self.gain,
            centroid_radius: self.centroid_radius,
            zero_point: self.zero_point,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceExtractionRegion {
    #[default]
    EntireImage,
    Viewport,
    SonifierRegion,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceExtractionSettings {
    pub threshold: f64,
    pub fwhm: f64,
    pub deblend: bool,
    pub limit: Option<usize>,
    pub region: SourceExtractionRegion,
}

impl Default for SourceExtractionSettings {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            fwhm: 0.0,
            deblend: false,
            limit: Some(200),
            region: SourceExtractionRegion::EntireImage,
        }
    }
}

impl SourceExtractionSettings {
    pub fn to_job_settings(&self) -> SourceExtractionJobSettings {
        SourceExtractionJobSettings {
            threshold: self.threshold,
            fwhm: self.fwhm,
            deblend: self.deblend,
            limit: self.limit,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CentroidSettings {
    pub use_disk_centroiding: bool,
    /// Search box half-size in pixels.
    pub radius: f64,
    pub max_iterations: u32,
}

impl Default for CentroidSettings {
    fn default() -> Self {
        Self {
            use_disk_centroiding: false,
            radius: 10.0,
            max_iterations: 10,
        }
    }
}

/// User-tunable settings shared by every panel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkbenchSettings {
    pub photometry: PhotometrySettings,
    pub source_extraction: SourceExtractionSettings,
    pub centroid: CentroidSettings,
}
