//! Fixtures and in-memory backends shared by the unit tests.

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::data_files::{DataFile, DataFileId, Hdu, HduId, HduType, Header, HeaderValue, Histogram, Library};
use crate::jobs::{BackendFuture, Job, JobBackend, JobId, JobResult, JobStatus};
use crate::runtime::DataFileBackend;

const DEFAULT_CRVAL: [f64; 2] = [150.0, 30.0];

/// Image HDU with header and histogram loaded. With `with_wcs` the image
/// gets a one arcsecond per pixel tangent projection centred on the image.
pub fn image_hdu(name: &str, width: f64, height: f64, with_wcs: bool) -> Hdu {
    build_image_hdu(name, width, height, with_wcs.then_some(DEFAULT_CRVAL))
}

/// Like [`image_hdu`] with the projection centred on `crval` degrees.
pub fn image_hdu_at(name: &str, width: f64, height: f64, crval: [f64; 2]) -> Hdu {
    build_image_hdu(name, width, height, Some(crval))
}

/// Image HDU whose header and histogram are not loaded yet.
pub fn bare_hdu(name: &str) -> Hdu {
    Hdu::new(HduId::unique(), DataFileId::unique(), name, HduType::Image)
}

/// One data file per HDU.
pub fn library_of(hdus: Vec<Hdu>) -> Library {
    let files = hdus
        .iter()
        .map(|hdu| DataFile {
            id: hdu.file_id,
            name: hdu.name.clone(),
            hdu_ids: vec![hdu.id],
        })
        .collect();
    Library { files, hdus }
}

fn build_image_hdu(name: &str, width: f64, height: f64, crval: Option<[f64; 2]>) -> Hdu {
    let mut hdu = bare_hdu(name);
    let mut entries = vec![
        ("NAXIS1", HeaderValue::Number(width)),
        ("NAXIS2", HeaderValue::Number(height)),
        ("DATE-OBS", HeaderValue::Str("2021-03-04T05:06:07".to_string())),
        ("EXPTIME", HeaderValue::Number(30.0)),
    ];
    if let Some([ra, dec]) = crval {
        entries.extend([
            ("CTYPE1", HeaderValue::Str("RA---TAN".to_string())),
            ("CTYPE2", HeaderValue::Str("DEC--TAN".to_string())),
            ("CRPIX1", HeaderValue::Number(width / 2.0)),
            ("CRPIX2", HeaderValue::Number(height / 2.0)),
            ("CRVAL1", HeaderValue::Number(ra)),
            ("CRVAL2", HeaderValue::Number(dec)),
            ("CD1_1", HeaderValue::Number(-1.0 / 3600.0)),
            ("CD1_2", HeaderValue::Number(0.0)),
            ("CD2_1", HeaderValue::Number(0.0)),
            ("CD2_2", HeaderValue::Number(1.0 / 3600.0)),
        ]);
    }
    hdu.set_header(Header::new(entries));
    hdu.histogram = Some(Histogram {
        min_bin: 0.0,
        max_bin: 1000.0,
        data: vec![1.0; 1000],
    });
    hdu
}

/// Data-file service backed by fully loaded HDUs. The library it returns
/// carries bare HDUs, headers and histograms are served on request.
#[derive(Debug, Default)]
pub struct MemoryDataFiles {
    hdus: Vec<Hdu>,
    imported: Vec<Hdu>,
    library_calls: Mutex<usize>,
    imported_done: Mutex<bool>,
}

impl MemoryDataFiles {
    pub fn new(hdus: Vec<Hdu>) -> Self {
        Self {
            hdus,
            ..Default::default()
        }
    }

    /// HDUs that appear in the library once a survey import ran.
    pub fn with_import(mut self, imported: Vec<Hdu>) -> Self {
        self.imported = imported;
        self
    }

    pub fn library_calls(&self) -> usize {
        *self.library_calls.lock()
    }

    fn find(&self, hdu_id: HduId) -> anyhow::Result<&Hdu> {
        self.hdus
            .iter()
            .chain(self.imported.iter())
            .find(|hdu| hdu.id == hdu_id)
            .ok_or_else(|| anyhow::anyhow!("unknown HDU {hdu_id}"))
    }
}

impl DataFileBackend for MemoryDataFiles {
    fn load_library(&self) -> BackendFuture<'_, Library> {
        Box::pin(async move {
            *self.library_calls.lock() += 1;
            let mut hdus: Vec<Hdu> = self.hdus.clone();
            if *self.imported_done.lock() {
                hdus.extend(self.imported.iter().cloned());
            }
            let bare = hdus
                .into_iter()
                .map(|hdu| Hdu::new(hdu.id, hdu.file_id, hdu.name, hdu.hdu_type))
                .collect();
            Ok(library_of(bare))
        })
    }

    fn load_header(&self, hdu_id: HduId) -> BackendFuture<'_, Header> {
        Box::pin(async move {
            self.find(hdu_id)?
                .header
                .clone()
                .ok_or_else(|| anyhow::anyhow!("no header for {hdu_id}"))
        })
    }

    fn load_histogram(&self, hdu_id: HduId) -> BackendFuture<'_, Histogram> {
        Box::pin(async move {
            self.find(hdu_id)?
                .histogram
                .clone()
                .ok_or_else(|| anyhow::anyhow!("no histogram for {hdu_id}"))
        })
    }

    fn import_assets(&self, _provider_id: String, _path: String) -> BackendFuture<'_, Vec<HduId>> {
        Box::pin(async move {
            *self.imported_done.lock() = true;
            Ok(self.imported.iter().map(|hdu| hdu.id).collect())
        })
    }
}

/// Job service that completes every job after a fixed number of polls.
#[derive(Debug, Default)]
pub struct MemoryJobs {
    polls_until_done: usize,
    result: JobResult,
    jobs: Mutex<HashMap<JobId, (Job, usize)>>,
    canceled: Mutex<Vec<JobId>>,
}

impl MemoryJobs {
    pub fn new(polls_until_done: usize, result: JobResult) -> Self {
        Self {
            polls_until_done,
            result,
            ..Default::default()
        }
    }

    pub fn canceled(&self) -> Vec<JobId> {
        self.canceled.lock().clone()
    }
}

impl JobBackend for MemoryJobs {
    fn create(&self, mut job: Job) -> BackendFuture<'_, Job> {
        Box::pin(async move {
            let job_id = JobId::unique();
            job.id = Some(job_id);
            job.state.status = JobStatus::InProgress;
            self.jobs.lock().insert(job_id, (job.clone(), 0));
            Ok(job)
        })
    }

    fn poll(&self, job_id: JobId) -> BackendFuture<'_, Job> {
        Box::pin(async move {
            let mut jobs = self.jobs.lock();
            let (job, polls) = jobs
                .get_mut(&job_id)
                .ok_or_else(|| anyhow::anyhow!("unknown job {job_id}"))?;
            *polls += 1;
            if *polls >= self.polls_until_done {
                job.state.status = JobStatus::Completed;
                job.state.progress = 100.0;
                job.result = Some(self.result.clone());
            } else {
                job.state.progress = 100.0 * *polls as f64 / self.polls_until_done as f64;
            }
            Ok(job.clone())
        })
    }

    fn cancel(&self, job_id: JobId) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.canceled.lock().push(job_id);
            Ok(())
        })
    }
}
