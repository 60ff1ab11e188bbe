//! Job submission from panel state, the correlation protocol reducers and
//! what happens once a job resolves.

use tracing::{debug, error, info, warn};

use crate::actions::{DataFilesAction, Effect, JobAction, LayoutAction, WorkflowAction};
use crate::data_files::HduId;
use crate::hdu_state::SonifierRegionMode;
use crate::jobs::{
    AlignmentJob, CorrelationId, Job, JobId, JobOutcome, JobPayload, JobPurpose, JobResult,
    JobResultData, JobSource, JobStatus, PendingJob, PhotometryJob, PixelOpsJob,
    SourceExtractionJob, StackingJob,
};
use crate::layout::ViewerId;
use crate::panels::{PixelOpsMode, SourceExtractionRegion};
use crate::sources::{PhotData, PhotDataId, PosType, Source, SourceId};
use crate::store::Workbench;

impl Workbench {
    pub(crate) fn reduce_jobs(&mut self, action: JobAction) {
        match action {
            JobAction::CreateJob {
                correlation_id,
                job,
                purpose,
            } => {
                let interval_ms = self.config.job_poll_interval_ms;
                if self
                    .state
                    .jobs
                    .create(correlation_id, job.clone(), purpose, interval_ms)
                {
                    info!(%correlation_id, job_type = %job.job_type(), "Submitting job");
                    self.effects.push(Effect::CreateJob { correlation_id, job });
                }
            }
            JobAction::CreateJobSuccess { correlation_id, job } => {
                let created_id = job.id;
                let Some(pending) = self.state.jobs.accept(&correlation_id, job) else {
                    // canceled before the backend answered
                    if let (Some(JobOutcome::Canceled), Some(job_id)) =
                        (self.state.jobs.outcome(&correlation_id), created_id)
                    {
                        info!(%correlation_id, %job_id, "Canceling job created after cancel");
                        self.effects.push(Effect::CancelJob {
                            correlation_id,
                            job_id,
                        });
                    } else {
                        debug!(%correlation_id, "Ignoring creation of a resolved job");
                    }
                    return;
                };
                let job_id = pending.job_id();
                let interval_ms = pending.poll_interval_ms;
                let progress = pending.job.state.progress;
                let purpose = pending.purpose.clone();

                match job_id {
                    Some(job_id) => {
                        info!(%correlation_id, %job_id, "Job created");
                        self.effects.push(Effect::StartPolling {
                            correlation_id,
                            job_id,
                            interval_ms,
                        });
                        self.job_progress(&purpose, Some(job_id), progress);
                    }
                    None => self.fail_job(correlation_id, "Created job has no id".to_string()),
                }
            }
            JobAction::CreateJobFail {
                correlation_id,
                error,
            } => self.fail_job(correlation_id, error),
            JobAction::UpdateJobSuccess { correlation_id, job } => {
                let Some(pending) = self.state.jobs.update(&correlation_id, job) else {
                    debug!(%correlation_id, "Ignoring update of a resolved job");
                    return;
                };
                let status = pending.job.state.status;
                let progress = pending.job.state.progress;
                let job_id = pending.job_id();
                let purpose = pending.purpose.clone();
                let errors = pending
                    .job
                    .result
                    .as_ref()
                    .map(|result| result.errors.join(","))
                    .unwrap_or_default();

                match status {
                    JobStatus::Completed => {
                        if let Some(pending) = self.state.jobs.resolve(&correlation_id, JobOutcome::Completed) {
                            self.effects.push(Effect::StopPolling(correlation_id));
                            self.job_completed(pending);
                        }
                    }
                    JobStatus::Error => {
                        let error = if errors.is_empty() {
                            "Job finished with an error".to_string()
                        } else {
                            errors
                        };
                        self.fail_job(correlation_id, error);
                    }
                    JobStatus::Pending | JobStatus::InProgress => {
                        self.job_progress(&purpose, job_id, progress)
                    }
                }
            }
            JobAction::UpdateJobFail {
                correlation_id,
                error,
            } => self.fail_job(correlation_id, error),
            JobAction::CancelJob(correlation_id) => {
                let Some(pending) = self.state.jobs.resolve(&correlation_id, JobOutcome::Canceled) else {
                    debug!(%correlation_id, "Ignoring cancel of a resolved job");
                    return;
                };
                info!(%correlation_id, "Job canceled");
                if let Some(job_id) = pending.job_id() {
                    self.effects.push(Effect::StopPolling(correlation_id));
                    self.effects.push(Effect::CancelJob {
                        correlation_id,
                        job_id,
                    });
                }
                self.job_stopped(&pending.purpose);
            }
        }
    }

    fn fail_job(&mut self, correlation_id: CorrelationId, error: String) {
        let Some(pending) = self
            .state
            .jobs
            .resolve(&correlation_id, JobOutcome::Failed(error.clone()))
        else {
            debug!(%correlation_id, "Ignoring failure of a resolved job");
            return;
        };
        error!(%correlation_id, %error, "Job failed");
        if pending.job_id().is_some() {
            self.effects.push(Effect::StopPolling(correlation_id));
        }
        if let JobPurpose::SourceExtraction { .. } = pending.purpose {
            self.state.extraction_error = Some(error);
        }
        self.job_stopped(&pending.purpose);
    }

    /// Clears progress shown for a job that will not complete.
    fn job_stopped(&mut self, purpose: &JobPurpose) {
        if let JobPurpose::Photometry { batch: true, .. } = purpose {
            self.state.photometry_panel_config.batch_phot_progress = None;
        }
    }

    fn job_progress(&mut self, purpose: &JobPurpose, job_id: Option<JobId>, progress: f64) {
        let state = &mut self.state;
        match purpose {
            JobPurpose::PixelOps => state.pixel_ops_panel_config.current_job_id = job_id,
            JobPurpose::Alignment { .. } => state.aligning_panel_config.current_job_id = job_id,
            JobPurpose::Stacking => state.stacking_panel_config.current_job_id = job_id,
            JobPurpose::Photometry { batch: true, .. } => {
                let panel = &mut state.photometry_panel_config;
                panel.batch_phot_job_id = job_id;
                panel.batch_phot_progress = Some(progress);
            }
            JobPurpose::Photometry { .. }
            | JobPurpose::SourceExtraction { .. }
            | JobPurpose::CatalogQuery => {}
        }
    }

    fn job_completed(&mut self, pending: PendingJob) {
        let PendingJob {
            correlation_id,
            job,
            purpose,
            ..
        } = pending;
        let result = job.result.unwrap_or_default();
        for error in &result.errors {
            error!(%correlation_id, %error, "Job reported an error");
        }
        for warning in &result.warnings {
            warn!(%correlation_id, %warning, "Job reported a warning");
        }
        info!(%correlation_id, job_type = %job.payload.job_type(), "Job completed");

        match purpose {
            JobPurpose::PixelOps | JobPurpose::Stacking => {
                self.queue.push_back(DataFilesAction::LoadLibrary.into());
            }
            JobPurpose::Alignment { inplace } => {
                let file_ids = result.file_ids().to_vec();
                if inplace {
                    self.queue
                        .push_back(DataFilesAction::ClearImageDataCache(file_ids.clone()).into());
                } else {
                    self.queue.push_back(DataFilesAction::LoadLibrary.into());
                }
                let reload: Vec<(ViewerId, HduId)> = self
                    .state
                    .layout
                    .viewers
                    .iter()
                    .filter_map(|viewer| {
                        let hdu_id = viewer.hdu_id().filter(|id| file_ids.contains(id))?;
                        Some((viewer.id, hdu_id))
                    })
                    .collect();
                for (viewer_id, hdu_id) in reload {
                    self.queue
                        .push_back(LayoutAction::SetViewerFile { viewer_id, hdu_id }.into());
                }
            }
            JobPurpose::SourceExtraction { hdu_id } => self.sources_extracted(hdu_id, result),
            JobPurpose::Photometry {
                source_ids,
                file_ids,
                batch,
            } => {
                if batch {
                    self.state.photometry_panel_config.batch_phot_progress = None;
                }
                self.sources_photometered(&source_ids, &file_ids, result);
            }
            JobPurpose::CatalogQuery => {
                let JobResultData::Sources { data } = result.data else {
                    return;
                };
                let sources: Vec<Source> = data
                    .into_iter()
                    .filter_map(|entry| {
                        let source = Source::new(PosType::Sky, entry.ra_hours?, entry.dec_degs?);
                        Some(source.at_epoch(entry.time))
                    })
                    .collect();
                info!(count = sources.len(), "Catalog sources imported");
                self.state.sources.add_sources(sources);
            }
        }
    }

    fn sources_extracted(&mut self, hdu_id: HduId, result: JobResult) {
        if !result.errors.is_empty() {
            self.state.extraction_error = Some(result.errors.join(","));
            return;
        }
        let JobResultData::Sources { data } = result.data else {
            return;
        };

        let sky_mode = self.state.photometry_panel_config.coord_mode == PosType::Sky
            && self
                .state
                .data_files
                .hdu(&hdu_id)
                .is_some_and(|hdu| hdu.valid_wcs().is_some());
        let sources: Vec<Source> = data
            .into_iter()
            .map(|entry| {
                let source = match (sky_mode, entry.ra_hours, entry.dec_degs) {
                    (true, Some(ra_hours), Some(dec_degs)) => {
                        Source::new(PosType::Sky, ra_hours, dec_degs)
                    }
                    _ => Source::new(PosType::Pixel, entry.x, entry.y),
                };
                source.on_hdu(entry.file_id).at_epoch(entry.time)
            })
            .collect();
        info!(%hdu_id, count = sources.len(), "Sources extracted");
        self.state.sources.add_sources(sources);
    }

    /// Stores one record per file and source; pairs missing from the result
    /// get an empty record.
    fn sources_photometered(&mut self, source_ids: &[SourceId], file_ids: &[HduId], result: JobResult) {
        let records = match result.data {
            JobResultData::Photometry { data } => data,
            _ => Vec::new(),
        };
        let mut phot_data = Vec::with_capacity(source_ids.len() * file_ids.len());
        for file_id in file_ids {
            for source_id in source_ids {
                let id = PhotDataId {
                    source_id: *source_id,
                    hdu_id: *file_id,
                };
                let record = records
                    .iter()
                    .find(|record| record.id == *source_id && record.file_id == *file_id);
                phot_data.push(match record {
                    Some(record) => PhotData {
                        id,
                        time: record.time,
                        filter: record.filter.clone(),
                        telescope: record.telescope.clone(),
                        exp_length: record.exp_length,
                        ra_hours: record.ra_hours,
                        dec_degs: record.dec_degs,
                        x: record.x,
                        y: record.y,
                        mag: record.mag,
                        mag_error: record.mag_error,
                        flux: record.flux,
                        flux_error: record.flux_error,
                    },
                    None => PhotData {
                        id,
                        ..Default::default()
                    },
                });
            }
        }
        self.state.sources.add_phot_data(phot_data);
    }

    pub(crate) fn reduce_workflow(&mut self, action: WorkflowAction) {
        match action {
            WorkflowAction::CreatePixelOpsJob => {
                let form = &self.state.pixel_ops_panel_config.form;
                if form.mode == PixelOpsMode::Image && form.aux_hdu_id.is_none() {
                    warn!("Pixel operation needs an auxiliary image");
                    return;
                }
                let (op, aux_file_ids) = form.simple_op();
                let job = PixelOpsJob {
                    file_ids: self.state.data_files.sort_by_file_name(&form.hdu_ids),
                    aux_file_ids,
                    op,
                    inplace: form.inplace,
                };
                self.submit(JobPayload::PixelOps(job), JobPurpose::PixelOps);
            }
            WorkflowAction::CreateAdvPixelOpsJob => {
                let form = &self.state.pixel_ops_panel_config.form;
                let job = PixelOpsJob {
                    file_ids: self.state.data_files.sort_by_file_name(&form.hdu_ids),
                    aux_file_ids: self.state.data_files.sort_by_file_name(&form.aux_hdu_ids),
                    op: form.op_string.clone(),
                    inplace: form.inplace,
                };
                self.submit(JobPayload::PixelOps(job), JobPurpose::PixelOps);
            }
            WorkflowAction::CreateAlignmentJob => {
                let panel = &self.state.aligning_panel_config;
                let inplace = panel.inplace;
                let job = AlignmentJob {
                    file_ids: self.state.data_files.sort_by_file_name(&panel.selected_hdu_ids),
                    inplace,
                };
                self.submit(JobPayload::Alignment(job), JobPurpose::Alignment { inplace });
            }
            WorkflowAction::CreateStackingJob => {
                let panel = &self.state.stacking_panel_config;
                let job = StackingJob {
                    file_ids: self.state.data_files.sort_by_file_name(&panel.selected_hdu_ids),
                    stacking_settings: panel.stacking_settings,
                };
                self.submit(JobPayload::Stacking(job), JobPurpose::Stacking);
            }
            WorkflowAction::ExtractSources { hdu_id } => self.extract_sources(hdu_id),
            WorkflowAction::PhotometerSources {
                source_ids,
                hdu_ids,
                batch,
            } => {
                let sources: Vec<JobSource> = source_ids
                    .iter()
                    .filter_map(|id| self.state.sources.sources.get_by_id(id))
                    .map(job_source)
                    .collect();
                let source_ids: Vec<SourceId> = sources.iter().map(|source| source.id).collect();
                let job = PhotometryJob {
                    file_ids: hdu_ids.clone(),
                    settings: self.state.settings.photometry.to_job_settings(),
                    sources,
                };
                if batch {
                    self.state.photometry_panel_config.batch_phot_progress = Some(0.0);
                }
                self.submit(
                    JobPayload::Photometry(job),
                    JobPurpose::Photometry {
                        source_ids,
                        file_ids: hdu_ids,
                        batch,
                    },
                );
            }
            WorkflowAction::ImportCatalogSources(job) => {
                self.submit(JobPayload::CatalogQuery(job), JobPurpose::CatalogQuery);
            }
            WorkflowAction::MergeSelectedSources => {
                let selection = self.state.photometry_panel_config.selected_source_ids.clone();
                match self.state.sources.merge_sources(&selection) {
                    Ok(source_id) => {
                        self.state.merge_error = None;
                        self.state.photometry_panel_config.selected_source_ids = vec![source_id];
                    }
                    Err(err) => {
                        debug!(%err, "Sources not merged");
                        self.state.merge_error = Some(err.to_string());
                    }
                }
            }
        }
    }

    fn extract_sources(&mut self, hdu_id: HduId) {
        let (Some(hdu), Some(hdu_state)) = (self.state.data_files.hdu(&hdu_id), self.state.hdu_state(&hdu_id))
        else {
            warn!(%hdu_id, "Cannot extract sources from an unknown HDU");
            return;
        };
        let Some((width, height)) = hdu.image_size() else {
            warn!(%hdu_id, "Cannot extract sources before the header is loaded");
            return;
        };

        let settings = self.state.settings.source_extraction;
        let sonification = &hdu_state.sonification_panel_state;
        let window = match (settings.region, sonification.region_mode) {
            (SourceExtractionRegion::EntireImage, _) => None,
            (SourceExtractionRegion::Viewport, _)
            | (SourceExtractionRegion::SonifierRegion, SonifierRegionMode::Viewport) => {
                hdu_state.transformation.viewport_region()
            }
            (SourceExtractionRegion::SonifierRegion, SonifierRegionMode::Custom) => {
                sonification.current_region().copied()
            }
        };

        let mut job_settings = settings.to_job_settings();
        if let Some(region) = window {
            // 1-based, clamped into the image
            let clamp = |value: f64, limit: f64| (value + 1.0).max(0.0).min(limit);
            job_settings.x = Some(clamp(region.x, width));
            job_settings.y = Some(clamp(region.y, height));
            job_settings.width = Some(clamp(region.width, width));
            job_settings.height = Some(clamp(region.height, height));
        }

        self.state.extraction_error = None;
        let job = SourceExtractionJob {
            file_ids: vec![hdu_id],
            source_extraction_settings: job_settings,
            merge_sources: false,
        };
        self.submit(
            JobPayload::SourceExtraction(job),
            JobPurpose::SourceExtraction { hdu_id },
        );
    }

    /// Queues a job under a fresh correlation id.
    fn submit(&mut self, payload: JobPayload, purpose: JobPurpose) -> CorrelationId {
        let correlation_id = CorrelationId::unique();
        self.queue.push_back(
            JobAction::CreateJob {
                correlation_id,
                job: Job::new(payload),
                purpose,
            }
            .into(),
        );
        correlation_id
    }
}

fn job_source(source: &Source) -> JobSource {
    let mut job_source = JobSource {
        id: source.id,
        pm_epoch: source.pm_epoch,
        ..Default::default()
    };
    match source.pos_type {
        PosType::Pixel => {
            job_source.x = Some(source.primary_coord);
            job_source.y = Some(source.secondary_coord);
            job_source.pm_pixel = source.pm;
            job_source.pm_pos_angle_pixel = source.pm_pos_angle;
        }
        PosType::Sky => {
            job_source.ra_hours = Some(source.primary_coord);
            job_source.dec_degs = Some(source.secondary_coord);
            job_source.pm_sky = source.pm.map(|pm| pm / 3600.0);
            job_source.pm_pos_angle_sky = source.pm_pos_angle;
        }
    }
    job_source
}
