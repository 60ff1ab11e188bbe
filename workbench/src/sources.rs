use chrono::{DateTime, Utc};
use common::float_ext::FloatExt;
use common::{id_type, EntityCollection, EntityKey};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::data_files::HduId;
use crate::error::MergeError;

id_type!(SourceId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PosType {
    Pixel,
    Sky,
}

/// A tracked object. Pixel sources carry `x, y`; sky sources `ra_hours,
/// dec_degs`. Proper motion is in pixels or arcseconds per second, with the
/// position angle measured from the secondary axis towards the primary one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub label: Option<String>,
    /// HDU the source was created on.
    pub hdu_id: Option<HduId>,
    pub pos_type: PosType,
    pub primary_coord: f64,
    pub secondary_coord: f64,
    pub pm: Option<f64>,
    pub pm_pos_angle: Option<f64>,
    pub pm_epoch: Option<DateTime<Utc>>,
}

impl EntityKey<SourceId> for Source {
    fn key(&self) -> &SourceId {
        &self.id
    }
}

impl Source {
    pub fn new(pos_type: PosType, primary_coord: f64, secondary_coord: f64) -> Self {
        Self {
            id: SourceId::unique(),
            label: None,
            hdu_id: None,
            pos_type,
            primary_coord,
            secondary_coord,
            pm: None,
            pm_pos_angle: None,
            pm_epoch: None,
        }
    }

    pub fn on_hdu(mut self, hdu_id: HduId) -> Self {
        self.hdu_id = Some(hdu_id);
        self
    }

    pub fn at_epoch(mut self, epoch: Option<DateTime<Utc>>) -> Self {
        self.pm_epoch = epoch;
        self
    }

    pub fn has_motion(&self) -> bool {
        self.pm.is_some_and(|pm| pm != 0.0) && self.pm_pos_angle.is_some() && self.pm_epoch.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotDataId {
    pub source_id: SourceId,
    pub hdu_id: HduId,
}

/// Photometry of one source measured on one HDU.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PhotData {
    pub id: PhotDataId,
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

impl EntityKey<PhotDataId> for PhotData {
    fn key(&self) -> &PhotDataId {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProperMotionFit {
    pub pm: f64,
    pub pm_pos_angle: f64,
}

/// Least-squares proper motion through sources observed at distinct epochs.
pub fn fit_proper_motion(sources: &[&Source]) -> Result<ProperMotionFit, MergeError> {
    let [first, rest @ ..] = sources else {
        return Err(MergeError::TooFewSources);
    };
    if rest.is_empty() {
        return Err(MergeError::TooFewSources);
    }
    if rest.iter().any(|source| source.pos_type != first.pos_type) {
        return Err(MergeError::MixedPositionTypes);
    }
    let epochs: Vec<DateTime<Utc>> = sources
        .iter()
        .map(|source| source.pm_epoch.ok_or(MergeError::MissingEpoch))
        .collect::<Result<_, _>>()?;
    for (idx, epoch) in epochs.iter().enumerate() {
        if epochs[idx + 1..].contains(epoch) {
            return Err(MergeError::DuplicateEpochs);
        }
    }

    let t0 = epochs[0];
    let times: Vec<f64> = epochs
        .iter()
        .map(|epoch| (*epoch - t0).num_milliseconds() as f64 / 1000.0)
        .collect();

    let (primary, secondary): (Vec<f64>, Vec<f64>) = match first.pos_type {
        PosType::Pixel => sources
            .iter()
            .map(|source| (source.primary_coord, source.secondary_coord))
            .unzip(),
        PosType::Sky => {
            let mean_dec = sources.iter().map(|s| s.secondary_coord).sum::<f64>() / sources.len() as f64;
            let cos_dec = mean_dec.to_radians().cos();
            sources
                .iter()
                .map(|source| {
                    let d_ra_hours = (source.primary_coord - first.primary_coord + 12.0).rem_euclid(24.0) - 12.0;
                    (
                        d_ra_hours * 15.0 * 3600.0 * cos_dec,
                        (source.secondary_coord - first.secondary_coord) * 3600.0,
                    )
                })
                .unzip()
        }
    };

    let primary_rate = ols_slope(&times, &primary);
    let secondary_rate = ols_slope(&times, &secondary);

    Ok(ProperMotionFit {
        pm: primary_rate.hypot(secondary_rate),
        pm_pos_angle: primary_rate.atan2(secondary_rate).to_degrees().wrap_degrees(),
    })
}

fn ols_slope(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;
    let (num, den) = x.iter().zip(y).fold((0.0, 0.0), |(num, den), (xi, yi)| {
        (num + (xi - x_mean) * (yi - y_mean), den + (xi - x_mean).powi(2))
    });
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourcesState {
    pub sources: EntityCollection<SourceId, Source>,
    pub phot_data: EntityCollection<PhotDataId, PhotData>,
    next_label: u64,
}

impl SourcesState {
    /// Adds sources, labelling unlabelled ones with a running number.
    pub fn add_sources(&mut self, sources: Vec<Source>) -> Vec<SourceId> {
        let mut ids = Vec::with_capacity(sources.len());
        let sources: Vec<Source> = sources
            .into_iter()
            .map(|mut source| {
                if source.label.is_none() {
                    self.next_label += 1;
                    source.label = Some(self.next_label.to_string());
                }
                ids.push(source.id);
                source
            })
            .collect();
        self.sources.add_many(sources);
        ids
    }

    pub fn update_source(&mut self, source_id: &SourceId, f: impl FnOnce(&mut Source)) -> bool {
        self.sources.update_one(source_id, f)
    }

    pub fn remove_sources(&mut self, source_ids: &[SourceId]) -> Vec<Source> {
        self.remove_phot_data_for(source_ids);
        self.sources.remove_many(source_ids)
    }

    pub fn remove_all(&mut self) {
        self.sources.remove_all();
        self.phot_data.remove_all();
    }

    pub fn add_phot_data(&mut self, data: Vec<PhotData>) {
        self.phot_data.upsert_many(data);
    }

    pub fn remove_phot_data_for(&mut self, source_ids: &[SourceId]) {
        let ids: Vec<PhotDataId> = self
            .phot_data
            .iter()
            .filter(|data| source_ids.contains(&data.id.source_id))
            .map(|data| data.id)
            .collect();
        self.phot_data.remove_many(&ids);
    }

    /// Folds the given sources into the first one with a fitted proper motion.
    /// Photometry of every merged source is dropped, the kept one included.
    /// Nothing changes when the fit is rejected.
    pub fn merge_sources(&mut self, source_ids: &[SourceId]) -> Result<SourceId, MergeError> {
        let sources: Vec<&Source> = source_ids
            .iter()
            .map(|id| self.sources.get_by_id(id).ok_or(MergeError::UnknownSource(*id)))
            .collect::<Result<_, _>>()?;
        let fit = fit_proper_motion(&sources)?;

        let primary_id = source_ids[0];
        self.sources.update_one(&primary_id, |source| {
            source.pm = Some(fit.pm);
            source.pm_pos_angle = Some(fit.pm_pos_angle);
        });
        self.remove_phot_data_for(&source_ids[..1]);
        self.remove_sources(&source_ids[1..]);
        Ok(primary_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn epoch(seconds: i64) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2022, 5, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds))
    }

    #[test]
    fn sky_fit_uses_arcseconds() {
        let dec: f64 = 60.0;
        let ra_rate_arcsec = 2.0;
        let hours_per_arcsec = 1.0 / (15.0 * 3600.0 * dec.to_radians().cos());
        let sources: Vec<Source> = (0..3)
            .map(|t| {
                Source::new(
                    PosType::Sky,
                    5.0 + t as f64 * ra_rate_arcsec * hours_per_arcsec,
                    dec,
                )
                .at_epoch(epoch(t * 100))
            })
            .collect();
        let refs: Vec<&Source> = sources.iter().collect();

        let fit = fit_proper_motion(&refs).unwrap();
        assert!((fit.pm - 0.02).abs() < 1e-6);
        assert!((fit.pm_pos_angle - 90.0).abs() < 1e-3);
    }

    #[test]
    fn fit_rejects_bad_input() {
        let a = Source::new(PosType::Pixel, 0.0, 0.0).at_epoch(epoch(0));
        let b = Source::new(PosType::Sky, 1.0, 1.0).at_epoch(epoch(1));
        let c = Source::new(PosType::Pixel, 1.0, 1.0);

        assert_eq!(fit_proper_motion(&[&a]), Err(MergeError::TooFewSources));
        assert_eq!(fit_proper_motion(&[&a, &b]), Err(MergeError::MixedPositionTypes));
        assert_eq!(fit_proper_motion(&[&a, &c]), Err(MergeError::MissingEpoch));
    }

    #[test]
    fn add_sources_labels_in_order() {
        let mut state = SourcesState::default();
        let mut named = Source::new(PosType::Pixel, 0.0, 0.0);
        named.label = Some("target".into());
        state.add_sources(vec![
            Source::new(PosType::Pixel, 1.0, 1.0),
            named,
            Source::new(PosType::Pixel, 2.0, 2.0),
        ]);

        let labels: Vec<_> = state
            .sources
            .iter()
            .map(|s| s.label.clone().unwrap())
            .collect();
        assert_eq!(labels, vec!["1", "target", "2"]);
    }

    #[test]
    fn removing_sources_drops_their_photometry() {
        let mut state = SourcesState::default();
        let hdu_id = HduId::unique();
        let ids = state.add_sources(vec![
            Source::new(PosType::Pixel, 1.0, 1.0),
            Source::new(PosType::Pixel, 2.0, 2.0),
        ]);
        state.add_phot_data(
            ids.iter()
                .map(|source_id| PhotData {
                    id: PhotDataId {
                        source_id: *source_id,
                        hdu_id,
                    },
                    mag: Some(12.0),
                    ..Default::default()
                })
                .collect(),
        );

        state.remove_sources(&ids[..1]);
        assert_eq!(state.phot_data.len(), 1);
        assert_eq!(state.phot_data.get_all()[0].id.source_id, ids[1]);
    }

    #[test]
    fn merge_drops_photometry_of_all_merged_sources() {
        let mut state = SourcesState::default();
        let hdu_id = HduId::unique();
        let ids = state.add_sources(vec![
            Source::new(PosType::Pixel, 0.0, 0.0).at_epoch(epoch(0)),
            Source::new(PosType::Pixel, 1.0, 0.0).at_epoch(epoch(10)),
            Source::new(PosType::Pixel, 5.0, 5.0),
        ]);
        state.add_phot_data(
            ids.iter()
                .map(|source_id| PhotData {
                    id: PhotDataId {
                        source_id: *source_id,
                        hdu_id,
                    },
                    mag: Some(11.0),
                    ..Default::default()
                })
                .collect(),
        );

        let merged = state.merge_sources(&ids[..2]).unwrap();

        assert_eq!(merged, ids[0]);
        assert_eq!(state.sources.ids(), vec![ids[0], ids[2]]);
        assert_eq!(state.phot_data.len(), 1);
        assert_eq!(state.phot_data.get_all()[0].id.source_id, ids[2]);
        assert_eq!(state.sources.get_by_id(&ids[0]).unwrap().pm, Some(0.1));
    }
}
