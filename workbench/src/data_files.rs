use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use common::{id_type, EntityCollection, EntityKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::wcs::{TanWcs, Wcs};

id_type!(DataFileId);
id_type!(HduId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HduType {
    Image,
    Table,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Bool(bool),
    Number(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub key: String,
    pub value: HeaderValue,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Header {
    pub entries: Vec<HeaderEntry>,
}

impl Header {
    pub fn new(entries: impl IntoIterator<Item = (&'static str, HeaderValue)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, value)| HeaderEntry {
                    key: key.to_string(),
                    value,
                    comment: None,
                })
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|entry| entry.key.eq_ignore_ascii_case(key))
            .map(|entry| &entry.value)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            HeaderValue::Number(value) => Some(*value),
            HeaderValue::Str(value) => value.trim().parse().ok(),
            HeaderValue::Bool(_) => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            HeaderValue::Str(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            HeaderValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

/// Pixel-value histogram with equally sized bins spanning `[min_bin, max_bin]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Histogram {
    pub min_bin: f64,
    pub max_bin: f64,
    pub data: Vec<f64>,
}

impl Histogram {
    pub fn bin_width(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        (self.max_bin - self.min_bin) / self.data.len() as f64
    }

    /// Pixel level below which `percentile` percent of the pixels fall.
    pub fn level_at_percentile(&self, percentile: f64) -> f64 {
        let total: f64 = self.data.iter().sum();
        if total <= 0.0 {
            return self.min_bin;
        }
        let target = total * percentile.clamp(0.0, 100.0) / 100.0;
        let mut cumulative = 0.0;
        for (idx, count) in self.data.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return self.min_bin + idx as f64 * self.bin_width();
            }
        }
        self.max_bin
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    pub id: DataFileId,
    pub name: String,
    pub hdu_ids: Vec<HduId>,
}

impl EntityKey<DataFileId> for DataFile {
    fn key(&self) -> &DataFileId {
        &self.id
    }
}

#[derive(Debug, Clone)]
pub struct Hdu {
    pub id: HduId,
    pub file_id: DataFileId,
    pub name: String,
    pub order: usize,
    pub hdu_type: HduType,
    pub header: Option<Header>,
    pub header_loading: bool,
    pub histogram: Option<Histogram>,
    pub hist_loading: bool,
    pub wcs: Option<Arc<dyn Wcs>>,
}

impl EntityKey<HduId> for Hdu {
    fn key(&self) -> &HduId {
        &self.id
    }
}

impl Hdu {
    pub fn new(id: HduId, file_id: DataFileId, name: impl Into<String>, hdu_type: HduType) -> Self {
        Self {
            id,
            file_id,
            name: name.into(),
            order: 0,
            hdu_type,
            header: None,
            header_loading: false,
            histogram: None,
            hist_loading: false,
            wcs: None,
        }
    }

    pub fn is_image(&self) -> bool {
        self.hdu_type == HduType::Image
    }

    pub fn header_loaded(&self) -> bool {
        self.header.is_some()
    }

    pub fn hist_loaded(&self) -> bool {
        self.histogram.is_some()
    }

    /// Header loaded and, for images, the histogram too.
    pub fn is_ready(&self) -> bool {
        self.header_loaded() && (!self.is_image() || self.hist_loaded())
    }

    pub fn width(&self) -> Option<f64> {
        self.header.as_ref()?.get_f64("NAXIS1")
    }

    pub fn height(&self) -> Option<f64> {
        self.header.as_ref()?.get_f64("NAXIS2")
    }

    pub fn image_size(&self) -> Option<(f64, f64)> {
        Some((self.width()?, self.height()?))
    }

    pub fn contains_pixel(&self, x: f64, y: f64) -> bool {
        match self.image_size() {
            Some((width, height)) => x >= 0.0 && x <= width && y >= 0.0 && y <= height,
            None => false,
        }
    }

    /// WCS when present and valid.
    pub fn valid_wcs(&self) -> Option<&dyn Wcs> {
        self.wcs.as_deref().filter(|wcs| wcs.is_valid())
    }

    /// Mid-exposure time: `DATE-OBS` plus half of `EXPTIME`.
    pub fn center_time(&self) -> Option<DateTime<Utc>> {
        let header = self.header.as_ref()?;
        let start = parse_date_obs(header.get_str("DATE-OBS")?)?;
        let exposure = header.get_f64("EXPTIME").unwrap_or(0.0);
        Some(start + Duration::milliseconds((exposure * 500.0).round() as i64))
    }

    pub fn set_header(&mut self, header: Header) {
        self.wcs = TanWcs::from_header(&header).map(|wcs| Arc::new(wcs) as Arc<dyn Wcs>);
        self.header = Some(header);
        self.header_loading = false;
    }
}

fn parse_date_obs(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim().trim_end_matches('Z');
    if let Ok(time) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(time.and_utc());
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Files and HDUs returned by a library load.
#[derive(Debug, Clone, Default)]
pub struct Library {
    pub files: Vec<DataFile>,
    pub hdus: Vec<Hdu>,
}

#[derive(Debug, Clone, Default)]
pub struct DataFilesState {
    pub files: EntityCollection<DataFileId, DataFile>,
    pub hdus: EntityCollection<HduId, Hdu>,
    pub library_loading: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryDiff {
    pub added: Vec<HduId>,
    pub removed: Vec<HduId>,
}

impl DataFilesState {
    pub fn hdu(&self, hdu_id: &HduId) -> Option<&Hdu> {
        self.hdus.get_by_id(hdu_id)
    }

    /// Replaces the library, keeping already loaded headers and histograms.
    pub fn load_library_success(&mut self, library: Library) -> LibraryDiff {
        self.library_loading = false;
        let mut diff = LibraryDiff::default();

        let incoming: Vec<HduId> = library.hdus.iter().map(|hdu| hdu.id).collect();
        diff.removed = self
            .hdus
            .ids()
            .into_iter()
            .filter(|id| !incoming.contains(id))
            .collect();
        self.hdus.remove_many(&diff.removed);

        for mut hdu in library.hdus {
            match self.hdus.get_by_id(&hdu.id) {
                Some(existing) => {
                    hdu.header = existing.header.clone();
                    hdu.header_loading = existing.header_loading;
                    hdu.histogram = existing.histogram.clone();
                    hdu.hist_loading = existing.hist_loading;
                    hdu.wcs = existing.wcs.clone();
                }
                None => diff.added.push(hdu.id),
            }
            self.hdus.upsert(hdu);
        }

        let file_ids: Vec<DataFileId> = library.files.iter().map(|file| file.id).collect();
        let stale_files: Vec<DataFileId> = self
            .files
            .ids()
            .into_iter()
            .filter(|id| !file_ids.contains(id))
            .collect();
        self.files.remove_many(&stale_files);
        self.files.upsert_many(library.files);

        diff
    }

    pub fn load_header_start(&mut self, hdu_id: &HduId) {
        self.hdus.update_one(hdu_id, |hdu| hdu.header_loading = true);
    }

    pub fn load_header_success(&mut self, hdu_id: &HduId, header: Header) {
        if !self.hdus.update_one(hdu_id, |hdu| hdu.set_header(header)) {
            debug!(%hdu_id, "Header loaded for an HDU that is no longer in the library");
        }
    }

    pub fn load_header_fail(&mut self, hdu_id: &HduId) {
        self.hdus.update_one(hdu_id, |hdu| hdu.header_loading = false);
    }

    pub fn load_histogram_start(&mut self, hdu_id: &HduId) {
        self.hdus.update_one(hdu_id, |hdu| hdu.hist_loading = true);
    }

    pub fn load_histogram_success(&mut self, hdu_id: &HduId, histogram: Histogram) {
        let updated = self.hdus.update_one(hdu_id, |hdu| {
            hdu.histogram = Some(histogram);
            hdu.hist_loading = false;
        });
        if !updated {
            debug!(%hdu_id, "Histogram loaded for an HDU that is no longer in the library");
        }
    }

    pub fn load_histogram_fail(&mut self, hdu_id: &HduId) {
        self.hdus.update_one(hdu_id, |hdu| hdu.hist_loading = false);
    }

    /// Drops cached header and histogram so they are fetched again.
    pub fn clear_image_data_cache(&mut self, hdu_ids: &[HduId]) {
        for hdu_id in hdu_ids {
            self.hdus.update_one(hdu_id, |hdu| {
                hdu.header = None;
                hdu.histogram = None;
                hdu.wcs = None;
                hdu.header_loading = false;
                hdu.hist_loading = false;
            });
        }
    }

    pub fn close_hdu(&mut self, hdu_id: &HduId) -> Option<Hdu> {
        let hdu = self.hdus.remove_one(hdu_id)?;
        let file_id = hdu.file_id;
        self.files.update_one(&file_id, |file| file.hdu_ids.retain(|id| id != hdu_id));
        if self
            .files
            .get_by_id(&file_id)
            .is_some_and(|file| file.hdu_ids.is_empty())
        {
            self.files.remove_one(&file_id);
        }
        Some(hdu)
    }

    /// Removes a file with all of its HDUs and returns the removed HDU ids.
    pub fn close_file(&mut self, file_id: &DataFileId) -> Vec<HduId> {
        let Some(file) = self.files.remove_one(file_id) else {
            return Vec::new();
        };
        self.hdus
            .remove_many(&file.hdu_ids)
            .into_iter()
            .map(|hdu| hdu.id)
            .collect()
    }

    /// Orders HDUs by the name of their file, the order used for job inputs.
    pub fn sort_by_file_name(&self, hdu_ids: &[HduId]) -> Vec<HduId> {
        let mut hdus: Vec<&Hdu> = hdu_ids.iter().filter_map(|id| self.hdu(id)).collect();
        hdus.sort_by(|a, b| {
            let name_of = |hdu: &Hdu| {
                self.files
                    .get_by_id(&hdu.file_id)
                    .map(|file| file.name.clone())
                    .unwrap_or_default()
            };
            name_of(a).cmp(&name_of(b)).then(a.order.cmp(&b.order))
        });
        hdus.into_iter().map(|hdu| hdu.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn image_header() -> Header {
        Header::new([
            ("NAXIS1", HeaderValue::Number(200.0)),
            ("NAXIS2", HeaderValue::Number(100.0)),
            ("DATE-OBS", HeaderValue::Str("2021-03-04T05:06:07.500".into())),
            ("EXPTIME", HeaderValue::Number(30.0)),
            ("CRPIX1", HeaderValue::Number(100.0)),
            ("CRPIX2", HeaderValue::Number(50.0)),
            ("CRVAL1", HeaderValue::Number(150.0)),
            ("CRVAL2", HeaderValue::Number(2.0)),
            ("CDELT1", HeaderValue::Number(-0.0003)),
            ("CDELT2", HeaderValue::Number(0.0003)),
        ])
    }

    fn library(file: DataFileId, hdus: &[HduId]) -> Library {
        Library {
            files: vec![DataFile {
                id: file,
                name: "m42.fits".into(),
                hdu_ids: hdus.to_vec(),
            }],
            hdus: hdus
                .iter()
                .map(|id| Hdu::new(*id, file, "primary", HduType::Image))
                .collect(),
        }
    }

    #[test]
    fn header_drives_size_time_and_wcs() {
        let mut hdu = Hdu::new(HduId::unique(), DataFileId::unique(), "primary", HduType::Image);
        hdu.set_header(image_header());

        assert_eq!(hdu.image_size(), Some((200.0, 100.0)));
        assert!(hdu.valid_wcs().is_some());
        assert!(!hdu.is_ready());

        let expected = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 22).unwrap() + Duration::milliseconds(500);
        assert_eq!(hdu.center_time(), Some(expected));
    }

    #[test]
    fn percentile_levels() {
        let histogram = Histogram {
            min_bin: 0.0,
            max_bin: 100.0,
            data: vec![10.0; 100],
        };
        assert_eq!(histogram.level_at_percentile(10.0), 9.0);
        assert_eq!(histogram.level_at_percentile(100.0), 99.0);
        assert_eq!(Histogram::default().level_at_percentile(50.0), 0.0);
    }

    #[test]
    fn library_reload_keeps_loaded_data() {
        let file = DataFileId::unique();
        let (a, b, c) = (HduId::unique(), HduId::unique(), HduId::unique());
        let mut state = DataFilesState::default();

        let diff = state.load_library_success(library(file, &[a, b]));
        assert_eq!(diff.added, vec![a, b]);

        state.load_header_success(&a, image_header());
        let diff = state.load_library_success(library(file, &[a, c]));

        assert_eq!(diff.added, vec![c]);
        assert_eq!(diff.removed, vec![b]);
        assert!(state.hdu(&a).unwrap().header_loaded());
        assert!(state.hdu(&b).is_none());
    }

    #[test]
    fn closing_last_hdu_removes_file() {
        let file = DataFileId::unique();
        let a = HduId::unique();
        let mut state = DataFilesState::default();
        state.load_library_success(library(file, &[a]));

        assert!(state.close_hdu(&a).is_some());
        assert!(state.files.is_empty());
        assert!(state.close_hdu(&a).is_none());
    }
}
