use common::float_ext::FloatExt;

use crate::data_files::Hdu;
use crate::sources::{PosType, Source};

/// Pixel position of a source on one HDU. `theta` is the proper-motion
/// direction in pixel space, in degrees from +y towards +x.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceCoords {
    pub x: f64,
    pub y: f64,
    pub theta: Option<f64>,
}

/// Sky position `[ra_hours, dec_degs]` advanced by `mu` arcseconds along the
/// position angle `pa_degs`.
pub fn offset_sky(ra_hours: f64, dec_degs: f64, mu: f64, pa_degs: f64) -> [f64; 2] {
    let (sin_pa, cos_pa) = pa_degs.to_radians().sin_cos();
    let cos_dec = dec_degs.to_radians().cos();
    let mu_degs = mu / 3600.0;
    let ra = if cos_dec.abs() > f64::EPSILON {
        (ra_hours + mu_degs * sin_pa / cos_dec / 15.0).rem_euclid(24.0)
    } else {
        ra_hours
    };
    let dec = (dec_degs + mu_degs * cos_pa).clamp(-90.0, 90.0);
    [ra, dec]
}

/// Resolves a source onto `hdu`, moving it from its epoch to the HDU
/// observation time when proper motion is known. `None` when the HDU has no
/// header, a sky source meets an invalid WCS, or the point is off the image.
pub fn source_coordinates(hdu: &Hdu, source: &Source) -> Option<SourceCoords> {
    let (width, height) = hdu.image_size()?;
    let elapsed = match (source.pm_epoch, hdu.center_time()) {
        (Some(epoch), Some(time)) if source.has_motion() => {
            Some((time - epoch).num_milliseconds() as f64 / 1000.0)
        }
        _ => None,
    };
    let pm = source.pm.unwrap_or(0.0);
    let pm_pos_angle = source.pm_pos_angle.unwrap_or(0.0);

    let (x, y, theta) = match source.pos_type {
        PosType::Pixel => {
            let (sin_pa, cos_pa) = pm_pos_angle.to_radians().sin_cos();
            let dt = elapsed.unwrap_or(0.0);
            (
                source.primary_coord + pm * dt * sin_pa,
                source.secondary_coord + pm * dt * cos_pa,
                source.has_motion().then_some(pm_pos_angle.wrap_degrees()),
            )
        }
        PosType::Sky => {
            let wcs = hdu.valid_wcs()?;
            let [ra, dec] = match elapsed {
                Some(dt) => offset_sky(
                    source.primary_coord,
                    source.secondary_coord,
                    pm * dt,
                    pm_pos_angle,
                ),
                None => [source.primary_coord, source.secondary_coord],
            };
            let [x, y] = wcs.world_to_pix([ra, dec])?;
            let theta = if source.has_motion() {
                // direction of a one arcsecond step along the motion
                let ahead = offset_sky(ra, dec, 1.0, pm_pos_angle);
                wcs.world_to_pix(ahead)
                    .map(|[ax, ay]| (ax - x).atan2(ay - y).to_degrees().wrap_degrees())
            } else {
                None
            };
            (x, y, theta)
        }
    };

    if !(x.is_finite() && y.is_finite()) || x < 0.0 || x > width || y < 0.0 || y > height {
        return None;
    }
    Some(SourceCoords { x, y, theta })
}

/// Pixel to `[ra_hours, dec_degs]` on `hdu`, when its WCS is valid.
pub fn pixel_to_sky(hdu: &Hdu, x: f64, y: f64) -> Option<[f64; 2]> {
    hdu.valid_wcs()?.pix_to_world([x, y])
}

pub fn sky_to_pixel(hdu: &Hdu, ra_hours: f64, dec_degs: f64) -> Option<[f64; 2]> {
    hdu.valid_wcs()?.world_to_pix([ra_hours, dec_degs])
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::data_files::{DataFileId, HduId, HduType, Header, HeaderValue};

    fn hdu(with_wcs: bool) -> Hdu {
        let mut entries = vec![
            ("NAXIS1", HeaderValue::Number(200.0)),
            ("NAXIS2", HeaderValue::Number(100.0)),
            ("DATE-OBS", HeaderValue::Str("2022-05-01T00:01:40".into())),
        ];
        if with_wcs {
            entries.extend([
                ("CRPIX1", HeaderValue::Number(100.0)),
                ("CRPIX2", HeaderValue::Number(50.0)),
                ("CRVAL1", HeaderValue::Number(150.0)),
                ("CRVAL2", HeaderValue::Number(0.0)),
                ("CD1_1", HeaderValue::Number(1.0 / 3600.0)),
                ("CD2_2", HeaderValue::Number(1.0 / 3600.0)),
            ]);
        }
        let mut hdu = Hdu::new(HduId::unique(), DataFileId::unique(), "a.fits", HduType::Image);
        hdu.set_header(Header::new(entries));
        hdu
    }

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 5, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn pixel_source_moves_to_observation_time() {
        let mut source = Source::new(PosType::Pixel, 10.0, 20.0).at_epoch(Some(start()));
        source.pm = Some(0.1);
        source.pm_pos_angle = Some(90.0);

        let coords = source_coordinates(&hdu(false), &source).unwrap();
        assert!((coords.x - 20.0).abs() < 1e-9);
        assert!((coords.y - 20.0).abs() < 1e-9);
        assert_eq!(coords.theta, Some(90.0));
    }

    #[test]
    fn sky_source_needs_valid_wcs() {
        let source = Source::new(PosType::Sky, 10.0, 0.0);
        assert!(source_coordinates(&hdu(false), &source).is_none());

        let coords = source_coordinates(&hdu(true), &source).unwrap();
        assert!((coords.x - 100.0).abs() < 1e-6);
        assert!((coords.y - 50.0).abs() < 1e-6);
        assert!(coords.theta.is_none());
    }

    #[test]
    fn sky_motion_points_along_position_angle() {
        let mut source = Source::new(PosType::Sky, 10.0, 0.0).at_epoch(Some(start() + Duration::seconds(50)));
        source.pm = Some(0.2);
        source.pm_pos_angle = Some(0.0);

        let coords = source_coordinates(&hdu(true), &source).unwrap();
        assert!((coords.y - 60.0).abs() < 1e-3);
        assert!(coords.theta.unwrap().approx_eq_within(0.0, 1e-3) || coords.theta.unwrap() > 359.999);
    }

    #[test]
    fn off_image_sources_are_skipped() {
        let source = Source::new(PosType::Pixel, 250.0, 20.0);
        assert!(source_coordinates(&hdu(false), &source).is_none());
    }
}
