//! World coordinate system capability.
//!
//! The workbench only consumes WCS solutions through the [`Wcs`] trait. A
//! gnomonic [`TanWcs`] is provided for headers carrying a linear TAN solution.

use std::fmt::Debug;

use glam::DVec2;

use crate::data_files::Header;
use crate::transform::Transform;

pub trait Wcs: Debug + Send + Sync {
    fn is_valid(&self) -> bool;
    /// Pixel to `[ra_hours, dec_degs]`.
    fn pix_to_world(&self, pixel: [f64; 2]) -> Option<[f64; 2]>;
    /// `[ra_hours, dec_degs]` to pixel.
    fn world_to_pix(&self, world: [f64; 2]) -> Option<[f64; 2]>;
    /// Degrees per pixel.
    fn pixel_scale(&self) -> f64;
    /// `[m11, m12, m21, m22]` mapping pixel offsets to intermediate world degrees.
    fn linear_matrix(&self) -> [f64; 4];
}

/// Gnomonic projection with a linear CD matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct TanWcs {
    pub crpix: [f64; 2],
    /// Reference sky position in degrees.
    pub crval: [f64; 2],
    pub cd: [[f64; 2]; 2],
}

impl TanWcs {
    pub fn new(crpix: [f64; 2], crval: [f64; 2], cd: [[f64; 2]; 2]) -> Self {
        Self { crpix, crval, cd }
    }

    /// Reads `CRPIX`, `CRVAL` and either the `CD` matrix or `CDELT` with an
    /// optional `CROTA2`. Returns `None` when the solution is incomplete.
    pub fn from_header(header: &Header) -> Option<Self> {
        let ctype1 = header.get_str("CTYPE1").unwrap_or("RA---TAN");
        if !ctype1.starts_with("RA") {
            return None;
        }
        let crpix = [header.get_f64("CRPIX1")?, header.get_f64("CRPIX2")?];
        let crval = [header.get_f64("CRVAL1")?, header.get_f64("CRVAL2")?];

        let cd = match (
            header.get_f64("CD1_1"),
            header.get_f64("CD1_2"),
            header.get_f64("CD2_1"),
            header.get_f64("CD2_2"),
        ) {
            (Some(cd11), cd12, cd21, Some(cd22)) => {
                [[cd11, cd12.unwrap_or(0.0)], [cd21.unwrap_or(0.0), cd22]]
            }
            _ => {
                let cdelt1 = header.get_f64("CDELT1")?;
                let cdelt2 = header.get_f64("CDELT2")?;
                let (sin, cos) = header.get_f64("CROTA2").unwrap_or(0.0).to_radians().sin_cos();
                [
                    [cdelt1 * cos, -cdelt2 * sin],
                    [cdelt1 * sin, cdelt2 * cos],
                ]
            }
        };

        Some(Self::new(crpix, crval, cd))
    }

    fn determinant(&self) -> f64 {
        self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0]
    }
}

impl Wcs for TanWcs {
    fn is_valid(&self) -> bool {
        let det = self.determinant();
        det.is_finite()
            && det.abs() > f64::EPSILON * 1e-6
            && self.crpix.iter().chain(self.crval.iter()).all(|v| v.is_finite())
    }

    fn pix_to_world(&self, pixel: [f64; 2]) -> Option<[f64; 2]> {
        if !self.is_valid() {
            return None;
        }
        let dx = pixel[0] - self.crpix[0];
        let dy = pixel[1] - self.crpix[1];
        let xi = (self.cd[0][0] * dx + self.cd[0][1] * dy).to_radians();
        let eta = (self.cd[1][0] * dx + self.cd[1][1] * dy).to_radians();

        let ra0 = self.crval[0].to_radians();
        let (sin_dec0, cos_dec0) = self.crval[1].to_radians().sin_cos();
        let denom = cos_dec0 - eta * sin_dec0;

        let ra = ra0 + xi.atan2(denom);
        let dec = (sin_dec0 + eta * cos_dec0).atan2(xi.hypot(denom));

        let ra_degs = ra.to_degrees().rem_euclid(360.0);
        Some([ra_degs / 15.0, dec.to_degrees()])
    }

    fn world_to_pix(&self, world: [f64; 2]) -> Option<[f64; 2]> {
        if !self.is_valid() {
            return None;
        }
        let ra = (world[0] * 15.0).to_radians();
        let (sin_dec, cos_dec) = world[1].to_radians().sin_cos();
        let (sin_dec0, cos_dec0) = self.crval[1].to_radians().sin_cos();
        let (sin_dra, cos_dra) = (ra - self.crval[0].to_radians()).sin_cos();

        let d = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_dra;
        // behind the tangent plane
        if d <= 0.0 {
            return None;
        }
        let xi = (cos_dec * sin_dra / d).to_degrees();
        let eta = ((sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_dra) / d).to_degrees();

        let det = self.determinant();
        let dx = (self.cd[1][1] * xi - self.cd[0][1] * eta) / det;
        let dy = (-self.cd[1][0] * xi + self.cd[0][0] * eta) / det;
        Some([self.crpix[0] + dx, self.crpix[1] + dy])
    }

    fn pixel_scale(&self) -> f64 {
        self.determinant().abs().sqrt()
    }

    fn linear_matrix(&self) -> [f64; 4] {
        [self.cd[0][0], self.cd[0][1], self.cd[1][0], self.cd[1][1]]
    }
}

/// True when any corner or the centre of either image lands inside the other.
pub fn has_overlap(a: &dyn Wcs, a_size: (f64, f64), b: &dyn Wcs, b_size: (f64, f64)) -> bool {
    if !a.is_valid() || !b.is_valid() {
        return false;
    }
    fn lands_inside(from: &dyn Wcs, from_size: (f64, f64), to: &dyn Wcs, to_size: (f64, f64)) -> bool {
        let (w, h) = from_size;
        [[0.0, 0.0], [w, 0.0], [0.0, h], [w, h], [w / 2.0, h / 2.0]]
            .into_iter()
            .filter_map(|pixel| from.pix_to_world(pixel))
            .filter_map(|world| to.world_to_pix(world))
            .any(|[x, y]| x >= 0.0 && x <= to_size.0 && y >= 0.0 && y <= to_size.1)
    }
    lands_inside(a, a_size, b, b_size) || lands_inside(b, b_size, a, a_size)
}

/// Transform mapping pixels of `reference` onto the pixels of `target` that
/// see the same sky. Exact at `anchor` (a reference pixel); elsewhere it
/// relies on both solutions sharing one tangent plane.
pub fn relative_pixel_transform(
    reference: &dyn Wcs,
    target: &dyn Wcs,
    anchor: DVec2,
) -> Option<Transform> {
    let world = reference.pix_to_world(anchor.to_array())?;
    let target_anchor = DVec2::from_array(target.world_to_pix(world)?);

    let [r11, r12, r21, r22] = reference.linear_matrix();
    let [t11, t12, t21, t22] = target.linear_matrix();
    let det = t11 * t22 - t12 * t21;
    if det.abs() < f64::MIN_POSITIVE || !det.is_finite() {
        return None;
    }
    let (i11, i12, i21, i22) = (t22 / det, -t12 / det, -t21 / det, t11 / det);

    // CD_target⁻¹ · CD_reference
    let m11 = i11 * r11 + i12 * r21;
    let m12 = i11 * r12 + i12 * r22;
    let m21 = i21 * r11 + i22 * r21;
    let m22 = i21 * r12 + i22 * r22;

    // column-major: a = m11, b = m21, c = m12, d = m22
    let linear = Transform::new(m11, m21, m12, m22, 0.0, 0.0);
    let offset = target_anchor - linear.apply(anchor);
    Some(Transform::from_linear(linear.linear(), offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wcs(crpix: [f64; 2], crval: [f64; 2], scale: f64, rotation: f64) -> TanWcs {
        let (sin, cos) = rotation.to_radians().sin_cos();
        TanWcs::new(
            crpix,
            crval,
            [[-scale * cos, scale * sin], [scale * sin, scale * cos]],
        )
    }

    #[test]
    fn pixel_world_round_trip() {
        let w = wcs([512.0, 512.0], [150.0, 30.0], 1.0 / 3600.0, 20.0);
        assert!(w.is_valid());

        let center = w.pix_to_world([512.0, 512.0]).unwrap();
        assert!((center[0] - 10.0).abs() < 1e-12);
        assert!((center[1] - 30.0).abs() < 1e-12);

        let world = w.pix_to_world([100.0, 900.0]).unwrap();
        let pixel = w.world_to_pix(world).unwrap();
        assert!((pixel[0] - 100.0).abs() < 1e-6);
        assert!((pixel[1] - 900.0).abs() < 1e-6);
    }

    #[test]
    fn singular_matrix_is_invalid() {
        let w = TanWcs::new([0.0, 0.0], [0.0, 0.0], [[0.0, 0.0], [0.0, 0.0]]);
        assert!(!w.is_valid());
        assert!(w.pix_to_world([1.0, 1.0]).is_none());
    }

    #[test]
    fn relative_transform_matches_sky_at_and_near_anchor() {
        let reference = wcs([500.0, 500.0], [150.0, 30.0], 1.0 / 3600.0, 0.0);
        let target = wcs([480.0, 530.0], [150.002, 29.999], 0.8 / 3600.0, 35.0);
        let anchor = DVec2::new(520.0, 470.0);

        let m = relative_pixel_transform(&reference, &target, anchor).unwrap();

        for pixel in [anchor, anchor + DVec2::new(15.0, -8.0)] {
            let expected = target
                .world_to_pix(reference.pix_to_world(pixel.to_array()).unwrap())
                .unwrap();
            let actual = m.apply(pixel);
            assert!((actual - DVec2::from_array(expected)).length() < 1e-3);
        }
    }

    #[test]
    fn overlap_detection() {
        let a = wcs([50.0, 50.0], [10.0, 0.0], 1.0 / 3600.0, 0.0);
        let near = wcs([50.0, 50.0], [10.01, 0.0], 1.0 / 3600.0, 0.0);
        let far = wcs([50.0, 50.0], [40.0, 20.0], 1.0 / 3600.0, 0.0);
        assert!(has_overlap(&a, (100.0, 100.0), &near, (100.0, 100.0)));
        assert!(!has_overlap(&a, (100.0, 100.0), &far, (100.0, 100.0)));
    }
}
