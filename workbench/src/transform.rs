use glam::{DAffine2, DVec2};
use serde::{Deserialize, Serialize};

const SINGULAR_DETERMINANT: f64 = 1e-12;

/// 2D affine transform, `x' = a·x + c·y + tx`, `y' = b·x + d·y + ty`.
///
/// Every builder method applies the new operation in the output space of the
/// existing transform, i.e. `t.translate(dx, dy)` first maps through `t` and
/// then shifts the result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transform(DAffine2);

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform(DAffine2::IDENTITY);

    pub fn new(a: f64, b: f64, c: f64, d: f64, tx: f64, ty: f64) -> Self {
        Self(DAffine2::from_cols_array(&[a, b, c, d, tx, ty]))
    }

    pub fn from_translation(dx: f64, dy: f64) -> Self {
        Self(DAffine2::from_translation(DVec2::new(dx, dy)))
    }

    /// Linear part `[a, b, c, d]` plus offset `tx, ty`.
    pub fn from_linear(linear: [f64; 4], offset: DVec2) -> Self {
        let [a, b, c, d] = linear;
        Self::new(a, b, c, d, offset.x, offset.y)
    }

    /// `[a, b, c, d, tx, ty]`
    pub fn coefficients(&self) -> [f64; 6] {
        self.0.to_cols_array()
    }

    pub fn linear(&self) -> [f64; 4] {
        let [a, b, c, d, _, _] = self.coefficients();
        [a, b, c, d]
    }

    pub fn translation(&self) -> DVec2 {
        self.0.translation
    }

    pub fn translate(self, dx: f64, dy: f64) -> Self {
        Self(DAffine2::from_translation(DVec2::new(dx, dy)) * self.0)
    }

    /// Uniform scale about `anchor`; `anchor` keeps its position.
    pub fn scale_by(self, factor: f64, anchor: DVec2) -> Self {
        let about = DAffine2::from_translation(anchor)
            * DAffine2::from_scale(DVec2::splat(factor))
            * DAffine2::from_translation(-anchor);
        Self(about * self.0)
    }

    pub fn rotate_by(self, degrees: f64, anchor: DVec2) -> Self {
        let about = DAffine2::from_translation(anchor)
            * DAffine2::from_angle(degrees.to_radians())
            * DAffine2::from_translation(-anchor);
        Self(about * self.0)
    }

    /// Mirrors across the horizontal line through `anchor`.
    pub fn flip_y(self, anchor: DVec2) -> Self {
        let about = DAffine2::from_translation(anchor)
            * DAffine2::from_scale(DVec2::new(1.0, -1.0))
            * DAffine2::from_translation(-anchor);
        Self(about * self.0)
    }

    /// `self ∘ inner`: applies `inner` first.
    pub fn compose(&self, inner: &Transform) -> Transform {
        Transform(self.0 * inner.0)
    }

    pub fn determinant(&self) -> f64 {
        self.0.matrix2.determinant()
    }

    pub fn invert(&self) -> Option<Transform> {
        if !self.determinant().is_finite() || self.determinant().abs() < SINGULAR_DETERMINANT {
            return None;
        }
        Some(Transform(self.0.inverse()))
    }

    pub fn apply(&self, point: DVec2) -> DVec2 {
        self.0.transform_point2(point)
    }

    /// Geometric mean of the axis scales.
    pub fn scale(&self) -> f64 {
        self.determinant().abs().sqrt()
    }

    pub fn approx_eq(&self, other: &Transform, tolerance: f64) -> bool {
        self.coefficients()
            .iter()
            .zip(other.coefficients().iter())
            .all(|(lhs, rhs)| (lhs - rhs).abs() <= tolerance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> DVec2 {
        DVec2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn bounding(points: impl IntoIterator<Item = DVec2>) -> Option<Region> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Region::new(min.x, min.y, max.x - min.x, max.y - min.y))
    }

    /// Clamps the region into `[0, width] x [0, height]`.
    pub fn clamp_to(&self, width: f64, height: f64) -> Region {
        let x1 = self.x.clamp(0.0, width);
        let y1 = self.y.clamp(0.0, height);
        let x2 = (self.x + self.width).clamp(0.0, width);
        let y2 = (self.y + self.height).clamp(0.0, height);
        Region::new(x1, y1, x2 - x1, y2 - y1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportSize {
    pub width: f64,
    pub height: f64,
}

impl ViewportSize {
    pub fn center(&self) -> DVec2 {
        DVec2::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Image pixels are mapped by `image_transform` (orientation: flip, rotation)
/// and then by `viewport_transform` (pan and zoom) onto the screen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transformation {
    pub image_transform: Transform,
    pub viewport_transform: Transform,
    pub viewport_size: Option<ViewportSize>,
    /// Set once the transform has been fitted to its image.
    #[serde(default)]
    pub initialized: bool,
}

impl Transformation {
    pub fn image_to_viewport(&self) -> Transform {
        self.viewport_transform.compose(&self.image_transform)
    }

    pub fn viewport_to_image(&self) -> Option<Transform> {
        self.image_to_viewport().invert()
    }

    /// Image pixel currently under the viewport centre.
    pub fn viewport_center_pixel(&self) -> Option<DVec2> {
        let size = self.viewport_size?;
        Some(self.viewport_to_image()?.apply(size.center()))
    }

    /// Image-space bounding box of the visible viewport.
    pub fn viewport_region(&self) -> Option<Region> {
        let size = self.viewport_size?;
        let to_image = self.viewport_to_image()?;
        Region::bounding(
            [
                DVec2::new(0.0, 0.0),
                DVec2::new(size.width, 0.0),
                DVec2::new(0.0, size.height),
                DVec2::new(size.width, size.height),
            ]
            .into_iter()
            .map(|corner| to_image.apply(corner)),
        )
    }

    /// Sets the viewport transform so `region` is centred and fully visible.
    pub fn fit_region(&mut self, region: &Region) -> bool {
        let Some(size) = self.viewport_size else {
            return false;
        };
        if region.width <= 0.0 || region.height <= 0.0 {
            return false;
        }
        let scale = (size.width / region.width).min(size.height / region.height);
        let anchor = self.image_transform.apply(region.center());
        let center = size.center();
        self.viewport_transform = Transform::new(
            scale,
            0.0,
            0.0,
            scale,
            center.x - scale * anchor.x,
            center.y - scale * anchor.y,
        );
        true
    }

    /// Flips the image so row 0 is at the bottom and fits it into the viewport.
    pub fn reset(&mut self, image_size: Option<(f64, f64)>) {
        self.image_transform = match image_size {
            Some((_, height)) => Transform::new(1.0, 0.0, 0.0, -1.0, 0.0, height),
            None => Transform::IDENTITY,
        };
        self.viewport_transform = Transform::IDENTITY;
        if let Some((width, height)) = image_size {
            self.fit_region(&Region::new(0.0, 0.0, width, height));
        }
        self.initialized = true;
    }

    pub fn move_by(&mut self, dx: f64, dy: f64) {
        self.viewport_transform = self.viewport_transform.translate(dx, dy);
    }

    /// Zooms around a point given in viewport coordinates.
    pub fn zoom_by(&mut self, factor: f64, viewport_anchor: Option<DVec2>) {
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        let anchor = viewport_anchor
            .or_else(|| self.viewport_size.map(|size| size.center()))
            .unwrap_or(DVec2::ZERO);
        self.viewport_transform = self.viewport_transform.scale_by(factor, anchor);
    }

    pub fn zoom_to(&mut self, scale: f64, viewport_anchor: Option<DVec2>) {
        let current = self.viewport_transform.scale();
        if current <= 0.0 {
            return;
        }
        self.zoom_by(scale / current, viewport_anchor);
    }

    pub fn rotate_by(&mut self, degrees: f64, image_size: Option<(f64, f64)>) {
        let anchor = self.orientation_anchor(image_size);
        self.image_transform = self.image_transform.rotate_by(degrees, anchor);
    }

    pub fn flip(&mut self, image_size: Option<(f64, f64)>) {
        let anchor = self.orientation_anchor(image_size);
        self.image_transform = self.image_transform.flip_y(anchor);
    }

    // Point in oriented-image space that should stay put while rotating or
    // flipping: the one under the viewport centre, else the image centre.
    fn orientation_anchor(&self, image_size: Option<(f64, f64)>) -> DVec2 {
        if let Some(size) = self.viewport_size {
            if let Some(to_oriented) = self.viewport_transform.invert() {
                return to_oriented.apply(size.center());
            }
        }
        match image_size {
            Some((width, height)) => self
                .image_transform
                .apply(DVec2::new(width / 2.0, height / 2.0)),
            None => DVec2::ZERO,
        }
    }
}
