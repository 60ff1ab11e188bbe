pub trait FloatExt {
    fn approximately_eq(self, other: Self) -> bool;
    fn approx_eq_within(self, other: Self, tolerance: Self) -> bool;
    /// Wraps an angle in degrees into `[0, 360)`.
    fn wrap_degrees(self) -> Self;
}

impl FloatExt for f64 {
    fn approximately_eq(self, other: Self) -> bool {
        self.approx_eq_within(other, crate::EPSILON)
    }

    fn approx_eq_within(self, other: Self, tolerance: Self) -> bool {
        (self - other).abs() < tolerance
    }

    fn wrap_degrees(self) -> Self {
        let wrapped = self.rem_euclid(360.0);
        if wrapped >= 360.0 {
            0.0
        } else {
            wrapped
        }
    }
}
