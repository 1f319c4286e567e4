use nalgebra::RealField;

pub type IndexType = usize;

/// Floating point type underlying all node positions, quadrature weights and
/// state coefficients. `f64` and `f32` both qualify; extended precision types
/// work as long as they implement [`nalgebra::RealField`].
pub trait Scalar: RealField + Copy + Default + 'static {
    fn from_f64(value: f64) -> Self {
        nalgebra::convert(value)
    }

    fn from_usize(value: usize) -> Self {
        nalgebra::convert(value as f64)
    }

    /// Lossy conversion used for diagnostics and file output only.
    fn to_f64(self) -> f64 {
        nalgebra::try_convert(self).unwrap_or(f64::NAN)
    }
}

impl<T> Scalar for T where T: RealField + Copy + Default + 'static {}

#[cfg(test)]
mod tests {
    use super::Scalar;

    #[test]
    fn test_conversions() {
        assert_eq!(<f64 as Scalar>::from_f64(0.5), 0.5);
        assert_eq!(<f32 as Scalar>::from_f64(0.5), 0.5f32);
        assert_eq!(<f64 as Scalar>::from_usize(3), 3.0);
        assert_eq!(0.25f64.to_f64(), 0.25);
    }
}
