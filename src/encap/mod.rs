use std::fmt::Debug;

use nalgebra::DMatrix;
use num_traits::Zero;

use crate::Scalar;

mod vector;

pub use vector::{VectorEncap, VectorFactory};

/// Opaque carrier of the solution state at one quadrature node.
///
/// The framework never looks inside an encapsulation; everything it needs is
/// expressed through this capability set plus the flat wire representation
/// used by the time-parallel communicators.
pub trait Encapsulation<T: Scalar>: Clone + Debug {
    /// Set the state to zero.
    fn zero(&mut self);

    /// Overwrite this state with another of the same shape.
    fn copy_from(&mut self, other: &Self);

    /// `self <- self + a * x`.
    fn axpy(&mut self, a: T, x: &Self);

    /// Infinity norm over all degrees of freedom.
    fn norm_inf(&self) -> T;

    /// Number of scalars in the wire representation.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append the wire representation to `buf`.
    fn pack(&self, buf: &mut Vec<T>);

    /// Restore the state from a wire representation produced by [`pack`].
    ///
    /// [`pack`]: Encapsulation::pack
    fn unpack(&mut self, buf: &[T]);

    /// `dst_n <- (zero ? 0 : dst_n) + a * sum_m mat[n, m] * src_m`.
    fn mat_apply(dst: &mut [Self], a: T, mat: &DMatrix<T>, src: &[Self], zero: bool)
    where
        Self: Sized,
    {
        if zero {
            for d in dst.iter_mut() {
                d.zero();
            }
        }
        for (n, d) in dst.iter_mut().enumerate() {
            for (m, s) in src.iter().enumerate() {
                let w = a * mat[(n, m)];
                if !w.is_zero() {
                    d.axpy(w, s);
                }
            }
        }
    }
}

/// Produces freshly zeroed encapsulations of a fixed size and shape.
pub trait EncapFactory<T: Scalar> {
    type Encap: Encapsulation<T>;

    fn create(&self) -> Self::Encap;

    /// Degrees of freedom of the produced encapsulations.
    fn dofs(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn test_mat_apply_default() {
        let factory = VectorFactory::<f64>::new(2);
        let mut a = factory.create();
        let mut b = factory.create();
        a.0[0] = 1.0;
        a.0[1] = 2.0;
        b.0[0] = -1.0;
        b.0[1] = 0.5;

        let mat = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 0.0, 3.0]);
        let mut dst = vec![factory.create(), factory.create()];
        let src = vec![a, b];
        Encapsulation::mat_apply(&mut dst, 2.0, &mat, &src, true);

        // dst_0 = 2 * (src_0 + 2 src_1), dst_1 = 2 * 3 src_1
        assert_eq!(dst[0].0[0], 2.0 * (1.0 - 2.0));
        assert_eq!(dst[0].0[1], 2.0 * (2.0 + 1.0));
        assert_eq!(dst[1].0[0], -6.0);
        assert_eq!(dst[1].0[1], 3.0);
    }
}
