use nalgebra::{ComplexField, DVector};
use num_traits::{One, Zero};

use super::{EncapFactory, Encapsulation};
use crate::Scalar;

/// Dense vector state backed by [`nalgebra::DVector`]; the encapsulation used
/// by all mesh- and mode-based problems.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorEncap<T: Scalar>(pub DVector<T>);

impl<T: Scalar> VectorEncap<T> {
    pub fn from_vec(values: Vec<T>) -> Self {
        Self(DVector::from_vec(values))
    }

    pub fn zeros(n: usize) -> Self {
        Self(DVector::zeros(n))
    }

    pub fn assert_close(&self, other: &Self, tol: T) {
        assert_eq!(self.0.len(), other.0.len());
        for i in 0..self.0.len() {
            let diff = self.0[i] - other.0[i];
            assert!(
                diff.abs() <= tol,
                "element {} differs: {:?} vs {:?}",
                i,
                self.0[i],
                other.0[i]
            );
        }
    }
}

impl<T: Scalar> Encapsulation<T> for VectorEncap<T> {
    fn zero(&mut self) {
        self.0.fill(T::zero());
    }

    fn copy_from(&mut self, other: &Self) {
        self.0.copy_from(&other.0);
    }

    fn axpy(&mut self, a: T, x: &Self) {
        self.0.axpy(a, &x.0, T::one());
    }

    fn norm_inf(&self) -> T {
        let mut max = T::zero();
        for v in self.0.iter() {
            let abs = v.abs();
            if abs > max {
                max = abs;
            }
        }
        max
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn pack(&self, buf: &mut Vec<T>) {
        buf.extend_from_slice(self.0.as_slice());
    }

    fn unpack(&mut self, buf: &[T]) {
        debug_assert_eq!(buf.len(), self.0.len());
        self.0.copy_from_slice(buf);
    }
}

/// Factory for zeroed dense vector states of a fixed length.
#[derive(Clone, Debug)]
pub struct VectorFactory<T: Scalar> {
    dofs: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Scalar> VectorFactory<T> {
    pub fn new(dofs: usize) -> Self {
        Self {
            dofs,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Scalar> EncapFactory<T> for VectorFactory<T> {
    type Encap = VectorEncap<T>;

    fn create(&self) -> VectorEncap<T> {
        VectorEncap::zeros(self.dofs)
    }

    fn dofs(&self) -> usize {
        self.dofs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axpy_and_norm() {
        let mut y = VectorEncap::from_vec(vec![1.0, -2.0, 0.0]);
        let x = VectorEncap::from_vec(vec![2.0, 1.0, -1.0]);
        y.axpy(0.5, &x);
        assert_eq!(y.0.as_slice(), &[2.0, -1.5, -0.5]);
        assert_eq!(y.norm_inf(), 2.0);
    }

    #[test]
    fn test_pack_unpack() {
        let src = VectorEncap::from_vec(vec![1.5, 2.5, -3.0]);
        let mut buf = Vec::new();
        src.pack(&mut buf);
        assert_eq!(buf, vec![1.5, 2.5, -3.0]);

        let mut dst = VectorEncap::zeros(3);
        dst.unpack(&buf);
        assert_eq!(dst, src);
    }

    #[test]
    fn test_factory_zeroed() {
        let factory = VectorFactory::<f64>::new(4);
        let e = factory.create();
        assert_eq!(e.len(), 4);
        assert_eq!(e.norm_inf(), 0.0);
    }
}
