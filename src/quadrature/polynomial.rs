use nalgebra::{Complex, ComplexField};
use num_traits::{One, Zero};

use crate::Scalar;

/// Dense polynomial `c0 + c1 x + ... + cn x^n` over a real scalar type.
///
/// Derived polynomials (derivative, antiderivative, normalization) are new
/// objects; coefficients are never mutated through a shared handle.
#[derive(Clone, Debug, PartialEq)]
pub struct Polynomial<T> {
    coeffs: Vec<T>,
}

impl<T: Scalar> Polynomial<T> {
    /// A zero polynomial of the given order (`order + 1` coefficients).
    pub fn new(order: usize) -> Self {
        Self {
            coeffs: vec![T::zero(); order + 1],
        }
    }

    pub fn from_coeffs(coeffs: Vec<T>) -> Self {
        assert!(!coeffs.is_empty(), "polynomial needs at least one coefficient");
        Self { coeffs }
    }

    pub fn order(&self) -> usize {
        self.coeffs.len() - 1
    }

    pub fn coeffs(&self) -> &[T] {
        &self.coeffs
    }

    pub fn coeff(&self, i: usize) -> T {
        self.coeffs[i]
    }

    pub fn coeff_mut(&mut self, i: usize) -> &mut T {
        &mut self.coeffs[i]
    }

    /// Evaluate with Horner's rule, O(n).
    pub fn evaluate(&self, x: T) -> T {
        let n = self.coeffs.len() - 1;
        let mut v = self.coeffs[n];
        for j in (0..n).rev() {
            v = x * v + self.coeffs[j];
        }
        v
    }

    fn evaluate_complex(&self, z: Complex<T>) -> Complex<T> {
        let n = self.coeffs.len() - 1;
        let mut v = Complex::new(self.coeffs[n], T::zero());
        for j in (0..n).rev() {
            v = z * v + Complex::new(self.coeffs[j], T::zero());
        }
        v
    }

    /// Derivative, one order lower (coefficient `j * c_j` at index `j - 1`).
    pub fn differentiate(&self) -> Self {
        if self.coeffs.len() == 1 {
            return Self::new(0);
        }
        let mut p = Self::new(self.order() - 1);
        for j in 1..self.coeffs.len() {
            p.coeffs[j - 1] = <T as Scalar>::from_usize(j) * self.coeffs[j];
        }
        p
    }

    /// Antiderivative with zero constant term, one order higher
    /// (coefficient `c_j / (j + 1)` at index `j + 1`).
    pub fn integrate(&self) -> Self {
        let mut p = Self::new(self.order() + 1);
        for j in 0..self.coeffs.len() {
            p.coeffs[j + 1] = self.coeffs[j] / <T as Scalar>::from_usize(j + 1);
        }
        p
    }

    fn normalized(&self) -> Self {
        let lead = self.coeffs[self.coeffs.len() - 1];
        let mut p = self.clone();
        for c in p.coeffs.iter_mut() {
            *c /= lead;
        }
        p
    }

    /// Real parts of all roots, ascending, via Durand-Kerner-Weierstrass
    /// iteration on the normalized polynomial.
    ///
    /// Runs at most 100 rounds and stops once the summed update falls below
    /// 1e-24. Non-convergence is logged and the best estimate returned.
    pub fn roots(&self) -> Vec<T> {
        let n = self.order();
        if n == 0 {
            return Vec::new();
        }
        let p = self.normalized();

        // initial guesses z_k = (0.4 + 0.9i)^k
        let seed = Complex::new(<T as Scalar>::from_f64(0.4), <T as Scalar>::from_f64(0.9));
        let mut z0 = Vec::with_capacity(n);
        let mut acc = Complex::new(T::one(), T::zero());
        for _ in 0..n {
            z0.push(acc);
            acc = acc * seed;
        }
        let mut z1 = z0.clone();

        let tol = <T as Scalar>::from_f64(1e-24);
        let mut converged = false;
        for _ in 0..100 {
            for i in 0..n {
                let num = p.evaluate_complex(z0[i]);
                let mut den = Complex::new(T::one(), T::zero());
                for j in 0..n {
                    if j != i {
                        den = den * (z0[i] - z0[j]);
                    }
                }
                z0[i] = z0[i] - num / den;
            }

            let mut change = T::zero();
            for j in 0..n {
                change += modulus(z0[j] - z1[j]);
            }
            if change <= tol {
                converged = true;
                break;
            }
            z1.copy_from_slice(&z0);
        }
        if !converged {
            tracing::warn!(order = n, "root finder did not converge, using best estimate");
        }

        let snap = <T as Scalar>::from_f64(1e-12);
        let mut roots: Vec<T> = z0
            .iter()
            .map(|z| if modulus(*z) < snap { T::zero() } else { z.re })
            .collect();
        roots.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        roots
    }

    /// Legendre polynomial of the given order from the three-term recurrence
    /// `(n + 1) P_{n+1} = (2n + 1) x P_n - n P_{n-1}`.
    pub fn legendre(order: usize) -> Self {
        if order == 0 {
            return Self::from_coeffs(vec![T::one()]);
        }
        if order == 1 {
            return Self::from_coeffs(vec![T::zero(), T::one()]);
        }

        let mut p0 = Self::new(order);
        let mut p1 = Self::new(order);
        let mut p2 = Self::new(order);
        p0.coeffs[0] = T::one();
        p1.coeffs[1] = T::one();

        for m in 1..order {
            let a = <T as Scalar>::from_usize(2 * m + 1);
            let b = <T as Scalar>::from_usize(m);
            let c = <T as Scalar>::from_usize(m + 1);
            for j in 1..=order {
                p2.coeffs[j] = (a * p1.coeffs[j - 1] - b * p0.coeffs[j]) / c;
            }
            p2.coeffs[0] = -b * p0.coeffs[0] / c;

            for j in 0..=order {
                p0.coeffs[j] = p1.coeffs[j];
                p1.coeffs[j] = p2.coeffs[j];
            }
        }
        p2
    }
}

fn modulus<T: Scalar>(z: Complex<T>) -> T {
    (z.re * z.re + z.im * z.im).sqrt()
}

#[cfg(test)]
mod tests {
    use super::Polynomial;

    #[test]
    fn test_legendre_polys() {
        let l0 = Polynomial::<f64>::legendre(0);
        assert_eq!(l0.order(), 0);
        assert_eq!(l0.coeff(0), 1.0);

        let l1 = Polynomial::<f64>::legendre(1);
        assert_eq!(l1.order(), 1);
        assert_eq!(l1.coeffs(), &[0.0, 1.0]);

        let l2 = Polynomial::<f64>::legendre(2);
        assert_eq!(l2.coeffs(), &[-0.5, 0.0, 1.5]);

        let l2d = l2.differentiate();
        assert_eq!(l2d.coeffs(), &[0.0, 3.0]);

        let l2i = l2.integrate();
        assert_eq!(l2i.coeffs(), &[0.0, -0.5, 0.0, 0.5]);

        assert_eq!(l2.evaluate(1.0), 1.0);
    }

    #[test]
    fn test_differentiate_integrate_roundtrip() {
        let p = Polynomial::<f64>::from_coeffs(vec![3.0, -1.0, 2.0, 0.5]);

        // d/dx of the antiderivative recovers p exactly
        let q = p.integrate().differentiate();
        for (a, b) in p.coeffs().iter().zip(q.coeffs()) {
            assert!((a - b).abs() < 1e-15);
        }

        // antiderivative of the derivative loses the constant term
        let r = p.differentiate().integrate();
        assert!(r.coeff(0).abs() < 1e-15);
        for j in 1..=p.order() {
            assert!((r.coeff(j) - p.coeff(j)).abs() < 1e-15);
        }
    }

    #[test]
    fn test_quadratic_roots() {
        // (x - 2)(x + 3) = x^2 + x - 6
        let p = Polynomial::<f64>::from_coeffs(vec![-6.0, 1.0, 1.0]);
        let roots = p.roots();
        assert_eq!(roots.len(), 2);
        assert!((roots[0] + 3.0).abs() < 1e-10);
        assert!((roots[1] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_legendre_roots_real_simple() {
        for n in 1..=7usize {
            let roots = Polynomial::<f64>::legendre(n).roots();
            assert_eq!(roots.len(), n);
            for w in roots.windows(2) {
                assert!(w[1] > w[0] + 1e-8, "roots not simple for n={}", n);
            }
            for r in &roots {
                assert!(*r > -1.0 && *r < 1.0);
            }
        }
    }
}
