use std::fmt;
use std::str::FromStr;

use nalgebra::{ComplexField, DMatrix, DVector, RealField};
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use crate::{errors::SdcError, Scalar};

pub mod polynomial;

use polynomial::Polynomial;

/// Named quadrature node families on [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuadratureType {
    GaussLegendre,
    GaussLobatto,
    GaussRadau,
    ClenshawCurtis,
    Uniform,
}

impl QuadratureType {
    pub fn left_is_node(&self) -> bool {
        matches!(
            self,
            QuadratureType::GaussLobatto | QuadratureType::ClenshawCurtis | QuadratureType::Uniform
        )
    }

    pub fn right_is_node(&self) -> bool {
        !matches!(self, QuadratureType::GaussLegendre)
    }

    pub fn name(&self) -> &'static str {
        match self {
            QuadratureType::GaussLegendre => "gauss-legendre",
            QuadratureType::GaussLobatto => "gauss-lobatto",
            QuadratureType::GaussRadau => "gauss-radau",
            QuadratureType::ClenshawCurtis => "clenshaw-curtis",
            QuadratureType::Uniform => "uniform",
        }
    }

    fn min_nodes(&self) -> usize {
        match self {
            QuadratureType::GaussLegendre | QuadratureType::GaussRadau => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for QuadratureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QuadratureType {
    type Err = SdcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauss-legendre" => Ok(QuadratureType::GaussLegendre),
            "gauss-lobatto" => Ok(QuadratureType::GaussLobatto),
            "gauss-radau" => Ok(QuadratureType::GaussRadau),
            "clenshaw-curtis" => Ok(QuadratureType::ClenshawCurtis),
            "uniform" => Ok(QuadratureType::Uniform),
            _ => Err(SdcError::UnknownQuadratureType(s.to_string())),
        }
    }
}

/// Compute the node positions for `num_nodes` nodes of the given family.
pub fn compute_nodes<T: Scalar>(
    qtype: QuadratureType,
    num_nodes: usize,
) -> Result<Vec<T>, SdcError> {
    if num_nodes < qtype.min_nodes() {
        return Err(SdcError::InvalidNodeCount {
            quad_type: qtype.name().to_string(),
            num_nodes,
        });
    }

    let half = <T as Scalar>::from_f64(0.5);
    let mut nodes = match qtype {
        QuadratureType::GaussLegendre => Polynomial::<T>::legendre(num_nodes)
            .roots()
            .into_iter()
            .map(|x| half * (T::one() + x))
            .collect::<Vec<_>>(),
        QuadratureType::GaussLobatto => {
            let mut nodes = vec![T::zero(); num_nodes];
            let interior = Polynomial::<T>::legendre(num_nodes - 1)
                .differentiate()
                .roots();
            for (j, x) in interior.into_iter().enumerate() {
                nodes[j + 1] = half * (T::one() + x);
            }
            nodes[num_nodes - 1] = T::one();
            nodes
        }
        QuadratureType::GaussRadau => {
            // right-sided Radau nodes are the roots of P_{n-1} - P_n,
            // which include the right endpoint
            let pn = Polynomial::<T>::legendre(num_nodes);
            let pn1 = Polynomial::<T>::legendre(num_nodes - 1);
            let mut diff = Polynomial::<T>::new(num_nodes);
            for j in 0..=num_nodes {
                let lo = if j < pn1.coeffs().len() {
                    pn1.coeff(j)
                } else {
                    T::zero()
                };
                *diff.coeff_mut(j) = lo - pn.coeff(j);
            }
            let mut nodes: Vec<T> = diff
                .roots()
                .into_iter()
                .map(|x| half * (T::one() + x))
                .collect();
            nodes[num_nodes - 1] = T::one();
            nodes
        }
        QuadratureType::ClenshawCurtis => (0..num_nodes)
            .map(|k| {
                let theta = <T as Scalar>::from_usize(k) * T::pi() / <T as Scalar>::from_usize(num_nodes - 1);
                half * (T::one() - theta.cos())
            })
            .collect(),
        QuadratureType::Uniform => (0..num_nodes)
            .map(|k| <T as Scalar>::from_usize(k) / <T as Scalar>::from_usize(num_nodes - 1))
            .collect(),
    };

    if qtype.left_is_node() {
        nodes[0] = T::zero();
    }
    for w in nodes.windows(2) {
        if w[1] <= w[0] {
            return Err(SdcError::NonIncreasingNodes);
        }
    }
    Ok(nodes)
}

/// Node positions together with the integration matrices of the underlying
/// collocation problem.
///
/// `q[m, j]` approximates the integral from 0 to node m, `s` holds the first
/// row-differences of `q` (zero first row), and `qq`/`ss` are the analogues
/// for the iterated integral used by velocity-position sweepers. `q_end`
/// integrates all the way to 1 for node families whose right endpoint is not
/// a node.
#[derive(Clone, Debug)]
pub struct Quadrature<T: Scalar> {
    qtype: QuadratureType,
    nodes: Vec<T>,
    q: DMatrix<T>,
    s: DMatrix<T>,
    qq: DMatrix<T>,
    ss: DMatrix<T>,
    q_end: DVector<T>,
}

impl<T: Scalar> Quadrature<T> {
    pub fn new(qtype: QuadratureType, num_nodes: usize) -> Result<Self, SdcError> {
        let nodes = compute_nodes::<T>(qtype, num_nodes)?;

        let (q, q_end) = assemble_q(&nodes);
        let s = row_differences(&q);
        let qq = &q * &q;
        let ss = row_differences(&qq);

        Ok(Self {
            qtype,
            nodes,
            q,
            s,
            qq,
            ss,
            q_end,
        })
    }

    pub fn qtype(&self) -> QuadratureType {
        self.qtype
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[T] {
        &self.nodes
    }

    pub fn node(&self, m: usize) -> T {
        self.nodes[m]
    }

    /// Spacing to the previous node; for the first node the distance from
    /// the left interval end.
    pub fn node_spacing(&self, m: usize) -> T {
        if m == 0 {
            self.nodes[0]
        } else {
            self.nodes[m] - self.nodes[m - 1]
        }
    }

    pub fn left_is_node(&self) -> bool {
        self.qtype.left_is_node()
    }

    pub fn right_is_node(&self) -> bool {
        self.qtype.right_is_node()
    }

    pub fn q(&self) -> &DMatrix<T> {
        &self.q
    }

    pub fn s(&self) -> &DMatrix<T> {
        &self.s
    }

    pub fn qq(&self) -> &DMatrix<T> {
        &self.qq
    }

    pub fn ss(&self) -> &DMatrix<T> {
        &self.ss
    }

    pub fn q_end(&self) -> &DVector<T> {
        &self.q_end
    }
}

/// Q[m, i] = integral over [0, node_m] of the i-th Lagrange basis polynomial
/// through all nodes; q_end integrates the basis to 1.
fn assemble_q<T: Scalar>(nodes: &[T]) -> (DMatrix<T>, DVector<T>) {
    let n = nodes.len();
    let mut q = DMatrix::<T>::zeros(n, n);
    let mut q_end = DVector::<T>::zeros(n);

    for i in 0..n {
        // numerator polynomial prod_{m != i} (x - node_m)
        let mut p = Polynomial::from_coeffs(vec![T::one()]);
        for (m, &node) in nodes.iter().enumerate() {
            if m == i {
                continue;
            }
            let mut next = Polynomial::new(p.order() + 1);
            for j in 0..=p.order() {
                *next.coeff_mut(j + 1) += p.coeff(j);
                *next.coeff_mut(j) -= p.coeff(j) * node;
            }
            p = next;
        }
        let den = p.evaluate(nodes[i]);
        let p_int = p.integrate();
        for m in 0..n {
            q[(m, i)] = p_int.evaluate(nodes[m]) / den;
        }
        q_end[i] = p_int.evaluate(T::one()) / den;
    }
    (q, q_end)
}

fn row_differences<T: Scalar>(q: &DMatrix<T>) -> DMatrix<T> {
    let n = q.nrows();
    let mut s = DMatrix::<T>::zeros(n, n);
    for m in 1..n {
        for j in 0..n {
            s[(m, j)] = q[(m, j)] - q[(m - 1, j)];
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TYPES: [QuadratureType; 5] = [
        QuadratureType::GaussLegendre,
        QuadratureType::GaussLobatto,
        QuadratureType::GaussRadau,
        QuadratureType::ClenshawCurtis,
        QuadratureType::Uniform,
    ];

    fn assert_nodes_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "node {} vs {}", a, e);
        }
    }

    #[test]
    fn test_gauss_legendre_nodes() {
        let l3 = compute_nodes::<f64>(QuadratureType::GaussLegendre, 3).unwrap();
        assert_nodes_close(&l3, &[0.11270166537925831, 0.5, 0.8872983346207417]);

        let l5 = compute_nodes::<f64>(QuadratureType::GaussLegendre, 5).unwrap();
        assert_nodes_close(
            &l5,
            &[
                0.046910077030668004,
                0.23076534494715845,
                0.5,
                0.7692346550528415,
                0.953089922969332,
            ],
        );

        let l7 = compute_nodes::<f64>(QuadratureType::GaussLegendre, 7).unwrap();
        assert_nodes_close(
            &l7,
            &[
                0.025446043828620736,
                0.12923440720030277,
                0.2970774243113014,
                0.5,
                0.7029225756886985,
                0.8707655927996972,
                0.9745539561713793,
            ],
        );
    }

    #[test]
    fn test_gauss_lobatto_nodes() {
        let l2 = compute_nodes::<f64>(QuadratureType::GaussLobatto, 2).unwrap();
        assert_nodes_close(&l2, &[0.0, 1.0]);

        let l3 = compute_nodes::<f64>(QuadratureType::GaussLobatto, 3).unwrap();
        assert_nodes_close(&l3, &[0.0, 0.5, 1.0]);

        let l5 = compute_nodes::<f64>(QuadratureType::GaussLobatto, 5).unwrap();
        assert_nodes_close(
            &l5,
            &[0.0, 0.17267316464601143, 0.5, 0.8273268353539885, 1.0],
        );

        let l7 = compute_nodes::<f64>(QuadratureType::GaussLobatto, 7).unwrap();
        assert_nodes_close(
            &l7,
            &[
                0.0,
                0.08488805186071653,
                0.2655756032646429,
                0.5,
                0.7344243967353571,
                0.9151119481392834,
                1.0,
            ],
        );
    }

    #[test]
    fn test_gauss_radau_nodes() {
        let r2 = compute_nodes::<f64>(QuadratureType::GaussRadau, 2).unwrap();
        assert_nodes_close(&r2, &[1.0 / 3.0, 1.0]);

        let r3 = compute_nodes::<f64>(QuadratureType::GaussRadau, 3).unwrap();
        // right-sided Radau nodes for n = 3
        assert_nodes_close(
            &r3,
            &[0.15505102572168217, 0.6449489742783178, 1.0],
        );
    }

    #[test]
    fn test_clenshaw_curtis_nodes() {
        let cc5 = compute_nodes::<f64>(QuadratureType::ClenshawCurtis, 5).unwrap();
        assert_nodes_close(
            &cc5,
            &[
                0.0,
                0.14644660940672623,
                0.5,
                0.8535533905932737,
                1.0,
            ],
        );
    }

    #[test]
    fn test_uniform_nodes() {
        let u5 = compute_nodes::<f64>(QuadratureType::Uniform, 5).unwrap();
        assert_nodes_close(&u5, &[0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_nodes_increasing_and_endpoint_flags() {
        for qtype in ALL_TYPES {
            for n in 2..=9usize {
                let quad = Quadrature::<f64>::new(qtype, n).unwrap();
                let nodes = quad.nodes();
                for w in nodes.windows(2) {
                    assert!(w[1] > w[0]);
                }
                assert_eq!(nodes[0] == 0.0, qtype.left_is_node(), "{} {}", qtype, n);
                assert_eq!(
                    nodes[n - 1] == 1.0,
                    qtype.right_is_node(),
                    "{} {}",
                    qtype,
                    n
                );
            }
        }
    }

    #[test]
    fn test_q_row_sum_and_s_rows() {
        for qtype in ALL_TYPES {
            for n in 2..=9usize {
                let quad = Quadrature::<f64>::new(qtype, n).unwrap();
                if qtype.right_is_node() {
                    let last: f64 = quad.q().row(n - 1).sum();
                    assert!((last - 1.0).abs() < 1e-10, "{} {}: {}", qtype, n, last);
                }
                // S is the first difference of Q with a zero first row, and
                // its rows sum to the node spacings
                for j in 0..n {
                    assert_eq!(quad.s()[(0, j)], 0.0);
                }
                for m in 1..n {
                    let row: f64 = quad.s().row(m).sum();
                    let spacing = quad.node(m) - quad.node(m - 1);
                    assert!((row - spacing).abs() < 1e-10);
                    for j in 0..n {
                        let diff = quad.q()[(m, j)] - quad.q()[(m - 1, j)];
                        assert!((quad.s()[(m, j)] - diff).abs() < 1e-14);
                    }
                }
            }
        }
    }

    #[test]
    fn test_polynomial_exactness() {
        // Gauss-Legendre integrates degree <= 2N - 1 exactly, Gauss-Lobatto
        // degree <= 2N - 3, right Radau degree <= 2N - 2
        let cases = [
            (QuadratureType::GaussLegendre, -1i64),
            (QuadratureType::GaussLobatto, -3),
            (QuadratureType::GaussRadau, -2),
        ];
        for (qtype, offset) in cases {
            for n in 2..=9usize {
                let quad = Quadrature::<f64>::new(qtype, n).unwrap();
                let max_degree = (2 * n as i64 + offset) as usize;
                for d in 0..=max_degree {
                    let mut approx = 0.0;
                    for j in 0..n {
                        approx += quad.q_end()[j] * quad.node(j).powi(d as i32);
                    }
                    let exact = 1.0 / (d as f64 + 1.0);
                    assert!(
                        (approx - exact).abs() < 1e-12,
                        "{} n={} degree {}: {} vs {}",
                        qtype,
                        n,
                        d,
                        approx,
                        exact
                    );
                }
            }
        }
    }

    #[test]
    fn test_q_end_matches_last_row_when_right_is_node() {
        for qtype in ALL_TYPES {
            if !qtype.right_is_node() {
                continue;
            }
            let quad = Quadrature::<f64>::new(qtype, 5).unwrap();
            for j in 0..5 {
                assert!((quad.q_end()[j] - quad.q()[(4, j)]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_invalid_configurations() {
        assert!(matches!(
            Quadrature::<f64>::new(QuadratureType::GaussLobatto, 1),
            Err(SdcError::InvalidNodeCount { .. })
        ));
        assert!(matches!(
            Quadrature::<f64>::new(QuadratureType::Uniform, 0),
            Err(SdcError::InvalidNodeCount { .. })
        ));
        assert!(matches!(
            "gauss-hermite".parse::<QuadratureType>(),
            Err(SdcError::UnknownQuadratureType(_))
        ));
        assert_eq!(
            "clenshaw-curtis".parse::<QuadratureType>().unwrap(),
            QuadratureType::ClenshawCurtis
        );
    }
}
