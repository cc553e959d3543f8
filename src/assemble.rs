//! Per-frequency assembly of the power-balance linear system.
//!
//! The system is kept in power units: the unknowns are steady-state energy
//! densities `u` [J m^-3] and a channel with cross-section `CS` removes
//! `c0 * CS * u` watts from its cavity, so
//!
//! ```text
//! A[i][i] = sum of c0 * (wall ACS + absorber ACS + aperture TCS) on i
//! A[i][j] = -c0 * TCS(i, j)   for a direct aperture, else 0
//! b[i]    = sum of injected source power on i   [W]
//! ```
//!
//! The exterior is a zero-density boundary, so apertures to `EXT` stamp only
//! the diagonal. Off-diagonal symmetry makes aperture reciprocity explicit;
//! the directional decay rates follow by dividing each row by its cavity
//! volume.

use nalgebra::{DMatrix, DVector};

use crate::model::{Endpoint, Model};
use crate::settings::C0;

/// Dense system `A u = b` at one frequency index.
#[derive(Debug, Clone, PartialEq)]
pub struct System {
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
}

/// Loss conductance `c0 * CS` of one channel entry; an infinite
/// cross-section is the lossless idealization and stamps nothing.
#[inline]
pub fn conductance(cs: f64) -> f64 {
    if cs.is_infinite() {
        0.0
    } else {
        C0 * cs
    }
}

/// Builds the energy-conservation system for frequency index `k` by direct
/// traversal of the model graph.
pub fn assemble(model: &Model, k: usize) -> System {
    let n = model.cavities().len();
    let mut a = DMatrix::<f64>::zeros(n, n);
    let mut b = DVector::<f64>::zeros(n);

    for (i, cavity) in model.cavities().iter().enumerate() {
        a[(i, i)] += conductance(cavity.wall.ccs[k]);
    }
    for absorber in model.absorbers() {
        let i = absorber.cavity;
        a[(i, i)] += conductance(absorber.params.ccs[k]);
    }
    for aperture in model.apertures() {
        let i = aperture.cavity_a;
        let g = conductance(aperture.tcs()[k]);
        a[(i, i)] += g;
        if let Endpoint::Cavity(j) = aperture.cavity_b {
            a[(j, j)] += g;
            a[(i, j)] -= g;
            a[(j, i)] -= g;
        }
    }
    for source in model.sources() {
        b[source.cavity] += source.power[k];
    }

    System { a, b }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::FrequencyGrid;
    use crate::model::SourceSpec;
    use crate::xsection::{AbsorberSpec, ApertureSpec, WallSpec};
    use approx::assert_relative_eq;

    fn two_cavity_model() -> Model {
        let grid = FrequencyGrid::linspace(1e9, 2e9, 2).unwrap();
        let mut model = Model::new(grid, "asm");
        model
            .add_cavity("a", 6.0, 1.0, &WallSpec::Acs { acs: vec![0.1] })
            .unwrap();
        model.add_cavity("b", 6.0, 2.0, &WallSpec::Lossless).unwrap();
        model
            .add_absorber(
                "abs",
                "a",
                2,
                &AbsorberSpec::Acs {
                    acs: vec![0.05],
                    ae: None,
                },
            )
            .unwrap();
        model
            .add_aperture(
                "ap",
                "a",
                "b",
                &ApertureSpec::Tcs {
                    tcs: vec![0.2],
                    te: None,
                },
            )
            .unwrap();
        model
            .add_aperture(
                "leak",
                "b",
                "EXT",
                &ApertureSpec::Tcs {
                    tcs: vec![0.3],
                    te: None,
                },
            )
            .unwrap();
        model
            .add_source("src", &SourceSpec::Power { power: vec![2.0] }, "a")
            .unwrap();
        model
    }

    #[test]
    fn stamps_match_topology() {
        let model = two_cavity_model();
        let System { a, b } = assemble(&model, 0);

        // diag: wall + multiplicity-scaled absorber + aperture
        assert_relative_eq!(a[(0, 0)], C0 * (0.1 + 0.1 + 0.2), max_relative = 1e-12);
        // lossless wall stamps nothing; inter-cavity + EXT apertures remain
        assert_relative_eq!(a[(1, 1)], C0 * (0.2 + 0.3), max_relative = 1e-12);
        // symmetric off-diagonal coupling
        assert_relative_eq!(a[(0, 1)], -C0 * 0.2, max_relative = 1e-12);
        assert_relative_eq!(a[(1, 0)], -C0 * 0.2, max_relative = 1e-12);
        // sources on the right-hand side only
        assert_relative_eq!(b[0], 2.0, max_relative = 1e-12);
        assert_eq!(b[1], 0.0);
    }

    #[test]
    fn ext_aperture_is_diagonal_only() {
        let model = two_cavity_model();
        let System { a, .. } = assemble(&model, 1);
        // the EXT leak appears nowhere off the diagonal
        assert_relative_eq!(a[(0, 1)], -C0 * 0.2, max_relative = 1e-12);
        assert_relative_eq!(a[(1, 1)] - C0 * 0.2, C0 * 0.3, max_relative = 1e-9);
    }
}
