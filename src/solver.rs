//! Per-frequency LU solution of the assembled power-balance systems.
//!
//! Every frequency's system is independent, so the sweep runs in parallel
//! with rayon and the solutions are collected back in grid order; the order
//! of completion never affects the result. A singular or indeterminate
//! system at any frequency aborts the whole solve with the offending cavity
//! tag and frequency index.

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, Array2};
use rayon::prelude::*;

use crate::assemble::{assemble, conductance, System};
use crate::error::{Error, Result};
use crate::model::{Endpoint, Model};

/// Relative threshold on the LU U-diagonal below which the factorization is
/// treated as numerically singular.
const SINGULARITY_RATIO: f64 = 1e-12;

/// Immutable snapshot of a solved model: steady-state energy densities,
/// one row per frequency, one column per cavity in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub energy_density: Array2<f64>,
}

impl Solution {
    /// Energy density of one cavity across the grid [J m^-3].
    pub fn cavity_density(&self, handle: usize) -> Array1<f64> {
        self.energy_density.column(handle).to_owned()
    }
}

/// Solves the model's power-balance system at every grid frequency.
pub fn solve(model: &Model) -> Result<Solution> {
    let n = model.cavities().len();
    if n == 0 {
        return Err(Error::config("model has no cavities to solve"));
    }
    let nf = model.grid().len();

    let pb = ProgressBar::new(nf as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>5}/{len:5} {msg}",
        )
        .unwrap()
        .progress_chars("█▇▆▅▄▃▂▁"),
    );
    pb.set_message("frequency");

    let rows: Vec<Array1<f64>> = (0..nf)
        .into_par_iter()
        .map(|k| {
            let row = solve_at(model, k);
            pb.inc(1);
            row
        })
        .collect::<Result<Vec<_>>>()?;
    pb.finish_and_clear();

    let mut energy_density = Array2::zeros((nf, n));
    for (k, row) in rows.into_iter().enumerate() {
        energy_density.row_mut(k).assign(&row);
    }
    Ok(Solution { energy_density })
}

/// Solves the system at one frequency index.
fn solve_at(model: &Model, k: usize) -> Result<Array1<f64>> {
    let freq = model.grid().freqs()[k];
    let System { a, b } = assemble(model, k);
    let n = b.len();

    // A zero diagonal is a diagnosable topology defect, not a numerical
    // accident: no loss path means the row cannot determine its density.
    for i in 0..n {
        if a[(i, i)] == 0.0 {
            let tag = &model.cavities()[i].tag;
            let reason = if b[i] == 0.0 {
                format!(
                    "cavity '{}' has zero total decay rate and no injected power (undetermined)",
                    tag
                )
            } else {
                format!(
                    "cavity '{}' has zero total decay rate but {} W injected (unbounded)",
                    tag, b[i]
                )
            };
            return Err(Error::Solver {
                freq_index: k,
                freq,
                reason,
            });
        }
    }

    let lu = a.lu();
    let u = lu.u();
    let mut min_diag = f64::INFINITY;
    let mut max_diag = 0.0_f64;
    for i in 0..n {
        let d = u[(i, i)].abs();
        min_diag = min_diag.min(d);
        max_diag = max_diag.max(d);
    }
    if min_diag <= SINGULARITY_RATIO * max_diag {
        return Err(Error::Solver {
            freq_index: k,
            freq,
            reason: "singular balance matrix (a cavity is isolated from every source)".into(),
        });
    }

    let x = lu.solve(&b).ok_or_else(|| Error::Solver {
        freq_index: k,
        freq,
        reason: "LU back-substitution failed".into(),
    })?;
    Ok(Array1::from_iter(x.iter().copied()))
}

/// Energy-conservation diagnostic: per frequency, the relative mismatch
/// between total injected power and the total dissipated in walls and
/// absorbers plus leakage to the exterior. Inter-cavity aperture flows
/// cancel identically and do not appear.
pub fn conservation_error(model: &Model) -> Result<Array1<f64>> {
    let solution = model.solution()?;
    let nf = model.grid().len();
    let mut err = Array1::zeros(nf);

    for k in 0..nf {
        let mut injected = 0.0;
        for source in model.sources() {
            injected += source.power[k];
        }
        let mut dissipated = 0.0;
        for (i, cavity) in model.cavities().iter().enumerate() {
            dissipated += conductance(cavity.wall.ccs[k]) * solution.energy_density[(k, i)];
        }
        for absorber in model.absorbers() {
            dissipated += conductance(absorber.params.ccs[k])
                * solution.energy_density[(k, absorber.cavity)];
        }
        for aperture in model.apertures() {
            if aperture.cavity_b == Endpoint::Exterior {
                dissipated += conductance(aperture.tcs()[k])
                    * solution.energy_density[(k, aperture.cavity_a)];
            }
        }
        err[k] = if injected > 0.0 {
            (injected - dissipated).abs() / injected
        } else {
            dissipated.abs()
        };
    }
    Ok(err)
}
