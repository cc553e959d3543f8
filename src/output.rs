//! Reportable quantities derived from a solved model.
//!
//! Queries are read-only, addressed by element kind, tag and a fixed
//! quantity vocabulary per kind, and fail if the model has not been solved
//! (or was mutated since). Stored parameters (ACS, AE, TCS, TE, Q, decay
//! rate, time constant) are returned unchanged; powers are derived from the
//! solved energy densities as `P = c0 * CS * u`.

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use itertools::Itertools;
use ndarray::Array1;

use crate::assemble::conductance;
use crate::error::{Error, Result};
use crate::model::{Endpoint, Model};

/// Kind of element addressed by an output query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Cavity,
    Absorber,
    Source,
    Aperture,
}

/// One reported quantity: per-frequency values plus unit metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub name: String,
    pub values: Array1<f64>,
    pub unit: &'static str,
}

impl Quantity {
    fn new(name: &str, values: Array1<f64>, unit: &'static str) -> Self {
        Self {
            name: name.to_string(),
            values,
            unit,
        }
    }
}

/// Looks up quantities of one element on a solved model.
///
/// Vocabulary: cavities report `powerDensity`, `wallACS`, `wallPower`,
/// `totalDecayRate`, `totalTimeConst`, `totalQ`; absorbers `ACS`, `AE`,
/// `absorbedPower`, `Q`, `decayRate`, `timeConst`; apertures `TCS`, `TE`,
/// `Q`, `decayRate`, `timeConst`, `powerAB`, `powerBA`; sources `power`.
/// An unknown tag or quantity name is a query error.
pub fn get_output(
    model: &Model,
    kind: ElementKind,
    tag: &str,
    names: &[&str],
) -> Result<Vec<Quantity>> {
    let solution = model.solution()?;

    names
        .iter()
        .map(|&name| match kind {
            ElementKind::Cavity => {
                let (handle, cavity) = model
                    .cavity_by_tag(tag)
                    .ok_or_else(|| Error::query(format!("unknown cavity '{}'", tag)))?;
                let u = solution.cavity_density(handle);
                match name {
                    "powerDensity" => Ok(Quantity::new(name, u, "J m^-3")),
                    "wallACS" => Ok(Quantity::new(name, cavity.wall.ccs.clone(), "m^2")),
                    "wallPower" => {
                        let p = cavity.wall.ccs.mapv(conductance) * &u;
                        Ok(Quantity::new(name, p, "W"))
                    }
                    "totalDecayRate" => Ok(Quantity::new(
                        name,
                        total_conductance(model, handle) / cavity.volume,
                        "s^-1",
                    )),
                    "totalTimeConst" => {
                        let gamma = total_conductance(model, handle) / cavity.volume;
                        Ok(Quantity::new(name, gamma.mapv(|g| 1.0 / g), "s"))
                    }
                    "totalQ" => {
                        let gamma = total_conductance(model, handle) / cavity.volume;
                        let q = model.grid().freqs() * std::f64::consts::TAU / &gamma;
                        Ok(Quantity::new(name, q, "-"))
                    }
                    other => Err(unknown_quantity("cavity", tag, other)),
                }
            }
            ElementKind::Absorber => {
                let absorber = model
                    .absorber_by_tag(tag)
                    .ok_or_else(|| Error::query(format!("unknown absorber '{}'", tag)))?;
                let params = &absorber.params;
                match name {
                    "ACS" => Ok(Quantity::new(name, params.ccs.clone(), "m^2")),
                    "AE" => Ok(Quantity::new(name, absorber.ae.clone(), "-")),
                    "absorbedPower" => {
                        let u = solution.cavity_density(absorber.cavity);
                        let p = params.ccs.mapv(conductance) * &u;
                        Ok(Quantity::new(name, p, "W"))
                    }
                    "Q" => Ok(Quantity::new(name, params.q.clone(), "-")),
                    "decayRate" => Ok(Quantity::new(name, params.decay_rate.clone(), "s^-1")),
                    "timeConst" => Ok(Quantity::new(name, params.time_const.clone(), "s")),
                    other => Err(unknown_quantity("absorber", tag, other)),
                }
            }
            ElementKind::Source => {
                let source = model
                    .source_by_tag(tag)
                    .ok_or_else(|| Error::query(format!("unknown source '{}'", tag)))?;
                match name {
                    "power" => Ok(Quantity::new(name, source.power.clone(), "W")),
                    other => Err(unknown_quantity("source", tag, other)),
                }
            }
            ElementKind::Aperture => {
                let aperture = model
                    .aperture_by_tag(tag)
                    .ok_or_else(|| Error::query(format!("unknown aperture '{}'", tag)))?;
                let params = &aperture.params_a;
                match name {
                    "TCS" => Ok(Quantity::new(name, params.ccs.clone(), "m^2")),
                    "TE" => Ok(Quantity::new(name, aperture.te.clone(), "-")),
                    "Q" => Ok(Quantity::new(name, params.q.clone(), "-")),
                    "decayRate" => Ok(Quantity::new(name, params.decay_rate.clone(), "s^-1")),
                    "timeConst" => Ok(Quantity::new(name, params.time_const.clone(), "s")),
                    "powerAB" => {
                        let u = solution.cavity_density(aperture.cavity_a);
                        let p = params.ccs.mapv(conductance) * &u;
                        Ok(Quantity::new(name, p, "W"))
                    }
                    "powerBA" => {
                        let p = match aperture.cavity_b {
                            Endpoint::Cavity(j) => {
                                let u = solution.cavity_density(j);
                                params.ccs.mapv(conductance) * &u
                            }
                            // the exterior is a zero-density sink
                            Endpoint::Exterior => Array1::zeros(model.grid().len()),
                        };
                        Ok(Quantity::new(name, p, "W"))
                    }
                    other => Err(unknown_quantity("aperture", tag, other)),
                }
            }
        })
        .collect()
}

fn unknown_quantity(kind: &str, tag: &str, name: &str) -> Error {
    Error::query(format!(
        "unknown quantity '{}' for {} '{}'",
        name, kind, tag
    ))
}

/// Total loss conductance stamped on a cavity's diagonal, per frequency.
fn total_conductance(model: &Model, handle: usize) -> Array1<f64> {
    let mut g = model.cavities()[handle].wall.ccs.mapv(conductance);
    for absorber in model.absorbers() {
        if absorber.cavity == handle {
            g = g + absorber.params.ccs.mapv(conductance);
        }
    }
    for aperture in model.apertures() {
        let touches =
            aperture.cavity_a == handle || aperture.cavity_b == Endpoint::Cavity(handle);
        if touches {
            g = g + aperture.params_a.ccs.mapv(conductance);
        }
    }
    g
}

/// Writes one column file per element to `dir`: frequency, then each
/// quantity of that element's vocabulary.
pub fn writeup(model: &Model, dir: &str) -> Result<()> {
    model.solution()?;
    create_dir_all(dir)
        .map_err(|e| Error::data(format!("cannot create output directory {}: {}", dir, e)))?;

    for cavity in model.cavities() {
        let quantities = get_output(
            model,
            ElementKind::Cavity,
            &cavity.tag,
            &[
                "powerDensity",
                "wallACS",
                "wallPower",
                "totalDecayRate",
                "totalQ",
            ],
        )?;
        write_table(model, dir, &cavity.tag, &quantities)?;
    }
    for absorber in model.absorbers() {
        let quantities = get_output(
            model,
            ElementKind::Absorber,
            &absorber.tag,
            &["ACS", "AE", "absorbedPower", "Q", "decayRate", "timeConst"],
        )?;
        write_table(model, dir, &absorber.tag, &quantities)?;
    }
    for aperture in model.apertures() {
        let quantities = get_output(
            model,
            ElementKind::Aperture,
            &aperture.tag,
            &["TCS", "TE", "powerAB", "powerBA"],
        )?;
        write_table(model, dir, &aperture.tag, &quantities)?;
    }
    Ok(())
}

fn write_table(model: &Model, dir: &str, tag: &str, quantities: &[Quantity]) -> Result<()> {
    let path = Path::new(dir).join(format!("{}_{}.dat", model.name(), tag));
    let file = File::create(&path)
        .map_err(|e| Error::data(format!("cannot create {}: {}", path.display(), e)))?;
    let mut writer = BufWriter::new(file);

    let io_err = |e: std::io::Error| Error::data(format!("write to {}: {}", path.display(), e));

    let header = quantities
        .iter()
        .map(|q| format!("{} [{}]", q.name, q.unit))
        .join("  ");
    writeln!(writer, "# freq [Hz]  {}", header).map_err(io_err)?;

    for (k, &f) in model.grid().freqs().iter().enumerate() {
        write!(writer, "{:.6e}", f).map_err(io_err)?;
        for q in quantities {
            write!(writer, " {:.6e}", q.values[k]).map_err(io_err)?;
        }
        writeln!(writer).map_err(io_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::FrequencyGrid;
    use crate::model::SourceSpec;
    use crate::xsection::{AbsorberSpec, WallSpec};
    use approx::assert_relative_eq;

    fn solved_model() -> Model {
        let grid = FrequencyGrid::linspace(1e9, 2e9, 3).unwrap();
        let mut model = Model::new(grid, "out");
        model.add_cavity("c", 6.0, 1.0, &WallSpec::Lossless).unwrap();
        model
            .add_absorber(
                "abs",
                "c",
                1,
                &AbsorberSpec::Surface {
                    area: 1.0,
                    ae: vec![1.0],
                },
            )
            .unwrap();
        model
            .add_source("src", &SourceSpec::Power { power: vec![1.0] }, "c")
            .unwrap();
        model.solve().unwrap();
        model
    }

    #[test]
    fn query_before_solve_fails() {
        let grid = FrequencyGrid::linspace(1e9, 2e9, 3).unwrap();
        let mut model = Model::new(grid, "unsolved");
        model.add_cavity("c", 6.0, 1.0, &WallSpec::Lossless).unwrap();

        let err = get_output(&model, ElementKind::Cavity, "c", &["powerDensity"]).unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }

    #[test]
    fn unknown_quantity_fails() {
        let model = solved_model();
        let err = get_output(&model, ElementKind::Absorber, "abs", &["bogus"]).unwrap_err();
        assert!(matches!(err, Error::Query(_)));
        let err =
            get_output(&model, ElementKind::Cavity, "missing", &["powerDensity"]).unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }

    #[test]
    fn absorbed_power_matches_injected() {
        let model = solved_model();
        let out = get_output(
            &model,
            ElementKind::Absorber,
            "abs",
            &["absorbedPower", "ACS", "AE"],
        )
        .unwrap();
        for k in 0..3 {
            assert_relative_eq!(out[0].values[k], 1.0, max_relative = 1e-9);
            assert_relative_eq!(out[1].values[k], 0.25, max_relative = 1e-12);
            assert_relative_eq!(out[2].values[k], 1.0, max_relative = 1e-12);
        }
        assert_eq!(out[0].unit, "W");
        assert_eq!(out[1].unit, "m^2");
    }

    #[test]
    fn writeup_creates_tables() {
        let model = solved_model();
        let dir = tempfile::tempdir().unwrap();
        writeup(&model, dir.path().to_str().unwrap()).unwrap();
        assert!(dir.path().join("out_c.dat").exists());
        assert!(dir.path().join("out_abs.dat").exists());
    }
}
