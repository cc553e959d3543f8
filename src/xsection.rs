//! Cross-section providers for walls, absorbers and apertures.
//!
//! Each physical model is one variant of a closed enum carrying its own
//! parameter payload; the provider is a pure function
//! `(frequencies, params) -> (cross-section, efficiency)` with both arrays
//! aligned to the model's frequency grid. Scalar parameters broadcast if
//! given as length 1.
//!
//! The diffuse-field rule for a planar channel of physical area `A` and
//! efficiency `e` is `CS = e * A / 4`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::Command;

use ndarray::Array1;
use ndarray_interp::interp1d::Interp1D;
use num_complex::Complex64;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::settings::C0;

/// Broadcasts a parameter vector along the frequency axis: length 1 repeats,
/// length `n` passes through, anything else is a configuration error.
pub(crate) fn broadcast(values: &[f64], n: usize, what: &str) -> Result<Array1<f64>> {
    match values.len() {
        1 => Ok(Array1::from_elem(n, values[0])),
        len if len == n => Ok(Array1::from_vec(values.to_vec())),
        len => Err(Error::config(format!(
            "{} must have length 1 or {} (the frequency grid length), got {}",
            what, n, len
        ))),
    }
}

fn check_area(area: f64, what: &str) -> Result<()> {
    if !area.is_finite() || area <= 0.0 {
        return Err(Error::config(format!(
            "{} must be positive and finite, got {}",
            what, area
        )));
    }
    Ok(())
}

fn check_efficiency(values: &Array1<f64>, what: &str) -> Result<()> {
    for &v in values.iter() {
        if !(0.0..=1.0).contains(&v) {
            return Err(Error::config(format!(
                "{} must lie in [0, 1], got {}",
                what, v
            )));
        }
    }
    Ok(())
}

/// Wall loss model of a cavity. The cavity's own surface area is supplied by
/// the builder.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum WallSpec {
    /// Idealized lossless walls: infinite cross-section, zero decay rate.
    Lossless,
    /// Diffuse-field surface loss with the given wall absorption efficiency.
    Surface { ae: Vec<f64> },
    /// Directly specified wall absorption cross-section [m^2].
    Acs { acs: Vec<f64> },
    /// Tabulated wall ACS interpolated onto the model grid.
    File { path: PathBuf },
}

impl WallSpec {
    /// Per-frequency wall absorption cross-section for a cavity of surface
    /// area `area`.
    pub fn wall_acs(&self, freqs: &Array1<f64>, area: f64) -> Result<Array1<f64>> {
        let n = freqs.len();
        match self {
            WallSpec::Lossless => Ok(Array1::from_elem(n, f64::INFINITY)),
            WallSpec::Surface { ae } => {
                let ae = broadcast(ae, n, "wall AE")?;
                check_efficiency(&ae, "wall AE")?;
                Ok(ae * (area / 4.0))
            }
            WallSpec::Acs { acs } => {
                let acs = broadcast(acs, n, "wall ACS")?;
                check_positive(&acs, "wall ACS")?;
                Ok(acs)
            }
            WallSpec::File { path } => load_tabulated(path, freqs),
        }
    }
}

/// Physical model of a lumped absorber. Providers return `(ACS, AE)` per
/// frequency, before multiplicity scaling.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum AbsorberSpec {
    /// Directly specified absorption cross-section [m^2] and efficiency.
    /// An omitted efficiency defaults to 1.
    Acs { acs: Vec<f64>, ae: Option<Vec<f64>> },
    /// Diffuse-field planar absorber of physical area `area` [m^2].
    Surface { area: f64, ae: Vec<f64> },
    /// Tabulated ACS interpolated onto the model grid. When the physical
    /// area is known the efficiency is recovered as `4 ACS / area`.
    File { path: PathBuf, area: Option<f64> },
    /// Layered sphere evaluated by an external Mie solver, one invocation
    /// per frequency. `radii` are layer radii ordered outer to inner;
    /// `refr_index` holds one complex refractive index per layer with
    /// non-negative imaginary part.
    Mie {
        command: String,
        radii: Vec<f64>,
        refr_index: Vec<Complex64>,
    },
}

impl AbsorberSpec {
    pub fn cross_section(&self, freqs: &Array1<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        let n = freqs.len();
        match self {
            AbsorberSpec::Acs { acs, ae } => {
                let acs = broadcast(acs, n, "absorber ACS")?;
                check_positive(&acs, "absorber ACS")?;
                check_finite(&acs, "absorber ACS")?;
                let ae = match ae {
                    Some(ae) => {
                        let ae = broadcast(ae, n, "absorber AE")?;
                        check_efficiency(&ae, "absorber AE")?;
                        ae
                    }
                    None => Array1::ones(n),
                };
                Ok((acs, ae))
            }
            AbsorberSpec::Surface { area, ae } => {
                check_area(*area, "absorber area")?;
                let ae = broadcast(ae, n, "absorber AE")?;
                check_efficiency(&ae, "absorber AE")?;
                let acs = &ae * (area / 4.0);
                Ok((acs, ae))
            }
            AbsorberSpec::File { path, area } => {
                let acs = load_tabulated(path, freqs)?;
                let ae = match area {
                    Some(area) => {
                        check_area(*area, "absorber area")?;
                        acs.mapv(|a| 4.0 * a / area)
                    }
                    None => Array1::ones(n),
                };
                Ok((acs, ae))
            }
            AbsorberSpec::Mie {
                command,
                radii,
                refr_index,
            } => mie_cross_section(command, radii, refr_index, freqs),
        }
    }
}

/// Physical model of a coupling aperture. Providers return `(TCS, TE)` per
/// frequency; the cross-section is shared by both coupling directions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum ApertureSpec {
    /// Directly specified transmission cross-section [m^2] and efficiency.
    /// An omitted efficiency defaults to 1.
    Tcs { tcs: Vec<f64>, te: Option<Vec<f64>> },
    /// Diffuse-field opening of physical area `area` [m^2].
    Opening { area: f64, te: Vec<f64> },
    /// Tabulated TCS interpolated onto the model grid.
    File { path: PathBuf, area: Option<f64> },
}

impl ApertureSpec {
    pub fn cross_section(&self, freqs: &Array1<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        let n = freqs.len();
        match self {
            ApertureSpec::Tcs { tcs, te } => {
                let tcs = broadcast(tcs, n, "aperture TCS")?;
                check_positive(&tcs, "aperture TCS")?;
                check_finite(&tcs, "aperture TCS")?;
                let te = match te {
                    Some(te) => {
                        let te = broadcast(te, n, "aperture TE")?;
                        check_efficiency(&te, "aperture TE")?;
                        te
                    }
                    None => Array1::ones(n),
                };
                Ok((tcs, te))
            }
            ApertureSpec::Opening { area, te } => {
                check_area(*area, "aperture area")?;
                let te = broadcast(te, n, "aperture TE")?;
                check_efficiency(&te, "aperture TE")?;
                let tcs = &te * (area / 4.0);
                Ok((tcs, te))
            }
            ApertureSpec::File { path, area } => {
                let tcs = load_tabulated(path, freqs)?;
                let te = match area {
                    Some(area) => {
                        check_area(*area, "aperture area")?;
                        tcs.mapv(|t| 4.0 * t / area)
                    }
                    None => Array1::ones(n),
                };
                Ok((tcs, te))
            }
        }
    }
}

fn check_positive(values: &Array1<f64>, what: &str) -> Result<()> {
    for &v in values.iter() {
        if v.is_nan() || v < 0.0 {
            return Err(Error::config(format!(
                "{} must be non-negative, got {}",
                what, v
            )));
        }
    }
    Ok(())
}

// Infinite cross-sections are the lossless-wall convention; an element
// cross-section must stay finite so it stamps a finite conductance.
fn check_finite(values: &Array1<f64>, what: &str) -> Result<()> {
    for &v in values.iter() {
        if v.is_infinite() {
            return Err(Error::config(format!("{} must be finite", what)));
        }
    }
    Ok(())
}

/// Loads a two-column tabulated cross-section file (frequency [Hz]
/// ascending, value) and interpolates it linearly onto the model grid.
/// Lines starting with `#` or `%` and blank lines are ignored. The file's
/// span must cover the model grid.
pub fn load_tabulated(path: &PathBuf, freqs: &Array1<f64>) -> Result<Array1<f64>> {
    let file = File::open(path)
        .map_err(|e| Error::data(format!("cannot open {}: {}", path.display(), e)))?;
    let reader = BufReader::new(file);

    let mut xs: Vec<f64> = Vec::new();
    let mut ys: Vec<f64> = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line =
            line.map_err(|e| Error::data(format!("read error in {}: {}", path.display(), e)))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('%') {
            continue;
        }
        let mut cols = trimmed.split_whitespace();
        let parse = |tok: Option<&str>| -> Result<f64> {
            tok.and_then(|t| t.parse::<f64>().ok()).ok_or_else(|| {
                Error::data(format!(
                    "{}:{}: expected two numeric columns, got '{}'",
                    path.display(),
                    lineno + 1,
                    trimmed
                ))
            })
        };
        let x = parse(cols.next())?;
        let y = parse(cols.next())?;
        if let Some(&last) = xs.last() {
            if x <= last {
                return Err(Error::data(format!(
                    "{}:{}: frequencies must be strictly ascending",
                    path.display(),
                    lineno + 1
                )));
            }
        }
        xs.push(x);
        ys.push(y);
    }

    if xs.len() < 2 {
        return Err(Error::data(format!(
            "{}: need at least two data rows, got {}",
            path.display(),
            xs.len()
        )));
    }
    if xs[0] > freqs[0] || *xs.last().unwrap() < freqs[freqs.len() - 1] {
        return Err(Error::data(format!(
            "{}: span [{}, {}] Hz does not cover the model grid [{}, {}] Hz",
            path.display(),
            xs[0],
            xs.last().unwrap(),
            freqs[0],
            freqs[freqs.len() - 1]
        )));
    }

    let interp = Interp1D::builder(Array1::from_vec(ys))
        .x(Array1::from_vec(xs))
        .build()
        .map_err(|e| Error::data(format!("{}: {}", path.display(), e)))?;
    interp
        .interp_array(freqs)
        .map_err(|e| Error::data(format!("{}: {}", path.display(), e)))
}

/// Invokes the external Mie solver once per frequency and collects the
/// absorption efficiency of a layered sphere.
///
/// The solver receives, for each layer in reversed (inner-to-outer input)
/// order: radius [m], size parameter and the complex refractive index as two
/// arguments. It must print a single absorption efficiency on stdout.
fn mie_cross_section(
    command: &str,
    radii: &[f64],
    refr_index: &[Complex64],
    freqs: &Array1<f64>,
) -> Result<(Array1<f64>, Array1<f64>)> {
    if radii.is_empty() {
        return Err(Error::config("Mie absorber needs at least one layer"));
    }
    if refr_index.len() != radii.len() {
        return Err(Error::config(format!(
            "Mie absorber has {} layer radii but {} refractive indices",
            radii.len(),
            refr_index.len()
        )));
    }
    for w in radii.windows(2) {
        if w[1] >= w[0] {
            return Err(Error::config(
                "Mie layer radii must be strictly decreasing (outer to inner)",
            ));
        }
    }
    if radii[radii.len() - 1] <= 0.0 {
        return Err(Error::config("Mie layer radii must be positive"));
    }
    for m in refr_index {
        if m.im < 0.0 {
            return Err(Error::config(format!(
                "Mie refractive index must have non-negative imaginary part, got {}",
                m
            )));
        }
    }

    let outer = radii[0];
    let geom_cs = std::f64::consts::PI * outer * outer;
    let mut ae = Array1::zeros(freqs.len());

    for (k, &f) in freqs.iter().enumerate() {
        let wavenumber = std::f64::consts::TAU * f / C0;
        let mut cmd = Command::new(command);
        for (r, m) in radii.iter().rev().zip(refr_index.iter().rev()) {
            cmd.arg(r.to_string())
                .arg((wavenumber * r).to_string())
                .arg(m.re.to_string())
                .arg(m.im.to_string());
        }
        let output = cmd
            .output()
            .map_err(|e| Error::data(format!("Mie solver '{}' failed to run: {}", command, e)))?;
        if !output.status.success() {
            return Err(Error::data(format!(
                "Mie solver '{}' exited with {} at frequency index {}",
                command, output.status, k
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let q_abs: f64 = stdout.trim().parse().map_err(|_| {
            Error::data(format!(
                "Mie solver '{}' returned malformed efficiency '{}' at frequency index {}",
                command,
                stdout.trim(),
                k
            ))
        })?;
        ae[k] = q_abs;
    }

    let acs = &ae * geom_cs;
    Ok((acs, ae))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use std::io::Write;

    #[test]
    fn broadcast_shapes() {
        assert_eq!(broadcast(&[2.0], 3, "x").unwrap(), array![2.0, 2.0, 2.0]);
        assert_eq!(
            broadcast(&[1.0, 2.0, 3.0], 3, "x").unwrap(),
            array![1.0, 2.0, 3.0]
        );
        assert!(broadcast(&[1.0, 2.0], 3, "x").is_err());
        assert!(broadcast(&[], 3, "x").is_err());
    }

    #[test]
    fn surface_absorber_quarter_area_rule() {
        let freqs = array![1e9, 2e9];
        let spec = AbsorberSpec::Surface {
            area: 2.0,
            ae: vec![1.0],
        };
        let (acs, ae) = spec.cross_section(&freqs).unwrap();
        assert_relative_eq!(acs[0], 0.5, max_relative = 1e-12);
        assert_relative_eq!(ae[1], 1.0, max_relative = 1e-12);
    }

    #[test]
    fn efficiency_out_of_range_rejected() {
        let freqs = array![1e9];
        let spec = AbsorberSpec::Surface {
            area: 1.0,
            ae: vec![1.5],
        };
        assert!(matches!(
            spec.cross_section(&freqs),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn lossless_wall_is_infinite() {
        let freqs = array![1e9];
        let acs = WallSpec::Lossless.wall_acs(&freqs, 6.0).unwrap();
        assert_eq!(acs[0], f64::INFINITY);
    }

    #[test]
    fn tabulated_file_interpolates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# freq [Hz]  ACS [m^2]").unwrap();
        writeln!(file, "1e9 0.0").unwrap();
        writeln!(file, "3e9 2.0").unwrap();
        file.flush().unwrap();

        let freqs = array![1e9, 2e9, 3e9];
        let acs = load_tabulated(&file.path().to_path_buf(), &freqs).unwrap();
        assert_relative_eq!(acs[1], 1.0, max_relative = 1e-12);
    }

    #[test]
    fn tabulated_file_must_cover_grid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "2e9 1.0").unwrap();
        writeln!(file, "3e9 2.0").unwrap();
        file.flush().unwrap();

        let freqs = array![1e9, 2e9];
        let err = load_tabulated(&file.path().to_path_buf(), &freqs).unwrap_err();
        assert!(matches!(err, Error::Data(_)));
    }

    #[test]
    fn tabulated_file_rejects_descending_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1e9 1.0").unwrap();
        writeln!(file, "5e8 2.0").unwrap();
        file.flush().unwrap();

        let freqs = array![6e8];
        assert!(matches!(
            load_tabulated(&file.path().to_path_buf(), &freqs),
            Err(Error::Data(_))
        ));
    }

    #[test]
    fn tabulated_absorber_rejects_bad_area() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1e9 0.5").unwrap();
        writeln!(file, "3e9 0.5").unwrap();
        file.flush().unwrap();

        let freqs = array![2e9];
        for area in [0.0, -1.0, f64::INFINITY] {
            let spec = AbsorberSpec::File {
                path: file.path().to_path_buf(),
                area: Some(area),
            };
            assert!(matches!(
                spec.cross_section(&freqs),
                Err(Error::Configuration(_))
            ));
        }

        let spec = ApertureSpec::File {
            path: file.path().to_path_buf(),
            area: Some(0.0),
        };
        assert!(matches!(
            spec.cross_section(&freqs),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn direct_cross_section_must_be_finite() {
        let freqs = array![1e9];
        let spec = AbsorberSpec::Acs {
            acs: vec![f64::INFINITY],
            ae: None,
        };
        assert!(matches!(
            spec.cross_section(&freqs),
            Err(Error::Configuration(_))
        ));

        let spec = ApertureSpec::Tcs {
            tcs: vec![f64::INFINITY],
            te: None,
        };
        assert!(matches!(
            spec.cross_section(&freqs),
            Err(Error::Configuration(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn mie_stub_solver_inner_layer_first() {
        use std::os::unix::fs::PermissionsExt;

        // Echo the first argument back as the efficiency: the innermost
        // layer radius, since layers are passed inner to outer.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("mie_stub.sh");
        std::fs::write(&script, "#!/bin/sh\necho \"$1\"\n").unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let freqs = array![1e9, 2e9];
        let spec = AbsorberSpec::Mie {
            command: script.to_string_lossy().into_owned(),
            radii: vec![0.02, 0.0125],
            refr_index: vec![Complex64::new(2.0, 0.1), Complex64::new(3.0, 0.2)],
        };
        let (acs, ae) = spec.cross_section(&freqs).unwrap();
        let geom_cs = std::f64::consts::PI * 0.02 * 0.02;
        assert_relative_eq!(ae[0], 0.0125, max_relative = 1e-12);
        assert_relative_eq!(ae[1], 0.0125, max_relative = 1e-12);
        assert_relative_eq!(acs[0], 0.0125 * geom_cs, max_relative = 1e-12);
    }

    #[test]
    fn mie_layer_validation() {
        let freqs = array![1e9];
        let bad_order = AbsorberSpec::Mie {
            command: "true".into(),
            radii: vec![0.01, 0.02],
            refr_index: vec![Complex64::new(2.0, 0.1), Complex64::new(2.0, 0.1)],
        };
        assert!(matches!(
            bad_order.cross_section(&freqs),
            Err(Error::Configuration(_))
        ));

        let bad_sign = AbsorberSpec::Mie {
            command: "true".into(),
            radii: vec![0.02],
            refr_index: vec![Complex64::new(2.0, -0.1)],
        };
        assert!(matches!(
            bad_sign.cross_section(&freqs),
            Err(Error::Configuration(_))
        ));
    }
}
