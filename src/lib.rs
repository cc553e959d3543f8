//! PWB — power-balance (statistical electromagnetics) modeling of coupled
//! reverberant enclosures.
//!
//! The crate builds a network model of cavities coupled by apertures and
//! loaded by walls, lumped absorbers and sources, then solves one dense
//! linear system per frequency expressing steady-state energy conservation
//! at every cavity. All secondary outputs (absorbed powers, composite Q,
//! decay rates, time constants) derive from the solved energy densities.
//!
//! ```no_run
//! use pwb::grid::FrequencyGrid;
//! use pwb::model::{Model, SourceSpec};
//! use pwb::output::{get_output, ElementKind};
//! use pwb::xsection::{AbsorberSpec, WallSpec};
//!
//! # fn main() -> pwb::error::Result<()> {
//! let grid = FrequencyGrid::linspace(1e9, 10e9, 101)?;
//! let mut model = Model::new(grid, "demo");
//! model.add_cavity("chamber", 52.0, 24.0, &WallSpec::Surface { ae: vec![0.02] })?;
//! model.add_absorber(
//!     "ram",
//!     "chamber",
//!     4,
//!     &AbsorberSpec::Surface { area: 0.6, ae: vec![0.9] },
//! )?;
//! model.add_source("drive", &SourceSpec::Power { power: vec![1.0] }, "chamber")?;
//! model.solve()?;
//!
//! let out = get_output(&model, ElementKind::Absorber, "ram", &["absorbedPower"])?;
//! println!("{} [{}]", out[0].values[0], out[0].unit);
//! # Ok(())
//! # }
//! ```

pub mod assemble;
pub mod energy;
pub mod error;
pub mod grid;
pub mod model;
pub mod output;
pub mod settings;
pub mod solver;
pub mod xsection;
