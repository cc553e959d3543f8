//! Runtime configuration for the command-line driver.
//!
//! A model is described in a TOML file: the frequency sweep plus the cavity,
//! absorber, source and aperture lists. File values can be overridden by
//! `PWB_`-prefixed environment variables and by command-line arguments.
//!
//! ```toml
//! name = "two_cavity"
//! directory = "results"
//!
//! [frequency]
//! start = 1e9
//! stop = 10e9
//! num = 201
//! spacing = "log"
//!
//! [[cavities]]
//! tag = "chamber"
//! area = 52.0
//! volume = 24.0
//! wall = { Surface = { ae = [0.02] } }
//!
//! [[sources]]
//! tag = "stirrer_drive"
//! cavity = "chamber"
//! spec = { Power = { power = [1.0] } }
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error;
use crate::grid::FrequencyGrid;
use crate::model::{Model, SourceSpec};
use crate::xsection::{AbsorberSpec, ApertureSpec, WallSpec};

/// Speed of light in free space [m/s].
pub const C0: f64 = 299_792_458.0;
/// Relative tolerance for the energy-conservation diagnostic.
pub const CONSERVATION_TOL: f64 = 1e-6;

/// Frequency sweep description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrequencySweep {
    pub start: f64,
    pub stop: f64,
    pub num: usize,
    #[serde(default)]
    pub spacing: Spacing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spacing {
    #[default]
    Linear,
    Log,
}

impl FrequencySweep {
    pub fn grid(&self) -> error::Result<FrequencyGrid> {
        match self.spacing {
            Spacing::Linear => FrequencyGrid::linspace(self.start, self.stop, self.num),
            Spacing::Log => FrequencyGrid::logspace(self.start, self.stop, self.num),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CavityEntry {
    pub tag: String,
    pub area: f64,
    pub volume: f64,
    pub wall: WallSpec,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AbsorberEntry {
    pub tag: String,
    pub cavity: String,
    #[serde(default = "default_multiplicity")]
    pub multiplicity: u32,
    pub spec: AbsorberSpec,
}

fn default_multiplicity() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceEntry {
    pub tag: String,
    pub cavity: String,
    pub spec: SourceSpec,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApertureEntry {
    pub tag: String,
    pub cavity_a: String,
    pub cavity_b: String,
    pub spec: ApertureSpec,
}

/// Full model description loaded from file, environment and CLI.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub name: String,
    pub frequency: FrequencySweep,
    #[serde(default = "default_directory")]
    pub directory: String,
    pub cavities: Vec<CavityEntry>,
    #[serde(default)]
    pub absorbers: Vec<AbsorberEntry>,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
    #[serde(default)]
    pub apertures: Vec<ApertureEntry>,
}

fn default_directory() -> String {
    ".".to_string()
}

impl Settings {
    /// Builds the model graph from the description, in declaration order.
    pub fn build_model(&self) -> error::Result<Model> {
        let grid = self.frequency.grid()?;
        let mut model = Model::new(grid, &self.name);
        for c in &self.cavities {
            model.add_cavity(&c.tag, c.area, c.volume, &c.wall)?;
        }
        for a in &self.absorbers {
            model.add_absorber(&a.tag, &a.cavity, a.multiplicity, &a.spec)?;
        }
        for s in &self.sources {
            model.add_source(&s.tag, &s.spec, &s.cavity)?;
        }
        for ap in &self.apertures {
            model.add_aperture(&ap.tag, &ap.cavity_a, &ap.cavity_b, &ap.spec)?;
        }
        Ok(model)
    }
}

/// Loads settings from the model file, `PWB_` environment overrides and
/// command-line arguments.
pub fn load_config() -> Result<Settings> {
    let args = CliArgs::parse();
    let path = args.model.clone();
    load_from(&path, args)
}

fn load_from(path: &PathBuf, args: CliArgs) -> Result<Settings> {
    let config: Config = Config::builder()
        .add_source(File::from(path.clone()).required(true))
        .add_source(Environment::with_prefix("pwb"))
        .build()
        .with_context(|| format!("loading model description {}", path.display()))?;

    let mut settings: Settings = config
        .try_deserialize()
        .with_context(|| format!("deserializing model description {}", path.display()))?;

    if let Some(dir) = args.dir {
        settings.directory = dir;
    }
    if let Some(num) = args.num {
        settings.frequency.num = num;
    }

    validate_settings(&settings)?;
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<()> {
    anyhow::ensure!(!settings.name.is_empty(), "model name must not be empty");
    anyhow::ensure!(
        settings.frequency.num >= 1,
        "frequency sweep needs at least one point"
    );
    anyhow::ensure!(
        settings.frequency.start > 0.0,
        "frequency sweep must start above 0 Hz"
    );
    anyhow::ensure!(
        !settings.cavities.is_empty(),
        "model needs at least one cavity"
    );
    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "PWB - power-balance modeling of coupled reverberant enclosures"
)]
pub struct CliArgs {
    /// Path to the TOML model description.
    #[arg(short, long)]
    model: PathBuf,

    /// Output directory for the per-element result tables.
    #[arg(short, long)]
    dir: Option<String>,

    /// Override the number of sweep frequencies.
    #[arg(short, long)]
    num: Option<usize>,
}
