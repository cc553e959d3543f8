//! The power-balance model graph and its incremental builder.
//!
//! Cavities are nodes held in an arena and addressed by handle; absorbers,
//! sources and apertures are typed edges terminating at a cavity and at
//! either another cavity, the implicit ground sink `REF`, or the unbounded
//! exterior `EXT`. Every insertion validates its parameters and topology
//! first and computes the element's energy parameters immediately, so a
//! failed call leaves the model untouched.
//!
//! The model carries an explicit state: any mutation drops a prior solution
//! and returns to `Building`; output queries are only legal in `Solved`.

use std::collections::HashMap;
use std::path::PathBuf;

use ndarray::Array1;
use serde::Deserialize;

use crate::energy::EnergyParams;
use crate::error::{Error, Result};
use crate::grid::FrequencyGrid;
use crate::solver::{self, Solution};
use crate::xsection::{self, load_tabulated, AbsorberSpec, ApertureSpec, WallSpec};

/// Index of a cavity in the model's arena.
pub type CavityHandle = usize;

/// Tag reserved for the unbounded exterior node.
pub const EXT: &str = "EXT";
/// Tag reserved for the implicit ground/reference sink.
pub const REF: &str = "REF";

/// Second endpoint of an aperture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Cavity(CavityHandle),
    Exterior,
}

/// Peer column of an edge-ledger record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    Cavity(String),
    Exterior,
    Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Absorber,
    Source,
    Aperture,
}

/// Derived bookkeeping record appended on every element insertion, used for
/// topology introspection. The arena and the typed element lists remain
/// authoritative.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRecord {
    pub cavity: String,
    pub peer: Peer,
    pub tag: String,
    pub kind: EdgeKind,
}

/// A reverberant enclosure node.
#[derive(Debug, Clone, PartialEq)]
pub struct Cavity {
    pub tag: String,
    /// Total wall surface area [m^2].
    pub area: f64,
    /// Volume [m^3]; infinite for an idealized lossless enclosure.
    pub volume: f64,
    /// Wall loss channel; `wall.ccs` is the wall ACS.
    pub wall: EnergyParams,
}

/// A lumped absorber edge, always terminating at `REF`.
#[derive(Debug, Clone, PartialEq)]
pub struct Absorber {
    pub tag: String,
    pub cavity: CavityHandle,
    /// Number of identical replicated absorbers; scales ACS, never AE.
    pub multiplicity: u32,
    /// Absorption efficiency (intensive, unscaled).
    pub ae: Array1<f64>,
    /// Loss channel; `params.ccs` is the multiplicity-scaled ACS.
    pub params: EnergyParams,
}

impl Absorber {
    pub fn acs(&self) -> &Array1<f64> {
        &self.params.ccs
    }
}

/// A known forcing term injecting power into a cavity.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub tag: String,
    pub cavity: CavityHandle,
    /// Injected power per frequency [W].
    pub power: Array1<f64>,
}

/// Injected-power model of a source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum SourceSpec {
    /// Fixed or frequency-dependent injected power [W], broadcast if scalar.
    Power { power: Vec<f64> },
    /// Tabulated injected power interpolated onto the model grid.
    File { path: PathBuf },
}

impl SourceSpec {
    fn power(&self, freqs: &Array1<f64>) -> Result<Array1<f64>> {
        let power = match self {
            SourceSpec::Power { power } => xsection::broadcast(power, freqs.len(), "source power")?,
            SourceSpec::File { path } => load_tabulated(path, freqs)?,
        };
        for &p in power.iter() {
            if !p.is_finite() || p < 0.0 {
                return Err(Error::config(format!(
                    "source power must be finite and non-negative, got {}",
                    p
                )));
            }
        }
        Ok(power)
    }
}

/// A coupling edge between two cavities, or between a cavity and `EXT`.
/// The transmission cross-section is shared by both directions; the
/// directional decay rates differ through the endpoint volumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Aperture {
    pub tag: String,
    pub cavity_a: CavityHandle,
    pub cavity_b: Endpoint,
    /// Transmission efficiency.
    pub te: Array1<f64>,
    /// Coupling channel seen from side A; `params_a.ccs` is the TCS.
    pub params_a: EnergyParams,
    /// Coupling channel seen from side B; absent for an exterior endpoint.
    pub params_b: Option<EnergyParams>,
}

impl Aperture {
    pub fn tcs(&self) -> &Array1<f64> {
        &self.params_a.ccs
    }
}

/// Lifecycle of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Building,
    Solved,
}

/// The node/edge aggregate accumulated by the builder calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    name: String,
    grid: FrequencyGrid,
    cavities: Vec<Cavity>,
    cavity_index: HashMap<String, CavityHandle>,
    absorbers: Vec<Absorber>,
    sources: Vec<Source>,
    apertures: Vec<Aperture>,
    edges: Vec<EdgeRecord>,
    state: State,
    solution: Option<Solution>,
}

impl Model {
    /// Establishes an empty model graph over a validated frequency grid.
    pub fn new(grid: FrequencyGrid, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grid,
            cavities: Vec::new(),
            cavity_index: HashMap::new(),
            absorbers: Vec::new(),
            sources: Vec::new(),
            apertures: Vec::new(),
            edges: Vec::new(),
            state: State::Building,
            solution: None,
        }
    }

    /// Adds a cavity node and computes its wall loss channel.
    pub fn add_cavity(
        &mut self,
        tag: &str,
        area: f64,
        volume: f64,
        wall: &WallSpec,
    ) -> Result<CavityHandle> {
        self.check_new_tag(tag)?;
        if !area.is_finite() || area <= 0.0 {
            return Err(Error::config(format!(
                "cavity '{}': area must be positive and finite, got {}",
                tag, area
            )));
        }
        // volume may be infinite for an idealized lossless enclosure
        if volume.is_nan() || volume <= 0.0 {
            return Err(Error::config(format!(
                "cavity '{}': volume must be positive, got {}",
                tag, volume
            )));
        }
        let wall_acs = wall
            .wall_acs(self.grid.freqs(), area)
            .map_err(|e| e.tagged(tag))?;
        let wall = EnergyParams::from_ccs(wall_acs, volume, self.grid.freqs());

        let handle = self.cavities.len();
        self.cavities.push(Cavity {
            tag: tag.to_string(),
            area,
            volume,
            wall,
        });
        self.cavity_index.insert(tag.to_string(), handle);
        self.invalidate();
        Ok(handle)
    }

    /// Adds `multiplicity` identical absorbers to a cavity as one edge
    /// terminating at `REF`. ACS scales with multiplicity, AE does not.
    pub fn add_absorber(
        &mut self,
        tag: &str,
        cavity: &str,
        multiplicity: u32,
        spec: &AbsorberSpec,
    ) -> Result<()> {
        self.check_new_tag(tag)?;
        let handle = self.cavity_handle(cavity, tag)?;
        if multiplicity < 1 {
            return Err(Error::config(format!(
                "absorber '{}': multiplicity must be at least 1",
                tag
            )));
        }
        let (acs, ae) = spec
            .cross_section(self.grid.freqs())
            .map_err(|e| e.tagged(tag))?;
        let scaled = acs * multiplicity as f64;
        let params = EnergyParams::from_ccs(scaled, self.cavities[handle].volume, self.grid.freqs());

        self.absorbers.push(Absorber {
            tag: tag.to_string(),
            cavity: handle,
            multiplicity,
            ae,
            params,
        });
        self.edges.push(EdgeRecord {
            cavity: cavity.to_string(),
            peer: Peer::Reference,
            tag: tag.to_string(),
            kind: EdgeKind::Absorber,
        });
        self.invalidate();
        Ok(())
    }

    /// Adds a source edge injecting a known power into a cavity.
    pub fn add_source(&mut self, tag: &str, spec: &SourceSpec, cavity: &str) -> Result<()> {
        self.check_new_tag(tag)?;
        let handle = self.cavity_handle(cavity, tag)?;
        let power = spec.power(self.grid.freqs()).map_err(|e| e.tagged(tag))?;

        self.sources.push(Source {
            tag: tag.to_string(),
            cavity: handle,
            power,
        });
        self.edges.push(EdgeRecord {
            cavity: cavity.to_string(),
            peer: Peer::Reference,
            tag: tag.to_string(),
            kind: EdgeKind::Source,
        });
        self.invalidate();
        Ok(())
    }

    /// Adds an aperture between two cavities, or between a cavity and the
    /// exterior when `cavity_b` is `"EXT"`. One ledger record is appended
    /// per assemblable direction.
    pub fn add_aperture(
        &mut self,
        tag: &str,
        cavity_a: &str,
        cavity_b: &str,
        spec: &ApertureSpec,
    ) -> Result<()> {
        self.check_new_tag(tag)?;
        let handle_a = self.cavity_handle_no_ext(cavity_a, tag, "first aperture endpoint")?;
        let endpoint_b = if cavity_b == EXT {
            Endpoint::Exterior
        } else {
            Endpoint::Cavity(self.cavity_handle_no_ext(cavity_b, tag, "second aperture endpoint")?)
        };
        if endpoint_b == Endpoint::Cavity(handle_a) {
            return Err(Error::config(format!(
                "aperture '{}': endpoints must differ, both are '{}'",
                tag, cavity_a
            )));
        }
        let (tcs, te) = spec
            .cross_section(self.grid.freqs())
            .map_err(|e| e.tagged(tag))?;
        let params_a =
            EnergyParams::from_ccs(tcs.clone(), self.cavities[handle_a].volume, self.grid.freqs());
        let params_b = match endpoint_b {
            Endpoint::Cavity(handle_b) => Some(EnergyParams::from_ccs(
                tcs,
                self.cavities[handle_b].volume,
                self.grid.freqs(),
            )),
            Endpoint::Exterior => None,
        };

        self.apertures.push(Aperture {
            tag: tag.to_string(),
            cavity_a: handle_a,
            cavity_b: endpoint_b,
            te,
            params_a,
            params_b,
        });
        self.edges.push(EdgeRecord {
            cavity: cavity_a.to_string(),
            peer: match endpoint_b {
                Endpoint::Cavity(_) => Peer::Cavity(cavity_b.to_string()),
                Endpoint::Exterior => Peer::Exterior,
            },
            tag: tag.to_string(),
            kind: EdgeKind::Aperture,
        });
        if let Endpoint::Cavity(_) = endpoint_b {
            self.edges.push(EdgeRecord {
                cavity: cavity_b.to_string(),
                peer: Peer::Cavity(cavity_a.to_string()),
                tag: tag.to_string(),
                kind: EdgeKind::Aperture,
            });
        }
        self.invalidate();
        Ok(())
    }

    /// Solves the per-frequency power-balance systems and stores the
    /// solution snapshot. Legal on any fully specified graph; a singular
    /// system at any frequency aborts the whole solve.
    pub fn solve(&mut self) -> Result<()> {
        let solution = solver::solve(self)?;
        self.solution = Some(solution);
        self.state = State::Solved;
        Ok(())
    }

    /// The solved energy-density snapshot, if the model is in `Solved`.
    pub fn solution(&self) -> Result<&Solution> {
        self.solution.as_ref().ok_or_else(|| {
            Error::query(format!(
                "model '{}' has no solution; call solve() after building",
                self.name
            ))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn grid(&self) -> &FrequencyGrid {
        &self.grid
    }

    pub fn cavities(&self) -> &[Cavity] {
        &self.cavities
    }

    pub fn absorbers(&self) -> &[Absorber] {
        &self.absorbers
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn apertures(&self) -> &[Aperture] {
        &self.apertures
    }

    /// Topology introspection: the flat edge ledger in insertion order.
    pub fn edges(&self) -> &[EdgeRecord] {
        &self.edges
    }

    pub fn cavity_by_tag(&self, tag: &str) -> Option<(CavityHandle, &Cavity)> {
        self.cavity_index
            .get(tag)
            .map(|&h| (h, &self.cavities[h]))
    }

    pub fn absorber_by_tag(&self, tag: &str) -> Option<&Absorber> {
        self.absorbers.iter().find(|a| a.tag == tag)
    }

    pub fn source_by_tag(&self, tag: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.tag == tag)
    }

    pub fn aperture_by_tag(&self, tag: &str) -> Option<&Aperture> {
        self.apertures.iter().find(|a| a.tag == tag)
    }

    fn invalidate(&mut self) {
        self.solution = None;
        self.state = State::Building;
    }

    fn check_new_tag(&self, tag: &str) -> Result<()> {
        if !is_valid_tag(tag) {
            return Err(Error::config(format!(
                "'{}' is not a valid identifier (expected [A-Za-z_][A-Za-z0-9_]*, \
                 EXT and REF are reserved)",
                tag
            )));
        }
        if self.tag_in_use(tag) {
            return Err(Error::config(format!("duplicate tag '{}'", tag)));
        }
        Ok(())
    }

    fn tag_in_use(&self, tag: &str) -> bool {
        self.cavity_index.contains_key(tag)
            || self.absorbers.iter().any(|a| a.tag == tag)
            || self.sources.iter().any(|s| s.tag == tag)
            || self.apertures.iter().any(|a| a.tag == tag)
    }

    fn cavity_handle(&self, cavity: &str, element: &str) -> Result<CavityHandle> {
        if cavity == EXT {
            return Err(Error::config(format!(
                "element '{}' cannot be attached to the exterior node",
                element
            )));
        }
        self.cavity_index.get(cavity).copied().ok_or_else(|| {
            Error::config(format!(
                "element '{}' references unknown cavity '{}'",
                element, cavity
            ))
        })
    }

    fn cavity_handle_no_ext(&self, cavity: &str, element: &str, role: &str) -> Result<CavityHandle> {
        self.cavity_index.get(cavity).copied().ok_or_else(|| {
            Error::config(format!(
                "{} of '{}' references unknown cavity '{}'",
                role, element, cavity
            ))
        })
    }
}

impl Error {
    /// Prefixes an element tag onto a provider error.
    fn tagged(self, tag: &str) -> Self {
        match self {
            Error::Configuration(msg) => Error::Configuration(format!("'{}': {}", tag, msg)),
            Error::Data(msg) => Error::Data(format!("'{}': {}", tag, msg)),
            other => other,
        }
    }
}

/// A valid bare identifier: leading letter or underscore, then letters,
/// digits or underscores. `EXT` and `REF` are reserved.
pub fn is_valid_tag(tag: &str) -> bool {
    if tag == EXT || tag == REF {
        return false;
    }
    let mut chars = tag.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
