//! Conversion between the four equivalent loss representations of a
//! dissipative or coupling element: cross-section, composite Q-factor,
//! energy decay rate and time constant.
//!
//! For a cavity of volume `V` and a channel with cross-section `CCS(f)`:
//!
//! ```text
//! gamma(f) = c0 * CCS(f) / V      [1/s]
//! tau(f)   = 1 / gamma(f)         [s]
//! Q(f)     = 2 pi f tau(f)        [-]
//! ```
//!
//! An infinite cross-section denotes a perfectly lossless, idealized channel
//! and maps to exactly zero decay rate, infinite time constant and infinite
//! Q. The conversions are exact round-trip inverses away from that singular
//! case and agree at it.

use ndarray::Array1;
use std::f64::consts::TAU;

use crate::settings::C0;

/// Derived energy parameters of a single loss or coupling channel, each
/// array aligned to the model's frequency grid.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyParams {
    pub ccs: Array1<f64>,
    pub decay_rate: Array1<f64>,
    pub time_const: Array1<f64>,
    pub q: Array1<f64>,
}

impl EnergyParams {
    /// Derives decay rate, time constant and Q from a cross-section and the
    /// owning cavity's volume.
    pub fn from_ccs(ccs: Array1<f64>, volume: f64, freqs: &Array1<f64>) -> Self {
        let decay_rate = ccs.mapv(|c| {
            if c.is_infinite() {
                0.0 // lossless channel, restored exactly after the clamp
            } else {
                (C0 * c.min(f64::MAX / C0)) / volume
            }
        });
        let time_const = decay_rate.mapv(|g| 1.0 / g);
        let q = freqs * TAU * &time_const;
        Self {
            ccs,
            decay_rate,
            time_const,
            q,
        }
    }

    /// Recovers the cross-section representation from a composite Q-factor
    /// and the owning cavity's volume.
    pub fn from_q(q: Array1<f64>, volume: f64, freqs: &Array1<f64>) -> Self {
        let time_const = (&q / TAU) / freqs;
        let decay_rate = time_const.mapv(|t| 1.0 / t);
        let ccs = q
            .iter()
            .zip(decay_rate.iter())
            .map(|(&q, &g)| {
                if q.is_infinite() {
                    f64::INFINITY
                } else {
                    g * volume / C0
                }
            })
            .collect();
        Self {
            ccs,
            decay_rate,
            time_const,
            q,
        }
    }

    /// Loss conductance `c0 * CCS` [m^3/s]: watts removed per unit energy
    /// density. Finite even for an infinite-volume cavity; zero for the
    /// lossless (infinite cross-section) channel.
    pub fn conductance(&self) -> Array1<f64> {
        self.ccs
            .mapv(|c| if c.is_infinite() { 0.0 } else { C0 * c })
    }
}
