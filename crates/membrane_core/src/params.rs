//! Reference physical constants, nondimensionalization and the per-step
//! solve context.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Physical parameters of the coated membrane.
///
/// Lengths are in nm, moduli in pN nm, forces in pN. The `*_nd` accessors
/// return the dimensionless values seen by the shape equations (scaled by
/// `reference_length` and `reference_modulus`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhysicalParameters {
    /// R0 (nm).
    pub reference_length: f64,
    /// kappa0 (pN nm).
    pub reference_modulus: f64,
    /// Sharpness of the coat/bare and force transitions.
    pub sharpness: f64,
    /// Spontaneous curvature of the coat (1/nm).
    pub spontaneous_curvature: f64,
    pub kappa_coat: f64,
    pub kappa_bare: f64,
    pub kappa_gaussian_coat: f64,
    pub kappa_gaussian_bare: f64,
    /// Total actin pulling force (pN), spread over the force band.
    pub force: f64,
    /// Width of the force band outside the coat, in alpha units.
    pub force_band_width: f64,
    /// Dimensionless pressure inside the coat.
    pub pressure_nd: f64,
    /// Outer rim of the membrane patch, in alpha units.
    pub alpha_max: f64,
    /// Stand-in for the pole (alpha = 0 and x = 0 are singular).
    pub pole_offset: f64,
    /// Lower clamp on the radial coordinate inside the shape equations.
    pub min_radius: f64,
    /// Lower clamp on the bending modulus profile.
    pub min_modulus: f64,
    /// Symmetric clamp on the bending modulus slope.
    pub modulus_slope_limit: f64,
    /// Width of the densely meshed band just outside the coat.
    pub transition_band_width: f64,
}

impl Default for PhysicalParameters {
    fn default() -> Self {
        Self {
            reference_length: 20.0,
            reference_modulus: 320.0,
            sharpness: 20.0,
            spontaneous_curvature: 0.02,
            kappa_coat: 2400.0,
            kappa_bare: 320.0,
            kappa_gaussian_coat: 0.0,
            kappa_gaussian_bare: 0.0,
            force: 0.0,
            force_band_width: 3.0,
            pressure_nd: 0.0,
            // Disk radius of 400 nm at R0 = 20 nm.
            alpha_max: 100.0,
            pole_offset: 1e-4,
            min_radius: 1e-3,
            min_modulus: 1e-3,
            modulus_slope_limit: 10.0,
            transition_band_width: 3.0,
        }
    }
}

impl PhysicalParameters {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("reference_length", self.reference_length),
            ("reference_modulus", self.reference_modulus),
            ("sharpness", self.sharpness),
            ("spontaneous_curvature", self.spontaneous_curvature),
            ("kappa_coat", self.kappa_coat),
            ("kappa_bare", self.kappa_bare),
            ("kappa_gaussian_coat", self.kappa_gaussian_coat),
            ("kappa_gaussian_bare", self.kappa_gaussian_bare),
            ("force", self.force),
            ("force_band_width", self.force_band_width),
            ("pressure_nd", self.pressure_nd),
            ("alpha_max", self.alpha_max),
            ("pole_offset", self.pole_offset),
            ("min_radius", self.min_radius),
            ("min_modulus", self.min_modulus),
            ("modulus_slope_limit", self.modulus_slope_limit),
            ("transition_band_width", self.transition_band_width),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                bail!("Parameter {} must be finite (got {}).", name, value);
            }
        }
        if self.reference_length <= 0.0 {
            bail!("reference_length must be positive.");
        }
        if self.reference_modulus <= 0.0 {
            bail!("reference_modulus must be positive.");
        }
        if self.sharpness <= 0.0 {
            bail!("sharpness must be positive.");
        }
        if self.kappa_bare <= 0.0 || self.kappa_coat <= 0.0 {
            bail!("Bending moduli must be positive.");
        }
        if self.force_band_width <= 0.0 {
            bail!("force_band_width must be positive.");
        }
        if self.transition_band_width <= 0.0 {
            bail!("transition_band_width must be positive.");
        }
        if self.pole_offset <= 0.0 || self.min_radius <= 0.0 || self.min_modulus <= 0.0 {
            bail!("Pole offset and clamps must be positive.");
        }
        if self.modulus_slope_limit <= 0.0 {
            bail!("modulus_slope_limit must be positive.");
        }
        if self.alpha_max <= self.pole_offset {
            bail!(
                "alpha_max ({}) must exceed the pole offset ({}).",
                self.alpha_max,
                self.pole_offset
            );
        }
        Ok(())
    }

    pub fn c0_nd(&self) -> f64 {
        self.spontaneous_curvature * self.reference_length
    }

    pub fn kappa_coat_nd(&self) -> f64 {
        self.kappa_coat / self.reference_modulus
    }

    pub fn kappa_bare_nd(&self) -> f64 {
        self.kappa_bare / self.reference_modulus
    }

    pub fn kappa_gaussian_coat_nd(&self) -> f64 {
        self.kappa_gaussian_coat / self.reference_modulus
    }

    pub fn kappa_gaussian_bare_nd(&self) -> f64 {
        self.kappa_gaussian_bare / self.reference_modulus
    }

    /// lambda0 (pN/nm) to lambda0 R0^2 / kappa0.
    pub fn tension_nd(&self, tension: f64) -> f64 {
        tension * self.reference_length.powi(2) / self.reference_modulus
    }

    /// Force per unit area over the band, made dimensionless with R0^3 / kappa0.
    pub fn force_nd(&self, alpha_in: f64, alpha_out: f64) -> f64 {
        let band_area = 2.0 * PI * self.reference_length.powi(2) * (alpha_out - alpha_in);
        (self.force / band_area) * (self.reference_length.powi(3) / self.reference_modulus)
    }

    /// Physical area of the coat (nm^2) for coat area `alpha`.
    pub fn coated_area(&self, alpha: f64) -> f64 {
        alpha * 2.0 * PI * self.reference_length.powi(2)
    }

    /// Radius (nm) of a flat disk with coat area `alpha`.
    pub fn coat_radius(&self, alpha: f64) -> f64 {
        (2.0 * alpha).sqrt() * self.reference_length
    }
}

/// Everything one solve needs, fixed for the duration of that solve.
///
/// Built fresh for every sweep step; the shape equations, boundary
/// conditions and mesh builder read from it and nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveContext {
    pub params: PhysicalParameters,
    /// Coat boundary (alpha_end).
    pub coat_area: f64,
    /// Prescribed tension (pN/nm).
    pub tension: f64,
    pub tension_nd: f64,
    pub alpha_in: f64,
    pub alpha_out: f64,
    pub force_nd: f64,
}

impl SolveContext {
    pub fn new(params: &PhysicalParameters, tension: f64, coat_area: f64) -> Result<Self> {
        if !tension.is_finite() {
            bail!("Tension must be finite (got {}).", tension);
        }
        if !coat_area.is_finite() || coat_area <= params.pole_offset {
            bail!(
                "Coat area must be finite and exceed the pole offset {} (got {}).",
                params.pole_offset,
                coat_area
            );
        }
        let alpha_in = coat_area;
        let alpha_out = alpha_in + params.force_band_width;
        Ok(Self {
            params: params.clone(),
            coat_area,
            tension,
            tension_nd: params.tension_nd(tension),
            alpha_in,
            alpha_out,
            force_nd: params.force_nd(alpha_in, alpha_out),
        })
    }

    /// Same parameters and tension, new coat boundary.
    pub fn with_coat_area(&self, coat_area: f64) -> Result<Self> {
        Self::new(&self.params, self.tension, coat_area)
    }
}
