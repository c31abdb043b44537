//! Spatial material profiles along the membrane.
//!
//! Every profile is a bare value blended towards a coated value by one
//! logistic step `s(a) = 1/2 (1 - tanh(gamma (a - alpha_end)))`, which is 1
//! deep inside the coat and 0 outside it.

use crate::params::SolveContext;

/// Coat coverage `s(a)`.
pub fn coverage(alpha: f64, alpha_end: f64, gamma: f64) -> f64 {
    0.5 * (1.0 - (gamma * (alpha - alpha_end)).tanh())
}

/// `ds/da`.
pub fn coverage_slope(alpha: f64, alpha_end: f64, gamma: f64) -> f64 {
    let t = (gamma * (alpha - alpha_end)).tanh();
    0.5 * gamma * (t * t - 1.0)
}

/// `d2s/da2`.
pub fn coverage_curvature(alpha: f64, alpha_end: f64, gamma: f64) -> f64 {
    let t = (gamma * (alpha - alpha_end)).tanh();
    gamma * gamma * t * (1.0 - t * t)
}

/// Smooth band that is ~1 on `[alpha_in, alpha_out]` and ~0 elsewhere.
pub fn band(alpha: f64, alpha_in: f64, alpha_out: f64, gamma: f64) -> f64 {
    0.5 * ((gamma * (alpha - alpha_in)).tanh() - (gamma * (alpha - alpha_out)).tanh())
}

/// All profile values at one arc-length position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileSample {
    pub coverage: f64,
    pub curvature: f64,
    pub curvature_slope: f64,
    pub modulus: f64,
    pub modulus_slope: f64,
    pub gaussian: f64,
    pub gaussian_slope: f64,
    pub gaussian_curvature: f64,
    pub pressure: f64,
    pub force: f64,
}

/// Dimensionless material description for one coat boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialProfile {
    pub alpha_end: f64,
    pub gamma: f64,
    pub c0: f64,
    pub kappa_bare: f64,
    pub kappa_coat: f64,
    pub kappa_gaussian_bare: f64,
    pub kappa_gaussian_coat: f64,
    pub pressure: f64,
    pub force: f64,
    pub alpha_in: f64,
    pub alpha_out: f64,
}

impl MaterialProfile {
    pub fn from_context(ctx: &SolveContext) -> Self {
        let p = &ctx.params;
        Self {
            alpha_end: ctx.coat_area,
            gamma: p.sharpness,
            c0: p.c0_nd(),
            kappa_bare: p.kappa_bare_nd(),
            kappa_coat: p.kappa_coat_nd(),
            kappa_gaussian_bare: p.kappa_gaussian_bare_nd(),
            kappa_gaussian_coat: p.kappa_gaussian_coat_nd(),
            pressure: p.pressure_nd,
            force: ctx.force_nd,
            alpha_in: ctx.alpha_in,
            alpha_out: ctx.alpha_out,
        }
    }

    pub fn coverage(&self, alpha: f64) -> f64 {
        coverage(alpha, self.alpha_end, self.gamma)
    }

    pub fn spontaneous_curvature(&self, alpha: f64) -> f64 {
        self.c0 * self.coverage(alpha)
    }

    pub fn bending_modulus(&self, alpha: f64) -> f64 {
        blend(self.kappa_bare, self.kappa_coat, self.coverage(alpha))
    }

    pub fn gaussian_modulus(&self, alpha: f64) -> f64 {
        blend(self.kappa_gaussian_bare, self.kappa_gaussian_coat, self.coverage(alpha))
    }

    pub fn pressure(&self, alpha: f64) -> f64 {
        self.pressure * self.coverage(alpha)
    }

    /// Actin pull, one-sided: confined to the band just outside the coat.
    pub fn force(&self, alpha: f64) -> f64 {
        -self.force * band(alpha, self.alpha_in, self.alpha_out, self.gamma)
    }

    pub fn sample(&self, alpha: f64) -> ProfileSample {
        let s = self.coverage(alpha);
        let ds = coverage_slope(alpha, self.alpha_end, self.gamma);
        let d2s = coverage_curvature(alpha, self.alpha_end, self.gamma);
        let dkappa = self.kappa_coat - self.kappa_bare;
        let dkappa_g = self.kappa_gaussian_coat - self.kappa_gaussian_bare;
        ProfileSample {
            coverage: s,
            curvature: self.c0 * s,
            curvature_slope: self.c0 * ds,
            modulus: self.kappa_bare + dkappa * s,
            modulus_slope: dkappa * ds,
            gaussian: self.kappa_gaussian_bare + dkappa_g * s,
            gaussian_slope: dkappa_g * ds,
            gaussian_curvature: dkappa_g * d2s,
            pressure: self.pressure * s,
            force: self.force(alpha),
        }
    }
}

fn blend(bare: f64, coat: f64, s: f64) -> f64 {
    bare + (coat - bare) * s
}
