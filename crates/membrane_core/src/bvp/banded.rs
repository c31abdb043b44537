use super::SolveFailure;
use nalgebra::DMatrix;

/// Banded LU factorisation with partial pivoting.
///
/// Storage follows the LAPACK band layout: `A(i, j)` lives at
/// `ab[(kl + ku + i - j, j)]`, with `kl` extra rows on top for the fill-in
/// produced by row interchanges.
#[derive(Debug, Clone)]
pub(crate) struct BandedLu {
    n: usize,
    kl: usize,
    ku: usize,
    ab: DMatrix<f64>,
    pivots: Vec<usize>,
    factored: bool,
}

impl BandedLu {
    pub(crate) fn new(n: usize, kl: usize, ku: usize) -> Self {
        Self {
            n,
            kl,
            ku,
            ab: DMatrix::zeros(2 * kl + ku + 1, n),
            pivots: vec![0; n],
            factored: false,
        }
    }

    fn offset(&self) -> usize {
        self.kl + self.ku
    }

    /// Whether `(i, j)` lies inside the declared band.
    pub(crate) fn in_band(&self, i: usize, j: usize) -> bool {
        i < self.n && j < self.n && i + self.ku >= j && j + self.kl >= i
    }

    #[cfg(test)]
    fn get(&self, i: usize, j: usize) -> f64 {
        if !self.in_band(i, j) {
            return 0.0;
        }
        self.ab[(self.offset() + i - j, j)]
    }

    /// Sets `A(i, j)`. Entries outside the band must stay zero.
    pub(crate) fn set(&mut self, i: usize, j: usize, value: f64) {
        debug_assert!(self.in_band(i, j), "({i}, {j}) is outside the band");
        let row = self.offset() + i - j;
        self.ab[(row, j)] = value;
    }

    /// Factors in place.
    pub(crate) fn factor(&mut self) -> Result<(), SolveFailure> {
        let n = self.n;
        let kl = self.kl;
        let kv = self.offset();
        let mut ju = 0;
        for j in 0..n {
            let km = kl.min(n - 1 - j);

            let mut jp = 0;
            let mut best = self.ab[(kv, j)].abs();
            for r in 1..=km {
                let candidate = self.ab[(kv + r, j)].abs();
                if candidate > best {
                    best = candidate;
                    jp = r;
                }
            }
            if !best.is_finite() {
                return Err(SolveFailure::NonFinite);
            }
            if best == 0.0 {
                return Err(SolveFailure::SingularJacobian);
            }
            self.pivots[j] = j + jp;
            ju = ju.max((j + self.ku + jp).min(n - 1));

            if jp != 0 {
                for c in j..=ju {
                    self.ab.swap((kv + j - c, c), (kv + j + jp - c, c));
                }
            }

            let pivot = self.ab[(kv, j)];
            for r in 1..=km {
                self.ab[(kv + r, j)] /= pivot;
            }
            for c in (j + 1)..=ju {
                let u = self.ab[(kv + j - c, c)];
                if u == 0.0 {
                    continue;
                }
                for r in 1..=km {
                    let l = self.ab[(kv + r, j)];
                    self.ab[(kv + j + r - c, c)] -= l * u;
                }
            }
        }
        self.factored = true;
        Ok(())
    }

    /// Solves `A x = b` in place using a previous [`BandedLu::factor`].
    pub(crate) fn solve_in_place(&self, b: &mut [f64]) {
        debug_assert!(self.factored, "solve called before factor");
        let n = self.n;
        let kv = self.offset();
        for j in 0..n.saturating_sub(1) {
            let p = self.pivots[j];
            if p != j {
                b.swap(p, j);
            }
            let lm = self.kl.min(n - 1 - j);
            let bj = b[j];
            for r in 1..=lm {
                b[j + r] -= self.ab[(kv + r, j)] * bj;
            }
        }
        for j in (0..n).rev() {
            b[j] /= self.ab[(kv, j)];
            let bj = b[j];
            for i in j.saturating_sub(kv)..j {
                b[i] -= self.ab[(kv + i - j, j)] * bj;
            }
        }
    }
}
