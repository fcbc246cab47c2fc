//! Persistent stochastic demand shocks.

use plan_core::Matrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// `s(t) = persist·s(t−1) + trend + ε(t)` for every sector.
///
/// `ε` is `N(0, sigma²)` per sector, or `L·z` with `z ~ N(0, I)` when a
/// Cholesky factor `L` of the innovation covariance is given.
pub fn next_shock<R: Rng>(
    rng: &mut R,
    prev_shock: &[f64],
    sigma: f64,
    persist: f64,
    sector_trend: &[f64],
    cholesky: Option<&Matrix>,
) -> Vec<f64> {
    let n = prev_shock.len();
    // Draw every normal even when sigma is zero so the stream position does
    // not depend on the parameters.
    let z: Vec<f64> = (0..n).map(|_| rng.sample::<f64, _>(StandardNormal)).collect();
    let innovation = match cholesky {
        Some(l) => l.mul_vec(&z),
        None => z.iter().map(|zi| sigma * zi).collect(),
    };
    prev_shock
        .iter()
        .zip(sector_trend)
        .zip(&innovation)
        .map(|((s, mu), e)| persist * s + mu + e)
        .collect()
}

/// Tilt consumption shares by `exp(shock)` and renormalize to sum to one.
pub fn apply_to_shares(shares: &[f64], shock: &[f64]) -> Vec<f64> {
    let tilted: Vec<f64> = shares
        .iter()
        .zip(shock)
        .map(|(a, s)| a * s.exp())
        .collect();
    let total: f64 = tilted.iter().sum();
    if total > 0.0 && total.is_finite() {
        tilted.into_iter().map(|a| a / total).collect()
    } else {
        shares.to_vec()
    }
}

/// Seeded shock source owned by the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShockGenerator {
    rng: ChaCha8Rng,
    cholesky: Option<Matrix>,
}

impl ShockGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            cholesky: None,
        }
    }

    /// Use correlated innovations with covariance `L·Lᵀ`.
    pub fn with_cholesky(mut self, cholesky: Option<Matrix>) -> Self {
        self.cholesky = cholesky;
        self
    }

    pub fn next_shock(
        &mut self,
        prev_shock: &[f64],
        sigma: f64,
        persist: f64,
        sector_trend: &[f64],
    ) -> Vec<f64> {
        next_shock(
            &mut self.rng,
            prev_shock,
            sigma,
            persist,
            sector_trend,
            self.cholesky.as_ref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = ShockGenerator::new(7);
        let mut b = ShockGenerator::new(7);
        let mut sa = vec![0.0; 4];
        let mut sb = vec![0.0; 4];
        for _ in 0..20 {
            sa = a.next_shock(&sa, 0.1, 0.8, &[0.0; 4]);
            sb = b.next_shock(&sb, 0.1, 0.8, &[0.0; 4]);
        }
        assert_eq!(sa, sb);
        let mut c = ShockGenerator::new(8);
        let sc = c.next_shock(&[0.0; 4], 0.1, 0.8, &[0.0; 4]);
        assert_ne!(sc, a.next_shock(&[0.0; 4], 0.1, 0.8, &[0.0; 4]));
    }

    #[test]
    fn zero_sigma_is_deterministic_recursion() {
        let mut g = ShockGenerator::new(1);
        let s = g.next_shock(&[1.0, -2.0], 0.0, 0.5, &[0.01, 0.02]);
        assert_relative_eq!(s[0], 0.51, epsilon = 1e-15);
        assert_relative_eq!(s[1], -0.98, epsilon = 1e-15);
    }

    #[test]
    fn correlated_innovations_follow_cholesky() {
        // perfectly correlated second sector: L = [[1,0],[1,1e-9]]
        let l = Matrix::from_rows(vec![vec![1.0, 0.0], vec![1.0, 1e-9]]).unwrap();
        let mut g = ShockGenerator::new(3).with_cholesky(Some(l));
        for _ in 0..10 {
            let s = g.next_shock(&[0.0, 0.0], 0.0, 0.0, &[0.0, 0.0]);
            assert!((s[0] - s[1]).abs() < 1e-6);
        }
    }

    #[test]
    fn sample_variance_matches_sigma() {
        let mut g = ShockGenerator::new(11);
        let draws: Vec<f64> = (0..20_000)
            .map(|_| g.next_shock(&[0.0], 0.2, 0.0, &[0.0])[0])
            .collect();
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / draws.len() as f64;
        assert!(mean.abs() < 0.01);
        assert_relative_eq!(var.sqrt(), 0.2, epsilon = 0.01);
    }

    proptest! {
        #[test]
        fn shares_stay_normalized(
            raw in proptest::collection::vec(0.01f64..10.0, 2..8),
            shock in proptest::collection::vec(-2.0f64..2.0, 8),
        ) {
            let total: f64 = raw.iter().sum();
            let shares: Vec<f64> = raw.iter().map(|r| r / total).collect();
            let out = apply_to_shares(&shares, &shock[..shares.len()]);
            let sum: f64 = out.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-12);
            prop_assert!(out.iter().all(|&a| a > 0.0));
        }
    }
}
