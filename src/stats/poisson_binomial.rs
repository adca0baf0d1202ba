//! The distribution of the number of successes in independent Bernoulli
//! trials with different success probabilities
//!
//! The overlap of two genes across samples is such a sum: each sample is a
//! trial that succeeds if both genes are mutated, with a probability that
//! depends on the mutation burden of the sample.
#![allow(clippy::module_name_repetitions)]

use statrs::function::erf::erfc;

use crate::stats::f64_from_u64;

/// `1 / sqrt(2 * pi)`
const FRAC_1_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

/// Exact Poisson binomial distribution
///
/// The probability mass function is calculated with the recursion
/// `P_n(k) = P_(n-1)(k) * (1 - p_n) + P_(n-1)(k - 1) * p_n`.
/// Trailing values that underflow to `0` are dropped, so the runtime is
/// `O(n * m)` where `m` is the effective support of the distribution.
///
/// # Examples
///
/// ```
/// use comutation::stats::poisson_binomial::PoissonBinomial;
///
/// let dist = PoissonBinomial::new([0.5, 0.5]);
/// assert!((dist.pmf(1) - 0.5).abs() < f64::EPSILON);
///
/// // P(X <= 0)
/// assert!((dist.cdf(0) - 0.25).abs() < f64::EPSILON);
/// // P(X > 0)
/// assert!((dist.sf(0) - 0.75).abs() < f64::EPSILON);
///
/// assert!((dist.mean() - 1.0).abs() < f64::EPSILON);
/// ```
#[derive(Debug, Clone)]
pub struct PoissonBinomial {
    pmf: Vec<f64>,
    mean: f64,
    variance: f64,
}

impl PoissonBinomial {
    /// Constructs the distribution of the successes of trials with `probabilities`
    ///
    /// All probabilities must be within `[0, 1]`
    pub fn new<I: IntoIterator<Item = f64>>(probabilities: I) -> Self {
        let mut pmf = vec![1.0];
        let mut mean = 0.0;
        let mut variance = 0.0;
        for p in probabilities {
            mean += p;
            variance += p * (1.0 - p);
            let q = 1.0 - p;
            pmf.push(0.0);
            for k in (1..pmf.len()).rev() {
                pmf[k] = pmf[k] * q + pmf[k - 1] * p;
            }
            pmf[0] *= q;
            while pmf.len() > 1 && pmf.last() == Some(&0.0) {
                pmf.pop();
            }
        }
        Self {
            pmf,
            mean,
            variance,
        }
    }

    /// The probability of exactly `k` successes
    pub fn pmf(&self, k: u64) -> f64 {
        usize::try_from(k)
            .ok()
            .and_then(|k| self.pmf.get(k))
            .copied()
            .unwrap_or(0.0)
    }

    /// The probability of `k` or less successes: `P(X <= k)`
    pub fn cdf(&self, k: u64) -> f64 {
        let end = usize::try_from(k).map_or(self.pmf.len(), |k| (k + 1).min(self.pmf.len()));
        self.pmf[..end].iter().sum::<f64>().min(1.0)
    }

    /// The probability of more than `k` successes: `P(X > k)`
    pub fn sf(&self, k: u64) -> f64 {
        let start = usize::try_from(k).map_or(self.pmf.len(), |k| (k + 1).min(self.pmf.len()));
        // summing the small values first
        self.pmf[start..].iter().rev().sum::<f64>().min(1.0)
    }

    /// The expected number of successes
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// The variance of the number of successes
    pub fn variance(&self) -> f64 {
        self.variance
    }
}

/// Refined normal approximation of the Poisson binomial distribution
///
/// Uses a continuity correction and a skewness term, which is accurate
/// enough for large cohorts where the exact distribution is expensive.
#[derive(Debug, Clone)]
pub struct RefinedNormal {
    mean: f64,
    sd: f64,
    gamma: f64,
}

impl RefinedNormal {
    /// Constructs the approximation for trials with `probabilities`
    ///
    /// Returns `None` if the variance is `0`
    pub fn new<I: IntoIterator<Item = f64>>(probabilities: I) -> Option<Self> {
        let mut mean = 0.0;
        let mut variance = 0.0;
        let mut third = 0.0;
        for p in probabilities {
            let v = p * (1.0 - p);
            mean += p;
            variance += v;
            third += v * (1.0 - 2.0 * p);
        }
        if variance <= 0.0 {
            return None;
        }
        let sd = variance.sqrt();
        Some(Self {
            mean,
            sd,
            gamma: third / (sd * sd * sd),
        })
    }

    fn z(&self, k: u64) -> f64 {
        (f64_from_u64(k) + 0.5 - self.mean) / self.sd
    }

    fn skew_term(&self, z: f64) -> f64 {
        self.gamma * (1.0 - z * z) * FRAC_1_SQRT_2PI * (-0.5 * z * z).exp() / 6.0
    }

    /// Approximates `P(X <= k)`
    pub fn cdf(&self, k: u64) -> f64 {
        let z = self.z(k);
        (0.5 * erfc(-z / std::f64::consts::SQRT_2) + self.skew_term(z)).clamp(0.0, 1.0)
    }

    /// Approximates `P(X > k)`
    pub fn sf(&self, k: u64) -> f64 {
        let z = self.z(k);
        (0.5 * erfc(z / std::f64::consts::SQRT_2) - self.skew_term(z)).clamp(0.0, 1.0)
    }
}
