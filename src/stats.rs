//! Statistical analysis of co-occurrence and mutual exclusivity
//!
//! The null hypothesis is that the mutations of two genes are independent,
//! given the mutation burden of each sample. Samples and cohorts differ
//! by orders of magnitude in their number of mutations, so every
//! (gene, sample) pair gets its own mutation probability from the
//! [`background::RateModel`].
//!
//! Under this null model, the number of samples in which both genes are
//! mutated follows a [`poisson_binomial::PoissonBinomial`] distribution,
//! a sum of independent Bernoulli trials with different success
//! probabilities. The [`pairwise::PairwiseTest`] uses its tails to test
//! every pair of genes for co-occurrence and mutual exclusivity and
//! [`correction`] adjusts the p-values for the number of tested pairs.

pub mod background;
pub mod correction;
pub mod pairwise;
pub mod poisson_binomial;

/// Converts counts to `f64`
///
/// Counts of samples and genes are always far below `2^53`, so the
/// conversion is exact
#[allow(clippy::cast_precision_loss)]
pub(crate) fn f64_from_u64(n: u64) -> f64 {
    n as f64
}

/// Converts counts to `f64`, see [`f64_from_u64`]
#[allow(clippy::cast_precision_loss)]
pub(crate) fn f64_from_usize(n: usize) -> f64 {
    n as f64
}
