//! Testing every pair of genes for co-occurrence and mutual exclusivity
//!
//! For a pair of genes `a` and `b`, the observed overlap is the number of
//! samples in which both are mutated. Under the null hypothesis of independent
//! mutations, sample `j` contributes to the overlap with probability
//! `p_aj * p_bj`, so the overlap follows a Poisson binomial distribution.
//!
//! - co-occurrence: `P(overlap >= observed)`
//! - mutual exclusivity: `P(overlap <= observed)`
//!
//! The smaller of both is the p-value of the pair, labeled with its
//! [`Tendency`]. The p-values of all pairs are then adjusted with a
//! [`Correction`].
use std::fmt::Display;

use rayon::prelude::*;
use tracing::{info, trace};

use crate::mutations::MutationMatrix;
use crate::stats::background::RateModel;
use crate::stats::correction::Correction;
use crate::stats::f64_from_u64;
use crate::stats::poisson_binomial::{PoissonBinomial, RefinedNormal};
use crate::utils::GenePairs;
use crate::{ComutError, ComutResult};

/// How the tails of the overlap distribution are calculated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TailMethod {
    /// Exact Poisson binomial distribution
    #[default]
    Exact,
    /// Refined normal approximation, for very large cohorts
    Normal,
}

/// The direction in which the overlap of a pair deviates from the expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tendency {
    /// More overlap than expected
    CoOccurrence,
    /// Less overlap than expected
    MutualExclusivity,
}

impl Display for Tendency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tendency::CoOccurrence => write!(f, "co-occurrence"),
            Tendency::MutualExclusivity => write!(f, "mutual exclusivity"),
        }
    }
}

/// The test result of a single pair of genes
///
/// Genes are referenced by their row index in the [`MutationMatrix`],
/// the lower index is always `gene_a`.
#[derive(Debug, Clone, PartialEq)]
pub struct PairTest {
    gene_a: usize,
    gene_b: usize,
    overlap: u64,
    expected: f64,
    variance: f64,
    pvalue_cooccurrence: f64,
    pvalue_exclusivity: f64,
    qvalue: f64,
}

impl PairTest {
    /// The row indicies of both genes
    pub fn genes(&self) -> (usize, usize) {
        (self.gene_a, self.gene_b)
    }

    /// The number of samples in which both genes are mutated
    pub fn overlap(&self) -> u64 {
        self.overlap
    }

    /// The expected overlap under the null model
    pub fn expected(&self) -> f64 {
        self.expected
    }

    /// The variance of the overlap under the null model
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// `P(overlap >= observed)`
    pub fn pvalue_cooccurrence(&self) -> f64 {
        self.pvalue_cooccurrence
    }

    /// `P(overlap <= observed)`
    pub fn pvalue_exclusivity(&self) -> f64 {
        self.pvalue_exclusivity
    }

    /// The direction with the smaller p-value
    ///
    /// If both p-values are equal, the observed overlap is compared to the expectation
    pub fn tendency(&self) -> Tendency {
        if self.pvalue_cooccurrence < self.pvalue_exclusivity {
            Tendency::CoOccurrence
        } else if self.pvalue_exclusivity < self.pvalue_cooccurrence {
            Tendency::MutualExclusivity
        } else if f64_from_u64(self.overlap) >= self.expected {
            Tendency::CoOccurrence
        } else {
            Tendency::MutualExclusivity
        }
    }

    /// The p-value in the direction of the [`PairTest::tendency`]
    pub fn pvalue(&self) -> f64 {
        match self.tendency() {
            Tendency::CoOccurrence => self.pvalue_cooccurrence,
            Tendency::MutualExclusivity => self.pvalue_exclusivity,
        }
    }

    /// The p-value adjusted for multiple testing
    ///
    /// Single pairs, tested by [`PairwiseTest::test_pair`], are not adjusted
    pub fn qvalue(&self) -> f64 {
        self.qvalue
    }
}

/// Tests pairs of genes for co-occurrence and mutual exclusivity
///
/// The matrix and the background model are only read, every pair is tested
/// independently. [`PairwiseTest::run`] tests all pairs in parallel.
///
/// # Examples
///
/// ```
/// use comutation::{GeneSymbol, MutationMatrix, PairwiseTest, RateModel, SampleId};
/// use comutation::stats::pairwise::Tendency;
///
/// let genes = ["A", "B", "C", "D"]
///     .iter()
///     .map(|g| GeneSymbol::try_from(*g).unwrap())
///     .collect();
/// let samples = (0..12).map(|i| SampleId::new("X", &i.to_string())).collect();
/// let a = [1, 1, 1, 0, 0, 0];
/// let c = [1, 0, 1, 0, 1, 0];
/// let d = [0, 1, 0, 1, 0, 1];
/// let data = [a, a, a, a, c, c, d, d].concat();
/// let matrix = MutationMatrix::new(genes, samples, data).unwrap();
///
/// let model = RateModel::estimate(&matrix).unwrap();
/// let results = PairwiseTest::new(&matrix, &model).unwrap().run().unwrap();
/// assert_eq!(results.len(), 6);
///
/// let cd = results.iter().find(|r| r.genes() == (2, 3)).unwrap();
/// assert_eq!(cd.overlap(), 0);
/// assert_eq!(cd.tendency(), Tendency::MutualExclusivity);
/// assert!(cd.qvalue() < 0.05);
/// ```
#[derive(Debug, Clone)]
pub struct PairwiseTest<'a> {
    matrix: &'a MutationMatrix,
    model: &'a RateModel,
    method: TailMethod,
    correction: Correction,
}

impl<'a> PairwiseTest<'a> {
    /// Prepares the test of all genes of `matrix` against the background `model`
    ///
    /// # Errors
    ///
    /// - [`ComutError::InvalidParameter`] if the model does not match the matrix
    /// - [`ComutError::InsufficientSamples`] if the matrix has less than 2 samples
    /// - [`ComutError::DegenerateRate`] if a gene is never or always mutated
    ///   or has a background rate of `0` or `1`
    pub fn new(matrix: &'a MutationMatrix, model: &'a RateModel) -> ComutResult<Self> {
        if model.dim() != matrix.data().dim() {
            return Err(ComutError::InvalidParameter(format!(
                "background model of {:?} does not match mutation matrix of {:?}",
                model.dim(),
                matrix.data().dim()
            )));
        }
        if matrix.n_samples() < 2 {
            return Err(ComutError::InsufficientSamples(matrix.n_samples()));
        }
        let n_samples = matrix.n_samples() as u64;
        for (idx, count) in matrix.mutation_counts().iter().enumerate() {
            let degenerate_rate = model.rates(idx).iter().any(|p| !(*p > 0.0 && *p < 1.0));
            if *count == 0 || *count == n_samples || degenerate_rate {
                return Err(ComutError::DegenerateRate {
                    gene: matrix
                        .gene(idx)
                        .map_or_else(|| format!("row {idx}"), ToString::to_string),
                });
            }
        }
        Ok(Self {
            matrix,
            model,
            method: TailMethod::default(),
            correction: Correction::default(),
        })
    }

    /// Sets the calculation of the tail probabilities
    #[must_use]
    pub fn method(mut self, method: TailMethod) -> Self {
        self.method = method;
        self
    }

    /// Sets the multiple testing correction
    #[must_use]
    pub fn correction(mut self, correction: Correction) -> Self {
        self.correction = correction;
        self
    }

    /// Tests a single pair of genes
    ///
    /// The result does not depend on the order of `gene_a` and `gene_b`.
    /// The p-values are not adjusted for multiple testing.
    ///
    /// # Errors
    ///
    /// [`ComutError::InvalidParameter`] if a gene index is out of bounds
    /// or both indicies are the same
    pub fn test_pair(&self, gene_a: usize, gene_b: usize) -> ComutResult<PairTest> {
        let n_genes = self.matrix.n_genes();
        if gene_a >= n_genes || gene_b >= n_genes || gene_a == gene_b {
            return Err(ComutError::InvalidParameter(format!(
                "invalid gene pair {gene_a}, {gene_b} for {n_genes} genes"
            )));
        }
        Ok(self.compute(gene_a.min(gene_b), gene_a.max(gene_b)))
    }

    /// Tests every pair of genes and adjusts the p-values for multiple testing
    ///
    /// Pairs are returned ordered by their gene indicies.
    pub fn run(&self) -> ComutResult<Vec<PairTest>> {
        let n_genes = self.matrix.n_genes();
        info!(
            "Testing {} gene pairs in {} samples",
            GenePairs::count_pairs(n_genes),
            self.matrix.n_samples()
        );
        let mut results: Vec<PairTest> = (0..n_genes)
            .into_par_iter()
            .map(|gene_a| {
                GenePairs::row(n_genes, gene_a)
                    .map(|(a, b)| self.compute(a, b))
                    .collect::<Vec<PairTest>>()
            })
            .collect::<Vec<Vec<PairTest>>>()
            .into_iter()
            .flatten()
            .collect();

        let pvalues: Vec<f64> = results.iter().map(PairTest::pvalue).collect();
        for (result, qvalue) in results.iter_mut().zip(self.correction.adjust(&pvalues)) {
            result.qvalue = qvalue;
        }
        Ok(results)
    }

    /// The actual test, `gene_a` and `gene_b` must be valid row indicies
    fn compute(&self, gene_a: usize, gene_b: usize) -> PairTest {
        let overlap = self.matrix.overlap(gene_a, gene_b);
        let probabilities = self
            .model
            .rates(gene_a)
            .iter()
            .zip(self.model.rates(gene_b))
            .map(|(a, b)| a * b);

        let (expected, variance, pvalue_cooccurrence, pvalue_exclusivity) = match self.method {
            TailMethod::Exact => exact_tails(probabilities, overlap),
            TailMethod::Normal => {
                let probabilities: Vec<f64> = probabilities.collect();
                match RefinedNormal::new(probabilities.iter().copied()) {
                    Some(normal) => {
                        let (expected, variance) = moments(&probabilities);
                        let cooccurrence = if overlap == 0 {
                            1.0
                        } else {
                            normal.sf(overlap - 1)
                        };
                        (expected, variance, cooccurrence, normal.cdf(overlap))
                    }
                    None => exact_tails(probabilities.into_iter(), overlap),
                }
            }
        };
        trace!(
            "{}:{}\toverlap: {}, expected: {:.3}, co-occurrence: {:e}, exclusivity: {:e}",
            gene_a,
            gene_b,
            overlap,
            expected,
            pvalue_cooccurrence,
            pvalue_exclusivity
        );
        PairTest {
            gene_a,
            gene_b,
            overlap,
            expected,
            variance,
            pvalue_cooccurrence,
            pvalue_exclusivity,
            qvalue: pvalue_cooccurrence.min(pvalue_exclusivity),
        }
    }
}

/// Returns mean, variance and both tail probabilities of the exact distribution
fn exact_tails<I: Iterator<Item = f64>>(probabilities: I, overlap: u64) -> (f64, f64, f64, f64) {
    let dist = PoissonBinomial::new(probabilities);
    // subtracting 1, because we want to test including the observed overlap
    // e.g. "7 or more", but sf by default calculates "more than 7"
    let cooccurrence = if overlap == 0 {
        1.0
    } else {
        dist.sf(overlap - 1)
    };
    (
        dist.mean(),
        dist.variance(),
        cooccurrence,
        dist.cdf(overlap),
    )
}

fn moments(probabilities: &[f64]) -> (f64, f64) {
    probabilities
        .iter()
        .fold((0.0, 0.0), |(mean, var), p| (mean + p, var + p * (1.0 - p)))
}
