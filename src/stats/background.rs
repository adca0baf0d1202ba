//! Background mutation rates that account for heterogeneous mutation burden
//!
//! Every (gene, sample) pair gets a mutation probability
//!
//! ```text
//! p_ij = 1 / (1 + exp(-(mu_i + lambda_j)))
//! ```
//!
//! where `mu_i` describes how frequently gene `i` is mutated and `lambda_j`
//! the mutation burden of sample `j`. The parameters are the maximum likelihood
//! estimates under the constraint that the expected number of mutations of every
//! gene and of every sample equals the observed number.
//!
//! All genes with the same number of mutations share the same `mu`, all samples
//! with the same burden share the same `lambda`. The fit therefore only works
//! on the distinct marginal totals, which are much fewer than genes and samples.
use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::matrix::Matrix;
use crate::mutations::MutationMatrix;
use crate::stats::{f64_from_u64, f64_from_usize};
use crate::{ComutError, ComutResult};

/// The lowest and highest probability of the model
pub const MIN_PROBABILITY: f64 = 1e-12;

/// Parameters are bounded to `[-MAX_PARAMETER, MAX_PARAMETER]`
const MAX_PARAMETER: f64 = 30.0;

/// Largest change of a parameter in a single Newton step
const MAX_STEP: f64 = 5.0;

/// Convergence settings of the background fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Maximum number of rounds of parameter updates
    pub max_iterations: usize,
    /// The fit has converged when no parameter changes by more than this
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-10,
        }
    }
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Per gene and per sample probabilities of a mutation
///
/// The rates are estimated from the [`MutationMatrix`] itself and have the
/// same shape: one row per gene, one column per sample. Every rate is
/// strictly between `0` and `1`.
///
/// ```mermaid
/// graph LR
///     M[MutationMatrix] -->|row sums| G[gene totals]
///     M -->|column sums| S[sample burden]
///     G --> F[logistic fit]
///     S --> F
///     F --> R[RateModel]
/// ```
///
/// # Examples
///
/// ```
/// use comutation::{GeneSymbol, MutationMatrix, RateModel, SampleId};
///
/// let genes = vec![
///     GeneSymbol::try_from("TP53").unwrap(),
///     GeneSymbol::try_from("KRAS").unwrap(),
///     GeneSymbol::try_from("EGFR").unwrap(),
/// ];
/// let samples: Vec<SampleId> = (0..6)
///     .map(|i| SampleId::new("LUAD", &i.to_string()))
///     .collect();
/// let matrix = MutationMatrix::new(genes, samples, vec![
///     1, 1, 0, 1, 0, 0,
///     1, 0, 1, 0, 1, 0,
///     0, 1, 1, 0, 0, 1,
/// ]).unwrap();
///
/// let model = RateModel::estimate(&matrix).unwrap();
///
/// // the first three samples carry two mutations, the others only one
/// let tp53 = model.rates(0);
/// assert!(tp53[0] > tp53[3]);
/// assert!((tp53[0] - tp53[2]).abs() < 1e-9);
/// assert!(tp53.iter().all(|p| *p > 0.0 && *p < 1.0));
/// ```
#[derive(Debug, Clone)]
pub struct RateModel {
    rates: Matrix<f64>,
}

impl RateModel {
    /// Estimates the background rates with the default [`FitOptions`]
    ///
    /// # Errors
    ///
    /// - [`ComutError::EmptyMatrix`] if the matrix has no genes
    /// - [`ComutError::InsufficientSamples`] if the matrix has less than 2 samples
    /// - [`ComutError::DegenerateRate`] if a gene is mutated in no or in all samples
    pub fn estimate(matrix: &MutationMatrix) -> ComutResult<Self> {
        Self::estimate_with(matrix, &FitOptions::default())
    }

    /// Estimates the background rates using all samples as one stratum
    ///
    /// # Errors
    ///
    /// See [`RateModel::estimate`]
    pub fn estimate_with(matrix: &MutationMatrix, options: &FitOptions) -> ComutResult<Self> {
        validate(matrix)?;
        let rates = fit_block(matrix.data(), options);
        let model = Self { rates };
        model.check(matrix)?;
        Ok(model)
    }

    /// Estimates the background rates separately for every cohort
    ///
    /// The samples of each cohort are fitted independently, so the
    /// mutation frequency of a gene in one tumor type does not influence
    /// the rates in another one. Within a single cohort, a gene can be
    /// mutated in no or in all samples.
    ///
    /// # Errors
    ///
    /// See [`RateModel::estimate`]
    pub fn estimate_stratified(matrix: &MutationMatrix, options: &FitOptions) -> ComutResult<Self> {
        validate(matrix)?;
        let (n_genes, n_samples) = matrix.data().dim();
        let mut rates = vec![0.0; n_genes * n_samples];
        for cohort in matrix.cohorts() {
            let columns: Vec<usize> = matrix
                .samples()
                .iter()
                .enumerate()
                .filter_map(|(idx, s)| (s.cohort() == cohort).then_some(idx))
                .collect();
            debug!("Fitting stratum {} with {} samples", cohort, columns.len());
            let block = fit_block(&matrix.data().select_cols(&columns), options);
            for (gene, row) in block.rows().enumerate() {
                for (col, rate) in columns.iter().zip(row) {
                    rates[gene * n_samples + col] = *rate;
                }
            }
        }
        let model = Self {
            rates: Matrix::new(n_genes, n_samples, rates),
        };
        model.check(matrix)?;
        Ok(model)
    }

    /// The mutation probabilities of the gene in row `gene` for every sample
    ///
    /// # Panics
    ///
    /// Panics if `gene` is out of bounds
    pub fn rates(&self, gene: usize) -> &[f64] {
        self.rates.row(gene)
    }

    /// The mutation probability of `gene` in `sample`
    pub fn rate(&self, gene: usize, sample: usize) -> Option<f64> {
        self.rates.get(gene, sample).copied()
    }

    /// Returns a Tuple with number of genes and number of samples
    pub fn dim(&self) -> (usize, usize) {
        self.rates.dim()
    }

    /// The expected number of mutations of every gene
    pub fn expected_mutations(&self) -> Vec<f64> {
        self.rates.rows().map(|row| row.sum()).collect()
    }

    /// The expected mutation burden of every sample
    pub fn expected_burden(&self) -> Vec<f64> {
        let mut burden = vec![0.0; self.rates.dim().1];
        for row in self.rates.rows() {
            for (b, p) in burden.iter_mut().zip(row) {
                *b += p;
            }
        }
        burden
    }

    /// Ensures that every rate is a valid probability
    fn check(&self, matrix: &MutationMatrix) -> ComutResult<()> {
        for (idx, mut row) in self.rates.rows().enumerate() {
            if row.any(|p| !(*p > 0.0 && *p < 1.0)) {
                return Err(degenerate(matrix, idx));
            }
        }
        Ok(())
    }
}

fn degenerate(matrix: &MutationMatrix, gene: usize) -> ComutError {
    ComutError::DegenerateRate {
        gene: matrix
            .gene(gene)
            .map_or_else(|| format!("row {gene}"), ToString::to_string),
    }
}

/// Checks that the matrix can be fitted
fn validate(matrix: &MutationMatrix) -> ComutResult<()> {
    if matrix.n_samples() < 2 {
        return Err(ComutError::InsufficientSamples(matrix.n_samples()));
    }
    if matrix.n_genes() == 0 {
        return Err(ComutError::EmptyMatrix);
    }
    let n_samples = matrix.n_samples() as u64;
    if let Some(idx) = matrix
        .mutation_counts()
        .iter()
        .position(|count| *count == 0 || *count == n_samples)
    {
        return Err(degenerate(matrix, idx));
    }
    Ok(())
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Distinct marginal totals and how often they occur
struct Marginals {
    /// The distinct totals
    totals: Vec<f64>,
    /// How many rows (or columns) have each total
    counts: Vec<f64>,
    /// The index into `totals` of every row (or column)
    groups: Vec<usize>,
}

impl Marginals {
    fn new(sums: &[u64]) -> Self {
        let mut distinct: BTreeMap<u64, usize> = BTreeMap::new();
        for sum in sums {
            *distinct.entry(*sum).or_default() += 1;
        }
        let index: BTreeMap<u64, usize> = distinct
            .keys()
            .enumerate()
            .map(|(idx, sum)| (*sum, idx))
            .collect();
        Self {
            totals: distinct.keys().map(|sum| f64_from_u64(*sum)).collect(),
            counts: distinct.values().map(|count| f64_from_usize(*count)).collect(),
            groups: sums.iter().map(|sum| index[sum]).collect(),
        }
    }

    fn len(&self) -> usize {
        self.totals.len()
    }
}

/// One damped Newton step towards `sum_k counts[k] * sigmoid(param + others[k]) == target`
///
/// Returns the updated parameter
fn newton_update(param: f64, target: f64, others: &[f64], counts: &[f64]) -> f64 {
    let mut expected = 0.0;
    let mut slope = 0.0;
    for (other, count) in others.iter().zip(counts) {
        let p = sigmoid(param + other);
        expected += count * p;
        slope += count * p * (1.0 - p);
    }
    let diff = expected - target;
    let step = if slope > 0.0 {
        (diff / slope).clamp(-MAX_STEP, MAX_STEP)
    } else if diff == 0.0 {
        0.0
    } else {
        MAX_STEP.copysign(diff)
    };
    (param - step).clamp(-MAX_PARAMETER, MAX_PARAMETER)
}

/// Fits the rates of a block of samples
///
/// Rows and columns of the block can be constant, their parameters
/// will then converge to the bounds.
fn fit_block(data: &Matrix<u8>, options: &FitOptions) -> Matrix<f64> {
    let (n_rows, n_cols) = data.dim();
    let rows = Marginals::new(&data.row_sums());
    let cols = Marginals::new(&data.col_sums());

    let n_cols_f = f64_from_usize(n_cols);
    let mut mu: Vec<f64> = rows
        .totals
        .iter()
        .map(|total| ((total + 0.5) / (n_cols_f - total + 0.5)).ln())
        .collect();
    let mut lambda = vec![0.0; cols.len()];

    let mut converged = false;
    let mut iterations = 0;
    while iterations < options.max_iterations {
        iterations += 1;
        let mut max_change = 0.0f64;
        for (idx, target) in rows.totals.iter().enumerate() {
            let updated = newton_update(mu[idx], *target, &lambda, &cols.counts);
            max_change = max_change.max((updated - mu[idx]).abs());
            mu[idx] = updated;
        }
        for (idx, target) in cols.totals.iter().enumerate() {
            let updated = newton_update(lambda[idx], *target, &mu, &rows.counts);
            max_change = max_change.max((updated - lambda[idx]).abs());
            lambda[idx] = updated;
        }
        if max_change < options.tolerance {
            converged = true;
            break;
        }
    }
    if converged {
        debug!(
            "Background fit of {} x {} converged after {} iterations",
            n_rows, n_cols, iterations
        );
    } else {
        warn!(
            "Background fit of {} x {} did not converge after {} iterations",
            n_rows, n_cols, iterations
        );
    }

    let mut rates = Vec::with_capacity(n_rows * n_cols);
    for row_group in &rows.groups {
        for col_group in &cols.groups {
            let p = sigmoid(mu[*row_group] + lambda[*col_group]);
            rates.push(p.clamp(MIN_PROBABILITY, 1.0 - MIN_PROBABILITY));
        }
    }
    Matrix::new(n_rows, n_cols, rates)
}
