//! Running the complete analysis on cohort tables
//!
//! [`Analysis`] holds the settings of every step, from building the mutation
//! matrix to classifying the gene pairs. It analyzes either the pooled samples
//! of all cohorts or every cohort on its own.
//!
//! Errors are reported as [`Failure`], which names the [`Stage`] that failed
//! and, in per-cohort runs, the cohort.
use std::collections::BTreeMap;
use std::fmt::Display;

use tracing::{info, warn};

use crate::mutations::builder::MatrixBuilder;
use crate::parser::CohortTable;
use crate::results::{aggregate, Aggregation};
use crate::stats::background::{FitOptions, RateModel};
use crate::stats::correction::Correction;
use crate::stats::pairwise::{PairwiseTest, TailMethod};
use crate::{ComutError, ComutResult, DEFAULT_ALPHA};

/// The steps of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configuration,
    Loading,
    Building,
    Estimating,
    Testing,
    Writing,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Configuration => write!(f, "configuration"),
            Stage::Loading => write!(f, "loading"),
            Stage::Building => write!(f, "building the mutation matrix"),
            Stage::Estimating => write!(f, "estimating background rates"),
            Stage::Testing => write!(f, "testing gene pairs"),
            Stage::Writing => write!(f, "writing results"),
        }
    }
}

/// An error together with the [`Stage`] and the input it occurred in
#[derive(Debug)]
pub struct Failure {
    stage: Stage,
    subject: Option<String>,
    error: ComutError,
}

impl Failure {
    pub fn new(stage: Stage, error: ComutError) -> Self {
        Self {
            stage,
            subject: None,
            error,
        }
    }

    /// Names the cohort or file that caused the failure
    pub fn with_subject<S: ToString>(mut self, subject: S) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The cohort or file that caused the failure, if known
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn error(&self) -> &ComutError {
        &self.error
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.subject {
            Some(subject) => write!(f, "{} failed for {}: {}", self.stage, subject, self.error),
            None => write!(f, "{} failed: {}", self.stage, self.error),
        }
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Attaches a [`Stage`] to the error of a [`ComutResult`]
pub trait AtStage<T> {
    fn stage(self, stage: Stage) -> Result<T, Failure>;
}

impl<T> AtStage<T> for ComutResult<T> {
    fn stage(self, stage: Stage) -> Result<T, Failure> {
        self.map_err(|error| Failure::new(stage, error))
    }
}

/// The outcome of [`Analysis::run_per_cohort`]
#[derive(Debug, Default)]
pub struct CohortRuns {
    results: Vec<(String, Aggregation)>,
    skipped: Vec<Failure>,
}

impl CohortRuns {
    /// The results of every analyzed cohort, sorted by cohort tag
    pub fn results(&self) -> &[(String, Aggregation)] {
        &self.results
    }

    /// The results of `cohort`, if it was analyzed
    pub fn get(&self, cohort: &str) -> Option<&Aggregation> {
        self.results
            .iter()
            .find(|(tag, _)| tag == cohort)
            .map(|(_, results)| results)
    }

    /// The cohorts that could not be analyzed
    pub fn skipped(&self) -> &[Failure] {
        &self.skipped
    }
}

/// Settings of a complete analysis
///
/// # Examples
///
/// ```
/// use comutation::parser::parse_cohort;
/// use comutation::pipeline::Analysis;
///
/// let content = "gene\tS1\tS2\tS3\tS4\n\
///     KRAS\t1\t1\t0\t0\n\
///     TP53\t0\t1\t1\t0\n\
///     EGFR\t1\t0\t0\t1\n";
/// let table = parse_cohort(content.as_bytes(), "LUAD.txt", "LUAD").unwrap();
///
/// let results = Analysis::new().alpha(0.1).run(&[table]).unwrap();
/// assert_eq!(results.len(), 3);
/// assert_eq!(results.alpha(), 0.1);
/// ```
#[derive(Debug, Clone)]
pub struct Analysis {
    builder: MatrixBuilder,
    fit: FitOptions,
    stratify: bool,
    method: TailMethod,
    correction: Correction,
    alpha: f64,
}

impl Default for Analysis {
    fn default() -> Self {
        Self {
            builder: MatrixBuilder::default(),
            fit: FitOptions::default(),
            stratify: false,
            method: TailMethod::default(),
            correction: Correction::default(),
            alpha: DEFAULT_ALPHA,
        }
    }
}

impl Analysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the [`MatrixBuilder`] that turns the tables into a mutation matrix
    pub fn builder(mut self, builder: MatrixBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn fit_options(mut self, options: FitOptions) -> Self {
        self.fit = options;
        self
    }

    /// Fit the background rates separately for every cohort
    pub fn stratify(mut self, stratify: bool) -> Self {
        self.stratify = stratify;
        self
    }

    pub fn method(mut self, method: TailMethod) -> Self {
        self.method = method;
        self
    }

    pub fn correction(mut self, correction: Correction) -> Self {
        self.correction = correction;
        self
    }

    /// Sets the significance threshold, it is checked by [`aggregate`]
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Analyzes the pooled samples of all `tables`
    ///
    /// # Errors
    ///
    /// A [`Failure`] with the stage and the error of the first failing step
    pub fn run(&self, tables: &[CohortTable]) -> Result<Aggregation, Failure> {
        let matrix = self.builder.build(tables).stage(Stage::Building)?;
        info!(
            "Mutation matrix of {} genes and {} samples",
            matrix.n_genes(),
            matrix.n_samples()
        );

        let model = if self.stratify {
            RateModel::estimate_stratified(&matrix, &self.fit)
        } else {
            RateModel::estimate_with(&matrix, &self.fit)
        }
        .stage(Stage::Estimating)?;

        let tests = PairwiseTest::new(&matrix, &model)
            .and_then(|test| test.method(self.method).correction(self.correction).run())
            .stage(Stage::Testing)?;

        let results = aggregate(&matrix, &tests, self.alpha).stage(Stage::Testing)?;
        info!(
            "{} gene pairs, {} co-occurring, {} mutually exclusive (alpha {})",
            results.len(),
            results.co_occurring().count(),
            results.mutually_exclusive().count(),
            results.alpha()
        );
        Ok(results)
    }

    /// Analyzes every cohort on its own
    ///
    /// Tables with the same cohort tag are analyzed together.
    /// With `skip_invalid`, failing cohorts are collected in
    /// [`CohortRuns::skipped`] and the remaining cohorts are still analyzed.
    ///
    /// # Errors
    ///
    /// Without `skip_invalid`, the [`Failure`] of the first failing cohort.
    /// Its subject is the cohort tag.
    pub fn run_per_cohort(
        &self,
        tables: &[CohortTable],
        skip_invalid: bool,
    ) -> Result<CohortRuns, Failure> {
        let mut cohorts: BTreeMap<&str, Vec<CohortTable>> = BTreeMap::new();
        for table in tables {
            cohorts.entry(table.cohort()).or_default().push(table.clone());
        }

        let mut runs = CohortRuns::default();
        for (cohort, tables) in cohorts {
            info!("Analyzing cohort {} ({} tables)", cohort, tables.len());
            match self.run(&tables) {
                Ok(results) => runs.results.push((cohort.to_string(), results)),
                Err(failure) if skip_invalid => {
                    let failure = failure.with_subject(cohort);
                    warn!("Skipping cohort: {}", failure);
                    runs.skipped.push(failure);
                }
                Err(failure) => return Err(failure.with_subject(cohort)),
            }
        }
        if !runs.skipped.is_empty() {
            let names: Vec<&str> = runs.skipped.iter().filter_map(Failure::subject).collect();
            warn!("Skipped {} cohorts: {}", names.len(), names.join(", "));
        }
        Ok(runs)
    }
}
