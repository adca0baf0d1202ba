#![doc = include_str!("../README.md")]
use core::fmt::Debug;
use thiserror::Error;

pub mod gene;
pub mod matrix;
pub mod mutations;
pub mod parser;
pub mod pipeline;
pub mod results;
pub mod stats;
pub mod utils;

pub use gene::{GeneSymbol, SampleId};
pub use mutations::builder::{MatrixBuilder, MissingPolicy};
pub use mutations::MutationMatrix;
pub use pipeline::{Analysis, Failure, Stage};
pub use results::{aggregate, Aggregation, Direction, GenePairResult};
pub use stats::background::RateModel;
pub use stats::pairwise::{PairTest, PairwiseTest};

/// The significance threshold used when none is specified
pub const DEFAULT_ALPHA: f64 = 0.05;

#[derive(Error, Debug)]
pub enum ComutError {
    #[error("invalid table in {file}: {reason}")]
    Schema { file: String, reason: String },
    #[error("no genes or samples left in the mutation matrix")]
    EmptyMatrix,
    #[error("background mutation rate of {gene} is degenerate")]
    DegenerateRate { gene: String },
    #[error("at least 2 samples are required, found {0}")]
    InsufficientSamples(usize),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl ComutError {
    pub(crate) fn schema<F: ToString, R: ToString>(file: F, reason: R) -> Self {
        ComutError::Schema {
            file: file.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type ComutResult<T> = Result<T, ComutError>;
