use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use comutation::parser;
use comutation::pipeline::AtStage;
use comutation::results::write_results;
use comutation::stats::correction::Correction;
use comutation::stats::pairwise::TailMethod;
use comutation::{
    Analysis, ComutError, ComutResult, Failure, MatrixBuilder, MissingPolicy, Stage,
    DEFAULT_ALPHA,
};

/// Co-occurrence and mutual exclusivity of driver gene mutations
#[derive(Parser, Debug)]
#[command(name = "comutation", version)]
struct Cli {
    /// Directory with one tab-delimited mutation table (`*.txt`) per cohort
    #[arg(long)]
    input: PathBuf,

    /// Directory for the result tables, created if it does not exist
    #[arg(long)]
    output: PathBuf,

    /// File with driver gene symbols, one per line. Other genes are ignored
    #[arg(long)]
    drivers: Option<PathBuf>,

    /// Significance threshold for the adjusted p-values
    #[arg(long, default_value_t = DEFAULT_ALPHA)]
    alpha: f64,

    /// Handling of genes or samples that are missing in some cohorts
    #[arg(long, value_enum, default_value_t = Missing::DropGenes)]
    missing: Missing,

    /// Calculation of the tail probabilities
    #[arg(long, value_enum, default_value_t = Method::Exact)]
    method: Method,

    /// Multiple testing correction
    #[arg(long, value_enum, default_value_t = Adjustment::Bh)]
    correction: Adjustment,

    /// Fit the background mutation rates separately for every cohort
    #[arg(long)]
    stratify: bool,

    /// Analyze every cohort separately instead of the pooled samples
    #[arg(long)]
    per_cohort: bool,

    /// Skip and report cohorts that cannot be loaded or analyzed
    #[arg(long)]
    skip_invalid: bool,

    /// Number of worker threads, defaults to the number of CPUs
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Missing {
    DropGenes,
    DropSamples,
    Zero,
}

impl From<Missing> for MissingPolicy {
    fn from(value: Missing) -> Self {
        match value {
            Missing::DropGenes => MissingPolicy::DropGenes,
            Missing::DropSamples => MissingPolicy::DropSamples,
            Missing::Zero => MissingPolicy::Zero,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    Exact,
    Normal,
}

impl From<Method> for TailMethod {
    fn from(value: Method) -> Self {
        match value {
            Method::Exact => TailMethod::Exact,
            Method::Normal => TailMethod::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Adjustment {
    Bh,
    Bonferroni,
}

impl From<Adjustment> for Correction {
    fn from(value: Adjustment) -> Self {
        match value {
            Adjustment::Bh => Correction::BenjaminiHochberg,
            Adjustment::Bonferroni => Correction::Bonferroni,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            error!("{}", failure);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Failure> {
    configure(cli).stage(Stage::Configuration)?;

    info!("Loading cohort tables from {}", cli.input.display());
    let tables = if cli.skip_invalid {
        let (tables, skipped) = parser::load_dir_lenient(&cli.input).stage(Stage::Loading)?;
        if !skipped.is_empty() {
            let files: Vec<String> = skipped
                .iter()
                .map(|(file, _)| file.display().to_string())
                .collect();
            warn!("Skipped {} cohort files: {}", files.len(), files.join(", "));
        }
        tables
    } else {
        parser::load_dir(&cli.input).stage(Stage::Loading)?
    };

    let mut builder = MatrixBuilder::new().missing_policy(cli.missing.into());
    if let Some(drivers) = &cli.drivers {
        let genes = parser::load_gene_list(drivers)
            .stage(Stage::Loading)
            .map_err(|failure| failure.with_subject(drivers.display()))?;
        info!("Loaded {} driver genes from {}", genes.len(), drivers.display());
        builder = builder.drivers(genes);
    }
    let analysis = Analysis::new()
        .builder(builder)
        .stratify(cli.stratify)
        .method(cli.method.into())
        .correction(cli.correction.into())
        .alpha(cli.alpha);

    std::fs::create_dir_all(&cli.output)
        .map_err(|source| ComutError::Io {
            path: cli.output.display().to_string(),
            source,
        })
        .stage(Stage::Writing)?;

    if !cli.per_cohort {
        let results = analysis.run(&tables)?;
        write_results(&cli.output, "pooled", &results).stage(Stage::Writing)?;
        return Ok(());
    }

    let runs = analysis.run_per_cohort(&tables, cli.skip_invalid)?;
    for (cohort, results) in runs.results() {
        write_results(&cli.output, cohort, results)
            .stage(Stage::Writing)
            .map_err(|failure| failure.with_subject(cohort))?;
    }
    Ok(())
}

fn configure(cli: &Cli) -> ComutResult<()> {
    if !(cli.alpha > 0.0 && cli.alpha <= 1.0) {
        return Err(ComutError::InvalidParameter(format!(
            "alpha must be within (0, 1], got {}",
            cli.alpha
        )));
    }
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|err| ComutError::InvalidParameter(err.to_string()))?;
    }
    Ok(())
}
