//! Parsing per-cohort mutation tables and driver gene lists
//!
//! A cohort table is a tab-delimited file with gene symbols as row labels
//! and sample identifiers as column labels:
//!
//! ```text
//! gene    S1  S2  S3
//! TP53    1   0   1
//! KRAS    0   NA  1
//! ```
//!
//! The cohort tag is derived from the file name (`BRCA_mutations.txt` => `BRCA`)
//! and prefixed to every sample, so samples are unique across cohorts.
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::gene::{GeneSymbol, SampleId};
use crate::matrix::Matrix;
use crate::mutations::builder::collapse_duplicates;
use crate::{ComutError, ComutResult};

/// Cell values that are treated as missing
const MISSING_VALUES: [&str; 5] = ["", "NA", "NaN", "nan", "."];

/// Header labels that can appear in the first line of a gene list
const GENE_LIST_HEADERS: [&str; 3] = ["SYMBOL", "GENE", "GENE_SYMBOL"];

/// The mutation calls of a single cohort file
///
/// Gene symbols are normalized and unique. If a symbol appears more than once
/// in the file, the rows are collapsed to their element-wise maximum, so
/// no mutation call is lost.
///
/// The gene rows are sorted lexically by symbol, independent of their order
/// in the file. Sample columns keep the file order.
#[derive(Debug, Clone)]
pub struct CohortTable {
    source: String,
    cohort: String,
    genes: Vec<GeneSymbol>,
    samples: Vec<SampleId>,
    values: Matrix<Option<f64>>,
}

impl CohortTable {
    /// Creates a new `CohortTable`, collapsing duplicate gene rows
    ///
    /// `rows` must contain one value per sample for every gene
    ///
    /// # Errors
    ///
    /// Returns [`ComutError::Schema`] if the table has no genes, no samples,
    /// duplicated samples or rows of the wrong length
    pub fn new(
        source: &str,
        cohort: &str,
        samples: Vec<SampleId>,
        genes: Vec<GeneSymbol>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> ComutResult<Self> {
        if samples.is_empty() {
            return Err(ComutError::schema(source, "no sample columns"));
        }
        if genes.is_empty() {
            return Err(ComutError::schema(source, "no gene rows"));
        }
        let mut seen = HashSet::new();
        for sample in &samples {
            if !seen.insert(sample) {
                return Err(ComutError::schema(
                    source,
                    format!("duplicate sample {}", sample.name()),
                ));
            }
        }
        if rows.iter().any(|row| row.len() != samples.len()) {
            return Err(ComutError::schema(
                source,
                "every gene row must have one value per sample",
            ));
        }
        let n_rows = genes.len();
        let (genes, values) = collapse_duplicates(genes, rows);
        if genes.len() < n_rows {
            debug!(
                "{}: collapsed {} duplicate gene rows",
                source,
                n_rows - genes.len()
            );
        }
        Ok(Self {
            source: source.to_string(),
            cohort: cohort.to_string(),
            genes,
            samples,
            values,
        })
    }

    /// The file (or other source) the table was read from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The cohort tag
    pub fn cohort(&self) -> &str {
        &self.cohort
    }

    /// The unique, normalized gene symbols (row labels), sorted lexically
    pub fn genes(&self) -> &[GeneSymbol] {
        &self.genes
    }

    /// The cohort-prefixed sample identifiers (column labels)
    pub fn samples(&self) -> &[SampleId] {
        &self.samples
    }

    /// The raw mutation calls, `None` for missing values
    pub fn values(&self) -> &Matrix<Option<f64>> {
        &self.values
    }
}

/// Derives the cohort tag from a file name
///
/// The tag is everything before the first `_` of the file name,
/// or the file stem, if there is no `_`.
///
/// ```
/// use comutation::parser::cohort_tag;
///
/// assert_eq!(cohort_tag("data/BRCA_mutations.txt").unwrap(), "BRCA");
/// assert_eq!(cohort_tag("LUAD.txt").unwrap(), "LUAD");
/// ```
pub fn cohort_tag<P: AsRef<Path>>(file: P) -> ComutResult<String> {
    let path = file.as_ref();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ComutError::schema(path.display(), "invalid file name"))?;
    let tag = stem.split('_').next().unwrap_or(stem).trim();
    if tag.is_empty() {
        return Err(ComutError::schema(
            path.display(),
            "unable to derive cohort from file name",
        ));
    }
    Ok(tag.to_string())
}

/// Parses a single cell value
fn parse_value(value: &str) -> Option<Result<f64, std::num::ParseFloatError>> {
    let value = value.trim();
    if MISSING_VALUES.contains(&value) {
        return None;
    }
    match value.parse::<f64>() {
        Ok(v) if v.is_nan() => None,
        res => Some(res),
    }
}

/// Parses a tab-delimited cohort table from `reader`
///
/// `source` is only used for error messages
pub fn parse_cohort<R: std::io::Read>(
    reader: R,
    source: &str,
    cohort: &str,
) -> ComutResult<CohortTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record.map_err(|err| ComutError::schema(source, err))?,
        None => return Err(ComutError::schema(source, "file is empty")),
    };
    if header.len() < 2 {
        return Err(ComutError::schema(
            source,
            "header must contain a gene column and at least one sample column",
        ));
    }
    let mut samples = Vec::with_capacity(header.len() - 1);
    for name in header.iter().skip(1) {
        if name.trim().is_empty() {
            return Err(ComutError::schema(source, "empty sample name in header"));
        }
        samples.push(SampleId::new(cohort, name));
    }

    let mut genes = Vec::new();
    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|err| ComutError::schema(source, err))?;
        let line = record.position().map_or(0, csv::Position::line);
        if record.len() == 1 && record[0].trim().is_empty() {
            continue;
        }
        if record.len() != header.len() {
            return Err(ComutError::schema(
                source,
                format!(
                    "line {line} has {} columns, expected {}",
                    record.len(),
                    header.len()
                ),
            ));
        }
        let gene = GeneSymbol::try_from(&record[0])
            .map_err(|_| ComutError::schema(source, format!("line {line} has no gene symbol")))?;

        let mut row = Vec::with_capacity(samples.len());
        for value in record.iter().skip(1) {
            match parse_value(value) {
                None => row.push(None),
                Some(Ok(v)) => row.push(Some(v)),
                Some(Err(_)) => {
                    return Err(ComutError::schema(
                        source,
                        format!("line {line}: invalid value '{value}' for {gene}"),
                    ))
                }
            }
        }
        genes.push(gene);
        rows.push(row);
    }
    CohortTable::new(source, cohort, samples, genes, rows)
}

/// Reads a single cohort file
///
/// The cohort tag is derived from the file name, see [`cohort_tag`]
///
/// # Errors
///
/// - [`ComutError::Io`] if the file cannot be opened
/// - [`ComutError::Schema`] if the file is not a valid cohort table
pub fn load_cohort<P: AsRef<Path>>(file: P) -> ComutResult<CohortTable> {
    let path = file.as_ref();
    let source = path.display().to_string();
    let cohort = cohort_tag(path)?;
    let reader = File::open(path).map_err(|source_err| ComutError::Io {
        path: source.clone(),
        source: source_err,
    })?;
    let table = parse_cohort(reader, &source, &cohort)?;
    debug!(
        "Loaded {}: cohort {}, {} genes, {} samples",
        source,
        cohort,
        table.genes().len(),
        table.samples().len()
    );
    Ok(table)
}

/// Reads all cohort files
///
/// Fails on the first file that cannot be read
pub fn load<P: AsRef<Path>>(files: &[P]) -> ComutResult<Vec<CohortTable>> {
    let tables = files
        .iter()
        .map(load_cohort)
        .collect::<ComutResult<Vec<CohortTable>>>()?;
    info!("Loaded {} cohort tables", tables.len());
    Ok(tables)
}

/// Reads all cohort files (`*.txt`) in `dir`, sorted by file name
///
/// # Errors
///
/// - [`ComutError::Io`] if the directory or a file cannot be read
/// - [`ComutError::Schema`] if a file is not a valid cohort table
pub fn load_dir<P: AsRef<Path>>(dir: P) -> ComutResult<Vec<CohortTable>> {
    load(&cohort_files(dir)?)
}

/// Reads all cohort files (`*.txt`) in `dir`, skipping invalid files
///
/// Returns the valid tables and every file that could not be loaded,
/// together with the reason. Both are sorted by file name.
///
/// # Errors
///
/// [`ComutError::Io`] if the directory cannot be read
pub fn load_dir_lenient<P: AsRef<Path>>(
    dir: P,
) -> ComutResult<(Vec<CohortTable>, Vec<(PathBuf, ComutError)>)> {
    let mut tables = Vec::new();
    let mut skipped = Vec::new();
    for file in cohort_files(dir)? {
        match load_cohort(&file) {
            Ok(table) => tables.push(table),
            Err(err) => {
                warn!("Skipping {}: {}", file.display(), err);
                skipped.push((file, err));
            }
        }
    }
    info!("Loaded {} cohort tables, skipped {}", tables.len(), skipped.len());
    Ok((tables, skipped))
}

/// Lists all cohort files (`*.txt`) in `dir`, sorted by file name
pub fn cohort_files<P: AsRef<Path>>(dir: P) -> ComutResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let io_err = |source| ComutError::Io {
        path: dir.display().to_string(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parses a list of gene symbols, one per line
///
/// Only the first tab-delimited column is used. Blank lines, comments (`#`)
/// and a header line are ignored.
pub fn parse_gene_list<R: BufRead>(reader: R, source: &str) -> ComutResult<HashSet<GeneSymbol>> {
    let mut genes = HashSet::new();
    for line in reader.lines() {
        let line = line.map_err(|err| ComutError::Io {
            path: source.to_string(),
            source: err,
        })?;
        if line.trim_start().starts_with('#') {
            continue;
        }
        let Some(first) = line.split('\t').next() else {
            continue;
        };
        let Ok(gene) = GeneSymbol::try_from(first) else {
            continue;
        };
        if genes.is_empty() && GENE_LIST_HEADERS.contains(&gene.as_str()) {
            continue;
        }
        genes.insert(gene);
    }
    Ok(genes)
}

/// Reads a driver gene list from `file`, see [`parse_gene_list`]
pub fn load_gene_list<P: AsRef<Path>>(file: P) -> ComutResult<HashSet<GeneSymbol>> {
    let path = file.as_ref();
    let source = path.display().to_string();
    let reader = File::open(path).map_err(|err| ComutError::Io {
        path: source.clone(),
        source: err,
    })?;
    let genes = parse_gene_list(BufReader::new(reader), &source)?;
    info!("Loaded {} genes from {}", genes.len(), source);
    Ok(genes)
}
