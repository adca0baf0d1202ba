//! Building a [`MutationMatrix`] from per-cohort tables
//!
//! The matrix is built as a pure fold over the cohort tables: every step
//! takes the previous matrix by reference and returns a new one.
use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::gene::{GeneSymbol, SampleId};
use crate::matrix::Matrix;
use crate::mutations::MutationMatrix;
use crate::parser::CohortTable;
use crate::{ComutError, ComutResult};

/// How cells without a mutation call are handled
///
/// A gene that is absent from a cohort file has no calls for that cohort's
/// samples. This is missing data, not evidence that the gene is unmutated,
/// so the caller must decide explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Remove every gene with at least one missing value
    #[default]
    DropGenes,
    /// Remove every sample with at least one missing value
    DropSamples,
    /// Treat missing values as not mutated
    Zero,
}

/// A merged, not yet binarized, mutation table
///
/// In contrast to [`MutationMatrix`], gene symbols can appear more than once
/// and values can be missing or continuous mutation scores.
#[derive(Debug, Clone)]
pub struct RawMatrix {
    genes: Vec<GeneSymbol>,
    samples: Vec<SampleId>,
    values: Matrix<Option<f64>>,
}

impl Default for RawMatrix {
    fn default() -> Self {
        Self {
            genes: Vec::new(),
            samples: Vec::new(),
            values: Matrix::new(0, 0, Vec::new()),
        }
    }
}

impl RawMatrix {
    /// The gene symbols, in row order. Can contain duplicates
    pub fn genes(&self) -> &[GeneSymbol] {
        &self.genes
    }

    /// The sample identifiers, in column order
    pub fn samples(&self) -> &[SampleId] {
        &self.samples
    }

    /// The raw values, `None` if missing
    pub fn values(&self) -> &Matrix<Option<f64>> {
        &self.values
    }

    /// Adds all rows of `table`, returning the combined matrix
    ///
    /// Samples that are new are added as new columns. Existing rows have
    /// no values for those columns and the new rows have no values for
    /// the existing columns.
    fn append(&self, table: &CohortTable) -> RawMatrix {
        let mut samples = self.samples.clone();
        let mut sample_index: HashMap<&SampleId, usize> = self
            .samples
            .iter()
            .enumerate()
            .map(|(idx, sample)| (sample, idx))
            .collect();

        let mut columns = Vec::with_capacity(table.samples().len());
        for sample in table.samples() {
            let col = match sample_index.get(sample) {
                Some(col) => {
                    warn!(
                        "Sample {} of {} is already present, calls are combined",
                        sample,
                        table.source()
                    );
                    *col
                }
                None => {
                    samples.push(sample.clone());
                    sample_index.insert(sample, samples.len() - 1);
                    samples.len() - 1
                }
            };
            columns.push(col);
        }

        let n_cols = samples.len();
        let mut rows: Vec<Vec<Option<f64>>> =
            Vec::with_capacity(self.genes.len() + table.genes().len());
        for row in self.values.rows() {
            let mut row: Vec<Option<f64>> = row.copied().collect();
            row.resize(n_cols, None);
            rows.push(row);
        }
        for table_row in table.values().rows() {
            let mut row = vec![None; n_cols];
            for (col, value) in columns.iter().zip(table_row) {
                row[*col] = max_value(row[*col], *value);
            }
            rows.push(row);
        }

        let mut genes = self.genes.clone();
        genes.extend(table.genes().iter().cloned());
        let values = Matrix::new(genes.len(), n_cols, rows.into_iter().flatten().collect());
        RawMatrix {
            genes,
            samples,
            values,
        }
    }

    /// Returns a new matrix with only the rows of `genes`
    pub fn restrict_to(&self, genes: &HashSet<GeneSymbol>) -> RawMatrix {
        let keep: Vec<bool> = self.genes.iter().map(|g| genes.contains(g)).collect();
        RawMatrix {
            genes: self
                .genes
                .iter()
                .filter(|g| genes.contains(*g))
                .cloned()
                .collect(),
            samples: self.samples.clone(),
            values: self.values.filter_rows(&keep),
        }
    }
}

/// The maximum of two optional values, ignoring missing values
///
/// For binary mutation calls, this is a logical OR
fn max_value(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

/// Collapses rows with the same gene symbol into their element-wise maximum
///
/// Genes are returned in lexical order
pub(crate) fn collapse_duplicates(
    genes: Vec<GeneSymbol>,
    rows: Vec<Vec<Option<f64>>>,
) -> (Vec<GeneSymbol>, Matrix<Option<f64>>) {
    let n_cols = rows.first().map_or(0, Vec::len);
    let mut collapsed: BTreeMap<GeneSymbol, Vec<Option<f64>>> = BTreeMap::new();
    for (gene, row) in genes.into_iter().zip(rows) {
        match collapsed.get_mut(&gene) {
            Some(existing) => {
                debug!("Collapsing duplicate rows of {}", gene);
                for (current, value) in existing.iter_mut().zip(row) {
                    *current = max_value(*current, value);
                }
            }
            None => {
                collapsed.insert(gene, row);
            }
        }
    }
    let n_rows = collapsed.len();
    let mut genes = Vec::with_capacity(n_rows);
    let mut data = Vec::with_capacity(n_rows * n_cols);
    for (gene, row) in collapsed {
        genes.push(gene);
        data.extend(row);
    }
    (genes, Matrix::new(n_rows, n_cols, data))
}

/// Outer-joins all cohort tables on the gene axis
///
/// The result has one column per sample of all tables and one row
/// per gene row of each table. A gene that appears in more than one table
/// has more than one row, use [`harmonize_duplicate_genes`] to collapse them.
///
/// # Errors
///
/// [`ComutError::EmptyMatrix`] if `tables` is empty
pub fn merge(tables: &[CohortTable]) -> ComutResult<RawMatrix> {
    if tables.is_empty() {
        return Err(ComutError::EmptyMatrix);
    }
    let merged = tables
        .iter()
        .fold(RawMatrix::default(), |acc, table| acc.append(table));
    debug!(
        "Merged {} tables into {} rows and {} samples",
        tables.len(),
        merged.genes.len(),
        merged.samples.len()
    );
    Ok(merged)
}

/// Collapses all rows with the same gene symbol into their element-wise maximum
///
/// Missing values are ignored, so a gene that is present in two cohorts
/// gets the calls of both cohorts.
pub fn harmonize_duplicate_genes(raw: &RawMatrix) -> RawMatrix {
    let rows: Vec<Vec<Option<f64>>> = raw.values.rows().map(|row| row.copied().collect()).collect();
    let (genes, values) = collapse_duplicates(raw.genes.clone(), rows);
    let values = if genes.is_empty() {
        Matrix::new(0, raw.samples.len(), Vec::new())
    } else {
        values
    };
    RawMatrix {
        genes,
        samples: raw.samples.clone(),
        values,
    }
}

/// Turns the raw values into binary mutation calls
///
/// Missing values are handled according to `policy`, they are never imputed
/// as mutations. Values are clipped to `[0, 1]` and truncated, so only
/// values of `1` or higher count as a mutation.
///
/// # Errors
///
/// [`ComutError::InvalidParameter`] if `raw` contains duplicate genes
pub fn binarize(raw: &RawMatrix, policy: MissingPolicy) -> ComutResult<MutationMatrix> {
    let (genes, samples, values) = match policy {
        MissingPolicy::DropGenes => {
            let keep: Vec<bool> = raw
                .values
                .rows()
                .map(|mut row| row.all(Option::is_some))
                .collect();
            let genes = raw
                .genes
                .iter()
                .zip(&keep)
                .filter(|(_, k)| **k)
                .map(|(g, _)| g.clone())
                .collect::<Vec<_>>();
            info!(
                "Dropped {} genes with missing values",
                raw.genes.len() - genes.len()
            );
            (genes, raw.samples.clone(), raw.values.filter_rows(&keep))
        }
        MissingPolicy::DropSamples => {
            let keep: Vec<bool> = raw
                .values
                .cols()
                .map(|mut col| col.all(Option::is_some))
                .collect();
            let samples = raw
                .samples
                .iter()
                .zip(&keep)
                .filter(|(_, k)| **k)
                .map(|(s, _)| s.clone())
                .collect::<Vec<_>>();
            info!(
                "Dropped {} samples with missing values",
                raw.samples.len() - samples.len()
            );
            (raw.genes.clone(), samples, raw.values.filter_cols(&keep))
        }
        MissingPolicy::Zero => (raw.genes.clone(), raw.samples.clone(), raw.values.clone()),
    };
    let data = values.map(|value| match value {
        Some(v) if v.clamp(0.0, 1.0) >= 1.0 => 1u8,
        _ => 0u8,
    });
    MutationMatrix::from_parts(genes, samples, data)
}

/// Returns a new matrix with only the rows of `genes`
///
/// Genes in `genes` that are not part of the matrix are ignored
pub fn restrict_to(matrix: &MutationMatrix, genes: &HashSet<GeneSymbol>) -> MutationMatrix {
    let keep: Vec<bool> = matrix.genes().iter().map(|g| genes.contains(g)).collect();
    matrix.filter_genes(&keep)
}

/// Removes all genes that are mutated in no sample or in every sample
///
/// Such genes carry no information about co-occurrence or mutual exclusivity.
///
/// # Errors
///
/// - [`ComutError::EmptyMatrix`] if the matrix has no samples or no gene is left
/// - [`ComutError::InsufficientSamples`] if the matrix has less than 2 samples
pub fn filter_informative(matrix: &MutationMatrix) -> ComutResult<MutationMatrix> {
    let n_samples = matrix.n_samples();
    if n_samples == 0 {
        return Err(ComutError::EmptyMatrix);
    }
    if n_samples < 2 {
        return Err(ComutError::InsufficientSamples(n_samples));
    }
    let n_samples = n_samples as u64;
    let keep: Vec<bool> = matrix
        .mutation_counts()
        .iter()
        .map(|count| *count > 0 && *count < n_samples)
        .collect();
    let filtered = matrix.filter_genes(&keep);
    info!(
        "Removed {} non-informative genes, {} genes left",
        matrix.n_genes() - filtered.n_genes(),
        filtered.n_genes()
    );
    if filtered.n_genes() == 0 {
        return Err(ComutError::EmptyMatrix);
    }
    Ok(filtered)
}

/// Builds a [`MutationMatrix`] from cohort tables
///
/// # Examples
///
/// ```
/// use comutation::parser::parse_cohort;
/// use comutation::{GeneSymbol, MatrixBuilder, MissingPolicy};
///
/// let luad = parse_cohort(
///     "gene\tS1\tS2\nKRAS\t1\t0\nTP53\t1\t1\n".as_bytes(),
///     "LUAD_calls.txt",
///     "LUAD",
/// ).unwrap();
/// let coad = parse_cohort(
///     "gene\tS1\tS2\nkras\t0\t1\nTP53\t1\t1\n".as_bytes(),
///     "COAD_calls.txt",
///     "COAD",
/// ).unwrap();
///
/// let matrix = MatrixBuilder::new()
///     .missing_policy(MissingPolicy::DropGenes)
///     .build(&[luad, coad])
///     .unwrap();
///
/// // TP53 is mutated in every sample and removed
/// assert_eq!(matrix.n_genes(), 1);
/// assert_eq!(matrix.n_samples(), 4);
/// assert_eq!(matrix.row(0), &[1, 0, 0, 1]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct MatrixBuilder {
    missing: MissingPolicy,
    drivers: Option<HashSet<GeneSymbol>>,
}

impl MatrixBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the handling of missing values
    #[must_use]
    pub fn missing_policy(mut self, policy: MissingPolicy) -> Self {
        self.missing = policy;
        self
    }

    /// Only genes in `drivers` are kept
    ///
    /// The restriction is applied before non-informative genes are removed
    #[must_use]
    pub fn drivers(mut self, drivers: HashSet<GeneSymbol>) -> Self {
        self.drivers = Some(drivers);
        self
    }

    /// Merges, binarizes and filters the tables
    ///
    /// # Errors
    ///
    /// - [`ComutError::EmptyMatrix`] if no gene or sample is left
    /// - [`ComutError::InsufficientSamples`] if less than 2 samples are left
    pub fn build(&self, tables: &[CohortTable]) -> ComutResult<MutationMatrix> {
        let raw = harmonize_duplicate_genes(&merge(tables)?);
        let raw = match &self.drivers {
            Some(drivers) => {
                let restricted = raw.restrict_to(drivers);
                info!(
                    "Restricted {} genes to {} driver genes",
                    raw.genes().len(),
                    restricted.genes().len()
                );
                restricted
            }
            None => raw,
        };
        let matrix = binarize(&raw, self.missing)?;
        filter_informative(&matrix)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::parse_cohort;

    fn table(content: &str, cohort: &str) -> CohortTable {
        parse_cohort(content.as_bytes(), &format!("{cohort}_test.txt"), cohort).unwrap()
    }

    fn gene(name: &str) -> GeneSymbol {
        GeneSymbol::try_from(name).unwrap()
    }

    #[test]
    fn merge_duplicate_gene_across_cohorts() {
        let c1 = table("gene\tS1\tS2\nGENEA\t1\t0\n", "C1");
        let c2 = table("gene\tS1\tS2\ngeneA\t0\t1\n", "C2");
        let raw = merge(&[c1, c2]).unwrap();
        assert_eq!(raw.genes().len(), 2);
        assert_eq!(raw.values().row(0), &[Some(1.0), Some(0.0), None, None]);

        let raw = harmonize_duplicate_genes(&raw);
        assert_eq!(raw.genes(), &[gene("GENEA")]);
        assert_eq!(
            raw.values().row(0),
            &[Some(1.0), Some(0.0), Some(0.0), Some(1.0)]
        );

        let matrix = binarize(&raw, MissingPolicy::DropGenes).unwrap();
        assert_eq!(matrix.row(0), &[1, 0, 0, 1]);
    }

    #[test]
    fn same_cohort_in_two_files() {
        let c1 = table("gene\tS1\tS2\nTP53\t1\t0\n", "C1");
        let c2 = table("gene\tS2\tS3\nTP53\t1\t0\n", "C1");
        let raw = harmonize_duplicate_genes(&merge(&[c1, c2]).unwrap());
        assert_eq!(raw.samples().len(), 3);
        assert_eq!(raw.values().row(0), &[Some(1.0), Some(1.0), Some(0.0)]);
    }

    #[test]
    fn merge_without_tables() {
        assert!(matches!(merge(&[]), Err(ComutError::EmptyMatrix)));
    }

    #[test]
    fn missing_policies() {
        let c1 = table("gene\tS1\tS2\nTP53\t1\t0\nKRAS\t0\t1\n", "C1");
        let c2 = table("gene\tS1\nTP53\t1\n", "C2");
        let raw = harmonize_duplicate_genes(&merge(&[c1, c2]).unwrap());

        let m = binarize(&raw, MissingPolicy::DropGenes).unwrap();
        assert_eq!(m.genes(), &[gene("TP53")]);
        assert_eq!(m.n_samples(), 3);

        let m = binarize(&raw, MissingPolicy::DropSamples).unwrap();
        assert_eq!(m.n_genes(), 2);
        assert_eq!(m.n_samples(), 2);

        let m = binarize(&raw, MissingPolicy::Zero).unwrap();
        assert_eq!(m.n_genes(), 2);
        assert_eq!(m.row(0), &[0, 1, 0]);
    }

    #[test]
    fn binarize_clips_values() {
        let c1 = table("gene\tS1\tS2\tS3\tS4\nTP53\t2\t0.7\t-1\t1\n", "C1");
        let raw = harmonize_duplicate_genes(&merge(&[c1]).unwrap());
        let m = binarize(&raw, MissingPolicy::DropGenes).unwrap();
        assert_eq!(m.row(0), &[1, 0, 0, 1]);
    }

    #[test]
    fn filter_removes_constant_genes() {
        let c1 = table(
            "gene\tS1\tS2\tS3\nALL\t1\t1\t1\nNONE\t0\t0\t0\nSOME\t0\t1\t0\n",
            "C1",
        );
        let raw = harmonize_duplicate_genes(&merge(&[c1]).unwrap());
        let m = filter_informative(&binarize(&raw, MissingPolicy::DropGenes).unwrap()).unwrap();
        assert_eq!(m.genes(), &[gene("SOME")]);
        assert!(m.is_informative());
    }

    #[test]
    fn filter_fails_without_informative_genes() {
        let c1 = table("gene\tS1\tS2\nALL\t1\t1\n", "C1");
        let raw = harmonize_duplicate_genes(&merge(&[c1]).unwrap());
        let m = binarize(&raw, MissingPolicy::DropGenes).unwrap();
        assert!(matches!(filter_informative(&m), Err(ComutError::EmptyMatrix)));
    }

    #[test]
    fn filter_fails_with_single_sample() {
        let c1 = table("gene\tS1\nTP53\t1\n", "C1");
        let raw = harmonize_duplicate_genes(&merge(&[c1]).unwrap());
        let m = binarize(&raw, MissingPolicy::DropGenes).unwrap();
        assert!(matches!(
            filter_informative(&m),
            Err(ComutError::InsufficientSamples(1))
        ));
    }

    #[test]
    fn driver_restriction_never_adds_genes() {
        let c1 = table(
            "gene\tS1\tS2\tS3\nTP53\t1\t0\t1\nKRAS\t0\t1\t0\nTTN\t1\t1\t0\n",
            "C1",
        );
        let all = MatrixBuilder::new().build(&[c1.clone()]).unwrap();
        let drivers: HashSet<GeneSymbol> = [gene("TP53"), gene("KRAS"), gene("EGFR")].into();
        let restricted = MatrixBuilder::new().drivers(drivers).build(&[c1]).unwrap();

        assert_eq!(all.n_genes(), 3);
        assert_eq!(restricted.n_genes(), 2);
        for g in restricted.genes() {
            assert!(all.gene_index(g).is_some());
        }
    }

    #[test]
    fn restrict_matrix() {
        let c1 = table("gene\tS1\tS2\nTP53\t1\t0\nKRAS\t0\t1\n", "C1");
        let m = MatrixBuilder::new().build(&[c1]).unwrap();
        let drivers: HashSet<GeneSymbol> = [gene("KRAS")].into();
        let r = restrict_to(&m, &drivers);
        assert_eq!(r.genes(), &[gene("KRAS")]);
        assert_eq!(r.row(0), &[0, 1]);
    }
}
