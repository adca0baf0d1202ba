//! The binary gene x sample mutation matrix
use std::collections::{HashMap, HashSet};

use crate::gene::{GeneSymbol, SampleId};
use crate::matrix::Matrix;
use crate::{ComutError, ComutResult};

pub mod builder;

#[cfg_attr(doc, aquamarine::aquamarine)]
/// A binary mutation matrix with genes as rows and samples as columns
///
/// Every cell is either `0` (not mutated) or `1` (mutated). Gene symbols
/// and sample identifiers are unique. Each gene symbol is mapped to a dense
/// row index once, when the matrix is created, so that the statistical tests
/// only ever access rows by index.
///
/// A `MutationMatrix` is immutable. Filtering returns a new matrix.
///
/// # Construction
///
/// Matrices are usually built from cohort files with the
/// [`MatrixBuilder`](`builder::MatrixBuilder`):
///
/// ```mermaid
/// graph LR
///     A[cohort files] -->|load| B[CohortTable]
///     B -->|merge| C[RawMatrix]
///     C -->|harmonize duplicate genes| D[RawMatrix]
///     D -->|restrict to driver genes| E[RawMatrix]
///     E -->|binarize| F[MutationMatrix]
///     F -->|filter informative| G[MutationMatrix]
/// ```
///
/// # Examples
///
/// ```
/// use comutation::{GeneSymbol, MutationMatrix, SampleId};
///
/// let genes = vec![
///     GeneSymbol::try_from("TP53").unwrap(),
///     GeneSymbol::try_from("KRAS").unwrap(),
/// ];
/// let samples = vec![
///     SampleId::new("LUAD", "S1"),
///     SampleId::new("LUAD", "S2"),
///     SampleId::new("LUAD", "S3"),
/// ];
/// let matrix = MutationMatrix::new(genes, samples, vec![
///     1, 0, 1,
///     1, 1, 0,
/// ]).unwrap();
///
/// let tp53 = matrix.gene_index(&GeneSymbol::try_from("tp53").unwrap()).unwrap();
/// let kras = matrix.gene_index(&GeneSymbol::try_from("KRAS").unwrap()).unwrap();
/// assert_eq!(matrix.overlap(tp53, kras), 1);
/// assert_eq!(matrix.mutation_counts(), vec![2, 2]);
/// assert_eq!(matrix.sample_burden(), vec![2, 1, 1]);
/// ```
#[derive(Debug, Clone)]
pub struct MutationMatrix {
    genes: Vec<GeneSymbol>,
    index: HashMap<GeneSymbol, usize>,
    samples: Vec<SampleId>,
    data: Matrix<u8>,
}

impl MutationMatrix {
    /// Creates a new `MutationMatrix` from row-major binary `data`
    ///
    /// # Errors
    ///
    /// [`ComutError::InvalidParameter`] if
    /// - `data` does not match the number of genes and samples
    /// - a gene or a sample is not unique
    /// - a value is not `0` or `1`
    pub fn new(genes: Vec<GeneSymbol>, samples: Vec<SampleId>, data: Vec<u8>) -> ComutResult<Self> {
        if genes.len() * samples.len() != data.len() {
            return Err(ComutError::InvalidParameter(format!(
                "{} values do not fit {} genes and {} samples",
                data.len(),
                genes.len(),
                samples.len()
            )));
        }
        if data.iter().any(|v| *v > 1) {
            return Err(ComutError::InvalidParameter(
                "mutation matrix must be binary".to_string(),
            ));
        }
        let data = Matrix::new(genes.len(), samples.len(), data);
        Self::from_parts(genes, samples, data)
    }

    pub(crate) fn from_parts(
        genes: Vec<GeneSymbol>,
        samples: Vec<SampleId>,
        data: Matrix<u8>,
    ) -> ComutResult<Self> {
        let mut index = HashMap::with_capacity(genes.len());
        for (idx, gene) in genes.iter().enumerate() {
            if index.insert(gene.clone(), idx).is_some() {
                return Err(ComutError::InvalidParameter(format!(
                    "gene {gene} is not unique"
                )));
            }
        }
        let mut unique_samples = HashSet::with_capacity(samples.len());
        if let Some(sample) = samples.iter().find(|s| !unique_samples.insert(*s)) {
            return Err(ComutError::InvalidParameter(format!(
                "sample {sample} is not unique"
            )));
        }
        Ok(Self {
            genes,
            index,
            samples,
            data,
        })
    }

    /// The gene symbols, in row order
    pub fn genes(&self) -> &[GeneSymbol] {
        &self.genes
    }

    /// The sample identifiers, in column order
    pub fn samples(&self) -> &[SampleId] {
        &self.samples
    }

    /// The gene symbol of row `idx`
    pub fn gene(&self, idx: usize) -> Option<&GeneSymbol> {
        self.genes.get(idx)
    }

    /// The row index of `gene`
    pub fn gene_index(&self, gene: &GeneSymbol) -> Option<usize> {
        self.index.get(gene).copied()
    }

    /// The number of genes (rows)
    pub fn n_genes(&self) -> usize {
        self.genes.len()
    }

    /// The number of samples (columns)
    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the matrix has no genes or no samples
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The underlying binary data
    pub fn data(&self) -> &Matrix<u8> {
        &self.data
    }

    /// The mutation calls of the gene in row `idx`
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds
    pub fn row(&self, idx: usize) -> &[u8] {
        self.data.row(idx)
    }

    /// The number of mutated samples of every gene
    pub fn mutation_counts(&self) -> Vec<u64> {
        self.data.row_sums()
    }

    /// The number of mutated genes of every sample
    pub fn sample_burden(&self) -> Vec<u64> {
        self.data.col_sums()
    }

    /// The number of samples in which both genes are mutated
    pub fn overlap(&self, gene_a: usize, gene_b: usize) -> u64 {
        self.row(gene_a)
            .iter()
            .zip(self.row(gene_b))
            .map(|(a, b)| u64::from(a & b))
            .sum()
    }

    /// Returns `true` if every gene is mutated in some, but not all samples
    pub fn is_informative(&self) -> bool {
        let n_samples = self.n_samples() as u64;
        self.mutation_counts()
            .iter()
            .all(|count| *count > 0 && *count < n_samples)
    }

    /// The distinct cohorts of the samples, in column order
    pub fn cohorts(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.samples
            .iter()
            .map(SampleId::cohort)
            .filter(|cohort| seen.insert(*cohort))
            .collect()
    }

    /// Returns a new matrix with only the genes for which `keep` is `true`
    pub(crate) fn filter_genes(&self, keep: &[bool]) -> MutationMatrix {
        let genes: Vec<GeneSymbol> = self
            .genes
            .iter()
            .zip(keep)
            .filter(|(_, k)| **k)
            .map(|(gene, _)| gene.clone())
            .collect();
        let index = genes
            .iter()
            .enumerate()
            .map(|(idx, gene)| (gene.clone(), idx))
            .collect();
        MutationMatrix {
            genes,
            index,
            samples: self.samples.clone(),
            data: self.data.filter_rows(keep),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn symbols(names: &[&str]) -> Vec<GeneSymbol> {
        names
            .iter()
            .map(|n| GeneSymbol::try_from(*n).unwrap())
            .collect()
    }

    fn example() -> MutationMatrix {
        let samples = vec![
            SampleId::new("A", "1"),
            SampleId::new("A", "2"),
            SampleId::new("B", "1"),
            SampleId::new("B", "2"),
        ];
        MutationMatrix::new(
            symbols(&["G1", "G2", "G3"]),
            samples,
            vec![1, 0, 1, 0, 1, 1, 1, 0, 0, 0, 1, 1],
        )
        .unwrap()
    }

    #[test]
    fn overlap_counts() {
        let m = example();
        assert_eq!(m.overlap(0, 1), 2);
        assert_eq!(m.overlap(1, 0), 2);
        assert_eq!(m.overlap(0, 2), 1);
        assert_eq!(m.overlap(1, 2), 1);
    }

    #[test]
    fn invalid_input() {
        let samples = vec![SampleId::new("A", "1"), SampleId::new("A", "2")];
        assert!(MutationMatrix::new(symbols(&["G1"]), samples.clone(), vec![1, 2]).is_err());
        assert!(MutationMatrix::new(symbols(&["G1"]), samples.clone(), vec![1]).is_err());
        assert!(
            MutationMatrix::new(symbols(&["G1", "g1"]), samples, vec![1, 0, 0, 1]).is_err()
        );
    }

    #[test]
    fn duplicate_samples() {
        let samples = vec![SampleId::new("A", "1"), SampleId::new("A", "1")];
        assert!(MutationMatrix::new(symbols(&["G1"]), samples, vec![1, 0]).is_err());
    }

    #[test]
    fn cohorts_in_sample_order() {
        let m = example();
        assert_eq!(m.cohorts(), vec!["A", "B"]);
    }

    #[test]
    fn filter_genes_reindexes() {
        let m = example();
        let f = m.filter_genes(&[true, false, true]);
        assert_eq!(f.n_genes(), 2);
        assert_eq!(f.gene_index(&symbols(&["G3"])[0]), Some(1));
        assert_eq!(f.gene_index(&symbols(&["G2"])[0]), None);
        assert_eq!(f.row(1), &[0, 0, 1, 1]);
    }

    #[test]
    fn informative() {
        let m = example();
        assert!(m.is_informative());
        let samples = vec![SampleId::new("A", "1"), SampleId::new("A", "2")];
        let m = MutationMatrix::new(symbols(&["G1"]), samples, vec![1, 1]).unwrap();
        assert!(!m.is_informative());
    }
}
