//! Classification and export of the pairwise test results
use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::gene::GeneSymbol;
use crate::mutations::MutationMatrix;
use crate::stats::pairwise::{PairTest, Tendency};
use crate::{ComutError, ComutResult};

/// The classification of a gene pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Significantly more overlap than expected
    CoOccurring,
    /// Significantly less overlap than expected
    MutuallyExclusive,
    /// Neither
    NotSignificant,
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::CoOccurring => write!(f, "co-occurring"),
            Direction::MutuallyExclusive => write!(f, "mutually-exclusive"),
            Direction::NotSignificant => write!(f, "not-significant"),
        }
    }
}

/// The result of a gene pair, referencing the genes by their symbol
///
/// `gene1` is always lexically smaller than `gene2`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenePairResult {
    gene1: GeneSymbol,
    gene2: GeneSymbol,
    observed_overlap: u64,
    expected_overlap: f64,
    #[serde(skip)]
    variance: f64,
    p_value: f64,
    q_value: f64,
    direction: Direction,
}

impl GenePairResult {
    pub fn gene1(&self) -> &GeneSymbol {
        &self.gene1
    }

    pub fn gene2(&self) -> &GeneSymbol {
        &self.gene2
    }

    pub fn observed_overlap(&self) -> u64 {
        self.observed_overlap
    }

    pub fn expected_overlap(&self) -> f64 {
        self.expected_overlap
    }

    /// The variance of the overlap under the null model
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// The smaller of the co-occurrence and mutual exclusivity p-values
    pub fn p_value(&self) -> f64 {
        self.p_value
    }

    /// The p-value adjusted for multiple testing
    pub fn q_value(&self) -> f64 {
        self.q_value
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns `true` if the pair is co-occurring or mutually exclusive
    pub fn is_significant(&self) -> bool {
        self.direction != Direction::NotSignificant
    }
}

/// All classified gene pairs, ordered by ascending q-value
///
/// Pairs with the same q-value are ordered by their gene symbols.
#[derive(Debug, Clone)]
pub struct Aggregation {
    alpha: f64,
    all: Vec<GenePairResult>,
}

impl Aggregation {
    /// The significance threshold used for the classification
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Every tested pair
    pub fn all(&self) -> &[GenePairResult] {
        &self.all
    }

    /// Significantly co-occurring pairs
    pub fn co_occurring(&self) -> impl Iterator<Item = &GenePairResult> {
        self.by_direction(Direction::CoOccurring)
    }

    /// Significantly mutually exclusive pairs
    pub fn mutually_exclusive(&self) -> impl Iterator<Item = &GenePairResult> {
        self.by_direction(Direction::MutuallyExclusive)
    }

    /// All significant pairs, regardless of their direction
    pub fn significant(&self) -> impl Iterator<Item = &GenePairResult> {
        self.all.iter().filter(|res| res.is_significant())
    }

    /// The number of tested pairs
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// Returns `true` if no pair was tested
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    fn by_direction(&self, direction: Direction) -> impl Iterator<Item = &GenePairResult> {
        self.all.iter().filter(move |res| res.direction == direction)
    }
}

/// Classifies the `tests` of gene pairs from `matrix`
///
/// A pair is significant if its q-value is below `alpha`. Its direction
/// is the [`Tendency`] of the pair.
///
/// # Errors
///
/// - [`ComutError::InvalidParameter`] if `alpha` is not within `(0, 1]`
///   or a test references a gene that is not part of `matrix`
pub fn aggregate(
    matrix: &MutationMatrix,
    tests: &[PairTest],
    alpha: f64,
) -> ComutResult<Aggregation> {
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(ComutError::InvalidParameter(format!(
            "alpha must be within (0, 1], got {alpha}"
        )));
    }
    let mut all = tests
        .iter()
        .map(|test| classify(matrix, test, alpha))
        .collect::<ComutResult<Vec<GenePairResult>>>()?;

    all.sort_by(|a, b| {
        a.q_value
            .total_cmp(&b.q_value)
            .then_with(|| a.gene1.cmp(&b.gene1))
            .then_with(|| a.gene2.cmp(&b.gene2))
    });

    let aggregation = Aggregation { alpha, all };
    debug!(
        "{} co-occurring and {} mutually exclusive pairs at alpha {}",
        aggregation.co_occurring().count(),
        aggregation.mutually_exclusive().count(),
        alpha
    );
    Ok(aggregation)
}

fn classify(matrix: &MutationMatrix, test: &PairTest, alpha: f64) -> ComutResult<GenePairResult> {
    let (a, b) = test.genes();
    let symbol = |idx: usize| {
        matrix.gene(idx).cloned().ok_or_else(|| {
            ComutError::InvalidParameter(format!("gene index {idx} is not part of the matrix"))
        })
    };
    let (gene_a, gene_b) = (symbol(a)?, symbol(b)?);
    let (gene1, gene2) = if gene_a <= gene_b {
        (gene_a, gene_b)
    } else {
        (gene_b, gene_a)
    };

    let direction = if test.qvalue() < alpha {
        match test.tendency() {
            Tendency::CoOccurrence => Direction::CoOccurring,
            Tendency::MutualExclusivity => Direction::MutuallyExclusive,
        }
    } else {
        Direction::NotSignificant
    };

    Ok(GenePairResult {
        gene1,
        gene2,
        observed_overlap: test.overlap(),
        expected_overlap: test.expected(),
        variance: test.variance(),
        p_value: test.pvalue(),
        q_value: test.qvalue(),
        direction,
    })
}

/// Writes `results` as comma separated table with a header row
///
/// # Errors
///
/// [`ComutError::Csv`] if writing fails
pub fn write_csv<'a, W, I>(writer: W, results: I) -> ComutResult<()>
where
    W: Write,
    I: IntoIterator<Item = &'a GenePairResult>,
{
    // the header is written explicitly, so that it is also present without results
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record([
        "gene1",
        "gene2",
        "observed_overlap",
        "expected_overlap",
        "p_value",
        "q_value",
        "direction",
    ])?;
    for result in results {
        wtr.serialize(CsvRow::from(result))?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Writes the result tables of a single run into `dir`
///
/// The tables are `<prefix>_all.csv` with every tested pair,
/// `<prefix>_co.csv` and `<prefix>_mutexc.csv` with the significant pairs.
/// Returns the paths of the written files.
///
/// # Errors
///
/// - [`ComutError::Io`] if a file cannot be created
/// - [`ComutError::Csv`] if writing fails
pub fn write_results<P: AsRef<Path>>(
    dir: P,
    prefix: &str,
    results: &Aggregation,
) -> ComutResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let all = dir.join(format!("{prefix}_all.csv"));
    let co = dir.join(format!("{prefix}_co.csv"));
    let mutexc = dir.join(format!("{prefix}_mutexc.csv"));
    write_table(&all, results.all())?;
    write_table(&co, results.co_occurring())?;
    write_table(&mutexc, results.mutually_exclusive())?;
    Ok(vec![all, co, mutexc])
}

fn write_table<'a, I>(path: &Path, results: I) -> ComutResult<()>
where
    I: IntoIterator<Item = &'a GenePairResult>,
{
    let file = File::create(path).map_err(|source| ComutError::Io {
        path: path.display().to_string(),
        source,
    })?;
    write_csv(BufWriter::new(file), results)?;
    info!("Wrote {}", path.display());
    Ok(())
}

#[derive(Serialize)]
struct CsvRow<'a> {
    gene1: &'a GeneSymbol,
    gene2: &'a GeneSymbol,
    observed_overlap: u64,
    expected_overlap: f64,
    p_value: f64,
    q_value: f64,
    direction: Direction,
}

impl<'a> From<&'a GenePairResult> for CsvRow<'a> {
    fn from(res: &'a GenePairResult) -> Self {
        Self {
            gene1: &res.gene1,
            gene2: &res.gene2,
            observed_overlap: res.observed_overlap,
            expected_overlap: res.expected_overlap,
            p_value: res.p_value,
            q_value: res.q_value,
            direction: res.direction,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gene::SampleId;
    use crate::stats::background::RateModel;
    use crate::stats::pairwise::PairwiseTest;

    /// Gene symbols are deliberately not in lexical order
    fn matrix(repeats: usize) -> MutationMatrix {
        let a = [1, 1, 1, 0, 0, 0].repeat(repeats);
        let c = [1, 0, 1, 0, 1, 0].repeat(repeats);
        let d = [0, 1, 0, 1, 0, 1].repeat(repeats);
        let genes = ["KRAS", "BRAF", "TP53", "EGFR"]
            .iter()
            .map(|g| GeneSymbol::try_from(*g).unwrap())
            .collect();
        let samples = (0..6 * repeats)
            .map(|i| SampleId::new("LUAD", &i.to_string()))
            .collect();
        MutationMatrix::new(genes, samples, [a.clone(), a, c, d].concat()).unwrap()
    }

    fn aggregation(repeats: usize, alpha: f64) -> Aggregation {
        let m = matrix(repeats);
        let model = RateModel::estimate(&m).unwrap();
        let tests = PairwiseTest::new(&m, &model).unwrap().run().unwrap();
        aggregate(&m, &tests, alpha).unwrap()
    }

    #[test]
    fn invalid_alpha() {
        let m = matrix(1);
        for alpha in [0.0, -0.1, 1.5, f64::NAN] {
            assert!(aggregate(&m, &[], alpha).is_err(), "{alpha}");
        }
        assert!(aggregate(&m, &[], 1.0).unwrap().is_empty());
    }

    #[test]
    fn classification() {
        let agg = aggregation(8, 0.05);
        assert_eq!(agg.len(), 6);

        let co: Vec<&GenePairResult> = agg.co_occurring().collect();
        assert_eq!(co.len(), 1);
        assert_eq!(co[0].gene1().as_str(), "BRAF");
        assert_eq!(co[0].gene2().as_str(), "KRAS");
        assert_eq!(co[0].observed_overlap(), 24);

        let mutex: Vec<&GenePairResult> = agg.mutually_exclusive().collect();
        assert!(mutex
            .iter()
            .any(|r| r.gene1().as_str() == "EGFR" && r.gene2().as_str() == "TP53"));
        for res in agg.significant() {
            assert!(res.q_value() < 0.05);
        }
    }

    #[test]
    fn liberal_threshold() {
        // 12 samples, KRAS and BRAF always together, TP53 and EGFR in 6 samples each
        let agg = aggregation(2, 0.5);
        let find = |g1: &str, g2: &str| {
            agg.all()
                .iter()
                .find(|r| r.gene1().as_str() == g1 && r.gene2().as_str() == g2)
                .unwrap()
        };
        assert_eq!(find("BRAF", "KRAS").direction(), Direction::CoOccurring);
        assert_eq!(find("EGFR", "TP53").direction(), Direction::MutuallyExclusive);
        assert_eq!(find("EGFR", "TP53").observed_overlap(), 0);
    }

    #[test]
    fn genes_are_ordered() {
        for res in aggregation(2, 0.5).all() {
            assert!(res.gene1() < res.gene2());
        }
    }

    #[test]
    fn sorted_by_qvalue() {
        let agg = aggregation(2, 0.5);
        for window in agg.all().windows(2) {
            assert!(window[0].q_value() <= window[1].q_value());
            if (window[0].q_value() - window[1].q_value()).abs() < f64::EPSILON {
                assert!(window[0].gene1() <= window[1].gene1());
            }
        }
    }

    #[test]
    fn significant_iff_below_alpha() {
        let agg = aggregation(2, 0.5);
        for res in agg.all() {
            assert_eq!(res.is_significant(), res.q_value() < 0.5);
        }
    }

    #[test]
    fn stricter_alpha_is_subset() {
        let loose = aggregation(2, 0.5);
        let strict = aggregation(2, 0.05);
        for res in strict.significant() {
            assert!(loose
                .significant()
                .any(|l| l.gene1() == res.gene1() && l.gene2() == res.gene2()));
        }
        assert!(strict.significant().count() <= loose.significant().count());
    }

    #[test]
    fn csv_output() {
        let agg = aggregation(8, 0.05);
        let mut buf = Vec::new();
        write_csv(&mut buf, agg.co_occurring()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("gene1,gene2,observed_overlap,expected_overlap,p_value,q_value,direction")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("BRAF,KRAS,24,"));
        assert!(row.ends_with(",co-occurring"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn csv_without_results() {
        let mut buf = Vec::new();
        write_csv(&mut buf, Vec::<&GenePairResult>::new()).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "gene1,gene2,observed_overlap,expected_overlap,p_value,q_value,direction\n"
        );
    }

    #[test]
    fn result_files() {
        let dir = tempfile::tempdir().unwrap();
        let agg = aggregation(8, 0.05);
        let files = write_results(dir.path(), "LUAD", &agg).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["LUAD_all.csv", "LUAD_co.csv", "LUAD_mutexc.csv"]);

        let lines = |idx: usize| std::fs::read_to_string(&files[idx]).unwrap().lines().count();
        assert_eq!(lines(0), agg.len() + 1);
        assert_eq!(lines(1), agg.co_occurring().count() + 1);
        assert_eq!(lines(2), agg.mutually_exclusive().count() + 1);
    }

    #[test]
    fn result_files_need_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            write_results(missing, "pooled", &aggregation(1, 0.05)),
            Err(ComutError::Io { .. })
        ));
    }
}
