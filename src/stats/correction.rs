//! Multiple testing correction
//!
//! The number of tested gene pairs grows quadratically with the number of
//! genes, so the raw p-values must be adjusted before they are compared
//! to a significance threshold.
use crate::stats::f64_from_usize;

/// The method used to adjust p-values for multiple testing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Correction {
    /// False discovery rate control (q-values)
    #[default]
    BenjaminiHochberg,
    /// Family-wise error rate control
    Bonferroni,
}

impl Correction {
    /// Returns the adjusted p-values, in the same order as `pvalues`
    pub fn adjust(&self, pvalues: &[f64]) -> Vec<f64> {
        match self {
            Correction::BenjaminiHochberg => benjamini_hochberg(pvalues),
            Correction::Bonferroni => bonferroni(pvalues),
        }
    }
}

/// Adjusts p-values with the Benjamini-Hochberg procedure
///
/// The adjusted value of the p-value with rank `i` (ascending) is
/// `min(1, min_{j >= i}(p_j * m / j))`, so the q-values never decrease when
/// the p-values are sorted in ascending order.
///
/// # Examples
///
/// ```
/// use comutation::stats::correction::benjamini_hochberg;
///
/// let q = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.005]);
/// let expected = [0.02, 0.04, 0.04, 0.02];
/// for (q, e) in q.iter().zip(expected) {
///     assert!((q - e).abs() < 1e-12);
/// }
/// ```
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let m = f64_from_usize(pvalues.len());
    let mut order: Vec<usize> = (0..pvalues.len()).collect();
    order.sort_by(|a, b| pvalues[*a].total_cmp(&pvalues[*b]));

    let mut qvalues = vec![1.0; pvalues.len()];
    let mut running_min = 1.0f64;
    for (rank, idx) in order.iter().enumerate().rev() {
        let q = pvalues[*idx] * m / f64_from_usize(rank + 1);
        running_min = running_min.min(q);
        qvalues[*idx] = running_min;
    }
    qvalues
}

/// Adjusts p-values with the Bonferroni correction
///
/// ```
/// use comutation::stats::correction::bonferroni;
///
/// assert_eq!(bonferroni(&[0.01, 0.5]), vec![0.02, 1.0]);
/// ```
pub fn bonferroni(pvalues: &[f64]) -> Vec<f64> {
    let m = f64_from_usize(pvalues.len());
    pvalues.iter().map(|p| (p * m).min(1.0)).collect()
}
