//! Gene and sample identifiers
use core::fmt::Debug;
use std::fmt::Display;

use serde::Serialize;

use crate::{ComutError, ComutResult};

/// A normalized gene symbol
///
/// Gene symbols from different cohorts follow different naming conventions,
/// so every symbol is trimmed and uppercased when it is created. Two
/// `GeneSymbol`s are equal if they refer to the same canonical gene name.
///
/// # Examples
///
/// ```
/// use comutation::GeneSymbol;
///
/// let kras = GeneSymbol::try_from(" kras\t").unwrap();
/// assert_eq!(kras.as_str(), "KRAS");
/// assert_eq!(kras, GeneSymbol::try_from("KRAS").unwrap());
///
/// assert!(GeneSymbol::try_from("   ").is_err());
/// ```
#[derive(Clone, Debug, Hash, PartialEq, PartialOrd, Eq, Ord, Serialize)]
#[serde(transparent)]
pub struct GeneSymbol {
    inner: String,
}

impl GeneSymbol {
    /// Returns the normalized symbol
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl TryFrom<&str> for GeneSymbol {
    type Error = ComutError;
    fn try_from(value: &str) -> ComutResult<Self> {
        let inner = value.trim().to_uppercase();
        if inner.is_empty() {
            return Err(ComutError::InvalidParameter(
                "gene symbol must not be empty".to_string(),
            ));
        }
        Ok(GeneSymbol { inner })
    }
}

impl Display for GeneSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl AsRef<str> for GeneSymbol {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

/// A sample identifier, prefixed with the cohort it belongs to
///
/// Sample names are only unique within a cohort, the cohort prefix
/// makes them globally unique.
///
/// ```
/// use comutation::SampleId;
///
/// let sample = SampleId::new("BRCA", "TCGA-A1-A0SB");
/// assert_eq!(sample.to_string(), "BRCA_TCGA-A1-A0SB");
/// assert_eq!(sample.cohort(), "BRCA");
/// ```
#[derive(Clone, Debug, Hash, PartialEq, PartialOrd, Eq, Ord)]
pub struct SampleId {
    cohort: String,
    name: String,
}

impl SampleId {
    /// Creates a new `SampleId` for the sample `name` in `cohort`
    pub fn new(cohort: &str, name: &str) -> Self {
        Self {
            cohort: cohort.to_string(),
            name: name.trim().to_string(),
        }
    }

    /// The cohort tag of the sample
    pub fn cohort(&self) -> &str {
        &self.cohort
    }

    /// The sample name, without cohort prefix
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.cohort, self.name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalize_symbols() {
        let a = GeneSymbol::try_from("tp53").unwrap();
        let b = GeneSymbol::try_from("  TP53 ").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "TP53");
    }

    #[test]
    fn symbol_ordering() {
        let a = GeneSymbol::try_from("APC").unwrap();
        let b = GeneSymbol::try_from("kras").unwrap();
        assert!(a < b);
    }

    #[test]
    fn empty_symbol() {
        assert!(GeneSymbol::try_from("").is_err());
    }

    #[test]
    fn sample_ids_differ_by_cohort() {
        let a = SampleId::new("LUAD", "S1");
        let b = SampleId::new("BRCA", "S1");
        assert_ne!(a, b);
        assert_eq!(a.name(), b.name());
    }
}
