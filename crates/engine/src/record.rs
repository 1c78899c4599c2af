// Ratio records: what one source file contributes to the masterfile

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Quartile label of a published ratio value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quartile {
    Q1,
    Q2,
    Q3,
}

impl Quartile {
    pub const ALL: [Quartile; 3] = [Quartile::Q1, Quartile::Q2, Quartile::Q3];

    pub fn label(&self) -> &'static str {
        match self {
            Quartile::Q1 => "Q1",
            Quartile::Q2 => "Q2",
            Quartile::Q3 => "Q3",
        }
    }
}

impl fmt::Display for Quartile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Masterfile column holding one ratio/quartile pair, e.g. `R01_Q1`.
pub fn column_name(ratio_code: &str, quartile: Quartile) -> String {
    format!("{}_{}", ratio_code, quartile.label())
}

/// The three quartile values of one ratio. `None` means absent, not zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QuartileValues {
    #[serde(rename = "Q1")]
    pub q1: Option<f64>,
    #[serde(rename = "Q2")]
    pub q2: Option<f64>,
    #[serde(rename = "Q3")]
    pub q3: Option<f64>,
}

impl QuartileValues {
    pub fn new(q1: Option<f64>, q2: Option<f64>, q3: Option<f64>) -> Self {
        Self { q1, q2, q3 }
    }

    pub fn get(&self, quartile: Quartile) -> Option<f64> {
        match quartile {
            Quartile::Q1 => self.q1,
            Quartile::Q2 => self.q2,
            Quartile::Q3 => self.q3,
        }
    }

    pub fn set(&mut self, quartile: Quartile, value: Option<f64>) {
        match quartile {
            Quartile::Q1 => self.q1 = value,
            Quartile::Q2 => self.q2 = value,
            Quartile::Q3 => self.q3 = value,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Quartile, Option<f64>)> + '_ {
        Quartile::ALL.iter().map(move |q| (*q, self.get(*q)))
    }

    pub fn absent_count(&self) -> usize {
        self.iter().filter(|(_, v)| v.is_none()).count()
    }
}

/// Ratio code -> quartile values for a single source file.
///
/// Ordered by ratio code so iteration (and therefore logging and JSON
/// output) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RatioRecord {
    ratios: BTreeMap<String, QuartileValues>,
}

impl RatioRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the values for `code`. Returns the previous values
    /// when the code was already present (last write wins).
    pub fn insert(&mut self, code: impl Into<String>, values: QuartileValues) -> Option<QuartileValues> {
        self.ratios.insert(code.into(), values)
    }

    pub fn get(&self, code: &str) -> Option<&QuartileValues> {
        self.ratios.get(code)
    }

    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QuartileValues)> {
        self.ratios.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Flatten into `(column name, value)` pairs, three per ratio.
    pub fn fields(&self) -> impl Iterator<Item = (String, Option<f64>)> + '_ {
        self.ratios.iter().flat_map(|(code, values)| {
            values.iter().map(move |(q, v)| (column_name(code, q), v))
        })
    }
}

impl<S: Into<String>> FromIterator<(S, QuartileValues)> for RatioRecord {
    fn from_iter<I: IntoIterator<Item = (S, QuartileValues)>>(iter: I) -> Self {
        let mut record = RatioRecord::new();
        for (code, values) in iter {
            record.insert(code, values);
        }
        record
    }
}
