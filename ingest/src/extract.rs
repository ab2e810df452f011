use crate::stats::{Field, FieldKind, MetricRecord, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

/// The rules used for YCSB / YCSB+T output
pub static DEFAULT_RULES: Lazy<ExtractionRules> = Lazy::new(ExtractionRules::ycsb);

// The first match group is extracted for each statistic
const YCSB_PATTERNS: [(Field, &str); 9] = [
    (Field::TotalCash, r"TOTAL CASH\], ([0-9]+)"),
    (Field::CountCash, r"COUNTED CASH\], ([0-9]+)"),
    (Field::OpCount, r"ACTUAL OPERATIONS\], ([0-9]+)"),
    (Field::Runtime, r"OVERALL\], RunTime.+?, ([0-9.]+)"),
    (Field::Throughput, r"OVERALL\], Throughput.+?, ([0-9.]+)"),
    (
        Field::LatencyTxAvg,
        r"READ-MODIFY-WRITE\], AverageLatency.+?, ([0-9.]+)",
    ),
    (
        Field::LatencyTx95,
        r"READ-MODIFY-WRITE\], 95thPercentileLatency.+?, ([0-9.]+)",
    ),
    (
        Field::LatencyTx99,
        r"READ-MODIFY-WRITE\], 99thPercentileLatency.+?, ([0-9.]+)",
    ),
    (
        Field::LatencyTxMax,
        r"READ-MODIFY-WRITE\], MaxLatency.+?, ([0-9.]+)",
    ),
];

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid pattern for {field}: {source}")]
    Pattern { field: Field, source: regex::Error },
    #[error("pattern for {field} must have exactly one capturing group, found {found}")]
    CaptureGroups { field: Field, found: usize },
    #[error("{0} is derived and can't be extracted")]
    Derived(Field),
}

/// Maps one metric field to the pattern that scrapes it from raw output
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    field: Field,
    pattern: Regex,
}

impl ExtractionRule {
    pub fn new(field: Field, pattern: &str) -> Result<Self, RuleError> {
        if field.is_derived() {
            return Err(RuleError::Derived(field));
        }

        let pattern =
            Regex::new(pattern).map_err(|source| RuleError::Pattern { field, source })?;

        // captures_len counts the implicit whole-match group as well
        match pattern.captures_len() {
            2 => Ok(Self { field, pattern }),
            len => Err(RuleError::CaptureGroups {
                field,
                found: len - 1,
            }),
        }
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// search `text` once, returns the converted capture if there was a usable match
    pub fn apply(&self, text: &str) -> Option<Value> {
        let capture = self.pattern.captures(text)?.get(1)?.as_str();

        let value = match self.field.kind() {
            FieldKind::Float => capture.parse::<f64>().map(Value::Float).ok(),
            FieldKind::Int => capture.parse::<i64>().map(Value::Int).ok(),
            FieldKind::Derived => None,
        };

        if value.is_none() {
            warn!(field = %self.field, capture, "Unable to convert extracted value, keeping default");
        }

        value
    }
}

/// Immutable table of extraction rules, evaluated independently of each other
#[derive(Debug, Clone)]
pub struct ExtractionRules {
    rules: Vec<ExtractionRule>,
}

impl ExtractionRules {
    pub fn new(rules: Vec<ExtractionRule>) -> Self {
        Self { rules }
    }

    pub fn ycsb() -> Self {
        Self::new(
            YCSB_PATTERNS
                .iter()
                .map(|(field, pattern)| {
                    ExtractionRule::new(*field, pattern).expect("built-in pattern is valid")
                })
                .collect(),
        )
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExtractionRule> {
        self.rules.iter()
    }

    /// populate a fresh record from raw output
    /// a rule without a match leaves its field at the zero default, this never fails
    pub fn extract(&self, text: &str) -> MetricRecord {
        let mut record = MetricRecord::new();

        for rule in &self.rules {
            match rule.apply(text) {
                Some(value) => {
                    if let Err(error) = record.set(rule.field, value) {
                        warn!(error = %error, "Discarding extracted value");
                    }
                }
                None => debug!(field = %rule.field, "No match in output, using default"),
            }
        }

        record
    }
}
