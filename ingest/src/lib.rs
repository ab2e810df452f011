pub mod extract;
pub mod stats;


pub use extract::{ExtractionRule, ExtractionRules, RuleError, DEFAULT_RULES};
pub use stats::{Aggregate, Field, FieldKind, MetricRecord, MetricSet, StatsError, Value};
