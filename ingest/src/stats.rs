use itertools::Itertools;
use serde::Deserialize;
use std::{cmp::Ordering, fmt, ops::Index, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("unknown metric field '{0}'")]
    UnknownField(String),
    #[error("type mismatch: '{field}' should be {expected}, but was {found}")]
    TypeMismatch {
        field: Field,
        expected: FieldKind,
        found: &'static str,
    },
    #[error("'{0}' is derived and can't be assigned")]
    ReadOnly(Field),
    #[error("unknown aggregate '{0}', use one of avg_, sum_ or num_")]
    UnknownAggregate(String),
    #[error("{aggregate}_{field} is undefined over zero values")]
    EmptyAggregate { aggregate: Aggregate, field: Field },
}

/// Declared type of a metric field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Float,
    Int,
    /// computed on read from other fields, never stored
    Derived,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Derived => "derived",
        })
    }
}

/// Every field name a `MetricRecord` knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub enum Field {
    TotalCash,
    CountCash,
    OpCount,
    Runtime,
    Throughput,
    LatencyTxAvg,
    LatencyTx95,
    LatencyTx99,
    LatencyTxMax,
    Mpl,
    Trial,
    AnomalyScore,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::TotalCash,
        Field::CountCash,
        Field::OpCount,
        Field::Runtime,
        Field::Throughput,
        Field::LatencyTxAvg,
        Field::LatencyTx95,
        Field::LatencyTx99,
        Field::LatencyTxMax,
        Field::Mpl,
        Field::Trial,
        Field::AnomalyScore,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::TotalCash => "totalcash",
            Self::CountCash => "countcash",
            Self::OpCount => "opcount",
            Self::Runtime => "runtime",
            Self::Throughput => "throughput",
            Self::LatencyTxAvg => "latency_tx_avg",
            Self::LatencyTx95 => "latency_tx_95",
            Self::LatencyTx99 => "latency_tx_99",
            Self::LatencyTxMax => "latency_tx_max",
            Self::Mpl => "mpl",
            Self::Trial => "trial",
            Self::AnomalyScore => "anomaly_score",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Self::Mpl | Self::Trial => FieldKind::Int,
            Self::AnomalyScore => FieldKind::Derived,
            _ => FieldKind::Float,
        }
    }

    pub fn is_derived(self) -> bool {
        self.kind() == FieldKind::Derived
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = StatsError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.name() == name)
            .ok_or_else(|| StatsError::UnknownField(name.to_owned()))
    }
}

impl TryFrom<String> for Field {
    type Error = StatsError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.trim().parse()
    }
}

/// A dynamically typed value on its way into or out of a record
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
        }
    }

    /// numeric view used for aggregation, strings have none
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Str(_) => None,
        }
    }

    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        let lhs = self.as_f64().unwrap_or(f64::NAN);
        let rhs = other.as_f64().unwrap_or(f64::NAN);

        lhs.total_cmp(&rhs)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Statistics for a single run of the workload at one (trial, mpl) point
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRecord {
    totalcash: f64,
    countcash: f64,
    opcount: f64,
    runtime: f64,
    throughput: f64,
    latency_tx_avg: f64,
    latency_tx_95: f64,
    latency_tx_99: f64,
    latency_tx_max: f64,
    mpl: i64,
    trial: i64,
}

impl MetricRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// build a record from a partial name -> value mapping, omitted fields keep their zero default
    pub fn from_pairs<K, I>(pairs: I) -> Result<Self, StatsError>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut record = Self::default();

        for (name, value) in pairs {
            let field = name.as_ref().parse()?;
            record.set(field, value)?;
        }

        Ok(record)
    }

    /// assign a field, rejecting values whose type doesn't match the declared one
    pub fn set(&mut self, field: Field, value: Value) -> Result<(), StatsError> {
        match (field.kind(), value) {
            (FieldKind::Float, Value::Float(value)) => {
                if let Some(slot) = self.float_mut(field) {
                    *slot = value;
                }

                Ok(())
            }
            (FieldKind::Int, Value::Int(value)) => {
                if let Some(slot) = self.int_mut(field) {
                    *slot = value;
                }

                Ok(())
            }
            (FieldKind::Derived, _) => Err(StatsError::ReadOnly(field)),
            (expected, value) => Err(StatsError::TypeMismatch {
                field,
                expected,
                found: value.type_name(),
            }),
        }
    }

    /// read a field, `None` only for a derived value that is undefined
    pub fn get(&self, field: Field) -> Option<Value> {
        match field {
            Field::TotalCash => Some(Value::Float(self.totalcash)),
            Field::CountCash => Some(Value::Float(self.countcash)),
            Field::OpCount => Some(Value::Float(self.opcount)),
            Field::Runtime => Some(Value::Float(self.runtime)),
            Field::Throughput => Some(Value::Float(self.throughput)),
            Field::LatencyTxAvg => Some(Value::Float(self.latency_tx_avg)),
            Field::LatencyTx95 => Some(Value::Float(self.latency_tx_95)),
            Field::LatencyTx99 => Some(Value::Float(self.latency_tx_99)),
            Field::LatencyTxMax => Some(Value::Float(self.latency_tx_max)),
            Field::Mpl => Some(Value::Int(self.mpl)),
            Field::Trial => Some(Value::Int(self.trial)),
            Field::AnomalyScore => self.anomaly_score().map(Value::Float),
        }
    }

    /// Simple anomaly score of the closed economy workload
    /// undefined as long as no operations were counted
    pub fn anomaly_score(&self) -> Option<f64> {
        (self.opcount > 0.0).then(|| (self.totalcash - self.countcash).abs() / self.opcount)
    }

    pub fn mpl(&self) -> i64 {
        self.mpl
    }

    pub fn trial(&self) -> i64 {
        self.trial
    }

    fn float_mut(&mut self, field: Field) -> Option<&mut f64> {
        Some(match field {
            Field::TotalCash => &mut self.totalcash,
            Field::CountCash => &mut self.countcash,
            Field::OpCount => &mut self.opcount,
            Field::Runtime => &mut self.runtime,
            Field::Throughput => &mut self.throughput,
            Field::LatencyTxAvg => &mut self.latency_tx_avg,
            Field::LatencyTx95 => &mut self.latency_tx_95,
            Field::LatencyTx99 => &mut self.latency_tx_99,
            Field::LatencyTxMax => &mut self.latency_tx_max,
            _ => return None,
        })
    }

    fn int_mut(&mut self, field: Field) -> Option<&mut i64> {
        match field {
            Field::Mpl => Some(&mut self.mpl),
            Field::Trial => Some(&mut self.trial),
            _ => None,
        }
    }
}

impl fmt::Display for MetricRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = Field::ALL
            .iter()
            .map(|field| match self.get(*field) {
                Some(value) => format!("{field}={value}"),
                None => format!("{field}=undefined"),
            })
            .join(", ");

        write!(f, "{{{fields}}}")
    }
}

/// Aggregate operations available over a `MetricSet`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Avg,
    Sum,
    Num,
}

impl Aggregate {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::Sum => "sum",
            Self::Num => "num",
        }
    }

    /// split a query like `avg_runtime` into its aggregate and field
    pub fn parse_query(query: &str) -> Result<(Aggregate, Field), StatsError> {
        let (prefix, field) = query
            .split_once('_')
            .ok_or_else(|| StatsError::UnknownAggregate(query.to_owned()))?;
        let aggregate = match prefix {
            "avg" => Self::Avg,
            "sum" => Self::Sum,
            "num" => Self::Num,
            _ => return Err(StatsError::UnknownAggregate(query.to_owned())),
        };

        Ok((aggregate, field.parse()?))
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Append-only, ordered collection of records for one database target
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet {
    records: Vec<MetricRecord>,
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: MetricRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MetricRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetricRecord> {
        self.records.iter()
    }

    /// all defined numeric values of `field`, in insertion order
    pub fn values(&self, field: Field) -> Vec<f64> {
        self.records
            .iter()
            .filter_map(|record| record.get(field))
            .filter_map(|value| value.as_f64())
            .collect()
    }

    pub fn aggregate(&self, aggregate: Aggregate, field: Field) -> Result<f64, StatsError> {
        let values = self.values(field);

        match aggregate {
            Aggregate::Num => Ok(values.len() as f64),
            _ if values.is_empty() => Err(StatsError::EmptyAggregate { aggregate, field }),
            Aggregate::Sum => Ok(values.iter().sum()),
            Aggregate::Avg => Ok(values.iter().sum::<f64>() / values.len() as f64),
        }
    }

    /// aggregate lookup by name, e.g. `avg_runtime`, `sum_opcount` or `num_anomaly_score`
    pub fn query(&self, query: &str) -> Result<f64, StatsError> {
        let (aggregate, field) = Aggregate::parse_query(query)?;

        self.aggregate(aggregate, field)
    }

    /// the selected fields of every record, one row per record
    pub fn rows(&self, fields: &[Field]) -> Vec<Vec<Option<Value>>> {
        self.records
            .iter()
            .map(|record| fields.iter().map(|field| record.get(*field)).collect())
            .collect()
    }

    /// partition the records by the value of `key`, groups ordered by ascending key
    /// records without a defined key are left out
    pub fn grouped_by(&self, key: Field) -> Vec<(Value, MetricSet)> {
        let keyed = self
            .records
            .iter()
            .filter_map(|record| record.get(key).map(|value| (value, record)))
            .sorted_by(|(lhs, _), (rhs, _)| lhs.total_cmp(rhs))
            .collect_vec();

        let mut groups: Vec<(Value, MetricSet)> = Vec::new();

        for (value, record) in keyed {
            match groups.last_mut() {
                Some((current, set)) if *current == value => set.push(record.clone()),
                _ => groups.push((value, MetricSet::from_iter([record.clone()]))),
            }
        }

        groups
    }
}

impl Index<usize> for MetricSet {
    type Output = MetricRecord;

    fn index(&self, index: usize) -> &Self::Output {
        &self.records[index]
    }
}

impl FromIterator<MetricRecord> for MetricSet {
    fn from_iter<T: IntoIterator<Item = MetricRecord>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl Extend<MetricRecord> for MetricSet {
    fn extend<T: IntoIterator<Item = MetricRecord>>(&mut self, iter: T) {
        self.records.extend(iter);
    }
}

impl<'a> IntoIterator for &'a MetricSet {
    type Item = &'a MetricRecord;
    type IntoIter = std::slice::Iter<'a, MetricRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
