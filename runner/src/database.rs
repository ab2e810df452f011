pub mod clean;
pub mod target;

pub use target::{DatabaseTarget, TargetError};

use once_cell::sync::Lazy;
use regex::Regex;
use std::{fmt, str::FromStr};
use thiserror::Error;
use tracing::warn;

/// Matches the optional label at the end of a section token, e.g. `redis:primary`
static LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(:[A-Za-z0-9_-]+)$").expect("label pattern is valid"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Database '{0}' is not supported")]
pub struct UnknownDatabase(pub String);

/// Database systems the runner knows how to clean and hand to YCSB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbKind {
    JdbcMysql,
    JdbcPostgres,
    MongoDb,
    Redis,
    Cassandra10,
}

impl DbKind {
    pub const ALL: [DbKind; 5] = [
        DbKind::JdbcMysql,
        DbKind::JdbcPostgres,
        DbKind::MongoDb,
        DbKind::Redis,
        DbKind::Cassandra10,
    ];

    /// name used by the runner in config sections and output files
    pub fn name(self) -> &'static str {
        match self {
            Self::JdbcMysql => "jdbc-mysql",
            Self::JdbcPostgres => "jdbc-postgres",
            Self::MongoDb => "mongodb",
            Self::Redis => "redis",
            Self::Cassandra10 => "cassandra-10",
        }
    }

    /// name of the YCSB binding driving this database
    pub fn binding(self) -> &'static str {
        match self {
            Self::JdbcMysql | Self::JdbcPostgres => "jdbc",
            other => other.name(),
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DbKind {
    type Err = UnknownDatabase;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let name = name.trim();

        DbKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownDatabase(name.to_owned()))
    }
}

/// Identity of a target: database kind plus the optional label (including its `:`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub kind: DbKind,
    pub label: String,
}

impl TargetSpec {
    pub fn labelname(&self) -> String {
        format!("{}{}", self.kind, self.label)
    }
}

impl FromStr for TargetSpec {
    type Err = UnknownDatabase;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        let (name, label) = match LABEL.find(token) {
            Some(found) => (&token[..found.start()], found.as_str()),
            None => (token, ""),
        };

        Ok(Self {
            kind: name.parse()?,
            label: label.to_owned(),
        })
    }
}

/// split a section name into its targets, unknown databases are skipped with a warning
pub fn parse_section(section: &str) -> Vec<TargetSpec> {
    section
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| match token.parse::<TargetSpec>() {
            Ok(spec) => Some(spec),
            Err(error) => {
                warn!("{error}, skipping '{token}' in section '{section}'");
                None
            }
        })
        .collect()
}
