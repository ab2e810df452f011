//! Commands wiping all YCSB data from a database
//!
//! Every command is an argv template, `{PLACEHOLDER}`s are substituted from the
//! table name and the connection settings found in the effective workload.

use super::DbKind;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// host and port of urls like `jdbc:mysql://db:3306/ycsb` or `mongodb://db:27017`
static HOSTNAME_PORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"://(.+?):([0-9]{1,5})/?").expect("host pattern is valid"));

const MYSQL: &[&str] = &[
    "mysql",
    "-u",
    "{JDBC_USER}",
    "-p{JDBC_PASSWD}",
    "-P",
    "{JDBC_PORT}",
    "-e",
    "TRUNCATE TABLE {TABLENAME};",
    "{JDBC_DBNAME}",
];

// psql reads the password from ~/.pgpass
const POSTGRES: &[&str] = &[
    "psql",
    "--host",
    "{JDBC_HOST}",
    "-d",
    "{JDBC_DBNAME}",
    "-U",
    "{JDBC_USER}",
    "-p",
    "{JDBC_PORT}",
    "-c",
    "TRUNCATE TABLE {TABLENAME};",
];

const MONGO: &[&str] = &[
    "mongo",
    "--host",
    "{MONGO_HOST}",
    "--port",
    "{MONGO_PORT}",
    "--eval",
    "db.dropDatabase();",
    "{MONGO_DBNAME}",
];

const REDIS: &[&str] = &["redis-cli", "-r", "1", "FLUSHALL"];

const CASSANDRA: &[&str] = &["cqlsh", "-k", "{TABLENAME}", "-e", "TRUNCATE data;"];

pub fn template(kind: DbKind) -> &'static [&'static str] {
    match kind {
        DbKind::JdbcMysql => MYSQL,
        DbKind::JdbcPostgres => POSTGRES,
        DbKind::MongoDb => MONGO,
        DbKind::Redis => REDIS,
        DbKind::Cassandra10 => CASSANDRA,
    }
}

fn host_port(url: &str) -> Option<(String, String)> {
    HOSTNAME_PORT
        .captures(url)
        .map(|captures| (captures[1].to_owned(), captures[2].to_owned()))
}

/// placeholder values for a target, defaults overridden by workload properties
pub fn substitutions(
    kind: DbKind,
    tablename: &str,
    properties: &BTreeMap<String, String>,
) -> BTreeMap<&'static str, String> {
    let property = |key: &str| properties.get(key).cloned();
    let jdbc_port = match kind {
        DbKind::JdbcMysql => "3306",
        _ => "5432",
    };

    let (jdbc_host, jdbc_port) = property("db.url")
        .and_then(|url| host_port(&url))
        .unwrap_or_else(|| ("localhost".to_owned(), jdbc_port.to_owned()));
    let (mongo_host, mongo_port) = property("mongodb.url")
        .and_then(|url| host_port(&url))
        .unwrap_or_else(|| ("localhost".to_owned(), "27017".to_owned()));

    BTreeMap::from([
        ("TABLENAME", tablename.to_owned()),
        ("JDBC_HOST", jdbc_host),
        ("JDBC_PORT", jdbc_port),
        ("JDBC_USER", property("db.user").unwrap_or_else(|| "ycsb".into())),
        (
            "JDBC_PASSWD",
            property("db.passwd").unwrap_or_else(|| "ycsb".into()),
        ),
        ("JDBC_DBNAME", "ycsb".to_owned()),
        ("MONGO_HOST", mongo_host),
        ("MONGO_PORT", mongo_port),
        (
            "MONGO_DBNAME",
            property("mongodb.database").unwrap_or_else(|| "ycsb".into()),
        ),
    ])
}

/// fill every `{PLACEHOLDER}` of the template, unknown placeholders are left as is
pub fn command(
    kind: DbKind,
    tablename: &str,
    properties: &BTreeMap<String, String>,
) -> Vec<String> {
    let substitutions = substitutions(kind, tablename, properties);

    template(kind)
        .iter()
        .map(|part| {
            substitutions
                .iter()
                .fold(part.to_string(), |part, (placeholder, value)| {
                    part.replace(&format!("{{{placeholder}}}"), value)
                })
        })
        .collect()
}
