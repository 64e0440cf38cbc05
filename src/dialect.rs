// SPDX-License-Identifier: Apache-2.0

//! Database dialect detection
//!
//! Resolves a connection URL (JDBC style `jdbc:mysql://...` or plain
//! `postgres://...`) or a driver supplied name into a [`Dialect`], and maps
//! every supported dialect onto the family checker that handles it.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::WallError;

/// A database engine the firewall knows about.
///
/// Not every dialect has a checker: see [`Dialect::family`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Mysql,
    Mariadb,
    Tidb,
    Oceanbase,
    Drds,
    H2,
    Presto,
    Trino,
    Oracle,
    AliOracle,
    OceanbaseOracle,
    Sqlserver,
    Jtds,
    Postgresql,
    Edb,
    Polardb,
    Greenplum,
    Gaussdb,
    Db2,
    Sqlite,
    Clickhouse,
    Hive,
    Derby,
    Hsql,
    Dm,
    Kingbase,
    Informix,
    Sybase,
}

/// Family checker a dialect is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectFamily {
    Mysql,
    Oracle,
    SqlServer,
    Postgres,
    Db2,
    Sqlite,
    Clickhouse,
}

impl Dialect {
    pub const ALL: [Dialect; 28] = [
        Dialect::Mysql,
        Dialect::Mariadb,
        Dialect::Tidb,
        Dialect::Oceanbase,
        Dialect::Drds,
        Dialect::H2,
        Dialect::Presto,
        Dialect::Trino,
        Dialect::Oracle,
        Dialect::AliOracle,
        Dialect::OceanbaseOracle,
        Dialect::Sqlserver,
        Dialect::Jtds,
        Dialect::Postgresql,
        Dialect::Edb,
        Dialect::Polardb,
        Dialect::Greenplum,
        Dialect::Gaussdb,
        Dialect::Db2,
        Dialect::Sqlite,
        Dialect::Clickhouse,
        Dialect::Hive,
        Dialect::Derby,
        Dialect::Hsql,
        Dialect::Dm,
        Dialect::Kingbase,
        Dialect::Informix,
        Dialect::Sybase,
    ];

    /// Canonical lower-case name, also used as the configuration key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Mariadb => "mariadb",
            Self::Tidb => "tidb",
            Self::Oceanbase => "oceanbase",
            Self::Drds => "drds",
            Self::H2 => "h2",
            Self::Presto => "presto",
            Self::Trino => "trino",
            Self::Oracle => "oracle",
            Self::AliOracle => "ali_oracle",
            Self::OceanbaseOracle => "oceanbase_oracle",
            Self::Sqlserver => "sqlserver",
            Self::Jtds => "jtds",
            Self::Postgresql => "postgresql",
            Self::Edb => "edb",
            Self::Polardb => "polardb",
            Self::Greenplum => "greenplum",
            Self::Gaussdb => "gaussdb",
            Self::Db2 => "db2",
            Self::Sqlite => "sqlite",
            Self::Clickhouse => "clickhouse",
            Self::Hive => "hive",
            Self::Derby => "derby",
            Self::Hsql => "hsql",
            Self::Dm => "dm",
            Self::Kingbase => "kingbase",
            Self::Informix => "informix",
            Self::Sybase => "sybase",
        }
    }

    /// Dispatch table from dialect to family checker.
    ///
    /// `None` means the dialect is recognised but has no checker; building a
    /// firewall for it is a hard failure.
    pub fn family(&self) -> Option<DialectFamily> {
        match self {
            Self::Mysql
            | Self::Oceanbase
            | Self::Drds
            | Self::Mariadb
            | Self::Tidb
            | Self::H2
            | Self::Presto
            | Self::Trino => Some(DialectFamily::Mysql),
            Self::Oracle | Self::AliOracle | Self::OceanbaseOracle => Some(DialectFamily::Oracle),
            Self::Sqlserver | Self::Jtds => Some(DialectFamily::SqlServer),
            Self::Postgresql | Self::Edb | Self::Polardb | Self::Greenplum | Self::Gaussdb => {
                Some(DialectFamily::Postgres)
            }
            Self::Db2 => Some(DialectFamily::Db2),
            Self::Sqlite => Some(DialectFamily::Sqlite),
            Self::Clickhouse => Some(DialectFamily::Clickhouse),
            Self::Hive
            | Self::Derby
            | Self::Hsql
            | Self::Dm
            | Self::Kingbase
            | Self::Informix
            | Self::Sybase => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.family().is_some()
    }

    /// Parses a dialect name case-insensitively. Accepts the canonical names
    /// plus a few common aliases (`postgres`, `mssql`, `hsqldb`).
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        let dialect = match normalized.as_str() {
            "postgres" | "pg" => Self::Postgresql,
            "mssql" => Self::Sqlserver,
            "hsqldb" => Self::Hsql,
            "opengauss" => Self::Gaussdb,
            other => return Self::ALL.into_iter().find(|d| d.name() == other),
        };
        Some(dialect)
    }

    /// Detects the dialect from a connection URL.
    ///
    /// Only the scheme is inspected, so vendor specific URL tails
    /// (`;databaseName=...`, `thin:@host:1521:sid`) never need to parse.
    pub fn from_url(url: &str) -> Option<Self> {
        let mut rest = url.trim();
        rest = strip_prefix_ignore_case(rest, "jdbc:").unwrap_or(rest);
        for wrapper in ["log4jdbc:", "p6spy:", "otel:"] {
            if let Some(stripped) = strip_prefix_ignore_case(rest, wrapper) {
                rest = stripped;
            }
        }

        let scheme = rest.split(':').next()?.to_ascii_lowercase();
        let dialect = match scheme.as_str() {
            "mysql" | "mysqlx" => Self::Mysql,
            "mariadb" => Self::Mariadb,
            "tidb" => Self::Tidb,
            "oceanbase" => Self::Oceanbase,
            "h2" => Self::H2,
            "presto" => Self::Presto,
            "trino" => Self::Trino,
            "oracle" => Self::Oracle,
            "sqlserver" | "microsoft" | "mssql" => Self::Sqlserver,
            "jtds" => Self::Jtds,
            "postgresql" | "postgres" => Self::Postgresql,
            "edb" => Self::Edb,
            "polardb" => Self::Polardb,
            "pivotal" | "greenplum" => Self::Greenplum,
            "gaussdb" | "opengauss" => Self::Gaussdb,
            "db2" | "as400" => Self::Db2,
            "sqlite" => Self::Sqlite,
            "clickhouse" | "ch" => Self::Clickhouse,
            "hive" | "hive2" => Self::Hive,
            "derby" => Self::Derby,
            "hsqldb" => Self::Hsql,
            "dm" => Self::Dm,
            "kingbase" | "kingbase8" => Self::Kingbase,
            "informix-sqli" | "informix" => Self::Informix,
            "sybase" => Self::Sybase,
            _ => return None,
        };
        Some(dialect)
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    match value.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&value[prefix.len()..]),
        _ => None,
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = WallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| WallError::config(format!("Unknown dialect '{}'", s)))
    }
}

impl DialectFamily {
    /// Location of the implementation-default rule lists for this family.
    pub fn default_config_dir(&self) -> &'static str {
        match self {
            Self::Mysql => "wall/mysql",
            Self::Oracle => "wall/oracle",
            Self::SqlServer => "wall/sqlserver",
            Self::Postgres => "wall/postgres",
            Self::Db2 => "wall/db2",
            Self::Sqlite => "wall/sqlite",
            Self::Clickhouse => "wall/clickhouse",
        }
    }
}
