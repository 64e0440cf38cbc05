// SPDX-License-Identifier: Apache-2.0

//! Default dialect checker
//!
//! Parses the statement with the sqlparser dialect matching the family and
//! walks every relation and expression, reporting denied schemas, tables,
//! functions, variables and objects, writes to read-only tables and
//! statement shapes the settings disallow.

use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    visit_expressions, visit_relations, AssignmentTarget, Delete, Expr, FromTable, Ident,
    ObjectName, ObjectNamePart, ObjectType, SetExpr, Statement, TableFactor, TableObject,
    TableWithJoins, Update,
};
use sqlparser::dialect::{
    ClickHouseDialect, Dialect as ParserDialect, GenericDialect, MsSqlDialect, MySqlDialect,
    PostgreSqlDialect, SQLiteDialect,
};
use sqlparser::parser::Parser;

use super::{SqlFirewall, Violation};
use crate::dialect::{Dialect, DialectFamily};
use crate::policy::{DialectPolicy, RuleCategory};

/// Statement level switches of the checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSettings {
    pub multi_statement_allow: bool,
    pub strict_syntax_check: bool,
    pub truncate_allow: bool,
    pub drop_table_allow: bool,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            multi_statement_allow: false,
            strict_syntax_check: true,
            truncate_allow: true,
            drop_table_allow: true,
        }
    }
}

/// Rules shipped with each family checker. The provider factory clears these
/// before applying the merged policy.
fn implementation_defaults(family: DialectFamily) -> DialectPolicy {
    let mut policy = DialectPolicy::default();
    match family {
        DialectFamily::Mysql => {
            policy
                .schemas
                .deny_all(["information_schema", "mysql", "performance_schema"]);
            policy.functions.deny_all(["load_file", "sleep", "benchmark"]);
            policy
                .variants
                .deny_all(["basedir", "datadir", "version_compile_os", "version"]);
        }
        DialectFamily::Oracle => {
            policy.schemas.deny_all(["sys", "system"]);
            policy.functions.deny_all(["utl_http.request", "dbms_pipe.receive_message"]);
        }
        DialectFamily::SqlServer => {
            policy.schemas.deny_all(["master", "msdb"]);
            policy.functions.deny_all(["xp_cmdshell", "openrowset"]);
        }
        DialectFamily::Postgres => {
            policy.schemas.deny_all(["information_schema", "pg_catalog"]);
            policy.functions.deny_all(["pg_sleep", "pg_read_file"]);
        }
        DialectFamily::Db2 => {
            policy.schemas.deny_all(["syscat", "sysibm"]);
        }
        DialectFamily::Sqlite => {
            policy.tables.deny_all(["sqlite_master"]);
            policy.functions.deny_all(["load_extension"]);
        }
        DialectFamily::Clickhouse => {
            policy.schemas.deny_all(["system"]);
            policy.functions.deny_all(["url", "file"]);
        }
    }
    policy
}

/// sqlparser backed [`SqlFirewall`] for one dialect family
#[derive(Debug, Clone)]
pub struct WallProvider {
    dialect: Dialect,
    family: DialectFamily,
    config_dir: String,
    policy: DialectPolicy,
    settings: CheckSettings,
}

impl WallProvider {
    /// Creates a provider loaded with the family's implementation defaults.
    pub fn new(
        dialect: Dialect,
        family: DialectFamily,
        config_dir: impl Into<String>,
        settings: CheckSettings,
    ) -> Self {
        Self {
            dialect,
            family,
            config_dir: config_dir.into(),
            policy: implementation_defaults(family),
            settings,
        }
    }

    pub fn family(&self) -> DialectFamily {
        self.family
    }

    pub fn config_dir(&self) -> &str {
        &self.config_dir
    }

    pub fn settings(&self) -> CheckSettings {
        self.settings
    }

    pub fn policy(&self) -> &DialectPolicy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut DialectPolicy {
        &mut self.policy
    }

    fn parser_dialect(&self) -> Box<dyn ParserDialect> {
        match self.family {
            DialectFamily::Mysql => Box::new(MySqlDialect {}),
            DialectFamily::SqlServer => Box::new(MsSqlDialect {}),
            DialectFamily::Postgres => Box::new(PostgreSqlDialect {}),
            DialectFamily::Sqlite => Box::new(SQLiteDialect {}),
            DialectFamily::Clickhouse => Box::new(ClickHouseDialect {}),
            DialectFamily::Oracle | DialectFamily::Db2 => Box::new(GenericDialect {}),
        }
    }

    fn check_statement(&self, statement: &Statement, findings: &mut Findings) {
        match statement {
            Statement::Truncate(_) if !self.settings.truncate_allow => {
                findings.push(Violation::rule("truncate not allow"));
            }
            Statement::Drop {
                object_type: ObjectType::Table,
                ..
            } if !self.settings.drop_table_allow => {
                findings.push(Violation::rule("drop table not allow"));
            }
            _ => {}
        }

        let mut relations: Vec<Vec<String>> = Vec::new();
        let _ = visit_relations(statement, |relation| {
            relations.push(name_parts(relation));
            ControlFlow::<()>::Continue(())
        });

        let mut functions: Vec<Vec<String>> = Vec::new();
        let mut variables: Vec<String> = Vec::new();
        let _ = visit_expressions(statement, |expr| {
            match expr {
                Expr::Function(function) => functions.push(name_parts(&function.name)),
                Expr::Identifier(ident) => {
                    variables.extend(variable_name(std::slice::from_ref(ident)));
                }
                Expr::CompoundIdentifier(idents) => variables.extend(variable_name(idents)),
                _ => {}
            }
            ControlFlow::<()>::Continue(())
        });

        let policy = &self.policy;

        for parts in &relations {
            let Some(table) = parts.last() else { continue };
            let full = parts.join(".");

            if parts.len() >= 2 {
                let schema = &parts[parts.len() - 2];
                if policy.is_denied(RuleCategory::Schemas, schema) {
                    findings.push(Violation::rule(format!("deny schema : {}", schema)));
                }
            }

            if policy.is_denied(RuleCategory::Tables, table)
                || policy.is_denied(RuleCategory::Tables, &full)
            {
                findings.push(Violation::rule(format!("deny table : {}", table)));
            }

            if policy.is_denied(RuleCategory::Objects, table)
                || policy.is_denied(RuleCategory::Objects, &full)
            {
                findings.push(Violation::rule(format!("deny object : {}", full)));
            }
        }

        for parts in &functions {
            let Some(name) = parts.last() else { continue };
            let full = parts.join(".");

            if policy.is_denied(RuleCategory::Functions, name)
                || policy.is_denied(RuleCategory::Functions, &full)
            {
                findings.push(Violation::rule(format!("deny function : {}", name)));
            }

            if policy.is_denied(RuleCategory::Objects, name)
                || policy.is_denied(RuleCategory::Objects, &full)
            {
                findings.push(Violation::rule(format!("deny object : {}", full)));
            }
        }

        for variable in &variables {
            if policy.is_denied(RuleCategory::Variants, variable) {
                findings.push(Violation::rule(format!("deny variable : {}", variable)));
            }
        }

        // Tables only read, by a join source or a subquery, stay readable.
        for target in write_targets(statement) {
            let Some(table) = target.last() else { continue };
            let full = target.join(".");
            if policy.is_read_only(table) || policy.is_read_only(&full) {
                findings.push(Violation::rule(format!("table readonly : {}", table)));
            }
        }
    }
}

impl SqlFirewall for WallProvider {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn check(&self, sql: &str) -> Vec<Violation> {
        let dialect = self.parser_dialect();
        let statements = match Parser::parse_sql(&*dialect, sql) {
            Ok(statements) => statements,
            Err(e) => {
                if !self.settings.strict_syntax_check {
                    return Vec::new();
                }
                let message = format!("syntax error: {}", e);
                return vec![Violation::syntax_error(message, Arc::new(e))];
            }
        };

        let mut findings = Findings::default();

        if statements.len() > 1 && !self.settings.multi_statement_allow {
            findings.push(Violation::rule("multi-statement not allow"));
        }

        for statement in &statements {
            self.check_statement(statement, &mut findings);
        }

        findings.into_inner()
    }
}

/// Ordered violations without repeated messages
#[derive(Default)]
struct Findings {
    seen: BTreeSet<String>,
    violations: Vec<Violation>,
}

impl Findings {
    fn push(&mut self, violation: Violation) {
        if self.seen.insert(violation.message.clone()) {
            self.violations.push(violation);
        }
    }

    fn into_inner(self) -> Vec<Violation> {
        self.violations
    }
}

/// Lower-cased identifier parts of an object name.
fn name_parts(name: &ObjectName) -> Vec<String> {
    name.0
        .iter()
        .filter_map(|part| match part {
            ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
            _ => None,
        })
        .collect()
}

/// Table named in a FROM or JOIN clause
struct TableRef {
    alias: Option<String>,
    name: Vec<String>,
}

fn collect_tables(from: &TableWithJoins, out: &mut Vec<TableRef>) {
    let joined = from.joins.iter().map(|join| &join.relation);
    let factors = std::iter::once(&from.relation).chain(joined);
    for factor in factors {
        if let TableFactor::Table { name, alias, .. } = factor {
            out.push(TableRef {
                alias: alias.as_ref().map(|alias| alias.name.value.to_lowercase()),
                name: name_parts(name),
            });
        }
    }
}

/// Resolves `qualifier` (an alias or a possibly schema-qualified table name)
/// against the tables in scope.
fn resolve_table(qualifier: &[String], tables: &[TableRef]) -> Vec<String> {
    let by_alias = match qualifier {
        [alias] => tables.iter().find(|t| t.alias.as_deref() == Some(alias.as_str())),
        _ => None,
    };
    by_alias
        .or_else(|| tables.iter().find(|t| t.name.ends_with(qualifier)))
        .map(|t| t.name.clone())
        .unwrap_or_else(|| qualifier.to_vec())
}

fn table_factor_name(factor: &TableFactor) -> Option<Vec<String>> {
    match factor {
        TableFactor::Table { name, .. } => Some(name_parts(name)),
        _ => None,
    }
}

/// Tables the statement writes to. A write nested in a `WITH` query counts.
fn write_targets(statement: &Statement) -> Vec<Vec<String>> {
    match statement {
        Statement::Insert(insert) => match &insert.table {
            TableObject::TableName(name) => vec![name_parts(name)],
            _ => Vec::new(),
        },
        Statement::Update(update) => update_targets(update),
        Statement::Delete(delete) => delete_targets(delete),
        Statement::Merge { table, .. } => table_factor_name(table).into_iter().collect(),
        Statement::Query(query) => match &*query.body {
            SetExpr::Insert(inner)
            | SetExpr::Update(inner)
            | SetExpr::Delete(inner)
            | SetExpr::Merge(inner) => write_targets(inner),
            _ => Vec::new(),
        },
        Statement::Truncate(truncate) => truncate
            .table_names
            .iter()
            .map(|target| name_parts(&target.name))
            .collect(),
        Statement::Drop { names, .. } => names.iter().map(name_parts).collect(),
        Statement::AlterTable(alter) => vec![name_parts(&alter.name)],
        _ => Vec::new(),
    }
}

/// Tables owning the assigned columns. An unqualified column in a
/// multi-table update may belong to any of the joined tables.
fn update_targets(update: &Update) -> Vec<Vec<String>> {
    let mut tables = Vec::new();
    collect_tables(&update.table, &mut tables);

    let mut targets = Vec::new();
    for assignment in &update.assignments {
        let columns = match &assignment.target {
            AssignmentTarget::ColumnName(column) => std::slice::from_ref(column),
            AssignmentTarget::Tuple(columns) => columns.as_slice(),
        };
        for column in columns {
            let parts = name_parts(column);
            match parts.split_last() {
                Some((_, qualifier)) if !qualifier.is_empty() => {
                    targets.push(resolve_table(qualifier, &tables));
                }
                _ => targets.extend(tables.iter().map(|t| t.name.clone())),
            }
        }
    }

    if targets.is_empty() {
        targets.extend(table_factor_name(&update.table.relation));
    }
    targets
}

/// `DELETE t FROM ...` names its targets, `DELETE FROM t ...` deletes from
/// the FROM relations themselves.
fn delete_targets(delete: &Delete) -> Vec<Vec<String>> {
    let from = match &delete.from {
        FromTable::WithFromKeyword(from) | FromTable::WithoutKeyword(from) => from,
    };

    if delete.tables.is_empty() {
        return from
            .iter()
            .filter_map(|table| table_factor_name(&table.relation))
            .collect();
    }

    let mut tables = Vec::new();
    for table in from.iter().chain(delete.using.iter().flatten()) {
        collect_tables(table, &mut tables);
    }
    delete
        .tables
        .iter()
        .map(|name| resolve_table(&name_parts(name), &tables))
        .collect()
}

/// Session/system variable referenced as `@name`, `@@name` or
/// `@@scope.name`.
fn variable_name(idents: &[Ident]) -> Option<String> {
    let first = idents.first()?;
    if !first.value.starts_with('@') {
        return None;
    }

    let name = if idents.len() == 1 {
        first.value.trim_start_matches('@')
    } else {
        idents.last()?.value.as_str()
    };

    let name = name.to_lowercase();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DialectRules, RuleConfig};
    use crate::policy::{build_policy, PolicySeed};

    fn checker(dialect: Dialect, config: &RuleConfig) -> WallProvider {
        let family = dialect.family().unwrap();
        let mut provider = WallProvider::new(
            dialect,
            family,
            family.default_config_dir(),
            config.check_settings(),
        );
        *provider.policy_mut() = build_policy(dialect, &PolicySeed::builtin(), config);
        provider
    }

    fn first_message(provider: &WallProvider, sql: &str) -> Option<String> {
        provider.check(sql).first().map(|v| v.message.clone())
    }

    #[test]
    fn test_denied_function() {
        let provider = checker(Dialect::Mysql, &RuleConfig::default());
        assert_eq!(
            first_message(&provider, "SELECT extractvalue(1,'x') FROM t").as_deref(),
            Some("deny function : extractvalue")
        );
        assert_eq!(
            first_message(&provider, "SELECT UpdateXml(1, '/a', 'b')").as_deref(),
            Some("deny function : updatexml")
        );
        assert!(provider.check("SELECT count(*) FROM t WHERE id = 1").is_empty());
    }

    #[test]
    fn test_permitted_function() {
        let config = RuleConfig {
            permit_functions: DialectRules::new().with(Dialect::Mysql, ["extractvalue"]),
            ..RuleConfig::default()
        };
        let provider = checker(Dialect::Mysql, &config);
        assert!(provider.check("SELECT extractvalue(1,'x') FROM t").is_empty());
    }

    #[test]
    fn test_denied_table_and_schema() {
        let config = RuleConfig {
            deny_tables: DialectRules::new().with(Dialect::Postgresql, ["secrets"]),
            deny_schemas: DialectRules::new().with(Dialect::Postgresql, ["internal"]),
            ..RuleConfig::default()
        };
        let provider = checker(Dialect::Postgresql, &config);

        assert_eq!(
            first_message(&provider, "SELECT * FROM secrets").as_deref(),
            Some("deny table : secrets")
        );
        assert_eq!(
            first_message(&provider, "SELECT * FROM internal.accounts").as_deref(),
            Some("deny schema : internal")
        );
        assert_eq!(
            first_message(
                &provider,
                "SELECT u.id FROM users u JOIN (SELECT * FROM secrets) s ON s.id = u.id"
            )
            .as_deref(),
            Some("deny table : secrets")
        );
        assert!(provider.check("SELECT * FROM public.users").is_empty());
    }

    #[test]
    fn test_denied_object() {
        let config = RuleConfig {
            deny_objects: DialectRules::new().with(Dialect::Sqlite, ["shadow_users"]),
            ..RuleConfig::default()
        };
        let provider = checker(Dialect::Sqlite, &config);
        assert_eq!(
            first_message(&provider, "SELECT * FROM shadow_users").as_deref(),
            Some("deny object : shadow_users")
        );
    }

    #[test]
    fn test_read_only_table() {
        let config = RuleConfig {
            read_only_objects: DialectRules::new().with(Dialect::Mysql, ["audit_log"]),
            ..RuleConfig::default()
        };
        let provider = checker(Dialect::Mysql, &config);

        assert_eq!(
            first_message(&provider, "UPDATE audit_log SET note = 'x' WHERE id = 1").as_deref(),
            Some("table readonly : audit_log")
        );
        assert_eq!(
            first_message(&provider, "DELETE FROM audit_log WHERE id = 1").as_deref(),
            Some("table readonly : audit_log")
        );
        assert!(provider.check("SELECT * FROM audit_log WHERE id = 1").is_empty());
    }

    #[test]
    fn test_multi_statement() {
        let provider = checker(Dialect::Mysql, &RuleConfig::default());
        assert_eq!(
            first_message(&provider, "SELECT 1; SELECT 2").as_deref(),
            Some("multi-statement not allow")
        );

        let config = RuleConfig {
            multi_statement_allow: true,
            ..RuleConfig::default()
        };
        let provider = checker(Dialect::Mysql, &config);
        assert!(provider.check("SELECT 1; SELECT 2").is_empty());
    }

    #[test]
    fn test_syntax_error_carries_cause() {
        let provider = checker(Dialect::Mysql, &RuleConfig::default());
        let violations = provider.check("SELEC * FROM t");
        assert_eq!(violations.len(), 1);
        assert!(violations[0].is_syntax_error());
        assert!(violations[0].message.starts_with("syntax error"));
        assert!(violations[0].cause.is_some());

        let lenient = RuleConfig {
            strict_syntax_check: false,
            ..RuleConfig::default()
        };
        let provider = checker(Dialect::Mysql, &lenient);
        assert!(provider.check("SELEC * FROM t").is_empty());
    }

    #[test]
    fn test_truncate_switch() {
        let config = RuleConfig {
            truncate_allow: false,
            ..RuleConfig::default()
        };
        let provider = checker(Dialect::Postgresql, &config);
        assert_eq!(
            first_message(&provider, "TRUNCATE TABLE sessions").as_deref(),
            Some("truncate not allow")
        );
    }

    #[test]
    fn test_variable_name() {
        assert_eq!(
            variable_name(&[Ident::new("@@basedir")]).as_deref(),
            Some("basedir")
        );
        assert_eq!(
            variable_name(&[Ident::new("@@GLOBAL"), Ident::new("Version")]).as_deref(),
            Some("version")
        );
        assert_eq!(variable_name(&[Ident::new("basedir")]), None);
        assert_eq!(variable_name(&[Ident::new("@@")]), None);
    }

    #[test]
    fn test_read_only_write_behind_with_clause() {
        let config = RuleConfig {
            read_only_objects: DialectRules::new()
                .with(Dialect::Mysql, ["audit_log"])
                .with(Dialect::Postgresql, ["audit_log"]),
            ..RuleConfig::default()
        };

        let mysql = checker(Dialect::Mysql, &config);
        for sql in [
            "WITH x AS (SELECT 1 AS id) UPDATE audit_log SET note = 'x' WHERE id IN (SELECT id FROM x)",
            "WITH x AS (SELECT 1 AS id) DELETE FROM audit_log WHERE id IN (SELECT id FROM x)",
        ] {
            assert_eq!(
                first_message(&mysql, sql).as_deref(),
                Some("table readonly : audit_log"),
                "{sql}"
            );
        }

        let postgres = checker(Dialect::Postgresql, &config);
        assert_eq!(
            first_message(
                &postgres,
                "WITH x AS (SELECT 1) INSERT INTO audit_log SELECT * FROM x"
            )
            .as_deref(),
            Some("table readonly : audit_log")
        );
        assert!(postgres
            .check("WITH x AS (SELECT * FROM audit_log) SELECT * FROM x")
            .is_empty());
    }

    #[test]
    fn test_read_only_multi_table_update() {
        let config = RuleConfig {
            read_only_objects: DialectRules::new().with(Dialect::Mysql, ["audit_log"]),
            ..RuleConfig::default()
        };
        let provider = checker(Dialect::Mysql, &config);

        assert_eq!(
            first_message(
                &provider,
                "UPDATE users u JOIN audit_log a ON a.id = u.id SET a.note = 'x'"
            )
            .as_deref(),
            Some("table readonly : audit_log")
        );
        assert_eq!(
            first_message(
                &provider,
                "DELETE a FROM users u JOIN audit_log a ON a.id = u.id WHERE u.id = 1"
            )
            .as_deref(),
            Some("table readonly : audit_log")
        );
        // the joined read-only table is only read
        assert!(provider
            .check("UPDATE users u JOIN audit_log a ON a.id = u.id SET u.seen = a.note")
            .is_empty());
        assert!(provider
            .check("INSERT INTO users (id) SELECT id FROM audit_log")
            .is_empty());
    }

    #[test]
    fn test_denied_variable() {
        let config = RuleConfig {
            deny_variants: DialectRules::new().with(Dialect::Mysql, ["basedir"]),
            ..RuleConfig::default()
        };
        let provider = checker(Dialect::Mysql, &config);
        assert_eq!(
            first_message(&provider, "SELECT @@basedir").as_deref(),
            Some("deny variable : basedir")
        );
        assert!(provider.check("SELECT @@autocommit").is_empty());
    }

    #[test]
    fn test_drop_table_switch() {
        let config = RuleConfig {
            drop_table_allow: false,
            ..RuleConfig::default()
        };
        let provider = checker(Dialect::Mysql, &config);
        assert_eq!(
            first_message(&provider, "DROP TABLE users").as_deref(),
            Some("drop table not allow")
        );
        assert!(provider.check("DROP VIEW active_users").is_empty());

        let provider = checker(Dialect::Mysql, &RuleConfig::default());
        assert!(provider.check("DROP TABLE users").is_empty());
    }

    #[test]
    fn test_new_provider_carries_implementation_defaults() {
        let provider = WallProvider::new(
            Dialect::Mysql,
            DialectFamily::Mysql,
            DialectFamily::Mysql.default_config_dir(),
            CheckSettings::default(),
        );
        assert!(provider.policy().schemas.deny.contains("information_schema"));
        assert_eq!(provider.config_dir(), "wall/mysql");
    }
}
