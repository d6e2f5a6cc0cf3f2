use crate::driver::{Conn, Dialect};
use crate::{Error, Value};

use loam_core::clause::{
    self, Builder, Clause, ClauseExpression, Column, Expr, ExprAnd, ExprEq, ExprIn, ExprOr,
    Interface, Join, Quoted, Subquery, Var, Where,
};
use loam_core::schema::Schema;

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Override hook for a named clause's emission, registered per handle.
pub type ClauseBuilderFn = fn(&Clause, &mut Statement);

/// Per-call scratch state: the clause set, the fluent chain's modifiers, and
/// the live SQL buffer with its positional variables.
#[derive(Clone)]
pub struct Statement {
    pub table: String,
    /// Table expression taking priority over `table`.
    pub table_expr: Option<Expr>,
    pub schema: Option<Arc<Schema>>,
    pub clauses: IndexMap<&'static str, Clause>,
    /// Clause emission order for the running operation.
    pub build_clauses: Vec<&'static str>,
    pub distinct: bool,
    pub selects: Vec<String>,
    pub omits: Vec<String>,
    pub joins: Vec<Join>,
    pub unscoped: bool,
    pub skip_hooks: bool,
    pub raise_error_on_not_found: bool,
    pub sql: String,
    pub vars: Vec<Value>,
    pub settings: IndexMap<String, Value>,
    pub(crate) dialect: Arc<dyn Dialect>,
    pub(crate) conn: Conn,
    pub(crate) clause_builders: Arc<HashMap<&'static str, ClauseBuilderFn>>,
    pub(crate) errors: Vec<Error>,
}

impl Statement {
    pub(crate) fn new(
        dialect: Arc<dyn Dialect>,
        conn: Conn,
        clause_builders: Arc<HashMap<&'static str, ClauseBuilderFn>>,
    ) -> Self {
        Self {
            table: String::new(),
            table_expr: None,
            schema: None,
            clauses: IndexMap::new(),
            build_clauses: Vec::new(),
            distinct: false,
            selects: Vec::new(),
            omits: Vec::new(),
            joins: Vec::new(),
            unscoped: false,
            skip_hooks: false,
            raise_error_on_not_found: false,
            sql: String::new(),
            vars: Vec::new(),
            settings: IndexMap::new(),
            dialect,
            conn,
            clause_builders,
            errors: Vec::new(),
        }
    }

    /// A fresh statement inheriting only the connection handles.
    pub(crate) fn fresh(&self) -> Self {
        Self::new(
            self.dialect.clone(),
            self.conn.clone(),
            self.clause_builders.clone(),
        )
    }

    /// Merge a clause into its named slot.
    pub fn add_clause(&mut self, clause: impl Interface) {
        let name = clause.name();
        let slot = self.clauses.entry(name).or_default();
        slot.name = name;
        clause.merge_clause(slot);
    }

    /// Install a clause only when its slot is empty.
    pub fn add_clause_if_not_exists(&mut self, clause: impl Interface) {
        let occupied = self
            .clauses
            .get(clause.name())
            .map(|slot| slot.expression.is_some())
            .unwrap_or(false);
        if !occupied {
            self.add_clause(clause);
        }
    }

    /// Re-install a stored clause expression (schema-contributed clauses).
    pub fn add_clause_expression(&mut self, expression: &ClauseExpression) {
        match expression.clone() {
            ClauseExpression::Insert(c) => self.add_clause(c),
            ClauseExpression::Values(c) => self.add_clause(c),
            ClauseExpression::Where(c) => self.add_clause(c),
            ClauseExpression::Select(c) => self.add_clause(c),
            ClauseExpression::From(c) => self.add_clause(c),
            ClauseExpression::GroupBy(c) => self.add_clause(c),
            ClauseExpression::OrderBy(c) => self.add_clause(c),
            ClauseExpression::Limit(c) => self.add_clause(c),
            ClauseExpression::Locking(c) => self.add_clause(c),
            ClauseExpression::OnConflict(c) => self.add_clause(c),
            ClauseExpression::Returning(c) => self.add_clause(c),
            ClauseExpression::Update(c) => self.add_clause(c),
            ClauseExpression::Set(c) => self.add_clause(c),
            ClauseExpression::Delete(c) => self.add_clause(c),
            ClauseExpression::Expr(c) => self.add_clause(c),
        }
    }

    /// Emit the named clauses in order, separated by single spaces,
    /// honoring registered clause-builder overrides.
    pub fn build(&mut self, clause_names: &[&'static str]) {
        let mut first_clause_written = false;

        for name in clause_names {
            let Some(clause) = self.clauses.get(name).cloned() else {
                continue;
            };

            if first_clause_written {
                self.sql.push(' ');
            }
            first_clause_written = true;

            match self.clause_builders.clone().get(name) {
                Some(builder) => builder(&clause, self),
                None => clause.build(self),
            }
        }
    }

    /// Interpret a condition in one of the accepted shapes: a primary-key
    /// literal, raw SQL with `?`, a named query with `@`, raw SQL with
    /// whitespace, or a bare column name with one argument.
    pub fn build_condition(&mut self, query: &str, mut args: Vec<Value>) -> Vec<Expr> {
        if query.parse::<i64>().is_err() {
            if query.is_empty() && args.is_empty() {
                return Vec::new();
            }

            if args.is_empty() || query.contains('?') {
                return vec![Expr::raw(query, args)];
            }

            if query.contains('@') {
                // Positional variables still bind through `?`; name
                // resolution needs the map-based entry points.
                return vec![Expr::Named(loam_core::clause::ExprNamed {
                    sql: query.to_owned(),
                    vars: args,
                    names: IndexMap::new(),
                })];
            }

            if query.trim().contains(' ') {
                return vec![Expr::raw(query, args)];
            }

            if args.len() == 1 {
                return vec![Expr::Eq(ExprEq {
                    column: Column::new(query),
                    value: args.remove(0),
                })];
            }
        }

        // Fallback: treat everything as primary-key values.
        if args.len() == 1 {
            if let Value::List(values) = &args[0] {
                if values.is_empty() {
                    return Vec::new();
                }
                return vec![Expr::In(ExprIn {
                    column: Column::primary(),
                    values: values.clone(),
                })];
            }
        }

        let mut values = vec![Value::Str(query.to_owned())];
        values.append(&mut args);
        vec![Expr::In(ExprIn {
            column: Column::primary(),
            values,
        })]
    }

    /// Splice new conditions into the WHERE clause as an OR branch,
    /// folding the previously accumulated expressions into the left arm.
    pub fn or_where(&mut self, conds: Vec<Expr>) {
        if conds.is_empty() {
            return;
        }

        let new_expr = if conds.len() == 1 {
            conds.into_iter().next().unwrap()
        } else {
            Expr::And(ExprAnd { exprs: conds })
        };

        let prior = match self.clauses.get_mut("WHERE") {
            Some(slot) => match &mut slot.expression {
                Some(ClauseExpression::Where(where_clause)) => {
                    std::mem::take(&mut where_clause.exprs)
                }
                _ => Vec::new(),
            },
            None => Vec::new(),
        };

        let exprs = if prior.is_empty() {
            vec![Expr::Or(ExprOr {
                exprs: vec![new_expr],
            })]
        } else {
            vec![Expr::Or(ExprOr {
                exprs: vec![Expr::And(ExprAnd { exprs: prior }), new_expr],
            })]
        };

        // Replace rather than merge: the prior expressions moved inside.
        let slot = self.clauses.entry("WHERE").or_default();
        slot.name = "WHERE";
        slot.expression = Some(ClauseExpression::Where(Where { exprs }));
    }

    pub fn has_where(&self) -> bool {
        matches!(
            self.clauses.get("WHERE"),
            Some(Clause {
                expression: Some(ClauseExpression::Where(where_clause)),
                ..
            }) if !where_clause.exprs.is_empty()
        )
    }

    /// Resolve select/omit lists into a per-column visibility map plus a
    /// restriction flag (true when an explicit, starless select is active).
    pub fn select_and_omit_columns(
        &self,
        require_create: bool,
        require_update: bool,
    ) -> (HashMap<String, bool>, bool) {
        let mut results: HashMap<String, bool> = HashMap::new();
        let mut not_restricted = false;

        let mut process = |column: &str, result: bool, not_restricted: &mut bool| {
            match (&self.schema, column) {
                (Some(schema), "*") => {
                    *not_restricted = result;
                    for db_name in &schema.db_names {
                        results.insert(db_name.clone(), result);
                    }
                }
                (Some(schema), _) => match schema.look_up_field(column) {
                    Some(field) if !field.db_name.is_empty() => {
                        results.insert(field.db_name.clone(), result);
                    }
                    _ => {
                        let trimmed = column
                            .strip_prefix(&format!("{}.", self.table))
                            .unwrap_or(column);
                        results.insert(trimmed.to_owned(), result);
                    }
                },
                (None, _) => {
                    results.insert(column.to_owned(), result);
                }
            }
        };

        for column in &self.selects {
            process(column, true, &mut not_restricted);
        }
        for column in &self.omits {
            process(column, false, &mut not_restricted);
        }

        if let Some(schema) = &self.schema {
            for field in schema.fields_by_name.values() {
                let name = if field.db_name.is_empty() {
                    field.name.clone()
                } else {
                    field.db_name.clone()
                };

                if require_create && !field.creatable {
                    results.insert(name, false);
                } else if require_update && !field.updatable {
                    results.insert(name, false);
                }
            }
        }

        let restricted = !not_restricted && !self.selects.is_empty();
        (results, restricted)
    }

    fn quote_ident(&self, writer: &mut String, raw: bool, ident: &str) {
        if raw {
            writer.push_str(ident);
        } else {
            self.dialect.quote_to(writer, ident);
        }
    }

    fn quote_table(&mut self, table: &clause::Table) {
        if table.name == clause::CURRENT_TABLE {
            if let Some(expr) = self.table_expr.clone() {
                expr.build(self);
            } else {
                let name = self.table.clone();
                let mut out = String::new();
                self.quote_ident(&mut out, table.raw, &name);
                self.sql.push_str(&out);
            }
        } else {
            let mut out = String::new();
            self.quote_ident(&mut out, table.raw, &table.name);
            self.sql.push_str(&out);
        }

        if !table.alias.is_empty() {
            self.sql.push(' ');
            let mut out = String::new();
            self.quote_ident(&mut out, table.raw, &table.alias);
            self.sql.push_str(&out);
        }
    }

    fn quote_column(&mut self, column: &Column) {
        let mut out = String::new();

        if !column.table.is_empty() {
            let table = if column.table == clause::CURRENT_TABLE {
                self.table.clone()
            } else {
                column.table.clone()
            };
            self.quote_ident(&mut out, column.raw, &table);
            out.push('.');
        }

        if column.name == clause::PRIMARY_KEY {
            let resolved = self.schema.as_ref().map(|schema| {
                schema
                    .prioritized_primary_field
                    .as_ref()
                    .map(|primary| primary.db_name.clone())
                    // No primary: the first column stands in. Fine for
                    // reads, ambiguous for updates.
                    .or_else(|| schema.db_names.first().cloned())
            });

            match resolved {
                None => self
                    .errors
                    .push(Error::invalid_field("primary key requires a parsed schema")),
                Some(None) => self.errors.push(Error::invalid_field(
                    "schema has no accessible fields for the primary-key sentinel",
                )),
                Some(Some(db_name)) => self.quote_ident(&mut out, column.raw, &db_name),
            }
        } else {
            self.quote_ident(&mut out, column.raw, &column.name);
        }

        if !column.alias.is_empty() {
            out.push_str(" AS ");
            self.quote_ident(&mut out, column.raw, &column.alias.clone());
        }

        self.sql.push_str(&out);
    }

    fn bind(&mut self, value: Value) {
        self.vars.push(value);
        let dialect = self.dialect.clone();
        let mut placeholder = String::new();
        dialect.bind_var_to(&mut placeholder, self, self.vars.len());
        self.sql.push_str(&placeholder);
    }

    fn splice_subquery(&mut self, sub: &Subquery) {
        let mut idx = 0;
        for ch in sub.sql.chars() {
            if ch == '?' && idx < sub.vars.len() {
                self.bind(sub.vars[idx].clone());
                idx += 1;
            } else {
                self.sql.push(ch);
            }
        }
    }
}

impl Builder for Statement {
    fn write_str(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn write_quoted(&mut self, target: Quoted<'_>) {
        match target {
            Quoted::Table(table) => self.quote_table(&table.clone()),
            Quoted::Column(column) => self.quote_column(&column.clone()),
            Quoted::Columns(columns) => {
                let columns = columns.to_vec();
                self.sql.push('(');
                for (idx, column) in columns.iter().enumerate() {
                    if idx > 0 {
                        self.sql.push(',');
                    }
                    self.quote_column(column);
                }
                self.sql.push(')');
            }
            Quoted::Str(ident) => {
                let ident = ident.to_owned();
                let mut out = String::new();
                self.quote_ident(&mut out, false, &ident);
                self.sql.push_str(&out);
            }
            Quoted::Strs(idents) => {
                let idents = idents.to_vec();
                self.sql.push('(');
                for (idx, ident) in idents.iter().enumerate() {
                    if idx > 0 {
                        self.sql.push(',');
                    }
                    let mut out = String::new();
                    self.quote_ident(&mut out, false, ident);
                    self.sql.push_str(&out);
                }
                self.sql.push(')');
            }
            Quoted::Expr(expr) => expr.clone().build(self),
        }
    }

    fn add_var(&mut self, var: Var) {
        match var {
            // Named arguments carry a value for later name resolution; no
            // placeholder is emitted here.
            Var::Named { value, .. } => {
                self.vars.push(value);
            }
            Var::Column(column) => self.quote_column(&column),
            Var::Table(table) => self.quote_table(&table),
            Var::Expr(expr) => expr.build(self),
            Var::Subquery(sub) => self.splice_subquery(&sub),
            Var::Value(Value::List(items)) => {
                if items.is_empty() {
                    self.sql.push('(');
                    self.bind(Value::Null);
                    self.sql.push(')');
                } else {
                    self.sql.push('(');
                    for (idx, item) in items.into_iter().enumerate() {
                        if idx > 0 {
                            self.sql.push(',');
                        }
                        self.add_var(Var::Value(item));
                    }
                    self.sql.push(')');
                }
            }
            Var::Value(value) => self.bind(value),
        }
    }

    fn add_error(&mut self, err: Error) {
        self.errors.push(err);
    }
}
