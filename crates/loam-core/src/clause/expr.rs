use super::{
    Builder, ExprAnd, ExprEq, ExprGt, ExprGte, ExprIn, ExprLike, ExprLt, ExprLte, ExprNeq,
    ExprNot, ExprOr, Var,
};
use crate::schema::Record;
use crate::Value;

use indexmap::IndexMap;

/// A composable SQL expression.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Raw SQL with positional `?` placeholders
    Raw(ExprRaw),

    /// Raw SQL with `@name` placeholders
    Named(ExprNamed),

    /// Membership in a set of values
    In(ExprIn),

    Eq(ExprEq),
    Neq(ExprNeq),
    Gt(ExprGt),
    Gte(ExprGte),
    Lt(ExprLt),
    Lte(ExprLte),

    /// Pattern match
    Like(ExprLike),

    /// AND a set of expressions
    And(ExprAnd),

    /// OR a set of expressions
    Or(ExprOr),

    /// Negate a set of expressions
    Not(ExprNot),
}

impl Expr {
    pub fn raw(sql: impl Into<String>, vars: Vec<Value>) -> Self {
        Self::Raw(ExprRaw {
            sql: sql.into(),
            vars,
            without_parentheses: false,
        })
    }

    pub fn named(sql: impl Into<String>, names: IndexMap<String, Value>) -> Self {
        Self::Named(ExprNamed {
            sql: sql.into(),
            vars: Vec::new(),
            names,
        })
    }

    pub fn eq(column: super::Column, value: impl Into<Value>) -> Self {
        Self::Eq(ExprEq {
            column,
            value: value.into(),
        })
    }

    pub fn in_list(column: super::Column, values: Vec<Value>) -> Self {
        Self::In(ExprIn { column, values })
    }

    /// AND combinator with the original's simplification: a single non-OR
    /// operand stands for itself.
    pub fn and(exprs: Vec<Expr>) -> Option<Expr> {
        match exprs.len() {
            0 => None,
            1 if !matches!(exprs[0], Expr::Or(_)) => exprs.into_iter().next(),
            _ => Some(Expr::And(ExprAnd { exprs })),
        }
    }

    pub fn or(exprs: Vec<Expr>) -> Option<Expr> {
        if exprs.is_empty() {
            return None;
        }
        Some(Expr::Or(ExprOr { exprs }))
    }

    pub fn not(exprs: Vec<Expr>) -> Option<Expr> {
        if exprs.is_empty() {
            return None;
        }
        Some(Expr::Not(ExprNot { exprs }))
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        match self {
            Self::Raw(e) => e.build(builder),
            Self::Named(e) => e.build(builder),
            Self::In(e) => e.build(builder),
            Self::Eq(e) => e.build(builder),
            Self::Neq(e) => e.build(builder),
            Self::Gt(e) => e.build(builder),
            Self::Gte(e) => e.build(builder),
            Self::Lt(e) => e.build(builder),
            Self::Lte(e) => e.build(builder),
            Self::Like(e) => e.build(builder),
            Self::And(e) => e.build(builder),
            Self::Or(e) => e.build(builder),
            Self::Not(e) => e.build(builder),
        }
    }

    /// Whether the expression carries an inverted form, letting NOT rewrite
    /// it instead of prefixing the keyword.
    pub fn negatable(&self) -> bool {
        matches!(
            self,
            Self::In(_)
                | Self::Eq(_)
                | Self::Neq(_)
                | Self::Gt(_)
                | Self::Gte(_)
                | Self::Lt(_)
                | Self::Lte(_)
                | Self::Like(_)
        )
    }

    pub fn negation_build(&self, builder: &mut dyn Builder) {
        match self {
            Self::In(e) => e.negation_build(builder),
            Self::Eq(e) => e.negation_build(builder),
            Self::Neq(e) => e.negation_build(builder),
            Self::Gt(e) => e.negation_build(builder),
            Self::Gte(e) => e.negation_build(builder),
            Self::Lt(e) => e.negation_build(builder),
            Self::Lte(e) => e.negation_build(builder),
            Self::Like(e) => e.negation_build(builder),
            _ => self.build(builder),
        }
    }

    /// Raw SQL text of the expression, when it has one. Used by the WHERE
    /// emitter to decide on parenthesization.
    pub(crate) fn raw_sql(&self) -> Option<&str> {
        match self {
            Self::Raw(e) => Some(&e.sql),
            Self::Named(e) => Some(&e.sql),
            _ => None,
        }
    }
}

/// Raw SQL with positional placeholders.
///
/// `?` consumes the next variable. When the `?` directly follows `(` the
/// variable may be a list, expanded to comma-separated binds (a single NULL
/// bind when empty). Variables left over after the last `?` are appended as
/// named-argument carriers for a wrapping named expression to resolve.
#[derive(Debug, Clone)]
pub struct ExprRaw {
    pub sql: String,
    pub vars: Vec<Value>,
    /// Treat every `?` as if it followed `(`.
    pub without_parentheses: bool,
}

impl ExprRaw {
    pub fn build(&self, builder: &mut dyn Builder) {
        let mut idx = 0;
        let mut after_parenthesis = false;
        let mut text = String::new();

        for ch in self.sql.chars() {
            if ch == '?' && idx < self.vars.len() {
                if !text.is_empty() {
                    builder.write_str(&text);
                    text.clear();
                }

                let var = self.vars[idx].clone();
                if after_parenthesis || self.without_parentheses {
                    expand_list_var(builder, var);
                } else {
                    builder.add_var(Var::Value(var));
                }

                after_parenthesis = false;
                idx += 1;
            } else {
                after_parenthesis = ch == '(';
                text.push(ch);
            }
        }

        if !text.is_empty() {
            builder.write_str(&text);
        }

        for var in &self.vars[idx..] {
            builder.add_var(Var::Named {
                name: String::new(),
                value: var.clone(),
            });
        }
    }
}

fn expand_list_var(builder: &mut dyn Builder, var: Value) {
    match var {
        Value::List(items) if items.is_empty() => {
            builder.add_var(Var::Value(Value::Null));
        }
        Value::List(items) => {
            for (idx, item) in items.into_iter().enumerate() {
                if idx > 0 {
                    builder.write_str(",");
                }
                builder.add_var(Var::Value(item));
            }
        }
        other => builder.add_var(Var::Value(other)),
    }
}

/// Raw SQL with `@name` placeholders in addition to positional `?`.
///
/// Names terminate at whitespace, `,`, `)`, quotes, CR/LF, or `;`, and
/// resolve against the carried name map; unresolved names are written back
/// verbatim.
#[derive(Debug, Clone)]
pub struct ExprNamed {
    pub sql: String,
    pub vars: Vec<Value>,
    pub names: IndexMap<String, Value>,
}

impl ExprNamed {
    /// Merge a record's readable fields into the name map, recursing through
    /// embedded records.
    pub fn with_record(mut self, record: &dyn Record, desc: &crate::schema::RecordDescriptor) -> Self {
        collect_record_names(record, desc, &mut self.names);
        self
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        const TERMINATORS: &[char] = &[' ', ',', ')', '"', '\'', '`', '\r', '\n', ';'];

        let mut idx = 0;
        let mut in_name = false;
        let mut name = String::new();
        let mut after_parenthesis = false;
        let mut text = String::new();

        let mut flush = |builder: &mut dyn Builder, text: &mut String| {
            if !text.is_empty() {
                builder.write_str(text);
                text.clear();
            }
        };

        for ch in self.sql.chars() {
            if ch == '@' && !in_name {
                in_name = true;
                name.clear();
            } else if TERMINATORS.contains(&ch) {
                if in_name {
                    flush(builder, &mut text);
                    self.emit_name(builder, &name);
                    in_name = false;
                }

                after_parenthesis = false;
                text.push(ch);
            } else if ch == '?' && idx < self.vars.len() {
                flush(builder, &mut text);

                let var = self.vars[idx].clone();
                if after_parenthesis {
                    expand_list_var(builder, var);
                } else {
                    builder.add_var(Var::Value(var));
                }
                idx += 1;
            } else if in_name {
                name.push(ch);
            } else {
                after_parenthesis = ch == '(';
                text.push(ch);
            }
        }

        flush(builder, &mut text);

        if in_name {
            self.emit_name(builder, &name);
        }
    }

    fn emit_name(&self, builder: &mut dyn Builder, name: &str) {
        match self.names.get(name) {
            Some(value) => builder.add_var(Var::Value(value.clone())),
            None => {
                builder.write_str("@");
                builder.write_str(name);
            }
        }
    }
}

fn collect_record_names(
    record: &dyn Record,
    desc: &crate::schema::RecordDescriptor,
    names: &mut IndexMap<String, Value>,
) {
    for field in &desc.fields {
        match &field.kind {
            crate::schema::RawKind::Embedded(embedded) => {
                if let Some(sub) = record.record_at(field.index) {
                    collect_record_names(sub, &(embedded)(), names);
                }
            }
            crate::schema::RawKind::Relation { .. } => {}
            _ => {
                names
                    .entry(field.name.to_owned())
                    .or_insert_with(|| record.value_at(field.index));
            }
        }
    }
}
