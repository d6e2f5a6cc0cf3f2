use loam_core::clause::{Builder, Quoted, Var};
use loam_core::{Error, Value};

/// Minimal builder: `$N` placeholders, double-quote quoting.
#[derive(Default)]
pub struct TestBuilder {
    pub sql: String,
    pub vars: Vec<Value>,
    pub errors: Vec<Error>,
}

impl TestBuilder {
    fn quote(&mut self, ident: &str) {
        self.sql.push('"');
        self.sql.push_str(ident);
        self.sql.push('"');
    }
}

impl Builder for TestBuilder {
    fn write_str(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn write_quoted(&mut self, target: Quoted<'_>) {
        match target {
            Quoted::Table(table) => self.quote(&table.name.clone()),
            Quoted::Column(column) => {
                let column = column.clone();
                if !column.table.is_empty() {
                    self.quote(&column.table);
                    self.sql.push('.');
                }
                if column.raw {
                    self.sql.push_str(&column.name);
                } else {
                    self.quote(&column.name);
                }
            }
            Quoted::Columns(columns) => {
                let columns = columns.to_vec();
                self.sql.push('(');
                for (idx, column) in columns.iter().enumerate() {
                    if idx > 0 {
                        self.sql.push(',');
                    }
                    self.write_quoted(Quoted::Column(column));
                }
                self.sql.push(')');
            }
            Quoted::Str(ident) => self.quote(&ident.to_owned()),
            Quoted::Strs(idents) => {
                let idents = idents.to_vec();
                self.sql.push('(');
                for (idx, ident) in idents.iter().enumerate() {
                    if idx > 0 {
                        self.sql.push(',');
                    }
                    self.quote(ident);
                }
                self.sql.push(')');
            }
            Quoted::Expr(expr) => expr.clone().build(self),
        }
    }

    fn add_var(&mut self, var: Var) {
        match var {
            Var::Value(Value::List(items)) => {
                self.sql.push('(');
                if items.is_empty() {
                    self.add_var(Var::Value(Value::Null));
                } else {
                    for (idx, item) in items.into_iter().enumerate() {
                        if idx > 0 {
                            self.sql.push(',');
                        }
                        self.add_var(Var::Value(item));
                    }
                }
                self.sql.push(')');
            }
            Var::Value(value) => {
                self.vars.push(value);
                self.sql.push_str(&format!("${}", self.vars.len()));
            }
            Var::Named { value, .. } => self.vars.push(value),
            Var::Column(column) => self.write_quoted(Quoted::Column(&column)),
            Var::Table(table) => self.write_quoted(Quoted::Table(&table)),
            Var::Expr(expr) => expr.build(self),
            Var::Subquery(sub) => {
                for ch in sub.sql.chars() {
                    if ch == '?' {
                        self.sql.push('?');
                    } else {
                        self.sql.push(ch);
                    }
                }
            }
        }
    }

    fn add_error(&mut self, err: Error) {
        self.errors.push(err);
    }
}
