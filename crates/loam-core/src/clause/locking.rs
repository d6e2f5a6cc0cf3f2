use super::{Builder, Clause, ClauseExpression, Interface, Quoted, Table};

/// Row-locking clause, emitted as `FOR <strength> [OF <table>] [<options>]`.
#[derive(Debug, Clone)]
pub struct Locking {
    /// `UPDATE` or `SHARE`.
    pub strength: String,
    pub table: Option<Table>,
    /// Trailing options such as `NOWAIT` or `SKIP LOCKED`.
    pub options: String,
}

impl Default for Locking {
    fn default() -> Self {
        Self {
            strength: "UPDATE".to_owned(),
            table: None,
            options: String::new(),
        }
    }
}

impl Interface for Locking {
    fn name(&self) -> &'static str {
        "FOR"
    }

    fn merge_clause(self, clause: &mut Clause) {
        clause.expression = Some(ClauseExpression::Locking(self));
    }

    fn build(&self, builder: &mut dyn Builder) {
        Locking::build(self, builder)
    }
}

impl Locking {
    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_str(&self.strength);

        if let Some(table) = &self.table {
            builder.write_str(" OF ");
            builder.write_quoted(Quoted::Table(table));
        }

        if !self.options.is_empty() {
            builder.write_str(" ");
            builder.write_str(&self.options);
        }
    }
}
