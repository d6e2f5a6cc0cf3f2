use super::{Builder, Clause, ClauseExpression, Interface, Quoted, Table};

/// The INSERT clause: modifier plus target table.
#[derive(Debug, Clone, Default)]
pub struct Insert {
    /// Target table; the statement's table when unset.
    pub table: Option<Table>,
    /// Options between INSERT and INTO, e.g. `IGNORE`.
    pub modifier: String,
}

impl Interface for Insert {
    fn name(&self) -> &'static str {
        "INSERT"
    }

    fn merge_clause(mut self, clause: &mut Clause) {
        if let Some(ClauseExpression::Insert(prev)) = clause.expression.take() {
            if self.modifier.is_empty() {
                self.modifier = prev.modifier;
            }
            if self.table.is_none() {
                self.table = prev.table;
            }
        }
        clause.expression = Some(ClauseExpression::Insert(self));
    }

    fn build(&self, builder: &mut dyn Builder) {
        Insert::build(self, builder)
    }
}

impl Insert {
    pub fn build(&self, builder: &mut dyn Builder) {
        if !self.modifier.is_empty() {
            builder.write_str(&self.modifier);
            builder.write_str(" ");
        }

        builder.write_str("INTO ");
        match &self.table {
            Some(table) => builder.write_quoted(Quoted::Table(table)),
            None => builder.write_quoted(Quoted::Table(&Table::current())),
        }
    }
}
