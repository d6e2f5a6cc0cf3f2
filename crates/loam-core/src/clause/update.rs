use super::{Builder, Clause, ClauseExpression, Interface, Quoted, Table};

/// The UPDATE clause: modifier plus target table.
#[derive(Debug, Clone, Default)]
pub struct Update {
    pub table: Option<Table>,
    /// Options such as `LOW_PRIORITY`.
    pub modifier: String,
}

impl Interface for Update {
    fn name(&self) -> &'static str {
        "UPDATE"
    }

    fn merge_clause(mut self, clause: &mut Clause) {
        if let Some(ClauseExpression::Update(prev)) = clause.expression.take() {
            if self.modifier.is_empty() {
                self.modifier = prev.modifier;
            }
            if self.table.is_none() {
                self.table = prev.table;
            }
        }
        clause.expression = Some(ClauseExpression::Update(self));
    }

    fn build(&self, builder: &mut dyn Builder) {
        Update::build(self, builder)
    }
}

impl Update {
    pub fn build(&self, builder: &mut dyn Builder) {
        if !self.modifier.is_empty() {
            builder.write_str(&self.modifier);
            builder.write_str(" ");
        }

        match &self.table {
            Some(table) => builder.write_quoted(Quoted::Table(table)),
            None => builder.write_quoted(Quoted::Table(&Table::current())),
        }
    }
}
