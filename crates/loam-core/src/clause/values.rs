use super::{Builder, Clause, ClauseExpression, Column, Interface, Quoted, Var};

/// The VALUES fragment of an INSERT: column list plus one variable row per
/// inserted record.
#[derive(Debug, Clone, Default)]
pub struct Values {
    pub columns: Vec<Column>,
    pub values: Vec<Vec<Var>>,
}

impl Interface for Values {
    fn name(&self) -> &'static str {
        "VALUES"
    }

    fn merge_clause(self, clause: &mut Clause) {
        // The fragment carries its own VALUES keyword.
        clause.name = "";
        clause.expression = Some(ClauseExpression::Values(self));
    }

    fn build(&self, builder: &mut dyn Builder) {
        Values::build(self, builder)
    }
}

impl Values {
    pub fn build(&self, builder: &mut dyn Builder) {
        if self.columns.is_empty() {
            builder.write_str("DEFAULT VALUES");
            return;
        }

        builder.write_quoted(Quoted::Columns(&self.columns));
        builder.write_str(" VALUES ");

        for (idx, row) in self.values.iter().enumerate() {
            if idx > 0 {
                builder.write_str(",");
            }

            builder.write_str("(");
            builder.add_vars(row.clone());
            builder.write_str(")");
        }
    }
}
