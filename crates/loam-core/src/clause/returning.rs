use super::{Builder, Clause, ClauseExpression, Column, Interface, Quoted};

/// The RETURNING clause; all columns when empty.
#[derive(Debug, Clone, Default)]
pub struct Returning {
    pub columns: Vec<Column>,
}

impl Interface for Returning {
    fn name(&self) -> &'static str {
        "RETURNING"
    }

    fn merge_clause(mut self, clause: &mut Clause) {
        if let Some(ClauseExpression::Returning(prev)) = clause.expression.take() {
            let mut columns = prev.columns;
            columns.append(&mut self.columns);
            self.columns = columns;
        }
        clause.expression = Some(ClauseExpression::Returning(self));
    }

    fn build(&self, builder: &mut dyn Builder) {
        Returning::build(self, builder)
    }
}

impl Returning {
    pub fn build(&self, builder: &mut dyn Builder) {
        if self.columns.is_empty() {
            builder.write_str("*");
            return;
        }

        for (idx, column) in self.columns.iter().enumerate() {
            if idx > 0 {
                builder.write_str(",");
            }
            builder.write_quoted(Quoted::Column(column));
        }
    }
}
