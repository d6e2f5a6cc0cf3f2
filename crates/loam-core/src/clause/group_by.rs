use super::{build_exprs, Builder, Clause, ClauseExpression, Column, Expr, Interface, Quoted};

/// The GROUP BY clause with an optional HAVING tail.
#[derive(Debug, Clone, Default)]
pub struct GroupBy {
    pub columns: Vec<Column>,
    pub having: Vec<Expr>,
}

impl Interface for GroupBy {
    fn name(&self) -> &'static str {
        "GROUP BY"
    }

    fn merge_clause(mut self, clause: &mut Clause) {
        if let Some(ClauseExpression::GroupBy(prev)) = clause.expression.take() {
            let mut columns = prev.columns;
            columns.append(&mut self.columns);
            self.columns = columns;

            let mut having = prev.having;
            having.append(&mut self.having);
            self.having = having;
        }
        clause.expression = Some(ClauseExpression::GroupBy(self));
    }

    fn build(&self, builder: &mut dyn Builder) {
        GroupBy::build(self, builder)
    }
}

impl GroupBy {
    pub fn build(&self, builder: &mut dyn Builder) {
        for (idx, column) in self.columns.iter().enumerate() {
            if idx > 0 {
                builder.write_str(",");
            }
            builder.write_quoted(Quoted::Column(column));
        }

        if !self.having.is_empty() {
            builder.write_str(" HAVING ");
            build_exprs(&self.having, builder, " AND ");
        }
    }
}
