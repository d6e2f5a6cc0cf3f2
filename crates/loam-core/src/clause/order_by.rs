use super::{Builder, Clause, ClauseExpression, Column, Expr, Interface, Quoted};

#[derive(Debug, Clone)]
pub struct OrderByColumn {
    pub column: Column,
    pub desc: bool,
    /// Discard previously merged ordering when set.
    pub reorder: bool,
}

/// The ORDER BY clause.
#[derive(Debug, Clone, Default)]
pub struct OrderBy {
    pub columns: Vec<OrderByColumn>,
    /// Raw ordering overriding the column list.
    pub expression: Option<Expr>,
}

impl Interface for OrderBy {
    fn name(&self) -> &'static str {
        "ORDER BY"
    }

    fn merge_clause(mut self, clause: &mut Clause) {
        if let Some(ClauseExpression::OrderBy(prev)) = clause.expression.take() {
            let reorder = self.columns.iter().any(|col| col.reorder);
            if !reorder && self.expression.is_none() {
                let mut columns = prev.columns;
                columns.append(&mut self.columns);
                self.columns = columns;
            }
        }
        clause.expression = Some(ClauseExpression::OrderBy(self));
    }

    fn build(&self, builder: &mut dyn Builder) {
        OrderBy::build(self, builder)
    }
}

impl OrderBy {
    pub fn build(&self, builder: &mut dyn Builder) {
        if let Some(expr) = &self.expression {
            expr.build(builder);
            return;
        }

        for (idx, col) in self.columns.iter().enumerate() {
            if idx > 0 {
                builder.write_str(",");
            }

            builder.write_quoted(Quoted::Column(&col.column));
            if col.desc {
                builder.write_str(" DESC");
            }
        }
    }
}
