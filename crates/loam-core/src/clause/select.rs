use super::{Builder, Clause, ClauseExpression, Column, Expr, Interface, Quoted};

/// The SELECT clause: chosen columns, or `*` when none are named.
#[derive(Debug, Clone, Default)]
pub struct Select {
    pub distinct: bool,
    pub columns: Vec<Column>,
    /// Raw projection overriding the column list.
    pub expression: Option<Expr>,
}

impl Interface for Select {
    fn name(&self) -> &'static str {
        "SELECT"
    }

    fn merge_clause(self, clause: &mut Clause) {
        if let Some(mut expr) = self.expression {
            if self.distinct {
                if let Expr::Raw(raw) = &mut expr {
                    raw.sql = format!("DISTINCT {}", raw.sql);
                }
            }
            clause.expression = Some(ClauseExpression::Expr(expr));
        } else {
            clause.expression = Some(ClauseExpression::Select(self));
        }
    }

    fn build(&self, builder: &mut dyn Builder) {
        Select::build(self, builder)
    }
}

impl Select {
    pub fn build(&self, builder: &mut dyn Builder) {
        if self.columns.is_empty() {
            builder.write_str("*");
            return;
        }

        if self.distinct {
            builder.write_str("DISTINCT ");
        }

        for (idx, column) in self.columns.iter().enumerate() {
            if idx > 0 {
                builder.write_str(",");
            }
            builder.write_quoted(Quoted::Column(column));
        }
    }
}
