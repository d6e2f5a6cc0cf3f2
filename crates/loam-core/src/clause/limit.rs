use super::{Builder, Clause, ClauseExpression, Interface, Var};
use crate::Value;

/// The LIMIT/OFFSET clause. Both parts are nullable so that merges can
/// override one without clobbering the other.
#[derive(Debug, Clone, Default)]
pub struct Limit {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Interface for Limit {
    fn name(&self) -> &'static str {
        "LIMIT"
    }

    fn merge_clause(mut self, clause: &mut Clause) {
        // The fragment carries its own keywords.
        clause.name = "";

        if let Some(ClauseExpression::Limit(prev)) = clause.expression.take() {
            if self.limit.is_none() {
                self.limit = prev.limit;
            }
            if self.offset.is_none() {
                self.offset = prev.offset;
            }
        }
        clause.expression = Some(ClauseExpression::Limit(self));
    }

    fn build(&self, builder: &mut dyn Builder) {
        Limit::build(self, builder)
    }
}

impl Limit {
    pub fn build(&self, builder: &mut dyn Builder) {
        if let Some(limit) = self.limit {
            builder.write_str("LIMIT ");
            builder.add_var(Var::Value(Value::Int(limit)));
        }

        if let Some(offset) = self.offset {
            if offset > 0 {
                if self.limit.is_some() {
                    builder.write_str(" ");
                }
                builder.write_str("OFFSET ");
                builder.add_var(Var::Value(Value::Int(offset)));
            }
        }
    }
}
