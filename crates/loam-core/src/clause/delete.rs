use super::{Builder, Clause, ClauseExpression, Interface};

/// The DELETE keyword with an optional modifier.
#[derive(Debug, Clone, Default)]
pub struct Delete {
    pub modifier: String,
}

impl Interface for Delete {
    fn name(&self) -> &'static str {
        "DELETE"
    }

    fn merge_clause(self, clause: &mut Clause) {
        // The fragment carries its own keyword.
        clause.name = "";
        clause.expression = Some(ClauseExpression::Delete(self));
    }

    fn build(&self, builder: &mut dyn Builder) {
        Delete::build(self, builder)
    }
}

impl Delete {
    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_str("DELETE");

        if !self.modifier.is_empty() {
            builder.write_str(" ");
            builder.write_str(&self.modifier);
        }
    }
}
