use super::{Assignment, Builder, Clause, ClauseExpression, Column, Interface, Quoted, Where};

/// The ON CONFLICT clause.
#[derive(Debug, Clone, Default)]
pub struct OnConflict {
    pub columns: Vec<Column>,
    pub where_: Where,
    pub on_constraint: String,
    pub do_nothing: bool,
    pub do_updates: Vec<Assignment>,
    /// Expand to per-column assignments over every inserted column.
    pub update_all: bool,
}

impl Interface for OnConflict {
    fn name(&self) -> &'static str {
        "ON CONFLICT"
    }

    fn merge_clause(self, clause: &mut Clause) {
        clause.expression = Some(ClauseExpression::OnConflict(self));
    }

    fn build(&self, builder: &mut dyn Builder) {
        OnConflict::build(self, builder)
    }
}

impl OnConflict {
    pub fn build(&self, builder: &mut dyn Builder) {
        if !self.on_constraint.is_empty() {
            builder.write_str("ON CONSTRAINT ");
            builder.write_str(&self.on_constraint);
            builder.write_str(" ");
        } else if !self.columns.is_empty() {
            builder.write_quoted(Quoted::Columns(&self.columns));
            builder.write_str(" ");

            if !self.where_.exprs.is_empty() {
                builder.write_str("WHERE ");
                self.where_.build(builder);
                builder.write_str(" ");
            }
        }

        if self.do_nothing {
            builder.write_str("DO NOTHING");
        } else {
            builder.write_str("DO UPDATE SET ");
            if self.do_updates.is_empty() {
                builder.add_error(crate::Error::invalid_value(
                    "ON CONFLICT DO UPDATE requires assignments",
                ));
                return;
            }

            for (idx, assignment) in self.do_updates.iter().enumerate() {
                if idx > 0 {
                    builder.write_str(",");
                }
                assignment.build(builder);
            }
        }
    }
}
