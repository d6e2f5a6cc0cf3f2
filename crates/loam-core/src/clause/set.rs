use super::{Builder, Clause, ClauseExpression, Column, Interface, Quoted, Var};

/// A single `column = value` assignment.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub column: Column,
    pub value: Var,
}

impl Assignment {
    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_quoted(Quoted::Column(&self.column));
        builder.write_str("=");
        builder.add_var(self.value.clone());
    }
}

/// The SET clause of an UPDATE.
#[derive(Debug, Clone, Default)]
pub struct Set {
    pub assignments: Vec<Assignment>,
}

impl Interface for Set {
    fn name(&self) -> &'static str {
        "SET"
    }

    fn merge_clause(mut self, clause: &mut Clause) {
        if let Some(ClauseExpression::Set(prev)) = clause.expression.take() {
            let mut assignments = prev.assignments;
            assignments.append(&mut self.assignments);
            self.assignments = assignments;
        }
        clause.expression = Some(ClauseExpression::Set(self));
    }

    fn build(&self, builder: &mut dyn Builder) {
        Set::build(self, builder)
    }
}

impl Set {
    pub fn build(&self, builder: &mut dyn Builder) {
        for (idx, assignment) in self.assignments.iter().enumerate() {
            if idx > 0 {
                builder.write_str(",");
            }
            assignment.build(builder);
        }
    }
}
