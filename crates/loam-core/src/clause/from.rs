use super::{Builder, Clause, ClauseExpression, Interface, Join, Quoted, Table};

/// The FROM clause: source tables plus any joins.
#[derive(Debug, Clone, Default)]
pub struct From {
    pub tables: Vec<Table>,
    pub joins: Vec<Join>,
}

impl Interface for From {
    fn name(&self) -> &'static str {
        "FROM"
    }

    fn merge_clause(self, clause: &mut Clause) {
        clause.expression = Some(ClauseExpression::From(self));
    }

    fn build(&self, builder: &mut dyn Builder) {
        From::build(self, builder)
    }
}

impl From {
    pub fn build(&self, builder: &mut dyn Builder) {
        if self.tables.is_empty() {
            builder.write_quoted(Quoted::Table(&Table::current()));
        } else {
            for (idx, table) in self.tables.iter().enumerate() {
                if idx > 0 {
                    builder.write_str(",");
                }
                builder.write_quoted(Quoted::Table(table));
            }
        }

        for join in &self.joins {
            builder.write_str(" ");
            join.build(builder);
        }
    }
}
