use super::{Builder, Expr, Interface, Quoted, Table, Where};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    Cross,
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    fn keyword(self) -> &'static str {
        match self {
            Self::Cross => "CROSS",
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Full => "FULL",
        }
    }
}

/// A single join emitted inside the FROM clause.
#[derive(Debug, Clone, Default)]
pub struct Join {
    pub join_type: JoinType,
    pub table: Table,
    pub on: Option<Where>,
    pub using: Vec<String>,
    /// Raw join text overriding the structured form.
    pub expression: Option<Expr>,
}

impl Join {
    pub fn raw(expr: Expr) -> Self {
        Self {
            expression: Some(expr),
            ..Default::default()
        }
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        if let Some(expr) = &self.expression {
            expr.build(builder);
            return;
        }

        builder.write_str(self.join_type.keyword());
        builder.write_str(" JOIN ");
        builder.write_quoted(Quoted::Table(&self.table));

        if let Some(on) = &self.on {
            builder.write_str(" ON ");
            on.build(builder);
        } else if !self.using.is_empty() {
            builder.write_str(" USING (");
            builder.write_quoted(Quoted::Strs(&self.using));
            builder.write_str(")");
        }
    }
}
