use super::{Builder, Column, Quoted, Var};
use crate::Value;

/// Membership in a set of values.
#[derive(Debug, Clone)]
pub struct ExprIn {
    pub column: Column,
    pub values: Vec<Value>,
}

impl ExprIn {
    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_quoted(Quoted::Column(&self.column));

        match self.values.len() {
            0 => builder.write_str(" IN (NULL)"),
            1 if !self.values[0].is_list() => {
                builder.write_str(" = ");
                builder.add_var(Var::Value(self.values[0].clone()));
            }
            _ => {
                builder.write_str(" IN (");
                builder.add_vars(self.values.iter().cloned().map(Var::Value).collect());
                builder.write_str(")");
            }
        }
    }

    pub fn negation_build(&self, builder: &mut dyn Builder) {
        builder.write_quoted(Quoted::Column(&self.column));

        match self.values.len() {
            0 => builder.write_str(" IS NOT NULL"),
            1 if !self.values[0].is_list() => {
                builder.write_str(" <> ");
                builder.add_var(Var::Value(self.values[0].clone()));
            }
            _ => {
                builder.write_str(" NOT IN (");
                builder.add_vars(self.values.iter().cloned().map(Var::Value).collect());
                builder.write_str(")");
            }
        }
    }
}

/// Equality. A list value becomes an IN group; NULL becomes IS NULL.
#[derive(Debug, Clone)]
pub struct ExprEq {
    pub column: Column,
    pub value: Value,
}

impl ExprEq {
    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_quoted(Quoted::Column(&self.column));

        match &self.value {
            Value::List(items) => {
                builder.write_str(" IN (");
                builder.add_vars(items.iter().cloned().map(Var::Value).collect());
                builder.write_str(")");
            }
            Value::Null => builder.write_str(" IS NULL"),
            value => {
                builder.write_str(" = ");
                builder.add_var(Var::Value(value.clone()));
            }
        }
    }

    pub fn negation_build(&self, builder: &mut dyn Builder) {
        ExprNeq {
            column: self.column.clone(),
            value: self.value.clone(),
        }
        .build(builder);
    }
}

/// Inequality.
#[derive(Debug, Clone)]
pub struct ExprNeq {
    pub column: Column,
    pub value: Value,
}

impl ExprNeq {
    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_quoted(Quoted::Column(&self.column));

        match &self.value {
            Value::List(items) => {
                builder.write_str(" NOT IN (");
                builder.add_vars(items.iter().cloned().map(Var::Value).collect());
                builder.write_str(")");
            }
            Value::Null => builder.write_str(" IS NOT NULL"),
            value => {
                builder.write_str(" <> ");
                builder.add_var(Var::Value(value.clone()));
            }
        }
    }

    pub fn negation_build(&self, builder: &mut dyn Builder) {
        ExprEq {
            column: self.column.clone(),
            value: self.value.clone(),
        }
        .build(builder);
    }
}

macro_rules! ordered_comparison {
    ($(#[$doc:meta])* $name:ident, $op:literal, $negation:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            pub column: Column,
            pub value: Value,
        }

        impl $name {
            pub fn build(&self, builder: &mut dyn Builder) {
                builder.write_quoted(Quoted::Column(&self.column));
                builder.write_str(concat!(" ", $op, " "));
                builder.add_var(Var::Value(self.value.clone()));
            }

            pub fn negation_build(&self, builder: &mut dyn Builder) {
                $negation {
                    column: self.column.clone(),
                    value: self.value.clone(),
                }
                .build(builder);
            }
        }
    };
}

ordered_comparison!(
    /// Greater than.
    ExprGt, ">", ExprLte
);
ordered_comparison!(
    /// Greater than or equal.
    ExprGte, ">=", ExprLt
);
ordered_comparison!(
    /// Less than.
    ExprLt, "<", ExprGte
);
ordered_comparison!(
    /// Less than or equal.
    ExprLte, "<=", ExprGt
);

/// Pattern match.
#[derive(Debug, Clone)]
pub struct ExprLike {
    pub column: Column,
    pub value: Value,
}

impl ExprLike {
    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_quoted(Quoted::Column(&self.column));
        builder.write_str(" LIKE ");
        builder.add_var(Var::Value(self.value.clone()));
    }

    pub fn negation_build(&self, builder: &mut dyn Builder) {
        builder.write_quoted(Quoted::Column(&self.column));
        builder.write_str(" NOT LIKE ");
        builder.add_var(Var::Value(self.value.clone()));
    }
}
