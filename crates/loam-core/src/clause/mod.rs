mod comparison;
mod conditions;
mod delete;
mod expr;
mod from;
mod group_by;
mod insert;
mod joins;
mod limit;
mod locking;
mod on_conflict;
mod order_by;
mod returning;
mod select;
mod set;
mod update;
mod values;

pub use comparison::{ExprEq, ExprGt, ExprGte, ExprIn, ExprLike, ExprLt, ExprLte, ExprNeq};
pub use conditions::{build_exprs, ExprAnd, ExprNot, ExprOr, Where};
pub use delete::Delete;
pub use expr::{Expr, ExprNamed, ExprRaw};
pub use from::From;
pub use group_by::GroupBy;
pub use insert::Insert;
pub use joins::{Join, JoinType};
pub use limit::Limit;
pub use locking::Locking;
pub use on_conflict::OnConflict;
pub use order_by::{OrderBy, OrderByColumn};
pub use returning::Returning;
pub use select::Select;
pub use set::{Assignment, Set};
pub use update::Update;
pub use values::Values;

use crate::{Error, Value};

/// Reserved table-name placeholder resolved to the statement's table at
/// emission time.
pub const CURRENT_TABLE: &str = "@@@ct@@@";

/// Reserved column-name placeholder resolved to the prioritized primary
/// field's column at emission time.
pub const PRIMARY_KEY: &str = "@@@pk@@@";

/// A table reference in a clause node.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub alias: String,
    /// Bypass dialect quoting when emitting.
    pub raw: bool,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: String::new(),
            raw: false,
        }
    }

    /// The current-table sentinel.
    pub fn current() -> Self {
        Self::new(CURRENT_TABLE)
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::current()
    }
}

/// A column reference in a clause node.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub table: String,
    pub name: String,
    pub alias: String,
    /// Bypass dialect quoting when emitting.
    pub raw: bool,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: String::new(),
            name: name.into(),
            alias: String::new(),
            raw: false,
        }
    }

    pub fn with_table(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            alias: String::new(),
            raw: false,
        }
    }

    /// The primary-key sentinel column, scoped to the current table.
    pub fn primary() -> Self {
        Self::with_table(CURRENT_TABLE, PRIMARY_KEY)
    }
}

/// A value passed to [`Builder::add_var`].
#[derive(Debug, Clone)]
pub enum Var {
    Value(Value),
    /// Named argument: pushed into the variable vector without emitting a
    /// placeholder; named expressions resolve it by name.
    Named { name: String, value: Value },
    Column(Column),
    Table(Table),
    Expr(Expr),
    /// A pre-rendered sub-statement spliced in with its variables rebound.
    Subquery(Subquery),
}

impl Var {
    pub fn value(v: impl Into<Value>) -> Self {
        Self::Value(v.into())
    }
}

impl core::convert::From<Value> for Var {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

/// A rendered sub-statement: SQL with `?` placeholders plus the variables
/// they consume, ready to be spliced into an outer statement.
#[derive(Debug, Clone)]
pub struct Subquery {
    pub sql: String,
    pub vars: Vec<Value>,
}

/// Quoting targets accepted by [`Builder::write_quoted`].
#[derive(Debug, Clone, Copy)]
pub enum Quoted<'a> {
    Table(&'a Table),
    Column(&'a Column),
    Columns(&'a [Column]),
    Str(&'a str),
    Strs(&'a [String]),
    Expr(&'a Expr),
}

/// The writer side of clause emission: receives SQL text, quoted
/// identifiers, and bound variables.
///
/// The statement builder is the canonical implementation; clause nodes only
/// ever talk to this contract.
pub trait Builder {
    fn write_str(&mut self, sql: &str);

    fn write_quoted(&mut self, target: Quoted<'_>);

    fn add_var(&mut self, var: Var);

    fn add_error(&mut self, err: Error);

    /// Append several variables separated by commas.
    fn add_vars(&mut self, vars: Vec<Var>) {
        for (idx, var) in vars.into_iter().enumerate() {
            if idx > 0 {
                self.write_str(",");
            }
            self.add_var(var);
        }
    }
}

/// A named, mergeable SQL fragment slot within a statement.
#[derive(Debug, Clone, Default)]
pub struct Clause {
    pub name: &'static str,
    pub before_expression: Option<Expr>,
    pub after_name_expression: Option<Expr>,
    pub after_expression: Option<Expr>,
    pub expression: Option<ClauseExpression>,
}

impl Clause {
    pub fn build(&self, builder: &mut dyn Builder) {
        let Some(expression) = &self.expression else {
            return;
        };

        if let Some(before) = &self.before_expression {
            before.build(builder);
            builder.write_str(" ");
        }

        if !self.name.is_empty() {
            builder.write_str(self.name);
            builder.write_str(" ");
        }

        if let Some(after_name) = &self.after_name_expression {
            after_name.build(builder);
            builder.write_str(" ");
        }

        expression.build(builder);

        if let Some(after) = &self.after_expression {
            builder.write_str(" ");
            after.build(builder);
        }
    }
}

/// The concrete fragment stored in a [`Clause`] slot.
#[derive(Debug, Clone)]
pub enum ClauseExpression {
    Insert(Insert),
    Values(Values),
    Where(Where),
    Select(Select),
    From(From),
    GroupBy(GroupBy),
    OrderBy(OrderBy),
    Limit(Limit),
    Locking(Locking),
    OnConflict(OnConflict),
    Returning(Returning),
    Update(Update),
    Set(Set),
    Delete(Delete),
    Expr(Expr),
}

impl ClauseExpression {
    pub fn build(&self, builder: &mut dyn Builder) {
        match self {
            Self::Insert(c) => c.build(builder),
            Self::Values(c) => c.build(builder),
            Self::Where(c) => c.build(builder),
            Self::Select(c) => c.build(builder),
            Self::From(c) => c.build(builder),
            Self::GroupBy(c) => c.build(builder),
            Self::OrderBy(c) => c.build(builder),
            Self::Limit(c) => c.build(builder),
            Self::Locking(c) => c.build(builder),
            Self::OnConflict(c) => c.build(builder),
            Self::Returning(c) => c.build(builder),
            Self::Update(c) => c.build(builder),
            Self::Set(c) => c.build(builder),
            Self::Delete(c) => c.build(builder),
            Self::Expr(c) => c.build(builder),
        }
    }
}

/// Implemented by each clause type: identifies the slot it occupies and how
/// it merges with an earlier occupant.
pub trait Interface {
    fn name(&self) -> &'static str;

    fn merge_clause(self, clause: &mut Clause);

    fn build(&self, builder: &mut dyn Builder);
}

impl Interface for Expr {
    fn name(&self) -> &'static str {
        ""
    }

    fn merge_clause(self, clause: &mut Clause) {
        clause.expression = Some(ClauseExpression::Expr(self));
    }

    fn build(&self, builder: &mut dyn Builder) {
        Expr::build(self, builder);
    }
}
