use super::{Builder, Clause, ClauseExpression, Expr, Interface};

const AND_WITH_SPACE: &str = " AND ";
const OR_WITH_SPACE: &str = " OR ";

/// The WHERE clause: an ordered list of expressions joined by AND, with OR
/// groups spliced in by the fluent chain.
#[derive(Debug, Clone, Default)]
pub struct Where {
    pub exprs: Vec<Expr>,
}

impl Interface for Where {
    fn name(&self) -> &'static str {
        "WHERE"
    }

    fn merge_clause(mut self, clause: &mut Clause) {
        if let Some(ClauseExpression::Where(prev)) = clause.expression.take() {
            let mut exprs = prev.exprs;
            exprs.append(&mut self.exprs);
            self.exprs = exprs;
        }
        clause.expression = Some(ClauseExpression::Where(self));
    }

    fn build(&self, builder: &mut dyn Builder) {
        let mut exprs = self.exprs.clone();

        if exprs.len() == 1 {
            if let Expr::And(and) = &exprs[0] {
                exprs = and.exprs.clone();
            }
        }

        // A single-child OR cannot lead: the connector in front of it is OR,
        // and the first position has no connector. Move the first expression
        // that may lead to the front.
        for idx in 0..exprs.len() {
            let single_or = matches!(&exprs[idx], Expr::Or(or) if or.exprs.len() == 1);
            if !single_or {
                if idx != 0 {
                    exprs.swap(0, idx);
                }
                break;
            }
        }

        build_exprs(&exprs, builder, AND_WITH_SPACE);
    }
}

/// Emit `exprs` joined by `join_cond`, switching to OR in front of
/// single-child OR groups and parenthesizing raw leaves whose text contains
/// a connector.
pub fn build_exprs(exprs: &[Expr], builder: &mut dyn Builder, join_cond: &str) {
    for (idx, expr) in exprs.iter().enumerate() {
        if idx > 0 {
            if matches!(expr, Expr::Or(or) if or.exprs.len() == 1) {
                builder.write_str(OR_WITH_SPACE);
            } else {
                builder.write_str(join_cond);
            }
        }

        let mut wrap_in_parentheses = false;
        if exprs.len() > 1 {
            let raw_sql = match expr {
                Expr::Raw(_) | Expr::Named(_) => expr.raw_sql(),
                Expr::Or(or) if or.exprs.len() == 1 => or.exprs[0].raw_sql(),
                Expr::And(and) if and.exprs.len() == 1 => and.exprs[0].raw_sql(),
                _ => None,
            };
            if let Some(sql) = raw_sql {
                wrap_in_parentheses = contains_connector(sql);
            }
        }

        if wrap_in_parentheses {
            builder.write_str("(");
            expr.build(builder);
            builder.write_str(")");
        } else {
            expr.build(builder);
        }
    }
}

fn contains_connector(sql: &str) -> bool {
    let upper = sql.to_uppercase();
    upper.contains(AND_WITH_SPACE) || upper.contains(OR_WITH_SPACE)
}

/// A conjunction group. Always parenthesized, so folded groups keep their
/// grouping when spliced into an OR.
#[derive(Debug, Clone)]
pub struct ExprAnd {
    pub exprs: Vec<Expr>,
}

impl ExprAnd {
    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_str("(");
        build_exprs(&self.exprs, builder, AND_WITH_SPACE);
        builder.write_str(")");
    }
}

/// A disjunction group.
#[derive(Debug, Clone)]
pub struct ExprOr {
    pub exprs: Vec<Expr>,
}

impl ExprOr {
    pub fn build(&self, builder: &mut dyn Builder) {
        if self.exprs.len() > 1 {
            builder.write_str("(");
            build_exprs(&self.exprs, builder, OR_WITH_SPACE);
            builder.write_str(")");
        } else {
            build_exprs(&self.exprs, builder, OR_WITH_SPACE);
        }
    }
}

/// A negation group. Operands with an inverted form are rewritten; raw
/// operands are parenthesized behind the NOT keyword.
#[derive(Debug, Clone)]
pub struct ExprNot {
    pub exprs: Vec<Expr>,
}

impl ExprNot {
    pub fn build(&self, builder: &mut dyn Builder) {
        if self.exprs.len() > 1 {
            builder.write_str("(");
        }

        for (idx, expr) in self.exprs.iter().enumerate() {
            if idx > 0 {
                builder.write_str(AND_WITH_SPACE);
            }

            if expr.negatable() {
                expr.negation_build(builder);
            } else {
                builder.write_str("NOT ");
                match expr {
                    Expr::Raw(_) | Expr::Named(_) => {
                        builder.write_str("(");
                        expr.build(builder);
                        builder.write_str(")");
                    }
                    _ => expr.build(builder),
                }
            }
        }

        if self.exprs.len() > 1 {
            builder.write_str(")");
        }
    }
}
