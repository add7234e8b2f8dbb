use crate::ir::{Expr, FunctionIR, Stmt, UnOp};

use super::manager::{Pass, PassContext};

/// `!!x -> x` and `!(a OP b) -> a OP' b` via `CompareOp::negate()`.
pub struct SimplifyLogicalNots;

impl Pass for SimplifyLogicalNots {
    fn name(&self) -> &'static str {
        "SimplifyLogicalNots"
    }

    fn run(&self, func: &mut FunctionIR, _ctx: &PassContext) {
        for stmt in func.all_stmts_mut() {
            simplify_stmt(stmt);
        }
    }
}

fn simplify_stmt(stmt: &mut Stmt) {
    match stmt {
        Stmt::Assign { value, .. } => simplify_expr(value),
        Stmt::Store { address, value, .. } => {
            simplify_expr(address);
            simplify_expr(value);
        }
        Stmt::IfGoto { cond, .. } => simplify_expr(cond),
        Stmt::Call { args, .. } => args.iter_mut().for_each(simplify_expr),
        Stmt::Return { value: Some(v) } => simplify_expr(v),
        _ => {}
    }
}

fn simplify_expr(expr: &mut Expr) {
    match expr {
        Expr::UnOp { op: UnOp::LNot, operand, .. } => {
            simplify_expr(operand);
            match operand.as_mut() {
                Expr::UnOp { op: UnOp::LNot, operand: inner, .. } => {
                    *expr = (**inner).clone();
                }
                Expr::Compare { op, left, right } => {
                    *expr = Expr::compare(op.negate(), (**left).clone(), (**right).clone());
                }
                _ => {}
            }
        }
        Expr::UnOp { operand, .. } => simplify_expr(operand),
        Expr::BinOp { left, right, .. } => {
            simplify_expr(left);
            simplify_expr(right);
        }
        Expr::Compare { left, right, .. } => {
            simplify_expr(left);
            simplify_expr(right);
        }
        Expr::Cast { value, .. } => simplify_expr(value),
        Expr::Load { address, .. } => simplify_expr(address),
        Expr::AddrOf { operand } => simplify_expr(operand),
        Expr::Ternary { cond, when_true, when_false } => {
            simplify_expr(cond);
            simplify_expr(when_true);
            simplify_expr(when_false);
        }
        Expr::Call { args, .. } | Expr::Intrinsic { args, .. } => args.iter_mut().for_each(simplify_expr),
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::CompareOp;

    #[test]
    fn double_negation_cancels() {
        let mut e = Expr::un(UnOp::LNot, Expr::un(UnOp::LNot, Expr::reg("rax"), 1), 1);
        simplify_expr(&mut e);
        assert_eq!(e, Expr::reg("rax"));
    }

    #[test]
    fn negated_compare_flips_operator() {
        let mut e = Expr::un(UnOp::LNot, Expr::compare(CompareOp::Eq, Expr::reg("rax"), Expr::const_u(0, 64)), 1);
        simplify_expr(&mut e);
        assert_eq!(e, Expr::compare(CompareOp::Ne, Expr::reg("rax"), Expr::const_u(0, 64)));
    }
}
