use crate::ir::{BinOp, Expr, FunctionIR, Stmt};

use super::manager::{Pass, PassContext};

/// `x + 0 -> x`, `x & 0 -> 0`, `x ^ x -> 0`, and the rest of the identities
/// the spec lists — applied bottom-up so a simplification at one level can
/// expose another above it.
pub struct SimplifyArithmeticIdentities;

impl Pass for SimplifyArithmeticIdentities {
    fn name(&self) -> &'static str {
        "SimplifyArithmeticIdentities"
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

fn is_zero(e: &Expr) -> bool {
    matches!(e.as_literal(), Some(0))
}

fn is_all_ones(e: &Expr, bits: u32) -> bool {
    let mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
    e.as_literal() == Some(mask)
}

fn is_one(e: &Expr) -> bool {
    matches!(e.as_literal(), Some(1))
}

pub fn simplify_expr(expr: &mut Expr) {
    match expr {
        Expr::BinOp { op, left, right, bits } => {
            simplify_expr(left);
            simplify_expr(right);
            let bits = *bits;
            let replacement = match op {
                BinOp::Add if is_zero(right) => Some((**left).clone()),
                BinOp::Add if is_zero(left) => Some((**right).clone()),
                BinOp::Sub if is_zero(right) => Some((**left).clone()),
                BinOp::Sub if left.as_ref() == right.as_ref() => Some(Expr::const_u(0, bits)),
                BinOp::Mul if is_one(right) => Some((**left).clone()),
                BinOp::Mul if is_one(left) => Some((**right).clone()),
                BinOp::And if is_zero(right) || is_zero(left) => Some(Expr::const_u(0, bits)),
                BinOp::And if is_all_ones(right, bits) => Some((**left).clone()),
                BinOp::And if is_all_ones(left, bits) => Some((**right).clone()),
                BinOp::Or if is_zero(right) => Some((**left).clone()),
                BinOp::Or if is_zero(left) => Some((**right).clone()),
                BinOp::Xor if left.as_ref() == right.as_ref() => Some(Expr::const_u(0, bits)),
                BinOp::Xor if is_zero(right) => Some((**left).clone()),
                BinOp::Xor if is_zero(left) => Some((**right).clone()),
                BinOp::Shl if is_zero(right) => Some((**left).clone()),
                BinOp::Shr if is_zero(right) => Some((**left).clone()),
                BinOp::Sar if is_zero(right) => Some((**left).clone()),
                _ => None,
            };
            if let Some(r) = replacement {
                *expr = r;
            }
        }
        Expr::UnOp { operand, .. } => simplify_expr(operand),
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
