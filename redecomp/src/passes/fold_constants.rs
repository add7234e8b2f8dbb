use crate::ir::{BinOp, CompareOp, Expr, FunctionIR, Stmt, UnOp};

use super::manager::{Pass, PassContext};

/// Evaluates expressions whose leaves are all literals. Arithmetic wraps in
/// the declared width; signed comparisons against unsigned literals
/// sign-extend the literal first.
pub struct FoldConstants;

impl Pass for FoldConstants {
    fn name(&self) -> &'static str {
        "FoldConstants"
    }

    fn run(&self, func: &mut FunctionIR, _ctx: &PassContext) {
        for stmt in func.all_stmts_mut() {
            fold_stmt(stmt);
        }
    }
}

fn fold_stmt(stmt: &mut Stmt) {
    match stmt {
        Stmt::Assign { value, .. } => fold_expr(value),
        Stmt::Store { address, value, .. } => {
            fold_expr(address);
            fold_expr(value);
        }
        Stmt::IfGoto { cond, .. } => fold_expr(cond),
        Stmt::Call { args, .. } => args.iter_mut().for_each(fold_expr),
        Stmt::Return { value: Some(v) } => fold_expr(v),
        _ => {}
    }
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

pub fn fold_expr(expr: &mut Expr) {
    match expr {
        Expr::BinOp { op, left, right, bits } => {
            fold_expr(left);
            fold_expr(right);
            if let (Some(l), Some(r)) = (left.as_literal(), right.as_literal()) {
                let bits = *bits;
                let m = mask(bits);
                let shift_amount = (r as u32) % bits.max(1).min(64);
                let result: Option<u64> = match op {
                    BinOp::Add => Some(l.wrapping_add(r) & m),
                    BinOp::Sub => Some(l.wrapping_sub(r) & m),
                    BinOp::Mul => Some(l.wrapping_mul(r) & m),
                    BinOp::And => Some(l & r & m),
                    BinOp::Or => Some((l | r) & m),
                    BinOp::Xor => Some((l ^ r) & m),
                    BinOp::Shl => Some(if r as u32 >= bits { 0 } else { (l << shift_amount) & m }),
                    BinOp::Shr => Some(if r as u32 >= bits { 0 } else { (l & m) >> shift_amount }),
                    BinOp::Sar => {
                        if r as u32 >= bits {
                            let negative = sign_extend(l, bits) < 0;
                            Some(if negative { m } else { 0 })
                        } else {
                            Some(((sign_extend(l, bits) >> shift_amount) as u64) & m)
                        }
                    }
                    BinOp::UDiv if r != 0 => Some((l / r) & m),
                    BinOp::URem if r != 0 => Some((l % r) & m),
                    BinOp::SDiv if r != 0 => Some((sign_extend(l, bits).wrapping_div(sign_extend(r, bits)) as u64) & m),
                    BinOp::SRem if r != 0 => Some((sign_extend(l, bits).wrapping_rem(sign_extend(r, bits)) as u64) & m),
                    _ => None,
                };
                if let Some(value) = result {
                    *expr = Expr::const_u(value, bits);
                }
            }
        }
        Expr::UnOp { op, operand, bits } => {
            fold_expr(operand);
            if let Some(v) = operand.as_literal() {
                let bits = *bits;
                let m = mask(bits);
                let value = match op {
                    UnOp::Neg => (v.wrapping_neg()) & m,
                    UnOp::Not => (!v) & m,
                    UnOp::LNot => {
                        if v == 0 {
                            1
                        } else {
                            0
                        }
                    }
                };
                *expr = Expr::const_u(value, bits);
            }
        }
        Expr::Compare { op, left, right } => {
            fold_expr(left);
            fold_expr(right);
            if let (Some(l), Some(r)) = (left.as_literal(), right.as_literal()) {
                let bits = left.bits().max(right.bits()).max(1);
                let result = match op {
                    CompareOp::Eq => l == r,
                    CompareOp::Ne => l != r,
                    CompareOp::Ult => l < r,
                    CompareOp::Ule => l <= r,
                    CompareOp::Ugt => l > r,
                    CompareOp::Uge => l >= r,
                    CompareOp::Slt => sign_extend(l, bits) < sign_extend(r, bits),
                    CompareOp::Sle => sign_extend(l, bits) <= sign_extend(r, bits),
                    CompareOp::Sgt => sign_extend(l, bits) > sign_extend(r, bits),
                    CompareOp::Sge => sign_extend(l, bits) >= sign_extend(r, bits),
                };
                *expr = Expr::const_u(result as u64, 1);
            }
        }
        Expr::Cast { target, value } => {
            fold_expr(value);
            if let Some(v) = value.as_literal() {
                *expr = Expr::const_u(v & mask(target.bits()), target.bits());
            }
        }
        Expr::Load { address, .. } => fold_expr(address),
        Expr::AddrOf { operand } => fold_expr(operand),
        Expr::Ternary { cond, when_true, when_false } => {
            fold_expr(cond);
            fold_expr(when_true);
            fold_expr(when_false);
            if let Some(c) = cond.as_literal() {
                *expr = if c != 0 { (**when_true).clone() } else { (**when_false).clone() };
            }
        }
        Expr::Call { args, .. } | Expr::Intrinsic { args, .. } => args.iter_mut().for_each(fold_expr),
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn folds_add_of_two_literals() {
        let mut e = Expr::bin(BinOp::Add, Expr::const_u(2, 32), Expr::const_u(3, 32), 32);
        fold_expr(&mut e);
        assert_eq!(e, Expr::const_u(5, 32));
    }

    #[test]
    fn shift_count_at_or_above_width_yields_zero() {
        let mut e = Expr::bin(BinOp::Shl, Expr::const_u(1, 32), Expr::const_u(32, 32), 32);
        fold_expr(&mut e);
        assert_eq!(e, Expr::const_u(0, 32));
    }

    #[test]
    fn signed_less_than_sign_extends_high_bit_literal() {
        let mut e = Expr::compare(CompareOp::Slt, Expr::const_u(0x8000_0000, 32), Expr::const_u(0, 32));
        fold_expr(&mut e);
        assert_eq!(e, Expr::const_u(1, 1));
    }

    #[test]
    fn wraps_on_unsigned_overflow() {
        let mut e = Expr::bin(BinOp::Add, Expr::const_u(0xFFFF_FFFF, 32), Expr::const_u(1, 32), 32);
        fold_expr(&mut e);
        assert_eq!(e, Expr::const_u(0, 32));
    }
}
