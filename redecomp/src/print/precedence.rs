use crate::ir::{BinOp, CompareOp, Expr};

/// C operator precedence, highest number binds tightest. Used to decide
/// whether a child expression needs parenthesizing around its parent.
pub fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Ternary { .. } => 2,
        Expr::BinOp { op: BinOp::Or, .. } => 4,
        Expr::BinOp { op: BinOp::Xor, .. } => 5,
        Expr::BinOp { op: BinOp::And, .. } => 6,
        Expr::Compare { op: CompareOp::Eq | CompareOp::Ne, .. } => 7,
        Expr::Compare { .. } => 8,
        Expr::BinOp { op: BinOp::Shl | BinOp::Shr | BinOp::Sar, .. } => 9,
        Expr::BinOp { op: BinOp::Add | BinOp::Sub, .. } => 10,
        Expr::BinOp { op: BinOp::Mul | BinOp::UDiv | BinOp::SDiv | BinOp::URem | BinOp::SRem, .. } => 11,
        Expr::UnOp { .. } | Expr::Cast { .. } | Expr::AddrOf { .. } => 12,
        _ => 14,
    }
}
