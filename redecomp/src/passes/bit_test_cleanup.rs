use std::collections::HashSet;

use crate::ir::{Expr, FunctionIR, Stmt};

use super::manager::{Pass, PassContext};

/// Drops `Pseudo{"bittest", ...}` markers left behind by `bt`/`bts`/`btr`/
/// `btc` once the `jb`/`jae` that consumed them has already been translated
/// to a `Compare`/`LNot` expression and no longer references the marker.
pub struct DropRedundantBitTestPseudo;

impl Pass for DropRedundantBitTestPseudo {
    fn name(&self) -> &'static str {
        "DropRedundantBitTestPseudo"
    }

    fn run(&self, func: &mut FunctionIR, _ctx: &PassContext) {
        let referenced = referenced_bit_markers(func);
        for block in &mut func.blocks {
            for stmt in &mut block.stmts {
                if let Stmt::Pseudo { kind, args } = stmt {
                    if kind == "bittest" && !is_still_referenced(args, &referenced) {
                        *stmt = Stmt::Nop;
                    }
                }
            }
            block.stmts.retain(|s| !s.is_droppable_nop());
        }
    }
}

fn is_still_referenced(args: &[Expr], referenced: &HashSet<String>) -> bool {
    args.iter().any(|a| expr_intrinsic_name(a).map(|n| referenced.contains(n)).unwrap_or(false))
}

fn expr_intrinsic_name(e: &Expr) -> Option<&str> {
    match e {
        Expr::Intrinsic { name, .. } if name == "bit" => Some(name.as_str()),
        _ => None,
    }
}

/// Collects every `Intrinsic{name:"bit",...}` expression that still appears
/// somewhere outside a `Pseudo("bittest", ...)` marker itself — i.e. one
/// that a `Compare`/`IfGoto` still consumes.
fn referenced_bit_markers(func: &FunctionIR) -> HashSet<String> {
    let mut found = HashSet::new();
    for stmt in func.all_stmts() {
        match stmt {
            Stmt::Pseudo { kind, .. } if kind == "bittest" => continue,
            Stmt::IfGoto { cond, .. } => collect(cond, &mut found),
            Stmt::Assign { value, .. } => collect(value, &mut found),
            Stmt::Store { value, .. } => collect(value, &mut found),
            Stmt::Return { value: Some(v) } => collect(v, &mut found),
            Stmt::Call { args, .. } => args.iter().for_each(|a| collect(a, &mut found)),
            _ => {}
        }
    }
    found
}

fn collect(e: &Expr, found: &mut HashSet<String>) {
    match e {
        Expr::Intrinsic { name, .. } if name == "bit" => {
            found.insert(name.clone());
        }
        Expr::BinOp { left, right, .. } => {
            collect(left, found);
            collect(right, found);
        }
        Expr::UnOp { operand, .. } => collect(operand, found),
        Expr::Compare { left, right, .. } => {
            collect(left, found);
            collect(right, found);
        }
        Expr::Cast { value, .. } => collect(value, found),
        Expr::Ternary { cond, when_true, when_false } => {
            collect(cond, found);
            collect(when_true, found);
            collect(when_false, found);
        }
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constdb::ConstantDatabase;
    use crate::ir::{BasicBlock, CompareOp, LabelSymbol};

    #[test]
    fn drops_unreferenced_bittest_marker() {
        let mut func = FunctionIR::new("f", 0);
        let mut block = BasicBlock::new(LabelSymbol::new("entry"));
        block.stmts.push(Stmt::Pseudo {
            kind: "bittest".to_string(),
            args: vec![Expr::Intrinsic { name: "bit".to_string(), args: vec![Expr::reg("rax"), Expr::const_u(3, 32)] }],
        });
        block.stmts.push(Stmt::if_goto(
            Expr::compare(CompareOp::Eq, Expr::reg("rax"), Expr::const_u(0, 64)),
            "L1",
        ));
        func.blocks.push(block);

        let db = ConstantDatabase::new();
        let ctx = PassContext { constant_provider: &db, return_enum_type_full_name: "E" };
        DropRedundantBitTestPseudo.run(&mut func, &ctx);

        assert_eq!(func.blocks[0].stmts.len(), 1);
        assert!(matches!(func.blocks[0].stmts[0], Stmt::IfGoto { .. }));
    }
}
