use crate::ir::{BinOp, CallTarget, Expr, FunctionIR, IrType, LocalInfo, Stmt};

use super::manager::{Pass, PassContext};

/// Recognizes `memset((rsp + K), 0, N)` calls, introduces a `uint8_t*`
/// local `frame_0xK` initialized to `(uint8_t*)(rsp + K)`, and rewrites
/// every later memory reference that falls within `[K, K+N)` to address
/// off that local instead of `rsp` directly.
pub struct FrameObjectClusteringAndRspAlias;

struct FrameRegion {
    k: i64,
    len: i64,
    local_name: String,
}

impl Pass for FrameObjectClusteringAndRspAlias {
    fn name(&self) -> &'static str {
        "FrameObjectClusteringAndRspAlias"
    }

    fn run(&self, func: &mut FunctionIR, _ctx: &PassContext) {
        let mut regions = Vec::new();
        for block in &func.blocks {
            for stmt in &block.stmts {
                if let Stmt::Call { target: CallTarget::Symbol(name), args, .. } = stmt {
                    if name == "memset" {
                        if let (Some(k), Some(len)) = (rsp_offset_of(&args[0]), args.get(2).and_then(|a| a.as_literal())) {
                            regions.push(FrameRegion { k, len: len as i64, local_name: format!("frame_{:#x}", k) });
                        }
                    }
                }
            }
        }
        if regions.is_empty() {
            return;
        }

        for region in &regions {
            if !func.locals.iter().any(|l| l.name == region.local_name) {
                func.locals.push(LocalInfo {
                    name: region.local_name.clone(),
                    ty: IrType::pointer_to(IrType::u8()),
                    initializer: Some(Expr::cast(
                        IrType::pointer_to(IrType::u8()),
                        Expr::bin(BinOp::Add, Expr::reg("rsp"), Expr::const_i(region.k, 64), 64),
                    )),
                    frame_offset: Some(region.k),
                });
            }
        }

        for stmt in func.all_stmts_mut() {
            rewrite_stmt(stmt, &regions);
        }
    }
}

fn rsp_offset_of(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::BinOp { op: BinOp::Add, left, right, .. } => match (left.as_ref(), right.as_literal()) {
            (Expr::RegExpr { name }, Some(k)) if name == "rsp" => Some(k as i64),
            _ => None,
        },
        _ => None,
    }
}

fn rewrite_stmt(stmt: &mut Stmt, regions: &[FrameRegion]) {
    match stmt {
        Stmt::Assign { dest, value } => {
            rewrite_expr(dest, regions);
            rewrite_expr(value, regions);
        }
        Stmt::Store { address, value, .. } => {
            rewrite_expr(address, regions);
            rewrite_expr(value, regions);
        }
        Stmt::IfGoto { cond, .. } => rewrite_expr(cond, regions),
        Stmt::Call { args, .. } => args.iter_mut().for_each(|a| rewrite_expr(a, regions)),
        Stmt::Return { value: Some(v) } => rewrite_expr(v, regions),
        _ => {}
    }
}

fn rewrite_expr(expr: &mut Expr, regions: &[FrameRegion]) {
    if let Some(k) = rsp_offset_of(expr) {
        if let Some(region) = regions.iter().find(|r| k >= r.k && k < r.k + r.len) {
            let rel = k - region.k;
            *expr = if rel == 0 {
                Expr::local(region.local_name.clone())
            } else {
                Expr::bin(BinOp::Add, Expr::local(region.local_name.clone()), Expr::const_i(rel, 64), 64)
            };
            return;
        }
    }
    match expr {
        Expr::BinOp { left, right, .. } => {
            rewrite_expr(left, regions);
            rewrite_expr(right, regions);
        }
        Expr::UnOp { operand, .. } => rewrite_expr(operand, regions),
        Expr::Compare { left, right, .. } => {
            rewrite_expr(left, regions);
            rewrite_expr(right, regions);
        }
        Expr::Cast { value, .. } => rewrite_expr(value, regions),
        Expr::Load { address, .. } => rewrite_expr(address, regions),
        Expr::AddrOf { operand } => rewrite_expr(operand, regions),
        Expr::Ternary { cond, when_true, when_false } => {
            rewrite_expr(cond, regions);
            rewrite_expr(when_true, regions);
            rewrite_expr(when_false, regions);
        }
        Expr::Call { args, .. } | Expr::Intrinsic { args, .. } => args.iter_mut().for_each(|a| rewrite_expr(a, regions)),
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constdb::ConstantDatabase;
    use crate::ir::{BasicBlock, LabelSymbol};

    #[test]
    fn clusters_memset_into_a_named_frame_local() {
        let mut func = FunctionIR::new("f", 0);
        let mut block = BasicBlock::new(LabelSymbol::new("entry"));
        block.stmts.push(Stmt::Call {
            dest: None,
            target: CallTarget::Symbol("memset".to_string()),
            args: vec![
                Expr::bin(BinOp::Add, Expr::reg("rsp"), Expr::const_i(0x20, 64), 64),
                Expr::const_u(0, 8),
                Expr::const_i(64, 64),
            ],
        });
        block.stmts.push(Stmt::store(
            IrType::u8(),
            Expr::bin(BinOp::Add, Expr::reg("rsp"), Expr::const_i(0x28, 64), 64),
            Expr::const_u(1, 8),
            None,
        ));
        func.blocks.push(block);

        let db = ConstantDatabase::new();
        let ctx = PassContext { constant_provider: &db, return_enum_type_full_name: "E" };
        FrameObjectClusteringAndRspAlias.run(&mut func, &ctx);

        assert!(func.locals.iter().any(|l| l.name == "frame_0x20"));
        let rewritten = &func.blocks[0].stmts[1];
        if let Stmt::Store { address, .. } = rewritten {
            assert_eq!(*address, Expr::bin(BinOp::Add, Expr::local("frame_0x20"), Expr::const_i(8, 64), 64));
        } else {
            panic!("expected a store");
        }
    }
}
