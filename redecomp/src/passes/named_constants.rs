use crate::ir::{Expr, FunctionIR, Stmt};

use super::manager::{Pass, PassContext};

/// Replaces literal values assigned to `ret` (directly, or via `Return`)
/// with a `SymConst` when the configured return enum type recognizes the
/// value exactly — e.g. `ret = 0xC0000005` becomes
/// `ret = NTSTATUS.STATUS_ACCESS_VIOLATION`.
pub struct MapNamedReturnConstants;

impl Pass for MapNamedReturnConstants {
    fn name(&self) -> &'static str {
        "MapNamedReturnConstants"
    }

    fn run(&self, func: &mut FunctionIR, ctx: &PassContext) {
        for block in &mut func.blocks {
            for stmt in &mut block.stmts {
                match stmt {
                    Stmt::Assign { dest, value } if is_ret(dest) => map_in_place(value, ctx),
                    Stmt::Return { value: Some(v) } => map_in_place(v, ctx),
                    _ => {}
                }
            }
        }
    }
}

fn is_ret(e: &Expr) -> bool {
    matches!(e, Expr::RegExpr { name } if name == "ret")
}

fn map_in_place(expr: &mut Expr, ctx: &PassContext) {
    if let Some(value) = expr.as_literal() {
        let (found, formatted) = ctx.constant_provider.try_format_value(ctx.return_enum_type_full_name, value);
        if found {
            *expr = Expr::SymConst { name: formatted, value: value as i64 };
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constdb::loaders::{AssemblyEnumLoader, RawEnumDef};
    use crate::ir::{BasicBlock, LabelSymbol};

    #[test]
    fn maps_literal_return_value_to_symbolic_name() {
        let db = AssemblyEnumLoader::load(vec![RawEnumDef {
            full_name: "NTSTATUS".into(),
            underlying_bits: 32,
            is_flags: false,
            members: vec![("STATUS_ACCESS_VIOLATION".into(), 0xC000_0005)],
        }]);

        let mut func = FunctionIR::new("f", 0);
        let mut block = BasicBlock::new(LabelSymbol::new("entry"));
        block.stmts.push(Stmt::Return { value: Some(Expr::const_u(0xC000_0005, 32)) });
        func.blocks.push(block);

        let ctx = PassContext { constant_provider: &db, return_enum_type_full_name: "NTSTATUS" };
        MapNamedReturnConstants.run(&mut func, &ctx);

        match &func.blocks[0].stmts[0] {
            Stmt::Return { value: Some(Expr::SymConst { name, .. }) } => {
                assert_eq!(name, "NTSTATUS.STATUS_ACCESS_VIOLATION");
            }
            other => panic!("unexpected stmt: {:?}", other),
        }
    }
}
