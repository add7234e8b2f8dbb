use crate::ir::{FunctionIR, Stmt};

use super::manager::{Pass, PassContext};

/// Removes `x = x` statements left behind by earlier width-normalization.
pub struct SimplifyRedundantAssign;

impl Pass for SimplifyRedundantAssign {
    fn name(&self) -> &'static str {
        "SimplifyRedundantAssign"
    }

    fn run(&self, func: &mut FunctionIR, _ctx: &PassContext) {
        for block in &mut func.blocks {
            for stmt in &mut block.stmts {
                if let Stmt::Assign { dest, value } = stmt {
                    if dest == value {
                        *stmt = Stmt::Nop;
                    }
                }
            }
            block.stmts.retain(|s| !s.is_droppable_nop());
        }
    }
}
