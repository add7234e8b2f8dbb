use crate::cancel::CancellationToken;
use crate::constdb::ConstantDatabase;
use crate::error::{EngineError, Result};
use crate::ir::FunctionIR;

pub struct PassContext<'a> {
    pub constant_provider: &'a ConstantDatabase,
    pub return_enum_type_full_name: &'a str,
}

pub trait Pass {
    fn name(&self) -> &'static str;
    fn run(&self, func: &mut FunctionIR, ctx: &PassContext);
}

/// An ordered list of passes, applied to every function once each. No
/// dependency graph, no parallelism, no rollback — order is the only thing
/// that matters, and it is fixed by whoever builds the manager.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    pub fn new() -> PassManager {
        PassManager { passes: Vec::new() }
    }

    pub fn push(mut self, pass: Box<dyn Pass>) -> PassManager {
        self.passes.push(pass);
        self
    }

    pub fn run_all(&self, func: &mut FunctionIR, ctx: &PassContext, cancellation: Option<&CancellationToken>) -> Result<()> {
        for pass in &self.passes {
            if cancellation.is_some_and(|c| c.is_cancelled()) {
                return Err(EngineError::Cancelled);
            }
            log::trace!("running pass {} on {}", pass.name(), func.name);
            pass.run(func, ctx);
        }
        Ok(())
    }
}

impl Default for PassManager {
    fn default() -> PassManager {
        PassManager::new()
    }
}

/// The pipeline order from the spec: redundant-assign elimination,
/// arithmetic-identity simplification, constant folding, frame-object
/// clustering, bit-test pseudo cleanup, named-constant mapping, then
/// logical-not simplification.
pub fn default_pipeline() -> PassManager {
    PassManager::new()
        .push(Box::new(super::redundant_assign::SimplifyRedundantAssign))
        .push(Box::new(super::arithmetic_identities::SimplifyArithmeticIdentities))
        .push(Box::new(super::fold_constants::FoldConstants))
        .push(Box::new(super::frame_clustering::FrameObjectClusteringAndRspAlias))
        .push(Box::new(super::bit_test_cleanup::DropRedundantBitTestPseudo))
        .push(Box::new(super::named_constants::MapNamedReturnConstants))
        .push(Box::new(super::logical_not::SimplifyLogicalNots))
}
