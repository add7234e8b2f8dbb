mod arithmetic_identities;
mod bit_test_cleanup;
mod fold_constants;
mod frame_clustering;
mod logical_not;
mod manager;
mod named_constants;
mod redundant_assign;

pub use arithmetic_identities::SimplifyArithmeticIdentities;
pub use bit_test_cleanup::DropRedundantBitTestPseudo;
pub use fold_constants::FoldConstants;
pub use frame_clustering::FrameObjectClusteringAndRspAlias;
pub use logical_not::SimplifyLogicalNots;
pub use manager::{default_pipeline, Pass, PassContext, PassManager};
pub use named_constants::MapNamedReturnConstants;
pub use redundant_assign::SimplifyRedundantAssign;
