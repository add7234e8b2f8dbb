//! The target-independent IR lifted x86-64 functions are translated into:
//! typed values (`types`), expressions and statements (`expr`, `stmt`),
//! the optional structured-control-flow tree (`hi`), and the function-level
//! container that ties them together (`function`).

pub mod expr;
pub mod function;
pub mod hi;
pub mod stmt;
pub mod types;

pub use expr::{BinOp, CallTarget, CompareOp, Expr, Segment, UnOp};
pub use function::{BasicBlock, FunctionIR, LabelSymbol, LocalInfo, ParamInfo, TagValue};
pub use hi::HiNode;
pub use stmt::Stmt;
pub use types::IrType;
