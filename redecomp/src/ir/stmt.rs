use super::expr::Expr;
use super::types::IrType;

/// A single statement inside a `BasicBlock`. Kept flat and linear; control
/// flow within a function is expressed entirely through `IfGoto`/`Goto`
/// against `LabelStmt`s, never nested here — the structuring passes build
/// `HiNode` trees out of this later, they don't replace it.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        dest: Expr,
        value: Expr,
    },
    Store {
        elem: IrType,
        address: Expr,
        value: Expr,
        segment: Option<super::expr::Segment>,
    },
    Call {
        dest: Option<Expr>,
        target: super::expr::CallTarget,
        args: Vec<Expr>,
    },
    IfGoto {
        cond: Expr,
        label: String,
    },
    Goto {
        label: String,
    },
    Label {
        name: String,
    },
    Return {
        value: Option<Expr>,
    },
    /// Preserves the disassembled mnemonic for an instruction the lifter
    /// chose not to (or could not) translate into a semantic form, so the
    /// printer can still show something.
    AsmComment {
        text: String,
    },
    /// A recognized idiom (REP STOS/MOVS, zeroing stores, etc.) that
    /// collapses several machine instructions into one marker statement;
    /// passes match on `kind` to clean these up once their job is done.
    Pseudo {
        kind: String,
        args: Vec<Expr>,
    },
    Nop,
}

impl Stmt {
    pub fn assign(dest: Expr, value: Expr) -> Stmt {
        Stmt::Assign { dest, value }
    }

    pub fn store(elem: IrType, address: Expr, value: Expr, segment: Option<super::expr::Segment>) -> Stmt {
        Stmt::Store { elem, address, value, segment }
    }

    pub fn label(name: impl Into<String>) -> Stmt {
        Stmt::Label { name: name.into() }
    }

    pub fn goto(label: impl Into<String>) -> Stmt {
        Stmt::Goto { label: label.into() }
    }

    pub fn if_goto(cond: Expr, label: impl Into<String>) -> Stmt {
        Stmt::IfGoto { cond, label: label.into() }
    }

    /// `true` for statements a structuring/cleanup pass may drop outright
    /// without changing observable behavior (a `Nop`, or an already-consumed
    /// `Pseudo`).
    pub fn is_droppable_nop(&self) -> bool {
        matches!(self, Stmt::Nop)
    }
}
