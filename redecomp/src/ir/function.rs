use std::collections::BTreeMap;

use super::hi::HiNode;
use super::stmt::Stmt;
use super::types::IrType;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LabelSymbol(pub String);

impl LabelSymbol {
    pub fn new(name: impl Into<String>) -> LabelSymbol {
        LabelSymbol(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: LabelSymbol,
    pub stmts: Vec<Stmt>,
}

impl BasicBlock {
    pub fn new(label: LabelSymbol) -> BasicBlock {
        BasicBlock { label, stmts: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub index: u32,
    pub name: String,
    pub ty: IrType,
    /// The physical register this parameter arrived in (`p1`..`p4`,
    /// `fp1`..`fp4`), before any later pass renames it to something
    /// meaningful.
    pub source_reg: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalInfo {
    pub name: String,
    pub ty: IrType,
    pub initializer: Option<super::expr::Expr>,
    /// Stack-frame offset this local was clustered from, if any; locals
    /// synthesized for a purely register-resident value have none.
    pub frame_offset: Option<i64>,
}

/// Closed sum of values a tag can hold. Kept closed (no `Any`) so printing
/// and serialization never have to guess a tag's shape.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// A single lifted function: its parameters, locals, basic blocks (in
/// discovery order), and an optional structured form once a structuring pass
/// has run. `tags` carries cross-cutting side information passes attach and
/// read back (e.g. `"has_prologue"`, `"return_type_hint"`) without widening
/// this struct for every such concern.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionIR {
    pub name: String,
    pub entry_rva: u32,
    pub params: Vec<ParamInfo>,
    pub locals: Vec<LocalInfo>,
    pub return_type: IrType,
    pub blocks: Vec<BasicBlock>,
    pub structured: Option<HiNode>,
    pub tags: BTreeMap<String, TagValue>,
}

impl FunctionIR {
    pub fn new(name: impl Into<String>, entry_rva: u32) -> FunctionIR {
        FunctionIR {
            name: name.into(),
            entry_rva,
            params: Vec::new(),
            locals: Vec::new(),
            return_type: IrType::default_int(),
            blocks: Vec::new(),
            structured: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn block_mut(&mut self, label: &LabelSymbol) -> Option<&mut BasicBlock> {
        self.blocks.iter_mut().find(|b| &b.label == label)
    }

    pub fn tag_bool(&self, key: &str) -> bool {
        matches!(self.tags.get(key), Some(TagValue::Bool(true)))
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: TagValue) {
        self.tags.insert(key.into(), value);
    }

    /// All statements across all blocks, in block order; used by passes that
    /// operate over the whole function without caring about block
    /// boundaries (constant folding, arithmetic-identity simplification).
    pub fn all_stmts(&self) -> impl Iterator<Item = &Stmt> {
        self.blocks.iter().flat_map(|b| b.stmts.iter())
    }

    pub fn all_stmts_mut(&mut self) -> impl Iterator<Item = &mut Stmt> {
        self.blocks.iter_mut().flat_map(|b| b.stmts.iter_mut())
    }
}
