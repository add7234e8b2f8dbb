use std::sync::Arc;

use crate::constdb::ConstantDatabase;

/// Parameters controlling how a `FunctionIR` is rendered. Independent of
/// `lift::Options` — a caller may re-print the same lifted function under
/// different presentation settings without re-lifting.
#[derive(Clone)]
pub struct PrintOptions {
    pub emit_header_comment: bool,
    pub emit_block_labels: bool,
    pub comment_signedness_on_cmp: bool,
    pub use_stdint_names: bool,
    pub indent: String,
    pub constant_provider: Arc<ConstantDatabase>,
}

impl PrintOptions {
    pub fn new(constant_provider: Arc<ConstantDatabase>) -> PrintOptions {
        PrintOptions {
            emit_header_comment: true,
            emit_block_labels: true,
            comment_signedness_on_cmp: true,
            use_stdint_names: true,
            indent: "    ".to_string(),
            constant_provider,
        }
    }
}
