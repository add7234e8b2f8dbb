use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::constdb::ConstantDatabase;

/// A host-supplied hook mapping an IAT slot address to the symbol it holds,
/// e.g. `kernel32!CreateFileW`. Returns `None` for slots the host doesn't
/// recognize, in which case the call prints as an indirect call on the
/// computed address.
pub trait ImportResolver {
    fn resolve_import_name(&self, iat_address: u64) -> Option<String>;
}

impl ImportResolver for () {
    fn resolve_import_name(&self, _iat_address: u64) -> Option<String> {
        None
    }
}

/// Parameters controlling one lifting job. `base_address` is the assumed
/// load address used for RIP-relative and branch-target arithmetic — it
/// need not match the file's declared image base, since the caller may be
/// lifting code intended for relocation to a different address.
#[derive(Clone)]
pub struct Options {
    pub base_address: u64,
    pub function_name: String,
    pub max_bytes: usize,
    pub emit_labels: bool,
    pub detect_prologue: bool,
    pub comment_compare: bool,
    pub constant_provider: Arc<ConstantDatabase>,
    pub return_enum_type_full_name: String,
    pub resolve_import_name: Option<Arc<dyn ImportResolver>>,
    pub cancellation: Option<CancellationToken>,
}

impl Options {
    pub fn new(base_address: u64, function_name: impl Into<String>, constant_provider: Arc<ConstantDatabase>) -> Options {
        Options {
            base_address,
            function_name: function_name.into(),
            max_bytes: 4096,
            emit_labels: true,
            detect_prologue: true,
            comment_compare: true,
            constant_provider,
            return_enum_type_full_name: "Windows.Win32.Foundation.NTSTATUS".to_string(),
            resolve_import_name: None,
            cancellation: None,
        }
    }
}
