use std::collections::BTreeMap;

use super::desc::{ConstantMatch, EnumDesc};

/// All loaded enums plus the cross-cutting indices the printer and the
/// named-constant pass query: a value index for `findByValue`, the flag
/// enums used to synthesize compositions, and call-argument hints mapping
/// `(callee, argIndex)` to the enum type expected there.
pub struct ConstantDatabase {
    enums: Vec<EnumDesc>,
    value_index: BTreeMap<u64, Vec<ConstantMatch>>,
    call_arg_enums: BTreeMap<String, BTreeMap<u32, String>>,
}

impl ConstantDatabase {
    pub fn new() -> ConstantDatabase {
        let mut db = ConstantDatabase {
            enums: Vec::new(),
            value_index: BTreeMap::new(),
            call_arg_enums: BTreeMap::new(),
        };
        db.populate_builtin_arg_hints();
        db
    }

    pub fn add_enum(&mut self, desc: EnumDesc) {
        self.enums.push(desc);
    }

    /// Recomputes `looksLikeFlags`/`flagParts` for every loaded enum and
    /// rebuilds the value index. Call after all loaders have contributed.
    pub fn finalize(&mut self) {
        for e in &mut self.enums {
            e.finalize();
        }
        self.value_index.clear();
        for e in &self.enums {
            for (value, name) in &e.value_to_name {
                self.value_index.entry(*value).or_default().push(ConstantMatch {
                    enum_full_name: e.full_name.clone(),
                    formatted: format!("{}.{}", e.full_name, name),
                });
            }
        }
    }

    /// Absorbs another database's enums and call-argument hints, then
    /// re-finalizes. Used to combine an assembly-sourced database with a
    /// winmd-sourced one.
    pub fn merge(&mut self, other: ConstantDatabase) {
        self.enums.extend(other.enums);
        for (callee, args) in other.call_arg_enums {
            let entry = self.call_arg_enums.entry(callee).or_default();
            for (arg_index, enum_name) in args {
                entry.entry(arg_index).or_insert(enum_name);
            }
        }
        self.finalize();
    }

    pub fn enum_by_name(&self, full_name: &str) -> Option<&EnumDesc> {
        self.enums.iter().find(|e| e.full_name == full_name)
    }

    pub fn try_format_value(&self, enum_full_name: &str, value: u64) -> (bool, String) {
        match self.enum_by_name(enum_full_name) {
            Some(e) => e.try_format_value(value),
            None => (false, format!("{:#x}", value)),
        }
    }

    /// Exact matches from the global value index, plus flag compositions
    /// synthesized from every flag enum whose underlying width fits within
    /// `bit_width`. Deduplicated by `(enum, formatted)`.
    pub fn find_by_value(&self, value: u64, bit_width: u32) -> Vec<ConstantMatch> {
        let mut out = self.value_index.get(&value).cloned().unwrap_or_default();
        for e in self.enums.iter().filter(|e| e.looks_like_flags && e.underlying_bits <= bit_width) {
            let (found, formatted) = e.try_format_value(value);
            if found {
                let m = ConstantMatch { enum_full_name: e.full_name.clone(), formatted };
                if !out.contains(&m) {
                    out.push(m);
                }
            }
        }
        out.dedup();
        out
    }

    /// Strips a `module!` prefix (as `kernel32!CreateFileW`) before lookup.
    pub fn try_get_arg_expected_enum_type(&self, callee_symbol: &str, arg_index: u32) -> Option<String> {
        let bare = callee_symbol.split_once('!').map(|(_, sym)| sym).unwrap_or(callee_symbol);
        let key = bare.to_ascii_lowercase();
        let enum_name = self.call_arg_enums.get(&key)?.get(&arg_index)?;
        if self.enum_by_name(enum_name).is_some() {
            Some(enum_name.clone())
        } else {
            None
        }
    }

    pub fn map_arg_enum(&mut self, callee_name: &str, arg_index: u32, enum_full_name: impl Into<String>) {
        self.call_arg_enums
            .entry(callee_name.to_ascii_lowercase())
            .or_default()
            .insert(arg_index, enum_full_name.into());
    }

    /// A handful of common Win32 APIs whose argument/enum pairing is
    /// well-known and worth shipping by default; hosts can add more with
    /// `map_arg_enum`.
    fn populate_builtin_arg_hints(&mut self) {
        self.map_arg_enum("VirtualAlloc", 2, "Windows.Win32.System.Memory.VIRTUAL_ALLOCATION_TYPE");
        self.map_arg_enum("VirtualAlloc", 3, "Windows.Win32.System.Memory.PAGE_PROTECTION_FLAGS");
        self.map_arg_enum("VirtualProtect", 2, "Windows.Win32.System.Memory.PAGE_PROTECTION_FLAGS");
        self.map_arg_enum("CreateFileW", 1, "Windows.Win32.Storage.FileSystem.FILE_ACCESS_RIGHTS");
        self.map_arg_enum("CreateFileW", 5, "Windows.Win32.Storage.FileSystem.FILE_CREATION_DISPOSITION");
        self.map_arg_enum("CreateFileA", 1, "Windows.Win32.Storage.FileSystem.FILE_ACCESS_RIGHTS");
    }
}

impl Default for ConstantDatabase {
    fn default() -> ConstantDatabase {
        ConstantDatabase::new()
    }
}
