use std::collections::BTreeMap;

/// One loaded enum type: its members by value, and (once finalized) the
/// flag-decomposition table used for composing unmatched values.
#[derive(Debug, Clone)]
pub struct EnumDesc {
    pub full_name: String,
    pub underlying_bits: u32,
    pub declared_flags: bool,
    pub looks_like_flags: bool,
    /// First-sight-wins: duplicate values keep the name seen first.
    pub value_to_name: BTreeMap<u64, String>,
    /// `(mask, name)`, sorted by mask descending; populated only for
    /// flag-like enums.
    pub flag_parts: Vec<(u64, String)>,
}

impl EnumDesc {
    pub fn new(full_name: impl Into<String>, underlying_bits: u32, declared_flags: bool) -> EnumDesc {
        EnumDesc {
            full_name: full_name.into(),
            underlying_bits,
            declared_flags,
            looks_like_flags: false,
            value_to_name: BTreeMap::new(),
            flag_parts: Vec::new(),
        }
    }

    /// First-sight-wins insert, per the invariant in the constant database
    /// section: later duplicate values never overwrite an earlier name.
    pub fn add_member(&mut self, name: impl Into<String>, value: u64) {
        self.value_to_name.entry(value).or_insert_with(|| name.into());
    }

    pub fn total_members(&self) -> usize {
        self.value_to_name.len()
    }

    /// Computed once, after every member is loaded: flags-like when either
    /// explicitly declared or at least half the members are a single set
    /// bit. `flag_parts` is then derived and frozen.
    pub fn finalize(&mut self) {
        let single_bit_count = self
            .value_to_name
            .keys()
            .filter(|v| **v != 0 && (*v & (*v - 1)) == 0)
            .count();
        let threshold = (self.total_members() / 2).max(1);
        self.looks_like_flags = self.declared_flags || single_bit_count >= threshold;

        if self.looks_like_flags {
            let mut parts: Vec<(u64, String)> = self
                .value_to_name
                .iter()
                .filter(|(v, _)| **v != 0 && (*v & (*v - 1)) == 0)
                .map(|(v, n)| (*v, n.clone()))
                .collect();
            parts.sort_by(|a, b| b.0.cmp(&a.0));
            self.flag_parts = parts;
        } else {
            self.flag_parts.clear();
        }
    }

    /// Exact match, or (for flag-like enums) a greedy composition of the
    /// largest-first flag masks that exactly accounts for `value`.
    pub fn try_format_value(&self, value: u64) -> (bool, String) {
        if let Some(name) = self.value_to_name.get(&value) {
            return (true, format!("{}.{}", self.full_name, name));
        }
        if self.looks_like_flags && value != 0 {
            let mut residual = value;
            let mut parts = Vec::new();
            for (mask, name) in &self.flag_parts {
                if *mask != 0 && residual & mask == *mask {
                    parts.push(name.clone());
                    residual &= !mask;
                }
            }
            if residual == 0 && !parts.is_empty() {
                let joined = parts
                    .iter()
                    .map(|p| format!("{}.{}", self.full_name, p))
                    .collect::<Vec<_>>()
                    .join(" | ");
                return (true, joined);
            }
        }
        (false, format!("{:#x}", value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantMatch {
    pub enum_full_name: String,
    pub formatted: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flag_composition_greedily_subtracts_descending_masks() {
        let mut e = EnumDesc::new("E", 32, true);
        e.add_member("A", 1);
        e.add_member("B", 2);
        e.add_member("C", 4);
        e.finalize();
        assert_eq!(e.try_format_value(7), (true, "E.A | E.B | E.C".to_string()));
    }

    #[test]
    fn first_sight_wins_on_duplicate_values() {
        let mut e = EnumDesc::new("E", 32, false);
        e.add_member("First", 1);
        e.add_member("Second", 1);
        assert_eq!(e.value_to_name.get(&1).unwrap(), "First");
    }

    #[test]
    fn unmatched_residual_falls_back_to_hex_with_found_false() {
        let mut e = EnumDesc::new("E", 32, true);
        e.add_member("A", 1);
        e.finalize();
        assert_eq!(e.try_format_value(5), (false, "0x5".to_string()));
    }

    #[test]
    fn looks_like_flags_by_majority_single_bit_members_without_declared_flag() {
        let mut e = EnumDesc::new("E", 32, false);
        e.add_member("A", 1);
        e.add_member("B", 2);
        e.add_member("Weird", 3);
        e.finalize();
        assert!(e.looks_like_flags);
    }
}
