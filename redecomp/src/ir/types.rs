/// Target-independent type used throughout the IR. Types are value-like:
/// freely cloned and compared, never carrying identity.
#[derive(Debug, Clone, PartialEq)]
pub enum IrType {
    Void,
    Int { bits: u32, signed: bool },
    Float { bits: u32 },
    Pointer { element: Box<IrType> },
    Vector { bits: u32 },
    Unknown { note: Option<String> },
}

impl IrType {
    pub fn u8() -> IrType {
        IrType::Int { bits: 8, signed: false }
    }
    pub fn u16() -> IrType {
        IrType::Int { bits: 16, signed: false }
    }
    pub fn u32() -> IrType {
        IrType::Int { bits: 32, signed: false }
    }
    pub fn u64() -> IrType {
        IrType::Int { bits: 64, signed: false }
    }
    pub fn i32() -> IrType {
        IrType::Int { bits: 32, signed: true }
    }
    pub fn i64() -> IrType {
        IrType::Int { bits: 64, signed: true }
    }

    /// The default integer width when the decoder gives us no better
    /// information: 64-bit unsigned, per the spec.
    pub fn default_int() -> IrType {
        IrType::u64()
    }

    pub fn pointer_to(element: IrType) -> IrType {
        IrType::Pointer { element: Box::new(element) }
    }

    pub fn bits(&self) -> u32 {
        match self {
            IrType::Void => 0,
            IrType::Int { bits, .. } => *bits,
            IrType::Float { bits } => *bits,
            IrType::Pointer { .. } => 64,
            IrType::Vector { bits } => *bits,
            IrType::Unknown { .. } => IrType::default_int().bits(),
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, IrType::Int { signed: true, .. })
    }

    /// C-ish spelling used by the pretty-printer. `use_stdint` selects
    /// `uintNN_t`/`intNN_t` over `unsigned int`/`int` style names.
    pub fn c_name(&self, use_stdint: bool) -> String {
        match self {
            IrType::Void => "void".to_string(),
            IrType::Int { bits, signed } => {
                if use_stdint {
                    format!("{}int{}_t", if *signed { "" } else { "u" }, bits)
                } else {
                    match (bits, signed) {
                        (8, true) => "signed char".to_string(),
                        (8, false) => "unsigned char".to_string(),
                        (16, true) => "short".to_string(),
                        (16, false) => "unsigned short".to_string(),
                        (32, true) => "int".to_string(),
                        (32, false) => "unsigned int".to_string(),
                        (64, true) => "long long".to_string(),
                        (64, false) => "unsigned long long".to_string(),
                        (bits, signed) => format!("{}int{}_t", if *signed { "" } else { "u" }, bits),
                    }
                }
            }
            IrType::Float { bits: 32 } => "float".to_string(),
            IrType::Float { bits } => {
                let _ = bits;
                "double".to_string()
            }
            IrType::Pointer { element } => format!("{}*", element.c_name(use_stdint)),
            IrType::Vector { bits: 128 } => "__m128i".to_string(),
            IrType::Vector { bits: 256 } => "__m256i".to_string(),
            IrType::Vector { bits } => format!("__m{}i", bits),
            IrType::Unknown { note } => note.clone().unwrap_or_else(|| "void*".to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_int_is_64_bit_unsigned() {
        let t = IrType::default_int();
        assert_eq!(t.bits(), 64);
        assert!(!t.is_signed());
    }

    #[test]
    fn stdint_names_round_trip_common_widths() {
        assert_eq!(IrType::u32().c_name(true), "uint32_t");
        assert_eq!(IrType::i64().c_name(true), "int64_t");
        assert_eq!(IrType::u32().c_name(false), "unsigned int");
    }
}
