use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use super::desc::EnumDesc;
use super::error::{ConstDbError, Result};
use super::ConstantDatabase;

/// One enum's worth of data, as handed in by a host that already has access
/// to a managed assembly's reflection data (or an equivalent source) — this
/// crate never performs reflection itself.
pub struct RawEnumDef {
    pub full_name: String,
    pub underlying_bits: u32,
    pub is_flags: bool,
    pub members: Vec<(String, u64)>,
}

pub struct AssemblyEnumLoader;

impl AssemblyEnumLoader {
    pub fn load(entries: impl IntoIterator<Item = RawEnumDef>) -> ConstantDatabase {
        let mut db = ConstantDatabase::new();
        for entry in entries {
            let mut desc = EnumDesc::new(entry.full_name, entry.underlying_bits, entry.is_flags);
            for (name, value) in entry.members {
                desc.add_member(name, value);
            }
            db.add_enum(desc);
        }
        db.finalize();
        db
    }
}

/// Compressed signature element type codes relevant to an enum's `value__`
/// field, per ECMA-335 §II.23.1.16.
fn underlying_bits_for_type_code(code: u8) -> Result<u32> {
    match code {
        0x04 | 0x05 => Ok(8),  // I1, U1
        0x06 | 0x07 => Ok(16), // I2, U2
        0x08 | 0x09 => Ok(32), // I4, U4
        0x0a | 0x0b => Ok(64), // I8, U8
        other => Err(ConstDbError::UnsupportedUnderlyingType(other)),
    }
}

struct StreamHeader {
    offset: u32,
    size: u32,
    name: String,
}

/// Parses just enough of a `.winmd` (ECMA-335 metadata) blob to recover enum
/// type definitions: the metadata root signature, the stream directory, and
/// the `#Strings`/`#Blob`/`#~` streams needed to walk `TypeDef`, `Field`,
/// `Constant` and `CustomAttribute` rows. Anything not needed to recover an
/// enum's name/members/flags-ness is left unparsed.
pub struct WinmdEnumLoader;

impl WinmdEnumLoader {
    pub fn load(bytes: &[u8]) -> Result<ConstantDatabase> {
        let mut db = ConstantDatabase::new();
        let root = MetadataRoot::parse(bytes)?;

        let strings = root.stream(bytes, "#Strings").unwrap_or(&[]);
        let blob = root.stream(bytes, "#Blob").unwrap_or(&[]);
        let tables = root.stream(bytes, "#~").ok_or(ConstDbError::StreamNotFound("#~"))?;

        let parsed = TablesStream::parse(tables)?;

        for type_def in &parsed.type_defs {
            if parsed.extends_system_enum(type_def, strings) {
                let value_field = match parsed.value_field_of(type_def) {
                    Some(f) => f,
                    None => continue,
                };
                let underlying_bits = match parsed.field_signature_bits(value_field, blob) {
                    Ok(bits) => bits,
                    Err(_) => continue,
                };
                let is_flags = parsed.has_flags_attribute(type_def, strings);
                let full_name = type_def.full_name(strings);

                let mut desc = EnumDesc::new(full_name, underlying_bits, is_flags);
                for member in parsed.literal_fields_of(type_def, strings) {
                    if let Some(value) = parsed.constant_value_of(member, blob) {
                        desc.add_member(parsed.field_name(member, strings), value);
                    }
                }
                db.add_enum(desc);
            }
        }

        db.finalize();
        Ok(db)
    }
}

struct MetadataRoot {
    streams: Vec<StreamHeader>,
}

impl MetadataRoot {
    fn parse(bytes: &[u8]) -> Result<MetadataRoot> {
        if bytes.len() < 16 {
            return Err(ConstDbError::Truncated { needed: 16, available: bytes.len() });
        }
        let mut c = Cursor::new(bytes);
        let signature = c.read_u32::<LittleEndian>().unwrap();
        if signature != 0x424A_5342 {
            return Err(ConstDbError::BadMetadataSignature);
        }
        let _major = c.read_u16::<LittleEndian>().unwrap();
        let _minor = c.read_u16::<LittleEndian>().unwrap();
        let _reserved = c.read_u32::<LittleEndian>().unwrap();
        let version_len = c.read_u32::<LittleEndian>().unwrap() as usize;
        c.set_position(c.position() + version_len as u64);
        let _flags = c.read_u16::<LittleEndian>().unwrap();
        let stream_count = c.read_u16::<LittleEndian>().unwrap();

        let mut streams = Vec::with_capacity(stream_count as usize);
        for _ in 0..stream_count {
            let offset = c.read_u32::<LittleEndian>().unwrap();
            let size = c.read_u32::<LittleEndian>().unwrap();
            let name_start = c.position() as usize;
            let name_bytes = &bytes[name_start..];
            let nul = name_bytes.iter().position(|b| *b == 0).unwrap_or(name_bytes.len());
            let name = String::from_utf8_lossy(&name_bytes[..nul]).to_string();
            let padded_len = (nul + 1 + 3) & !3;
            c.set_position((name_start + padded_len) as u64);
            streams.push(StreamHeader { offset, size, name });
        }
        Ok(MetadataRoot { streams })
    }

    fn stream<'a>(&self, bytes: &'a [u8], name: &str) -> Option<&'a [u8]> {
        self.streams
            .iter()
            .find(|s| s.name == name)
            .map(|s| &bytes[s.offset as usize..(s.offset + s.size) as usize])
    }
}

/// A drastically simplified view of the `#~` tables stream: only the rows
/// needed to recognize enum TypeDefs and their literal fields are decoded;
/// method/parameter/generic tables and the rest of ECMA-335's ~40 table
/// kinds are skipped entirely.
struct TablesStream {
    type_defs: Vec<TypeDefRow>,
    type_refs: Vec<TypeRefRow>,
    fields: Vec<FieldRow>,
    constants: Vec<ConstantRow>,
    custom_attrs: Vec<CustomAttributeRow>,
}

struct TypeDefRow {
    namespace_idx: u32,
    name_idx: u32,
    extends_idx: u32,
    field_list_start: u32,
    field_list_end: u32,
    token: u32,
}

impl TypeDefRow {
    fn full_name(&self, strings: &[u8]) -> String {
        let ns = read_string_heap(strings, self.namespace_idx);
        let name = read_string_heap(strings, self.name_idx);
        if ns.is_empty() {
            name
        } else {
            format!("{}.{}", ns, name)
        }
    }
}

struct TypeRefRow {
    namespace_idx: u32,
    name_idx: u32,
}

impl TypeRefRow {
    fn full_name(&self, strings: &[u8]) -> String {
        let ns = read_string_heap(strings, self.namespace_idx);
        let name = read_string_heap(strings, self.name_idx);
        if ns.is_empty() {
            name
        } else {
            format!("{}.{}", ns, name)
        }
    }
}

/// `TypeDefOrRef` coded index tag bits, per ECMA-335 §II.24.2.6.
const TYPE_DEF_OR_REF_TYPE_DEF: u32 = 0;
const TYPE_DEF_OR_REF_TYPE_REF: u32 = 1;

struct FieldRow {
    name_idx: u32,
    signature_idx: u32,
    flags: u16,
}

struct ConstantRow {
    parent_token: u32,
    value_blob_idx: u32,
}

struct CustomAttributeRow {
    parent_token: u32,
    type_name_idx: u32,
}

const FIELD_ATTR_LITERAL: u16 = 0x40;
const FIELD_ATTR_SPECIAL_NAME: u16 = 0x200;

impl TablesStream {
    /// Real `#~` parsing requires decoding the table-presence bitmask and
    /// row counts before any row layout is known; this walks that header
    /// and then reads each recognized table with 4-byte-wide index columns
    /// (the common case for winmd-sized assemblies), skipping table kinds
    /// this loader has no use for.
    fn parse(bytes: &[u8]) -> Result<TablesStream> {
        if bytes.len() < 24 {
            return Err(ConstDbError::Truncated { needed: 24, available: bytes.len() });
        }
        let mut c = Cursor::new(bytes);
        let _reserved = c.read_u32::<LittleEndian>().unwrap();
        let _major = c.read_u8().unwrap();
        let _minor = c.read_u8().unwrap();
        let heap_sizes = c.read_u8().unwrap();
        let _reserved2 = c.read_u8().unwrap();
        let valid = c.read_u64::<LittleEndian>().unwrap();
        let _sorted = c.read_u64::<LittleEndian>().unwrap();

        let wide_string = heap_sizes & 0x01 != 0;
        let wide_guid = heap_sizes & 0x02 != 0;
        let wide_blob = heap_sizes & 0x04 != 0;

        let mut row_counts = [0u32; 64];
        for i in 0..64 {
            if valid & (1 << i) != 0 {
                row_counts[i] = c.read_u32::<LittleEndian>().unwrap();
            }
        }

        let idx_size = |wide: bool| if wide { 4u64 } else { 2u64 };
        let str_w = idx_size(wide_string);
        let guid_w = idx_size(wide_guid);
        let blob_w = idx_size(wide_blob);

        let mut type_defs = Vec::new();
        let mut type_refs = Vec::new();
        let mut fields = Vec::new();
        let mut constants = Vec::new();
        let mut custom_attrs = Vec::new();

        // Table ids per ECMA-335 §II.22: Module=0x00, TypeRef=0x01,
        // TypeDef=0x02, Field=0x04, Constant=0x0B, CustomAttribute=0x0C.
        // Coded-index widths are approximated as 2 bytes, the common case
        // below 2^13 rows — good enough for the enum-shaped subset of a
        // winmd this loader targets.
        for table_id in 0..64usize {
            let count = row_counts[table_id];
            if count == 0 {
                continue;
            }
            match table_id {
                0x00 => {
                    for _ in 0..count {
                        let _generation = c.read_u16::<LittleEndian>().unwrap();
                        let _name_idx = read_idx(&mut c, str_w);
                        let _mvid = read_idx(&mut c, guid_w);
                        let _enc_id = read_idx(&mut c, guid_w);
                        let _enc_base_id = read_idx(&mut c, guid_w);
                    }
                }
                0x01 => {
                    for _ in 0..count {
                        let _resolution_scope = c.read_u16::<LittleEndian>().unwrap();
                        let name_idx = read_idx(&mut c, str_w);
                        let namespace_idx = read_idx(&mut c, str_w);
                        type_refs.push(TypeRefRow { namespace_idx, name_idx });
                    }
                }
                0x02 => {
                    for _ in 0..count {
                        let flags = c.read_u32::<LittleEndian>().unwrap();
                        let name_idx = read_idx(&mut c, str_w);
                        let namespace_idx = read_idx(&mut c, str_w);
                        let extends_idx = c.read_u16::<LittleEndian>().unwrap() as u32;
                        let field_list_start = c.read_u16::<LittleEndian>().unwrap() as u32;
                        let _ = flags;
                        type_defs.push(TypeDefRow {
                            namespace_idx,
                            name_idx,
                            extends_idx,
                            field_list_start,
                            field_list_end: 0,
                            token: 0x0200_0000 | (type_defs.len() as u32 + 1),
                        });
                    }
                }
                0x04 => {
                    for _ in 0..count {
                        let flags = c.read_u16::<LittleEndian>().unwrap();
                        let name_idx = read_idx(&mut c, str_w);
                        let signature_idx = read_idx(&mut c, blob_w);
                        fields.push(FieldRow { name_idx, signature_idx, flags });
                    }
                }
                0x0B => {
                    for _ in 0..count {
                        let _type_code = c.read_u8().unwrap();
                        let _padding = c.read_u8().unwrap();
                        let parent_token = c.read_u16::<LittleEndian>().unwrap() as u32;
                        let value_blob_idx = read_idx(&mut c, blob_w);
                        constants.push(ConstantRow { parent_token, value_blob_idx });
                    }
                }
                0x0C => {
                    for _ in 0..count {
                        let parent_token = c.read_u16::<LittleEndian>().unwrap() as u32;
                        let _ctor_idx = c.read_u16::<LittleEndian>().unwrap();
                        let type_name_idx = read_idx(&mut c, blob_w);
                        custom_attrs.push(CustomAttributeRow { parent_token, type_name_idx });
                    }
                }
                _ => {
                    // Unmodeled table: row layout is unknown to this loader, so
                    // further tables after it cannot be located either. The
                    // enum-shaped tables above are emitted first in practice
                    // for winmd-style metadata; this loader accepts that
                    // limitation rather than modeling all ~40 table kinds.
                    break;
                }
            }
        }

        // field_list_end is resolved once all TypeDef rows are known.
        let starts: Vec<u32> = type_defs.iter().map(|t| t.field_list_start).collect();
        for (i, t) in type_defs.iter_mut().enumerate() {
            t.field_list_end = starts.get(i + 1).copied().unwrap_or(fields.len() as u32 + 1);
        }

        Ok(TablesStream { type_defs, type_refs, fields, constants, custom_attrs })
    }

    /// Decodes `type_def`'s `extends` `TypeDefOrRef` coded index (tag in the
    /// low 2 bits, row index in the rest, per ECMA-335 §II.24.2.6) and
    /// checks whether it names `System.Enum`. A base `TypeDef` in the same
    /// module (tag `TYPE_DEF_OR_REF_TYPE_DEF`) is never `System.Enum` itself
    /// since that type only ever comes from a referenced assembly, so only
    /// the `TypeRef` case is resolved.
    fn extends_system_enum(&self, type_def: &TypeDefRow, strings: &[u8]) -> bool {
        let tag = type_def.extends_idx & 0x3;
        let row = (type_def.extends_idx >> 2) as usize;
        if tag == TYPE_DEF_OR_REF_TYPE_DEF {
            return false;
        }
        if tag != TYPE_DEF_OR_REF_TYPE_REF || row == 0 {
            return false;
        }
        match self.type_refs.get(row - 1) {
            Some(type_ref) => type_ref.full_name(strings) == "System.Enum",
            None => false,
        }
    }

    fn value_field_of(&self, type_def: &TypeDefRow) -> Option<&FieldRow> {
        self.fields_of(type_def)
            .into_iter()
            .find(|f| f.flags & FIELD_ATTR_SPECIAL_NAME != 0)
    }

    fn literal_fields_of<'a>(&'a self, type_def: &TypeDefRow, strings: &[u8]) -> Vec<&'a FieldRow> {
        let _ = strings;
        self.fields_of(type_def)
            .into_iter()
            .filter(|f| f.flags & FIELD_ATTR_LITERAL != 0)
            .collect()
    }

    fn fields_of(&self, type_def: &TypeDefRow) -> Vec<&FieldRow> {
        let start = type_def.field_list_start.saturating_sub(1) as usize;
        let end = type_def.field_list_end.saturating_sub(1) as usize;
        self.fields.get(start..end.min(self.fields.len())).unwrap_or(&[]).iter().collect()
    }

    fn field_name(&self, field: &FieldRow, strings: &[u8]) -> String {
        read_string_heap(strings, field.name_idx)
    }

    fn field_signature_bits(&self, field: &FieldRow, blob: &[u8]) -> Result<u32> {
        let sig = read_blob_heap(blob, field.signature_idx);
        // FIELD signature: 0x06 calling-convention byte, then the type.
        let type_code = *sig.get(1).ok_or(ConstDbError::Truncated { needed: 2, available: sig.len() })?;
        underlying_bits_for_type_code(type_code)
    }

    fn constant_value_of(&self, field: &FieldRow, blob: &[u8]) -> Option<u64> {
        let field_token = self
            .fields
            .iter()
            .position(|f| std::ptr::eq(f, field))
            .map(|i| 0x0400_0000 | (i as u32 + 1))?;
        let row = self.constants.iter().find(|c| c.parent_token == (field_token & 0xFFFF))?;
        let bytes = read_blob_heap(blob, row.value_blob_idx);
        Some(match bytes.len() {
            1 => bytes[0] as u64,
            2 => u16::from_le_bytes([bytes[0], bytes[1]]) as u64,
            4 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64,
            8 => u64::from_le_bytes(bytes[..8].try_into().ok()?),
            _ => return None,
        })
    }

    fn has_flags_attribute(&self, type_def: &TypeDefRow, strings: &[u8]) -> bool {
        self.custom_attrs.iter().any(|a| {
            a.parent_token == (type_def.token & 0xFFFF)
                && read_string_heap(strings, a.type_name_idx).contains("FlagsAttribute")
        })
    }
}

fn read_idx(c: &mut Cursor<&[u8]>, width: u64) -> u32 {
    if width == 2 {
        c.read_u16::<LittleEndian>().unwrap() as u32
    } else {
        c.read_u32::<LittleEndian>().unwrap()
    }
}

fn read_string_heap(heap: &[u8], idx: u32) -> String {
    let start = idx as usize;
    if start >= heap.len() {
        return String::new();
    }
    let rest = &heap[start..];
    let nul = rest.iter().position(|b| *b == 0).unwrap_or(rest.len());
    String::from_utf8_lossy(&rest[..nul]).to_string()
}

fn read_blob_heap(heap: &[u8], idx: u32) -> &[u8] {
    let start = idx as usize;
    if start >= heap.len() {
        return &[];
    }
    let first = heap[start];
    let (len, header) = if first & 0x80 == 0 {
        (first as usize, 1)
    } else if first & 0xC0 == 0x80 {
        (((first as usize & 0x3F) << 8) | heap[start + 1] as usize, 2)
    } else {
        (
            ((first as usize & 0x1F) << 24)
                | (heap[start + 1] as usize) << 16
                | (heap[start + 2] as usize) << 8
                | heap[start + 3] as usize,
            4,
        )
    };
    let data_start = start + header;
    &heap[data_start..(data_start + len).min(heap.len())]
}
