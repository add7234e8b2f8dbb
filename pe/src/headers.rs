use crate::error::{PeError, Result};
use crate::reader::ByteReader;

pub const DOS_SIGNATURE: u16 = 0x5A4D; // "MZ"
pub const PE_SIGNATURE: u32 = 0x0000_4550; // "PE\0\0"
pub const OPT_HDR32_MAGIC: u16 = 0x10b;
pub const OPT_HDR64_MAGIC: u16 = 0x20b;

pub const NUM_DATA_DIRECTORIES: usize = 16;
pub const DIR_EXPORT: usize = 0;
pub const DIR_IMPORT: usize = 1;
pub const DIR_COM_DESCRIPTOR: usize = 14; // .NET / CLI header

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    pub rva: u32,
    pub size: u32,
}

/// Just enough of `IMAGE_FILE_HEADER` / `IMAGE_OPTIONAL_HEADER{32,64}` to
/// drive the decompiler: image base, header size, and the data directories.
#[derive(Debug, Clone)]
pub struct Headers {
    pub is_pe32_plus: bool,
    pub number_of_sections: u16,
    pub size_of_optional_header: u16,
    pub image_base: u64,
    pub size_of_headers: u32,
    pub data_directories: [DataDirectory; NUM_DATA_DIRECTORIES],
}

impl Headers {
    pub fn data_directory(&self, index: usize) -> Option<DataDirectory> {
        self.data_directories.get(index).copied().filter(|d| d.rva != 0 || d.size != 0)
    }
}

/// Parses the DOS header, the PE signature, the COFF file header and the
/// optional header, leaving the reader positioned just past the optional
/// header (i.e. at the start of the section table).
pub fn parse_headers(r: &mut ByteReader) -> Result<Headers> {
    r.seek_to(0)?;
    let e_magic = r.read_u16()?;
    if e_magic != DOS_SIGNATURE {
        return Err(PeError::BadImageFormat {
            reason: "missing MZ signature",
        });
    }

    r.seek_to(0x3c)?;
    let e_lfanew = r.read_u32()? as usize;

    r.seek_to(e_lfanew)?;
    let pe_sig = r.read_u32()?;
    if pe_sig != PE_SIGNATURE {
        return Err(PeError::BadImageFormat {
            reason: "missing PE\\0\\0 signature",
        });
    }

    // IMAGE_FILE_HEADER
    let _machine = r.read_u16()?;
    let number_of_sections = r.read_u16()?;
    let _time_date_stamp = r.read_u32()?;
    let _ptr_to_symbol_table = r.read_u32()?;
    let _number_of_symbols = r.read_u32()?;
    let size_of_optional_header = r.read_u16()?;
    let _characteristics = r.read_u16()?;

    let optional_header_start = r.position();

    let magic = r.read_u16()?;
    let is_pe32_plus = match magic {
        OPT_HDR32_MAGIC => false,
        OPT_HDR64_MAGIC => true,
        _ => {
            return Err(PeError::BadImageFormat {
                reason: "unsupported optional header magic",
            })
        }
    };

    // Standard fields common to both layouts, up to base-of-data (PE32 only).
    let _major_linker_version = r.read_u8()?;
    let _minor_linker_version = r.read_u8()?;
    let _size_of_code = r.read_u32()?;
    let _size_of_initialized_data = r.read_u32()?;
    let _size_of_uninitialized_data = r.read_u32()?;
    let _address_of_entry_point = r.read_u32()?;
    let _base_of_code = r.read_u32()?;
    if !is_pe32_plus {
        let _base_of_data = r.read_u32()?;
    }

    let image_base: u64 = if is_pe32_plus {
        r.read_u64()?
    } else {
        r.read_u32()? as u64
    };

    let _section_alignment = r.read_u32()?;
    let _file_alignment = r.read_u32()?;
    let _os_major = r.read_u16()?;
    let _os_minor = r.read_u16()?;
    let _image_major = r.read_u16()?;
    let _image_minor = r.read_u16()?;
    let _subsys_major = r.read_u16()?;
    let _subsys_minor = r.read_u16()?;
    let _win32_version = r.read_u32()?;
    let _size_of_image = r.read_u32()?;
    let size_of_headers = r.read_u32()?;
    let _checksum = r.read_u32()?;
    let _subsystem = r.read_u16()?;
    let _dll_characteristics = r.read_u16()?;

    if is_pe32_plus {
        let _size_of_stack_reserve = r.read_u64()?;
        let _size_of_stack_commit = r.read_u64()?;
        let _size_of_heap_reserve = r.read_u64()?;
        let _size_of_heap_commit = r.read_u64()?;
    } else {
        let _size_of_stack_reserve = r.read_u32()?;
        let _size_of_stack_commit = r.read_u32()?;
        let _size_of_heap_reserve = r.read_u32()?;
        let _size_of_heap_commit = r.read_u32()?;
    }

    let _loader_flags = r.read_u32()?;
    let number_of_rva_and_sizes = r.read_u32()? as usize;

    let mut data_directories = [DataDirectory::default(); NUM_DATA_DIRECTORIES];
    for slot in data_directories.iter_mut().take(number_of_rva_and_sizes.min(NUM_DATA_DIRECTORIES)) {
        let rva = r.read_u32()?;
        let size = r.read_u32()?;
        *slot = DataDirectory { rva, size };
    }

    // Skip to the declared end of the optional header regardless of how many
    // directories we actually read, so the section table starts at the right
    // place even for unusual `number_of_rva_and_sizes` values.
    r.seek_to(optional_header_start + size_of_optional_header as usize)?;

    Ok(Headers {
        is_pe32_plus,
        number_of_sections,
        size_of_optional_header,
        image_base,
        size_of_headers,
        data_directories,
    })
}
