use super::*;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

/// Builds a minimal, synthetic PE32+ image with one section holding both the
/// export directory and the exported function's bytes, so tests can exercise
/// `find_export` / `rva_to_offset` without a real DLL on disk.
struct PeBuilder {
    exports: Vec<(String, u32)>, // (name, rva-relative-to-section-start)
    code: Vec<u8>,
    image_base: u64,
}

impl PeBuilder {
    fn new() -> PeBuilder {
        PeBuilder {
            exports: Vec::new(),
            code: Vec::new(),
            image_base: 0x1_8000_0000,
        }
    }

    fn with_export(mut self, name: &str, code_offset: u32) -> PeBuilder {
        self.exports.push((name.to_string(), code_offset));
        self
    }

    fn with_code(mut self, code: Vec<u8>) -> PeBuilder {
        self.code = code;
        self
    }

    fn build(self) -> Vec<u8> {
        const SECTION_RVA: u32 = 0x1000;
        const SECTION_FILE_OFFSET: u32 = 0x400;

        // Lay out the export directory's sub-tables first; the code follows.
        let mut section_data: Vec<u8> = Vec::new();

        let dir_header_len = 40u32;
        let names_len = (self.exports.len() as u32) * 4;
        let ordinals_len = (self.exports.len() as u32) * 2;
        let functions_len = (self.exports.len() as u32) * 4;

        let functions_start = dir_header_len;
        let names_start = functions_start + functions_len;
        let ordinals_start = names_start + names_len;
        let strings_start = ordinals_start + ordinals_len;

        let mut name_rvas = Vec::new();
        let mut strings_blob = Vec::new();
        for (name, _) in &self.exports {
            name_rvas.push(SECTION_RVA + strings_start + strings_blob.len() as u32);
            strings_blob.extend_from_slice(name.as_bytes());
            strings_blob.push(0);
        }
        let code_start = strings_start + strings_blob.len() as u32;
        let code_start = (code_start + 3) & !3; // keep things word aligned, cosmetic only

        // IMAGE_EXPORT_DIRECTORY
        section_data.write_u32::<LittleEndian>(0).unwrap(); // Characteristics
        section_data.write_u32::<LittleEndian>(0).unwrap(); // TimeDateStamp
        section_data.write_u16::<LittleEndian>(0).unwrap(); // MajorVersion
        section_data.write_u16::<LittleEndian>(0).unwrap(); // MinorVersion
        section_data.write_u32::<LittleEndian>(0).unwrap(); // Name RVA (unused by reader)
        section_data.write_u32::<LittleEndian>(1).unwrap(); // Base ordinal
        section_data
            .write_u32::<LittleEndian>(self.exports.len() as u32)
            .unwrap();
        section_data
            .write_u32::<LittleEndian>(self.exports.len() as u32)
            .unwrap();
        section_data
            .write_u32::<LittleEndian>(SECTION_RVA + functions_start)
            .unwrap();
        section_data
            .write_u32::<LittleEndian>(SECTION_RVA + names_start)
            .unwrap();
        section_data
            .write_u32::<LittleEndian>(SECTION_RVA + ordinals_start)
            .unwrap();
        assert_eq!(section_data.len() as u32, dir_header_len);

        for (_, code_offset) in &self.exports {
            section_data
                .write_u32::<LittleEndian>(SECTION_RVA + code_start + code_offset)
                .unwrap();
        }
        for rva in &name_rvas {
            section_data.write_u32::<LittleEndian>(*rva).unwrap();
        }
        for (i, _) in self.exports.iter().enumerate() {
            section_data.write_u16::<LittleEndian>(i as u16).unwrap();
        }
        section_data.write_all(&strings_blob).unwrap();
        while (section_data.len() as u32) < code_start {
            section_data.push(0);
        }
        section_data.extend_from_slice(&self.code);

        let export_dir_size = dir_header_len + functions_len + names_len + ordinals_len + strings_blob.len() as u32;

        let mut image = Vec::new();
        // DOS header: 64 bytes, e_lfanew at 0x3c points past it.
        image.write_u16::<LittleEndian>(0x5A4D).unwrap(); // MZ
        image.resize(0x3c, 0);
        image.write_u32::<LittleEndian>(0x40).unwrap();
        image.resize(0x40, 0);

        image.write_u32::<LittleEndian>(0x0000_4550).unwrap(); // PE\0\0
        image.write_u16::<LittleEndian>(0x8664).unwrap(); // machine: x86-64
        image.write_u16::<LittleEndian>(1).unwrap(); // number of sections
        image.write_u32::<LittleEndian>(0).unwrap(); // timestamp
        image.write_u32::<LittleEndian>(0).unwrap(); // symtab ptr
        image.write_u32::<LittleEndian>(0).unwrap(); // num symbols
        let opt_header_size_pos = image.len();
        image.write_u16::<LittleEndian>(0).unwrap(); // size of optional header, patched below
        image.write_u16::<LittleEndian>(0x22).unwrap(); // characteristics

        let opt_header_start = image.len();
        image.write_u16::<LittleEndian>(0x20b).unwrap(); // PE32+
        image.write_u8(0).unwrap();
        image.write_u8(0).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap(); // size of code
        image.write_u32::<LittleEndian>(0).unwrap(); // size of init data
        image.write_u32::<LittleEndian>(0).unwrap(); // size of uninit data
        image.write_u32::<LittleEndian>(0).unwrap(); // entry point rva
        image.write_u32::<LittleEndian>(0).unwrap(); // base of code
        image.write_u64::<LittleEndian>(self.image_base).unwrap();
        image.write_u32::<LittleEndian>(0x1000).unwrap(); // section alignment
        image.write_u32::<LittleEndian>(0x200).unwrap(); // file alignment
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap(); // win32 version
        image.write_u32::<LittleEndian>(0x2000).unwrap(); // size of image
        image.write_u32::<LittleEndian>(SECTION_FILE_OFFSET).unwrap(); // size of headers
        image.write_u32::<LittleEndian>(0).unwrap(); // checksum
        image.write_u16::<LittleEndian>(3).unwrap(); // subsystem
        image.write_u16::<LittleEndian>(0).unwrap(); // dll characteristics
        image.write_u64::<LittleEndian>(0x10_0000).unwrap();
        image.write_u64::<LittleEndian>(0x1000).unwrap();
        image.write_u64::<LittleEndian>(0x10_0000).unwrap();
        image.write_u64::<LittleEndian>(0x1000).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap(); // loader flags
        image.write_u32::<LittleEndian>(16).unwrap(); // number of rva and sizes

        // 16 data directories; only export (index 0) is populated.
        image.write_u32::<LittleEndian>(SECTION_RVA).unwrap();
        image.write_u32::<LittleEndian>(export_dir_size).unwrap();
        for _ in 1..16 {
            image.write_u32::<LittleEndian>(0).unwrap();
            image.write_u32::<LittleEndian>(0).unwrap();
        }

        let opt_header_len = image.len() - opt_header_start;
        image[opt_header_size_pos..opt_header_size_pos + 2]
            .copy_from_slice(&(opt_header_len as u16).to_le_bytes());

        // Section header: ".edata"
        let mut name = [0u8; 8];
        name[..6].copy_from_slice(b".edata");
        image.extend_from_slice(&name);
        image.write_u32::<LittleEndian>(section_data.len() as u32).unwrap(); // virtual size
        image.write_u32::<LittleEndian>(SECTION_RVA).unwrap();
        image
            .write_u32::<LittleEndian>(section_data.len() as u32)
            .unwrap(); // size of raw data
        image
            .write_u32::<LittleEndian>(SECTION_FILE_OFFSET)
            .unwrap();
        image.write_u32::<LittleEndian>(0).unwrap();
        image.write_u32::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u16::<LittleEndian>(0).unwrap();
        image.write_u32::<LittleEndian>(0x6000_0020).unwrap(); // code | execute | read

        image.resize(SECTION_FILE_OFFSET as usize, 0);
        image.extend_from_slice(&section_data);

        image
    }
}

#[test]
fn parses_headers_and_finds_export() {
    let image = PeBuilder::new()
        .with_export("foo", 0)
        .with_code(vec![0xC3])
        .build();

    let pe = PeImage::parse(&image).expect("should parse");
    assert!(pe.is_pe32_plus());
    assert_eq!(pe.image_base(), 0x1_8000_0000);
    assert!(!pe.has_dotnet_metadata());

    match pe.find_export("foo").unwrap() {
        ExportInfo::Direct(rva) => {
            let offset = pe.rva_to_offset(rva).unwrap();
            assert_eq!(pe.raw()[offset as usize], 0xC3);
        }
        ExportInfo::Forwarder(_) => panic!("expected a direct export"),
    }
}

#[test]
fn rejects_bad_dos_signature() {
    let mut image = PeBuilder::new().with_export("foo", 0).build();
    image[0] = b'X';
    let err = PeImage::parse(&image).unwrap_err();
    assert!(matches!(err, PeError::BadImageFormat { .. }));
}

#[test]
fn missing_export_is_reported() {
    let image = PeBuilder::new().with_export("foo", 0).build();
    let pe = PeImage::parse(&image).unwrap();
    let err = pe.find_export("bar").unwrap_err();
    assert!(matches!(err, PeError::ExportNotFound(_)));
}

#[test]
fn export_name_lookup_is_case_sensitive() {
    let image = PeBuilder::new().with_export("Foo", 0).build();
    let pe = PeImage::parse(&image).unwrap();
    assert!(pe.find_export("foo").is_err());
    assert!(pe.find_export("Foo").is_ok());
}

#[test]
fn header_range_rva_maps_identity() {
    let image = PeBuilder::new().with_export("foo", 0).build();
    let pe = PeImage::parse(&image).unwrap();
    // 0x20 lies inside the DOS header, well below size_of_headers.
    assert_eq!(pe.rva_to_offset(0x20).unwrap(), 0x20);
}

#[test]
fn zero_rva_is_invalid() {
    let image = PeBuilder::new().with_export("foo", 0).build();
    let pe = PeImage::parse(&image).unwrap();
    assert!(matches!(pe.rva_to_offset(0).unwrap_err(), PeError::InvalidRva));
}

#[test]
fn unmapped_rva_past_every_section_fails() {
    let image = PeBuilder::new().with_export("foo", 0).build();
    let pe = PeImage::parse(&image).unwrap();
    assert!(matches!(
        pe.rva_to_offset(0x0FFF_FFFF).unwrap_err(),
        PeError::RvaUnmapped(_)
    ));
}

#[test]
fn ordinal_only_forwarder_is_unsupported() {
    let err = parse_forwarder("KERNELBASE.#42").unwrap_err();
    assert!(matches!(err, PeError::ForwarderUnsupported(_)));
}

#[test]
fn forwarder_string_parses_module_and_symbol() {
    let (module, symbol) = parse_forwarder("KERNELBASE.GetVersionExA").unwrap();
    assert_eq!(module, "KERNELBASE");
    assert_eq!(symbol, "GetVersionExA");
}

#[test]
fn enumerates_export_names() {
    let image = PeBuilder::new()
        .with_export("foo", 0)
        .with_export("bar", 1)
        .with_code(vec![0xC3, 0xC3])
        .build();
    let pe = PeImage::parse(&image).unwrap();
    let mut names = pe.enumerate_export_names().unwrap();
    names.sort();
    assert_eq!(names, vec!["bar".to_string(), "foo".to_string()]);
}
