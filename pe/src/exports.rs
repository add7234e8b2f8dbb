use crate::error::{PeError, Result};
use crate::headers::DataDirectory;
use crate::reader::ByteReader;
use crate::sections::Section;

/// What an export name resolves to: either a code RVA in this image, or a
/// forwarder string naming another module's export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportInfo {
    Direct(u32),
    Forwarder(String),
}

struct ExportDirectory {
    number_of_functions: u32,
    number_of_names: u32,
    address_of_functions: u32,
    address_of_names: u32,
    address_of_name_ordinals: u32,
}

fn read_export_directory(r: &mut ByteReader, dir: DataDirectory, dir_file_offset: u32) -> Result<ExportDirectory> {
    r.seek_to(dir_file_offset as usize)?;
    let _characteristics = r.read_u32()?;
    let _time_date_stamp = r.read_u32()?;
    let _major_version = r.read_u16()?;
    let _minor_version = r.read_u16()?;
    let _name_rva = r.read_u32()?;
    let _base = r.read_u32()?;
    let number_of_functions = r.read_u32()?;
    let number_of_names = r.read_u32()?;
    let address_of_functions = r.read_u32()?;
    let address_of_names = r.read_u32()?;
    let address_of_name_ordinals = r.read_u32()?;
    let _ = dir;
    Ok(ExportDirectory {
        number_of_functions,
        number_of_names,
        address_of_functions,
        address_of_names,
        address_of_name_ordinals,
    })
}

fn rva_offset(sections: &[Section], size_of_headers: u32, rva: u32) -> Result<u32> {
    crate::sections::rva_to_offset(sections, size_of_headers, rva)
}

/// Finds `name` in the export name table and resolves it to a direct RVA or a
/// forwarder string. Case-sensitive, as the spec requires.
pub fn find_export(
    r: &mut ByteReader,
    sections: &[Section],
    size_of_headers: u32,
    dir: DataDirectory,
    name: &str,
) -> Result<ExportInfo> {
    let dir_offset = rva_offset(sections, size_of_headers, dir.rva)?;
    let ed = read_export_directory(r, dir, dir_offset)?;

    let names_offset = rva_offset(sections, size_of_headers, ed.address_of_names)?;
    let ordinals_offset = rva_offset(sections, size_of_headers, ed.address_of_name_ordinals)?;
    let functions_offset = rva_offset(sections, size_of_headers, ed.address_of_functions)?;

    let mut found_index: Option<u32> = None;
    for i in 0..ed.number_of_names {
        r.seek_to(names_offset as usize + (i as usize * 4))?;
        let name_rva = r.read_u32()?;
        let name_offset = rva_offset(sections, size_of_headers, name_rva)?;
        let candidate = r.read_cstr_at(name_offset as usize)?;
        if candidate == name {
            found_index = Some(i);
            break;
        }
    }

    let index = found_index.ok_or_else(|| PeError::ExportNotFound(name.to_string()))?;

    r.seek_to(ordinals_offset as usize + (index as usize * 2))?;
    let ordinal = r.read_u16()? as u32;
    if ordinal >= ed.number_of_functions {
        return Err(PeError::ExportNotFound(name.to_string()));
    }

    r.seek_to(functions_offset as usize + (ordinal as usize * 4))?;
    let function_rva = r.read_u32()?;

    if function_rva >= dir.rva && function_rva < dir.rva + dir.size {
        let forwarder_offset = rva_offset(sections, size_of_headers, function_rva)?;
        let forwarder = r.read_cstr_at(forwarder_offset as usize)?;
        Ok(ExportInfo::Forwarder(forwarder))
    } else {
        Ok(ExportInfo::Direct(function_rva))
    }
}

/// Lazily yields every named export (ordinal-only exports are skipped, as
/// the spec requires).
pub fn export_names(
    r: &mut ByteReader,
    sections: &[Section],
    size_of_headers: u32,
    dir: DataDirectory,
) -> Result<Vec<String>> {
    let dir_offset = rva_offset(sections, size_of_headers, dir.rva)?;
    let ed = read_export_directory(r, dir, dir_offset)?;
    let names_offset = rva_offset(sections, size_of_headers, ed.address_of_names)?;

    let mut names = Vec::with_capacity(ed.number_of_names as usize);
    for i in 0..ed.number_of_names {
        r.seek_to(names_offset as usize + (i as usize * 4))?;
        let name_rva = r.read_u32()?;
        let name_offset = rva_offset(sections, size_of_headers, name_rva)?;
        names.push(r.read_cstr_at(name_offset as usize)?);
    }
    Ok(names)
}

/// Parses `MODULE.symbol` into its parts; reports `MODULE.#ordinal` as
/// unsupported per the spec.
pub fn parse_forwarder(forwarder: &str) -> Result<(String, String)> {
    let (module, symbol) = forwarder
        .split_once('.')
        .ok_or_else(|| PeError::ForwarderUnsupported(forwarder.to_string()))?;
    if symbol.starts_with('#') {
        return Err(PeError::ForwarderUnsupported(forwarder.to_string()));
    }
    Ok((module.to_string(), symbol.to_string()))
}
