use crate::error::{PeError, Result};
use crate::reader::ByteReader;

#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub pointer_to_raw_data: u32,
    pub size_of_raw_data: u32,
}

impl Section {
    /// The mapped span used for RVA containment checks: `max(virtual_size,
    /// size_of_raw_data)`, per the reader's contract.
    fn mapped_len(&self) -> u32 {
        self.virtual_size.max(self.size_of_raw_data)
    }

    pub fn contains_rva(&self, rva: u32) -> bool {
        let len = self.mapped_len();
        rva >= self.virtual_address && rva < self.virtual_address.saturating_add(len)
    }

    pub fn rva_to_offset(&self, rva: u32) -> Option<u32> {
        if self.contains_rva(rva) {
            Some(self.pointer_to_raw_data + (rva - self.virtual_address))
        } else {
            None
        }
    }

    /// Offset of the end of the section's mapped span within the file, used
    /// to bound how many bytes are available to decode starting at a given
    /// RVA inside this section.
    pub fn file_end(&self) -> u32 {
        self.pointer_to_raw_data + self.size_of_raw_data
    }

    pub fn virtual_end(&self) -> u32 {
        self.virtual_address + self.mapped_len()
    }
}

const SECTION_HEADER_SIZE: usize = 40;

pub fn parse_section_table(r: &mut ByteReader, count: u16) -> Result<Vec<Section>> {
    let mut sections = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let base = r.position();
        let name_bytes = r.read_exact_at(base, 8)?;
        let name = decode_section_name(&name_bytes);

        let virtual_size = r.read_u32()?;
        let virtual_address = r.read_u32()?;
        let size_of_raw_data = r.read_u32()?;
        let pointer_to_raw_data = r.read_u32()?;
        let _pointer_to_relocations = r.read_u32()?;
        let _pointer_to_linenumbers = r.read_u32()?;
        let _number_of_relocations = r.read_u16()?;
        let _number_of_linenumbers = r.read_u16()?;
        let _characteristics = r.read_u32()?;

        sections.push(Section {
            name,
            virtual_address,
            virtual_size,
            pointer_to_raw_data,
            size_of_raw_data,
        });

        r.seek_to(base + SECTION_HEADER_SIZE)?;
    }
    Ok(sections)
}

fn decode_section_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Translates an RVA to a file offset by locating the containing section, or
/// by identity mapping when the RVA falls inside the header range.
pub fn rva_to_offset(sections: &[Section], size_of_headers: u32, rva: u32) -> Result<u32> {
    if rva == 0 {
        return Err(PeError::InvalidRva);
    }
    for section in sections {
        if let Some(offset) = section.rva_to_offset(rva) {
            return Ok(offset);
        }
    }
    if rva < size_of_headers {
        return Ok(rva);
    }
    Err(PeError::RvaUnmapped(rva))
}
