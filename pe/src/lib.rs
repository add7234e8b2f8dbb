//! A minimal PE32/PE32+ reader.
//!
//! Parses just enough of the Portable Executable container to let a caller
//! locate an exported function's bytes: DOS/COFF/optional headers, the
//! section table, and the export directory (including forwarder strings).
//! Import parsing, relocations, resources and the rest of the format are out
//! of scope — this crate answers "where are this export's bytes" and nothing
//! else.

mod error;
mod exports;
mod headers;
mod reader;
mod sections;

pub use error::{PeError, Result};
pub use exports::{parse_forwarder, ExportInfo};
pub use headers::{DataDirectory, DIR_COM_DESCRIPTOR, DIR_EXPORT, DIR_IMPORT, NUM_DATA_DIRECTORIES};
pub use sections::Section;

use reader::ByteReader;

/// A parsed PE image. Holds the information the decompiler needs: image
/// base, sections, data directories, and whether directory 14 (the CLI
/// header) is present.
pub struct PeImage<'a> {
    data: &'a [u8],
    headers: headers::Headers,
    sections: Vec<Section>,
}

impl<'a> PeImage<'a> {
    pub fn parse(data: &'a [u8]) -> Result<PeImage<'a>> {
        let mut r = ByteReader::new(data);
        let h = headers::parse_headers(&mut r)?;
        let sections = sections::parse_section_table(&mut r, h.number_of_sections)?;
        log::debug!(
            "parsed PE image: pe32+={} sections={} image_base={:#x}",
            h.is_pe32_plus,
            sections.len(),
            h.image_base
        );
        Ok(PeImage {
            data,
            headers: h,
            sections,
        })
    }

    pub fn image_base(&self) -> u64 {
        self.headers.image_base
    }

    pub fn is_pe32_plus(&self) -> bool {
        self.headers.is_pe32_plus
    }

    pub fn size_of_headers(&self) -> u32 {
        self.headers.size_of_headers
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn data_directory(&self, index: usize) -> Option<DataDirectory> {
        self.headers.data_directory(index)
    }

    /// Present only when data directory 14 (the CLI header) is populated;
    /// fewer than 15 directories means the image predates managed metadata.
    pub fn has_dotnet_metadata(&self) -> bool {
        self.data_directory(DIR_COM_DESCRIPTOR).is_some()
    }

    fn export_directory(&self) -> Result<DataDirectory> {
        self.data_directory(DIR_EXPORT)
            .ok_or_else(|| PeError::ExportNotFound(String::new()))
    }

    pub fn find_export(&self, name: &str) -> Result<ExportInfo> {
        let dir = self.export_directory()?;
        let mut r = ByteReader::new(self.data);
        exports::find_export(&mut r, &self.sections, self.headers.size_of_headers, dir, name)
    }

    /// Lazily yields every named export; exports by ordinal only are
    /// skipped.
    pub fn enumerate_export_names(&self) -> Result<Vec<String>> {
        let dir = self.export_directory()?;
        let mut r = ByteReader::new(self.data);
        exports::export_names(&mut r, &self.sections, self.headers.size_of_headers, dir)
    }

    pub fn rva_to_offset(&self, rva: u32) -> Result<u32> {
        sections::rva_to_offset(&self.sections, self.headers.size_of_headers, rva)
    }

    /// The raw file bytes of the whole image, for slicing once an offset is
    /// known.
    pub fn raw(&self) -> &'a [u8] {
        self.data
    }

    /// The file offset at which a section's mapped span ends, used to bound
    /// how many bytes are available to decode starting at a given offset.
    pub fn section_containing_offset(&self, file_offset: u32) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| file_offset >= s.pointer_to_raw_data && file_offset < s.file_end())
    }
}

#[cfg(test)]
mod test;
