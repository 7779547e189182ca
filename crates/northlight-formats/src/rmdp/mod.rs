//! RMDP package format support for the Northlight engine
//!
//! A package is a pair of files:
//!
//! - the **metadata** file (`.bin`): header, folder records, file records,
//!   a fixed trailer and a block of NUL-terminated names
//! - the **payload** blob (`.rmdp`): raw file contents, concatenated
//!
//! The folder tree is stored as two flat record arrays linked by index.
//! Folder 0 is the root. Each record names its parent; folders point at
//! their first child folder, next sibling folder and first file, and files
//! point at their next sibling file. Record names live in the name block
//! and are guarded by a CRC-32 of the lowercased name.
//!
//! # Versions
//!
//! | Tag | Title | IDs | Write time |
//! |-----|-------|-----|------------|
//! | 2 | Alan Wake | 4 bytes | no |
//! | 7 | Alan Wake's American Nightmare | 8 bytes | no |
//! | 8 | Quantum Break | 8 bytes | yes |
//! | 9 | Control | 8 bytes | yes |
//!
//! Every multi-byte field follows the byte order tag in the first byte of
//! the metadata file, except the payload checksum (always little-endian)
//! and the name block length (big-endian for version 2, little-endian
//! otherwise).
//!
//! # Reading
//!
//! ```rust,no_run
//! use northlight_formats::rmdp::{extract_all, read_metadata};
//! use std::fs::File;
//! use std::io::BufReader;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let archive = read_metadata("data.bin")?;
//! println!("{} folders, {} files", archive.folders.len(), archive.files.len());
//!
//! for file in &archive.files {
//!     println!("{} ({} bytes)", archive.file_path(file)?, file.size);
//! }
//!
//! let mut payload = BufReader::new(File::open("data.rmdp")?);
//! extract_all(&archive, &mut payload, Path::new("out"))?;
//! # Ok(())
//! # }
//! ```
//!
//! # Packing
//!
//! ```rust,no_run
//! use northlight_formats::rmdp::{PackOptions, PackageVersion, pack_directory};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = PackOptions::new(PackageVersion::Control);
//! let archive = pack_directory(
//!     Path::new("out"),
//!     Path::new("repacked.bin"),
//!     Path::new("repacked.rmdp"),
//!     &options,
//! )?;
//! println!("packed {} files", archive.files.len());
//! # Ok(())
//! # }
//! ```
//!
//! Top-level folder names usually look like drive letters (`d:`). On disk
//! they are extracted as `d_` and turned back into `d:` when packing.

pub mod builder;
pub mod checksum;
pub mod entry;
pub mod error;
pub mod file;
pub mod filetime;
pub mod header;
pub mod name_block;
pub mod payload;
pub mod version;

// Re-export main types
pub use builder::{ArchiveBuilder, PackOptions, pack_directory};
pub use checksum::{data_checksum, name_checksum};
pub use entry::{FileEntry, FolderEntry};
pub use error::{EntryKind, ErrorCategory, Result, RmdpError};
pub use file::{Archive, TRAILER_MAGIC, read_header, read_metadata};
pub use filetime::{datetime_to_filetime, filetime_to_datetime};
pub use header::{ArchiveHeader, UnknownHeader};
pub use name_block::{NameBlock, NameOwner, read_name};
pub use payload::{
    CHUNK_SIZE, CopyResult, ExtractSummary, copy_payload, extract_all, extract_file,
    extract_to_writer, verify_payload,
};
pub use version::{Endianness, FormatLayout, IdWidth, PackageVersion};

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::{SAMPLE_FILES, sample_package};
    use std::io::Cursor;

    #[test]
    fn test_build_parse_extract_workflow() {
        for version in PackageVersion::ALL {
            let (archive, payload) = sample_package(version, version.default_endianness());

            let data = archive.build().expect("Operation should succeed");
            let parsed = Archive::parse(&data).expect("Operation should succeed");
            parsed.validate().expect("Operation should succeed");
            parsed.validate_linkage().expect("Operation should succeed");

            let mut blob = Cursor::new(payload.clone());
            for (path, contents) in SAMPLE_FILES {
                let file = parsed.find_file(path).expect("Operation should succeed");
                let mut output = Vec::new();
                extract_to_writer(&mut blob, file, &mut output)
                    .expect("Operation should succeed");
                assert_eq!(output, contents);
            }
        }
    }

    #[test]
    fn test_payload_checksum_detects_corruption() {
        let (archive, mut payload) = sample_package(PackageVersion::Control, Endianness::Little);
        payload[0] ^= 0xFF;

        let mut blob = Cursor::new(payload);
        let result = verify_payload(&mut blob, &archive.files[0]);
        assert!(matches!(
            result,
            Err(RmdpError::DataChecksumMismatch { .. })
        ));
        verify_payload(&mut blob, &archive.files[1]).expect("Operation should succeed");
    }
}
