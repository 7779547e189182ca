//! Payload blob (`.rmdp` file) streaming
//!
//! Payloads are raw, uncompressed and concatenated. Every copy goes through
//! a bounded buffer and updates a CRC-32 as it goes, so neither extraction
//! nor packing holds a whole payload in memory.

use crate::rmdp::entry::FileEntry;
use crate::rmdp::error::{Result, RmdpError};
use crate::rmdp::file::Archive;
use crc32fast::Hasher;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, info};

/// Maximum number of bytes copied per read
pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Result of streaming a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyResult {
    /// Bytes actually copied
    pub bytes: u64,
    /// CRC-32 of the copied bytes
    pub checksum: u32,
}

/// Copy up to `size` bytes from `reader` to `writer`
///
/// Stops early if the reader runs dry; callers compare
/// [`CopyResult::bytes`] against `size` to detect truncation.
pub fn copy_payload<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    size: u64,
) -> Result<CopyResult> {
    let buffer_len = usize::try_from(size).map_or(CHUNK_SIZE, |size| size.min(CHUNK_SIZE));
    let mut buffer = vec![0u8; buffer_len.max(1)];
    let mut hasher = Hasher::new();
    let mut copied = 0u64;

    while copied < size {
        let want = usize::try_from(size - copied)
            .map_or(buffer.len(), |left| left.min(buffer.len()));
        let read = match reader.read(&mut buffer[..want]) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        hasher.update(&buffer[..read]);
        writer.write_all(&buffer[..read])?;
        copied += read as u64;
    }

    Ok(CopyResult {
        bytes: copied,
        checksum: hasher.finalize(),
    })
}

/// Stream one file's payload into `writer`, checking size and checksum
pub fn extract_to_writer<R: Read + Seek + ?Sized, W: Write + ?Sized>(
    payload: &mut R,
    file: &FileEntry,
    writer: &mut W,
) -> Result<()> {
    payload.seek(SeekFrom::Start(file.offset))?;
    let copied = copy_payload(payload, writer, file.size)?;

    if copied.bytes != file.size {
        return Err(RmdpError::TruncatedPayload {
            name: file.name.clone(),
            expected: file.size,
            actual: copied.bytes,
        });
    }
    if copied.checksum != file.data_checksum {
        return Err(RmdpError::DataChecksumMismatch {
            name: file.name.clone(),
            expected: file.data_checksum,
            actual: copied.checksum,
        });
    }

    Ok(())
}

/// Check one file's payload without writing it anywhere
pub fn verify_payload<R: Read + Seek + ?Sized>(payload: &mut R, file: &FileEntry) -> Result<()> {
    extract_to_writer(payload, file, &mut std::io::sink())
}

/// Extract one file to `output_path`
///
/// Missing parent directories are created. When the record carries a write
/// time it becomes the output file's modification time. A payload that
/// fails its size or checksum check leaves the partial output in place and
/// returns the error.
pub fn extract_file<R: Read + Seek + ?Sized>(
    payload: &mut R,
    file: &FileEntry,
    output_path: &Path,
) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(output_path)?);
    extract_to_writer(payload, file, &mut writer)?;
    let output = writer.into_inner().map_err(|err| err.into_error())?;

    if let Some(write_time) = file.write_time {
        output.set_modified(SystemTime::from(write_time))?;
    }

    debug!(
        "Extracted {} ({} bytes) to {}",
        file.name,
        file.size,
        output_path.display()
    );
    Ok(())
}

/// Totals reported by [`extract_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Folders created (the root excluded)
    pub folders: usize,
    /// Files written
    pub files: usize,
    /// Payload bytes written
    pub bytes: u64,
}

/// Extract every folder and file of `archive` below `output_dir`
///
/// Folders are created even when empty. Stops at the first failing file.
pub fn extract_all<R: Read + Seek + ?Sized>(
    archive: &Archive,
    payload: &mut R,
    output_dir: &Path,
) -> Result<ExtractSummary> {
    let mut summary = ExtractSummary::default();

    fs::create_dir_all(output_dir)?;
    for (index, folder) in archive.folders.iter().enumerate() {
        if folder.is_root() {
            continue;
        }
        let path = output_dir.join(archive.folder_extraction_path(index as u64)?);
        fs::create_dir_all(path)?;
        summary.folders += 1;
    }

    for file in &archive.files {
        let path = output_dir.join(archive.file_extraction_path(file)?);
        extract_file(payload, file, &path)?;
        summary.files += 1;
        summary.bytes += file.size;
    }

    info!(
        "Extracted {} files ({} bytes) into {}",
        summary.files,
        summary.bytes,
        output_dir.display()
    );
    Ok(summary)
}
