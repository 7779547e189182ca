//! Package builder: folder tree construction, payload streaming and the
//! directory packer

use crate::rmdp::entry::{FileEntry, FolderEntry};
use crate::rmdp::error::{EntryKind, Result, RmdpError};
use crate::rmdp::file::Archive;
use crate::rmdp::filetime::{
    datetime_to_filetime, filetime_to_datetime, system_time_to_datetime,
};
use crate::rmdp::header::UnknownHeader;
use crate::rmdp::payload::copy_payload;
use crate::rmdp::version::{Endianness, PackageVersion};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Builder for package metadata and its payload blob
///
/// Folders and files are appended to two arenas and linked by index as they
/// arrive: a folder's first child goes in its `next_parent_folder_id`, later
/// children hang off the previous child's `next_folder_id`. Files chain the
/// same way through `next_file_id`.
///
/// Paths use `/` or `\` separators. The first path segment is a
/// filesystem-safe top-level name: `_` is turned back into `:` so `d_`
/// becomes the drive-style folder `d:`.
#[derive(Debug)]
pub struct ArchiveBuilder {
    archive: Archive,
    /// Package path of every folder, root is `""`
    folder_index: HashMap<String, usize>,
    /// Package paths of files added so far
    file_paths: HashSet<String>,
    /// Most recently added child folder of each folder
    last_child_folder: Vec<Option<usize>>,
    /// Most recently added file of each folder
    last_file: Vec<Option<usize>>,
}

impl ArchiveBuilder {
    /// Create a builder holding only the root folder
    pub fn new(version: PackageVersion, endianness: Endianness) -> Self {
        Self {
            archive: Archive::new(version, endianness),
            folder_index: HashMap::from([(String::new(), 0)]),
            file_paths: HashSet::new(),
            last_child_folder: vec![None],
            last_file: vec![None],
        }
    }

    /// Replace the opaque header fields written by [`Self::build_header`]
    #[must_use]
    pub fn with_unknown_header(mut self, unknown: UnknownHeader) -> Self {
        self.archive.unknown = unknown;
        self
    }

    /// Archive built so far
    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// Add a folder whose parent already exists
    ///
    /// Returns the folder index. Adding a folder that already exists returns
    /// its existing index.
    pub fn add_folder(&mut self, path: &str) -> Result<usize> {
        let segments = package_segments(split_path(path), false);
        self.add_folder_segments(&segments)
    }

    fn add_folder_segments(&mut self, segments: &[String]) -> Result<usize> {
        check_segments(segments)?;
        let key = segments.join("/");
        if let Some(&index) = self.folder_index.get(&key) {
            return Ok(index);
        }

        let Some((name, parent_segments)) = segments.split_last() else {
            return Ok(0);
        };
        let parent_key = parent_segments.join("/");
        let parent = *self
            .folder_index
            .get(&parent_key)
            .ok_or(RmdpError::FolderNotFound(parent_key))?;

        let index = self.archive.folders.len();
        check_id(index, EntryKind::Folder, self.archive.version)?;

        self.archive
            .folders
            .push(FolderEntry::new(name.clone(), parent as u64));
        match self.last_child_folder[parent] {
            Some(previous) => self.archive.folders[previous].next_folder_id = Some(index as u64),
            None => self.archive.folders[parent].next_parent_folder_id = Some(index as u64),
        }
        self.last_child_folder[parent] = Some(index);
        self.last_child_folder.push(None);
        self.last_file.push(None);
        self.folder_index.insert(key, index);

        debug!("Added folder {} as {}", segments.join("/"), index);
        Ok(index)
    }

    /// Append a file from disk, streaming its contents into `payload`
    ///
    /// The payload offset is `payload`'s position before streaming. The size
    /// is taken from the file's metadata; a source that yields fewer bytes
    /// fails with [`RmdpError::TruncatedSource`]. Versions carrying write
    /// times record the source modification time.
    pub fn add_file<W: Write + Seek>(
        &mut self,
        payload: &mut W,
        source_path: &Path,
        archive_path: &str,
    ) -> Result<usize> {
        self.add_file_segments(payload, source_path, split_path(archive_path))
    }

    fn add_file_segments<W: Write + Seek>(
        &mut self,
        payload: &mut W,
        source_path: &Path,
        segments: Vec<String>,
    ) -> Result<usize> {
        let metadata = std::fs::metadata(source_path)?;
        let write_time = if self.archive.version.has_write_time() {
            Some(system_time_to_datetime(metadata.modified()?))
        } else {
            None
        };

        let mut reader = BufReader::new(File::open(source_path)?);
        self.push_file(
            payload,
            &mut reader,
            metadata.len(),
            segments,
            write_time,
            source_path,
        )
    }

    /// Append a file from any reader
    ///
    /// `write_time` is dropped for versions without write times. Versions
    /// with write times store the FILETIME epoch when it is `None`.
    pub fn add_file_from_reader<W: Write + Seek, R: Read>(
        &mut self,
        payload: &mut W,
        reader: &mut R,
        size: u64,
        archive_path: &str,
        write_time: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        let write_time = write_time.filter(|_| self.archive.version.has_write_time());
        self.push_file(
            payload,
            reader,
            size,
            split_path(archive_path),
            write_time,
            Path::new(archive_path),
        )
    }

    fn push_file<W: Write + Seek, R: Read>(
        &mut self,
        payload: &mut W,
        reader: &mut R,
        size: u64,
        segments: Vec<String>,
        write_time: Option<DateTime<Utc>>,
        source: &Path,
    ) -> Result<usize> {
        let segments = package_segments(segments, true);
        check_segments(&segments)?;
        let Some((name, folder_segments)) = segments.split_last() else {
            return Err(RmdpError::InvalidPath(source.display().to_string()));
        };

        let package_path = segments.join("/");
        if self.file_paths.contains(&package_path) {
            return Err(RmdpError::InvalidPath(format!(
                "{package_path} was already added"
            )));
        }

        let folder_key = folder_segments.join("/");
        let parent = *self
            .folder_index
            .get(&folder_key)
            .ok_or(RmdpError::FolderNotFound(folder_key))?;

        let index = self.archive.files.len();
        check_id(index, EntryKind::File, self.archive.version)?;
        // Stored as FILETIME, so keep only 100 ns precision. A missing time
        // is written as FILETIME 0 and reads back as the FILETIME epoch.
        let write_time = if self.archive.version.has_write_time() {
            let filetime = write_time.map_or(Ok(0), datetime_to_filetime)?;
            Some(filetime_to_datetime(filetime)?)
        } else {
            None
        };

        let offset = payload.stream_position()?;
        let copied = copy_payload(reader, payload, size)?;
        if copied.bytes != size {
            return Err(RmdpError::TruncatedSource {
                path: source.to_path_buf(),
                expected: size,
                actual: copied.bytes,
            });
        }

        let mut file = FileEntry::new(name.clone(), parent as u64);
        file.offset = offset;
        file.size = size;
        file.data_checksum = copied.checksum;
        file.write_time = write_time;
        self.archive.files.push(file);

        match self.last_file[parent] {
            Some(previous) => self.archive.files[previous].next_file_id = Some(index as u64),
            None => self.archive.folders[parent].next_file_id = Some(index as u64),
        }
        self.last_file[parent] = Some(index);
        self.file_paths.insert(package_path);

        debug!(
            "Added file {} at offset {} ({} bytes, crc {:08x})",
            segments.join("/"),
            offset,
            size,
            copied.checksum
        );
        Ok(index)
    }

    /// Assign name offsets and write the metadata file
    ///
    /// Returns the finished archive model.
    pub fn build_header<W: Write + Seek>(self, writer: &mut W) -> Result<Archive> {
        let mut archive = self.archive;
        archive.assign_name_offsets();
        archive.write_metadata(writer)?;

        info!(
            "Built package metadata: version {}, {} folders, {} files",
            archive.version,
            archive.folders.len(),
            archive.files.len()
        );
        Ok(archive)
    }
}

/// Split a `/` or `\` separated path into non-empty segments
fn split_path(path: &str) -> Vec<String> {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .map(str::to_string)
        .collect()
}

/// Reject names the NUL-terminated name block cannot hold
fn check_segments(segments: &[String]) -> Result<()> {
    match segments.iter().find(|segment| segment.contains('\0')) {
        Some(segment) => Err(RmdpError::InvalidPath(format!(
            "{segment:?} contains a NUL byte"
        ))),
        None => Ok(()),
    }
}

/// Convert filesystem segments to package names
///
/// Only a top-level folder name is converted; a file directly under the
/// root keeps its name.
fn package_segments(mut segments: Vec<String>, is_file: bool) -> Vec<String> {
    if segments.len() > usize::from(is_file) {
        segments[0] = segments[0].replace('_', ":");
    }
    segments
}

/// Record counts are u32 and IDs must stay below the null sentinel
fn check_id(index: usize, kind: EntryKind, version: PackageVersion) -> Result<()> {
    if (index as u64) < version.null_id() && u32::try_from(index).is_ok() {
        Ok(())
    } else {
        Err(RmdpError::TooManyEntries { kind, count: index })
    }
}

/// Options for [`pack_directory`]
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Format version to write
    pub version: PackageVersion,
    /// Record byte order
    pub endianness: Endianness,
    /// Opaque header fields, canonical placeholders when `None`
    pub unknown_header: Option<UnknownHeader>,
    /// Paths relative to the source directory that are not packed
    pub exclude: Vec<PathBuf>,
}

impl PackOptions {
    /// Options for `version` in the byte order its titles ship with
    pub fn new(version: PackageVersion) -> Self {
        Self {
            version,
            endianness: version.default_endianness(),
            unknown_header: None,
            exclude: Vec::new(),
        }
    }
}

impl Default for PackOptions {
    fn default() -> Self {
        Self::new(PackageVersion::QuantumBreak)
    }
}

/// Pack a directory tree into a metadata file and payload blob
///
/// The tree is walked once in file-name order. Directories become folders
/// and regular files become file records. Symbolic links are skipped. The
/// payload blob is written first and the metadata file once every offset
/// is known.
pub fn pack_directory(
    source_dir: &Path,
    metadata_path: &Path,
    payload_path: &Path,
    options: &PackOptions,
) -> Result<Archive> {
    let mut builder = ArchiveBuilder::new(options.version, options.endianness);
    if let Some(unknown) = &options.unknown_header {
        builder = builder.with_unknown_header(unknown.clone());
    }

    let mut payload = BufWriter::new(File::create(payload_path)?);

    for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|_| RmdpError::InvalidPath(entry.path().display().to_string()))?;

        if options.exclude.iter().any(|excluded| excluded == relative) {
            debug!("Skipping excluded path {}", relative.display());
            continue;
        }

        let segments = relative_segments(relative)?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            builder.add_folder_segments(&package_segments(segments, false))?;
        } else if file_type.is_file() {
            builder.add_file_segments(&mut payload, entry.path(), segments)?;
        } else {
            warn!(
                "Skipping {}: not a regular file or directory",
                entry.path().display()
            );
        }
    }

    payload.flush()?;

    let mut metadata = BufWriter::new(File::create(metadata_path)?);
    let archive = builder.build_header(&mut metadata)?;
    metadata.flush()?;

    info!(
        "Packed {} into {} and {} ({} bytes of payload)",
        source_dir.display(),
        metadata_path.display(),
        payload_path.display(),
        archive.total_payload_size()
    );
    Ok(archive)
}

fn relative_segments(path: &Path) -> Result<Vec<String>> {
    path.components()
        .map(|component| match component {
            Component::Normal(name) => name
                .to_str()
                .map(str::to_string)
                .ok_or_else(|| RmdpError::InvalidPath(path.display().to_string())),
            _ => Err(RmdpError::InvalidPath(path.display().to_string())),
        })
        .collect()
}
