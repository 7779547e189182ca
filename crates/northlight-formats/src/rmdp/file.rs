//! Complete package metadata: header, directory records and name block

use crate::rmdp::checksum::name_checksum;
use crate::rmdp::entry::{FileEntry, FolderEntry, write_null_ids};
use crate::rmdp::error::{EntryKind, Result, RmdpError};
use crate::rmdp::header::{ArchiveHeader, UnknownHeader};
use crate::rmdp::name_block::{NameBlock, NameOwner, read_name};
use crate::rmdp::version::{Endianness, PackageVersion};
use binrw::io::{Cursor, Read, Seek, SeekFrom, Write};
use binrw::{BinRead, BinWrite};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Magic marker inside the trailer that precedes the name block
pub const TRAILER_MAGIC: [u8; 4] = *b"ctor";

/// Upper bound on records pre-allocated from untrusted header counts
const MAX_PREALLOCATED_RECORDS: usize = 1 << 16;

/// Decoded package metadata (`.bin` file)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Archive {
    /// Record byte order
    pub endianness: Endianness,
    /// Format version
    pub version: PackageVersion,
    /// Folder records; index 0 is the root
    pub folders: Vec<FolderEntry>,
    /// File records
    pub files: Vec<FileEntry>,
    /// Opaque header fields
    pub unknown: UnknownHeader,
}

/// Read and parse a metadata file
pub fn read_metadata(path: impl AsRef<Path>) -> Result<Archive> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let archive = Archive::parse(&data)?;
    info!(
        "Read {} folders and {} files from {}",
        archive.folders.len(),
        archive.files.len(),
        path.display()
    );
    Ok(archive)
}

impl Archive {
    /// Empty archive holding only the root folder
    pub fn new(version: PackageVersion, endianness: Endianness) -> Self {
        Self {
            endianness,
            version,
            folders: vec![FolderEntry::root()],
            files: Vec::new(),
            unknown: UnknownHeader::for_version(version),
        }
    }

    /// Parse metadata from bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::read(&mut Cursor::new(data))
    }

    /// Read metadata from a seekable stream positioned at the header
    ///
    /// Every record name is resolved through the name block and checked
    /// against the record's name checksum. Reading stops at the first
    /// mismatch.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let header = ArchiveHeader::read(reader)?;
        let endian = header.endian();
        let layout = header.version.layout();
        let block_length = header.name_block_length;

        debug!(
            "Package header: version {}, {} endian, {} folders, {} files, {} byte name block",
            header.version,
            header.endianness,
            header.folder_count,
            header.file_count,
            block_length
        );

        let mut folders =
            Vec::with_capacity((header.folder_count as usize).min(MAX_PREALLOCATED_RECORDS));
        for _ in 0..header.folder_count {
            let mut folder = FolderEntry::read_options(reader, endian, (layout,))?;
            folder.name = read_name(reader, block_length, folder.name_offset)?;
            verify_name_checksum(EntryKind::Folder, &folder.name, folder.name_checksum)?;
            folders.push(folder);
        }

        let mut files =
            Vec::with_capacity((header.file_count as usize).min(MAX_PREALLOCATED_RECORDS));
        for _ in 0..header.file_count {
            let mut file = FileEntry::read_options(reader, endian, (layout,))?;
            file.name = read_name(reader, block_length, file.name_offset)?;
            verify_name_checksum(EntryKind::File, &file.name, file.name_checksum)?;
            files.push(file);
        }

        Ok(Self {
            endianness: header.endianness,
            version: header.version,
            folders,
            files,
            unknown: header.unknown,
        })
    }

    /// Build the name block in depth-first grouping
    ///
    /// Each folder's name is followed by the names of the files it directly
    /// contains. The root contributes no bytes.
    pub fn name_block(&self) -> (NameBlock, HashMap<NameOwner, u64>) {
        let mut files_by_folder: Vec<Vec<usize>> = vec![Vec::new(); self.folders.len()];
        let mut orphans = Vec::new();
        for (index, file) in self.files.iter().enumerate() {
            match file
                .parent_folder_id
                .and_then(|id| usize::try_from(id).ok())
                .filter(|&id| id < self.folders.len())
            {
                Some(parent) => files_by_folder[parent].push(index),
                None => orphans.push(index),
            }
        }

        let mut names = Vec::with_capacity(self.folders.len() + self.files.len());
        for (index, folder) in self.folders.iter().enumerate() {
            if !folder.is_root() {
                names.push((NameOwner::Folder(index), folder.name.as_str()));
            }
            for &file in &files_by_folder[index] {
                names.push((NameOwner::File(file), self.files[file].name.as_str()));
            }
        }
        for file in orphans {
            names.push((NameOwner::File(file), self.files[file].name.as_str()));
        }

        NameBlock::build(names)
    }

    /// Header describing this archive
    pub fn header(&self, name_block: &NameBlock) -> Result<ArchiveHeader> {
        Ok(ArchiveHeader {
            endianness: self.endianness,
            version: self.version,
            folder_count: u32::try_from(self.folders.len()).map_err(|_| {
                RmdpError::TooManyEntries {
                    kind: EntryKind::Folder,
                    count: self.folders.len(),
                }
            })?,
            file_count: u32::try_from(self.files.len()).map_err(|_| {
                RmdpError::TooManyEntries {
                    kind: EntryKind::File,
                    count: self.files.len(),
                }
            })?,
            name_block_length: name_block.length_field()?,
            unknown: self.unknown.clone(),
        })
    }

    /// Assign every record the name offset it is written with
    pub fn assign_name_offsets(&mut self) -> NameBlock {
        let (block, offsets) = self.name_block();
        for (index, folder) in self.folders.iter_mut().enumerate() {
            folder.name_offset = offsets.get(&NameOwner::Folder(index)).copied();
        }
        for (index, file) in self.files.iter_mut().enumerate() {
            file.name_offset = offsets.get(&NameOwner::File(index)).copied();
        }
        block
    }

    /// Serialize metadata: header, records, trailer and name block
    ///
    /// Name offsets are recomputed from the record names; the stored
    /// `name_offset` values are not consulted.
    pub fn write_metadata<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let (block, offsets) = self.name_block();
        let header = self.header(&block)?;
        let endian = header.endian();
        let layout = self.version.layout();

        header.write(writer)?;

        for (index, folder) in self.folders.iter().enumerate() {
            let offset = offsets.get(&NameOwner::Folder(index)).copied();
            if folder.name_offset == offset {
                folder.write_options(writer, endian, (layout,))?;
            } else {
                let mut folder = folder.clone();
                folder.name_offset = offset;
                folder.write_options(writer, endian, (layout,))?;
            }
        }

        for (index, file) in self.files.iter().enumerate() {
            let offset = offsets.get(&NameOwner::File(index)).copied();
            if file.name_offset == offset {
                file.write_options(writer, endian, (layout,))?;
            } else {
                let mut file = file.clone();
                file.name_offset = offset;
                file.write_options(writer, endian, (layout,))?;
            }
        }

        writer.write_all(&[0u8; 4])?;
        write_null_ids(writer, endian, layout.id_width, 2)?;
        writer.write_all(&TRAILER_MAGIC)?;
        write_null_ids(writer, endian, layout.id_width, 3)?;

        writer.write_all(block.as_bytes())?;

        debug!(
            "Wrote metadata for {} folders and {} files ({} byte name block)",
            self.folders.len(),
            self.files.len(),
            block.len()
        );

        Ok(())
    }

    /// Serialize metadata to bytes
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_metadata(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Folder record by ID
    pub fn folder(&self, id: u64) -> Result<&FolderEntry> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.folders.get(index))
            .ok_or(RmdpError::InvalidFolderId(id))
    }

    /// Names of the folders from the root (exclusive) down to `id`
    fn folder_names(&self, id: u64) -> Result<Vec<&str>> {
        let mut names = Vec::new();
        let mut current = self.folder(id)?;

        while let Some(parent) = current.parent_folder_id {
            names.push(current.name.as_str());
            if names.len() > self.folders.len() {
                return Err(RmdpError::FolderCycle(id as usize));
            }
            current = self.folder(parent)?;
        }

        names.reverse();
        Ok(names)
    }

    /// Package path of a folder, `/`-separated, empty for the root
    pub fn folder_path(&self, id: u64) -> Result<String> {
        Ok(self.folder_names(id)?.join("/"))
    }

    /// Package path of a file, `/`-separated (e.g. `d:/data/a.txt`)
    pub fn file_path(&self, file: &FileEntry) -> Result<String> {
        let parent = file.parent_folder_id.ok_or_else(|| {
            RmdpError::InvalidLinkage(format!("file {:?} has no parent", file.name))
        })?;
        let folder = self.folder_path(parent)?;
        if folder.is_empty() {
            Ok(file.name.clone())
        } else {
            Ok(format!("{folder}/{}", file.name))
        }
    }

    /// Relative filesystem path of a folder
    ///
    /// The top-level folder name has `:` replaced by `_` so drive-style
    /// names such as `d:` become valid directory names.
    pub fn folder_extraction_path(&self, id: u64) -> Result<PathBuf> {
        let mut path = PathBuf::new();
        for (depth, name) in self.folder_names(id)?.into_iter().enumerate() {
            if depth == 0 {
                path.push(checked_component(&name.replace(':', "_"))?);
            } else {
                path.push(checked_component(name)?);
            }
        }
        Ok(path)
    }

    /// Relative filesystem path of a file
    pub fn file_extraction_path(&self, file: &FileEntry) -> Result<PathBuf> {
        let parent = file.parent_folder_id.ok_or_else(|| {
            RmdpError::InvalidLinkage(format!("file {:?} has no parent", file.name))
        })?;
        let mut path = self.folder_extraction_path(parent)?;
        path.push(checked_component(&file.name)?);
        Ok(path)
    }

    /// Find a file by package path
    ///
    /// Matches case-insensitively and accepts `\` separators.
    pub fn find_file(&self, path: &str) -> Option<&FileEntry> {
        let wanted = path.replace('\\', "/").trim_matches('/').to_lowercase();
        self.files.iter().find(|file| {
            self.file_path(file)
                .map(|candidate| candidate.to_lowercase() == wanted)
                .unwrap_or(false)
        })
    }

    /// Find a file by package path, failing when it does not exist
    pub fn file(&self, path: &str) -> Result<&FileEntry> {
        self.find_file(path)
            .ok_or_else(|| RmdpError::FileNotFound(path.to_string()))
    }

    /// Files directly inside a folder, following the sibling chain
    pub fn files_in(&self, id: u64) -> Result<Vec<&FileEntry>> {
        let mut files = Vec::new();
        let mut next = self.folder(id)?.next_file_id;
        while let Some(file_id) = next {
            let file = self.file_by_id(file_id)?;
            files.push(file);
            if files.len() > self.files.len() {
                return Err(RmdpError::InvalidLinkage(format!(
                    "file chain of folder {id} loops"
                )));
            }
            next = file.next_file_id;
        }
        Ok(files)
    }

    /// Sum of all payload sizes
    pub fn total_payload_size(&self) -> u64 {
        self.files.iter().map(|file| file.size).sum()
    }

    fn file_by_id(&self, id: u64) -> Result<&FileEntry> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.files.get(index))
            .ok_or_else(|| RmdpError::InvalidLinkage(format!("file id {id} out of range")))
    }

    /// Check the structural invariants every package satisfies
    ///
    /// - folder 0 is the only root
    /// - every parent ID is in range and parent chains reach the root
    /// - every name checksum matches its name
    pub fn validate(&self) -> Result<()> {
        match self.folders.first() {
            Some(root) if root.is_root() => {}
            _ => {
                return Err(RmdpError::InvalidLinkage(
                    "folder 0 is not the root".to_string(),
                ));
            }
        }

        for (index, folder) in self.folders.iter().enumerate().skip(1) {
            if folder.is_root() {
                return Err(RmdpError::InvalidLinkage(format!(
                    "folder {index} has no parent"
                )));
            }
            self.folder_names(index as u64)?;
            verify_name_checksum(EntryKind::Folder, &folder.name, folder.name_checksum)?;
        }

        for file in &self.files {
            let parent = file.parent_folder_id.ok_or_else(|| {
                RmdpError::InvalidLinkage(format!("file {:?} has no parent", file.name))
            })?;
            self.folder(parent)?;
            verify_name_checksum(EntryKind::File, &file.name, file.name_checksum)?;
        }

        Ok(())
    }

    /// Check that the link fields describe the folder tree
    ///
    /// Starting at the root, following each folder's first child
    /// (`next_parent_folder_id`), sibling (`next_folder_id`) and first file
    /// (`next_file_id`) links must reach every record exactly once, and each
    /// record reached must name the folder it was reached from as its
    /// parent.
    pub fn validate_linkage(&self) -> Result<()> {
        if self.folders.is_empty() {
            return Err(RmdpError::InvalidLinkage("no root folder".to_string()));
        }

        let mut seen_folders = vec![false; self.folders.len()];
        let mut seen_files = vec![false; self.files.len()];
        let mut pending = vec![0usize];
        seen_folders[0] = true;

        while let Some(parent) = pending.pop() {
            let parent_id = Some(parent as u64);

            let mut next = self.folders[parent].next_file_id;
            while let Some(id) = next {
                let index = checked_index(id, self.files.len(), EntryKind::File)?;
                if std::mem::replace(&mut seen_files[index], true) {
                    return Err(RmdpError::InvalidLinkage(format!(
                        "file {index} is linked more than once"
                    )));
                }
                let file = &self.files[index];
                if file.parent_folder_id != parent_id {
                    return Err(RmdpError::InvalidLinkage(format!(
                        "file {index} is linked from folder {parent} but its parent is {:?}",
                        file.parent_folder_id
                    )));
                }
                next = file.next_file_id;
            }

            let mut next = self.folders[parent].next_parent_folder_id;
            while let Some(id) = next {
                let index = checked_index(id, self.folders.len(), EntryKind::Folder)?;
                if std::mem::replace(&mut seen_folders[index], true) {
                    return Err(RmdpError::InvalidLinkage(format!(
                        "folder {index} is linked more than once"
                    )));
                }
                let folder = &self.folders[index];
                if folder.parent_folder_id != parent_id {
                    return Err(RmdpError::InvalidLinkage(format!(
                        "folder {index} is linked from folder {parent} but its parent is {:?}",
                        folder.parent_folder_id
                    )));
                }
                pending.push(index);
                next = folder.next_folder_id;
            }
        }

        if let Some(index) = seen_folders.iter().position(|seen| !seen) {
            return Err(RmdpError::InvalidLinkage(format!(
                "folder {index} is not reachable from the root"
            )));
        }
        if let Some(index) = seen_files.iter().position(|seen| !seen) {
            return Err(RmdpError::InvalidLinkage(format!(
                "file {index} is not reachable from the root"
            )));
        }

        Ok(())
    }
}

impl crate::NorthlightFormat for Archive {
    fn parse(data: &[u8]) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        Ok(Self::parse(data)?)
    }

    fn build(&self) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error>> {
        Ok(self.build()?)
    }
}

fn verify_name_checksum(kind: EntryKind, name: &str, expected: u32) -> Result<()> {
    let actual = name_checksum(name);
    if actual == expected {
        Ok(())
    } else {
        Err(RmdpError::NameChecksumMismatch {
            kind,
            name: name.to_string(),
            expected,
            actual,
        })
    }
}

fn checked_index(id: u64, len: usize, kind: EntryKind) -> Result<usize> {
    usize::try_from(id)
        .ok()
        .filter(|&index| index < len)
        .ok_or_else(|| RmdpError::InvalidLinkage(format!("{kind} id {id} out of range")))
}

/// Reject names that would escape the extraction directory
fn checked_component(name: &str) -> Result<&str> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        Err(RmdpError::InvalidPath(name.to_string()))
    } else {
        Ok(name)
    }
}

/// Read only the header of a metadata stream, leaving it positioned after
/// the header
pub fn read_header<R: Read + Seek>(reader: &mut R) -> Result<ArchiveHeader> {
    reader.seek(SeekFrom::Start(0))?;
    ArchiveHeader::read(reader)
}
