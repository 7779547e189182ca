//! Folder and file directory records
//!
//! Records form two flat arrays linked by index. A link field holding the
//! version's all-ones sentinel means "no link" and decodes to `None`.
//!
//! Folder record:
//!
//! | Field | Size |
//! |-------|------|
//! | name checksum | 4 |
//! | next folder id | id width |
//! | parent folder id | id width |
//! | flags | 4 |
//! | name offset | id width |
//! | next parent folder id | id width |
//! | next file id | id width |
//!
//! File record:
//!
//! | Field | Size |
//! |-------|------|
//! | name checksum | 4 |
//! | next file id | id width |
//! | parent folder id | id width |
//! | flags | 4 |
//! | name offset | id width |
//! | payload offset | 8 |
//! | payload size | 8 |
//! | data checksum | 4, always little-endian |
//! | write time | 8, versions 8 and 9 only |
//!
//! Names are not part of the records; they are resolved separately through
//! the name block.

use crate::rmdp::checksum::name_checksum;
use crate::rmdp::error::RmdpError;
use crate::rmdp::filetime::{datetime_to_filetime, filetime_to_datetime};
use crate::rmdp::version::{FormatLayout, IdWidth};
use binrw::io::{Read, Seek, Write};
use binrw::{BinRead, BinReaderExt, BinResult, BinWrite, BinWriterExt, Endian};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Read an ID-width field, mapping the null sentinel to `None`
fn read_id<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    width: IdWidth,
) -> BinResult<Option<u64>> {
    let value = match width {
        IdWidth::Narrow => u64::from(reader.read_type::<u32>(endian)?),
        IdWidth::Wide => reader.read_type::<u64>(endian)?,
    };
    Ok((value != width.null_id()).then_some(value))
}

/// Write an ID-width field, mapping `None` to the null sentinel
fn write_id<W: Write + Seek>(
    writer: &mut W,
    endian: Endian,
    width: IdWidth,
    value: Option<u64>,
) -> BinResult<()> {
    let raw = value.unwrap_or_else(|| width.null_id());
    match width {
        IdWidth::Narrow => {
            let narrow = u32::try_from(raw).map_err(|_| binrw::Error::AssertFail {
                pos: writer.stream_position().unwrap_or(0),
                message: format!("ID {raw:#x} does not fit a 32-bit record field"),
            })?;
            writer.write_type(&narrow, endian)
        }
        IdWidth::Wide => writer.write_type(&raw, endian),
    }
}

/// Write `count` null-sentinel ID fields
pub(crate) fn write_null_ids<W: Write + Seek>(
    writer: &mut W,
    endian: Endian,
    width: IdWidth,
    count: usize,
) -> BinResult<()> {
    for _ in 0..count {
        write_id(writer, endian, width, None)?;
    }
    Ok(())
}

/// Folder directory record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderEntry {
    /// Folder name, empty for the root
    pub name: String,
    /// CRC-32 of the lowercased name
    pub name_checksum: u32,
    /// Opaque flags
    pub flags: u32,
    /// Offset of the name in the name block, `None` for the root
    pub name_offset: Option<u64>,
    /// Parent folder index, `None` only for the root
    pub parent_folder_id: Option<u64>,
    /// Next sibling folder
    pub next_folder_id: Option<u64>,
    /// Next folder group; packers write the first child folder here
    pub next_parent_folder_id: Option<u64>,
    /// First file inside this folder
    pub next_file_id: Option<u64>,
}

impl FolderEntry {
    /// Root folder with every link unset
    pub fn root() -> Self {
        Self {
            name: String::new(),
            name_checksum: name_checksum(""),
            flags: 0,
            name_offset: None,
            parent_folder_id: None,
            next_folder_id: None,
            next_parent_folder_id: None,
            next_file_id: None,
        }
    }

    /// New unlinked folder under `parent`
    pub fn new(name: impl Into<String>, parent: u64) -> Self {
        let name = name.into();
        Self {
            name_checksum: name_checksum(&name),
            name,
            flags: 0,
            name_offset: None,
            parent_folder_id: Some(parent),
            next_folder_id: None,
            next_parent_folder_id: None,
            next_file_id: None,
        }
    }

    /// Whether this is the root folder
    pub const fn is_root(&self) -> bool {
        self.parent_folder_id.is_none()
    }
}

impl BinRead for FolderEntry {
    type Args<'a> = (FormatLayout,);

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        (layout,): Self::Args<'_>,
    ) -> BinResult<Self> {
        let width = layout.id_width;

        let name_checksum = reader.read_type::<u32>(endian)?;
        let next_folder_id = read_id(reader, endian, width)?;
        let parent_folder_id = read_id(reader, endian, width)?;
        let flags = reader.read_type::<u32>(endian)?;
        let name_offset = read_id(reader, endian, width)?;
        let next_parent_folder_id = read_id(reader, endian, width)?;
        let next_file_id = read_id(reader, endian, width)?;

        Ok(Self {
            name: String::new(),
            name_checksum,
            flags,
            name_offset,
            parent_folder_id,
            next_folder_id,
            next_parent_folder_id,
            next_file_id,
        })
    }
}

impl BinWrite for FolderEntry {
    type Args<'a> = (FormatLayout,);

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        (layout,): Self::Args<'_>,
    ) -> BinResult<()> {
        let width = layout.id_width;

        writer.write_type(&self.name_checksum, endian)?;
        write_id(writer, endian, width, self.next_folder_id)?;
        write_id(writer, endian, width, self.parent_folder_id)?;
        writer.write_type(&self.flags, endian)?;
        write_id(writer, endian, width, self.name_offset)?;
        write_id(writer, endian, width, self.next_parent_folder_id)?;
        write_id(writer, endian, width, self.next_file_id)?;

        Ok(())
    }
}

/// File directory record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// File name
    pub name: String,
    /// CRC-32 of the lowercased name
    pub name_checksum: u32,
    /// Containing folder index
    pub parent_folder_id: Option<u64>,
    /// Next sibling file in the same folder
    pub next_file_id: Option<u64>,
    /// Opaque flags
    pub flags: u32,
    /// Offset of the name in the name block
    pub name_offset: Option<u64>,
    /// Byte offset of the payload in the data blob
    pub offset: u64,
    /// Payload length in bytes
    pub size: u64,
    /// CRC-32 of the payload
    pub data_checksum: u32,
    /// Last write time (versions 8 and 9)
    pub write_time: Option<DateTime<Utc>>,
}

impl FileEntry {
    /// New unlinked file under `parent`
    pub fn new(name: impl Into<String>, parent: u64) -> Self {
        let name = name.into();
        Self {
            name_checksum: name_checksum(&name),
            name,
            parent_folder_id: Some(parent),
            next_file_id: None,
            flags: 0,
            name_offset: None,
            offset: 0,
            size: 0,
            data_checksum: 0,
            write_time: None,
        }
    }

    /// Byte range of the payload in the data blob
    pub fn payload_range(&self) -> std::ops::Range<u64> {
        self.offset..self.offset.saturating_add(self.size)
    }
}

impl BinRead for FileEntry {
    type Args<'a> = (FormatLayout,);

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        (layout,): Self::Args<'_>,
    ) -> BinResult<Self> {
        let width = layout.id_width;

        let name_checksum = reader.read_type::<u32>(endian)?;
        let next_file_id = read_id(reader, endian, width)?;
        let parent_folder_id = read_id(reader, endian, width)?;
        let flags = reader.read_type::<u32>(endian)?;
        let name_offset = read_id(reader, endian, width)?;
        let offset = reader.read_type::<u64>(endian)?;
        let size = reader.read_type::<u64>(endian)?;
        let data_checksum = reader.read_le::<u32>()?;

        let write_time = if layout.has_write_time {
            let pos = reader.stream_position()?;
            let filetime = reader.read_type::<u64>(endian)?;
            Some(
                filetime_to_datetime(filetime).map_err(|err| binrw::Error::Custom {
                    pos,
                    err: Box::new(err),
                })?,
            )
        } else {
            None
        };

        Ok(Self {
            name: String::new(),
            name_checksum,
            parent_folder_id,
            next_file_id,
            flags,
            name_offset,
            offset,
            size,
            data_checksum,
            write_time,
        })
    }
}

impl BinWrite for FileEntry {
    type Args<'a> = (FormatLayout,);

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        (layout,): Self::Args<'_>,
    ) -> BinResult<()> {
        let width = layout.id_width;

        writer.write_type(&self.name_checksum, endian)?;
        write_id(writer, endian, width, self.next_file_id)?;
        write_id(writer, endian, width, self.parent_folder_id)?;
        writer.write_type(&self.flags, endian)?;
        write_id(writer, endian, width, self.name_offset)?;
        writer.write_type(&self.offset, endian)?;
        writer.write_type(&self.size, endian)?;
        writer.write_le(&self.data_checksum)?;

        if layout.has_write_time {
            let filetime = match self.write_time {
                Some(time) => {
                    let pos = writer.stream_position()?;
                    datetime_to_filetime(time).map_err(|err: RmdpError| {
                        binrw::Error::Custom {
                            pos,
                            err: Box::new(err),
                        }
                    })?
                }
                None => 0,
            };
            writer.write_type(&filetime, endian)?;
        }

        Ok(())
    }
}
