//! Name block: the NUL-terminated string table at the end of the metadata file
//!
//! Records refer to their names by byte offset into this block. The block
//! has no header of its own; readers find it by subtracting the declared
//! block length from the end of the metadata file.

use crate::rmdp::error::{Result, RmdpError};
use std::collections::HashMap;
use std::hash::Hash;
use std::io::{Read, Seek, SeekFrom};

const READ_CHUNK: usize = 64;

/// Owner of a name in the name block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameOwner {
    /// Folder record at the given index
    Folder(usize),
    /// File record at the given index
    File(usize),
}

/// Read a single name from the name block of a metadata stream
///
/// `offset` is relative to the start of the block, which itself starts
/// `block_length` bytes before the end of the stream. The stream position is
/// restored before returning. `None` (the null sentinel) yields an empty
/// name without touching the stream.
pub fn read_name<R: Read + Seek>(
    reader: &mut R,
    block_length: u32,
    offset: Option<u64>,
) -> Result<String> {
    let Some(offset) = offset else {
        return Ok(String::new());
    };

    if offset >= u64::from(block_length) {
        return Err(RmdpError::InvalidNameOffset {
            offset,
            length: block_length,
        });
    }

    let start_pos = reader.stream_position()?;
    let distance_from_end = i64::from(block_length) - offset as i64;
    reader.seek(SeekFrom::End(-distance_from_end))?;

    let mut bytes = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    let mut remaining = distance_from_end as usize;
    let terminated = loop {
        if remaining == 0 {
            break false;
        }
        let want = remaining.min(READ_CHUNK);
        let read = reader.read(&mut chunk[..want])?;
        if read == 0 {
            break false;
        }
        remaining -= read;
        if let Some(end) = chunk[..read].iter().position(|&b| b == 0) {
            bytes.extend_from_slice(&chunk[..end]);
            break true;
        }
        bytes.extend_from_slice(&chunk[..read]);
    };

    reader.seek(SeekFrom::Start(start_pos))?;

    if !terminated {
        return Err(RmdpError::UnterminatedName { offset });
    }

    String::from_utf8(bytes).map_err(|source| RmdpError::InvalidName { offset, source })
}

/// In-memory name block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameBlock {
    data: Vec<u8>,
}

impl NameBlock {
    /// Wrap raw name block bytes
    pub fn parse(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    /// Build a name block from names in insertion order
    ///
    /// Empty names (the root folder) are not written and get no offset, so
    /// their owners keep the null sentinel. Every other owner is mapped to
    /// the offset its name starts at.
    pub fn build<'a, K, I>(names: I) -> (Self, HashMap<K, u64>)
    where
        K: Copy + Eq + Hash,
        I: IntoIterator<Item = (K, &'a str)>,
    {
        let mut data = Vec::new();
        let mut offsets = HashMap::new();

        for (owner, name) in names {
            if name.is_empty() {
                continue;
            }
            offsets.insert(owner, data.len() as u64);
            data.extend_from_slice(name.as_bytes());
            data.push(0);
        }

        (Self { data }, offsets)
    }

    /// Look up the name starting at `offset`
    pub fn name_at(&self, offset: u64) -> Result<String> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start < self.data.len())
            .ok_or(RmdpError::InvalidNameOffset {
                offset,
                length: self.len_u32(),
            })?;

        let tail = &self.data[start..];
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(RmdpError::UnterminatedName { offset })?;

        String::from_utf8(tail[..end].to_vec())
            .map_err(|source| RmdpError::InvalidName { offset, source })
    }

    /// Raw block bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Block length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the block holds no names
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Block length as written to the header
    pub fn length_field(&self) -> Result<u32> {
        u32::try_from(self.data.len()).map_err(|_| RmdpError::NameBlockTooLarge(self.data.len()))
    }

    fn len_u32(&self) -> u32 {
        u32::try_from(self.data.len()).unwrap_or(u32::MAX)
    }
}
