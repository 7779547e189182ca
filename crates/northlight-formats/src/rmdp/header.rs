//! Package metadata header
//!
//! Layout (multi-byte fields use the archive byte order unless noted):
//!
//! | Field | Size | Notes |
//! |-------|------|-------|
//! | endianness | 1 | `0` little, `1` big |
//! | version | 4 | 2, 7, 8 or 9 |
//! | folder count | 4 | |
//! | file count | 4 | |
//! | header value | 8 | versions 7+ only, opaque (`1` in shipped packages) |
//! | name block length | 4 | big-endian for version 2, little-endian otherwise |
//! | header data | 128 | opaque, preserved verbatim |

use crate::rmdp::error::Result;
use crate::rmdp::version::{Endianness, PackageVersion};
use binrw::{BinReaderExt, BinWriterExt, Endian};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::io::{Read, Seek, Write};

/// Size of the opaque header data block
pub const HEADER_DATA_SIZE: usize = 0x80;

/// Header value written by the packer for versions that carry one
pub const DEFAULT_HEADER_VALUE: u64 = 1;

/// Placeholder path stored in the opaque header data of freshly packed archives
pub const DEFAULT_HEADER_PATH: &[u8] = b"d:\\data\\";

/// Opaque header fields not interpreted by the codec
///
/// Serializes with the header data as a hex string so it can be stored next
/// to extracted files and restored when repacking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownHeader {
    /// 8-byte value present in versions 7 and newer
    pub header_value: Option<u64>,
    /// 128 bytes following the name block length
    #[serde(
        serialize_with = "serialize_header_data",
        deserialize_with = "deserialize_header_data"
    )]
    pub header_data: [u8; HEADER_DATA_SIZE],
}

impl UnknownHeader {
    /// Canonical header for a freshly packed archive of `version`
    pub fn for_version(version: PackageVersion) -> Self {
        let mut header_data = [0u8; HEADER_DATA_SIZE];
        header_data[..DEFAULT_HEADER_PATH.len()].copy_from_slice(DEFAULT_HEADER_PATH);

        Self {
            header_value: version
                .layout()
                .has_header_value
                .then_some(DEFAULT_HEADER_VALUE),
            header_data,
        }
    }

    /// Header data up to its first NUL byte, if it is printable text
    pub fn header_text(&self) -> Option<&str> {
        let end = self
            .header_data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(HEADER_DATA_SIZE);
        std::str::from_utf8(&self.header_data[..end])
            .ok()
            .filter(|text| !text.is_empty() && text.chars().all(|c| !c.is_control()))
    }
}

fn serialize_header_data<S: Serializer>(
    data: &[u8; HEADER_DATA_SIZE],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(data))
}

fn deserialize_header_data<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<[u8; HEADER_DATA_SIZE], D::Error> {
    let text = String::deserialize(deserializer)?;
    let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        serde::de::Error::custom(format!(
            "header data must be {HEADER_DATA_SIZE} bytes, got {len}"
        ))
    })
}

/// Decoded metadata header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Byte order of records
    pub endianness: Endianness,
    /// Format version
    pub version: PackageVersion,
    /// Number of folder records
    pub folder_count: u32,
    /// Number of file records
    pub file_count: u32,
    /// Length of the trailing name block
    pub name_block_length: u32,
    /// Opaque fields
    pub unknown: UnknownHeader,
}

impl ArchiveHeader {
    /// Read the header from the start of a metadata stream
    ///
    /// Unknown endianness or version tags fail before anything past the
    /// version field is read.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let endianness = Endianness::from_tag(reader.read_le::<u8>()?)?;
        let endian = endianness.endian();

        let version = PackageVersion::from_tag(reader.read_type::<u32>(endian)?)?;
        let layout = version.layout();

        let folder_count = reader.read_type::<u32>(endian)?;
        let file_count = reader.read_type::<u32>(endian)?;

        let header_value = if layout.has_header_value {
            Some(reader.read_type::<u64>(endian)?)
        } else {
            None
        };
        let name_block_length = reader.read_type::<u32>(layout.name_block_length_endian)?;

        let mut header_data = [0u8; HEADER_DATA_SIZE];
        reader.read_exact(&mut header_data)?;

        Ok(Self {
            endianness,
            version,
            folder_count,
            file_count,
            name_block_length,
            unknown: UnknownHeader {
                header_value,
                header_data,
            },
        })
    }

    /// Write the header
    ///
    /// Versions carrying a header value write [`DEFAULT_HEADER_VALUE`] when
    /// none was preserved.
    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        let endian = self.endianness.endian();
        let layout = self.version.layout();

        writer.write_le(&self.endianness.to_u8())?;
        writer.write_type(&self.version.to_u32(), endian)?;
        writer.write_type(&self.folder_count, endian)?;
        writer.write_type(&self.file_count, endian)?;

        if layout.has_header_value {
            let value = self.unknown.header_value.unwrap_or(DEFAULT_HEADER_VALUE);
            writer.write_type(&value, endian)?;
        }
        writer.write_type(&self.name_block_length, layout.name_block_length_endian)?;
        writer.write_all(&self.unknown.header_data)?;

        Ok(())
    }

    /// Record byte order as a `binrw` endian
    pub const fn endian(&self) -> Endian {
        self.endianness.endian()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::rmdp::error::RmdpError;
    use std::io::Cursor;

    fn sample(version: PackageVersion, endianness: Endianness) -> ArchiveHeader {
        ArchiveHeader {
            endianness,
            version,
            folder_count: 3,
            file_count: 0x0102_0304,
            name_block_length: 0x10,
            unknown: UnknownHeader::for_version(version),
        }
    }

    #[test]
    fn test_narrow_header_layout() {
        let header = sample(PackageVersion::AlanWake, Endianness::Little);
        let mut buffer = Cursor::new(Vec::new());
        header.write(&mut buffer).expect("Operation should succeed");
        let data = buffer.into_inner();

        assert_eq!(data.len(), PackageVersion::AlanWake.layout().header_size());
        assert_eq!(data[0], 0);
        assert_eq!(&data[1..5], &[2, 0, 0, 0]);
        assert_eq!(&data[5..9], &[3, 0, 0, 0]);
        assert_eq!(&data[9..13], &[4, 3, 2, 1]);
        // Name block length is big-endian even in little-endian packages
        assert_eq!(&data[13..17], &[0, 0, 0, 0x10]);
        assert_eq!(&data[17..17 + DEFAULT_HEADER_PATH.len()], DEFAULT_HEADER_PATH);
    }

    #[test]
    fn test_wide_header_layout() {
        let header = sample(PackageVersion::Control, Endianness::Big);
        let mut buffer = Cursor::new(Vec::new());
        header.write(&mut buffer).expect("Operation should succeed");
        let data = buffer.into_inner();

        assert_eq!(data.len(), PackageVersion::Control.layout().header_size());
        assert_eq!(data[0], 1);
        assert_eq!(&data[1..5], &[0, 0, 0, 9]);
        assert_eq!(&data[9..13], &[1, 2, 3, 4]);
        assert_eq!(&data[13..21], &[0, 0, 0, 0, 0, 0, 0, 1]);
        // Name block length is little-endian even in big-endian packages
        assert_eq!(&data[21..25], &[0x10, 0, 0, 0]);
    }

    #[test]
    fn test_header_round_trip() {
        for version in PackageVersion::ALL {
            for endianness in [Endianness::Little, Endianness::Big] {
                let mut header = sample(version, endianness);
                header.unknown.header_data[100] = 0x5A;

                let mut buffer = Cursor::new(Vec::new());
                header.write(&mut buffer).expect("Operation should succeed");
                buffer.set_position(0);

                let parsed = ArchiveHeader::read(&mut buffer).expect("Operation should succeed");
                assert_eq!(parsed, header);
            }
        }
    }

    #[test]
    fn test_unknown_version_rejected() {
        let data = [0u8, 99, 0, 0, 0, 1, 0, 0, 0];
        let result = ArchiveHeader::read(&mut Cursor::new(&data));
        assert!(matches!(result, Err(RmdpError::UnsupportedVersion(99))));
    }

    #[test]
    fn test_unknown_endianness_rejected() {
        let data = [5u8, 2, 0, 0, 0];
        let result = ArchiveHeader::read(&mut Cursor::new(&data));
        assert!(matches!(result, Err(RmdpError::InvalidEndianness(5))));
    }

    #[test]
    fn test_header_text() {
        let unknown = UnknownHeader::for_version(PackageVersion::QuantumBreak);
        assert_eq!(unknown.header_text(), Some("d:\\data\\"));
        assert_eq!(unknown.header_value, Some(1));

        let empty = UnknownHeader {
            header_value: None,
            header_data: [0; HEADER_DATA_SIZE],
        };
        assert_eq!(empty.header_text(), None);
    }

    #[test]
    fn test_unknown_header_json_round_trip() {
        let mut unknown = UnknownHeader::for_version(PackageVersion::Control);
        unknown.header_data[127] = 0xAB;

        let json = serde_json::to_string(&unknown).expect("Operation should succeed");
        assert!(json.contains("\"header_value\":1"));
        assert!(json.contains("643a5c646174615c"));

        let restored: UnknownHeader =
            serde_json::from_str(&json).expect("Operation should succeed");
        assert_eq!(restored, unknown);
    }

    #[test]
    fn test_unknown_header_json_rejects_short_data() {
        let json = r#"{"header_value":null,"header_data":"00ff"}"#;
        assert!(serde_json::from_str::<UnknownHeader>(json).is_err());
    }
}
