//! Package versions, byte order tags and per-version record layout

use crate::rmdp::error::{Result, RmdpError};
use binrw::Endian;
use serde::Serialize;

/// Byte order tag stored in the first byte of the metadata file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Little-endian records (tag `0`)
    Little,
    /// Big-endian records (tag `1`)
    Big,
}

impl Endianness {
    /// Parse from the on-disk tag
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Little),
            1 => Some(Self::Big),
            _ => None,
        }
    }

    /// Parse from the on-disk tag, failing on unknown values
    pub fn from_tag(value: u8) -> Result<Self> {
        Self::from_u8(value).ok_or(RmdpError::InvalidEndianness(value))
    }

    /// On-disk tag
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Little => 0,
            Self::Big => 1,
        }
    }

    /// Equivalent `binrw` byte order
    pub const fn endian(self) -> Endian {
        match self {
            Self::Little => Endian::Little,
            Self::Big => Endian::Big,
        }
    }
}

impl std::fmt::Display for Endianness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Little => write!(f, "little"),
            Self::Big => write!(f, "big"),
        }
    }
}

impl std::str::FromStr for Endianness {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "little" | "le" | "0" => Ok(Self::Little),
            "big" | "be" | "1" => Ok(Self::Big),
            other => Err(format!("unknown endianness: {other}")),
        }
    }
}

/// Package versions across Northlight titles
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageVersion {
    /// Version 2 (Alan Wake): 32-bit record IDs
    AlanWake,
    /// Version 7 (Alan Wake's American Nightmare): 64-bit record IDs
    AmericanNightmare,
    /// Version 8 (Quantum Break): 64-bit record IDs, file write times
    QuantumBreak,
    /// Version 9 (Control): same layout as version 8
    Control,
}

/// Width of ID and name offset fields in directory records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdWidth {
    /// 4-byte fields
    Narrow,
    /// 8-byte fields
    Wide,
}

impl IdWidth {
    /// Field size in bytes
    pub const fn size(self) -> usize {
        match self {
            Self::Narrow => 4,
            Self::Wide => 8,
        }
    }

    /// All-ones "no link" value for this width
    pub const fn null_id(self) -> u64 {
        match self {
            Self::Narrow => 0xFFFF_FFFF,
            Self::Wide => 0xFFFF_FFFF_FFFF_FFFF,
        }
    }
}

/// Record layout constants selected by a [`PackageVersion`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatLayout {
    /// ID and name offset width
    pub id_width: IdWidth,
    /// Header carries an 8-byte opaque value before the name block length
    pub has_header_value: bool,
    /// Byte order of the name block length field
    pub name_block_length_endian: Endian,
    /// File records end with a FILETIME write time
    pub has_write_time: bool,
}

impl FormatLayout {
    /// Null-ID sentinel
    pub const fn null_id(&self) -> u64 {
        self.id_width.null_id()
    }

    /// Size of the fixed header in bytes
    pub const fn header_size(&self) -> usize {
        // endianness + version + folder count + file count
        let mut size = 1 + 4 + 4 + 4;
        if self.has_header_value {
            size += 8;
        }
        size + 4 + crate::rmdp::header::HEADER_DATA_SIZE
    }

    /// Size of one folder record in bytes
    pub const fn folder_record_size(&self) -> usize {
        // checksum + flags, five ID-width fields
        4 + 4 + 5 * self.id_width.size()
    }

    /// Size of one file record in bytes
    pub const fn file_record_size(&self) -> usize {
        // checksum + flags + offset + size + data checksum, three ID-width fields
        let mut size = 4 + 4 + 8 + 8 + 4 + 3 * self.id_width.size();
        if self.has_write_time {
            size += 8;
        }
        size
    }

    /// Size of the fixed trailer written between records and the name block
    pub const fn trailer_size(&self) -> usize {
        4 + 4 + 5 * self.id_width.size()
    }
}

impl PackageVersion {
    /// All known versions, oldest first
    pub const ALL: [Self; 4] = [
        Self::AlanWake,
        Self::AmericanNightmare,
        Self::QuantumBreak,
        Self::Control,
    ];

    /// Convert to numeric representation
    pub const fn to_u32(self) -> u32 {
        match self {
            Self::AlanWake => 2,
            Self::AmericanNightmare => 7,
            Self::QuantumBreak => 8,
            Self::Control => 9,
        }
    }

    /// Create from numeric representation
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            2 => Some(Self::AlanWake),
            7 => Some(Self::AmericanNightmare),
            8 => Some(Self::QuantumBreak),
            9 => Some(Self::Control),
            _ => None,
        }
    }

    /// Create from numeric representation, failing on unknown values
    pub fn from_tag(value: u32) -> Result<Self> {
        Self::from_u32(value).ok_or(RmdpError::UnsupportedVersion(value))
    }

    /// Record layout for this version
    pub const fn layout(self) -> FormatLayout {
        match self {
            Self::AlanWake => FormatLayout {
                id_width: IdWidth::Narrow,
                has_header_value: false,
                name_block_length_endian: Endian::Big,
                has_write_time: false,
            },
            Self::AmericanNightmare => FormatLayout {
                id_width: IdWidth::Wide,
                has_header_value: true,
                name_block_length_endian: Endian::Little,
                has_write_time: false,
            },
            Self::QuantumBreak | Self::Control => FormatLayout {
                id_width: IdWidth::Wide,
                has_header_value: true,
                name_block_length_endian: Endian::Little,
                has_write_time: true,
            },
        }
    }

    /// Width of ID fields
    pub const fn id_width(self) -> IdWidth {
        self.layout().id_width
    }

    /// Null-ID sentinel
    pub const fn null_id(self) -> u64 {
        self.id_width().null_id()
    }

    /// Whether file records carry a write time
    pub const fn has_write_time(self) -> bool {
        self.layout().has_write_time
    }

    /// Default endianness used by the titles shipping this version
    pub const fn default_endianness(self) -> Endianness {
        match self {
            Self::AlanWake => Endianness::Big,
            _ => Endianness::Little,
        }
    }
}

impl std::fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlanWake => write!(f, "2 (Alan Wake)"),
            Self::AmericanNightmare => write!(f, "7 (Alan Wake's American Nightmare)"),
            Self::QuantumBreak => write!(f, "8 (Quantum Break)"),
            Self::Control => write!(f, "9 (Control)"),
        }
    }
}

impl std::str::FromStr for PackageVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "2" | "alan_wake" => Ok(Self::AlanWake),
            "7" | "american_nightmare" | "alan_wake_american_nightmare" => {
                Ok(Self::AmericanNightmare)
            }
            "8" | "quantum_break" => Ok(Self::QuantumBreak),
            "9" | "control" => Ok(Self::Control),
            other => Err(format!("unknown package version: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_conversion() {
        for version in PackageVersion::ALL {
            let restored =
                PackageVersion::from_u32(version.to_u32()).expect("Test operation should succeed");
            assert_eq!(version, restored);
        }

        assert_eq!(PackageVersion::from_u32(0), None);
        assert_eq!(PackageVersion::from_u32(99), None);
        assert!(matches!(
            PackageVersion::from_tag(99),
            Err(RmdpError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_layout_widths() {
        let narrow = PackageVersion::AlanWake.layout();
        assert_eq!(narrow.id_width.size(), 4);
        assert_eq!(narrow.null_id(), 0xFFFF_FFFF);
        assert!(!narrow.has_header_value);
        assert_eq!(narrow.name_block_length_endian, Endian::Big);

        for version in [
            PackageVersion::AmericanNightmare,
            PackageVersion::QuantumBreak,
            PackageVersion::Control,
        ] {
            let layout = version.layout();
            assert_eq!(layout.id_width.size(), 8);
            assert_eq!(layout.null_id(), u64::MAX);
            assert!(layout.has_header_value);
            assert_eq!(layout.name_block_length_endian, Endian::Little);
        }
    }

    #[test]
    fn test_write_time_presence() {
        assert!(!PackageVersion::AlanWake.has_write_time());
        assert!(!PackageVersion::AmericanNightmare.has_write_time());
        assert!(PackageVersion::QuantumBreak.has_write_time());
        assert!(PackageVersion::Control.has_write_time());
    }

    #[test]
    fn test_record_sizes() {
        let narrow = PackageVersion::AlanWake.layout();
        assert_eq!(narrow.header_size(), 145);
        assert_eq!(narrow.folder_record_size(), 28);
        assert_eq!(narrow.file_record_size(), 40);

        let wide = PackageVersion::AmericanNightmare.layout();
        assert_eq!(wide.header_size(), 153);
        assert_eq!(wide.folder_record_size(), 48);
        assert_eq!(wide.file_record_size(), 52);

        assert_eq!(PackageVersion::Control.layout().file_record_size(), 60);
    }

    #[test]
    fn test_endianness_tags() {
        assert_eq!(Endianness::from_u8(0), Some(Endianness::Little));
        assert_eq!(Endianness::from_u8(1), Some(Endianness::Big));
        assert_eq!(Endianness::from_u8(2), None);
        assert!(matches!(
            Endianness::from_tag(7),
            Err(RmdpError::InvalidEndianness(7))
        ));
    }

    #[test]
    fn test_from_str() {
        assert_eq!("control".parse(), Ok(PackageVersion::Control));
        assert_eq!("8".parse(), Ok(PackageVersion::QuantumBreak));
        assert_eq!(
            "american-nightmare".parse(),
            Ok(PackageVersion::AmericanNightmare)
        );
        assert!("11".parse::<PackageVersion>().is_err());
        assert_eq!("BIG".parse(), Ok(Endianness::Big));
    }
}
