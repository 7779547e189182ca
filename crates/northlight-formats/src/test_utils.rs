//! Shared fixtures for format tests

use crate::NorthlightFormat;
use crate::rmdp::{Archive, ArchiveBuilder, Endianness, PackageVersion};
use chrono::{TimeZone, Utc};
use std::fmt::Debug;
use std::io::Cursor;

/// Contents of the files in [`sample_package`], by package path
pub const SAMPLE_FILES: [(&str, &[u8]); 2] = [
    ("d:/data/config.txt", b"lang=en"),
    ("d:/data/readme.md", b"# Northlight\n"),
];

/// Small package: `d:/data/config.txt` and `d:/data/readme.md`
///
/// Returns the archive model and its payload blob. Name offsets are left
/// unassigned, as they are before the metadata is built.
pub fn sample_package(version: PackageVersion, endianness: Endianness) -> (Archive, Vec<u8>) {
    let write_time = Utc
        .with_ymd_and_hms(2019, 8, 27, 12, 30, 0)
        .single()
        .expect("Operation should succeed");

    let mut builder = ArchiveBuilder::new(version, endianness);
    let mut payload = Cursor::new(Vec::new());
    builder.add_folder("d_").expect("Operation should succeed");
    builder
        .add_folder("d_/data")
        .expect("Operation should succeed");

    for (path, data) in SAMPLE_FILES {
        let fs_path = path.replacen("d:", "d_", 1);
        builder
            .add_file_from_reader(
                &mut payload,
                &mut &data[..],
                data.len() as u64,
                &fs_path,
                Some(write_time),
            )
            .expect("Operation should succeed");
    }

    (builder.archive().clone(), payload.into_inner())
}

/// Archive model of [`sample_package`]
pub fn sample_archive(version: PackageVersion, endianness: Endianness) -> Archive {
    sample_package(version, endianness).0
}

/// Check that building and re-parsing a value yields the same value
pub fn test_round_trip<T>(original: &T) -> Result<(), Box<dyn std::error::Error>>
where
    T: NorthlightFormat + PartialEq + Debug,
{
    let data = original.build()?;
    let parsed = T::parse(&data)?;

    if original != &parsed {
        return Err(format!(
            "Round-trip verification failed:\nOriginal: {original:?}\nParsed: {parsed:?}"
        )
        .into());
    }

    Ok(())
}
