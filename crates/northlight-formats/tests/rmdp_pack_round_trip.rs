//! Integration tests packing real directory trees and reading them back
//!
//! Every test builds its source tree in a temporary directory, packs it with
//! `pack_directory`, then reads the metadata and payload back from disk.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use chrono::{DateTime, TimeZone, Utc};
use northlight_formats::rmdp::{
    self, Archive, Endianness, ErrorCategory, PackOptions, PackageVersion, RmdpError,
    UnknownHeader, extract_all, pack_directory, read_metadata, verify_payload,
};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;

struct Packed {
    _dir: TempDir,
    source: PathBuf,
    metadata: PathBuf,
    payload: PathBuf,
    archive: Archive,
}

fn write_tree(root: &Path, files: &[(&str, &[u8])], dirs: &[&str]) {
    for dir in dirs {
        fs::create_dir_all(root.join(dir)).unwrap();
    }
    for (path, data) in files {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }
}

fn pack_tree(files: &[(&str, &[u8])], dirs: &[&str], options: &PackOptions) -> Packed {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source = dir.path().join("source");
    fs::create_dir(&source).unwrap();
    write_tree(&source, files, dirs);

    let metadata = dir.path().join("package.bin");
    let payload = dir.path().join("package.rmdp");
    let archive =
        pack_directory(&source, &metadata, &payload, options).expect("Pack should succeed");

    Packed {
        _dir: dir,
        source,
        metadata,
        payload,
        archive,
    }
}

fn open_payload(path: &Path) -> BufReader<File> {
    BufReader::new(File::open(path).expect("Payload should open"))
}

const SAMPLE_TREE: [(&str, &[u8]); 4] = [
    ("d_/data/config.txt", b"lang=en\n"),
    ("d_/data/maps/level01.map", b"\x00\x01\x02\x03\x04\x05"),
    ("d_/readme.md", b"# Package\n"),
    ("d_/data/empty.bin", b""),
];

#[test]
fn drive_folder_scenario() {
    let packed = pack_tree(
        &[("C_/docs/a.txt", b"hi")],
        &[],
        &PackOptions::new(PackageVersion::Control),
    );

    let archive = read_metadata(&packed.metadata).expect("Read should succeed");
    assert_eq!(archive, packed.archive);
    assert_eq!(archive.files.len(), 1);

    let file = &archive.files[0];
    assert_eq!(file.size, 2);
    assert_eq!(file.data_checksum, crc32fast::hash(b"hi"));
    assert_eq!(archive.file_path(file).unwrap(), "C:/docs/a.txt");
    assert_eq!(
        archive.file_extraction_path(file).unwrap(),
        Path::new("C_").join("docs").join("a.txt")
    );

    let output = tempfile::tempdir().unwrap();
    let summary = extract_all(&archive, &mut open_payload(&packed.payload), output.path())
        .expect("Extract should succeed");
    assert_eq!(summary.files, 1);
    assert_eq!(summary.folders, 2);
    assert_eq!(
        fs::read(output.path().join("C_/docs/a.txt")).unwrap(),
        b"hi"
    );
}

#[test]
fn every_version_and_byte_order_round_trips() {
    for version in PackageVersion::ALL {
        for endianness in [Endianness::Little, Endianness::Big] {
            let options = PackOptions {
                endianness,
                ..PackOptions::new(version)
            };
            let packed = pack_tree(&SAMPLE_TREE, &["d_/data/unused"], &options);

            let archive = read_metadata(&packed.metadata).expect("Read should succeed");
            assert_eq!(archive.version, version);
            assert_eq!(archive.endianness, endianness);
            archive.validate().expect("Validation should succeed");
            archive.validate_linkage().expect("Linkage should be a tree");

            let output = tempfile::tempdir().unwrap();
            extract_all(&archive, &mut open_payload(&packed.payload), output.path())
                .expect("Extract should succeed");

            for (path, data) in SAMPLE_TREE {
                assert_eq!(
                    fs::read(output.path().join(path)).unwrap(),
                    data,
                    "{path} differs for version {version}, {endianness} endian"
                );
            }
            assert!(output.path().join("d_/data/unused").is_dir());
        }
    }
}

#[test]
fn repacking_extracted_tree_is_identical() {
    let options = PackOptions::new(PackageVersion::AlanWake);
    let packed = pack_tree(&SAMPLE_TREE, &[], &options);

    let output = tempfile::tempdir().unwrap();
    extract_all(
        &packed.archive,
        &mut open_payload(&packed.payload),
        output.path(),
    )
    .expect("Extract should succeed");

    let scratch = tempfile::tempdir().unwrap();
    let repacked_bin = scratch.path().join("repacked.bin");
    let repacked_rmdp = scratch.path().join("repacked.rmdp");
    pack_directory(output.path(), &repacked_bin, &repacked_rmdp, &options)
        .expect("Repack should succeed");

    assert_eq!(
        fs::read(&packed.metadata).unwrap(),
        fs::read(&repacked_bin).unwrap()
    );
    assert_eq!(
        fs::read(&packed.payload).unwrap(),
        fs::read(&repacked_rmdp).unwrap()
    );
}

#[test]
fn unknown_version_is_rejected_before_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.bin");
    let mut data = vec![0u8];
    data.extend_from_slice(&99u32.to_le_bytes());
    data.extend_from_slice(&[0xEE; 64]);
    fs::write(&path, data).unwrap();

    let err = read_metadata(&path).expect_err("Version 99 should be rejected");
    assert!(matches!(err, RmdpError::UnsupportedVersion(99)));
    assert_eq!(err.category(), ErrorCategory::Format);
}

#[test]
fn sibling_folders_are_linked() {
    let packed = pack_tree(
        &[("a/one.txt", b"1"), ("a/two.txt", b"2")],
        &["b"],
        &PackOptions::new(PackageVersion::QuantumBreak),
    );
    let archive = read_metadata(&packed.metadata).unwrap();

    assert_eq!(archive.folders.len(), 3);
    assert_eq!(archive.folders[1].name, "a");
    assert_eq!(archive.folders[2].name, "b");

    // The parent links its first child through next_parent_folder_id and
    // later siblings hang off next_folder_id, so folder 1 reaches folder 2
    // as a sibling and has no child group of its own. Packers that store
    // "next record" in next_parent_folder_id would put Some(2) there.
    assert_eq!(archive.folders[0].next_parent_folder_id, Some(1));
    assert_eq!(archive.folders[1].next_folder_id, Some(2));
    assert_eq!(archive.folders[1].next_parent_folder_id, None);
    assert_eq!(archive.folders[2].next_folder_id, None);

    assert_eq!(archive.folders[1].next_file_id, Some(0));
    assert_eq!(archive.files[0].next_file_id, Some(1));
    assert_eq!(archive.files[1].next_file_id, None);

    let chain: Vec<_> = archive
        .files_in(1)
        .unwrap()
        .into_iter()
        .map(|file| file.name.as_str())
        .collect();
    assert_eq!(chain, ["one.txt", "two.txt"]);
}

#[test]
fn corrupted_name_byte_is_detected() {
    let packed = pack_tree(
        &[("d_/data/config.txt", b"x")],
        &[],
        &PackOptions::new(PackageVersion::Control),
    );

    let mut data = fs::read(&packed.metadata).unwrap();
    // Name block ends with "config.txt\0"
    let index = data.len() - 3;
    assert_eq!(data[index], b'x');
    data[index] = b'y';
    fs::write(&packed.metadata, data).unwrap();

    let err = read_metadata(&packed.metadata).expect_err("Corruption should be detected");
    assert!(matches!(err, RmdpError::NameChecksumMismatch { .. }));
    assert_eq!(err.category(), ErrorCategory::Corruption);
}

#[test]
fn truncated_payload_is_detected() {
    let packed = pack_tree(
        &[("d_/a.bin", b"0123456789"), ("d_/b.bin", b"abcdefghij")],
        &[],
        &PackOptions::new(PackageVersion::Control),
    );

    let blob = fs::read(&packed.payload).unwrap();
    fs::write(&packed.payload, &blob[..blob.len() - 4]).unwrap();

    let archive = read_metadata(&packed.metadata).unwrap();
    let mut payload = open_payload(&packed.payload);
    verify_payload(&mut payload, &archive.files[0]).expect("First file is intact");

    let err = verify_payload(&mut payload, &archive.files[1]).expect_err("Should be truncated");
    assert!(matches!(
        err,
        RmdpError::TruncatedPayload {
            expected: 10,
            actual: 6,
            ..
        }
    ));
    assert_eq!(err.category(), ErrorCategory::Integrity);
}

#[test]
fn id_width_follows_version() {
    for (version, width) in [
        (PackageVersion::AlanWake, 4usize),
        (PackageVersion::AmericanNightmare, 8),
        (PackageVersion::Control, 8),
    ] {
        let packed = pack_tree(&[("d_/a.txt", b"a")], &[], &PackOptions::new(version));
        let data = fs::read(&packed.metadata).unwrap();
        let layout = version.layout();

        assert_eq!(layout.id_width.size(), width);
        assert_eq!(layout.folder_record_size(), 8 + 5 * width);

        let names = b"d:\0a.txt\0".len();
        let expected = layout.header_size()
            + 2 * layout.folder_record_size()
            + layout.file_record_size()
            + layout.trailer_size()
            + names;
        assert_eq!(data.len(), expected);

        // Root parent is the null sentinel, the top-level folder's is 0
        let root = layout.header_size();
        let parent = root + 4 + width;
        assert!(data[parent..parent + width].iter().all(|&b| b == 0xFF));

        let folder = root + layout.folder_record_size();
        let parent = folder + 4 + width;
        assert!(data[parent..parent + width].iter().all(|&b| b == 0));
    }
}

#[test]
fn write_time_only_in_newest_versions() {
    let time: DateTime<Utc> = Utc.timestamp_opt(1_577_934_245, 123_456_700).unwrap();

    for version in PackageVersion::ALL {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        write_tree(&source, &[("d_/a.txt", b"a")], &[]);
        File::options()
            .write(true)
            .open(source.join("d_/a.txt"))
            .unwrap()
            .set_modified(SystemTime::from(time))
            .unwrap();

        let metadata = dir.path().join("p.bin");
        let payload = dir.path().join("p.rmdp");
        pack_directory(&source, &metadata, &payload, &PackOptions::new(version)).unwrap();

        let archive = read_metadata(&metadata).unwrap();
        let write_time = archive.files[0].write_time;
        if version.has_write_time() {
            assert_eq!(write_time, Some(time), "version {version}");

            let output = dir.path().join("out");
            extract_all(&archive, &mut open_payload(&payload), &output).unwrap();
            let modified = fs::metadata(output.join("d_/a.txt"))
                .unwrap()
                .modified()
                .unwrap();
            assert_eq!(DateTime::<Utc>::from(modified), time);
        } else {
            assert_eq!(write_time, None, "version {version}");
        }
    }
}

#[test]
fn header_template_and_excludes() {
    let mut unknown = UnknownHeader::for_version(PackageVersion::Control);
    unknown.header_value = Some(7);
    unknown.header_data = [0x42; rmdp::header::HEADER_DATA_SIZE];

    let options = PackOptions {
        unknown_header: Some(unknown.clone()),
        exclude: vec![PathBuf::from("unknown.json")],
        ..PackOptions::new(PackageVersion::Control)
    };
    let packed = pack_tree(
        &[("unknown.json", b"{}"), ("d_/a.txt", b"a")],
        &[],
        &options,
    );
    assert!(packed.source.join("unknown.json").exists());

    let archive = read_metadata(&packed.metadata).unwrap();
    assert_eq!(archive.unknown, unknown);
    assert_eq!(archive.files.len(), 1);
    assert!(archive.find_file("unknown.json").is_none());
}

#[test]
fn missing_source_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = pack_directory(
        &dir.path().join("missing"),
        &dir.path().join("p.bin"),
        &dir.path().join("p.rmdp"),
        &PackOptions::default(),
    );
    let err = result.expect_err("Packing a missing directory should fail");
    assert_eq!(err.category(), ErrorCategory::Io);
}
