//! `northlight rmdp` subcommands

use crate::output::{
    OutputStyle, create_table, format_error, format_key_value, format_size, format_success,
    format_warning, hash_cell, header_cell, numeric_cell, print_json, print_section_header,
    regular_cell,
};
use crate::{CommandContext, OutputFormat, RmdpCommands};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use northlight_formats::rmdp::{
    Archive, Endianness, PackOptions, PackageVersion, UnknownHeader, extract_all, extract_file,
    pack_directory, read_header, read_metadata, verify_payload,
};
use serde::Serialize;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Sidecar file holding the opaque header fields of an extracted package
pub const HEADER_SIDECAR: &str = "unknown.json";

pub fn handle(cmd: RmdpCommands, ctx: CommandContext) -> Result<()> {
    let style = if ctx.no_color {
        OutputStyle::new().no_color()
    } else {
        OutputStyle::new()
    };

    match cmd {
        RmdpCommands::Info { archive } => handle_info(&archive, ctx.format, &style),
        RmdpCommands::List {
            archive,
            filter,
            limit,
        } => handle_list(&archive, filter.as_deref(), limit, ctx.format, &style),
        RmdpCommands::Extract {
            archive,
            output,
            file,
            no_header_file,
        } => handle_extract(
            &archive,
            output,
            file.as_deref(),
            !no_header_file,
            ctx.format,
            &style,
        ),
        RmdpCommands::Verify { archive } => handle_verify(&archive, ctx.format, &style),
        RmdpCommands::Pack {
            input,
            output,
            version,
            endianness,
            header_from,
        } => handle_pack(
            &input,
            output,
            version,
            endianness,
            header_from.as_deref(),
            ctx.format,
            &style,
        ),
    }
}

/// Resolve the metadata and payload paths of a package
///
/// `path` may name either half of the pair; both files must exist.
pub fn archive_paths(path: &Path) -> Result<(PathBuf, PathBuf)> {
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase);

    let (metadata, payload) = match extension.as_deref() {
        Some("bin") => (path.to_path_buf(), path.with_extension("rmdp")),
        Some("rmdp") => (path.with_extension("bin"), path.to_path_buf()),
        _ => bail!("{} is not a .bin or .rmdp file", path.display()),
    };

    for file in [&metadata, &payload] {
        if !file.is_file() {
            bail!(
                "{} not found; a package needs both its .bin and .rmdp files",
                file.display()
            );
        }
    }

    debug!(
        "Package files: {} and {}",
        metadata.display(),
        payload.display()
    );
    Ok((metadata, payload))
}

fn load_archive(metadata: &Path) -> Result<Archive> {
    read_metadata(metadata).with_context(|| format!("Failed to read {}", metadata.display()))
}

fn open_payload(payload: &Path) -> Result<BufReader<File>> {
    let file =
        File::open(payload).with_context(|| format!("Failed to open {}", payload.display()))?;
    Ok(BufReader::new(file))
}

#[derive(Serialize)]
struct InfoReport {
    metadata: PathBuf,
    payload: PathBuf,
    endianness: Endianness,
    version: u32,
    title: PackageVersion,
    folders: u32,
    files: u32,
    name_block_length: u32,
    payload_size: u64,
    unknown: UnknownHeader,
}

fn handle_info(archive: &Path, format: OutputFormat, style: &OutputStyle) -> Result<()> {
    let (metadata, payload) = archive_paths(archive)?;

    let mut reader = BufReader::new(
        File::open(&metadata).with_context(|| format!("Failed to open {}", metadata.display()))?,
    );
    let header = read_header(&mut reader)
        .with_context(|| format!("Failed to read header of {}", metadata.display()))?;
    let payload_size = fs::metadata(&payload)?.len();

    let report = InfoReport {
        metadata,
        payload,
        endianness: header.endianness,
        version: header.version.to_u32(),
        title: header.version,
        folders: header.folder_count,
        files: header.file_count,
        name_block_length: header.name_block_length,
        payload_size,
        unknown: header.unknown,
    };

    if format != OutputFormat::Text {
        return print_json(&report, format);
    }

    print_section_header("Package Information", style);
    println!(
        "{}",
        format_key_value("Metadata", &report.metadata.display().to_string(), style)
    );
    println!(
        "{}",
        format_key_value("Payload", &report.payload.display().to_string(), style)
    );
    println!(
        "{}",
        format_key_value("Version", &report.title.to_string(), style)
    );
    println!(
        "{}",
        format_key_value("Endianness", &report.endianness.to_string(), style)
    );
    println!(
        "{}",
        format_key_value("Folders", &report.folders.to_string(), style)
    );
    println!(
        "{}",
        format_key_value("Files", &report.files.to_string(), style)
    );
    println!(
        "{}",
        format_key_value(
            "Name block",
            &format!("{} bytes", report.name_block_length),
            style
        )
    );
    println!(
        "{}",
        format_key_value("Payload size", &format_size(report.payload_size), style)
    );
    if let Some(value) = report.unknown.header_value {
        println!(
            "{}",
            format_key_value("Header value", &value.to_string(), style)
        );
    }
    if let Some(text) = report.unknown.header_text() {
        println!("{}", format_key_value("Header text", text, style));
    }

    Ok(())
}

#[derive(Serialize)]
struct ListEntry {
    path: String,
    size: u64,
    offset: u64,
    data_checksum: u32,
    write_time: Option<DateTime<Utc>>,
}

fn handle_list(
    archive: &Path,
    filter: Option<&str>,
    limit: Option<usize>,
    format: OutputFormat,
    style: &OutputStyle,
) -> Result<()> {
    let (metadata, _) = archive_paths(archive)?;
    let archive = load_archive(&metadata)?;
    let filter = filter.map(str::to_lowercase);

    let mut entries = Vec::new();
    for file in &archive.files {
        let path = archive.file_path(file)?;
        if let Some(filter) = &filter
            && !path.to_lowercase().contains(filter.as_str())
        {
            continue;
        }
        if limit.is_some_and(|limit| entries.len() >= limit) {
            break;
        }
        entries.push(ListEntry {
            path,
            size: file.size,
            offset: file.offset,
            data_checksum: file.data_checksum,
            write_time: file.write_time,
        });
    }

    if format != OutputFormat::Text {
        return print_json(&entries, format);
    }

    let has_write_time = archive.version.has_write_time();
    let mut table = create_table(style);
    let mut header = vec![
        header_cell("Path", style),
        header_cell("Size", style),
        header_cell("Offset", style),
        header_cell("CRC-32", style),
    ];
    if has_write_time {
        header.push(header_cell("Modified", style));
    }
    table.set_header(header);

    for entry in &entries {
        let mut row = vec![
            regular_cell(&entry.path),
            numeric_cell(&entry.size.to_string()),
            numeric_cell(&entry.offset.to_string()),
            hash_cell(&format!("{:08x}", entry.data_checksum), style),
        ];
        if has_write_time {
            let modified = entry
                .write_time
                .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            row.push(regular_cell(&modified));
        }
        table.add_row(row);
    }

    println!("{table}");
    println!(
        "{} of {} files, {}",
        entries.len(),
        archive.files.len(),
        format_size(entries.iter().map(|entry| entry.size).sum())
    );
    Ok(())
}

#[derive(Serialize)]
struct ExtractReport {
    output: PathBuf,
    folders: usize,
    files: usize,
    bytes: u64,
}

fn handle_extract(
    archive: &Path,
    output: Option<PathBuf>,
    only_file: Option<&str>,
    write_sidecar: bool,
    format: OutputFormat,
    style: &OutputStyle,
) -> Result<()> {
    let (metadata, payload) = archive_paths(archive)?;
    let archive = load_archive(&metadata)?;
    let output = output.unwrap_or_else(|| metadata.with_extension(""));
    let mut reader = open_payload(&payload)?;

    let report = if let Some(path) = only_file {
        let file = archive.file(path)?;
        let target = output.join(archive.file_extraction_path(file)?);
        extract_file(&mut reader, file, &target)
            .with_context(|| format!("Failed to extract {path}"))?;
        ExtractReport {
            output: target,
            folders: 0,
            files: 1,
            bytes: file.size,
        }
    } else {
        let summary = extract_all(&archive, &mut reader, &output)
            .with_context(|| format!("Failed to extract into {}", output.display()))?;

        if write_sidecar {
            let sidecar = output.join(HEADER_SIDECAR);
            let json = serde_json::to_string_pretty(&archive.unknown)?;
            fs::write(&sidecar, json)
                .with_context(|| format!("Failed to write {}", sidecar.display()))?;
            debug!("Wrote header sidecar {}", sidecar.display());
        }

        ExtractReport {
            output,
            folders: summary.folders,
            files: summary.files,
            bytes: summary.bytes,
        }
    };

    if format != OutputFormat::Text {
        return print_json(&report, format);
    }

    println!(
        "{}",
        format_success(
            &format!(
                "Extracted {} files ({}) to {}",
                report.files,
                format_size(report.bytes),
                report.output.display()
            ),
            style
        )
    );
    Ok(())
}

#[derive(Serialize)]
struct VerifyFailure {
    path: String,
    error: String,
}

#[derive(Serialize)]
struct VerifyReport {
    files: usize,
    bytes: u64,
    linkage_error: Option<String>,
    failures: Vec<VerifyFailure>,
}

fn handle_verify(archive: &Path, format: OutputFormat, style: &OutputStyle) -> Result<()> {
    let (metadata, payload) = archive_paths(archive)?;
    let archive = load_archive(&metadata)?;
    archive
        .validate()
        .with_context(|| format!("{} is structurally invalid", metadata.display()))?;

    // Packages from other tools may link folders differently
    let linkage_error = archive.validate_linkage().err().map(|err| err.to_string());
    if let Some(err) = &linkage_error {
        warn!("Link fields do not describe the folder tree: {err}");
    }

    let mut reader = open_payload(&payload)?;
    let mut failures = Vec::new();
    for file in &archive.files {
        if let Err(err) = verify_payload(&mut reader, file) {
            failures.push(VerifyFailure {
                path: archive.file_path(file)?,
                error: err.to_string(),
            });
        }
    }

    let report = VerifyReport {
        files: archive.files.len(),
        bytes: archive.total_payload_size(),
        linkage_error,
        failures,
    };

    if format == OutputFormat::Text {
        if let Some(err) = &report.linkage_error {
            println!("{}", format_warning(&format!("Linkage: {err}"), style));
        }
        for failure in &report.failures {
            println!(
                "{}",
                format_error(&format!("{}: {}", failure.path, failure.error), style)
            );
        }
        if report.failures.is_empty() {
            println!(
                "{}",
                format_success(
                    &format!(
                        "All {} files verified ({})",
                        report.files,
                        format_size(report.bytes)
                    ),
                    style
                )
            );
        }
    } else {
        print_json(&report, format)?;
    }

    if !report.failures.is_empty() {
        bail!(
            "{} of {} files failed verification",
            report.failures.len(),
            report.files
        );
    }
    Ok(())
}

/// Opaque header fields for a pack: an explicit template package wins over
/// the sidecar left by `extract`
fn pack_header(input: &Path, header_from: Option<&Path>) -> Result<Option<UnknownHeader>> {
    if let Some(template) = header_from {
        let (metadata, _) = archive_paths(template)?;
        let mut reader = BufReader::new(File::open(&metadata)?);
        let header = read_header(&mut reader)
            .with_context(|| format!("Failed to read header of {}", metadata.display()))?;
        info!("Using header fields from {}", metadata.display());
        return Ok(Some(header.unknown));
    }

    let sidecar = input.join(HEADER_SIDECAR);
    if sidecar.is_file() {
        let file = File::open(&sidecar)?;
        let unknown = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse {}", sidecar.display()))?;
        info!("Using header fields from {}", sidecar.display());
        return Ok(Some(unknown));
    }

    Ok(None)
}

/// Whether `path` would be created somewhere below `dir`
///
/// The file itself may not exist yet, so its parent directory is resolved.
fn is_inside(dir: &Path, path: &Path) -> Result<bool> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", dir.display()))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // A missing parent cannot be inside an existing directory
    Ok(parent
        .canonicalize()
        .is_ok_and(|parent| parent.starts_with(&dir)))
}

#[derive(Serialize)]
struct PackReport {
    metadata: PathBuf,
    payload: PathBuf,
    version: PackageVersion,
    endianness: Endianness,
    folders: usize,
    files: usize,
    bytes: u64,
}

fn handle_pack(
    input: &Path,
    output: Option<PathBuf>,
    version: PackageVersion,
    endianness: Option<Endianness>,
    header_from: Option<&Path>,
    format: OutputFormat,
    style: &OutputStyle,
) -> Result<()> {
    if !input.is_dir() {
        bail!("{} is not a directory", input.display());
    }

    let output = output.unwrap_or_else(|| input.with_extension("bin"));
    let metadata = output.with_extension("bin");
    let payload = output.with_extension("rmdp");
    for path in [&metadata, &payload] {
        if is_inside(input, path)? {
            bail!(
                "{} is inside the input directory {}",
                path.display(),
                input.display()
            );
        }
    }

    let options = PackOptions {
        endianness: endianness.unwrap_or_else(|| version.default_endianness()),
        unknown_header: pack_header(input, header_from)?,
        exclude: vec![PathBuf::from(HEADER_SIDECAR)],
        ..PackOptions::new(version)
    };

    let archive = pack_directory(input, &metadata, &payload, &options)
        .with_context(|| format!("Failed to pack {}", input.display()))?;

    let report = PackReport {
        metadata,
        payload,
        version: archive.version,
        endianness: archive.endianness,
        folders: archive.folders.len(),
        files: archive.files.len(),
        bytes: archive.total_payload_size(),
    };

    if format != OutputFormat::Text {
        return print_json(&report, format);
    }

    println!(
        "{}",
        format_success(
            &format!(
                "Packed {} files ({}) into {} and {}",
                report.files,
                format_size(report.bytes),
                report.metadata.display(),
                report.payload.display()
            ),
            style
        )
    );
    Ok(())
}
