//! Northlight command-line library
//!
//! This library provides the command definitions and handlers behind the
//! `northlight` binary.

pub mod commands;
pub mod output;

use clap::Subcommand;
use northlight_formats::rmdp::{Endianness, PackageVersion};
use std::path::PathBuf;

// Re-export command handlers
pub use crate::commands::rmdp::handle as handle_rmdp;

/// Environment variable selecting the default pack version
pub const VERSION_ENV: &str = "NORTHLIGHT_RMDP_VERSION";

/// Environment variable selecting the default pack byte order
pub const ENDIANNESS_ENV: &str = "NORTHLIGHT_RMDP_ENDIANNESS";

#[derive(Subcommand, Debug)]
pub enum RmdpCommands {
    /// Show the package header
    Info {
        /// Package metadata (.bin) or payload (.rmdp) file
        archive: PathBuf,
    },

    /// List files with their sizes and payload offsets
    List {
        /// Package metadata (.bin) or payload (.rmdp) file
        archive: PathBuf,

        /// Only list paths containing this text (case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,

        /// Limit number of results
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Extract files to a directory
    Extract {
        /// Package metadata (.bin) or payload (.rmdp) file
        archive: PathBuf,

        /// Output directory (defaults to the package name next to it)
        output: Option<PathBuf>,

        /// Extract only the file at this package path
        #[arg(long)]
        file: Option<String>,

        /// Do not write the header sidecar used when repacking
        #[arg(long)]
        no_header_file: bool,
    },

    /// Check structure and payload checksums
    Verify {
        /// Package metadata (.bin) or payload (.rmdp) file
        archive: PathBuf,
    },

    /// Pack a directory into a package
    Pack {
        /// Directory to pack
        input: PathBuf,

        /// Output path; `.bin` and `.rmdp` extensions are applied
        output: Option<PathBuf>,

        /// Package version (2, 7, 8, 9 or a title name)
        #[arg(long, env = VERSION_ENV, default_value = "quantum-break")]
        version: PackageVersion,

        /// Byte order (defaults to the one the version's titles use)
        #[arg(long, env = ENDIANNESS_ENV)]
        endianness: Option<Endianness>,

        /// Copy the opaque header fields from an existing package
        #[arg(long)]
        header_from: Option<PathBuf>,
    },
}

/// Output format for command results
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text output
    Text,
    /// JSON output
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

/// Context for command execution
#[derive(Clone, Copy, Debug)]
pub struct CommandContext {
    /// Output format
    pub format: OutputFormat,
    /// Whether to disable colors
    pub no_color: bool,
}
