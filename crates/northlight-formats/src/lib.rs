//! File format parsers and builders for the Northlight engine
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Intentional for binary operations
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::doc_markdown)] // Format terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
#![allow(clippy::needless_pass_by_value)] // Builder inputs
#![allow(clippy::redundant_closure_for_method_calls)] // Iterator chains
#![allow(clippy::return_self_not_must_use)] // Builder patterns
#![allow(clippy::use_self)] // Type clarity
//! This crate provides symmetric (parser and builder) implementations of the
//! package formats used by Remedy's Northlight engine.
//!
//! # Supported Formats
//!
//! - **RMDP**: package archives (`.bin` metadata + `.rmdp` payload blob)
//!   across the Alan Wake, American Nightmare, Quantum Break and Control
//!   versions
//!
//! # Design Principles
//!
//! - **Symmetric Operations**: Both parsing and building supported
//! - **Streaming Payloads**: File contents are copied through a bounded
//!   buffer, never loaded whole
//! - **Type Safety**: Versions, byte orders and null links are explicit types
//! - **Round-Trip Guarantee**: parse(build(archive)) == archive

#![warn(missing_docs)]

/// RMDP package archives
///
/// Reading, path reconstruction, validation, extraction and packing of
/// Northlight `.bin`/`.rmdp` package pairs.
pub mod rmdp;

// Test utilities module
#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
pub(crate) mod test_utils;

/// Common format trait for parse/build symmetric formats
pub trait NorthlightFormat: Sized {
    /// Parse from bytes
    fn parse(data: &[u8]) -> Result<Self, Box<dyn std::error::Error>>;

    /// Build to bytes
    fn build(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>>;

    /// Verify that parsing and rebuilding reproduces `data`
    fn verify_round_trip(data: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
        let parsed = Self::parse(data)?;
        let rebuilt = parsed.build()?;
        if rebuilt == data {
            Ok(())
        } else {
            Err(format!(
                "Round-trip mismatch: {} bytes in, {} bytes out",
                data.len(),
                rebuilt.len()
            )
            .into())
        }
    }
}
