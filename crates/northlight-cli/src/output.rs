//! Terminal output helpers
//!
//! Tables and colored text for the `text` output format. Colors are off
//! when `NO_COLOR` is set or `--no-color` is passed.

use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, presets};
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::OutputFormat;

/// Style configuration for output formatting
#[derive(Debug, Clone, Copy)]
pub struct OutputStyle {
    /// Whether to use colors in output
    pub use_color: bool,
}

impl Default for OutputStyle {
    fn default() -> Self {
        Self {
            use_color: std::env::var_os("NO_COLOR").is_none(),
        }
    }
}

impl OutputStyle {
    /// Create a new output style
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable colors in output
    #[must_use]
    pub fn no_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

/// Format a key-value pair
pub fn format_key_value(key: &str, value: &str, style: &OutputStyle) -> String {
    if style.use_color {
        format!("{}: {}", key.cyan(), value)
    } else {
        format!("{key}: {value}")
    }
}

/// Format a success message
pub fn format_success(text: &str, style: &OutputStyle) -> String {
    if style.use_color {
        text.green().to_string()
    } else {
        text.to_string()
    }
}

/// Format a warning message
pub fn format_warning(text: &str, style: &OutputStyle) -> String {
    if style.use_color {
        text.yellow().to_string()
    } else {
        text.to_string()
    }
}

/// Format an error message
pub fn format_error(text: &str, style: &OutputStyle) -> String {
    if style.use_color {
        text.red().to_string()
    } else {
        text.to_string()
    }
}

/// Print a section header
pub fn print_section_header(title: &str, style: &OutputStyle) {
    if style.use_color {
        println!("{}", title.bold().bright_blue());
        println!("{}", "═".repeat(title.chars().count()).bright_blue());
    } else {
        println!("{title}");
        println!("{}", "=".repeat(title.chars().count()));
    }
}

/// Create a styled table
pub fn create_table(style: &OutputStyle) -> Table {
    let mut table = Table::new();

    if style.use_color {
        table
            .load_preset(presets::UTF8_FULL)
            .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    } else {
        table.load_preset(presets::ASCII_FULL);
    }

    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(140);

    table
}

/// Style a table header cell
pub fn header_cell(text: &str, style: &OutputStyle) -> Cell {
    let cell = Cell::new(text).add_attribute(Attribute::Bold);
    if style.use_color {
        cell.fg(Color::Cyan)
    } else {
        cell
    }
}

/// Style a regular cell
pub fn regular_cell(text: &str) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Left)
}

/// Style a numeric cell (right-aligned)
pub fn numeric_cell(text: &str) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

/// Style a checksum cell (dimmed)
pub fn hash_cell(text: &str, style: &OutputStyle) -> Cell {
    let cell = Cell::new(text);
    if style.use_color {
        cell.fg(Color::Grey)
    } else {
        cell
    }
}

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

/// Print a value in one of the JSON formats
pub fn print_json<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    let text = match format {
        OutputFormat::JsonPretty => serde_json::to_string_pretty(value)?,
        OutputFormat::Json | OutputFormat::Text => serde_json::to_string(value)?,
    };
    println!("{text}");
    Ok(())
}
