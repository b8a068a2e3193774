//! Free-text row entry and bulk import.
//!
//! Users type rows like `1000x500x500 10` or paste whole packing lists. This
//! module turns that text into raw row fields for the planner.

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use utoipa::ToSchema;

use crate::planner::RowInput;
use crate::types::{LengthUnit, parse_leading_f64};

/// Number of rows the row editor holds.
pub const MAX_ROWS: usize = 50;

/// Default row colors, assigned by row index.
pub const PASTEL_COLORS: [&str; 12] = [
    "#FFadad", "#FFd6a5", "#Fdffb6", "#Caffbf", "#9bf6ff", "#A0c4ff", "#Bdb2ff", "#Ffc6ff",
    "#eae4e9", "#fff1e6", "#fde2e4", "#fad2e1",
];

/// Default color for the row at `index`.
pub fn default_color(index: usize) -> &'static str {
    PASTEL_COLORS[index % PASTEL_COLORS.len()]
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("No text to parse")]
    EmptyInput,
}

/// Dimension and quantity tokens recognised in a free-text row.
///
/// Values are kept as text, exactly as typed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ParsedDims {
    pub length: String,
    pub width: String,
    pub height: String,
    pub quantity: String,
}

/// Parses a free-text row such as `100x200x300`, `2.1X3X2` or `100 200 300 5`.
///
/// Returns `None` when fewer than three numeric tokens are present.
pub fn parse_free_text(text: &str) -> Option<ParsedDims> {
    let cleaned: String = text
        .trim()
        .chars()
        .map(|c| match c {
            'x' | 'X' | '*' | '×' => ' ',
            other => other,
        })
        .collect();

    let parts: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|token| parse_leading_f64(token).is_some_and(|v| !v.is_nan()))
        .collect();

    if parts.len() < 3 {
        return None;
    }

    let quantity = match parts.get(3).and_then(|raw| parse_leading_f64(raw)) {
        Some(value) => format!("{}", value.floor()),
        None => "1".to_string(),
    };

    Some(ParsedDims {
        length: parts[0].to_string(),
        width: parts[1].to_string(),
        height: parts[2].to_string(),
        quantity,
    })
}

/// One row of the editor as the user sees it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RowDraft {
    pub text: String,
    #[serde(default)]
    pub unit: LengthUnit,
    #[serde(default)]
    pub color: Option<String>,
}

impl RowDraft {
    /// Builds the planner input for this row; unparseable text gives empty fields.
    pub fn to_row_input(&self, index: usize) -> RowInput {
        let parsed = parse_free_text(&self.text);
        let (length_raw, width_raw, height_raw, quantity_raw) = match parsed {
            Some(p) => (p.length, p.width, p.height, p.quantity),
            None => Default::default(),
        };
        RowInput {
            row_id: index.to_string(),
            length_raw,
            width_raw,
            height_raw,
            quantity_raw,
            unit: self.unit,
            color_hex: self
                .color
                .clone()
                .unwrap_or_else(|| default_color(index).to_string()),
        }
    }
}

/// Result of a bulk import.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BulkImport {
    /// Rows in metres, ids `0..`, at most `MAX_ROWS`
    pub rows: Vec<RowInput>,
    /// Original line per row
    pub lines: Vec<String>,
    /// True when more than `MAX_ROWS` lines were supplied
    pub truncated: bool,
}

/// Converts a pasted list into editor rows.
///
/// Every non-blank line becomes a row. Parsed dimensions are converted from
/// `source_unit` to metres with one decimal; lines that do not parse keep empty
/// fields and are skipped later by the planner.
pub fn bulk_import(text: &str, source_unit: LengthUnit) -> Result<BulkImport, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyInput);
    }

    let lines: Vec<&str> = trimmed.lines().filter(|l| !l.trim().is_empty()).collect();
    let truncated = lines.len() > MAX_ROWS;
    let factor = source_unit.metre_factor();

    let mut rows = Vec::with_capacity(lines.len().min(MAX_ROWS));
    let mut kept_lines = Vec::with_capacity(rows.capacity());
    for (idx, line) in lines.iter().take(MAX_ROWS).enumerate() {
        let line = line.trim();
        let mut row = RowInput {
            row_id: idx.to_string(),
            unit: source_unit,
            color_hex: default_color(idx).to_string(),
            ..Default::default()
        };

        if let Some(parsed) = parse_free_text(line) {
            let to_metres = |raw: &str| {
                parse_leading_f64(raw).map(|value| format!("{:.1}", value * factor))
            };
            match (
                to_metres(&parsed.length),
                to_metres(&parsed.width),
                to_metres(&parsed.height),
            ) {
                (Some(length), Some(width), Some(height)) => {
                    row.length_raw = length;
                    row.width_raw = width;
                    row.height_raw = height;
                    row.unit = LengthUnit::M;
                }
                _ => {
                    row.length_raw = parsed.length;
                    row.width_raw = parsed.width;
                    row.height_raw = parsed.height;
                }
            }
            row.quantity_raw = parsed.quantity;
        }

        rows.push(row);
        kept_lines.push(line.to_string());
    }

    tracing::debug!(rows = rows.len(), truncated, "bulk import parsed");
    Ok(BulkImport {
        rows,
        lines: kept_lines,
        truncated,
    })
}
