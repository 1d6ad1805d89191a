use std::collections::HashSet;

use scraper::{Html, Selector};

use crate::error::{Result, VtopError};

/// Column name used when a period label is prepended to calendar records.
pub const PERIOD_COLUMN: &str = "Month";

/// An extracted table: one header row plus data rows in source order, every
/// row the same width as the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Strips every line and drops blank ones, preserving the order of what
/// remains. A textual pre-pass only; no tag structure is interpreted.
/// Idempotent: normalizing normalized text is a no-op.
pub fn normalize(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses an HTML table fragment into a [`Table`].
///
/// The first parsed row is the header. Header names must be unique, and
/// every data row must match the header's cell count; ragged rows fail
/// rather than being truncated or padded. With a `period_label`, a constant
/// [`PERIOD_COLUMN`] is prepended to the header and every row.
pub fn parse_table(html: &str, period_label: Option<&str>) -> Result<Table> {
    // Static selectors, same pattern as the other page parsers.
    let row_selector = Selector::parse("tr").unwrap();
    let cell_selector = Selector::parse("th, td").unwrap();

    // The extracted markup is a table's inner HTML; without the wrapper
    // the HTML5 parser would unwrap bare `tr`/`td` tags entirely.
    let fragment = Html::parse_document(&format!("<table>{html}</table>"));
    let mut parsed: Vec<Vec<String>> = Vec::new();
    for row in fragment.select(&row_selector) {
        let cells = row
            .select(&cell_selector)
            .map(|cell| {
                cell.text()
                    .collect::<String>()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<String>>();
        parsed.push(cells);
    }

    if parsed.is_empty() {
        return Err(VtopError::EmptyTable);
    }

    let headers = parsed.remove(0);
    let mut seen = HashSet::new();
    for header in &headers {
        if !seen.insert(header.as_str()) {
            return Err(VtopError::DuplicateColumn(header.clone()));
        }
    }

    for (index, row) in parsed.iter().enumerate() {
        if row.len() != headers.len() {
            return Err(VtopError::RowShapeMismatch {
                // 1-based, counting the header as row 1.
                row: index + 2,
                expected: headers.len(),
                found: row.len(),
            });
        }
    }

    let mut table = Table {
        headers,
        rows: parsed,
    };
    if let Some(label) = period_label {
        table.headers.insert(0, PERIOD_COLUMN.to_string());
        for row in &mut table.rows {
            row.insert(0, label.to_string());
        }
    }
    Ok(table)
}
