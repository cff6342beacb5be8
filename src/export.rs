//! Writing combined results to files and to the terminal.

use crate::db::{TabularData, Value};
use crate::error::{FanoutError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, Workbook};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Maximum width for any preview column.
const MAX_COLUMN_WIDTH: usize = 40;

/// Minimum width for any preview column.
const MIN_COLUMN_WIDTH: usize = 4;

/// Writes `data` as CSV with a header row. NULL becomes an empty field.
///
/// Returns the number of data rows written.
pub fn to_csv(data: &TabularData, path: &Path) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(data.column_names())?;
    for row in &data.rows {
        writer.write_record(row.iter().map(csv_field))?;
    }
    writer.flush()?;

    info!("Wrote {} rows to {}", data.row_count(), path.display());
    Ok(data.row_count())
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_display_string(),
    }
}

/// Writes `data` as a JSON array with one object per row.
///
/// When two columns share a name, the later one wins in the object.
pub fn to_json(data: &TabularData, path: &Path) -> Result<usize> {
    let records: Vec<serde_json::Value> = data
        .rows
        .iter()
        .map(|row| {
            let object: serde_json::Map<String, serde_json::Value> = data
                .columns
                .iter()
                .zip(row)
                .map(|(column, value)| (column.name.clone(), value.to_json()))
                .collect();
            serde_json::Value::Object(object)
        })
        .collect();

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &records)
        .map_err(|e| FanoutError::export(format!("Failed to serialize results: {e}")))?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    info!("Wrote {} rows to {}", data.row_count(), path.display());
    Ok(data.row_count())
}

/// Rows per worksheet, header included.
const XLSX_MAX_ROWS: usize = 1_048_576;

/// Columns per worksheet.
const XLSX_MAX_COLUMNS: usize = 16_384;

/// Integers beyond this lose precision as Excel numbers and are written as text.
const XLSX_MAX_EXACT_INT: u64 = 1 << 53;

/// Writes `data` to a single-sheet Excel workbook with a bold header row.
///
/// Numbers and booleans keep their cell types; everything else is text and
/// NULL leaves the cell blank.
pub fn to_xlsx(data: &TabularData, path: &Path) -> Result<usize> {
    if data.columns.len() > XLSX_MAX_COLUMNS {
        return Err(FanoutError::export(format!(
            "{} columns exceed the Excel limit of {XLSX_MAX_COLUMNS}",
            data.columns.len()
        )));
    }
    if data.row_count() >= XLSX_MAX_ROWS {
        return Err(FanoutError::export(format!(
            "{} rows exceed the Excel limit of {}",
            data.row_count(),
            XLSX_MAX_ROWS - 1
        )));
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let header = Format::new().set_bold();

    for (col, column) in data.columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, column.name.as_str(), &header)?;
    }
    for (index, row) in data.rows.iter().enumerate() {
        let row_num = index as u32 + 1;
        for (col, value) in row.iter().enumerate() {
            let col = col as u16;
            match value {
                Value::Null => {}
                Value::Bool(b) => {
                    sheet.write_boolean(row_num, col, *b)?;
                }
                Value::Int(i) if i.unsigned_abs() <= XLSX_MAX_EXACT_INT => {
                    sheet.write_number(row_num, col, *i as f64)?;
                }
                Value::Float(f) if f.is_finite() => {
                    sheet.write_number(row_num, col, *f)?;
                }
                Value::Decimal(d) => match d.to_f64() {
                    Some(f) => {
                        sheet.write_number(row_num, col, f)?;
                    }
                    None => {
                        sheet.write_string(row_num, col, d.to_string())?;
                    }
                },
                other => {
                    sheet.write_string(row_num, col, other.to_display_string())?;
                }
            }
        }
    }
    workbook.save(path)?;

    info!("Wrote {} rows to {}", data.row_count(), path.display());
    Ok(data.row_count())
}

/// Renders the first `max_rows` rows as a fixed-width text table.
pub fn preview(data: &TabularData, max_rows: usize) -> String {
    if data.columns.is_empty() {
        return "(empty result)\n".to_string();
    }

    let shown = &data.rows[..data.rows.len().min(max_rows)];
    let widths = column_widths(data, shown);
    let mut out = String::new();

    let header: Vec<String> = data
        .columns
        .iter()
        .zip(&widths)
        .map(|(col, &width)| pad(&truncate(&col.name, width), width))
        .collect();
    out.push_str(header.join(" | ").trim_end());
    out.push('\n');

    let separator: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    out.push_str(&separator.join("-+-"));
    out.push('\n');

    for row in shown {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(value, &width)| pad(&truncate(&value.to_display_string(), width), width))
            .collect();
        out.push_str(cells.join(" | ").trim_end());
        out.push('\n');
    }

    let row_word = if data.row_count() == 1 { "row" } else { "rows" };
    if data.row_count() > shown.len() {
        out.push_str(&format!(
            "({} {row_word}, showing first {})\n",
            data.row_count(),
            shown.len()
        ));
    } else {
        out.push_str(&format!("({} {row_word})\n", data.row_count()));
    }
    out
}

fn column_widths(data: &TabularData, rows: &[Vec<Value>]) -> Vec<usize> {
    let mut widths: Vec<usize> = data
        .columns
        .iter()
        .map(|col| col.name.chars().count().max(MIN_COLUMN_WIDTH))
        .collect();

    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(value.to_display_string().chars().count());
            }
        }
    }

    widths.iter().map(|&w| w.min(MAX_COLUMN_WIDTH)).collect()
}

/// Truncates to `max_width` characters, ending in "..." when cut.
fn truncate(s: &str, max_width: usize) -> String {
    if s.chars().count() <= max_width {
        s.to_string()
    } else if max_width <= 3 {
        s.chars().take(max_width).collect()
    } else {
        let kept: String = s.chars().take(max_width - 3).collect();
        format!("{kept}...")
    }
}

fn pad(s: &str, width: usize) -> String {
    format!("{s:width$}")
}
