//! Spreadsheet sink.
//!
//! `WorkbookWriter` owns the output workbook: it hands out one `SheetSink`
//! per logical source, enforces unique sheet names, and makes the artifact
//! durable on `finalize`. `SheetSink` owns a single worksheet: header row,
//! per-batch numeric coercion, and an append-only row cursor.
//!
//! Coercion is attempted per batch, not globally: a column written as
//! numbers in one batch may be written as text in a later batch if its data
//! is heterogeneous. This mirrors the exporter this tool descends from and
//! is preserved deliberately rather than unified.

use crate::config::{CellStyle, ExportConfig};
use crate::db::{ColumnInfo, Row, Value};
use crate::error::{ExportError, Result};
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use std::path::PathBuf;
use tracing::debug;

/// Owns the output `.xlsx` artifact for one or more sheets.
pub struct WorkbookWriter {
    workbook: Workbook,
    path: PathBuf,
    sheet_names: Vec<String>,
    attached: usize,
}

impl WorkbookWriter {
    /// Creates a writer bound to `path`. Nothing touches the filesystem
    /// until [`finalize`](Self::finalize).
    pub fn create(path: impl Into<PathBuf>) -> Self {
        Self {
            workbook: Workbook::new(),
            path: path.into(),
            sheet_names: Vec::new(),
            attached: 0,
        }
    }

    /// Starts a new sheet with the given name.
    ///
    /// Sheet names must be unique within the workbook (Excel compares them
    /// case-insensitively).
    pub fn new_sheet(&mut self, name: &str, config: &ExportConfig) -> Result<SheetSink> {
        if self
            .sheet_names
            .iter()
            .any(|n| n.eq_ignore_ascii_case(name))
        {
            return Err(ExportError::spreadsheet(format!(
                "Duplicate sheet name '{name}'"
            )));
        }
        self.sheet_names.push(name.to_string());
        SheetSink::new(name, config)
    }

    /// Attaches a finished (or abandoned mid-export) sheet to the workbook.
    /// Rows already appended to the sheet are retained either way.
    pub fn attach(&mut self, sink: SheetSink) {
        self.workbook.push_worksheet(sink.into_worksheet());
        self.attached += 1;
    }

    /// True once at least one sheet has been attached. An export that failed
    /// before producing a sheet should not finalize: saving an empty
    /// workbook would leave a stray file with a blank default sheet.
    pub fn has_sheets(&self) -> bool {
        self.attached > 0
    }

    /// Saves the workbook. The artifact is only durable once this succeeds.
    pub fn finalize(&mut self) -> Result<PathBuf> {
        debug!(path = %self.path.display(), "Finalizing workbook");
        self.workbook.save(&self.path)?;
        Ok(self.path.clone())
    }
}

/// Append-only sink for one worksheet.
pub struct SheetSink {
    worksheet: Worksheet,
    header_format: Format,
    body_format: Format,
    column_width: f64,
    freeze_header: bool,
    columns: usize,
    next_row: u32,
    header_written: bool,
}

impl SheetSink {
    fn new(name: &str, config: &ExportConfig) -> Result<Self> {
        let mut worksheet = Worksheet::new();
        worksheet.set_name(name)?;

        Ok(Self {
            worksheet,
            header_format: cell_format(&config.header, &config.font_name),
            body_format: cell_format(&config.body, &config.font_name),
            column_width: config.column_width,
            freeze_header: config.freeze_header,
            columns: 0,
            next_row: 0,
            header_written: false,
        })
    }

    /// Writes the header row, fixes column widths, and freezes the first
    /// row. Must be called exactly once, before any data rows.
    pub fn write_header(&mut self, schema: &[ColumnInfo]) -> Result<()> {
        if self.header_written {
            return Err(ExportError::internal("Header already written"));
        }

        for (col, info) in schema.iter().enumerate() {
            self.worksheet
                .write_string_with_format(0, col as u16, &info.name, &self.header_format)?;
            // Fixed width per configuration; content-based sizing is not
            // attempted for very wide or very long results.
            self.worksheet
                .set_column_width(col as u16, self.column_width)?;
        }

        if self.freeze_header {
            self.worksheet.set_freeze_panes(1, 0)?;
        }

        self.columns = schema.len();
        self.next_row = 1;
        self.header_written = true;
        Ok(())
    }

    /// Appends a batch of rows starting at the next unwritten row index.
    /// Rows are never rewritten or reordered once written.
    pub fn append_rows(&mut self, rows: &[Row]) -> Result<()> {
        if !self.header_written {
            return Err(ExportError::internal("Header must be written before rows"));
        }
        if rows.is_empty() {
            return Ok(());
        }

        for row in rows {
            if row.len() != self.columns {
                return Err(ExportError::query(format!(
                    "Row width {} does not match schema width {}",
                    row.len(),
                    self.columns
                )));
            }
        }

        let numeric = numeric_columns(rows, self.columns);

        for (i, row) in rows.iter().enumerate() {
            let r = self.next_row + i as u32;
            for (c, value) in row.iter().enumerate() {
                self.write_cell(r, c as u16, value, numeric[c])?;
            }
        }

        self.next_row += rows.len() as u32;
        Ok(())
    }

    /// Number of data rows appended so far.
    pub fn rows_written(&self) -> u64 {
        if self.header_written {
            (self.next_row - 1) as u64
        } else {
            0
        }
    }

    fn write_cell(&mut self, row: u32, col: u16, value: &Value, numeric_column: bool) -> Result<()> {
        match value {
            // Null, NaN and infinities become empty cells; spreadsheet
            // consumers generally cannot represent the literal tokens.
            Value::Null => {
                self.worksheet.write_blank(row, col, &self.body_format)?;
            }
            _ if numeric_column => {
                let n = value.as_number().unwrap_or(f64::NAN);
                if n.is_finite() {
                    self.worksheet
                        .write_number_with_format(row, col, n, &self.body_format)?;
                } else {
                    self.worksheet.write_blank(row, col, &self.body_format)?;
                }
            }
            Value::Bool(b) => {
                self.worksheet
                    .write_boolean_with_format(row, col, *b, &self.body_format)?;
            }
            Value::Int(i) => {
                self.worksheet
                    .write_number_with_format(row, col, *i as f64, &self.body_format)?;
            }
            Value::Float(f) => {
                if f.is_finite() {
                    self.worksheet
                        .write_number_with_format(row, col, *f, &self.body_format)?;
                } else {
                    self.worksheet.write_blank(row, col, &self.body_format)?;
                }
            }
            Value::String(s) => {
                self.worksheet
                    .write_string_with_format(row, col, s, &self.body_format)?;
            }
        }
        Ok(())
    }

    fn into_worksheet(self) -> Worksheet {
        self.worksheet
    }
}

/// Decides, per column of this batch, whether every value can be written as
/// a number. NULLs pass through (they render as blanks regardless); a single
/// non-numeric value leaves the whole column as text for this batch.
fn numeric_columns(rows: &[Row], columns: usize) -> Vec<bool> {
    (0..columns)
        .map(|c| {
            rows.iter()
                .all(|row| row[c].is_null() || row[c].as_number().is_some())
        })
        .collect()
}

fn cell_format(style: &CellStyle, font_name: &str) -> Format {
    Format::new()
        .set_font_color(style.font_color.as_str())
        .set_font_size(style.font_size)
        .set_background_color(style.background_color.as_str())
        .set_border(FormatBorder::Thin)
        .set_border_color(style.border_color.as_str())
        .set_font_name(font_name)
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("id", "int8"),
            ColumnInfo::new("amount", "text"),
        ]
    }

    #[test]
    fn test_numeric_columns_all_numeric_strings() {
        let rows = vec![
            vec![Value::Int(1), Value::from("10.5")],
            vec![Value::Int(2), Value::from("20")],
        ];
        assert_eq!(numeric_columns(&rows, 2), vec![true, true]);
    }

    #[test]
    fn test_numeric_columns_one_bad_value_defeats_column() {
        let rows = vec![
            vec![Value::Int(1), Value::from("10.5")],
            vec![Value::Int(2), Value::from("n/a")],
        ];
        assert_eq!(numeric_columns(&rows, 2), vec![true, false]);
    }

    #[test]
    fn test_numeric_columns_nulls_pass_through() {
        let rows = vec![
            vec![Value::Null, Value::from("1")],
            vec![Value::Int(2), Value::Null],
        ];
        assert_eq!(numeric_columns(&rows, 2), vec![true, true]);
    }

    #[test]
    fn test_header_then_rows_advances_cursor() {
        let config = ExportConfig::default();
        let mut writer = WorkbookWriter::create("unused.xlsx");
        let mut sink = writer.new_sheet("Data", &config).unwrap();

        sink.write_header(&schema()).unwrap();
        assert_eq!(sink.rows_written(), 0);

        sink.append_rows(&[
            vec![Value::Int(1), Value::from("a")],
            vec![Value::Int(2), Value::from("b")],
        ])
        .unwrap();
        assert_eq!(sink.rows_written(), 2);

        sink.append_rows(&[vec![Value::Int(3), Value::from("c")]])
            .unwrap();
        assert_eq!(sink.rows_written(), 3);
    }

    #[test]
    fn test_rows_before_header_rejected() {
        let config = ExportConfig::default();
        let mut writer = WorkbookWriter::create("unused.xlsx");
        let mut sink = writer.new_sheet("Data", &config).unwrap();

        let err = sink
            .append_rows(&[vec![Value::Int(1), Value::from("a")]])
            .unwrap_err();
        assert!(matches!(err, ExportError::Internal(_)));
    }

    #[test]
    fn test_row_width_mismatch_rejected() {
        let config = ExportConfig::default();
        let mut writer = WorkbookWriter::create("unused.xlsx");
        let mut sink = writer.new_sheet("Data", &config).unwrap();
        sink.write_header(&schema()).unwrap();

        let err = sink.append_rows(&[vec![Value::Int(1)]]).unwrap_err();
        assert!(matches!(err, ExportError::Query(_)));
    }

    #[test]
    fn test_special_values_do_not_panic() {
        let config = ExportConfig::default();
        let mut writer = WorkbookWriter::create("unused.xlsx");
        let mut sink = writer.new_sheet("Data", &config).unwrap();
        sink.write_header(&schema()).unwrap();

        sink.append_rows(&[
            vec![Value::Float(f64::NAN), Value::Null],
            vec![Value::Float(f64::INFINITY), Value::Float(f64::NEG_INFINITY)],
        ])
        .unwrap();
        assert_eq!(sink.rows_written(), 2);
    }

    #[test]
    fn test_duplicate_sheet_name_rejected() {
        let config = ExportConfig::default();
        let mut writer = WorkbookWriter::create("unused.xlsx");
        let sink = writer.new_sheet("Data", &config).unwrap();
        writer.attach(sink);

        // SheetSink holds a Worksheet and has no Debug impl, so destructure.
        let Err(err) = writer.new_sheet("data", &config) else {
            panic!("duplicate sheet name was accepted");
        };
        assert!(err.to_string().contains("Duplicate sheet name"));
    }

    #[test]
    fn test_has_sheets_tracks_attachment() {
        let config = ExportConfig::default();
        let mut writer = WorkbookWriter::create("unused.xlsx");
        assert!(!writer.has_sheets());

        // Reserving a sheet name is not enough; only attach counts.
        let sink = writer.new_sheet("Data", &config).unwrap();
        assert!(!writer.has_sheets());
        writer.attach(sink);
        assert!(writer.has_sheets());
    }

    #[test]
    fn test_finalize_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let config = ExportConfig::default();

        let mut writer = WorkbookWriter::create(&path);
        let mut sink = writer.new_sheet("Data", &config).unwrap();
        sink.write_header(&schema()).unwrap();
        sink.append_rows(&[vec![Value::Int(1), Value::from("a")]])
            .unwrap();
        writer.attach(sink);

        let saved = writer.finalize().unwrap();
        assert_eq!(saved, path);
        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
