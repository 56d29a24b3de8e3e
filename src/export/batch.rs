//! Folder-driven batch exports.
//!
//! Two shapes: every `.sql` file in a folder to its own workbook, or every
//! `.sql` file to one workbook with a sheet per file. Files are processed in
//! case-insensitive name order so runs are reproducible, and a single bad
//! file does not abort the rest of the batch.

use crate::error::{ExportError, Result};
use crate::export::driver::{ExportDriver, ExportOutcome, NamedQuery};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Excel caps sheet names at 31 characters.
const MAX_SHEET_NAME_LEN: usize = 31;

/// Reads a query file, with the path in the error message on failure.
pub fn read_sql_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        ExportError::io(format!("Failed to read query file {}: {e}", path.display()))
    })
}

/// Builds a timestamped output file name for `stem`.
///
/// `FILE_PREFIX` and `FILE_EXTENSION` environment variables override the
/// empty prefix and the `xlsx` extension.
pub fn default_output_name(stem: &str) -> String {
    let prefix = std::env::var("FILE_PREFIX").unwrap_or_default();
    let extension = std::env::var("FILE_EXTENSION").unwrap_or_else(|_| "xlsx".to_string());
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("{prefix}{stem}_{timestamp}.{extension}")
}

/// Derives a legal sheet name from a file stem: characters Excel rejects are
/// dropped and the result is truncated to 31 characters.
fn sheet_name_for(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .filter(|c| !matches!(c, ':' | '\\' | '/' | '?' | '*' | '[' | ']'))
        .collect();
    let cleaned = cleaned.trim().to_string();
    let name = if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned
    };
    name.chars().take(MAX_SHEET_NAME_LEN).collect()
}

/// Lists the `.sql` files in `dir`, sorted case-insensitively by file name.
fn collect_sql_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        ExportError::io(format!("Failed to read directory {}: {e}", dir.display()))
    })?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            ExportError::io(format!("Failed to read directory {}: {e}", dir.display()))
        })?;
        let path = entry.path();
        let is_sql = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("sql"))
            .unwrap_or(false);
        if path.is_file() && is_sql {
            files.push(path);
        }
    }

    files.sort_by_key(|p| {
        p.file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });
    Ok(files)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "query".to_string())
}

/// Exports every `.sql` file in `dir` to its own timestamped workbook under
/// `out_dir`. Failed files are skipped and reported together at the end;
/// successful workbooks are kept either way.
pub async fn export_folder(
    driver: &ExportDriver<'_>,
    dir: &Path,
    out_dir: &Path,
    paged: bool,
    page_size: usize,
) -> Result<Vec<ExportOutcome>> {
    let files = collect_sql_files(dir)?;
    if files.is_empty() {
        return Err(ExportError::query(format!(
            "No .sql files found in {}",
            dir.display()
        )));
    }

    let mut outcomes = Vec::new();
    let mut failures: Vec<String> = Vec::new();

    for file in &files {
        let stem = file_stem(file);
        info!(file = %file.display(), "Exporting query file");

        let run = async {
            let sql = read_sql_file(file)?;
            let out_path = out_dir.join(default_output_name(&stem));
            if paged {
                driver.export_paged(&sql, &out_path, page_size).await
            } else {
                driver.export_streamed(&sql, &out_path).await
            }
        };

        match run.await {
            Ok(outcome) => {
                info!("{}", outcome.summary());
                outcomes.push(outcome);
            }
            Err(e) => {
                warn!(file = %file.display(), "Export failed: {e}");
                failures.push(format!("{stem}: {e}"));
            }
        }
    }

    if !failures.is_empty() {
        return Err(ExportError::query(format!(
            "{} of {} files failed: {}",
            failures.len(),
            files.len(),
            failures.join("; ")
        )));
    }

    Ok(outcomes)
}

/// Exports every `.sql` file in `dir` into one workbook at `out_path`, one
/// sheet per file, sheets named after the file stems.
pub async fn export_folder_to_one(
    driver: &ExportDriver<'_>,
    dir: &Path,
    out_path: &Path,
) -> Result<ExportOutcome> {
    let files = collect_sql_files(dir)?;
    if files.is_empty() {
        return Err(ExportError::query(format!(
            "No .sql files found in {}",
            dir.display()
        )));
    }

    let mut sources = Vec::new();
    for file in &files {
        sources.push(NamedQuery {
            name: sheet_name_for(&file_stem(file)),
            sql: read_sql_file(file)?,
        });
    }

    driver.export_many_to_one(&sources, out_path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportConfig;
    use crate::db::{ColumnInfo, MockDatabaseClient, Value};

    fn dataset(n: usize) -> MockDatabaseClient {
        let columns = vec![
            ColumnInfo::new("n", "int8"),
            ColumnInfo::new("label", "text"),
        ];
        let rows = (0..n)
            .map(|i| vec![Value::Int(i as i64), Value::String(format!("row{i}"))])
            .collect();
        MockDatabaseClient::with_data(columns, rows)
    }

    #[test]
    fn test_sheet_name_strips_illegal_characters() {
        assert_eq!(sheet_name_for("daily:report"), "dailyreport");
        assert_eq!(sheet_name_for("a/b\\c[d]e*f?g"), "abcdefg");
        assert_eq!(sheet_name_for("plain_name"), "plain_name");
    }

    #[test]
    fn test_sheet_name_truncated_to_31() {
        let long = "x".repeat(50);
        assert_eq!(sheet_name_for(&long).len(), 31);
    }

    #[test]
    fn test_sheet_name_never_empty() {
        assert_eq!(sheet_name_for("[]"), "Sheet");
    }

    #[test]
    fn test_default_output_name_shape() {
        let name = default_output_name("report");
        assert!(name.starts_with("report_"));
        assert!(name.ends_with(".xlsx"));
    }

    #[test]
    fn test_collect_sql_files_sorted_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Beta.sql"), "SELECT 1").unwrap();
        std::fs::write(dir.path().join("alpha.SQL"), "SELECT 1").unwrap();
        std::fs::write(dir.path().join("gamma.txt"), "not sql").unwrap();

        let files = collect_sql_files(dir.path()).unwrap();
        let names: Vec<String> = files.iter().map(|p| file_stem(p)).collect();
        assert_eq!(names, vec!["alpha", "Beta"]);
    }

    #[test]
    fn test_read_sql_file_missing_path_in_error() {
        let err = read_sql_file(Path::new("/nonexistent/q.sql")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/q.sql"));
    }

    #[tokio::test]
    async fn test_export_folder_writes_one_file_per_query() {
        let sql_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        std::fs::write(sql_dir.path().join("a.sql"), "SELECT n, label FROM t").unwrap();
        std::fs::write(sql_dir.path().join("b.sql"), "SELECT n, label FROM t").unwrap();

        let client = dataset(10);
        let driver = ExportDriver::new(&client, ExportConfig::default());

        let outcomes = export_folder(&driver, sql_dir.path(), out_dir.path(), false, 1000)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            assert!(outcome.path.exists());
            assert_eq!(outcome.rows_exported, 10);
        }
    }

    #[tokio::test]
    async fn test_export_folder_empty_dir_rejected() {
        let sql_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();

        let client = dataset(10);
        let driver = ExportDriver::new(&client, ExportConfig::default());

        let err = export_folder(&driver, sql_dir.path(), out_dir.path(), false, 1000)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No .sql files"));
    }

    #[tokio::test]
    async fn test_export_folder_to_one_combined_workbook() {
        let sql_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let out_path = out_dir.path().join("combined.xlsx");
        std::fs::write(sql_dir.path().join("first.sql"), "SELECT n, label FROM t").unwrap();
        std::fs::write(sql_dir.path().join("second.sql"), "SELECT n, label FROM t").unwrap();

        let client = dataset(7);
        let driver = ExportDriver::new(&client, ExportConfig::default());

        let outcome = export_folder_to_one(&driver, sql_dir.path(), &out_path)
            .await
            .unwrap();
        assert_eq!(outcome.rows_exported, 14);
        assert!(out_path.exists());
    }
}
