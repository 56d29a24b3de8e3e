//! Export orchestration.
//!
//! One `ExportDriver` instance owns one export operation end to end:
//! normalize, order (paged mode), count, then the fetch/write loop, and
//! finally workbook finalization. Finalization runs whenever at least one
//! sheet exists, so partial output is durable; a query that fails before
//! producing a sheet leaves no file. Progress and query-rewrite notifications are
//! injected as callbacks at construction rather than grafted on through
//! inheritance, and cancellation is cooperative: the flag is checked between
//! batches, never mid-batch.

use crate::config::ExportConfig;
use crate::db::DatabaseClient;
use crate::error::{ExportError, Result};
use crate::export::sink::WorkbookWriter;
use crate::export::source::{PagedSource, RowBatchSource, StreamSource};
use crate::query::{count_rows, ensure_ordered, normalize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sheet name used for single-query exports.
const DEFAULT_SHEET_NAME: &str = "Data";

/// Progress snapshot emitted after every batch boundary.
///
/// The driver emits on each batch; throttling how often to react is a
/// presentation concern left to the callback.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub rows_processed: u64,
    pub total_rows: u64,
}

impl Progress {
    /// Completion fraction in percent. A zero-row export reports 100: there
    /// is nothing left to do.
    pub fn percent(&self) -> f64 {
        if self.total_rows == 0 {
            100.0
        } else {
            self.rows_processed as f64 / self.total_rows as f64 * 100.0
        }
    }
}

type ProgressFn = Box<dyn Fn(Progress) + Send + Sync>;
type NoticeFn = Box<dyn Fn(&str) + Send + Sync>;

/// A named query for multi-sheet exports; the sheet takes the name.
#[derive(Debug, Clone)]
pub struct NamedQuery {
    pub name: String,
    pub sql: String,
}

/// Terminal status of an export operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    /// All rows were exported and the workbook was finalized.
    Completed,
    /// Cancellation was requested; rows written before it remain in the
    /// finalized workbook.
    Cancelled,
}

/// Terminal summary of a successful (or cancelled) export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub status: ExportStatus,
    pub rows_exported: u64,
    pub total_rows: u64,
    pub path: PathBuf,
}

impl ExportOutcome {
    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        match self.status {
            ExportStatus::Completed => format!(
                "Exported {} of {} rows to {}",
                self.rows_exported,
                self.total_rows,
                self.path.display()
            ),
            ExportStatus::Cancelled => format!(
                "Cancelled after {} of {} rows; partial output at {}",
                self.rows_exported,
                self.total_rows,
                self.path.display()
            ),
        }
    }
}

/// How row batches are fetched.
#[derive(Debug, Clone, Copy)]
enum FetchMode {
    Streamed,
    Paged { page_size: usize },
}

/// Result of pumping one sheet.
struct SheetRun {
    rows: u64,
    total: u64,
    cancelled: bool,
}

/// Drives one export operation against a borrowed database client.
///
/// The client is borrowed under a single-operation constraint: reusing one
/// client for concurrent exports is not supported. Each export gets its own
/// driver, its own cursor, and its own output destination.
pub struct ExportDriver<'a> {
    client: &'a dyn DatabaseClient,
    config: ExportConfig,
    progress: Option<ProgressFn>,
    notice: Option<NoticeFn>,
    cancel: CancellationToken,
}

impl<'a> ExportDriver<'a> {
    pub fn new(client: &'a dyn DatabaseClient, config: ExportConfig) -> Self {
        Self {
            client,
            config,
            progress: None,
            notice: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Registers a callback invoked with a [`Progress`] after every batch.
    pub fn with_progress(mut self, f: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    /// Registers a callback for informational notifications, such as the
    /// ordering guard rewriting the query text.
    pub fn with_notice(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.notice = Some(Box::new(f));
        self
    }

    /// Uses the given token for cooperative cancellation. The driver checks
    /// it between batches and proceeds straight to finalization when set.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Exports a query through a single streamed cursor. Preferred default:
    /// one query execution, memory bounded by the configured chunk size.
    pub async fn export_streamed(&self, sql: &str, out_path: &Path) -> Result<ExportOutcome> {
        self.export_single(sql, out_path, FetchMode::Streamed).await
    }

    /// Exports a query by re-executing it with a growing offset window.
    pub async fn export_paged(
        &self,
        sql: &str,
        out_path: &Path,
        page_size: usize,
    ) -> Result<ExportOutcome> {
        self.export_single(sql, out_path, FetchMode::Paged { page_size })
            .await
    }

    /// Exports many queries into one workbook, one sheet per source, sheets
    /// ordered by source name. The workbook is finalized once, after the
    /// last sheet: individual source failures are reported but do not
    /// discard the sheets that succeeded.
    pub async fn export_many_to_one(
        &self,
        sources: &[NamedQuery],
        out_path: &Path,
    ) -> Result<ExportOutcome> {
        if sources.is_empty() {
            return Err(ExportError::query("No queries to export"));
        }

        let mut ordered: Vec<&NamedQuery> = sources.iter().collect();
        ordered.sort_by_key(|s| s.name.to_lowercase());

        let mut writer = WorkbookWriter::create(out_path);
        let mut rows_exported = 0;
        let mut total_rows = 0;
        let mut cancelled = false;
        let mut failures: Vec<String> = Vec::new();

        for source in ordered {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            info!(sheet = %source.name, "Exporting sheet");
            let mode = FetchMode::Paged {
                page_size: self.config.page_size,
            };
            match self.run_sheet(&mut writer, &source.name, &source.sql, mode).await {
                Ok(run) => {
                    rows_exported += run.rows;
                    total_rows += run.total;
                    cancelled = run.cancelled;
                    if cancelled {
                        break;
                    }
                }
                Err(e) => {
                    warn!(sheet = %source.name, "Sheet export failed: {e}");
                    failures.push(format!("{}: {e}", source.name));
                }
            }
        }

        // Finalize only when something was produced; if every source failed
        // (or cancellation came before the first sheet) no file is created.
        let path = if writer.has_sheets() {
            writer.finalize()?
        } else {
            out_path.to_path_buf()
        };

        if !failures.is_empty() {
            return Err(ExportError::query(format!(
                "{} of {} sheets failed: {}",
                failures.len(),
                sources.len(),
                failures.join("; ")
            )));
        }

        Ok(ExportOutcome {
            status: if cancelled {
                ExportStatus::Cancelled
            } else {
                ExportStatus::Completed
            },
            rows_exported,
            total_rows,
            path,
        })
    }

    async fn export_single(
        &self,
        sql: &str,
        out_path: &Path,
        mode: FetchMode,
    ) -> Result<ExportOutcome> {
        let mut writer = WorkbookWriter::create(out_path);
        let run = self
            .run_sheet(&mut writer, DEFAULT_SHEET_NAME, sql, mode)
            .await;

        match run {
            Ok(sheet) => {
                let path = writer.finalize()?;
                let outcome = ExportOutcome {
                    status: if sheet.cancelled {
                        ExportStatus::Cancelled
                    } else {
                        ExportStatus::Completed
                    },
                    rows_exported: sheet.rows,
                    total_rows: sheet.total,
                    path,
                };
                info!("{}", outcome.summary());
                Ok(outcome)
            }
            Err(e) => {
                // Rows written before a failure stay readable on disk, but a
                // query that failed before producing a sheet leaves no file.
                if writer.has_sheets() {
                    if let Err(fe) = writer.finalize() {
                        warn!("Finalizing partial workbook also failed: {fe}");
                    }
                }
                Err(e)
            }
        }
    }

    /// Runs the full pipeline for one sheet: normalize, order (paged),
    /// count, open source, header, batch loop. The sheet is attached to the
    /// workbook whether the loop succeeds or not.
    async fn run_sheet(
        &self,
        writer: &mut WorkbookWriter,
        sheet_name: &str,
        raw_sql: &str,
        mode: FetchMode,
    ) -> Result<SheetRun> {
        let normalized = normalize(raw_sql);
        if normalized.is_empty() {
            return Err(ExportError::query("Query is empty"));
        }

        let sql = match mode {
            FetchMode::Paged { .. } => {
                debug!("Running ordering guard");
                let ordered = ensure_ordered(self.client, &normalized).await?;
                if ordered.rewritten {
                    self.emit_notice(&format!(
                        "Added deterministic ordering; executing:\n{}",
                        ordered.sql
                    ));
                }
                ordered.sql
            }
            FetchMode::Streamed => normalized,
        };

        debug!("Counting rows");
        let total = count_rows(self.client, &sql).await?;
        info!(total, sheet = sheet_name, "Starting export");

        let mut source: Box<dyn RowBatchSource + '_> = match mode {
            FetchMode::Paged { page_size } => {
                Box::new(PagedSource::open(self.client, &sql, page_size, total).await?)
            }
            FetchMode::Streamed => {
                Box::new(StreamSource::open(self.client, &sql, self.config.chunk_size).await?)
            }
        };

        let mut sink = writer.new_sheet(sheet_name, &self.config)?;
        let run = self.pump(source.as_mut(), &mut sink, total).await;
        writer.attach(sink);
        run
    }

    /// The fetch/write loop. A batch is fully written before the next is
    /// fetched; there is no internal parallelism.
    async fn pump(
        &self,
        source: &mut dyn RowBatchSource,
        sink: &mut crate::export::sink::SheetSink,
        total: u64,
    ) -> Result<SheetRun> {
        sink.write_header(source.schema())?;

        let mut rows_processed: u64 = 0;
        loop {
            if self.cancel.is_cancelled() {
                info!(rows_processed, "Cancellation requested; stopping");
                return Ok(SheetRun {
                    rows: rows_processed,
                    total,
                    cancelled: true,
                });
            }

            let batch = source.next_batch().await?;
            if !batch.rows.is_empty() {
                sink.append_rows(&batch.rows)?;
                rows_processed += batch.rows.len() as u64;
            }

            self.emit_progress(Progress {
                rows_processed,
                total_rows: total,
            });

            if batch.done {
                break;
            }
        }

        Ok(SheetRun {
            rows: rows_processed,
            total,
            cancelled: false,
        })
    }

    fn emit_progress(&self, progress: Progress) {
        debug!(
            rows = progress.rows_processed,
            total = progress.total_rows,
            "Progress"
        );
        if let Some(f) = &self.progress {
            f(progress);
        }
    }

    fn emit_notice(&self, message: &str) {
        info!("{message}");
        if let Some(f) = &self.notice {
            f(message);
        }
    }
}
