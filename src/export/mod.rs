//! The export pipeline: batch sources, the spreadsheet sink, and the driver
//! that wires them together.

mod batch;
mod driver;
mod sink;
mod source;

pub use batch::{default_output_name, export_folder, export_folder_to_one, read_sql_file};
pub use driver::{ExportDriver, ExportOutcome, ExportStatus, NamedQuery, Progress};
pub use sink::{SheetSink, WorkbookWriter};
pub use source::{PagedSource, RowBatch, RowBatchSource, StreamSource};
