//! Tabular input/output for event and digest tables.
//!
//! Thin collaborators around the digest core: reading event tables and
//! writing digest tables in CSV or parquet, with optional gzip/zip output
//! compression. Compressed CSV input is recognised by the `.gz`/`.zip`
//! file extension.

mod csv_io;
mod parquet_io;

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tracing::info;

use crate::analysis::WindowMeta;
use crate::driver::{DigestTable, EventTable};

/// Supported table formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Parquet,
}

/// Supported output compressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Zip,
}

/// Errors raised by table I/O.
#[derive(Debug, Clone)]
pub enum TableError {
    /// I/O or format-layer failure.
    Io(String),
    /// Required column missing or of an unusable type.
    Schema(String),
    /// A row's value could not be parsed.
    Parse {
        row: usize,
        value: String,
        message: String,
    },
    /// Unsupported option combination.
    Config(String),
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableError::Io(msg) => write!(f, "I/O error: {}", msg),
            TableError::Schema(msg) => write!(f, "Schema error: {}", msg),
            TableError::Parse {
                row,
                value,
                message,
            } => write!(f, "Parse error at row {}: '{}': {}", row, value, message),
            TableError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for TableError {}

impl From<std::io::Error> for TableError {
    fn from(e: std::io::Error) -> Self {
        TableError::Io(e.to_string())
    }
}

impl From<csv::Error> for TableError {
    fn from(e: csv::Error) -> Self {
        TableError::Io(e.to_string())
    }
}

impl From<parquet::errors::ParquetError> for TableError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        TableError::Io(e.to_string())
    }
}

impl From<arrow::error::ArrowError> for TableError {
    fn from(e: arrow::error::ArrowError) -> Self {
        TableError::Io(e.to_string())
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Reads an event table from `path`.
///
/// `prop_names` selects the extra per-user property columns to carry
/// through grouping. Compressed CSV input is detected by file extension.
pub fn read_events(
    path: &Path,
    format: TableFormat,
    prop_names: &[String],
) -> Result<EventTable, TableError> {
    let table = match format {
        TableFormat::Csv => {
            let file = File::open(path)?;
            if has_extension(path, "gz") {
                csv_io::read_events_csv(flate2::read::GzDecoder::new(file), prop_names)?
            } else if has_extension(path, "zip") {
                let mut archive =
                    zip::ZipArchive::new(file).map_err(|e| TableError::Io(e.to_string()))?;
                if archive.len() == 0 {
                    return Err(TableError::Io(format!(
                        "zip archive '{}' is empty",
                        path.display()
                    )));
                }
                let mut entry = archive
                    .by_index(0)
                    .map_err(|e| TableError::Io(e.to_string()))?;
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                csv_io::read_events_csv(buf.as_slice(), prop_names)?
            } else {
                csv_io::read_events_csv(file, prop_names)?
            }
        }
        TableFormat::Parquet => parquet_io::read_events_parquet(path, prop_names)?,
    };
    info!("read {} events from {}", table.rows.len(), path.display());
    Ok(table)
}

/// Writes a digest table to `path`.
pub fn write_digests(
    path: &Path,
    format: TableFormat,
    compression: Option<Compression>,
    table: &DigestTable,
) -> Result<(), TableError> {
    match format {
        TableFormat::Csv => match compression {
            None => {
                let file = File::create(path)?;
                csv_io::write_digests_csv(file, table)?;
            }
            Some(Compression::Gzip) => {
                let encoder = flate2::write::GzEncoder::new(
                    File::create(path)?,
                    flate2::Compression::default(),
                );
                let encoder = csv_io::write_digests_csv(encoder, table)?;
                encoder.finish()?;
            }
            Some(Compression::Zip) => {
                let mut archive = zip::ZipWriter::new(File::create(path)?);
                archive
                    .start_file(zip_entry_name(path), zip::write::FileOptions::default())
                    .map_err(|e| TableError::Io(e.to_string()))?;
                csv_io::write_digests_csv(&mut archive, table)?;
                archive.finish().map_err(|e| TableError::Io(e.to_string()))?;
            }
        },
        TableFormat::Parquet => {
            if compression == Some(Compression::Zip) {
                return Err(TableError::Config(
                    "zip compression is not supported for parquet output; use gzip".to_string(),
                ));
            }
            parquet_io::write_digests_parquet(path, compression, table)?;
        }
    }
    info!("wrote {} digests to {}", table.rows.len(), path.display());
    Ok(())
}

/// Writes the window-metadata record as JSON.
pub fn write_meta(path: &Path, meta: &WindowMeta) -> Result<(), TableError> {
    let mut file = File::create(path)?;
    let json =
        serde_json::to_string_pretty(meta).map_err(|e| TableError::Io(e.to_string()))?;
    file.write_all(json.as_bytes())?;
    file.write_all(b"\n")?;
    info!("wrote window metadata to {}", path.display());
    Ok(())
}

/// Archive member name for zipped CSV output.
fn zip_entry_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("digests");
    if stem.ends_with(".csv") {
        stem.to_string()
    } else {
        format!("{}.csv", stem)
    }
}
