use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::error::{Result, VtopError};
use crate::parsers::Table;

/// Writes a table as a delimited file: header line first, then rows in
/// insertion order.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Result of a combine pass. Zero matching inputs is a reported no-op, not
/// a failure, so partial runs can be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CombineOutcome {
    Combined { files: usize, records: usize },
    NoInput,
}

/// Merges every delimited file in `dir` whose name matches
/// `{prefix}*{suffix}` into one output file, in sorted filename order.
/// All inputs must share the same header schema.
pub fn combine(dir: &Path, prefix: &str, suffix: &str, output: &Path) -> Result<CombineOutcome> {
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "combine input directory does not exist");
        return Ok(CombineOutcome::NoInput);
    }

    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(prefix) && name.ends_with(suffix))
        })
        .collect();
    matches.sort();

    if matches.is_empty() {
        tracing::warn!(
            dir = %dir.display(),
            pattern = %format!("{prefix}*{suffix}"),
            "no files matched, nothing combined"
        );
        return Ok(CombineOutcome::NoInput);
    }

    // Stage into a sibling file and rename at the end, so a mismatched or
    // corrupt input never leaves a truncated file at the output path.
    let staging = staging_path(output);
    let records = match merge_into(&matches, &staging) {
        Ok(records) => records,
        Err(e) => {
            let _ = std::fs::remove_file(&staging);
            return Err(e);
        }
    };
    std::fs::rename(&staging, output)?;

    tracing::info!(
        files = matches.len(),
        records,
        output = %output.display(),
        "combined delimited files"
    );
    Ok(CombineOutcome::Combined {
        files: matches.len(),
        records,
    })
}

fn staging_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().map(OsStr::to_os_string).unwrap_or_default();
    name.push(".partial");
    output.with_file_name(name)
}

fn merge_into(inputs: &[PathBuf], staging: &Path) -> Result<usize> {
    let mut writer = csv::Writer::from_path(staging)?;
    let mut schema: Option<csv::StringRecord> = None;
    let mut records = 0usize;

    for path in inputs {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        match &schema {
            None => {
                writer.write_record(&headers)?;
                schema = Some(headers);
            }
            Some(expected) if *expected != headers => {
                return Err(VtopError::SchemaMismatch(format!(
                    "{} has columns {:?}, expected {:?}",
                    path.display(),
                    headers,
                    expected
                )));
            }
            Some(_) => {}
        }
        for record in reader.records() {
            writer.write_record(&record?)?;
            records += 1;
        }
    }
    writer.flush()?;
    Ok(records)
}
