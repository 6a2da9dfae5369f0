//! Human-readable and JSON renderings of a [`ScanResult`].

use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ScanResult;

/// One-line summary of a scan result
pub fn summary(result: &ScanResult) -> String {
    if result.is_empty() {
        "No duplicates found.".to_string()
    } else {
        format!(
            "Found {} groups of duplicates ({} total).",
            result.len(),
            result.duplicate_count()
        )
    }
}

/// Plain-text report listing every group, with size and modification time of
/// each duplicate
pub fn text_report(result: &ScanResult) -> String {
    text_report_at(result, Local::now())
}

fn text_report_at(result: &ScanResult, generated: DateTime<Local>) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "=== Image Dedup Report ===");
    let _ = writeln!(out, "Generated on: {}", generated.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "Total duplicate groups: {}", result.len());
    let _ = writeln!(out, "Total duplicate files: {}", result.duplicate_count());

    for (i, group) in result.iter().enumerate() {
        let _ = writeln!(out);
        let _ = writeln!(out, "--- Group {} ---", i + 1);
        let _ = writeln!(out, "Original: {}", group.original.display());
        let _ = writeln!(out, "Duplicates:");
        for duplicate in &group.duplicates {
            let _ = writeln!(out, "  - {} ({})", duplicate.display(), describe_file(duplicate));
        }
    }

    out
}

/// "12.34 KB, modified: 2024-01-02 03:04:05", or a note if the file is gone
fn describe_file(path: &Path) -> String {
    match fs::metadata(path) {
        Ok(metadata) => {
            let size_kb = metadata.len() as f64 / 1024.0;
            match metadata.modified() {
                Ok(modified) => {
                    let modified: DateTime<Local> = modified.into();
                    format!(
                        "{:.2} KB, modified: {}",
                        size_kb,
                        modified.format("%Y-%m-%d %H:%M:%S")
                    )
                }
                Err(_) => format!("{:.2} KB", size_kb),
            }
        }
        Err(_) => "unavailable".to_string(),
    }
}

/// Pretty-printed JSON of the groups
pub fn json_report(result: &ScanResult) -> Result<String> {
    serde_json::to_string_pretty(result)
        .map_err(|e| Error::Unknown(format!("Failed to serialize report: {}", e)))
}

/// Write the text report to `path`
pub fn write_text_report(result: &ScanResult, path: &Path) -> Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(text_report(result).as_bytes())?;
    Ok(())
}

/// Write the JSON report to `path`
pub fn write_json_report(result: &ScanResult, path: &Path) -> Result<()> {
    fs::write(path, json_report(result)?)?;
    Ok(())
}
