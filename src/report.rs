//! Report Writer (C9) — materialise a completed session's results into a
//! deterministic CSV path (`spec.md` §4.9).
//!
//! Grounded on the teacher's `data::storage::CsvWriter` for the
//! "create parent dir, open, write header, write rows" shape and its
//! best-effort discipline; the path layout, column order, and fallback
//! path are specific to `spec.md` §4.9.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{PdError, PdResult};
use crate::plan::{MeasurementResult, Outcome};

const COLUMNS: &[&str] = &[
    "Item No",
    "Item Name",
    "Result",
    "Measured Value",
    "Min Limit",
    "Max Limit",
    "Error Message",
    "Execution Time (ms)",
    "Test Time",
];

/// Everything the writer needs about one item beyond the bare
/// `MeasurementResult`, since limits live on the `TestItem`, not the
/// result.
pub struct ReportRow<'a> {
    pub result: &'a MeasurementResult,
    pub lower_limit: Option<f64>,
    pub upper_limit: Option<f64>,
}

/// Replace `/`, `\`, and ASCII control characters with `_`; trim trailing
/// whitespace and dots (`spec.md` §9, open question 5).
pub fn sanitize_segment(segment: &str) -> String {
    let replaced: String = segment
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_ascii_control() {
            '_'
        } else {
            c
        })
        .collect();
    replaced
        .trim_end_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string()
}

fn report_path(base_dir: &Path, project: &str, station: &str, serial: &str, now: DateTime<Utc>) -> PathBuf {
    let project = sanitize_segment(project);
    let station = sanitize_segment(station);
    let serial = sanitize_segment(serial);
    let day = now.format("%Y%m%d").to_string();
    let file_name = format!("{serial}_{}.csv", now.format("%Y%m%d_%H%M%S"));
    base_dir.join(project).join(station).join(day).join(file_name)
}

fn outcome_str(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Pass => "PASS",
        Outcome::Fail => "FAIL",
        Outcome::Error => "ERROR",
        Outcome::Skip => "SKIP",
    }
}

fn write_csv(path: &Path, rows: &[ReportRow<'_>]) -> PdResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)
        .map_err(|e| PdError::ReportWrite(e.to_string()))?;
    writer
        .write_record(COLUMNS)
        .map_err(|e| PdError::ReportWrite(e.to_string()))?;
    for row in rows {
        let result = row.result;
        writer
            .write_record([
                result.item_no.to_string(),
                result.item_name.clone(),
                outcome_str(result.outcome).to_string(),
                result.measured_value.as_text(),
                row.lower_limit.map(|v| v.to_string()).unwrap_or_default(),
                row.upper_limit.map(|v| v.to_string()).unwrap_or_default(),
                result.error_message.clone().unwrap_or_default(),
                result.execution_ms.to_string(),
                result.timestamp.to_rfc3339(),
            ])
            .map_err(|e| PdError::ReportWrite(e.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the CSV report for a completed/aborted session. On a permission
/// failure against `base_dir`, retries under `$HOME/webpdtool_reports`;
/// a further failure is returned for the caller to log and surface
/// out-of-band without changing the session's outcome state
/// (`spec.md` §4.9, §7 `REPORT_WRITE`).
pub fn write_report(
    base_dir: &Path,
    project: &str,
    station: &str,
    serial: &str,
    now: DateTime<Utc>,
    rows: &[ReportRow<'_>],
) -> PdResult<PathBuf> {
    let primary = report_path(base_dir, project, station, serial, now);
    match write_csv(&primary, rows) {
        Ok(()) => Ok(primary),
        Err(_) if is_permission_error(base_dir) => {
            let home = dirs::home_dir()
                .ok_or_else(|| PdError::ReportWrite("no home directory for fallback".into()))?;
            let fallback_base = home.join("webpdtool_reports");
            let fallback = report_path(&fallback_base, project, station, serial, now);
            write_csv(&fallback, rows)?;
            Ok(fallback)
        }
        Err(e) => Err(e),
    }
}

fn is_permission_error(base_dir: &Path) -> bool {
    match std::fs::create_dir_all(base_dir) {
        Ok(()) => false,
        Err(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
    }
}

/// Delete report files under `base_dir` older than `max_age_days`. `0`
/// disables cleanup (`REPORT_MAX_AGE_DAYS`, `spec.md` §6). Supplements the
/// distillation: the env var is named but never given an operation there.
pub fn cleanup_old_reports(base_dir: &Path, max_age_days: u32) -> PdResult<usize> {
    if max_age_days == 0 || !base_dir.exists() {
        return Ok(0);
    }
    let cutoff = Utc::now() - chrono::Duration::days(max_age_days as i64);
    let mut removed = 0;
    for entry in walk_files(base_dir)? {
        let modified: DateTime<Utc> = entry.metadata()?.modified()?.into();
        if modified < cutoff {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn walk_files(dir: &Path) -> PdResult<Vec<std::fs::DirEntry>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk_files(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "csv") {
            out.push(entry);
        }
    }
    Ok(out)
}
