//! Standings export as delimited text

use std::io::Write;

use serde::Serialize;

use crate::sim::Ledger;

/// Default download name for the export
pub const DEFAULT_EXPORT_FILENAME: &str = "the_race_results.csv";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV output was not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Failed to flush export: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportRow<'a> {
    lane: u32,
    name: &'a str,
    meters: f64,
    effective_meters: u64,
    watts: f64,
    spm: f64,
}

/// Write one row per player, leader first, with a header line
pub fn write_csv<W: Write>(ledger: &Ledger, writer: W) -> Result<(), ExportError> {
    let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    csv.write_record(["lane", "name", "meters", "effectiveMeters", "watts", "spm"])?;
    for p in ledger.standings() {
        csv.serialize(ExportRow {
            lane: p.lane,
            name: &p.name,
            meters: p.raw_meters,
            effective_meters: p.effective_meters,
            watts: p.watts,
            spm: p.spm,
        })?;
    }
    csv.flush()?;
    Ok(())
}

/// The export as a string
pub fn to_csv_string(ledger: &Ledger) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_csv(ledger, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}
