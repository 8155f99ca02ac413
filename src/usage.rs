//! Per-user traffic usage from proxy `stats` output.
//!
//! Input is the JSON printed by the proxy's stats query:
//!
//! ```text
//! {"stat": [{"name": "user>>>ann@example.com>>>traffic>>>uplink", "value": "1024"}, ...]}
//! ```
//!
//! Output is a CSV keyed by `email`, ready to drop into the auxiliary data
//! directory so templates can read `up_traffic`, `down_traffic` and
//! `total_traffic`.

use std::collections::HashMap;
use std::io::{Read, Write};

use serde::Deserialize;
use serde_json::Value;

use crate::dataset::EMAIL_COLUMN;
use crate::error::StatsError;

const SEPARATOR: &str = ">>>";

/// CSV header of the usage table.
pub const COLUMNS: [&str; 4] = [EMAIL_COLUMN, "up_traffic", "down_traffic", "total_traffic"];

#[derive(Debug, Deserialize)]
struct StatsDocument {
    #[serde(default)]
    stat: Vec<StatEntry>,
}

#[derive(Debug, Deserialize)]
struct StatEntry {
    name: String,
    /// Omitted by the proxy when the counter is zero.
    #[serde(default)]
    value: Value,
}

/// Traffic totals for one user, in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageRecord {
    pub email: String,
    pub up_traffic: u64,
    pub down_traffic: u64,
}

impl UsageRecord {
    pub fn total_traffic(&self) -> u64 {
        self.up_traffic.saturating_add(self.down_traffic)
    }
}

fn counter(entry: &StatEntry) -> Result<u64, StatsError> {
    let invalid = || StatsError::InvalidValue {
        name: entry.name.clone(),
        value: entry.value.to_string(),
    };
    match &entry.value {
        Value::Null => Ok(0),
        Value::Number(n) => n.as_u64().ok_or_else(invalid),
        Value::String(s) => s.trim().parse().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Parse a stats document into per-user records, in order of first appearance.
///
/// Counters that are not per-user (inbound or outbound tags) are skipped.
pub fn parse_stats(reader: impl Read) -> Result<Vec<UsageRecord>, StatsError> {
    let document: StatsDocument = serde_json::from_reader(reader)?;

    let mut records: Vec<UsageRecord> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for entry in &document.stat {
        let segments: Vec<&str> = entry.name.split(SEPARATOR).collect();
        let [scope, email, kind, direction] = segments.as_slice() else {
            return Err(StatsError::InvalidName(entry.name.clone()));
        };
        if *scope != "user" {
            tracing::debug!(name = %entry.name, "Skipping non-user counter");
            continue;
        }
        if *kind != "traffic" {
            return Err(StatsError::InvalidName(entry.name.clone()));
        }
        let value = counter(entry)?;

        let slot = *index.entry(email.to_string()).or_insert_with(|| {
            records.push(UsageRecord {
                email: email.to_string(),
                ..Default::default()
            });
            records.len() - 1
        });
        let record = &mut records[slot];
        match *direction {
            "uplink" => record.up_traffic = value,
            "downlink" => record.down_traffic = value,
            _ => return Err(StatsError::InvalidName(entry.name.clone())),
        }
    }
    tracing::debug!(users = records.len(), counters = document.stat.len(), "Parsed usage stats");
    Ok(records)
}

/// Write records as CSV with [`COLUMNS`] as header.
pub fn write_csv(records: &[UsageRecord], writer: impl Write) -> Result<(), StatsError> {
    let csv_err = |e: csv::Error| StatsError::Csv(e.to_string());
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(COLUMNS).map_err(csv_err)?;
    for record in records {
        writer
            .write_record([
                record.email.clone(),
                record.up_traffic.to_string(),
                record.down_traffic.to_string(),
                record.total_traffic().to_string(),
            ])
            .map_err(csv_err)?;
    }
    writer.flush()?;
    Ok(())
}
