//! CSV aggregation of polled job results.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::api::JobResult;
use crate::error::ReportError;

/// Fixed leading columns of every report.
const FIXED_COLUMNS: [&str; 3] = ["filename", "status", "preview"];

/// One processed document: local filename plus its polled result.
#[derive(Debug, Clone)]
pub struct DocumentReport {
    pub filename: String,
    pub result: JobResult,
}

/// Render the report table.
///
/// Header is `filename, status, preview` followed by the sorted union of
/// field names across all documents. Rows leave blank cells for fields a
/// document did not produce.
pub fn render_csv(docs: &[DocumentReport]) -> Result<String, ReportError> {
    let field_names: BTreeSet<&str> = docs
        .iter()
        .flat_map(|d| d.result.fields.iter().map(|f| f.name.as_str()))
        .collect();

    let mut writer = csv::Writer::from_writer(vec![]);

    let header: Vec<&str> = FIXED_COLUMNS
        .iter()
        .copied()
        .chain(field_names.iter().copied())
        .collect();
    writer.write_record(&header)?;

    for doc in docs {
        let by_name: HashMap<&str, &str> = doc
            .result
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.content.as_str()))
            .collect();

        let mut row = vec![
            doc.filename.as_str(),
            doc.result.status.as_str(),
            doc.result.preview.as_deref().unwrap_or(""),
        ];
        row.extend(
            field_names
                .iter()
                .map(|name| by_name.get(name).copied().unwrap_or("")),
        );
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Flush(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

/// Timestamped filename for the report attachment.
pub fn report_filename(now: DateTime<Utc>) -> String {
    format!("{}.csv", now.format("%y%m%dT%H%M%S"))
}
