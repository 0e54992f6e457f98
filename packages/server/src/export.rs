//! Export table rendering.

use leith_map_database::queries::ExportTable;
use serde_json::{Map, Value};

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders a table as CSV with a header row. Nulls become empty fields.
///
/// # Errors
///
/// Returns a [`csv::Error`] if a record cannot be written.
pub fn to_csv(table: &ExportTable) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.column_names())?;

    for row in &table.rows {
        writer.write_record(row.iter().map(csv_field))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Renders a table as an array of objects keyed by column name.
#[must_use]
pub fn to_json(table: &ExportTable) -> Vec<Map<String, Value>> {
    let names = table.column_names();
    table
        .rows
        .iter()
        .map(|row| {
            names
                .iter()
                .zip(row)
                .map(|(name, value)| ((*name).to_string(), value.clone()))
                .collect()
        })
        .collect()
}
