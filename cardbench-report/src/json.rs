//! JSON Output

use crate::record::ResultRecord;

/// Generate a prettified JSON document for one record.
pub fn generate_json_record(record: &ResultRecord) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(record)
}
