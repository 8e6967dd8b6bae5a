//! WAL record encoding.
//!
//! One record per line: `<timestamp_ns>,<key>,<base64(value)>\n`. Base64
//! lets values carry any byte, including the line and field delimiters.
//! Keys are validated upstream to contain neither `,` nor `\n`, so the
//! first two fields parse unambiguously. The line format is stable and
//! must stay readable across versions.

use crate::types::{TimestampNs, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    pub timestamp: TimestampNs,
    pub key: String,
    pub value: Value,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MalformedRecord {
    #[error("expected three comma-separated fields")]
    MissingField,
    #[error("timestamp is not an unsigned integer")]
    BadTimestamp,
    #[error("value is not valid base64")]
    BadValue,
}

pub fn encode_record(timestamp: TimestampNs, key: &str, value: &Value) -> String {
    format!("{timestamp},{key},{}\n", value.to_base64())
}

pub fn parse_record(line: &str) -> Result<WalRecord, MalformedRecord> {
    let mut fields = line.splitn(3, ',');
    let timestamp_field = fields.next().ok_or(MalformedRecord::MissingField)?;
    let key = fields.next().ok_or(MalformedRecord::MissingField)?;
    let value_field = fields.next().ok_or(MalformedRecord::MissingField)?;

    let timestamp = timestamp_field
        .parse::<TimestampNs>()
        .map_err(|_| MalformedRecord::BadTimestamp)?;
    let value = Value::from_base64(value_field).map_err(|_| MalformedRecord::BadValue)?;

    Ok(WalRecord {
        timestamp,
        key: key.to_owned(),
        value,
    })
}
