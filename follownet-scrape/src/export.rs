//! CSV export of session snapshots
//!
//! One row per record, one column per record field, in `CSV_COLUMNS` order.
//! The header row is always written, even for an empty snapshot.

use follownet_common::Record;
use thiserror::Error;

/// Column order of exported files
pub const CSV_COLUMNS: [&str; 16] = [
    "username",
    "display_name",
    "bio",
    "avatar_url",
    "profile_url",
    "platform",
    "type",
    "follower_count",
    "following_count",
    "company",
    "location",
    "website",
    "twitter",
    "email",
    "additional_info",
    "scraped_at",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("CSV writer flush failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode records as CSV text
pub fn to_csv(records: &[Record]) -> Result<String, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}

/// Decode CSV text produced by [`to_csv`]
pub fn from_csv(text: &str) -> Result<Vec<Record>, ExportError> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let records = reader.deserialize().collect::<Result<Vec<Record>, _>>()?;
    Ok(records)
}

/// File name offered to browsers for a download
pub fn file_name(platform: &str, session_id: &uuid::Uuid) -> String {
    let short = session_id.simple().to_string();
    format!("follownet_{}_data_{}.csv", platform, &short[..8])
}
