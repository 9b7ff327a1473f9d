//! Snapshot record encoding
//!
//! One record per line, three comma-separated fields:
//! `name,sizeBytes,lastModified`. The name is quoted (with doubled inner
//! quotes) when it contains a comma, a quote or a line break, so a quoted
//! record may span several physical lines. The timestamp is always UTC in
//! `YYYY-MM-DDThh:mm:ssZ` form.

use crate::constants::SNAPSHOT_DATE_FORMAT;
use crate::source::RemoteEntry;
use chrono::{DateTime, NaiveDateTime, Utc};

/// A decoded snapshot record
pub type SnapshotRecord = RemoteEntry;

fn needs_quoting(field: &str) -> bool {
    field.contains(&[',', '"', '\r', '\n'][..])
}

fn push_field(out: &mut String, field: &str) {
    if needs_quoting(field) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

/// Encode an entry as one record, including the trailing newline
pub fn encode_record(entry: &RemoteEntry) -> String {
    let mut out = String::with_capacity(entry.name.len() + 32);
    push_field(&mut out, &entry.name);
    out.push(',');
    out.push_str(&entry.size_bytes.to_string());
    out.push(',');
    out.push_str(&entry.last_modified.format(SNAPSHOT_DATE_FORMAT).to_string());
    out.push('\n');
    out
}

/// Split one logical record into fields. Returns `None` while a quoted field
/// is still open, meaning the caller must append the next physical line.
pub fn split_fields(record: &str) -> Result<Option<Vec<String>>, String> {
    let mut fields = Vec::with_capacity(3);
    let mut field = String::new();
    let mut chars = record.chars().peekable();
    let mut in_quotes = false;
    let mut field_was_quoted = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' if field.is_empty() && !field_was_quoted => {
                in_quotes = true;
                field_was_quoted = true;
            }
            '"' => return Err("unexpected quote in field".to_string()),
            ',' => {
                fields.push(std::mem::take(&mut field));
                field_was_quoted = false;
            }
            _ if field_was_quoted => {
                return Err("unexpected character after closing quote".to_string())
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Ok(None);
    }
    fields.push(field);
    Ok(Some(fields))
}

/// Parse the three fields of a complete record
pub fn decode_record(fields: &[String]) -> Result<SnapshotRecord, String> {
    let [name, size, modified] = fields else {
        return Err(format!("expected 3 fields, found {}", fields.len()));
    };

    let size_bytes = size
        .parse::<i64>()
        .map_err(|e| format!("invalid size '{}': {}", size, e))?;
    let last_modified = NaiveDateTime::parse_from_str(modified, SNAPSHOT_DATE_FORMAT)
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .map_err(|e| format!("invalid timestamp '{}': {}", modified, e))?;

    Ok(RemoteEntry::new(name.clone(), size_bytes, last_modified))
}
