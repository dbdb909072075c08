//! Line decoding
//!
//! The response stream is newline-delimited; each line is a JSON array of
//! result records (or a single record). A line that does not decode is logged
//! and skipped.

use crate::model::QueryResult;
use std::io::BufRead;

/// Decode one line into result records
///
/// Invalid UTF-8 is a decode error like any other malformed JSON.
pub fn decode_line(line: &[u8]) -> Result<Vec<QueryResult>, serde_json::Error> {
    let first = line.iter().find(|b| !b.is_ascii_whitespace());
    if first == Some(&b'[') {
        serde_json::from_slice(line)
    } else {
        serde_json::from_slice::<QueryResult>(line).map(|record| vec![record])
    }
}

/// Decode every line of `reader`, flattening records in stream order
///
/// Only I/O errors are returned; decode failures are logged per line.
pub fn decode_stream<R: BufRead>(reader: R) -> std::io::Result<Vec<QueryResult>> {
    let mut records = Vec::new();

    for (idx, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        tracing::debug!(line = idx + 1, len = line.len(), "Processing line");

        match decode_line(&line) {
            Ok(decoded) => records.extend(decoded),
            Err(e) => {
                tracing::error!(line = idx + 1, error = %e, "Failed to decode result line, skipping");
            }
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_decode_array_line() {
        let line = r#"[{"metric":"a","dps":{"1":"1"}},{"metric":"b","dps":{}}]"#;
        let records = decode_line(line.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].metric, "b");
    }

    #[test]
    fn test_decode_single_record_line() {
        let records = decode_line(br#"{"metric":"a","dps":{"5":2.5}}"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].dps[&5].as_f64(), Some(2.5));
    }

    #[test]
    fn test_malformed_line_does_not_stop_stream() {
        let input = concat!(
            r#"[{"metric":"a","dps":{"1":"1"}}]"#,
            "\n",
            "this is not json\n",
            "\n",
            r#"[{"metric":"b","dps":{"2":"2"}}]"#,
            "\n",
        );
        let records = decode_stream(Cursor::new(input)).unwrap();
        let metrics: Vec<&str> = records.iter().map(|r| r.metric.as_str()).collect();
        assert_eq!(metrics, vec!["a", "b"]);
    }

    #[test]
    fn test_invalid_utf8_line_does_not_stop_stream() {
        let mut input = br#"[{"metric":"a","dps":{"1":"1"}}]"#.to_vec();
        input.extend_from_slice(b"\n\xff\xfe x\n");
        input.extend_from_slice(br#"[{"metric":"b","dps":{"2":"2"}}]"#);
        input.extend_from_slice(b"\r\n");

        let records = decode_stream(Cursor::new(input)).unwrap();
        let metrics: Vec<&str> = records.iter().map(|r| r.metric.as_str()).collect();
        assert_eq!(metrics, vec!["a", "b"]);
    }
}
