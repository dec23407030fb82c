//! Flux annotated-CSV response parser
//!
//! This module parses the `application/csv` response format of the InfluxDB
//! 2.x query endpoint.
//! <https://docs.influxdata.com/influxdb/v2/reference/syntax/annotated-csv/>
//!
//! The format is CSV with `#group`/`#datatype`/`#default` annotation lines
//! ahead of each header row and an empty line between result blocks. Empty
//! cells take the per-column substitutes from the block's `#default`
//! annotation. Rows still lacking a parseable `_time` or `_value` are
//! skipped with a trace; a fetch with some fields absent is normal
//! operation, not an error.

use jiff::Timestamp;
use rustc_hash::FxHashMap;
use tracing::trace;

/// Columns that are structural rather than user data. Everything else that
/// is not `_time`/`_value`/`_field`/`_measurement` lands in the tag map.
const STRUCTURAL_COLUMNS: [&str; 4] = ["", "result", "_start", "_stop"];

/// One row of a Flux query result.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxRecord {
    /// Table index within the result
    pub table: usize,
    /// Observation timestamp, UTC
    pub time: Timestamp,
    /// Scalar value of the row
    pub value: f64,
    /// Field name; the snapshot query renames these to synthetic keys
    pub field: String,
    /// Measurement the row belongs to
    pub measurement: String,
    /// Remaining tag columns, notably the `uuid` metering-point tag
    pub tags: FxHashMap<String, String>,
}

/// Parse an annotated-CSV response body into records.
///
/// Unparseable rows are skipped rather than failing the whole response.
#[must_use]
pub fn parse_csv(body: &str) -> Vec<FluxRecord> {
    let mut records = Vec::new();
    let mut header: Option<Vec<String>> = None;
    let mut defaults: Option<Vec<String>> = None;

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            // Blank line ends a result block; the next block starts with
            // fresh annotations and a fresh header.
            header = None;
            defaults = None;
            continue;
        }
        if line.starts_with('#') {
            // The `#default` annotation supplies per-column substitutes for
            // empty cells. Its cells align with the header row because the
            // annotation name sits in the leading annotation column.
            if line.starts_with("#default") {
                defaults = Some(split_line(line));
            }
            header = None;
            continue;
        }
        let fields = split_line(line);
        match header {
            None => header = Some(fields),
            Some(ref columns) => {
                if let Some(record) = parse_row(columns, &fields, defaults.as_deref()) {
                    records.push(record);
                } else {
                    trace!("skipping unparseable row: {line}");
                }
            }
        }
    }

    records
}

fn parse_row(
    columns: &[String],
    fields: &[String],
    defaults: Option<&[String]>,
) -> Option<FluxRecord> {
    let mut table = 0;
    let mut time = None;
    let mut value = None;
    let mut field = None;
    let mut measurement = None;
    let mut tags = FxHashMap::default();

    for (index, (column, cell)) in columns.iter().zip(fields.iter()).enumerate() {
        let cell = if cell.is_empty() {
            defaults
                .and_then(|d| d.get(index))
                .map_or("", String::as_str)
        } else {
            cell.as_str()
        };
        match column.as_str() {
            "table" => table = cell.parse::<usize>().unwrap_or(0),
            "_time" => time = cell.parse::<Timestamp>().ok(),
            "_value" => value = cell.parse::<f64>().ok(),
            "_field" => field = Some(cell.to_owned()),
            "_measurement" => measurement = Some(cell.to_owned()),
            c if STRUCTURAL_COLUMNS.contains(&c) => {}
            _ => {
                tags.insert(column.clone(), cell.to_owned());
            }
        }
    }

    Some(FluxRecord {
        table,
        time: time?,
        value: value?,
        field: field?,
        measurement: measurement.unwrap_or_default(),
        tags,
    })
}

/// Split one CSV line, honoring double-quoted cells and doubled-quote
/// escapes.
fn split_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT_BODY: &str = "\
#group,false,false,true,true,false,false,true,true,true\r
#datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,double,string,string,string\r
#default,_result,,,,,,,,\r
,result,table,_start,_stop,_time,_value,_field,_measurement,uuid\r
,,0,2024-01-01T00:00:00Z,2024-01-02T00:00:00Z,2024-01-01T11:58:00Z,275,latestValue,vz_measurement,1810eb97\r
,,1,2024-01-01T00:00:00Z,2024-01-02T00:00:00Z,2024-01-01T11:59:00Z,125000,currentCounter,vz_measurement,22792059\r
";

    #[test]
    fn parses_snapshot_rows() {
        let records = parse_csv(SNAPSHOT_BODY);
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.field, "latestValue");
        assert_eq!(first.measurement, "vz_measurement");
        assert!((first.value - 275.0).abs() < f64::EPSILON);
        assert_eq!(first.tags.get("uuid").map(String::as_str), Some("1810eb97"));
        assert_eq!(
            first.time,
            "2024-01-01T11:58:00Z".parse::<Timestamp>().expect("time")
        );

        assert_eq!(records[1].field, "currentCounter");
        assert_eq!(records[1].table, 1);
    }

    #[test]
    fn parses_multiple_result_blocks() {
        let body = "\
#datatype,string,long,dateTime:RFC3339,double,string,string
#default,_result,,,,,
,result,table,_time,_value,_field,_measurement
,,0,2024-01-01T00:00:00Z,1,anomaly,vz_measurement

#datatype,string,long,dateTime:RFC3339,double,string,string
#default,_result,,,,,
,result,table,_time,_value,_field,_measurement
,,0,2024-01-01T00:01:00Z,2,value,vz_measurement
";
        let records = parse_csv(body);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].field, "anomaly");
        assert_eq!(records[1].field, "value");
    }

    #[test]
    fn skips_rows_without_value_or_time() {
        let body = "\
,result,table,_time,_value,_field,_measurement
,,0,2024-01-01T00:00:00Z,,value,vz_measurement
,,0,not-a-time,42,value,vz_measurement
,,0,2024-01-01T00:02:00Z,42,value,vz_measurement
";
        let records = parse_csv(body);
        assert_eq!(records.len(), 1);
        assert!((records[0].value - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn default_annotation_fills_empty_cells() {
        let body = "\
#datatype,string,long,dateTime:RFC3339,double,string,string,string
#default,_result,,,42,value,vz_measurement,meter-1
,result,table,_time,_value,_field,_measurement,uuid
,,0,2024-01-01T00:00:00Z,,,,
,,0,2024-01-01T00:01:00Z,7,other,other_measurement,meter-2
";
        let records = parse_csv(body);
        assert_eq!(records.len(), 2);

        // Empty cells take the defaulted column values.
        let defaulted = &records[0];
        assert!((defaulted.value - 42.0).abs() < f64::EPSILON);
        assert_eq!(defaulted.field, "value");
        assert_eq!(defaulted.measurement, "vz_measurement");
        assert_eq!(
            defaulted.tags.get("uuid").map(String::as_str),
            Some("meter-1")
        );

        // Populated cells win over the defaults.
        let explicit = &records[1];
        assert!((explicit.value - 7.0).abs() < f64::EPSILON);
        assert_eq!(explicit.field, "other");
        assert_eq!(explicit.tags.get("uuid").map(String::as_str), Some("meter-2"));
    }

    #[test]
    fn default_annotation_scoped_to_its_block() {
        let body = "\
#default,_result,,,,anomaly,vz_measurement
,result,table,_time,_value,_field,_measurement
,,0,2024-01-01T00:00:00Z,1,,

,result,table,_time,_value,_field,_measurement
,,0,2024-01-01T00:01:00Z,2,,
";
        let records = parse_csv(body);
        // The first block's row is filled from its defaults; the second
        // block has none, so its row lacks a field key and is skipped.
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field, "anomaly");
    }

    #[test]
    fn quoted_cells_with_commas() {
        let cells = split_line(",\"a,b\",\"say \"\"hi\"\"\",plain");
        assert_eq!(cells, vec!["", "a,b", "say \"hi\"", "plain"]);
    }

    #[test]
    fn empty_body_yields_no_records() {
        assert!(parse_csv("").is_empty());
        assert!(parse_csv("\r\n\r\n").is_empty());
    }
}
