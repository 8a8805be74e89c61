//! CSV event input and digest output.

use std::io::{Read, Write};

use crate::driver::{DigestTable, EventRow, EventTable};
use crate::util::{format_instant, parse_instant};

use super::TableError;

/// Reads an event table from CSV. The header must contain `user`, `time`
/// and `cell` plus every requested prop column; extra columns are ignored.
pub fn read_events_csv<R: Read>(
    rdr: R,
    prop_names: &[String],
) -> Result<EventTable, TableError> {
    let mut reader = csv::Reader::from_reader(rdr);
    let headers = reader.headers()?.clone();

    let column = |name: &str| -> Result<usize, TableError> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| TableError::Schema(format!("required column '{}' is missing", name)))
    };
    let user_idx = column("user")?;
    let time_idx = column("time")?;
    let cell_idx = column("cell")?;
    let prop_idx: Vec<usize> = prop_names
        .iter()
        .map(|name| column(name))
        .collect::<Result<_, _>>()?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let field = |idx: usize| -> Result<&str, TableError> {
            record.get(idx).ok_or_else(|| TableError::Schema(format!(
                "row {} has {} fields, expected at least {}",
                i + 1,
                record.len(),
                idx + 1
            )))
        };
        let time = parse_instant(field(time_idx)?).map_err(|e| TableError::Parse {
            row: i + 1,
            value: e.input,
            message: e.message,
        })?;
        rows.push(EventRow {
            user: field(user_idx)?.to_string(),
            time,
            cell: field(cell_idx)?.to_string(),
            props: prop_idx
                .iter()
                .map(|&idx| field(idx).map(str::to_string))
                .collect::<Result<_, _>>()?,
        });
    }

    Ok(EventTable {
        prop_names: prop_names.to_vec(),
        rows,
    })
}

/// Writes a digest table as CSV, returning the inner writer so callers can
/// finalise wrapping encoders.
pub fn write_digests_csv<W: Write>(wtr: W, table: &DigestTable) -> Result<W, TableError> {
    let mut writer = csv::Writer::from_writer(wtr);

    let mut header: Vec<&str> = vec!["user"];
    header.extend(table.prop_names.iter().map(String::as_str));
    header.extend([
        "digest_id",
        "start_time",
        "end_time",
        "start_cell",
        "end_cell",
        "events_in_cell",
        "num_cells",
        "num_events",
        "type",
    ]);
    writer.write_record(&header)?;

    for row in &table.rows {
        let digest = &row.digest;
        let mut record: Vec<String> = vec![row.user.clone()];
        record.extend(row.props.iter().cloned());
        record.extend([
            row.digest_id.to_string(),
            format_instant(digest.start_time),
            format_instant(digest.end_time),
            digest.start_cell.clone(),
            digest.end_cell.clone(),
            serde_json::to_string(&digest.events_in_cell)
                .map_err(|e| TableError::Io(e.to_string()))?,
            digest.num_cells.to_string(),
            digest.num_events.to_string(),
            digest.kind.as_str().to_string(),
        ]);
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| TableError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::digest::DigestParams;
    use crate::driver::digest_multi_user;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_read_basic_events() {
        let csv = "user,time,cell\n\
                   u1,2022-01-01 10:00:00,A\n\
                   u2,2022-01-01T11:00:00,B\n";
        let table = read_events_csv(csv.as_bytes(), &[]).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].user, "u1");
        assert_eq!(table.rows[0].cell, "A");
        assert_eq!(table.rows[1].time, ts("2022-01-01 11:00:00"));
    }

    #[test]
    fn test_read_with_props_and_extra_columns() {
        let csv = "segment,user,time,cell,noise\n\
                   home,u1,2022-01-01 10:00:00,A,x\n";
        let table =
            read_events_csv(csv.as_bytes(), &["segment".to_string()]).unwrap();
        assert_eq!(table.prop_names, vec!["segment".to_string()]);
        assert_eq!(table.rows[0].props, vec!["home".to_string()]);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let csv = "user,when,cell\nu1,2022-01-01 10:00:00,A\n";
        let err = read_events_csv(csv.as_bytes(), &[]).unwrap_err();
        assert!(matches!(err, TableError::Schema(_)));

        let csv = "user,time,cell\nu1,2022-01-01 10:00:00,A\n";
        let err = read_events_csv(csv.as_bytes(), &["segment".to_string()]).unwrap_err();
        assert!(matches!(err, TableError::Schema(_)));
    }

    #[test]
    fn test_bad_time_is_parse_error_with_row() {
        let csv = "user,time,cell\n\
                   u1,2022-01-01 10:00:00,A\n\
                   u1,not-a-time,B\n";
        let err = read_events_csv(csv.as_bytes(), &[]).unwrap_err();
        match err {
            TableError::Parse { row, value, .. } => {
                assert_eq!(row, 2);
                assert_eq!(value, "not-a-time");
            }
            other => panic!("expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_write_digest_rows() {
        let events = read_events_csv(
            "user,time,cell\n\
             u1,2022-01-01 10:00:00,A\n\
             u1,2022-01-01 10:00:05,B\n"
                .as_bytes(),
            &[],
        )
        .unwrap();
        let digests = digest_multi_user(&events, DigestParams::default()).unwrap();
        let out = write_digests_csv(Vec::new(), &digests).unwrap();
        let text = String::from_utf8(out).unwrap();

        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "user,digest_id,start_time,end_time,start_cell,end_cell,\
             events_in_cell,num_cells,num_events,type"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("u1,0,2022-01-01 10:00:00,2022-01-01 10:00:05,A,B,"));
        assert!(row.contains("\"{\"\"A\"\":1,\"\"B\"\":1}\""));
        assert!(row.ends_with("2,2,2-cell-flapping"));
    }

    #[test]
    fn test_written_events_in_cell_is_json() {
        let events = read_events_csv(
            "user,time,cell\nu1,2022-01-01 10:00:00,A\n".as_bytes(),
            &[],
        )
        .unwrap();
        let digests = digest_multi_user(&events, DigestParams::default()).unwrap();
        let out = write_digests_csv(Vec::new(), &digests).unwrap();
        let text = String::from_utf8(out).unwrap();
        let data_line = text.lines().nth(1).unwrap();

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(data_line.as_bytes());
        let record = rdr.records().next().unwrap().unwrap();
        let parsed: std::collections::BTreeMap<String, u32> =
            serde_json::from_str(record.get(6).unwrap()).unwrap();
        assert_eq!(parsed.get("A"), Some(&1));
    }
}
