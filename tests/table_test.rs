// tests/table_test.rs

use vtop_scraper::{PERIOD_COLUMN, VtopError, normalize, parse_table, write_table};

const SAMPLE_TABLE: &str = "\
<tr><th>Date</th><th>Day</th><th>Event</th></tr>
<tr><td>01-08-2025</td><td>Friday</td><td>Instruction Day</td></tr>
<tr><td>02-08-2025</td><td>Saturday</td><td>Holiday</td></tr>";

#[test]
fn normalize_strips_lines_and_drops_blanks() {
    let raw = "  <tr>  \n\n\t<td>a</td>\n   \n</tr>  \n";
    let clean = normalize(raw);
    assert_eq!(clean, "<tr>\n<td>a</td>\n</tr>");
}

#[test]
fn normalize_is_idempotent() {
    let raw = "  <table>\n\n  <tr><td>x</td></tr>\n</table>\n";
    let once = normalize(raw);
    assert_eq!(normalize(&once), once);
}

#[test]
fn converter_preserves_row_and_column_order() {
    let table = parse_table(SAMPLE_TABLE, None).unwrap();
    assert_eq!(table.headers, vec!["Date", "Day", "Event"]);
    assert_eq!(table.rows.len(), 2);
    assert_eq!(
        table.rows[0],
        vec!["01-08-2025", "Friday", "Instruction Day"]
    );
    assert_eq!(table.rows[1], vec!["02-08-2025", "Saturday", "Holiday"]);
}

#[test]
fn period_label_becomes_the_first_column_of_every_record() {
    let table = parse_table(SAMPLE_TABLE, Some("AUG-2025")).unwrap();
    assert_eq!(table.headers[0], PERIOD_COLUMN);
    assert_eq!(table.headers.len(), 4);
    for row in &table.rows {
        assert_eq!(row[0], "AUG-2025");
        assert_eq!(row.len(), 4);
    }
}

#[test]
fn header_only_table_yields_zero_records() {
    let table = parse_table("<tr><th>Date</th><th>Event</th></tr>", None).unwrap();
    assert_eq!(table.headers, vec!["Date", "Event"]);
    assert!(table.rows.is_empty());
}

#[test]
fn table_without_rows_is_an_error() {
    let err = parse_table("<div>no table here</div>", None).unwrap_err();
    assert!(matches!(err, VtopError::EmptyTable));
}

#[test]
fn ragged_row_is_rejected_not_truncated() {
    let html = "\
<tr><th>A</th><th>B</th><th>C</th></tr>
<tr><td>1</td><td>2</td><td>3</td></tr>
<tr><td>only</td><td>two</td></tr>";
    let err = parse_table(html, None).unwrap_err();
    match err {
        VtopError::RowShapeMismatch {
            row,
            expected,
            found,
        } => {
            assert_eq!(row, 3);
            assert_eq!(expected, 3);
            assert_eq!(found, 2);
        }
        other => panic!("expected RowShapeMismatch, got {other:?}"),
    }
}

#[test]
fn duplicate_column_names_are_rejected() {
    let html = "<tr><th>Date</th><th>Date</th></tr><tr><td>1</td><td>2</td></tr>";
    let err = parse_table(html, None).unwrap_err();
    assert!(matches!(err, VtopError::DuplicateColumn(name) if name == "Date"));
}

#[test]
fn cell_text_is_trimmed_and_whitespace_collapsed() {
    let html = "\
<tr><th>Course\n Title</th><th>Slot</th></tr>
<tr><td>  Data   Structures </td><td><b>A1</b> + TA1</td></tr>";
    let table = parse_table(html, None).unwrap();
    assert_eq!(table.headers, vec!["Course Title", "Slot"]);
    assert_eq!(table.rows[0], vec!["Data Structures", "A1 + TA1"]);
}

#[test]
fn written_file_has_header_then_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    let table = parse_table(SAMPLE_TABLE, Some("AUG-2025")).unwrap();
    write_table(&table, &path).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let mut lines = contents.lines();
    assert_eq!(lines.next().unwrap(), "Month,Date,Day,Event");
    assert_eq!(
        lines.next().unwrap(),
        "AUG-2025,01-08-2025,Friday,Instruction Day"
    );
    assert_eq!(lines.next().unwrap(), "AUG-2025,02-08-2025,Saturday,Holiday");
    assert!(lines.next().is_none());
}
