use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::time::{parse_time, TimeParseError};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One audio slice to cut out of a source file
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// 1-based data row this segment was read from
    pub row: usize,

    /// Start time in seconds
    pub start: f64,

    /// End time in seconds, always greater than `start`
    pub end: f64,

    /// Custom output name, already trimmed and non-empty
    pub name: Option<String>,
}

/// Which CSV columns hold the segment fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnLayout {
    /// Zero-based column index of the start time
    pub start_col: usize,

    /// Zero-based column index of the end time
    pub end_col: usize,

    /// Zero-based column index of the optional segment name
    pub name_col: Option<usize>,

    /// Whether the first row is a header to skip
    pub has_header: bool,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            start_col: 0,
            end_col: 1,
            name_col: None,
            has_header: true,
        }
    }
}

impl ColumnLayout {
    /// Reject layouts where two fields share a column
    pub fn validate(&self) -> Result<(), SegmentError> {
        if self.start_col == self.end_col {
            return Err(SegmentError::ColumnConflict(
                "start and end columns must be different".to_string(),
            ));
        }

        if let Some(name_col) = self.name_col {
            if name_col == self.start_col || name_col == self.end_col {
                return Err(SegmentError::ColumnConflict(
                    "name column conflicts with time columns".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Minimum number of columns a row needs to carry both times
    pub fn required_columns(&self) -> usize {
        self.start_col.max(self.end_col) + 1
    }
}

/// Why a row was left out of the plan
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    InsufficientColumns { needed: usize, found: usize },
    InvalidTime(TimeParseError),
    EndNotAfterStart { start: f64, end: f64 },
    Unreadable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InsufficientColumns { needed, found } => {
                write!(f, "insufficient columns (needs {}, has {})", needed, found)
            }
            SkipReason::InvalidTime(err) => write!(f, "{}", err),
            SkipReason::EndNotAfterStart { start, end } => {
                write!(f, "end time {} is not after start time {}", end, start)
            }
            SkipReason::Unreadable(msg) => write!(f, "unreadable row: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: SkipReason,
}

/// Segments read from a CSV, plus what was dropped on the way
#[derive(Debug, Clone, Default)]
pub struct SegmentPlan {
    pub segments: Vec<Segment>,
    pub rows_read: usize,
    pub skipped: Vec<SkippedRow>,
}

#[derive(thiserror::Error, Debug)]
pub enum SegmentError {
    #[error("Column configuration error: {0}")]
    ColumnConflict(String),

    #[error("No valid segments found in {}", .0.display())]
    NoSegments(PathBuf),

    #[error("Failed to read segment file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Read and validate a segment CSV from disk
pub fn read_segments(path: &Path, layout: &ColumnLayout) -> Result<SegmentPlan, SegmentError> {
    layout.validate()?;

    let data = fs_err::read(path).map_err(|source| SegmentError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let plan = parse_segments(&data, layout)?;
    if plan.segments.is_empty() {
        return Err(SegmentError::NoSegments(path.to_path_buf()));
    }

    Ok(plan)
}

/// Validate rows of in-memory CSV data. An empty plan is not an error here.
///
/// Empty lines count as data rows with no columns, so they are warned about
/// and row numbers match the line order of the file.
pub fn parse_segments(data: &[u8], layout: &ColumnLayout) -> Result<SegmentPlan, SegmentError> {
    layout.validate()?;

    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let mut rows = raw_rows(data).into_iter();

    if layout.has_header {
        if let Some(RawRow::Record(Err(err))) = rows.next() {
            tracing::warn!("Header row could not be read: {}", err);
        }
    }

    let mut plan = SegmentPlan::default();
    for (index, raw) in rows.enumerate() {
        let row = index + 1;
        plan.rows_read += 1;

        let outcome = match raw {
            RawRow::Blank => Err(SkipReason::InsufficientColumns {
                needed: layout.required_columns(),
                found: 0,
            }),
            RawRow::Record(Ok(record)) => validate_row(row, &record, layout),
            RawRow::Record(Err(err)) => Err(SkipReason::Unreadable(err.to_string())),
        };

        match outcome {
            Ok(segment) => plan.segments.push(segment),
            Err(reason) => {
                tracing::warn!("Row {}: {} - skipping", row, reason);
                plan.skipped.push(SkippedRow { row, reason });
            }
        }
    }

    tracing::debug!(
        "Read {} rows, {} usable segments",
        plan.rows_read,
        plan.segments.len()
    );

    Ok(plan)
}

enum RawRow {
    Blank,
    Record(Result<csv::StringRecord, csv::Error>),
}

/// Every line of `data` in order, including the empty ones the csv reader skips
fn raw_rows(data: &[u8]) -> Vec<RawRow> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let mut rows = Vec::new();
    let mut offset = 0;

    loop {
        for _ in 0..empty_lines_at(data, offset) {
            rows.push(RawRow::Blank);
        }

        let mut record = csv::StringRecord::new();
        match reader.read_record(&mut record) {
            Ok(true) => rows.push(RawRow::Record(Ok(record))),
            Ok(false) => break,
            Err(err) => rows.push(RawRow::Record(Err(err))),
        }

        let next = reader.position().byte() as usize;
        if next <= offset {
            break;
        }
        offset = next;
    }

    rows
}

/// Number of empty lines starting at `offset`, the end of the previous record
fn empty_lines_at(data: &[u8], mut offset: usize) -> usize {
    // the reader may stop between the CR and LF of a record terminator
    if offset > 0 && data.get(offset - 1) == Some(&b'\r') && data.get(offset) == Some(&b'\n') {
        offset += 1;
    }

    let mut count = 0;
    loop {
        match data.get(offset..).unwrap_or_default() {
            [b'\r', b'\n', ..] => offset += 2,
            [b'\n', ..] | [b'\r', ..] => offset += 1,
            _ => break,
        }
        count += 1;
    }

    count
}

fn validate_row(
    row: usize,
    record: &csv::StringRecord,
    layout: &ColumnLayout,
) -> Result<Segment, SkipReason> {
    let needed = layout.required_columns();
    if record.len() < needed {
        return Err(SkipReason::InsufficientColumns {
            needed,
            found: record.len(),
        });
    }

    let start = parse_time(&record[layout.start_col]).map_err(SkipReason::InvalidTime)?;
    let end = parse_time(&record[layout.end_col]).map_err(SkipReason::InvalidTime)?;

    if end <= start {
        return Err(SkipReason::EndNotAfterStart { start, end });
    }

    let name = layout
        .name_col
        .and_then(|col| record.get(col))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    Ok(Segment {
        row,
        start,
        end,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ColumnLayout {
        ColumnLayout::default()
    }

    #[test]
    fn test_reads_rows_after_header() {
        let csv = "start,end\n0:10,0:20\n1:00,1:30.5\n";
        let plan = parse_segments(csv.as_bytes(), &layout()).unwrap();

        assert_eq!(plan.rows_read, 2);
        assert_eq!(plan.segments.len(), 2);
        assert_eq!(plan.segments[0].start, 10.0);
        assert_eq!(plan.segments[1].end, 90.5);
        assert_eq!(plan.segments[1].row, 2);
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_no_header_keeps_first_row() {
        let mut layout = layout();
        layout.has_header = false;

        let plan = parse_segments(b"5,10\n", &layout).unwrap();
        assert_eq!(plan.segments.len(), 1);
        assert_eq!(plan.segments[0].row, 1);
    }

    #[test]
    fn test_tolerates_bom() {
        let mut data = UTF8_BOM.to_vec();
        data.extend_from_slice(b"1,2\n");

        let mut layout = layout();
        layout.has_header = false;

        let plan = parse_segments(&data, &layout).unwrap();
        assert_eq!(plan.segments[0].start, 1.0);
    }

    #[test]
    fn test_end_not_after_start_is_skipped() {
        let csv = "start,end\n0:10,0:20\n0:30,0:30\n0:40,0:35\n";
        let plan = parse_segments(csv.as_bytes(), &layout()).unwrap();

        assert_eq!(plan.segments.len(), 1);
        assert_eq!(plan.skipped.len(), 2);
        assert_eq!(plan.skipped[0].row, 2);
        assert!(matches!(
            plan.skipped[1].reason,
            SkipReason::EndNotAfterStart { .. }
        ));
    }

    #[test]
    fn test_short_row_is_skipped() {
        let mut layout = layout();
        layout.start_col = 0;
        layout.end_col = 2;

        let csv = "a,b,c\n1,x,5\n1,2\n";
        let plan = parse_segments(csv.as_bytes(), &layout).unwrap();

        assert_eq!(plan.segments.len(), 1);
        assert_eq!(
            plan.skipped[0],
            SkippedRow {
                row: 2,
                reason: SkipReason::InsufficientColumns { needed: 3, found: 2 },
            }
        );
    }

    #[test]
    fn test_bad_time_reports_row_and_message() {
        let plan = parse_segments(b"h1,h2\nab:cd,5\n", &layout()).unwrap();

        assert!(plan.segments.is_empty());
        let skipped = &plan.skipped[0];
        assert_eq!(skipped.row, 1);
        assert!(skipped.reason.to_string().contains("ab:cd"));
    }

    #[test]
    fn test_name_column_is_trimmed() {
        let mut layout = layout();
        layout.name_col = Some(2);

        let csv = "s,e,n\n0,1,  Intro  \n1,2,   \n2,3\n";
        let plan = parse_segments(csv.as_bytes(), &layout).unwrap();

        let names: Vec<_> = plan.segments.iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec![Some("Intro".to_string()), None, None]);
    }

    #[test]
    fn test_empty_lines_are_counted_rows() {
        let plan = parse_segments(b"start,end\n\n0:10,0:05\n", &layout()).unwrap();

        assert_eq!(plan.rows_read, 2);
        assert_eq!(
            plan.skipped[0],
            SkippedRow {
                row: 1,
                reason: SkipReason::InsufficientColumns { needed: 2, found: 0 },
            }
        );
        assert_eq!(plan.skipped[1].row, 2);
        assert!(matches!(
            plan.skipped[1].reason,
            SkipReason::EndNotAfterStart { .. }
        ));
    }

    #[test]
    fn test_empty_lines_with_crlf_keep_row_numbers() {
        let csv = "start,end\r\n0,5\r\n\r\n\r\n5,10\r\n";
        let plan = parse_segments(csv.as_bytes(), &layout()).unwrap();

        assert_eq!(plan.rows_read, 4);
        assert_eq!(plan.segments.len(), 2);
        assert_eq!(plan.segments[1].row, 4);
        let skipped_rows: Vec<_> = plan.skipped.iter().map(|s| s.row).collect();
        assert_eq!(skipped_rows, vec![2, 3]);
    }

    #[test]
    fn test_trailing_newline_is_not_a_row() {
        let plan = parse_segments(b"start,end\n0,5\n", &layout()).unwrap();
        assert_eq!(plan.rows_read, 1);

        let plan = parse_segments(b"start,end\n0,5\n\n", &layout()).unwrap();
        assert_eq!(plan.rows_read, 2);
    }

    #[test]
    fn test_quoted_multiline_field_is_one_row() {
        let mut layout = layout();
        layout.name_col = Some(2);

        let csv = "s,e,n\n0,5,\"two\nlines\"\n\n5,9,after\n";
        let plan = parse_segments(csv.as_bytes(), &layout).unwrap();

        assert_eq!(plan.rows_read, 3);
        assert_eq!(plan.segments[0].name.as_deref(), Some("two\nlines"));
        assert_eq!(plan.skipped[0].row, 2);
        assert_eq!(plan.segments[1].row, 3);
    }

    #[test]
    fn test_column_conflicts() {
        let same = ColumnLayout {
            start_col: 1,
            end_col: 1,
            ..ColumnLayout::default()
        };
        assert!(matches!(
            same.validate(),
            Err(SegmentError::ColumnConflict(_))
        ));

        let name_clash = ColumnLayout {
            name_col: Some(0),
            ..ColumnLayout::default()
        };
        assert!(name_clash.validate().is_err());

        // rejected before any data is looked at
        assert!(parse_segments(b"not,even\ncsv", &same).is_err());
    }

    #[test]
    fn test_read_segments_requires_one_segment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cuts.csv");
        fs_err::write(&path, "start,end\n5,1\n").unwrap();

        let err = read_segments(&path, &layout()).unwrap_err();
        assert!(matches!(err, SegmentError::NoSegments(_)));
    }

    #[test]
    fn test_read_segments_missing_file() {
        let err = read_segments(Path::new("/nonexistent/cuts.csv"), &layout()).unwrap_err();
        assert!(matches!(err, SegmentError::Io { .. }));
    }
}
