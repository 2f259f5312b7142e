//! CSV reader for personnel exports.
//!
//! Turns a raw byte stream into one [`ImportRow`] per non-blank data line:
//! - the delimiter is detected from the header line (comma by default)
//! - columns are matched by exact header name; unknown columns are ignored
//!   and missing ones leave their field absent
//! - problems inside a row are recorded on that row and never abort the parse
//!
//! Only a stream that cannot be read, or whose header cannot be decoded,
//! fails the whole operation.

use std::io::Read;

use tracing::{debug, info, instrument, warn};

use staffload_shared::{ImportRow, Result, StaffloadError, ValidationRules};

use crate::dates::parse_date;
use crate::validation::validate_row;

/// UTF-8 byte order mark some spreadsheet tools prepend.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Delimiters considered during detection, in tie-break order.
const CANDIDATE_DELIMITERS: &[u8] = b",;\t|";

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// A known CSV column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    PayrollNumber,
    Forenames,
    Surname,
    DateOfBirth,
    Telephone,
    Mobile,
    Address,
    Address2,
    Postcode,
    Email,
    StartDate,
}

impl Column {
    pub const ALL: [Column; 11] = [
        Column::PayrollNumber,
        Column::Forenames,
        Column::Surname,
        Column::DateOfBirth,
        Column::Telephone,
        Column::Mobile,
        Column::Address,
        Column::Address2,
        Column::Postcode,
        Column::Email,
        Column::StartDate,
    ];

    /// Header name as it appears in the export.
    pub fn header(self) -> &'static str {
        match self {
            Column::PayrollNumber => "Personnel_Records.Payroll_Number",
            Column::Forenames => "Personnel_Records.Forenames",
            Column::Surname => "Personnel_Records.Surname",
            Column::DateOfBirth => "Personnel_Records.Date_of_Birth",
            Column::Telephone => "Personnel_Records.Telephone",
            Column::Mobile => "Personnel_Records.Mobile",
            Column::Address => "Personnel_Records.Address",
            Column::Address2 => "Personnel_Records.Address_2",
            Column::Postcode => "Personnel_Records.Postcode",
            Column::Email => "Personnel_Records.EMail_Home",
            Column::StartDate => "Personnel_Records.Start_Date",
        }
    }

    /// Field name used in row error messages.
    pub fn label(self) -> &'static str {
        match self {
            Column::PayrollNumber => "Payroll Number",
            Column::Forenames => "Forenames",
            Column::Surname => "Surname",
            Column::DateOfBirth => "Date of Birth",
            Column::Telephone => "Telephone",
            Column::Mobile => "Mobile",
            Column::Address => "Address",
            Column::Address2 => "Address 2",
            Column::Postcode => "Postcode",
            Column::Email => "Email",
            Column::StartDate => "Start Date",
        }
    }

    /// Exact, case-sensitive header lookup.
    pub fn from_header(name: &str) -> Option<Column> {
        Column::ALL.into_iter().find(|c| c.header() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Position of each known column in the record, if present.
#[derive(Debug, Default)]
struct ColumnMap {
    positions: [Option<usize>; Column::ALL.len()],
}

impl ColumnMap {
    fn from_headers(headers: &csv::ByteRecord) -> Result<Self> {
        let mut map = Self::default();
        for (pos, raw) in headers.iter().enumerate() {
            let name = std::str::from_utf8(raw)
                .map_err(|_| StaffloadError::parse("header row is not valid UTF-8"))?
                .trim()
                .trim_start_matches('\u{feff}');
            match Column::from_header(name) {
                Some(column) if map.positions[column.index()].is_none() => {
                    map.positions[column.index()] = Some(pos);
                }
                Some(_) => warn!(column = name, "duplicate column ignored"),
                None => debug!(column = name, "unrecognised column ignored"),
            }
        }

        let missing: Vec<&str> = Column::ALL
            .into_iter()
            .filter(|c| map.positions[c.index()].is_none())
            .map(Column::header)
            .collect();
        if !missing.is_empty() {
            warn!(?missing, "expected columns not found; their fields will be empty");
        }
        Ok(map)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Pick the delimiter that occurs most often outside quotes in `header_line`.
pub fn detect_delimiter(header_line: &str) -> u8 {
    let mut counts = [0usize; CANDIDATE_DELIMITERS.len()];
    let mut in_quotes = false;
    for b in header_line.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if !in_quotes {
            if let Some(i) = CANDIDATE_DELIMITERS.iter().position(|&d| d == b) {
                counts[i] += 1;
            }
        }
    }

    // Earliest candidate wins ties; no candidate at all means comma.
    let mut best = 0;
    for i in 1..counts.len() {
        if counts[i] > counts[best] {
            best = i;
        }
    }
    CANDIDATE_DELIMITERS[best]
}

/// Read, parse, and validate every data row in `input`.
#[instrument(skip_all)]
pub fn parse_rows(mut input: impl Read, rules: &ValidationRules) -> Result<Vec<ImportRow>> {
    let mut content = Vec::new();
    input
        .read_to_end(&mut content)
        .map_err(|e| StaffloadError::parse(format!("failed to read input: {e}")))?;

    let content = content.strip_prefix(UTF8_BOM).unwrap_or(&content);

    // The header is the first non-blank line; the reader starts there too.
    let mut header_offset = 0;
    let mut header_line = None;
    for line in content.split_inclusive(|&b| b == b'\n') {
        let text = String::from_utf8_lossy(line);
        if !text.trim().is_empty() {
            header_line = Some(text);
            break;
        }
        header_offset += line.len();
    }
    let Some(header_line) = header_line else {
        info!("input contains no header row");
        return Ok(Vec::new());
    };
    let delimiter = detect_delimiter(&header_line);
    let content = &content[header_offset..];

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content);

    let headers = reader
        .byte_headers()
        .map_err(|e| StaffloadError::parse(format!("failed to read header row: {e}")))?
        .clone();
    let columns = ColumnMap::from_headers(&headers)?;

    let mut rows = Vec::new();
    let mut record = csv::ByteRecord::new();
    loop {
        match reader.read_byte_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                if is_blank(&record) {
                    continue;
                }
                let mut row = extract_row(rows.len() + 1, &record, &columns);
                validate_row(&mut row, rules);
                rows.push(row);
            }
            Err(e) if e.is_io_error() => {
                return Err(StaffloadError::parse(format!("failed to read CSV: {e}")));
            }
            Err(e) => {
                let row_number = rows.len() + 1;
                warn!(row = row_number, error = %e, "row could not be parsed");
                rows.push(ImportRow::unparseable(row_number, e));
            }
        }
    }

    info!(
        rows = rows.len(),
        valid = rows.iter().filter(|r| r.is_valid()).count(),
        delimiter = %char::from(delimiter).escape_default(),
        "parsed CSV"
    );
    Ok(rows)
}

fn is_blank(record: &csv::ByteRecord) -> bool {
    record.iter().all(|cell| cell.trim_ascii().is_empty())
}

/// Pull every known field out of `record`. Undecodable cells flag only their
/// own field.
fn extract_row(row_number: usize, record: &csv::ByteRecord, columns: &ColumnMap) -> ImportRow {
    let mut row = ImportRow::new(row_number);
    let mut undecodable = Vec::new();

    let mut cell = |column: Column| -> Option<String> {
        let raw = record.get(columns.positions[column.index()]?)?;
        match std::str::from_utf8(raw) {
            Ok(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            Err(_) => {
                undecodable.push(column);
                None
            }
        }
    };

    row.payroll_number = cell(Column::PayrollNumber);
    row.forenames = cell(Column::Forenames);
    row.surname = cell(Column::Surname);
    row.telephone = cell(Column::Telephone);
    row.mobile = cell(Column::Mobile);
    row.address_line1 = cell(Column::Address);
    row.address_line2 = cell(Column::Address2);
    row.postcode = cell(Column::Postcode);
    row.email = cell(Column::Email);
    row.date_of_birth_raw = cell(Column::DateOfBirth);
    row.start_date_raw = cell(Column::StartDate);

    for column in &undecodable {
        row.add_error(format!("{} contains invalid characters", column.label()));
    }

    row.date_of_birth = extract_date(
        &mut row,
        Column::DateOfBirth,
        undecodable.contains(&Column::DateOfBirth),
    );
    row.start_date = extract_date(
        &mut row,
        Column::StartDate,
        undecodable.contains(&Column::StartDate),
    );

    row
}

/// Parse a date column, flagging blank or unparseable values.
fn extract_date(
    row: &mut ImportRow,
    column: Column,
    already_flagged: bool,
) -> Option<chrono::NaiveDate> {
    let raw = match column {
        Column::DateOfBirth => row.date_of_birth_raw.clone(),
        _ => row.start_date_raw.clone(),
    };

    match raw {
        None if already_flagged => None,
        None => {
            row.add_error(format!("{} is required", column.label()));
            None
        }
        Some(value) => {
            let parsed = parse_date(&value);
            if parsed.is_none() {
                row.add_error(format!("Invalid {} format: '{value}'", column.label()));
            }
            parsed
        }
    }
}
