//! Typed access to spreadsheet content.
//!
//! The rest of the engine never touches calamine directly: it sees sheet
//! names and grids of [`Cell`]s through the [`SheetSource`] trait, which
//! also keeps the parsers testable against hand-built grids.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Reader, Sheets};
use chrono::{Duration, NaiveDate, NaiveDateTime};

use coercion::{parse_date_flexible, to_float_safe};

/// One spreadsheet cell, already coerced to the type the writer used.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
    Empty,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Textual view of the cell, trimmed. Numbers render without a
    /// trailing `.0` so header and label matching stays predictable.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(v) => {
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    format!("{}", *v as i64)
                } else {
                    v.to_string()
                }
            }
            Cell::DateTime(dt) => dt.format("%d.%m.%Y %H:%M:%S").to_string(),
            Cell::Empty => String::new(),
        }
    }

    /// Numeric view; text goes through total coercion, everything else is 0.
    pub fn as_number(&self) -> f64 {
        match self {
            Cell::Number(v) => *v,
            Cell::Text(s) => to_float_safe(s),
            _ => 0.0,
        }
    }

    /// Timestamp view: native date cells pass through, text is parsed with
    /// the flexible patterns, numbers are treated as Excel serials.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::DateTime(dt) => Some(*dt),
            Cell::Text(s) => parse_date_flexible(s),
            Cell::Number(v) => excel_serial_to_datetime(*v),
            Cell::Empty => None,
        }
    }
}

pub type Grid = Vec<Vec<Cell>>;

/// What the engine needs from a workbook: the list of sheets, and any sheet
/// as a typed grid.
pub trait SheetSource {
    fn sheet_names(&self) -> Vec<String>;
    fn grid(&mut self, name: &str) -> Result<Grid>;
}

/// Calamine-backed [`SheetSource`] for XLS and XLSX workbooks.
pub struct WorkbookSource<RS: Read + Seek> {
    workbook: Sheets<RS>,
}

impl WorkbookSource<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let workbook = open_workbook_auto(&path)
            .with_context(|| format!("Cannot open workbook {}", path.as_ref().display()))?;
        Ok(Self { workbook })
    }
}

impl<RS: Read + Seek + Clone> WorkbookSource<RS> {
    /// Opens a workbook from any seekable byte stream (uploaded file,
    /// in-memory cursor, ...).
    pub fn from_reader(rs: RS) -> Result<Self> {
        let workbook =
            open_workbook_auto_from_rs(rs).context("Stream is not readable as a spreadsheet")?;
        Ok(Self { workbook })
    }
}

impl<RS: Read + Seek> SheetSource for WorkbookSource<RS> {
    fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names().to_vec()
    }

    fn grid(&mut self, name: &str) -> Result<Grid> {
        let range = self
            .workbook
            .worksheet_range(name)
            .with_context(|| format!("Cannot read sheet '{}'", name))?;

        let grid = range
            .rows()
            .map(|row| row.iter().map(data_to_cell).collect())
            .collect();
        Ok(grid)
    }
}

/// In-memory [`SheetSource`] over pre-built grids. Lets alternative
/// container formats (and tests) feed the engine without a workbook file.
pub struct MemorySource {
    sheets: Vec<(String, Grid)>,
}

impl MemorySource {
    pub fn new(sheets: Vec<(String, Grid)>) -> Self {
        Self { sheets }
    }
}

impl SheetSource for MemorySource {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(n, _)| n.clone()).collect()
    }

    fn grid(&mut self, name: &str) -> Result<Grid> {
        self.sheets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, g)| g.clone())
            .with_context(|| format!("no sheet named '{}'", name))
    }
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
            .map(Cell::DateTime)
            .unwrap_or(Cell::Empty),
        Data::DateTimeIso(s) => parse_date_flexible(s)
            .map(Cell::DateTime)
            .unwrap_or_else(|| Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) => Cell::Empty,
        Data::Empty => Cell::Empty,
    }
}

/// Excel serial datetime conversion using the 1899-12-30 base; the day
/// fraction carries the time of day.
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 1.0 || serial >= 100_000.0 {
        return None;
    }
    let days = serial.floor() as i64;
    let secs = ((serial - serial.floor()) * 86_400.0).round() as i64;
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = base.checked_add_signed(Duration::days(days))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt + Duration::seconds(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excel_serial_roundtrip() {
        // 2021-10-15 is serial 44484
        let dt = excel_serial_to_datetime(44484.0).unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2021, 10, 15).unwrap());

        // half a day of fraction is noon
        let noon = excel_serial_to_datetime(44484.5).unwrap();
        assert_eq!(noon.format("%H:%M:%S").to_string(), "12:00:00");
    }

    #[test]
    fn serial_out_of_range_is_none() {
        assert_eq!(excel_serial_to_datetime(0.5), None);
        assert_eq!(excel_serial_to_datetime(f64::NAN), None);
    }

    #[test]
    fn cell_text_view() {
        assert_eq!(Cell::Number(100.0).as_text(), "100");
        assert_eq!(Cell::Number(100.5).as_text(), "100.5");
        assert_eq!(Cell::Text("  Дивиденды ".into()).as_text(), "Дивиденды");
        assert_eq!(Cell::Empty.as_text(), "");
    }

    #[test]
    fn cell_number_view_is_total() {
        assert_eq!(Cell::Text("1 234,56".into()).as_number(), 1234.56);
        assert_eq!(Cell::Text("мусор".into()).as_number(), 0.0);
        assert_eq!(Cell::Empty.as_number(), 0.0);
    }

    #[test]
    fn cell_datetime_from_text() {
        let dt = Cell::Text("15.03.2023".into()).as_datetime().unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2023, 3, 15).unwrap());
        assert_eq!(Cell::Text("Итого".into()).as_datetime(), None);
    }
}
