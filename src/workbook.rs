//! Spreadsheet document model.
//!
//! The spreadsheet add-in posts a snapshot of the workbook (every sheet's values plus the
//! names of embedded pictures) and expects a list of actions back, which it replays against
//! the live document. [`JsonBook`] applies each mutation to its local snapshot, so later
//! reads observe earlier writes, and records the matching action for the response.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum WorkbookError {
    #[error("sheet '{0}' not found in workbook")]
    SheetNotFound(String),

    #[error("invalid cell reference '{0}'")]
    InvalidCellRef(String),

    #[error("failed to serialize workbook: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A zero-based cell address, parsed from A1 notation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    #[cfg(test)]
    pub fn a1(reference: &str) -> Self {
        match reference.parse() {
            Ok(cell) => cell,
            Err(_) => panic!("invalid A1 reference: {reference}"),
        }
    }
}

impl FromStr for CellRef {
    type Err = WorkbookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WorkbookError::InvalidCellRef(s.to_string());

        let split = s.find(|c: char| c.is_ascii_digit()).ok_or_else(invalid)?;
        let (letters, digits) = s.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid());
        }

        let col = letters
            .chars()
            .try_fold(0usize, |acc, c| {
                let digit = (c.to_ascii_uppercase() as usize) - ('A' as usize) + 1;
                acc.checked_mul(26)?.checked_add(digit)
            })
            .ok_or_else(invalid)?;
        let row: usize = digits.parse().map_err(|_| invalid())?;
        if row == 0 {
            return Err(invalid());
        }

        Ok(CellRef::new(row - 1, col - 1))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut letters = Vec::new();
        let mut n = self.col + 1;
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push(char::from(b'A' + rem as u8));
            n = (n - 1) / 26;
        }
        letters.reverse();
        write!(f, "{}{}", letters.into_iter().collect::<String>(), self.row + 1)
    }
}

/// The value held by a single cell, as exchanged with the add-in.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<u64> for CellValue {
    fn from(value: u64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Text(value.format("%Y-%m-%d").to_string())
    }
}

impl From<DateTime<Utc>> for CellValue {
    fn from(value: DateTime<Utc>) -> Self {
        CellValue::Text(value.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Empty, Into::into)
    }
}

/// A rendered image to place on a sheet.
#[derive(Clone, Debug, PartialEq)]
pub struct Picture {
    /// Name used to find and replace the picture on later runs.
    pub name: String,
    /// PNG-encoded image bytes.
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// The operations the dashboard pipeline needs from a spreadsheet document.
pub trait Workbook {
    fn get_cell_value(&self, sheet: &str, cell: CellRef) -> Result<CellValue, WorkbookError>;

    /// Writes a block of rows with its top-left corner at `anchor`.
    fn write_range(
        &mut self,
        sheet: &str,
        anchor: CellRef,
        rows: &[Vec<CellValue>],
    ) -> Result<(), WorkbookError>;

    /// Clears the contiguous region that starts at `anchor`.
    fn clear_range(&mut self, sheet: &str, anchor: CellRef) -> Result<(), WorkbookError>;

    /// Places `picture` at `anchor`, replacing any picture with the same name.
    fn embed_image(
        &mut self,
        sheet: &str,
        anchor: CellRef,
        picture: &Picture,
    ) -> Result<(), WorkbookError>;

    fn serialize(&self) -> Result<serde_json::Value, WorkbookError>;
}

/// The workbook snapshot posted by the add-in.
#[derive(Clone, Debug, Deserialize)]
pub struct BookPayload {
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub book: Option<serde_json::Value>,
    pub sheets: Vec<SheetPayload>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SheetPayload {
    pub name: String,
    #[serde(default)]
    pub values: Vec<Vec<CellValue>>,
    #[serde(default)]
    pub pictures: Vec<PicturePayload>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PicturePayload {
    pub name: String,
}

/// A mutation for the add-in to replay against the live document.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Action {
    pub func: String,
    pub args: Vec<serde_json::Value>,
    pub values: Vec<Vec<CellValue>>,
    pub sheet_position: usize,
    pub start_row: usize,
    pub start_column: usize,
    pub row_count: usize,
    pub column_count: usize,
}

#[derive(Debug)]
struct Sheet {
    name: String,
    values: Vec<Vec<CellValue>>,
    pictures: Vec<String>,
}

impl Sheet {
    fn get(&self, cell: CellRef) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.values
            .get(cell.row)
            .and_then(|row| row.get(cell.col))
            .unwrap_or(&EMPTY)
    }

    fn set(&mut self, cell: CellRef, value: CellValue) {
        if self.values.len() <= cell.row {
            self.values.resize_with(cell.row + 1, Vec::new);
        }
        let row = &mut self.values[cell.row];
        if row.len() <= cell.col {
            row.resize_with(cell.col + 1, CellValue::default);
        }
        row[cell.col] = value;
    }

    /// Extent of the table at `anchor`: non-empty cells rightwards along the anchor row and
    /// downwards along the anchor column. An empty anchor yields the single anchor cell.
    fn current_region(&self, anchor: CellRef) -> (usize, usize) {
        if self.get(anchor).is_empty() {
            return (1, 1);
        }
        let rows = (anchor.row..)
            .take_while(|&row| !self.get(CellRef::new(row, anchor.col)).is_empty())
            .count();
        let cols = (anchor.col..)
            .take_while(|&col| !self.get(CellRef::new(anchor.row, col)).is_empty())
            .count();
        (rows, cols)
    }
}

/// A [`Workbook`] backed by the add-in's JSON snapshot.
#[derive(Debug)]
pub struct JsonBook {
    sheets: Vec<Sheet>,
    actions: Vec<Action>,
}

impl JsonBook {
    pub fn new(payload: BookPayload) -> Self {
        let sheets = payload
            .sheets
            .into_iter()
            .map(|sheet| Sheet {
                name: sheet.name,
                values: sheet.values,
                pictures: sheet.pictures.into_iter().map(|p| p.name).collect(),
            })
            .collect();

        Self {
            sheets,
            actions: Vec::new(),
        }
    }

    /// The actions recorded so far, in the order they were performed.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Reads back the table starting at `anchor`, using the same extent `clear_range` clears.
    pub fn read_table(
        &self,
        sheet: &str,
        anchor: CellRef,
    ) -> Result<Vec<Vec<CellValue>>, WorkbookError> {
        let (_, sheet) = self.sheet(sheet)?;
        if sheet.get(anchor).is_empty() {
            return Ok(Vec::new());
        }
        let (rows, cols) = sheet.current_region(anchor);
        Ok((0..rows)
            .map(|r| {
                (0..cols)
                    .map(|c| sheet.get(CellRef::new(anchor.row + r, anchor.col + c)).clone())
                    .collect()
            })
            .collect())
    }

    fn sheet(&self, name: &str) -> Result<(usize, &Sheet), WorkbookError> {
        self.sheets
            .iter()
            .enumerate()
            .find(|(_, sheet)| sheet.name == name)
            .ok_or_else(|| WorkbookError::SheetNotFound(name.to_string()))
    }

    fn sheet_mut(&mut self, name: &str) -> Result<(usize, &mut Sheet), WorkbookError> {
        self.sheets
            .iter_mut()
            .enumerate()
            .find(|(_, sheet)| sheet.name == name)
            .ok_or_else(|| WorkbookError::SheetNotFound(name.to_string()))
    }
}

impl Workbook for JsonBook {
    fn get_cell_value(&self, sheet: &str, cell: CellRef) -> Result<CellValue, WorkbookError> {
        let (_, sheet) = self.sheet(sheet)?;
        Ok(sheet.get(cell).clone())
    }

    fn write_range(
        &mut self,
        sheet: &str,
        anchor: CellRef,
        rows: &[Vec<CellValue>],
    ) -> Result<(), WorkbookError> {
        let (position, target) = self.sheet_mut(sheet)?;

        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if width == 0 {
            return Ok(());
        }

        let mut values = Vec::with_capacity(rows.len());
        for (r, row) in rows.iter().enumerate() {
            let mut padded = row.clone();
            padded.resize_with(width, CellValue::default);
            for (c, value) in padded.iter().enumerate() {
                target.set(CellRef::new(anchor.row + r, anchor.col + c), value.clone());
            }
            values.push(padded);
        }

        self.actions.push(Action {
            func: "setValues".to_string(),
            args: Vec::new(),
            row_count: values.len(),
            column_count: width,
            values,
            sheet_position: position,
            start_row: anchor.row,
            start_column: anchor.col,
        });
        Ok(())
    }

    fn clear_range(&mut self, sheet: &str, anchor: CellRef) -> Result<(), WorkbookError> {
        let (position, target) = self.sheet_mut(sheet)?;
        let (rows, cols) = target.current_region(anchor);

        for r in 0..rows {
            for c in 0..cols {
                let cell = CellRef::new(anchor.row + r, anchor.col + c);
                if !target.get(cell).is_empty() {
                    target.set(cell, CellValue::Empty);
                }
            }
        }

        self.actions.push(Action {
            func: "clearContents".to_string(),
            args: Vec::new(),
            values: Vec::new(),
            sheet_position: position,
            start_row: anchor.row,
            start_column: anchor.col,
            row_count: rows,
            column_count: cols,
        });
        Ok(())
    }

    fn embed_image(
        &mut self,
        sheet: &str,
        anchor: CellRef,
        picture: &Picture,
    ) -> Result<(), WorkbookError> {
        let (position, target) = self.sheet_mut(sheet)?;
        let image = BASE64.encode(&picture.png);

        let (func, args) = match target.pictures.iter().position(|name| *name == picture.name) {
            Some(index) => (
                "updatePicture",
                vec![
                    json!(image),
                    json!(index),
                    json!(picture.name),
                    json!(picture.width),
                    json!(picture.height),
                ],
            ),
            None => {
                target.pictures.push(picture.name.clone());
                (
                    "addPicture",
                    vec![
                        json!(image),
                        json!(anchor.col),
                        json!(anchor.row),
                        json!(picture.name),
                        json!(picture.width),
                        json!(picture.height),
                    ],
                )
            }
        };

        self.actions.push(Action {
            func: func.to_string(),
            args,
            values: Vec::new(),
            sheet_position: position,
            start_row: anchor.row,
            start_column: anchor.col,
            row_count: 1,
            column_count: 1,
        });
        Ok(())
    }

    fn serialize(&self) -> Result<serde_json::Value, WorkbookError> {
        Ok(json!({ "actions": serde_json::to_value(&self.actions)? }))
    }
}
