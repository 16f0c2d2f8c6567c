//! Flat tabular export of the shot list and its CSV form.
//!
//! Columns are `shot` followed by every ball field as `ball.<name>` and every
//! club field as `club.<name>`, each group sorted by name. Cells hold the
//! recognized text unchanged so a table read back from CSV matches the one
//! written.

use chrono::Local;
use log::{info, warn};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::aggregator::Shot;
use crate::error::RecorderError;
use crate::screen::FieldReading;

pub const SHOT_COLUMN: &str = "shot";
const BALL_PREFIX: &str = "ball.";
const CLUB_PREFIX: &str = "club.";

/// Raw readings of one exported shot.
#[derive(Clone, Debug, PartialEq)]
pub struct ShotRecord {
    pub number: u32,
    pub ball: FieldReading,
    pub club: Option<FieldReading>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShotTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ShotTable {
    pub fn from_shots(shots: &[Shot]) -> Self {
        let ball_names: BTreeSet<&str> = shots
            .iter()
            .flat_map(|s| s.ball_reading.field_names())
            .collect();
        let club_names: BTreeSet<&str> = shots
            .iter()
            .filter_map(|s| s.club_reading.as_ref())
            .flat_map(|r| r.field_names())
            .collect();

        let mut columns = vec![SHOT_COLUMN.to_string()];
        columns.extend(ball_names.iter().map(|n| format!("{BALL_PREFIX}{n}")));
        columns.extend(club_names.iter().map(|n| format!("{CLUB_PREFIX}{n}")));

        let rows = shots
            .iter()
            .map(|shot| {
                let mut row = vec![shot.number.to_string()];
                row.extend(
                    ball_names
                        .iter()
                        .map(|n| shot.ball_reading.get(n).unwrap_or_default().to_string()),
                );
                row.extend(club_names.iter().map(|n| {
                    shot.club_reading
                        .as_ref()
                        .and_then(|r| r.get(n))
                        .unwrap_or_default()
                        .to_string()
                }));
                row
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell text, `None` for an unknown column or an empty cell.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows
            .get(row)?
            .get(index)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Rebuilds the readings of every row.
    ///
    /// Empty cells are left out of the rebuilt readings. A field read as
    /// empty text and a field the shot never had both export as an empty
    /// cell, so the two cannot be told apart.
    pub fn records(&self) -> Result<Vec<ShotRecord>, RecorderError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let number = row
                    .first()
                    .and_then(|n| n.trim().parse().ok())
                    .ok_or_else(|| RecorderError::ExportParse {
                        line: i + 2,
                        reason: "shot number is not an integer".to_string(),
                    })?;

                let mut ball = FieldReading::new();
                let mut club = FieldReading::new();
                for (column, value) in self.columns.iter().zip(row).skip(1) {
                    if value.is_empty() {
                        continue;
                    }
                    if let Some(name) = column.strip_prefix(BALL_PREFIX) {
                        ball.insert(name, value.as_str());
                    } else if let Some(name) = column.strip_prefix(CLUB_PREFIX) {
                        club.insert(name, value.as_str());
                    }
                }

                Ok(ShotRecord {
                    number,
                    ball,
                    club: (!club.is_empty()).then_some(club),
                })
            })
            .collect()
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for line in std::iter::once(&self.columns).chain(&self.rows) {
            let cells: Vec<String> = line.iter().map(|c| escape_cell(c)).collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out
    }

    /// Parses CSV produced by `to_csv`.
    ///
    /// Blank lines are skipped. Rows whose width differs from the header are
    /// skipped with a warning.
    pub fn from_csv(text: &str) -> Result<Self, RecorderError> {
        let mut lines = parse_csv(text)?.into_iter();

        let Some((_, columns)) = lines.next() else {
            return Err(RecorderError::ExportParse {
                line: 1,
                reason: "missing header".to_string(),
            });
        };
        if columns.first().map(String::as_str) != Some(SHOT_COLUMN) {
            return Err(RecorderError::ExportParse {
                line: 1,
                reason: format!("first column must be '{}'", SHOT_COLUMN),
            });
        }

        let mut rows = Vec::new();
        for (line, row) in lines {
            if row.len() != columns.len() {
                warn!(
                    "Skipping malformed export row {}: expected {} columns, got {}",
                    line,
                    columns.len(),
                    row.len()
                );
                continue;
            }
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    /// Writes `shots_YYYYMMDD_HHMMSS.csv` into `dir` and returns its path.
    pub fn write_csv(&self, dir: &Path) -> Result<PathBuf, RecorderError> {
        fs::create_dir_all(dir).map_err(|e| RecorderError::ExportWrite { source: e })?;
        let path = dir.join(format!("shots_{}.csv", Local::now().format("%Y%m%d_%H%M%S")));
        fs::write(&path, self.to_csv()).map_err(|e| RecorderError::ExportWrite { source: e })?;
        info!("Exported {} shots to {}", self.len(), path.display());
        Ok(path)
    }

    pub fn read_csv(path: &Path) -> Result<Self, RecorderError> {
        let text = fs::read_to_string(path).map_err(|e| RecorderError::ExportRead { source: e })?;
        Self::from_csv(&text)
    }
}

fn escape_cell(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Splits CSV text into rows, tagged with the line each row starts on.
fn parse_csv(text: &str) -> Result<Vec<(usize, Vec<String>)>, RecorderError> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut row_start = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                push_row(&mut rows, row_start, std::mem::take(&mut row));
                line += 1;
                row_start = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(RecorderError::ExportParse {
            line: row_start,
            reason: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        push_row(&mut rows, row_start, row);
    }
    Ok(rows)
}

fn push_row(rows: &mut Vec<(usize, Vec<String>)>, line: usize, row: Vec<String>) {
    let blank = row.len() == 1 && row[0].trim().is_empty();
    if !blank {
        rows.push((line, row));
    }
}
