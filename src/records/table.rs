//! Headered string table backed by CSV files.

use crate::error::{ScoringError, ScoringResult};
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn read(path: &Path) -> ScoringResult<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> ScoringResult<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    /// Write to `path`, creating parent directories.
    pub fn write(&self, path: &Path) -> ScoringResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn require(&self, name: &str) -> ScoringResult<usize> {
        self.column(name)
            .ok_or_else(|| ScoringError::missing_column(name))
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows[row].get(col).map(String::as_str).unwrap_or("")
    }

    /// Set a column, replacing it in place when it already exists.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column(name) {
            Some(col) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[col] = value;
                }
            }
            None => {
                self.headers.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }

    /// Reorder rows by `order`, where `order[i]` is the source index of row `i`.
    pub fn permute(&mut self, order: &[usize]) {
        let mut rows: Vec<Option<Vec<String>>> =
            std::mem::take(&mut self.rows).into_iter().map(Some).collect();
        self.rows = order
            .iter()
            .filter_map(|&i| rows.get_mut(i).and_then(Option::take))
            .collect();
    }

    /// Move the `leading` columns that exist to the front, in the given order. The other
    /// columns keep their relative order.
    pub fn lead_with(&mut self, leading: &[String]) {
        let mut order: Vec<usize> = Vec::with_capacity(self.headers.len());
        for col in leading.iter().filter_map(|name| self.column(name)) {
            if !order.contains(&col) {
                order.push(col);
            }
        }
        let rest: Vec<usize> = (0..self.headers.len()).filter(|c| !order.contains(c)).collect();
        order.extend(rest);

        self.headers = order.iter().map(|&c| self.headers[c].clone()).collect();
        for row in &mut self.rows {
            *row = order
                .iter()
                .map(|&c| row.get(c).cloned().unwrap_or_default())
                .collect();
        }
    }

    /// Rows for which `keep` is true, headers preserved.
    pub fn filter(&self, keep: &[bool]) -> Table {
        Table {
            headers: self.headers.clone(),
            rows: self
                .rows
                .iter()
                .zip(keep)
                .filter(|(_, k)| **k)
                .map(|(r, _)| r.clone())
                .collect(),
        }
    }
}
