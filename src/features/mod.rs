//! Feature derivation and per-account behavioral baselines.

mod behavioral;
mod pipeline;

pub use behavioral::{AccountProfile, BehaviorProfiler, ProfileTable};
pub use pipeline::FeatureBuilder;

use crate::error::{ScoringError, ScoringResult};
use crate::records::{
    columns, parse_flag, parse_number, parse_timestamp, Table, TimeBucket, Weekday,
};
use chrono::NaiveDateTime;
use ndarray::Array2;
use std::collections::HashSet;

/// One feature-engineered transaction. `values` is aligned with `FeatureFrame::columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub account_id: String,
    pub timestamp: Option<NaiveDateTime>,
    pub kind: String,
    pub weekday: Option<Weekday>,
    pub time_bucket: Option<TimeBucket>,
    pub weekend: bool,
    pub same_ownership: bool,
    pub values: Vec<f64>,
    pub passthrough: Vec<String>,
}

/// Batch of feature rows sharing one numeric column schema.
#[derive(Debug, Clone, Default)]
pub struct FeatureFrame {
    pub columns: Vec<String>,
    pub passthrough_columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

/// Columns read back as typed fields rather than numeric features.
const TYPED_COLUMNS: [&str; 9] = [
    columns::ACCOUNT,
    columns::TIMESTAMP,
    columns::KIND,
    columns::WEEKDAY,
    columns::TIME_BUCKET,
    columns::SUSPICION,
    columns::CLUSTER_SUSPICION,
    columns::USUAL_TIME_BUCKET,
    columns::USUAL_WEEKDAY,
];

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> ScoringResult<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| ScoringError::missing_column(name))
    }

    pub fn column(&self, name: &str) -> ScoringResult<Vec<f64>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    /// Rows x `names` matrix, in the order given.
    pub fn matrix(&self, names: &[String]) -> ScoringResult<Array2<f64>> {
        let idx = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<ScoringResult<Vec<_>>>()?;
        Ok(Array2::from_shape_fn((self.rows.len(), idx.len()), |(r, c)| {
            self.rows[r].values[idx[c]]
        }))
    }

    /// Overwrite `names` with the columns of `matrix`.
    pub fn set_matrix(&mut self, names: &[String], matrix: &Array2<f64>) -> ScoringResult<()> {
        let idx = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<ScoringResult<Vec<_>>>()?;
        for (row, values) in self.rows.iter_mut().zip(matrix.outer_iter()) {
            for (&i, &v) in idx.iter().zip(values.iter()) {
                row.values[i] = v;
            }
        }
        Ok(())
    }

    /// Set a numeric column, appending it when absent.
    pub fn set_column(&mut self, name: &str, values: &[f64]) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.columns.iter().position(|c| c == name) {
            Some(idx) => {
                for (row, &v) in self.rows.iter_mut().zip(values) {
                    row.values[idx] = v;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, &v) in self.rows.iter_mut().zip(values) {
                    row.values.push(v);
                }
            }
        }
    }

    /// Reorder rows by `order`, where `order[i]` is the source index of row `i`.
    pub fn permute(&mut self, order: &[usize]) {
        let mut rows: Vec<Option<FeatureRow>> =
            std::mem::take(&mut self.rows).into_iter().map(Some).collect();
        self.rows = order
            .iter()
            .filter_map(|&i| rows.get_mut(i).and_then(Option::take))
            .collect();
    }

    pub fn account_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.account_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Rebuild a frame from a persisted behavior-stage table. Categorical fields come from
    /// their text columns (derived from the timestamp when absent); every other column whose
    /// cells are all numeric becomes a feature column. Returns the frame and the number of
    /// unparseable timestamps.
    pub fn from_table(table: &Table) -> ScoringResult<(Self, usize)> {
        let account = table.require(columns::ACCOUNT)?;
        let timestamp = table.require(columns::TIMESTAMP)?;
        let kind = table.require(columns::KIND)?;
        let ownership = table.require(columns::SAME_OWNERSHIP)?;
        let weekday = table.column(columns::WEEKDAY);
        let bucket = table.column(columns::TIME_BUCKET);

        let numeric: Vec<usize> = (0..table.headers.len())
            .filter(|&c| !TYPED_COLUMNS.contains(&table.headers[c].as_str()))
            .filter(|&c| (0..table.len()).all(|r| parse_number(table.cell(r, c)).is_some()))
            .collect();

        let mut invalid = 0;
        let mut rows = Vec::with_capacity(table.len());
        for r in 0..table.len() {
            let ts = parse_timestamp(table.cell(r, timestamp));
            if ts.is_none() {
                invalid += 1;
            }
            let day = weekday
                .and_then(|c| Weekday::parse(table.cell(r, c)))
                .or_else(|| ts.as_ref().map(Weekday::from_timestamp));
            let time_bucket = bucket
                .and_then(|c| TimeBucket::parse(table.cell(r, c)))
                .or_else(|| ts.as_ref().map(TimeBucket::from_timestamp));
            let raw_ownership = table.cell(r, ownership);
            let same_ownership = parse_flag(raw_ownership)
                .or_else(|| {
                    parse_number(raw_ownership)
                        .filter(|v| v.is_finite())
                        .map(|v| v != 0.0)
                })
                .ok_or_else(|| ScoringError::InvalidValue {
                    column: columns::SAME_OWNERSHIP.to_string(),
                    row: r,
                    value: raw_ownership.to_string(),
                })?;
            rows.push(FeatureRow {
                account_id: table.cell(r, account).trim().to_string(),
                timestamp: ts,
                kind: table.cell(r, kind).trim().to_string(),
                weekday: day,
                time_bucket,
                weekend: day.map(Weekday::is_weekend).unwrap_or(false),
                same_ownership,
                values: numeric
                    .iter()
                    .map(|&c| parse_number(table.cell(r, c)).unwrap_or(f64::NAN))
                    .collect(),
                passthrough: Vec::new(),
            });
        }

        let frame = Self {
            columns: numeric.iter().map(|&c| table.headers[c].clone()).collect(),
            passthrough_columns: Vec::new(),
            rows,
        };
        Ok((frame, invalid))
    }
}
