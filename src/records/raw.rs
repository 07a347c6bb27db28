//! Raw transaction ingestion from the input table.

use super::{
    columns, invalid_value, parse_flag, parse_number, parse_timestamp, require_number, Table,
};
use crate::error::ScoringResult;
use chrono::NaiveDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct RawTransaction {
    pub account_id: String,
    /// `None` when the source timestamp could not be parsed
    pub timestamp: Option<NaiveDateTime>,
    pub amount: f64,
    pub kind: String,
    pub same_ownership: bool,
    /// Values of `RawBatch::numeric_columns`
    pub numeric: Vec<f64>,
    /// Values of `RawBatch::passthrough_columns`
    pub passthrough: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    /// Input header in ingestion order
    pub source_columns: Vec<String>,
    pub numeric_columns: Vec<String>,
    pub passthrough_columns: Vec<String>,
    pub rows: Vec<RawTransaction>,
    pub invalid_timestamps: usize,
}

const REQUIRED: [&str; 5] = [
    columns::ACCOUNT,
    columns::TIMESTAMP,
    columns::AMOUNT,
    columns::KIND,
    columns::SAME_OWNERSHIP,
];

impl RawBatch {
    /// Parse the raw table. Required columns must exist; `extra_numeric` columns are
    /// parsed as numbers and every other column is carried through as text.
    pub fn from_table(table: &Table, extra_numeric: &[String]) -> ScoringResult<Self> {
        let [account, timestamp, amount, kind, ownership] = [
            table.require(REQUIRED[0])?,
            table.require(REQUIRED[1])?,
            table.require(REQUIRED[2])?,
            table.require(REQUIRED[3])?,
            table.require(REQUIRED[4])?,
        ];
        let numeric_idx = extra_numeric
            .iter()
            .map(|c| table.require(c))
            .collect::<ScoringResult<Vec<_>>>()?;
        let passthrough_idx: Vec<usize> = (0..table.headers.len())
            .filter(|i| {
                !REQUIRED.contains(&table.headers[*i].as_str()) && !numeric_idx.contains(i)
            })
            .collect();

        let mut invalid_timestamps = 0;
        let mut rows = Vec::with_capacity(table.len());
        for r in 0..table.len() {
            let ts = parse_timestamp(table.cell(r, timestamp));
            if ts.is_none() {
                invalid_timestamps += 1;
            }
            let raw_ownership = table.cell(r, ownership);
            let same_ownership = parse_flag(raw_ownership)
                .ok_or_else(|| invalid_value(columns::SAME_OWNERSHIP, r, raw_ownership))?;
            let numeric = numeric_idx
                .iter()
                .map(|&c| {
                    let raw = table.cell(r, c);
                    parse_number(raw).ok_or_else(|| invalid_value(&table.headers[c], r, raw))
                })
                .collect::<ScoringResult<Vec<_>>>()?;
            rows.push(RawTransaction {
                account_id: table.cell(r, account).trim().to_string(),
                timestamp: ts,
                amount: require_number(columns::AMOUNT, r, table.cell(r, amount))?,
                kind: table.cell(r, kind).trim().to_string(),
                same_ownership,
                numeric,
                passthrough: passthrough_idx
                    .iter()
                    .map(|&c| table.cell(r, c).to_string())
                    .collect(),
            });
        }

        if invalid_timestamps > 0 {
            tracing::warn!(
                count = invalid_timestamps,
                "unparseable timestamps kept as missing"
            );
        }

        Ok(Self {
            source_columns: table.headers.clone(),
            numeric_columns: extra_numeric.to_vec(),
            passthrough_columns: passthrough_idx
                .iter()
                .map(|&c| table.headers[c].clone())
                .collect(),
            rows,
            invalid_timestamps,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoringError;

    const CSV: &str = "\
transacao_id,conta_id,transacao_data,transacao_valor,transacao_tipo,mesma_titularidade,saldo
t1,A,2024-06-01 03:00:00,100.0,pix,False,10
t2,A,garbage,50.5,saque,True,
t3,B,2024-06-03 14:00:00,20,pix,0,7
";

    #[test]
    fn parses_required_extra_and_passthrough_columns() {
        let table = Table::from_reader(CSV.as_bytes()).unwrap();
        let batch = RawBatch::from_table(&table, &["saldo".to_string()]).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.passthrough_columns, vec!["transacao_id"]);
        assert_eq!(batch.source_columns[0], "transacao_id");
        assert_eq!(batch.source_columns.len(), 7);
        assert_eq!(batch.rows[0].passthrough, vec!["t1"]);
        assert_eq!(batch.rows[0].numeric, vec![10.0]);
        assert!(batch.rows[1].numeric[0].is_nan());
        assert!(batch.rows[1].same_ownership);
        assert!(!batch.rows[2].same_ownership);
    }

    #[test]
    fn invalid_timestamp_is_kept_as_missing() {
        let table = Table::from_reader(CSV.as_bytes()).unwrap();
        let batch = RawBatch::from_table(&table, &[]).unwrap();
        assert_eq!(batch.invalid_timestamps, 1);
        assert!(batch.rows[1].timestamp.is_none());
        assert_eq!(batch.rows[1].amount, 50.5);
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let table = Table::from_reader("conta_id,transacao_valor\nA,1\n".as_bytes()).unwrap();
        let err = RawBatch::from_table(&table, &[]).unwrap_err();
        assert!(matches!(err, ScoringError::MissingColumn { .. }));
    }

    #[test]
    fn non_numeric_amount_is_fatal() {
        let csv = "conta_id,transacao_data,transacao_valor,transacao_tipo,mesma_titularidade\n\
                   A,2024-06-01 03:00:00,abc,pix,0\n";
        let table = Table::from_reader(csv.as_bytes()).unwrap();
        let err = RawBatch::from_table(&table, &[]).unwrap_err();
        assert!(matches!(err, ScoringError::InvalidValue { row: 0, .. }));
    }
}
