//! Per-account behavioral baselines over the full batch history.

use super::FeatureFrame;
use crate::error::{ScoringError, ScoringResult};
use crate::records::{columns, format_number, parse_number, Table, TimeBucket, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub account_id: String,
    pub transactions: usize,
    pub mean_amount: f64,
    /// Sample standard deviation; undefined for a single transaction
    pub std_amount: Option<f64>,
    /// Share of each transaction type, in encoder category order
    pub kind_shares: Vec<(String, f64)>,
    pub weekend_share: f64,
    pub same_ownership_share: f64,
    pub usual_time_bucket: Option<TimeBucket>,
    pub usual_weekday: Option<Weekday>,
}

impl AccountProfile {
    /// Amount above `mean + k * std`; never true when `std` is undefined.
    pub fn exceeds_baseline(&self, amount: f64, k: f64) -> bool {
        match self.std_amount {
            Some(std) if std.is_finite() => amount > self.mean_amount + k * std,
            _ => false,
        }
    }
}

/// Profiles keyed by account id.
#[derive(Debug, Clone, Default)]
pub struct ProfileTable {
    kinds: Vec<String>,
    profiles: BTreeMap<String, AccountProfile>,
}

impl ProfileTable {
    pub fn get(&self, account: &str) -> ScoringResult<&AccountProfile> {
        self.profiles
            .get(account)
            .ok_or_else(|| ScoringError::MissingProfile {
                account: account.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccountProfile> {
        self.profiles.values()
    }

    /// Header of the joined profile columns.
    pub fn columns(&self) -> Vec<String> {
        let mut out = vec![
            columns::TRANSACTION_COUNT.to_string(),
            columns::MEAN_AMOUNT.to_string(),
            columns::STD_AMOUNT.to_string(),
        ];
        out.extend(
            self.kinds
                .iter()
                .map(|k| format!("{}{}", columns::SHARE_PREFIX, k)),
        );
        out.extend([
            columns::WEEKEND_SHARE.to_string(),
            columns::SAME_OWNERSHIP_SHARE.to_string(),
            columns::USUAL_TIME_BUCKET.to_string(),
            columns::USUAL_WEEKDAY.to_string(),
        ]);
        out
    }

    /// Cells of `columns()` for one account.
    pub fn cells(&self, account: &str) -> ScoringResult<Vec<String>> {
        let p = self.get(account)?;
        let mut out = vec![
            p.transactions.to_string(),
            format_number(p.mean_amount),
            p.std_amount.map(format_number).unwrap_or_default(),
        ];
        out.extend(p.kind_shares.iter().map(|(_, share)| format_number(*share)));
        out.extend([
            format_number(p.weekend_share),
            format_number(p.same_ownership_share),
            p.usual_time_bucket
                .map(|b| b.as_str().to_string())
                .unwrap_or_default(),
            p.usual_weekday
                .map(|d| d.as_str().to_string())
                .unwrap_or_default(),
        ]);
        Ok(out)
    }

    /// Read baselines joined onto a persisted table. Mean and standard deviation columns are
    /// required; every account must carry a mean.
    pub fn from_table(table: &Table) -> ScoringResult<Self> {
        let account = table.require(columns::ACCOUNT)?;
        let mean = table.require(columns::MEAN_AMOUNT)?;
        let std = table.require(columns::STD_AMOUNT)?;
        let count = table.column(columns::TRANSACTION_COUNT);
        let weekend = table.column(columns::WEEKEND_SHARE);
        let ownership = table.column(columns::SAME_OWNERSHIP_SHARE);
        let bucket = table.column(columns::USUAL_TIME_BUCKET);
        let weekday = table.column(columns::USUAL_WEEKDAY);
        let kind_cols: Vec<(String, usize)> = table
            .headers
            .iter()
            .enumerate()
            .filter(|(_, h)| {
                h.starts_with(columns::SHARE_PREFIX)
                    && h.as_str() != columns::WEEKEND_SHARE
                    && h.as_str() != columns::SAME_OWNERSHIP_SHARE
            })
            .map(|(i, h)| (h[columns::SHARE_PREFIX.len()..].to_string(), i))
            .collect();

        let number = |r: usize, c: Option<usize>| {
            c.and_then(|c| parse_number(table.cell(r, c)))
                .unwrap_or(f64::NAN)
        };

        let mut profiles = BTreeMap::new();
        for r in 0..table.len() {
            let id = table.cell(r, account).trim();
            if profiles.contains_key(id) {
                continue;
            }
            let mean_amount = number(r, Some(mean));
            if !mean_amount.is_finite() {
                return Err(ScoringError::MissingProfile {
                    account: id.to_string(),
                });
            }
            let std_amount = Some(number(r, Some(std))).filter(|v| v.is_finite());
            let transactions = number(r, count);
            profiles.insert(
                id.to_string(),
                AccountProfile {
                    account_id: id.to_string(),
                    transactions: if transactions.is_finite() {
                        transactions as usize
                    } else {
                        0
                    },
                    mean_amount,
                    std_amount,
                    kind_shares: kind_cols
                        .iter()
                        .map(|(k, c)| (k.clone(), number(r, Some(*c))))
                        .collect(),
                    weekend_share: number(r, weekend),
                    same_ownership_share: number(r, ownership),
                    usual_time_bucket: bucket.and_then(|c| TimeBucket::parse(table.cell(r, c))),
                    usual_weekday: weekday.and_then(|c| Weekday::parse(table.cell(r, c))),
                },
            );
        }

        Ok(Self {
            kinds: kind_cols.into_iter().map(|(k, _)| k).collect(),
            profiles,
        })
    }
}

/// Aggregates each account's rows into its baseline.
pub struct BehaviorProfiler {
    kinds: Vec<String>,
}

impl BehaviorProfiler {
    /// `kinds` are the known transaction types, in the order their shares are reported.
    pub fn new(kinds: Vec<String>) -> Self {
        Self { kinds }
    }

    pub fn profile(&self, frame: &FeatureFrame) -> ScoringResult<ProfileTable> {
        let amount = frame.column_index(columns::AMOUNT)?;
        let mut by_account: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, row) in frame.rows.iter().enumerate() {
            by_account.entry(row.account_id.as_str()).or_default().push(i);
        }

        let profiles = by_account
            .into_iter()
            .map(|(account, idx)| {
                let n = idx.len() as f64;
                let amounts: Vec<f64> = idx.iter().map(|&i| frame.rows[i].values[amount]).collect();
                let mean = amounts.iter().sum::<f64>() / n;
                let std = (idx.len() > 1).then(|| {
                    let var = amounts.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / (n - 1.0);
                    var.sqrt()
                });
                let share = |pred: &dyn Fn(usize) -> bool| {
                    idx.iter().filter(|&&i| pred(i)).count() as f64 / n
                };

                let kind_shares = self
                    .kinds
                    .iter()
                    .map(|k| (k.clone(), share(&|i: usize| frame.rows[i].kind == *k)))
                    .collect();
                let usual_time_bucket = most_frequent(
                    &TimeBucket::ALL,
                    idx.iter().filter_map(|&i| frame.rows[i].time_bucket),
                );
                let usual_weekday = most_frequent(
                    &Weekday::ALL,
                    idx.iter().filter_map(|&i| frame.rows[i].weekday),
                );

                let profile = AccountProfile {
                    account_id: account.to_string(),
                    transactions: idx.len(),
                    mean_amount: mean,
                    std_amount: std,
                    kind_shares,
                    weekend_share: share(&|i: usize| frame.rows[i].weekend),
                    same_ownership_share: share(&|i: usize| frame.rows[i].same_ownership),
                    usual_time_bucket,
                    usual_weekday,
                };
                (account.to_string(), profile)
            })
            .collect::<BTreeMap<_, _>>();

        tracing::debug!(accounts = profiles.len(), "behavioral profiles built");
        Ok(ProfileTable {
            kinds: self.kinds.clone(),
            profiles,
        })
    }
}

/// Most frequent value; ties resolve to the earliest entry of `order`. `None` if empty.
fn most_frequent<T: PartialEq + Copy>(order: &[T], values: impl Iterator<Item = T>) -> Option<T> {
    let mut counts = vec![0usize; order.len()];
    for v in values {
        if let Some(pos) = order.iter().position(|o| *o == v) {
            counts[pos] += 1;
        }
    }
    let mut best: Option<(usize, usize)> = None;
    for (pos, &count) in counts.iter().enumerate() {
        if count > 0 && best.map_or(true, |(_, c)| count > c) {
            best = Some((pos, count));
        }
    }
    best.map(|(pos, _)| order[pos])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureRow;
    use crate::records::parse_timestamp;

    fn row(account: &str, ts: &str, amount: f64, kind: &str, same: bool) -> FeatureRow {
        let timestamp = parse_timestamp(ts);
        let weekday = timestamp.as_ref().map(Weekday::from_timestamp);
        FeatureRow {
            account_id: account.to_string(),
            timestamp,
            kind: kind.to_string(),
            weekday,
            time_bucket: timestamp.as_ref().map(TimeBucket::from_timestamp),
            weekend: weekday.map(Weekday::is_weekend).unwrap_or(false),
            same_ownership: same,
            values: vec![amount],
            passthrough: Vec::new(),
        }
    }

    fn frame(rows: Vec<FeatureRow>) -> FeatureFrame {
        FeatureFrame {
            columns: vec![columns::AMOUNT.to_string()],
            passthrough_columns: Vec::new(),
            rows,
        }
    }

    fn profiler() -> BehaviorProfiler {
        BehaviorProfiler::new(vec!["pix".into(), "saque".into()])
    }

    #[test]
    fn profiles_only_use_rows_of_the_same_account() {
        let f = frame(vec![
            row("A", "2024-06-01 03:00:00", 10.0, "pix", false),
            row("B", "2024-06-03 10:00:00", 1000.0, "saque", true),
            row("A", "2024-06-02 04:00:00", 30.0, "saque", true),
        ]);
        let table = profiler().profile(&f).unwrap();
        assert_eq!(table.len(), 2);

        let a = table.get("A").unwrap();
        assert_eq!(a.transactions, 2);
        assert_eq!(a.mean_amount, 20.0);
        let std = a.std_amount.unwrap();
        assert!((std - 200f64.sqrt()).abs() < 1e-12);
        assert_eq!(a.kind_shares, vec![("pix".into(), 0.5), ("saque".into(), 0.5)]);
        assert_eq!(a.weekend_share, 1.0);
        assert_eq!(a.same_ownership_share, 0.5);
        assert_eq!(a.usual_time_bucket, Some(TimeBucket::Madrugada));
        // one Saturday, one Sunday: tie goes to the earlier weekday
        assert_eq!(a.usual_weekday, Some(Weekday::Sabado));
    }

    #[test]
    fn single_transaction_has_undefined_std_and_never_exceeds() {
        let f = frame(vec![row("C", "2024-06-01 12:00:00", 5.0, "pix", false)]);
        let table = profiler().profile(&f).unwrap();
        let c = table.get("C").unwrap();
        assert!(c.std_amount.is_none());
        assert!(!c.exceeds_baseline(1e9, 3.0));
    }

    #[test]
    fn unknown_account_is_an_integrity_error() {
        let table = profiler().profile(&frame(vec![])).unwrap();
        assert!(matches!(
            table.get("Z"),
            Err(ScoringError::MissingProfile { .. })
        ));
    }

    #[test]
    fn columns_and_cells_read_back_from_a_table() {
        let f = frame(vec![
            row("A", "2024-06-01 03:00:00", 10.0, "pix", false),
            row("A", "2024-06-01 03:00:30", 30.0, "pix", false),
            row("B", "bad", 7.0, "saque", true),
        ]);
        let profiles = profiler().profile(&f).unwrap();
        let mut table = Table::new(
            std::iter::once(columns::ACCOUNT.to_string())
                .chain(profiles.columns())
                .collect(),
        );
        for id in ["A", "A", "B"] {
            let mut cells = vec![id.to_string()];
            cells.extend(profiles.cells(id).unwrap());
            table.rows.push(cells);
        }

        let back = ProfileTable::from_table(&table).unwrap();
        assert_eq!(back.get("A").unwrap(), profiles.get("A").unwrap());
        let b = back.get("B").unwrap();
        assert!(b.std_amount.is_none());
        assert!(b.usual_time_bucket.is_none());
        assert_eq!(b.mean_amount, 7.0);
    }

    #[test]
    fn table_without_baseline_columns_is_a_schema_error() {
        let table = Table::from_reader("conta_id,media_valor\nA,1\n".as_bytes()).unwrap();
        assert!(matches!(
            ProfileTable::from_table(&table),
            Err(ScoringError::MissingColumn { .. })
        ));
    }
}
