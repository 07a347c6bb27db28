//! Feature pipeline: raw transactions → calendar fields → one-hot encoding → scaling.

use super::{FeatureFrame, FeatureRow};
use crate::error::{ScoringError, ScoringResult};
use crate::model::{CategoricalEncoder, ModelSet, Scaler};
use crate::records::{columns, RawBatch, TimeBucket, Weekday};
use ndarray::{concatenate, Array2, Axis};

pub struct FeatureBuilder<'a> {
    scaler: &'a dyn Scaler,
    type_encoder: &'a dyn CategoricalEncoder,
    weekday_encoder: &'a dyn CategoricalEncoder,
    time_bucket_encoder: &'a dyn CategoricalEncoder,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(
        scaler: &'a dyn Scaler,
        type_encoder: &'a dyn CategoricalEncoder,
        weekday_encoder: &'a dyn CategoricalEncoder,
        time_bucket_encoder: &'a dyn CategoricalEncoder,
    ) -> Self {
        Self {
            scaler,
            type_encoder,
            weekday_encoder,
            time_bucket_encoder,
        }
    }

    pub fn from_models(models: &'a ModelSet) -> Self {
        Self::new(
            models.scaler.as_ref(),
            models.type_encoder.as_ref(),
            models.weekday_encoder.as_ref(),
            models.time_bucket_encoder.as_ref(),
        )
    }

    /// Build one feature row per raw transaction, in input order. Numeric columns are
    /// amount, ownership, the configured extras and the weekend flag, followed by the
    /// transaction type, weekday and time bucket one-hot blocks. Only the scaler's
    /// columns are scaled.
    pub fn build(&self, batch: RawBatch) -> ScoringResult<FeatureFrame> {
        let calendar: Vec<(Option<Weekday>, Option<TimeBucket>)> = batch
            .rows
            .iter()
            .map(|r| {
                (
                    r.timestamp.as_ref().map(Weekday::from_timestamp),
                    r.timestamp.as_ref().map(TimeBucket::from_timestamp),
                )
            })
            .collect();

        let kinds: Vec<Option<&str>> = batch.rows.iter().map(|r| Some(r.kind.as_str())).collect();
        let days: Vec<Option<&str>> = calendar.iter().map(|(d, _)| d.map(Weekday::as_str)).collect();
        let buckets: Vec<Option<&str>> =
            calendar.iter().map(|(_, b)| b.map(TimeBucket::as_str)).collect();
        let encoded = concatenate(
            Axis(1),
            &[
                self.type_encoder.transform(&kinds)?.view(),
                self.weekday_encoder.transform(&days)?.view(),
                self.time_bucket_encoder.transform(&buckets)?.view(),
            ],
        )
        .map_err(|e| ScoringError::model("categorical encoders", e))?;

        let mut columns_out = vec![columns::AMOUNT.to_string(), columns::SAME_OWNERSHIP.to_string()];
        columns_out.extend(batch.numeric_columns.iter().cloned());
        columns_out.push(columns::WEEKEND.to_string());
        columns_out.extend(self.type_encoder.feature_names());
        columns_out.extend(self.weekday_encoder.feature_names());
        columns_out.extend(self.time_bucket_encoder.feature_names());

        let rows = batch
            .rows
            .into_iter()
            .zip(calendar)
            .zip(encoded.outer_iter())
            .map(|((raw, (weekday, time_bucket)), onehot)| {
                let weekend = weekday.map(Weekday::is_weekend).unwrap_or(false);
                let mut values = Vec::with_capacity(columns_out.len());
                values.push(raw.amount);
                values.push(if raw.same_ownership { 1.0 } else { 0.0 });
                values.extend(raw.numeric.iter().copied());
                values.push(if weekend { 1.0 } else { 0.0 });
                values.extend(onehot.iter().copied());
                FeatureRow {
                    account_id: raw.account_id,
                    timestamp: raw.timestamp,
                    kind: raw.kind,
                    weekday,
                    time_bucket,
                    weekend,
                    same_ownership: raw.same_ownership,
                    values,
                    passthrough: raw.passthrough,
                }
            })
            .collect();

        let mut frame = FeatureFrame {
            columns: columns_out,
            passthrough_columns: batch.passthrough_columns,
            rows,
        };

        let scaled_columns = self.scaler.columns().to_vec();
        let scaled: Array2<f64> = self.scaler.transform(&frame.matrix(&scaled_columns)?)?;
        frame.set_matrix(&scaled_columns, &scaled)?;

        tracing::debug!(
            rows = frame.len(),
            columns = frame.columns.len(),
            scaled = scaled_columns.len(),
            "feature frame built"
        );
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnScaler, OneHotEncoder, ScalerParams};
    use crate::records::Table;

    struct Fixture {
        scaler: ColumnScaler,
        kinds: OneHotEncoder,
        days: OneHotEncoder,
        buckets: OneHotEncoder,
    }

    fn fixture() -> Fixture {
        let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Fixture {
            scaler: ColumnScaler::new(
                vec![columns::AMOUNT.to_string()],
                ScalerParams::MinMax {
                    min: vec![0.0],
                    scale: vec![0.5],
                },
            )
            .unwrap(),
            kinds: OneHotEncoder::new(columns::KIND, strings(&["pix", "saque"])),
            days: OneHotEncoder::new(
                columns::WEEKDAY,
                Weekday::ALL.iter().map(|d| d.as_str().to_string()).collect(),
            ),
            buckets: OneHotEncoder::new(
                columns::TIME_BUCKET,
                TimeBucket::ALL.iter().map(|b| b.as_str().to_string()).collect(),
            ),
        }
    }

    fn batch(csv: &str) -> RawBatch {
        RawBatch::from_table(&Table::from_reader(csv.as_bytes()).unwrap(), &[]).unwrap()
    }

    const HEADER: &str = "conta_id,transacao_data,transacao_valor,transacao_tipo,mesma_titularidade\n";

    #[test]
    fn derives_calendar_fields_encodes_and_scales_only_configured_columns() {
        let f = fixture();
        let builder = FeatureBuilder::new(&f.scaler, &f.kinds, &f.days, &f.buckets);
        let frame = builder
            .build(batch(&format!(
                "{HEADER}A,2024-06-01 03:15:00,500,pix,0\nA,2024-06-03 19:00:00,250,saque,1\n"
            )))
            .unwrap();

        assert_eq!(frame.columns.len(), 3 + 2 + 7 + 4);
        assert_eq!(frame.columns[0], columns::AMOUNT);
        assert_eq!(frame.columns[3], "transacao_tipo_pix");

        let first = &frame.rows[0];
        assert_eq!(first.weekday, Some(Weekday::Sabado));
        assert_eq!(first.time_bucket, Some(TimeBucket::Madrugada));
        assert!(first.weekend);
        assert_eq!(frame.column(columns::AMOUNT).unwrap(), vec![250.0, 125.0]);
        assert_eq!(frame.column(columns::WEEKEND).unwrap(), vec![1.0, 0.0]);
        assert_eq!(frame.column(columns::SAME_OWNERSHIP).unwrap(), vec![0.0, 1.0]);
        assert_eq!(frame.column("faixa_horaria_Madrugada").unwrap(), vec![1.0, 0.0]);
        assert_eq!(frame.column("faixa_horaria_Noite").unwrap(), vec![0.0, 1.0]);
        assert_eq!(frame.column("dia_de_semana_Segunda").unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn missing_timestamp_zero_fills_calendar_blocks() {
        let f = fixture();
        let builder = FeatureBuilder::new(&f.scaler, &f.kinds, &f.days, &f.buckets);
        let frame = builder
            .build(batch(&format!("{HEADER}A,garbage,100,pix,0\n")))
            .unwrap();
        let row = &frame.rows[0];
        assert!(row.weekday.is_none());
        assert!(!row.weekend);
        let calendar_sum: f64 = row.values[5..].iter().sum();
        assert_eq!(calendar_sum, 0.0);
    }

    #[test]
    fn unseen_transaction_type_fails_loudly() {
        let f = fixture();
        let builder = FeatureBuilder::new(&f.scaler, &f.kinds, &f.days, &f.buckets);
        let err = builder
            .build(batch(&format!("{HEADER}A,2024-06-01 03:15:00,1,boleto,0\n")))
            .unwrap_err();
        assert!(matches!(err, ScoringError::UnknownCategory { .. }));
    }

    #[test]
    fn scaler_column_absent_from_frame_is_a_schema_error() {
        let mut f = fixture();
        f.scaler = ColumnScaler::new(
            vec!["saldo".to_string()],
            ScalerParams::Standard {
                mean: vec![0.0],
                scale: vec![1.0],
            },
        )
        .unwrap();
        let builder = FeatureBuilder::new(&f.scaler, &f.kinds, &f.days, &f.buckets);
        let err = builder
            .build(batch(&format!("{HEADER}A,2024-06-01 03:15:00,1,pix,0\n")))
            .unwrap_err();
        assert!(matches!(err, ScoringError::MissingColumn { .. }));
    }
}
