//! Shared transaction vocabulary: categorical values, column names, and tabular I/O.

mod raw;
mod table;

pub use raw::{RawBatch, RawTransaction};
pub use table::Table;

use crate::error::{ScoringError, ScoringResult};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column names of the persisted tables.
pub mod columns {
    pub const ACCOUNT: &str = "conta_id";
    pub const TIMESTAMP: &str = "transacao_data";
    pub const AMOUNT: &str = "transacao_valor";
    pub const KIND: &str = "transacao_tipo";
    pub const SAME_OWNERSHIP: &str = "mesma_titularidade";
    pub const WEEKDAY: &str = "dia_de_semana";
    pub const WEEKEND: &str = "fim_de_semana";
    pub const TIME_BUCKET: &str = "faixa_horaria";

    pub const RECONSTRUCTION_ERROR: &str = "erro_reconstrucao";
    pub const CLUSTER: &str = "cluster_autoencoder";
    pub const CLUSTER_DISTANCE: &str = "distancia_cluster";
    pub const SUSPICION: &str = "suspeita";
    pub const CLUSTER_SUSPICION: &str = "suspeita_cluster";

    pub const TRANSACTION_COUNT: &str = "quantidade_transacoes";
    pub const MEAN_AMOUNT: &str = "media_valor";
    pub const STD_AMOUNT: &str = "std_valor";
    pub const SHARE_PREFIX: &str = "percentual_";
    pub const WEEKEND_SHARE: &str = "percentual_fim_de_semana";
    pub const SAME_OWNERSHIP_SHARE: &str = "percentual_mesma_titularidade";
    pub const USUAL_TIME_BUCKET: &str = "horario_mais_comum";
    pub const USUAL_WEEKDAY: &str = "dia_semana_mais_comum";

    pub const TIME_SINCE_PREVIOUS: &str = "tempo_desde_ultima";
    pub const RULE_HIGH_VALUE: &str = "regra_valor_alto";
    pub const RULE_SUSPICIOUS_HOUR: &str = "regra_horario";
    pub const RULE_HIGH_FREQUENCY: &str = "regra_frequencia";
    pub const RULE_CLUSTER: &str = "regra_cluster";
    pub const RULE_DIRECT_ALERT: &str = "regra_alerta";
    pub const FRAUD_SCORE: &str = "pontuacao_fraude";
    pub const CONFIRMED_ANOMALY: &str = "anomalia_confirmada";
    pub const MODEL_PROBABILITY: &str = "probabilidade_modelo";
    pub const MODEL_PREDICTION: &str = "modelo_predito";
    pub const FINAL_DECISION: &str = "decisao_final";
    pub const SUSPICION_LEVEL: &str = "nivel_suspeita";
    pub const CRITICAL_RISK: &str = "risco_critico";
    pub const RATIONALE: &str = "motivo_alerta";
    pub const SCORE: &str = "score_final";
    pub const RISK_BAND: &str = "faixa_risco";

    /// Default ordered classifier input.
    pub const CLASSIFIER_INPUT: [&str; 10] = [
        AMOUNT,
        WEEKEND,
        "transacao_tipo_pix",
        "transacao_tipo_transferencia",
        RECONSTRUCTION_ERROR,
        CLUSTER_DISTANCE,
        SAME_OWNERSHIP,
        "faixa_horaria_Madrugada",
        "dia_de_semana_Sabado",
        "dia_de_semana_Domingo",
    ];
}

const TIMESTAMP_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
];

/// Lenient timestamp parsing; anything unrecognised is `None`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ts);
        }
    }
    // offsets are normalised so rows from different zones order chronologically
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Sub-second precision is kept; whole seconds print without a fraction.
pub fn format_timestamp(ts: Option<NaiveDateTime>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        .unwrap_or_default()
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "1.0" | "true" | "True" | "TRUE" => Some(true),
        "0" | "0.0" | "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

/// Parse a numeric cell; empty cells are missing (`NaN`).
pub fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    raw.parse().ok()
}

pub fn format_number(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

pub fn format_flag(value: bool) -> String {
    let flag = if value { "1" } else { "0" };
    flag.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Segunda,
    Terca,
    Quarta,
    Quinta,
    Sexta,
    Sabado,
    Domingo,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Segunda,
        Weekday::Terca,
        Weekday::Quarta,
        Weekday::Quinta,
        Weekday::Sexta,
        Weekday::Sabado,
        Weekday::Domingo,
    ];

    pub fn from_timestamp(ts: &NaiveDateTime) -> Self {
        Self::ALL[ts.weekday().num_days_from_monday() as usize]
    }

    pub fn is_weekend(self) -> bool {
        matches!(self, Weekday::Sabado | Weekday::Domingo)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Segunda => "Segunda",
            Weekday::Terca => "Terca",
            Weekday::Quarta => "Quarta",
            Weekday::Quinta => "Quinta",
            Weekday::Sexta => "Sexta",
            Weekday::Sabado => "Sabado",
            Weekday::Domingo => "Domingo",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == raw.trim())
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-of-day bucket: [0,6) Madrugada, [6,12) Manhã, [12,18) Tarde, [18,24) Noite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeBucket {
    Madrugada,
    Manha,
    Tarde,
    Noite,
}

impl TimeBucket {
    pub const ALL: [TimeBucket; 4] = [
        TimeBucket::Madrugada,
        TimeBucket::Manha,
        TimeBucket::Tarde,
        TimeBucket::Noite,
    ];

    pub fn from_hour(hour: u32) -> Self {
        match hour {
            0..=5 => TimeBucket::Madrugada,
            6..=11 => TimeBucket::Manha,
            12..=17 => TimeBucket::Tarde,
            _ => TimeBucket::Noite,
        }
    }

    pub fn from_timestamp(ts: &NaiveDateTime) -> Self {
        Self::from_hour(ts.hour())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeBucket::Madrugada => "Madrugada",
            TimeBucket::Manha => "Manhã",
            TimeBucket::Tarde => "Tarde",
            TimeBucket::Noite => "Noite",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.as_str() == raw.trim())
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal suspicion: nenhuma < baixa < media < alta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuspicionLevel {
    Nenhuma,
    Baixa,
    Media,
    Alta,
}

impl SuspicionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            SuspicionLevel::Nenhuma => "nenhuma",
            SuspicionLevel::Baixa => "baixa",
            SuspicionLevel::Media => "media",
            SuspicionLevel::Alta => "alta",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "nenhuma" => Some(SuspicionLevel::Nenhuma),
            "baixa" => Some(SuspicionLevel::Baixa),
            "media" => Some(SuspicionLevel::Media),
            "alta" => Some(SuspicionLevel::Alta),
            _ => None,
        }
    }
}

impl fmt::Display for SuspicionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn invalid_value(column: &str, row: usize, value: &str) -> ScoringError {
    ScoringError::InvalidValue {
        column: column.to_string(),
        row,
        value: value.to_string(),
    }
}

pub(crate) fn require_number(column: &str, row: usize, raw: &str) -> ScoringResult<f64> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(invalid_value(column, row, raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_bucket_boundaries() {
        assert_eq!(TimeBucket::from_hour(0), TimeBucket::Madrugada);
        assert_eq!(TimeBucket::from_hour(5), TimeBucket::Madrugada);
        assert_eq!(TimeBucket::from_hour(6), TimeBucket::Manha);
        assert_eq!(TimeBucket::from_hour(12), TimeBucket::Tarde);
        assert_eq!(TimeBucket::from_hour(17), TimeBucket::Tarde);
        assert_eq!(TimeBucket::from_hour(18), TimeBucket::Noite);
        assert_eq!(TimeBucket::from_hour(23), TimeBucket::Noite);
    }

    #[test]
    fn weekday_from_timestamp() {
        // 2024-06-01 is a Saturday
        let ts = parse_timestamp("2024-06-01 03:15:00").unwrap();
        assert_eq!(Weekday::from_timestamp(&ts), Weekday::Sabado);
        assert!(Weekday::from_timestamp(&ts).is_weekend());
        let monday = parse_timestamp("2024-06-03T10:00:00").unwrap();
        assert_eq!(Weekday::from_timestamp(&monday), Weekday::Segunda);
    }

    #[test]
    fn invalid_timestamps_become_none() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("2024-13-45 99:00:00").is_none());
        assert!(parse_timestamp("2024-06-01").is_some());
    }

    #[test]
    fn offsets_are_normalised_to_utc() {
        let east = parse_timestamp("2024-06-03T10:00:00+02:00").unwrap();
        let utc = parse_timestamp("2024-06-03T09:00:00Z").unwrap();
        assert_eq!(east, parse_timestamp("2024-06-03 08:00:00").unwrap());
        assert!(east < utc);
    }

    #[test]
    fn formatted_timestamps_keep_fractional_seconds() {
        let ts = parse_timestamp("2024-06-03 10:00:00.900");
        assert_eq!(format_timestamp(ts), "2024-06-03 10:00:00.900");
        assert_eq!(parse_timestamp(&format_timestamp(ts)), ts);
        let whole = parse_timestamp("2024-06-03 10:00:00");
        assert_eq!(format_timestamp(whole), "2024-06-03 10:00:00");
        assert_eq!(format_timestamp(None), "");
    }

    #[test]
    fn categorical_round_trip_through_text() {
        for b in TimeBucket::ALL {
            assert_eq!(TimeBucket::parse(b.as_str()), Some(b));
        }
        for d in Weekday::ALL {
            assert_eq!(Weekday::parse(d.as_str()), Some(d));
        }
        assert_eq!(SuspicionLevel::parse("media"), Some(SuspicionLevel::Media));
        assert!(SuspicionLevel::Alta > SuspicionLevel::Media);
        assert!(SuspicionLevel::Baixa > SuspicionLevel::Nenhuma);
    }

    #[test]
    fn flags_and_numbers() {
        assert_eq!(parse_flag("True"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
        assert!(parse_number("").unwrap().is_nan());
        assert_eq!(parse_number("1.5"), Some(1.5));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(format_number(f64::NAN), "");
    }
}
