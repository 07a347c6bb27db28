//! Integration test: both stages end to end through CSV files, with in-test collaborators
//! standing in for the exported models.

use fraudscore::config::{ArtifactsConfig, ScoringConfig};
use fraudscore::model::{
    Classifier, ColumnScaler, KMeansClusterer, ModelSet, OneHotEncoder, ReconstructionModel,
    RepresentationEncoder, ScalerParams,
};
use fraudscore::records::{columns, Table, TimeBucket, Weekday};
use fraudscore::{BehaviorStage, DetectionStage, ScoringError, ScoringResult};
use ndarray::Array2;
use std::path::Path;

/// Latent space equals the scaled input.
struct Identity;

impl RepresentationEncoder for Identity {
    fn predict(&self, input: &Array2<f64>) -> ScoringResult<Array2<f64>> {
        Ok(input.clone())
    }
}

/// Reconstructs zeros, so the error is the row's mean square.
struct Zeros;

impl ReconstructionModel for Zeros {
    fn predict(&self, input: &Array2<f64>) -> ScoringResult<Array2<f64>> {
        Ok(Array2::zeros(input.dim()))
    }
}

/// Flags rows whose first input column (the amount) exceeds the cut-off.
struct AmountClassifier(f64);

impl Classifier for AmountClassifier {
    fn predict_probability(&self, input: &Array2<f64>) -> ScoringResult<Vec<f64>> {
        Ok(input
            .outer_iter()
            .map(|row| if row[0] > self.0 { 0.95 } else { 0.05 })
            .collect())
    }
}

fn strings<T: ToString>(items: impl IntoIterator<Item = T>) -> Vec<String> {
    items.into_iter().map(|s| s.to_string()).collect()
}

fn models(classifier_cutoff: f64) -> ModelSet {
    ModelSet {
        scaler: Box::new(
            ColumnScaler::new(
                vec![columns::AMOUNT.to_string()],
                ScalerParams::MinMax {
                    min: vec![0.0],
                    scale: vec![0.001],
                },
            )
            .unwrap(),
        ),
        type_encoder: Box::new(OneHotEncoder::new(
            columns::KIND,
            strings(["pix", "transferencia", "saque"]),
        )),
        weekday_encoder: Box::new(OneHotEncoder::new(
            columns::WEEKDAY,
            strings(Weekday::ALL.iter().map(|d| d.as_str())),
        )),
        time_bucket_encoder: Box::new(OneHotEncoder::new(
            columns::TIME_BUCKET,
            strings(TimeBucket::ALL.iter().map(|b| b.as_str())),
        )),
        representation_encoder: Box::new(Identity),
        autoencoder: Box::new(Zeros),
        // second centroid is far from every transaction and stays empty
        clusterer: Box::new(KMeansClusterer::new(
            Array2::from_shape_vec((2, 1), vec![0.0, 100.0]).unwrap(),
        )),
        classifier: Box::new(AmountClassifier(classifier_cutoff)),
    }
}

// 2024-06-01 is a Saturday; A's second transaction comes 30 s after the first.
const RAW: &str = "\
transacao_id,conta_id,transacao_data,transacao_valor,transacao_tipo,mesma_titularidade
t2,A,2024-06-01 02:00:30,5000,transferencia,False
t3,B,2024-06-03 10:00:00,50,saque,True
t1,A,2024-06-01 02:00:00,100,pix,False
t4,B,2024-06-03 15:00:00,60,pix,True
t5,C,not a date,70,pix,False
";

fn config(dir: &Path) -> ScoringConfig {
    let mut config = ScoringConfig::default();
    config.io.raw_transactions = dir.join("dados/transacoes.csv");
    config.io.profiled_transactions = dir.join("resultados/perfil.csv");
    config.io.analyzed_transactions = dir.join("resultados/analisadas.csv");
    config.io.alert_log = dir.join("resultados/alertas.csv");
    config
}

fn write_raw(config: &ScoringConfig, csv: &str) {
    let path = &config.io.raw_transactions;
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, csv).unwrap();
}

fn run_both(config: &ScoringConfig, models: &ModelSet) -> (Table, Table) {
    let behavior = BehaviorStage::new(models, config)
        .run(&config.io.raw_transactions, &config.io.profiled_transactions)
        .unwrap();
    assert_eq!(behavior.rows, 5);
    assert_eq!(behavior.accounts, 3);
    assert_eq!(behavior.invalid_timestamps, 1);

    let detection = DetectionStage::new(models, config)
        .run(
            &config.io.profiled_transactions,
            &config.io.analyzed_transactions,
            &config.io.alert_log,
        )
        .unwrap();
    assert_eq!(detection.rows, 5);
    (
        Table::read(&config.io.analyzed_transactions).unwrap(),
        Table::read(&config.io.alert_log).unwrap(),
    )
}

fn column(table: &Table, name: &str) -> Vec<String> {
    let c = table.require(name).unwrap();
    (0..table.len()).map(|r| table.cell(r, c).to_string()).collect()
}

#[test]
fn behavior_stage_persists_features_signals_and_profiles() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_raw(&config, RAW);
    let models = models(4.0);
    BehaviorStage::new(&models, &config)
        .run(&config.io.raw_transactions, &config.io.profiled_transactions)
        .unwrap();

    let out = Table::read(&config.io.profiled_transactions).unwrap();
    assert_eq!(out.len(), 5);
    // raw columns keep their ingested order ahead of the derived ones
    assert_eq!(
        out.headers[..6],
        strings([
            "transacao_id",
            columns::ACCOUNT,
            columns::TIMESTAMP,
            columns::AMOUNT,
            columns::KIND,
            columns::SAME_OWNERSHIP,
        ])[..]
    );
    // input order is preserved
    assert_eq!(column(&out, "transacao_id"), strings(["t2", "t3", "t1", "t4", "t5"]));
    assert_eq!(column(&out, columns::WEEKDAY)[0], "Sabado");
    assert_eq!(column(&out, columns::TIME_BUCKET)[0], "Madrugada");
    assert_eq!(column(&out, columns::WEEKDAY)[4], "");
    assert_eq!(column(&out, columns::AMOUNT)[0], "5");
    assert_eq!(column(&out, columns::CLUSTER), strings(["0"; 5]));
    assert_eq!(column(&out, columns::CLUSTER_SUSPICION)[0], "media");
    assert_eq!(column(&out, columns::SUSPICION)[0], "alta");

    // single-transaction account has no std; profile columns repeat per account row
    let std = column(&out, columns::STD_AMOUNT);
    assert_eq!(std[4], "");
    assert_eq!(std[1], std[3]);
    assert_eq!(column(&out, columns::TRANSACTION_COUNT), strings(["2", "2", "2", "2", "1"]));
    assert_eq!(column(&out, "percentual_pix")[0], "0.5");
    assert_eq!(column(&out, columns::USUAL_TIME_BUCKET)[1], "Manhã");
}

#[test]
fn detection_stage_scores_sorted_batch_and_logs_alerts() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_raw(&config, RAW);
    let (analyzed, alerts) = run_both(&config, &models(4.0));

    assert_eq!(column(&analyzed, "transacao_id"), strings(["t1", "t2", "t3", "t4", "t5"]));
    assert_eq!(column(&analyzed, columns::TIME_SINCE_PREVIOUS), strings(["", "30", "", "18000", ""]));
    assert_eq!(column(&analyzed, columns::RULE_HIGH_FREQUENCY), strings(["0", "1", "0", "0", "0"]));
    assert_eq!(column(&analyzed, columns::RULE_SUSPICIOUS_HOUR), strings(["1", "1", "0", "0", "0"]));
    assert_eq!(column(&analyzed, columns::RULE_CLUSTER), strings(["0", "1", "0", "0", "0"]));
    assert_eq!(column(&analyzed, columns::RULE_DIRECT_ALERT), strings(["0", "1", "0", "0", "0"]));
    assert_eq!(column(&analyzed, columns::FRAUD_SCORE), strings(["2", "5", "0", "0", "0"]));
    assert_eq!(column(&analyzed, columns::CONFIRMED_ANOMALY), strings(["0", "1", "0", "0", "0"]));
    assert_eq!(column(&analyzed, columns::FINAL_DECISION), strings(["0", "1", "0", "0", "0"]));
    let scores: Vec<f64> = column(&analyzed, columns::SCORE)
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
    let expected = [0.25, 1.0, 0.0, 0.0, 0.0];
    assert!(scores.iter().zip(expected).all(|(s, e)| (s - e).abs() < 1e-9));
    assert_eq!(scores[1], 1.0);
    assert_eq!(
        column(&analyzed, columns::RISK_BAND),
        strings(["baixo", "alto", "baixo", "baixo", "baixo"])
    );
    assert_eq!(column(&analyzed, columns::SUSPICION_LEVEL)[1], "media");
    assert_eq!(column(&analyzed, columns::CRITICAL_RISK), strings(["0"; 5]));

    let rationale = column(&analyzed, columns::RATIONALE);
    assert_eq!(rationale[0], "horário suspeito");
    assert_eq!(
        rationale[1],
        "modelo, erro alto, horário suspeito, frequência alta, desvio do cluster"
    );
    assert_eq!(rationale[2], "sem alerta");

    assert_eq!(alerts.headers, analyzed.headers);
    assert_eq!(column(&alerts, "transacao_id"), strings(["t2"]));
}

#[test]
fn sub_second_gap_survives_the_stage_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_raw(
        &config,
        "conta_id,transacao_data,transacao_valor,transacao_tipo,mesma_titularidade
A,2024-06-03 10:00:00.900,100,pix,True
A,2024-06-03 10:01:00.500,120,pix,True
",
    );
    let models = models(4.0);
    BehaviorStage::new(&models, &config)
        .run(&config.io.raw_transactions, &config.io.profiled_transactions)
        .unwrap();
    let profiled = Table::read(&config.io.profiled_transactions).unwrap();
    assert_eq!(
        column(&profiled, columns::TIMESTAMP),
        strings(["2024-06-03 10:00:00.900", "2024-06-03 10:01:00.500"])
    );

    DetectionStage::new(&models, &config)
        .run(
            &config.io.profiled_transactions,
            &config.io.analyzed_transactions,
            &config.io.alert_log,
        )
        .unwrap();
    let analyzed = Table::read(&config.io.analyzed_transactions).unwrap();
    assert_eq!(column(&analyzed, columns::TIME_SINCE_PREVIOUS), strings(["", "59.6"]));
    assert_eq!(column(&analyzed, columns::RULE_HIGH_FREQUENCY), strings(["0", "1"]));
}

#[test]
fn direct_alert_forces_decision_without_the_classifier() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_raw(&config, RAW);
    let (analyzed, alerts) = run_both(&config, &models(f64::INFINITY));

    assert_eq!(column(&analyzed, columns::MODEL_PREDICTION), strings(["0"; 5]));
    assert_eq!(column(&analyzed, columns::FINAL_DECISION), strings(["0", "1", "0", "0", "0"]));
    assert_eq!(column(&alerts, "transacao_id"), strings(["t2"]));
    // without the model the confirmed anomaly is still caught by the direct alert
    assert_eq!(column(&analyzed, columns::CRITICAL_RISK), strings(["0"; 5]));
    let scores = column(&analyzed, columns::SCORE);
    assert_eq!(scores[1], "1");
}

#[test]
fn missing_required_column_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_raw(&config, "conta_id,transacao_valor\nA,1\n");
    let err = BehaviorStage::new(&models(4.0), &config)
        .run(&config.io.raw_transactions, &config.io.profiled_transactions)
        .unwrap_err();
    assert!(matches!(err, ScoringError::MissingColumn { .. }));
    assert!(!config.io.profiled_transactions.exists());
}

#[test]
fn account_without_baseline_aborts_detection() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    write_raw(&config, RAW);
    let models = models(4.0);
    BehaviorStage::new(&models, &config)
        .run(&config.io.raw_transactions, &config.io.profiled_transactions)
        .unwrap();

    let mut profiled = Table::read(&config.io.profiled_transactions).unwrap();
    let mean = profiled.require(columns::MEAN_AMOUNT).unwrap();
    profiled.rows[4][mean] = String::new();

    let err = DetectionStage::new(&models, &config).score(profiled).unwrap_err();
    assert!(matches!(err, ScoringError::MissingProfile { ref account } if account == "C"));
    assert!(!config.io.analyzed_transactions.exists());
    assert!(!config.io.alert_log.exists());
}

#[test]
fn missing_artifacts_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = ArtifactsConfig {
        dir: dir.path().join("modelos"),
        ..ArtifactsConfig::default()
    };
    assert!(matches!(
        ModelSet::load(&artifacts),
        Err(ScoringError::Model { .. })
    ));
}
