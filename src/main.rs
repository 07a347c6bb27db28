//! fraudscore entrypoint: runs behavior inference, anomaly inference, or both in sequence.
//! Each finished stage prints one JSON summary line to stdout.

use anyhow::{bail, Context};
use fraudscore::{
    BehaviorStage, DetectionStage, ModelSet, ScoringConfig, StageSummary, StructuredLogger,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Behavior,
    Anomaly,
    All,
}

impl Stage {
    fn parse(arg: Option<&str>) -> anyhow::Result<Self> {
        match arg {
            None | Some("all") => Ok(Stage::All),
            Some("behavior") => Ok(Stage::Behavior),
            Some("anomaly") => Ok(Stage::Anomaly),
            Some(other) => bail!("unknown stage '{other}'; expected behavior, anomaly or all"),
        }
    }
}

fn report(summary: &StageSummary) -> anyhow::Result<()> {
    summary.log();
    StructuredLogger::emit_json(summary, &mut std::io::stdout().lock())?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("FRAUDSCORE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let config = ScoringConfig::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    StructuredLogger::init(config.log.json, &config.log.level);

    let arg = std::env::args().nth(1);
    let stage = Stage::parse(arg.as_deref())?;
    info!(?stage, config = %config_path.display(), "fraudscore starting");

    let models = ModelSet::load(&config.artifacts).context("loading model artifacts")?;

    if matches!(stage, Stage::Behavior | Stage::All) {
        let summary = BehaviorStage::new(&models, &config)
            .run(&config.io.raw_transactions, &config.io.profiled_transactions)
            .context("behavior stage failed")?;
        report(&summary)?;
    }
    if matches!(stage, Stage::Anomaly | Stage::All) {
        let summary = DetectionStage::new(&models, &config)
            .run(
                &config.io.profiled_transactions,
                &config.io.analyzed_transactions,
                &config.io.alert_log,
            )
            .context("anomaly stage failed")?;
        report(&summary)?;
    }

    info!("fraudscore complete");
    Ok(())
}
