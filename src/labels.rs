//! Synthetic "confirmed anomaly" labels for offline evaluation. Never used for decisioning.

use crate::config::LabelConfig;
use crate::rules::RuleFlags;
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// 2 x cluster deviation + 2 x suspicious hour + high value + high frequency.
pub fn weighted_score(flags: &RuleFlags) -> u32 {
    2 * u32::from(flags.cluster_deviation)
        + 2 * u32::from(flags.suspicious_hour)
        + u32::from(flags.high_value)
        + u32::from(flags.high_frequency)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyntheticLabels {
    pub scores: Vec<u32>,
    /// Labels after noise injection
    pub labels: Vec<bool>,
    /// Rows flipped positive to negative, ascending
    pub flipped_to_negative: Vec<usize>,
    /// Rows flipped negative to positive, ascending
    pub flipped_to_positive: Vec<usize>,
}

impl SyntheticLabels {
    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l).count()
    }
}

pub struct LabelSynthesizer {
    config: LabelConfig,
}

impl LabelSynthesizer {
    pub fn new(config: LabelConfig) -> Self {
        Self { config }
    }

    /// Number of rows flipped in each direction before clamping to the class size.
    pub fn noise_count(&self, rows: usize) -> usize {
        (self.config.noise_rate * rows as f64).round() as usize
    }

    /// Score every row, threshold it, then flip `min(n, |class|)` rows of each class.
    /// Both samples are drawn from the pre-noise classes, so they never overlap. The same
    /// seed and row order always flip the same rows.
    pub fn synthesize(&self, flags: &[RuleFlags]) -> SyntheticLabels {
        let scores: Vec<u32> = flags.iter().map(weighted_score).collect();
        let mut labels: Vec<bool> = scores.iter().map(|&s| s >= self.config.min_score).collect();

        let (positives, negatives): (Vec<usize>, Vec<usize>) =
            (0..labels.len()).partition(|&i| labels[i]);
        let n = self.noise_count(labels.len());

        let mut rng = Pcg64Mcg::seed_from_u64(self.config.seed);
        let mut draw = |class: &[usize]| -> Vec<usize> {
            let mut picked: Vec<usize> = sample(&mut rng, class.len(), n.min(class.len()))
                .into_iter()
                .map(|i| class[i])
                .collect();
            picked.sort_unstable();
            picked
        };
        let flipped_to_negative = draw(&positives);
        let flipped_to_positive = draw(&negatives);

        for &i in &flipped_to_negative {
            labels[i] = false;
        }
        for &i in &flipped_to_positive {
            labels[i] = true;
        }

        tracing::debug!(
            positives = positives.len(),
            negatives = negatives.len(),
            noise = n,
            "synthetic labels generated"
        );
        SyntheticLabels {
            scores,
            labels,
            flipped_to_negative,
            flipped_to_positive,
        }
    }
}
