//! Pairwise argument scoring
//!
//! Arguments are scored 0-100 by blending two signals:
//!
//! 1. **Comparative** - the relevance model judges pairs of arguments under
//!    the same context. Raw outputs are squashed with `tanh(raw / 5)`, turned
//!    into a [0, 1] share for each side, averaged per argument, then min-max
//!    normalized across the set.
//! 2. **Absolute** - [`assess_argument_quality`] scaled to 0-100, calibrated
//!    against a deliberately weak baseline argument: anything below it is
//!    clamped into the 0-10 band.
//!
//! `final = (comparative + calibrated) / 2`, so two weak arguments that are
//! slightly better than each other never read as 100 vs 0.
//!
//! Above `max_full_args` arguments only a sample of pairs is compared. The
//! sample is drawn from a seeded generator so the same input always compares
//! the same pairs.

use crate::quality::assess_argument_quality;
use crate::relevance::RelevanceModel;
use crate::types::Argument;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Deliberately weak reference argument
pub const CALIBRATION_BASELINE: &str = "I just want it, no reason";

/// Ceiling for arguments weaker than the baseline
pub const CALIBRATED_CEILING: f64 = 10.0;

/// Score given to every argument when comparisons cannot separate them
const DEGENERATE_SCORE: f64 = 50.0;

/// Score assumed for an argument missing from a score map
const MISSING_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Largest argument count compared exhaustively
    pub max_full_args: usize,
    /// Pair budget once sampling kicks in
    pub max_sampled_pairs: usize,
    /// Seed for pair sampling
    pub seed: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_full_args: 6,
            max_sampled_pairs: 20,
            seed: 0x5EED_DEC1_5105,
        }
    }
}

/// Scores a set of arguments against each other and against the baseline
pub struct PairwiseScorer {
    relevance: Arc<dyn RelevanceModel>,
    config: ScoringConfig,
}

impl PairwiseScorer {
    pub fn new(relevance: Arc<dyn RelevanceModel>, config: ScoringConfig) -> Self {
        Self { relevance, config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Final 0-100 score per argument id
    pub async fn score_arguments(
        &self,
        arguments: &[Argument],
        context: &str,
    ) -> Result<HashMap<String, f64>> {
        match arguments {
            [] => return Ok(HashMap::new()),
            [only] => {
                // Nothing to compare against
                let score = assess_argument_quality(&only.text) * 100.0;
                return Ok(HashMap::from([(only.id.clone(), score)]));
            }
            _ => {}
        }

        // 1. Comparative scoring
        let pairs = self.candidate_pairs(arguments.len());
        debug!(
            arguments = arguments.len(),
            pairs = pairs.len(),
            "running pairwise comparisons"
        );

        let mut sums: HashMap<&str, f64> = HashMap::new();
        let mut counts: HashMap<&str, u32> = HashMap::new();

        for (i, j) in pairs {
            let (a, b) = (&arguments[i], &arguments[j]);
            let raw = self
                .relevance
                .compare(
                    &format_with_context(&a.text, context),
                    &format_with_context(&b.text, context),
                )
                .await
                .with_context(|| format!("comparison of {} vs {} failed", a.id, b.id))?;

            let share_a = comparative_share(raw);
            *sums.entry(a.id.as_str()).or_insert(0.0) += share_a;
            *sums.entry(b.id.as_str()).or_insert(0.0) += 1.0 - share_a;
            *counts.entry(a.id.as_str()).or_insert(0) += 1;
            *counts.entry(b.id.as_str()).or_insert(0) += 1;
        }

        let comparative: Vec<f64> = arguments
            .iter()
            .map(|arg| match counts.get(arg.id.as_str()) {
                Some(&n) if n > 0 => sums[arg.id.as_str()] / n as f64,
                _ => 0.5,
            })
            .collect();
        let comparative = min_max_normalize(&comparative);

        // 2. Absolute quality, calibrated against the baseline
        let baseline = calibration_baseline();

        let mut scores = HashMap::with_capacity(arguments.len());
        for (arg, comparative) in arguments.iter().zip(comparative) {
            let absolute = assess_argument_quality(&arg.text) * 100.0;
            let calibrated = calibrate(absolute, baseline);
            if calibrated != absolute {
                warn!(
                    argument = %arg.id,
                    absolute,
                    baseline,
                    "argument scored below baseline, calibrated to {:.1}",
                    calibrated
                );
            }

            scores.insert(arg.id.clone(), (comparative + calibrated) / 2.0);
        }

        Ok(scores)
    }

    /// Mean final score per variant, the per-option summary shown to users
    pub async fn score_arguments_by_variant(
        &self,
        arguments: &[Argument],
        context: &str,
    ) -> Result<BTreeMap<String, f64>> {
        let scores = self.score_arguments(arguments, context).await?;
        Ok(aggregate_by_variant(arguments, &scores))
    }

    /// Index pairs to compare: all of them up to `max_full_args` arguments,
    /// a seeded sample of at most `max_sampled_pairs` beyond that
    pub fn candidate_pairs(&self, n: usize) -> Vec<(usize, usize)> {
        let all: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect();

        if n <= self.config.max_full_args {
            return all;
        }

        let amount = all.len().min(self.config.max_sampled_pairs);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut picked: Vec<usize> =
            rand::seq::index::sample(&mut rng, all.len(), amount).into_vec();
        picked.sort_unstable();

        debug!(arguments = n, sampled = amount, total = all.len(), "sampling pairs");
        picked.into_iter().map(|idx| all[idx]).collect()
    }
}

/// Frame an argument with its decision context for the relevance model
pub fn format_with_context(argument: &str, context: &str) -> String {
    format!("Context: {}\nArgument: {}", context, argument)
}

/// Map a raw signed comparison to the first argument's [0, 1] share
pub fn comparative_share(raw: f64) -> f64 {
    ((raw / 5.0).tanh() + 1.0) / 2.0
}

/// Absolute score of [`CALIBRATION_BASELINE`], 0-100
pub fn calibration_baseline() -> f64 {
    assess_argument_quality(CALIBRATION_BASELINE) * 100.0
}

/// Clamp arguments weaker than the baseline into the low band
pub fn calibrate(absolute: f64, baseline: f64) -> f64 {
    if absolute < baseline {
        absolute.min(CALIBRATED_CEILING)
    } else {
        absolute
    }
}

/// Mean score per variant; arguments without a score count as 50
pub fn aggregate_by_variant(
    arguments: &[Argument],
    scores: &HashMap<String, f64>,
) -> BTreeMap<String, f64> {
    let mut totals: BTreeMap<String, (f64, u32)> = BTreeMap::new();

    for arg in arguments {
        let score = scores.get(&arg.id).copied().unwrap_or(MISSING_SCORE);
        let entry = totals.entry(arg.variant_name.clone()).or_insert((0.0, 0));
        entry.0 += score;
        entry.1 += 1;
    }

    totals
        .into_iter()
        .map(|(variant, (sum, count))| (variant, sum / count as f64))
        .collect()
}

fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if max > min {
        values.iter().map(|v| (v - min) / (max - min) * 100.0).collect()
    } else {
        vec![DEGENERATE_SCORE; values.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{argument, CountingRelevance, FailingRelevance};

    const CONTEXT: &str = "Should I buy a new laptop for my freelance design work this year?";

    const STRONG: &str = "Buying the laptop pays for itself because my current machine \
        crashes during renders, so I lose billable hours every week. Therefore the upgrade is \
        an investment rather than a luxury. Data from my invoices shows I lost 14 hours last \
        month, which is roughly 900 dollars of income. For example, the last client project \
        slipped by two days due to hardware failures. As a result my reputation suffers, \
        since late delivery leads to fewer referrals. Considering the resale value of the old \
        machine, the net cost is moderate, and evidence from reviews suggests the new model \
        renders three times faster, which results in shorter turnaround for every client and \
        consequently more projects per quarter. Given that design software keeps getting \
        heavier, waiting another year only causes more lost hours and more stress for me and \
        my clients. A study of freelance rates in my field also shows that faster delivery \
        lets designers charge a premium, so the machine should earn back its price within a \
        single season of steady work.";

    fn scorer(relevance: Arc<dyn RelevanceModel>) -> PairwiseScorer {
        PairwiseScorer::new(relevance, ScoringConfig::default())
    }

    #[test]
    fn test_comparative_share_is_symmetric() {
        assert!((comparative_share(0.0) - 0.5).abs() < 1e-12);
        let a = comparative_share(3.0);
        let b = comparative_share(-3.0);
        assert!((a + b - 1.0).abs() < 1e-12);
        assert!(a > 0.5);
        assert!(comparative_share(1e9) <= 1.0);
    }

    #[test]
    fn test_calibration_clamps_below_baseline_only() {
        let baseline = calibration_baseline();
        assert!((baseline - 10.0).abs() < 1e-9);
        assert_eq!(calibrate(0.0, baseline), 0.0);
        assert_eq!(calibrate(80.0, baseline), 80.0);
        // equal to the baseline is not below it
        assert_eq!(calibrate(baseline, baseline), baseline);
    }

    #[test]
    fn test_min_max_degenerate() {
        assert_eq!(min_max_normalize(&[0.4, 0.4, 0.4]), vec![50.0, 50.0, 50.0]);
        assert_eq!(min_max_normalize(&[0.2, 0.6]), vec![0.0, 100.0]);
    }

    #[test]
    fn test_full_pairs_up_to_six() {
        let s = scorer(Arc::new(CountingRelevance::constant(0.0)));
        assert_eq!(s.candidate_pairs(6).len(), 15);
        assert_eq!(s.candidate_pairs(2), vec![(0, 1)]);
    }

    #[test]
    fn test_sampled_pairs_bounded_and_deterministic() {
        let s = scorer(Arc::new(CountingRelevance::constant(0.0)));
        let first = s.candidate_pairs(7);
        assert_eq!(first.len(), 20);
        assert_eq!(first, s.candidate_pairs(7));
        assert!(first.iter().all(|&(i, j)| i < j && j < 7));

        let mut unique = first.clone();
        unique.dedup();
        assert_eq!(unique.len(), first.len());

        assert_eq!(s.candidate_pairs(20).len(), 20);
    }

    #[tokio::test]
    async fn test_single_argument_uses_absolute_quality_only() {
        let relevance = Arc::new(CountingRelevance::constant(2.0));
        let s = scorer(relevance.clone());
        let arg = argument("A", STRONG);

        let scores = s.score_arguments(&[arg.clone()], CONTEXT).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert!((scores[&arg.id] - assess_argument_quality(STRONG) * 100.0).abs() < 1e-9);
        assert_eq!(relevance.calls(), 0);
    }

    #[tokio::test]
    async fn test_single_weak_argument_stays_low() {
        let s = scorer(Arc::new(CountingRelevance::constant(0.0)));
        let arg = argument("A", "Buy");
        let scores = s.score_arguments(&[arg.clone()], CONTEXT).await.unwrap();
        assert!(scores[&arg.id] <= 10.0);
    }

    #[tokio::test]
    async fn test_scores_within_bounds() {
        let s = scorer(Arc::new(CountingRelevance::by_length()));
        let args: Vec<Argument> = [
            "Just buy it",
            STRONG,
            "The old laptop still works fine for email and browsing, so nothing forces a change.",
            "Prices usually drop after the autumn announcements, therefore waiting saves money.",
            "Buy",
        ]
        .iter()
        .enumerate()
        .map(|(i, text)| argument(if i % 2 == 0 { "Buy" } else { "Wait" }, text))
        .collect();

        let scores = s.score_arguments(&args, CONTEXT).await.unwrap();
        assert_eq!(scores.len(), args.len());
        for value in scores.values() {
            assert!((0.0..=100.0).contains(value), "score {} out of range", value);
        }
    }

    #[tokio::test]
    async fn test_strong_beats_weak_by_wide_margin() {
        assert!(STRONG.split_whitespace().count() >= 150);

        for relevance in [CountingRelevance::constant(0.0), CountingRelevance::by_length()] {
            let s = scorer(Arc::new(relevance));
            let weak = argument("A", "Just buy it");
            let strong = argument("B", STRONG);

            let scores = s
                .score_arguments(&[weak.clone(), strong.clone()], CONTEXT)
                .await
                .unwrap();
            assert!(
                scores[&strong.id] - scores[&weak.id] >= 40.0,
                "strong {} weak {}",
                scores[&strong.id],
                scores[&weak.id]
            );
        }
    }

    #[tokio::test]
    async fn test_comparison_budget() {
        let relevance = Arc::new(CountingRelevance::constant(0.5));
        let s = scorer(relevance.clone());

        let seven: Vec<Argument> =
            (0..7).map(|i| argument("A", &format!("argument {}", i))).collect();
        s.score_arguments(&seven, CONTEXT).await.unwrap();
        assert!(relevance.calls() <= 20);

        let relevance = Arc::new(CountingRelevance::constant(0.5));
        let s = scorer(relevance.clone());
        s.score_arguments(&seven[..6], CONTEXT).await.unwrap();
        assert_eq!(relevance.calls(), 15);
    }

    #[tokio::test]
    async fn test_relevance_inputs_carry_context() {
        let relevance = Arc::new(CountingRelevance::constant(0.0));
        let s = scorer(relevance.clone());
        let args = vec![argument("A", "first"), argument("B", "second")];
        s.score_arguments(&args, CONTEXT).await.unwrap();

        let seen = relevance.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, format!("Context: {}\nArgument: first", CONTEXT));
        assert_eq!(seen[0].1, format!("Context: {}\nArgument: second", CONTEXT));
    }

    #[tokio::test]
    async fn test_relevance_failure_propagates() {
        let s = scorer(Arc::new(FailingRelevance));
        let args = vec![argument("A", "first"), argument("B", "second")];
        assert!(s.score_arguments(&args, CONTEXT).await.is_err());
    }

    #[test]
    fn test_aggregate_by_variant() {
        let args = vec![argument("A", "one"), argument("A", "two"), argument("B", "three")];
        let scores = HashMap::from([
            (args[0].id.clone(), 20.0),
            (args[1].id.clone(), 40.0),
            (args[2].id.clone(), 90.0),
        ]);
        let by_variant = aggregate_by_variant(&args, &scores);
        assert_eq!(by_variant.len(), 2);
        assert!((by_variant["A"] - 30.0).abs() < 1e-9);
        assert!((by_variant["B"] - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_by_variant_blocking() {
        let s = scorer(Arc::new(CountingRelevance::constant(0.0)));
        let args = vec![argument("A", "Just buy it"), argument("B", STRONG)];
        let by_variant =
            tokio_test::block_on(s.score_arguments_by_variant(&args, CONTEXT)).unwrap();
        assert_eq!(by_variant.keys().collect::<Vec<_>>(), vec!["A", "B"]);
        assert!(by_variant["B"] > by_variant["A"]);
    }
}
