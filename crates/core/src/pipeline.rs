//! End-to-end batch run: normalize, aggregate, rank, assemble.

use crate::aggregator::Aggregator;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::normalizer::Normalizer;
use crate::ranker::Ranker;
use crate::report::Report;
use crate::trade::RawTrade;

/// The aggregation pipeline for one configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    normalizer: Normalizer,
    aggregator: Aggregator,
    ranker: Ranker,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            normalizer: Normalizer::new(&config),
            aggregator: Aggregator::new(&config),
            ranker: Ranker::new(&config),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the whole batch.
    ///
    /// Either every stage completes and a full [`Report`] is returned, or
    /// the run fails and nothing is returned.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] when the null-timestamp policy
    /// is `error` and the batch contains a null timestamp, and
    /// [`PipelineError::Overflow`] when a total leaves the decimal range.
    pub fn run(&self, rows: &[RawTrade]) -> Result<Report, PipelineError> {
        tracing::info!(
            rows = rows.len(),
            policy = %self.config.null_timestamp_policy,
            week_anchor = %self.config.week_anchor,
            enable_pnl = self.config.enable_pnl,
            "starting aggregation run"
        );

        let batch = self.normalizer.normalize(rows)?;
        let table = self.aggregator.aggregate(&batch.trades)?;
        let ranked = self.ranker.rank(&table)?;

        tracing::info!(
            accepted = batch.stats.accepted,
            rejected = batch.stats.rejected(),
            aggregated_rows = table.len(),
            ranked = ranked.len(),
            "aggregation run complete"
        );

        Report::assemble(table, ranked, batch.stats)
    }
}
