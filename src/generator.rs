use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::binlog::{EventSource, PreconditionCheck, StreamPosition};
use crate::checkpoint::{Checkpoint, CheckpointManager};
use crate::config::RunSettings;
use crate::pipeline::{
    partition, ArtifactVariant, Collector, Emitter, MalformedReport, OutputSink, PositionTracker,
    RunnerSettings, WindowRunner,
};
use crate::sql::Synthesizer;
use crate::Result;

/// Summary of a finished (or cancelled) run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub windows_total: usize,
    pub windows_completed: usize,
    pub events_scanned: u64,
    pub events_dispatched: u64,
    pub statements_emitted: usize,
    pub alternates_emitted: usize,
    pub malformed: Vec<MalformedReport>,
    /// Position to resume a later run from.
    pub final_position: StreamPosition,
    pub cancelled: bool,
}

/// Drives one rollback run end to end.
pub struct RollbackGenerator {
    settings: RunSettings,
}

impl RollbackGenerator {
    pub fn new(settings: RunSettings) -> Self {
        Self { settings }
    }

    pub async fn run<S, P, O>(&self, source: S, precondition: &P, sink: O) -> Result<RunReport>
    where
        S: EventSource,
        P: PreconditionCheck,
        O: OutputSink,
    {
        self.run_with_cancel(source, precondition, sink, CancellationToken::new())
            .await
    }

    /// Partitions the window, scans it, then emits everything collected in
    /// event-time order.
    ///
    /// Configuration and precondition failures are reported before the
    /// source is opened. A cancelled run still emits and checkpoints what it
    /// collected.
    pub async fn run_with_cancel<S, P, O>(
        &self,
        source: S,
        precondition: &P,
        sink: O,
        cancel: CancellationToken,
    ) -> Result<RunReport>
    where
        S: EventSource,
        P: PreconditionCheck,
        O: OutputSink,
    {
        let settings = &self.settings;
        let windows = partition(settings.window_start, settings.window_end, settings.worker_count)?;

        precondition.check().await?;

        let checkpoints = settings.checkpoint_file.as_ref().map(CheckpointManager::new);
        let resume = self.resume_position(checkpoints.as_ref()).await?;

        info!(
            windows = windows.len(),
            workers = settings.worker_count,
            start = settings.window_start,
            end = settings.window_end,
            resume = %resume,
            "Starting rollback generation"
        );

        let collector = Arc::new(Collector::new());
        let alternates = settings
            .emit_alternate_reverse
            .then(|| Arc::new(Collector::new()));
        let tracker = Arc::new(PositionTracker::new(resume));

        let runner = WindowRunner::new(
            source,
            Arc::new(Synthesizer::new(settings.event_filter())),
            collector.clone(),
            alternates.clone(),
            tracker.clone(),
            RunnerSettings {
                worker_count: settings.worker_count,
                max_in_flight: settings.max_in_flight,
                emit_alternate_reverse: settings.emit_alternate_reverse,
            },
        );
        let outcome = runner.run(&windows, &cancel).await.map_err(|e| {
            error!("Run aborted: {}", e);
            e
        })?;

        let mut emitter = Emitter::new(sink, settings.utc_offset, settings.echo_to_console);
        let statements_emitted = emitter.emit(&collector, ArtifactVariant::Primary).await?;
        let alternates_emitted = match &alternates {
            Some(alternates) => emitter.emit(alternates, ArtifactVariant::Replace).await?,
            None => 0,
        };
        emitter.finish().await?;

        let final_position = tracker.snapshot();
        if let Some(checkpoints) = &checkpoints {
            checkpoints
                .save(&Checkpoint::new(final_position.clone(), statements_emitted as u64))
                .await?;
        }

        for report in &outcome.malformed {
            warn!("Malformed event skipped: {}", report);
        }
        info!(
            statements = statements_emitted,
            alternates = alternates_emitted,
            malformed = outcome.malformed.len(),
            position = %final_position,
            cancelled = outcome.cancelled,
            "Rollback generation finished"
        );

        Ok(RunReport {
            windows_total: windows.len(),
            windows_completed: outcome.windows_completed,
            events_scanned: outcome.events_scanned,
            events_dispatched: outcome.events_dispatched,
            statements_emitted,
            alternates_emitted,
            malformed: outcome.malformed,
            final_position,
            cancelled: outcome.cancelled,
        })
    }

    async fn resume_position(&self, checkpoints: Option<&CheckpointManager>) -> Result<StreamPosition> {
        let configured = self.settings.resume_position.clone();
        if !self.settings.resume_from_checkpoint {
            return Ok(configured);
        }

        match checkpoints {
            Some(manager) => match manager.load().await? {
                Some(checkpoint) => {
                    info!("Resuming after checkpointed position {}", checkpoint.position);
                    Ok(checkpoint.position)
                }
                None => Ok(configured),
            },
            None => {
                warn!("resume_from_checkpoint is set but no checkpoint_file is configured");
                Ok(configured)
            }
        }
    }
}
