//! Sequential per-window scanning with parallel synthesis.
//!
//! Each window moves through four phases:
//!
//! ```text
//! Idle --open(position)--> Scanning --scan ends--> Barrier --all joined--> Advancing
//!   ^                                                                          |
//!   +---------------------- tracker snapshot as next position ----------------+
//! ```
//!
//! The scan is a single ordered pass owned by the runner. Matching events are
//! dispatched to a bounded pool of tasks; the barrier joins every task of the
//! window before the next window opens the source again.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::collector::{Collector, ReversibleStatement};
use super::partition::WindowTask;
use super::position::PositionTracker;
use crate::binlog::{ChangeEvent, EventSource, StreamPosition};
use crate::sql::Synthesizer;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Synthesis tasks allowed to run at once.
    pub worker_count: usize,
    /// Dispatched but unfinished tasks allowed before the scan blocks.
    pub max_in_flight: usize,
    pub emit_alternate_reverse: bool,
}

/// Identity of an event that could not be synthesized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedReport {
    pub schema: String,
    pub table: String,
    pub position: StreamPosition,
}

impl fmt::Display for MalformedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} at {}", self.schema, self.table, self.position)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunnerOutcome {
    pub windows_completed: usize,
    pub events_scanned: u64,
    pub events_dispatched: u64,
    pub malformed: Vec<MalformedReport>,
    pub cancelled: bool,
}

/// Where a window currently is.
enum WindowPhase {
    Idle {
        next: StreamPosition,
    },
    Scanning {
        window: WindowTask,
    },
    Barrier {
        window: WindowTask,
        tasks: JoinSet<Result<()>>,
        interrupted: bool,
    },
    Advancing {
        window: WindowTask,
        interrupted: bool,
    },
}

impl WindowPhase {
    fn name(&self) -> &'static str {
        match self {
            WindowPhase::Idle { .. } => "idle",
            WindowPhase::Scanning { .. } => "scanning",
            WindowPhase::Barrier { .. } => "barrier",
            WindowPhase::Advancing { .. } => "advancing",
        }
    }
}

enum ScanEnd {
    /// An event past the window end was seen; it is left for the next window.
    PastWindow,
    Exhausted,
    Cancelled,
}

pub struct WindowRunner<S: EventSource> {
    source: S,
    synthesizer: Arc<Synthesizer>,
    collector: Arc<Collector>,
    alternates: Option<Arc<Collector>>,
    tracker: Arc<PositionTracker>,
    workers: Arc<Semaphore>,
    in_flight: Arc<Semaphore>,
    next_sequence: u64,
    window_scanned: u64,
    window_dispatched: u64,
    outcome: RunnerOutcome,
}

impl<S: EventSource> WindowRunner<S> {
    pub fn new(
        source: S,
        synthesizer: Arc<Synthesizer>,
        collector: Arc<Collector>,
        alternates: Option<Arc<Collector>>,
        tracker: Arc<PositionTracker>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            source,
            synthesizer,
            collector,
            alternates: if settings.emit_alternate_reverse {
                alternates
            } else {
                None
            },
            tracker,
            workers: Arc::new(Semaphore::new(settings.worker_count.max(1))),
            in_flight: Arc::new(Semaphore::new(settings.max_in_flight.max(1))),
            next_sequence: 0,
            window_scanned: 0,
            window_dispatched: 0,
            outcome: RunnerOutcome::default(),
        }
    }

    /// Runs every window in order, starting the first scan after the
    /// tracker's current position.
    ///
    /// Fatal errors abort immediately. Malformed events are recorded in the
    /// outcome. On cancellation the current window's dispatched work is still
    /// joined, and remaining windows are skipped.
    pub async fn run(mut self, windows: &[WindowTask], cancel: &CancellationToken) -> Result<RunnerOutcome> {
        let mut index = 0;
        let mut phase = WindowPhase::Idle {
            next: self.tracker.snapshot(),
        };

        loop {
            debug!(window = index, phase = phase.name(), "Window phase");
            phase = match phase {
                WindowPhase::Idle { next } => {
                    let Some(window) = windows.get(index).copied() else {
                        break;
                    };
                    if cancel.is_cancelled() {
                        info!("Run cancelled before window {}", index);
                        self.outcome.cancelled = true;
                        break;
                    }
                    info!(
                        window = index,
                        start = window.start,
                        end = window.end,
                        from = %next,
                        "Scanning window"
                    );
                    self.source.open(&next).await?;
                    self.window_scanned = 0;
                    self.window_dispatched = 0;
                    WindowPhase::Scanning { window }
                }
                WindowPhase::Scanning { window } => {
                    let mut tasks = JoinSet::new();
                    let end = self.scan(window, &mut tasks, cancel).await?;
                    WindowPhase::Barrier {
                        window,
                        tasks,
                        interrupted: matches!(end, ScanEnd::Cancelled),
                    }
                }
                WindowPhase::Barrier {
                    window,
                    mut tasks,
                    interrupted,
                } => {
                    self.join_all(&mut tasks).await?;
                    if interrupted {
                        self.outcome.cancelled = true;
                    }
                    WindowPhase::Advancing { window, interrupted }
                }
                WindowPhase::Advancing { window, interrupted } => {
                    self.source.close().await?;
                    if interrupted {
                        info!(
                            window = index,
                            scanned = self.window_scanned,
                            dispatched = self.window_dispatched,
                            "Window interrupted by cancellation"
                        );
                        break;
                    }
                    index += 1;
                    self.outcome.windows_completed = index;
                    info!(
                        window = index - 1,
                        start = window.start,
                        end = window.end,
                        scanned = self.window_scanned,
                        dispatched = self.window_dispatched,
                        collected = self.collector.len(),
                        "Window complete"
                    );
                    WindowPhase::Idle {
                        next: self.tracker.snapshot(),
                    }
                }
            };
        }

        Ok(self.outcome)
    }

    async fn scan(
        &mut self,
        window: WindowTask,
        tasks: &mut JoinSet<Result<()>>,
        cancel: &CancellationToken,
    ) -> Result<ScanEnd> {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(ScanEnd::Cancelled),
                next = self.source.next_event() => next?,
            };
            let Some(event) = next else {
                return Ok(ScanEnd::Exhausted);
            };
            self.outcome.events_scanned += 1;
            self.window_scanned += 1;

            if event.timestamp < window.start {
                continue;
            }
            if event.timestamp > window.end {
                debug!("Event at {} is past window end {}", event.timestamp, window.end);
                return Ok(ScanEnd::PastWindow);
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(ScanEnd::Cancelled),
                permit = self.in_flight.clone().acquire_owned() => {
                    permit.map_err(|_| Error::Worker("dispatch semaphore closed".to_string()))?
                }
            };
            self.dispatch(event, permit, tasks);
            self.tracker.merge(&self.source.position());
            self.outcome.events_dispatched += 1;
            self.window_dispatched += 1;
        }
    }

    fn dispatch(&mut self, event: ChangeEvent, permit: OwnedSemaphorePermit, tasks: &mut JoinSet<Result<()>>) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let synthesizer = self.synthesizer.clone();
        let collector = self.collector.clone();
        let alternates = self.alternates.clone();
        let workers = self.workers.clone();

        tasks.spawn(async move {
            let _in_flight = permit;
            let _worker = workers
                .acquire_owned()
                .await
                .map_err(|_| Error::Worker("worker semaphore closed".to_string()))?;
            synthesize_into(&synthesizer, &event, sequence, &collector, alternates.as_deref())
        });
    }

    #[instrument(skip_all, fields(pending = tasks.len()))]
    async fn join_all(&mut self, tasks: &mut JoinSet<Result<()>>) -> Result<()> {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(Error::MalformedEvent {
                    schema,
                    table,
                    position,
                })) => {
                    let report = MalformedReport {
                        schema,
                        table,
                        position,
                    };
                    warn!("Skipping malformed event {}", report);
                    self.outcome.malformed.push(report);
                }
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(Error::Worker(e.to_string())),
            }
        }
        Ok(())
    }
}

fn synthesize_into(
    synthesizer: &Synthesizer,
    event: &ChangeEvent,
    sequence: u64,
    collector: &Collector,
    alternates: Option<&Collector>,
) -> Result<()> {
    let Some(result) = synthesizer.synthesize(event)? else {
        return Ok(());
    };

    let statement = |reverse_sql: String| ReversibleStatement {
        event_time: event.timestamp,
        sequence,
        schema: event.schema.clone(),
        table: event.table.clone(),
        forward_sql: result.forward.clone(),
        reverse_sql,
    };

    if let (Some(alternates), Some(replace)) = (alternates, result.alternate_reverse.clone()) {
        alternates.push(statement(replace));
    }
    collector.push(statement(result.reverse.clone()));
    Ok(())
}
