use parking_lot::Mutex;

/// One generated statement pair, tagged for ordering and artifact routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversibleStatement {
    /// Commit time of the source event, epoch seconds.
    pub event_time: i64,
    /// Scan order of the source event across the whole run.
    pub sequence: u64,
    pub schema: String,
    pub table: String,
    pub forward_sql: String,
    pub reverse_sql: String,
}

/// Unordered multi-producer sink shared by all synthesis workers of a run.
#[derive(Debug, Default)]
pub struct Collector {
    items: Mutex<Vec<ReversibleStatement>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, statement: ReversibleStatement) {
        self.items.lock().push(statement);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Takes every collected statement, leaving the collector empty.
    pub fn drain(&self) -> Vec<ReversibleStatement> {
        std::mem::take(&mut *self.items.lock())
    }
}
