use crate::{Error, Result};

/// A contiguous slice of the run's time range, in epoch seconds.
///
/// Both bounds are inclusive when matching events. Adjacent windows share a
/// boundary second; the sequential scan hands an event on that second to the
/// earlier window and never revisits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowTask {
    pub start: i64,
    pub end: i64,
}

impl WindowTask {
    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

/// Splits `[start, end]` into `n` windows of `(end - start) / n` seconds.
///
/// The last window ends exactly at `end` so the integer division remainder is
/// not dropped.
pub fn partition(start: i64, end: i64, n: usize) -> Result<Vec<WindowTask>> {
    if n == 0 {
        return Err(Error::Config("worker count must be positive".to_string()));
    }
    if end <= start {
        return Err(Error::Config(format!(
            "time window is empty: end {} is not after start {}",
            end, start
        )));
    }

    let count = i64::try_from(n)
        .map_err(|_| Error::Config(format!("worker count {} is too large", n)))?;
    let step = (end - start) / count;

    let mut windows: Vec<WindowTask> = (0..count)
        .map(|i| WindowTask {
            start: start + i * step,
            end: start + (i + 1) * step,
        })
        .collect();

    if let Some(last) = windows.last_mut() {
        last.end = end;
    }

    Ok(windows)
}
