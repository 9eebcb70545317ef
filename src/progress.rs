//! Operator-facing progress lines.

/// Sink for human-readable progress lines (status transitions, log tails).
pub trait Progress: Send + Sync {
    fn line(&self, message: &str);
}

/// Writes every line to stderr, keeping stdout free for the result document.
pub struct StderrProgress;

impl Progress for StderrProgress {
    fn line(&self, message: &str) {
        eprintln!("{}", message);
    }
}

/// Collects lines in memory.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingProgress {
    lines: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l.contains(needle))
    }
}

#[cfg(test)]
impl Progress for RecordingProgress {
    fn line(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}
