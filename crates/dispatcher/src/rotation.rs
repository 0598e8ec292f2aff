//! Output file rotation policy
//!
//! Pure state machine, time is passed in. A file is `Closed` until the first
//! row after startup or after a rotation opens it. Only written data rows
//! count towards `max_lines`; the header never does.

use std::time::{Duration, Instant};

use contracts::CsvConfig;

/// Why a file is rotated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationTrigger {
    /// `max_lines` data rows written
    Lines,
    /// File older than `max_age`
    Age,
}

impl RotationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lines => "lines",
            Self::Age => "age",
        }
    }
}

/// State of the current output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationState {
    #[default]
    Closed,
    Open { lines: u64, since: Instant },
}

impl RotationState {
    pub fn opened(now: Instant) -> Self {
        Self::Open { lines: 0, since: now }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn lines(&self) -> u64 {
        match self {
            Self::Open { lines, .. } => *lines,
            Self::Closed => 0,
        }
    }

    /// Count one written data row
    pub fn record_row(&mut self) {
        if let Self::Open { lines, .. } = self {
            *lines += 1;
        }
    }
}

/// Line and age limits; either one firing rotates the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RotationPolicy {
    max_lines: Option<u64>,
    max_age: Option<Duration>,
}

impl RotationPolicy {
    /// `0` disables a trigger
    pub fn new(max_lines: u64, max_age_secs: u64) -> Self {
        Self {
            max_lines: (max_lines > 0).then_some(max_lines),
            max_age: (max_age_secs > 0).then(|| Duration::from_secs(max_age_secs)),
        }
    }

    pub fn max_lines(&self) -> Option<u64> {
        self.max_lines
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Trigger that fires for `state` at `now`, checked before a write
    ///
    /// The line trigger is checked first; a closed file never rotates.
    pub fn check(&self, state: &RotationState, now: Instant) -> Option<RotationTrigger> {
        let RotationState::Open { lines, since } = *state else {
            return None;
        };

        if self.max_lines.is_some_and(|max| lines >= max) {
            return Some(RotationTrigger::Lines);
        }
        if self
            .max_age
            .is_some_and(|max| now.saturating_duration_since(since) >= max)
        {
            return Some(RotationTrigger::Age);
        }
        None
    }
}

impl From<&CsvConfig> for RotationPolicy {
    fn from(config: &CsvConfig) -> Self {
        Self::new(config.max_lines, config.max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_never_rotates() {
        let policy = RotationPolicy::new(1, 1);
        assert_eq!(policy.check(&RotationState::Closed, Instant::now()), None);
    }

    #[test]
    fn test_line_trigger_after_max_rows() {
        let policy = RotationPolicy::new(100, 0);
        let t0 = Instant::now();
        let mut state = RotationState::opened(t0);

        let mut rotations = 0;
        for _ in 0..100 {
            if policy.check(&state, t0).is_some() {
                rotations += 1;
            }
            state.record_row();
        }
        assert_eq!(rotations, 0);
        assert_eq!(policy.check(&state, t0), Some(RotationTrigger::Lines));
    }

    #[test]
    fn test_age_trigger_without_traffic() {
        let policy = RotationPolicy::new(100, 300);
        let t0 = Instant::now();
        let mut state = RotationState::opened(t0);
        state.record_row();

        assert_eq!(policy.check(&state, t0 + Duration::from_secs(299)), None);
        assert_eq!(
            policy.check(&state, t0 + Duration::from_secs(301)),
            Some(RotationTrigger::Age)
        );
    }

    #[test]
    fn test_zero_disables_triggers() {
        let policy = RotationPolicy::new(0, 0);
        let t0 = Instant::now();
        let mut state = RotationState::opened(t0);
        for _ in 0..10_000 {
            state.record_row();
        }
        assert_eq!(policy.check(&state, t0 + Duration::from_secs(86_400)), None);
        assert_eq!(policy.max_lines(), None);
        assert_eq!(policy.max_age(), None);
    }

    #[test]
    fn test_first_trigger_wins() {
        let policy = RotationPolicy::new(2, 10);
        let t0 = Instant::now();
        let mut state = RotationState::opened(t0);
        state.record_row();
        state.record_row();
        assert_eq!(
            policy.check(&state, t0 + Duration::from_secs(60)),
            Some(RotationTrigger::Lines)
        );
    }
}
