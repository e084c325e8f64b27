//! Run stages driven by the runner and observed by workers.

/// Stage of a traffic run.
///
/// ```text
/// Idle -> Warmup -> WarmupDrain -> Measure -> Drain -> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum RunPhase {
    /// Connections are up, nothing is sent yet.
    #[default]
    Idle = 0,
    Warmup = 1,
    /// Sending paused until warm-up replies are in.
    WarmupDrain = 2,
    Measure = 3,
    /// Sending stopped for good; waiting for the last replies.
    Drain = 4,
    Stopped = 5,
}

impl RunPhase {
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => RunPhase::Warmup,
            2 => RunPhase::WarmupDrain,
            3 => RunPhase::Measure,
            4 => RunPhase::Drain,
            5 => RunPhase::Stopped,
            _ => RunPhase::Idle,
        }
    }

    /// Whether new frames are emitted in this stage.
    #[inline]
    #[must_use]
    pub const fn is_sending(&self) -> bool {
        matches!(self, RunPhase::Warmup | RunPhase::Measure)
    }

    /// Whether frames emitted in this stage are tagged as measured.
    #[inline]
    #[must_use]
    pub const fn is_measuring(&self) -> bool {
        matches!(self, RunPhase::Measure)
    }

    /// Sending will never resume; idle connections can be retired.
    #[inline]
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(self, RunPhase::Drain | RunPhase::Stopped)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Idle => write!(f, "idle"),
            RunPhase::Warmup => write!(f, "warmup"),
            RunPhase::WarmupDrain => write!(f, "warmup-drain"),
            RunPhase::Measure => write!(f, "measure"),
            RunPhase::Drain => write!(f, "drain"),
            RunPhase::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_phase() {
        assert_eq!(RunPhase::default(), RunPhase::Idle);
    }

    #[test]
    fn test_u8_conversion() {
        for phase in [
            RunPhase::Idle,
            RunPhase::Warmup,
            RunPhase::WarmupDrain,
            RunPhase::Measure,
            RunPhase::Drain,
            RunPhase::Stopped,
        ] {
            assert_eq!(RunPhase::from_u8(phase as u8), phase);
        }
        assert_eq!(RunPhase::from_u8(200), RunPhase::Idle);
    }

    #[test]
    fn test_sending_stages() {
        assert!(!RunPhase::Idle.is_sending());
        assert!(RunPhase::Warmup.is_sending());
        assert!(!RunPhase::WarmupDrain.is_sending());
        assert!(RunPhase::Measure.is_sending());
        assert!(!RunPhase::Drain.is_sending());
    }

    #[test]
    fn test_measuring_stages() {
        assert!(RunPhase::Measure.is_measuring());
        assert!(!RunPhase::Warmup.is_measuring());
        assert!(!RunPhase::Drain.is_measuring());
    }

    #[test]
    fn test_final_stages() {
        assert!(!RunPhase::WarmupDrain.is_final());
        assert!(RunPhase::Drain.is_final());
        assert!(RunPhase::Stopped.is_final());
    }

    #[test]
    fn test_display() {
        assert_eq!(RunPhase::WarmupDrain.to_string(), "warmup-drain");
    }
}
