use std::time::Duration;

/// How long to wait before attempt `n + 1`, given `n` previous attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitPolicy {
    Fixed(Duration),
    /// `base * growth^attempt`, capped at `max` when set.
    Exponential {
        base: Duration,
        growth: f64,
        max: Option<Duration>,
    },
}

impl WaitPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            WaitPolicy::Fixed(d) => *d,
            WaitPolicy::Exponential { base, growth, max } => {
                let factor = growth.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
                let secs = base.as_secs_f64() * factor;
                let cap = max.unwrap_or(Duration::MAX).as_secs_f64();
                // Saturate instead of panicking on absurd exponents.
                Duration::try_from_secs_f64(secs.min(cap)).unwrap_or(Duration::MAX)
            }
        }
    }
}
