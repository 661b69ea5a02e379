//! Consecutive upstream failure tracking.
//!
//! Any success resets the count. Once the count reaches the threshold the
//! governor is tripped and the poll loop must persist state and stop.

/// Counts consecutive fetch failures
#[derive(Debug, Clone)]
pub struct FailureGovernor {
    consecutive: u32,
    threshold: u32,
}

impl Default for FailureGovernor {
    fn default() -> Self {
        Self::new(10)
    }
}

impl FailureGovernor {
    /// A threshold of 0 is treated as 1
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn on_success(&mut self) {
        self.consecutive = 0;
    }

    /// Record a failure. Returns true once the threshold is reached.
    pub fn on_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.is_tripped()
    }

    pub fn is_tripped(&self) -> bool {
        self.consecutive >= self.threshold
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Change the threshold without losing the running count
    pub fn set_threshold(&mut self, threshold: u32) {
        self.threshold = threshold.max(1);
    }
}
