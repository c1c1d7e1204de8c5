/// Counts consecutive poll failures for the running attempt.
#[derive(Debug, Clone)]
pub struct FailureDetector {
    consecutive: u32,
    threshold: u32,
}

impl FailureDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// One success fully re-arms the tolerance.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Returns true when this failure reaches the threshold. The counter is
    /// reset in that case so a later attempt starts clean.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive += 1;
        if self.consecutive >= self.threshold {
            self.consecutive = 0;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}
