//! Sequence-number continuity verification
//!
//! A reconnection may make the backend replay a tail of chunks that were
//! already delivered. The verifier admits each sequence number at most once
//! per continuity id.

/// Tracks the highest sequence number admitted for the current continuity id
#[derive(Debug, Clone, Default)]
pub struct ContinuityVerifier {
    highest: Option<u64>,
    rejected: u64,
}

/// Outcome of comparing a server continuity check with local state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub sequence_number: u64,
    pub expected: u64,
    pub in_sync: bool,
}

impl ContinuityVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit or reject a chunk by its sequence number.
    ///
    /// Chunks without a sequence number are always admitted. A rejected chunk
    /// leaves the expected counter untouched.
    pub fn admit(&mut self, sequence_number: Option<u64>) -> bool {
        let Some(seq) = sequence_number else {
            return true;
        };

        if self.highest.is_some_and(|highest| seq <= highest) {
            self.rejected += 1;
            return false;
        }

        self.highest = Some(seq);
        true
    }

    /// Evaluate a continuity check without advancing the counter.
    ///
    /// The server reports the last sequence number it sent; the client is in
    /// sync when that is exactly the last one it admitted.
    pub fn checkpoint(&self, sequence_number: u64) -> Checkpoint {
        Checkpoint {
            sequence_number,
            expected: self.expected(),
            in_sync: self.highest == Some(sequence_number),
        }
    }

    /// Next sequence number that will be admitted
    ///
    /// Saturates at `u64::MAX`; once that value is admitted nothing further is.
    pub fn expected(&self) -> u64 {
        self.highest.map_or(0, |highest| highest.saturating_add(1))
    }

    /// Number of chunks rejected as duplicates since the last reset
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Start over for a new continuity id
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
