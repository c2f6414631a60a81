//! The release decision.
//!
//! Release is allowed only when `rank(attention) >= rank(confidence)`: the
//! attention a file demands must be at least as strict as the confidence
//! available, so an `Always` file is never released on `Sometimes` confidence
//! alone. The gate is pure and runs before any I/O on the encrypted payload.

use super::{Level, PolicyRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denial {
    pub attention: Level,
    pub confidence: Level,
}

pub fn permits(attention: Level, confidence: Level) -> bool {
    attention.rank() >= confidence.rank()
}

pub fn check(record: &PolicyRecord) -> Result<(), Denial> {
    if permits(record.attention, record.confidence) {
        Ok(())
    } else {
        Err(Denial {
            attention: record.attention,
            confidence: record.confidence,
        })
    }
}
