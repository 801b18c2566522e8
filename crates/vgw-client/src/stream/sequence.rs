//! Per-channel sequence tracking
//!
//! The gateway numbers subscription events and alarm events with two
//! independent counters shared by all endpoints. Sequence numbers are
//! metadata only: events are delivered in decode order whatever they say.

use tracing::{debug, warn};

use crate::types::Category;

/// Counter family an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceFamily {
    Subscription,
    Alarm,
}

impl From<Category> for SequenceFamily {
    fn from(category: Category) -> Self {
        if category.is_alarm() {
            SequenceFamily::Alarm
        } else {
            SequenceFamily::Subscription
        }
    }
}

/// What an observed sequence number says about the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    First,
    InOrder,
    Gap { expected: u64, got: u64 },
    Regression { last: u64, got: u64 },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SequenceStats {
    pub last_subscription: Option<u64>,
    pub last_alarm: Option<u64>,
    pub gaps: u64,
    pub regressions: u64,
}

#[derive(Debug, Default)]
pub struct SequenceTracker {
    stats: SequenceStats,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, category: Category, sequence: u64) -> SequenceCheck {
        let family = SequenceFamily::from(category);
        let last = match family {
            SequenceFamily::Subscription => &mut self.stats.last_subscription,
            SequenceFamily::Alarm => &mut self.stats.last_alarm,
        };

        let check = match *last {
            None => SequenceCheck::First,
            Some(prev) if sequence == prev.wrapping_add(1) => SequenceCheck::InOrder,
            Some(prev) if sequence > prev => SequenceCheck::Gap {
                expected: prev + 1,
                got: sequence,
            },
            Some(prev) => SequenceCheck::Regression {
                last: prev,
                got: sequence,
            },
        };

        match check {
            SequenceCheck::Gap { expected, got } => {
                self.stats.gaps += 1;
                debug!(?family, expected, got, "Sequence gap");
            }
            SequenceCheck::Regression { last: prev, got } => {
                self.stats.regressions += 1;
                warn!(?family, last = prev, got, "Sequence went backwards");
            }
            SequenceCheck::First | SequenceCheck::InOrder => {}
        }

        // Track the highest number seen so a late frame is not mistaken for a restart
        *last = Some(last.map_or(sequence, |prev| prev.max(sequence)));
        check
    }

    pub fn stats(&self) -> SequenceStats {
        self.stats
    }
}
