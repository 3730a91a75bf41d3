//! Message sequence sets and the recent-message window.

/// Number of most recent messages examined after each change signal.
pub const RECENT_WINDOW: u32 = 5;

/// Set of message sequence numbers addressed by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceSet {
    /// Inclusive range of messages.
    Range(u32, u32),
    /// Every message in the mailbox (`1:*`).
    All,
}

impl SequenceSet {
    /// Addresses the most recent `min(RECENT_WINDOW, message_count)` messages.
    ///
    /// With fewer than [`RECENT_WINDOW`] messages the whole mailbox is
    /// rescanned, so a small or sparse mailbox is never under-read.
    ///
    /// ```
    /// use idle_reply::SequenceSet;
    ///
    /// assert_eq!(SequenceSet::recent(120).to_string(), "116:120");
    /// assert_eq!(SequenceSet::recent(3).to_string(), "1:*");
    /// ```
    #[must_use]
    pub fn recent(message_count: u32) -> Self {
        if message_count >= RECENT_WINDOW {
            SequenceSet::Range(message_count - (RECENT_WINDOW - 1), message_count)
        } else {
            SequenceSet::All
        }
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::All => write!(f, "1:*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_window_boundaries() {
        assert_eq!(SequenceSet::recent(0), SequenceSet::All);
        assert_eq!(SequenceSet::recent(4), SequenceSet::All);
        assert_eq!(SequenceSet::recent(5), SequenceSet::Range(1, 5));
        assert_eq!(SequenceSet::recent(6), SequenceSet::Range(2, 6));
        assert_eq!(SequenceSet::recent(u32::MAX), SequenceSet::Range(u32::MAX - 4, u32::MAX));
    }

    #[test]
    fn test_recent_window_covers_five_messages() {
        for count in 5..500 {
            match SequenceSet::recent(count) {
                SequenceSet::Range(start, end) => {
                    assert_eq!(end, count);
                    assert_eq!(end - start + 1, RECENT_WINDOW);
                }
                other => panic!("count {count} produced {other:?}"),
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(SequenceSet::Range(99, 104).to_string(), "99:104");
        assert_eq!(SequenceSet::All.to_string(), "1:*");
    }
}
