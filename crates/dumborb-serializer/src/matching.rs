//! Match quality scores used by overload resolution.

use std::fmt;

/// Penalty accumulated while speculatively unmarshalling a wire value.
///
/// Lower is better. Within one container the worst element decides; across
/// the arguments of a call the penalties add up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Match(u32);

impl Match {
    /// Exact shape match
    pub const OKAY: Match = Match(0);
    /// Wildcard target or assignability fallback
    pub const SIMILAR: Match = Match(1);
    /// Lossy coercion, e.g. wire string into a number
    pub const ROUGHLY_SIMILAR: Match = Match(2);

    pub fn penalty(self) -> u32 {
        self.0
    }

    /// The worse of two scores.
    pub fn worse(self, other: Match) -> Match {
        self.max(other)
    }

    /// Sum of two scores.
    pub fn plus(self, other: Match) -> Match {
        Match(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
