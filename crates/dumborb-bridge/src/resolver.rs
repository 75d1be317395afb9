//! Overload resolution.
//!
//! Every candidate with the requested name and arity is scored by
//! speculatively unmarshalling each wire argument against the declared
//! parameter type. Each candidate gets its own throwaway state, so scoring
//! never leaves anything behind. Argument scores add up; a candidate with an
//! argument that cannot be unmarshalled at all is out. The lowest total wins
//! and ties go to the candidate declared first.
//!
//! A lone candidate is picked without scoring, so a bad argument surfaces as
//! an unmarshal failure rather than a missing method.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use dumborb_common::{Fixup, PathSegment, Result};
use dumborb_serializer::{Match, Member, Serializer};

/// Scores one candidate against the params array `root`.
pub(crate) fn score(
    ser: &Serializer,
    candidate: &Member,
    root: &Arc<JsonValue>,
    fixups: &[Fixup],
) -> Result<Match> {
    let args = root.as_array().map(Vec::as_slice).unwrap_or(&[]);
    let mut state = ser.score_state(Arc::clone(root), fixups)?;
    candidate
        .wire_types()
        .zip(args)
        .enumerate()
        .try_fold(Match::OKAY, |total, (i, (ty, wire))| {
            ser.try_unmarshal_child(&mut state, PathSegment::Index(i), ty, wire)
                .map(|m| total.plus(m))
        })
}

/// Picks the best candidate, or `None` if none is viable.
pub(crate) fn resolve<'a>(
    ser: &Serializer,
    candidates: &'a [Member],
    root: &Arc<JsonValue>,
    fixups: &[Fixup],
) -> Option<&'a Member> {
    if let [only] = candidates {
        return Some(only);
    }
    let mut best: Option<(&Member, Match)> = None;
    for candidate in candidates {
        match score(ser, candidate, root, fixups) {
            Ok(total) => {
                tracing::debug!("candidate {} scored {}", candidate.signature(), total);
                if best.map_or(true, |(_, current)| total < current) {
                    best = Some((candidate, total));
                }
            }
            Err(e) => tracing::debug!("candidate {} rejected: {}", candidate.signature(), e),
        }
    }
    best.map(|(member, _)| member)
}
