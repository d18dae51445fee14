//! Visitor classification.
//!
//! Decides, per event, whether it is evidence of a human visitor. A
//! visitor is non-bot once any of its events satisfies the predicate.

use crate::models::EventRecord;

/// Returns true if this event is evidence of a non-bot visitor.
///
/// An event qualifies when the session is signed in, or when a page was
/// viewed together with at least one of election, riding or candidate.
pub fn is_non_bot_evidence(event: &EventRecord) -> bool {
    if event.is_signed_in() {
        return true;
    }

    let has_dimension =
        event.election().is_some() || event.riding().is_some() || event.candidate().is_some();

    event.page().is_some() && has_dimension
}
