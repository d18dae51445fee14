//! Event aggregation and statistics.
//!
//! This module folds normalized event records into a [`Snapshot`]. All
//! mutable state lives in an [`Accumulators`] value owned by one call;
//! finalization consumes it, so derived statistics are computed exactly
//! once and only after every event has been folded.

use crate::analysis::accumulators::{CountMap, DayPartitioned, VisitorSets, VisitorState};
use crate::analysis::classifier::is_non_bot_evidence;
use crate::models::{EventRecord, Snapshot, NO_RIDING_KEY};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info};

/// Default identifier of the guided-flow ("how-to") page.
pub const DEFAULT_GUIDED_FLOW_PAGE: &str = "howto";

/// Options that shape a single aggregation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Page whose events carry meaningful checkpoints.
    pub guided_flow_page: String,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            guided_flow_page: DEFAULT_GUIDED_FLOW_PAGE.to_string(),
        }
    }
}

/// Errors that abort an aggregation as a whole.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("event input is unusable: {0}")]
    UnusableInput(String),
}

/// Something that can hand the engine a finite sequence of events.
pub trait EventSource {
    type Events: IntoIterator<Item = EventRecord>;

    /// Opens the sequence, or reports why it cannot be read at all.
    fn open(self) -> Result<Self::Events, AnalysisError>;
}

impl EventSource for Vec<EventRecord> {
    type Events = Vec<EventRecord>;

    fn open(self) -> Result<Self::Events, AnalysisError> {
        Ok(self)
    }
}

impl<E: fmt::Display> EventSource for Result<Vec<EventRecord>, E> {
    type Events = Vec<EventRecord>;

    fn open(self) -> Result<Self::Events, AnalysisError> {
        self.map_err(|e| AnalysisError::UnusableInput(e.to_string()))
    }
}

/// Mutable state of one aggregation pass.
#[derive(Debug, Clone, Default)]
pub struct Accumulators {
    total_events: usize,
    visitors: HashMap<String, VisitorState>,
    visitors_by_day: VisitorSets,
    non_bot_by_day: VisitorSets,
    election_events: CountMap,
    election_visitors_by_day: DayPartitioned,
    riding_events: CountMap,
    riding_visitors_by_day: DayPartitioned,
    checkpoint_events: CountMap,
    page_views: CountMap,
}

impl Accumulators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a single event into every dimension.
    pub fn fold(&mut self, event: &EventRecord, options: &AggregateOptions) {
        let token = event.visitor_token.as_str();
        let non_bot = is_non_bot_evidence(event);
        let day = event.day();

        self.total_events += 1;

        let visitor = self.visitors.entry(token.to_string()).or_default();
        visitor.actions += 1;
        visitor.non_bot |= non_bot;

        if let Some(election) = event.election() {
            self.election_events.increment(election);
            if let Some(day) = day {
                self.election_visitors_by_day.insert(day, election, token);
            }
        }

        // The sentinel only feeds the flat counter.
        match event.riding() {
            Some(riding) => {
                self.riding_events.increment(riding);
                if let Some(day) = day {
                    self.riding_visitors_by_day.insert(day, riding, token);
                }
            }
            None => self.riding_events.increment(NO_RIDING_KEY),
        }

        if let Some(page) = event.page() {
            self.page_views.increment(page);

            if page == options.guided_flow_page {
                if let Some(checkpoint) = event.checkpoint() {
                    visitor.checkpoints.push(checkpoint.to_string());
                    self.checkpoint_events.increment(checkpoint);
                }
            }
        }

        match day {
            Some(day) => {
                self.visitors_by_day.insert(day, token);
                if non_bot {
                    self.non_bot_by_day.insert(day, token);
                }
            }
            None => debug!(
                visitor = token,
                "Event has no usable date, skipping daily breakdown"
            ),
        }
    }

    /// Absorbs the accumulators of another shard.
    ///
    /// Counters add and visitor sets union. Checkpoints of a visitor seen
    /// in both shards are appended in shard order.
    pub fn merge(&mut self, other: Accumulators) {
        self.total_events += other.total_events;
        for (token, state) in other.visitors {
            self.visitors.entry(token).or_default().merge(state);
        }
        self.visitors_by_day.merge(other.visitors_by_day);
        self.non_bot_by_day.merge(other.non_bot_by_day);
        self.election_events.merge(other.election_events);
        self.election_visitors_by_day
            .merge(other.election_visitors_by_day);
        self.riding_events.merge(other.riding_events);
        self.riding_visitors_by_day.merge(other.riding_visitors_by_day);
        self.checkpoint_events.merge(other.checkpoint_events);
        self.page_views.merge(other.page_views);
    }

    /// Computes the derived statistics and produces the snapshot.
    pub fn finalize(self) -> Snapshot {
        let (engaged_actions, engaged_visitors) = self
            .visitors
            .values()
            .filter(|v| v.is_multi_page())
            .fold((0usize, 0usize), |(sum, n), v| (sum + v.actions, n + 1));

        let average_visit_length = if engaged_visitors == 0 {
            0.0
        } else {
            engaged_actions as f64 / engaged_visitors as f64
        };

        let non_bot_count = self.visitors.values().filter(|v| v.non_bot).count();

        let visitor_checkpoints = self
            .visitors
            .iter()
            .filter(|(_, v)| !v.checkpoints.is_empty())
            .map(|(token, v)| (token.clone(), v.checkpoints.clone()))
            .collect();

        Snapshot {
            total_events: self.total_events,
            unique_visitors: self.visitors.len(),
            non_bot_count,
            average_visit_length,
            visitors_by_day: self.visitors_by_day.cardinalities(),
            non_bot_visitors_by_day: self.non_bot_by_day.cardinalities(),
            election_events: self.election_events.into_sorted(),
            election_visitors_by_day: self.election_visitors_by_day.cardinalities(),
            riding_events: self.riding_events.into_sorted(),
            riding_visitors_by_day: self.riding_visitors_by_day.cardinalities(),
            checkpoint_events: self.checkpoint_events.into_sorted(),
            visitor_checkpoints,
            page_views: self.page_views.into_sorted(),
        }
    }
}

/// Aggregate a finite sequence of events into a snapshot.
pub fn aggregate<I>(events: I, options: &AggregateOptions) -> Snapshot
where
    I: IntoIterator,
    I::Item: Borrow<EventRecord>,
{
    let mut acc = Accumulators::new();
    for event in events {
        acc.fold(event.borrow(), options);
    }
    acc.finalize()
}

/// Aggregate events split across shards, merging before finalization.
#[allow(dead_code)]
pub fn aggregate_shards(shards: &[Vec<EventRecord>], options: &AggregateOptions) -> Snapshot {
    let merged = shards
        .iter()
        .map(|shard| {
            let mut acc = Accumulators::new();
            for event in shard {
                acc.fold(event, options);
            }
            acc
        })
        .fold(Accumulators::new(), |mut merged, shard| {
            merged.merge(shard);
            merged
        });

    merged.finalize()
}

/// Run a full analysis over an event source, emitting status events.
///
/// Returns `None` when the source cannot be read at all; a partial
/// snapshot is never returned.
pub fn analyze_events<S: EventSource>(source: S, options: &AggregateOptions) -> Option<Snapshot> {
    let events = match source.open() {
        Ok(events) => events,
        Err(e) => {
            error!(error = %e, "Error analyzing logs");
            return None;
        }
    };

    let snapshot = aggregate(events, options);

    info!(
        total_events = snapshot.total_events,
        unique_visitors = snapshot.unique_visitors,
        non_bot_count = snapshot.non_bot_count,
        average_visit_length = %format!("{:.2}", snapshot.average_visit_length),
        "Log analysis completed successfully"
    );

    Some(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    fn event(token: &str, timestamp: &str) -> EventRecord {
        EventRecord::new(token, timestamp)
    }

    fn scenario() -> Vec<EventRecord> {
        let mut home = event("v1", "2024-01-01T10:00:00");
        home.page = Some("home".to_string());
        home.signedin = Some(true);

        let mut howto = event("v1", "2024-01-01T11:00:00");
        howto.page = Some("howto".to_string());
        howto.checkpoint = Some("step2".to_string());

        let mut results = event("v2", "2024-01-02T09:00:00");
        results.page = Some("results".to_string());
        results.riding = Some("R1".to_string());

        vec![home, howto, results]
    }

    struct ErrorCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for ErrorCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_end_to_end_scenario() {
        let snapshot = aggregate(&scenario(), &AggregateOptions::default());

        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.unique_visitors, 2);
        assert_eq!(snapshot.non_bot_count, 2);
        assert_eq!(snapshot.average_visit_length, 2.0);
        assert_eq!(snapshot.checkpoint_events.len(), 1);
        assert_eq!(snapshot.checkpoint_events.get("step2"), Some(&1));
        assert_eq!(snapshot.riding_events.len(), 2);
        assert_eq!(snapshot.riding_events.get("R1"), Some(&1));
        // Events, not visitors: v1 has two events without a riding.
        assert_eq!(snapshot.riding_events.get(NO_RIDING_KEY), Some(&2));
        assert_eq!(snapshot.visitor_checkpoints["v1"], vec!["step2"]);
        assert_eq!(snapshot.visitors_by_day["2024-01-01"], 1);
        assert_eq!(snapshot.visitors_by_day["2024-01-02"], 1);
        assert_eq!(snapshot.non_bot_visitors_by_day["2024-01-01"], 1);
        assert_eq!(snapshot.non_bot_visitors_by_day["2024-01-02"], 1);
        assert_eq!(snapshot.riding_visitors_by_day["2024-01-02"]["R1"], 1);
    }

    #[test]
    fn test_empty_input() {
        let snapshot = aggregate(&Vec::<EventRecord>::new(), &AggregateOptions::default());

        assert_eq!(snapshot, Snapshot::default());
        assert_eq!(snapshot.average_visit_length, 0.0);
        assert!(snapshot.riding_events.is_empty());
    }

    #[test]
    fn test_average_excludes_single_action_visitors() {
        let events = vec![
            event("a", "2024-01-01"),
            event("a", "2024-01-01"),
            event("b", "2024-01-01"),
        ];
        let snapshot = aggregate(&events, &AggregateOptions::default());
        assert_eq!(snapshot.average_visit_length, 2.0);

        let lonely = vec![event("a", "2024-01-01"), event("b", "2024-01-01")];
        let snapshot = aggregate(&lonely, &AggregateOptions::default());
        assert_eq!(snapshot.average_visit_length, 0.0);
    }

    #[test]
    fn test_average_over_several_engaged_visitors() {
        let mut events = Vec::new();
        events.extend(std::iter::repeat_with(|| event("a", "2024-01-01")).take(2));
        events.extend(std::iter::repeat_with(|| event("b", "2024-01-01")).take(5));
        events.push(event("c", "2024-01-01"));

        let snapshot = aggregate(&events, &AggregateOptions::default());
        assert_eq!(snapshot.average_visit_length, 3.5);
    }

    #[test]
    fn test_riding_sentinel_is_flat_only() {
        let mut with_election = event("v1", "2024-05-05");
        with_election.election = Some("ge".to_string());

        let snapshot = aggregate(&[with_election], &AggregateOptions::default());
        assert_eq!(snapshot.riding_events.get(NO_RIDING_KEY), Some(&1));
        assert!(snapshot.riding_visitors_by_day.is_empty());
        assert_eq!(snapshot.election_events.get("ge"), Some(&1));
        assert_eq!(snapshot.election_visitors_by_day["2024-05-05"]["ge"], 1);
    }

    #[test]
    fn test_missing_fields_still_counted() {
        let bare = EventRecord {
            visitor_token: "lonely".to_string(),
            ..EventRecord::default()
        };

        let snapshot = aggregate(&[bare], &AggregateOptions::default());
        assert_eq!(snapshot.total_events, 1);
        assert_eq!(snapshot.unique_visitors, 1);
        assert_eq!(snapshot.non_bot_count, 0);
        assert_eq!(snapshot.riding_events.get(NO_RIDING_KEY), Some(&1));
        assert!(snapshot.visitors_by_day.is_empty());
        assert!(snapshot.election_events.is_empty());
        assert!(snapshot.checkpoint_events.is_empty());
    }

    #[test]
    fn test_non_bot_is_monotonic_per_visitor() {
        let mut qualifying = event("v1", "2024-01-01");
        qualifying.signedin = Some(true);
        let plain = event("v1", "2024-01-02");

        for events in [
            vec![qualifying.clone(), plain.clone()],
            vec![plain.clone(), qualifying.clone()],
        ] {
            let snapshot = aggregate(&events, &AggregateOptions::default());
            assert_eq!(snapshot.non_bot_count, 1);
            assert!(snapshot.non_bot_count <= snapshot.unique_visitors);
        }
    }

    #[test]
    fn test_day_non_bot_set_is_per_event() {
        let mut qualifying = event("v1", "2024-01-01");
        qualifying.signedin = Some(true);
        let plain = event("v1", "2024-01-02");

        let snapshot = aggregate(&[qualifying, plain], &AggregateOptions::default());
        assert_eq!(snapshot.non_bot_visitors_by_day.get("2024-01-01"), Some(&1));
        assert_eq!(snapshot.non_bot_visitors_by_day.get("2024-01-02"), None);
        assert_eq!(snapshot.visitors_by_day.get("2024-01-02"), Some(&1));
    }

    #[test]
    fn test_order_independence_except_checkpoints() {
        let mut events = scenario();
        let mut second = event("v1", "2024-01-01T12:00:00");
        second.page = Some("howto".to_string());
        second.checkpoint = Some("step3".to_string());
        events.push(second);

        let forward = aggregate(&events, &AggregateOptions::default());
        let reversed = aggregate(events.iter().rev(), &AggregateOptions::default());

        assert_eq!(forward.visitor_checkpoints["v1"], vec!["step2", "step3"]);
        assert_eq!(reversed.visitor_checkpoints["v1"], vec!["step3", "step2"]);

        let strip = |mut s: Snapshot| {
            s.visitor_checkpoints.clear();
            s
        };
        assert_eq!(strip(forward), strip(reversed));
    }

    #[test]
    fn test_checkpoint_ignored_off_guided_page() {
        let mut off_page = event("v1", "2024-01-01");
        off_page.page = Some("home".to_string());
        off_page.checkpoint = Some("step1".to_string());

        let mut no_page = event("v2", "2024-01-01");
        no_page.checkpoint = Some("step1".to_string());

        let snapshot = aggregate(&[off_page, no_page], &AggregateOptions::default());
        assert!(snapshot.checkpoint_events.is_empty());
        assert!(snapshot.visitor_checkpoints.is_empty());
    }

    #[test]
    fn test_custom_guided_flow_page() {
        let mut e = event("v1", "2024-01-01");
        e.page = Some("walkthrough".to_string());
        e.checkpoint = Some("intro".to_string());

        let options = AggregateOptions {
            guided_flow_page: "walkthrough".to_string(),
        };
        let snapshot = aggregate(&[e], &options);
        assert_eq!(snapshot.checkpoint_events.get("intro"), Some(&1));
    }

    #[test]
    fn test_page_views() {
        let snapshot = aggregate(&scenario(), &AggregateOptions::default());
        assert_eq!(snapshot.page_views.get("home"), Some(&1));
        assert_eq!(snapshot.page_views.get("howto"), Some(&1));
        assert_eq!(snapshot.page_views.get("results"), Some(&1));
    }

    #[test]
    fn test_sharded_merge_matches_single_pass() {
        let events = scenario();
        let single = aggregate(&events, &AggregateOptions::default());
        let sharded = aggregate_shards(
            &[events[..1].to_vec(), events[1..].to_vec()],
            &AggregateOptions::default(),
        );
        assert_eq!(single, sharded);
    }

    #[test]
    fn test_analyze_events_success() {
        let snapshot = analyze_events(scenario(), &AggregateOptions::default()).unwrap();
        assert_eq!(snapshot.unique_visitors, 2);
    }

    #[test]
    fn test_unusable_input_reports_once() {
        let errors = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ErrorCounter(errors.clone()));

        let result = tracing::subscriber::with_default(subscriber, || {
            let source: Result<Vec<EventRecord>, String> = Err("stream closed".to_string());
            analyze_events(source, &AggregateOptions::default())
        });

        assert!(result.is_none());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }
}
