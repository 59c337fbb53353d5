//! Quote reconciliation.
//!
//! `QuoteBook` is the only writer of the quote snapshot. Inbound quote events are
//! normalized into a candidate `QuoteState`; the candidate replaces the stored
//! row only when an observable field differs, so unchanged rows keep their
//! `Arc` and readers can skip them with `Arc::ptr_eq`.
//!
//! The snapshot itself sits behind an `Arc` and is copied on write only while a
//! reader still holds a previous snapshot. The session hands snapshots out at
//! most once per publish interval, so a burst of ticks pays for one copy.
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, warn};
use serde_json::Value;
use watch_common::command::coerce_number;
use watch_common::{Instrument, QuoteEvent, QuoteState, QuoteStatus};

/// Quote rows keyed by instrument name, in insertion order.
pub type QuoteMap = IndexMap<String, Arc<QuoteState>>;

/// What a quote event did to the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// No usable instrument name; nothing changed.
    Discarded,
    /// Every field matched the stored row; the old row was kept.
    Unchanged,
    /// The stored row was replaced.
    Updated,
    /// A row was created for a name that had none.
    Inserted,
}

impl Reconciled {
    /// `true` when the snapshot changed.
    pub fn changed(self) -> bool {
        matches!(self, Reconciled::Updated | Reconciled::Inserted)
    }
}

/// Owner of the quote snapshot.
#[derive(Debug, Default)]
pub struct QuoteBook {
    quotes: Arc<QuoteMap>,
    membership_version: u64,
}

impl QuoteBook {
    /// Empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cheap shared view of the current rows.
    pub fn snapshot(&self) -> Arc<QuoteMap> {
        Arc::clone(&self.quotes)
    }

    /// Bumped whenever keys are added or the book is reset.
    pub fn membership_version(&self) -> u64 {
        self.membership_version
    }

    /// Row for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&Arc<QuoteState>> {
        self.quotes.get(name)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    /// `true` when the book has no rows.
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Seeds a `PENDING` row for `instrument` unless one exists.
    ///
    /// Returns `true` when a row was created. Existing rows, possibly `ACTIVE`,
    /// are never overwritten.
    pub fn seed_pending(&mut self, instrument: &Instrument) -> bool {
        if self.quotes.contains_key(&instrument.name) {
            return false;
        }
        Arc::make_mut(&mut self.quotes)
            .insert(instrument.name.clone(), Arc::new(QuoteState::pending(instrument)));
        self.membership_version += 1;
        true
    }

    /// Applies one inbound quote event.
    pub fn on_quote_event(&mut self, raw: &QuoteEvent) -> Reconciled {
        let Some(name) = raw.resolve_name() else {
            warn!("Discarding quote event without instrument name or symbol: {:?}", raw);
            return Reconciled::Discarded;
        };

        let previous = self.quotes.get(name);
        let candidate = normalize(name, raw, previous.map(Arc::as_ref));

        match previous.map(|existing| **existing == candidate) {
            Some(true) => Reconciled::Unchanged,
            Some(false) => {
                Arc::make_mut(&mut self.quotes).insert(name.to_string(), Arc::new(candidate));
                Reconciled::Updated
            }
            None => {
                debug!("Quote for unsubscribed instrument {}, adding a row", name);
                Arc::make_mut(&mut self.quotes).insert(name.to_string(), Arc::new(candidate));
                self.membership_version += 1;
                Reconciled::Inserted
            }
        }
    }

    /// Marks every `ACTIVE` row `INACTIVE`; returns how many rows changed.
    pub fn mark_inactive(&mut self) -> usize {
        let stale: Vec<String> = self
            .quotes
            .iter()
            .filter(|(_, quote)| quote.status == QuoteStatus::Active)
            .map(|(name, _)| name.clone())
            .collect();
        if stale.is_empty() {
            return 0;
        }
        let quotes = Arc::make_mut(&mut self.quotes);
        for name in &stale {
            if let Some(quote) = quotes.get_mut(name) {
                let mut inactive = (**quote).clone();
                inactive.status = QuoteStatus::Inactive;
                *quote = Arc::new(inactive);
            }
        }
        stale.len()
    }

    /// Drops every row.
    pub fn reset(&mut self) {
        self.quotes = Arc::new(QuoteMap::new());
        self.membership_version += 1;
    }
}

fn normalize(name: &str, raw: &QuoteEvent, previous: Option<&QuoteState>) -> QuoteState {
    let sticky = |value: &Option<Value>, fallback: fn(&QuoteState) -> f64| {
        coerce_number(value.as_ref()).unwrap_or_else(|| previous.map(fallback).unwrap_or(0.0))
    };

    let exchange = match &raw.exchange {
        Some(Value::String(exchange)) => exchange.clone(),
        _ => previous.map(|p| p.exchange.clone()).unwrap_or_default(),
    };
    let instrument_token = coerce_number(raw.token())
        .filter(|token| *token >= 0.0 && token.fract() == 0.0)
        .map(|token| token as u64)
        .unwrap_or_else(|| previous.map(|p| p.instrument_token).unwrap_or(0));

    QuoteState {
        name: name.to_string(),
        bid: coerce_number(raw.bid.as_ref()).unwrap_or(0.0),
        ask: coerce_number(raw.ask.as_ref()).unwrap_or(0.0),
        last_traded_price: coerce_number(raw.ltp.as_ref()).unwrap_or(0.0),
        change_percent: sticky(&raw.change, |p| p.change_percent),
        high: sticky(&raw.high, |p| p.high),
        low: sticky(&raw.low, |p| p.low),
        status: QuoteStatus::Active,
        exchange,
        instrument_token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> QuoteEvent {
        serde_json::from_value(value).unwrap()
    }

    fn seeded() -> QuoteBook {
        let mut book = QuoteBook::new();
        book.seed_pending(&Instrument::new("A", 1, "1"));
        book.seed_pending(&Instrument::new("B", 2, "2"));
        book
    }

    #[test]
    fn first_quote_activates_only_its_instrument() {
        let mut book = seeded();
        let outcome = book.on_quote_event(&event(json!({"symbol": "A", "ltp": 100, "bid": 99, "ask": 101})));
        assert_eq!(outcome, Reconciled::Updated);

        let a = book.get("A").unwrap();
        assert_eq!(a.status, QuoteStatus::Active);
        assert_eq!(a.last_traded_price, 100.0);
        assert_eq!(a.bid, 99.0);
        assert_eq!(a.ask, 101.0);
        assert_eq!(a.instrument_token, 1);
        assert_eq!(book.get("B").unwrap().status, QuoteStatus::Pending);
    }

    #[test]
    fn identical_quote_keeps_reference() {
        let mut book = seeded();
        let tick = event(json!({"symbol": "A", "ltp": 100, "bid": 99, "ask": 101}));
        book.on_quote_event(&tick);
        let first = Arc::clone(book.get("A").unwrap());

        assert_eq!(book.on_quote_event(&tick), Reconciled::Unchanged);
        assert!(Arc::ptr_eq(&first, book.get("A").unwrap()));

        // Same values spelled differently normalize to the same row.
        let spelled = event(json!({"instrumentName": "A", "ltp": "100", "bid": 99.0, "ask": "101"}));
        assert_eq!(book.on_quote_event(&spelled), Reconciled::Unchanged);
        assert!(Arc::ptr_eq(&first, book.get("A").unwrap()));
    }

    #[test]
    fn nameless_event_changes_nothing() {
        let mut book = seeded();
        let before = book.snapshot();
        let outcome = book.on_quote_event(&event(json!({"ltp": 5, "bid": 4})));
        assert_eq!(outcome, Reconciled::Discarded);
        assert!(Arc::ptr_eq(&before, &book.snapshot()));
        assert_eq!(*before, *book.snapshot());
    }

    #[test]
    fn sticky_fields_survive_transient_gaps() {
        let mut book = seeded();
        book.on_quote_event(&event(json!({"symbol": "A", "ltp": 10, "change": 1.5, "high": 12, "low": 9, "exchange": "NFO"})));
        book.on_quote_event(&event(json!({"symbol": "A", "ltp": "n/a", "change": null, "high": "x"})));

        let a = book.get("A").unwrap();
        assert_eq!(a.last_traded_price, 0.0);
        assert_eq!(a.change_percent, 1.5);
        assert_eq!(a.high, 12.0);
        assert_eq!(a.low, 9.0);
        assert_eq!(a.exchange, "NFO");
    }

    #[test]
    fn unknown_instrument_gets_a_row() {
        let mut book = seeded();
        let version = book.membership_version();
        let outcome = book.on_quote_event(&event(json!({"symbol": "C", "ltp": 3, "instrumentToken": 33})));
        assert_eq!(outcome, Reconciled::Inserted);
        assert_eq!(book.get("C").unwrap().instrument_token, 33);
        assert!(book.membership_version() > version);
        assert_eq!(book.snapshot().keys().collect::<Vec<_>>(), vec!["A", "B", "C"]);
    }

    #[test]
    fn seeding_never_overwrites() {
        let mut book = seeded();
        book.on_quote_event(&event(json!({"symbol": "A", "ltp": 7})));
        assert!(!book.seed_pending(&Instrument::new("A", 1, "1")));
        assert_eq!(book.get("A").unwrap().status, QuoteStatus::Active);
    }

    #[test]
    fn old_snapshots_are_not_mutated() {
        let mut book = seeded();
        let before = book.snapshot();
        book.on_quote_event(&event(json!({"symbol": "A", "ltp": 7})));
        assert_eq!(before.get("A").unwrap().status, QuoteStatus::Pending);
        assert_eq!(book.get("A").unwrap().status, QuoteStatus::Active);
    }

    #[test]
    fn inactive_rows_reactivate_on_next_quote() {
        let mut book = seeded();
        let tick = event(json!({"symbol": "A", "ltp": 7}));
        book.on_quote_event(&tick);
        assert_eq!(book.mark_inactive(), 1);
        assert_eq!(book.get("A").unwrap().status, QuoteStatus::Inactive);
        assert_eq!(book.get("B").unwrap().status, QuoteStatus::Pending);
        assert_eq!(book.on_quote_event(&tick), Reconciled::Updated);
        assert_eq!(book.get("A").unwrap().status, QuoteStatus::Active);
    }
}
