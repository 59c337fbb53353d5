//! Search filter over the quote snapshot.
use std::sync::Arc;

use crate::reconciler::QuoteMap;

/// Names of the rows whose name contains `query`, ignoring case.
///
/// An empty query keeps every row. Snapshot order is preserved.
pub fn visible_instruments(snapshot: &QuoteMap, query: &str) -> Vec<String> {
    if query.is_empty() {
        return snapshot.keys().cloned().collect();
    }
    let needle = query.to_lowercase();
    snapshot
        .keys()
        .filter(|name| name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Memoized [`visible_instruments`].
///
/// The result only depends on the query and the set of names, so it is
/// recomputed when either the query or the book's membership version changes,
/// not on every quote tick.
#[derive(Debug, Default)]
pub struct VisibleFilter {
    cache: Option<(String, u64, Arc<Vec<String>>)>,
}

impl VisibleFilter {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible names for `query` over `snapshot` at `membership_version`.
    pub fn visible(&mut self, snapshot: &QuoteMap, membership_version: u64, query: &str) -> Arc<Vec<String>> {
        if let Some((cached_query, cached_version, names)) = &self.cache {
            if cached_query == query && *cached_version == membership_version {
                return Arc::clone(names);
            }
        }
        let names = Arc::new(visible_instruments(snapshot, query));
        self.cache = Some((query.to_string(), membership_version, Arc::clone(&names)));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watch_common::{Instrument, QuoteState};

    fn snapshot(names: &[&str]) -> QuoteMap {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let instrument = Instrument::new(name, i as u64, &i.to_string());
                (name.to_string(), Arc::new(QuoteState::pending(&instrument)))
            })
            .collect()
    }

    #[test]
    fn case_insensitive_substring_keeps_order() {
        let quotes = snapshot(&["NIFTY25MAYFUT", "RELIANCE", "BANKNIFTY"]);
        assert_eq!(visible_instruments(&quotes, "ni"), vec!["NIFTY25MAYFUT", "BANKNIFTY"]);
        assert!(visible_instruments(&quotes, "zzz").is_empty());
    }

    #[test]
    fn empty_query_returns_everything() {
        let quotes = snapshot(&["B", "A", "C"]);
        assert_eq!(visible_instruments(&quotes, ""), vec!["B", "A", "C"]);
    }

    #[test]
    fn memo_recomputes_only_on_query_or_membership_change() {
        let quotes = snapshot(&["NIFTY25MAYFUT", "BANKNIFTY"]);
        let mut filter = VisibleFilter::new();

        let first = filter.visible(&quotes, 1, "nifty");
        let again = filter.visible(&quotes, 1, "nifty");
        assert!(Arc::ptr_eq(&first, &again));

        let other_query = filter.visible(&quotes, 1, "bank");
        assert!(!Arc::ptr_eq(&first, &other_query));
        assert_eq!(*other_query, vec!["BANKNIFTY"]);

        let grown = snapshot(&["NIFTY25MAYFUT", "BANKNIFTY", "FINNIFTY"]);
        let after_growth = filter.visible(&grown, 2, "bank");
        assert!(!Arc::ptr_eq(&other_query, &after_growth));
    }
}
