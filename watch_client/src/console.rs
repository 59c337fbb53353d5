//! Operator console: stdin commands and the printed market watch board.
use std::fmt::Write;

use watch_client::WatchView;
use watch_client::filter::VisibleFilter;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Replace the search filter; empty clears it.
    Filter(String),
    /// Start a connection cycle.
    Connect,
    /// Tear the feed down.
    Disconnect,
    /// Reset quotes and connect from scratch.
    Reconnect,
    /// Subscribe the whole catalog again.
    Subscribe,
    /// Reload the catalog.
    Reload,
    /// Ban an instrument by name.
    Ban(String),
    /// Print the command list.
    Help,
    /// Leave the client.
    Quit,
    /// Anything else.
    Unknown(String),
}

impl Input {
    /// Parses one console line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Input> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let input = match word.to_ascii_lowercase().as_str() {
            "filter" | "f" => Input::Filter(rest.to_string()),
            "connect" => Input::Connect,
            "disconnect" => Input::Disconnect,
            "reconnect" => Input::Reconnect,
            "subscribe" => Input::Subscribe,
            "reload" => Input::Reload,
            "ban" if !rest.is_empty() => Input::Ban(rest.to_string()),
            "help" | "?" => Input::Help,
            "quit" | "exit" | "q" => Input::Quit,
            _ => Input::Unknown(line.to_string()),
        };
        Some(input)
    }
}

/// Command summary printed by `help`.
pub const HELP: &str = "commands: filter <text> | connect | disconnect | reconnect | subscribe | reload | ban <name> | quit";

/// Printed market watch with its search filter.
#[derive(Debug, Default)]
pub struct Board {
    query: String,
    filter: VisibleFilter,
}

impl Board {
    /// Board starting with `query`.
    pub fn new(query: String) -> Self {
        Self {
            query,
            filter: VisibleFilter::new(),
        }
    }

    /// Replaces the search filter.
    pub fn set_query(&mut self, query: String) {
        self.query = query;
    }

    /// Renders `view` as text.
    pub fn render(&mut self, view: &WatchView, active_clients: Option<u64>) -> String {
        let mut out = String::new();
        let clients = active_clients.map_or_else(|| String::from("-"), |count| count.to_string());
        let mode = view.mode.map_or_else(|| String::from("-"), |mode| mode.to_string());
        let _ = writeln!(
            out,
            "feed {} ({}) | instruments {} | active clients {} | filter {:?}",
            view.state, mode, view.catalog_size, clients, self.query
        );
        if let Some(error) = &view.error {
            let _ = writeln!(out, "! {}", error);
        }
        if let Some(notice) = &view.notice {
            let _ = writeln!(out, "~ {}", notice);
        }

        let names = self.filter.visible(&view.quotes, view.membership_version, &self.query);
        let _ = writeln!(
            out,
            "{:<20} {:>10} {:>10} {:>10} {:>8} {:>10} {:>10} {:<8} {}",
            "INSTRUMENT", "LTP", "BID", "ASK", "CHG%", "HIGH", "LOW", "STATUS", "EXCH"
        );
        for name in names.iter() {
            let Some(quote) = view.quotes.get(name) else {
                continue;
            };
            let _ = writeln!(
                out,
                "{:<20} {:>10.2} {:>10.2} {:>10.2} {:>8.2} {:>10.2} {:>10.2} {:<8} {}",
                quote.name,
                quote.last_traded_price,
                quote.bid,
                quote.ask,
                quote.change_percent,
                quote.high,
                quote.low,
                quote.status,
                quote.exchange
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Input::parse("  "), None);
        assert_eq!(Input::parse("filter nif"), Some(Input::Filter(String::from("nif"))));
        assert_eq!(Input::parse("filter"), Some(Input::Filter(String::new())));
        assert_eq!(Input::parse("BAN  NIFTY25MAYFUT "), Some(Input::Ban(String::from("NIFTY25MAYFUT"))));
        assert_eq!(Input::parse("ban"), Some(Input::Unknown(String::from("ban"))));
        assert_eq!(Input::parse("q"), Some(Input::Quit));
    }
}
