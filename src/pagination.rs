//! Backward cursor pagination over a network event log.
//!
//! The Meraki events endpoint is walked newest-to-oldest: each page reports
//! `pageStartAt`, which becomes the `endingBefore` cursor of the next
//! request. [`Paginator`] decides after every page whether to keep going,
//! independently of any I/O.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::models::EventPage;

/// Where a network's pagination stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Another page should be requested.
    Fetching,
    /// The log ran out: an empty page, or a short page without `pageStartAt`.
    Exhausted,
    /// The page started at or before the window start.
    BoundaryReached,
    /// A request failed; pages collected so far are kept.
    Error,
    /// The response gave no way to advance the cursor safely.
    MalformedStop,
}

impl PageState {
    pub fn is_terminal(self) -> bool {
        self != PageState::Fetching
    }
}

#[derive(Debug, Clone)]
pub struct Paginator {
    window_start: DateTime<Utc>,
    per_page: usize,
    cursor: Option<String>,
    state: PageState,
    pages: usize,
}

impl Paginator {
    pub fn new(window_start: DateTime<Utc>, per_page: usize) -> Self {
        Self {
            window_start,
            per_page,
            cursor: None,
            state: PageState::Fetching,
            pages: 0,
        }
    }

    /// `endingBefore` value for the next request; `None` means "from now".
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn is_fetching(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Feeds one received page and returns the resulting state.
    ///
    /// The boundary check only decides termination; events of the final
    /// page are not clipped to the window here.
    pub fn advance(&mut self, page: &EventPage) -> PageState {
        if self.state.is_terminal() {
            return self.state;
        }
        self.pages += 1;
        self.state = self.next_state(page);
        self.state
    }

    /// Records a failed request.
    pub fn fail(&mut self) -> PageState {
        self.state = PageState::Error;
        self.state
    }

    fn next_state(&mut self, page: &EventPage) -> PageState {
        if page.events.is_empty() {
            return PageState::Exhausted;
        }

        let Some(start) = page.page_start_at.as_deref() else {
            if page.events.len() < self.per_page {
                return PageState::Exhausted;
            }
            warn!(
                events = page.events.len(),
                cursor = ?self.cursor,
                "Full page without pageStartAt, stopping pagination"
            );
            return PageState::MalformedStop;
        };

        match parse_timestamp(start) {
            Some(ts) if ts <= self.window_start => PageState::BoundaryReached,
            Some(_) if self.cursor.as_deref() == Some(start) => {
                warn!(page_start_at = start, "pageStartAt did not move, stopping pagination");
                PageState::MalformedStop
            }
            Some(_) => {
                self.cursor = Some(start.to_string());
                PageState::Fetching
            }
            None => {
                warn!(page_start_at = start, "Unparseable pageStartAt, stopping pagination");
                PageState::MalformedStop
            }
        }
    }
}

/// Parses an ISO-8601 / RFC 3339 timestamp into UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
