//! Lazy, pull-based walk over the message listing.
//!
//! One page is buffered at a time. A listing call is made only when the
//! buffer is empty and a further page may exist. An empty page that still
//! carries a cursor is not the end: the walker keeps fetching until it has
//! a message to yield or the cursor runs out.

use std::collections::VecDeque;

use crate::error::Result;
use crate::gmail::MailboxApi;
use crate::model::MessageSummary;

/// Iterator over the messages matching a query, in server order.
///
/// Forward-only and not resumable: a new walk starts from the first page.
/// A listing failure is yielded once, after which the walker is exhausted.
pub struct MessageWalker<'a, A: MailboxApi + ?Sized> {
    api: &'a A,
    query: Option<String>,
    buffer: VecDeque<MessageSummary>,
    cursor: Option<String>,
    started: bool,
    failed: bool,
    pages_fetched: usize,
    stalled_pages: usize,
}

/// Start walking the messages matching `query` (empty = all messages).
pub fn list_messages<'a, A: MailboxApi + ?Sized>(api: &'a A, query: &str) -> MessageWalker<'a, A> {
    MessageWalker::new(api, query)
}

impl<'a, A: MailboxApi + ?Sized> MessageWalker<'a, A> {
    pub fn new(api: &'a A, query: &str) -> Self {
        let query = (!query.is_empty()).then(|| query.to_string());
        Self {
            api,
            query,
            buffer: VecDeque::new(),
            cursor: None,
            started: false,
            failed: false,
            pages_fetched: 0,
            stalled_pages: 0,
        }
    }

    /// Number of listing calls made so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Consecutive empty pages that handed back the cursor they were asked with.
    pub fn stalled_pages(&self) -> usize {
        self.stalled_pages
    }

    fn has_more_pages(&self) -> bool {
        !self.started || self.cursor.is_some()
    }

    fn fetch_page(&mut self) -> Result<()> {
        let page = self
            .api
            .list_messages(self.cursor.as_deref(), self.query.as_deref())?;
        self.started = true;
        self.pages_fetched += 1;

        let next = page.next_page_token.filter(|t| !t.is_empty());
        if page.messages.is_empty() {
            tracing::debug!(next_page = ?next, "No messages in this page");
            if next.is_some() && next == self.cursor {
                self.stalled_pages += 1;
                if self.stalled_pages == 1 || self.stalled_pages % 100 == 0 {
                    tracing::warn!(
                        cursor = ?next,
                        repeats = self.stalled_pages,
                        "Server returned an empty page with the same cursor, still following it"
                    );
                }
            } else {
                self.stalled_pages = 0;
            }
        } else {
            self.stalled_pages = 0;
        }
        self.buffer
            .extend(page.messages.into_iter().map(|m| MessageSummary::new(m.id)));
        self.cursor = next;
        Ok(())
    }
}

impl<A: MailboxApi + ?Sized> Iterator for MessageWalker<'_, A> {
    type Item = Result<MessageSummary>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while self.buffer.is_empty() && self.has_more_pages() {
            if let Err(e) = self.fetch_page() {
                self.failed = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
