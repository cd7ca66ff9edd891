//! Lazy, restartable status listing.

use crate::{PageCursor, TicketStore};
use deskline_core::{DesklineResult, Ticket, TicketStatus};
use std::collections::VecDeque;

/// Page size used by [`list_by_status`].
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 50;

/// Iterator over all tickets in one status, fetched a page at a time.
///
/// Each page is a fresh read, so tickets that change status mid-scan may be
/// skipped or appear once more after a [`restart`](TicketScan::restart); no
/// ticket is yielded twice within one pass.
pub struct TicketScan<'a, S: TicketStore + ?Sized> {
    store: &'a S,
    status: TicketStatus,
    page_size: usize,
    buffer: VecDeque<Ticket>,
    cursor: Option<PageCursor>,
    exhausted: bool,
}

impl<'a, S: TicketStore + ?Sized> TicketScan<'a, S> {
    pub fn new(store: &'a S, status: TicketStatus, page_size: usize) -> Self {
        Self {
            store,
            status,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }

    /// Rewind to the most recently updated ticket.
    pub fn restart(&mut self) {
        self.buffer.clear();
        self.cursor = None;
        self.exhausted = false;
    }

    fn fill(&mut self) -> DesklineResult<()> {
        let page = self
            .store
            .list_page(self.status, self.cursor, self.page_size)?;
        self.exhausted = page.next.is_none();
        self.cursor = page.next.or(self.cursor);
        self.buffer.extend(page.tickets);
        Ok(())
    }
}

impl<S: TicketStore + ?Sized> Iterator for TicketScan<'_, S> {
    type Item = DesklineResult<Ticket>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// Scan every ticket in `status`, most recently updated first.
pub fn list_by_status<S: TicketStore + ?Sized>(
    store: &S,
    status: TicketStatus,
) -> TicketScan<'_, S> {
    TicketScan::new(store, status, DEFAULT_SCAN_PAGE_SIZE)
}
