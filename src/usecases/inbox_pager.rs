//! Filter/pager controller: owns the active filter and the page cursor.

use crate::domain::{
    chat::{AgentId, ChatSummary, OrgId},
    events::ApiError,
    filter::{FilterChange, FilterState, PageTicket, StatusFilter},
};

use super::contracts::ChatsQuery;

/// What the engine should do with a completed page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// The response belongs to an older filter or was superseded.
    Stale,
    Apply {
        chats: Vec<ChatSummary>,
        is_first_page: bool,
    },
    Failed {
        error: ApiError,
        is_first_page: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxPager {
    org_id: OrgId,
    agent_id: AgentId,
    filter: FilterState,
    generation: u64,
    in_flight: Option<PageTicket>,
    has_more: bool,
}

impl InboxPager {
    pub fn new(org_id: impl Into<OrgId>, agent_id: impl Into<AgentId>, page_size: u32) -> Self {
        Self {
            org_id: org_id.into(),
            agent_id: agent_id.into(),
            filter: FilterState::with_page_size(page_size),
            generation: 0,
            in_flight: None,
            has_more: false,
        }
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn has_more_pages(&self) -> bool {
        self.has_more
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Applies a filter change. Returns the page-1 ticket to fetch when the
    /// filter actually changed; the caller clears the store.
    pub fn change_filter(&mut self, change: FilterChange) -> Option<PageTicket> {
        if !self.filter.apply(change) {
            return None;
        }
        Some(self.restart())
    }

    /// Starts paging over from page 1 under a new generation. Anything in
    /// flight becomes stale.
    pub fn restart(&mut self) -> PageTicket {
        self.generation += 1;
        self.filter.page = 1;
        self.has_more = false;
        let ticket = PageTicket {
            generation: self.generation,
            page: 1,
        };
        self.in_flight = Some(ticket);
        ticket
    }

    /// Next page continuation, or `None` when there is nothing more to load
    /// or a fetch is already running.
    pub fn load_more(&mut self) -> Option<PageTicket> {
        if !self.has_more || self.in_flight.is_some() {
            return None;
        }

        let ticket = PageTicket {
            generation: self.generation,
            page: self.filter.page + 1,
        };
        self.in_flight = Some(ticket);
        Some(ticket)
    }

    /// Server query for `ticket` under the current filter.
    pub fn query(&self, ticket: PageTicket) -> ChatsQuery {
        let (status, agent_id) = match self.filter.status {
            StatusFilter::All | StatusFilter::Unassigned => (None, None),
            StatusFilter::Status(status) => (Some(status), None),
            StatusFilter::Unread => (None, Some(self.agent_id.clone())),
        };

        ChatsQuery {
            org_id: self.org_id.clone(),
            channel_id: self.filter.channel_id.clone(),
            status,
            tag_id: self.filter.tag_id.clone(),
            agent_id,
            search: self.filter.search_term.clone(),
            page: ticket.page,
            page_size: self.filter.page_size,
        }
    }

    /// Settles a page fetch. Only the ticket currently in flight is relevant.
    pub fn complete(
        &mut self,
        ticket: PageTicket,
        result: Result<Vec<ChatSummary>, ApiError>,
    ) -> PageOutcome {
        if ticket.generation != self.generation || self.in_flight != Some(ticket) {
            return PageOutcome::Stale;
        }
        self.in_flight = None;

        match result {
            Ok(chats) => {
                // Counted before the client-side narrowing on purpose.
                self.has_more = chats.len() == self.filter.page_size as usize;
                self.filter.page = ticket.page;
                let chats = chats
                    .into_iter()
                    .filter(|chat| self.filter.post_filter(chat))
                    .collect();
                PageOutcome::Apply {
                    chats,
                    is_first_page: ticket.is_first_page(),
                }
            }
            Err(error) => PageOutcome::Failed {
                error,
                is_first_page: ticket.is_first_page(),
            },
        }
    }
}
