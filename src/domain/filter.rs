use super::{
    chat::{ChatStatus, ChatSummary, TagId},
    mutation::ChatMutation,
};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Identifies one page fetch: the filter generation it was issued under and
/// the page it asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageTicket {
    pub generation: u64,
    pub page: u32,
}

impl PageTicket {
    pub fn is_first_page(self) -> bool {
        self.page == 1
    }
}

/// Status selector of the inbox.
///
/// `Unread` and `Unassigned` are narrowed on the client after the server
/// returns a page; concrete statuses are filtered by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Status(ChatStatus),
    Unread,
    Unassigned,
}

impl StatusFilter {
    pub fn is_client_side(self) -> bool {
        matches!(self, Self::Unread | Self::Unassigned)
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "unread" => Some(Self::Unread),
            "unassigned" => Some(Self::Unassigned),
            other => ChatStatus::from_label(other).map(Self::Status),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    pub channel_id: Option<String>,
    pub status: StatusFilter,
    pub tag_id: Option<TagId>,
    pub search_term: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
}

/// A change to one filter-affecting field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChange {
    Channel(Option<String>),
    Status(StatusFilter),
    Tag(Option<TagId>),
    Search(Option<String>),
}

impl FilterState {
    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            channel_id: None,
            status: StatusFilter::All,
            tag_id: None,
            search_term: None,
            page: 1,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Applies `change`, resetting the page cursor when anything differs.
    /// Returns whether the filter changed.
    pub fn apply(&mut self, change: FilterChange) -> bool {
        let changed = match change {
            FilterChange::Channel(channel_id) => replace_if_different(&mut self.channel_id, channel_id),
            FilterChange::Status(status) => replace_if_different(&mut self.status, status),
            FilterChange::Tag(tag_id) => replace_if_different(&mut self.tag_id, tag_id),
            FilterChange::Search(term) => {
                let term = term
                    .map(|value| value.trim().to_owned())
                    .filter(|value| !value.is_empty());
                replace_if_different(&mut self.search_term, term)
            }
        };

        if changed {
            self.page = 1;
        }
        changed
    }

    /// Full membership predicate, server-side criteria and client post-filters alike.
    pub fn matches(&self, chat: &ChatSummary) -> bool {
        if let Some(channel_id) = &self.channel_id {
            if chat.channel_id.as_ref() != Some(channel_id) {
                return false;
            }
        }

        if let Some(tag_id) = &self.tag_id {
            if chat.tag_id.as_ref() != Some(tag_id) {
                return false;
            }
        }

        if let Some(term) = &self.search_term {
            if !chat
                .display_name
                .to_lowercase()
                .contains(&term.to_lowercase())
            {
                return false;
            }
        }

        match self.status {
            StatusFilter::All => true,
            StatusFilter::Status(status) => chat.status == status,
            StatusFilter::Unread => chat.unread_count > 0,
            StatusFilter::Unassigned => chat.assigned_agent_id.is_none(),
        }
    }

    /// Client-side narrowing of a server page.
    pub fn post_filter(&self, chat: &ChatSummary) -> bool {
        match self.status {
            StatusFilter::Unread => chat.unread_count > 0,
            StatusFilter::Unassigned => chat.assigned_agent_id.is_none(),
            StatusFilter::All | StatusFilter::Status(_) => true,
        }
    }

    /// Whether a mutation for a chat missing from the store suggests the chat
    /// now belongs to this filter.
    ///
    /// The mutation must carry at least one membership-relevant field and none
    /// of the carried fields may contradict the filter.
    pub fn admits_mutation(&self, mutation: &ChatMutation) -> bool {
        let mut relevant = false;

        if let Some(tag_id) = &mutation.tag_id {
            relevant = true;
            if let Some(wanted) = &self.tag_id {
                if tag_id.as_ref() != Some(wanted) {
                    return false;
                }
            }
        }

        if let Some(status) = mutation.status {
            relevant = true;
            if let StatusFilter::Status(wanted) = self.status {
                if status != wanted {
                    return false;
                }
            }
        }

        if let Some(agent) = &mutation.assigned_agent_id {
            relevant = true;
            if self.status == StatusFilter::Unassigned && agent.is_some() {
                return false;
            }
        }

        if let Some(unread) = mutation.unread_count {
            relevant = true;
            if self.status == StatusFilter::Unread && unread == 0 {
                return false;
            }
        }

        relevant
    }
}

fn replace_if_different<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}
