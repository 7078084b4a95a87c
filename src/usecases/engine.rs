//! Inbox session: the single owner of every store, driven by one event queue.

use chrono::Utc;

use crate::domain::{
    chat::{AgentId, ChatId, ChatStatus, ChatSummary, OrgId},
    chat_list_state::{ChatListState, ChatListUiState, MutationOutcome, NewMessageOutcome},
    conversation_state::{ConversationHistory, ConversationState, SelectionToken},
    events::{ActionAck, ApiError, EngineEvent, PushEvent, SyncFault},
    filter::{FilterChange, FilterState, PageTicket, StatusFilter},
    message::Message,
    mutation::ChatMutation,
    pending_actions::ActionId,
    status::ConnectionStatus,
};

use super::{
    actions::{ActionCoordinator, ActionError, ActionTargets, EngineNotice},
    contracts::{ChatMutationApi, ChatQueryApi, PushSession},
    conversation_loader::{ConversationLoader, LoadOutcome},
    inbox_pager::{InboxPager, PageOutcome},
};

const INBOX_RESYNC: &str = "INBOX_RESYNC";
const SEEN_FAILED: &str = "SEEN_FAILED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub org_id: OrgId,
    pub agent_id: AgentId,
    pub page_size: u32,
    pub conversation_count: u32,
}

/// Outbound collaborators of the engine.
pub struct EngineBackend {
    pub queries: Box<dyn ChatQueryApi>,
    pub mutations: Box<dyn ChatMutationApi>,
    pub push: Box<dyn PushSession>,
}

pub struct InboxEngine {
    pager: InboxPager,
    chat_list: ChatListState,
    loader: ConversationLoader,
    coordinator: ActionCoordinator,
    connection: ConnectionStatus,
    notices: Vec<EngineNotice>,
    backend: EngineBackend,
    closed: bool,
}

impl InboxEngine {
    pub fn new(settings: EngineSettings, backend: EngineBackend) -> Self {
        Self {
            pager: InboxPager::new(
                settings.org_id.clone(),
                settings.agent_id.clone(),
                settings.page_size,
            ),
            chat_list: ChatListState::default(),
            loader: ConversationLoader::new(
                settings.org_id.clone(),
                settings.agent_id.clone(),
                settings.conversation_count,
            ),
            coordinator: ActionCoordinator::new(settings.org_id, settings.agent_id),
            connection: ConnectionStatus::Connecting,
            notices: Vec::new(),
            backend,
            closed: false,
        }
    }

    /// Loads the first page of the default filter.
    pub fn start(&mut self) {
        self.chat_list.set_loading();
        let ticket = self.pager.restart();
        self.fetch_page(ticket);
    }

    pub fn chats(&self) -> &ChatListState {
        &self.chat_list
    }

    pub fn conversation(&self) -> Option<&ConversationState> {
        self.loader.current()
    }

    pub fn filter(&self) -> &FilterState {
        self.pager.filter()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn has_more_pages(&self) -> bool {
        self.pager.has_more_pages()
    }

    pub fn pending_actions(&self) -> usize {
        self.coordinator.pending_count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn drain_notices(&mut self) -> Vec<EngineNotice> {
        std::mem::take(&mut self.notices)
    }

    pub fn handle_event(&mut self, event: EngineEvent) {
        if self.closed {
            tracing::debug!(event = event.kind(), "engine closed; event dropped");
            return;
        }

        match event {
            EngineEvent::Push(PushEvent::NewMessage(message)) => self.on_new_message(message),
            EngineEvent::Push(PushEvent::ChatMutated(mutation)) => self.on_chat_mutated(mutation),
            EngineEvent::Connection(status) => self.on_connection(status),
            EngineEvent::ChatsFetched { ticket, result } => self.on_page(ticket, result),
            EngineEvent::ConversationFetched {
                token,
                full_history,
                result,
            } => self.on_conversation(token, full_history, result),
            EngineEvent::ActionCompleted { action_id, result } => {
                self.on_action_completed(action_id, result)
            }
            EngineEvent::SeenCompleted { chat_id, result } => {
                if let Err(error) = result {
                    tracing::warn!(code = SEEN_FAILED, chat_id = %chat_id, error = %error, "seen call failed");
                }
            }
        }
    }

    /// Changes one filter field. Returns false when the filter is unchanged.
    pub fn change_filter(&mut self, change: FilterChange) -> bool {
        let Some(ticket) = self.pager.change_filter(change) else {
            return false;
        };
        self.chat_list.set_loading();
        self.fetch_page(ticket);
        true
    }

    pub fn set_channel_filter(&mut self, channel_id: Option<String>) -> bool {
        self.change_filter(FilterChange::Channel(channel_id))
    }

    pub fn set_status_filter(&mut self, status: StatusFilter) -> bool {
        self.change_filter(FilterChange::Status(status))
    }

    pub fn set_tag_filter(&mut self, tag_id: Option<String>) -> bool {
        self.change_filter(FilterChange::Tag(tag_id))
    }

    pub fn set_search(&mut self, term: Option<String>) -> bool {
        self.change_filter(FilterChange::Search(term))
    }

    /// Re-issues page 1 without touching the filter. Rows stay visible until
    /// the result replaces them.
    pub fn refresh(&mut self) {
        let ticket = self.pager.restart();
        self.fetch_page(ticket);
    }

    pub fn load_more(&mut self) -> bool {
        match self.pager.load_more() {
            Some(ticket) => {
                self.fetch_page(ticket);
                true
            }
            None => false,
        }
    }

    pub fn select(&mut self, chat_id: &str) -> Result<SelectionToken, ActionError> {
        let summary = self
            .chat_list
            .get(chat_id)
            .cloned()
            .ok_or_else(|| ActionError::UnknownChat(chat_id.to_owned()))?;

        self.chat_list.set_selected(Some(summary.chat_id.clone()));
        Ok(self.loader.select(
            summary,
            self.backend.push.as_ref(),
            self.backend.queries.as_ref(),
        ))
    }

    pub fn deselect(&mut self) -> Option<ChatId> {
        self.chat_list.set_selected(None);
        self.loader.deselect(self.backend.push.as_ref())
    }

    pub fn reload_conversation(&mut self) -> Option<SelectionToken> {
        self.loader.reload(self.backend.queries.as_ref())
    }

    pub fn load_full_history(&mut self) -> Option<SelectionToken> {
        self.loader.load_full_history(self.backend.queries.as_ref())
    }

    pub fn set_note(&mut self, chat_id: &str, note: Option<String>) -> Result<ActionId, ActionError> {
        self.with_targets(|coordinator, targets, api| coordinator.set_note(targets, api, chat_id, note))
    }

    pub fn set_tag(&mut self, chat_id: &str, tag_id: &str) -> Result<ActionId, ActionError> {
        self.with_targets(|coordinator, targets, api| coordinator.set_tag(targets, api, chat_id, tag_id))
    }

    pub fn remove_tag(&mut self, chat_id: &str, tag_id: &str) -> Result<ActionId, ActionError> {
        self.with_targets(|coordinator, targets, api| {
            coordinator.remove_tag(targets, api, chat_id, tag_id)
        })
    }

    pub fn assign_agent(&mut self, chat_id: &str, agent_id: &str) -> Result<ActionId, ActionError> {
        self.with_targets(|coordinator, targets, api| {
            coordinator.assign_agent(targets, api, chat_id, agent_id)
        })
    }

    pub fn change_status(&mut self, chat_id: &str, status: ChatStatus) -> Result<ActionId, ActionError> {
        self.with_targets(|coordinator, targets, api| {
            coordinator.change_status(targets, api, chat_id, status)
        })
    }

    pub fn send_message(&mut self, chat_id: &str, content: &str) -> Result<ActionId, ActionError> {
        let now = Utc::now();
        self.with_targets(|coordinator, targets, api| {
            coordinator.send_message(targets, api, chat_id, content, now)
        })
    }

    pub fn accept(&mut self, chat_id: &str) -> Result<ActionId, ActionError> {
        self.with_targets(|coordinator, targets, api| coordinator.accept(targets, api, chat_id))
    }

    pub fn reject(&mut self, chat_id: &str) -> Result<ActionId, ActionError> {
        self.with_targets(|coordinator, targets, api| coordinator.reject(targets, api, chat_id))
    }

    /// Leaves the open chat and closes the push connection. Later events are
    /// ignored.
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.deselect();
        self.backend.push.close();
        self.connection = ConnectionStatus::Disconnected;
        self.closed = true;
        tracing::info!(pending_actions = self.coordinator.pending_count(), "inbox engine torn down");
    }

    fn with_targets<T>(
        &mut self,
        call: impl FnOnce(&mut ActionCoordinator, &mut ActionTargets<'_>, &dyn ChatMutationApi) -> T,
    ) -> T {
        let mut targets = ActionTargets {
            chat_list: &mut self.chat_list,
            loader: &mut self.loader,
            filter: self.pager.filter(),
        };
        call(&mut self.coordinator, &mut targets, self.backend.mutations.as_ref())
    }

    fn fetch_page(&self, ticket: PageTicket) {
        let query = self.pager.query(ticket);
        tracing::debug!(
            generation = ticket.generation,
            page = ticket.page,
            "fetching inbox page"
        );
        self.backend.queries.fetch_chats(ticket, query);
    }

    fn on_new_message(&mut self, message: Message) {
        if self.chat_list.apply_new_message(&message) == NewMessageOutcome::UnknownChat {
            self.on_unknown_chat(&message.chat_id);
        }
        self.loader.apply_push_message(&message);
    }

    fn on_chat_mutated(&mut self, mut mutation: ChatMutation) {
        self.coordinator.filter_push(&mut mutation);
        if mutation.is_empty() {
            return;
        }

        if self.chat_list.apply_mutation(&mutation, self.pager.filter()) == MutationOutcome::UnknownChat {
            self.on_unknown_chat(&mutation.chat_id);
        }
        self.loader.apply_mutation(&mutation);
    }

    fn on_unknown_chat(&mut self, chat_id: &str) {
        tracing::debug!(
            code = SyncFault::UnknownChatReference.code(),
            chat_id,
            "push references a chat outside the store; refreshing"
        );
        self.refresh();
    }

    fn on_connection(&mut self, status: ConnectionStatus) {
        let resumed = matches!(self.connection, ConnectionStatus::Reconnecting { .. })
            && status == ConnectionStatus::Connected;
        let fresh_session = status == ConnectionStatus::Connected && self.connection != status;
        self.connection = status;

        // Joins made while the hub was down were dropped, and none survive a
        // lost connection.
        if fresh_session {
            self.loader.rejoin(self.backend.push.as_ref());
        }
        if resumed {
            tracing::info!(code = INBOX_RESYNC, "push connection restored; resynchronizing");
            self.refresh();
            self.loader.reload(self.backend.queries.as_ref());
        }
    }

    fn on_page(&mut self, ticket: PageTicket, result: Result<Vec<ChatSummary>, ApiError>) {
        match self.pager.complete(ticket, result) {
            PageOutcome::Stale => {
                tracing::debug!(
                    code = SyncFault::StaleResult.code(),
                    generation = ticket.generation,
                    page = ticket.page,
                    "discarding superseded page"
                );
            }
            PageOutcome::Apply {
                chats,
                is_first_page,
            } => {
                self.chat_list.apply_page(chats, is_first_page);
                self.with_targets(|coordinator, targets, _| coordinator.reapply_pending(targets));
            }
            PageOutcome::Failed {
                error,
                is_first_page,
            } => {
                tracing::warn!(
                    code = SyncFault::NetworkFailure.code(),
                    page = ticket.page,
                    error = %error,
                    "inbox page fetch failed"
                );
                if is_first_page && self.chat_list.ui_state() == ChatListUiState::Loading {
                    self.chat_list.set_error();
                }
            }
        }
    }

    fn on_conversation(
        &mut self,
        token: SelectionToken,
        full_history: bool,
        result: Result<ConversationHistory, ApiError>,
    ) {
        let outcome = self.loader.complete(
            token,
            full_history,
            result,
            &mut self.chat_list,
            self.backend.mutations.as_ref(),
        );

        match outcome {
            LoadOutcome::Stale => tracing::debug!(
                code = SyncFault::StaleResult.code(),
                token = token.0,
                "discarding superseded conversation"
            ),
            LoadOutcome::Ready { .. } => {
                self.with_targets(|coordinator, targets, _| coordinator.reapply_pending(targets));
            }
            LoadOutcome::Failed { chat_id, error } => tracing::warn!(
                code = SyncFault::NetworkFailure.code(),
                chat_id = %chat_id,
                error = %error,
                "conversation fetch failed"
            ),
        }
    }

    fn on_action_completed(&mut self, action_id: ActionId, result: Result<ActionAck, ApiError>) {
        let Some(settled) = self.with_targets(|coordinator, targets, _| {
            coordinator.on_completed(targets, action_id, result)
        }) else {
            tracing::debug!(action_id = action_id.0, "completion for unknown action ignored");
            return;
        };

        if let Some(chat_id) = settled.closed_chat {
            if self.loader.selected_chat_id() == Some(chat_id.as_str()) {
                self.deselect();
            }
        }
        self.notices.push(settled.notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            chat::AcceptState,
            message::{MessageId, SenderType},
            pending_actions::ActionKind,
        },
        test_support::{chat, message, RecordingBackend},
    };

    fn engine(page_size: u32) -> (InboxEngine, RecordingBackend) {
        let backend = RecordingBackend::default();
        let engine = InboxEngine::new(
            EngineSettings {
                org_id: "org-1".to_owned(),
                agent_id: "agent-1".to_owned(),
                page_size,
                conversation_count: 30,
            },
            EngineBackend {
                queries: Box::new(backend.clone()),
                mutations: Box::new(backend.clone()),
                push: Box::new(backend.clone()),
            },
        );
        (engine, backend)
    }

    fn started(rows: Vec<ChatSummary>) -> (InboxEngine, RecordingBackend) {
        let (mut engine, backend) = engine(20);
        engine.start();
        engine.handle_event(EngineEvent::ChatsFetched {
            ticket: backend.last_ticket(),
            result: Ok(rows),
        });
        (engine, backend)
    }

    fn open(engine: &mut InboxEngine, backend: &RecordingBackend, chat_id: &str, history: ConversationHistory) {
        engine.select(chat_id).expect("chat is listed");
        engine.handle_event(EngineEvent::ConversationFetched {
            token: backend.last_token(),
            full_history: false,
            result: Ok(history),
        });
    }

    fn ids(engine: &InboxEngine) -> Vec<String> {
        engine.chats().chats().map(|c| c.chat_id.clone()).collect()
    }

    #[test]
    fn start_fetches_first_page_in_loading_state() {
        let (mut engine, backend) = engine(20);

        engine.start();

        assert_eq!(engine.chats().ui_state(), ChatListUiState::Loading);
        let (ticket, query) = backend.page_queries().pop().expect("page requested");
        assert_eq!(ticket.page, 1);
        assert_eq!(query.page_size, 20);
        assert_eq!(query.org_id, "org-1");
    }

    #[test]
    fn stale_filter_result_never_reaches_the_store() {
        let (mut engine, backend) = engine(20);
        engine.start();
        let filter_a = backend.last_ticket();
        engine.set_status_filter(StatusFilter::Status(ChatStatus::Closed));
        let filter_b = backend.last_ticket();

        engine.handle_event(EngineEvent::ChatsFetched {
            ticket: filter_b,
            result: Ok(vec![chat("b1", 3)]),
        });
        engine.handle_event(EngineEvent::ChatsFetched {
            ticket: filter_a,
            result: Ok(vec![chat("a1", 9), chat("a2", 8)]),
        });

        assert_eq!(ids(&engine), vec!["b1"]);
    }

    #[test]
    fn late_conversation_for_previous_selection_is_ignored() {
        let (mut engine, backend) = started(vec![chat("X", 10), chat("Y", 5)]);
        let x = engine.select("X").expect("listed");
        let y = engine.select("Y").expect("listed");

        engine.handle_event(EngineEvent::ConversationFetched {
            token: y,
            full_history: false,
            result: Ok(ConversationHistory::default()),
        });
        engine.handle_event(EngineEvent::ConversationFetched {
            token: x,
            full_history: false,
            result: Ok(ConversationHistory {
                messages: vec![message("mx", "X", "x", 1)],
                ..ConversationHistory::default()
            }),
        });

        let state = engine.conversation().expect("selection");
        assert_eq!(state.chat_id(), "Y");
        assert!(state.messages().is_empty());
        assert_eq!(backend.presence_calls().len(), 3);
    }

    #[test]
    fn new_message_reorders_and_counts_unless_selected() {
        let (mut engine, _) = started(vec![chat("A", 10), chat("B", 5)]);

        engine.handle_event(EngineEvent::Push(PushEvent::NewMessage(message("m1", "B", "hi", 20))));

        assert_eq!(ids(&engine), vec!["B", "A"]);
        assert_eq!(engine.chats().get("B").map(|c| c.unread_count), Some(1));

        let (mut engine, backend) = started(vec![chat("A", 10), chat("B", 5)]);
        open(&mut engine, &backend, "B", ConversationHistory::default());
        engine.handle_event(EngineEvent::Push(PushEvent::NewMessage(message("m1", "B", "hi", 20))));

        assert_eq!(ids(&engine), vec!["B", "A"]);
        assert_eq!(engine.chats().get("B").map(|c| c.unread_count), Some(0));
        assert_eq!(engine.conversation().map(|s| s.messages().len()), Some(1));
    }

    #[test]
    fn repeated_push_events_are_idempotent() {
        let (mut engine, _) = started(vec![chat("A", 10), chat("B", 5)]);
        let pushed = message("m1", "B", "hi", 20);
        let mut mutation = ChatMutation::new("A");
        mutation.status = Some(ChatStatus::InProgress);

        engine.handle_event(EngineEvent::Push(PushEvent::NewMessage(pushed.clone())));
        engine.handle_event(EngineEvent::Push(PushEvent::ChatMutated(mutation.clone())));
        let once = engine.chats().clone();
        engine.handle_event(EngineEvent::Push(PushEvent::NewMessage(pushed)));
        engine.handle_event(EngineEvent::Push(PushEvent::ChatMutated(mutation)));

        assert_eq!(engine.chats(), &once);
    }

    #[test]
    fn message_for_unknown_chat_refreshes_first_page() {
        let (mut engine, backend) = started(vec![chat("A", 10)]);
        let before = backend.last_ticket();

        engine.handle_event(EngineEvent::Push(PushEvent::NewMessage(message("m1", "Z", "hi", 20))));

        let after = backend.last_ticket();
        assert_eq!(after.page, 1);
        assert_eq!(after.generation, before.generation + 1);
        assert_eq!(ids(&engine), vec!["A"], "rows stay until the refresh lands");
    }

    #[test]
    fn load_more_without_more_pages_is_a_noop() {
        let (mut engine, backend) = started(vec![chat("A", 10)]);
        let requests = backend.page_queries().len();

        assert!(!engine.load_more());
        assert_eq!(backend.page_queries().len(), requests);
    }

    #[test]
    fn load_more_appends_next_page() {
        let (mut engine, backend) = engine(2);
        engine.start();
        engine.handle_event(EngineEvent::ChatsFetched {
            ticket: backend.last_ticket(),
            result: Ok(vec![chat("A", 10), chat("B", 9)]),
        });

        assert!(engine.load_more());
        engine.handle_event(EngineEvent::ChatsFetched {
            ticket: backend.last_ticket(),
            result: Ok(vec![chat("B", 9), chat("C", 1)]),
        });

        assert_eq!(ids(&engine), vec!["A", "B", "C"]);
        assert!(engine.has_more_pages());
    }

    #[test]
    fn failed_first_page_moves_to_error() {
        let (mut engine, backend) = engine(20);
        engine.start();

        engine.handle_event(EngineEvent::ChatsFetched {
            ticket: backend.last_ticket(),
            result: Err(ApiError::Timeout),
        });

        assert_eq!(engine.chats().ui_state(), ChatListUiState::Error);
    }

    #[test]
    fn accept_scenario_has_no_visible_echo_change() {
        let mut offered = chat("C", 10);
        offered.accept_state = AcceptState::Offered;
        let (mut engine, backend) = started(vec![offered]);
        open(
            &mut engine,
            &backend,
            "C",
            ConversationHistory {
                accept_state: AcceptState::Offered,
                ..ConversationHistory::default()
            },
        );
        assert!(engine.conversation().is_some_and(|s| s.pending_acceptance()));

        let action_id = engine.accept("C").expect("offer pending");
        assert!(!engine.conversation().is_some_and(|s| s.pending_acceptance()));
        let rows = engine.chats().clone();
        let conversation = engine.conversation().cloned();

        let mut echo = ChatMutation::new("C");
        echo.accept_state = Some(AcceptState::Accepted);
        echo.assigned_agent_id = Some(Some("agent-1".to_owned()));
        engine.handle_event(EngineEvent::Push(PushEvent::ChatMutated(echo)));
        engine.handle_event(EngineEvent::ActionCompleted {
            action_id,
            result: Ok(ActionAck::default()),
        });

        assert_eq!(engine.chats(), &rows);
        assert_eq!(engine.conversation().cloned(), conversation);
        assert_eq!(
            engine.drain_notices(),
            vec![EngineNotice::ActionConfirmed {
                action_id,
                chat_id: "C".to_owned(),
                kind: ActionKind::Acceptance
            }]
        );
    }

    #[test]
    fn confirmed_reject_closes_the_conversation() {
        let mut offered = chat("C", 10);
        offered.accept_state = AcceptState::Offered;
        let (mut engine, backend) = started(vec![offered, chat("D", 5)]);
        open(
            &mut engine,
            &backend,
            "C",
            ConversationHistory {
                accept_state: AcceptState::Offered,
                ..ConversationHistory::default()
            },
        );

        let action_id = engine.reject("C").expect("offer pending");
        engine.handle_event(EngineEvent::ActionCompleted {
            action_id,
            result: Ok(ActionAck::default()),
        });

        assert_eq!(ids(&engine), vec!["D"]);
        assert!(engine.conversation().is_none());
        assert_eq!(engine.chats().selected_chat_id(), None);
        assert_eq!(backend.presence_calls().last().map(String::as_str), Some("leave agent-1 C"));
    }

    #[test]
    fn failed_set_tag_surfaces_notice_and_rolls_back() {
        let (mut engine, _) = started(vec![chat("A", 10)]);

        let action_id = engine.set_tag("A", "vip").expect("issued");
        engine.handle_event(EngineEvent::ActionCompleted {
            action_id,
            result: Err(ApiError::Status {
                code: 500,
                body: "boom".to_owned(),
            }),
        });

        assert_eq!(engine.chats().get("A").and_then(|c| c.tag_id.clone()), None);
        assert!(matches!(
            engine.drain_notices().as_slice(),
            [EngineNotice::ActionFailed { kind: ActionKind::Tag, .. }]
        ));
        assert!(engine.drain_notices().is_empty());
    }

    #[test]
    fn sent_message_echo_reconciles_placeholder() {
        let (mut engine, backend) = started(vec![chat("A", 10)]);
        open(&mut engine, &backend, "A", ConversationHistory::default());

        engine.send_message("A", "on my way").expect("issued");
        let placeholder_time = engine
            .conversation()
            .and_then(|s| s.messages().first())
            .map(|m| m.timestamp)
            .expect("placeholder shown");
        let echo = Message {
            id: MessageId::Server("srv-1".to_owned()),
            sender_type: SenderType::Agent,
            sender_user_id: Some("agent-1".to_owned()),
            timestamp: placeholder_time,
            ..message("unused", "A", "on my way", 0)
        };
        engine.handle_event(EngineEvent::Push(PushEvent::NewMessage(echo)));

        let messages = engine.conversation().map(|s| s.messages().to_vec()).unwrap_or_default();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, MessageId::Server("srv-1".to_owned()));
    }

    #[test]
    fn reconnect_refreshes_list_and_reloads_selection() {
        let (mut engine, backend) = started(vec![chat("A", 10)]);
        open(&mut engine, &backend, "A", ConversationHistory::default());
        engine.handle_event(EngineEvent::Connection(ConnectionStatus::Connected));
        let pages = backend.page_queries().len();
        let loads = backend.conversation_queries().len();

        engine.handle_event(EngineEvent::Connection(ConnectionStatus::Reconnecting { attempt: 1 }));
        engine.handle_event(EngineEvent::Connection(ConnectionStatus::Connected));

        assert!(engine.connection_status().is_connected());
        assert_eq!(backend.page_queries().len(), pages + 1);
        assert_eq!(backend.conversation_queries().len(), loads + 1);
    }

    #[test]
    fn every_new_session_rejoins_the_open_chat() {
        let (mut engine, backend) = started(vec![chat("A", 10)]);
        open(&mut engine, &backend, "A", ConversationHistory::default());

        engine.handle_event(EngineEvent::Connection(ConnectionStatus::Connected));
        engine.handle_event(EngineEvent::Connection(ConnectionStatus::Connected));
        engine.handle_event(EngineEvent::Connection(ConnectionStatus::Reconnecting { attempt: 1 }));
        engine.handle_event(EngineEvent::Connection(ConnectionStatus::Connected));

        let joins = backend
            .presence_calls()
            .into_iter()
            .filter(|call| call == "join A agent-1")
            .count();
        assert_eq!(joins, 3);
    }

    #[test]
    fn reload_during_pending_actions_keeps_optimistic_values() {
        let mut offered = chat("C", 10);
        offered.accept_state = AcceptState::Offered;
        let (mut engine, backend) = started(vec![offered.clone()]);
        let offered_history = || ConversationHistory {
            accept_state: AcceptState::Offered,
            ..ConversationHistory::default()
        };
        open(&mut engine, &backend, "C", offered_history());
        engine.handle_event(EngineEvent::Connection(ConnectionStatus::Connected));
        let tag = engine.set_tag("C", "vip").expect("issued");
        engine.accept("C").expect("offer pending");

        engine.handle_event(EngineEvent::Connection(ConnectionStatus::Reconnecting { attempt: 1 }));
        engine.handle_event(EngineEvent::Connection(ConnectionStatus::Connected));
        engine.handle_event(EngineEvent::ChatsFetched {
            ticket: backend.last_ticket(),
            result: Ok(vec![offered]),
        });
        engine.handle_event(EngineEvent::ConversationFetched {
            token: backend.last_token(),
            full_history: false,
            result: Ok(offered_history()),
        });
        engine.handle_event(EngineEvent::ActionCompleted {
            action_id: tag,
            result: Ok(ActionAck::default()),
        });

        let state = engine.conversation().expect("selection");
        assert_eq!(state.tag_ids(), ["vip".to_owned()]);
        assert!(!state.pending_acceptance());
        let row = engine.chats().get("C").expect("row");
        assert_eq!(row.tag_id.as_deref(), Some("vip"));
        assert_eq!(row.accept_state, AcceptState::Accepted);
    }

    #[test]
    fn send_during_load_shows_one_copy_after_echo() {
        let (mut engine, backend) = started(vec![chat("A", 10)]);
        engine.select("A").expect("chat is listed");
        engine.send_message("A", "hi").expect("issued");
        let sent = engine
            .conversation()
            .and_then(|s| s.messages().first().cloned())
            .expect("placeholder shown");
        let server_copy = Message {
            id: MessageId::Server("srv-1".to_owned()),
            ..sent
        };

        engine.handle_event(EngineEvent::ConversationFetched {
            token: backend.last_token(),
            full_history: false,
            result: Ok(ConversationHistory {
                messages: vec![server_copy.clone()],
                ..ConversationHistory::default()
            }),
        });
        engine.handle_event(EngineEvent::Push(PushEvent::NewMessage(server_copy)));

        let ids: Vec<MessageId> = engine
            .conversation()
            .map(|s| s.messages().iter().map(|m| m.id.clone()).collect())
            .unwrap_or_default();
        assert_eq!(ids, vec![MessageId::Server("srv-1".to_owned())]);
    }

    #[test]
    fn first_connect_does_not_resync() {
        let (mut engine, backend) = started(vec![chat("A", 10)]);
        let pages = backend.page_queries().len();

        engine.handle_event(EngineEvent::Connection(ConnectionStatus::Connected));

        assert_eq!(backend.page_queries().len(), pages);
    }

    #[test]
    fn select_requires_a_listed_chat() {
        let (mut engine, _) = started(vec![chat("A", 10)]);

        assert_eq!(engine.select("nope"), Err(ActionError::UnknownChat("nope".to_owned())));
    }

    #[test]
    fn selecting_unread_chat_marks_it_seen() {
        let mut unread = chat("A", 10);
        unread.unread_count = 2;
        let (mut engine, backend) = started(vec![unread]);

        open(
            &mut engine,
            &backend,
            "A",
            ConversationHistory {
                messages: vec![message("m7", "A", "hello", 10)],
                ..ConversationHistory::default()
            },
        );

        assert_eq!(engine.chats().get("A").map(|c| c.unread_count), Some(0));
        assert_eq!(
            backend.seen_requests().pop().and_then(|r| r.last_message_id),
            Some("m7".to_owned())
        );
    }

    #[test]
    fn teardown_leaves_chat_closes_push_and_ignores_later_events() {
        let (mut engine, backend) = started(vec![chat("A", 10)]);
        open(&mut engine, &backend, "A", ConversationHistory::default());

        engine.teardown();
        engine.handle_event(EngineEvent::Push(PushEvent::NewMessage(message("m1", "A", "hi", 30))));

        let calls = backend.presence_calls();
        assert_eq!(&calls[calls.len() - 2..], ["leave agent-1 A".to_owned(), "close".to_owned()]);
        assert_eq!(engine.connection_status(), ConnectionStatus::Disconnected);
        assert!(engine.conversation().is_none());
        assert!(engine.is_closed());
    }
}
