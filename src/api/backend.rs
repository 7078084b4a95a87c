use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{
    api::rest::RestClient,
    domain::{
        conversation_state::SelectionToken,
        events::{EngineEvent, EventSink, SyncFault},
        filter::PageTicket,
        pending_actions::ActionId,
    },
    usecases::contracts::{
        ChatMutationApi, ChatQueryApi, ChatsQuery, ConversationQuery, MutationCall, SeenRequest,
    },
};

/// Runs REST calls on the async runtime and reports each completion to the
/// engine queue.
#[derive(Clone)]
pub struct HttpBackend {
    rest: Arc<RestClient>,
    runtime: Handle,
    sink: Arc<dyn EventSink>,
}

impl HttpBackend {
    pub fn new(rest: RestClient, runtime: Handle, sink: Arc<dyn EventSink>) -> Self {
        Self {
            rest: Arc::new(rest),
            runtime,
            sink,
        }
    }
}

impl ChatQueryApi for HttpBackend {
    fn fetch_chats(&self, ticket: PageTicket, query: ChatsQuery) {
        let rest = Arc::clone(&self.rest);
        let sink = Arc::clone(&self.sink);
        self.runtime.spawn(async move {
            let result = rest.fetch_chats(&query).await;
            if let Err(error) = &result {
                tracing::warn!(
                    code = SyncFault::NetworkFailure.code(),
                    generation = ticket.generation,
                    page = ticket.page,
                    error = %error,
                    "inbox page fetch failed"
                );
            }
            sink.emit(EngineEvent::ChatsFetched { ticket, result });
        });
    }

    fn fetch_conversation(&self, token: SelectionToken, query: ConversationQuery) {
        let rest = Arc::clone(&self.rest);
        let sink = Arc::clone(&self.sink);
        let full_history = query.count.is_none();
        self.runtime.spawn(async move {
            let result = rest.fetch_conversation(&query).await;
            if let Err(error) = &result {
                tracing::warn!(
                    code = SyncFault::NetworkFailure.code(),
                    chat_id = %query.chat_id,
                    full_history,
                    error = %error,
                    "conversation fetch failed"
                );
            }
            sink.emit(EngineEvent::ConversationFetched {
                token,
                full_history,
                result,
            });
        });
    }
}

impl ChatMutationApi for HttpBackend {
    fn mark_seen(&self, request: SeenRequest) {
        let rest = Arc::clone(&self.rest);
        let sink = Arc::clone(&self.sink);
        self.runtime.spawn(async move {
            let result = rest.mark_seen(&request).await;
            sink.emit(EngineEvent::SeenCompleted {
                chat_id: request.chat_id,
                result,
            });
        });
    }

    fn submit(&self, action_id: ActionId, call: MutationCall) {
        let rest = Arc::clone(&self.rest);
        let sink = Arc::clone(&self.sink);
        self.runtime.spawn(async move {
            let result = rest.submit(&call).await;
            if let Err(error) = &result {
                tracing::warn!(
                    code = SyncFault::NetworkFailure.code(),
                    action_id = action_id.0,
                    request = call.request.name(),
                    chat_id = %call.chat_id,
                    error = %error,
                    "mutation call failed"
                );
            }
            sink.emit(EngineEvent::ActionCompleted { action_id, result });
        });
    }
}
