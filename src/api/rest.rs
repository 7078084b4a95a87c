use crate::{
    api::wire::{self, PostEndpoint, WireError},
    domain::{
        chat::ChatSummary,
        conversation_state::ConversationHistory,
        events::{ActionAck, ApiError},
    },
    infra::{config::ServerConfig, error::AppError, secrets::redact_text},
    usecases::contracts::{ChatsQuery, ConversationQuery, MutationCall, SeenRequest},
};

const MAX_ERROR_BODY_CHARS: usize = 200;

/// Thin JSON client for the inbox REST endpoints.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: reqwest::Url,
    access_token: String,
}

impl RestClient {
    pub fn new(server: &ServerConfig, access_token: &str) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(server.request_timeout())
            .build()
            .map_err(AppError::HttpClient)?;

        let base_url = reqwest::Url::parse(&server.base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| AppError::InvalidConfig {
                field: "server.base_url",
                reason: "must be an absolute http(s) URL".to_owned(),
            })?;

        Ok(Self {
            http,
            base_url,
            access_token: access_token.to_owned(),
        })
    }

    pub async fn fetch_chats(&self, query: &ChatsQuery) -> Result<Vec<ChatSummary>, ApiError> {
        let params = wire::chats_query_params(query);
        let body = self.get(&["api", "chats", "filtered"], &params).await?;
        wire::decode_chat_page(&body).map_err(invalid_data)
    }

    pub async fn fetch_conversation(
        &self,
        query: &ConversationQuery,
    ) -> Result<ConversationHistory, ApiError> {
        let mut params = vec![("orgId", query.org_id.clone())];
        let segments = match query.count {
            Some(count) => {
                params.push(("count", count.to_string()));
                wire::chat_segments(&query.chat_id, &["messages"])
            }
            None => wire::chat_segments(&query.chat_id, &["messages", "history"]),
        };

        let body = self.get(&segments, &params).await?;
        wire::decode_conversation(&body).map_err(invalid_data)
    }

    pub async fn mark_seen(&self, request: &SeenRequest) -> Result<(), ApiError> {
        let endpoint = wire::seen_endpoint(request).map_err(invalid_data)?;
        self.post(&endpoint).await.map(|_| ())
    }

    pub async fn submit(&self, call: &MutationCall) -> Result<ActionAck, ApiError> {
        let endpoint = wire::mutation_endpoint(call).map_err(invalid_data)?;
        let body = self.post(&endpoint).await?;
        wire::decode_ack(&body).map_err(invalid_data)
    }

    async fn get<S: AsRef<str>>(
        &self,
        segments: &[S],
        params: &[(&'static str, String)],
    ) -> Result<String, ApiError> {
        let request = self.authorized(self.http.get(self.url(segments)?).query(params));
        read_body(request.send().await.map_err(transport_error)?).await
    }

    async fn post(&self, endpoint: &PostEndpoint) -> Result<String, ApiError> {
        let url = self.url(&endpoint.segments)?;
        let request = self.authorized(self.http.post(url).json(&endpoint.body));
        read_body(request.send().await.map_err(transport_error)?).await
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.access_token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.access_token)
        }
    }

    /// Appends percent-encoded segments to the base path.
    fn url<S: AsRef<str>>(&self, segments: &[S]) -> Result<reqwest::Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidData("base URL cannot carry a path".to_owned()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, ApiError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(status_error(status.as_u16(), &body))
    }
}

fn status_error(code: u16, body: &str) -> ApiError {
    match code {
        401 | 403 => ApiError::Unauthorized,
        404 => ApiError::NotFound,
        _ => ApiError::Status {
            code,
            body: redact_text(&body.chars().take(MAX_ERROR_BODY_CHARS).collect::<String>()),
        },
    }
}

fn transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else if error.is_decode() {
        ApiError::InvalidData(error.to_string())
    } else {
        ApiError::Transport(redact_text(&error.to_string()))
    }
}

fn invalid_data(error: WireError) -> ApiError {
    ApiError::InvalidData(error.to_string())
}
