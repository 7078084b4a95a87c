//! JSON shapes of the REST and hub payloads and their validation into domain values.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    domain::{
        chat::{AcceptState, ChatStatus, ChatSummary, Platform},
        conversation_state::ConversationHistory,
        events::{ActionAck, PushEvent},
        message::{Message, MessageId, MessageType, SenderType},
        mutation::ChatMutation,
    },
    usecases::contracts::{ChatsQuery, MutationCall, MutationRequest, SeenRequest},
};

const WIRE_ROW_SKIPPED: &str = "WIRE_ROW_SKIPPED";

pub const TARGET_NEW_MESSAGE: &str = "NewMessage";
pub const TARGET_CHAT_UPDATED: &str = "ChatUpdated";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("payload is not valid JSON for this shape: {0}")]
    Shape(String),
    #[error("field `{0}` is missing or empty")]
    Missing(&'static str),
    #[error("timestamp `{0}` is not a recognised format")]
    Timestamp(String),
    #[error("unknown {field} `{value}`")]
    UnknownValue { field: &'static str, value: String },
    #[error("target `{target}` expects exactly one argument, got {count}")]
    ArgumentCount { target: String, count: usize },
}

impl From<serde_json::Error> for WireError {
    fn from(error: serde_json::Error) -> Self {
        Self::Shape(error.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummaryDto {
    #[serde(deserialize_with = "required_stringish")]
    pub chat_id: String,
    #[serde(default, deserialize_with = "optional_stringish")]
    pub org_id: Option<String>,
    #[serde(default, deserialize_with = "optional_stringish")]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub latest_message_preview: Option<String>,
    #[serde(default)]
    pub latest_message_time_utc: Option<String>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default, deserialize_with = "optional_stringish")]
    pub assigned_agent_id: Option<String>,
    #[serde(default)]
    pub accept_assigned: Option<bool>,
    #[serde(default, deserialize_with = "optional_stringish")]
    pub tag_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl TryFrom<ChatSummaryDto> for ChatSummary {
    type Error = WireError;

    fn try_from(dto: ChatSummaryDto) -> Result<Self, Self::Error> {
        let platform = match dto.platform.as_deref() {
            None | Some("") => Platform::default(),
            Some(label) => Platform::from_label(label).ok_or_else(|| WireError::UnknownValue {
                field: "platform",
                value: label.to_owned(),
            })?,
        };
        let status = match dto.status.as_deref() {
            None | Some("") => ChatStatus::default(),
            Some(label) => parse_status(label)?,
        };
        let latest_message_at = dto
            .latest_message_time_utc
            .as_deref()
            .filter(|value| !value.is_empty())
            .map(parse_timestamp)
            .transpose()?;

        Ok(Self {
            display_name: dto
                .display_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| dto.chat_id.clone()),
            chat_id: dto.chat_id,
            org_id: dto.org_id.unwrap_or_default(),
            channel_id: dto.channel_id,
            platform,
            latest_message_preview: dto.latest_message_preview,
            latest_message_at,
            unread_count: dto.unread_count,
            assigned_agent_id: dto.assigned_agent_id,
            accept_state: AcceptState::from_flag(dto.accept_assigned),
            tag_id: dto.tag_id,
            note: dto.note,
            status,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    #[serde(deserialize_with = "required_stringish")]
    pub id: String,
    #[serde(deserialize_with = "required_stringish")]
    pub chat_id: String,
    #[serde(default)]
    pub sender_type: Option<String>,
    #[serde(default, deserialize_with = "optional_stringish")]
    pub sender_user_id: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub time_stamp_utc: Option<String>,
}

impl TryFrom<MessageDto> for Message {
    type Error = WireError;

    fn try_from(dto: MessageDto) -> Result<Self, Self::Error> {
        let sender_type = match dto.sender_type.as_deref() {
            Some(value) if value.eq_ignore_ascii_case("agent") => SenderType::Agent,
            Some(value) if value.eq_ignore_ascii_case("customer") => SenderType::Customer,
            None => SenderType::Customer,
            Some(other) => {
                return Err(WireError::UnknownValue {
                    field: "senderType",
                    value: other.to_owned(),
                })
            }
        };
        let message_type = match dto.message_type.as_deref() {
            None | Some("") => MessageType::Text,
            Some(value) => MessageType::from_wire(value).ok_or_else(|| WireError::UnknownValue {
                field: "messageType",
                value: value.to_owned(),
            })?,
        };
        let timestamp = dto
            .time_stamp_utc
            .as_deref()
            .filter(|value| !value.is_empty())
            .ok_or(WireError::Missing("timeStampUtc"))
            .and_then(parse_timestamp)?;

        Ok(Self {
            id: MessageId::Server(dto.id),
            chat_id: dto.chat_id,
            sender_type,
            sender_user_id: dto.sender_user_id,
            message_type,
            content: dto.content.unwrap_or_default(),
            timestamp,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default, deserialize_with = "stringish_list")]
    pub tag_ids: Vec<String>,
    #[serde(default)]
    pub accept_assigned: Option<bool>,
}

impl From<ConversationDto> for ConversationHistory {
    fn from(dto: ConversationDto) -> Self {
        Self {
            messages: decode_rows::<MessageDto, Message>(dto.messages, "message"),
            note: dto.note,
            tag_ids: dto.tag_ids,
            accept_state: AcceptState::from_flag(dto.accept_assigned),
        }
    }
}

/// `ChatUpdated` argument. Nullable fields tell "absent" from explicit `null`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMutationDto {
    #[serde(deserialize_with = "required_stringish")]
    pub chat_id: String,
    #[serde(default, deserialize_with = "double_option")]
    pub note: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub tag_id: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_agent_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub accept_assigned: Option<Option<bool>>,
    #[serde(default)]
    pub unread_count: Option<u32>,
}

impl TryFrom<ChatMutationDto> for ChatMutation {
    type Error = WireError;

    fn try_from(dto: ChatMutationDto) -> Result<Self, Self::Error> {
        let mut mutation = ChatMutation::new(dto.chat_id);
        mutation.note = dto.note;
        mutation.tag_id = dto.tag_id;
        mutation.status = dto.status.as_deref().map(parse_status).transpose()?;
        mutation.assigned_agent_id = dto.assigned_agent_id;
        mutation.accept_state = dto.accept_assigned.map(AcceptState::from_flag);
        mutation.unread_count = dto.unread_count;
        Ok(mutation)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAckDto {
    #[serde(default, deserialize_with = "optional_stringish")]
    pub message_id: Option<String>,
}

impl From<SendAckDto> for ActionAck {
    fn from(dto: SendAckDto) -> Self {
        Self {
            message_id: dto.message_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SeenBody<'a> {
    org_id: &'a str,
    agent_id: &'a str,
    last_msg_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignBody<'a> {
    org_id: &'a str,
    agent_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptRejectBody<'a> {
    org_id: &'a str,
    agent_id: &'a str,
    is_accept: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody<'a> {
    org_id: &'a str,
    status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TagBody<'a> {
    org_id: &'a str,
    tag_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NoteBody<'a> {
    org_id: &'a str,
    note: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendBody<'a> {
    org_id: &'a str,
    chat_id: &'a str,
    agent_id: &'a str,
    message_type: &'static str,
    content: &'a str,
}

/// Unencoded path segments and JSON body of one `POST`.
#[derive(Debug, Clone, PartialEq)]
pub struct PostEndpoint {
    pub segments: Vec<String>,
    pub body: Value,
}

/// `api/chats/{chat_id}/...` with the id kept as a single segment.
pub fn chat_segments(chat_id: &str, suffix: &[&str]) -> Vec<String> {
    ["api", "chats", chat_id]
        .iter()
        .chain(suffix)
        .map(|segment| (*segment).to_owned())
        .collect()
}

pub fn seen_endpoint(request: &SeenRequest) -> Result<PostEndpoint, WireError> {
    Ok(PostEndpoint {
        segments: chat_segments(&request.chat_id, &["seen"]),
        body: serde_json::to_value(SeenBody {
            org_id: &request.org_id,
            agent_id: &request.agent_id,
            last_msg_id: request.last_message_id.as_deref(),
        })?,
    })
}

pub fn mutation_endpoint(call: &MutationCall) -> Result<PostEndpoint, WireError> {
    let chat_path = |suffix: &[&str]| chat_segments(&call.chat_id, suffix);
    let org_id = call.org_id.as_str();

    let (segments, body) = match &call.request {
        MutationRequest::Assign { agent_id } => (
            chat_path(&["assign"]),
            serde_json::to_value(AssignBody { org_id, agent_id })?,
        ),
        MutationRequest::AcceptReject {
            agent_id,
            is_accept,
        } => (
            chat_path(&["accept-reject"]),
            serde_json::to_value(AcceptRejectBody {
                org_id,
                agent_id,
                is_accept: *is_accept,
            })?,
        ),
        MutationRequest::ChangeStatus { status } => (
            chat_path(&["status"]),
            serde_json::to_value(StatusBody {
                org_id,
                status: status.as_label(),
            })?,
        ),
        MutationRequest::SetTag { tag_id } => (
            chat_path(&["tags", "set"]),
            serde_json::to_value(TagBody { org_id, tag_id })?,
        ),
        MutationRequest::RemoveTag { tag_id } => (
            chat_path(&["tags", "remove"]),
            serde_json::to_value(TagBody { org_id, tag_id })?,
        ),
        MutationRequest::SetNote { note } => (
            chat_path(&["note"]),
            serde_json::to_value(NoteBody { org_id, note })?,
        ),
        MutationRequest::Send {
            agent_id,
            message_type,
            content,
        } => (
            vec!["api".to_owned(), "messages".to_owned(), "send".to_owned()],
            serde_json::to_value(SendBody {
                org_id,
                chat_id: &call.chat_id,
                agent_id,
                message_type: message_type.as_wire(),
                content,
            })?,
        ),
    };

    Ok(PostEndpoint { segments, body })
}

/// Query string of the filtered inbox listing. Unset filters are omitted.
pub fn chats_query_params(query: &ChatsQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![("orgId", query.org_id.clone())];
    if let Some(channel_id) = &query.channel_id {
        params.push(("channelId", channel_id.clone()));
    }
    if let Some(status) = query.status {
        params.push(("status", status.as_label().to_owned()));
    }
    if let Some(tag_id) = &query.tag_id {
        params.push(("tagId", tag_id.clone()));
    }
    if let Some(agent_id) = &query.agent_id {
        params.push(("agentId", agent_id.clone()));
    }
    if let Some(search) = &query.search {
        params.push(("search", search.clone()));
    }
    params.push(("sort", "latest".to_owned()));
    params.push(("page", query.page.to_string()));
    params.push(("pageSize", query.page_size.to_string()));
    params
}

/// Decodes an inbox page. Rows that fail validation are dropped with a warning
/// so one bad row does not hide the rest of the page.
pub fn decode_chat_page(body: &str) -> Result<Vec<ChatSummary>, WireError> {
    let rows: Vec<Value> = serde_json::from_str(body)?;
    Ok(decode_rows::<ChatSummaryDto, ChatSummary>(rows, "chat"))
}

pub fn decode_conversation(body: &str) -> Result<ConversationHistory, WireError> {
    let dto: ConversationDto = serde_json::from_str(body)?;
    Ok(dto.into())
}

/// An empty acknowledgement body is valid and carries no message id.
pub fn decode_ack(body: &str) -> Result<ActionAck, WireError> {
    if body.trim().is_empty() {
        return Ok(ActionAck::default());
    }
    match serde_json::from_str::<Value>(body)? {
        Value::Object(_) => Ok(serde_json::from_str::<SendAckDto>(body)?.into()),
        _ => Ok(ActionAck::default()),
    }
}

/// Validates one hub invocation. Unknown targets yield `Ok(None)`.
pub fn decode_push(target: &str, arguments: Vec<Value>) -> Result<Option<PushEvent>, WireError> {
    if target != TARGET_NEW_MESSAGE && target != TARGET_CHAT_UPDATED {
        return Ok(None);
    }

    let count = arguments.len();
    let [argument]: [Value; 1] = arguments
        .try_into()
        .map_err(|_| WireError::ArgumentCount {
            target: target.to_owned(),
            count,
        })?;

    let event = if target == TARGET_NEW_MESSAGE {
        let dto: MessageDto = serde_json::from_value(argument)?;
        PushEvent::NewMessage(dto.try_into()?)
    } else {
        let dto: ChatMutationDto = serde_json::from_value(argument)?;
        PushEvent::ChatMutated(dto.try_into()?)
    };
    Ok(Some(event))
}

/// Accepts RFC 3339 or an offset-less ISO stamp, which the server means as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, WireError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| WireError::Timestamp(value.to_owned()))
}

fn parse_status(label: &str) -> Result<ChatStatus, WireError> {
    ChatStatus::from_label(label).ok_or_else(|| WireError::UnknownValue {
        field: "status",
        value: label.to_owned(),
    })
}

fn decode_rows<D, T>(rows: Vec<Value>, kind: &'static str) -> Vec<T>
where
    D: for<'de> Deserialize<'de>,
    T: TryFrom<D, Error = WireError>,
{
    rows.into_iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let decoded = serde_json::from_value::<D>(row)
                .map_err(WireError::from)
                .and_then(T::try_from);
            match decoded {
                Ok(value) => Some(value),
                Err(error) => {
                    tracing::warn!(code = WIRE_ROW_SKIPPED, kind, index, error = %error, "skipping invalid row");
                    None
                }
            }
        })
        .collect()
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn stringish(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn optional_stringish<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(stringish))
}

fn required_stringish<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    stringish(&value).ok_or_else(|| serde::de::Error::custom("expected non-empty string or numeric id"))
}

fn stringish_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .iter()
        .filter_map(stringish)
        .collect())
}
