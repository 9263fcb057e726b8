use covenant_blocks::PartyId;
use covenant_protocol::{CommandStatus, ErrorEnvelope};
use covenant_workflow::{CurrentUser, RenderView};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct CommandRequest {
    pub action: CommandAction,
    #[serde(default = "empty_payload")]
    pub payload: Value,
    /// Acting user; falls back to the process-wide identity
    #[serde(default)]
    pub user: Option<CurrentUser>,
}

fn empty_payload() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    Generate,
    Get,
    List,
    RegenerateBlock,
    RegenerateDocument,
    EditBlock,
    FillIn,
    AssignParty,
    Sign,
    Send,
    Finalize,
    Export,
    Render,
    Summarize,
    Capabilities,
}

impl CommandAction {
    pub const ALL: [Self; 15] = [
        Self::Generate,
        Self::Get,
        Self::List,
        Self::RegenerateBlock,
        Self::RegenerateDocument,
        Self::EditBlock,
        Self::FillIn,
        Self::AssignParty,
        Self::Sign,
        Self::Send,
        Self::Finalize,
        Self::Export,
        Self::Render,
        Self::Summarize,
        Self::Capabilities,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Get => "get",
            Self::List => "list",
            Self::RegenerateBlock => "regenerate_block",
            Self::RegenerateDocument => "regenerate_document",
            Self::EditBlock => "edit_block",
            Self::FillIn => "fill_in",
            Self::AssignParty => "assign_party",
            Self::Sign => "sign",
            Self::Send => "send",
            Self::Finalize => "finalize",
            Self::Export => "export",
            Self::Render => "render",
            Self::Summarize => "summarize",
            Self::Capabilities => "capabilities",
        }
    }

    /// Everything except capabilities acts on behalf of a user
    pub const fn requires_user(self) -> bool {
        !matches!(self, Self::Capabilities)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratePayload {
    pub prompt: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Payload of actions addressing a single contract
#[derive(Debug, Deserialize)]
pub struct ContractRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegenerateBlockPayload {
    pub id: String,
    pub block: usize,
    pub instructions: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegenerateDocumentPayload {
    pub id: String,
    pub instructions: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditBlockPayload {
    pub id: String,
    pub block: usize,
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FillInPayload {
    pub id: String,
    pub block: usize,
    pub field: usize,
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignPartyPayload {
    pub id: String,
    pub block: usize,
    pub ordinal: usize,
    pub party: PartyId,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignPayload {
    pub id: String,
    pub block: usize,
    pub ordinal: usize,
    /// `data:image/...;base64,` URL
    pub image: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendPayload {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderPayload {
    pub id: String,
    #[serde(default)]
    pub view: RenderView,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportPayload {
    pub id: String,
    /// Write the PDF here instead of inlining it as base64
    #[serde(default)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct ExportOutput {
    pub filename: String,
    pub content_type: String,
    pub etag: String,
    pub size_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_base64: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryOutput {
    pub id: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommandResponse {
    pub status: CommandStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub meta: ResponseMeta,
}

impl CommandResponse {
    pub fn ok(data: Value, meta: ResponseMeta) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: None,
            error: None,
            data,
            meta,
        }
    }

    pub fn error(error: ErrorEnvelope, meta: ResponseMeta) -> Self {
        Self {
            status: CommandStatus::Error,
            message: Some(error.message.clone()),
            error: Some(error),
            data: Value::Null,
            meta,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, CommandStatus::Error)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Stored version after the action, for mutations and reads of one contract
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_version: Option<u64>,
}
