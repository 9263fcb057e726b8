pub mod domain;
mod errors;

pub use domain::{CommandAction, CommandRequest, CommandResponse, ResponseMeta};
pub use errors::classify_error;

use anyhow::{Context as AnyhowContext, Result};
use base64::Engine as _;
use covenant_protocol::{
    Capabilities, CapabilitiesServer, MarkerCapabilities, CAPABILITIES_SCHEMA_VERSION,
    COMMAND_API_VERSION,
};
use covenant_workflow::{Contract, ContractService, CurrentUser, ExportedPdf};
use domain::{
    AssignPartyPayload, ContractRef, EditBlockPayload, ExportOutput, ExportPayload,
    FillInPayload, GeneratePayload, RegenerateBlockPayload, RegenerateDocumentPayload,
    RenderPayload, SendPayload, SignPayload, SummaryOutput,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Result of a routed action before it is wrapped in a response
struct CommandOutcome {
    data: Value,
    contract_version: Option<u64>,
}

impl CommandOutcome {
    fn from_value<T: Serialize>(value: T) -> Result<Self> {
        Ok(Self {
            data: serde_json::to_value(value)?,
            contract_version: None,
        })
    }

    fn from_contract(contract: &Contract) -> Result<Self> {
        Ok(Self {
            data: serde_json::to_value(contract)?,
            contract_version: Some(contract.version),
        })
    }
}

/// Executes Command API requests against one [`ContractService`]
pub struct CommandHandler {
    service: Arc<ContractService>,
    default_user: Option<CurrentUser>,
    local_output: bool,
}

impl CommandHandler {
    pub fn new(service: Arc<ContractService>, default_user: Option<CurrentUser>) -> Self {
        Self {
            service,
            default_user,
            local_output: true,
        }
    }

    /// Refuse `export` requests that name a file on this host
    pub fn without_local_output(mut self) -> Self {
        self.local_output = false;
        self
    }

    pub fn service(&self) -> &ContractService {
        &self.service
    }

    pub fn default_user(&self) -> Option<CurrentUser> {
        self.default_user.clone()
    }

    pub async fn execute(&self, request: CommandRequest) -> CommandResponse {
        let started = Instant::now();
        let CommandRequest {
            action,
            payload,
            user,
        } = request;

        let outcome = self.route(action, payload, user).await;
        let mut meta = ResponseMeta {
            action: Some(action.as_str().to_string()),
            duration_ms: Some(started.elapsed().as_millis() as u64),
            ..Default::default()
        };

        match outcome {
            Ok(outcome) => {
                meta.contract_version = outcome.contract_version;
                CommandResponse::ok(outcome.data, meta)
            }
            Err(err) => {
                let envelope = classify_error(&err);
                log::debug!("{} failed: {} ({})", action.as_str(), envelope.code, envelope.message);
                CommandResponse::error(envelope, meta)
            }
        }
    }

    async fn route(
        &self,
        action: CommandAction,
        payload: Value,
        user: Option<CurrentUser>,
    ) -> Result<CommandOutcome> {
        if !action.requires_user() {
            return CommandOutcome::from_value(self.capabilities());
        }

        let user = self.resolve_user(user)?;
        let service = &self.service;
        match action {
            CommandAction::Generate => {
                let p: GeneratePayload = parse_payload(action, payload)?;
                let contract = service.generate(&user, &p.prompt, p.title.as_deref()).await?;
                CommandOutcome::from_contract(&contract)
            }
            CommandAction::Get => {
                let p: ContractRef = parse_payload(action, payload)?;
                CommandOutcome::from_contract(&service.get(&user, &p.id).await?)
            }
            CommandAction::List => {
                let contracts = service.list(&user).await?;
                CommandOutcome::from_value(serde_json::json!({ "contracts": contracts }))
            }
            CommandAction::RegenerateBlock => {
                let p: RegenerateBlockPayload = parse_payload(action, payload)?;
                let contract = service
                    .regenerate_block(&user, &p.id, p.block, &p.instructions)
                    .await?;
                CommandOutcome::from_contract(&contract)
            }
            CommandAction::RegenerateDocument => {
                let p: RegenerateDocumentPayload = parse_payload(action, payload)?;
                let contract = service
                    .regenerate_document(&user, &p.id, &p.instructions)
                    .await?;
                CommandOutcome::from_contract(&contract)
            }
            CommandAction::EditBlock => {
                let p: EditBlockPayload = parse_payload(action, payload)?;
                let contract = service.edit_block(&user, &p.id, p.block, p.text).await?;
                CommandOutcome::from_contract(&contract)
            }
            CommandAction::FillIn => {
                let p: FillInPayload = parse_payload(action, payload)?;
                let contract = service
                    .fill_in(&user, &p.id, p.block, p.field, &p.value)
                    .await?;
                CommandOutcome::from_contract(&contract)
            }
            CommandAction::AssignParty => {
                let p: AssignPartyPayload = parse_payload(action, payload)?;
                let contract = service
                    .assign_party(&user, &p.id, p.block, p.ordinal, p.party)
                    .await?;
                CommandOutcome::from_contract(&contract)
            }
            CommandAction::Sign => {
                let p: SignPayload = parse_payload(action, payload)?;
                let outcome = service
                    .sign(&user, &p.id, p.block, p.ordinal, &p.image)
                    .await?;
                let version = outcome.contract.version;
                let mut out = CommandOutcome::from_value(outcome)?;
                out.contract_version = Some(version);
                Ok(out)
            }
            CommandAction::Send => {
                let p: SendPayload = parse_payload(action, payload)?;
                let contract = service
                    .send(&user, &p.id, &p.email, p.name.as_deref())
                    .await?;
                CommandOutcome::from_contract(&contract)
            }
            CommandAction::Finalize => {
                let p: ContractRef = parse_payload(action, payload)?;
                CommandOutcome::from_contract(&service.finalize(&user, &p.id).await?)
            }
            CommandAction::Export => {
                let p: ExportPayload = parse_payload(action, payload)?;
                if p.output.is_some() && !self.local_output {
                    return Err(covenant_workflow::WorkflowError::InvalidRequest(
                        "export.output is not accepted here; omit it to receive pdf_base64 or download GET /contracts/<id>/pdf"
                            .to_string(),
                    )
                    .into());
                }
                let pdf = service.export(&user, &p.id).await?;
                CommandOutcome::from_value(export_output(pdf, p.output.as_deref())?)
            }
            CommandAction::Render => {
                let p: RenderPayload = parse_payload(action, payload)?;
                CommandOutcome::from_value(service.render(&user, &p.id, p.view).await?)
            }
            CommandAction::Summarize => {
                let p: ContractRef = parse_payload(action, payload)?;
                let lines = service.summarize(&user, &p.id).await?;
                CommandOutcome::from_value(SummaryOutput { id: p.id, lines })
            }
            CommandAction::Capabilities => CommandOutcome::from_value(self.capabilities()),
        }
    }

    fn resolve_user(&self, user: Option<CurrentUser>) -> Result<CurrentUser> {
        let user = user.or_else(|| self.default_user.clone()).ok_or_else(|| {
            covenant_workflow::WorkflowError::InvalidRequest(
                "no acting user: pass \"user\" in the request or set COVENANT_USER_ID and COVENANT_USER_EMAIL"
                    .to_string(),
            )
        })?;
        if user.id.trim().is_empty() || user.email.trim().is_empty() {
            return Err(covenant_workflow::WorkflowError::InvalidRequest(
                "user id and email must be non-empty".to_string(),
            )
            .into());
        }
        Ok(user)
    }

    fn capabilities(&self) -> Capabilities {
        let markers = self.service.reconciler().scanner().config();
        Capabilities {
            schema_version: CAPABILITIES_SCHEMA_VERSION,
            command_api: COMMAND_API_VERSION.to_string(),
            server: CapabilitiesServer {
                name: "covenant".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            actions: CommandAction::ALL
                .iter()
                .map(|action| action.as_str().to_string())
                .collect(),
            drafter: self.service.drafter_id().to_string(),
            markers: MarkerCapabilities {
                glyph: markers.glyph,
                signature_run: markers.signature_run,
                fill_in_run: markers.fill_in_run,
            },
        }
    }
}

fn parse_payload<T: DeserializeOwned>(action: CommandAction, payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .with_context(|| format!("Invalid payload for {}", action.as_str()))
}

fn export_output(pdf: ExportedPdf, output: Option<&std::path::Path>) -> Result<ExportOutput> {
    let size_bytes = pdf.bytes.len();
    let (path, pdf_base64) = match output {
        Some(path) => {
            std::fs::write(path, &pdf.bytes)
                .with_context(|| format!("Failed to write PDF to {}", path.display()))?;
            (Some(path.display().to_string()), None)
        }
        None => (
            None,
            Some(base64::engine::general_purpose::STANDARD.encode(&pdf.bytes)),
        ),
    };
    Ok(ExportOutput {
        filename: pdf.filename,
        content_type: pdf.content_type.to_string(),
        etag: pdf.etag,
        size_bytes,
        path,
        pdf_base64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_blocks::{MarkerConfig, Reconciler};
    use covenant_workflow::config::MailConfig;
    use covenant_workflow::{MemoryStore, OutboxMailer, StubDrafter, StubPdfRenderer};
    use serde_json::json;

    const IMAGE: &str = "data:image/png;base64,iVBORw0KGgo=";

    fn handler(outbox: &std::path::Path) -> CommandHandler {
        let service = ContractService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(StubDrafter::new(MarkerConfig::default())),
            Arc::new(OutboxMailer::new(outbox, "contracts@example.com")),
            Arc::new(StubPdfRenderer),
            Reconciler::default(),
            MailConfig::default(),
        );
        CommandHandler::new(
            Arc::new(service),
            Some(CurrentUser::new("u-alice", "alice@example.com", "Alice")),
        )
    }

    fn request(value: Value) -> CommandRequest {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn capabilities_need_no_user() {
        let outbox = tempfile::tempdir().unwrap();
        let handler = CommandHandler {
            default_user: None,
            ..handler(outbox.path())
        };
        let response = handler
            .execute(request(json!({ "action": "capabilities" })))
            .await;
        assert!(!response.is_error());
        assert_eq!(response.data["drafter"], "stub");
        assert_eq!(response.data["markers"]["signature_run"], 20);
        assert_eq!(response.data["actions"].as_array().unwrap().len(), 15);

        let response = handler.execute(request(json!({ "action": "list" }))).await;
        assert_eq!(response.error.unwrap().code, "invalid_request");
    }

    #[tokio::test]
    async fn generate_sign_and_export() {
        let outbox = tempfile::tempdir().unwrap();
        let handler = handler(outbox.path());

        let generated = handler
            .execute(request(json!({
                "action": "generate",
                "payload": { "prompt": "logo design", "title": "Logo" }
            })))
            .await;
        assert!(!generated.is_error(), "{:?}", generated.error);
        assert_eq!(generated.meta.contract_version, Some(1));
        let id = generated.data["id"].as_str().unwrap().to_string();

        let signed = handler
            .execute(request(json!({
                "action": "sign",
                "payload": { "id": id, "block": 2, "ordinal": 0, "image": IMAGE }
            })))
            .await;
        assert!(!signed.is_error(), "{:?}", signed.error);
        assert_eq!(signed.data["party_complete"], true);
        assert_eq!(signed.data["document_complete"], false);

        let exported = handler
            .execute(request(json!({ "action": "export", "payload": { "id": id } })))
            .await;
        assert_eq!(exported.data["filename"], format!("contract-{id}.pdf"));
        assert_eq!(exported.data["content_type"], "application/pdf");
        assert!(exported.data["pdf_base64"].as_str().unwrap().starts_with("JVBERi0"));
    }

    #[tokio::test]
    async fn failures_map_to_envelopes() {
        let outbox = tempfile::tempdir().unwrap();
        let handler = handler(outbox.path());

        let missing = handler
            .execute(request(json!({ "action": "get", "payload": { "id": "nope" } })))
            .await;
        let error = missing.error.unwrap();
        assert_eq!(error.code, "not_found");
        assert!(!error.retryable);

        let bad = handler
            .execute(request(json!({ "action": "sign", "payload": { "id": "x" } })))
            .await;
        let error = bad.error.unwrap();
        assert_eq!(error.code, "invalid_request");
        assert!(error.message.contains("Invalid payload for sign"));
    }

    #[tokio::test]
    async fn served_handler_refuses_export_to_local_path() {
        let outbox = tempfile::tempdir().unwrap();
        let handler = handler(outbox.path()).without_local_output();
        let generated = handler
            .execute(request(json!({
                "action": "generate",
                "payload": { "prompt": "window cleaning" }
            })))
            .await;
        let id = generated.data["id"].as_str().unwrap().to_string();
        let target = outbox.path().join("stolen.pdf");

        let refused = handler
            .execute(request(json!({
                "action": "export",
                "payload": { "id": id, "output": target }
            })))
            .await;
        let error = refused.error.unwrap();
        assert_eq!(error.code, "invalid_request");
        assert!(error.message.contains("export.output"));
        assert!(!target.exists());

        let inline = handler
            .execute(request(json!({ "action": "export", "payload": { "id": id } })))
            .await;
        assert!(!inline.is_error(), "{:?}", inline.error);
        assert!(inline.data["pdf_base64"].is_string());
    }
}
