//! Contract operations over the store, drafter, mailer and PDF renderer.
//!
//! Every mutation follows the same shape: claim the contract id in the
//! in-flight set, load, check who the caller is and that the contract is not
//! frozen, compute the next document with the pure functions of
//! `covenant-blocks`, then compare-and-swap it into the store. Nothing is
//! written when any step fails.

use crate::config::{DrafterMode, MailConfig, StoreBackend, WorkflowConfig};
use crate::contract::{generate_id, Contract, ContractParty, ContractStatus, CurrentUser};
use crate::drafter::{Drafter, OpenAiDrafter, StubDrafter};
use crate::error::{Result, WorkflowError};
use crate::inflight::InFlight;
use crate::mailer::{Attachment, Mailer, OutboxMailer};
use crate::pdf::{CommandPdfRenderer, PdfRenderer, StubPdfRenderer};
use crate::store::{ContractStore, FileStore, MemoryStore};
use chrono::{Local, Utc};
use covenant_blocks::render::{
    escape_html, interactive_view, plain_text, print_html, BlockView, PrintOptions,
};
use covenant_blocks::{
    assign_party, capture_signature, document_is_complete, ensure_complete, ensure_party_complete,
    outstanding, party_is_complete, BlocksError, DocumentModel, DraftDocument, EncodedImage,
    MissingSignature, PartyId, Reconciler, Scanner,
};
use covenant_protocol::{pdf_filename, PDF_CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MAX_TITLE_CHARS: usize = 80;

/// Which projection of a contract to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderView {
    #[default]
    Interactive,
    Plain,
    Print,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum RenderedContract {
    Interactive {
        viewer: PartyId,
        blocks: Vec<BlockView>,
        outstanding: Vec<MissingSignature>,
    },
    Plain {
        text: String,
    },
    Print {
        html: String,
    },
}

/// Result of a signature capture
#[derive(Debug, Clone, Serialize)]
pub struct SignOutcome {
    pub contract: Contract,
    pub party_complete: bool,
    pub document_complete: bool,
    /// Set when the capture completed a sent contract and finalization ran
    pub finalized: bool,
}

#[derive(Debug, Clone)]
pub struct ExportedPdf {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub filename: String,
    /// Document fingerprint, usable as an HTTP entity tag
    pub etag: String,
}

pub struct ContractService {
    store: Arc<dyn ContractStore>,
    drafter: Arc<dyn Drafter>,
    mailer: Arc<dyn Mailer>,
    pdf: Arc<dyn PdfRenderer>,
    reconciler: Reconciler,
    mail: MailConfig,
    in_flight: InFlight,
}

impl ContractService {
    pub fn new(
        store: Arc<dyn ContractStore>,
        drafter: Arc<dyn Drafter>,
        mailer: Arc<dyn Mailer>,
        pdf: Arc<dyn PdfRenderer>,
        reconciler: Reconciler,
        mail: MailConfig,
    ) -> Self {
        Self {
            store,
            drafter,
            mailer,
            pdf,
            reconciler,
            mail,
            in_flight: InFlight::default(),
        }
    }

    /// Wire the adapters selected by `config`
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        config.validate().map_err(WorkflowError::Config)?;
        let scanner = Scanner::new(config.markers.clone())?;
        let reconciler = Reconciler::new(scanner);

        let store: Arc<dyn ContractStore> = match config.store.backend {
            StoreBackend::File => Arc::new(FileStore::new(&config.store.dir, reconciler.clone())),
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };
        let drafter: Arc<dyn Drafter> = match config.drafter.mode {
            DrafterMode::Openai => Arc::new(OpenAiDrafter::new(
                &config.drafter,
                config.markers.clone(),
            )?),
            DrafterMode::Stub => Arc::new(StubDrafter::new(config.markers.clone())),
        };
        let pdf: Arc<dyn PdfRenderer> = match &config.pdf.command {
            Some(program) => Arc::new(CommandPdfRenderer::new(
                program.clone(),
                config.pdf.args.clone(),
                config.drafter.timeout(),
            )),
            None => Arc::new(StubPdfRenderer),
        };
        let mailer = Arc::new(OutboxMailer::new(&config.mail.outbox_dir, &config.mail.from));

        log::debug!(
            "Contract service: drafter={}, store={:?}, pdf={}",
            drafter.id(),
            config.store.backend,
            config.pdf.command.as_deref().unwrap_or("stub")
        );
        Ok(Self::new(
            store,
            drafter,
            mailer,
            pdf,
            reconciler,
            config.mail.clone(),
        ))
    }

    pub const fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn drafter_id(&self) -> &'static str {
        self.drafter.id()
    }

    pub fn is_busy(&self, id: &str) -> bool {
        self.in_flight.contains(id)
    }

    // ---- reads ------------------------------------------------------------

    pub async fn get(&self, user: &CurrentUser, id: &str) -> Result<Contract> {
        Ok(self.load_for(user, id).await?.0)
    }

    pub async fn list(&self, user: &CurrentUser) -> Result<Vec<Contract>> {
        self.store.list_for_user(user).await
    }

    pub async fn render(
        &self,
        user: &CurrentUser,
        id: &str,
        view: RenderView,
    ) -> Result<RenderedContract> {
        let (contract, viewer) = self.load_for(user, id).await?;
        Ok(match view {
            RenderView::Interactive => RenderedContract::Interactive {
                viewer,
                blocks: interactive_view(self.reconciler.scanner(), &contract.document, viewer)?,
                outstanding: outstanding(&contract.document),
            },
            RenderView::Plain => RenderedContract::Plain {
                text: plain_text(&contract.document),
            },
            RenderView::Print => RenderedContract::Print {
                html: self.print(&contract)?,
            },
        })
    }

    pub async fn export(&self, user: &CurrentUser, id: &str) -> Result<ExportedPdf> {
        let (contract, _) = self.load_for(user, id).await?;
        let html = self.print(&contract)?;
        let bytes = self.pdf.render_pdf(&html).await?;
        Ok(ExportedPdf {
            bytes,
            content_type: PDF_CONTENT_TYPE,
            filename: pdf_filename(&contract.id),
            etag: contract.document.fingerprint(),
        })
    }

    pub async fn summarize(&self, user: &CurrentUser, id: &str) -> Result<Vec<String>> {
        let (contract, _) = self.load_for(user, id).await?;
        self.drafter
            .summarize(&drafter_view(&contract.document))
            .await
    }

    // ---- drafting ---------------------------------------------------------

    pub async fn generate(
        &self,
        user: &CurrentUser,
        prompt: &str,
        title: Option<&str>,
    ) -> Result<Contract> {
        if prompt.trim().is_empty() {
            return Err(WorkflowError::InvalidRequest("prompt is empty".to_string()));
        }

        let draft = self.drafter.generate_document(prompt, user).await?;
        let document = self.reconciler.from_draft(draft)?;
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map_or_else(
                || derive_title(&document, self.reconciler.scanner().config().glyph),
                str::to_string,
            );

        let contract = Contract::draft(generate_id()?, title, prompt, user, document);
        let saved = self.store.save(&contract, None).await?;
        log::info!(
            "Generated contract {} ({} blocks, {} signature fields)",
            saved.id,
            saved.document.blocks().len(),
            saved.document.binding_count()
        );
        Ok(saved)
    }

    pub async fn regenerate_block(
        &self,
        user: &CurrentUser,
        id: &str,
        block: usize,
        instructions: &str,
    ) -> Result<Contract> {
        let _guard = self.in_flight.begin(id)?;
        let contract = self.load_mutable(user, id, Some(PartyId::Originator)).await?;
        if contract.document.block(block).is_none() {
            return Err(BlocksError::block_out_of_range(block).into());
        }

        let draft = self
            .drafter
            .regenerate_block(&drafter_view(&contract.document), block, instructions)
            .await?;
        let document = self
            .reconciler
            .reconcile_regenerated_block(&contract.document, block, draft)?;
        log::info!("Regenerated block {block} of contract {id}");
        self.commit(contract, document).await
    }

    pub async fn regenerate_document(
        &self,
        user: &CurrentUser,
        id: &str,
        instructions: &str,
    ) -> Result<Contract> {
        let _guard = self.in_flight.begin(id)?;
        let contract = self.load_mutable(user, id, Some(PartyId::Originator)).await?;

        let draft = self
            .drafter
            .regenerate_document(&drafter_view(&contract.document), instructions)
            .await?;
        let document = self
            .reconciler
            .reconcile_document(Some(&contract.document), draft)?;
        log::info!("Regenerated contract {id}");
        self.commit(contract, document).await
    }

    // ---- manual edits -----------------------------------------------------

    pub async fn edit_block(
        &self,
        user: &CurrentUser,
        id: &str,
        block: usize,
        text: String,
    ) -> Result<Contract> {
        let _guard = self.in_flight.begin(id)?;
        let contract = self.load_mutable(user, id, Some(PartyId::Originator)).await?;
        let document =
            self.reconciler
                .edit_block(&contract.document, block, text, PartyId::Originator)?;
        self.commit(contract, document).await
    }

    pub async fn fill_in(
        &self,
        user: &CurrentUser,
        id: &str,
        block: usize,
        field: usize,
        value: &str,
    ) -> Result<Contract> {
        let _guard = self.in_flight.begin(id)?;
        let contract = self.load_mutable(user, id, None).await?;
        let editor = self.party_of(&contract, user)?;
        let document = self
            .reconciler
            .fill_in(&contract.document, block, field, value, editor)?;
        self.commit(contract, document).await
    }

    pub async fn assign_party(
        &self,
        user: &CurrentUser,
        id: &str,
        block: usize,
        ordinal: usize,
        party: PartyId,
    ) -> Result<Contract> {
        let _guard = self.in_flight.begin(id)?;
        let contract = self.load_mutable(user, id, Some(PartyId::Originator)).await?;
        let document = assign_party(&contract.document, block, ordinal, party)?;
        self.commit(contract, document).await
    }

    // ---- signing ----------------------------------------------------------

    pub async fn sign(
        &self,
        user: &CurrentUser,
        id: &str,
        block: usize,
        ordinal: usize,
        image: &str,
    ) -> Result<SignOutcome> {
        let _guard = self.in_flight.begin(id)?;
        let contract = self.load_mutable(user, id, None).await?;
        let party = self.party_of(&contract, user)?;

        let image = EncodedImage::parse(image)?;
        let document = capture_signature(&contract.document, block, ordinal, party, image)?;
        let party_complete = party_is_complete(&document, party);
        let document_complete = document_is_complete(&document);

        let mut contract = self.commit_with(contract, document, |contract| {
            if party == PartyId::Counterparty && contract.status == ContractStatus::Sent {
                contract.status = ContractStatus::Pending;
            }
        })
        .await?;
        log::info!("Contract {id}: {} signed block {block} #{ordinal}", party.as_str());

        let mut finalized = false;
        let dispatched = matches!(
            contract.status,
            ContractStatus::Sent | ContractStatus::Pending
        );
        if document_complete && dispatched {
            match self.finalize_loaded(contract.clone()).await {
                Ok(done) => {
                    contract = done;
                    finalized = true;
                }
                Err(err) => log::warn!("Contract {id} is fully signed but finalization failed: {err}"),
            }
        }

        Ok(SignOutcome {
            contract,
            party_complete,
            document_complete,
            finalized,
        })
    }

    /// Dispatch a draft to the counterparty for signing
    pub async fn send(
        &self,
        user: &CurrentUser,
        id: &str,
        recipient_email: &str,
        recipient_name: Option<&str>,
    ) -> Result<Contract> {
        let recipient_email = recipient_email.trim();
        if !recipient_email.contains('@') {
            return Err(WorkflowError::InvalidRequest(format!(
                "recipient {recipient_email:?} is not an email address"
            )));
        }

        let _guard = self.in_flight.begin(id)?;
        let mut contract = self.load_mutable(user, id, Some(PartyId::Originator)).await?;
        ensure_party_complete(&contract.document, PartyId::Originator)?;

        if let Some(previous) = contract
            .party(PartyId::Counterparty)
            .filter(|party| !party.matches_email(recipient_email))
        {
            let started = contract
                .document
                .iter_bindings()
                .any(|(_, b)| b.party == PartyId::Counterparty && b.is_bound());
            if started {
                return Err(WorkflowError::InvalidRequest(format!(
                    "{} has already signed part of this contract; it cannot be redirected to {recipient_email}",
                    previous.email
                )));
            }
        }

        let expected = contract.version;
        let name = recipient_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(recipient_email);
        contract.upsert_party(ContractParty::new(name, recipient_email, PartyId::Counterparty));
        if contract.status == ContractStatus::Draft {
            contract.status = ContractStatus::Sent;
        }
        contract.refresh_signed_flags(Utc::now());
        contract.touch();
        let saved = self.store.save(&contract, Some(expected)).await?;

        let link = self.mail.signing_link(&saved.id);
        let subject = format!("{} sent you \"{}\" to sign", user.display_name(), saved.title);
        let html = format!(
            "<p>Hello {name},</p>\
             <p>{sender} has asked you to review and sign <strong>{title}</strong>.</p>\
             <p><a href=\"{link}\">Open the contract</a></p>",
            name = escape_html(name),
            sender = escape_html(user.display_name()),
            title = escape_html(&saved.title),
        );
        self.mailer
            .send_mail(recipient_email, &subject, &html, &[])
            .await?;

        log::info!("Contract {id} sent to {recipient_email}");
        Ok(saved)
    }

    /// Complete a fully signed contract and mail the PDF to every party
    pub async fn finalize(&self, user: &CurrentUser, id: &str) -> Result<Contract> {
        let _guard = self.in_flight.begin(id)?;
        let contract = self.load_mutable(user, id, None).await?;
        self.finalize_loaded(contract).await
    }

    async fn finalize_loaded(&self, mut contract: Contract) -> Result<Contract> {
        contract.ensure_mutable()?;
        ensure_complete(&contract.document)?;

        let expected = contract.version;
        let now = Utc::now();
        contract.status = ContractStatus::Completed;
        contract.completed_at = Some(now);
        contract.refresh_signed_flags(now);
        contract.updated_at = now;

        let html = self.print(&contract)?;
        let pdf = self.pdf.render_pdf(&html).await?;
        let attachment = Attachment {
            filename: pdf_filename(&contract.id),
            content_type: PDF_CONTENT_TYPE.to_string(),
            bytes: pdf,
        };

        let saved = self.store.save(&contract, Some(expected)).await?;
        log::info!("Contract {} completed", saved.id);

        let subject = format!("Signed: {}", saved.title);
        let body = format!(
            "<p>All parties have signed <strong>{}</strong>. The executed contract is attached.</p>",
            escape_html(&saved.title)
        );
        for party in saved.parties.iter().filter(|p| p.email.contains('@')) {
            if let Err(err) = self
                .mailer
                .send_mail(&party.email, &subject, &body, std::slice::from_ref(&attachment))
                .await
            {
                log::warn!(
                    "Contract {} completed but the copy for {} was not sent: {err}",
                    saved.id,
                    party.email
                );
            }
        }
        Ok(saved)
    }

    // ---- helpers ----------------------------------------------------------

    async fn load_for(&self, user: &CurrentUser, id: &str) -> Result<(Contract, PartyId)> {
        let contract = self
            .store
            .load(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(id.to_string()))?;
        let party = self.party_of(&contract, user)?;
        Ok((contract, party))
    }

    /// Load for mutation, optionally requiring the caller's side
    async fn load_mutable(
        &self,
        user: &CurrentUser,
        id: &str,
        required: Option<PartyId>,
    ) -> Result<Contract> {
        let (contract, party) = self.load_for(user, id).await?;
        if let Some(required) = required {
            if party != required {
                return Err(WorkflowError::forbidden(
                    id,
                    format!("only {} may do this", required.default_label()),
                ));
            }
        }
        contract.ensure_mutable()?;
        Ok(contract)
    }

    fn party_of(&self, contract: &Contract, user: &CurrentUser) -> Result<PartyId> {
        contract
            .party_for(user)
            .ok_or_else(|| WorkflowError::forbidden(&contract.id, "not a party to this contract"))
    }

    async fn commit(&self, contract: Contract, document: DocumentModel) -> Result<Contract> {
        self.commit_with(contract, document, |_| {}).await
    }

    async fn commit_with(
        &self,
        mut contract: Contract,
        document: DocumentModel,
        update: impl FnOnce(&mut Contract),
    ) -> Result<Contract> {
        let expected = contract.version;
        contract.document = document;
        contract.refresh_signed_flags(Utc::now());
        update(&mut contract);
        contract.touch();
        self.store.save(&contract, Some(expected)).await
    }

    fn print(&self, contract: &Contract) -> Result<String> {
        let date = contract
            .completed_at
            .map_or_else(|| Local::now().date_naive(), |at| at.date_naive());
        let mut options = PrintOptions::new(&contract.id)
            .title(&contract.title)
            .date(date);
        for party in &contract.parties {
            options = options.label(party.role, &party.name);
        }
        Ok(print_html(self.reconciler.scanner(), &contract.document, &options)?)
    }
}

/// Document as shown to the drafter: captured images stay out of prompts
fn drafter_view(doc: &DocumentModel) -> DraftDocument {
    let mut draft = DraftDocument::from(doc.clone());
    for signature in draft.blocks.iter_mut().flat_map(|b| b.signatures.iter_mut()) {
        signature.img_url.clear();
    }
    draft
}

fn derive_title(doc: &DocumentModel, glyph: char) -> String {
    let first_line = doc
        .blocks()
        .iter()
        .flat_map(|b| b.text().lines())
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.contains(glyph))
        .unwrap_or("Untitled contract");
    first_line.chars().take(MAX_TITLE_CHARS).collect()
}
