//! # Covenant Workflow
//!
//! Contract lifecycle around the pure document core of `covenant-blocks`:
//! persistence with optimistic concurrency, AI drafting, signing, sending,
//! finalization and export.
//!
//! ```text
//! ContractService
//!     ├──> ContractStore   (MemoryStore | FileStore)
//!     ├──> Drafter         (OpenAiDrafter | StubDrafter)
//!     ├──> Mailer          (OutboxMailer)
//!     └──> PdfRenderer     (CommandPdfRenderer | StubPdfRenderer)
//! ```
//!
//! Status moves `draft → sent → pending → completed`; a completed contract is
//! frozen.

pub mod config;
mod contract;
pub mod drafter;
mod error;
mod inflight;
mod mailer;
mod pdf;
mod service;
pub mod store;

pub use config::{DrafterMode, StoreBackend, WorkflowConfig};
pub use contract::{
    generate_id, Contract, ContractParty, ContractRecord, ContractStatus, CurrentUser,
};
pub use drafter::{Drafter, OpenAiDrafter, StubDrafter};
pub use error::{Collaborator, Result, WorkflowError};
pub use mailer::{Attachment, Mailer, OutboxMailer};
pub use pdf::{CommandPdfRenderer, PdfRenderer, StubPdfRenderer};
pub use service::{ContractService, ExportedPdf, RenderView, RenderedContract, SignOutcome};
pub use store::{ContractStore, FileStore, MemoryStore};
