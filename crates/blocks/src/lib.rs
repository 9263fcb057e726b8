//! # Covenant Blocks
//!
//! Contract documents as ordered text blocks whose signature placeholders are
//! bound to parties and captured signature images.
//!
//! ## Architecture
//!
//! ```text
//! Drafted / edited text
//!     │
//!     ├──> Scanner (glyph runs → signature markers, fill-ins)
//!     │
//!     ├──> Reconciler
//!     │    ├─> match old and new markers by ordinal
//!     │    ├─> carry images forward, clear on party change
//!     │    └─> assert one binding per marker
//!     │
//!     ├──> capture_signature / assign_party
//!     │
//!     ├──> Completion gate (party / document complete)
//!     │
//!     └──> Render
//!          ├─> interactive spans
//!          ├─> plain text (drafter round-trip)
//!          └─> print HTML (PDF input)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use covenant_blocks::{
//!     capture_signature, document_is_complete, DraftBlock, DraftDocument, EncodedImage,
//!     PartyId, Reconciler,
//! };
//!
//! let reconciler = Reconciler::default();
//! let marker = "_".repeat(20);
//! let doc = reconciler
//!     .from_draft(DraftDocument {
//!         blocks: vec![DraftBlock::new(format!("Signed: {marker}"), &[PartyId::Originator])],
//!         unknowns: vec![],
//!     })
//!     .unwrap();
//!
//! let image = EncodedImage::parse("data:image/png;base64,iVBORw0KGgo=").unwrap();
//! let doc = capture_signature(&doc, 0, 0, PartyId::Originator, image).unwrap();
//! assert!(document_is_complete(&doc));
//! ```

mod capture;
mod completion;
mod config;
mod draft;
mod error;
mod reconcile;
pub mod render;
mod scanner;
pub mod storage;
mod types;

pub use capture::{assign_party, capture_signature};
pub use completion::{
    document_is_complete, ensure_complete, ensure_party_complete, outstanding, outstanding_for,
    party_is_complete,
};
pub use config::MarkerConfig;
pub use draft::{DraftBlock, DraftDocument, DraftSignature};
pub use error::{BlocksError, MissingSignature, Result};
pub use reconcile::{BindingSource, Reconciler};
pub use scanner::{MarkerKind, MarkerSpan, Scanner};
pub use types::{sha256_hex, Block, DocumentModel, EncodedImage, PartyId, SignatureBinding};
