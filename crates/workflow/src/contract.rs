use crate::error::{Result, WorkflowError};
use chrono::{DateTime, Utc};
use covenant_blocks::{party_is_complete, storage, BlocksError, DocumentModel, PartyId, Reconciler};
use serde::{Deserialize, Serialize};

/// Authenticated caller, as resolved by whatever fronts the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
}

impl CurrentUser {
    pub fn new(id: impl Into<String>, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
        }
    }

    /// Name used in prompts and mail, falling back to the address
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.email
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// Generated, still being edited by the originator
    Draft,
    /// Sent, and the counterparty has started signing
    Pending,
    /// Dispatched to the counterparty
    Sent,
    /// Every party has signed; the document is frozen
    Completed,
}

impl ContractStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub const fn is_frozen(self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractParty {
    pub name: String,
    pub email: String,
    pub role: PartyId,
    #[serde(default)]
    pub signed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,
}

impl ContractParty {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: PartyId) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            role,
            signed: false,
            signed_at: None,
        }
    }

    pub(crate) fn matches_email(&self, email: &str) -> bool {
        !email.is_empty() && self.email.eq_ignore_ascii_case(email)
    }
}

/// A contract with its validated document.
///
/// Serializes for the wire with the document in its storage shape; use
/// [`ContractRecord`] to persist and restore it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contract {
    pub id: String,
    pub title: String,
    pub prompt: String,
    pub created_by: String,
    pub document: DocumentModel,
    pub parties: Vec<ContractParty>,
    pub status: ContractStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Contract {
    /// A fresh draft owned by `creator`, not yet persisted (version 0)
    pub fn draft(
        id: impl Into<String>,
        title: impl Into<String>,
        prompt: impl Into<String>,
        creator: &CurrentUser,
        document: DocumentModel,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            prompt: prompt.into(),
            created_by: creator.id.clone(),
            document,
            parties: vec![ContractParty::new(
                creator.display_name(),
                creator.email.clone(),
                PartyId::Originator,
            )],
            status: ContractStatus::Draft,
            version: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Which side of the contract `user` signs for, if any
    pub fn party_for(&self, user: &CurrentUser) -> Option<PartyId> {
        if self.created_by == user.id {
            return Some(PartyId::Originator);
        }
        self.parties
            .iter()
            .find(|party| party.matches_email(&user.email))
            .map(|party| party.role)
    }

    pub fn involves(&self, user: &CurrentUser) -> bool {
        self.party_for(user).is_some()
    }

    pub fn party(&self, role: PartyId) -> Option<&ContractParty> {
        self.parties.iter().find(|party| party.role == role)
    }

    /// Record or replace the party entry for `party.role`
    pub fn upsert_party(&mut self, party: ContractParty) {
        match self.parties.iter_mut().find(|p| p.role == party.role) {
            Some(existing) => {
                existing.name = party.name;
                existing.email = party.email;
            }
            None => self.parties.push(party),
        }
    }

    pub fn ensure_mutable(&self) -> Result<()> {
        if self.status.is_frozen() {
            return Err(BlocksError::DocumentFrozen.into());
        }
        Ok(())
    }

    /// Recompute each party's signed flag from its bindings
    pub fn refresh_signed_flags(&mut self, now: DateTime<Utc>) {
        for party in &mut self.parties {
            let signed = party_is_complete(&self.document, party.role);
            if signed && !party.signed {
                party.signed_at = Some(now);
            } else if !signed {
                party.signed_at = None;
            }
            party.signed = signed;
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn to_record(&self) -> Result<ContractRecord> {
        Ok(ContractRecord {
            id: self.id.clone(),
            title: self.title.clone(),
            prompt: self.prompt.clone(),
            created_by: self.created_by.clone(),
            content: storage::encode(&self.document)?,
            parties: self.parties.clone(),
            status: self.status,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

/// Persisted shape of a contract: the document travels as one text blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    pub created_by: String,
    pub content: String,
    #[serde(default)]
    pub parties: Vec<ContractParty>,
    pub status: ContractStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ContractRecord {
    pub fn into_contract(self, reconciler: &Reconciler) -> Result<Contract> {
        let document = storage::decode(reconciler, &self.content).map_err(|err| {
            log::error!("Stored document for contract {} is corrupted: {err}", self.id);
            WorkflowError::from(err)
        })?;
        Ok(Contract {
            id: self.id,
            title: self.title,
            prompt: self.prompt,
            created_by: self.created_by,
            document,
            parties: self.parties,
            status: self.status,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

/// 24 lowercase hex characters from the OS random source
pub fn generate_id() -> Result<String> {
    let mut bytes = [0u8; 12];
    getrandom::getrandom(&mut bytes)
        .map_err(|err| WorkflowError::Io(std::io::Error::other(err.to_string())))?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}
