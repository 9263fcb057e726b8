use covenant_blocks::BlocksError;
use covenant_protocol::ErrorEnvelope;
use covenant_workflow::WorkflowError;
use serde_json::json;

/// Map an action failure to the wire envelope.
///
/// Typed workflow errors keep their stable code and structured details;
/// anything else came from request decoding or the CLI edge.
pub fn classify_error(err: &anyhow::Error) -> ErrorEnvelope {
    let message = format!("{err:#}");
    if let Some(workflow) = err.downcast_ref::<WorkflowError>() {
        return classify_workflow(workflow, message);
    }
    if let Some(blocks) = err.downcast_ref::<BlocksError>() {
        return classify_blocks(blocks, ErrorEnvelope::new(blocks.code(), message));
    }
    if err.downcast_ref::<serde_json::Error>().is_some() {
        return ErrorEnvelope::new("invalid_request", message)
            .with_hint("Check the payload fields for this action against the Command API.");
    }
    ErrorEnvelope::new("internal", message)
}

fn classify_workflow(err: &WorkflowError, message: String) -> ErrorEnvelope {
    let envelope = ErrorEnvelope::new(err.code(), message).retryable(err.is_retryable());
    match err {
        WorkflowError::Blocks(inner) => classify_blocks(inner, envelope),
        WorkflowError::MalformedDraft(_) => {
            envelope.with_hint("The drafter answer did not fit the document schema; retry the generation.")
        }
        WorkflowError::NotFound(id) => envelope
            .with_details(json!({ "id": id }))
            .with_hint("Use the list action to see contracts visible to you."),
        WorkflowError::VersionConflict {
            id,
            expected,
            actual,
        } => envelope
            .with_details(json!({ "id": id, "expected": expected, "actual": actual }))
            .with_hint("Reload the contract and apply the change again."),
        WorkflowError::MutationInFlight(id) => envelope
            .with_details(json!({ "id": id }))
            .with_hint("A regeneration is running for this contract; wait for it to finish."),
        WorkflowError::Forbidden { id, reason } => {
            envelope.with_details(json!({ "id": id, "reason": reason }))
        }
        WorkflowError::Transport { service, .. } | WorkflowError::Timeout { service } => envelope
            .with_details(json!({ "service": service.to_string() }))
            .with_hint("The request can be retried."),
        WorkflowError::Config(_) => envelope.with_hint(
            "Set OPENAI_API_KEY, or COVENANT_DRAFTER_MODE=stub for offline use.",
        ),
        WorkflowError::InvalidRequest(_) | WorkflowError::Io(_) | WorkflowError::Serialization(_) => {
            envelope
        }
    }
}

fn classify_blocks(err: &BlocksError, envelope: ErrorEnvelope) -> ErrorEnvelope {
    match err {
        BlocksError::BindingMismatch {
            block,
            markers,
            bindings,
        } => envelope
            .with_details(json!({ "block": block, "markers": markers, "bindings": bindings }))
            .with_hint("The document was left unchanged."),
        BlocksError::GenerationContractViolation { block, reason } => envelope
            .with_details(json!({ "block": block, "reason": reason }))
            .with_hint("The drafter miscounted signature markers; retry the generation."),
        BlocksError::WrongParty {
            block,
            ordinal,
            expected,
            actual,
        } => envelope
            .with_details(json!({
                "block": block,
                "ordinal": ordinal,
                "expected": expected,
                "actual": actual,
            }))
            .with_hint("Only fields owned by your party can be signed."),
        BlocksError::OutOfRange { block, ordinal } => {
            envelope.with_details(json!({ "block": block, "ordinal": ordinal }))
        }
        BlocksError::IncompleteSignatures { missing } => envelope
            .with_details(json!({ "missing": missing }))
            .with_hint("Every signature field must be signed (and assigned) first."),
        BlocksError::DocumentFrozen => {
            envelope.with_hint("Completed contracts are read-only.")
        }
        BlocksError::InvalidImage(_) => {
            envelope.with_hint("Send the signature as a data:image/...;base64, URL.")
        }
        BlocksError::InvalidEdit { block, reason } => {
            envelope.with_details(json!({ "block": block, "reason": reason }))
        }
        BlocksError::InvalidConfig(_) | BlocksError::Serialization(_) => envelope,
    }
}
