use crate::command::{CommandResponse, ResponseMeta};
use axum::{
    body::Body,
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE, ETAG, IF_NONE_MATCH},
        HeaderMap, Response as HttpResponse, StatusCode,
    },
    response::Response,
};
use covenant_protocol::{serialize_json, ErrorEnvelope};
use covenant_workflow::{CurrentUser, ExportedPdf};

/// Headers identifying the acting user on the PDF download route
pub(crate) const USER_ID_HEADER: &str = "x-covenant-user-id";
pub(crate) const USER_EMAIL_HEADER: &str = "x-covenant-user-email";
pub(crate) const USER_NAME_HEADER: &str = "x-covenant-user-name";

pub(crate) fn user_from_headers(headers: &HeaderMap) -> Option<CurrentUser> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    Some(CurrentUser::new(
        header(USER_ID_HEADER)?,
        header(USER_EMAIL_HEADER)?,
        header(USER_NAME_HEADER).unwrap_or_default(),
    ))
}

pub(crate) fn error_response(code: &str, message: String) -> CommandResponse {
    let hint = match code {
        "unauthorized" => {
            "If the server is started with COVENANT_AUTH_TOKEN, include Authorization: Bearer <token>."
        }
        "invalid_request" => {
            "Verify the request is valid JSON and matches the Command API schema."
        }
        "missing_user" => {
            "Send x-covenant-user-id and x-covenant-user-email headers, or start the server with COVENANT_USER_ID and COVENANT_USER_EMAIL."
        }
        _ => "Check the request against the Command API schema.",
    };

    CommandResponse::error(
        ErrorEnvelope::new(code, message).with_hint(hint),
        ResponseMeta::default(),
    )
}

pub(crate) fn build_response(
    status: StatusCode,
    response: CommandResponse,
) -> Result<Response, StatusCode> {
    let bytes = serialize_json(&response)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .into_bytes();

    let mut builder = HttpResponse::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json");

    if status == StatusCode::UNAUTHORIZED {
        builder = builder.header("www-authenticate", "Bearer");
    }

    builder
        .body(Body::from(bytes))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// HTTP status for a failed download, by envelope code
pub(crate) fn status_for_code(code: &str) -> StatusCode {
    match code {
        "not_found" => StatusCode::NOT_FOUND,
        "forbidden" => StatusCode::FORBIDDEN,
        "invalid_request" => StatusCode::BAD_REQUEST,
        "transport" => StatusCode::BAD_GATEWAY,
        "timeout" => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn quoted_etag(etag: &str) -> String {
    format!("\"{etag}\"")
}

fn etag_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let quoted = quoted_etag(etag);
    value
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate == quoted)
}

/// Attachment response for an exported contract, honouring `If-None-Match`
pub(crate) fn pdf_response(headers: &HeaderMap, pdf: ExportedPdf) -> Result<Response, StatusCode> {
    let etag = quoted_etag(&pdf.etag);
    if etag_matches(headers, &pdf.etag) {
        return HttpResponse::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(ETAG, etag)
            .body(Body::empty())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR);
    }

    HttpResponse::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, pdf.content_type)
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", pdf.filename),
        )
        .header(ETAG, etag)
        .body(Body::from(pdf.bytes))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
