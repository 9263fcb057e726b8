use anyhow::{Context as AnyhowContext, Result};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::net::SocketAddr;
use subtle::ConstantTimeEq;

pub(crate) const AUTH_TOKEN_ENV: &str = "COVENANT_AUTH_TOKEN";

/// Checked `serve-http` settings.
///
/// A server on a non-loopback address accepts contract mutations and PDF
/// downloads from the network, so it needs both `--public` and a bearer
/// token. Loopback servers may run without one.
#[derive(Debug)]
pub(crate) struct ServeGuard {
    addrs: Vec<SocketAddr>,
    public: bool,
    token: Option<String>,
}

impl ServeGuard {
    pub(crate) async fn check(bind: &str, public: bool, token_flag: Option<&str>) -> Result<Self> {
        let token = token_flag
            .map(str::to_string)
            .or_else(|| std::env::var(AUTH_TOKEN_ENV).ok())
            .map(|raw| normalize_token(&raw))
            .transpose()?;

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(bind)
            .await
            .with_context(|| format!("Cannot resolve bind address {bind}"))?
            .collect();
        Self::from_parts(bind, addrs, public, token)
    }

    pub(crate) fn from_parts(
        bind: &str,
        addrs: Vec<SocketAddr>,
        public: bool,
        token: Option<String>,
    ) -> Result<Self> {
        if addrs.is_empty() {
            anyhow::bail!("Bind address {bind} resolved to nothing");
        }
        let exposed = addrs.iter().any(|addr| !addr.ip().is_loopback());
        if exposed && !public {
            anyhow::bail!(
                "{bind} is reachable from other hosts; pass --public with an auth token to serve contracts there"
            );
        }
        if public && token.is_none() {
            anyhow::bail!(
                "--public requires an auth token: set --auth-token or export {AUTH_TOKEN_ENV}"
            );
        }
        Ok(Self {
            addrs,
            public,
            token,
        })
    }

    pub(crate) fn requires_token(&self) -> bool {
        self.token.is_some()
    }

    /// Whether a request may reach `/command`, `/contracts/:id/pdf` or `/health`
    pub(crate) fn admits(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.token.as_deref() else {
            return true;
        };
        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().strip_prefix("Bearer "))
            .map(str::trim);
        match presented {
            Some(presented) => bool::from(presented.as_bytes().ct_eq(expected.as_bytes())),
            None => false,
        }
    }

    /// Startup lines describing exposure, printed after the route list
    pub(crate) fn banner(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.token.is_some() {
            lines.push(format!(
                "Auth enabled: add header 'Authorization: Bearer ${AUTH_TOKEN_ENV}'"
            ));
        }
        if self.public {
            let addrs = self
                .addrs
                .iter()
                .map(SocketAddr::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("Public bind on {addrs}"));
        }
        lines
    }
}

fn normalize_token(raw: &str) -> Result<String> {
    let token = raw.trim();
    if token.is_empty() {
        anyhow::bail!("auth token must be non-empty");
    }
    Ok(token.to_string())
}
