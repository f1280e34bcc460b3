//! Synthetic bookkeeper sessions
//!
//! Before reading or writing a company's ledger, the orchestrator logs in as
//! the synthetic bookkeeper for that company. The login itself is delegated to
//! an external service. Tokens are returned to the caller and never cached.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::query_result::QueryResult;

/// Tokens for one company's synthetic session
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub ticket: String,
    pub auth_id: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("ticket", &"<redacted>")
            .field("auth_id", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Invitation being accepted during login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteContext {
    pub invite_link: String,
    pub invite_type: String,
}

/// External login process
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn authenticate(
        &self,
        company_id: &str,
        firm_name: Option<&str>,
        invite: Option<&InviteContext>,
    ) -> Result<SessionTokens>;
}

/// Login through the session service over HTTP
///
/// POSTs `{companyId, firmName, inviteLink, inviteType}` to `{base}/login`.
#[derive(Clone)]
pub struct HttpSessionProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    company_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    firm_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    invite_link: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    invite_type: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct LoginError {
    error: String,
}

impl HttpSessionProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn authenticate(
        &self,
        company_id: &str,
        firm_name: Option<&str>,
        invite: Option<&InviteContext>,
    ) -> Result<SessionTokens> {
        let request = LoginRequest {
            company_id,
            firm_name: firm_name.filter(|f| !f.is_empty()),
            invite_link: invite.map(|i| i.invite_link.as_str()),
            invite_type: invite.map(|i| i.invite_type.as_str()),
        };

        let response = self
            .client
            .post(format!("{}/login", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::SessionFailure(format!("session service unreachable: {}", e)))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let detail = serde_json::from_str::<LoginError>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| format!("session service returned {}", status));
            return Err(Error::SessionFailure(detail));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::SessionFailure(format!("unreadable login response: {}", e)))
    }
}

/// Fixed tokens for tests and local runs
///
/// Companies listed with [`StaticSessionProvider::failing_for`] are refused.
#[derive(Clone, Default)]
pub struct StaticSessionProvider {
    tokens: SessionTokens,
    failing: HashSet<String>,
    logins: Arc<AtomicUsize>,
}

impl StaticSessionProvider {
    pub fn new() -> Self {
        Self {
            tokens: SessionTokens {
                ticket: "static-ticket".into(),
                auth_id: "static-auth".into(),
                access_token: "static-access".into(),
                refresh_token: "static-refresh".into(),
            },
            ..Default::default()
        }
    }

    pub fn failing_for(mut self, company_id: &str) -> Self {
        self.failing.insert(company_id.to_string());
        self
    }

    /// Successful and failed logins so far
    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn authenticate(
        &self,
        company_id: &str,
        _firm_name: Option<&str>,
        _invite: Option<&InviteContext>,
    ) -> Result<SessionTokens> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(company_id) {
            return Err(Error::SessionFailure(format!(
                "login refused for company {}",
                company_id
            )));
        }
        Ok(self.tokens.clone())
    }
}

/// Acquires synthetic sessions under a timeout
#[derive(Clone)]
pub struct SessionManager {
    provider: Arc<dyn SessionProvider>,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn SessionProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Log in as the synthetic bookkeeper for one company
    ///
    /// Tokens are only returned on success.
    pub async fn login(
        &self,
        company_id: &str,
        firm_name: Option<&str>,
        invite: Option<&InviteContext>,
    ) -> (QueryResult, Option<SessionTokens>) {
        let attempt = tokio::time::timeout(
            self.timeout,
            self.provider.authenticate(company_id, firm_name, invite),
        )
        .await;

        let outcome = match attempt {
            Ok(result) => result,
            Err(_) => Err(Error::SessionFailure(format!(
                "login timed out after {}s",
                self.timeout.as_secs()
            ))),
        };

        match outcome {
            Ok(tokens) => {
                debug!(company_id = %company_id, "Synthetic login succeeded");
                (
                    QueryResult::success("Successfully completed synthetic auth process", ""),
                    Some(tokens),
                )
            }
            Err(e) => {
                warn!(company_id = %company_id, error = %e, "Synthetic login failed");
                let detail = match e {
                    Error::SessionFailure(detail) => detail,
                    other => other.to_string(),
                };
                (
                    QueryResult::error("Failed to complete auth process", detail),
                    None,
                )
            }
        }
    }
}
