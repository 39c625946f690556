use crate::config::{SnowflakeSettings, SsoSettings};
use crate::db::query::{rows_to_result, QueryResult};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use snowflake_connector_rs::{
    SnowflakeAuthMethod, SnowflakeClient, SnowflakeClientConfig, SnowflakeSession,
};
use std::time::{Duration, Instant};

/// An open, authenticated warehouse connection.
#[async_trait]
pub trait Cursor: Send {
    async fn execute(&mut self, sql: &str) -> Result<QueryResult>;
}

/// Opens fresh connections. Nothing is pooled; callers drop the cursor when done.
#[async_trait]
pub trait Connector: Send + Sync {
    /// `role` falls back to the configured default when `None`.
    async fn cursor(&self, role: Option<&str>) -> Result<Box<dyn Cursor>>;
}

pub struct SnowflakeConnector {
    settings: SnowflakeSettings,
    sso: Option<SsoClient>,
}

impl SnowflakeConnector {
    pub fn new(settings: SnowflakeSettings, sso: Option<SsoSettings>) -> Self {
        let sso = sso.map(|s| SsoClient::new(s, &settings.user, &settings.password));
        Self { settings, sso }
    }
}

#[async_trait]
impl Connector for SnowflakeConnector {
    async fn cursor(&self, role: Option<&str>) -> Result<Box<dyn Cursor>> {
        if let Some(ref sso) = self.sso {
            match sso.request_token().await {
                Ok(Some(_)) => tracing::debug!(user = %self.settings.user, "SSO token issued"),
                Ok(None) => tracing::debug!(user = %self.settings.user, "SSO endpoint returned no token"),
                Err(e) => tracing::warn!(error = %e, "SSO token request failed, continuing with password login"),
            }
        }

        let role = role.unwrap_or(&self.settings.role);
        let client = SnowflakeClient::new(
            &self.settings.user,
            SnowflakeAuthMethod::Password(self.settings.password.clone()),
            SnowflakeClientConfig {
                account: self.settings.account.clone(),
                role: Some(role.to_string()),
                warehouse: Some(self.settings.warehouse.clone()),
                database: Some(self.settings.database.clone()),
                schema: Some(self.settings.schema.clone()),
                timeout: Some(Duration::from_secs(self.settings.query_timeout_secs)),
            },
        )
        .map_err(|e| Error::Connection(e.to_string()))?;

        let session = client
            .create_session()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        tracing::debug!(account = %self.settings.account, %role, "opened Snowflake session");
        Ok(Box::new(SnowflakeCursor { session }))
    }
}

struct SnowflakeCursor {
    session: SnowflakeSession,
}

#[async_trait]
impl Cursor for SnowflakeCursor {
    async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let rows = self.session.query(sql).await?;
        Ok(rows_to_result(rows, start.elapsed().as_millis()))
    }
}

/// Reports the warehouse version; used as a connectivity check at startup.
pub async fn test_connection(connector: &dyn Connector) -> Result<String> {
    let mut cursor = connector.cursor(None).await?;
    let result = cursor.execute("SELECT CURRENT_VERSION() AS VERSION").await?;
    Ok(result
        .rows
        .first()
        .and_then(|row| row.first())
        .map(crate::db::value_as_text)
        .unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Password-grant request against the single-sign-on token endpoint.
pub struct SsoClient {
    http_client: reqwest::Client,
    settings: SsoSettings,
    username: String,
    password: String,
}

impl SsoClient {
    pub fn new(settings: SsoSettings, username: &str, password: &str) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            settings,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub async fn request_token(&self) -> std::result::Result<Option<String>, reqwest::Error> {
        let params = [
            ("grant_type", "password"),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];

        let mut request = self
            .http_client
            .post(&self.settings.token_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&params);
        if let Some(ref auth) = self.settings.authorization {
            request = request.header(AUTHORIZATION, auth);
        }

        let text = request.send().await?.error_for_status()?.text().await?;
        Ok(serde_json::from_str::<TokenResponse>(&text)
            .ok()
            .and_then(|t| t.access_token))
    }
}
