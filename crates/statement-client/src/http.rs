//! HTTP implementation of the statement collaborators
//!
//! Endpoints (all under `/api/v1`):
//! - `GET  account/auth-check`      session status
//! - `POST pdf/page-count-native`   multipart `file` -> `{ fileId, numPages }`
//! - `POST pdf/pdf-to-image`        multipart `file`, `page` -> image bytes
//! - `POST pdf/extract-text`        multipart `file`, `pages` -> statement JSON
//! - `GET  transactions`            `{ data: { transactions } }`

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, COOKIE};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use statement_core::{
    ApiError, AuthStatus, ExtractionRequest, PageCount, StatementApi, StatementData, Transaction,
    UploadedFile,
};
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::ClientError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    #[serde(default)]
    ok: bool,
    data: Option<AuthData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthData {
    #[serde(default)]
    token_expires_in: i64,
    inactive_at: Option<NullableTime>,
}

/// `sql.NullTime`-style wrapper: `Valid` is true when the time is set
#[derive(Debug, Deserialize)]
struct NullableTime {
    #[serde(rename = "Valid", default)]
    valid: bool,
}

impl From<AuthResponse> for AuthStatus {
    fn from(response: AuthResponse) -> Self {
        let (token_expires_in, inactive) = match response.data {
            Some(data) => (
                data.token_expires_in,
                data.inactive_at.map(|t| t.valid).unwrap_or(false),
            ),
            None => (0, false),
        };
        AuthStatus {
            ok: response.ok,
            token_expires_in,
            inactive,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    data: TransactionsData,
}

#[derive(Debug, Deserialize)]
struct TransactionsData {
    #[serde(default)]
    transactions: Vec<Transaction>,
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError::Transport(err.to_string())
}

/// Statement API over HTTP
#[derive(Debug, Clone)]
pub struct HttpStatementApi {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpStatementApi {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ClientError::InvalidConfig(format!("token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(cookie) = &config.session_cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| ClientError::InvalidConfig(format!("session cookie: {}", e)))?;
            headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.config.endpoint(path))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.config.endpoint(path))
    }

    fn document_form(document: &UploadedFile) -> Result<Form, ApiError> {
        let part = Part::bytes(document.bytes().to_vec())
            .file_name(document.name.clone())
            .mime_str(&document.media_type)
            .map_err(|e| ApiError::Failed(format!("Invalid media type: {}", e)))?;
        Ok(Form::new().part("file", part))
    }

    /// Turn a non-OK response into `ApiError::Rejected`, keeping the
    /// server's `error` message when the body carries one
    async fn rejected(response: Response) -> ApiError {
        let status = response.status().as_u16();
        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error)
            .filter(|m| !m.is_empty());
        ApiError::Rejected { status, message }
    }

    /// Check the status, then parse the JSON body
    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl StatementApi for HttpStatementApi {
    #[instrument(skip(self))]
    async fn auth_check(&self) -> Result<AuthStatus, ApiError> {
        let response = self.get("account/auth-check").send().await.map_err(transport)?;
        let status = response.status();

        // Rejections still carry an `{ ok: false }` body
        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        debug!(%status, ok = body.ok, "Auth check answered");
        Ok(body.into())
    }

    #[instrument(skip(self, document), fields(name = %document.name))]
    async fn page_count(&self, document: &UploadedFile) -> Result<PageCount, ApiError> {
        let response = self
            .post("pdf/page-count-native")
            .multipart(Self::document_form(document)?)
            .send()
            .await
            .map_err(transport)?;
        Self::handle_response(response).await
    }

    #[instrument(skip(self, document), fields(name = %document.name))]
    async fn render_page(
        &self,
        document: &UploadedFile,
        page: u32,
    ) -> Result<Option<Vec<u8>>, ApiError> {
        let form = Self::document_form(document)?.text("page", page.to_string());
        let response = self
            .post("pdf/pdf-to-image")
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            debug!(page, status = %response.status(), "Preview render refused");
            return Ok(None);
        }

        let bytes = response.bytes().await.map_err(transport)?;
        Ok(Some(bytes.to_vec()))
    }

    #[instrument(skip(self, request), fields(name = %request.document.name, pages = %request.pages))]
    async fn extract(&self, request: &ExtractionRequest) -> Result<StatementData, ApiError> {
        let form = Self::document_form(&request.document)?.text("pages", request.pages.clone());
        let response = self
            .post("pdf/extract-text")
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status().as_u16();

        let body: Value = Self::handle_response(response).await?;
        if body.get("transactions").is_none() {
            if let Some(message) = body.get("error").and_then(Value::as_str) {
                return Err(ApiError::Rejected {
                    status,
                    message: Some(message.to_string()),
                });
            }
        }
        serde_json::from_value(body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn user_transactions(&self) -> Result<Vec<Transaction>, ApiError> {
        let response = self.get("transactions").send().await.map_err(transport)?;
        let body: TransactionsResponse = Self::handle_response(response).await?;
        Ok(body.data.transactions)
    }
}
