//! HTTP client for the queue backend
//!
//! Every business rule lives behind these endpoints; this module only maps
//! requests and replies to typed values and HTTP failures to [`ApiError`].

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::model::{BoardStatus, CallOutcome, NewPatient, Patient, PatientStatus};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Token rejected or expired; it must be discarded
    #[error("not authorized, log in again")]
    Unauthorized,
    #[error("no API token configured (set QUEUE_API_TOKEN or run `login`)")]
    MissingToken,
    #[error("server returned {code}: {message}")]
    Status { code: u16, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(String),
}

#[derive(Deserialize)]
struct TokenReply {
    token: String,
}

#[derive(Deserialize)]
struct PatientLoginReply {
    #[serde(rename = "patientId")]
    patient_id: String,
}

pub struct QueueClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl QueueClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
            token: config.api_token.clone(),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let token = self.token.as_deref().ok_or(ApiError::MissingToken)?;
        Ok(self.request(method, path).bearer_auth(token))
    }

    /// Send and return the body of a successful reply
    async fn execute(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("Backend replied {} ({} bytes)", status, body.len());

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                code: status.as_u16(),
                message: error_message(&body)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
            });
        }

        Ok(body)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let body = self.execute(request).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// `GET /api/visor/status` (public)
    pub async fn board_status(&self) -> Result<BoardStatus, ApiError> {
        self.fetch(self.request(Method::GET, "/api/visor/status")).await
    }

    /// Exchange attendant credentials for a bearer token
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let request = self
            .request(Method::POST, "/api/auth/login")
            .json(&json!({ "username": username, "password": password }));
        let reply: TokenReply = self.fetch(request).await?;
        Ok(reply.token)
    }

    pub async fn list_queue(&self) -> Result<Vec<Patient>, ApiError> {
        self.fetch(self.authed(Method::GET, "/api/fila")?).await
    }

    pub async fn list_history(&self) -> Result<Vec<Patient>, ApiError> {
        self.fetch(self.authed(Method::GET, "/api/historico")?).await
    }

    pub async fn register_patient(&self, patient: &NewPatient) -> Result<(), ApiError> {
        let request = self.authed(Method::POST, "/api/pacientes")?.json(patient);
        self.execute(request).await.map(|_| ())
    }

    /// Ask the backend to call `id`; it may call someone else (see [`CallOutcome`])
    pub async fn call_patient(&self, id: &str) -> Result<CallOutcome, ApiError> {
        let path = format!("/api/pacientes/{}/chamar", urlencoding::encode(id));
        self.fetch(self.authed(Method::PUT, &path)?).await
    }

    pub async fn finish_patient(&self, id: &str) -> Result<(), ApiError> {
        let path = format!("/api/pacientes/{}/finalizar", urlencoding::encode(id));
        self.execute(self.authed(Method::PUT, &path)?).await.map(|_| ())
    }

    /// Look up today's active ticket for a CPF; returns the patient id
    pub async fn patient_login(&self, cpf: &str) -> Result<String, ApiError> {
        let request = self
            .request(Method::POST, "/api/paciente/login")
            .json(&json!({ "cpf": cpf }));
        let reply: PatientLoginReply = self.fetch(request).await?;
        Ok(reply.patient_id)
    }

    pub async fn patient_status(&self, patient_id: &str) -> Result<PatientStatus, ApiError> {
        let request = self
            .request(Method::GET, "/api/paciente/status")
            .query(&[("id", patient_id)]);
        self.fetch(request).await
    }
}

/// Pull a human message out of an error body (`error`, `msg` or `message`)
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error", "msg", "message"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}
