use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::models::{ClassLabel, PendingDocument, PlanningSlot, RawNote, UserId};
use crate::session::SessionStore;

/// Remote data endpoints consumed by the dashboard.
pub trait PortalApi: Send + Sync {
    fn student_planning(
        &self,
        student: &UserId,
    ) -> impl Future<Output = anyhow::Result<Vec<PlanningSlot>>> + Send;

    fn teacher_planning(
        &self,
        teacher: &UserId,
    ) -> impl Future<Output = anyhow::Result<Vec<PlanningSlot>>> + Send;

    fn all_planning(&self) -> impl Future<Output = anyhow::Result<Vec<PlanningSlot>>> + Send;

    fn student_notes(
        &self,
        student: &UserId,
    ) -> impl Future<Output = anyhow::Result<Vec<RawNote>>> + Send;

    fn classes(&self) -> impl Future<Output = anyhow::Result<Vec<ClassLabel>>> + Send;

    fn pending_documents(
        &self,
    ) -> impl Future<Output = anyhow::Result<Vec<PendingDocument>>> + Send;
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

pub fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("build http client")
}

#[derive(Clone)]
pub struct HttpPortalApi {
    client: reqwest::Client,
    base_url: String,
    session: Option<SessionStore>,
}

impl HttpPortalApi {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session: None,
        }
    }

    /// Sends the session's credential token, when there is one, as a bearer token.
    pub fn with_session(mut self, session: SessionStore) -> Self {
        self.session = Some(session);
        self
    }

    async fn get_json<T>(&self, path: &str) -> anyhow::Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if let Some(token) = self.session.as_ref().and_then(|session| session.get().token) {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| format!("API error ({})", status.as_u16()));
            anyhow::bail!("{message}");
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(T::default());
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("decode GET {url}"))
    }
}

impl PortalApi for HttpPortalApi {
    async fn student_planning(&self, student: &UserId) -> anyhow::Result<Vec<PlanningSlot>> {
        self.get_json(&format!("/planning/student/{student}")).await
    }

    async fn teacher_planning(&self, teacher: &UserId) -> anyhow::Result<Vec<PlanningSlot>> {
        self.get_json(&format!("/planning/teacher/{teacher}")).await
    }

    async fn all_planning(&self) -> anyhow::Result<Vec<PlanningSlot>> {
        self.get_json("/planning").await
    }

    async fn student_notes(&self, student: &UserId) -> anyhow::Result<Vec<RawNote>> {
        self.get_json(&format!("/notes/student/{student}")).await
    }

    async fn classes(&self) -> anyhow::Result<Vec<ClassLabel>> {
        self.get_json("/classes").await
    }

    async fn pending_documents(&self) -> anyhow::Result<Vec<PendingDocument>> {
        self.get_json("/documents/pending").await
    }
}
