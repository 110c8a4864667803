use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{BackendError, ClinicBackend, Credentials};
use crate::models::{
    AppointmentPatch, ClinicalHistory, HistoryPatch, Id, PatientAppointments,
};

/// reqwest-backed client for the clinic REST API.
#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
    bearer: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            bearer: None,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.bearer {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value, BackendError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn get_value(&self, path: &str) -> Result<Value, BackendError> {
        self.send(self.request(reqwest::Method::GET, path)).await
    }

    async fn patch_json<T: serde::Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), BackendError> {
        self.send(self.request(reqwest::Method::PATCH, path).json(body))
            .await
            .map(|_| ())
    }
}

/// Strips the optional `{data: ...}` wrapper some endpoints add.
fn unwrap_data(v: Value) -> Value {
    match v {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn decode<T: DeserializeOwned + Default>(v: Value) -> Result<T, BackendError> {
    match unwrap_data(v) {
        Value::Null => Ok(T::default()),
        v => serde_json::from_value(v).map_err(|e| BackendError::Decode(e.to_string())),
    }
}

#[async_trait]
impl ClinicBackend for HttpBackend {
    fn with_credentials(&self, creds: &Credentials) -> Arc<dyn ClinicBackend> {
        let mut scoped = self.clone();
        if creds.bearer.is_some() {
            scoped.bearer = creds.bearer.clone();
        }
        Arc::new(scoped)
    }

    async fn history_by_patient(&self, patient_id: Id) -> Result<ClinicalHistory, BackendError> {
        decode(self.get_value(&format!("/histories/patient/{patient_id}")).await?)
    }

    async fn history_by_id(&self, history_id: Id) -> Result<ClinicalHistory, BackendError> {
        decode(self.get_value(&format!("/histories/{history_id}")).await?)
    }

    async fn patch_history(&self, history_id: Id, payload: &HistoryPatch) -> Result<(), BackendError> {
        self.patch_json(&format!("/histories/{history_id}"), payload).await
    }

    async fn patch_history_by_patient(
        &self,
        patient_id: Id,
        payload: &HistoryPatch,
    ) -> Result<(), BackendError> {
        self.patch_json(&format!("/histories/patient/{patient_id}"), payload)
            .await
    }

    async fn appointments_by_patient(&self, patient_id: Id) -> Result<PatientAppointments, BackendError> {
        decode(self.get_value(&format!("/appointments/patient/{patient_id}")).await?)
    }

    async fn patch_appointment(
        &self,
        appointment_id: Id,
        payload: &AppointmentPatch,
    ) -> Result<(), BackendError> {
        self.patch_json(&format!("/appointments/{appointment_id}"), payload)
            .await
    }

    async fn therapists(&self, page: u32, page_size: u32) -> Result<Value, BackendError> {
        let builder = self
            .request(reqwest::Method::GET, "/therapists")
            .query(&[("page", page), ("per_page", page_size)]);
        self.send(builder).await
    }

    async fn search_therapists(
        &self,
        term: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Value, BackendError> {
        let builder = self
            .request(reqwest::Method::GET, "/therapists/search")
            .query(&[("term", term)])
            .query(&[("page", page), ("per_page", page_size)]);
        self.send(builder).await
    }
}
