//! [`TrainingBackend`] over the Hypha HTTP service API.
//!
//! Every service function is exposed at
//! `POST {server_url}/{workspace}/services/{service_id}/{function}` and takes
//! its keyword arguments as a JSON object.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bioimage_training::{
    ConnectionInfo, ExportResult, SessionId, StartResponse, StartTrainingParams, StatusPayload,
    TrainingBackend,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::error::HyphaError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct HyphaClient {
    http: reqwest::Client,
    connection: ConnectionInfo,
}

impl HyphaClient {
    pub fn new(connection: ConnectionInfo) -> Result<Self, HyphaError> {
        Self::with_timeout(connection, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(connection: ConnectionInfo, timeout: Duration) -> Result<Self, HyphaError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bioimage-hypha/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(HyphaError::Client)?;
        Ok(Self { http, connection })
    }

    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    pub fn function_url(&self, function: &str) -> String {
        format!("{}/{function}", self.connection.service_url())
    }

    /// Call a service function with keyword arguments and decode its result.
    pub async fn call<A, R>(&self, function: &str, kwargs: &A) -> Result<R, HyphaError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.function_url(function);
        debug!(url = %url, "Calling Hypha service function");

        let mut request = self.http.post(&url).json(kwargs);
        if let Some(token) = &self.connection.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|source| HyphaError::Request {
            function: function.to_string(),
            source,
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| HyphaError::Request {
            function: function.to_string(),
            source,
        })?;
        trace!(function, %status, body = %body, "Hypha response");

        if !status.is_success() {
            return Err(HyphaError::Status {
                function: function.to_string(),
                status,
                body: remote_detail(&body).unwrap_or(body),
            });
        }

        let value: Value = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).map_err(|source| HyphaError::Decode {
                function: function.to_string(),
                source,
            })?
        };
        if let Some(detail) = remote_failure(&value) {
            return Err(HyphaError::Remote {
                function: function.to_string(),
                detail,
            });
        }

        serde_json::from_value(value).map_err(|source| HyphaError::Decode {
            function: function.to_string(),
            source,
        })
    }
}

/// `{"success": false, "detail": ...}` is how the service reports an
/// exception raised inside a function.
fn remote_failure(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    if object.get("success")?.as_bool()? {
        return None;
    }
    Some(
        object
            .get("detail")
            .map(detail_text)
            .unwrap_or_else(|| "unknown error".to_string()),
    )
}

fn remote_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("detail").map(detail_text)
}

fn detail_text(detail: &Value) -> String {
    match detail {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl TrainingBackend for HyphaClient {
    async fn start_training(&self, params: &StartTrainingParams) -> Result<StartResponse> {
        Ok(self.call("start_training", params).await?)
    }

    async fn get_training_status(&self, session_id: &SessionId) -> Result<StatusPayload> {
        Ok(self
            .call("get_training_status", &json!({ "session_id": session_id }))
            .await?)
    }

    async fn stop_training(&self, session_id: &SessionId) -> Result<()> {
        let _: Value = self
            .call("stop_training", &json!({ "session_id": session_id }))
            .await?;
        Ok(())
    }

    async fn export_model(
        &self,
        session_id: &SessionId,
        model_name: Option<&str>,
    ) -> Result<ExportResult> {
        let mut kwargs = json!({ "session_id": session_id });
        if let Some(name) = model_name {
            kwargs["model_name"] = json!(name);
        }
        Ok(self.call("export_model", &kwargs).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_urls_follow_the_service_layout() {
        let client = HyphaClient::new(ConnectionInfo {
            server_url: "https://hypha.example.org".into(),
            workspace: "lab".into(),
            service_id: "trainer".into(),
            token: None,
        })
        .unwrap();
        assert_eq!(
            client.function_url("get_training_status"),
            "https://hypha.example.org/lab/services/trainer/get_training_status"
        );
    }

    #[test]
    fn failure_envelopes_are_detected() {
        assert_eq!(
            remote_failure(&json!({"success": false, "detail": "session not found"})),
            Some("session not found".to_string())
        );
        assert_eq!(
            remote_failure(&json!({"success": false})),
            Some("unknown error".to_string())
        );
        assert_eq!(remote_failure(&json!({"success": true})), None);
        assert_eq!(remote_failure(&json!({"status_type": "running"})), None);
        assert_eq!(remote_failure(&Value::Null), None);
    }

    #[test]
    fn error_bodies_prefer_the_detail_field() {
        assert_eq!(
            remote_detail(r#"{"detail":{"code":7}}"#),
            Some(r#"{"code":7}"#.to_string())
        );
        assert_eq!(remote_detail("Bad Gateway"), None);
    }
}
