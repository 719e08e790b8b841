// ABOUTME: WebMethod step: one HTTP request with the payload as body
// ABOUTME: Response decoding follows the effective content type

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Doer, StepBase};
use crate::engine::error::{EngineError, Result};
use crate::engine::{Executor, HttpClientFactory as _};
use crate::model::{Flow, FlowData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
}

impl HttpMethod {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }

    fn sends_body(self) -> bool {
        matches!(self, HttpMethod::Put | HttpMethod::Post)
    }
}

/// Issues one HTTP request and replaces the payload with the response body.
/// PUT and POST send the current payload as the request body. A non-200
/// response is a step error carrying the status and body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebMethodStep {
    #[serde(flatten)]
    pub base: StepBase,
    pub method: HttpMethod,
    pub url: String,
}

impl WebMethodStep {
    pub fn validate(&self) -> Vec<EngineError> {
        // reqwest::Url rejects relative URLs, which covers the absolute check
        if let Err(e) = reqwest::Url::parse(&self.url) {
            return vec![EngineError::InvalidStep {
                step_id: self.base.id.clone(),
                reason: format!("'{}' is not an absolute URL: {}", self.url, e),
            }];
        }
        Vec::new()
    }

    fn request_body(&self, flow: &Flow) -> Result<Option<Vec<u8>>> {
        if !self.method.sends_body() {
            return Ok(None);
        }
        match &flow.data {
            FlowData::Empty => Ok(None),
            FlowData::Text(s) => Ok(Some(s.clone().into_bytes())),
            FlowData::Bytes(b) => Ok(Some(b.clone())),
            FlowData::Json(v) => serde_json::to_vec(v)
                .map(Some)
                .map_err(|e| EngineError::StepFailed(format!("unable to encode body: {}", e))),
        }
    }
}

#[async_trait]
impl Doer for WebMethodStep {
    async fn run(&self, exec: &Executor, flow: &mut Flow) -> Result<()> {
        let client = exec.http_client_factory().http_client(false);

        let mut request = client.request(self.method.as_reqwest(), &self.url);
        if let Some(body) = self.request_body(flow)? {
            request = request.body(body);
        }
        if let Some(content_type) = flow.content_type.as_deref() {
            if !content_type.is_empty() {
                request = request.header(reqwest::header::CONTENT_TYPE, content_type);
            }
        }

        debug!("calling web url {:?} {}", self.method, self.url);
        let response = tokio::select! {
            _ = exec.cancellation().cancelled() => return Err(EngineError::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        let response_content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        if status.as_u16() != 200 {
            return Err(EngineError::StepFailed(format!(
                "{}: {}",
                status,
                String::from_utf8_lossy(&body)
            )));
        }

        if flow.content_type.as_deref().unwrap_or("").is_empty() {
            flow.content_type = response_content_type;
        }

        let effective = flow
            .content_type
            .as_deref()
            .unwrap_or("")
            .to_ascii_lowercase();
        flow.data = if effective.starts_with("text/") {
            FlowData::Text(String::from_utf8_lossy(&body).into_owned())
        } else if effective.starts_with("application/json") {
            let value = serde_json::from_slice(&body).map_err(|e| {
                EngineError::StepFailed(format!("response body is not valid JSON: {}", e))
            })?;
            FlowData::Json(value)
        } else {
            FlowData::Bytes(body.to_vec())
        };

        debug!("web step {} received {} bytes", self.base.id, body.len());
        Ok(())
    }
}
