//! Access log schema produced by request-forwarding proxies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::log_record::ErrorDetails;
use crate::signal::LogLevel;

/// Request and response headers captured for an access log entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogHeaders {
    /// Headers received from the client.
    pub request: BTreeMap<String, String>,
    /// Headers returned to the client.
    pub response: BTreeMap<String, String>,
}

/// One proxied request, as emitted by an edge proxy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogEntry {
    /// Unique identifier for the request.
    pub request_id: String,
    /// When the request was received.
    pub timestamp: DateTime<Utc>,
    /// HTTP method.
    pub method: String,
    /// Full URL requested by the client.
    pub original_url: String,
    /// URL the request was forwarded to.
    pub target_url: String,
    /// Address of the requester.
    pub client_ip: String,
    /// User agent string.
    pub user_agent: String,
    /// Origin header value.
    pub origin: String,
    /// Start of processing, milliseconds since the Unix epoch.
    pub request_start_time: i64,
    /// End of processing, milliseconds since the Unix epoch.
    pub request_end_time: i64,
    /// `request_end_time - request_start_time`.
    pub processing_duration_ms: i64,
    /// Request body size in bytes.
    pub request_body_size: u64,
    /// Response body size in bytes.
    pub response_body_size: u64,
    /// Response status code.
    pub status_code: u16,
    /// Response content type, `unknown` when absent.
    pub response_content_type: String,
    /// Failure information when forwarding failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
    /// Whether the origin passed the allow list.
    pub is_allowed_origin: bool,
    /// Whether the request was forwarded upstream.
    pub routed_through_proxy: bool,
    /// Captured headers.
    pub headers: AccessLogHeaders,
}

impl AccessLogEntry {
    /// Starts an entry for an incoming request, stamping a fresh request id
    /// and the current time.
    #[must_use]
    pub fn start(method: impl Into<String>, original_url: impl Into<String>) -> Self {
        let now = Utc::now();
        let start_ms = now.timestamp_millis();
        Self {
            request_id: Uuid::new_v4().to_string(),
            timestamp: now,
            method: method.into(),
            original_url: original_url.into(),
            target_url: String::new(),
            client_ip: String::new(),
            user_agent: String::new(),
            origin: String::new(),
            request_start_time: start_ms,
            request_end_time: start_ms,
            processing_duration_ms: 0,
            request_body_size: 0,
            response_body_size: 0,
            status_code: 0,
            response_content_type: "unknown".to_owned(),
            error: None,
            is_allowed_origin: false,
            routed_through_proxy: false,
            headers: AccessLogHeaders::default(),
        }
    }

    /// Records the upstream URL the request is routed to.
    #[must_use]
    pub fn with_target_url(mut self, target_url: impl Into<String>) -> Self {
        self.target_url = target_url.into();
        self.routed_through_proxy = true;
        self
    }

    /// Records client identity information.
    #[must_use]
    pub fn with_client(
        mut self,
        client_ip: impl Into<String>,
        user_agent: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        self.client_ip = client_ip.into();
        self.user_agent = user_agent.into();
        self.origin = origin.into();
        self
    }

    /// Records whether the origin passed the allow list.
    #[must_use]
    pub fn with_allowed_origin(mut self, allowed: bool) -> Self {
        self.is_allowed_origin = allowed;
        self
    }

    /// Records the request body size.
    #[must_use]
    pub fn with_request_body_size(mut self, bytes: u64) -> Self {
        self.request_body_size = bytes;
        self
    }

    /// Records request and response headers.
    #[must_use]
    pub fn with_headers(mut self, headers: AccessLogHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Completes the entry with response details and the end timestamp.
    #[must_use]
    pub fn finish(
        mut self,
        status_code: u16,
        content_type: Option<&str>,
        response_body_size: u64,
    ) -> Self {
        self.stamp_end();
        self.status_code = status_code;
        self.response_content_type = content_type.unwrap_or("unknown").to_owned();
        self.response_body_size = response_body_size;
        self
    }

    /// Completes the entry as a failed request (status 500).
    #[must_use]
    pub fn fail(mut self, error: ErrorDetails) -> Self {
        self.stamp_end();
        self.status_code = 500;
        self.error = Some(error);
        self
    }

    /// Severity the entry should be logged at.
    #[must_use]
    pub fn severity(&self) -> LogLevel {
        if self.error.is_some() || self.status_code >= 500 {
            LogLevel::Error
        } else {
            LogLevel::Info
        }
    }

    fn stamp_end(&mut self) {
        self.request_end_time = Utc::now().timestamp_millis().max(self.request_start_time);
        self.processing_duration_ms = self.request_end_time - self.request_start_time;
    }
}
