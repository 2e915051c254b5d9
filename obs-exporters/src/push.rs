//! HTTP push reader shared by the OTLP and Datadog adapters.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hyper::Uri;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::data::MetricBatch;
use crate::http_client::{HyperClient, build_https_client, post_payload};
use crate::traits::{Delivery, ExporterError, ExporterKind, ExporterResult, MetricReader};

/// Wire format of a push destination.
pub trait PayloadEncoder: Send + Sync + fmt::Debug {
    /// `Content-Type` sent with every request.
    fn content_type(&self) -> &'static str;

    /// Serialises one batch into a request body.
    ///
    /// # Errors
    ///
    /// Returns [`ExporterError::Encoding`] if the batch cannot be represented.
    fn encode(&self, batch: &MetricBatch) -> ExporterResult<Vec<u8>>;
}

/// Reader that POSTs each encoded batch to a remote endpoint.
pub struct HttpPushReader {
    kind: ExporterKind,
    encoder: Box<dyn PayloadEncoder>,
    client: HyperClient,
    endpoint: Uri,
    headers: HeaderMap,
    timeout: Duration,
    closed: AtomicBool,
}

impl fmt::Debug for HttpPushReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPushReader")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("encoder", &self.encoder)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl HttpPushReader {
    /// Creates a reader for `endpoint` that encodes batches with `encoder` and
    /// sends the supplied extra headers.
    ///
    /// # Errors
    ///
    /// Returns [`ExporterError::Configuration`] if the endpoint or a header is
    /// invalid.
    pub fn new<'a, I>(
        kind: ExporterKind,
        encoder: impl PayloadEncoder + 'static,
        endpoint: &str,
        headers: I,
        timeout: Duration,
    ) -> ExporterResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let endpoint = endpoint.parse::<Uri>().map_err(|err| {
            ExporterError::configuration(format!("invalid {kind} endpoint `{endpoint}`: {err}"))
        })?;
        if endpoint.host().is_none() {
            return Err(ExporterError::configuration(format!(
                "{kind} endpoint `{endpoint}` has no host"
            )));
        }

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                ExporterError::configuration(format!("invalid header name `{name}`: {err}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|err| {
                ExporterError::configuration(format!("invalid value for header `{name}`: {err}"))
            })?;
            header_map.insert(header_name, header_value);
        }

        Ok(Self {
            kind,
            encoder: Box::new(encoder),
            client: build_https_client()?,
            endpoint,
            headers: header_map,
            timeout,
            closed: AtomicBool::new(false),
        })
    }

    /// Target endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }
}

#[async_trait]
impl MetricReader for HttpPushReader {
    fn kind(&self) -> ExporterKind {
        self.kind.clone()
    }

    fn delivery(&self) -> Delivery {
        Delivery::Push
    }

    async fn export(&self, batch: &MetricBatch) -> ExporterResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ExporterError::ShutDown { kind: self.kind() });
        }
        if batch.is_empty() {
            return Ok(());
        }

        let body = self.encoder.encode(batch)?;
        debug!(
            exporter = %self.kind,
            endpoint = %self.endpoint,
            bytes = body.len(),
            "pushing metric batch"
        );
        post_payload(
            &self.client,
            &self.endpoint,
            &self.headers,
            self.encoder.content_type(),
            body,
            self.timeout,
        )
        .await
    }

    async fn shutdown(&self) -> ExporterResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
