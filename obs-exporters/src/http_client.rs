use std::sync::Arc;
use std::time::Duration;

use hyper::body::to_bytes;
use hyper::client::HttpConnector;
use hyper::header::{CONTENT_TYPE, HeaderMap};
use hyper::{Body, Client, Request, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use tokio::time::timeout;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::traits::{ExporterError, ExporterResult};

pub(crate) type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

#[allow(clippy::unnecessary_wraps)]
pub(crate) fn build_https_client() -> ExporterResult<HyperClient> {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));

    Ok(Client::builder().build::<_, Body>(connector))
}

pub(crate) async fn post_payload(
    client: &HyperClient,
    endpoint: &Uri,
    headers: &HeaderMap,
    content_type: &'static str,
    body: Vec<u8>,
    deadline: Duration,
) -> ExporterResult<()> {
    let mut builder = Request::post(endpoint.clone()).header(CONTENT_TYPE, content_type);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    let request = builder
        .body(Body::from(body))
        .map_err(|err| ExporterError::transport(format!("failed to build request: {err}")))?;

    let response = timeout(deadline, client.request(request))
        .await
        .map_err(|_| ExporterError::transport(format!("request to {endpoint} timed out")))?
        .map_err(|err| ExporterError::transport(format!("request to {endpoint} failed: {err}")))?;

    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let bytes = to_bytes(response.into_body()).await.map_err(|err| {
        ExporterError::transport(format!("failed to read response from {endpoint}: {err}"))
    })?;
    Err(ExporterError::Response {
        status: status.as_u16(),
        reason: String::from_utf8_lossy(&bytes).to_string(),
    })
}
