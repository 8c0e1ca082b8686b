mod body;
mod http;

pub use body::{FormPart, FormPayload, RequestBody};
pub use http::ReqwestTransport;

use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use url::Url;

/// One fully-resolved HTTP exchange as handed to the network.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

#[derive(Debug, Clone)]
pub struct InboundResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl InboundResponse {
    pub fn declares_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
    }
}

/// Network seam of the request core.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn execute(&self, request: OutboundRequest) -> Result<InboundResponse, TransportError>;
}
