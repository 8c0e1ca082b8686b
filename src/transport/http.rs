use super::{HttpTransport, InboundResponse, OutboundRequest, RequestBody};
use crate::config::ClientConfig;
use crate::error::{RelayError, TransportError};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// `HttpTransport` over a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(cfg: &ClientConfig) -> Result<Self, RelayError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .timeout(Duration::from_secs(cfg.request_timeout_secs));
        if let Some(proxy_url) = cfg.proxy.as_ref() {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: OutboundRequest) -> Result<InboundResponse, TransportError> {
        let OutboundRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.client.request(method, url).headers(headers);
        builder = match body {
            None => builder,
            Some(RequestBody::Json(value)) => {
                let bytes = serde_json::to_vec(&value)
                    .map_err(|e| TransportError::Body(e.to_string()))?;
                builder.body(bytes)
            }
            Some(RequestBody::Text(text)) => builder.body(text),
            Some(RequestBody::Form(form)) => builder.multipart(form.to_multipart()?),
        };

        let resp = builder.send().await?;
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().await?.to_vec();

        Ok(InboundResponse {
            status,
            content_type,
            body,
        })
    }
}
