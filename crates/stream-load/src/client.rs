//! HTTP stream load client.
//!
//! Each delivery is one `PUT /api/<db>/<table>/_stream_load` carrying the
//! whole batch. Frontends redirect the request to a backend with `307`; the
//! redirect is followed by hand so the body and credentials are re-sent.

use crate::config::{LoadFormat, StreamLoadConfig};
use crate::error::{StreamLoadError, StreamLoadResult};
use async_trait::async_trait;
use batch_sink::{DeliveryClient, DeliveryError, DeliveryResult};
use reqwest::header::{EXPECT, LOCATION};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Load statuses that mean the batch is (or will be) visible.
const STATUS_SUCCESS: &str = "Success";
const STATUS_PUBLISH_TIMEOUT: &str = "Publish Timeout";
/// The same label was loaded before: the batch is already in the table.
const STATUS_LABEL_EXISTS: &str = "Label Already Exists";

/// Body returned by the stream load endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadResponse {
    #[serde(rename = "TxnId", default)]
    pub txn_id: Option<i64>,
    #[serde(rename = "Label", default)]
    pub label: Option<String>,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
    #[serde(rename = "NumberTotalRows", default)]
    pub number_total_rows: Option<u64>,
    #[serde(rename = "NumberLoadedRows", default)]
    pub number_loaded_rows: Option<u64>,
    #[serde(rename = "NumberFilteredRows", default)]
    pub number_filtered_rows: Option<u64>,
    #[serde(rename = "LoadTimeMs", default)]
    pub load_time_ms: Option<u64>,
    #[serde(rename = "ErrorURL", default)]
    pub error_url: Option<String>,
}

impl LoadResponse {
    /// Whether the batch is in the table (or will be once published).
    pub fn is_loaded(&self) -> bool {
        matches!(
            self.status.as_str(),
            STATUS_SUCCESS | STATUS_PUBLISH_TIMEOUT | STATUS_LABEL_EXISTS
        )
    }
}

/// Delivery client writing batches through HTTP stream load.
pub struct StreamLoadClient {
    config: StreamLoadConfig,
    client: Client,
    next_node: AtomicUsize,
}

impl StreamLoadClient {
    /// Create a client. Fails if required settings are missing.
    pub fn new(config: StreamLoadConfig) -> StreamLoadResult<Self> {
        config.validate_required()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(StreamLoadError::Client)?;

        Ok(Self {
            config,
            client,
            next_node: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &StreamLoadConfig {
        &self.config
    }

    /// Load URL on `node`.
    pub fn load_url(&self, node: &str) -> String {
        let base = if node.starts_with("http://") || node.starts_with("https://") {
            node.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", node)
        };
        format!(
            "{}/api/{}/{}/_stream_load",
            base, self.config.database, self.config.table
        )
    }

    fn new_label(&self) -> String {
        format!("{}_{}", self.config.label_prefix, uuid::Uuid::new_v4())
    }

    /// Load `payload` under a fresh label, trying nodes round-robin.
    ///
    /// Nodes that refuse the connection are skipped. Any other outcome from
    /// a node, success or failure, ends the attempt. A timeout ends it too:
    /// the load may still be running under this label, and a second node
    /// would answer "Label Already Exists" before it finished.
    pub async fn load(&self, payload: &str) -> StreamLoadResult<LoadResponse> {
        let label = self.new_label();
        let nodes = &self.config.fe_nodes;
        let start = self.next_node.fetch_add(1, Ordering::Relaxed) % nodes.len();

        for i in 0..nodes.len() {
            let node = &nodes[(start + i) % nodes.len()];
            match self.load_via(node, payload, &label).await {
                Err(e @ StreamLoadError::Connect { .. }) => {
                    warn!(node = %node, error = %e, "Stream load node unreachable, trying next");
                }
                other => return other,
            }
        }

        Err(StreamLoadError::NoReachableNode(nodes.join(", ")))
    }

    async fn load_via(
        &self,
        node: &str,
        payload: &str,
        label: &str,
    ) -> StreamLoadResult<LoadResponse> {
        let mut url = self.load_url(node);

        for hop in 0..=self.config.max_redirects {
            debug!(url = %url, label = %label, bytes = payload.len(), hop, "Sending stream load");

            let response = self
                .request(&url, payload, label)
                .send()
                .await
                .map_err(|e| self.transport_error(&url, e))?;

            let status = response.status();
            if status == StatusCode::TEMPORARY_REDIRECT || status == StatusCode::PERMANENT_REDIRECT {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| StreamLoadError::Protocol {
                        endpoint: url.clone(),
                        message: format!("{} without Location header", status),
                    })?;
                debug!(from = %url, to = %location, "Following stream load redirect");
                url = location.to_string();
                continue;
            }

            return self.interpret(&url, label, response).await;
        }

        Err(StreamLoadError::TooManyRedirects {
            endpoint: url,
            limit: self.config.max_redirects,
        })
    }

    fn request(&self, url: &str, payload: &str, label: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .put(url)
            .basic_auth(&self.config.user, Some(&self.config.password))
            .header(EXPECT, "100-continue")
            .header("label", label)
            .header("format", self.config.format.to_string());

        match self.config.format {
            LoadFormat::Csv => {
                if let Some(separator) = &self.config.column_separator {
                    request = request.header("column_separator", separator);
                }
            }
            LoadFormat::Json => {
                request = request.header("read_json_by_line", "true");
            }
        }

        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }

        request.body(payload.to_string())
    }

    fn transport_error(&self, url: &str, err: reqwest::Error) -> StreamLoadError {
        if err.is_timeout() {
            StreamLoadError::Timeout {
                endpoint: url.to_string(),
                secs: self.config.timeout_secs,
            }
        } else if err.is_connect() {
            StreamLoadError::Connect {
                endpoint: url.to_string(),
                source: err,
            }
        } else {
            StreamLoadError::Protocol {
                endpoint: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    async fn interpret(
        &self,
        url: &str,
        label: &str,
        response: reqwest::Response,
    ) -> StreamLoadResult<LoadResponse> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        if !status.is_success() {
            return Err(StreamLoadError::Status {
                endpoint: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let load: LoadResponse =
            serde_json::from_str(&body).map_err(|e| StreamLoadError::Protocol {
                endpoint: url.to_string(),
                message: format!("invalid load response ({}): {}", e, body),
            })?;

        if !load.is_loaded() {
            let mut message = load.message.clone().unwrap_or_default();
            if let Some(error_url) = &load.error_url {
                message = format!("{} (details: {})", message, error_url);
            }
            return Err(StreamLoadError::Load {
                endpoint: url.to_string(),
                status: load.status,
                message,
            });
        }

        if load.status == STATUS_LABEL_EXISTS {
            info!(label = %label, "Batch already loaded under this label");
        }
        Ok(load)
    }
}

#[async_trait]
impl DeliveryClient for StreamLoadClient {
    async fn deliver(&self, payload: &str) -> DeliveryResult<()> {
        let load = self.load(payload).await.map_err(DeliveryError::from)?;
        info!(
            label = load.label.as_deref().unwrap_or_default(),
            status = %load.status,
            loaded_rows = load.number_loaded_rows.unwrap_or_default(),
            filtered_rows = load.number_filtered_rows.unwrap_or_default(),
            load_time_ms = load.load_time_ms.unwrap_or_default(),
            "Stream load finished"
        );
        Ok(())
    }
}
