use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ProviderConfig;
use crate::error::{flag_not_found, provider_not_ready, ConfigError, ServiceError};
use crate::flag::{EvaluationRequest, EvaluationResponse, Flag};
use crate::propagation::Propagator;
use crate::service::status::{status_to_resolution_error, CODE_NOT_FOUND};
use crate::service::{FlagService, RequestHeaders};

const APPLICATION_JSON: &str = "application/json";

/// Flipt REST API のエラーボディ。`code` は gRPC のコード番号。
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    error: String,
    message: String,
    code: i32,
}

impl ErrorBody {
    fn message(&self) -> &str {
        if self.message.is_empty() {
            &self.error
        } else {
            &self.message
        }
    }
}

/// Flipt REST API (`/api/v1/namespaces/...`) を呼び出す FlagService 実装。
///
/// reqwest::Client は最初の呼び出し時に一度だけ生成する。
/// `unix://` アドレスの場合は全リクエストをそのソケットへ送る。
pub struct HttpFlagService {
    base_url: Url,
    socket_path: Option<PathBuf>,
    timeout: Duration,
    certificate_path: Option<PathBuf>,
    headers: RequestHeaders,
    client: OnceCell<reqwest::Client>,
}

impl HttpFlagService {
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let base_url = config.http_base_url()?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::Validation(format!(
                "address {:?} cannot be used as a base URL",
                config.address()
            )));
        }
        Ok(Self {
            base_url,
            socket_path: config.unix_socket_path().map(PathBuf::from),
            timeout: config.timeout,
            certificate_path: config.certificate_path.clone(),
            headers: RequestHeaders::new(config.client_token.clone()),
            client: OnceCell::new(),
        })
    }

    /// トレースコンテキストの注入方法を差し替える。
    pub fn with_propagator(mut self, propagator: Arc<dyn Propagator>) -> Self {
        self.headers.set_propagator(propagator);
        self
    }

    /// 生成済みの reqwest::Client を使う。
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = OnceCell::new_with(Some(client));
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn instance(&self) -> Result<&reqwest::Client, ServiceError> {
        self.client
            .get_or_try_init(|| async { self.build_client() })
            .await
    }

    fn build_client(&self) -> Result<reqwest::Client, ServiceError> {
        debug!(base_url = %self.base_url, socket = ?self.socket_path, "building http client");
        let mut builder = reqwest::Client::builder().timeout(self.timeout);
        if let Some(path) = &self.socket_path {
            builder = builder.unix_socket(path.clone());
        }
        if let Some(path) = &self.certificate_path {
            let pem = std::fs::read(path).map_err(|e| {
                provider_not_ready(format!(
                    "failed to load certificate {}: {e}",
                    path.display()
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| provider_not_ready(format!("invalid certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        builder
            .build()
            .map_err(|e| provider_not_ready(e.to_string()).into())
    }

    /// トークンとトレースコンテキストのヘッダーを付ける。
    fn decorate(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in self.headers.collect() {
            request = request.header(name, value);
        }
        request
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `reqwest::Error` を ServiceError へ変換する。接続不可は PROVIDER_NOT_READY とする。
    fn map_request_error(e: reqwest::Error) -> ServiceError {
        if e.is_connect() {
            provider_not_ready(e.to_string()).into()
        } else {
            ServiceError::Connection(e.to_string())
        }
    }

    async fn decode<T: DeserializeOwned>(
        resp: reqwest::Response,
        namespace: &str,
        flag_key: &str,
        op: &str,
    ) -> Result<T, ServiceError> {
        let status = resp.status();
        let is_json = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with(APPLICATION_JSON));
        let body = resp.bytes().await.map_err(Self::map_request_error)?;

        if status.is_success() {
            return serde_json::from_slice(&body).map_err(|e| {
                ServiceError::InvalidResponse(format!("{op}: decode response: {e}"))
            });
        }

        if is_json {
            if let Ok(err_body) = serde_json::from_slice::<ErrorBody>(&body) {
                if err_body.code == CODE_NOT_FOUND {
                    return Err(flag_not_found(format!(
                        "flag \"{namespace}/{flag_key}\" not found"
                    ))
                    .into());
                }
                if err_body.code != 0 {
                    return Err(status_to_resolution_error(err_body.code, err_body.message()).into());
                }
            }
        }

        // エンドポイント自体が存在しない（アドレス設定誤り）などはここに来る
        Err(ServiceError::UnexpectedStatus {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).trim().to_string(),
        })
    }
}

#[async_trait]
impl FlagService for HttpFlagService {
    #[instrument(skip(self), fields(transport = "http"))]
    async fn get_flag(&self, namespace: &str, flag_key: &str) -> Result<Flag, ServiceError> {
        let url = self.url(&["api", "v1", "namespaces", namespace, "flags", flag_key]);
        let client = self.instance().await?;
        let resp = self
            .decorate(client.get(url))
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .header(ACCEPT, APPLICATION_JSON)
            .send()
            .await
            .map_err(Self::map_request_error)?;
        Self::decode(resp, namespace, flag_key, "get_flag").await
    }

    #[instrument(skip(self, context), fields(transport = "http"))]
    async fn evaluate(
        &self,
        namespace: &str,
        flag_key: &str,
        context: &HashMap<String, String>,
    ) -> Result<EvaluationResponse, ServiceError> {
        let body = EvaluationRequest::build(namespace, flag_key, context)?;
        let url = self.url(&["api", "v1", "namespaces", namespace, "evaluate"]);
        let client = self.instance().await?;
        let resp = self
            .decorate(client.post(url))
            .header(ACCEPT, APPLICATION_JSON)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_request_error)?;
        Self::decode(resp, namespace, flag_key, "evaluate").await
    }
}
