use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tokio::sync::OnceCell;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Uri};
use tower::service_fn;
use tracing::{debug, instrument};

use crate::config::{ProviderConfig, UNIX_SCHEME};
use crate::error::{provider_not_ready, ServiceError};
use crate::flag::{EvaluationRequest, EvaluationResponse, Flag};
use crate::propagation::Propagator;
use crate::service::proto::{self, FliptClient, MetadataInterceptor};
use crate::service::status::status_to_resolution_error;
use crate::service::{FlagService, RequestHeaders};

/// UDS 接続時の Endpoint に渡すダミー URI。実際の接続先はコネクタが決める。
const UDS_PLACEHOLDER_URI: &str = "http://[::]:50051";

/// Flipt gRPC API (`flipt.Flipt`) を呼び出す FlagService 実装。
///
/// アドレスは `host:port`、`http(s)://host:port`、`unix:///path/to.sock` を受け付ける。
/// チャネルは最初の呼び出し時に一度だけ接続し、以後は全呼び出しで共有する。
/// 接続に失敗した場合はキャッシュせず、次の呼び出しで再接続する。
pub struct GrpcFlagService {
    address: String,
    certificate_path: Option<PathBuf>,
    timeout: Duration,
    headers: RequestHeaders,
    client: OnceCell<FliptClient>,
}

impl GrpcFlagService {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            address: config.address().to_string(),
            certificate_path: config.certificate_path.clone(),
            timeout: config.timeout,
            headers: RequestHeaders::new(config.client_token.clone()),
            client: OnceCell::new(),
        }
    }

    /// トレースコンテキストの注入方法を差し替える。
    pub fn with_propagator(mut self, propagator: Arc<dyn Propagator>) -> Self {
        self.headers.set_propagator(propagator);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn instance(&self) -> Result<FliptClient, ServiceError> {
        let client = self.client.get_or_try_init(|| self.connect()).await?;
        Ok(client.clone())
    }

    async fn connect(&self) -> Result<FliptClient, ServiceError> {
        debug!(address = %self.address, "connecting grpc channel");
        let channel = match self.address.strip_prefix(UNIX_SCHEME) {
            Some(path) => self.connect_unix(path.to_string()).await?,
            None => self.connect_tcp().await?,
        };
        Ok(FliptClient::new(
            channel,
            MetadataInterceptor::new(self.headers.clone()),
        ))
    }

    async fn connect_tcp(&self) -> Result<Channel, ServiceError> {
        let uri = if self.address.contains("://") {
            self.address.clone()
        } else {
            let scheme = if self.certificate_path.is_some() {
                "https"
            } else {
                "http"
            };
            format!("{scheme}://{}", self.address)
        };

        let mut endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| not_ready(format!("invalid address {uri:?}: {e}")))?
            .timeout(self.timeout)
            .connect_timeout(self.timeout);

        if let Some(path) = &self.certificate_path {
            let pem = std::fs::read(path).map_err(|e| {
                not_ready(format!("failed to load certificate {}: {e}", path.display()))
            })?;
            let tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem));
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|e| not_ready(format!("invalid tls config: {e}")))?;
        }

        endpoint
            .connect()
            .await
            .map_err(|e| not_ready(format!("failed to connect to {uri}: {e}")))
    }

    async fn connect_unix(&self, path: String) -> Result<Channel, ServiceError> {
        let socket = path.clone();
        Endpoint::from_static(UDS_PLACEHOLDER_URI)
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .connect_with_connector(service_fn(move |_: Uri| {
                let socket = socket.clone();
                async move {
                    let stream = UnixStream::connect(socket).await?;
                    Ok::<_, std::io::Error>(TokioIo::new(stream))
                }
            }))
            .await
            .map_err(|e| not_ready(format!("failed to connect to unix socket {path}: {e}")))
    }
}

fn not_ready(message: String) -> ServiceError {
    provider_not_ready(message).into()
}

/// `tonic::Status` をコード番号で分類する。
fn map_status(status: tonic::Status) -> ServiceError {
    status_to_resolution_error(status.code() as i32, status.message()).into()
}

#[async_trait]
impl FlagService for GrpcFlagService {
    #[instrument(skip(self), fields(transport = "grpc"))]
    async fn get_flag(&self, namespace: &str, flag_key: &str) -> Result<Flag, ServiceError> {
        let mut client = self.instance().await?;
        let request = proto::GetFlagRequest {
            key: flag_key.to_string(),
            namespace_key: namespace.to_string(),
        };
        let response = client.get_flag(request).await.map_err(map_status)?;
        Ok(response.into_inner().into())
    }

    #[instrument(skip(self, context), fields(transport = "grpc"))]
    async fn evaluate(
        &self,
        namespace: &str,
        flag_key: &str,
        context: &HashMap<String, String>,
    ) -> Result<EvaluationResponse, ServiceError> {
        let request = EvaluationRequest::build(namespace, flag_key, context)?;
        let mut client = self.instance().await?;
        let response = client
            .evaluate(proto::EvaluationRequest::from(request))
            .await
            .map_err(map_status)?;
        Ok(response.into_inner().into())
    }
}
