use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::flag::{EvaluationResponse, Flag};
use crate::propagation::{Propagator, TaskLocalPropagator};

#[cfg(feature = "grpc")]
pub mod grpc;
pub mod http;
#[cfg(feature = "grpc")]
mod proto;
pub mod status;

#[cfg(feature = "grpc")]
pub use grpc::GrpcFlagService;
pub use http::HttpFlagService;

pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Flipt のフラグ取得・評価 API。
///
/// `context` はフラット化済みのコンテキストで、`targetingKey` を含む必要がある。
#[async_trait]
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait FlagService: Send + Sync {
    async fn get_flag(&self, namespace: &str, flag_key: &str) -> Result<Flag, ServiceError>;

    async fn evaluate(
        &self,
        namespace: &str,
        flag_key: &str,
        context: &HashMap<String, String>,
    ) -> Result<EvaluationResponse, ServiceError>;
}

/// 全リクエストに付けるヘッダー。トレースコンテキストとクライアントトークン。
#[derive(Clone)]
pub(crate) struct RequestHeaders {
    client_token: Option<String>,
    propagator: Arc<dyn Propagator>,
}

impl RequestHeaders {
    pub(crate) fn new(client_token: Option<String>) -> Self {
        Self {
            client_token,
            propagator: Arc::new(TaskLocalPropagator),
        }
    }

    pub(crate) fn set_propagator(&mut self, propagator: Arc<dyn Propagator>) {
        self.propagator = propagator;
    }

    /// 呼び出し時点のヘッダーを組み立てる。トレースコンテキストは実行中タスクから読む。
    pub(crate) fn collect(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        self.propagator.inject(&mut headers);
        if let Some(token) = &self.client_token {
            headers.insert(AUTHORIZATION_HEADER.to_string(), format!("Bearer {token}"));
        }
        headers
    }
}
