//! `flipt.Flipt` サービスのメッセージとクライアント。
//!
//! 使用するフィールドだけを定義している。未定義のタグは prost がデコード時に読み飛ばす。

use std::collections::HashMap;

use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{Ascii, MetadataKey, MetadataValue};
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::Channel;

use crate::service::RequestHeaders;

const GET_FLAG_PATH: &str = "/flipt.Flipt/GetFlag";
const EVALUATE_PATH: &str = "/flipt.Flipt/Evaluate";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetFlagRequest {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub namespace_key: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Flag {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub description: String,
    #[prost(bool, tag = "4")]
    pub enabled: bool,
    #[prost(string, tag = "8")]
    pub namespace_key: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvaluationRequest {
    #[prost(string, tag = "1")]
    pub request_id: String,
    #[prost(string, tag = "2")]
    pub flag_key: String,
    #[prost(string, tag = "3")]
    pub entity_id: String,
    #[prost(map = "string, string", tag = "4")]
    pub context: HashMap<String, String>,
    #[prost(string, tag = "5")]
    pub namespace_key: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvaluationResponse {
    #[prost(string, tag = "1")]
    pub request_id: String,
    #[prost(string, tag = "2")]
    pub entity_id: String,
    #[prost(bool, tag = "4")]
    pub matched: bool,
    #[prost(string, tag = "5")]
    pub flag_key: String,
    #[prost(string, tag = "6")]
    pub segment_key: String,
    #[prost(string, tag = "8")]
    pub value: String,
    #[prost(string, tag = "10")]
    pub attachment: String,
    #[prost(string, tag = "12")]
    pub namespace_key: String,
}

impl From<Flag> for crate::flag::Flag {
    fn from(f: Flag) -> Self {
        Self {
            key: f.key,
            name: f.name,
            description: f.description,
            enabled: f.enabled,
            namespace_key: f.namespace_key,
        }
    }
}

impl From<crate::flag::EvaluationRequest> for EvaluationRequest {
    fn from(r: crate::flag::EvaluationRequest) -> Self {
        Self {
            request_id: r.request_id,
            flag_key: r.flag_key,
            entity_id: r.entity_id,
            context: r.context,
            namespace_key: r.namespace_key,
        }
    }
}

impl From<EvaluationResponse> for crate::flag::EvaluationResponse {
    fn from(r: EvaluationResponse) -> Self {
        Self {
            request_id: r.request_id,
            entity_id: r.entity_id,
            matched: r.matched,
            flag_key: r.flag_key,
            segment_key: r.segment_key,
            value: r.value,
            attachment: r.attachment,
            namespace_key: r.namespace_key,
        }
    }
}

/// 各呼び出しにトークンとトレースコンテキストをメタデータとして付けるインターセプター。
///
/// 呼び出し元のタスク内で実行されるため、タスクローカルのトレースコンテキストを読める。
#[derive(Clone)]
pub struct MetadataInterceptor {
    headers: RequestHeaders,
}

impl MetadataInterceptor {
    pub(crate) fn new(headers: RequestHeaders) -> Self {
        Self { headers }
    }
}

impl Interceptor for MetadataInterceptor {
    fn call(
        &mut self,
        mut request: tonic::Request<()>,
    ) -> Result<tonic::Request<()>, tonic::Status> {
        for (name, value) in self.headers.collect() {
            let key = MetadataKey::<Ascii>::from_bytes(name.as_bytes()).map_err(|_| {
                tonic::Status::internal(format!("invalid metadata key {name:?}"))
            })?;
            let value = value.parse::<MetadataValue<Ascii>>().map_err(|_| {
                tonic::Status::internal(format!("invalid metadata value for {name}"))
            })?;
            request.metadata_mut().insert(key, value);
        }
        Ok(request)
    }
}

/// `flipt.Flipt` の unary クライアント。Channel の clone は安価なので呼び出しごとに複製して使う。
#[derive(Clone)]
pub struct FliptClient {
    inner: tonic::client::Grpc<InterceptedService<Channel, MetadataInterceptor>>,
}

impl FliptClient {
    pub fn new(channel: Channel, interceptor: MetadataInterceptor) -> Self {
        Self {
            inner: tonic::client::Grpc::new(InterceptedService::new(channel, interceptor)),
        }
    }

    pub async fn get_flag(
        &mut self,
        request: GetFlagRequest,
    ) -> Result<tonic::Response<Flag>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        self.inner
            .unary(
                tonic::Request::new(request),
                PathAndQuery::from_static(GET_FLAG_PATH),
                codec,
            )
            .await
    }

    pub async fn evaluate(
        &mut self,
        request: EvaluationRequest,
    ) -> Result<tonic::Response<EvaluationResponse>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        self.inner
            .unary(
                tonic::Request::new(request),
                PathAndQuery::from_static(EVALUATE_PATH),
                codec,
            )
            .await
    }

    async fn ready(&mut self) -> Result<(), tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unavailable(format!("service was not ready: {e}")))
    }
}
