use std::sync::Arc;

use async_trait::async_trait;
use open_feature::provider::{FeatureProvider, ProviderMetadata, ResolutionDetails};
use open_feature::{EvaluationContext, EvaluationError, EvaluationReason, StructValue};
use tracing::{debug, warn};

use crate::config::{DisabledBooleanPolicy, ProviderConfig, ServiceType};
use crate::context::{flatten, targeting_key};
use crate::detail::ResolutionDetail;
use crate::error::{error_code_str, flag_not_found, targeting_key_missing, ConfigError};
use crate::flag::split_flag_key;
#[cfg(feature = "grpc")]
use crate::service::GrpcFlagService;
use crate::service::{FlagService, HttpFlagService};
use crate::value::FlagValue;

pub const PROVIDER_NAME: &str = "flipt-provider";

/// Flipt をバックエンドとするプロバイダー。
///
/// フラグ取得 → 無効判定 → 評価 → 型変換の順に処理し、どの段階で失敗しても
/// デフォルト値と理由・エラーを持つ ResolutionDetail を返す。
pub struct FliptProvider {
    service: Arc<dyn FlagService>,
    namespace: Option<String>,
    disabled_boolean: DisabledBooleanPolicy,
    metadata: ProviderMetadata,
}

impl FliptProvider {
    /// 設定からトランスポートを選択して構築する。接続は最初の評価時に行う。
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let service: Arc<dyn FlagService> = match config.service_type {
            ServiceType::Http | ServiceType::Https => Arc::new(HttpFlagService::new(&config)?),
            #[cfg(feature = "grpc")]
            ServiceType::Grpc => Arc::new(GrpcFlagService::new(&config)),
            #[cfg(not(feature = "grpc"))]
            ServiceType::Grpc => {
                return Err(ConfigError::Validation(
                    "grpc service type requires the \"grpc\" feature".into(),
                ))
            }
        };
        debug!(
            service_type = config.service_type.as_str(),
            address = config.address(),
            "flipt provider configured"
        );
        Ok(Self {
            service,
            namespace: config.namespace,
            disabled_boolean: config.disabled_boolean,
            metadata: ProviderMetadata::new(PROVIDER_NAME),
        })
    }

    /// 任意の FlagService 実装で構築する。
    pub fn with_service(service: Arc<dyn FlagService>) -> Self {
        Self {
            service,
            namespace: None,
            disabled_boolean: DisabledBooleanPolicy::default(),
            metadata: ProviderMetadata::new(PROVIDER_NAME),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_disabled_boolean(mut self, policy: DisabledBooleanPolicy) -> Self {
        self.disabled_boolean = policy;
        self
    }

    /// 固定の名前空間があればキー全体をそのまま使う。
    fn resolve_key<'a>(&'a self, flag_key: &'a str) -> (&'a str, &'a str) {
        match &self.namespace {
            Some(namespace) => (namespace.as_str(), flag_key),
            None => split_flag_key(flag_key),
        }
    }

    /// フラグを評価する。どの段階で失敗してもデフォルト値を持つ結果を返す。
    ///
    /// OpenFeature SDK 経由の呼び出し (`resolve_*_value`) はデフォルト値を渡さないため
    /// `T::default()` でこのメソッドを呼ぶ。
    pub async fn evaluate<T: FlagValue>(
        &self,
        flag_key: &str,
        default_value: T,
        context: &EvaluationContext,
    ) -> ResolutionDetail<T> {
        let (namespace, key) = self.resolve_key(flag_key);
        if key.is_empty() {
            return fallback(
                flag_key,
                default_value,
                flag_not_found(format!("flag key {flag_key:?} is empty")),
            );
        }

        if targeting_key(context).is_none() {
            return fallback(
                flag_key,
                default_value,
                targeting_key_missing("targetingKey is missing"),
            );
        }

        let flag = match self.service.get_flag(namespace, key).await {
            Ok(flag) => flag,
            Err(e) => return fallback(flag_key, default_value, e.into()),
        };

        if !flag.enabled {
            debug!(flag_key, kind = T::KIND, "flag is disabled");
            return ResolutionDetail::new(
                T::when_disabled(default_value, self.disabled_boolean),
                EvaluationReason::Disabled,
            );
        }

        let response = match self
            .service
            .evaluate(namespace, key, &flatten(context))
            .await
        {
            Ok(response) => response,
            Err(e) => return fallback(flag_key, default_value, e.into()),
        };

        if !response.matched {
            debug!(flag_key, kind = T::KIND, "no segment matched");
            return ResolutionDetail::new(default_value, EvaluationReason::Default);
        }

        let detail = T::from_match(&response, default_value);
        match &detail.error {
            Some(error) => warn!(
                flag_key,
                kind = T::KIND,
                code = error_code_str(&error.code),
                error = error.message.as_deref().unwrap_or_default(),
                "matched value could not be decoded"
            ),
            None => debug!(
                flag_key,
                kind = T::KIND,
                reason = ?detail.reason,
                segment_key = %response.segment_key,
                "flag resolved"
            ),
        }
        detail
    }

    async fn resolve<T: FlagValue>(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<T>, EvaluationError> {
        self.evaluate(flag_key, T::default(), context)
            .await
            .into_result()
    }
}

fn fallback<T>(flag_key: &str, default_value: T, error: EvaluationError) -> ResolutionDetail<T> {
    warn!(
        flag_key,
        code = error_code_str(&error.code),
        error = error.message.as_deref().unwrap_or_default(),
        "falling back to default value"
    );
    ResolutionDetail::fallback(default_value, EvaluationReason::Default, error)
}

#[async_trait]
impl FeatureProvider for FliptProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn resolve_bool_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<bool>, EvaluationError> {
        self.resolve(flag_key, context).await
    }

    async fn resolve_int_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<i64>, EvaluationError> {
        self.resolve(flag_key, context).await
    }

    async fn resolve_float_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<f64>, EvaluationError> {
        self.resolve(flag_key, context).await
    }

    async fn resolve_string_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<String>, EvaluationError> {
        self.resolve(flag_key, context).await
    }

    async fn resolve_struct_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<StructValue>, EvaluationError> {
        self.resolve(flag_key, context).await
    }
}
