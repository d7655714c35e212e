use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_HTTP_ADDRESS: &str = "http://localhost:8080";
pub const DEFAULT_GRPC_ADDRESS: &str = "localhost:9000";
pub const UNIX_SCHEME: &str = "unix://";
/// Unix ドメインソケット経由の HTTP で使うベース URL。Host ヘッダーにもこの値が入る。
const UNIX_HTTP_BASE_URL: &str = "http://unix";
const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// 接続先トランスポートの種別。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    #[default]
    Http,
    Https,
    Grpc,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Http => "http",
            ServiceType::Https => "https",
            ServiceType::Grpc => "grpc",
        }
    }

    pub fn default_address(&self) -> &'static str {
        match self {
            ServiceType::Http | ServiceType::Https => DEFAULT_HTTP_ADDRESS,
            ServiceType::Grpc => DEFAULT_GRPC_ADDRESS,
        }
    }
}

/// 無効化された boolean フラグの返却値。
///
/// 旧版のプロバイダーは無効フラグに対して常に false を返していた。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledBooleanPolicy {
    #[default]
    ReturnDefault,
    ReturnFalse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub service_type: ServiceType,
    /// 未設定時は service_type ごとの既定アドレスを使う。`address()` で解決する。
    pub address: Option<String>,
    /// gRPC / HTTPS で使う CA 証明書 (PEM)。
    pub certificate_path: Option<PathBuf>,
    /// `authorization: Bearer <token>` として両トランスポートで送るクライアントトークン。
    pub client_token: Option<String>,
    /// 固定の名前空間。設定時はフラグキーを分解しない。
    pub namespace: Option<String>,
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    pub disabled_boolean: DisabledBooleanPolicy,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(ServiceType::Http)
    }
}

impl ProviderConfig {
    pub fn new(service_type: ServiceType) -> Self {
        Self {
            service_type,
            address: None,
            certificate_path: None,
            client_token: None,
            namespace: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            disabled_boolean: DisabledBooleanPolicy::default(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_client_token(mut self, token: impl Into<String>) -> Self {
        self.client_token = Some(token.into());
        self
    }

    /// 接続先アドレス。未設定なら service_type の既定値。
    pub fn address(&self) -> &str {
        self.address
            .as_deref()
            .unwrap_or(self.service_type.default_address())
            .trim()
    }

    /// `unix://` アドレスならソケットのパスを返す。
    pub fn unix_socket_path(&self) -> Option<&str> {
        self.address().strip_prefix(UNIX_SCHEME)
    }

    pub fn with_certificate_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.certificate_path = Some(path.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_disabled_boolean(mut self, policy: DisabledBooleanPolicy) -> Self {
        self.disabled_boolean = policy;
        self
    }

    /// YAML ファイルから設定を読み込み、バリデーションする。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config: ProviderConfig = serde_yaml::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address().is_empty() {
            return Err(ConfigError::Validation("address must not be empty".into()));
        }
        if matches!(self.unix_socket_path(), Some(path) if path.is_empty()) {
            return Err(ConfigError::Validation(
                "unix socket path must not be empty".into(),
            ));
        }
        if matches!(&self.client_token, Some(token) if token.is_empty()) {
            return Err(ConfigError::Validation(
                "client_token must not be empty when set".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Validation("timeout_ms must be > 0".into()));
        }
        if matches!(&self.namespace, Some(ns) if ns.is_empty()) {
            return Err(ConfigError::Validation(
                "namespace must not be empty when set".into(),
            ));
        }

        let scheme = self.address().split_once("://").map(|(scheme, _)| scheme);
        match (self.service_type, scheme) {
            (_, None) => Ok(()),
            (_, Some("http" | "https" | "unix")) => Ok(()),
            (service_type, Some(scheme)) => Err(ConfigError::Validation(format!(
                "scheme {scheme:?} is not supported by the {} service",
                service_type.as_str()
            ))),
        }
    }

    /// HTTP トランスポート用のベース URL。スキーム省略時は service_type から補う。
    ///
    /// `unix://` の場合はソケットが接続先を決めるため固定の `http://unix` を返す。
    pub fn http_base_url(&self) -> Result<url::Url, ConfigError> {
        let address = self.address().trim_end_matches('/');
        let raw = if self.unix_socket_path().is_some() {
            UNIX_HTTP_BASE_URL.to_string()
        } else if address.contains("://") {
            address.to_string()
        } else {
            let scheme = match self.service_type {
                ServiceType::Https => "https",
                _ => "http",
            };
            format!("{scheme}://{address}")
        };
        url::Url::parse(&raw)
            .map_err(|e| ConfigError::Validation(format!("invalid address {raw:?}: {e}")))
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
