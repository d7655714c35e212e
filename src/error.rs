use open_feature::{EvaluationError, EvaluationErrorCode};
use thiserror::Error;

/// OpenFeature のエラーコードを文字列表現に変換する。ログ出力と Display に使う。
pub fn error_code_str(code: &EvaluationErrorCode) -> &'static str {
    match code {
        EvaluationErrorCode::ProviderNotReady => "PROVIDER_NOT_READY",
        EvaluationErrorCode::FlagNotFound => "FLAG_NOT_FOUND",
        EvaluationErrorCode::ParseError => "PARSE_ERROR",
        EvaluationErrorCode::TypeMismatch => "TYPE_MISMATCH",
        EvaluationErrorCode::TargetingKeyMissing => "TARGETING_KEY_MISSING",
        EvaluationErrorCode::InvalidContext => "INVALID_CONTEXT",
        EvaluationErrorCode::General(_) => "GENERAL",
    }
}

/// `CODE: message` 形式の説明文を返す。
pub fn describe(err: &EvaluationError) -> String {
    format!(
        "{}: {}",
        error_code_str(&err.code),
        err.message.as_deref().unwrap_or_default()
    )
}

fn evaluation_error(code: EvaluationErrorCode, message: impl Into<String>) -> EvaluationError {
    EvaluationError {
        code,
        message: Some(message.into()),
    }
}

pub fn flag_not_found(message: impl Into<String>) -> EvaluationError {
    evaluation_error(EvaluationErrorCode::FlagNotFound, message)
}

pub fn invalid_context(message: impl Into<String>) -> EvaluationError {
    evaluation_error(EvaluationErrorCode::InvalidContext, message)
}

pub fn targeting_key_missing(message: impl Into<String>) -> EvaluationError {
    evaluation_error(EvaluationErrorCode::TargetingKeyMissing, message)
}

pub fn provider_not_ready(message: impl Into<String>) -> EvaluationError {
    evaluation_error(EvaluationErrorCode::ProviderNotReady, message)
}

pub fn type_mismatch(message: impl Into<String>) -> EvaluationError {
    evaluation_error(EvaluationErrorCode::TypeMismatch, message)
}

/// GENERAL エラー。コードにもメッセージと同じ説明を持たせる。
pub fn general(message: impl Into<String>) -> EvaluationError {
    let message = message.into();
    evaluation_error(EvaluationErrorCode::General(message.clone()), message)
}

/// フラグサービス (HTTP / gRPC) 呼び出しのエラー。
#[derive(Debug, Error)]
pub enum ServiceError {
    /// バックエンドのステータスから分類済みのエラー。そのまま呼び出し元へ渡す。
    #[error("{}", describe(.0))]
    Resolution(EvaluationError),
    #[error("接続エラー: {0}")]
    Connection(String),
    #[error("無効なレスポンス: {0}")]
    InvalidResponse(String),
    #[error("予期しないステータス: status={status} {body}")]
    UnexpectedStatus { status: u16, body: String },
}

impl From<EvaluationError> for ServiceError {
    fn from(err: EvaluationError) -> Self {
        ServiceError::Resolution(err)
    }
}

/// サービスエラーを EvaluationError に分類する。
///
/// 既にエラーコードを持つものはそのまま、それ以外は GENERAL に包む。
pub fn classify_error(err: ServiceError) -> EvaluationError {
    match err {
        ServiceError::Resolution(rerr) => rerr,
        other => general(other.to_string()),
    }
}

impl From<ServiceError> for EvaluationError {
    fn from(err: ServiceError) -> Self {
        classify_error(err)
    }
}

/// プロバイダー構築時の設定エラー。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("validation error: {0}")]
    Validation(String),
}
