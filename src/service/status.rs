//! バックエンドのステータスコード (gRPC のコード番号) と OpenFeature エラーの対応。
//!
//! HTTP API もエラーボディに gRPC のコード番号を載せて返すため、両トランスポートで共有する。

use open_feature::EvaluationError;

use crate::error::{flag_not_found, general, invalid_context, provider_not_ready};

pub const CODE_INVALID_ARGUMENT: i32 = 3;
pub const CODE_NOT_FOUND: i32 = 5;
pub const CODE_UNAVAILABLE: i32 = 14;

pub fn status_to_resolution_error(code: i32, message: impl Into<String>) -> EvaluationError {
    match code {
        CODE_NOT_FOUND => flag_not_found(message),
        CODE_INVALID_ARGUMENT => invalid_context(message),
        CODE_UNAVAILABLE => provider_not_ready(message),
        _ => general(message),
    }
}
