//! 型ごとの評価結果デコード。
//!
//! `match == true` のレスポンスを各型の ResolutionDetail に変換する。
//! 判定の流れ（フラグ取得・無効判定・不一致）は provider 側で共通化している。

use open_feature::{EvaluationReason, StructValue, Value};
use serde_json::{Map, Value as JsonValue};

use crate::config::DisabledBooleanPolicy;
use crate::detail::ResolutionDetail;
use crate::error::type_mismatch;
use crate::flag::EvaluationResponse;

/// Default は SDK 経由の評価 (デフォルト値を受け取らない) で使う。
pub trait FlagValue: Clone + Default + Send + Sync + Sized + 'static {
    /// ログ出力用の型名。
    const KIND: &'static str;

    /// マッチしたレスポンスを型付きの結果に変換する。失敗時は default_value を返す。
    fn from_match(response: &EvaluationResponse, default_value: Self) -> ResolutionDetail<Self>;

    /// 無効化されたフラグの値。boolean 以外はポリシーに関わらず default_value。
    fn when_disabled(default_value: Self, _policy: DisabledBooleanPolicy) -> Self {
        default_value
    }
}

impl FlagValue for bool {
    const KIND: &'static str = "boolean";

    fn from_match(response: &EvaluationResponse, default_value: Self) -> ResolutionDetail<Self> {
        // 値を持たないマッチは true とみなす
        if response.value.is_empty() {
            return ResolutionDetail::new(true, EvaluationReason::Default);
        }
        match parse_bool(&response.value) {
            Some(v) => ResolutionDetail::new(v, EvaluationReason::TargetingMatch),
            None => ResolutionDetail::fallback(
                default_value,
                EvaluationReason::Default,
                type_mismatch("value is not a boolean"),
            ),
        }
    }

    fn when_disabled(default_value: Self, policy: DisabledBooleanPolicy) -> Self {
        match policy {
            DisabledBooleanPolicy::ReturnDefault => default_value,
            DisabledBooleanPolicy::ReturnFalse => false,
        }
    }
}

impl FlagValue for String {
    const KIND: &'static str = "string";

    fn from_match(response: &EvaluationResponse, _default_value: Self) -> ResolutionDetail<Self> {
        ResolutionDetail::new(response.value.clone(), EvaluationReason::TargetingMatch)
    }
}

impl FlagValue for i64 {
    const KIND: &'static str = "integer";

    fn from_match(response: &EvaluationResponse, default_value: Self) -> ResolutionDetail<Self> {
        match response.value.parse::<i64>() {
            Ok(v) => ResolutionDetail::new(v, EvaluationReason::TargetingMatch),
            Err(_) => ResolutionDetail::fallback(
                default_value,
                EvaluationReason::Error,
                type_mismatch("value is not an integer"),
            ),
        }
    }
}

impl FlagValue for f64 {
    const KIND: &'static str = "float";

    fn from_match(response: &EvaluationResponse, default_value: Self) -> ResolutionDetail<Self> {
        match response.value.parse::<f64>() {
            Ok(v) => ResolutionDetail::new(v, EvaluationReason::TargetingMatch),
            Err(_) => ResolutionDetail::fallback(
                default_value,
                EvaluationReason::Error,
                type_mismatch("value is not a float"),
            ),
        }
    }
}

impl FlagValue for StructValue {
    const KIND: &'static str = "object";

    fn from_match(response: &EvaluationResponse, default_value: Self) -> ResolutionDetail<Self> {
        if response.attachment.is_empty() {
            return ResolutionDetail::new(default_value, EvaluationReason::Default)
                .with_variant(response.value.clone());
        }
        match serde_json::from_str::<JsonValue>(&response.attachment) {
            Ok(JsonValue::Object(map)) => {
                ResolutionDetail::new(to_struct_value(map), EvaluationReason::TargetingMatch)
                    .with_variant(response.value.clone())
            }
            _ => ResolutionDetail::fallback(
                default_value,
                EvaluationReason::Error,
                type_mismatch(format!(
                    "value is not an object: {:?}",
                    response.attachment
                )),
            ),
        }
    }
}

/// JSON オブジェクトを StructValue に変換する。null は対応する値が無いため落とす。
pub fn to_struct_value(map: Map<String, JsonValue>) -> StructValue {
    StructValue {
        fields: map
            .into_iter()
            .filter_map(|(k, v)| to_value(v).map(|v| (k, v)))
            .collect(),
    }
}

fn to_value(json: JsonValue) -> Option<Value> {
    match json {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(Value::Bool(b)),
        // 整数として表せる数値は Int、それ以外は Float
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float)),
        JsonValue::String(s) => Some(Value::String(s)),
        JsonValue::Array(items) => Some(Value::Array(
            items.into_iter().filter_map(to_value).collect(),
        )),
        JsonValue::Object(map) => Some(Value::Struct(to_struct_value(map))),
    }
}

/// 真偽値リテラルを解釈する。`1` / `t` / `TRUE` なども受け付ける。
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use open_feature::EvaluationErrorCode;

    fn matched(value: &str, attachment: &str) -> EvaluationResponse {
        EvaluationResponse {
            matched: true,
            value: value.to_string(),
            attachment: attachment.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_bool_empty_value_is_implicit_true_with_default_reason() {
        let detail = bool::from_match(&matched("", ""), false);
        assert!(detail.value);
        assert_eq!(detail.reason, EvaluationReason::Default);
        assert!(detail.error.is_none());
    }

    #[test]
    fn test_bool_literals() {
        for (raw, want) in [("1", true), ("T", true), ("True", true), ("0", false), ("F", false)] {
            let detail = bool::from_match(&matched(raw, ""), !want);
            assert_eq!(detail.value, want, "literal {raw}");
            assert_eq!(detail.reason, EvaluationReason::TargetingMatch);
        }
    }

    #[test]
    fn test_bool_mismatch_uses_default_reason() {
        let detail = bool::from_match(&matched("abcd", ""), true);
        assert!(detail.value);
        assert_eq!(detail.reason, EvaluationReason::Default);
        let error = detail.error.unwrap();
        assert_eq!(error.code, EvaluationErrorCode::TypeMismatch);
        assert_eq!(error.message.as_deref(), Some("value is not a boolean"));
    }

    #[test]
    fn test_int_mismatch_uses_error_reason() {
        let detail = i64::from_match(&matched("not-an-int", ""), 1);
        assert_eq!(detail.value, 1);
        assert_eq!(detail.reason, EvaluationReason::Error);
        assert_eq!(
            detail.error.map(|e| e.code),
            Some(EvaluationErrorCode::TypeMismatch)
        );
    }

    #[test]
    fn test_float_parses_decimal() {
        let detail = f64::from_match(&matched("2.0", ""), 1.0);
        assert_eq!(detail.value, 2.0);
        assert_eq!(detail.reason, EvaluationReason::TargetingMatch);
    }

    #[test]
    fn test_object_without_attachment_returns_default_with_variant() {
        let mut default_value = StructValue::default();
        default_value
            .fields
            .insert("foo".to_string(), Value::String("default".to_string()));

        let detail = StructValue::from_match(&matched("variant-a", ""), default_value.clone());
        assert_eq!(detail.value, default_value);
        assert_eq!(detail.reason, EvaluationReason::Default);
        assert_eq!(detail.variant.as_deref(), Some("variant-a"));
    }

    #[test]
    fn test_object_attachment_is_converted_to_struct_value() {
        let detail = StructValue::from_match(
            &matched(
                "v",
                r#"{"name":"dark","size":3,"ratio":0.5,"tags":["a"],"nested":{"on":true},"gone":null}"#,
            ),
            StructValue::default(),
        );
        assert_eq!(detail.reason, EvaluationReason::TargetingMatch);
        let fields = &detail.value.fields;
        assert_eq!(fields.get("name"), Some(&Value::String("dark".to_string())));
        assert_eq!(fields.get("size"), Some(&Value::Int(3)));
        assert_eq!(fields.get("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(
            fields.get("tags"),
            Some(&Value::Array(vec![Value::String("a".to_string())]))
        );
        match fields.get("nested") {
            Some(Value::Struct(nested)) => {
                assert_eq!(nested.fields.get("on"), Some(&Value::Bool(true)))
            }
            other => panic!("unexpected nested value: {other:?}"),
        }
        assert!(!fields.contains_key("gone"));
    }

    #[test]
    fn test_object_rejects_non_object_json() {
        let detail = StructValue::from_match(&matched("v", "[1,2]"), StructValue::default());
        assert!(detail.value.fields.is_empty());
        assert_eq!(detail.reason, EvaluationReason::Error);
        assert_eq!(
            detail.error.map(|e| e.code),
            Some(EvaluationErrorCode::TypeMismatch)
        );
    }
}
