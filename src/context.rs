//! OpenFeature の EvaluationContext を Flipt の文字列マップへ変換する。

use std::collections::HashMap;

use open_feature::{EvaluationContext, EvaluationContextFieldValue};

/// フラット化したコンテキスト内でターゲティングキーを格納するキー。
pub const TARGETING_KEY: &str = "targetingKey";
/// リクエスト ID を渡すための属性キー。コンテキストには含めず別フィールドで送る。
pub const REQUEST_ID_KEY: &str = "requestID";

/// 空文字を除いたターゲティングキーを返す。
///
/// `targeting_key` が無ければ文字列属性 `targetingKey` を使う。
pub fn targeting_key(context: &EvaluationContext) -> Option<&str> {
    context
        .targeting_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .or_else(|| match context.custom_fields.get(TARGETING_KEY) {
            Some(EvaluationContextFieldValue::String(k)) if !k.is_empty() => Some(k.as_str()),
            _ => None,
        })
}

/// 文字列マップに変換する。ターゲティングキーは `targetingKey` として含める。
///
/// 文字列化できない属性 (日時・構造体) は送らない。
pub fn flatten(context: &EvaluationContext) -> HashMap<String, String> {
    let mut flat: HashMap<String, String> = context
        .custom_fields
        .iter()
        .filter_map(|(k, v)| render(v).map(|v| (k.clone(), v)))
        .collect();
    if let Some(key) = targeting_key(context) {
        flat.insert(TARGETING_KEY.to_string(), key.to_string());
    }
    flat
}

fn render(value: &EvaluationContextFieldValue) -> Option<String> {
    match value {
        EvaluationContextFieldValue::String(s) => Some(s.clone()),
        EvaluationContextFieldValue::Bool(b) => Some(b.to_string()),
        EvaluationContextFieldValue::Int(i) => Some(i.to_string()),
        EvaluationContextFieldValue::Float(f) => Some(f.to_string()),
        _ => None,
    }
}
