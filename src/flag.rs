use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::context::{REQUEST_ID_KEY, TARGETING_KEY};
use open_feature::EvaluationError;

use crate::error::targeting_key_missing;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Flipt 上のフラグ。評価ごとに取得する。
///
/// `key` は必須。フラグ以外のボディ (一覧レスポンスなど) をフラグとして読まないため。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub namespace_key: String,
}

/// Flipt の評価リクエスト。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    pub request_id: String,
    pub flag_key: String,
    pub entity_id: String,
    pub context: HashMap<String, String>,
    pub namespace_key: String,
}

impl EvaluationRequest {
    /// フラット化したコンテキストからリクエストを組み立てる。
    ///
    /// ターゲティングキーが無い場合はネットワーク呼び出し前にエラーを返す。
    /// `requestID` はコンテキストから取り除き request_id に載せる。
    pub fn build(
        namespace: &str,
        flag_key: &str,
        context: &HashMap<String, String>,
    ) -> Result<Self, EvaluationError> {
        let entity_id = context
            .get(TARGETING_KEY)
            .filter(|k| !k.is_empty())
            .cloned()
            .ok_or_else(|| targeting_key_missing("targetingKey is missing"))?;

        let mut context = context.clone();
        let request_id = context.remove(REQUEST_ID_KEY).unwrap_or_default();

        Ok(Self {
            request_id,
            flag_key: flag_key.to_string(),
            entity_id,
            context,
            namespace_key: namespace.to_string(),
        })
    }
}

/// Flipt の評価結果。protojson はゼロ値のフィールドを省略するため全て default を持つ。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvaluationResponse {
    pub request_id: String,
    pub entity_id: String,
    #[serde(rename = "match")]
    pub matched: bool,
    pub flag_key: String,
    pub segment_key: String,
    pub value: String,
    pub attachment: String,
    pub namespace_key: String,
}

/// `namespace/key` 形式のフラグキーを分解する。
///
/// 最初の `/` で区切り、名前空間が無い（または空の）場合は `default` を使う。
pub fn split_flag_key(flag_key: &str) -> (&str, &str) {
    match flag_key.split_once('/') {
        Some(("", key)) => (DEFAULT_NAMESPACE, key),
        Some((namespace, key)) => (namespace, key),
        None => (DEFAULT_NAMESPACE, flag_key),
    }
}
