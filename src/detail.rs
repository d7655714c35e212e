use open_feature::provider::ResolutionDetails;
use open_feature::{EvaluationError, EvaluationReason};

/// フラグ評価の結果。値は常に利用可能で、失敗時はデフォルト値が入る。
#[derive(Debug, Clone)]
pub struct ResolutionDetail<T> {
    pub value: T,
    pub reason: EvaluationReason,
    pub error: Option<EvaluationError>,
    pub variant: Option<String>,
}

impl<T> ResolutionDetail<T> {
    pub fn new(value: T, reason: EvaluationReason) -> Self {
        Self {
            value,
            reason,
            error: None,
            variant: None,
        }
    }

    /// デフォルト値とエラーを組み合わせた結果を返す。
    pub fn fallback(default_value: T, reason: EvaluationReason, error: EvaluationError) -> Self {
        Self {
            value: default_value,
            reason,
            error: Some(error),
            variant: None,
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// OpenFeature SDK の戻り値に変換する。エラーがあれば値は捨てて Err を返す。
    pub fn into_result(self) -> Result<ResolutionDetails<T>, EvaluationError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(ResolutionDetails {
                value: self.value,
                variant: self.variant,
                reason: Some(self.reason),
                flag_metadata: None,
            }),
        }
    }
}
