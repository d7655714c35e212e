//! W3C Trace Context の伝播。
//!
//! 呼び出し元は `with_trace_context` で評価をくるむと、その中で行われる
//! Flipt 呼び出しに `traceparent` ヘッダー (gRPC ではメタデータ) が付く。

use std::collections::HashMap;
use std::future::Future;

pub const TRACEPARENT_HEADER: &str = "traceparent";

#[derive(Debug, Clone, PartialEq)]
pub struct TraceContext {
    pub trace_id: String,
    pub parent_id: String,
    pub flags: u8,
}

impl TraceContext {
    pub fn new(trace_id: &str, parent_id: &str, flags: u8) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            parent_id: parent_id.to_string(),
            flags,
        }
    }

    pub fn to_traceparent(&self) -> String {
        format!("00-{}-{}-{:02x}", self.trace_id, self.parent_id, self.flags)
    }

    /// `00-<trace_id>-<parent_id>-<flags>` を解釈する。形式が不正なら None。
    pub fn from_traceparent(s: &str) -> Option<TraceContext> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 4 || parts[0] != "00" {
            return None;
        }
        let trace_id = parts[1];
        let parent_id = parts[2];
        let flags = u8::from_str_radix(parts[3], 16).ok()?;

        if trace_id.len() != 32 || parent_id.len() != 16 {
            return None;
        }
        if !trace_id.chars().all(|c| c.is_ascii_hexdigit())
            || !parent_id.chars().all(|c| c.is_ascii_hexdigit())
        {
            return None;
        }

        Some(TraceContext::new(trace_id, parent_id, flags))
    }
}

tokio::task_local! {
    static CURRENT: TraceContext;
}

/// `ctx` を現在のトレースコンテキストとして future を実行する。
pub async fn with_trace_context<F: Future>(ctx: TraceContext, future: F) -> F::Output {
    CURRENT.scope(ctx, future).await
}

/// 実行中タスクのトレースコンテキスト。スコープ外なら None。
pub fn current() -> Option<TraceContext> {
    CURRENT.try_with(TraceContext::clone).ok()
}

/// 送信ヘッダーへトレースコンテキストを書き込む。
pub trait Propagator: Send + Sync {
    fn inject(&self, headers: &mut HashMap<String, String>);
}

/// `with_trace_context` で設定されたコンテキストを `traceparent` として注入する。既定の実装。
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskLocalPropagator;

impl Propagator for TaskLocalPropagator {
    fn inject(&self, headers: &mut HashMap<String, String>) {
        if let Some(ctx) = current() {
            headers.insert(TRACEPARENT_HEADER.to_string(), ctx.to_traceparent());
        }
    }
}

/// 何も注入しない。
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPropagator;

impl Propagator for NoopPropagator {
    fn inject(&self, _headers: &mut HashMap<String, String>) {}
}
