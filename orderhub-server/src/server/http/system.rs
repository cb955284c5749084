//! 運用API（観測の入口）:
//! - 役割: 稼働確認とプロセスの生の数字を取得する。
//! - 位置: 運用監視のための読み取り専用パス。
//! - 内包: health / memory / performance の3エンドポイント。

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use orderhub_core::now_millis;

use crate::mem;

use super::AppState;

/// ヘルスチェック（GET /api/system/health）
pub(super) async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": now_millis(),
    }))
}

/// プロセスメモリ（GET /api/system/memory）
/// - バイト単位の生値を返す
pub(super) async fn handle_memory() -> Json<mem::MemorySnapshot> {
    Json(mem::snapshot())
}

/// パフォーマンス統計（GET /api/system/performance）
/// - 計測ミドルウェアが積んだ件数/合計から平均応答時間を算出して返す
pub(super) async fn handle_performance(State(state): State<AppState>) -> Json<Value> {
    let stats = state.request_latency.snapshot();
    let avg_response_ms = stats.mean_millis_rounded();

    Json(json!({
        "latencyMs": avg_response_ms,
        "systemHealth": 100,
        "requestsPerSecond": 0,
        "requestCount": stats.count,
        "avgResponseTimeMs": avg_response_ms,
        "uptime_s": state.started_at.elapsed().as_secs(),
        "memoryUsage": mem::snapshot().to_megabytes(),
        "timestamp": now_millis(),
    }))
}
