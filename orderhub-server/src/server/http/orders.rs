//! 注文API（HTTP入口層の中心）:
//! - 役割: バッチ受付・個別参照・ステータス更新・負荷試験をここに集約する。
//! - 位置: `server/http/mod.rs` から呼ばれる入口ハンドラ群。
//! - 前段ゲート: Idempotencyゲート → 形状検証 → 本処理、の順で短絡する。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::warn;

use crate::order::OrderStatus;
use crate::stress::StressConfig;
use crate::validate::{self, ValidationError};

use super::AppState;

type ApiResponse = (StatusCode, Json<Value>);

/// バッチ投入（POST /api/orders/batch）
/// - Idempotencyゲート → 形状検証 → パイプライン → キャッシュプライム
/// - キー検証通過後に確定したレスポンスは成功・エラーを問わずキーに紐付けて凍結する
pub(super) async fn handle_batch_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResponse {
    let key = match require_idempotency_key(&headers) {
        Ok(key) => key,
        Err(response) => return response,
    };

    // 再送なら凍結済みレスポンスをそのまま複製し、パイプラインへは入らない
    if let Some((status_code, cached)) = state.idempotency_cache.get(&key) {
        let status =
            StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, Json(cached));
    }

    let (status, response_body) = process_batch(&state, &body);

    // 成功もエラーも同じ経路で凍結する。再送は同じ失敗を見る。
    state
        .idempotency_cache
        .set(&key, response_body.clone(), status.as_u16());

    (status, Json(response_body))
}

/// Idempotencyゲート
///
/// ヘッダ欠落と形式不正はこの場で400を返し、以降の処理へ進ませない。
/// どちらのエラーもキーに紐付かないためキャッシュはしない。
fn require_idempotency_key(headers: &HeaderMap) -> Result<String, ApiResponse> {
    let raw = match headers.get("Idempotency-Key") {
        Some(value) => value.to_str().unwrap_or("").trim(),
        None => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "message": "Idempotency-Key header is required",
                    "error": "Missing required header: Idempotency-Key",
                })),
            ));
        }
    };

    if !validate::validate_idempotency_key(raw) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": validate::ERR_IDEMPOTENCY_KEY_FORMAT })),
        ));
    }

    Ok(raw.to_string())
}

/// 形状検証からパイプライン実行までの本処理
fn process_batch(state: &AppState, body: &Value) -> (StatusCode, Value) {
    let orders = match validate::validate_orders_input(body) {
        Ok(orders) => orders,
        Err(ValidationError::PayloadTooLarge) => {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                json!({ "message": validate::ERR_TOO_MANY_ORDERS }),
            );
        }
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                json!({ "message": err.message() }),
            );
        }
    };

    match state.pipeline.run(&orders, None, state.config.batch_size) {
        Ok(outcome) => {
            // cache-after-batch: 投入直後の初回読み取りをHITにする
            for incoming in &orders {
                if let Some(stored) = state.store.find_by_id(&incoming.id) {
                    state.order_cache.set(&incoming.id, stored);
                }
            }

            let body = json!({
                "success": outcome.total_failed == 0,
                "total": orders.len(),
                "processed": outcome.total_processed,
                "failed": outcome.total_failed,
                "batches": outcome.batch_results.len(),
                "batchResults": outcome.batch_results,
            });
            (StatusCode::CREATED, body)
        }
        Err(err) => {
            warn!(error = %err, "batch pipeline failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "message": "Batch processing failed",
                    "error": err.message(),
                }),
            )
        }
    }
}

/// 注文参照（GET /api/orders/{id}）
/// - キャッシュ優先。HITなら X-Cache/X-Cache-Age を付け、MISSならストアから
///   読んでプライムする。
pub(super) async fn handle_get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    if !validate::validate_order_id(&id) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": validate::ERR_ORDER_ID_FORMAT })),
        )
            .into_response();
    }

    if let Some(entry) = state.order_cache.get(&id) {
        let age = entry.age_seconds().to_string();
        return (
            [("x-cache", "HIT".to_string()), ("x-cache-age", age)],
            Json(entry.order),
        )
            .into_response();
    }

    match state.store.find_by_id(&id) {
        Some(order) => {
            state.order_cache.set(&id, order.clone());
            ([("x-cache", "MISS")], Json(order)).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Not found" })),
        )
            .into_response(),
    }
}

/// ステータス更新（PUT /api/orders/{id}/status）
/// - ストア更新 → invalidate → 再プライム → status_changed イベント発行。
///   invalidate→プライムの順序は、更新済みストアに対して古いキャッシュを
///   読ませないための措置。
pub(super) async fn handle_update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResponse {
    if !validate::validate_order_id(&id) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": validate::ERR_ORDER_ID_FORMAT })),
        );
    }

    let status = body
        .get("status")
        .and_then(Value::as_str)
        .and_then(OrderStatus::parse);
    let Some(status) = status else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": validate::ERR_STATUS_VALUE })),
        );
    };

    match state.store.update_status(&id, status) {
        Some(updated) => {
            state.order_cache.invalidate(&id);
            state.order_cache.set(&id, updated.clone());
            state.bus.publish_status_changed(updated.clone());

            match serde_json::to_value(&updated) {
                Ok(body) => (StatusCode::OK, Json(body)),
                Err(err) => {
                    warn!(error = %err, "order serialization failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "message": "Internal error" })),
                    )
                }
            }
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Not found" })),
        ),
    }
}

/// 負荷試験（POST /api/orders/stress-test）
/// - 設定検証後、ブロッキングプールで本番パイプラインを回す。
///   ボディ省略時は全デフォルトで実行する。
pub(super) async fn handle_stress_test(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Response {
    let config: StressConfig =
        match validate::validate_stress_config(body.as_ref().map(|Json(v)| v)) {
            Ok(config) => config,
            Err(err) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "message": err.message() })),
                )
                    .into_response();
            }
        };

    // 1万件クラスの合成投入はランタイムを塞がないようブロッキング実行へ逃がす
    let harness = Arc::clone(&state.stress);
    match tokio::task::spawn_blocking(move || harness.run(&config)).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => {
            warn!(error = %err, "stress test task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "Stress test failed" })),
            )
                .into_response()
        }
    }
}
