//! SSE API（非同期通知の配信口）:
//! - 役割: 注文ライフサイクルイベントをリアルタイム配信する。
//! - 入口: `GET /api/orders/stream`。
//! - 挙動: 接続直後に `: connected` コメントを流し、以降はバスの購読を
//!   そのままフレーム化する。30秒ごとの `: heartbeat` で接続を維持する。
//! - 切断: レスポンスストリームのdropで購読ガードが外れ、即時に購読解除される。

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::http::header::{self, HeaderName};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures::StreamExt;
use tracing::debug;

use super::AppState;

/// 注文イベントストリーム（GET /api/orders/stream）
/// - 用途: バッチ投入・ステータス変更のライブ追跡
/// - フレーム: `event: <kind>` + `data: <JSONイベント>`
pub(super) async fn handle_order_stream(State(state): State<AppState>) -> impl IntoResponse {
    let subscription = state.bus.subscribe();
    debug!(active = state.bus.active_count(), "sse subscriber connected");

    let live = subscription.into_stream().map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".into());
        Ok::<_, Infallible>(Event::default().event(event.kind.as_str()).data(data))
    });

    // 接続確立を知らせるコメント行を最初に流す
    let greeting =
        futures::stream::iter([Ok::<_, Infallible>(Event::default().comment("connected"))]);
    let sse = Sse::new(greeting.chain(live)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("heartbeat"),
    );

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            // リバースプロキシのバッファリングでイベントが遅延しないようにする
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        sse,
    )
}
