//! HTTP サーバー（入口層）
//!
//! 位置づけ:
//! - このモジュールは「HTTP入口層」。バッチ受付→パイプライン→キャッシュ/バスへの
//!   橋渡しを担う。ルーティングをここに集約し、実処理はサブモジュールに分離する。
//!
//! ハンドラの分類（取込 / 参照 / 通知 / 運用）:
//! - 取込:
//!   - POST /api/orders/batch: Idempotency-Key 必須のバッチ投入。同期境界はここまで。
//!   - POST /api/orders/stress-test: 本番と同じパイプラインを使う負荷試験。
//! - 参照/更新:
//!   - GET /api/orders/{id}: キャッシュ優先の読み取り（X-Cacheヘッダ付き）。
//!   - PUT /api/orders/{id}/status: ステータス更新。invalidate→再プライム→イベント。
//! - 通知:
//!   - GET /api/orders/stream: SSEによるライフサイクルイベント配信。
//! - 運用:
//!   - GET /api/system/health: 稼働確認。
//!   - GET /api/system/memory: プロセスメモリ。
//!   - GET /api/system/performance: リクエスト数と平均応答時間。

// ハンドラはドメイン別に分割（注文 / SSE / 運用）
mod orders;
mod sse;
mod system;


use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use orderhub_core::LatencyHistogram;

use crate::bus::EventBus;
use crate::cache::{IdempotencyCache, OrderCache};
use crate::config::Config;
use crate::pipeline::BatchPipeline;
use crate::store::OrderStore;
use crate::stress::StressHarness;

use orders::{handle_batch_orders, handle_get_order, handle_stress_test, handle_update_status};
use sse::handle_order_stream;
use system::{handle_health, handle_memory, handle_performance};

/// アプリケーション状態
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Config,
    pub(crate) store: Arc<OrderStore>,
    pub(crate) order_cache: Arc<OrderCache>,
    pub(crate) idempotency_cache: Arc<IdempotencyCache>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) pipeline: Arc<BatchPipeline>,
    pub(crate) stress: Arc<StressHarness>,
    /// リクエスト応答時間の集計（件数と合計を兼ねる）
    pub(crate) request_latency: Arc<LatencyHistogram>,
    pub(crate) started_at: Instant,
}

impl AppState {
    pub(crate) fn new(
        config: Config,
        store: Arc<OrderStore>,
        order_cache: Arc<OrderCache>,
        idempotency_cache: Arc<IdempotencyCache>,
        bus: Arc<EventBus>,
    ) -> Self {
        let pipeline = Arc::new(BatchPipeline::new(Arc::clone(&store), Arc::clone(&bus)));
        let stress = Arc::new(StressHarness::new(Arc::clone(&pipeline), Arc::clone(&bus)));
        Self {
            config,
            store,
            order_cache,
            idempotency_cache,
            bus,
            pipeline,
            stress,
            request_latency: Arc::new(LatencyHistogram::new()),
            started_at: Instant::now(),
        }
    }
}

/// `/api` 配下のルーターを組み立てる
pub(crate) fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/orders/batch", post(handle_batch_orders))
        .route("/orders/stream", get(handle_order_stream))
        .route("/orders/stress-test", post(handle_stress_test))
        .route("/orders/{id}", get(handle_get_order))
        .route("/orders/{id}/status", put(handle_update_status))
        .route("/system/health", get(handle_health))
        .route("/system/memory", get(handle_memory))
        .route("/system/performance", get(handle_performance))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            track_request_metrics,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state);

    Router::new().nest("/api", api)
}

/// HTTPサーバーを起動
pub async fn run(
    config: Config,
    store: Arc<OrderStore>,
    order_cache: Arc<OrderCache>,
    idempotency_cache: Arc<IdempotencyCache>,
    bus: Arc<EventBus>,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config, store, order_cache, idempotency_cache, bus);
    let app = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// リクエスト計測ミドルウェア
///
/// 応答確定時に経過時間を加算し、リクエスト数を1増やす。
/// `/api/system/performance` はこの集計をそのまま返す。
async fn track_request_metrics(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    state
        .request_latency
        .record(started.elapsed().as_micros() as u64);
    response
}
