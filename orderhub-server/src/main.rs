//! Orderhub Server - バッチ注文取込サービス
//!
//! 大きなバッチで届く注文を取り込み、個別参照とステータス更新を提供し、
//! ライフサイクルイベントをSSEで購読者へファンアウトする。
//!
//! ## 起動方法
//! ```bash
//! PORT=3002 cargo run --release -p orderhub-server
//! ```
//!
//! ## 全体フロー（超要約）
//! 1) POST /api/orders/batch を Idempotency ゲートで受理
//! 2) BatchPipeline がチャンク単位で検証→ストア登録→created イベント発行
//! 3) 確定レスポンスを IdempotencyCache に凍結（再送は複製を返す）
//! 4) 読み取りは OrderCache 優先、更新は invalidate→再プライム
//! 5) SSE で購読者へイベント配信、キャッシュはスイーパーが定期清掃
//!
//! ## 環境変数
//! - `PORT`: HTTPサーバーのポート（デフォルト: 3002）
//! - `HOST`: バインド先（デフォルト: 0.0.0.0）
//! - `BATCH_SIZE`: チャンクサイズ（デフォルト: 100）
//! - `RUST_LOG`: ログレベル（デフォルト: info）

mod bus;
mod cache;
mod config;
mod mem;
mod order;
mod pipeline;
mod server;
mod store;
mod stress;
mod validate;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ロギング初期化
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,orderhub_server=debug".into()),
        )
        .init();

    // 設定読み込み
    let config = config::Config::from_env();
    info!("Orderhub starting with config: {:?}", config);

    // ストア / キャッシュ / バス初期化
    let store = Arc::new(store::OrderStore::new());
    let order_cache = Arc::new(cache::OrderCache::new(config.order_cache_ttl_ms));
    let idempotency_cache = Arc::new(cache::IdempotencyCache::new(config.idempotency_ttl_ms));
    let bus = Arc::new(bus::EventBus::with_capacity(config.bus_channel_capacity));
    info!("OrderStore / caches / EventBus initialized");

    // TTL失効の定期スイープを起動
    order_cache.start_sweeper(config::ORDER_CACHE_SWEEP_INTERVAL);
    idempotency_cache.start_sweeper(config::IDEMPOTENCY_SWEEP_INTERVAL);
    info!("cache sweepers started");

    server::http::run(config, store, order_cache, idempotency_cache, bus).await
}
