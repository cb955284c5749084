//! 設定管理
//!
//! 環境変数から設定を読み込む。
//!
//! - `PORT` (デフォルト: 3002)
//! - `HOST` (デフォルト: 0.0.0.0)
//! - `BATCH_SIZE` (デフォルト: 100、[1,1000] へクランプ)
//! - `ORDER_CACHE_TTL_SEC` (デフォルト: 300)
//! - `IDEMPOTENCY_TTL_SEC` (デフォルト: 86400)
//! - `BUS_CHANNEL_CAPACITY` (デフォルト: 256)

use std::env;
use std::time::Duration;

/// 注文キャッシュのスイープ周期
pub const ORDER_CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Idempotencyキャッシュのスイープ周期
pub const IDEMPOTENCY_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// サーバー設定
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTPサーバーポート
    pub port: u16,
    /// バインド先ホスト
    pub host: String,
    /// デフォルトのチャンクサイズ
    pub batch_size: usize,
    /// 注文キャッシュTTL（ミリ秒）
    pub order_cache_ttl_ms: u64,
    /// IdempotencyキャッシュTTL（ミリ秒）
    pub idempotency_ttl_ms: u64,
    /// バス購読者ごとの送信バッファ容量
    pub bus_channel_capacity: usize,
}

impl Config {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Self {
        // .envファイルがあれば読み込む（無くてもエラーにしない）
        let _ = dotenvy::dotenv();

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3002),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            // 範囲外の値はエラーにせずクランプする
            batch_size: env::var("BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(100)
                .clamp(1, 1000),
            order_cache_ttl_ms: env::var("ORDER_CACHE_TTL_SEC")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(300)
                * 1000,
            idempotency_ttl_ms: env::var("IDEMPOTENCY_TTL_SEC")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(24 * 60 * 60)
                * 1000,
            bus_channel_capacity: env::var("BUS_CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(256)
                .max(1),
        }
    }
}
