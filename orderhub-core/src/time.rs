//! クロックヘルパー
//!
//! - `now_nanos`: プロセス起動時の Instant を基準にした単調経過ナノ秒。
//!   レイテンシ計測専用で、壁時計とは無関係。
//! - `now_millis`: エポックミリ秒。注文の `updatedAt` やイベントの
//!   `timestamp` など、外部に出る時刻はこちらを使う。

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// 単調経過時間をナノ秒で取得
///
/// OnceLock で初回のみ基準 Instant を確保し、以降はゼロコスト参照。
#[inline]
pub fn now_nanos() -> u64 {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}

/// 現在時刻をエポックミリ秒で取得
///
/// システム時計が UNIX_EPOCH より前を指す異常系は 0 に丸める。
#[inline]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
