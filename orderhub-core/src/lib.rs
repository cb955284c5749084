//! Orderhub Core - サービス横断で使う計測プリミティブ
//!
//! このライブラリはホットパスから呼ばれる最小限の部品だけを持つ:
//! - 単調クロックとエポックミリ秒のヘルパー (time.rs)
//! - 固定バケットのレイテンシヒストグラム (metrics.rs)
//!
//! サーバー本体の状態（ストア/キャッシュ/バス）は orderhub-server 側にある。

pub mod metrics;
pub mod time;

pub use metrics::{LatencyHistogram, LatencyStats};
pub use time::{now_millis, now_nanos};
