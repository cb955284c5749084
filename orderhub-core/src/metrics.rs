//! リクエストレイテンシ計測モジュール
//!
//! ## 目的
//! - HTTP リクエストの処理時間をマイクロ秒精度で集計
//! - 合計/件数から平均応答時間を O(1) で算出
//! - オーバーヘッド最小化（計測がホットパスを遅くしては本末転倒）
//!
//! ## 設計思想
//! - ヒストグラム方式: 個々の値を保存せず、バケットにカウント
//! - Atomic 操作: マルチスレッドでも mutex 不要
//! - 固定バケット: メモリ確保なし

use std::sync::atomic::{AtomicU64, Ordering};

/// レイテンシ分布ヒストグラム
///
/// ## バケット境界（HTTP リクエスト向けに調整）
/// ```text
/// [0]      0 - 500μs  : キャッシュヒット相当
/// [1]  500μs - 1ms    : 高速
/// [2]    1ms - 5ms    : 良好
/// [3]    5ms - 10ms   : 許容範囲
/// [4]   10ms - 50ms   : 大きめのバッチ
/// [5]   50ms - 100ms  : 要注意
/// [6]  100ms - 500ms  : 問題あり
/// [7]     500ms+      : 異常（ロック競合? GC相当の停止?）
/// ```
#[derive(Debug)]
pub struct LatencyHistogram {
    buckets: [AtomicU64; 8], // 各バケットのカウント
    sum_micros: AtomicU64,   // 合計（平均計算用）
    count: AtomicU64,        // 総サンプル数
    min_micros: AtomicU64,   // 最小値
    max_micros: AtomicU64,   // 最大値
}

/// バケット境界値（マイクロ秒）
impl LatencyHistogram {
    pub const BUCKET_BOUNDS: [u64; 8] = [
        500,        // ~ 500μs
        1_000,      // ~ 1ms
        5_000,      // ~ 5ms
        10_000,     // ~ 10ms
        50_000,     // ~ 50ms
        100_000,    // ~ 100ms
        500_000,    // ~ 500ms
        u64::MAX,   // それ以上
    ];

    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
            min_micros: AtomicU64::new(u64::MAX),
            max_micros: AtomicU64::new(0),
        }
    }

    /// レイテンシを記録（マイクロ秒）
    ///
    /// ## 処理内容
    /// 1. 該当バケットを特定してカウントアップ
    /// 2. 合計・カウントを更新（平均計算用）
    /// 3. min/max を CAS で更新
    #[inline]
    pub fn record(&self, latency_micros: u64) {
        // バケット特定: 最初に境界を超えた位置
        let bucket_idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| latency_micros <= bound)
            .unwrap_or(7);

        // Relaxed: 順序保証不要、速度優先
        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        self.sum_micros.fetch_add(latency_micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        // min 更新（CAS ループ）
        let mut current_min = self.min_micros.load(Ordering::Relaxed);
        while latency_micros < current_min {
            match self.min_micros.compare_exchange_weak(
                current_min,
                latency_micros,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => current_min = x,
            }
        }

        // max 更新（CAS ループ）
        let mut current_max = self.max_micros.load(Ordering::Relaxed);
        while latency_micros > current_max {
            match self.max_micros.compare_exchange_weak(
                current_max,
                latency_micros,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => current_max = x,
            }
        }
    }

    /// 統計スナップショットを取得
    pub fn snapshot(&self) -> LatencyStats {
        let count = self.count.load(Ordering::Relaxed);
        let sum = self.sum_micros.load(Ordering::Relaxed);
        let min = self.min_micros.load(Ordering::Relaxed);
        let max = self.max_micros.load(Ordering::Relaxed);

        let buckets: [u64; 8] = std::array::from_fn(|i| self.buckets[i].load(Ordering::Relaxed));

        LatencyStats {
            count,
            sum_micros: sum,
            min_micros: if min == u64::MAX { 0 } else { min },
            max_micros: max,
            mean_micros: if count > 0 { sum / count } else { 0 },
            buckets,
        }
    }

    /// 全カウンタをリセット（テスト用）
    pub fn reset(&self) {
        for bucket in &self.buckets {
            bucket.store(0, Ordering::Relaxed);
        }
        self.sum_micros.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
        self.min_micros.store(u64::MAX, Ordering::Relaxed);
        self.max_micros.store(0, Ordering::Relaxed);
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// 統計スナップショット
#[derive(Debug, Clone)]
pub struct LatencyStats {
    pub count: u64,
    pub sum_micros: u64,
    pub min_micros: u64,
    pub max_micros: u64,
    pub mean_micros: u64,
    pub buckets: [u64; 8],
}

impl LatencyStats {
    /// 平均応答時間をミリ秒で返す（四捨五入）
    ///
    /// サンプルゼロ時は 0。運用 API がそのまま返せる形にしておく。
    pub fn mean_millis_rounded(&self) -> u64 {
        if self.count == 0 {
            return 0;
        }
        ((self.sum_micros as f64 / self.count as f64) / 1000.0).round() as u64
    }

    /// パーセンタイル値を推定
    ///
    /// ## 計算方法
    /// 1. 目標順位を計算（例: p99 なら上位1%の位置）
    /// 2. バケットを累積して目標順位を含むバケットを特定
    /// 3. そのバケットの上限値を返す（近似）
    pub fn percentile(&self, p: f64) -> u64 {
        if self.count == 0 {
            return 0;
        }

        let target = (self.count as f64 * p / 100.0).ceil() as u64;
        let mut cumulative = 0u64;

        for (i, &bucket_count) in self.buckets.iter().enumerate() {
            cumulative += bucket_count;
            if cumulative >= target {
                return LatencyHistogram::BUCKET_BOUNDS[i];
            }
        }

        LatencyHistogram::BUCKET_BOUNDS[7]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_basic() {
        let hist = LatencyHistogram::new();

        hist.record(300);    // バケット[0]: 0-500μs
        hist.record(800);    // バケット[1]: 500μs-1ms
        hist.record(3_000);  // バケット[2]: 1-5ms
        hist.record(8_000);  // バケット[3]: 5-10ms

        let stats = hist.snapshot();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.min_micros, 300);
        assert_eq!(stats.max_micros, 8_000);
        assert_eq!(stats.mean_micros, (300 + 800 + 3_000 + 8_000) / 4);
    }

    #[test]
    fn test_percentile() {
        let hist = LatencyHistogram::new();

        // 99サンプルを最初のバケットに
        for _ in 0..99 {
            hist.record(300);
        }
        // 1サンプルを最後のバケットに
        hist.record(900_000);

        let stats = hist.snapshot();
        assert_eq!(stats.percentile(50.0), 500); // p50: バケット[0]
        assert_eq!(stats.percentile(99.0), 500); // p99: バケット[0]
        assert_eq!(stats.percentile(100.0), u64::MAX); // p100: バケット[7]
    }

    #[test]
    fn test_mean_millis_rounded() {
        let hist = LatencyHistogram::new();
        assert_eq!(hist.snapshot().mean_millis_rounded(), 0);

        hist.record(1_400); // 1.4ms
        hist.record(2_700); // 2.7ms
        // 平均 2.05ms → 四捨五入で 2
        assert_eq!(hist.snapshot().mean_millis_rounded(), 2);
    }

    #[test]
    fn test_reset() {
        let hist = LatencyHistogram::new();
        hist.record(1_000);
        hist.reset();

        let stats = hist.snapshot();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.sum_micros, 0);
        assert_eq!(stats.min_micros, 0);
        assert_eq!(stats.max_micros, 0);
    }
}
