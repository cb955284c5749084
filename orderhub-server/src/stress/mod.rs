//! 負荷試験ハーネス
//!
//! 合成注文を生成して本番と同じ投入パイプラインへ流し、
//! スループットとメモリ使用量を報告する。処理経路を分けないことで
//! 負荷試験の数字が実際の受け入れ性能を反映するようにしている。

use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use orderhub_core::now_millis;

use crate::bus::EventBus;
use crate::mem::{self, MemoryMegabytes};
use crate::order::{IncomingOrder, OrderStatus};
use crate::pipeline::BatchPipeline;

/// 負荷試験の設定（検証済みの値が入る）
#[derive(Debug, Clone, Copy)]
pub struct StressConfig {
    pub order_count: usize,
    pub batch_size: usize,
    /// 予約パラメータ。チャンク処理は逐次が要件のため現状未使用。
    #[allow(dead_code)]
    pub concurrent_batches: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            order_count: 1000,
            batch_size: 100,
            concurrent_batches: 1,
        }
    }
}

/// 負荷試験の結果レポート
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StressReport {
    pub success: bool,
    pub total_orders: usize,
    pub processed: usize,
    pub failed: usize,
    #[serde(rename = "duration_ms")]
    pub duration_ms: u64,
    pub orders_per_second: f64,
    /// チャンク1つあたりの平均処理時間
    #[serde(rename = "averageLatency_ms")]
    pub average_latency_ms: f64,
    pub memory_usage: MemoryMegabytes,
    pub active_connections: usize,
    pub timestamp: u64,
}

/// 負荷試験ランナー
pub struct StressHarness {
    pipeline: Arc<BatchPipeline>,
    bus: Arc<EventBus>,
}

impl StressHarness {
    pub fn new(pipeline: Arc<BatchPipeline>, bus: Arc<EventBus>) -> Self {
        Self { pipeline, bus }
    }

    /// 合成注文を生成してパイプラインへ流す
    ///
    /// パイプライン自体が失敗した場合も同じ形のレポートを返す
    /// （processed=0 / failed=orderCount）。
    pub fn run(&self, config: &StressConfig) -> StressReport {
        let orders = synthesize_orders(config.order_count);
        info!(
            order_count = config.order_count,
            batch_size = config.batch_size,
            "stress test starting"
        );

        let started = Instant::now();
        let outcome = self
            .pipeline
            .run(&orders, Some(config.batch_size as i64), config.batch_size);
        let duration_ms = started.elapsed().as_millis() as u64;

        let report = match outcome {
            Ok(result) => {
                let batch_count = result.batch_results.len().max(1);
                StressReport {
                    success: result.total_failed == 0,
                    total_orders: config.order_count,
                    processed: result.total_processed,
                    failed: result.total_failed,
                    duration_ms,
                    orders_per_second: throughput(result.total_processed, duration_ms),
                    average_latency_ms: round2(duration_ms as f64 / batch_count as f64),
                    memory_usage: mem::snapshot().to_megabytes(),
                    active_connections: self.bus.active_count(),
                    timestamp: now_millis(),
                }
            }
            Err(err) => {
                warn!(error = %err, "stress test pipeline failed");
                StressReport {
                    success: false,
                    total_orders: config.order_count,
                    processed: 0,
                    failed: config.order_count,
                    duration_ms,
                    orders_per_second: 0.0,
                    average_latency_ms: 0.0,
                    memory_usage: mem::snapshot().to_megabytes(),
                    active_connections: self.bus.active_count(),
                    timestamp: now_millis(),
                }
            }
        };

        info!(
            processed = report.processed,
            failed = report.failed,
            duration_ms = report.duration_ms,
            orders_per_second = report.orders_per_second,
            "stress test finished"
        );
        report
    }
}

/// ランダムなステータス/金額を持つ一意IDの注文列を合成する
fn synthesize_orders(count: usize) -> Vec<IncomingOrder> {
    let mut rng = rand::thread_rng();
    // 実行ごとに接頭辞を変え、繰り返し実行してもIDが衝突しないようにする
    let run_id = Uuid::new_v4().simple().to_string();
    let now = now_millis();

    (0..count)
        .map(|i| {
            let status = OrderStatus::ALL[rng.gen_range(0..OrderStatus::ALL.len())];
            IncomingOrder {
                id: format!("stress_{}_{}", run_id, i),
                status: status.as_str().to_string(),
                amount: round2(rng.gen_range(1.0..1000.0)),
                created_at: now,
                updated_at: now,
            }
        })
        .collect()
}

fn throughput(processed: usize, duration_ms: u64) -> f64 {
    let secs = (duration_ms as f64 / 1000.0).max(0.001);
    round2(processed as f64 / secs)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::OrderStore;

    #[test]
    fn test_synthesized_orders_are_unique_and_valid() {
        let orders = synthesize_orders(200);
        assert_eq!(orders.len(), 200);

        let mut ids: Vec<&str> = orders.iter().map(|o| o.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 200, "IDが衝突している");

        for order in &orders {
            assert!(crate::validate::validate_order(order));
            assert!(order.amount >= 1.0 && order.amount < 1000.0);
        }
    }

    #[test]
    fn test_stress_run_reports_full_success() {
        let store = Arc::new(OrderStore::new());
        let bus = Arc::new(EventBus::new());
        let pipeline = Arc::new(BatchPipeline::new(Arc::clone(&store), Arc::clone(&bus)));
        let harness = StressHarness::new(pipeline, Arc::clone(&bus));

        let config = StressConfig {
            order_count: 25,
            batch_size: 10,
            concurrent_batches: 1,
        };
        let report = harness.run(&config);

        assert!(report.success);
        assert_eq!(report.total_orders, 25);
        assert_eq!(report.processed, 25);
        assert_eq!(report.failed, 0);
        assert_eq!(report.active_connections, 0);
        assert!(report.timestamp > 0);
        assert_eq!(store.count(), 25);
    }

    #[test]
    fn test_stress_report_serializes_contract_field_names() {
        let report = StressReport {
            success: true,
            total_orders: 1,
            processed: 1,
            failed: 0,
            duration_ms: 5,
            orders_per_second: 200.0,
            average_latency_ms: 5.0,
            memory_usage: mem::snapshot().to_megabytes(),
            active_connections: 0,
            timestamp: 1,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("duration_ms").is_some());
        assert!(json.get("averageLatency_ms").is_some());
        assert!(json.get("ordersPerSecond").is_some());
        assert!(json.get("totalOrders").is_some());
        assert!(json["memoryUsage"].get("heapUsed").is_some());
    }
}
