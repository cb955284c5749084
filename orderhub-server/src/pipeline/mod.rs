//! バッチ投入パイプライン
//!
//! 検証済みの注文列をチャンクへ分割し、厳密に入力順で処理する。
//! チャンク分割はワーキングセットを抑えつつ、チャンク単位の失敗分離と
//! 進捗形式の結果を得るためのもの。並列化は要件外（逐次で十分）。
//!
//! 1件の失敗はリクエストを落とさず、所属チャンクの failed/errors に
//! 集計される。成功1件につき created イベントをちょうど1回発行する。

use std::sync::Arc;

use serde::Serialize;

use crate::bus::EventBus;
use crate::order::IncomingOrder;
use crate::store::OrderStore;
use crate::validate::{self, ValidationError};

/// チャンク1つ分の処理結果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResult {
    pub batch_index: usize,
    pub processed: usize,
    pub failed: usize,
    /// 失敗ゼロのチャンクではフィールドごと省略する
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

/// バッチ全体の集計結果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub total_processed: usize,
    pub total_failed: usize,
    pub batch_results: Vec<ChunkResult>,
}

/// 投入パイプライン
///
/// ストアとバスへの共有ハンドルだけを持つ。状態は持たない。
pub struct BatchPipeline {
    store: Arc<OrderStore>,
    bus: Arc<EventBus>,
}

impl BatchPipeline {
    pub fn new(store: Arc<OrderStore>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// バッチを処理する
    ///
    /// 1. チャンクサイズを解決（不正なら診断付きで失敗）
    /// 2. 入力順の連続チャンクへ分割（末尾チャンクは短くてよい）
    /// 3. チャンクを順に、チャンク内も順に処理
    /// 4. チャンクごとの結果を集計して返す
    pub fn run(
        &self,
        orders: &[IncomingOrder],
        requested_chunk_size: Option<i64>,
        default_chunk_size: usize,
    ) -> Result<BatchOutcome, ValidationError> {
        let chunk_size = validate::validate_batch_size(requested_chunk_size, default_chunk_size)?;

        let mut batch_results = Vec::with_capacity(orders.len().div_ceil(chunk_size));
        for (batch_index, chunk) in orders.chunks(chunk_size).enumerate() {
            batch_results.push(self.process_chunk(batch_index, chunk));
        }

        Ok(BatchOutcome {
            total_processed: batch_results.iter().map(|r| r.processed).sum(),
            total_failed: batch_results.iter().map(|r| r.failed).sum(),
            batch_results,
        })
    }

    fn process_chunk(&self, batch_index: usize, chunk: &[IncomingOrder]) -> ChunkResult {
        let mut processed = 0usize;
        let mut errors = Vec::new();

        for incoming in chunk {
            if !validate::validate_order(incoming) {
                errors.push(format!("Order {}: Invalid order data", incoming.id));
                continue;
            }
            // validate_order 通過後は status が必ず4値に解決できる
            let Some(order) = incoming.to_order() else {
                errors.push(format!("Order {}: Invalid order data", incoming.id));
                continue;
            };

            self.store.bulk_insert(std::slice::from_ref(&order));
            self.bus.publish_created(order);
            processed += 1;
        }

        ChunkResult {
            batch_index,
            processed,
            failed: errors.len(),
            errors: if errors.is_empty() {
                None
            } else {
                Some(errors)
            },
        }
    }
}
