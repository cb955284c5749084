//! 注文ストア
//!
//! 注文レコードの正本をメモリ内で管理する。揮発前提で永続化は持たない。
//! すべての公開操作はロック1回で完結し、並行ハンドラから安全に呼べる。

use std::collections::HashMap;
use std::sync::RwLock;

use orderhub_core::now_millis;

use crate::order::{Order, OrderStatus};

/// インメモリ注文ストア
///
/// id -> Order の単一マップ。書き込みは write ロックで直列化されるため、
/// 1件の注文について途中状態が観測されることはない。
pub struct OrderStore {
    by_id: RwLock<HashMap<String, Order>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self {
            by_id: RwLock::new(HashMap::new()),
        }
    }

    /// 注文を一括登録する
    ///
    /// 同一呼び出し内で id が重複した場合は後勝ち。登録件数を返す。
    pub fn bulk_insert(&self, orders: &[Order]) -> usize {
        let mut map = self.by_id.write().unwrap_or_else(|e| e.into_inner());
        for order in orders {
            map.insert(order.id.clone(), order.clone());
        }
        orders.len()
    }

    /// 注文IDで検索
    pub fn find_by_id(&self, id: &str) -> Option<Order> {
        self.by_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// ステータスを更新する
    ///
    /// id 不在なら None。既存と同じステータスでも `updated_at` は
    /// 現在時刻へ書き換え、更新後のレコードを返す（no-op 短絡はしない）。
    pub fn update_status(&self, id: &str, new_status: OrderStatus) -> Option<Order> {
        let mut map = self.by_id.write().unwrap_or_else(|e| e.into_inner());
        let order = map.get_mut(id)?;
        order.status = new_status;
        order.updated_at = now_millis();
        Some(order.clone())
    }

    /// 全注文のスナップショット（順序不定）
    #[allow(dead_code)]
    pub fn all(&self) -> Vec<Order> {
        self.by_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// 全件数
    #[allow(dead_code)]
    pub fn count(&self) -> usize {
        self.by_id.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 全消去（テスト用）
    #[allow(dead_code)]
    pub fn clear(&self) {
        self.by_id
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for OrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, status: OrderStatus, amount: f64) -> Order {
        Order {
            id: id.into(),
            status,
            amount,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn test_bulk_insert_and_find() {
        let store = OrderStore::new();
        let inserted = store.bulk_insert(&[
            order("O1", OrderStatus::Pending, 10.0),
            order("O2", OrderStatus::Pending, 20.0),
        ]);
        assert_eq!(inserted, 2);
        assert_eq!(store.count(), 2);

        let found = store.find_by_id("O1").unwrap();
        assert_eq!(found.amount, 10.0);
        assert!(store.find_by_id("O3").is_none());
    }

    #[test]
    fn test_bulk_insert_duplicate_last_wins() {
        let store = OrderStore::new();
        store.bulk_insert(&[
            order("O1", OrderStatus::Pending, 10.0),
            order("O1", OrderStatus::Completed, 99.0),
        ]);

        // 同一呼び出し内の重複は後勝ち
        assert_eq!(store.count(), 1);
        let found = store.find_by_id("O1").unwrap();
        assert_eq!(found.status, OrderStatus::Completed);
        assert_eq!(found.amount, 99.0);
    }

    #[test]
    fn test_update_status() {
        let store = OrderStore::new();
        store.bulk_insert(&[order("O1", OrderStatus::Pending, 10.0)]);

        let updated = store.update_status("O1", OrderStatus::Completed).unwrap();
        assert_eq!(updated.status, OrderStatus::Completed);
        assert!(updated.updated_at >= updated.created_at);

        // ストア本体にも反映されている
        assert_eq!(
            store.find_by_id("O1").unwrap().status,
            OrderStatus::Completed
        );

        assert!(store.update_status("missing", OrderStatus::Failed).is_none());
    }

    #[test]
    fn test_update_status_same_value_refreshes_updated_at() {
        let store = OrderStore::new();
        store.bulk_insert(&[order("O1", OrderStatus::Pending, 10.0)]);

        // 同値更新でも updated_at は現在時刻へ進む（no-op にしない）
        let updated = store.update_status("O1", OrderStatus::Pending).unwrap();
        assert_eq!(updated.status, OrderStatus::Pending);
        assert!(updated.updated_at > 1);
    }

    #[test]
    fn test_all_and_clear() {
        let store = OrderStore::new();
        store.bulk_insert(&[
            order("O1", OrderStatus::Pending, 1.0),
            order("O2", OrderStatus::Failed, 2.0),
        ]);

        let mut ids: Vec<String> = store.all().into_iter().map(|o| o.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["O1".to_string(), "O2".to_string()]);

        store.clear();
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_concurrent_bulk_insert() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        let store = Arc::new(OrderStore::new());
        let barrier = Arc::new(Barrier::new(8));

        let mut handles = Vec::new();
        for t in 0..8 {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                for i in 0..100 {
                    store.bulk_insert(&[order(
                        &format!("t{}_o{}", t, i),
                        OrderStatus::Pending,
                        1.0,
                    )]);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.count(), 800);
    }
}
