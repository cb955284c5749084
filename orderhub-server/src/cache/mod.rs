//! TTL付きインメモリキャッシュ
//!
//! 2つの独立したキャッシュを持つ:
//! - `OrderCache`: 読み取り高速化のための注文スナップショット（デフォルト300秒）
//! - `IdempotencyCache`: Idempotency-Key ごとの確定レスポンス（デフォルト24時間）
//!
//! どちらも遅延失効（参照時にTTL判定）と定期スイープの二段構え。
//! スイープは同期操作と同じマップを走査するだけで、応答をブロックしない。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use orderhub_core::now_millis;

use crate::order::Order;

/// 注文キャッシュの1エントリ
#[derive(Debug, Clone)]
pub struct OrderCacheEntry {
    pub order: Order,
    /// 格納時刻（エポックミリ秒）
    pub cached_at: u64,
    /// `cached_at + ttl`
    pub expires_at: u64,
}

impl OrderCacheEntry {
    /// 格納からの経過秒数（切り捨て）
    pub fn age_seconds(&self) -> u64 {
        now_millis().saturating_sub(self.cached_at) / 1000
    }
}

/// 注文スナップショットのTTLキャッシュ
pub struct OrderCache {
    entries: DashMap<String, OrderCacheEntry>,
    default_ttl_ms: u64,
    expired_total: AtomicU64,
}

impl OrderCache {
    pub fn new(default_ttl_ms: u64) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl_ms,
            expired_total: AtomicU64::new(0),
        }
    }

    /// 生存エントリを返す。期限切れはその場で破棄して None。
    pub fn get(&self, id: &str) -> Option<OrderCacheEntry> {
        let now = now_millis();
        {
            if let Some(entry) = self.entries.get(id) {
                if entry.expires_at > now {
                    return Some(entry.value().clone());
                }
            }
        }
        // 期限切れ分を掃除してから不在扱いにする
        if self
            .entries
            .remove_if(id, |_, e| e.expires_at <= now)
            .is_some()
        {
            self.expired_total.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// デフォルトTTLで格納
    pub fn set(&self, id: &str, order: Order) {
        self.set_with_ttl(id, order, self.default_ttl_ms);
    }

    pub fn set_with_ttl(&self, id: &str, order: Order, ttl_ms: u64) {
        let now = now_millis();
        self.entries.insert(
            id.to_string(),
            OrderCacheEntry {
                order,
                cached_at: now,
                expires_at: now + ttl_ms,
            },
        );
    }

    pub fn invalidate(&self, id: &str) {
        self.entries.remove(id);
    }

    /// 生存エントリの経過秒数。期限切れ/不在は None。
    #[allow(dead_code)]
    pub fn age_seconds(&self, id: &str) -> Option<u64> {
        self.get(id).map(|entry| entry.age_seconds())
    }

    /// 期限切れエントリを一括除去し、除去件数を返す
    pub fn sweep(&self) -> usize {
        let now = now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.expired_total.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// 定期スイープを起動する
    pub fn start_sweeper(self: &Arc<Self>, period: Duration) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval の初回tickは即時発火するため読み捨てる
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, "order cache sweep");
                }
            }
        });
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[allow(dead_code)]
    pub fn expired_total(&self) -> u64 {
        self.expired_total.load(Ordering::Relaxed)
    }
}

/// 確定済みレスポンスの複製用エントリ
///
/// 再送時に status / body をバイト同一で返すため、レスポンスは
/// 確定時点の JSON 値として凍結する。エラーレスポンスも同様に扱う。
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status_code: u16,
    pub body: Value,
    pub stored_at: u64,
    pub expires_at: u64,
}

/// Idempotency-Key -> 確定レスポンスのTTLキャッシュ
pub struct IdempotencyCache {
    entries: DashMap<String, CachedResponse>,
    default_ttl_ms: u64,
    expired_total: AtomicU64,
}

impl IdempotencyCache {
    pub fn new(default_ttl_ms: u64) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl_ms,
            expired_total: AtomicU64::new(0),
        }
    }

    /// 生存エントリの (status, body) を返す。期限切れは破棄して None。
    pub fn get(&self, key: &str) -> Option<(u16, Value)> {
        let now = now_millis();
        {
            if let Some(entry) = self.entries.get(key) {
                if entry.expires_at > now {
                    return Some((entry.status_code, entry.body.clone()));
                }
            }
        }
        if self
            .entries
            .remove_if(key, |_, e| e.expires_at <= now)
            .is_some()
        {
            self.expired_total.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// 確定レスポンスを格納する（成功・エラーを問わない）
    pub fn set(&self, key: &str, body: Value, status_code: u16) {
        self.set_with_ttl(key, body, status_code, self.default_ttl_ms);
    }

    pub fn set_with_ttl(&self, key: &str, body: Value, status_code: u16, ttl_ms: u64) {
        let now = now_millis();
        self.entries.insert(
            key.to_string(),
            CachedResponse {
                status_code,
                body,
                stored_at: now,
                expires_at: now + ttl_ms,
            },
        );
    }

    pub fn sweep(&self) -> usize {
        let now = now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.expired_total.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    pub fn start_sweeper(self: &Arc<Self>, period: Duration) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, "idempotency cache sweep");
                }
            }
        });
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[allow(dead_code)]
    pub fn expired_total(&self) -> u64 {
        self.expired_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderStatus;
    use serde_json::json;
    use std::thread;

    fn order(id: &str) -> Order {
        Order {
            id: id.into(),
            status: OrderStatus::Pending,
            amount: 10.0,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn test_order_cache_hit_and_miss() {
        let cache = OrderCache::new(60_000);
        assert!(cache.get("O1").is_none());

        cache.set("O1", order("O1"));
        let entry = cache.get("O1").unwrap();
        assert_eq!(entry.order.id, "O1");
        assert_eq!(entry.expires_at, entry.cached_at + 60_000);
        assert_eq!(cache.age_seconds("O1"), Some(0));
    }

    #[test]
    fn test_order_cache_ttl_expiry() {
        let cache = OrderCache::new(1);
        cache.set("O1", order("O1"));

        thread::sleep(std::time::Duration::from_millis(3));

        // 期限切れは参照時に破棄される
        assert!(cache.get("O1").is_none());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.expired_total(), 1);
        assert!(cache.age_seconds("O1").is_none());
    }

    #[test]
    fn test_order_cache_invalidate() {
        let cache = OrderCache::new(60_000);
        cache.set("O1", order("O1"));
        cache.invalidate("O1");
        assert!(cache.get("O1").is_none());
        // 失効カウンタは明示invalidateでは増えない
        assert_eq!(cache.expired_total(), 0);
    }

    #[test]
    fn test_order_cache_sweep() {
        let cache = OrderCache::new(1);
        cache.set("O1", order("O1"));
        cache.set("O2", order("O2"));
        cache.set_with_ttl("O3", order("O3"), 60_000);

        thread::sleep(std::time::Duration::from_millis(3));

        let removed = cache.sweep();
        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("O3").is_some());
        assert_eq!(cache.expired_total(), 2);
    }

    #[test]
    fn test_idempotency_cache_replay() {
        let cache = IdempotencyCache::new(60_000);
        let body = json!({"success": true, "processed": 2});
        cache.set("abc-123", body.clone(), 201);

        let (status, replayed) = cache.get("abc-123").unwrap();
        assert_eq!(status, 201);
        assert_eq!(replayed, body);
        assert!(cache.get("other-key").is_none());
    }

    #[test]
    fn test_idempotency_cache_stores_error_responses() {
        let cache = IdempotencyCache::new(60_000);
        let body = json!({"message": "boom"});
        cache.set("err-key", body.clone(), 500);

        // エラーレスポンスも成功と同じく複製される
        let (status, replayed) = cache.get("err-key").unwrap();
        assert_eq!(status, 500);
        assert_eq!(replayed, body);
    }

    #[test]
    fn test_idempotency_cache_ttl_expiry() {
        let cache = IdempotencyCache::new(1);
        cache.set("k", json!({}), 201);

        thread::sleep(std::time::Duration::from_millis(3));

        assert!(cache.get("k").is_none());
        assert_eq!(cache.expired_total(), 1);
    }
}
