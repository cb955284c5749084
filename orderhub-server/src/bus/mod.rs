//! 注文イベントバス
//!
//! 登録順の購読者集合へ `OrderEvent` を同期的にファンアウトする。
//! 内部キューは持たず、購読者ごとの有界チャネルへ try_send するだけ。
//! 配信に失敗した購読者（切断・バッファ溢れ）はその場で除去し、
//! 残りの購読者への配信は継続する。同一イベントの再配信はしない。

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use orderhub_core::now_millis;

use crate::order::{EventKind, Order, OrderEvent};

/// 購読者ごとの送信バッファのデフォルト容量
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

struct BusSubscriber {
    id: u64,
    tx: mpsc::Sender<OrderEvent>,
}

/// イベントバス本体
///
/// 購読者リストは登録順の Vec で持ち、publish はその順に配る。
/// ロックは try_send の間だけ保持する（ブロッキング送信はしない）。
pub struct EventBus {
    subscribers: RwLock<Vec<BusSubscriber>>,
    next_id: AtomicU64,
    channel_capacity: usize,
    dropped_total: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(channel_capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            channel_capacity: channel_capacity.max(1),
            dropped_total: AtomicU64::new(0),
        }
    }

    /// 購読を開始する
    ///
    /// 返り値の `Subscription` が購読の唯一のハンドル。drop すると
    /// 即時に購読者リストから外れる。
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(BusSubscriber { id, tx });
        Subscription {
            rx,
            guard: Unsubscriber {
                id,
                bus: Arc::clone(self),
            },
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|s| s.id != id);
    }

    /// イベントを全購読者へ配信する
    ///
    /// 配信は登録順。try_send が失敗した購読者は除去して続行する。
    pub fn publish(&self, event: OrderEvent) {
        let mut dropped = 0u64;
        {
            let mut subs = self
                .subscribers
                .write()
                .unwrap_or_else(|e| e.into_inner());
            subs.retain(|s| match s.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(_) => {
                    dropped += 1;
                    false
                }
            });
        }
        if dropped > 0 {
            self.dropped_total.fetch_add(dropped, Ordering::Relaxed);
            debug!(dropped, kind = event.kind.as_str(), "dropped unreachable subscribers");
        }
    }

    /// created イベントを発行（timestamp は現在時刻）
    pub fn publish_created(&self, order: Order) {
        self.publish(OrderEvent {
            kind: EventKind::Created,
            order,
            timestamp: now_millis(),
        });
    }

    /// updated イベントを発行（更新系APIが増えた際の発行口）
    #[allow(dead_code)]
    pub fn publish_updated(&self, order: Order) {
        self.publish(OrderEvent {
            kind: EventKind::Updated,
            order,
            timestamp: now_millis(),
        });
    }

    /// status_changed イベントを発行
    pub fn publish_status_changed(&self, order: Order) {
        self.publish(OrderEvent {
            kind: EventKind::StatusChanged,
            order,
            timestamp: now_millis(),
        });
    }

    /// 現在の生存購読者数
    pub fn active_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// 配信失敗で除去した購読者の累計
    #[allow(dead_code)]
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    /// 全購読者を除去する（テスト用）
    #[allow(dead_code)]
    pub fn clear_all(&self) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop で購読解除する RAII ガード
///
/// SSE クライアントの切断時、次の publish 失敗を待たずに
/// 購読者リストから外すために使う。
struct Unsubscriber {
    id: u64,
    bus: Arc<EventBus>,
}

impl Drop for Unsubscriber {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

/// 1購読分のハンドル
pub struct Subscription {
    rx: mpsc::Receiver<OrderEvent>,
    guard: Unsubscriber,
}

impl Subscription {
    /// 次のイベントを受信する。バス側で除去済みなら None。
    pub async fn recv(&mut self) -> Option<OrderEvent> {
        self.rx.recv().await
    }

    /// 受信待ちせずに取り出す（テスト用）
    #[allow(dead_code)]
    pub fn try_recv(&mut self) -> Result<OrderEvent, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }

    /// SSE 配信用のストリームへ変換する。ガードはストリームが持ち続ける。
    pub fn into_stream(self) -> EventStream {
        EventStream {
            inner: ReceiverStream::new(self.rx),
            _guard: self.guard,
        }
    }
}

/// 購読解除ガード付きイベントストリーム
pub struct EventStream {
    inner: ReceiverStream<OrderEvent>,
    _guard: Unsubscriber,
}

impl Stream for EventStream {
    type Item = OrderEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderStatus;

    fn order(id: &str) -> Order {
        Order {
            id: id.into(),
            status: OrderStatus::Pending,
            amount: 1.0,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[tokio::test]
    async fn test_publish_fanout_in_order() {
        let bus = Arc::new(EventBus::new());
        let mut sub_a = bus.subscribe();
        let mut sub_b = bus.subscribe();
        assert_eq!(bus.active_count(), 2);

        bus.publish_created(order("O1"));
        bus.publish_created(order("O2"));

        // 両購読者が同じ順序で受信する
        for sub in [&mut sub_a, &mut sub_b] {
            let e1 = sub.recv().await.unwrap();
            let e2 = sub.recv().await.unwrap();
            assert_eq!(e1.kind, EventKind::Created);
            assert_eq!(e1.order.id, "O1");
            assert_eq!(e2.order.id, "O2");
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_on_drop() {
        let bus = Arc::new(EventBus::new());
        let sub = bus.subscribe();
        assert_eq!(bus.active_count(), 1);

        drop(sub);
        assert_eq!(bus.active_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_dropped_on_overflow() {
        // 容量1のバッファを溢れさせると購読者ごと除去される
        let bus = Arc::new(EventBus::with_capacity(1));
        let mut slow = bus.subscribe();
        let mut healthy = bus.subscribe();

        bus.publish_created(order("O1"));
        // healthy は都度消費するが、slow は溜めたまま
        assert_eq!(healthy.recv().await.unwrap().order.id, "O1");

        bus.publish_created(order("O2")); // slow のバッファが溢れる

        assert_eq!(bus.active_count(), 1);
        assert_eq!(bus.dropped_total(), 1);
        assert_eq!(healthy.recv().await.unwrap().order.id, "O2");

        // 溢れた購読者は受信済み分だけ読める（O2 は届かない）
        assert_eq!(slow.recv().await.unwrap().order.id, "O1");
        assert!(slow.recv().await.is_none());

        // 以降の publish は残った購読者にだけ届く
        bus.publish_created(order("O3"));
        assert_eq!(healthy.recv().await.unwrap().order.id, "O3");
    }

    #[tokio::test]
    async fn test_status_changed_stamps_timestamp() {
        let bus = Arc::new(EventBus::new());
        let mut sub = bus.subscribe();

        let before = now_millis();
        bus.publish_status_changed(order("O1"));
        let event = sub.recv().await.unwrap();

        assert_eq!(event.kind, EventKind::StatusChanged);
        assert!(event.timestamp >= before);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let bus = Arc::new(EventBus::new());
        let _a = bus.subscribe();
        let _b = bus.subscribe();
        bus.clear_all();
        assert_eq!(bus.active_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_drop_detaches() {
        let bus = Arc::new(EventBus::new());
        let stream = bus.subscribe().into_stream();
        assert_eq!(bus.active_count(), 1);

        drop(stream);
        assert_eq!(bus.active_count(), 0);
    }
}
