//! 注文関連の型定義
//!
//! HTTPリクエスト/レスポンスとイベント配信で使用する構造体。
//! ワイヤ表現は camelCase / SCREAMING_SNAKE_CASE に統一する。

use serde::{Deserialize, Serialize};

/// 注文ステータス（閉じた4値）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 4] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// ワイヤ文字列からの変換。未知の値は None。
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(Self::Pending),
            "PROCESSING" => Some(Self::Processing),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// 注文レコード（ストアの正本）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub status: OrderStatus,
    pub amount: f64,
    /// エポックミリ秒
    pub created_at: u64,
    /// エポックミリ秒。ステータス更新のたびに書き換わる。
    pub updated_at: u64,
}

/// バッチ投入される生の注文（リクエストボディの1要素）
///
/// status は未検証の文字列のまま受ける。不正値はバッチ全体を
/// 落とさず、パイプライン側で per-order 失敗として集計する。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingOrder {
    pub id: String,
    pub status: String,
    pub amount: f64,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl IncomingOrder {
    /// 検証済み前提の型付き変換。status が4値に解決できなければ None。
    pub fn to_order(&self) -> Option<Order> {
        let status = OrderStatus::parse(&self.status)?;
        Some(Order {
            id: self.id.clone(),
            status,
            amount: self.amount,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// イベント種別
///
/// ワイヤ上は `order.` 名前空間付き。SSE の `event:` 行と
/// JSON ペイロードの `kind` は同じ文字列を使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    #[serde(rename = "order.created")]
    Created,
    #[serde(rename = "order.updated")]
    Updated,
    #[serde(rename = "order.status_changed")]
    StatusChanged,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "order.created",
            Self::Updated => "order.updated",
            Self::StatusChanged => "order.status_changed",
        }
    }
}

/// 注文ライフサイクルイベント（タグ付きバリアント）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub kind: EventKind,
    pub order: Order,
    /// 発行時刻（エポックミリ秒）
    pub timestamp: u64,
}
