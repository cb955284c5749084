//! 入力検証（純関数）
//!
//! リクエスト境界の検証をここに集約する。副作用なし。
//! 診断メッセージはクライアント契約の一部なので文字列を変えないこと。

use serde_json::Value;

use crate::order::{IncomingOrder, OrderStatus};
use crate::stress::StressConfig;

/// 1リクエストで受け付ける注文数の上限
pub const MAX_ORDERS_PER_REQUEST: usize = 1000;
/// チャンクサイズの上限
pub const MAX_BATCH_SIZE: usize = 1000;
/// 負荷試験で生成する注文数の上限
pub const MAX_STRESS_ORDER_COUNT: u64 = 10_000;

pub const ERR_BODY_NOT_ARRAY: &str = "Body must be an array";
pub const ERR_ORDERS_EMPTY: &str = "Orders array cannot be empty";
pub const ERR_ITEMS_NOT_OBJECTS: &str = "All items must be objects";
pub const ERR_ORDER_ID: &str = "All orders must have a valid id (string)";
pub const ERR_ORDER_STATUS: &str = "All orders must have a valid status (string)";
pub const ERR_ORDER_AMOUNT: &str = "All orders must have a valid amount (number)";
pub const ERR_TOO_MANY_ORDERS: &str = "Maximum 1000 orders allowed per request";
pub const ERR_BATCH_SIZE: &str = "Batch size must be between 1 and 1000";
pub const ERR_STRESS_BODY: &str = "Body must be an object";
pub const ERR_ORDER_ID_FORMAT: &str =
    "Invalid order ID format. Must be 1-128 alphanumeric characters, hyphens, or underscores.";
pub const ERR_IDEMPOTENCY_KEY_FORMAT: &str =
    "Invalid idempotency key format. Must be 1-128 alphanumeric characters, hyphens, or underscores.";
pub const ERR_STATUS_VALUE: &str =
    "Invalid status. Must be one of: PENDING, PROCESSING, COMPLETED, FAILED";
pub const ERR_STRESS_ORDER_COUNT: &str = "orderCount must be a number between 1 and 10000";
pub const ERR_STRESS_BATCH_SIZE: &str = "batchSize must be a number between 1 and 1000";
pub const ERR_STRESS_CONCURRENCY: &str = "concurrentBatches must be a positive number";

/// 検証エラー
///
/// PayloadTooLarge だけは 413 で返す必要があるため、
/// メッセージ違いではなく別バリアントに分けている。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// リクエスト形状またはフィールド不正（400）
    Invalid(String),
    /// 注文数が上限超過（413）
    PayloadTooLarge,
}

impl ValidationError {
    fn invalid(message: &str) -> Self {
        Self::Invalid(message.to_string())
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Invalid(message) => message,
            Self::PayloadTooLarge => ERR_TOO_MANY_ORDERS,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// 注文1件の値検証
///
/// 型レベルの検証は `validate_orders_input` 済みの前提で、
/// ここでは値域を見る。バッチ全体は落とさず per-order で失敗させる用。
pub fn validate_order(order: &IncomingOrder) -> bool {
    !order.id.is_empty()
        && OrderStatus::parse(&order.status).is_some()
        && order.amount.is_finite()
        && order.amount >= 0.0
        && order.created_at > 0
        && order.updated_at > 0
}

/// バッチボディの形状検証
///
/// 通過した場合は未検証の注文列を返す。個々の注文の値域検証は
/// パイプライン側（`validate_order`）に委ねる。
pub fn validate_orders_input(body: &Value) -> Result<Vec<IncomingOrder>, ValidationError> {
    let items = body
        .as_array()
        .ok_or_else(|| ValidationError::invalid(ERR_BODY_NOT_ARRAY))?;

    if items.is_empty() {
        return Err(ValidationError::invalid(ERR_ORDERS_EMPTY));
    }
    if items.len() > MAX_ORDERS_PER_REQUEST {
        return Err(ValidationError::PayloadTooLarge);
    }

    for item in items {
        let obj = item
            .as_object()
            .ok_or_else(|| ValidationError::invalid(ERR_ITEMS_NOT_OBJECTS))?;
        if !obj.get("id").map(Value::is_string).unwrap_or(false) {
            return Err(ValidationError::invalid(ERR_ORDER_ID));
        }
        if !obj.get("status").map(Value::is_string).unwrap_or(false) {
            return Err(ValidationError::invalid(ERR_ORDER_STATUS));
        }
        if !obj.get("amount").map(Value::is_number).unwrap_or(false) {
            return Err(ValidationError::invalid(ERR_ORDER_AMOUNT));
        }
    }

    let mut orders = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<IncomingOrder>(item.clone()) {
            Ok(order) => orders.push(order),
            Err(_) => {
                // 形状検証は通過済みなので、崩れているのは時刻フィールドの型。
                // 時刻を不正値(0)に落とし、per-order 検証で弾かせる。
                let obj = item.as_object().expect("shape validated above");
                orders.push(IncomingOrder {
                    id: obj
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    status: obj
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    amount: obj.get("amount").and_then(Value::as_f64).unwrap_or(-1.0),
                    created_at: 0,
                    updated_at: 0,
                });
            }
        }
    }
    Ok(orders)
}

/// チャンクサイズの検証
///
/// None は設定値（`BATCH_SIZE`）にフォールバックする。
pub fn validate_batch_size(
    requested: Option<i64>,
    default_size: usize,
) -> Result<usize, ValidationError> {
    let size = match requested {
        Some(value) => value,
        None => default_size as i64,
    };
    if size < 1 || size > MAX_BATCH_SIZE as i64 {
        return Err(ValidationError::invalid(ERR_BATCH_SIZE));
    }
    Ok(size as usize)
}

/// 注文IDの形式検証: `^[A-Za-z0-9_-]{1,128}$`
pub fn validate_order_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-'))
}

/// Idempotency-Key の形式検証（注文IDと同じ字句規則）
pub fn validate_idempotency_key(key: &str) -> bool {
    validate_order_id(key)
}

/// 負荷試験設定の検証
///
/// ボディ省略時は全デフォルト。範囲外・非数値は個別の診断で弾く。
pub fn validate_stress_config(body: Option<&Value>) -> Result<StressConfig, ValidationError> {
    let mut config = StressConfig::default();

    let body = match body {
        None | Some(Value::Null) => return Ok(config),
        Some(value) => value,
    };
    let obj = body
        .as_object()
        .ok_or_else(|| ValidationError::invalid(ERR_STRESS_BODY))?;

    if let Some(raw) = obj.get("orderCount") {
        let count = raw
            .as_i64()
            .filter(|&n| n >= 1 && n <= MAX_STRESS_ORDER_COUNT as i64)
            .ok_or_else(|| ValidationError::invalid(ERR_STRESS_ORDER_COUNT))?;
        config.order_count = count as usize;
    }
    if let Some(raw) = obj.get("batchSize") {
        let size = raw
            .as_i64()
            .filter(|&n| n >= 1 && n <= MAX_BATCH_SIZE as i64)
            .ok_or_else(|| ValidationError::invalid(ERR_STRESS_BATCH_SIZE))?;
        config.batch_size = size as usize;
    }
    if let Some(raw) = obj.get("concurrentBatches") {
        let concurrency = raw
            .as_i64()
            .filter(|&n| n >= 1)
            .ok_or_else(|| ValidationError::invalid(ERR_STRESS_CONCURRENCY))?;
        config.concurrent_batches = concurrency as usize;
    }

    Ok(config)
}
