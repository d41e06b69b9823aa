//! ダッシュボードで観測されているイベント名
//!
//! 開いた語彙の一例であり、ここにない名前も自由に使える。
//! コアはペイロードの形を解釈しない。

pub const ORDER_CREATED: &str = "order-created";
pub const INVESTMENT_CREATED: &str = "investment-created";
pub const ORCHESTRATION_TASK_UPDATE: &str = "orchestration-task-update";
pub const AGENT_ACTIVITY_NEW: &str = "agent-activity-new";
pub const ORCHESTRATION_STREAM_ITEM: &str = "orchestration-stream-item";
pub const INVENTORY_UPDATE: &str = "inventory-update";
pub const LOW_STOCK_ALERT: &str = "low-stock-alert";
pub const FUNDING_TOTAL_UPDATE: &str = "funding-total-update";
