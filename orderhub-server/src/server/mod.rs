//! サーバー入口層
//!
//! 現状はHTTPのみ。ルーティングとハンドラは http/ 配下に集約する。

pub mod http;
