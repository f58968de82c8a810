//! herald-core
//!
//! Core building blocks for the Herald job dispatcher.
//!
//! ジョブは実行予定時刻を分単位に切り捨てた bucket に属する。
//! Dispatcher は毎分、現在の bucket のジョブを取り出して target を並行に呼び出し、
//! correlation token でレスポンスを突き合わせて結果を書き戻す。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（bucket, ids, job, target, envelope, errors）
//! - **ports**: 抽象化レイヤー（JobStore, TargetInvoker, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（builder, dispatcher, tick_loop, intake）
//! - **impls**: 実装（InMemoryJobStore, JsonFileJobStore, LocalInvoker, CommandInvoker）
//! - **registry**: target_type → endpoint の対応表
//! - **config**: figment による設定読み込み

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod registry;
