//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryJobStore**: 開発・テスト用のジョブストア
//! - **JsonFileJobStore**: CLI 用の単一ファイルストア
//! - **LocalInvoker**: プロセス内 handler を呼ぶ invoker
//! - **CommandInvoker**: 実行ファイルを呼ぶ invoker

mod job_table;

pub mod command_invoker;
pub mod file_store;
pub mod inmem_store;
pub mod local_invoker;

pub use self::command_invoker::CommandInvoker;
pub use self::file_store::JsonFileJobStore;
pub use self::inmem_store::InMemoryJobStore;
pub use self::local_invoker::{FnHandler, LocalInvoker, TargetHandler, handler_fn};
