//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。外部システム（ドキュメントストア、
//! 呼び出し可能な target、時計）へのインターフェースを定義し、実装の詳細を隠す。

pub mod clock;
pub mod id_generator;
pub mod invoker;
pub mod job_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::invoker::TargetInvoker;
pub use self::job_store::{ContinuationToken, JobStore, ListFilter, Page};
