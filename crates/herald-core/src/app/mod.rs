//! App - アプリケーション層
//!
//! ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **DispatcherBuilder**: Dispatcher の構築とワイヤリング
//! - **Dispatcher**: 1 bucket 分の query→invoke→aggregate→persist
//! - **TickLoop**: 分ごとに Dispatcher を起動
//! - **JobIntake**: スケジュール登録（検証してから pending ジョブを保存）

pub mod builder;
pub mod dispatcher;
pub mod intake;
pub mod report;
pub mod tick_loop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, DispatcherBuilder};
pub use self::dispatcher::{Dispatcher, NO_MATCHING_RESPONSE};
pub use self::intake::{IntakeError, IntakePolicy, JobIntake, MAX_LEAD_MINUTES, ScheduleRequest};
pub use self::report::{CycleCounts, CyclePhase, CycleReport};
pub use self::tick_loop::{TickConfig, TickLoop};
