//! IdGenerator port - ジョブ ID 生成の抽象化
//!
//! テスト容易性のために trait として抽象化しています。
//!
//! # 実装
//! - **UlidGenerator**: Clock ベースの ULID を token として使う（本番用）

use ulid::Ulid;

use crate::ports::Clock;

/// IdGenerator produces the random per-job token hashed into a `JobId`.
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数タスクから使える）
pub trait IdGenerator: Send + Sync {
    /// A fresh token. Must differ on every call.
    fn generate_token(&self) -> Ulid;
}

/// UlidGenerator は ULID ベースの token 生成器
///
/// Clock を使うので、テストでは FixedClock で timestamp 部分を固定できる。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_token(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}
