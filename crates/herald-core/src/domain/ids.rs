//! Domain identifiers.
//!
//! # Job ID スキーム
//! `id = sha256_hex("{bucket}-{token}")`
//!
//! - **token**: ジョブごとに新しく生成する ULID（リクエスト単位ではない）
//! - **bucket**: ハッシュ入力に含めることで、同じ分のジョブもインデックス上で均等に分散する
//! - 同じ `(bucket, token)` からは必ず同じ id が得られる（リプレイ時の冪等性）
//!
//! The hash is only used for compactness and uniform key distribution, not
//! for secrecy.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ulid::Ulid;

use super::bucket::Bucket;

/// Identifier of a scheduled job (store primary key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Derives the id for a job scheduled in `bucket` with the random `token`.
    pub fn derive(bucket: &Bucket, token: &Ulid) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{bucket}-{token}").as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps an id read from an external source (CLI argument, store key).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Token carried in an invocation request and echoed back in the response.
///
/// Rendered as `"{bucket}-{id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    pub fn new(bucket: &Bucket, id: &JobId) -> Self {
        Self(format!("{bucket}-{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CorrelationToken {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket() -> Bucket {
        Bucket::parse("202401010930").unwrap()
    }

    #[test]
    fn derive_is_deterministic() {
        let token = Ulid::new();
        assert_eq!(
            JobId::derive(&bucket(), &token),
            JobId::derive(&bucket(), &token)
        );
    }

    #[test]
    fn fresh_tokens_give_distinct_ids() {
        let a = JobId::derive(&bucket(), &Ulid::new());
        let b = JobId::derive(&bucket(), &Ulid::new());
        assert_ne!(a, b);
    }

    #[test]
    fn bucket_is_part_of_the_hash_input() {
        let token = Ulid::new();
        let a = JobId::derive(&bucket(), &token);
        let b = JobId::derive(&bucket().next(), &token);
        assert_ne!(a, b);
    }

    #[test]
    fn id_is_lowercase_sha256_hex() {
        let id = JobId::derive(&bucket(), &Ulid::new());
        assert_eq!(id.as_str().len(), 64);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn correlation_token_joins_bucket_and_id() {
        let id = JobId::from_raw("abc");
        let token = CorrelationToken::new(&bucket(), &id);
        assert_eq!(token.as_str(), "202401010930-abc");
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = JobId::from_raw("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }
}
