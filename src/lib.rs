//! # LeadHub (multi-tenant trade lead API)
//!
//! `leadhub` serves tenants, users and trade leads over HTTP. Handlers are thin;
//! the interesting part is the request pipeline every call goes through.
//!
//! ## Request pipeline
//!
//! Each request runs through an ordered list of interceptors before it reaches a
//! handler:
//!
//! 1. **Metrics** counts requests and response statuses.
//! 2. **Recover panic** turns a panic anywhere below it into a `500` with
//!    `Connection: close` so the listener keeps serving.
//! 3. **Rate limit** admits requests per client IP using lazily refilled token
//!    buckets; idle buckets are swept once a minute.
//! 4. **Authenticate** resolves `Authorization: Bearer <token>` into an
//!    [`data::Identity`] and attaches it to the request. A missing header means
//!    [`data::Identity::Anonymous`], never an error.
//!
//! Route groups add authorization gates on top (authenticated, activated,
//! permission code). Each gate assumes the previous one already held. Trade
//! leads are always read and written under the caller's own tenant.
//!
//! ## Tokens
//!
//! Bearer and activation tokens are random 32-byte values handed to the caller
//! once. Only their SHA-256 digest is stored, so a leaked store does not leak
//! usable credentials.
//!
//! ## Background work
//!
//! Side effects such as sending mail run on the [`api::background::Background`]
//! launcher. Shutdown waits for in-flight tasks up to a configurable timeout.

pub mod api;
pub mod cli;
pub mod data;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }
}
