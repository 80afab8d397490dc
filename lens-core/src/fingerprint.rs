//! Request fingerprinting
//!
//! A fingerprint is the cache key for a request: a SHA-256 digest over a
//! canonical encoding of every request field, including a digest of each
//! attachment's bytes. Each field is written as a tag byte followed by a
//! length-prefixed value so that no two distinct requests share an encoding.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::request::{JobRequest, Lens};

/// Number of leading prompt characters the legacy cache key kept
pub const LEGACY_PROMPT_PREFIX: usize = 50;

/// Deterministic content hash of a [`JobRequest`], rendered as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

/// Kind of result a fingerprint keys
const SCOPE_SINGLE: &[u8] = b"single";
const SCOPE_MULTI_LENS: &[u8] = b"multi-lens";

impl Fingerprint {
    /// Key for the result of running `request` as one job
    pub fn of(request: &JobRequest) -> Self {
        Self::scoped(SCOPE_SINGLE, request)
    }

    /// Key for the combined report of every single lens over `request`
    ///
    /// Lives in its own key space, so it never matches a single run of the
    /// same request. The request's own lens is irrelevant here.
    pub fn of_multi_lens(request: &JobRequest) -> Self {
        Self::scoped(SCOPE_MULTI_LENS, &request.with_lens(Lens::Unified))
    }

    fn scoped(scope: &[u8], request: &JobRequest) -> Self {
        let mut encoder = CanonicalEncoder::default();

        encoder.field(b'k', scope);
        encoder.field(b'q', request.query().as_bytes());
        encoder.field(b'c', request.company().as_bytes());
        encoder.field(b'l', request.lens().label().as_bytes());
        encoder.optional(b's', request.sector());
        encoder.optional(b'g', request.stage());
        encoder.optional(b'o', request.location());

        encoder.count(b'A', request.attachments().len());
        for attachment in request.attachments() {
            encoder.field(b'n', attachment.name.as_bytes());
            encoder.field(b'm', attachment.media_type.as_bytes());
            encoder.field(b'd', &Sha256::digest(&attachment.data));
        }

        encoder.count(b'V', request.collection_ids().len());
        for id in request.collection_ids() {
            encoder.field(b'v', id.as_bytes());
        }

        encoder.field(b'w', &[request.use_web_search() as u8]);
        encoder.field(b'x', &[request.use_code_interpreter() as u8]);
        encoder.field(b't', &request.max_tool_calls().to_be_bytes());

        Self(hex::encode(encoder.finish()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
struct CanonicalEncoder {
    hasher: Sha256,
}

impl CanonicalEncoder {
    fn field(&mut self, tag: u8, value: &[u8]) {
        self.hasher.update([tag]);
        self.hasher.update((value.len() as u64).to_be_bytes());
        self.hasher.update(value);
    }

    fn optional(&mut self, tag: u8, value: Option<&str>) {
        match value {
            Some(v) => {
                self.hasher.update([1]);
                self.field(tag, v.as_bytes());
            }
            None => self.hasher.update([0]),
        }
    }

    fn count(&mut self, tag: u8, n: usize) {
        self.field(tag, &(n as u64).to_be_bytes());
    }

    fn finish(self) -> Vec<u8> {
        self.hasher.finalize().to_vec()
    }
}

/// Key format used by the first browser release of the cache
///
/// Concatenates company, lens, attachment names and the first
/// [`LEGACY_PROMPT_PREFIX`] prompt characters, so requests that only differ
/// later in the prompt collide. Kept to recognise and document that scheme;
/// never used as a cache key.
pub fn legacy_cache_key(request: &JobRequest) -> String {
    let file_names = request
        .attachments()
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(",");
    let prefix: String = request.query().chars().take(LEGACY_PROMPT_PREFIX).collect();

    format!(
        "{}:{}:{}:{}",
        request.company(),
        request.lens().label(),
        file_names,
        prefix
    )
}
