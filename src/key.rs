//! Request identity computation using BLAKE3
//!
//! key = hex(hash("method" || kind || url_len || url || params || headers || body))
//!
//! The key is shared by the response cache, the state registry and the in-flight request
//! table, so two descriptors describing the same request must always produce the same key.

use crate::method::Method;
use blake3::Hasher;
use unicode_normalization::UnicodeNormalization;

/// Derives cache and dedup identities for request descriptors
pub struct KeyGenerator;

impl KeyGenerator {
    /// Compute the identity of a method.
    ///
    /// Params are already ordered by name; names and values are NFC-normalized so that
    /// visually identical strings hash the same. The display name never participates.
    pub fn key(method: &Method) -> String {
        let mut hasher = Hasher::new();

        // Type discriminator
        hasher.update(b"method");

        hasher.update(method.kind().as_str().as_bytes());
        hasher.update(b"\n");

        let url = method.url().trim();
        hasher.update(&(url.len() as u64).to_be_bytes());
        hasher.update(url.as_bytes());

        hasher.update(&(method.params().len() as u64).to_be_bytes());
        for (name, value) in method.params() {
            update_field(&mut hasher, &normalize(name), &normalize(value));
        }

        hasher.update(&(method.headers().len() as u64).to_be_bytes());
        for (name, value) in method.headers() {
            update_field(&mut hasher, name, value.trim());
        }

        match method.body_value() {
            Some(body) => {
                // serde_json maps are ordered, so the encoding is canonical
                let encoded = body.to_string();
                hasher.update(b"body:");
                hasher.update(&(encoded.len() as u64).to_be_bytes());
                hasher.update(encoded.as_bytes());
            }
            None => {
                hasher.update(b"nobody");
            }
        }

        hex::encode(hasher.finalize().as_bytes())
    }
}

fn normalize(text: &str) -> String {
    text.nfc().collect()
}

fn update_field(hasher: &mut Hasher, name: &str, value: &str) {
    hasher.update(&(name.len() as u64).to_be_bytes());
    hasher.update(name.as_bytes());
    hasher.update(b":");
    hasher.update(&(value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}
