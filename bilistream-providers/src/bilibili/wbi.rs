//! WBI request signing
//!
//! The web player endpoints (`/x/player/wbi/*`) reject unsigned or badly
//! signed requests with -412. The signature is an MD5 over the sorted,
//! percent-encoded query plus a "mixin key" that is derived from the two
//! key URLs published by the nav endpoint.

use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::error::BilibiliError;

/// Backend-mandated permutation applied to `img_key || sub_key`.
const MIXIN_KEY_ENC_TAB: [usize; 64] = [
    46, 47, 18, 2, 53, 8, 23, 32, 15, 50, 10, 31, 58, 3, 45, 35, 27, 43, 5, 49, 33, 9, 42, 19, 29,
    28, 14, 39, 12, 38, 41, 13, 37, 48, 7, 16, 24, 55, 40, 61, 26, 17, 0, 1, 60, 51, 30, 4, 22, 25,
    54, 21, 56, 59, 6, 63, 57, 62, 11, 36, 20, 34, 44, 52,
];

const MIXIN_KEY_LEN: usize = 32;

/// Everything except RFC 3986 unreserved characters is escaped.
const WBI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Characters the backend strips from values before hashing.
const STRIPPED_CHARS: [char; 5] = ['!', '\'', '(', ')', '*'];

pub const TIMESTAMP_PARAM: &str = "wts";
pub const SIGNATURE_PARAM: &str = "w_rid";

/// Signing key pair (`img_key`, `sub_key`) for one authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WbiKeys {
    img_key: String,
    sub_key: String,
}

impl WbiKeys {
    /// Build a key pair from already extracted key fragments
    pub fn new(img_key: impl Into<String>, sub_key: impl Into<String>) -> Result<Self, BilibiliError> {
        let img_key = img_key.into();
        let sub_key = sub_key.into();
        if img_key.is_empty() || sub_key.is_empty() {
            return Err(BilibiliError::MissingSigningKeys);
        }
        Ok(Self { img_key, sub_key })
    }

    /// Derive the key pair from the nav endpoint's `wbi_img` URLs.
    ///
    /// Each fragment is the URL's last path segment without its extension,
    /// e.g. `https://i0.hdslb.com/bfs/wbi/7cd0...077c.png` -> `7cd0...077c`.
    pub fn from_urls(img_url: &str, sub_url: &str) -> Result<Self, BilibiliError> {
        let img_key = key_fragment(img_url).ok_or(BilibiliError::MissingSigningKeys)?;
        let sub_key = key_fragment(sub_url).ok_or(BilibiliError::MissingSigningKeys)?;
        Self::new(img_key, sub_key)
    }

    #[must_use]
    pub fn img_key(&self) -> &str {
        &self.img_key
    }

    #[must_use]
    pub fn sub_key(&self) -> &str {
        &self.sub_key
    }

    /// 32-character key mixed into every signature
    #[must_use]
    pub fn mixin_key(&self) -> String {
        let raw = format!("{}{}", self.img_key, self.sub_key);
        let raw = raw.as_bytes();
        MIXIN_KEY_ENC_TAB
            .iter()
            .filter_map(|&i| raw.get(i).copied())
            .take(MIXIN_KEY_LEN)
            .map(char::from)
            .collect()
    }
}

/// Derive a key pair from two key URLs. See [`WbiKeys::from_urls`].
pub fn derive_keys(img_url: &str, sub_url: &str) -> Result<WbiKeys, BilibiliError> {
    WbiKeys::from_urls(img_url, sub_url)
}

fn key_fragment(url: &str) -> Option<&str> {
    let file_name = url.rsplit('/').next()?;
    let stem = file_name.split('.').next()?;
    (!stem.is_empty()).then_some(stem)
}

/// A signed parameter set, ready to be appended to a request URL.
///
/// Parameters are kept sorted by key; `wts` is part of the parameter set and
/// `w_rid` is computed once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    params: BTreeMap<String, String>,
    query: String,
    w_rid: String,
}

impl SignedRequest {
    /// Look up a signed parameter value (after sanitising)
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        if key == SIGNATURE_PARAM {
            return Some(&self.w_rid);
        }
        self.params.get(key).map(String::as_str)
    }

    /// Sorted parameters, without the signature
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn w_rid(&self) -> &str {
        &self.w_rid
    }

    /// Timestamp the request was signed with
    #[must_use]
    pub fn wts(&self) -> Option<i64> {
        self.params.get(TIMESTAMP_PARAM).and_then(|v| v.parse().ok())
    }

    /// Encoded query string including `w_rid`, exactly as it was hashed
    #[must_use]
    pub fn query_string(&self) -> String {
        format!("{}&{SIGNATURE_PARAM}={}", self.query, self.w_rid)
    }
}

/// Sign a parameter set with the given keys at unix time `wts`.
///
/// Same inputs always produce the same signature.
pub fn sign<I, K, V>(params: I, keys: &WbiKeys, wts: i64) -> SignedRequest
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: AsRef<str>,
{
    let mut params: BTreeMap<String, String> = params
        .into_iter()
        .map(|(k, v)| (k.into(), sanitize(v.as_ref())))
        .collect();
    params.insert(TIMESTAMP_PARAM.to_string(), wts.to_string());

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let w_rid = format!("{:x}", md5::compute(format!("{query}{}", keys.mixin_key())));

    SignedRequest { params, query, w_rid }
}

fn sanitize(value: &str) -> String {
    value.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect()
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, WBI_ENCODE_SET).to_string()
}
