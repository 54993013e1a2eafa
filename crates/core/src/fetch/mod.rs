//! HTTP capability used by source pipelines.
//!
//! [`Fetcher`] is the seam: [`HttpFetcher`] talks to the network through a
//! shared persisted [`CookieJar`], tests substitute a mock.

mod cookies;
mod http;
mod types;
mod uri;

pub use cookies::{CookieJar, StoredCookie};
pub use http::{browser_headers, decode_body, merge_headers, HttpFetcher};
pub use types::{FetchError, FetchRequest, FetchResponse, Fetcher, Method};
pub use uri::{append_headers, bare_uri, split_headers};
