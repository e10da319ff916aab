//! Container hostname derived from the image name.

use crate::env::container::MAX_HOSTNAME_LEN;
use regex::Regex;
use std::sync::LazyLock;

static INVALID_HOSTNAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9-]").expect("hostname regex is valid"));

/// Last path segment of `image`, with every character outside
/// `[a-zA-Z0-9-]` replaced by `-`, cut to the hostname length limit.
pub fn derive_hostname(image: &str) -> String {
    let base = image.rsplit('/').next().unwrap_or(image);
    let mut hostname = INVALID_HOSTNAME_CHARS.replace_all(base, "-").into_owned();
    // only ASCII remains, so any index is a char boundary
    hostname.truncate(MAX_HOSTNAME_LEN);
    hostname
}
