//! Firmware byte acquisition with ordered mirror fallback
//!
//! The manifest points at release assets on hosts that do not always allow
//! cross-origin downloads. Acquisition therefore walks an ordered list of
//! candidate locations - the manifest URL first, then deterministic mirror
//! rewrites - and stops at the first candidate that yields a non-empty
//! body.

use maybe_async::maybe_async;

use crate::error::{FetchError, FlowError};

/// Mirror prefix applied to GitHub release-asset URLs.
///
/// GitHub's release download host redirects to object storage without
/// permissive CORS headers; the mirror proxies the same path with them.
const RELEASE_MIRROR_PREFIX: &str = "https://mirror.ghproxy.com/";

/// Fetches a URL and returns the response body.
///
/// A non-success status is an error; implementations never retry.
#[maybe_async(AFIT)]
pub trait ByteFetcher {
    /// Fetch `url` and return the body bytes.
    async fn fetch(&mut self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Ordered download candidates for a firmware URL.
///
/// Pure function: the manifest URL always comes first, followed by the
/// mirror rewrite when the URL matches the GitHub release-asset shape.
pub fn candidate_urls(url: &str) -> Vec<String> {
    let mut candidates = vec![url.to_string()];
    if let Some(mirror) = github_release_mirror(url) {
        candidates.push(mirror);
    }
    candidates
}

/// Mirror rewrite for `https://github.com/{owner}/{repo}/releases/download/{tag}/{file}`.
fn github_release_mirror(url: &str) -> Option<String> {
    let rest = url.strip_prefix("https://github.com/")?;
    let mut parts = rest.splitn(3, '/');
    let owner = parts.next()?;
    let repo = parts.next()?;
    let tail = parts.next()?;
    let asset = tail.strip_prefix("releases/download/")?;

    // The asset path must still hold a tag and a filename.
    let mut asset_parts = asset.splitn(2, '/');
    let tag = asset_parts.next()?;
    let file = asset_parts.next()?;
    if owner.is_empty() || repo.is_empty() || tag.is_empty() || file.is_empty() {
        return None;
    }

    Some(format!("{}{}", RELEASE_MIRROR_PREFIX, url))
}

/// Download firmware bytes, trying each candidate strictly in order.
///
/// A candidate succeeds only when the fetch succeeds and the body is
/// non-empty. When every candidate fails the error carries the last
/// observed failure and points the user at the local upload path.
#[maybe_async]
pub async fn acquire<B: ByteFetcher>(fetcher: &mut B, url: &str) -> Result<Vec<u8>, FlowError> {
    let candidates = candidate_urls(url);
    let mut last_error = FetchError::Network("no download candidates".to_string());

    for candidate in &candidates {
        log::debug!("download: trying {}", candidate);
        match fetcher.fetch(candidate).await {
            Ok(bytes) if !bytes.is_empty() => {
                log::info!("download: got {} bytes from {}", bytes.len(), candidate);
                return Ok(bytes);
            }
            Ok(_) => {
                log::warn!("download: empty response from {}", candidate);
                last_error = FetchError::EmptyBody;
            }
            Err(e) => {
                log::warn!("download: {} failed: {}", candidate, e);
                last_error = e;
            }
        }
    }

    Err(FlowError::FirmwareDownloadFailed(format!(
        "{} (tried {} locations; upload the firmware file manually instead)",
        last_error,
        candidates.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASE_URL: &str =
        "https://github.com/acme/firmware/releases/download/v1.2.0/esp32.bin";

    #[test]
    fn test_candidates_for_release_url() {
        let urls = candidate_urls(RELEASE_URL);
        assert_eq!(
            urls,
            [
                RELEASE_URL.to_string(),
                format!("https://mirror.ghproxy.com/{}", RELEASE_URL),
            ]
        );
    }

    #[test]
    fn test_candidates_for_other_hosts() {
        let url = "https://downloads.example.com/fw/esp32.bin";
        assert_eq!(candidate_urls(url), [url.to_string()]);
    }

    #[test]
    fn test_no_mirror_for_non_release_github_paths() {
        assert_eq!(
            candidate_urls("https://github.com/acme/firmware/archive/main.zip").len(),
            1
        );
        assert_eq!(
            candidate_urls("https://github.com/acme/firmware/releases/download/v1").len(),
            1
        );
    }

    #[test]
    fn test_mirror_requires_https_github() {
        assert_eq!(
            candidate_urls("http://github.com/acme/firmware/releases/download/v1/fw.bin").len(),
            1
        );
    }
}
