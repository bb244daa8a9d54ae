//! Small helpers shared by the outbound REST clients.

use reqwest::Response;

/// Pass a successful response through; turn anything else into a message
/// carrying the status code and body.
pub async fn expect_success(resp: Response, what: &str) -> Result<Response, String> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(format!("{} failed with status {}: {}", what, status, body.trim()))
}

/// Join a base URL and a path without doubling slashes
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://git/", "/api/v1/x"), "http://git/api/v1/x");
        assert_eq!(join_url("http://git", "api/v1/x"), "http://git/api/v1/x");
    }
}
