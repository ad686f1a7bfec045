//! URL validation for transfer endpoints

use edx_errors::{Error, NetworkError};
use url::Url;

/// Validate URL and check for supported protocols
pub(crate) fn validate_url(url: &str) -> Result<Url, Error> {
    let parsed = Url::parse(url).map_err(|e| NetworkError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(NetworkError::UnsupportedProtocol {
            protocol: scheme.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://portal.example/upload").is_ok());
        assert!(validate_url("http://127.0.0.1:9000/x").is_ok());
        assert!(matches!(
            validate_url("ftp://portal.example/x"),
            Err(Error::Network(NetworkError::UnsupportedProtocol { .. }))
        ));
        assert!(validate_url("not a url").is_err());
    }
}
