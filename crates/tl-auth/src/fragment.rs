//! Token delivery through the URL fragment (`#token=<percent-encoded>`).

use std::borrow::Cow;

/// The visible address the fragment was delivered in
pub trait AddressBar: Send + Sync {
    /// Drop the fragment from the visible address without reloading
    fn clear_fragment(&self);
}

/// Address bar for hosts that have none
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAddressBar;

impl AddressBar for NoAddressBar {
    fn clear_fragment(&self) {}
}

/// Extract the delivered token from a fragment
///
/// Accepts the fragment with or without its leading `#`. A value that is not
/// valid percent-encoding is returned raw. Missing or empty tokens yield
/// `None`.
pub fn parse_token(fragment: &str) -> Option<String> {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);

    let raw = fragment
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))?;
    if raw.is_empty() {
        return None;
    }

    let decoded = match urlencoding::decode(raw) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::debug!("Token fragment is not valid percent-encoding ({}), using raw value", e);
            Cow::Borrowed(raw)
        }
    };
    Some(decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_percent_encoding() {
        assert_eq!(parse_token("#token=abc%20def").as_deref(), Some("abc def"));
        assert_eq!(parse_token("token=plain").as_deref(), Some("plain"));
    }

    #[test]
    fn test_invalid_encoding_falls_back_to_raw() {
        // %FF%FE is not UTF-8 once decoded
        assert_eq!(parse_token("#token=a%FF%FEb").as_deref(), Some("a%FF%FEb"));
    }

    #[test]
    fn test_other_parameters() {
        assert_eq!(
            parse_token("#state=xyz&token=t0k&expires=1").as_deref(),
            Some("t0k")
        );
        assert!(parse_token("#access=abc").is_none());
        assert!(parse_token("#token=").is_none());
        assert!(parse_token("").is_none());
    }
}
