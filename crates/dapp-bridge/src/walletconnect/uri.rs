//! `wc:` uri parsing.
//!
//! ```text
//! wc:<topic>@<version>?relay-protocol=irn&symKey=<key>
//! ```

use std::collections::BTreeMap;

use url::Url;

use crate::errors::{BridgeError, BridgeResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletConnectUri {
    pub topic: String,
    pub version: u32,
    /// Query parameters, percent-decoded.
    pub params: BTreeMap<String, String>,
}

impl WalletConnectUri {
    pub fn parse(uri: &str) -> BridgeResult<Self> {
        let invalid = || BridgeError::InvalidUri(uri.to_string());

        let url = Url::parse(uri.trim()).map_err(|_| invalid())?;
        if url.scheme() != "wc" {
            return Err(invalid());
        }

        // `wc:topic@2` is an opaque path; legacy `wc://topic@1` parses as userinfo and host.
        let (topic, version) = match url.host_str() {
            Some(host) => (url.username().to_string(), host.to_string()),
            None => {
                let (topic, version) = url.path().split_once('@').ok_or_else(invalid)?;
                (topic.to_string(), version.to_string())
            }
        };
        if topic.is_empty() {
            return Err(invalid());
        }
        let version = version.trim_end_matches('/').parse::<u32>().map_err(|_| invalid())?;

        let params = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        Ok(Self { topic, version, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_v2_uri() {
        let uri = WalletConnectUri::parse("wc:7f6e504b@2?relay-protocol=irn&symKey=587d5484").unwrap();

        assert_eq!(uri.topic, "7f6e504b");
        assert_eq!(uri.version, 2);
        assert_eq!(uri.params.get("relay-protocol").map(String::as_str), Some("irn"));
        assert_eq!(uri.params.get("symKey").map(String::as_str), Some("587d5484"));
    }

    #[test]
    fn test_parse_v1_uri_with_slashes() {
        let uri = WalletConnectUri::parse("wc://8a5e5bdc-a0e4-4702@1?bridge=https%3A%2F%2Fbridge&key=41791102").unwrap();
        assert_eq!(uri.version, 1);
        assert_eq!(uri.topic, "8a5e5bdc-a0e4-4702");
        assert_eq!(uri.params.get("key").map(String::as_str), Some("41791102"));
    }

    #[test]
    fn test_parse_decodes_query_values() {
        let uri = WalletConnectUri::parse("wc:8a5e@1?bridge=https%3A%2F%2Fbridge.walletconnect.org&name=My+Dapp").unwrap();

        assert_eq!(
            uri.params.get("bridge").map(String::as_str),
            Some("https://bridge.walletconnect.org")
        );
        assert_eq!(uri.params.get("name").map(String::as_str), Some("My Dapp"));
    }

    #[test]
    fn test_parse_rejects_non_wc_scheme() {
        assert!(matches!(
            WalletConnectUri::parse("https://example.com"),
            Err(BridgeError::InvalidUri(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_version() {
        assert!(WalletConnectUri::parse("wc:abc?symKey=1").is_err());
        assert!(WalletConnectUri::parse("wc:abc@two").is_err());
    }
}
