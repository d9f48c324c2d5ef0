use hmac::{Hmac, KeyInit, Mac};
use sha2::Sha256;
use std::fmt;

/// Hashed client identifier used as the rate-limit bucket key.
///
/// Raw addresses never leave [`ClientKey::derive`], so the key is safe to log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn derive(raw: &str, secret: &[u8]) -> Self {
        let raw = raw.trim();
        let raw = if raw.is_empty() { "unknown" } else { raw };
        match Hmac::<Sha256>::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(raw.as_bytes());
                let digest = mac.finalize().into_bytes();
                Self(hex::encode(&digest[..12]))
            }
            // HMAC accepts keys of any length; keep a stable key anyway.
            Err(_) => Self(format!("raw:{raw}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Picks the client address from proxy headers.
///
/// Order: `cf-connecting-ip`, first `x-forwarded-for` hop, `x-real-ip`, then
/// the socket peer.
pub fn client_address<'a>(
    cf_connecting_ip: Option<&'a str>,
    forwarded_for: Option<&'a str>,
    real_ip: Option<&'a str>,
    peer: Option<&'a str>,
) -> &'a str {
    let non_empty = |v: Option<&'a str>| v.map(str::trim).filter(|v| !v.is_empty());

    non_empty(cf_connecting_ip)
        .or_else(|| non_empty(forwarded_for.and_then(|v| v.split(',').next())))
        .or_else(|| non_empty(real_ip))
        .or_else(|| non_empty(peer))
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_address_same_key() {
        let a = ClientKey::derive("10.0.0.1", b"k");
        let b = ClientKey::derive(" 10.0.0.1 ", b"k");
        let c = ClientKey::derive("10.0.0.2", b"k");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.as_str().contains("10.0.0.1"));
        assert_eq!(a.as_str().len(), 24);
    }

    #[test]
    fn key_depends_on_secret() {
        assert_ne!(
            ClientKey::derive("10.0.0.1", b"one"),
            ClientKey::derive("10.0.0.1", b"two")
        );
    }

    #[test]
    fn address_precedence() {
        assert_eq!(
            client_address(Some("1.1.1.1"), Some("2.2.2.2"), Some("3.3.3.3"), None),
            "1.1.1.1"
        );
        assert_eq!(
            client_address(None, Some(" 2.2.2.2 , 9.9.9.9"), Some("3.3.3.3"), None),
            "2.2.2.2"
        );
        assert_eq!(client_address(None, None, Some("3.3.3.3"), Some("4.4.4.4")), "3.3.3.3");
        assert_eq!(client_address(None, Some(""), None, Some("4.4.4.4")), "4.4.4.4");
        assert_eq!(client_address(None, None, None, None), "unknown");
    }
}
