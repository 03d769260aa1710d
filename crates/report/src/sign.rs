use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signed links stay valid for 24 hours.
pub const TOKEN_TTL_SECS: i64 = 24 * 3600;

/// Builds `?t=HEX64:EPOCH` query tokens over report paths. Without a key the
/// signer degrades to plain URLs.
#[derive(Clone)]
pub struct UrlSigner {
    key: Option<Vec<u8>>,
}

impl UrlSigner {
    pub fn new(key: Option<String>) -> Self {
        UrlSigner {
            key: key.filter(|k| !k.is_empty()).map(String::into_bytes),
        }
    }

    pub fn unsigned() -> Self {
        UrlSigner { key: None }
    }

    /// Public URL for a report path such as `2025-11-15/index.html`.
    pub fn signed_url(&self, base_url: &str, path: &str, now_epoch: i64) -> String {
        let base = base_url.trim_end_matches('/');
        match self.key.as_deref() {
            Some(key) => {
                let expiry = now_epoch + TOKEN_TTL_SECS;
                format!("{base}/{path}?t={}", token(key, path, expiry))
            }
            None => format!("{base}/{path}"),
        }
    }

    /// Constant-time verification of a presented token against `path`, plus
    /// the expiry check. Unsigned deployments accept nothing.
    pub fn verify(&self, path: &str, token: &str, now_epoch: i64) -> bool {
        let Some(key) = self.key.as_deref() else {
            return false;
        };
        let Some((sig_hex, expiry_str)) = token.split_once(':') else {
            return false;
        };
        let Ok(expiry) = expiry_str.parse::<i64>() else {
            return false;
        };
        if now_epoch > expiry {
            return false;
        }
        let Some(sig) = unhex(sig_hex) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
            return false;
        };
        mac.update(format!("{path}:{expiry}").as_bytes());
        mac.verify_slice(&sig).is_ok()
    }
}

/// `HEX64:EPOCH` where the hex part is HMAC-SHA256 of `path:expiry`.
fn token(key: &[u8], path: &str, expiry: i64) -> String {
    // HMAC accepts keys of any length; new_from_slice cannot fail here.
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(format!("{path}:{expiry}").as_bytes());
    format!("{}:{expiry}", hex(&mac.finalize().into_bytes()))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unhex(s: &str) -> Option<Vec<u8>> {
    // Byte-wise so a multi-byte token from the query string cannot land a
    // slice off a char boundary.
    let bytes = s.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }
    bytes
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            Some((hi as u8) << 4 | lo as u8)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_763_200_000;

    fn signer() -> UrlSigner {
        UrlSigner::new(Some("clef-secrete".to_string()))
    }

    fn extract_token(url: &str) -> &str {
        url.split_once("?t=").map(|(_, t)| t).unwrap()
    }

    #[test]
    fn unsigned_without_key() {
        let url = UrlSigner::unsigned().signed_url(
            "https://rapports.example.org/",
            "2025-11-15/index.html",
            NOW,
        );
        assert_eq!(url, "https://rapports.example.org/2025-11-15/index.html");
    }

    #[test]
    fn signed_url_shape() {
        let url = signer().signed_url("https://r.example.org", "2025-11-15/family-pets.html", NOW);
        let token = extract_token(&url);
        let (sig, expiry) = token.split_once(':').unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(expiry.parse::<i64>().unwrap(), NOW + TOKEN_TTL_SECS);
    }

    #[test]
    fn round_trip_verifies_before_expiry() {
        let s = signer();
        let url = s.signed_url("https://r", "2025-11-15/index.html", NOW);
        let token = extract_token(&url);
        assert!(s.verify("2025-11-15/index.html", token, NOW + 60));
    }

    #[test]
    fn expired_token_rejected() {
        let s = signer();
        let url = s.signed_url("https://r", "p/index.html", NOW);
        let token = extract_token(&url);
        assert!(!s.verify("p/index.html", token, NOW + TOKEN_TTL_SECS + 1));
    }

    #[test]
    fn path_mutation_rejected() {
        let s = signer();
        let url = s.signed_url("https://r", "p/index.html", NOW);
        let token = extract_token(&url);
        assert!(!s.verify("p/index2.html", token, NOW));
    }

    #[test]
    fn signature_mutation_rejected() {
        let s = signer();
        let url = s.signed_url("https://r", "p/index.html", NOW);
        let token = extract_token(&url).to_string();
        let mut chars: Vec<char> = token.chars().collect();
        chars[0] = if chars[0] == '0' { '1' } else { '0' };
        let mutated: String = chars.into_iter().collect();
        assert!(!s.verify("p/index.html", &mutated, NOW));
    }

    #[test]
    fn malformed_tokens_rejected() {
        let s = signer();
        assert!(!s.verify("p", "not-a-token", NOW));
        assert!(!s.verify("p", "abcd:notanumber", NOW));
        assert!(!s.verify("p", "zz:123", NOW));
    }

    #[test]
    fn multibyte_token_rejected_without_panic() {
        let s = signer();
        assert!(!s.verify("2025-11-15/index.html", "€€:123", NOW));
        assert!(!s.verify("2025-11-15/index.html", "é0:123", NOW));
    }

    #[test]
    fn different_key_rejects() {
        let a = signer();
        let b = UrlSigner::new(Some("autre-clef".to_string()));
        let url = a.signed_url("https://r", "p/index.html", NOW);
        assert!(!b.verify("p/index.html", extract_token(&url), NOW));
    }
}
