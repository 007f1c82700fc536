use hmac::{Hmac, Mac, NewMac};
use hyper::http::request::Builder;
use hyper::Uri;
use sha2::{Digest, Sha256, Sha512};

use crate::exchanges::rest_client::{RequestType, RestHeaders};
use crate::settings::VenueKind;

type HmacSha512 = Hmac<Sha512>;

/// `RestHeaders` implementation selecting one of the three historically-observed
/// signing conventions (§4.A) by `VenueKind`.
pub struct VenueHeaders {
    pub venue_kind: VenueKind,
    pub api_key: String,
    pub secret_key: String,
}

impl VenueHeaders {
    pub fn new(venue_kind: VenueKind, api_key: String, secret_key: String) -> Self {
        Self {
            venue_kind,
            api_key,
            secret_key,
        }
    }
}

impl RestHeaders for VenueHeaders {
    fn add_specific_headers(
        &self,
        builder: Builder,
        uri: &Uri,
        _request_type: RequestType,
        body: &[u8],
    ) -> Builder {
        let endpoint = uri.path();
        match self.venue_kind {
            VenueKind::MtGoxStyle => {
                let mac = sign_mtgox(&self.secret_key, endpoint, body);
                builder
                    .header("Rest-Key", &self.api_key)
                    .header("Rest-Sign", base64::encode(mac))
            }
            VenueKind::KrakenStyle => {
                let mac = sign_kraken(&self.secret_key, endpoint, body);
                builder
                    .header("API-Key", &self.api_key)
                    .header("API-Sign", base64::encode(mac))
            }
            VenueKind::PoloniexStyle => {
                let mac = sign_poloniex(&self.secret_key, body);
                builder
                    .header("Key", &self.api_key)
                    .header("Sign", hex::encode(mac))
            }
        }
    }
}

/// `message = endpoint || 0x00 || body`; `MAC = HMAC-SHA512(base64-decoded secret, message)`.
fn sign_mtgox(secret_key: &str, endpoint: &str, body: &[u8]) -> Vec<u8> {
    let secret = base64::decode(secret_key).expect("invalid base64 secret key");
    let mut message = Vec::with_capacity(endpoint.len() + 1 + body.len());
    message.extend_from_slice(endpoint.as_bytes());
    message.push(0u8);
    message.extend_from_slice(body);

    let mut mac = HmacSha512::new_from_slice(&secret).expect("HMAC accepts keys of any size");
    mac.update(&message);
    mac.finalize().into_bytes().to_vec()
}

/// `message = "/0/" + endpoint + SHA256(nonce_ascii || body)`; `MAC = HMAC-SHA512(base64-decoded secret, message)`.
///
/// `nonce_ascii` is extracted from the already-encoded `body`, which is
/// expected to carry a `nonce=<value>` field (the caller is responsible for
/// putting it there before signing).
fn sign_kraken(secret_key: &str, endpoint: &str, body: &[u8]) -> Vec<u8> {
    let secret = base64::decode(secret_key).expect("invalid base64 secret key");
    let nonce = extract_nonce(body).unwrap_or_default();

    let mut sha256 = Sha256::new();
    sha256.update(nonce.as_bytes());
    sha256.update(body);
    let digest = sha256.finalize();

    let mut message = Vec::with_capacity(3 + endpoint.len() + digest.len());
    message.extend_from_slice(b"/0/");
    message.extend_from_slice(endpoint.as_bytes());
    message.extend_from_slice(&digest);

    let mut mac = HmacSha512::new_from_slice(&secret).expect("HMAC accepts keys of any size");
    mac.update(&message);
    mac.finalize().into_bytes().to_vec()
}

/// `message = body`; `MAC = hex-HMAC-SHA512(secret, body)`.
fn sign_poloniex(secret_key: &str, body: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha512::new_from_slice(secret_key.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

fn extract_nonce(body: &[u8]) -> Option<String> {
    let body = std::str::from_utf8(body).ok()?;
    body.split('&').find_map(|kv| {
        let (key, value) = kv.split_once('=')?;
        (key == "nonce").then(|| value.to_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mtgox_signature_is_deterministic() {
        let secret = base64::encode("a-secret-key-material");
        let first = sign_mtgox(&secret, "/api/0/info", b"nonce=1");
        let second = sign_mtgox(&secret, "/api/0/info", b"nonce=1");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn kraken_signature_changes_with_nonce() {
        let secret = base64::encode("another-secret");
        let first = sign_kraken(&secret, "/0/private/AddOrder", b"nonce=1&pair=XBTUSD");
        let second = sign_kraken(&secret, "/0/private/AddOrder", b"nonce=2&pair=XBTUSD");
        assert_ne!(first, second);
    }

    #[test]
    fn poloniex_signature_is_hex_encodable() {
        let mac = sign_poloniex("plain-secret", b"command=returnBalances&nonce=1");
        assert_eq!(mac.len(), 64);
        assert_eq!(hex::encode(&mac).len(), 128);
    }
}
