//! DPoP (RFC 9449) proof-of-possession proofs
//!
//! A [`DpopKey`] is generated once per login and reused for the token
//! request and for every later request made with the resulting credential.

use crate::error::{Result, SolidError};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::jwk::{
    AlgorithmParameters, CommonParameters, EllipticCurve, EllipticCurveKeyParameters,
    EllipticCurveKeyType, Jwk,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::EncodePrivateKey;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// JWT `typ` header value for DPoP proofs
pub const DPOP_JWT_TYPE: &str = "dpop+jwt";

/// Claims of a DPoP proof
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpopClaims {
    /// Unique proof identifier
    pub jti: String,
    /// HTTP method of the request
    pub htm: String,
    /// HTTP target URI without query and fragment
    pub htu: String,
    /// Issued at (seconds since epoch)
    pub iat: i64,
}

/// ES256 keypair bound to one session's access token
pub struct DpopKey {
    encoding_key: EncodingKey,
    public_jwk: Jwk,
}

impl DpopKey {
    /// Generate a fresh P-256 keypair
    pub fn generate() -> Result<Self> {
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);

        let der = secret
            .to_pkcs8_der()
            .map_err(|e| SolidError::Crypto(format!("Failed to encode DPoP key: {}", e)))?;
        let encoding_key = EncodingKey::from_ec_der(der.as_bytes());

        let point = secret.public_key().to_encoded_point(false);
        let (x, y) = match (point.x(), point.y()) {
            (Some(x), Some(y)) => (URL_SAFE_NO_PAD.encode(x), URL_SAFE_NO_PAD.encode(y)),
            _ => {
                return Err(SolidError::Crypto(
                    "DPoP public key has no affine coordinates".to_string(),
                ))
            }
        };

        let public_jwk = Jwk {
            common: CommonParameters::default(),
            algorithm: AlgorithmParameters::EllipticCurve(EllipticCurveKeyParameters {
                key_type: EllipticCurveKeyType::EC,
                curve: EllipticCurve::P256,
                x,
                y,
            }),
        };

        Ok(Self {
            encoding_key,
            public_jwk,
        })
    }

    /// Public half of the key as embedded in every proof
    pub fn public_jwk(&self) -> &Jwk {
        &self.public_jwk
    }

    /// Sign a proof for one request
    pub fn proof(&self, method: &Method, url: &Url) -> Result<String> {
        let mut header = Header::new(Algorithm::ES256);
        header.typ = Some(DPOP_JWT_TYPE.to_string());
        header.jwk = Some(self.public_jwk.clone());

        let claims = DpopClaims {
            jti: Uuid::new_v4().to_string(),
            htm: method.as_str().to_string(),
            htu: htu(url),
            iat: Utc::now().timestamp(),
        };

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| SolidError::Crypto(format!("Failed to sign DPoP proof: {}", e)))
    }
}

impl std::fmt::Debug for DpopKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DpopKey")
            .field("public_jwk", &self.public_jwk)
            .finish_non_exhaustive()
    }
}

/// Target URI as it appears in the `htu` claim
fn htu(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}
