//! # QR Identity Tokens
//!
//! The string printed into an asset's QR sticker. Wire format: base64url
//! without padding over the JSON object `{"d": deploymentId, "a": assetId,
//! "s": seed}`.
//!
//! The seed is 16 bytes from the OS CSPRNG, hex encoded, bound to the asset
//! at registration. A re-printed sticker for an asset that was later
//! re-registered under the same label carries a stale seed and is rejected.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

use depot_core::{AssetId, DeploymentId};
use depot_state::QrSeed;

const SEED_BYTES: usize = 16;

/// Why a token failed to decode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not valid base64url")]
    Encoding,
    #[error("token payload is not a valid identity document")]
    Payload,
    #[error("token deployment id is not a UUID")]
    DeploymentId,
    #[error("token is missing its {0}")]
    MissingField(&'static str),
}

#[derive(Serialize, Deserialize)]
struct Payload {
    d: String,
    a: String,
    s: String,
}

/// Decoded contents of a QR identity token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityToken {
    pub deployment_id: DeploymentId,
    pub asset_id: AssetId,
    pub seed: QrSeed,
}

impl IdentityToken {
    pub fn new(deployment_id: DeploymentId, asset_id: AssetId, seed: QrSeed) -> Self {
        Self {
            deployment_id,
            asset_id,
            seed,
        }
    }

    /// Render the printable token string.
    pub fn encode(&self) -> String {
        let payload = Payload {
            d: self.deployment_id.to_string(),
            a: self.asset_id.to_string(),
            s: self.seed.expose().to_string(),
        };
        // Serializing three strings cannot fail.
        let json = serde_json::to_vec(&payload).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Parse a scanned token string.
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| TokenError::Encoding)?;
        let payload: Payload = serde_json::from_slice(&bytes).map_err(|_| TokenError::Payload)?;
        let deployment_id = payload
            .d
            .parse::<DeploymentId>()
            .map_err(|_| TokenError::DeploymentId)?;
        if payload.a.trim().is_empty() {
            return Err(TokenError::MissingField("asset id"));
        }
        if payload.s.is_empty() {
            return Err(TokenError::MissingField("seed"));
        }
        Ok(Self {
            deployment_id,
            asset_id: AssetId(payload.a),
            seed: QrSeed::new(payload.s),
        })
    }
}

/// Draw a fresh seed from the OS CSPRNG.
pub fn generate_seed() -> QrSeed {
    let mut bytes = [0u8; SEED_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    QrSeed::new(bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())
}

/// Constant-time seed comparison. Empty seeds never match.
pub fn seeds_match(stored: &QrSeed, presented: &QrSeed) -> bool {
    if stored.is_empty() || presented.is_empty() {
        return false;
    }
    stored
        .expose()
        .as_bytes()
        .ct_eq(presented.expose().as_bytes())
        .into()
}
