use crate::Error;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Type tag Tendermint uses for ed25519 keys.
pub const ED25519_KEY_TYPE: &str = "tendermint/PubKeyEd25519";

/// Length of a validator address in bytes.
const ADDRESS_LEN: usize = 20;

/// A validator public key in Tendermint's amino JSON form.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Hash, Serialize)]
pub struct PubKey {
    /// Key algorithm tag, e.g. `tendermint/PubKeyEd25519`.
    #[serde(rename = "type")]
    pub key_type: String,

    /// Base64-encoded key bytes.
    pub value: String,
}

impl PubKey {
    /// Wraps raw ed25519 key bytes.
    #[must_use]
    pub fn ed25519(bytes: &[u8]) -> Self {
        Self {
            key_type: ED25519_KEY_TYPE.to_string(),
            value: STANDARD.encode(bytes),
        }
    }

    /// Raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not valid base64.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(STANDARD.decode(&self.value)?)
    }

    /// Validator address derived from this key: the first 20 bytes of the
    /// SHA-256 of the key bytes, upper-case hex.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not valid base64.
    pub fn address(&self) -> Result<String, Error> {
        let digest = Sha256::digest(self.to_bytes()?);
        Ok(hex::encode_upper(&digest[..ADDRESS_LEN]))
    }
}

/// A member of the validator set.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Validator {
    /// Hex-encoded validator address.
    #[serde(default)]
    pub address: String,

    /// Validator public key.
    pub pub_key: PubKey,

    /// Voting weight.
    #[serde(with = "crate::serde_int")]
    pub voting_power: i64,
}

/// Result of the `validators` RPC call.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct ValidatorSet {
    /// Height the set applies to.
    #[serde(with = "crate::serde_int")]
    pub block_height: i64,

    /// Members of the set.
    #[serde(default)]
    pub validators: Vec<Validator>,
}

impl ValidatorSet {
    /// Sum of voting power across the set.
    #[must_use]
    pub fn total_voting_power(&self) -> i64 {
        self.validators.iter().map(|v| v.voting_power).sum()
    }
}

/// Node identity section of the `status` result.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    /// Node ID.
    #[serde(default)]
    pub id: String,

    /// Human-readable node name.
    #[serde(default)]
    pub moniker: String,

    /// Chain ID.
    #[serde(default)]
    pub network: String,

    /// Tendermint version.
    #[serde(default)]
    pub version: String,
}

/// Sync section of the `status` result.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct SyncInfo {
    /// Latest block height the node has.
    #[serde(default, with = "crate::serde_int")]
    pub latest_block_height: i64,

    /// Whether the node is still catching up.
    #[serde(default)]
    pub catching_up: bool,
}

/// The node's own validator identity.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ValidatorInfo {
    /// Hex-encoded validator address.
    #[serde(default)]
    pub address: String,

    /// The node's public key.
    pub pub_key: PubKey,

    /// Voting weight, zero for non-validators.
    #[serde(default, with = "crate::serde_int")]
    pub voting_power: i64,
}

/// Result of the `status` RPC call.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Status {
    /// Node identity.
    #[serde(default)]
    pub node_info: NodeInfo,

    /// Sync progress.
    #[serde(default)]
    pub sync_info: SyncInfo,

    /// Validator identity.
    pub validator_info: ValidatorInfo,
}
