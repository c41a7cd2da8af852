use serde::{Deserialize, Serialize};

/// Identifies a block by hash.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct BlockId {
    /// Hex-encoded block hash. Empty for a vote on nil.
    #[serde(default)]
    pub hash: String,
}

/// Block header as emitted by `NewBlockHeader` events.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct Header {
    /// Chain the block belongs to.
    #[serde(default)]
    pub chain_id: String,

    /// Block height.
    #[serde(with = "crate::serde_int")]
    pub height: i64,

    /// Block time as reported by the proposer (RFC 3339).
    #[serde(default)]
    pub time: String,

    /// Number of transactions in this block.
    #[serde(default, with = "crate::serde_int")]
    pub num_txs: i64,

    /// Total number of transactions on the chain up to this block.
    #[serde(default, with = "crate::serde_int")]
    pub total_txs: i64,

    /// Previous block.
    #[serde(default)]
    pub last_block_id: BlockId,

    /// Hash of the current validator set.
    #[serde(default)]
    pub validators_hash: String,

    /// Application state hash after the previous block.
    #[serde(default)]
    pub app_hash: String,
}

/// Transactions carried by a block.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct BlockData {
    /// Base64-encoded transactions. `null` on the wire when empty.
    #[serde(default)]
    pub txs: Option<Vec<String>>,
}

/// A signed validator vote.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct Vote {
    /// Hex-encoded address of the signing validator.
    pub validator_address: String,

    /// Position of the validator in the set.
    #[serde(default, with = "crate::serde_int")]
    pub validator_index: i64,

    /// Height voted on.
    #[serde(default, with = "crate::serde_int")]
    pub height: i64,

    /// Round voted in.
    #[serde(default, with = "crate::serde_int")]
    pub round: i64,

    /// Block voted for.
    #[serde(default)]
    pub block_id: BlockId,

    /// Vote signature.
    #[serde(default)]
    pub signature: Option<String>,
}

/// The precommits that committed the previous block.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct Commit {
    /// Block being committed.
    #[serde(default)]
    pub block_id: BlockId,

    /// One slot per validator; `None` where no precommit was received.
    #[serde(default)]
    pub precommits: Vec<Option<Vote>>,
}

impl Commit {
    /// Whether a validator with the given address has a precommit in this commit.
    #[must_use]
    pub fn signed_by(&self, validator_address: &str) -> bool {
        self.precommits
            .iter()
            .flatten()
            .any(|vote| vote.validator_address.eq_ignore_ascii_case(validator_address))
    }
}

/// A full block as emitted by `NewBlock` events.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct Block {
    /// Block header.
    pub header: Header,

    /// Transactions.
    #[serde(default)]
    pub data: BlockData,

    /// Commit for the previous block.
    #[serde(default)]
    pub last_commit: Commit,
}

impl Block {
    /// Height of this block.
    #[must_use]
    pub const fn height(&self) -> i64 {
        self.header.height
    }
}
