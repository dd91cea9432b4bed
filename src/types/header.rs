//! Block header and its wire representation.
//!
//! The header schema grew a trailing `ai_hash` field with the AiMine version.
//! Encoding appends it only when the header's declared version is at or above
//! AiMine; decoding sniffs the item count so pre-AI headers still round-trip
//! through the legacy 15-field schema.

use primitive_types::U256;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

use crate::types::{keccak256, Address, Hash};
use crate::version::{version_at_least, Version};

/// An 8-byte sealing nonce, stored big-endian like the block number it beats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockNonce(pub [u8; 8]);

impl BlockNonce {
    pub fn from_u64(n: u64) -> Self {
        BlockNonce(n.to_be_bytes())
    }

    pub fn to_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

impl Encodable for BlockNonce {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl Decodable for BlockNonce {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        rlp.decoder().decode_value(|bytes| {
            if bytes.len() > 8 {
                return Err(DecoderError::RlpIsTooBig);
            }
            let mut out = [0u8; 8];
            out[8 - bytes.len()..].copy_from_slice(bytes);
            Ok(BlockNonce(out))
        })
    }
}

/// Opaque 65-byte-style signature material. The core never recovers these;
/// they only flag super-blocks and feed role checks upstream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Signature(pub Vec<u8>);

impl Encodable for Signature {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl Decodable for Signature {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        rlp.decoder().decode_value(|bytes| Ok(Signature(bytes.to_vec())))
    }
}

/// Block header. Fields the core does not interpret (vrf material, signature
/// sets) pass through untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub parent_hash: Hash,
    pub uncle_hash: Hash,
    pub coinbase: Address,
    pub difficulty: U256,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub time: u64,
    pub extra: Vec<u8>,
    pub mix_digest: Hash,
    pub nonce: BlockNonce,
    pub version: Vec<u8>,
    pub version_signatures: Vec<Signature>,
    pub signatures: Vec<Signature>,
    pub vrf_value: Vec<u8>,
    /// Digest of the AI-inference stage. Zero (and absent on the wire) below
    /// the AiMine version.
    pub ai_hash: Hash,
}

impl Header {
    /// Parsed chain version, if the version bytes are recognized.
    pub fn parsed_version(&self) -> Option<Version> {
        Version::parse(&self.version)
    }

    /// Whether this header carries the AI proof field on the wire.
    pub fn has_ai_hash(&self) -> bool {
        version_at_least(&self.version, Version::AiMine)
    }

    /// Super-block headers are injected by governance with version signature
    /// material attached; their difficulty is not re-derived.
    pub fn is_super_header(&self) -> bool {
        !self.version_signatures.is_empty()
    }

    /// Full identity hash.
    pub fn hash(&self) -> Hash {
        keccak256(&rlp::encode(self))
    }

    /// Identity hash with `nonce = 0` and `ai_hash = 0`. This is the value
    /// external miners key their work on and the first 32 bytes of the
    /// mining payload.
    pub fn hash_no_nonce(&self) -> Hash {
        let mut sealless = self.clone();
        sealless.nonce = BlockNonce::default();
        sealless.ai_hash = Hash::zero();
        keccak256(&rlp::encode(&sealless))
    }
}

const LEGACY_FIELDS: usize = 15;
const AIMINE_FIELDS: usize = 16;

impl Encodable for Header {
    fn rlp_append(&self, s: &mut RlpStream) {
        let ai = self.has_ai_hash();
        s.begin_list(if ai { AIMINE_FIELDS } else { LEGACY_FIELDS });
        s.append(&self.parent_hash);
        s.append(&self.uncle_hash);
        s.append(&self.coinbase);
        s.append(&self.difficulty);
        s.append(&self.number);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.time);
        s.append(&self.extra);
        s.append(&self.mix_digest);
        s.append(&self.nonce);
        s.append(&self.version);
        s.append_list(&self.version_signatures);
        s.append_list(&self.signatures);
        s.append(&self.vrf_value);
        if ai {
            s.append(&self.ai_hash);
        }
    }
}

impl Decodable for Header {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let ai_hash = match rlp.item_count()? {
            LEGACY_FIELDS => Hash::zero(),
            AIMINE_FIELDS => rlp.val_at(15)?,
            _ => return Err(DecoderError::RlpIncorrectListLen),
        };
        Ok(Header {
            parent_hash: rlp.val_at(0)?,
            uncle_hash: rlp.val_at(1)?,
            coinbase: rlp.val_at(2)?,
            difficulty: rlp.val_at(3)?,
            number: rlp.val_at(4)?,
            gas_limit: rlp.val_at(5)?,
            gas_used: rlp.val_at(6)?,
            time: rlp.val_at(7)?,
            extra: rlp.val_at(8)?,
            mix_digest: rlp.val_at(9)?,
            nonce: rlp.val_at(10)?,
            version: rlp.val_at(11)?,
            version_signatures: rlp.list_at(12)?,
            signatures: rlp.list_at(13)?,
            vrf_value: rlp.val_at(14)?,
            ai_hash,
        })
    }
}
