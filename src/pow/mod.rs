//! Proof-of-work primitives: the 80-byte mining payload, the share decoding
//! rule, and target arithmetic. The sealer, the verifier, and the remote
//! work packager all build on exactly these functions; any drift between
//! them would fork the network.

pub mod endian;
pub mod x11;

pub use x11::x11_hash;

use primitive_types::{U256, U512};

use crate::types::Hash;

/// Size of the payload fed to the work hash.
pub const MINING_PAYLOAD_LEN: usize = 80;

/// Assemble the 80-byte mining payload.
///
/// Layout: header hash and AI hash (each word-order reversed, then each
/// 4-byte word byte-reversed), an 8-byte coinbase-CRC placeholder, a 4-byte
/// extra-nonce placeholder (both all zero), and the low 32 bits of the nonce
/// byte-reversed.
pub fn mining_payload(header_hash: &Hash, ai_hash: &Hash, nonce: u64) -> [u8; MINING_PAYLOAD_LEN] {
    let mut out = [0u8; MINING_PAYLOAD_LEN];

    let hh = endian::le_words_32(&endian::reverse_word_order_32(header_hash.as_fixed_bytes()));
    let ah = endian::le_words_32(&endian::reverse_word_order_32(ai_hash.as_fixed_bytes()));
    out[0..32].copy_from_slice(&hh);
    out[32..64].copy_from_slice(&ah);

    // 64..72 coinbase crc64 placeholder, 72..76 extra-nonce placeholder: zero
    let nonce_be = (nonce as u32).to_be_bytes();
    out[76..80].copy_from_slice(&endian::reverse_bytes(&nonce_be));
    out
}

/// Decode a work digest into the share value: reverse the digest and read it
/// as a big-endian integer.
pub fn share_from_digest(digest: &[u8; 32]) -> U256 {
    U256::from_big_endian(&endian::reverse_bytes(digest))
}

/// Boundary target `⌊2^256 / difficulty⌋`, clamped into 256 bits.
/// Zero difficulty has no target.
pub fn target_from_difficulty(difficulty: U256) -> Option<U256> {
    if difficulty.is_zero() {
        return None;
    }
    let mut db = [0u8; 32];
    difficulty.to_big_endian(&mut db);
    let t = (U512::one() << 256) / U512::from_big_endian(&db);

    let mut buf = [0u8; 64];
    t.to_big_endian(&mut buf);
    if buf[..32].iter().any(|&b| b != 0) {
        // difficulty 1: the true boundary exceeds 256 bits, every share wins
        Some(U256::MAX)
    } else {
        Some(U256::from_big_endian(&buf[32..]))
    }
}

/// Target used by broadcast nodes: any nonce wins.
pub fn max_target() -> U256 {
    U256::MAX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_layout() {
        let header_hash = Hash::from_low_u64_be(0xa1b2c3d4);
        let ai_hash = Hash::repeat_byte(0x5e);
        let payload = mining_payload(&header_hash, &ai_hash, 0x0000_00aa);

        // both hash sections come out fully byte-reversed
        let expected_hh = endian::reverse_bytes(header_hash.as_bytes());
        let expected_ah = endian::reverse_bytes(ai_hash.as_bytes());
        assert_eq!(&payload[0..32], expected_hh.as_slice());
        assert_eq!(&payload[32..64], expected_ah.as_slice());

        // 12 zero placeholder bytes
        assert_eq!(&payload[64..76], &[0u8; 12]);

        // nonce 0x000000aa lands little-endian
        assert_eq!(&payload[76..80], &[0xaa, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn payload_nonce_uses_low_word() {
        let payload = mining_payload(&Hash::zero(), &Hash::zero(), 0xffff_ffff_0102_0304);
        assert_eq!(&payload[76..80], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn share_is_reversed_big_endian() {
        // the digest's first byte becomes the share's least significant one
        let mut digest = [0u8; 32];
        digest[0] = 0x01;
        assert_eq!(share_from_digest(&digest), U256::one());

        digest = [0u8; 32];
        digest[31] = 0x01;
        assert_eq!(share_from_digest(&digest), U256::one() << 248);
    }

    #[test]
    fn targets() {
        assert_eq!(target_from_difficulty(U256::zero()), None);
        assert_eq!(target_from_difficulty(U256::one()), Some(U256::MAX));
        assert_eq!(
            target_from_difficulty(U256::from(2u64)),
            Some(U256::one() << 255)
        );
        assert_eq!(
            target_from_difficulty(U256::one() << 255),
            Some(U256::from(2u64))
        );
    }

    #[test]
    fn every_share_beats_the_broadcast_target() {
        let digest = x11_hash(b"any payload");
        assert!(share_from_digest(&digest) <= max_target());
    }
}
