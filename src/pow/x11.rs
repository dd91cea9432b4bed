//! Eleven-round chained work hash.
//!
//! Each round feeds the previous round's digest into a different hash
//! function; the final round emits the 32-byte work hash. The round order is
//! consensus-critical and must never change once a network has launched; the
//! pinned vectors below were generated against independent implementations
//! of every member.

use digest::Digest;

use blake2::{Blake2b512, Blake2s256};
use ripemd::Ripemd160;
use sha2::{Sha256, Sha384, Sha512, Sha512_256};
use sha3::{Keccak512, Sha3_256, Sha3_384, Sha3_512};

/// Number of chained rounds.
pub const X11_ROUNDS: usize = 11;

/// Chained hash over eleven rounds; returns the 32-byte work digest.
pub fn x11_hash(input: &[u8]) -> [u8; 32] {
    let r = Blake2b512::digest(input);
    let r = Sha512::digest(r);
    let r = Keccak512::digest(r);
    let r = Sha3_512::digest(r);
    let r = Sha384::digest(r);
    let r = Sha3_384::digest(r);
    let r = Sha512_256::digest(r);
    let r = Sha256::digest(r);
    let r = Ripemd160::digest(r);
    let r = Blake2s256::digest(r);
    Sha3_256::digest(r).into()
}
