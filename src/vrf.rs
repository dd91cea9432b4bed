//! Layout of the header's vrf field: 65 bytes of account material, 32 bytes
//! of vrf output, proof bytes after that. Only the output section feeds the
//! inference seed; the rest passes through untouched.

pub const ACCOUNT_SECTION_LEN: usize = 65;
pub const VALUE_SECTION_LEN: usize = 32;

/// Split a header's vrf bytes into (account, value, proof). Short fields are
/// treated as a bare value so legacy headers keep working.
pub fn split_vrf_info(data: &[u8]) -> (&[u8], &[u8], &[u8]) {
    if data.len() >= ACCOUNT_SECTION_LEN + VALUE_SECTION_LEN {
        (
            &data[..ACCOUNT_SECTION_LEN],
            &data[ACCOUNT_SECTION_LEN..ACCOUNT_SECTION_LEN + VALUE_SECTION_LEN],
            &data[ACCOUNT_SECTION_LEN + VALUE_SECTION_LEN..],
        )
    } else {
        (&[], data, &[])
    }
}

/// The vrf output section, the seed material for the picture draw.
pub fn vrf_value_section(data: &[u8]) -> &[u8] {
    split_vrf_info(data).1
}
