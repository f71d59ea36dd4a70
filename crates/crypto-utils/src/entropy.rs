use rand::RngCore;
use rand_core::OsRng;
use zeroize::Zeroizing;

/// Entropy length for a 12-word BIP-39 mnemonic (128 bits).
pub const MNEMONIC_ENTROPY_LEN: usize = 16;

/// Fill a fixed-size buffer from the OS CSPRNG. The buffer is zeroed when the
/// caller drops it.
pub fn os_entropy<const N: usize>() -> Zeroizing<[u8; N]> {
    let mut buf = Zeroizing::new([0u8; N]);
    OsRng.fill_bytes(&mut buf[..]);
    buf
}

/// Entropy for a fresh 12-word mnemonic.
pub fn mnemonic_entropy() -> Zeroizing<[u8; MNEMONIC_ENTROPY_LEN]> {
    os_entropy::<MNEMONIC_ENTROPY_LEN>()
}
