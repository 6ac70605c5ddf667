//! Simplified DES: an 8-bit block Feistel cipher with a 10-bit key.
//!
//! ```text
//! key (10) ── P10 ── split 5|5 ── LS-1 ── P8 ──► K1
//!                                   └──── LS-2 ── P8 ──► K2
//!
//! block ── IP ── fK(K1) ── SW ── fK(K2) ── IP⁻¹ ──► cipher
//!
//! fK(L, R) = (L ⊕ P4(S0 ‖ S1 (E/P(R) ⊕ K)), R)
//! ```
//!
//! Decryption is the same network with the subkeys swapped. Permutation
//! tables use 1-based bit positions counted from the most significant bit,
//! the way the cipher is usually written down; both peers must hold the
//! same [`SdesTables`] to interoperate.

use crate::error::CryptoError;

/// Number of key bits.
pub const KEY_BITS: u32 = 10;

/// Largest representable key.
pub const KEY_MASK: u16 = (1 << KEY_BITS) - 1;

/// Permutation and substitution tables for the cipher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdesTables {
    pub p10: [u8; 10],
    pub p8: [u8; 8],
    pub ip: [u8; 8],
    pub ip_inv: [u8; 8],
    pub ep: [u8; 8],
    pub p4: [u8; 4],
    pub s0: [[u8; 4]; 4],
    pub s1: [[u8; 4]; 4],
}

/// The textbook S-DES tables.
pub static STANDARD_TABLES: SdesTables = SdesTables {
    p10: [3, 5, 2, 7, 4, 10, 1, 9, 8, 6],
    p8: [6, 3, 7, 4, 8, 5, 10, 9],
    ip: [2, 6, 3, 1, 4, 8, 5, 7],
    ip_inv: [4, 1, 3, 5, 7, 2, 8, 6],
    ep: [4, 1, 2, 3, 2, 3, 4, 1],
    p4: [2, 4, 3, 1],
    s0: [[1, 0, 3, 2], [3, 2, 1, 0], [0, 2, 1, 3], [3, 1, 3, 2]],
    s1: [[0, 1, 2, 3], [2, 0, 1, 3], [3, 0, 1, 0], [2, 1, 0, 3]],
};

/// A 10-bit cipher key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherKey(u16);

impl CipherKey {
    pub fn new(bits: u16) -> Result<Self, CryptoError> {
        if bits > KEY_MASK {
            return Err(CryptoError::Argument(format!(
                "cipher key must fit in {KEY_BITS} bits, got {bits}"
            )));
        }
        Ok(Self(bits))
    }

    /// Reduce a shared secret to a key: `secret mod 1024`.
    pub fn from_secret(secret: u64) -> Self {
        Self(u16::try_from(secret % (u64::from(KEY_MASK) + 1)).unwrap_or_default())
    }

    pub const fn bits(self) -> u16 {
        self.0
    }
}

/// The two round keys produced by the key schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubKeys {
    pub k1: u8,
    pub k2: u8,
}

impl SubKeys {
    pub fn derive(key: CipherKey, tables: &SdesTables) -> Self {
        let permuted = permute(key.bits(), KEY_BITS, &tables.p10);
        let (left, right) = (permuted >> 5, permuted & 0x1f);

        let (left, right) = (rotate5(left, 1), rotate5(right, 1));
        let k1 = permute((left << 5) | right, KEY_BITS, &tables.p8);

        let (left, right) = (rotate5(left, 2), rotate5(right, 2));
        let k2 = permute((left << 5) | right, KEY_BITS, &tables.p8);

        Self {
            k1: low_byte(k1),
            k2: low_byte(k2),
        }
    }
}

/// A keyed cipher instance bound to a table set.
#[derive(Debug, Clone, Copy)]
pub struct Sdes<'t> {
    subkeys: SubKeys,
    tables: &'t SdesTables,
}

impl Sdes<'static> {
    /// Key the cipher with [`STANDARD_TABLES`].
    pub fn standard(key: CipherKey) -> Self {
        Self::new(key, &STANDARD_TABLES)
    }
}

impl<'t> Sdes<'t> {
    pub fn new(key: CipherKey, tables: &'t SdesTables) -> Self {
        Self {
            subkeys: SubKeys::derive(key, tables),
            tables,
        }
    }

    pub const fn subkeys(&self) -> SubKeys {
        self.subkeys
    }

    pub fn encrypt_block(&self, block: u8) -> u8 {
        self.network(block, self.subkeys.k1, self.subkeys.k2)
    }

    pub fn decrypt_block(&self, block: u8) -> u8 {
        self.network(block, self.subkeys.k2, self.subkeys.k1)
    }

    fn network(&self, block: u8, first: u8, second: u8) -> u8 {
        let t = self.tables;
        let state = permute(u16::from(block), 8, &t.ip);
        let state = self.round(state, first);
        let state = swap_halves(state);
        let state = self.round(state, second);
        low_byte(permute(state, 8, &t.ip_inv))
    }

    /// fK: mix the right nibble into the left one; the right passes through.
    fn round(&self, state: u16, subkey: u8) -> u16 {
        let left = state >> 4;
        let right = state & 0x0f;
        ((left ^ self.mangle(right, subkey)) << 4) | right
    }

    /// F: expand, key, substitute, permute.
    fn mangle(&self, nibble: u16, subkey: u8) -> u16 {
        let t = self.tables;
        let mixed = permute(nibble, 4, &t.ep) ^ u16::from(subkey);
        let s0 = sbox(&t.s0, mixed >> 4);
        let s1 = sbox(&t.s1, mixed & 0x0f);
        permute((s0 << 2) | s1, 4, &t.p4)
    }
}

/// Output bit `i` is input bit `table[i]` (1-based, counted from the MSB of
/// a `width`-bit value).
fn permute(input: u16, width: u32, table: &[u8]) -> u16 {
    table.iter().fold(0, |out, &pos| {
        (out << 1) | ((input >> (width - u32::from(pos))) & 1)
    })
}

/// Rows come from the outer bits, columns from the inner pair.
fn sbox(table: &[[u8; 4]; 4], nibble: u16) -> u16 {
    let row = (((nibble >> 3) & 1) << 1) | (nibble & 1);
    let col = (nibble >> 1) & 0b11;
    u16::from(table[usize::from(row)][usize::from(col)])
}

const fn rotate5(half: u16, by: u32) -> u16 {
    ((half << by) | (half >> (5 - by))) & 0x1f
}

const fn swap_halves(state: u16) -> u16 {
    ((state & 0x0f) << 4) | (state >> 4)
}

#[allow(clippy::cast_possible_truncation)]
const fn low_byte(v: u16) -> u8 {
    (v & 0xff) as u8
}
