//! Block chaining modes over the 8-bit cipher.
//!
//! One byte is one block and there is no padding, so ciphertext length
//! always equals plaintext length.
//!
//! ECB leaks equal plaintext blocks as equal ciphertext blocks. CBC hides
//! that within a message, but the IV is fixed for a whole session and every
//! message is chained from it again. Both weaknesses are kept for wire
//! compatibility.

use rand::Rng;

use crate::sdes::Sdes;

/// Which chaining mode a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CipherMode {
    Ecb,
    #[default]
    Cbc,
}

/// A chaining mode together with the state it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chaining {
    Ecb,
    Cbc { iv: u8 },
}

impl Chaining {
    pub const fn mode(self) -> CipherMode {
        match self {
            Self::Ecb => CipherMode::Ecb,
            Self::Cbc { .. } => CipherMode::Cbc,
        }
    }

    pub const fn iv(self) -> Option<u8> {
        match self {
            Self::Ecb => None,
            Self::Cbc { iv } => Some(iv),
        }
    }
}

/// Draw a fresh 8-bit IV from the supplied random source.
pub fn generate_iv<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    rng.gen_range(0..=u8::MAX)
}

pub fn encrypt(cipher: &Sdes<'_>, chaining: Chaining, plaintext: &[u8]) -> Vec<u8> {
    match chaining {
        Chaining::Ecb => plaintext.iter().map(|&b| cipher.encrypt_block(b)).collect(),
        Chaining::Cbc { iv } => {
            let mut prev = iv;
            plaintext
                .iter()
                .map(|&b| {
                    prev = cipher.encrypt_block(b ^ prev);
                    prev
                })
                .collect()
        }
    }
}

pub fn decrypt(cipher: &Sdes<'_>, chaining: Chaining, ciphertext: &[u8]) -> Vec<u8> {
    match chaining {
        Chaining::Ecb => ciphertext.iter().map(|&b| cipher.decrypt_block(b)).collect(),
        Chaining::Cbc { iv } => {
            let mut prev = iv;
            ciphertext
                .iter()
                .map(|&c| {
                    let plain = cipher.decrypt_block(c) ^ prev;
                    prev = c;
                    plain
                })
                .collect()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::sdes::CipherKey;

    fn cipher(bits: u16) -> Sdes<'static> {
        Sdes::standard(CipherKey::new(bits).unwrap())
    }

    #[test]
    fn ecb_known_answer() {
        let out = encrypt(&cipher(0x2c5), Chaining::Ecb, b"hello");
        assert_eq!(out, [0xfc, 0x64, 0x59, 0x59, 0xdd]);
    }

    #[test]
    fn cbc_known_answer() {
        let out = encrypt(&cipher(0x2c5), Chaining::Cbc { iv: 0xaa }, b"hello");
        assert_eq!(out, [0x61, 0x17, 0xb6, 0x28, 0x3b]);
    }

    #[test]
    fn ecb_repeats_identical_blocks() {
        let out = encrypt(&cipher(0x155), Chaining::Ecb, b"AAAA");
        assert!(out.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn cbc_hides_identical_blocks() {
        let out = encrypt(&cipher(0x155), Chaining::Cbc { iv: 0x3c }, b"AAAAAAAA");
        assert!(out.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn cbc_round_trips_for_many_ivs_and_lengths() {
        let mut rng = StdRng::seed_from_u64(99);
        for bits in [0u16, 1, 0x155, 0x2aa, 0x3ff] {
            let c = cipher(bits);
            for iv in [0u8, 1, 0x7f, 0xaa, 0xff] {
                for len in [0usize, 1, 2, 7, 64, 257] {
                    let plain: Vec<u8> = (0..len).map(|_| rng.gen_range(0..=u8::MAX)).collect();
                    let chaining = Chaining::Cbc { iv };
                    let sealed = encrypt(&c, chaining, &plain);
                    assert_eq!(sealed.len(), plain.len());
                    assert_eq!(decrypt(&c, chaining, &sealed), plain);
                }
            }
        }
    }

    #[test]
    fn ecb_round_trips_every_byte() {
        let c = cipher(0x0f0);
        let plain: Vec<u8> = (0..=u8::MAX).collect();
        let sealed = encrypt(&c, Chaining::Ecb, &plain);
        assert_eq!(decrypt(&c, Chaining::Ecb, &sealed), plain);
    }

    #[test]
    fn wrong_iv_garbles_only_first_block() {
        let c = cipher(0x2c5);
        let sealed = encrypt(&c, Chaining::Cbc { iv: 0xaa }, b"hello");
        let opened = decrypt(&c, Chaining::Cbc { iv: 0x55 }, &sealed);
        assert_ne!(opened[0], b'h');
        assert_eq!(&opened[1..], b"ello");
    }

    #[test]
    fn chaining_accessors() {
        assert_eq!(Chaining::Ecb.mode(), CipherMode::Ecb);
        assert_eq!(Chaining::Ecb.iv(), None);
        assert_eq!(Chaining::Cbc { iv: 9 }.mode(), CipherMode::Cbc);
        assert_eq!(Chaining::Cbc { iv: 9 }.iv(), Some(9));
    }

    #[test]
    fn iv_generation_is_reproducible_with_seeded_rng() {
        let a = generate_iv(&mut StdRng::seed_from_u64(5));
        let b = generate_iv(&mut StdRng::seed_from_u64(5));
        assert_eq!(a, b);
    }
}
