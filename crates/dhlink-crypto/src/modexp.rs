//! Modular arithmetic primitives.
//!
//! Every value handled by the key agreement fits in a `u64`; products are
//! widened to `u128` before reduction so no intermediate can overflow.

use crate::error::CryptoError;

/// Compute `(a * b) mod m` without overflow.
///
/// `m` must be non-zero; callers go through [`pow_mod`], which checks it.
// The remainder is strictly less than `m`, so it fits back into a u64.
#[allow(clippy::cast_possible_truncation)]
pub fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    let product = u128::from(a) * u128::from(b);
    (product % u128::from(m)) as u64
}

/// Compute `base^exp mod m` by left-to-right binary exponentiation.
///
/// Bits of `exp` are consumed from the most significant set bit down to
/// bit 0: the accumulator is squared for every bit and multiplied by the
/// reduced base when the bit is set.
pub fn pow_mod(base: u64, exp: u64, m: u64) -> Result<u64, CryptoError> {
    if m == 0 {
        return Err(CryptoError::Argument("modulus must be > 0".into()));
    }

    let base = base % m;
    let mut result = 1 % m;
    if exp == 0 {
        return Ok(result);
    }

    let top = u64::BITS - 1 - exp.leading_zeros();
    for bit in (0..=top).rev() {
        result = mul_mod(result, result, m);
        if (exp >> bit) & 1 == 1 {
            result = mul_mod(result, base, m);
        }
    }

    Ok(result)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn naive_pow(base: u64, exp: u64, m: u64) -> u64 {
        let mut acc = 1 % m;
        for _ in 0..exp {
            acc = (acc * base) % m;
        }
        acc
    }

    #[test]
    fn matches_repeated_multiplication() {
        for m in 1..=10_000u64 {
            // Sample bases across the residue range rather than all of them.
            let step = (m / 17).max(1);
            let mut base = 0;
            while base < m {
                for exp in 0..=30 {
                    assert_eq!(
                        pow_mod(base, exp, m).unwrap(),
                        naive_pow(base, exp, m),
                        "base={base} exp={exp} m={m}"
                    );
                }
                base += step;
            }
        }
    }

    #[test]
    fn zero_modulus_is_rejected() {
        assert!(matches!(pow_mod(3, 4, 0), Err(CryptoError::Argument(_))));
    }

    #[test]
    fn modulus_one_always_yields_zero() {
        assert_eq!(pow_mod(0, 0, 1).unwrap(), 0);
        assert_eq!(pow_mod(7, 13, 1).unwrap(), 0);
    }

    #[test]
    fn zero_exponent_yields_one() {
        assert_eq!(pow_mod(123, 0, 1000).unwrap(), 1);
    }

    #[test]
    fn base_larger_than_modulus_is_reduced() {
        assert_eq!(pow_mod(28, 3, 23).unwrap(), pow_mod(5, 3, 23).unwrap());
    }

    #[test]
    fn mul_mod_does_not_overflow_near_u64_max() {
        let m = u64::MAX - 58; // largest 64-bit prime
        let a = m - 1;
        // (m-1)^2 = 1 mod m
        assert_eq!(mul_mod(a, a, m), 1);
        assert_eq!(pow_mod(a, 2, m).unwrap(), 1);
    }

    #[test]
    fn large_exponent_fermat() {
        // Fermat: a^(p-1) = 1 mod p
        let p = 1_000_000_007u64;
        assert_eq!(pow_mod(2, p - 1, p).unwrap(), 1);
        assert_eq!(pow_mod(12345, p - 1, p).unwrap(), 1);
    }
}
