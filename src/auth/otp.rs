use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};

pub const OTP_MIN: u32 = 100_000;
pub const OTP_MAX: u32 = 999_999;

/// Six-digit code drawn from the OS RNG, inclusive of both bounds.
pub fn generate_otp() -> String {
    OsRng.gen_range(OTP_MIN..=OTP_MAX).to_string()
}

/// Codes are stored hashed so a database read does not reveal live codes.
pub fn hash_otp(email: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    hasher.update(b":");
    hasher.update(code.trim().as_bytes());
    hex::encode(hasher.finalize())
}

pub fn otp_matches(email: &str, code: &str, stored_hash: &str) -> bool {
    let candidate = hash_otp(email, code);
    candidate.len() == stored_hash.len()
        && candidate
            .bytes()
            .zip(stored_hash.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
