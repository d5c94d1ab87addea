/// Access code generation
///
/// Codes look like `AV-7KQ2MZ`. The alphabet drops 0, 1, I, L and O so a
/// code read off a screen or a flyer can't be mistyped. Codes are referral
/// handles, not secrets: `thread_rng` is plenty.
use rand::Rng;

pub const ACCESS_CODE_PREFIX: &str = "AV-";
pub const ACCESS_CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";
pub const ACCESS_CODE_SUFFIX_LEN: usize = 6;

/// Generate a new access code
pub fn generate_access_code() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ACCESS_CODE_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ACCESS_CODE_ALPHABET.len());
            ACCESS_CODE_ALPHABET[idx] as char
        })
        .collect();

    format!("{}{}", ACCESS_CODE_PREFIX, suffix)
}

/// Check that a string has the shape of an access code
pub fn is_valid_access_code(code: &str) -> bool {
    match code.strip_prefix(ACCESS_CODE_PREFIX) {
        Some(suffix) => {
            suffix.len() == ACCESS_CODE_SUFFIX_LEN
                && suffix.bytes().all(|b| ACCESS_CODE_ALPHABET.contains(&b))
        }
        None => false,
    }
}

/// Trim and upper-case user-entered codes
pub fn normalize_access_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Source of candidate access codes for the enrollment workflow
pub trait CodeSource: Send + Sync {
    fn next_code(&self) -> String;
}

/// Uniformly random codes
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&self) -> String {
        generate_access_code()
    }
}
