//! Flag and seed generation: OS-CSPRNG-backed, not a general-purpose PRNG
//! (the original engine's `uuid4().hex` weakness stays fixed here).

use rand::rngs::OsRng;
use rand::RngCore;

const HEX: &[u8] = b"0123456789abcdef";

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| HEX[(b & 0x0f) as usize] as char).collect()
}

/// `flag_header{<flag_body_len lowercase hex chars>}`.
pub fn generate_flag(flag_header: &str, flag_body_len: usize) -> String {
    format!("{flag_header}{{{}}}", random_hex(flag_body_len))
}

/// 32 lowercase hex characters.
pub fn generate_seed() -> String {
    random_hex(32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_has_expected_shape() {
        let flag = generate_flag("flag", 32);
        assert!(flag.starts_with("flag{"));
        assert!(flag.ends_with('}'));
        assert_eq!(flag.len(), "flag{".len() + 32 + 1);
        let body = &flag["flag{".len()..flag.len() - 1];
        assert!(body.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn seeds_are_32_hex_chars() {
        let seed = generate_seed();
        assert_eq!(seed.len(), 32);
        assert!(seed.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn successive_flags_differ() {
        assert_ne!(generate_flag("flag", 32), generate_flag("flag", 32));
    }
}
