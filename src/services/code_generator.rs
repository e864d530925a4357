use rand::Rng;

/// Number of characters in a join code.
pub const CODE_LENGTH: usize = 6;
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Draw a random join code. Uniqueness is the caller's concern.
pub fn generate() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Canonical form of a user-entered code.
pub fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Whether `c` may appear in a normalized join code.
pub fn is_code_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn generated_codes_are_six_uppercase_alphanumerics() {
        for _ in 0..500 {
            let code = generate();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(is_code_char), "unexpected code {code}");
        }
    }

    #[test]
    fn generated_codes_vary() {
        let codes: HashSet<String> = (0..200).map(|_| generate()).collect();
        assert!(codes.len() > 190);
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize("  ab12cd\n"), "AB12CD");
    }
}
