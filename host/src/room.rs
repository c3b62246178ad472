//! Room codes
//!
//! A room code is an opaque token the host hands out for peers to join with.
//! The host only ever compares codes for equality.

use rand::Rng;

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const ROOM_CODE_LENGTH: usize = 4;

pub fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively and ignoring surrounding whitespace,
/// since players type them by hand.
pub fn room_code_matches(expected: &str, given: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(given.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_shape() {
        for _ in 0..50 {
            let code = generate_room_code();
            assert_eq!(code.len(), ROOM_CODE_LENGTH);
            assert!(code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_room_code_matching() {
        assert!(room_code_matches("QZKX", "QZKX"));
        assert!(room_code_matches("QZKX", " qzkx\n"));
        assert!(!room_code_matches("QZKX", "QZK"));
        assert!(!room_code_matches("QZKX", ""));
    }
}
