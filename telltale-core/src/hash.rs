//! Registry name hashing
//!
//! 16-bit case-insensitive DJB2. Registry entries carry the hash of their
//! name so persisted configuration can refer to an entry without depending
//! on its position in the table.

/// Hash a name (ASCII case-insensitive)
///
/// `h = 5381; h = h * 33 + upper(byte)` over every byte, truncated to the
/// low 16 bits. `const` so registry tables compute their hashes at build time.
pub const fn djb2(name: &str) -> u16 {
    let bytes = name.as_bytes();
    let mut hash: u32 = 5381;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i].to_ascii_uppercase();
        hash = (hash << 5).wrapping_add(hash).wrapping_add(c as u32);
        i += 1;
    }
    (hash & 0xFFFF) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_values() {
        // Values that shipped in earlier firmware tables
        assert_eq!(djb2("NONE"), 0x2F75);
        assert_eq!(djb2("CHT"), 0xD984);
        assert_eq!(djb2("CELSIUS"), 0x82DD);
        assert_eq!(djb2("C"), 0xB5E8);
        assert_eq!(djb2("BOOST_PRESSURE"), 0xC084);
        assert_eq!(djb2("CAN_IMPORT"), 0x2251);
    }

    #[test]
    fn test_empty_name() {
        assert_eq!(djb2(""), 5381);
    }

    #[test]
    fn test_const_evaluation() {
        const HASH: u16 = djb2("psi");
        assert_eq!(HASH, djb2("PSI"));
    }

    proptest! {
        #[test]
        fn prop_case_insensitive(name in "[a-zA-Z0-9_]{0,24}") {
            let upper = name.to_ascii_uppercase();
            let lower = name.to_ascii_lowercase();
            prop_assert_eq!(djb2(&upper), djb2(&lower));
            prop_assert_eq!(djb2(&name), djb2(&upper));
        }
    }
}
