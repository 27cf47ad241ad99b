// tests/property/session_id_test.rs

//! Property-based tests for untrusted session id parsing

use proptest::prelude::*;
use wsplex::connection::SessionId;

proptest! {
    #[test]
    fn test_parse_untrusted_never_panics(raw in ".{0,200}") {
        let _ = SessionId::parse_untrusted(&raw);
    }

    #[test]
    fn test_parsed_ids_are_canonical(bytes in prop::array::uniform16(any::<u8>())) {
        let uuid = uuid::Uuid::from_bytes(bytes);
        let upper = uuid.hyphenated().to_string().to_uppercase();
        let parsed = SessionId::parse_untrusted(&upper).unwrap();
        prop_assert_eq!(parsed.as_str(), uuid.hyphenated().to_string());
    }
}
