//! Property tests for the PII sanitizer
//!
//! Any input that embeds an email-like or phone-like substring must come out
//! with no pattern match left and with the corresponding placeholder present.

use proptest::prelude::*;
use storyflow_redaction::{
    EMAIL_PLACEHOLDER, PHONE_PLACEHOLDER, Sanitizer, default_pattern_defs, sanitize,
};

fn arb_filler() -> impl Strategy<Value = String> {
    "[a-z ,.]{0,24}"
}

fn arb_email() -> impl Strategy<Value = String> {
    ("[a-z][a-z0-9._]{0,10}", "[a-z]{1,10}", "(com|org|io|co\\.uk|dev)")
        .prop_map(|(local, domain, tld)| format!("{local}@{domain}.{tld}"))
}

fn arb_phone() -> impl Strategy<Value = String> {
    (
        prop::bool::ANY,
        prop::collection::vec(("[0-9]", prop_oneof![Just(""), Just(" "), Just("-")]), 6..14),
    )
        .prop_map(|(plus, parts)| {
            let mut out = String::new();
            if plus {
                out.push('+');
            }
            for (digit, sep) in parts {
                out.push_str(&digit);
                out.push_str(sep);
            }
            out.trim_end_matches([' ', '-']).to_string()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_emails_never_survive(prefix in arb_filler(), email in arb_email(), suffix in arb_filler()) {
        let input = format!("{prefix} {email} {suffix}");
        let out = sanitize(&input);
        prop_assert!(!Sanitizer::new().contains_pii(out.as_str()), "left PII in {}", out);
        prop_assert!(out.as_str().contains(EMAIL_PLACEHOLDER));
        prop_assert!(!out.as_str().contains(&email));
    }

    #[test]
    fn prop_phones_never_survive(prefix in arb_filler(), phone in arb_phone(), suffix in arb_filler()) {
        let input = format!("{prefix} {phone} {suffix}");
        let out = sanitize(&input);
        prop_assert!(!Sanitizer::new().contains_pii(out.as_str()), "left PII in {}", out);
        prop_assert!(out.as_str().contains(PHONE_PLACEHOLDER));
    }

    #[test]
    fn prop_sanitize_is_deterministic(input in ".{0,200}") {
        prop_assert_eq!(sanitize(&input), sanitize(&input));
    }

    #[test]
    fn prop_sanitize_is_idempotent(input in ".{0,200}") {
        let once = sanitize(&input);
        let twice = sanitize(once.as_str());
        prop_assert_eq!(once, twice);
    }
}

#[test]
fn test_pattern_table_order_is_email_then_phone() {
    let ids: Vec<_> = default_pattern_defs().iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["email", "phone"]);
}
