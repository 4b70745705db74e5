use proptest::prelude::*;
use sdk::envelope::{truncate_chars, MAX_EXCERPT_CHARS, MAX_SNIPPETS};
use sdk::errors::{EngineError, WayfindErrorExt};
use sdk::{Capability, Envelope, EnvelopeData, EnvelopeError, Snippet};

// Error user hints never echo the raw detail string
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*") {
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::Provider(error_str.clone()),
            EngineError::LLMProvider(error_str.clone()),
            EngineError::Parse(error_str.clone()),
            EngineError::UnknownCapability(error_str.clone()),
            EngineError::InvalidInput {
                capability: "hotel_search".to_string(),
                reason: error_str.clone(),
            },
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            if error_str.len() > 12 {
                prop_assert!(!hint.contains(&error_str));
            }
        }
    }
}

// Envelope invariant: ok implies data and no error, failure implies the reverse
proptest! {
    #[test]
    fn test_envelope_constructors_well_formed(
        code in "[a-z_]{1,16}",
        message in "\\PC{0,64}",
        retryable in any::<bool>(),
        snippet_count in 0usize..64,
    ) {
        let failure = Envelope::failure(EnvelopeError::new(code, message, retryable));
        prop_assert!(failure.is_well_formed());
        prop_assert!(!failure.ok);
        prop_assert_eq!(failure.is_retryable_failure(), retryable);

        let snippets = (0..snippet_count)
            .map(|i| Snippet::new(format!("s{}", i), "title", None, "excerpt", 0.1))
            .collect();
        let success = Envelope::success(EnvelopeData::Products(vec![]), snippets);
        prop_assert!(success.is_well_formed());
        prop_assert!(success.snippets.len() <= MAX_SNIPPETS);

        for capability in Capability::ALL {
            prop_assert!(Envelope::soft_empty(capability).is_well_formed());
        }
    }
}

proptest! {
    #[test]
    fn test_truncate_chars_bounds(text in "\\PC{0,600}") {
        let truncated = truncate_chars(&text, MAX_EXCERPT_CHARS);
        prop_assert!(truncated.chars().count() <= MAX_EXCERPT_CHARS);
        prop_assert!(text.starts_with(&truncated));
    }
}
