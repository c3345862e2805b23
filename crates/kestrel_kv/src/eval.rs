//! Client-side evaluation of conditional-put expectations.

use kestrel_common::{KvError, Value};

/// Evaluate a conditional put's expectation against the value currently
/// stored under the key. Returns the condition-failed error to surface,
/// or `None` when the condition holds.
///
/// Rules:
/// - An empty `expected` means the key must not exist.
/// - A missing existing value matches a non-empty `expected` iff
///   `allow_if_does_not_exist` is set.
/// - Otherwise the existing payload must equal `expected` byte for byte.
pub fn eval_cput_condition(
    expected: &[u8],
    actual: Option<&Value>,
    allow_if_does_not_exist: bool,
) -> Option<KvError> {
    match actual {
        Some(actual) if actual.is_present() => {
            if !expected.is_empty() && actual.as_bytes() == Some(expected) {
                return None;
            }
            Some(KvError::ConditionFailed {
                expected: expected.to_vec(),
                actual: Some(actual.clone()),
            })
        }
        _ => {
            if expected.is_empty() || allow_if_does_not_exist {
                return None;
            }
            Some(KvError::ConditionFailed {
                expected: expected.to_vec(),
                actual: None,
            })
        }
    }
}
