//! Translation of raw provider event text into typed completion signals.
//!
//! The managed platform reports the outcome of asynchronous operations only as
//! free-text lines in the environment's event log. This module owns the table
//! of phrases that mark an outcome, so that nothing downstream has to match on
//! provider wording.
//!
//! | Outcome                | Phrase                                          |
//! |------------------------|-------------------------------------------------|
//! | create succeeded       | `Successfully launched environment`             |
//! | update succeeded       | `Environment update completed successfully`     |
//! | terminate succeeded    | `terminateEnvironment completed successfully`   |
//! | any operation failed   | `Failed to deploy application`                  |
//!
//! Matching is a case-insensitive substring search.

use crate::types::{Completion, Operation};

pub const CREATE_SUCCESS: &str = "Successfully launched environment";
pub const UPDATE_SUCCESS: &str = "Environment update completed successfully";
pub const TERMINATE_SUCCESS: &str = "terminateEnvironment completed successfully";
pub const FATAL_FAILURE: &str = "Failed to deploy application";

fn contains_phrase(message: &str, phrase: &str) -> bool {
    message.to_lowercase().contains(&phrase.to_lowercase())
}

/// Classify one event message against the awaited `operation`.
///
/// A fatal-failure match wins over a success match in the same line. Success
/// phrases of other operations are [`Completion::Pending`].
pub fn classify(operation: Operation, message: &str) -> Completion {
    if contains_phrase(message, FATAL_FAILURE) {
        return Completion::Failed(message.to_string());
    }

    let success = match operation {
        Operation::Create => CREATE_SUCCESS,
        Operation::Update => UPDATE_SUCCESS,
        Operation::Terminate => TERMINATE_SUCCESS,
    };

    if contains_phrase(message, success) {
        Completion::Succeeded
    } else {
        Completion::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_phrases_per_operation() {
        assert_eq!(
            classify(
                Operation::Create,
                "Successfully launched environment: prod-030b220"
            ),
            Completion::Succeeded
        );
        assert_eq!(
            classify(
                Operation::Update,
                "Environment update completed successfully."
            ),
            Completion::Succeeded
        );
        assert_eq!(
            classify(
                Operation::Terminate,
                "terminateEnvironment completed successfully."
            ),
            Completion::Succeeded
        );
    }

    #[test]
    fn test_other_operations_phrase_is_pending() {
        assert_eq!(
            classify(
                Operation::Update,
                "Successfully launched environment: prod-030b220"
            ),
            Completion::Pending
        );
        assert_eq!(
            classify(
                Operation::Create,
                "terminateEnvironment completed successfully."
            ),
            Completion::Pending
        );
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert_eq!(
            classify(Operation::Create, "SUCCESSFULLY LAUNCHED ENVIRONMENT"),
            Completion::Succeeded
        );
        assert!(matches!(
            classify(Operation::Update, "failed to deploy application."),
            Completion::Failed(_)
        ));
    }

    #[test]
    fn test_fatal_failure_preserves_provider_text() {
        let message = "Failed to deploy application. Check the instance logs for details.";
        for operation in [Operation::Create, Operation::Update, Operation::Terminate] {
            assert_eq!(
                classify(operation, message),
                Completion::Failed(message.to_string())
            );
        }
    }

    #[test]
    fn test_fatal_wins_over_success_in_same_line() {
        let message = "Failed to deploy application after Successfully launched environment";
        assert!(matches!(
            classify(Operation::Create, message),
            Completion::Failed(_)
        ));
    }

    #[test]
    fn test_unrelated_messages_are_pending() {
        assert_eq!(
            classify(Operation::Create, "createEnvironment is starting."),
            Completion::Pending
        );
        assert_eq!(
            classify(Operation::Update, "Adding instance 'i-0abc' to your environment."),
            Completion::Pending
        );
    }
}
