//! Validation messages and rule-based validators.

use std::fmt;
use std::sync::Arc;

/// A single human-readable validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidationMessage(String);

impl ValidationMessage {
    /// Creates a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Returns the message text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ValidationMessage {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Computes the validation messages for a state. Must be cheap: it runs on
/// every `messages()`/`is_valid()` call.
pub type Validator<S> = Arc<dyn Fn(&S) -> Vec<ValidationMessage> + Send + Sync>;

type Predicate<S> = Arc<dyn Fn(&S) -> bool + Send + Sync>;

/// A predicate that must hold for a state, plus the message emitted when it
/// does not.
pub struct ValidationRule<S> {
    predicate: Predicate<S>,
    message: ValidationMessage,
}

impl<S> ValidationRule<S> {
    /// Creates a rule. The rule fails when `predicate` returns `false`.
    pub fn new(
        predicate: impl Fn(&S) -> bool + Send + Sync + 'static,
        message: impl Into<String>,
    ) -> Self {
        Self {
            predicate: Arc::new(predicate),
            message: ValidationMessage::new(message),
        }
    }

    /// Returns `true` if the state satisfies this rule.
    pub fn holds(&self, state: &S) -> bool {
        (self.predicate)(state)
    }

    /// The message emitted on failure.
    #[must_use]
    pub fn message(&self) -> &ValidationMessage {
        &self.message
    }
}

impl<S> Clone for ValidationRule<S> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
            message: self.message.clone(),
        }
    }
}

impl<S> fmt::Debug for ValidationRule<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Builds the default validator: every rule is evaluated, one message per
/// failing rule, in registration order.
pub fn rule_validator<S: 'static>(rules: &[ValidationRule<S>]) -> Validator<S> {
    let rules: Arc<[ValidationRule<S>]> = rules.into();
    Arc::new(move |state: &S| {
        rules
            .iter()
            .filter(|rule| !rule.holds(state))
            .map(|rule| rule.message.clone())
            .collect()
    })
}
