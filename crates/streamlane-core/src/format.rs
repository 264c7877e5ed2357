//! Event formatting and value transforms.

use std::fmt;
use std::sync::Arc;

use crate::record::{EventKind, EventRecord};
use crate::registry::SubscriptionId;

/// Maximum number of characters the default transforms keep.
pub const DEFAULT_MAX_VALUE_LEN: usize = 50;

/// Marker appended to truncated values.
pub const ELLIPSIS: &str = "...";

/// Build an event record.
///
/// An absent lane name is replaced by the short type name of `T`, the
/// output type of the decorated stream.
pub fn format<T: ?Sized>(
    kind: EventKind,
    subscription_id: SubscriptionId,
    lane: Option<&str>,
    source: &str,
    payload: Option<String>,
) -> EventRecord {
    let lane = match lane {
        Some(name) => name.to_string(),
        None => short_type_name::<T>(),
    };
    EventRecord::new(subscription_id, lane, source.to_string(), kind, payload)
}

/// Truncate `text` to `max` characters, appending [`ELLIPSIS`] when cut.
pub fn truncate(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => {
            let mut short = text;
            short.truncate(cut);
            short.push_str(ELLIPSIS);
            short
        }
        None => text,
    }
}

/// `std::any::type_name` with module paths stripped, e.g. `Option<String>`.
pub fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let mut out = String::with_capacity(full.len());
    let mut segment_start = 0;
    let mut chars = full.chars().peekable();

    while let Some(c) = chars.next() {
        if c == ':' && chars.peek() == Some(&':') {
            chars.next();
            out.truncate(segment_start);
        } else {
            out.push(c);
            if !(c.is_alphanumeric() || c == '_') {
                segment_start = out.len();
            }
        }
    }

    out
}

/// Converts a stream value into the payload text of a `Value` record.
///
/// The builtin [`debug`](Self::debug) and [`display`](Self::display)
/// transforms truncate to [`DEFAULT_MAX_VALUE_LEN`] characters. A
/// [`custom`](Self::custom) transform receives the raw value and its output
/// is used as is.
pub struct ValueTransform<T: ?Sized> {
    render: Arc<dyn Fn(&T) -> String + Send + Sync>,
}

impl<T: ?Sized + 'static> ValueTransform<T> {
    /// Use `f` to render values; no truncation is applied.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        Self {
            render: Arc::new(f),
        }
    }

    /// Render every value as the same text.
    pub fn constant(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::custom(move |_| text.clone())
    }

    /// Render a value.
    pub fn apply(&self, value: &T) -> String {
        (self.render)(value)
    }
}

impl<T: fmt::Debug + ?Sized + 'static> ValueTransform<T> {
    /// `{:?}` rendering truncated to [`DEFAULT_MAX_VALUE_LEN`] characters.
    pub fn debug() -> Self {
        Self::custom(|value| truncate(format!("{:?}", value), DEFAULT_MAX_VALUE_LEN))
    }
}

impl<T: fmt::Display + ?Sized + 'static> ValueTransform<T> {
    /// `{}` rendering truncated to [`DEFAULT_MAX_VALUE_LEN`] characters.
    pub fn display() -> Self {
        Self::custom(|value| truncate(value.to_string(), DEFAULT_MAX_VALUE_LEN))
    }
}

impl<T: fmt::Debug + ?Sized + 'static> Default for ValueTransform<T> {
    fn default() -> Self {
        Self::debug()
    }
}

impl<T: ?Sized> Clone for ValueTransform<T> {
    fn clone(&self) -> Self {
        Self {
            render: Arc::clone(&self.render),
        }
    }
}

impl<T: ?Sized> fmt::Debug for ValueTransform<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueTransform").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: &str = "Long, long, long, long, long, long, long, long, long, long, long, long, long, long, long, long, long, long, long, long, long, long, long, long, long message.";

    #[test]
    fn test_short_values_unchanged() {
        assert_eq!(truncate("Short Message".to_string(), 50), "Short Message");

        let exactly_50 = "x".repeat(50);
        assert_eq!(truncate(exactly_50.clone(), 50), exactly_50);
    }

    #[test]
    fn test_long_values_truncated() {
        assert_eq!(
            truncate(LONG.to_string(), DEFAULT_MAX_VALUE_LEN),
            "Long, long, long, long, long, long, long, long, lo..."
        );
        assert_eq!(truncate("x".repeat(51), 50), format!("{}...", "x".repeat(50)));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(60);
        let short = truncate(text, 50);
        assert_eq!(short.chars().count(), 53);
        assert!(short.ends_with(ELLIPSIS));
    }

    #[test]
    fn test_builtin_transforms() {
        let debug = ValueTransform::<i32>::debug();
        assert_eq!(debug.apply(&42), "42");

        let display = ValueTransform::<String>::display();
        assert_eq!(display.apply(&"Short Message".to_string()), "Short Message");
        assert_eq!(
            display.apply(&LONG.to_string()),
            "Long, long, long, long, long, long, long, long, lo..."
        );
    }

    #[test]
    fn test_custom_transform_is_not_truncated() {
        let identity = ValueTransform::<String>::custom(|s| s.clone());
        assert_eq!(identity.apply(&LONG.to_string()), LONG);

        let constant = ValueTransform::<u8>::constant("TEST");
        assert_eq!(constant.apply(&7), "TEST");
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<i32>(), "i32");
        assert_eq!(short_type_name::<String>(), "String");
        assert_eq!(short_type_name::<Option<String>>(), "Option<String>");
        assert_eq!(short_type_name::<(u8, Vec<String>)>(), "(u8, Vec<String>)");
    }

    #[test]
    fn test_format_uses_type_default_lane() {
        let id = SubscriptionId::next();
        let named = format::<i32>(EventKind::Completion, id, Some("Numbers"), "src", None);
        assert_eq!(named.lane(), "Numbers");

        let unnamed = format::<i32>(EventKind::Value, id, None, "src", Some("1".into()));
        assert_eq!(unnamed.lane(), "i32");
        assert_eq!(unnamed.payload(), Some("1"));
        assert_eq!(unnamed.subscription_id(), id);
    }
}
