use std::fmt::Display;

use ulid::Ulid;

/// Well-known ID prefixes.
pub mod prefix {
    /// Live WebSocket connections; clients echo the id back as `resource`.
    pub const CONNECTION: &str = "rtc";
    /// Single-use WebSocket tickets.
    pub const TICKET: &str = "wst";
}

/// Joins `prefix` and `body` as `{prefix}_{body}`.
pub fn prefixed(prefix: &str, body: impl Display) -> String {
    format!("{prefix}_{body}")
}

/// A fresh ULID under `prefix`.
///
/// # Examples
/// ```
/// use rtc_common::id::{prefix, prefixed_ulid};
///
/// let id = prefixed_ulid(prefix::CONNECTION);
/// assert!(id.starts_with("rtc_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    prefixed(prefix, Ulid::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_are_prefixed_ulids() {
        let id = prefixed_ulid(prefix::CONNECTION);
        let (head, body) = id.split_once('_').unwrap();
        assert_eq!(head, "rtc");
        assert!(Ulid::from_string(body).is_ok());
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(
            prefixed_ulid(prefix::CONNECTION),
            prefixed_ulid(prefix::CONNECTION)
        );
    }

    #[test]
    fn prefixed_keeps_body_verbatim() {
        assert_eq!(prefixed(prefix::TICKET, "a-b_c"), "wst_a-b_c");
    }
}
