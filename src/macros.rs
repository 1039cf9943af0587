//! Public macros for constructing option structs without relying on struct literal syntax.
//!
//! These macros exist to keep call sites ergonomic while allowing the crate to evolve
//! its option structs over time (e.g., adding fields) without forcing breaking changes.

/// Construct [`crate::Options`] from `Default` and a list of field assignments.
///
/// Example:
///
/// ```rust
/// use graft::DuplicateKeyPolicy;
///
/// let options = graft::options! {
///     duplicate_keys: DuplicateKeyPolicy::FirstWins,
///     unwrap_single_value: true,
/// };
/// ```
#[macro_export]
macro_rules! options {
    ( $( $field:ident : $value:expr ),* $(,)? ) => {{
        let mut opt = $crate::Options::default();
        $(
            opt.$field = $value;
        )*
        opt
    }};
}

/// Construct [`crate::Limits`] from `Default` and a list of field assignments.
///
/// Example:
///
/// ```rust
/// let limits = graft::limits! {
///     max_events: 10_000,
///     max_depth: 128,
/// };
/// ```
#[macro_export]
macro_rules! limits {
    ( $( $field:ident : $value:expr ),* $(,)? ) => {{
        let mut limits = $crate::Limits::default();
        $(
            limits.$field = $value;
        )*
        limits
    }};
}
