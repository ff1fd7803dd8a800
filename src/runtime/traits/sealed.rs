// ABOUTME: Sealed trait pattern for runtime traits.
// ABOUTME: Only runtimes defined in this crate may implement the capability traits.

/// Sealed trait to prevent external implementations.
///
/// New trait methods can be added without breaking downstream code. The
/// bollard runtime and the in-crate test fake are the only implementors.
pub trait Sealed {}
