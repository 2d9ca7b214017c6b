//! Repository layer
//!
//! Collaborators that supply repositories to the engine:
//! - resolving a selection query into concrete repository targets
//! - materializing a checkout of one target at its revision
//!
//! Both are trait-based so callers can plug in their own VCS or search
//! backends; the engine itself only consumes [`CheckoutProvider`].

mod checkout;
mod resolver;

// Re-export traits
pub use checkout::CheckoutProvider;
pub use resolver::RepoResolver;

// Re-export implementations
pub use checkout::GitCheckout;
pub use resolver::{ManifestEntry, ManifestResolver};
