//! Private file serving.
//!
//! Photos and documents live outside any public directory and are only
//! handed out by [`ResourceGuard`] after the caller, the path, the extension,
//! ownership and the file's own leading bytes all check out.

pub mod guard;
pub mod handler;
pub mod ownership;
pub mod path;
pub mod signature;

pub use guard::{ResourceGuard, ServedFile};
pub use handler::{resource_routes, serve_resource, ResourceState};
pub use ownership::{InMemoryOwnership, OwnershipLookup};
pub use signature::{check_import, validate_signature, FileKind};
