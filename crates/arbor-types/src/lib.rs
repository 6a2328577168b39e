//! Foundation types for Arbor.
//!
//! Every other Arbor crate depends on `arbor-types` for [`ObjectId`], the
//! content identifier handed out by the object store for blobs, trees and
//! commits.

pub mod error;
pub mod object;

pub use error::TypeError;
pub use object::ObjectId;
