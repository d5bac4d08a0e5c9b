//! Data models for the Silsilah family tree.
//!
//! The JSON shapes here are the wire format shared with the remote document
//! resource, the local cache and the presentation layer.

mod document;
mod member;
mod record;
mod sync;

pub use document::*;
pub use member::*;
pub use record::*;
pub use sync::*;
