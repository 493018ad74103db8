//! Machine descriptor (`.vbox`) access.
//!
//! [`ConfigCache`] answers read queries from a parsed tree that is rebuilt
//! whenever the file changes on disk. [`ConfigEditor`] performs the few
//! textual edits needed to drop stale media registrations.

mod cache;
mod editor;
mod records;
mod tree;

pub use cache::ConfigCache;
pub use editor::{ConfigEditor, strip_section_entries};
pub use records::{AttachedMediaRecord, SnapshotRecord};
pub use tree::{Descendants, DescriptorTree, Element};
