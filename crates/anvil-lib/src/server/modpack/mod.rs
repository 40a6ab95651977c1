pub mod hints;
pub mod mrpack;
pub mod source;
pub mod types;

pub use hints::PackHints;
pub use source::{ModpackSource, SourcedArchive};
