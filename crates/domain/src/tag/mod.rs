mod change;
mod descriptor;
mod map;
mod source;
mod value;

pub use change::{CacheEntry, EntrySource, TagChange};
pub use descriptor::{AccessMode, DAC_FULL_SCALE, ScalingKind, TagDefinition, TagDescriptor};
pub use map::{LoadIssue, TagMap};
pub use source::{RawTagTable, TagTableSource};
pub use value::TagValue;

#[cfg(test)]
pub use source::MockTagTableSource;
