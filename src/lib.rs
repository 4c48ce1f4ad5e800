pub mod error;
pub mod crypto;
pub mod header;
pub mod index;
pub mod table;
pub mod codec;
pub mod payload;
pub mod pattern;
pub mod diagnostics;
pub mod archive;

pub use archive::{Archive, ArchiveOptions, ExtractReport};
pub use codec::{CodecId, get_codec};
pub use diagnostics::{DiagnosticSink, MemorySink, Severity, TracingSink};
pub use error::{ArchiveError, Result};
pub use header::HeaderInfo;
pub use index::{TrieIndex, TrieNode};
pub use table::FileEntry;
