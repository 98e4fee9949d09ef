//! The file container: header, packet framing, footer index, and the
//! file-codec dispatch (framing x compression x batching).
//!
//! File structure:
//!
//! ```text
//! FileHeader
//!   [ PacketHeader, compressed payload ] *
//! FileFooter
//! ```
//!
//! A file is sealed when the footer is present and validates at its tail;
//! an unsealed file is recoverable up to its last fully written packet.
//! Nothing in a file is ever mutated in place.

pub mod codec;
pub mod footer;
pub mod header;
pub mod packet;

pub use codec::{resolve_file_codec_id, Compression, FileCodecId, Framing, PayloadCodec};
pub use footer::{FileFooter, PacketIndexEntry};
pub use header::{FileFlags, FileHeader};
pub use packet::PacketHeader;
