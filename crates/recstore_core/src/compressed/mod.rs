//! Compressed store layered over two inner stores.
//!
//! ```text
//! <store>/
//! ├─ .rscontrol.prop     # Compressor_Type = Zstd
//! ├─ theBackingStore/    # compressed payloads
//! └─ theBackingStore_md/ # decimal uncompressed lengths
//! ```

mod compressor;
mod store;

pub use compressor::{Compressor, CompressorKind, ZstdCompressor};
pub use store::{CompressedStore, BACKING_DIR, COMPRESSOR_PROPERTY, METADATA_DIR};
