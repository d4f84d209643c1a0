//! Artifact packaging
//!
//! One artifact is one file: a plaintext manifest header followed by a
//! compressed, optionally encrypted payload. See [`format`] for the layout.

mod compression;
pub mod format;
mod io;
mod temp_file;

pub use compression::{compress, decompress};
pub use format::{
    ArtifactHeader, EncryptionInfo, FileEntry, IndexedFile, InheritedEntry, Manifest, PayloadBody,
    TableMeta,
};
pub use io::{check_key, sha256_hex, ArtifactReader, ArtifactWriter};
pub use temp_file::TempFileGuard;
