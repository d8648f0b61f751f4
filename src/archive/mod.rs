mod buffer;
pub mod codec;
mod end_record;
mod entry;
mod format;
mod manifest;
mod reader;
mod store;
mod writer;

pub use buffer::{Staged, WriteBuffer};
pub use end_record::{EndRecord, END_RECORD_SIGNATURE, END_RECORD_SIZE};
pub use entry::{DirEntry, Entry, EntryKind};
pub use format::{
    ArchiveFormat, Compression, FileHeader, API_VERSION, FORMAT_VERSION_MAJOR,
    FORMAT_VERSION_MINOR, HEADER_SIZE, MAGIC_NUMBER, MAX_PATH_LENGTH,
};
pub use manifest::{EntryRecord, Manifest, ENTRY_RECORD_SIGNATURE};
pub use reader::{ArchiveReader, LoadedArchive};
pub use store::EntryStore;
pub use writer::{write_atomic, ArchiveWriter};
