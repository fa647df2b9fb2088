//! Core library for reading and editing the on-disk structures of an
//! ext2/ext3/ext4 filesystem image or block device.

pub mod addressing;
pub mod bdh;
pub mod bitmap;
pub mod classify;
pub mod editor;
pub mod error;
pub mod format;
pub mod handle;
pub mod inode;
pub mod layout;

pub use addressing::TargetKind;
pub use editor::EditMode;
pub use editor::EditorSession;
pub use error::FsError;
pub use error::FsResult;
pub use handle::FsHandle;
pub use handle::Summary;
pub use layout::Variant;
