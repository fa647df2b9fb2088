//! Error taxonomy for the analyzer/editor core.
//!
//! Every fallible operation returns a `Result<_, FsError>`. There is no panicking
//! control flow here outside of test code; short reads and short writes are
//! reported, never silently papered over.

use std::fmt;
use std::io;

/// Reason an `open()` of a device failed.
#[derive(Debug)]
pub enum OpenErrorKind {
	/// The path does not exist.
	NotFound,
	/// The process does not have permission to open the device.
	PermissionDenied,
	/// The path opened successfully but is neither a regular file (an
	/// on-disk image) nor a block/character device — a directory, FIFO, or
	/// socket has no byte-offset structure this editor can address.
	NotBlockDevice,
	/// Any other I/O failure encountered while opening.
	Io(io::Error),
}

impl fmt::Display for OpenErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NotFound => write!(f, "no such file or device"),
			Self::PermissionDenied => write!(f, "permission denied"),
			Self::NotBlockDevice => write!(f, "not a block device"),
			Self::Io(e) => write!(f, "{e}"),
		}
	}
}

/// The error type shared by every component of the core.
#[derive(Debug)]
pub enum FsError {
	/// Failed to open the device.
	Open(OpenErrorKind),
	/// The superblock magic number did not match `0xEF53`.
	NotExtFilesystem {
		/// The magic number that was actually found.
		magic: u16,
	},
	/// The derived block size is not supported (typically `> 65536`).
	UnsupportedBlockSize(u32),
	/// A structural field could not be decoded because of an unsupported
	/// feature combination.
	UnsupportedFeature(&'static str),
	/// A block, inode, or group number (or a byte index into a buffer) fell
	/// outside of its legal domain.
	OutOfRange {
		/// Name of the quantity that was out of range (e.g. `"inode"`).
		what: &'static str,
		/// The value that was rejected.
		value: u64,
	},
	/// A write was attempted on a handle or device opened read-only.
	ReadOnly,
	/// A short read, short write, or other OS-level I/O error.
	Io(io::Error),
}

impl fmt::Display for FsError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Open(kind) => write!(f, "failed to open device: {kind}"),
			Self::NotExtFilesystem { magic } => {
				write!(
					f,
					"not an ext2/ext3/ext4 filesystem (magic: {magic:#06x}, expected: 0xef53)"
				)
			}
			Self::UnsupportedBlockSize(size) => write!(f, "unsupported block size: {size}"),
			Self::UnsupportedFeature(feat) => write!(f, "unsupported feature: {feat}"),
			Self::OutOfRange { what, value } => write!(f, "{what} {value} is out of range"),
			Self::ReadOnly => write!(f, "device is open read-only"),
			Self::Io(e) => write!(f, "I/O error: {e}"),
		}
	}
}

impl std::error::Error for FsError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Open(OpenErrorKind::Io(e)) => Some(e),
			Self::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for FsError {
	fn from(e: io::Error) -> Self {
		Self::Io(e)
	}
}

pub type FsResult<T> = Result<T, FsError>;
