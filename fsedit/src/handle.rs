//! `FsHandle`: the open filesystem session. Owns the device handle and the
//! cached layout, and exposes every read/write accessor the rest of the
//! crate (and the CLI shell) needs.

use std::path::Path;

use crate::addressing::TargetKind;
use crate::bdh::Bdh;
use crate::bitmap::bit_get;
use crate::classify::classify;
use crate::classify::BlockClass;
use crate::editor::EditorSession;
use crate::error::FsError;
use crate::error::FsResult;
use crate::inode::Inode;
use crate::layout::GroupDescriptor;
use crate::layout::Layout;
use crate::layout::Variant;

/// Aggregate counters describing the whole volume, as reported by the
/// `summary` shell command.
#[derive(Debug, Clone)]
pub struct Summary {
	pub variant: Variant,
	pub block_size: u32,
	pub block_count: u64,
	pub free_blocks: u64,
	pub inode_count: u32,
	pub free_inodes: u32,
	pub group_count: u32,
	pub blocks_per_group: u32,
	pub inodes_per_group: u32,
	pub total_bytes: u64,
	pub free_bytes: u64,
	pub used_percent: f64,
	pub features: Vec<&'static str>,
}

/// An open filesystem: the device handle plus the cached superblock and
/// group descriptor table.
pub struct FsHandle {
	bdh: Bdh,
	layout: Layout,
}

impl FsHandle {
	/// Opens `path` and loads its layout. `writable` requests a read-write
	/// open; `Bdh::open` falls back to read-only on permission errors unless
	/// `writable` was required.
	pub fn open(path: &Path, writable: bool) -> FsResult<Self> {
		let bdh = Bdh::open(path, writable)?;
		let layout = Layout::load(&bdh)?;
		Ok(Self { bdh, layout })
	}

	/// Consumes the handle, releasing the device descriptor. A no-op beyond
	/// what `Drop` already does; it exists so call sites can express "I am
	/// done with this handle" and have the borrow checker enforce it.
	pub fn close(self) {}

	/// Whether this handle was opened for writing.
	pub fn is_writable(&self) -> bool {
		self.bdh.is_writable()
	}

	/// Raw byte length of the underlying device or image file, independent
	/// of what the superblock claims `blocks_count` to be.
	pub fn device_len(&self) -> FsResult<u64> {
		self.bdh.len()
	}

	/// The path the handle was opened from.
	pub fn path(&self) -> &std::path::Path {
		self.bdh.path()
	}

	/// The cached layout (superblock, group descriptor table, derived
	/// geometry).
	pub fn layout(&self) -> &Layout {
		&self.layout
	}

	pub fn variant(&self) -> Variant {
		self.layout.variant()
	}

	/// Aggregate counters for the whole volume.
	pub fn summary(&self) -> FsResult<Summary> {
		let sb = &self.layout.superblock;
		let block_size = self.layout.block_size as u64;
		let total_bytes = sb.blocks_count as u64 * block_size;
		let free_bytes = sb.free_blocks_count as u64 * block_size;
		let used_percent = if total_bytes == 0 {
			0.0
		} else {
			100.0 * (total_bytes - free_bytes) as f64 / total_bytes as f64
		};

		Ok(Summary {
			variant: self.layout.variant(),
			block_size: self.layout.block_size,
			block_count: sb.blocks_count as u64,
			free_blocks: sb.free_blocks_count as u64,
			inode_count: sb.inodes_count,
			free_inodes: sb.free_inodes_count,
			group_count: self.layout.group_count,
			blocks_per_group: self.layout.blocks_per_group,
			inodes_per_group: self.layout.inodes_per_group,
			total_bytes,
			free_bytes,
			used_percent,
			features: self.layout.features(),
		})
	}

	/// Returns the group descriptor for group `g`.
	pub fn group_descriptor(&self, g: u32) -> FsResult<&GroupDescriptor> {
		self.layout
			.group_descriptors
			.get(g as usize)
			.ok_or(FsError::OutOfRange {
				what: "group",
				value: g as u64,
			})
	}

	/// Free blocks, free inodes, and directory count for group `g`, as
	/// recorded in its descriptor (not recomputed from the bitmaps).
	pub fn group_free_summary(&self, g: u32) -> FsResult<(u32, u32, u32)> {
		let gd = self.group_descriptor(g)?;
		Ok((gd.free_blocks_count, gd.free_inodes_count, gd.used_dirs_count))
	}

	/// Classifies block `b` (reserved / superblock / GDT / bitmap / inode
	/// table / data).
	pub fn classify_block(&self, b: u64) -> BlockClass {
		classify(&self.layout, b)
	}

	/// Whether block `b` is marked allocated in its group's block bitmap.
	pub fn is_block_allocated(&self, b: u64) -> FsResult<bool> {
		if b == 0 || b >= self.layout.superblock.blocks_count as u64 {
			return Err(FsError::OutOfRange {
				what: "block",
				value: b,
			});
		}
		let group = ((b - self.layout.superblock.first_data_block as u64)
			/ self.layout.blocks_per_group as u64) as u32;
		let gd = self.group_descriptor(group)?;
		let index = ((b - self.layout.superblock.first_data_block as u64)
			% self.layout.blocks_per_group as u64) as u32;

		let mut buf = vec![0u8; self.layout.block_size as usize];
		self.bdh
			.pread_exact(gd.block_bitmap * self.layout.block_size as u64, &mut buf)?;
		Ok(bit_get(&buf, index))
	}

	/// Whether inode `n` is marked allocated in its group's inode bitmap.
	pub fn is_inode_allocated(&self, n: u32) -> FsResult<bool> {
		if n == 0 || n > self.layout.superblock.inodes_count {
			return Err(FsError::OutOfRange {
				what: "inode",
				value: n as u64,
			});
		}
		let group = (n - 1) / self.layout.inodes_per_group;
		let gd = self.group_descriptor(group)?;
		let index = (n - 1) % self.layout.inodes_per_group;

		let mut buf = vec![0u8; self.layout.block_size as usize];
		self.bdh
			.pread_exact(gd.inode_bitmap * self.layout.block_size as u64, &mut buf)?;
		Ok(bit_get(&buf, index))
	}

	/// Reads and decodes inode `n`.
	pub fn read_inode(&self, n: u32) -> FsResult<Inode> {
		let (offset, len) = TargetKind::Inode(n).address_of(&self.layout)?;
		let mut buf = vec![0u8; len];
		self.bdh.pread_exact(offset, &mut buf)?;
		Ok(Inode::decode(&buf))
	}

	/// Writes raw inode record bytes for inode `n`. `bytes.len()` must equal
	/// the volume's inode record size.
	pub fn write_inode(&mut self, n: u32, bytes: &[u8]) -> FsResult<()> {
		let (offset, len) = TargetKind::Inode(n).address_of(&self.layout)?;
		if bytes.len() != len {
			return Err(FsError::OutOfRange {
				what: "inode record length",
				value: bytes.len() as u64,
			});
		}
		self.bdh.pwrite_exact(offset, bytes)
	}

	/// Reads block `b` into `buf`. `buf.len()` must equal the block size.
	pub fn read_block(&self, b: u64, buf: &mut [u8]) -> FsResult<()> {
		let (offset, len) = TargetKind::Block(b).address_of(&self.layout)?;
		if buf.len() != len {
			return Err(FsError::OutOfRange {
				what: "block buffer length",
				value: buf.len() as u64,
			});
		}
		self.bdh.pread_exact(offset, buf)
	}

	/// Writes `buf` to block `b`. `buf.len()` must equal the block size.
	pub fn write_block(&mut self, b: u64, buf: &[u8]) -> FsResult<()> {
		let (offset, len) = TargetKind::Block(b).address_of(&self.layout)?;
		if buf.len() != len {
			return Err(FsError::OutOfRange {
				what: "block buffer length",
				value: buf.len() as u64,
			});
		}
		self.bdh.pwrite_exact(offset, buf)
	}

	/// Re-reads the superblock and group descriptor table. Must be called
	/// after any save whose target range overlapped either region.
	pub fn invalidate_and_reload(&mut self) -> FsResult<()> {
		self.layout.invalidate_and_reload(&self.bdh)
	}

	/// Opens an editor session over `kind`, borrowing this handle
	/// exclusively for the session's lifetime.
	pub fn open_editor(&mut self, kind: TargetKind) -> FsResult<EditorSession<'_>> {
		EditorSession::open(self, kind)
	}

	pub(crate) fn bdh(&self) -> &Bdh {
		&self.bdh
	}

	/// Writes raw bytes at an arbitrary device offset. Used by
	/// `EditorSession::save`, which already knows the exact target range.
	pub(crate) fn bdh_write(&mut self, offset: u64, buf: &[u8]) -> FsResult<()> {
		self.bdh.pwrite_exact(offset, buf)
	}
}
