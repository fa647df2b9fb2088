//! Decodes and caches the superblock and group descriptor table.
//!
//! Unlike the teacher's `mkfs::ext2::Superblock`/`BlockGroupDescriptor`,
//! which overlay a `#[repr(C, packed)]` struct directly onto the bytes read
//! from disk, these types are decoded field-by-field from explicit
//! little-endian byte offsets. The byte editor (`crate::editor`) is the only
//! part of this crate that ever writes raw bytes back to these regions; the
//! decoded `Superblock`/`GroupDescriptor` here exist purely as a read cache
//! for `summary()`, `variant()`, and address computation, and are always
//! rebuilt from disk rather than re-encoded, so there is no risk of losing
//! unknown fields on save.

use crate::bdh::Bdh;
use crate::error::FsError;
use crate::error::FsResult;

/// Byte offset of the superblock from the start of the device.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// Length in bytes of the on-disk superblock record.
pub const SUPERBLOCK_LEN: usize = 1024;
/// The ext2/3/4 superblock magic number.
pub const EXT2_MAGIC: u16 = 0xef53;

const FEATURE_COMPAT_DIR_INDEX: u32 = 0x0020;
const FEATURE_COMPAT_HAS_JOURNAL: u32 = 0x0004;
const FEATURE_COMPAT_EXT_ATTR: u32 = 0x0008;
const FEATURE_COMPAT_RESIZE_INO: u32 = 0x0010;

const FEATURE_INCOMPAT_FILETYPE: u32 = 0x0002;
const FEATURE_INCOMPAT_RECOVER: u32 = 0x0004;
const FEATURE_INCOMPAT_JOURNAL_DEV: u32 = 0x0008;
const FEATURE_INCOMPAT_META_BG: u32 = 0x0010;
const FEATURE_INCOMPAT_EXTENTS: u32 = 0x0040;
const FEATURE_INCOMPAT_64BIT: u32 = 0x0080;
const FEATURE_INCOMPAT_MMP: u32 = 0x0100;
const FEATURE_INCOMPAT_FLEX_BG: u32 = 0x0200;

const FEATURE_RO_COMPAT_SPARSE_SUPER: u32 = 0x0001;
const FEATURE_RO_COMPAT_LARGE_FILE: u32 = 0x0002;
const FEATURE_RO_COMPAT_HUGE_FILE: u32 = 0x0008;
const FEATURE_RO_COMPAT_GDT_CSUM: u32 = 0x0010;
const FEATURE_RO_COMPAT_DIR_NLINK: u32 = 0x0020;
const FEATURE_RO_COMPAT_EXTRA_ISIZE: u32 = 0x0040;

fn le32(buf: &[u8], off: usize) -> u32 {
	u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

fn le16(buf: &[u8], off: usize) -> u16 {
	u16::from_le_bytes(buf[off..off + 2].try_into().unwrap())
}

/// The decoded fields of the ext2/3/4 superblock that this core reads or
/// needs for layout derivation.
#[derive(Debug, Clone)]
pub struct Superblock {
	pub inodes_count: u32,
	pub blocks_count: u32,
	pub r_blocks_count: u32,
	pub free_blocks_count: u32,
	pub free_inodes_count: u32,
	pub first_data_block: u32,
	pub log_block_size: u32,
	pub blocks_per_group: u32,
	pub inodes_per_group: u32,
	pub mnt_count: u16,
	pub max_mnt_count: u16,
	pub magic: u16,
	pub state: u16,
	pub errors: u16,
	pub minor_rev_level: u16,
	pub lastcheck: u32,
	pub checkinterval: u32,
	pub creator_os: u32,
	pub rev_level: u32,
	pub def_resuid: u16,
	pub def_resgid: u16,
	pub inode_size: u16,
	pub feature_compat: u32,
	pub feature_incompat: u32,
	pub feature_ro_compat: u32,
}

impl Superblock {
	/// Decodes a superblock from exactly `SUPERBLOCK_LEN` bytes.
	pub fn decode(buf: &[u8]) -> FsResult<Self> {
		let magic = le16(buf, 0x38);
		if magic != EXT2_MAGIC {
			return Err(FsError::NotExtFilesystem { magic });
		}

		let rev_level = le32(buf, 0x4c);
		// The extended (dynamic-rev) fields only exist for rev_level >= 1;
		// revision 0 volumes use the fixed 128-byte inode and have no
		// feature flags.
		let (inode_size, feature_compat, feature_incompat, feature_ro_compat) = if rev_level >= 1 {
			(
				le16(buf, 0x58),
				le32(buf, 0x5c),
				le32(buf, 0x60),
				le32(buf, 0x64),
			)
		} else {
			(128, 0, 0, 0)
		};

		Ok(Self {
			inodes_count: le32(buf, 0x00),
			blocks_count: le32(buf, 0x04),
			r_blocks_count: le32(buf, 0x08),
			free_blocks_count: le32(buf, 0x0c),
			free_inodes_count: le32(buf, 0x10),
			first_data_block: le32(buf, 0x14),
			log_block_size: le32(buf, 0x18),
			blocks_per_group: le32(buf, 0x20),
			inodes_per_group: le32(buf, 0x28),
			mnt_count: le16(buf, 0x34),
			max_mnt_count: le16(buf, 0x36),
			magic,
			state: le16(buf, 0x3a),
			errors: le16(buf, 0x3c),
			minor_rev_level: le16(buf, 0x3e),
			lastcheck: le32(buf, 0x40),
			checkinterval: le32(buf, 0x44),
			creator_os: le32(buf, 0x48),
			rev_level,
			def_resuid: le16(buf, 0x50),
			def_resgid: le16(buf, 0x52),
			inode_size,
			feature_compat,
			feature_incompat,
			feature_ro_compat,
		})
	}

	/// Block size in bytes, derived from `log_block_size`.
	///
	/// `log_block_size` comes straight off disk and is
	/// corruption/attacker-controlled, so the valid range `0..=6` (block
	/// sizes `1024..=65536`) is checked *before* shifting rather than after:
	/// computing `1024 << log_block_size` first and comparing the result
	/// against `65536` is not safe, because a large enough shift silently
	/// wraps back down to a small or zero value (a `u32` shift of 22 or more
	/// wraps to `0`; even widening to `u64` only pushes the same problem out
	/// to shifts of 54 or more) and would then pass the upper-bound check,
	/// handing callers a bogus block size that divides-by-zero or
	/// misaddresses every later read.
	pub fn block_size(&self) -> FsResult<u32> {
		if self.log_block_size > 6 {
			return Err(FsError::UnsupportedBlockSize(self.log_block_size));
		}
		Ok(1024u32 << self.log_block_size)
	}

	/// Whether group descriptors on this volume are the 64-bit (64 byte)
	/// layout rather than the legacy 32-byte layout.
	pub fn is_64bit_variant(&self) -> bool {
		self.feature_incompat & FEATURE_INCOMPAT_64BIT != 0
	}
}

/// A single block group descriptor. Fields are widened to `u64`/`u32`
/// uniformly regardless of whether the on-disk record was the 32- or
/// 64-byte layout.
#[derive(Debug, Clone, Copy)]
pub struct GroupDescriptor {
	pub block_bitmap: u64,
	pub inode_bitmap: u64,
	pub inode_table: u64,
	pub free_blocks_count: u32,
	pub free_inodes_count: u32,
	pub used_dirs_count: u32,
}

impl GroupDescriptor {
	/// Size in bytes of one descriptor record for the given variant.
	pub fn record_len(is_64bit: bool) -> usize {
		if is_64bit {
			64
		} else {
			32
		}
	}

	/// Decodes one descriptor from a buffer of exactly `record_len(is_64bit)`
	/// bytes.
	pub fn decode(buf: &[u8], is_64bit: bool) -> Self {
		let block_bitmap_lo = le32(buf, 0x00) as u64;
		let inode_bitmap_lo = le32(buf, 0x04) as u64;
		let inode_table_lo = le32(buf, 0x08) as u64;
		let free_blocks_lo = le16(buf, 0x0c) as u32;
		let free_inodes_lo = le16(buf, 0x0e) as u32;
		let used_dirs_lo = le16(buf, 0x10) as u32;

		if is_64bit && buf.len() >= 64 {
			let block_bitmap_hi = le32(buf, 0x20) as u64;
			let inode_bitmap_hi = le32(buf, 0x24) as u64;
			let inode_table_hi = le32(buf, 0x28) as u64;
			let free_blocks_hi = le16(buf, 0x2c) as u32;
			let free_inodes_hi = le16(buf, 0x2e) as u32;
			let used_dirs_hi = le16(buf, 0x30) as u32;
			Self {
				block_bitmap: block_bitmap_lo | (block_bitmap_hi << 32),
				inode_bitmap: inode_bitmap_lo | (inode_bitmap_hi << 32),
				inode_table: inode_table_lo | (inode_table_hi << 32),
				free_blocks_count: free_blocks_lo | (free_blocks_hi << 16),
				free_inodes_count: free_inodes_lo | (free_inodes_hi << 16),
				used_dirs_count: used_dirs_lo | (used_dirs_hi << 16),
			}
		} else {
			Self {
				block_bitmap: block_bitmap_lo,
				inode_bitmap: inode_bitmap_lo,
				inode_table: inode_table_lo,
				free_blocks_count: free_blocks_lo,
				free_inodes_count: free_inodes_lo,
				used_dirs_count: used_dirs_lo,
			}
		}
	}
}

/// One of the three filesystem generations distinguished by feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
	Ext2,
	Ext4,
	Ext3,
}

impl std::fmt::Display for Variant {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			Self::Ext2 => "ext2",
			Self::Ext3 => "ext3",
			Self::Ext4 => "ext4",
		};
		write!(f, "{s}")
	}
}

/// Rounds `a / b` up to the next integer, in 64-bit arithmetic to avoid
/// overflow on very large volumes.
pub fn ceil_div(a: u64, b: u64) -> u64 {
	(a + b - 1) / b
}

/// Cached, decoded view of the superblock and group descriptor table.
pub struct Layout {
	pub superblock: Superblock,
	pub group_descriptors: Vec<GroupDescriptor>,
	pub block_size: u32,
	pub inode_size: u32,
	pub inodes_per_group: u32,
	pub blocks_per_group: u32,
	pub group_count: u32,
	pub gd_size: usize,
	pub gdt_start_byte: u64,
}

impl Layout {
	/// Reads and decodes the superblock and group descriptor table from
	/// `bdh`.
	pub fn load(bdh: &Bdh) -> FsResult<Self> {
		let mut sb_buf = [0u8; SUPERBLOCK_LEN];
		bdh.pread_exact(SUPERBLOCK_OFFSET, &mut sb_buf)?;
		let superblock = Superblock::decode(&sb_buf)?;

		let block_size = superblock.block_size()?;
		let inode_size = if superblock.rev_level >= 1 {
			superblock.inode_size as u32
		} else {
			128
		};
		let is_64bit = superblock.is_64bit_variant();
		let gd_size = GroupDescriptor::record_len(is_64bit);

		if superblock.blocks_per_group == 0 {
			return Err(FsError::UnsupportedFeature("blocks_per_group == 0"));
		}
		let group_count =
			ceil_div(superblock.blocks_count as u64, superblock.blocks_per_group as u64) as u32;

		let gdt_start_byte = ceil_div(SUPERBLOCK_OFFSET + SUPERBLOCK_LEN as u64, block_size as u64)
			* block_size as u64;

		let gdt_len = gd_size * group_count as usize;
		let mut gdt_buf = vec![0u8; gdt_len];
		bdh.pread_exact(gdt_start_byte, &mut gdt_buf)?;

		let group_descriptors = gdt_buf
			.chunks_exact(gd_size)
			.map(|chunk| GroupDescriptor::decode(chunk, is_64bit))
			.collect();

		let inodes_per_group = superblock.inodes_per_group;
		let blocks_per_group = superblock.blocks_per_group;

		Ok(Self {
			superblock,
			group_descriptors,
			block_size,
			inode_size,
			inodes_per_group,
			blocks_per_group,
			group_count,
			gd_size,
			gdt_start_byte,
		})
	}

	/// Re-reads the superblock and group descriptor table, replacing the
	/// cached copies. Called after any save that touched either region.
	pub fn invalidate_and_reload(&mut self, bdh: &Bdh) -> FsResult<()> {
		*self = Self::load(bdh)?;
		Ok(())
	}

	/// Classifies the filesystem generation from its feature flags.
	pub fn variant(&self) -> Variant {
		let incompat = self.superblock.feature_incompat;
		if incompat
			& (FEATURE_INCOMPAT_EXTENTS
				| FEATURE_INCOMPAT_64BIT
				| FEATURE_INCOMPAT_FLEX_BG
				| FEATURE_INCOMPAT_MMP)
			!= 0
		{
			Variant::Ext4
		} else if self.superblock.feature_compat & FEATURE_COMPAT_HAS_JOURNAL != 0 {
			Variant::Ext3
		} else {
			Variant::Ext2
		}
	}

	/// Human-readable names of every recognized compat/incompat/ro_compat
	/// feature flag present on the volume.
	pub fn features(&self) -> Vec<&'static str> {
		let sb = &self.superblock;
		let mut out = Vec::new();
		let compat = [
			(FEATURE_COMPAT_DIR_INDEX, "dir_index"),
			(FEATURE_COMPAT_HAS_JOURNAL, "has_journal"),
			(FEATURE_COMPAT_EXT_ATTR, "ext_attr"),
			(FEATURE_COMPAT_RESIZE_INO, "resize_inode"),
		];
		let incompat = [
			(FEATURE_INCOMPAT_FILETYPE, "filetype"),
			(FEATURE_INCOMPAT_RECOVER, "needs_recovery"),
			(FEATURE_INCOMPAT_JOURNAL_DEV, "journal_device"),
			(FEATURE_INCOMPAT_META_BG, "meta_bg"),
			(FEATURE_INCOMPAT_EXTENTS, "extents"),
			(FEATURE_INCOMPAT_64BIT, "64bit"),
			(FEATURE_INCOMPAT_MMP, "mmp"),
			(FEATURE_INCOMPAT_FLEX_BG, "flex_bg"),
		];
		let ro_compat = [
			(FEATURE_RO_COMPAT_SPARSE_SUPER, "sparse_super"),
			(FEATURE_RO_COMPAT_LARGE_FILE, "large_file"),
			(FEATURE_RO_COMPAT_HUGE_FILE, "huge_file"),
			(FEATURE_RO_COMPAT_GDT_CSUM, "gdt_csum"),
			(FEATURE_RO_COMPAT_DIR_NLINK, "dir_nlink"),
			(FEATURE_RO_COMPAT_EXTRA_ISIZE, "extra_isize"),
		];
		for (bit, name) in compat {
			if sb.feature_compat & bit != 0 {
				out.push(name);
			}
		}
		for (bit, name) in incompat {
			if sb.feature_incompat & bit != 0 {
				out.push(name);
			}
		}
		for (bit, name) in ro_compat {
			if sb.feature_ro_compat & bit != 0 {
				out.push(name);
			}
		}
		out
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn sample_superblock(blocks_count: u32, blocks_per_group: u32) -> [u8; SUPERBLOCK_LEN] {
		let mut buf = [0u8; SUPERBLOCK_LEN];
		buf[0x00..0x04].copy_from_slice(&1024u32.to_le_bytes()); // inodes_count
		buf[0x04..0x08].copy_from_slice(&blocks_count.to_le_bytes());
		buf[0x20..0x24].copy_from_slice(&blocks_per_group.to_le_bytes());
		buf[0x28..0x2c].copy_from_slice(&1024u32.to_le_bytes()); // inodes_per_group
		buf[0x38..0x3a].copy_from_slice(&EXT2_MAGIC.to_le_bytes());
		buf[0x4c..0x50].copy_from_slice(&1u32.to_le_bytes()); // rev_level
		buf[0x58..0x5a].copy_from_slice(&128u16.to_le_bytes()); // inode_size
		buf
	}

	#[test]
	fn rejects_bad_magic() {
		let mut buf = sample_superblock(4096, 1024);
		buf[0x38..0x3a].copy_from_slice(&0u16.to_le_bytes());
		let err = Superblock::decode(&buf).unwrap_err();
		assert!(matches!(err, FsError::NotExtFilesystem { magic: 0 }));
	}

	#[test]
	fn block_size_from_log() {
		let mut buf = sample_superblock(4096, 1024);
		buf[0x18..0x1c].copy_from_slice(&2u32.to_le_bytes());
		let sb = Superblock::decode(&buf).unwrap();
		assert_eq!(sb.block_size().unwrap(), 4096);
	}

	#[test]
	fn block_size_rejects_large_log_instead_of_wrapping_to_zero() {
		// A corrupt or hostile superblock can set log_block_size to any u32.
		// A shift-then-check implementation wraps 1024 << 22 (and several
		// other large shifts) back down to 0, which would sail past a
		// `size > 65536` check; this must be rejected before the shift.
		let mut buf = sample_superblock(4096, 1024);
		buf[0x18..0x1c].copy_from_slice(&22u32.to_le_bytes());
		let sb = Superblock::decode(&buf).unwrap();
		assert!(matches!(sb.block_size(), Err(FsError::UnsupportedBlockSize(_))));
	}

	#[test]
	fn group_count_rounds_up() {
		// 4096 blocks, 1024 per group: group_count must be 4.
		assert_eq!(ceil_div(4096, 1024), 4);
		// One leftover block forces a fifth, smaller group.
		assert_eq!(ceil_div(4097, 1024), 5);
	}

	#[test]
	fn group_descriptor_32_bit_roundtrip() {
		let mut buf = [0u8; 32];
		buf[0x00..0x04].copy_from_slice(&10u32.to_le_bytes());
		buf[0x04..0x08].copy_from_slice(&20u32.to_le_bytes());
		buf[0x08..0x0c].copy_from_slice(&30u32.to_le_bytes());
		buf[0x0c..0x0e].copy_from_slice(&5u16.to_le_bytes());
		buf[0x0e..0x10].copy_from_slice(&6u16.to_le_bytes());
		buf[0x10..0x12].copy_from_slice(&1u16.to_le_bytes());

		let gd = GroupDescriptor::decode(&buf, false);
		assert_eq!(gd.block_bitmap, 10);
		assert_eq!(gd.inode_bitmap, 20);
		assert_eq!(gd.inode_table, 30);
		assert_eq!(gd.free_blocks_count, 5);
		assert_eq!(gd.free_inodes_count, 6);
		assert_eq!(gd.used_dirs_count, 1);
	}

	#[test]
	fn group_descriptor_64_bit_combines_hi_lo() {
		let mut buf = [0u8; 64];
		buf[0x00..0x04].copy_from_slice(&1u32.to_le_bytes());
		buf[0x20..0x24].copy_from_slice(&1u32.to_le_bytes()); // hi = 1
		let gd = GroupDescriptor::decode(&buf, true);
		assert_eq!(gd.block_bitmap, (1u64 << 32) | 1);
	}
}
