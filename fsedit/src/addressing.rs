//! Maps a symbolic target to a `(byte offset, length)` pair on the device.
//!
//! The six target kinds form a closed set, so they are represented as a
//! plain enum with one inherent method rather than as trait objects — the
//! teacher reaches for `Box<dyn FSFactory>` in `mkfs` only because
//! filesystem types there are an open, plugin-like set; that does not apply
//! here.

use crate::error::FsError;
use crate::error::FsResult;
use crate::layout::Layout;

/// A symbolic reference to one on-disk structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
	Superblock,
	GroupDescriptor(u32),
	Inode(u32),
	Block(u64),
	BlockBitmap(u32),
	InodeBitmap(u32),
}

impl TargetKind {
	/// Resolves this target to an absolute byte offset and length on the
	/// device, given the currently cached layout.
	pub fn address_of(&self, layout: &Layout) -> FsResult<(u64, usize)> {
		match *self {
			TargetKind::Superblock => Ok((crate::layout::SUPERBLOCK_OFFSET, crate::layout::SUPERBLOCK_LEN)),

			TargetKind::GroupDescriptor(g) => {
				if g >= layout.group_count {
					return Err(FsError::OutOfRange {
						what: "group",
						value: g as u64,
					});
				}
				let offset = layout.gdt_start_byte + g as u64 * layout.gd_size as u64;
				Ok((offset, layout.gd_size))
			}

			TargetKind::Inode(n) => {
				let gd = inode_group_descriptor(layout, n)?;
				let index = (n - 1) % layout.inodes_per_group;
				let offset =
					gd.inode_table * layout.block_size as u64 + index as u64 * layout.inode_size as u64;
				Ok((offset, layout.inode_size as usize))
			}

			TargetKind::Block(b) => {
				if b == 0 || b >= layout.superblock.blocks_count as u64 {
					return Err(FsError::OutOfRange {
						what: "block",
						value: b,
					});
				}
				Ok((b * layout.block_size as u64, layout.block_size as usize))
			}

			TargetKind::BlockBitmap(g) => {
				let gd = group_descriptor(layout, g)?;
				Ok((gd.block_bitmap * layout.block_size as u64, layout.block_size as usize))
			}

			TargetKind::InodeBitmap(g) => {
				let gd = group_descriptor(layout, g)?;
				Ok((gd.inode_bitmap * layout.block_size as u64, layout.block_size as usize))
			}
		}
	}
}

fn group_descriptor(layout: &Layout, g: u32) -> FsResult<&crate::layout::GroupDescriptor> {
	layout
		.group_descriptors
		.get(g as usize)
		.ok_or(FsError::OutOfRange {
			what: "group",
			value: g as u64,
		})
}

fn inode_group_descriptor(layout: &Layout, n: u32) -> FsResult<&crate::layout::GroupDescriptor> {
	if n == 0 || n > layout.superblock.inodes_count {
		return Err(FsError::OutOfRange {
			what: "inode",
			value: n as u64,
		});
	}
	let group = (n - 1) / layout.inodes_per_group;
	group_descriptor(layout, group)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::layout::GroupDescriptor;
	use crate::layout::Superblock;

	fn test_layout() -> Layout {
		let superblock = Superblock {
			inodes_count: 1024,
			blocks_count: 4096,
			r_blocks_count: 0,
			free_blocks_count: 0,
			free_inodes_count: 0,
			first_data_block: 1,
			log_block_size: 0,
			blocks_per_group: 4096,
			inodes_per_group: 1024,
			mnt_count: 0,
			max_mnt_count: 0,
			magic: crate::layout::EXT2_MAGIC,
			state: 1,
			errors: 1,
			minor_rev_level: 0,
			lastcheck: 0,
			checkinterval: 0,
			creator_os: 0,
			rev_level: 1,
			def_resuid: 0,
			def_resgid: 0,
			inode_size: 128,
			feature_compat: 0,
			feature_incompat: 0,
			feature_ro_compat: 0,
		};
		Layout {
			superblock,
			group_descriptors: vec![GroupDescriptor {
				block_bitmap: 4,
				inode_bitmap: 5,
				inode_table: 6,
				free_blocks_count: 0,
				free_inodes_count: 0,
				used_dirs_count: 0,
			}],
			block_size: 1024,
			inode_size: 128,
			inodes_per_group: 1024,
			blocks_per_group: 4096,
			group_count: 1,
			gd_size: 32,
			gdt_start_byte: 2048,
		}
	}

	#[test]
	fn superblock_address() {
		let layout = test_layout();
		let (offset, len) = TargetKind::Superblock.address_of(&layout).unwrap();
		assert_eq!(offset, 1024);
		assert_eq!(len, 1024);
	}

	#[test]
	fn inode_addresses_are_distinct_and_packed() {
		let layout = test_layout();
		let (o1, _) = TargetKind::Inode(1).address_of(&layout).unwrap();
		let (o2, _) = TargetKind::Inode(2).address_of(&layout).unwrap();
		assert_ne!(o1, o2);
		assert_eq!(o2 - o1, 128);
		assert_eq!(o1, 6 * 1024);
	}

	#[test]
	fn inode_zero_is_out_of_range() {
		let layout = test_layout();
		assert!(matches!(
			TargetKind::Inode(0).address_of(&layout),
			Err(FsError::OutOfRange { what: "inode", value: 0 })
		));
	}

	#[test]
	fn block_bitmap_address_uses_group_descriptor() {
		let layout = test_layout();
		let (offset, len) = TargetKind::BlockBitmap(0).address_of(&layout).unwrap();
		assert_eq!(offset, 4 * 1024);
		assert_eq!(len, 1024);
	}

	#[test]
	fn group_descriptor_out_of_range() {
		let layout = test_layout();
		assert!(TargetKind::GroupDescriptor(1).address_of(&layout).is_err());
	}
}
