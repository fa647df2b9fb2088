//! Given a block number, identifies which structural region it belongs to.
//!
//! The classifier scans the group descriptor table once per query; it must
//! never lie about the first five categories and may default to `Data` for
//! anything it does not recognize.

use crate::layout::Layout;

/// The region a block number falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockClass {
	Reserved,
	Superblock,
	GroupDescriptorTable,
	BlockBitmap(u32),
	InodeBitmap(u32),
	InodeTable(u32),
	Data,
}

/// Classifies block `b` against the cached layout.
pub fn classify(layout: &Layout, b: u64) -> BlockClass {
	if b == 0 {
		return BlockClass::Reserved;
	}

	let sb_block = crate::layout::SUPERBLOCK_OFFSET / layout.block_size as u64;
	if b == sb_block {
		return BlockClass::Superblock;
	}

	let gdt_first = layout.gdt_start_byte / layout.block_size as u64;
	let gdt_len_bytes = layout.gd_size as u64 * layout.group_count as u64;
	let gdt_blocks = crate::layout::ceil_div(gdt_len_bytes, layout.block_size as u64);
	if b >= gdt_first && b < gdt_first + gdt_blocks {
		return BlockClass::GroupDescriptorTable;
	}

	let inode_table_blocks = crate::layout::ceil_div(
		layout.inodes_per_group as u64 * layout.inode_size as u64,
		layout.block_size as u64,
	);

	for (g, gd) in layout.group_descriptors.iter().enumerate() {
		let g = g as u32;
		if b == gd.block_bitmap {
			return BlockClass::BlockBitmap(g);
		}
		if b == gd.inode_bitmap {
			return BlockClass::InodeBitmap(g);
		}
		if b >= gd.inode_table && b < gd.inode_table + inode_table_blocks {
			return BlockClass::InodeTable(g);
		}
	}

	BlockClass::Data
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
	fn classifies_known_regions() {
		let layout = test_layout();
		assert_eq!(classify(&layout, 0), BlockClass::Reserved);
		assert_eq!(classify(&layout, 1), BlockClass::Superblock);
		assert_eq!(classify(&layout, 2), BlockClass::GroupDescriptorTable);
		assert_eq!(classify(&layout, 4), BlockClass::BlockBitmap(0));
		assert_eq!(classify(&layout, 5), BlockClass::InodeBitmap(0));
		assert_eq!(classify(&layout, 6), BlockClass::InodeTable(0));
		assert_eq!(classify(&layout, 1000), BlockClass::Data);
	}
}
