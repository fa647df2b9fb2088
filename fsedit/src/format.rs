//! Human-readable text rendering of superblock, group descriptor, inode,
//! and size values.
//!
//! Grounded in `original_source/src/utils.c`'s `format_value`,
//! `superblock_to_string`, `group_desc_to_string` and `inode_to_string`: the
//! same field order and wording, translated to owned `String`s instead of
//! `snprintf` into a caller buffer.

use crate::inode::Inode;
use crate::layout::GroupDescriptor;
use crate::layout::Superblock;

/// Formats a byte count with the largest unit in `{B, KB, MB, GB, TB}` such
/// that the mantissa stays below 1024, using binary (1024-based) division.
/// `"%u B"` for the zeroth unit, `"%.2f %s"` otherwise.
pub fn format_size(v: u64) -> String {
	const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
	let mut size = v as f64;
	let mut unit = 0;
	while size >= 1024.0 && unit < UNITS.len() - 1 {
		size /= 1024.0;
		unit += 1;
	}
	if unit == 0 {
		format!("{v} B")
	} else {
		format!("{size:.2} {}", UNITS[unit])
	}
}

/// Renders the superblock as a multi-line field listing.
pub fn format_superblock(sb: &Superblock) -> String {
	let block_size = sb.block_size().unwrap_or(0);
	format!(
		"Superblock:\n\
		 \x20 Inodes count: {}\n\
		 \x20 Blocks count: {}\n\
		 \x20 Reserved blocks count: {}\n\
		 \x20 Free blocks count: {}\n\
		 \x20 Free inodes count: {}\n\
		 \x20 First data block: {}\n\
		 \x20 Block size: {}\n\
		 \x20 Blocks per group: {}\n\
		 \x20 Inodes per group: {}\n\
		 \x20 Mount count: {}\n\
		 \x20 Maximum mount count: {}\n\
		 \x20 Magic signature: {:#x}\n\
		 \x20 Filesystem state: {}\n\
		 \x20 Error behavior: {}\n\
		 \x20 Minor revision level: {}\n\
		 \x20 Last check time: {}\n\
		 \x20 Check interval: {}\n\
		 \x20 Creator OS: {}\n\
		 \x20 Revision level: {}\n\
		 \x20 Reserved blocks UID: {}\n\
		 \x20 Reserved blocks GID: {}\n",
		sb.inodes_count,
		sb.blocks_count,
		sb.r_blocks_count,
		sb.free_blocks_count,
		sb.free_inodes_count,
		sb.first_data_block,
		block_size,
		sb.blocks_per_group,
		sb.inodes_per_group,
		sb.mnt_count,
		sb.max_mnt_count,
		sb.magic,
		sb.state,
		sb.errors,
		sb.minor_rev_level,
		sb.lastcheck,
		sb.checkinterval,
		sb.creator_os,
		sb.rev_level,
		sb.def_resuid,
		sb.def_resgid,
	)
}

/// Renders one group descriptor as a multi-line field listing.
pub fn format_group_descriptor(gd: &GroupDescriptor) -> String {
	format!(
		"Group Descriptor:\n\
		 \x20 Block bitmap: {}\n\
		 \x20 Inode bitmap: {}\n\
		 \x20 Inode table: {}\n\
		 \x20 Free blocks count: {}\n\
		 \x20 Free inodes count: {}\n\
		 \x20 Used directories count: {}\n",
		gd.block_bitmap, gd.inode_bitmap, gd.inode_table, gd.free_blocks_count,
		gd.free_inodes_count, gd.used_dirs_count,
	)
}

const S_IFMT: u16 = 0xf000;
const S_IFREG: u16 = 0x8000;
const S_IFDIR: u16 = 0x4000;
const S_IFLNK: u16 = 0xa000;
const S_IFCHR: u16 = 0x2000;
const S_IFBLK: u16 = 0x6000;
const S_IFIFO: u16 = 0x1000;
const S_IFSOCK: u16 = 0xc000;

const S_IRUSR: u16 = 0o400;
const S_IWUSR: u16 = 0o200;
const S_IXUSR: u16 = 0o100;
const S_IRGRP: u16 = 0o040;
const S_IWGRP: u16 = 0o020;
const S_IXGRP: u16 = 0o010;
const S_IROTH: u16 = 0o004;
const S_IWOTH: u16 = 0o002;
const S_IXOTH: u16 = 0o001;
const S_ISUID: u16 = 0o4000;
const S_ISGID: u16 = 0o2000;
const S_ISVTX: u16 = 0o1000;

/// Renders `mode` as the classic 10-character Unix permission string
/// (type char + `rwxrwxrwx`, with setuid/setgid/sticky folded into the
/// execute positions as `s`/`S`/`t`/`T`).
pub fn mode_to_permission_string(mode: u16) -> String {
	let mut s = [b'-'; 10];

	s[0] = match mode & S_IFMT {
		S_IFDIR => b'd',
		S_IFLNK => b'l',
		S_IFCHR => b'c',
		S_IFBLK => b'b',
		S_IFIFO => b'p',
		S_IFSOCK => b's',
		S_IFREG => b'-',
		_ => b'-',
	};

	if mode & S_IRUSR != 0 {
		s[1] = b'r';
	}
	if mode & S_IWUSR != 0 {
		s[2] = b'w';
	}
	if mode & S_IXUSR != 0 {
		s[3] = b'x';
	}
	if mode & S_IRGRP != 0 {
		s[4] = b'r';
	}
	if mode & S_IWGRP != 0 {
		s[5] = b'w';
	}
	if mode & S_IXGRP != 0 {
		s[6] = b'x';
	}
	if mode & S_IROTH != 0 {
		s[7] = b'r';
	}
	if mode & S_IWOTH != 0 {
		s[8] = b'w';
	}
	if mode & S_IXOTH != 0 {
		s[9] = b'x';
	}

	if mode & S_ISUID != 0 {
		s[3] = if s[3] == b'x' { b's' } else { b'S' };
	}
	if mode & S_ISGID != 0 {
		s[6] = if s[6] == b'x' { b's' } else { b'S' };
	}
	if mode & S_ISVTX != 0 {
		s[9] = if s[9] == b'x' { b't' } else { b'T' };
	}

	String::from_utf8(s.to_vec()).unwrap()
}

/// Renders an inode as a multi-line field listing.
pub fn format_inode(inode: &Inode) -> String {
	let mode_str = mode_to_permission_string(inode.mode);
	let mut out = format!(
		"Inode:\n\
		 \x20 Mode: {mode_str} ({:#o})\n\
		 \x20 Owner: {}\n\
		 \x20 Size: {}\n\
		 \x20 Access time: {}\n\
		 \x20 Creation time: {}\n\
		 \x20 Modification time: {}\n\
		 \x20 Deletion time: {}\n\
		 \x20 Links count: {}\n\
		 \x20 Blocks count: {}\n\
		 \x20 Flags: {:#x}\n\
		 \x20 Direct blocks:\n",
		inode.mode & 0xfff,
		inode.uid,
		inode.size,
		inode.atime,
		inode.ctime,
		inode.mtime,
		inode.dtime,
		inode.links_count,
		inode.blocks,
		inode.flags,
	);
	for (i, b) in inode.block[0..12].iter().enumerate() {
		out.push_str(&format!("    [{i}]: {b}\n"));
	}
	out.push_str(&format!(
		"\x20 Singly-indirect block: {}\n\
		 \x20 Doubly-indirect block: {}\n\
		 \x20 Triply-indirect block: {}\n",
		inode.block[12], inode.block[13], inode.block[14],
	));
	out
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn format_size_boundaries() {
		assert_eq!(format_size(1023), "1023 B");
		assert_eq!(format_size(1024), "1.00 KB");
		assert_eq!(format_size(1_048_576), "1.00 MB");
	}

	#[test]
	fn permission_string_regular_file() {
		assert_eq!(mode_to_permission_string(0o100644), "-rw-r--r--");
	}

	#[test]
	fn permission_string_setuid_executable() {
		assert_eq!(mode_to_permission_string(0o104755), "-rwsr-xr-x");
	}

	#[test]
	fn permission_string_sticky_dir_no_exec() {
		// sticky bit with no "other" execute renders as capital T.
		assert_eq!(mode_to_permission_string(0o041644), "drw-r--r-T");
	}

	#[test]
	fn permission_string_directory() {
		assert_eq!(mode_to_permission_string(0o040755), "drwxr-xr-x");
	}
}
