//! Byte editor core: a cursor-addressed view onto one on-disk structure,
//! with hex-nibble input and an explicit save step.
//!
//! The nibble input model is deliberately NOT the single-keypress,
//! overwrite-the-whole-byte scheme used by the reference editor this crate
//! was modeled after: each keypress only ever replaces one nibble of the
//! byte under the cursor. The first press at a cursor position replaces the
//! high nibble and latches that offset; a second press at the SAME
//! position replaces the low nibble, clears the latch, and advances the
//! cursor. Moving the cursor (or re-pressing at a different offset)
//! discards the latch and the next press starts over by replacing that
//! byte's high nibble; it does not revert a high nibble already written.
//! This is a deliberate behavior change, not a style choice: the reference
//! model is ambiguous about what a lone keypress does to the untouched
//! nibble, and the high-first, replace-as-you-go rule resolves that
//! ambiguity the same way every time.

use crate::addressing::TargetKind;
use crate::error::FsError;
use crate::error::FsResult;
use crate::handle::FsHandle;

/// Marks that the high nibble at a specific buffer offset has already been
/// written by a first keypress. A second nibble entered at the same offset
/// completes the byte; entering a nibble anywhere else discards the latch
/// and starts a new one.
#[derive(Debug, Clone, Copy)]
struct NibbleLatch {
	offset: usize,
}

/// The editor's state machine, matching `editor_context_t::editing_mode` in
/// the reference implementation: `input_hex_nibble` only has effect in
/// `Editing`, and the toggle key flips between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
	Viewing,
	Editing,
}

/// An open edit session over one target region of the device.
pub struct EditorSession<'a> {
	handle: &'a mut FsHandle,
	kind: TargetKind,
	base_offset: u64,
	buffer: Vec<u8>,
	cursor: usize,
	bytes_per_row: usize,
	dirty: bool,
	latch: Option<NibbleLatch>,
	mode: EditMode,
	field_highlight: bool,
}

/// Default row width for a session's cursor rectangle, matching the
/// reference editor's `bytes_per_row = 16`.
const DEFAULT_BYTES_PER_ROW: usize = 16;

impl<'a> EditorSession<'a> {
	/// Opens a session over `kind`, reading its current bytes into an
	/// in-memory buffer. No device write happens until `save`. Starts in
	/// `Viewing` mode with field highlighting off, matching
	/// `editor_init`/`editor_open_structure`.
	pub fn open(handle: &'a mut FsHandle, kind: TargetKind) -> FsResult<Self> {
		let (offset, len) = kind.address_of(handle.layout())?;
		let mut buffer = vec![0u8; len];
		handle.bdh().pread_exact(offset, &mut buffer)?;
		Ok(Self {
			handle,
			kind,
			base_offset: offset,
			buffer,
			cursor: 0,
			bytes_per_row: DEFAULT_BYTES_PER_ROW,
			dirty: false,
			latch: None,
			mode: EditMode::Viewing,
			field_highlight: false,
		})
	}

	/// The target this session was opened over.
	pub fn kind(&self) -> TargetKind {
		self.kind
	}

	/// A short human-readable label for the session, for shell prompts.
	pub fn title(&self) -> String {
		match self.kind {
			TargetKind::Superblock => "superblock".to_string(),
			TargetKind::GroupDescriptor(g) => format!("group descriptor {g}"),
			TargetKind::Inode(n) => format!("inode {n}"),
			TargetKind::Block(b) => format!("block {b}"),
			TargetKind::BlockBitmap(g) => format!("block bitmap (group {g})"),
			TargetKind::InodeBitmap(g) => format!("inode bitmap (group {g})"),
		}
	}

	/// The current in-memory buffer, including unsaved edits.
	pub fn buffer(&self) -> &[u8] {
		&self.buffer
	}

	/// The absolute device byte offset this session's buffer starts at.
	pub fn offset(&self) -> u64 {
		self.base_offset
	}

	/// The cursor position as a byte index into `buffer()`.
	pub fn cursor(&self) -> usize {
		self.cursor
	}

	/// Whether the buffer has unsaved edits.
	pub fn is_dirty(&self) -> bool {
		self.dirty
	}

	/// Whether the session is currently in `Editing` mode.
	pub fn mode(&self) -> EditMode {
		self.mode
	}

	/// Flips between `Viewing` and `Editing`, matching the `TAB` key in the
	/// reference editor. Does not disturb a pending nibble latch: the latch
	/// is keyed on the cursor offset, not the mode.
	pub fn toggle_edit(&mut self) {
		self.mode = match self.mode {
			EditMode::Viewing => EditMode::Editing,
			EditMode::Editing => EditMode::Viewing,
		};
	}

	/// Returns to `Viewing` and discards any pending nibble latch, matching
	/// the cancel key (`ESC`) in the reference editor.
	pub fn cancel(&mut self) {
		self.mode = EditMode::Viewing;
		self.latch = None;
	}

	/// Whether field highlighting is enabled for this session.
	pub fn field_highlight(&self) -> bool {
		self.field_highlight
	}

	/// Enables or disables field highlighting. Purely an observable flag: the
	/// renderer, not this core, decides what to do with `field_ranges()`.
	pub fn set_field_highlight(&mut self, enabled: bool) {
		self.field_highlight = enabled;
	}

	/// The row width new sessions use to interpret the linear cursor as
	/// `(row, col)`.
	pub fn bytes_per_row(&self) -> usize {
		self.bytes_per_row
	}

	/// The cursor as `(row, col)`, derived from the linear index and the
	/// session's row width.
	pub fn cursor_row_col(&self) -> (usize, usize) {
		(self.cursor / self.bytes_per_row, self.cursor % self.bytes_per_row)
	}

	/// Moves the cursor by `dx` bytes within the current row and `dy` rows,
	/// clamping to the buffer bounds on both ends rather than wrapping.
	/// Breaks any pending nibble latch, since the latch is tied to a
	/// specific offset.
	pub fn move_cursor(&mut self, dx: i64, dy: i64) {
		self.latch = None;
		let current = self.cursor as i64;
		let delta = dx + dy * self.bytes_per_row as i64;
		let target = (current + delta).clamp(0, self.buffer.len() as i64 - 1);
		self.cursor = target.max(0) as usize;
	}

	/// Directly sets the cursor to `index`, clamped to the buffer bounds.
	/// Breaks any pending nibble latch.
	pub fn seek_cursor(&mut self, index: usize) {
		self.latch = None;
		self.cursor = index.min(self.buffer.len().saturating_sub(1));
	}

	/// Enters one hex nibble (0-15) at the current cursor position. A no-op
	/// outside `Editing` mode, matching `editor_handle_key`'s
	/// `if (ctx->editing_mode)` guard around hex-digit keys.
	///
	/// The first nibble entered at a given cursor position immediately
	/// replaces the byte's high 4 bits, latching that offset. A second
	/// nibble entered at the SAME cursor position replaces the low 4 bits,
	/// the latch clears, and the cursor advances by one column, stopping at
	/// the end of the buffer. Entering a nibble at a different cursor
	/// position discards any stale latch and starts a fresh one (replacing
	/// that byte's high nibble) at the new position.
	pub fn input_hex_nibble(&mut self, nibble: u8) -> FsResult<()> {
		if nibble > 0xf {
			return Err(FsError::OutOfRange {
				what: "hex nibble",
				value: nibble as u64,
			});
		}
		if self.mode != EditMode::Editing {
			return Ok(());
		}
		match self.latch {
			Some(latch) if latch.offset == self.cursor => {
				self.buffer[self.cursor] = (self.buffer[self.cursor] & 0xf0) | nibble;
				self.dirty = true;
				self.latch = None;
				self.advance_after_nibble();
			}
			_ => {
				self.buffer[self.cursor] = (self.buffer[self.cursor] & 0x0f) | (nibble << 4);
				self.dirty = true;
				self.latch = Some(NibbleLatch { offset: self.cursor });
			}
		}
		Ok(())
	}

	fn advance_after_nibble(&mut self) {
		if self.cursor + 1 >= self.buffer.len() {
			return;
		}
		self.cursor += 1;
	}

	/// Directly overwrites the byte at `index`, bypassing the cursor and
	/// any pending nibble latch.
	pub fn set_byte(&mut self, index: usize, value: u8) -> FsResult<()> {
		let slot = self.buffer.get_mut(index).ok_or(FsError::OutOfRange {
			what: "buffer index",
			value: index as u64,
		})?;
		*slot = value;
		self.dirty = true;
		Ok(())
	}

	/// Writes the buffer back to the device. If the target overlaps the
	/// superblock or the group descriptor table, the handle's cached layout
	/// is reloaded afterward so later address lookups see the new geometry.
	pub fn save(&mut self) -> FsResult<()> {
		if !self.dirty {
			return Ok(());
		}
		self.handle.bdh_write(self.base_offset, &self.buffer)?;
		self.dirty = false;

		let touches_layout = matches!(self.kind, TargetKind::Superblock | TargetKind::GroupDescriptor(_));
		if touches_layout {
			self.handle.invalidate_and_reload()?;
		}
		Ok(())
	}

	/// Advances the session's absolute offset by `delta` blocks and rereads
	/// the buffer from the new position, for paging through raw blocks
	/// without reopening the session. Clamped to `[0, device length)`;
	/// `delta` is saturated rather than erroring at either end. Discards the
	/// nibble latch and clears the dirty flag, since the buffer contents are
	/// being replaced wholesale.
	pub fn scroll(&mut self, delta: i64) -> FsResult<()> {
		let block_size = self.handle.layout().block_size as u64;
		let device_len = self.handle.device_len()?;
		let max_offset = device_len.saturating_sub(self.buffer.len() as u64);

		let delta_bytes = delta.saturating_mul(block_size as i64);
		let new_offset = (self.base_offset as i64 + delta_bytes).clamp(0, max_offset as i64) as u64;

		self.handle.bdh().pread_exact(new_offset, &mut self.buffer)?;
		self.base_offset = new_offset;
		self.cursor = 0;
		self.latch = None;
		self.dirty = false;
		Ok(())
	}

	/// Returns named field ranges within the buffer, for highlighting in a
	/// shell view. Only `Superblock` and `Inode` targets have a known field
	/// layout; other targets return an empty list.
	pub fn field_ranges(&self) -> Vec<(&'static str, usize, usize)> {
		match self.kind {
			TargetKind::Superblock => vec![
				("inodes_count", 0x00, 0x04),
				("blocks_count", 0x04, 0x08),
				("r_blocks_count", 0x08, 0x0c),
				("free_blocks_count", 0x0c, 0x10),
				("free_inodes_count", 0x10, 0x14),
				("first_data_block", 0x14, 0x18),
				("log_block_size", 0x18, 0x1c),
				("blocks_per_group", 0x20, 0x24),
				("inodes_per_group", 0x28, 0x2c),
				("mnt_count", 0x34, 0x36),
				("max_mnt_count", 0x36, 0x38),
				("magic", 0x38, 0x3a),
				("state", 0x3a, 0x3c),
				("errors", 0x3c, 0x3e),
				("rev_level", 0x4c, 0x50),
			],
			TargetKind::Inode(_) => vec![
				("mode", 0x00, 0x02),
				("uid", 0x02, 0x04),
				("size", 0x04, 0x08),
				("atime", 0x08, 0x0c),
				("ctime", 0x0c, 0x10),
				("mtime", 0x10, 0x14),
				("dtime", 0x14, 0x18),
				("gid", 0x18, 0x1a),
				("links_count", 0x1a, 0x1c),
				("blocks", 0x1c, 0x20),
				("flags", 0x20, 0x24),
				("block[0..15]", 0x28, 0x28 + 15 * 4),
			],
			_ => Vec::new(),
		}
	}

	/// Consumes the session. Any unsaved edits are lost; callers that want
	/// them persisted must call `save` first.
	pub fn close(self) {}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::io::Write as _;
	use std::sync::atomic::AtomicU32;
	use std::sync::atomic::Ordering;

	static COUNTER: AtomicU32 = AtomicU32::new(0);

	fn minimal_image() -> std::path::PathBuf {
		let n = COUNTER.fetch_add(1, Ordering::Relaxed);
		let path = std::env::temp_dir().join(format!("fsedit-editor-test-{}-{n}", std::process::id()));
		let block_size = 1024u32;
		let blocks_count = 16u32;
		let inodes_count = 32u32;
		let mut image = vec![0u8; blocks_count as usize * block_size as usize];

		let sb = 1024usize;
		image[sb..sb + 4].copy_from_slice(&inodes_count.to_le_bytes());
		image[sb + 0x04..sb + 0x08].copy_from_slice(&blocks_count.to_le_bytes());
		image[sb + 0x20..sb + 0x24].copy_from_slice(&blocks_count.to_le_bytes());
		image[sb + 0x28..sb + 0x2c].copy_from_slice(&inodes_count.to_le_bytes());
		image[sb + 0x38..sb + 0x3a].copy_from_slice(&crate::layout::EXT2_MAGIC.to_le_bytes());
		image[sb + 0x4c..sb + 0x50].copy_from_slice(&1u32.to_le_bytes());
		image[sb + 0x58..sb + 0x5a].copy_from_slice(&128u16.to_le_bytes());

		let gdt = 2048usize;
		image[gdt..gdt + 4].copy_from_slice(&2u32.to_le_bytes());
		image[gdt + 0x04..gdt + 0x08].copy_from_slice(&3u32.to_le_bytes());
		image[gdt + 0x08..gdt + 0x0c].copy_from_slice(&4u32.to_le_bytes());

		let mut f = std::fs::File::create(&path).unwrap();
		f.write_all(&image).unwrap();
		path
	}

	#[test]
	fn first_press_writes_the_high_nibble_immediately() {
		let path = minimal_image();
		let mut handle = FsHandle::open(&path, true).unwrap();
		let mut session = handle.open_editor(TargetKind::Block(8)).unwrap();
		session.toggle_edit();
		session.input_hex_nibble(0xa).unwrap();
		assert_eq!(session.buffer()[0], 0xa0);
		session.input_hex_nibble(0xb).unwrap();
		assert_eq!(session.buffer()[0], 0xab);
		assert_eq!(session.cursor(), 1); // advanced after the completing nibble
		let _ = std::fs::remove_file(path);
	}

	#[test]
	fn moving_away_keeps_the_high_nibble_write_and_starts_a_fresh_latch() {
		let path = minimal_image();
		let mut handle = FsHandle::open(&path, true).unwrap();
		let mut session = handle.open_editor(TargetKind::Block(8)).unwrap();
		session.toggle_edit();
		session.input_hex_nibble(0xa).unwrap();
		session.move_cursor(1, 0);
		session.input_hex_nibble(0xb).unwrap();
		// The high-nibble write at the original position is not reverted; a
		// fresh latch starts at the new position instead of completing the
		// old one.
		assert_eq!(session.buffer()[0], 0xa0);
		assert_eq!(session.buffer()[1], 0xb0);
		let _ = std::fs::remove_file(path);
	}

	#[test]
	fn nibble_input_is_a_no_op_outside_editing_mode() {
		let path = minimal_image();
		let mut handle = FsHandle::open(&path, true).unwrap();
		let mut session = handle.open_editor(TargetKind::Block(8)).unwrap();
		assert_eq!(session.mode(), EditMode::Viewing);
		session.input_hex_nibble(0xa).unwrap();
		session.input_hex_nibble(0xb).unwrap();
		assert_eq!(session.buffer()[0], 0x00);
		assert!(!session.is_dirty());
		let _ = std::fs::remove_file(path);
	}

	#[test]
	fn cancel_returns_to_viewing_and_drops_latch() {
		let path = minimal_image();
		let mut handle = FsHandle::open(&path, true).unwrap();
		let mut session = handle.open_editor(TargetKind::Block(8)).unwrap();
		session.toggle_edit();
		session.input_hex_nibble(0xa).unwrap();
		session.cancel();
		assert_eq!(session.mode(), EditMode::Viewing);
		session.toggle_edit();
		session.input_hex_nibble(0xb).unwrap();
		// The cancelled latch must not combine with the earlier nibble; the
		// re-press at the same offset starts over by replacing the high
		// nibble again rather than completing the dropped latch.
		assert_eq!(session.buffer()[0], 0xb0);
		let _ = std::fs::remove_file(path);
	}

	#[test]
	fn cursor_row_col_tracks_bytes_per_row() {
		let path = minimal_image();
		let mut handle = FsHandle::open(&path, true).unwrap();
		let mut session = handle.open_editor(TargetKind::Block(8)).unwrap();
		assert_eq!(session.cursor_row_col(), (0, 0));
		session.seek_cursor(18);
		assert_eq!(session.cursor_row_col(), (1, 2));
		let _ = std::fs::remove_file(path);
	}

	#[test]
	fn scroll_advances_offset_by_whole_blocks_and_rereads() {
		let path = minimal_image();
		let mut handle = FsHandle::open(&path, true).unwrap();
		handle.write_block(9, &[0x77; 1024]).unwrap();
		let mut session = handle.open_editor(TargetKind::Block(8)).unwrap();
		session.scroll(1).unwrap();
		assert_eq!(session.offset(), 9 * 1024);
		assert_eq!(session.buffer()[0], 0x77);
		let _ = std::fs::remove_file(path);
	}

	#[test]
	fn scroll_clamps_to_device_length() {
		let path = minimal_image();
		let device_len = std::fs::metadata(&path).unwrap().len();
		let mut handle = FsHandle::open(&path, true).unwrap();
		let mut session = handle.open_editor(TargetKind::Block(8)).unwrap();
		session.scroll(1000).unwrap();
		// A 16-block, 1024-byte-block image: the furthest a 1024-byte buffer
		// can start is device_len - 1024.
		assert_eq!(session.offset(), device_len - 1024);
		let _ = std::fs::remove_file(path);
	}

	#[test]
	fn set_byte_bypasses_cursor_and_marks_dirty() {
		let path = minimal_image();
		let mut handle = FsHandle::open(&path, true).unwrap();
		let mut session = handle.open_editor(TargetKind::Block(8)).unwrap();
		session.set_byte(5, 0x42).unwrap();
		assert_eq!(session.buffer()[5], 0x42);
		assert!(session.is_dirty());
		let _ = std::fs::remove_file(path);
	}

	#[test]
	fn save_persists_to_device() {
		let path = minimal_image();
		{
			let mut handle = FsHandle::open(&path, true).unwrap();
			let mut session = handle.open_editor(TargetKind::Block(8)).unwrap();
			session.set_byte(0, 0x99).unwrap();
			session.save().unwrap();
		}
		let handle = FsHandle::open(&path, false).unwrap();
		let mut buf = vec![0u8; 1024];
		handle.read_block(8, &mut buf).unwrap();
		assert_eq!(buf[0], 0x99);
		let _ = std::fs::remove_file(path);
	}

	#[test]
	fn cursor_clamps_at_buffer_bounds() {
		let path = minimal_image();
		let mut handle = FsHandle::open(&path, true).unwrap();
		let mut session = handle.open_editor(TargetKind::Block(8)).unwrap();
		session.move_cursor(-100, 0);
		assert_eq!(session.cursor(), 0);
		session.move_cursor(100_000, 0);
		assert_eq!(session.cursor(), session.buffer().len() - 1);
		let _ = std::fs::remove_file(path);
	}
}
