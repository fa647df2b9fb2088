//! `fsedit` opens an ext2/ext3/ext4 image or block device and drives an
//! interactive shell for inspecting and editing its on-disk structures.

use std::env;
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;

use fsedit::format::format_group_descriptor;
use fsedit::format::format_inode;
use fsedit::format::format_size;
use fsedit::format::format_superblock;
use fsedit::EditorSession;
use fsedit::FsHandle;
use fsedit::TargetKind;
use utils::prompt::prompt;
use utils::util::ByteSize;

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
	/// The name of the current program used in command line.
	prog: String,

	/// The path to the device or image file to open.
	device_path: Option<PathBuf>,

	/// If true, never attempt a writable open.
	read_only: bool,

	/// If true, print command line help and exit.
	help: bool,
}

fn parse_args() -> Args {
	let mut args: Args = Default::default();
	let mut iter = env::args();

	args.prog = iter.next().unwrap_or("fsedit".to_owned());

	for arg in iter {
		match arg.as_str() {
			"-h" | "--help" => args.help = true,
			"-r" | "--read-only" => args.read_only = true,
			_ => args.device_path = Some(PathBuf::from(arg)),
		}
	}

	args
}

fn print_usage(prog: &str) {
	println!("usage: {prog} [-r|--read-only] <device>");
	println!();
	println!("Opens an ext2/ext3/ext4 device or image and starts an interactive shell.");
	println!("  -r, --read-only   never attempt a writable open");
	println!("  -h, --help        print this message");
}

fn error(prog: &str, msg: impl std::fmt::Display) -> ! {
	eprintln!("{prog}: {msg}");
	exit(1);
}

fn print_summary(handle: &FsHandle, prog: &str) {
	match handle.summary() {
		Ok(summary) => {
			println!("Filesystem type: {}", summary.variant);
			println!("Block size: {}", summary.block_size);
			println!(
				"Blocks: {} total, {} free ({:.1}% used)",
				summary.block_count, summary.free_blocks, summary.used_percent
			);
			println!("Inodes: {} total, {} free", summary.inode_count, summary.free_inodes);
			println!("Groups: {}", summary.group_count);
			println!(
				"Size: {} total, {} free",
				format_size(summary.total_bytes),
				format_size(summary.free_bytes)
			);
			if !summary.features.is_empty() {
				println!("Features: {}", summary.features.join(", "));
			}
		}
		Err(e) => eprintln!("{prog}: {e}"),
	}
}

fn print_help_commands() {
	println!("commands:");
	println!("  summary              volume-wide counters");
	println!("  sb                   print the superblock");
	println!("  gd <n>               print group descriptor n");
	println!("  inode <n>            open inode n in the byte editor");
	println!("  block <n>            open block n in the byte editor");
	println!("  bbitmap <n>          open group n's block bitmap in the byte editor");
	println!("  ibitmap <n>          open group n's inode bitmap in the byte editor");
	println!("  goto <row> <col>     move the editor cursor (while a target is open)");
	println!("  edit                 toggle between view mode and edit mode");
	println!("  cancel               return to view mode, discarding a pending nibble");
	println!("  scroll <n>           advance the open block/target by n blocks and reread");
	println!("  set <i> <hex>        overwrite byte i with the given hex value (no cursor)");
	println!("  <hex byte>           in edit mode, enter two hex nibbles to overwrite the cursor's byte");
	println!("  save                 write editor changes back to the device");
	println!("  close                close the current editor without saving");
	println!("  quit                 exit fsedit");
}

/// Runs the interactive shell. Returns once the user quits or stdin closes.
fn run_shell(handle: &mut FsHandle, prog: &str) {
	let stdin = io::stdin();
	let mut session: Option<EditorSession> = None;

	loop {
		if let Some(s) = &session {
			let mode = match s.mode() {
				fsedit::EditMode::Viewing => "view",
				fsedit::EditMode::Editing => "edit",
			};
			print!(
				"fsedit ({} {mode}){}> ",
				s.title(),
				if s.is_dirty() { "*" } else { "" }
			);
		} else {
			print!("fsedit> ");
		}
		let _ = io::stdout().flush();

		let mut line = String::new();
		if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
			println!();
			break;
		}
		let mut words = line.split_whitespace();
		let cmd = match words.next() {
			Some(c) => c,
			None => continue,
		};

		match cmd {
			"help" | "?" => print_help_commands(),

			"summary" if session.is_none() => print_summary(handle, prog),

			"sb" if session.is_none() => match handle.layout().superblock.clone() {
				sb => println!("{}", format_superblock(&sb)),
			},

			"gd" if session.is_none() => {
				let Some(n) = words.next().and_then(|w| w.parse::<u32>().ok()) else {
					eprintln!("usage: gd <n>");
					continue;
				};
				match handle.group_descriptor(n) {
					Ok(gd) => println!("{}", format_group_descriptor(gd)),
					Err(e) => eprintln!("{prog}: {e}"),
				}
			}

			"inode" if session.is_none() => {
				let Some(n) = words.next().and_then(|w| w.parse::<u32>().ok()) else {
					eprintln!("usage: inode <n>");
					continue;
				};
				match handle.read_inode(n) {
					Ok(inode) => println!("{}", format_inode(&inode)),
					Err(e) => {
						eprintln!("{prog}: {e}");
						continue;
					}
				}
				match handle.open_editor(TargetKind::Inode(n)) {
					Ok(s) => session = Some(s),
					Err(e) => eprintln!("{prog}: {e}"),
				}
			}

			"block" if session.is_none() => {
				let Some(n) = words.next().and_then(|w| w.parse::<u64>().ok()) else {
					eprintln!("usage: block <n>");
					continue;
				};
				println!("class: {:?}", handle.classify_block(n));
				match handle.open_editor(TargetKind::Block(n)) {
					Ok(s) => session = Some(s),
					Err(e) => eprintln!("{prog}: {e}"),
				}
			}

			"bbitmap" if session.is_none() => {
				let Some(g) = words.next().and_then(|w| w.parse::<u32>().ok()) else {
					eprintln!("usage: bbitmap <n>");
					continue;
				};
				match handle.open_editor(TargetKind::BlockBitmap(g)) {
					Ok(s) => session = Some(s),
					Err(e) => eprintln!("{prog}: {e}"),
				}
			}

			"ibitmap" if session.is_none() => {
				let Some(g) = words.next().and_then(|w| w.parse::<u32>().ok()) else {
					eprintln!("usage: ibitmap <n>");
					continue;
				};
				match handle.open_editor(TargetKind::InodeBitmap(g)) {
					Ok(s) => session = Some(s),
					Err(e) => eprintln!("{prog}: {e}"),
				}
			}

			"goto" => {
				let Some(s) = &mut session else {
					eprintln!("{prog}: no target is open");
					continue;
				};
				let (Some(row), Some(col)) = (
					words.next().and_then(|w| w.parse::<i64>().ok()),
					words.next().and_then(|w| w.parse::<i64>().ok()),
				) else {
					eprintln!("usage: goto <row> <col>");
					continue;
				};
				s.seek_cursor((row as usize) * s.bytes_per_row() + col as usize);
			}

			"edit" => {
				let Some(s) = &mut session else {
					eprintln!("{prog}: no target is open");
					continue;
				};
				s.toggle_edit();
			}

			"cancel" => {
				let Some(s) = &mut session else {
					eprintln!("{prog}: no target is open");
					continue;
				};
				s.cancel();
			}

			"scroll" => {
				let Some(s) = &mut session else {
					eprintln!("{prog}: no target is open");
					continue;
				};
				let Some(delta) = words.next().and_then(|w| w.parse::<i64>().ok()) else {
					eprintln!("usage: scroll <blocks>");
					continue;
				};
				if let Err(e) = s.scroll(delta) {
					eprintln!("{prog}: {e}");
				}
			}

			"set" => {
				let Some(s) = &mut session else {
					eprintln!("{prog}: no target is open");
					continue;
				};
				let (Some(index), Some(value)) = (
					words.next().and_then(|w| w.parse::<usize>().ok()),
					words.next().and_then(|w| u8::from_str_radix(w, 16).ok()),
				) else {
					eprintln!("usage: set <index> <hex byte>");
					continue;
				};
				if let Err(e) = s.set_byte(index, value) {
					eprintln!("{prog}: {e}");
				}
			}

			"save" => {
				let Some(s) = &mut session else {
					eprintln!("{prog}: no target is open");
					continue;
				};
				if let Err(e) = s.save() {
					eprintln!("{prog}: {e}");
				}
			}

			"close" => {
				if let Some(s) = session.take() {
					if s.is_dirty() {
						let confirm = prompt(Some("discard unsaved changes? (y/N) "), false)
							.map(|a| a.eq_ignore_ascii_case("y"))
							.unwrap_or(false);
						if !confirm {
							session = Some(s);
							continue;
						}
					}
					s.close();
				} else {
					eprintln!("{prog}: no target is open");
				}
			}

			"quit" | "exit" => {
				if let Some(s) = &session {
					if s.is_dirty() {
						eprintln!("{prog}: unsaved changes, `save` or `close` first");
						continue;
					}
				}
				break;
			}

			other if session.is_some() && other.len() <= 2 && other.chars().all(|c| c.is_ascii_hexdigit()) => {
				let s = session.as_mut().unwrap();
				if s.mode() != fsedit::EditMode::Editing {
					eprintln!("{prog}: not in edit mode, try `edit` first");
					continue;
				}
				for c in other.chars() {
					let nibble = c.to_digit(16).unwrap() as u8;
					if let Err(e) = s.input_hex_nibble(nibble) {
						eprintln!("{prog}: {e}");
					}
				}
			}

			_ if session.is_some() => {
				eprintln!("{prog}: unknown command `{cmd}` (a target is open; `close` it first for volume-level commands)");
			}

			_ => eprintln!("{prog}: unknown command `{cmd}`, try `help`"),
		}
	}
}

fn main() {
	let args = parse_args();

	if args.help {
		print_usage(&args.prog);
		return;
	}

	let device_path = args.device_path.unwrap_or_else(|| {
		print_usage(&args.prog);
		exit(1);
	});

	let mut handle = FsHandle::open(&device_path, !args.read_only).unwrap_or_else(|e| error(&args.prog, e));

	let device_len = handle.device_len().unwrap_or(0);
	println!(
		"{}: {} ({})",
		device_path.display(),
		ByteSize(device_len),
		if handle.is_writable() { "read-write" } else { "read-only" }
	);
	print_summary(&handle, &args.prog);

	run_shell(&mut handle, &args.prog);
}
