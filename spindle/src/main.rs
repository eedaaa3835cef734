/*!
# Spindle
*/

#![forbid(unsafe_code)]

#![deny(
	clippy::allow_attributes_without_reason,
	clippy::correctness,
	unreachable_pub,
)]

#![warn(
	clippy::complexity,
	clippy::nursery,
	clippy::pedantic,
	clippy::perf,
	clippy::style,

	clippy::allow_attributes,
	clippy::clone_on_ref_ptr,
	clippy::create_dir,
	clippy::filetype_is_file,
	clippy::format_push_string,
	clippy::get_unwrap,
	clippy::impl_trait_in_params,
	clippy::lossy_float_literal,
	clippy::missing_assert_message,
	clippy::missing_docs_in_private_items,
	clippy::needless_raw_strings,
	clippy::panic_in_result_fn,
	clippy::pub_without_shorthand,
	clippy::rest_pat_in_fully_bound_structs,
	clippy::semicolon_inside_block,
	clippy::str_to_string,
	clippy::string_to_string,
	clippy::todo,
	clippy::undocumented_unsafe_blocks,
	clippy::unneeded_field_pattern,
	clippy::unseparated_literal_suffix,
	clippy::unwrap_in_result,

	macro_use_extern_crate,
	missing_copy_implementations,
	missing_docs,
	non_ascii_idents,
	trivial_casts,
	trivial_numeric_casts,
	unused_crate_dependencies,
	unused_extern_crates,
	unused_import_braces,
)]



use argyle::{
	Argue,
	ArgyleError,
	FLAG_HELP,
	FLAG_VERSION,
};
use dactyl::NiceU32;
use fyi_msg::{
	Msg,
	Progless,
};
use oxford_join::OxfordJoin;
use spindle_core::{
	BlankKind,
	BurnConfig,
	Burner,
	CdDrive,
	Disc,
	DiscImage,
	KillSwitch,
	Mmc,
	ReadOffset,
	RipMode,
	ScanConfig,
	ScanKind,
	SecureRipConfig,
	SpindleError,
};
use std::{
	ffi::OsString,
	io::BufRead,
	path::{
		Path,
		PathBuf,
	},
	sync::{
		Arc,
		atomic::{
			AtomicBool,
			Ordering::{
				Relaxed,
				SeqCst,
			},
		},
	},
	time::Instant,
};
use trimothy::TrimMut;
use utc2k::FmtUtc2k;



/// # A Divider Line.
const DIVIDER: &str = "----------------------------------------";



/// # Main.
///
/// This lets us bubble up startup errors so they can be pretty-printed,
/// and keeps the exit codes honest: zero for a clean run, one for a
/// fatal drive failure.
fn main() {
	match _main() {
		Ok(()) => {},
		Err(SpindleError::PrintHelp | SpindleError::PrintVersion) => {},
		Err(e) => {
			Msg::from(e).eprint();
			std::process::exit(1);
		},
	}
}

#[inline]
/// # Actual Main.
fn _main() -> Result<(), SpindleError> {
	// Load CLI arguments, if any.
	let args = match Argue::new(FLAG_HELP | FLAG_VERSION) {
		Ok(args) => args,
		Err(ArgyleError::WantsVersion) => {
			println!(concat!("Spindle v", env!("CARGO_PKG_VERSION")));
			return Ok(());
		},
		Err(ArgyleError::WantsHelp) => {
			println!("{}", SpindleError::PrintHelp);
			return Ok(());
		},
		Err(_) => return Err(SpindleError::CliParse("arguments")),
	};

	// Check for unknown args.
	if let Some(boo) = args.check_keys(
		&[b"--no-update"],
		&[b"-d", b"--dev"],
	) {
		Msg::warning(format!(
			"Ignoring unknown option: {}",
			String::from_utf8_lossy(boo),
		)).eprint();
	}

	// Set up progress and killswitch.
	let progress = Progless::default();
	let killed = KillSwitch::default();
	sigint(killed.inner(), Some(progress.clone()));

	// A quick release check, unless asked not to.
	if ! args.switch(b"--no-update") {
		if let Some((tag, url)) = spindle_core::check_for_update() {
			Msg::warning(format!("Spindle {tag} is available: {url}")).eprint();
		}
	}

	// Everything lands beside the executable.
	let workdir = work_dir();
	let dev = args.option2_os(b"-d", b"--dev").map(OsString::from);

	eprintln!(
		"\x1b[2;36m{DIVIDER}\n\x1b[0;1;36mSpindle v{} — {}\n\x1b[0;2;36m{DIVIDER}\x1b[0m",
		env!("CARGO_PKG_VERSION"),
		FmtUtc2k::now(),
	);

	// Connect to the drive and try to make sense of the disc.
	let mut disc = open_disc(dev.as_ref());
	if let Some(d) = disc.as_ref() { eprintln!("{}", d.info()); }

	// The menu loop.
	loop {
		if killed.killed() { return Ok(()); }
		print_menu(disc.is_some());

		let choice = read_menu_choice(1, 24, 24);
		let has_toc = disc.is_some();
		let needs_toc = ! matches!(choice, 2 | 21 | 22 | 23 | 24);
		if needs_toc && ! has_toc {
			Msg::error("This operation requires a disc with a valid TOC.").eprint();
			continue;
		}

		let res: Result<(), SpindleError> = match choice {
			1 => run_rip(disc.as_mut().expect("TOC checked."), &workdir, &progress, &killed),
			2 => {
				// Burning wants the drive handle to itself.
				disc = None;
				let res = run_burn(dev.as_ref(), &workdir, &progress, &killed);
				disc = open_disc(dev.as_ref());
				res
			},
			3 => run_scan(disc.as_mut().expect("TOC checked."), ScanKind::C2, &workdir, &progress, &killed),
			4 => run_scan(disc.as_mut().expect("TOC checked."), ScanKind::Bler, &workdir, &progress, &killed),
			5 => run_scan(disc.as_mut().expect("TOC checked."), ScanKind::DiscRot, &workdir, &progress, &killed),
			6 => run_scan(disc.as_mut().expect("TOC checked."), ScanKind::Surface, &workdir, &progress, &killed),
			7 => {
				eprint!("Number of passes (2–10, default 3): ");
				let passes = read_menu_choice(2, 10, 3);
				run_scan(disc.as_mut().expect("TOC checked."), ScanKind::MultiPass(passes), &workdir, &progress, &killed)
			},
			8 => {
				eprintln!("{}", disc.as_ref().expect("TOC checked.").info());
				Ok(())
			},
			9 => run_fingerprint(disc.as_ref().expect("TOC checked.")),
			10 => run_lead_area(disc.as_mut().expect("TOC checked."), &progress, &killed),
			11 => run_scan(disc.as_mut().expect("TOC checked."), ScanKind::SubIntegrity, &workdir, &progress, &killed),
			12 => run_audio_analysis(disc.as_ref().expect("TOC checked.")),
			13 => run_verify(disc.as_ref().expect("TOC checked.")),
			14 => run_capabilities(disc.as_mut().expect("TOC checked.")),
			15 => run_offset_detect(disc.as_ref().expect("TOC checked.")),
			16 => {
				// Sample roughly fifty sectors across the disc.
				let d = disc.as_mut().expect("TOC checked.");
				let step = (d.info().rip_sectors() / 50).max(1);
				let cfg = ScanConfig::default().with_step(step);
				run_scan_cfg(d, ScanKind::C2, &cfg, &workdir, &progress, &killed)
			},
			17 => run_scan(disc.as_mut().expect("TOC checked."), ScanKind::SpeedCompare, &workdir, &progress, &killed),
			18 => run_scan(disc.as_mut().expect("TOC checked."), ScanKind::Seek, &workdir, &progress, &killed),
			19 => run_scan(disc.as_mut().expect("TOC checked."), ScanKind::QCheck, &workdir, &progress, &killed),
			20 => run_scan(disc.as_mut().expect("TOC checked."), ScanKind::Balance, &workdir, &progress, &killed),
			21 => {
				match spindle_core::check_for_update() {
					Some((tag, url)) => Msg::warning(format!("Spindle {tag} is available: {url}")).eprint(),
					None => Msg::success("This is the latest release.").eprint(),
				}
				Ok(())
			},
			22 => {
				disc = open_disc(dev.as_ref());
				if let Some(d) = disc.as_ref() { eprintln!("{}", d.info()); }
				Ok(())
			},
			23 => {
				print_help_menu();
				Ok(())
			},
			_ => return Ok(()),
		};

		// Failures inside an operation are reported, not fatal — except
		// a vanished drive, which nothing can fix.
		if let Err(e) = res {
			if matches!(e, SpindleError::DeviceGone) { return Err(e); }
			Msg::from(e).eprint();
		}
	}
}



/// # Copy Disc.
///
/// The main event: configure, rip, verify, export.
fn run_rip(
	disc: &mut Disc<CdDrive>,
	workdir: &Path,
	progress: &Progless,
	killed: &KillSwitch,
) -> Result<(), SpindleError> {
	// Mode.
	eprintln!("\nSecure rip mode:");
	eprintln!("  1. Fast      (1–2 passes)");
	eprintln!("  2. Standard  (2+ agreeing passes)");
	eprintln!("  3. Paranoid  (3+ agreeing passes)");
	eprintln!("  4. Burst     (single pass, no C2)");
	let mode = match read_menu_choice(1, 4, 2) {
		1 => RipMode::Fast,
		3 => RipMode::Paranoid,
		4 => RipMode::Burst,
		_ => RipMode::Standard,
	};
	let mut cfg = SecureRipConfig::from(mode);

	// Subchannel?
	if Msg::plain("Capture raw subchannel (.sub) alongside the bin?")
		.eprompt_with_default(false) {
		cfg = cfg.with_subchannel(true);
	}

	// Offset: database first, manual second.
	let detected = disc.drive_vendor_model().and_then(|vm| vm.detect_offset());
	let offset = match detected {
		Some(o) => {
			Msg::info(format!("Using the drive's known read offset: {:+} samples.", o.samples())).eprint();
			o
		},
		None => {
			eprintln!("Read offset in samples (e.g. 6, -12; blank for 0):");
			let raw = read_line();
			ReadOffset::try_from(raw.as_str()).unwrap_or_else(|_| {
				Msg::warning("That didn't parse; using 0.").eprint();
				ReadOffset::default()
			})
		},
	};

	// Cache defeat is pointless on Accurate Stream hardware.
	let (accurate, _) = disc.drive_capabilities();
	if accurate {
		cfg = cfg.with_cache_defeat(false);
		Msg::info("Cache defeat auto-disabled (Accurate Stream drive).").eprint();
	}

	// Output stem.
	let stem = workdir.join(disc.info().cddb_id().to_string());
	Msg::info(format!("Output: {}.bin/.cue/.log…", stem.to_string_lossy())).eprint();
	if ! Msg::plain("Rip it?").eprompt_with_default(true) {
		return Ok(());
	}

	// Rip!
	let now = Instant::now();
	let result = disc.rip_secure(&cfg, offset, progress, killed)?;

	// Verify, best-effort.
	let verdict = match disc.verify_accuraterip() {
		Ok(v) => {
			match v.as_ref() {
				Some(v) if v.accurate =>
					Msg::success("AccurateRip: every track matched a known pressing.").eprint(),
				Some(_) =>
					Msg::warning("AccurateRip: one or more tracks did not match.").eprint(),
				None =>
					Msg::info("AccurateRip has never seen this disc; local checksums only.").eprint(),
			}
			v
		},
		Err(_) => {
			Msg::warning("AccurateRip lookup failed; proceeding with local checksums.").eprint();
			None
		},
	};

	// Export everything.
	let saved = disc.export_rip(
		&cfg,
		offset,
		&result,
		verdict.as_ref(),
		now.elapsed(),
		&stem,
	)?;

	// Summarize.
	let (verified, best, unresolved) = result.tracks.iter().fold(
		(0_u32, 0_u32, 0_u32),
		|acc, t| (acc.0 + t.verified, acc.1 + t.best_effort, acc.2 + t.unresolved),
	);
	Msg::custom("Ripped", 199, &format!(
		"{} verified, {} best-effort, {} unresolved {}.",
		NiceU32::from(verified),
		NiceU32::from(best),
		NiceU32::from(unresolved),
		if unresolved == 1 { "sector" } else { "sectors" },
	)).with_newline(true).eprint();
	if result.cancelled {
		Msg::warning("The rip was interrupted; the output covers what was read.").eprint();
	}

	let names: Vec<String> = saved.iter()
		.filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
		.collect();
	eprintln!("\nThe fruits of your labor: \x1b[2m{}\x1b[0m\n", names.oxford_and());

	Ok(())
}

/// # Write Disc.
///
/// Burn a prepared bin/cue(/sub) set in raw DAO-96 mode.
fn run_burn(
	dev: Option<&OsString>,
	workdir: &Path,
	progress: &Progless,
	killed: &KillSwitch,
) -> Result<(), SpindleError> {
	// Find the image.
	eprintln!("\nFolder containing the .bin/.cue(/.sub) set (blank for the working directory):");
	let raw = read_line();
	let dir = if raw.is_empty() { workdir.to_path_buf() } else { PathBuf::from(raw) };
	let image = DiscImage::load(&dir)?;

	Msg::success("Detected files:").eprint();
	eprintln!("  BIN: {}", image.bin.to_string_lossy());
	eprintln!("  CUE: {}", image.cue.to_string_lossy());
	match image.sub.as_ref() {
		Some(s) => eprintln!("  SUB: {}", s.to_string_lossy()),
		None => Msg::warning("No .sub found; subchannel will be synthesized from the cue.").eprint(),
	}

	// Options.
	eprintln!("Write speed rating (e.g. 4, 8, 16; blank for drive default):");
	let speed: u16 = read_line().parse().unwrap_or(0);

	let mut cfg = BurnConfig::default()
		.with_speed(speed)
		.with_calibration(Msg::plain("Use power calibration?").eprompt_with_default(true));
	if Msg::plain("Blank the disc first (CD-RW only)?").eprompt_with_default(false) {
		let quick = Msg::plain("Quick blank? (No = full)").eprompt_with_default(true);
		cfg = cfg.with_blank(Some(if quick { BlankKind::Quick } else { BlankKind::Full }));
	}

	if ! Msg::plain("Burn it?").eprompt_with_default(true) {
		return Ok(());
	}

	// Go.
	let drive = CdDrive::open(dev)?;
	let mut mmc = Mmc::new(drive);
	let mut burner = Burner::new(&mut mmc, image, cfg);
	match burner.run(progress, killed) {
		Ok(()) => {
			Msg::success("Disc write completed successfully.").eprint();
			Ok(())
		},
		Err(e) => {
			Msg::error(format!(
				"Burn failed ({}); the media should be considered scrap.",
				burner.state().as_str(),
			)).eprint();
			Err(e)
		},
	}
}

/// # Run a Scan (Default Config).
fn run_scan(
	disc: &mut Disc<CdDrive>,
	kind: ScanKind,
	workdir: &Path,
	progress: &Progless,
	killed: &KillSwitch,
) -> Result<(), SpindleError> {
	eprintln!("Scan speed rating (e.g. 4, 8; blank for drive default):");
	let speed: u16 = read_line().parse().unwrap_or(0);
	let cfg = ScanConfig::default().with_speed(speed);
	run_scan_cfg(disc, kind, &cfg, workdir, progress, killed)
}

/// # Run a Scan With a Prepared Config.
fn run_scan_cfg(
	disc: &mut Disc<CdDrive>,
	kind: ScanKind,
	cfg: &ScanConfig,
	workdir: &Path,
	progress: &Progless,
	killed: &KillSwitch,
) -> Result<(), SpindleError> {
	let report = disc.scan(kind, cfg, progress, killed)?;
	Msg::custom("Result", 199, &report.summary).with_newline(true).eprint();

	let dst = workdir.join(format!("{}.csv", csv_stem(kind)));
	report.save_csv(&dst)?;
	Msg::success(format!("Scan log saved to: {}", dst.to_string_lossy())).eprint();
	Ok(())
}

/// # Disc Fingerprint.
fn run_fingerprint(disc: &Disc<CdDrive>) -> Result<(), SpindleError> {
	let info = disc.info();
	let ar = info.accuraterip_id();
	eprintln!();
	eprintln!("AccurateRip: {ar}");
	eprintln!("CDDB:        {}", info.cddb_id());
	eprintln!("Lookup URL:  {}", ar.checksum_url());
	if let Some(mcn) = info.mcn.as_ref() {
		eprintln!("MCN:         {mcn}");
	}
	eprintln!();
	Ok(())
}

/// # Lead Area Check.
fn run_lead_area(
	disc: &mut Disc<CdDrive>,
	progress: &Progless,
	killed: &KillSwitch,
) -> Result<(), SpindleError> {
	let (in_ok, in_total, out_ok, out_total) = disc.check_lead_areas(progress, killed)?;
	Msg::custom("Result", 199, &format!(
		"Inner edge {in_ok}/{in_total} readable; outer edge {out_ok}/{out_total}.",
	)).with_newline(true).eprint();
	Ok(())
}

/// # Audio Content Analysis.
///
/// Works from the in-memory rip; there's no sense re-reading a disc just
/// to average it.
fn run_audio_analysis(disc: &Disc<CdDrive>) -> Result<(), SpindleError> {
	let info = disc.info();
	if ! info.has_audio() {
		Msg::warning("Copy the disc first (menu 1); analysis reads the ripped audio.").eprint();
		return Ok(());
	}

	eprintln!("\n##    PEAK        RMS     CRC32");
	eprintln!("\x1b[2m{DIVIDER}\x1b[0m");
	for t in info.audio_tracks() {
		let Some(audio) = info.audio(t.number) else { continue; };
		eprintln!(
			"{:02}  {:>6}  {:>9.1}  {:08X}",
			t.number,
			audio.peak(),
			audio.rms(),
			audio.crc32(),
		);
	}
	eprintln!();
	Ok(())
}

/// # AccurateRip Verification (Standalone).
fn run_verify(disc: &Disc<CdDrive>) -> Result<(), SpindleError> {
	match disc.verify_accuraterip()? {
		Some(v) => {
			eprintln!("\n##  CONFIDENCE  VERSION");
			eprintln!("\x1b[2m{DIVIDER}\x1b[0m");
			for (track, conf, v2) in &v.tracks {
				eprintln!(
					"{track:02}  {:>10}  {}",
					conf,
					if *conf == 0 { "no match" }
					else if *v2 { "v2" }
					else { "v1" },
				);
			}
			if v.accurate {
				Msg::success("Every track matched a known pressing.").eprint();
			}
			else {
				Msg::warning("One or more tracks did not match any pressing.").eprint();
			}
		},
		None => Msg::info("AccurateRip has never seen this disc.").eprint(),
	}
	Ok(())
}

/// # Drive Capabilities.
fn run_capabilities(disc: &mut Disc<CdDrive>) -> Result<(), SpindleError> {
	let vm = disc.drive_vendor_model();
	let (accurate, dao) = disc.drive_capabilities();
	eprintln!();
	match vm {
		Some(vm) => eprintln!("Drive:           {vm}"),
		None => eprintln!("Drive:           (unidentified)"),
	}
	eprintln!("Accurate Stream: {}", if accurate { "yes (jitter-free reads)" } else { "no" });
	eprintln!("Raw DAO-96:      {}", if dao { "yes" } else { "no" });
	eprintln!();
	Ok(())
}

/// # Drive Offset Detection.
fn run_offset_detect(disc: &Disc<CdDrive>) -> Result<(), SpindleError> {
	match disc.drive_vendor_model() {
		Some(vm) => match vm.detect_offset() {
			Some(o) => Msg::success(format!(
				"{vm}: {:+} samples (from the community offset list).",
				o.samples(),
			)).eprint(),
			None => Msg::warning(format!(
				"{vm} isn't in the offset table; calibrate against a disc AccurateRip knows.",
			)).eprint(),
		},
		None => Msg::warning("The drive declined to identify itself.").eprint(),
	}
	Ok(())
}



/// # Open (or Re-Open) the Disc.
fn open_disc(dev: Option<&OsString>) -> Option<Disc<CdDrive>> {
	match Disc::open(dev) {
		Ok(disc) => Some(disc),
		Err(e) => {
			Msg::warning(format!("{e} (Insert an audio CD and rescan with 22.)")).eprint();
			None
		},
	}
}

/// # Print the Menu.
fn print_menu(has_toc: bool) {
	/// # One Section.
	fn section(title: &str) { eprintln!("\x1b[2m── {title} ──\x1b[0m"); }

	/// # One Item.
	fn item(n: u8, label: &str) { eprintln!("  \x1b[93m{n:>2}\x1b[0m  {label}"); }

	eprintln!();
	section("Ripping");
	item(1, "Copy disc");
	item(2, "Write disc (.bin/.cue/.sub files)");
	section("Disc Quality");
	item(3, "C2 error scan");
	item(4, "BLER scan (C2-derived)");
	item(5, "Disc rot detection");
	item(6, "Generate surface map");
	item(7, "Multi-pass verification");
	section("Disc Info");
	item(8, "Disc summary (TOC & CD-Text)");
	item(9, "Disc fingerprint (AccurateRip/CDDB IDs)");
	item(10, "Lead area check");
	item(11, "Subchannel integrity check");
	item(12, "Audio content analysis");
	item(13, "AccurateRip verification");
	section("Drive");
	item(14, "Drive capabilities");
	item(15, "Drive offset detection");
	item(16, "C2 validation test");
	item(17, "Speed comparison test");
	item(18, "Seek time analysis");
	item(19, "Q-Check (Plextor)");
	item(20, "Disc balance check");
	section("Utility");
	item(21, "Check for updates");
	item(22, "Rescan disc");
	item(23, "Help (test descriptions)");
	item(24, "Exit");

	if ! has_toc {
		Msg::warning("No usable disc; only 2 and 21–24 will work right now.").eprint();
	}
	eprint!("\x1b[1mChoice:\x1b[0m ");
}

/// # Help Text for the Tests.
fn print_help_menu() {
	eprintln!("
\x1b[1mCopy disc\x1b[0m rips every audio track with multi-pass consensus, C2-guided
re-reads, cache defeat, and read-offset correction, then verifies the
result against AccurateRip and writes a bin/cue(/sub) set plus logs.

\x1b[1mWrite disc\x1b[0m burns a prepared set back to CD-R/RW in raw DAO-96 mode,
including CD-Text and subchannel (copied or synthesized).

\x1b[1mC2/BLER\x1b[0m count the drive's error-pointer reports per sector. \x1b[1mDisc rot\x1b[0m
compares slow and fast reads; decay reads worse slow. \x1b[1mSurface map\x1b[0m and
\x1b[1mbalance\x1b[0m time every sector to find slow or lopsided regions.
\x1b[1mMulti-pass verification\x1b[0m re-reads the whole disc looking for unstable
sectors without keeping any audio.

Scan results land as CSV files next to the executable; rips and their
logs do too.
");
}

/// # Scan CSV Stems.
const fn csv_stem(kind: ScanKind) -> &'static str {
	match kind {
		ScanKind::C2 => "c2_scan",
		ScanKind::Bler => "bler_scan",
		ScanKind::QCheck => "qcheck",
		ScanKind::SubIntegrity => "subchannel_integrity",
		ScanKind::DiscRot => "discrot_scan",
		ScanKind::Surface => "surface_map",
		ScanKind::Balance => "balance_check",
		ScanKind::Seek => "seek_times",
		ScanKind::SpeedCompare => "speed_compare",
		ScanKind::MultiPass(_) => "multipass_verify",
	}
}

/// # Read a Trimmed Line From STDIN.
fn read_line() -> String {
	let mut out = String::new();
	let _res = std::io::stdin().lock().read_line(&mut out);
	out.trim_mut();
	out
}

/// # Read a Menu Choice.
///
/// Numbers outside the range — and plain Enter — fall back to the
/// default.
fn read_menu_choice(min: u8, max: u8, default: u8) -> u8 {
	read_line()
		.parse::<u8>()
		.ok()
		.filter(|n| (min..=max).contains(n))
		.unwrap_or(default)
}

/// # Working Directory.
///
/// Derived from the executable's location, falling back to the process
/// CWD when that's somehow unknowable.
fn work_dir() -> PathBuf {
	std::env::current_exe()
		.ok()
		.and_then(|p| p.parent().map(std::path::Path::to_path_buf))
		.or_else(|| std::env::current_dir().ok())
		.unwrap_or_else(|| PathBuf::from("."))
}

/// # Hook Up CTRL+C.
fn sigint(killed: Arc<AtomicBool>, progress: Option<Progless>) {
	let _res = ctrlc::set_handler(move ||
		if killed.compare_exchange(false, true, SeqCst, Relaxed).is_ok() {
			if let Some(p) = &progress { p.sigint(); }
		}
	);
}
