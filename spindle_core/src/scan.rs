/*!
# Spindle: Diagnostic Scans
*/

use crate::{
	BYTES_PER_SECTOR,
	CD_DATA_SUB_SIZE,
	CdbGate,
	Disc,
	image::AtomicWriter,
	KillSwitch,
	Mmc,
	mmc::ReadForm,
	SpindleError,
	subq::{
		deinterleave_q,
		SubQ,
	},
};
use dactyl::NiceU32;
use fyi_msg::{
	Msg,
	Progless,
};
use std::{
	io::Write,
	path::Path,
	time::Instant,
};



/// # 4× Read Speed (kB/s).
const SPEED_4X: u16 = 706;

/// # Disc-Rot Comparison Threshold.
///
/// A region is suspect when its slow-speed C2 count beats the fast one
/// by more than this.
const ROT_THRESHOLD: u32 = 8;

/// # Seek-Test Sample Count.
const SEEK_SAMPLES: u32 = 24;

/// # Speed-Compare Sample Window (Sectors).
const SPEED_WINDOW: u32 = 750;



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Scan Flavor.
///
/// Every scan is the same loop with a different sector probe and a
/// different idea of what counts as a result; this enum picks both.
pub enum ScanKind {
	/// # C2 Error Scan.
	C2,

	/// # Block Error Rate.
	///
	/// Real F1/F2 frame counters are a vendor luxury; without them this
	/// degrades to a C2-derived estimate and says so.
	Bler,

	/// # Q-Subchannel Check.
	QCheck,

	/// # Subchannel Integrity.
	///
	/// The same CRC accounting as Q-Check without the vendor gate; any
	/// drive that can return raw P-W qualifies.
	SubIntegrity,

	/// # Disc Rot Detection.
	///
	/// Two passes at widely different speeds; decaying media reads
	/// *worse* slow than fast.
	DiscRot,

	/// # Surface Map.
	///
	/// Wall-clock per sector.
	Surface,

	/// # Balance Check.
	///
	/// Read-time asymmetry between disc halves.
	Balance,

	/// # Seek-Time Analysis.
	Seek,

	/// # Speed Comparison.
	SpeedCompare,

	/// # Multi-Pass Verification.
	///
	/// N hashing passes; sectors whose bytes wobble get reported.
	MultiPass(u8),
}

impl ScanKind {
	#[must_use]
	/// # As Str.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::C2 => "C2 scan",
			Self::Bler => "BLER scan",
			Self::QCheck => "Q-Check",
			Self::SubIntegrity => "subchannel integrity check",
			Self::DiscRot => "disc-rot scan",
			Self::Surface => "surface map",
			Self::Balance => "balance check",
			Self::Seek => "seek-time analysis",
			Self::SpeedCompare => "speed comparison",
			Self::MultiPass(_) => "multi-pass verification",
		}
	}

	#[must_use]
	/// # CSV Column Headers (After `lba`).
	pub const fn columns(self) -> &'static [&'static str] {
		match self {
			Self::C2 => &["c2_errors"],
			Self::Bler => &["c2_errors", "bler_per_second"],
			Self::QCheck | Self::SubIntegrity => &["q_crc_ok", "q_crc_bad"],
			Self::DiscRot => &["slow_c2", "fast_c2", "suspect"],
			Self::Surface | Self::Balance => &["read_us"],
			Self::Seek => &["seek_us"],
			Self::SpeedCompare => &["speed_kbs", "throughput_kbs"],
			Self::MultiPass(_) => &["stable", "mismatches"],
		}
	}
}



#[derive(Debug, Clone, Copy)]
/// # Scan Configuration.
pub struct ScanConfig {
	/// # Read Speed (kB/s; Zero = Default).
	speed: u16,

	/// # Sample Every N Sectors.
	step: u32,
}

impl Default for ScanConfig {
	fn default() -> Self {
		Self {
			speed: 0,
			step: 1,
		}
	}
}

impl ScanConfig {
	#[must_use]
	/// # With Read Speed.
	///
	/// A CD speed rating; zero leaves the drive alone.
	pub const fn with_speed(self, rating: u16) -> Self {
		Self {
			speed: rating.saturating_mul(176),
			..self
		}
	}

	#[must_use]
	/// # With Sampling Step.
	///
	/// Probe every Nth sector instead of all of them; zero means one.
	pub const fn with_step(self, mut step: u32) -> Self {
		if step == 0 { step = 1; }
		Self {
			step,
			..self
		}
	}
}



#[derive(Debug, Clone)]
/// # Scan Report.
///
/// One row per probed address plus a human summary; `save_csv` spits the
/// rows out in the usual spreadsheet-bait form.
pub struct ScanReport {
	/// # What Ran.
	pub kind: ScanKind,

	/// # The Rows.
	pub rows: Vec<(i32, Vec<u32>)>,

	/// # One-Line Verdict.
	pub summary: String,
}

impl ScanReport {
	/// # Save as CSV.
	///
	/// ## Errors
	///
	/// Returns an error if the file cannot be written.
	pub fn save_csv(&self, dst: &Path) -> Result<(), SpindleError> {
		let mut out = AtomicWriter::new(dst)?;
		let w = out.writer();
		let res: std::io::Result<()> = (|| {
			write!(w, "lba")?;
			for c in self.kind.columns() { write!(w, ",{c}")?; }
			writeln!(w)?;

			for (lba, values) in &self.rows {
				write!(w, "{lba}")?;
				for v in values { write!(w, ",{v}")?; }
				writeln!(w)?;
			}
			Ok(())
		})();

		res.map_err(|_| SpindleError::Write(dst.to_string_lossy().into_owned()))?;
		out.finish()
	}
}



impl<G: CdbGate> Disc<G> {
	/// # Run a Diagnostic Scan.
	///
	/// ## Errors
	///
	/// Returns `FeatureUnsupported` for vendor-locked scans on the wrong
	/// hardware, `Cancelled` on interrupt, and relays anything terminal
	/// from the transport; individual bad sectors are data, not errors.
	pub fn scan(
		&mut self,
		kind: ScanKind,
		cfg: &ScanConfig,
		progress: &Progless,
		killed: &KillSwitch,
	) -> Result<ScanReport, SpindleError> {
		let first = self.info().first_sector() as i32;
		let leadout = self.info().leadout_lba as i32;
		let mmc = self.mmc_mut();

		progress.set_title(Some(Msg::custom("Scanning", 199, kind.as_str())));
		let _res = mmc.set_speed(cfg.speed, 0);
		let out = match kind {
			ScanKind::C2 => scan_c2(mmc, first, leadout, cfg, progress, killed),
			ScanKind::Bler => scan_bler(mmc, first, leadout, cfg, progress, killed),
			ScanKind::QCheck =>
				scan_qcheck(mmc, first, leadout, cfg, progress, killed, true),
			ScanKind::SubIntegrity =>
				scan_qcheck(mmc, first, leadout, cfg, progress, killed, false),
			ScanKind::DiscRot => scan_disc_rot(mmc, first, leadout, cfg, progress, killed),
			ScanKind::Surface => scan_surface(mmc, first, leadout, cfg, progress, killed, false),
			ScanKind::Balance => scan_surface(mmc, first, leadout, cfg, progress, killed, true),
			ScanKind::Seek => scan_seek(mmc, first, leadout, progress, killed),
			ScanKind::SpeedCompare => scan_speed(mmc, first, leadout, progress, killed),
			ScanKind::MultiPass(passes) =>
				scan_multipass(mmc, first, leadout, cfg, passes, progress, killed),
		};
		let _res = mmc.set_speed(0, 0);

		progress.finish();
		out
	}

	/// # Lead Area Check.
	///
	/// Probe a handful of sectors at both extremes of the program —
	/// where clamping damage and edge rot show first — and report
	/// `(inner ok, inner probed, outer ok, outer probed)`.
	///
	/// ## Errors
	///
	/// Relays terminal transport errors; unreadable sectors are counts,
	/// not failures.
	pub fn check_lead_areas(&mut self, progress: &Progless, killed: &KillSwitch)
	-> Result<(u32, u32, u32, u32), SpindleError> {
		const EDGE: i32 = 30;

		let first = self.info().first_sector() as i32;
		let leadout = self.info().leadout_lba as i32;
		let mmc = self.mmc_mut();
		let mut buf = vec![0_u8; ReadForm::Audio.block_size()];

		let mut probe_rng = |mmc: &mut Mmc<G>, from: i32, to: i32| -> Result<(u32, u32), SpindleError> {
			let mut ok = 0;
			let mut total = 0;
			for lba in from..to {
				if killed.killed() { return Err(SpindleError::Cancelled); }
				total += 1;
				match mmc.read_cd(lba, 1, ReadForm::Audio, &mut buf) {
					Ok(()) => { ok += 1; },
					Err(e @ SpindleError::DeviceGone) => return Err(e),
					Err(_) => {},
				}
				progress.increment();
			}
			Ok((ok, total))
		};

		let _res = progress.try_reset((EDGE as u32) * 2);
		progress.set_title(Some(Msg::custom("Scanning", 199, "lead area check")));
		let (in_ok, in_total) = probe_rng(mmc, first, (first + EDGE).min(leadout))?;
		let (out_ok, out_total) = probe_rng(mmc, (leadout - EDGE).max(first), leadout)?;
		progress.finish();

		Ok((in_ok, in_total, out_ok, out_total))
	}

	/// # Drive Capabilities.
	///
	/// Returns `(accurate stream, raw DAO writing)`.
	pub fn drive_capabilities(&mut self) -> (bool, bool) {
		let mmc = self.mmc_mut();
		(mmc.accurate_stream(), mmc.can_write_dao())
	}
}



/// # The Shared Loop.
///
/// Walk the range at the configured step, handing each address to the
/// probe and collecting its row. Probe errors become `u32::MAX` markers
/// rather than aborting the scan; a dead drive or a kill still stops
/// everything.
fn scan_loop<G, F>(
	mmc: &mut Mmc<G>,
	first: i32,
	leadout: i32,
	step: u32,
	progress: &Progless,
	killed: &KillSwitch,
	mut probe: F,
) -> Result<Vec<(i32, Vec<u32>)>, SpindleError>
where
	G: CdbGate,
	F: FnMut(&mut Mmc<G>, i32) -> Result<Vec<u32>, SpindleError>,
{
	let total = ((leadout - first) as u32).div_ceil(step);
	let _res = progress.try_reset(total);

	let mut out = Vec::with_capacity(total as usize);
	let mut lba = first;
	while lba < leadout {
		if killed.killed() { return Err(SpindleError::Cancelled); }

		match probe(mmc, lba) {
			Ok(row) => out.push((lba, row)),
			Err(e @ SpindleError::DeviceGone) => return Err(e),
			Err(_) => out.push((lba, vec![u32::MAX])),
		}

		progress.increment();
		lba += step as i32;
	}

	Ok(out)
}

/// # C2 Scan.
fn scan_c2<G: CdbGate>(
	mmc: &mut Mmc<G>,
	first: i32,
	leadout: i32,
	cfg: &ScanConfig,
	progress: &Progless,
	killed: &KillSwitch,
) -> Result<ScanReport, SpindleError> {
	let mut buf = vec![0_u8; ReadForm::AudioC2.block_size()];
	let rows = scan_loop(mmc, first, leadout, cfg.step, progress, killed, |mmc, lba| {
		mmc.read_cd(lba, 1, ReadForm::AudioC2, &mut buf)?;
		Ok(vec![count_c2(&buf)])
	})?;

	// Histogram the damage for the summary.
	let mut clean = 0_u32;
	let mut light = 0_u32;
	let mut heavy = 0_u32;
	let mut unreadable = 0_u32;
	for (_, row) in &rows {
		match row[0] {
			0 => { clean += 1; },
			u32::MAX => { unreadable += 1; },
			1..=31 => { light += 1; },
			_ => { heavy += 1; },
		}
	}
	let summary = format!(
		"{} clean, {} light, {} heavy, {} unreadable.",
		NiceU32::from(clean),
		NiceU32::from(light),
		NiceU32::from(heavy),
		NiceU32::from(unreadable),
	);

	Ok(ScanReport { kind: ScanKind::C2, rows, summary })
}

/// # BLER Scan.
///
/// Real block-error-rate counters live behind vendor commands this crate
/// doesn't speak, so the estimate is derived from C2 aggregated over
/// one-second (75-sector) windows — and labeled as such.
fn scan_bler<G: CdbGate>(
	mmc: &mut Mmc<G>,
	first: i32,
	leadout: i32,
	cfg: &ScanConfig,
	progress: &Progless,
	killed: &KillSwitch,
) -> Result<ScanReport, SpindleError> {
	let mut buf = vec![0_u8; ReadForm::AudioC2.block_size()];
	let mut window: Vec<u32> = Vec::with_capacity(75);

	let mut rows = scan_loop(mmc, first, leadout, cfg.step, progress, killed, |mmc, lba| {
		mmc.read_cd(lba, 1, ReadForm::AudioC2, &mut buf)?;
		let errors = count_c2(&buf);
		if window.len() == 75 { window.remove(0); }
		window.push(u32::from(errors != 0));
		Ok(vec![errors, window.iter().sum()])
	})?;

	// Error'd probes only carry one column; pad for CSV sanity.
	for (_, row) in &mut rows {
		if row.len() == 1 { row.push(0); }
	}

	let worst = rows.iter().map(|(_, r)| r[1]).max().unwrap_or(0);
	let summary = format!(
		"C2-derived estimate; worst one-second window hit {worst} errored blocks.",
	);

	Ok(ScanReport { kind: ScanKind::Bler, rows, summary })
}

/// # Q-Check / Subchannel Integrity.
///
/// The genuine Q-Check is a Plextor vendor extension with a response
/// layout that shifts between firmware revisions, so its gate is
/// strict: no Plextor, no Q-Check. On qualifying hardware — and for the
/// ungated integrity variant on anything — the subchannel CRC failure
/// rate stands in for the vendor counters.
fn scan_qcheck<G: CdbGate>(
	mmc: &mut Mmc<G>,
	first: i32,
	leadout: i32,
	cfg: &ScanConfig,
	progress: &Progless,
	killed: &KillSwitch,
	gated: bool,
) -> Result<ScanReport, SpindleError> {
	if gated {
		let (vendor, _) = mmc.inquiry()?;
		if ! vendor.eq_ignore_ascii_case("PLEXTOR") {
			return Err(SpindleError::FeatureUnsupported("Q-Check (Plextor only)"));
		}
	}

	let mut buf = vec![0_u8; ReadForm::AudioRawSub.block_size()];
	let rows = scan_loop(mmc, first, leadout, cfg.step, progress, killed, |mmc, lba| {
		mmc.read_cd(lba, 1, ReadForm::AudioRawSub, &mut buf)?;
		let ok = deinterleave_q(&buf[BYTES_PER_SECTOR as usize..CD_DATA_SUB_SIZE as usize])
			.and_then(|q| SubQ::parse(&q))
			.is_some();
		Ok(vec![u32::from(ok), u32::from(! ok)])
	})?;

	let bad: u32 = rows.iter().map(|(_, r)| r.get(1).copied().unwrap_or(1)).sum();
	let summary = format!("{} Q frames failed their CRC.", NiceU32::from(bad));

	Ok(ScanReport {
		kind: if gated { ScanKind::QCheck } else { ScanKind::SubIntegrity },
		rows,
		summary,
	})
}

/// # Disc Rot.
///
/// Two C2 sweeps, slow then fast. Healthy discs read no worse slow; a
/// region whose slow-speed error count exceeds its fast-speed count by
/// the threshold is flagged as likely decay.
fn scan_disc_rot<G: CdbGate>(
	mmc: &mut Mmc<G>,
	first: i32,
	leadout: i32,
	cfg: &ScanConfig,
	progress: &Progless,
	killed: &KillSwitch,
) -> Result<ScanReport, SpindleError> {
	let mut buf = vec![0_u8; ReadForm::AudioC2.block_size()];

	let _res = mmc.set_speed(SPEED_4X, 0);
	let slow = scan_loop(mmc, first, leadout, cfg.step, progress, killed, |mmc, lba| {
		mmc.read_cd(lba, 1, ReadForm::AudioC2, &mut buf)?;
		Ok(vec![count_c2(&buf)])
	})?;

	let _res = mmc.set_speed(0, 0);
	let fast = scan_loop(mmc, first, leadout, cfg.step, progress, killed, |mmc, lba| {
		mmc.read_cd(lba, 1, ReadForm::AudioC2, &mut buf)?;
		Ok(vec![count_c2(&buf)])
	})?;

	let mut suspects = 0_u32;
	let rows: Vec<(i32, Vec<u32>)> = slow.iter()
		.zip(fast.iter())
		.map(|((lba, s), (_, f))| {
			let s = s[0];
			let f = f[0];
			let suspect = u32::from(
				s != u32::MAX && f != u32::MAX && f + ROT_THRESHOLD < s
			);
			suspects += suspect;
			(*lba, vec![s, f, suspect])
		})
		.collect();

	let summary =
		if suspects == 0 { "No rot signature detected.".to_owned() }
		else {
			format!(
				"{} suspect {} (slow reads worse than fast); the media may be decaying.",
				NiceU32::from(suspects),
				if suspects == 1 { "region" } else { "regions" },
			)
		};

	Ok(ScanReport { kind: ScanKind::DiscRot, rows, summary })
}

/// # Surface Map / Balance.
///
/// Identical probes — wall-clock per read — differing only in the
/// verdict: the surface map reports slow spots, the balance check
/// compares inner and outer halves for the lopsided signature of a
/// warped or badly clamped disc.
fn scan_surface<G: CdbGate>(
	mmc: &mut Mmc<G>,
	first: i32,
	leadout: i32,
	cfg: &ScanConfig,
	progress: &Progless,
	killed: &KillSwitch,
	balance: bool,
) -> Result<ScanReport, SpindleError> {
	let mut buf = vec![0_u8; ReadForm::Audio.block_size()];
	let rows = scan_loop(mmc, first, leadout, cfg.step, progress, killed, |mmc, lba| {
		let now = Instant::now();
		mmc.read_cd(lba, 1, ReadForm::Audio, &mut buf)?;
		Ok(vec![u32::try_from(now.elapsed().as_micros()).unwrap_or(u32::MAX)])
	})?;

	let good = |r: &&(i32, Vec<u32>)| r.1[0] != u32::MAX;
	let kind = if balance { ScanKind::Balance } else { ScanKind::Surface };
	let summary = if balance {
		let mid = first + (leadout - first) / 2;
		let inner = average(rows.iter().filter(good).filter(|(l, _)| *l < mid).map(|(_, r)| r[0]));
		let outer = average(rows.iter().filter(good).filter(|(l, _)| mid <= *l).map(|(_, r)| r[0]));
		let skew =
			if inner == 0 || outer == 0 { 0 }
			else { (inner.abs_diff(outer) * 100) / inner.max(outer) };
		format!(
			"Inner half averaged {inner} µs/sector, outer {outer} µs; skew {skew}%.",
		)
	}
	else {
		let avg = average(rows.iter().filter(good).map(|(_, r)| r[0]));
		let worst = rows.iter().filter(good).map(|(_, r)| r[0]).max().unwrap_or(0);
		format!("Average {avg} µs/sector; worst {worst} µs.")
	};

	Ok(ScanReport { kind, rows, summary })
}

/// # Seek Times.
///
/// Hop between spread-out targets from alternating ends of the disc and
/// time the landing read.
fn scan_seek<G: CdbGate>(
	mmc: &mut Mmc<G>,
	first: i32,
	leadout: i32,
	progress: &Progless,
	killed: &KillSwitch,
) -> Result<ScanReport, SpindleError> {
	let span = leadout - first;
	if span < SEEK_SAMPLES as i32 {
		return Err(SpindleError::InvalidInput("the disc is too small to seek around"));
	}

	let _res = progress.try_reset(SEEK_SAMPLES);
	let mut buf = vec![0_u8; ReadForm::Audio.block_size()];
	let mut rows = Vec::with_capacity(SEEK_SAMPLES as usize);

	for k in 0..SEEK_SAMPLES {
		if killed.killed() { return Err(SpindleError::Cancelled); }

		// Zig-zag: evens from the front, odds from the back.
		let stride = span / SEEK_SAMPLES as i32;
		let target =
			if 0 == k & 1 { first + stride * k as i32 }
			else { leadout - 1 - stride * k as i32 };

		let now = Instant::now();
		let row = match mmc.read_cd(target, 1, ReadForm::Audio, &mut buf) {
			Ok(()) => u32::try_from(now.elapsed().as_micros()).unwrap_or(u32::MAX),
			Err(SpindleError::DeviceGone) => return Err(SpindleError::DeviceGone),
			Err(_) => u32::MAX,
		};
		rows.push((target, vec![row]));
		progress.increment();
	}

	let avg = average(rows.iter().filter(|(_, r)| r[0] != u32::MAX).map(|(_, r)| r[0]));
	let summary = format!("Average seek-and-read {avg} µs over {SEEK_SAMPLES} hops.");

	Ok(ScanReport { kind: ScanKind::Seek, rows, summary })
}

/// # Speed Comparison.
///
/// Read the same mid-disc window at a ladder of speeds and report the
/// achieved throughput for each.
fn scan_speed<G: CdbGate>(
	mmc: &mut Mmc<G>,
	first: i32,
	leadout: i32,
	progress: &Progless,
	killed: &KillSwitch,
) -> Result<ScanReport, SpindleError> {
	const LADDER: [u16; 4] = [SPEED_4X, 1_412, 2_824, 0];

	let span = leadout - first;
	if span < SPEED_WINDOW as i32 {
		return Err(SpindleError::InvalidInput("the disc is too small to benchmark"));
	}
	let start = first + span / 2 - SPEED_WINDOW as i32 / 2;

	let _res = progress.try_reset(LADDER.len() as u32 * SPEED_WINDOW);
	let mut buf = vec![0_u8; ReadForm::Audio.block_size()];
	let mut rows = Vec::with_capacity(LADDER.len());

	for speed in LADDER {
		let _res = mmc.set_speed(speed, 0);
		let now = Instant::now();
		let mut read = 0_u64;

		for lba in start..start + SPEED_WINDOW as i32 {
			if killed.killed() { return Err(SpindleError::Cancelled); }
			if mmc.read_cd(lba, 1, ReadForm::Audio, &mut buf).is_ok() {
				read += u64::from(BYTES_PER_SECTOR);
			}
			progress.increment();
		}

		let elapsed = now.elapsed().as_micros().max(1);
		let kbs = u32::try_from(read * 1_000_000 / 1024 / elapsed as u64).unwrap_or(u32::MAX);
		rows.push((start, vec![u32::from(speed), kbs]));
	}

	let summary = "Throughput ladder complete; compare the requested and achieved rates.".to_owned();
	Ok(ScanReport { kind: ScanKind::SpeedCompare, rows, summary })
}

/// # Multi-Pass Verification.
///
/// Hash every sector N times over; positions whose hashes wobble between
/// passes make the report.
fn scan_multipass<G: CdbGate>(
	mmc: &mut Mmc<G>,
	first: i32,
	leadout: i32,
	cfg: &ScanConfig,
	passes: u8,
	progress: &Progless,
	killed: &KillSwitch,
) -> Result<ScanReport, SpindleError> {
	let passes = passes.clamp(2, 10);
	let mut buf = vec![0_u8; ReadForm::Audio.block_size()];
	let mut baseline: Vec<u32> = Vec::new();
	let mut mismatches: Vec<u32> = Vec::new();

	for pass in 0..passes {
		let pass_rows = scan_loop(mmc, first, leadout, cfg.step, progress, killed, |mmc, lba| {
			mmc.read_cd(lba, 1, ReadForm::Audio, &mut buf)?;
			Ok(vec![crc32fast::hash(&buf)])
		})?;

		if pass == 0 {
			baseline = pass_rows.iter().map(|(_, r)| r[0]).collect();
			mismatches = vec![0; baseline.len()];
		}
		else {
			for (k, (_, r)) in pass_rows.iter().enumerate() {
				if baseline.get(k).copied() != Some(r[0]) { mismatches[k] += 1; }
			}
		}
	}

	let step = cfg.step.max(1) as i32;
	let rows: Vec<(i32, Vec<u32>)> = mismatches.iter()
		.enumerate()
		.map(|(k, &m)| (first + k as i32 * step, vec![u32::from(m == 0), m]))
		.collect();

	let wobbly = mismatches.iter().filter(|&&m| m != 0).count();
	let summary =
		if wobbly == 0 {
			format!("All sectors matched across {passes} passes.")
		}
		else {
			format!(
				"{} {} returned different data between passes.",
				NiceU32::from(wobbly as u32),
				if wobbly == 1 { "sector" } else { "sectors" },
			)
		};

	Ok(ScanReport { kind: ScanKind::MultiPass(passes), rows, summary })
}



/// # Count C2-Flagged Bytes.
fn count_c2(buf: &[u8]) -> u32 {
	buf[BYTES_PER_SECTOR as usize..]
		.iter()
		.map(|v| v.count_ones())
		.sum()
}

/// # Integer Average.
fn average<I: Iterator<Item = u32>>(src: I) -> u32 {
	let mut total = 0_u64;
	let mut count = 0_u64;
	for v in src {
		total += u64::from(v);
		count += 1;
	}
	if count == 0 { 0 }
	else { (total / count) as u32 }
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_average() {
		assert_eq!(average([].into_iter()), 0);
		assert_eq!(average([5].into_iter()), 5);
		assert_eq!(average([1, 2, 3, 4].into_iter()), 2);
	}

	#[test]
	fn t_count_c2() {
		let mut buf = vec![0_u8; ReadForm::AudioC2.block_size()];
		assert_eq!(count_c2(&buf), 0);
		buf[BYTES_PER_SECTOR as usize] = 0b1111_0000;
		buf[BYTES_PER_SECTOR as usize + 293] = 0b0000_0001;
		assert_eq!(count_c2(&buf), 5);
	}

	#[test]
	fn t_columns() {
		// Every kind declares at least one column so the CSVs always
		// have headers.
		for kind in [
			ScanKind::C2, ScanKind::Bler, ScanKind::QCheck, ScanKind::DiscRot,
			ScanKind::Surface, ScanKind::Balance, ScanKind::Seek,
			ScanKind::SpeedCompare, ScanKind::MultiPass(3),
		] {
			assert!(! kind.columns().is_empty());
		}
	}
}
