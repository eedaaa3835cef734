/*!
# Spindle: Rip Logs
*/

use crate::{
	accuraterip::{
		ArVerdict,
		TrackCrc,
	},
	DiscInfo,
	DriveVendorModel,
	image::AtomicWriter,
	ReadOffset,
	rip::{
		opts::SecureRipConfig,
		SecureRipResult,
	},
	SpindleError,
};
use dactyl::NiceElapsed;
use std::{
	io::Write,
	path::Path,
	time::Duration,
};
use utc2k::FmtUtc2k;



/// # Everything the Read Log Wants to Say.
pub(crate) struct RipLogContext<'a> {
	/// # The Model.
	pub(crate) info: &'a DiscInfo,

	/// # Drive Identification.
	pub(crate) drive: Option<DriveVendorModel>,

	/// # Rip Configuration.
	pub(crate) cfg: &'a SecureRipConfig,

	/// # Applied Read Offset.
	pub(crate) offset: ReadOffset,

	/// # Engine Result.
	pub(crate) result: &'a SecureRipResult,

	/// # Local Checksums.
	pub(crate) crcs: &'a [(u8, TrackCrc)],

	/// # AccurateRip Verdict, If the Lookup Went Through.
	pub(crate) verdict: Option<&'a ArVerdict>,

	/// # Wall-Clock Spent.
	pub(crate) elapsed: Duration,
}

/// # Write the Read Log.
///
/// The human-readable record of the whole rip: tool and drive identity,
/// configuration, the reconstructed TOC, per-track checksums, database
/// match counts, and any unresolved addresses. Enough to reproduce or
/// post-mortem the rip without the disc in hand.
///
/// ## Errors
///
/// Returns an error if the file cannot be written.
pub(crate) fn write_rip_log(dst: &Path, ctx: &RipLogContext<'_>)
-> Result<(), SpindleError> {
	let mut out = AtomicWriter::new(dst)?;
	let w = out.writer();
	let res: std::io::Result<()> = (|| {
		writeln!(w, "## Spindle v{}", env!("CARGO_PKG_VERSION"))?;
		writeln!(w, "## Date:   {}", FmtUtc2k::now())?;
		match ctx.drive {
			Some(d) => writeln!(w, "## Drive:  {d}")?,
			None => writeln!(w, "## Drive:  (unknown)")?,
		}
		writeln!(
			w,
			"## Mode:   {} (passes {}..{}, agreement {})",
			ctx.cfg.mode().as_str(),
			ctx.cfg.min_passes(),
			ctx.cfg.max_passes(),
			ctx.cfg.agreement(),
		)?;
		writeln!(w, "## Offset: {:+} samples", ctx.offset.samples())?;
		writeln!(
			w,
			"## Flags:  cache-defeat={} c2={} subchannel={}",
			ctx.cfg.cache_defeat(),
			ctx.cfg.c2_guided(),
			ctx.cfg.subchannel(),
		)?;
		writeln!(w, "## Ripped in {}.", NiceElapsed::from(ctx.elapsed))?;
		writeln!(w, "##")?;

		// The TOC.
		writeln!(w, "## AccurateRip: {}", ctx.info.accuraterip_id())?;
		writeln!(w, "## CDDB:        {}", ctx.info.cddb_id())?;
		if let Some(mcn) = ctx.info.mcn.as_ref() {
			writeln!(w, "## MCN:         {mcn}")?;
		}
		writeln!(w, "##")?;
		writeln!(w, "## TRACK  PREGAP   FIRST    LAST          ISRC")?;
		for t in &ctx.info.tracks {
			writeln!(
				w,
				"##    {:02}  {:>6}  {:>6}  {:>6}  {:>12}",
				t.number,
				t.pregap_lba,
				t.start_lba,
				t.end_lba,
				t.isrc.map(|i| i.to_string()).unwrap_or_default(),
			)?;
		}
		writeln!(w, "##    AA  {:>6}                  LEAD-OUT", ctx.info.leadout_lba)?;
		if ctx.info.toc_repaired {
			writeln!(w, "## Note: out-of-range TOC entries were repaired.")?;
		}
		if ctx.info.has_hidden_track {
			writeln!(w, "## Note: hidden audio found before track one.")?;
		}
		writeln!(w, "##")?;

		// Checksums.
		writeln!(w, "## TRACK     CRC32     AR v1     AR v2  CONFIDENCE")?;
		for (track, crc) in ctx.crcs {
			let audio_crc = ctx.info.audio(*track).map_or(0, |a| a.crc32());
			let conf = ctx.verdict
				.and_then(|v| v.tracks.iter().find(|(t, _, _)| t == track))
				.map_or_else(
					|| "       n/a".to_owned(),
					|(_, c, v2)| format!("{c:>7} {}", if *v2 { "v2" } else { "v1" }),
				);
			writeln!(
				w,
				"##    {track:02}  {audio_crc:08X}  {:08X}  {:08X}  {conf}",
				crc.v1,
				crc.v2,
			)?;
		}
		match ctx.verdict {
			Some(v) if v.accurate =>
				writeln!(w, "## AccurateRip: every track matched a known pressing.")?,
			Some(_) =>
				writeln!(w, "## AccurateRip: one or more tracks did not match.")?,
			None =>
				writeln!(w, "## AccurateRip: lookup unavailable; local checksums only.")?,
		}
		writeln!(w, "##")?;

		// The trouble, if any.
		if ctx.result.unresolved.is_empty() {
			writeln!(w, "## Unresolved sectors: none.")?;
		}
		else {
			writeln!(w, "## Unresolved sectors: {}", ctx.result.unresolved.len())?;
			for lba in &ctx.result.unresolved {
				writeln!(w, "##   LBA {lba:06}")?;
			}
		}
		if ctx.result.cancelled {
			writeln!(w, "## NOTE: the rip was interrupted before completion.")?;
		}

		Ok(())
	})();

	res.map_err(|_| SpindleError::Write(dst.to_string_lossy().into_owned()))?;
	out.finish()
}

/// # Write the Secure-Rip Log.
///
/// The condensed companion: pass and re-read totals plus the per-track
/// confidence breakdown.
///
/// ## Errors
///
/// Returns an error if the file cannot be written.
pub(crate) fn write_secure_log(dst: &Path, result: &SecureRipResult)
-> Result<(), SpindleError> {
	let mut out = AtomicWriter::new(dst)?;
	let w = out.writer();
	let res: std::io::Result<()> = (|| {
		writeln!(w, "## Spindle v{} secure rip", env!("CARGO_PKG_VERSION"))?;
		writeln!(w, "## Date: {}", FmtUtc2k::now())?;
		writeln!(w, "## Passes:   {}", result.passes)?;
		writeln!(w, "## Re-reads: {}", result.rereads)?;
		writeln!(w, "##")?;
		writeln!(w, "## TRACK  VERIFIED  BEST-EFFORT  UNRESOLVED")?;
		for t in &result.tracks {
			writeln!(
				w,
				"##    {:02}  {:>8}  {:>11}  {:>10}",
				t.track,
				t.verified,
				t.best_effort,
				t.unresolved,
			)?;
			for lba in &t.unresolved_lbas {
				writeln!(w, "##        LBA {lba:06}")?;
			}
		}
		if result.cancelled {
			writeln!(w, "## NOTE: interrupted; unread sectors are listed as unresolved.")?;
		}
		Ok(())
	})();

	res.map_err(|_| SpindleError::Write(dst.to_string_lossy().into_owned()))?;
	out.finish()
}
