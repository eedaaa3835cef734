/*!
# Spindle: Secure Read Engine
*/

pub(crate) mod buf;
pub(crate) mod log;
pub(crate) mod offset;
pub(crate) mod opts;
pub(crate) mod tally;

use crate::{
	BYTES_PER_SECTOR,
	CD_SUB_SIZE,
	CdbGate,
	Disc,
	DiscInfo,
	KillSwitch,
	Mmc,
	ReadOffset,
	SpindleError,
	TrackAudio,
};
use buf::RipBuffer;
use fyi_msg::{
	Msg,
	Progless,
};
use opts::{
	RipMode,
	SecureRipConfig,
};
use tally::{
	SectorConfidence,
	SectorTally,
};



/// # Per-Sector Re-Read Budget.
///
/// Quarantined sectors get this many isolated retries before being
/// declared unresolved.
const REREAD_BUDGET: u8 = 16;

/// # Cache-Purge Distance (Sectors).
///
/// Sixty-four mebibytes of audio, the spread needed to guarantee any
/// plausible drive buffer has been evicted between reads of one LBA.
const PURGE_DISTANCE: u32 = 64 * 1024 * 1024 / BYTES_PER_SECTOR as u32 + 1;



#[derive(Debug, Clone, Default)]
/// # Secure Rip Result.
///
/// What happened: how hard the engine had to try, what it couldn't fix,
/// and (optionally) the raw subchannel stream captured along the way.
pub struct SecureRipResult {
	/// # Full Passes Performed.
	pub passes: u8,

	/// # Isolated Re-Reads Performed.
	pub rereads: u32,

	/// # Interrupted?
	///
	/// When `true`, everything unread is listed as unresolved and the
	/// audio buffers cover only what made it.
	pub cancelled: bool,

	/// # Per-Track Breakdown.
	pub tracks: Vec<TrackRipStats>,

	/// # All Unresolved LBAs, Disc-Wide.
	pub unresolved: Vec<i32>,

	/// # Raw P-W Stream (96 B/Sector), If Captured.
	pub sub: Option<Vec<u8>>,
}

impl SecureRipResult {
	#[must_use]
	/// # Fully Verified?
	pub fn is_perfect(&self) -> bool {
		! self.cancelled &&
		self.unresolved.is_empty() &&
		self.tracks.iter().all(|t| t.best_effort == 0 && t.unresolved == 0)
	}
}

#[derive(Debug, Clone, Default)]
/// # Per-Track Rip Statistics.
pub struct TrackRipStats {
	/// # Track Number.
	pub track: u8,

	/// # Verified Sectors.
	pub verified: u32,

	/// # Best-Effort Sectors.
	pub best_effort: u32,

	/// # Unresolved Sectors.
	pub unresolved: u32,

	/// # The Unresolved Addresses.
	pub unresolved_lbas: Vec<i32>,
}



impl<G: CdbGate> Disc<G> {
	/// # Rip the Disc, Securely.
	///
	/// Multi-pass reading with per-sector consensus, C2-guided
	/// quarantine, optional cache defeat, and read-offset correction,
	/// per the configuration. On success the model owns an
	/// offset-corrected [`TrackAudio`] buffer for every audio track.
	///
	/// The interrupt flag is polled between sectors; when it fires, the
	/// partial results come back with `cancelled` set and every unread
	/// sector listed as unresolved.
	///
	/// ## Errors
	///
	/// A vanished drive aborts outright. Ordinary per-sector read
	/// failures degrade to unresolved status instead of erroring.
	pub fn rip_secure(
		&mut self,
		cfg: &SecureRipConfig,
		drive_offset: ReadOffset,
		progress: &Progless,
		killed: &KillSwitch,
	) -> Result<SecureRipResult, SpindleError> {
		let (mmc, info) = self.engine_parts();

		let first = info.first_sector() as i32;
		let leadout = info.leadout_lba as i32;
		let total = u32::try_from(leadout - first).map_err(|_| SpindleError::RipOverflow)?;
		if total == 0 { return Err(SpindleError::InvalidInput("nothing to rip")); }

		// Accurate Stream bounds jitter in hardware; purging on top of it
		// would just be wear.
		let cache_defeat = cfg.cache_defeat() && ! mmc.accurate_stream();
		let c2 = cfg.c2_guided() && cfg.mode().c2();

		let mut engine = Engine {
			mmc,
			buf: RipBuffer::new(),
			tallies: (0..total).map(|_| SectorTally::new()).collect(),
			sub: cfg.subchannel().then(|| vec![0_u8; total as usize * CD_SUB_SIZE as usize]),
			first,
			leadout,
			cache_defeat,
			c2,
			rereads: 0,
		};

		// The sequential passes.
		let mut passes = 0;
		let mut cancelled = false;
		for pass in 1..=cfg.max_passes() {
			passes = pass;
			let _res = progress.try_reset(total);
			progress.set_title(Some(Msg::custom(
				"Ripping",
				199,
				&format!("Pass {pass} of up to {}…", cfg.max_passes()),
			)));

			cancelled = engine.run_pass(pass, cfg, progress, killed)?;
			if cancelled { break; }
			if engine.pass_done(pass, cfg) { break; }
		}

		// Isolated re-reads for whatever the passes couldn't settle.
		if c2 && ! cancelled {
			progress.set_title(Some(Msg::custom(
				"Ripping",
				199,
				"Re-reading quarantined sectors…",
			)));
			cancelled = engine.run_quarantine(cfg, killed)?;
		}

		progress.finish();

		// Assemble the disc-wide stream, correct the offset, and carve it
		// into tracks.
		let result = engine.finish(info, cfg, drive_offset, passes, cancelled)?;
		Ok(result)
	}
}



/// # The Working State.
///
/// Groups the command layer, buffers, and evidence so the pass loops
/// don't have to juggle ten million separate arguments.
struct Engine<'a, G> {
	/// # Command Layer.
	mmc: &'a mut Mmc<G>,

	/// # Read Buffer.
	buf: RipBuffer,

	/// # Evidence, One Per Sector.
	tallies: Vec<SectorTally>,

	/// # Raw Subchannel Stream, If Capturing.
	sub: Option<Vec<u8>>,

	/// # First Sector of the Rip Range.
	first: i32,

	/// # Lead-Out.
	leadout: i32,

	/// # Purge Between Re-Reads?
	cache_defeat: bool,

	/// # C2 Enabled?
	c2: bool,

	/// # Isolated Re-Read Count.
	rereads: u32,
}

impl<G: CdbGate> Engine<'_, G> {
	/// # One Sequential Pass.
	///
	/// Ascending-LBA reads across the whole range, feeding the tallies.
	/// Returns `true` if the user pulled the plug.
	///
	/// ## Errors
	///
	/// Only a vanished drive aborts; lesser failures just mark their
	/// sectors and move on.
	fn run_pass(
		&mut self,
		pass: u8,
		cfg: &SecureRipConfig,
		progress: &Progless,
		killed: &KillSwitch,
	) -> Result<bool, SpindleError> {
		// Evict stale cache so this pass re-reads the platter, not RAM.
		if self.cache_defeat && 1 < pass { self.purge(self.first); }

		let capture_sub = 1 == pass && self.sub.is_some();

		for idx in 0..self.tallies.len() {
			if killed.killed() { return Ok(true); }
			let lba = self.first + idx as i32;

			// Settled sectors don't need more attention once the minimum
			// passes are in.
			if cfg.min_passes() < pass && ! sector_needs_work(&self.tallies[idx], cfg) {
				progress.increment();
				continue;
			}

			match self.buf.read_sector(self.mmc, lba, self.c2) {
				Ok(true) => self.tallies[idx].record_good(self.buf.data()),
				Ok(false) => self.tallies[idx].record_c2(self.buf.data()),
				Err(e @ SpindleError::DeviceGone) => return Err(e),
				Err(_) => self.tallies[idx].record_error(),
			}

			// The subchannel rides along on the first pass only.
			if capture_sub {
				if let Some(sub) = self.sub.as_mut() {
					let rng = idx * CD_SUB_SIZE as usize..(idx + 1) * CD_SUB_SIZE as usize;
					let _res = self.buf.read_raw_sub(self.mmc, lba, &mut sub[rng]);
				}
			}

			progress.increment();
		}

		Ok(false)
	}

	/// # Enough Passes?
	///
	/// Burst-class modes stop after one; everything else stops once the
	/// minimum pass count is in and no sector wants more attention.
	/// (Fast's early exit falls out naturally: a spotless first pass
	/// leaves nothing wanting.)
	fn pass_done(&self, pass: u8, cfg: &SecureRipConfig) -> bool {
		match cfg.mode() {
			RipMode::Disabled | RipMode::Burst => true,
			_ =>
				cfg.min_passes() <= pass &&
				self.tallies.iter().all(|t| ! sector_needs_work(t, cfg)),
		}
	}

	/// # Quarantine Re-Reads.
	///
	/// Isolated retries for the sectors still in trouble, each preceded
	/// by a cache purge so the drive can't just repeat itself from
	/// memory. A sector graduates when its C2 clears twice in a row and
	/// its consensus verifies; it flunks out when the budget runs dry.
	///
	/// Returns `true` if interrupted.
	///
	/// ## Errors
	///
	/// Only a vanished drive aborts.
	fn run_quarantine(&mut self, cfg: &SecureRipConfig, killed: &KillSwitch)
	-> Result<bool, SpindleError> {
		for idx in 0..self.tallies.len() {
			if ! sector_needs_work(&self.tallies[idx], cfg) { continue; }
			let lba = self.first + idx as i32;

			for _ in 0..REREAD_BUDGET {
				if killed.killed() { return Ok(true); }
				if self.cache_defeat { self.purge(lba); }

				self.rereads += 1;
				match self.buf.read_sector(self.mmc, lba, self.c2) {
					Ok(true) => self.tallies[idx].record_good(self.buf.data()),
					Ok(false) => self.tallies[idx].record_c2(self.buf.data()),
					Err(e @ SpindleError::DeviceGone) => return Err(e),
					Err(_) => self.tallies[idx].record_error(),
				}

				if ! sector_needs_work(&self.tallies[idx], cfg) { break; }
			}
		}

		Ok(false)
	}

	/// # Purge the Drive Cache.
	///
	/// Read a sector far, far away — at least sixty-four mebibytes,
	/// wrapped around the disc — then ask for a flush for good measure.
	/// Failures are fine; an error'd distant read evicts just as well.
	fn purge(&mut self, around: i32) {
		let total = (self.leadout - self.first) as u32;
		let distant = self.first +
			(((around - self.first) as u32 + PURGE_DISTANCE) % total) as i32;
		let _res = self.buf.read_sector(self.mmc, distant, false);
		let _res = self.mmc.flush_cache();
	}

	/// # Wrap It Up.
	///
	/// Materialize the winning payloads into one disc-wide stream, apply
	/// the read offset across the lot, slice the tracks into the model,
	/// and tabulate the statistics.
	fn finish(
		self,
		info: &mut DiscInfo,
		cfg: &SecureRipConfig,
		drive_offset: ReadOffset,
		passes: u8,
		cancelled: bool,
	) -> Result<SecureRipResult, SpindleError> {
		let total = self.tallies.len();
		let mut stream = vec![0_u8; total * BYTES_PER_SECTOR as usize];
		for (idx, tally) in self.tallies.iter().enumerate() {
			if let Some(best) = tally.best() {
				let at = idx * BYTES_PER_SECTOR as usize;
				stream[at..at + BYTES_PER_SECTOR as usize].copy_from_slice(best);
			}
		}
		offset::shift_stream(&mut stream, drive_offset);

		// Carve out the per-track buffers. (Collect the spans first so
		// the model can be borrowed mutably after.)
		let spans: Vec<(u8, usize, usize)> = info.audio_tracks()
			.map(|t| (
				t.number,
				(t.pregap_lba as i32 - self.first) as usize,
				(t.end_lba as i32 + 1 - self.first) as usize,
			))
			.collect();
		for (number, a, b) in spans {
			let bytes = stream[a * BYTES_PER_SECTOR as usize..b * BYTES_PER_SECTOR as usize].to_vec();
			info.set_audio(number, TrackAudio::new(bytes)?);
		}

		// Statistics, track by track, then the disc-wide unresolved
		// list.
		let mut tracks = Vec::new();
		let mut unresolved = Vec::new();
		for t in info.audio_tracks() {
			let mut stats = TrackRipStats {
				track: t.number,
				..TrackRipStats::default()
			};
			for lba in t.pregap_lba..=t.end_lba {
				let idx = (lba as i32 - self.first) as usize;
				let tally = &self.tallies[idx];
				match tally.confidence(cfg.agreement()) {
					SectorConfidence::Verified => { stats.verified += 1; },
					SectorConfidence::BestEffort =>
						if sector_needs_work(tally, cfg) {
							stats.unresolved += 1;
							stats.unresolved_lbas.push(lba as i32);
						}
						else { stats.best_effort += 1; },
					SectorConfidence::Unresolved => {
						stats.unresolved += 1;
						stats.unresolved_lbas.push(lba as i32);
					},
				}
			}
			unresolved.extend_from_slice(&stats.unresolved_lbas);
			tracks.push(stats);
		}

		Ok(SecureRipResult {
			passes,
			rereads: self.rereads,
			cancelled,
			tracks,
			unresolved,
			sub: self.sub,
		})
	}
}



/// # Does This Sector Want More Attention?
///
/// The one predicate shared by the pass loop, the quarantine, and the
/// bookkeeping, so they can't disagree about what "done" means:
///
/// * An unsettled C2 cloud always needs work.
/// * Verified never does.
/// * A plurality is acceptable when the mode doesn't demand consensus,
///   or when the evidence is a spotless single read under Fast.
/// * Everything else does.
fn sector_needs_work(tally: &SectorTally, cfg: &SecureRipConfig) -> bool {
	if tally.c2_pending() { return true; }
	match tally.confidence(cfg.agreement()) {
		SectorConfidence::Verified => false,
		SectorConfidence::BestEffort => match cfg.mode() {
			RipMode::Disabled | RipMode::Burst => false,
			RipMode::Fast => ! tally.spotless(),
			_ => true,
		},
		SectorConfidence::Unresolved =>
			cfg.mode().consensus() || ! tally.touched(),
	}
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_purge_distance() {
		// The constant has to actually cover 64 MiB.
		assert!(64 * 1024 * 1024 <= PURGE_DISTANCE as u64 * BYTES_PER_SECTOR as u64);
	}
}
