/*!
# Spindle: DAO-96 Write Pipeline
*/

use crate::{
	BYTES_PER_SECTOR,
	CD_SUB_SIZE,
	CD_DATA_SUB_SIZE,
	CD_LEADIN,
	CdbGate,
	cdtext::{
		CdTextInfo,
		encode_packs,
	},
	image::DiscImage,
	KillSwitch,
	Mmc,
	Msf,
	SpindleError,
	subq,
};
use fyi_msg::{
	Msg,
	Progless,
};
use std::{
	fs::File,
	io::Read,
	thread::sleep,
	time::Duration,
};



/// # Sectors Per WRITE CDB.
const WRITE_CHUNK: u16 = 16;

/// # Buffer Occupancy Floor.
///
/// Below this the drive is starving; push harder.
const BUFFER_LOW: f32 = 0.40;

/// # Buffer Occupancy Ceiling.
///
/// Above this the drive is drowning; back off before it underruns
/// something else.
const BUFFER_HIGH: f32 = 0.80;

/// # Backoff Nap When the Buffer Is Full.
const BUFFER_NAP: Duration = Duration::from_millis(50);

/// # Sub-Form Nibble: Raw Interleaved P-W.
const SUBFORM_RAW: u8 = 0xC0;

/// # Sub-Form Nibble: Packed (Channel-Major) P-W.
const SUBFORM_PACKED: u8 = 0x40;



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Burn State.
///
/// The pipeline only ever moves forward; any transport failure drops it
/// into `Failed`, at which point the media should be considered
/// indeterminate.
pub enum BurnState {
	#[default]
	/// # Nothing Has Happened.
	Idle,

	/// # Media Checked Out.
	MediaInspected,

	/// # Media Erased.
	Blanked,

	/// # Cue Sheet Accepted.
	CueLoaded,

	/// # Lead-In Underway.
	LeadInWritten,

	/// # Program Data Flowing.
	TracksWriting,

	/// # Program Complete.
	LeadOutWritten,

	/// # Session Closed; Done.
	Closed,

	/// # Something Broke.
	///
	/// The disc may be partially written; treat it as scrap until
	/// proven otherwise.
	Failed,
}

impl BurnState {
	#[must_use]
	/// # As Str.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Idle => "idle",
			Self::MediaInspected => "media inspected",
			Self::Blanked => "blanked",
			Self::CueLoaded => "cue loaded",
			Self::LeadInWritten => "lead-in written",
			Self::TracksWriting => "writing tracks",
			Self::LeadOutWritten => "lead-out written",
			Self::Closed => "closed",
			Self::Failed => "FAILED (media indeterminate)",
		}
	}
}



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Blank Flavor.
pub enum BlankKind {
	/// # The Whole Surface.
	Full,

	/// # Just the Bookkeeping.
	Quick,
}

#[derive(Debug, Clone, Copy)]
/// # Burn Configuration.
pub struct BurnConfig {
	/// # Write Speed (kB/s; Zero = Drive Default).
	speed: u16,

	/// # Run Power Calibration First?
	calibrate: bool,

	/// # Blank First?
	blank: Option<BlankKind>,
}

impl Default for BurnConfig {
	fn default() -> Self {
		Self {
			speed: 0,
			calibrate: true,
			blank: None,
		}
	}
}

impl BurnConfig {
	#[must_use]
	/// # With Write Speed.
	///
	/// The value is a CD speed rating (1×, 4×, etc.); zero leaves the
	/// drive to its own judgment.
	pub const fn with_speed(self, rating: u16) -> Self {
		Self {
			speed: rating.saturating_mul(176),
			..self
		}
	}

	#[must_use]
	/// # With Power Calibration.
	pub const fn with_calibration(self, calibrate: bool) -> Self {
		Self {
			calibrate,
			..self
		}
	}

	#[must_use]
	/// # With a Blank First.
	pub const fn with_blank(self, blank: Option<BlankKind>) -> Self {
		Self {
			blank,
			..self
		}
	}
}



#[derive(Debug)]
/// # The Burner.
///
/// Drives a prepared bin/cue(/sub) set onto CD-R/RW in raw DAO-96 mode:
/// inspect, (maybe) blank, calibrate, cue, burn, close.
pub struct Burner<'a, G> {
	/// # Command Layer.
	mmc: &'a mut Mmc<G>,

	/// # The Image.
	image: DiscImage,

	/// # Configuration.
	cfg: BurnConfig,

	/// # Where Things Stand.
	state: BurnState,
}

impl<'a, G: CdbGate> Burner<'a, G> {
	#[must_use]
	/// # New.
	pub fn new(mmc: &'a mut Mmc<G>, image: DiscImage, cfg: BurnConfig) -> Self {
		Self {
			mmc,
			image,
			cfg,
			state: BurnState::Idle,
		}
	}

	#[must_use]
	/// # Current State.
	pub const fn state(&self) -> BurnState { self.state }

	/// # Do the Whole Thing.
	///
	/// ## Errors
	///
	/// Fail-fast: any non-retryable error after the first written sector
	/// terminates the burn and leaves the state `Failed`. Cancellation
	/// issues STOP UNIT and reports the media as indeterminate via the
	/// same state.
	pub fn run(&mut self, progress: &Progless, killed: &KillSwitch)
	-> Result<(), SpindleError> {
		match self.run_inner(progress, killed) {
			Ok(()) => Ok(()),
			Err(e) => {
				self.state = BurnState::Failed;
				// Try to stop the spindle cleanly; nothing to be done if
				// even that fails.
				let _res = self.mmc.stop_unit();
				let _res = self.mmc.prevent_removal(false);
				Err(e)
			},
		}
	}

	/// # The Happy Path.
	fn run_inner(&mut self, progress: &Progless, killed: &KillSwitch)
	-> Result<(), SpindleError> {
		// Is this even possible?
		self.mmc.test_unit_ready()?;
		if ! self.mmc.can_write_dao() {
			return Err(SpindleError::FeatureUnsupported("raw DAO writing"));
		}
		let (is_blank, erasable) = self.mmc.disc_writability()?;
		if ! is_blank && ! erasable {
			return Err(SpindleError::MediaNotWritable);
		}
		self.state = BurnState::MediaInspected;

		// Blank when asked, or when a full rewritable leaves no choice.
		let blank = self.cfg.blank.or_else(|| (! is_blank).then_some(BlankKind::Quick));
		if let Some(kind) = blank {
			if ! erasable { return Err(SpindleError::MediaNotWritable); }
			progress.set_title(Some(Msg::custom("Burning", 199, "Blanking the disc…")));
			self.mmc.blank(matches!(kind, BlankKind::Quick))?;
			self.state = BurnState::Blanked;
		}

		// Housekeeping: lock the tray, pick the speed, calibrate.
		self.mmc.prevent_removal(true)?;
		let _res = self.mmc.set_speed(0, self.cfg.speed);
		if self.cfg.calibrate {
			progress.set_title(Some(Msg::custom("Burning", 199, "Calibrating laser power…")));
			match self.mmc.send_opc() {
				// Plenty of drives calibrate on their own and refuse the
				// explicit ask; that's fine.
				Ok(()) | Err(SpindleError::FeatureUnsupported(_)) => {},
				Err(e) => return Err(e),
			}
		}

		// The cue sheet.
		let raw_sub = self.image.sub.is_some();
		let sheet = build_cue_payload(&self.image, raw_sub);
		self.mmc.send_cue_sheet(&sheet)?;
		self.state = BurnState::CueLoaded;

		// CD-Text rides in at the lead-in boundary when there's any to
		// send; a refusal costs the text, not the burn.
		let packs = cdtext_packs(&self.image);
		if ! packs.is_empty() {
			let _res = self.mmc.send_cue_sheet(&packs)
				.or_else(|_| self.mmc.write_buffer(&packs));
		}
		self.state = BurnState::LeadInWritten;

		// And… burn.
		self.write_program(progress, killed, raw_sub)?;
		self.state = BurnState::LeadOutWritten;

		progress.set_title(Some(Msg::custom("Burning", 199, "Closing the session…")));
		self.mmc.flush_cache()?;
		self.mmc.close_session()?;
		self.state = BurnState::Closed;

		let _res = self.mmc.prevent_removal(false);
		progress.finish();
		Ok(())
	}

	/// # Stream the Program Data.
	///
	/// The host supplies everything from the mandatory two-second
	/// pregap at `-150` through the final sector, 2448 bytes at a time
	/// (2352 audio + 96 subchannel), paced to keep the drive's buffer
	/// between 40% and 80% full.
	fn write_program(&mut self, progress: &Progless, killed: &KillSwitch, raw_sub: bool)
	-> Result<(), SpindleError> {
		let sectors = self.image.sectors;
		let _res = progress.try_reset(sectors + CD_LEADIN);
		progress.set_title(Some(Msg::custom("Burning", 199, "Writing tracks…")));
		self.state = BurnState::TracksWriting;

		let mut bin = File::open(&self.image.bin)
			.map_err(|_| SpindleError::Io(self.image.bin.to_string_lossy().into_owned()))?;
		let mut sub = match self.image.sub.as_ref() {
			Some(p) => Some(
				File::open(p).map_err(|_| SpindleError::Io(p.to_string_lossy().into_owned()))?
			),
			None => None,
		};

		let mut block = vec![0_u8; usize::from(WRITE_CHUNK) * CD_DATA_SUB_SIZE as usize];
		let mut lba: i32 = -(CD_LEADIN as i32);
		let end = sectors as i32;

		while lba < end {
			if killed.killed() { return Err(SpindleError::Cancelled); }
			self.pace();

			let count = WRITE_CHUNK.min((end - lba) as u16);
			for k in 0..usize::from(count) {
				let sector = lba + k as i32;
				let chunk = &mut block[k * CD_DATA_SUB_SIZE as usize..(k + 1) * CD_DATA_SUB_SIZE as usize];
				self.fill_sector(sector, chunk, &mut bin, sub.as_mut(), raw_sub)?;
			}

			self.mmc.write_sectors(lba, count, &block[..usize::from(count) * CD_DATA_SUB_SIZE as usize])?;
			lba += i32::from(count);
			progress.increment_n(u32::from(count));
		}

		Ok(())
	}

	/// # Fill One 2448-Byte Block.
	///
	/// Sectors before zero are the synthesized pregap: silence with
	/// freshly minted subchannel. Everything else streams from the bin,
	/// with subchannel either copied from the `.sub` or likewise
	/// synthesized from the cue layout.
	fn fill_sector(
		&self,
		lba: i32,
		chunk: &mut [u8],
		bin: &mut File,
		sub: Option<&mut File>,
		raw_sub: bool,
	) -> Result<(), SpindleError> {
		let (data, subchunk) = chunk.split_at_mut(BYTES_PER_SECTOR as usize);

		if lba < 0 {
			data.fill(0);
			let q = subq::q_frame(0, 1, 0, (lba + CD_LEADIN as i32) as u32, lba);
			subchunk.copy_from_slice(&subq::interleave_pw(&q, true));
			return Ok(());
		}

		bin.read_exact(data)
			.map_err(|_| SpindleError::Io(self.image.bin.to_string_lossy().into_owned()))?;

		if let Some(sub) = sub {
			sub.read_exact(subchunk)
				.map_err(|_| SpindleError::Io("subchannel file".to_owned()))?;
		}
		else {
			// Locate the sector within the cue layout to mint its Q.
			let (track, index, rel) = self.locate(lba as u32);
			let q = subq::q_frame(0, track, index, rel, lba);
			let pw =
				if raw_sub { subq::interleave_pw(&q, index == 0) }
				else { subq::deinterleaved_pw(&q, index == 0) };
			subchunk.copy_from_slice(&pw);
		}

		Ok(())
	}

	/// # Which Track/Index Owns a Bin Sector?
	///
	/// Returns `(track number, index, track-relative sector)`.
	fn locate(&self, sector: u32) -> (u8, u8, u32) {
		let tracks = &self.image.sheet.tracks;
		for t in tracks.iter().rev() {
			let first = t.first_sector();
			if first <= sector {
				let main = t.index1.to_sectors();
				let index = u8::from(main <= sector);
				let rel =
					if main <= sector { sector - main }
					// Pregap relative time counts down on real discs,
					// but zero-based distance serves synthesized frames.
					else { main - sector };
				return (t.number, index, rel);
			}
		}
		(tracks.first().map_or(1, |t| t.number), 0, sector)
	}

	/// # Mind the Buffer.
	///
	/// Hysteresis pacing: once occupancy climbs past the high-water mark,
	/// nap until it drains back to the low one, keeping the drive inside
	/// the 40–80% band. A drive that won't report capacity gets written
	/// to blind.
	fn pace(&mut self) {
		let occupancy = |mmc: &mut Mmc<G>| -> Option<f32> {
			let (total, blank) = mmc.read_buffer_capacity().ok()?;
			if total == 0 { None }
			else { Some(1.0 - blank as f32 / total as f32) }
		};

		let Some(occ) = occupancy(self.mmc) else { return; };
		if occ < BUFFER_HIGH { return; }

		for _ in 0..600 {
			sleep(BUFFER_NAP);
			match occupancy(self.mmc) {
				Some(occ) if BUFFER_LOW < occ => {},
				_ => break,
			}
		}
	}
}



/// # Build the SEND CUE SHEET Payload.
///
/// One eight-byte entry per boundary: lead-in, each track's INDEX 00/01,
/// lead-out. Control flags ride the top nibble of the first byte; the
/// data form selects raw or packed subchannel per the presence of a
/// `.sub`.
fn build_cue_payload(image: &DiscImage, raw_sub: bool) -> Vec<u8> {
	let sub_form = if raw_sub { SUBFORM_RAW } else { SUBFORM_PACKED };
	let mut out = Vec::new();

	// Lead-in: track zero, at the very beginning.
	push_cue_entry(&mut out, 0x01, 0, 0, sub_form, Msf { m: 0, s: 0, f: 0 });

	for (k, t) in image.sheet.tracks.iter().enumerate() {
		let mut control = 0_u8;
		if t.pre_emphasis { control |= 0b0001; }
		if t.copy_permitted { control |= 0b0010; }
		let ctl_adr = (control << 4) | 0x01;

		// The first track's pregap always reaches back to absolute zero.
		let index0 =
			if k == 0 { Msf { m: 0, s: 0, f: 0 } }
			else if let Some(i0) = t.index0 { abs_msf(i0.to_sectors()) }
			else { abs_msf(t.index1.to_sectors()) };
		push_cue_entry(&mut out, ctl_adr, t.number, 0, sub_form, index0);
		push_cue_entry(&mut out, ctl_adr, t.number, 1, sub_form, abs_msf(t.index1.to_sectors()));
	}

	// Lead-out.
	push_cue_entry(&mut out, 0x01, 0xAA, 1, sub_form, abs_msf(image.sectors));

	out
}

/// # One Cue Entry.
fn push_cue_entry(out: &mut Vec<u8>, ctl_adr: u8, tno: u8, index: u8, form: u8, msf: Msf) {
	out.extend_from_slice(&[
		ctl_adr,
		tno,
		index,
		form,
		0, // SCMS.
		msf.m,
		msf.s,
		msf.f,
	]);
}

/// # Bin Sector to Absolute MSF.
///
/// The bin starts at LBA zero; absolute disc time starts 150 frames
/// earlier.
const fn abs_msf(sector: u32) -> Msf {
	Msf::from_lba(sector as i32)
}

/// # CD-Text Packs From the Cue.
fn cdtext_packs(image: &DiscImage) -> Vec<u8> {
	let sheet = &image.sheet;
	let ntracks = sheet.tracks.len();
	let mut info = CdTextInfo {
		album_title: sheet.title.clone().unwrap_or_default(),
		album_artist: sheet.performer.clone().unwrap_or_default(),
		track_titles: vec![String::new(); ntracks],
		track_artists: vec![String::new(); ntracks],
	};
	for (k, t) in sheet.tracks.iter().enumerate() {
		if let Some(v) = t.title.as_deref() { info.track_titles[k] = v.to_owned(); }
		if let Some(v) = t.performer.as_deref() { info.track_artists[k] = v.to_owned(); }
	}

	if info.is_empty() { Vec::new() }
	else { encode_packs(&info) }
}



#[cfg(test)]
mod test {
	use super::*;
	use crate::image::{
		CueSheet,
		CueTrack,
	};
	use std::path::PathBuf;

	/// # An Image Without Files.
	///
	/// Cue-payload building only looks at the sheet and sector count, so
	/// the paths can be fictional.
	fn fake_image() -> DiscImage {
		DiscImage {
			bin: PathBuf::from("x.bin"),
			cue: PathBuf::from("x.cue"),
			sub: None,
			sheet: CueSheet {
				file: "x.bin".to_owned(),
				title: None,
				performer: None,
				rem: Vec::new(),
				tracks: vec![
					CueTrack {
						number: 1,
						index1: Msf { m: 0, s: 0, f: 0 },
						..CueTrack::default()
					},
					CueTrack {
						number: 2,
						pre_emphasis: true,
						index0: Some(Msf { m: 0, s: 58, f: 0 }),
						index1: Msf { m: 1, s: 0, f: 0 },
						..CueTrack::default()
					},
				],
			},
			sectors: 9_000,
		}
	}

	#[test]
	fn t_cue_payload() {
		let image = fake_image();
		let sheet = build_cue_payload(&image, false);

		// Lead-in + 2×2 track entries + lead-out, eight bytes apiece.
		assert_eq!(sheet.len(), 6 * 8);

		// Lead-in first.
		assert_eq!(&sheet[..8], &[0x01, 0, 0, SUBFORM_PACKED, 0, 0, 0, 0]);

		// Track one: INDEX 00 at absolute zero, INDEX 01 at 00:02:00.
		assert_eq!(&sheet[8..16], &[0x01, 1, 0, SUBFORM_PACKED, 0, 0, 0, 0]);
		assert_eq!(&sheet[16..24], &[0x01, 1, 1, SUBFORM_PACKED, 0, 0, 2, 0]);

		// Track two carries its pre-emphasis bit and pregap.
		assert_eq!(&sheet[24..32], &[0x11, 2, 0, SUBFORM_PACKED, 0, 1, 0, 0]);
		assert_eq!(&sheet[32..40], &[0x11, 2, 1, SUBFORM_PACKED, 0, 1, 2, 0]);

		// Lead-out at bin end + the 150-frame skew.
		assert_eq!(&sheet[40..], &[0x01, 0xAA, 1, SUBFORM_PACKED, 0, 2, 2, 0]);

		// A sub file flips every entry to the raw form.
		let mut image = fake_image();
		image.sub = Some(PathBuf::from("x.sub"));
		let sheet = build_cue_payload(&image, true);
		assert!(sheet.chunks_exact(8).all(|e| e[3] == SUBFORM_RAW));
	}

	#[test]
	fn t_locate() {
		let image = fake_image();
		let mut mmc = crate::Mmc::new(crate::sim::SimDrive::default());
		let mmc_less = Burner {
			mmc: &mut mmc,
			image,
			cfg: BurnConfig::default(),
			state: BurnState::Idle,
		};

		// Sector zero belongs to track one's main body.
		assert_eq!(mmc_less.locate(0), (1, 1, 0));

		// 00:58:00 relative = sector 4350: track two's pregap.
		assert_eq!(mmc_less.locate(4_350), (2, 0, 150));

		// 01:00:00 relative = sector 4500: track two proper.
		assert_eq!(mmc_less.locate(4_500), (2, 1, 0));
		assert_eq!(mmc_less.locate(8_999), (2, 1, 4_499));
	}
}
