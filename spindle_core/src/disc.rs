/*!
# Spindle: Disc Model
*/

use crate::{
	AccurateRipId,
	BYTES_PER_SECTOR,
	CdbGate,
	CddbId,
	CdDrive,
	CdTextInfo,
	DriveVendorModel,
	Mmc,
	SpindleError,
};
use std::{
	collections::BTreeMap,
	fmt,
	path::Path,
};
use trimothy::TrimSliceMatches;



/// # Lead-out Label.
///
/// This is used solely for the table of contents printout; e.g. 01 02 03 AA.
const CD_LEADOUT_LABEL: &str = "AA";



#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
/// # ISRC.
///
/// The twelve-character International Standard Recording Code: country,
/// registrant, year, designation. Either absent or exactly twelve
/// alphanumerics; nothing in between.
pub struct Isrc([u8; 12]);

impl fmt::Display for Isrc {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for b in self.0 { write!(f, "{}", char::from(b))?; }
		Ok(())
	}
}

impl TryFrom<&[u8]> for Isrc {
	type Error = SpindleError;
	fn try_from(mut src: &[u8]) -> Result<Self, Self::Error> {
		src = src.trim_start_matches(|b: u8| b.is_ascii_whitespace() || b == 0);
		src = src.trim_end_matches(|b: u8| b.is_ascii_whitespace() || b == 0);
		if src.len() == 12 && src.iter().all(u8::is_ascii_alphanumeric) {
			let mut out = [0_u8; 12];
			for (d, s) in out.iter_mut().zip(src) { *d = s.to_ascii_uppercase(); }
			Ok(Self(out))
		}
		else { Err(SpindleError::Isrc) }
	}
}

impl TryFrom<&str> for Isrc {
	type Error = SpindleError;
	#[inline]
	fn try_from(src: &str) -> Result<Self, Self::Error> {
		Self::try_from(src.as_bytes())
	}
}



#[derive(Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
/// # Media Catalog Number.
///
/// Thirteen digits, nominally the EAN of the release. Unlike a retail
/// barcode there is no guarantee the check digit was mastered correctly,
/// so only shape is enforced.
pub struct Mcn([u8; 13]);

impl fmt::Display for Mcn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for b in self.0 { write!(f, "{}", char::from(b))?; }
		Ok(())
	}
}

impl TryFrom<&[u8]> for Mcn {
	type Error = SpindleError;
	fn try_from(mut src: &[u8]) -> Result<Self, Self::Error> {
		src = src.trim_start_matches(|b: u8| b.is_ascii_whitespace() || b == 0);
		src = src.trim_end_matches(|b: u8| b.is_ascii_whitespace() || b == 0);

		// All zeroes means "none", not "catalog number zero".
		if src.len() == 13 && src.iter().all(u8::is_ascii_digit) && src.iter().any(|&b| b != b'0') {
			let mut out = [0_u8; 13];
			out.copy_from_slice(src);
			Ok(Self(out))
		}
		else { Err(SpindleError::Mcn) }
	}
}



#[derive(Debug, Clone, Eq, PartialEq)]
/// # A Single Track.
///
/// Boundaries are zero-based LBAs with `end_lba` inclusive. The pregap
/// (INDEX 00) runs `pregap_lba..start_lba`; when there is none the two
/// are equal.
pub struct Track {
	/// # Track Number (1-Based).
	pub number: u8,

	/// # Pregap Start.
	pub pregap_lba: u32,

	/// # Main (INDEX 01) Start.
	pub start_lba: u32,

	/// # Last User Sector (Inclusive).
	pub end_lba: u32,

	/// # Audio?
	pub is_audio: bool,

	/// # ISRC, If Read.
	pub isrc: Option<Isrc>,

	/// # Pre-Emphasis Flag.
	pub pre_emphasis: bool,

	/// # Digital Copy Permitted Flag.
	pub copy_permitted: bool,

	/// # Index List.
	///
	/// `(index number, start LBA)` pairs: index zero is the pregap, one
	/// the main body, with optional 2..=99 subdivisions after.
	pub indices: Vec<(u8, u32)>,
}

impl Track {
	#[must_use]
	/// # Total Sectors (Pregap Included).
	pub const fn sectors(&self) -> u32 { self.end_lba + 1 - self.pregap_lba }

	#[must_use]
	/// # Rip Size In Bytes.
	pub const fn rip_bytes(&self) -> u64 {
		self.sectors() as u64 * BYTES_PER_SECTOR as u64
	}

	#[must_use]
	/// # Stereo Samples (Pregap Included).
	pub const fn samples(&self) -> u64 { self.sectors() as u64 * 588 }
}



#[derive(Debug, Clone, Default, Eq, PartialEq)]
/// # Ripped Track Audio.
///
/// A contiguous, offset-corrected, interleaved-stereo PCM buffer covering
/// a track from pregap through final sector. Owned by the model once the
/// read engine hands it over; the on-disk bin becomes the system of
/// record after export.
pub struct TrackAudio(Vec<u8>);

impl TrackAudio {
	/// # New.
	///
	/// ## Errors
	///
	/// The buffer must be sector-aligned or something upstream mangled
	/// it.
	pub(crate) fn new(data: Vec<u8>) -> Result<Self, SpindleError> {
		if data.is_empty() || 0 != data.len() % BYTES_PER_SECTOR as usize {
			Err(SpindleError::Bug("track audio is not sector-aligned"))
		}
		else { Ok(Self(data)) }
	}

	#[must_use]
	/// # The Bytes.
	pub fn bytes(&self) -> &[u8] { &self.0 }

	#[must_use]
	/// # CRC32 of the Bytes.
	///
	/// The garden-variety checksum quoted in rip logs.
	pub fn crc32(&self) -> u32 { crc32fast::hash(&self.0) }

	#[must_use]
	/// # Peak Sample Magnitude.
	pub fn peak(&self) -> u16 {
		self.0.chunks_exact(2)
			.map(|pair| i16::from_le_bytes([pair[0], pair[1]]).unsigned_abs())
			.max()
			.unwrap_or(0)
	}

	#[must_use]
	/// # Root-Mean-Square Level.
	pub fn rms(&self) -> f64 {
		let mut sum = 0.0_f64;
		let mut count = 0_u64;
		for pair in self.0.chunks_exact(2) {
			let v = f64::from(i16::from_le_bytes([pair[0], pair[1]]));
			sum += v * v;
			count += 1;
		}
		if count == 0 { 0.0 }
		else { (sum / count as f64).sqrt() }
	}
}



#[derive(Debug, Clone, Default)]
/// # Disc Information.
///
/// The reconstructed model of the disc: TOC-derived boundaries, repaired
/// where the drive reported nonsense, refined by Q-subchannel scanning,
/// annotated with everything else the lead-in had to offer.
pub struct DiscInfo {
	/// # First Track Number.
	pub first: u8,

	/// # Last Track Number.
	pub last: u8,

	/// # Lead-Out LBA.
	pub leadout_lba: u32,

	/// # Number of Sessions.
	pub session_count: u8,

	/// # Selected Session.
	pub selected_session: u8,

	/// # The Tracks, In Order.
	pub tracks: Vec<Track>,

	/// # CD-Text.
	pub cdtext: CdTextInfo,

	/// # Hidden Audio Before Track One?
	pub has_hidden_track: bool,

	/// # Were Out-of-Range TOC Entries Clamped?
	pub toc_repaired: bool,

	/// # Media Catalog Number.
	pub mcn: Option<Mcn>,

	/// # Ripped Audio, By Track Number.
	pub(crate) audio: BTreeMap<u8, TrackAudio>,
}

impl DiscInfo {
	/// # Sanity-Check the Model.
	///
	/// Verify the §3 invariants: monotonic starts, pregap ≤ start ≤ end <
	/// lead-out, interior contiguity, and no zero-sector tracks.
	///
	/// ## Errors
	///
	/// Returns `InvalidInput` naming the violated rule.
	pub fn validate(&self) -> Result<(), SpindleError> {
		if self.tracks.is_empty() {
			return Err(SpindleError::InvalidInput("a disc needs at least one track"));
		}

		let mut prev_end: Option<u32> = None;
		for t in &self.tracks {
			if t.start_lba < t.pregap_lba || t.end_lba < t.start_lba {
				return Err(SpindleError::InvalidInput("track boundaries are out of order"));
			}
			if self.leadout_lba <= t.end_lba {
				return Err(SpindleError::InvalidInput("track runs past the lead-out"));
			}
			if let Some(prev) = prev_end {
				if prev + 1 != t.pregap_lba {
					return Err(SpindleError::InvalidInput("tracks are not contiguous"));
				}
			}
			prev_end = Some(t.end_lba);
		}

		Ok(())
	}

	#[must_use]
	/// # Track By Number.
	pub fn track(&self, number: u8) -> Option<&Track> {
		self.tracks.iter().find(|t| t.number == number)
	}

	/// # Audio Tracks.
	pub fn audio_tracks(&self) -> impl Iterator<Item = &Track> {
		self.tracks.iter().filter(|t| t.is_audio)
	}

	#[must_use]
	/// # First Rippable Sector.
	///
	/// The first audio track's pregap, which is LBA zero whenever hidden
	/// audio was found.
	pub fn first_sector(&self) -> u32 {
		self.audio_tracks().next().map_or(0, |t| t.pregap_lba)
	}

	#[must_use]
	/// # Total Rip Sectors.
	pub fn rip_sectors(&self) -> u32 {
		self.leadout_lba - self.first_sector()
	}

	#[must_use]
	/// # First/Last Audio Positions.
	///
	/// AccurateRip's edge rule needs to know whether a track sits at
	/// either end of the audio program.
	pub fn audio_position(&self, number: u8) -> (bool, bool) {
		let first = self.audio_tracks().next().map(|t| t.number);
		let last = self.audio_tracks().last().map(|t| t.number);
		(first == Some(number), last == Some(number))
	}

	#[must_use]
	/// # AccurateRip Disc ID.
	pub fn accuraterip_id(&self) -> AccurateRipId { AccurateRipId::from(self) }

	#[must_use]
	/// # CDDB/FreeDB Disc ID.
	pub fn cddb_id(&self) -> CddbId { CddbId::from(self) }
}

/// # Ripped Audio.
impl DiscInfo {
	/// # Install a Track's Audio.
	pub(crate) fn set_audio(&mut self, number: u8, audio: TrackAudio) {
		self.audio.insert(number, audio);
	}

	#[must_use]
	/// # A Track's Audio, If Ripped.
	pub fn audio(&self, number: u8) -> Option<&TrackAudio> {
		self.audio.get(&number)
	}

	#[must_use]
	/// # Any Audio At All?
	pub fn has_audio(&self) -> bool { ! self.audio.is_empty() }
}

impl fmt::Display for DiscInfo {
	/// # Summarize the Disc.
	///
	/// This prints the disc identifiers and table of contents-type
	/// information in a nice little table.
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		const DIVIDER: &str = "\x1b[2m----------------------------------------\x1b[0m\n";

		// A few key/value pairs.
		let mut kv: Vec<(&str, u8, String)> = vec![
			("AccurateRip:", 4, self.accuraterip_id().to_string()),
			("CDDB:", 4, self.cddb_id().to_string()),
		];
		if let Some(mcn) = self.mcn.as_ref() {
			kv.push(("MCN:", 199, mcn.to_string()));
		}
		if ! self.cdtext.album_title.is_empty() {
			kv.push(("Album:", 199, self.cdtext.album_title.clone()));
		}
		if ! self.cdtext.album_artist.is_empty() {
			kv.push(("Artist:", 199, self.cdtext.album_artist.clone()));
		}

		let col_max: usize = kv.iter().map(|(k, _, _)| k.len()).max().unwrap_or(0);
		for (k, color, v) in kv {
			writeln!(f, "\x1b[1;38;5;{color}m{k:col_max$}\x1b[0m {v}")?;
		}

		// Start the table of contents.
		let any_isrc = self.tracks.iter().any(|t| t.isrc.is_some());
		write!(
			f,
			"\n\x1b[2m##  PREGAP   FIRST    LAST          {}\x1b[0m\n",
			if any_isrc { "ISRC" } else { "" },
		)?;
		f.write_str(DIVIDER)?;

		if self.has_hidden_track {
			writeln!(f, "\x1b[2m00       0                    HIDDEN TRACK\x1b[0m")?;
		}

		for t in &self.tracks {
			if t.is_audio {
				let isrc = t.isrc.map(|i| i.to_string()).unwrap_or_default();
				writeln!(
					f,
					"{:02}  {:>6}  {:>6}  {:>6}  {isrc:>12}",
					t.number,
					t.pregap_lba,
					t.start_lba,
					t.end_lba,
				)?;
			}
			else {
				writeln!(
					f,
					"\x1b[2m{:02}  {:>6}                    DATA TRACK\x1b[0m",
					t.number,
					t.start_lba,
				)?;
			}
		}

		// The leadout.
		writeln!(
			f,
			"\x1b[2m{CD_LEADOUT_LABEL}  {:>6}                      LEAD-OUT",
			self.leadout_lba,
		)?;

		// Close it off!
		f.write_str(DIVIDER)?;
		if self.toc_repaired {
			writeln!(f, "\x1b[93mNote:\x1b[0m out-of-range TOC entries were repaired.")?;
		}
		writeln!(f)
	}
}



#[derive(Debug)]
/// # A Loaded Disc.
///
/// The drive connection and the parsed model, glued together so the
/// engines can borrow both at once without aliasing headaches.
pub struct Disc<G> {
	/// # The Command Layer.
	mmc: Mmc<G>,

	/// # The Model.
	info: DiscInfo,

	/// # Drive Identification.
	vendor_model: Option<DriveVendorModel>,
}

impl Disc<CdDrive> {
	/// # Open and Scan.
	///
	/// Connect to the given device (or the default drive), confirm a
	/// usable disc is present, and parse the whole model: TOC, sessions,
	/// pregaps, hidden tracks, ISRCs, MCN, CD-Text.
	///
	/// ## Errors
	///
	/// This will return an error if there's a problem communicating with
	/// the drive, the disc is unsupported, etc.
	pub fn open<P>(dev: Option<P>) -> Result<Self, SpindleError>
	where P: AsRef<Path> {
		let drive = CdDrive::open(dev)?;
		let vendor_model = drive.vendor_model();
		let mut mmc = Mmc::new(drive);
		let info = crate::toc::read_disc_info(&mut mmc)?;
		Ok(Self { mmc, info, vendor_model })
	}
}

impl<G: CdbGate> Disc<G> {
	/// # From a Bare Gate.
	///
	/// Same as [`Disc::open`], but over an arbitrary transport. This is
	/// how the test suite swaps in a simulated drive.
	///
	/// ## Errors
	///
	/// Relays scan errors.
	pub fn from_gate(gate: G) -> Result<Self, SpindleError> {
		let mut mmc = Mmc::new(gate);
		let info = crate::toc::read_disc_info(&mut mmc)?;
		Ok(Self { mmc, info, vendor_model: None })
	}

	#[must_use]
	/// # The Model.
	pub const fn info(&self) -> &DiscInfo { &self.info }

	#[must_use]
	/// # Drive Vendor and Model.
	pub const fn drive_vendor_model(&self) -> Option<DriveVendorModel> {
		self.vendor_model
	}

	/// # Split Borrows.
	///
	/// The read engine wants the command layer and an exclusive borrow of
	/// the model at the same time; hand both over.
	pub(crate) fn engine_parts(&mut self) -> (&mut Mmc<G>, &mut DiscInfo) {
		(&mut self.mmc, &mut self.info)
	}

	#[must_use]
	/// # Command Layer.
	pub(crate) fn mmc_mut(&mut self) -> &mut Mmc<G> { &mut self.mmc }
}



#[cfg(test)]
pub(crate) mod test {
	use super::*;

	/// # Scenario Disc.
	///
	/// The canonical three-track disc: 150/7500/15000, lead-out 22500.
	pub(crate) fn three_track() -> DiscInfo {
		let mk = |number: u8, pregap: u32, start: u32, end: u32| Track {
			number,
			pregap_lba: pregap,
			start_lba: start,
			end_lba: end,
			is_audio: true,
			isrc: None,
			pre_emphasis: false,
			copy_permitted: false,
			indices: vec![(0, pregap), (1, start)],
		};
		DiscInfo {
			first: 1,
			last: 3,
			leadout_lba: 22_500,
			session_count: 1,
			selected_session: 1,
			tracks: vec![
				mk(1, 0, 150, 7_499),
				mk(2, 7_500, 7_500, 14_999),
				mk(3, 15_000, 15_000, 22_499),
			],
			..DiscInfo::default()
		}
	}

	#[test]
	fn t_isrc() {
		let isrc = Isrc::try_from("usrc17607839").expect("ISRC failed.");
		assert_eq!(isrc.to_string(), "USRC17607839");

		assert!(Isrc::try_from("").is_err());
		assert!(Isrc::try_from("USRC1760783").is_err());   // Eleven.
		assert!(Isrc::try_from("USRC17607839X").is_err()); // Thirteen.
		assert!(Isrc::try_from("USRC17607-39").is_err());  // Punctuation.
	}

	#[test]
	fn t_mcn() {
		let mcn = Mcn::try_from(b"0731455829921".as_slice()).expect("MCN failed.");
		assert_eq!(mcn.to_string(), "0731455829921");

		assert!(Mcn::try_from(b"0000000000000".as_slice()).is_err(), "All-zero MCN means none.");
		assert!(Mcn::try_from(b"12345".as_slice()).is_err());
		assert!(Mcn::try_from(b"073145582992A".as_slice()).is_err());
	}

	#[test]
	fn t_validate() {
		let mut info = three_track();
		info.validate().expect("The canonical disc should validate.");

		// Scenario sanity: totals.
		assert_eq!(info.rip_sectors(), 22_500);
		assert_eq!(
			info.tracks.iter().map(Track::rip_bytes).sum::<u64>(),
			52_920_000,
		);

		// A zero-sector track is rejected.
		info.tracks[1].end_lba = info.tracks[1].start_lba - 1;
		assert!(info.validate().is_err());

		// A single-sector track is accepted.
		let mut info = three_track();
		info.tracks[2].end_lba = 22_499;
		info.tracks[2].start_lba = 22_499;
		info.tracks[2].pregap_lba = 22_499;
		info.tracks[1].end_lba = 22_498;
		info.validate().expect("A one-sector track is legal.");

		// Overshooting the leadout is not.
		let mut info = three_track();
		info.tracks[2].end_lba = 30_000;
		assert!(info.validate().is_err());
	}

	#[test]
	fn t_track_audio() {
		assert!(TrackAudio::new(vec![0; 2352]).is_ok());
		assert!(TrackAudio::new(vec![0; 2351]).is_err());
		assert!(TrackAudio::new(Vec::new()).is_err());
	}
}
