/*!
# Spindle: Disc Images
*/

use crate::{
	accuraterip,
	BYTES_PER_SECTOR,
	CD_SUB_SIZE,
	CdbGate,
	Disc,
	disc::Isrc,
	DiscInfo,
	Msf,
	ReadOffset,
	rip::{
		log::{
			RipLogContext,
			write_rip_log,
			write_secure_log,
		},
		opts::SecureRipConfig,
		SecureRipResult,
	},
	SpindleError,
};
use crate::accuraterip::ArVerdict;
use std::{
	fmt::Write as _,
	io::Write,
	path::{
		Path,
		PathBuf,
	},
	time::Duration,
};
use tempfile::NamedTempFile;



#[derive(Debug)]
/// # Atomic File Writer.
///
/// Content is streamed to a sibling tempfile first and only renamed over
/// the real destination once everything has been written, so a crash
/// mid-write can't leave a half-baked file wearing the right name.
pub(crate) struct AtomicWriter {
	/// # The Scratch File.
	tmp: NamedTempFile,

	/// # The Real Destination.
	dst: PathBuf,
}

impl AtomicWriter {
	/// # New.
	///
	/// ## Errors
	///
	/// Returns an error if the parent directory is unusable.
	pub(crate) fn new(dst: &Path) -> Result<Self, SpindleError> {
		let parent = dst.parent().filter(|p| ! p.as_os_str().is_empty());
		let tmp = match parent {
			Some(p) => {
				if ! p.is_dir() {
					std::fs::create_dir_all(p)
						.map_err(|_| SpindleError::Write(p.to_string_lossy().into_owned()))?;
				}
				NamedTempFile::new_in(p)
			},
			None => NamedTempFile::new(),
		}
			.map_err(|_| SpindleError::Write(dst.to_string_lossy().into_owned()))?;

		Ok(Self { tmp, dst: dst.to_path_buf() })
	}

	/// # The Writer.
	pub(crate) fn writer(&mut self) -> &mut std::fs::File { self.tmp.as_file_mut() }

	/// # Seal It.
	///
	/// ## Errors
	///
	/// Returns an error if the rename fails.
	pub(crate) fn finish(self) -> Result<(), SpindleError> {
		let Self { tmp, dst } = self;
		tmp.persist(&dst)
			.map(|_| ())
			.map_err(|_| SpindleError::Write(dst.to_string_lossy().into_owned()))
	}
}



#[derive(Debug, Clone, Default, Eq, PartialEq)]
/// # One Cue Track.
///
/// Index timecodes are relative to the start of the bin, per the format.
pub struct CueTrack {
	/// # Track Number.
	pub number: u8,

	/// # Title, If Any.
	pub title: Option<String>,

	/// # Performer, If Any.
	pub performer: Option<String>,

	/// # Pre-Emphasis Flag.
	pub pre_emphasis: bool,

	/// # Digital-Copy-Permitted Flag.
	pub copy_permitted: bool,

	/// # ISRC, If Known.
	pub isrc: Option<Isrc>,

	/// # INDEX 00 (Pregap), If Any.
	pub index0: Option<Msf>,

	/// # INDEX 01 (Main).
	pub index1: Msf,

	/// # INDEX 02..=99, If Any.
	pub extras: Vec<(u8, Msf)>,
}

impl CueTrack {
	#[must_use]
	/// # Where the Track's Region Begins.
	pub fn first_sector(&self) -> u32 {
		self.index0.unwrap_or(self.index1).to_sectors()
	}
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
/// # A Cue Sheet.
pub struct CueSheet {
	/// # The Bin File Name.
	pub file: String,

	/// # Album Title.
	pub title: Option<String>,

	/// # Album Performer.
	pub performer: Option<String>,

	/// # REM Lines.
	pub rem: Vec<String>,

	/// # The Tracks.
	pub tracks: Vec<CueTrack>,
}

impl CueSheet {
	/// # Parse.
	///
	/// Strictly audio cues: `FILE … BINARY` plus `TRACK NN AUDIO`
	/// entries. Anything else — data tracks, missing indexes, unreadable
	/// timecodes — errors with the offending line number.
	///
	/// ## Errors
	///
	/// Returns `CueParse` with the (1-based) line that broke.
	pub fn parse(src: &str) -> Result<Self, SpindleError> {
		let mut out = Self::default();
		let mut current: Option<CueTrack> = None;

		for (k, line) in src.lines().enumerate() {
			let line_no = k as u32 + 1;
			let line = line.trim();
			if line.is_empty() { continue; }

			let (word, rest) = line.split_once(char::is_whitespace)
				.map_or((line, ""), |(a, b)| (a, b.trim()));

			match word {
				"REM" => if current.is_none() { out.rem.push(rest.to_owned()); },
				"FILE" => {
					let (name, kind) = split_quoted(rest);
					if kind.trim() != "BINARY" || name.is_empty() {
						return Err(SpindleError::CueParse(line_no));
					}
					out.file = name;
				},
				"TRACK" => {
					let (num, kind) = rest.split_once(char::is_whitespace)
						.ok_or(SpindleError::CueParse(line_no))?;
					if kind.trim() != "AUDIO" {
						return Err(SpindleError::CueParse(line_no));
					}
					let number: u8 = num.parse()
						.ok()
						.filter(|n| (1..=99).contains(n))
						.ok_or(SpindleError::CueParse(line_no))?;

					if let Some(prev) = current.take() { out.tracks.push(prev); }
					current.replace(CueTrack {
						number,
						..CueTrack::default()
					});
				},
				"TITLE" => {
					let (v, _) = split_quoted(rest);
					match current.as_mut() {
						Some(t) => { t.title.replace(v); },
						None => { out.title.replace(v); },
					}
				},
				"PERFORMER" => {
					let (v, _) = split_quoted(rest);
					match current.as_mut() {
						Some(t) => { t.performer.replace(v); },
						None => { out.performer.replace(v); },
					}
				},
				"FLAGS" => {
					let t = current.as_mut().ok_or(SpindleError::CueParse(line_no))?;
					for f in rest.split_whitespace() {
						match f {
							"DCP" => { t.copy_permitted = true; },
							"PRE" => { t.pre_emphasis = true; },
							// 4CH/SCMS and friends aren't ours to judge.
							_ => {},
						}
					}
				},
				"ISRC" => {
					let t = current.as_mut().ok_or(SpindleError::CueParse(line_no))?;
					t.isrc.replace(
						Isrc::try_from(rest).map_err(|_| SpindleError::CueParse(line_no))?
					);
				},
				"INDEX" => {
					let t = current.as_mut().ok_or(SpindleError::CueParse(line_no))?;
					let (num, time) = rest.split_once(char::is_whitespace)
						.ok_or(SpindleError::CueParse(line_no))?;
					let num: u8 = num.parse().map_err(|_| SpindleError::CueParse(line_no))?;
					let time = parse_msf(time.trim()).ok_or(SpindleError::CueParse(line_no))?;
					match num {
						0 => { t.index0.replace(time); },
						1 => { t.index1 = time; },
						2..=99 => t.extras.push((num, time)),
						_ => return Err(SpindleError::CueParse(line_no)),
					}
				},
				_ => return Err(SpindleError::CueParse(line_no)),
			}
		}

		if let Some(prev) = current.take() { out.tracks.push(prev); }
		if out.file.is_empty() || out.tracks.is_empty() {
			return Err(SpindleError::CueParse(0));
		}
		Ok(out)
	}

	#[must_use]
	/// # Emit.
	///
	/// Render the sheet back to text. Parsing the output reproduces the
	/// sheet exactly; the formatting (indentation, quoting) is canonical.
	pub fn emit(&self) -> String {
		let mut out = String::new();

		for rem in &self.rem {
			let _res = writeln!(out, "REM {rem}");
		}
		if let Some(v) = self.title.as_deref() {
			let _res = writeln!(out, "TITLE \"{v}\"");
		}
		if let Some(v) = self.performer.as_deref() {
			let _res = writeln!(out, "PERFORMER \"{v}\"");
		}
		let _res = writeln!(out, "FILE \"{}\" BINARY", self.file);

		for t in &self.tracks {
			let _res = writeln!(out, "  TRACK {:02} AUDIO", t.number);
			if let Some(v) = t.title.as_deref() {
				let _res = writeln!(out, "    TITLE \"{v}\"");
			}
			if let Some(v) = t.performer.as_deref() {
				let _res = writeln!(out, "    PERFORMER \"{v}\"");
			}
			if t.copy_permitted || t.pre_emphasis {
				let mut flags = String::new();
				if t.copy_permitted { flags.push_str(" DCP"); }
				if t.pre_emphasis { flags.push_str(" PRE"); }
				let _res = writeln!(out, "    FLAGS{flags}");
			}
			if let Some(isrc) = t.isrc {
				let _res = writeln!(out, "    ISRC {isrc}");
			}
			if let Some(index0) = t.index0 {
				let _res = writeln!(out, "    INDEX 00 {index0}");
			}
			let _res = writeln!(out, "    INDEX 01 {}", t.index1);
			for (num, time) in &t.extras {
				let _res = writeln!(out, "    INDEX {num:02} {time}");
			}
		}

		out
	}

	/// # Reconstruct a Disc Model.
	///
	/// The inverse of [`CueSheet::from_disc`]: given the bin's sector
	/// count and the disc LBA its first sector corresponds to, rebuild
	/// enough of a [`DiscInfo`] for identifier math and burning. The
	/// disc IDs recomputed this way match the ones logged at rip time.
	///
	/// ## Errors
	///
	/// Relays model validation failures (zero-sector tracks and the
	/// like).
	pub fn to_disc_info(&self, sectors: u32, base_lba: u32) -> Result<DiscInfo, SpindleError> {
		use crate::{
			CdTextInfo,
			disc::Track,
		};

		let mut info = DiscInfo {
			first: self.tracks.first().map_or(1, |t| t.number),
			last: self.tracks.last().map_or(1, |t| t.number),
			leadout_lba: base_lba + sectors,
			session_count: 1,
			selected_session: 1,
			..DiscInfo::default()
		};

		for (k, t) in self.tracks.iter().enumerate() {
			let pregap = base_lba + t.first_sector();
			let start = base_lba + t.index1.to_sectors();
			let end = self.tracks.get(k + 1)
				.map_or(info.leadout_lba, |n| base_lba + n.first_sector())
				.saturating_sub(1);

			let mut indices = Vec::new();
			if pregap < start { indices.push((0, pregap)); }
			indices.push((1, start));
			for (n, time) in &t.extras {
				indices.push((*n, base_lba + time.to_sectors()));
			}

			info.tracks.push(Track {
				number: t.number,
				pregap_lba: pregap,
				start_lba: start,
				end_lba: end,
				is_audio: true,
				isrc: t.isrc,
				pre_emphasis: t.pre_emphasis,
				copy_permitted: t.copy_permitted,
				indices,
			});
		}

		// Metadata worth carrying over for display and CD-Text.
		info.cdtext = CdTextInfo {
			album_title: self.title.clone().unwrap_or_default(),
			album_artist: self.performer.clone().unwrap_or_default(),
			track_titles: self.tracks.iter()
				.map(|t| t.title.clone().unwrap_or_default())
				.collect(),
			track_artists: self.tracks.iter()
				.map(|t| t.performer.clone().unwrap_or_default())
				.collect(),
		};

		info.validate()?;
		Ok(info)
	}

	#[must_use]
	/// # From a Ripped Disc.
	///
	/// Build the sheet for a rip whose bin begins at the model's first
	/// sector (LBA zero when hidden audio pulled the pregap back).
	pub fn from_disc(info: &DiscInfo, bin_name: &str) -> Self {
		let first = info.first_sector();
		let mut out = Self {
			file: bin_name.to_owned(),
			title: Some(info.cdtext.album_title.clone()).filter(|v| ! v.is_empty()),
			performer: Some(info.cdtext.album_artist.clone()).filter(|v| ! v.is_empty()),
			rem: vec![
				format!("DISCID {}", info.cddb_id()),
				format!("RIPPED BY Spindle v{}", env!("CARGO_PKG_VERSION")),
			],
			tracks: Vec::new(),
		};

		for t in info.audio_tracks() {
			out.tracks.push(CueTrack {
				number: t.number,
				title: Some(info.cdtext.title(t.number).to_owned()).filter(|v| ! v.is_empty()),
				performer: Some(info.cdtext.artist(t.number).to_owned()).filter(|v| ! v.is_empty()),
				pre_emphasis: t.pre_emphasis,
				copy_permitted: t.copy_permitted,
				isrc: t.isrc,
				index0: (t.pregap_lba < t.start_lba)
					.then(|| Msf::from_sectors(t.pregap_lba - first)),
				index1: Msf::from_sectors(t.start_lba - first),
				extras: t.indices.iter()
					.filter(|(n, _)| 1 < *n)
					.map(|(n, lba)| (*n, Msf::from_sectors(lba - first)))
					.collect(),
			});
		}

		out
	}
}



#[derive(Debug)]
/// # A Prepared Image Set.
///
/// The bin/cue(/sub) triple a burn consumes, validated for alignment and
/// sanity at load time.
pub struct DiscImage {
	/// # The Bin.
	pub bin: PathBuf,

	/// # The Cue.
	pub cue: PathBuf,

	/// # The Sub, If Present.
	pub sub: Option<PathBuf>,

	/// # The Parsed Sheet.
	pub sheet: CueSheet,

	/// # Total Sectors in the Bin.
	pub sectors: u32,
}

impl DiscImage {
	/// # Load From a Directory.
	///
	/// Pick up the first `.bin`, `.cue`, and (optionally) `.sub` found,
	/// mirroring how people actually store these sets.
	///
	/// ## Errors
	///
	/// Returns `NotFound` when the essentials are missing, or any
	/// validation error from [`DiscImage::load_set`].
	pub fn load<P>(dir: P) -> Result<Self, SpindleError>
	where P: AsRef<Path> {
		let dir = dir.as_ref();
		let mut bin = None;
		let mut cue = None;
		let mut sub = None;

		let rd = std::fs::read_dir(dir)
			.map_err(|_| SpindleError::Io(dir.to_string_lossy().into_owned()))?;
		let mut paths: Vec<PathBuf> = rd.flatten().map(|e| e.path()).collect();
		paths.sort();
		for path in paths {
			match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
				Some("bin") if bin.is_none() => { bin.replace(path); },
				Some("cue") if cue.is_none() => { cue.replace(path); },
				Some("sub") if sub.is_none() => { sub.replace(path); },
				_ => {},
			}
		}

		match (bin, cue) {
			(Some(bin), Some(cue)) => Self::load_set(bin, cue, sub),
			_ => Err(SpindleError::NotFound),
		}
	}

	/// # Load a Specific Set.
	///
	/// ## Errors
	///
	/// Returns `InvalidInput` for misaligned bins, sub files that don't
	/// pair 1:1 with the bin, cue tracks pointing past the end, or
	/// zero-sector tracks.
	pub fn load_set(bin: PathBuf, cue: PathBuf, sub: Option<PathBuf>)
	-> Result<Self, SpindleError> {
		let raw = std::fs::read_to_string(&cue)
			.map_err(|_| SpindleError::Io(cue.to_string_lossy().into_owned()))?;
		let sheet = CueSheet::parse(&raw)?;

		let bin_len = std::fs::metadata(&bin)
			.map_err(|_| SpindleError::Io(bin.to_string_lossy().into_owned()))?
			.len();
		if bin_len == 0 || 0 != bin_len % u64::from(BYTES_PER_SECTOR) {
			return Err(SpindleError::InvalidInput("the bin is not sector-aligned"));
		}
		let sectors = u32::try_from(bin_len / u64::from(BYTES_PER_SECTOR))
			.map_err(|_| SpindleError::RipOverflow)?;

		if let Some(sub) = sub.as_ref() {
			let sub_len = std::fs::metadata(sub)
				.map_err(|_| SpindleError::Io(sub.to_string_lossy().into_owned()))?
				.len();
			if sub_len != u64::from(sectors) * u64::from(CD_SUB_SIZE) {
				return Err(SpindleError::InvalidInput("the sub does not pair 1:1 with the bin"));
			}
		}

		// Every track needs at least one sector inside the bin.
		for (k, t) in sheet.tracks.iter().enumerate() {
			let start = t.index1.to_sectors();
			let end = sheet.tracks.get(k + 1)
				.map_or(sectors, |n| n.first_sector());
			if end <= start || sectors < end {
				return Err(SpindleError::InvalidInput("cue track boundaries don't fit the bin"));
			}
		}

		Ok(Self { bin, cue, sub, sheet, sectors })
	}
}



impl<G: CdbGate> Disc<G> {
	/// # Export the Rip.
	///
	/// Write the whole verified set next to `stem`: `<stem>.bin`,
	/// `<stem>.cue`, `<stem>.sub` (when captured), `<stem>.log`, and —
	/// for the consensus modes — `<stem>_secure.log`. Returns the paths
	/// written.
	///
	/// The bin is the concatenation of the per-track buffers in track
	/// order, which by construction equals the offset-corrected disc
	/// stream the engine assembled.
	///
	/// ## Errors
	///
	/// Returns an error if nothing has been ripped or a file cannot be
	/// written.
	pub fn export_rip(
		&self,
		cfg: &SecureRipConfig,
		offset: ReadOffset,
		result: &SecureRipResult,
		verdict: Option<&ArVerdict>,
		elapsed: Duration,
		stem: &Path,
	) -> Result<Vec<PathBuf>, SpindleError> {
		let info = self.info();
		if ! info.has_audio() {
			return Err(SpindleError::InvalidInput("nothing has been ripped yet"));
		}

		let name = stem.file_name()
			.and_then(|n| n.to_str())
			.ok_or(SpindleError::InvalidInput("the output stem needs a file name"))?;
		let mut saved = Vec::new();

		// The bin.
		let dst = stem.with_extension("bin");
		let mut out = AtomicWriter::new(&dst)?;
		for t in info.audio_tracks() {
			let audio = info.audio(t.number)
				.ok_or(SpindleError::InvalidInput("the rip is missing a track"))?;
			out.writer()
				.write_all(audio.bytes())
				.map_err(|_| SpindleError::Write(dst.to_string_lossy().into_owned()))?;
		}
		out.finish()?;
		saved.push(dst);

		// The cue.
		let dst = stem.with_extension("cue");
		let sheet = CueSheet::from_disc(info, &format!("{name}.bin"));
		let mut out = AtomicWriter::new(&dst)?;
		out.writer()
			.write_all(sheet.emit().as_bytes())
			.map_err(|_| SpindleError::Write(dst.to_string_lossy().into_owned()))?;
		out.finish()?;
		saved.push(dst);

		// The sub, when captured.
		if let Some(sub) = result.sub.as_deref() {
			let dst = stem.with_extension("sub");
			let mut out = AtomicWriter::new(&dst)?;
			out.writer()
				.write_all(sub)
				.map_err(|_| SpindleError::Write(dst.to_string_lossy().into_owned()))?;
			out.finish()?;
			saved.push(dst);
		}

		// The logs.
		let crcs = accuraterip::crc_disc(info);
		let dst = stem.with_extension("log");
		write_rip_log(&dst, &RipLogContext {
			info,
			drive: self.drive_vendor_model(),
			cfg,
			offset,
			result,
			crcs: &crcs,
			verdict,
			elapsed,
		})?;
		saved.push(dst);

		if cfg.mode().consensus() {
			let mut dst = stem.as_os_str().to_owned();
			dst.push("_secure.log");
			let dst = PathBuf::from(dst);
			write_secure_log(&dst, result)?;
			saved.push(dst);
		}

		Ok(saved)
	}
}



/// # Split a Possibly-Quoted Value.
///
/// Returns the value and whatever trailed it (e.g. `BINARY`).
fn split_quoted(src: &str) -> (String, String) {
	let src = src.trim();
	if let Some(rest) = src.strip_prefix('"') {
		if let Some((v, tail)) = rest.split_once('"') {
			return (v.to_owned(), tail.trim().to_owned());
		}
	}
	match src.split_once(char::is_whitespace) {
		Some((v, tail)) => (v.to_owned(), tail.trim().to_owned()),
		None => (src.to_owned(), String::new()),
	}
}

/// # Parse `MM:SS:FF`.
fn parse_msf(src: &str) -> Option<Msf> {
	let mut parts = src.split(':');
	let m: u8 = parts.next()?.parse().ok()?;
	let s: u8 = parts.next()?.parse().ok()?;
	let f: u8 = parts.next()?.parse().ok()?;
	if parts.next().is_some() || 60 <= s || 75 <= f { return None; }
	Some(Msf { m, s, f })
}



#[cfg(test)]
mod test {
	use super::*;
	use crate::disc::test::three_track;

	#[test]
	fn t_cue_roundtrip() {
		// Scenario: pre-emphasis and an ISRC survive a round trip.
		let src = r#"REM DISCID 12345678
TITLE "Test Album"
PERFORMER "Test Artist"
FILE "test.bin" BINARY
  TRACK 01 AUDIO
    INDEX 01 00:00:00
  TRACK 05 AUDIO
    FLAGS PRE
    ISRC USRC17607839
    INDEX 00 00:04:00
    INDEX 01 00:06:00
"#;
		let sheet = CueSheet::parse(src).expect("Cue parse failed.");
		assert_eq!(sheet.file, "test.bin");
		assert_eq!(sheet.tracks.len(), 2);
		assert!(sheet.tracks[1].pre_emphasis);
		assert_eq!(
			sheet.tracks[1].isrc.map(|i| i.to_string()).as_deref(),
			Some("USRC17607839"),
		);

		// Emit/parse must be a fixed point.
		let emitted = sheet.emit();
		let again = CueSheet::parse(&emitted).expect("Re-parse failed.");
		assert_eq!(sheet, again, "Cue sheet failed to round trip.");
		assert_eq!(emitted, again.emit(), "Cue emission isn't canonical.");
	}

	#[test]
	fn t_cue_from_disc() {
		// Scenario: a hidden track pulls the bin back to LBA zero, so
		// track one's INDEX 01 lands at six seconds even.
		let mut info = three_track();
		info.tracks[0].pregap_lba = 0;
		info.tracks[0].start_lba = 450;
		info.has_hidden_track = true;

		let sheet = CueSheet::from_disc(&info, "album.bin");
		assert_eq!(sheet.tracks[0].index0, Some(Msf { m: 0, s: 0, f: 0 }));
		assert_eq!(sheet.tracks[0].index1.to_string(), "00:06:00");
		assert_eq!(sheet.tracks[1].index1.to_sectors(), 7_500);

		// And it parses back.
		let again = CueSheet::parse(&sheet.emit()).expect("Re-parse failed.");
		assert_eq!(sheet, again);
	}

	#[test]
	fn t_cue_errors() {
		// Data tracks are out of scope.
		let src = "FILE \"x.bin\" BINARY\n  TRACK 01 MODE1/2352\n    INDEX 01 00:00:00\n";
		assert!(matches!(CueSheet::parse(src), Err(SpindleError::CueParse(2))));

		// Bogus timecodes point at their line.
		let src = "FILE \"x.bin\" BINARY\n  TRACK 01 AUDIO\n    INDEX 01 00:99:00\n";
		assert!(matches!(CueSheet::parse(src), Err(SpindleError::CueParse(3))));

		// An empty sheet is no sheet.
		assert!(CueSheet::parse("").is_err());
	}

	#[test]
	fn t_msf_parse() {
		assert_eq!(parse_msf("00:06:00"), Some(Msf { m: 0, s: 6, f: 0 }));
		assert_eq!(parse_msf("79:59:74"), Some(Msf { m: 79, s: 59, f: 74 }));
		assert_eq!(parse_msf("00:60:00"), None);
		assert_eq!(parse_msf("00:00:75"), None);
		assert_eq!(parse_msf("00:00"), None);
	}
}
