/*!
# Spindle: AccurateRip
*/

use crate::{
	AccurateRipId,
	DiscInfo,
	SpindleError,
};
use std::{
	collections::BTreeMap,
	sync::OnceLock,
	time::Duration,
};
use ureq::{
	Agent,
	AgentBuilder,
};



/// # Leading Samples Excluded From the First Track.
///
/// The first and last few sectors of the program fall inside the
/// drives' read-offset uncertainty and are by convention left out of the
/// checksums.
const SKIP_HEAD: usize = 2939;

/// # Trailing Samples Excluded From the Last Track.
const SKIP_TAIL: usize = 2941;

/// # Connection Agent.
static AGENT: OnceLock<Agent> = OnceLock::new();



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Per-Track Checksums.
///
/// Both database generations at once, since the bin files don't say
/// which is which; a match against either counts.
pub struct TrackCrc {
	/// # Version 1.
	pub v1: u32,

	/// # Version 2.
	pub v2: u32,
}

/// # Checksum a Track.
///
/// The v1 computation is the sum of each stereo sample — `(right << 16) |
/// left` as unsigned — multiplied by its one-based position within the
/// track, truncated to 32 bits. The v2 variant folds the upper half of
/// each 64-bit product back in before summing.
///
/// Positions keep counting through the excluded head/tail zones; only
/// the summing skips them.
pub(crate) fn crc_track(data: &[u8], is_first: bool, is_last: bool) -> TrackCrc {
	let samples = data.len() / 4;
	let head = if is_first { SKIP_HEAD } else { 0 };
	let tail = if is_last { samples.saturating_sub(SKIP_TAIL) } else { samples };

	let mut crc1: u64 = 0;
	let mut crc2: u64 = 0;

	for (idx, sample) in data.chunks_exact(4).enumerate() {
		if head <= idx && idx < tail {
			let v = u64::from(u32::from_le_bytes([
				sample[0], sample[1], sample[2], sample[3],
			]));
			let kv = (idx as u64 + 1) * v;

			crc1 = crc1.wrapping_add(kv);
			crc2 = crc2.wrapping_add((kv >> 32) + (kv & 0xFFFF_FFFF));
		}
	}

	// Sixty-four bits were only used to help with overflow; the final
	// checksums only use half that much.
	TrackCrc {
		v1: (crc1 & 0xFFFF_FFFF) as u32,
		v2: (crc2 & 0xFFFF_FFFF) as u32,
	}
}

/// # Checksum Every Ripped Track.
///
/// Returns `(track number, crcs)` pairs for the audio the model actually
/// holds, in track order. The HTOA (track zero) is unverifiable and
/// skipped.
pub(crate) fn crc_disc(info: &DiscInfo) -> Vec<(u8, TrackCrc)> {
	let mut out = Vec::new();
	for t in info.audio_tracks() {
		let Some(audio) = info.audio(t.number) else { continue; };
		let (is_first, is_last) = info.audio_position(t.number);
		out.push((t.number, crc_track(audio.bytes(), is_first, is_last)));
	}
	out
}



/// # Parsed Pressings.
///
/// One `checksum => confidence` map per track, indexed `number - 1`,
/// with every known pressing merged in. (The database repeats the whole
/// record per pressing; a rip matching *any* of them is accurate.)
pub type ArPressings = Vec<BTreeMap<u32, u8>>;

/// # Parse a dBAR Bin.
///
/// The format is a repeated record: a 13-byte header echoing the disc ID,
/// then nine bytes per track (confidence, CRC, and the zero-offset CRC we
/// don't need). Consecutive records are additional pressings.
///
/// ## Errors
///
/// Returns an error when a record's header disagrees with the disc ID or
/// nothing usable was found.
pub(crate) fn parse_checksums(id: &AccurateRipId, bin: &[u8])
-> Result<ArPressings, SpindleError> {
	let audio_len = usize::from(id.audio_len());
	if audio_len == 0 || 99 < audio_len {
		return Err(SpindleError::InvalidInput("AccurateRip supports 1–99 tracks"));
	}

	let chunk_size = 13 + 9 * audio_len;
	let mut out: ArPressings = vec![BTreeMap::default(); audio_len];

	for chunk in bin.chunks_exact(chunk_size) {
		// A record whose track count disagrees with the local TOC gets
		// logged upstream and ignored here.
		let Some(chunk) = chunk.strip_prefix(id.as_ref()) else { continue; };

		// Update the list for each track, combining them if for some
		// reason the same value appears twice.
		for (k, v) in chunk.chunks_exact(9).enumerate() {
			let crc = u32::from_le_bytes([v[1], v[2], v[3], v[4]]);
			if crc != 0 {
				let e = out[k].entry(crc).or_insert(0);
				*e = e.saturating_add(v[0]);
			}
		}
	}

	if out.iter().any(|v| ! v.is_empty()) { Ok(out) }
	else { Err(SpindleError::NotFound) }
}

/// # Fetch Checksums.
///
/// Download the disc's bin file from the database. A `404` is the
/// database saying "never seen it" — an empty result, not an error.
///
/// ## Errors
///
/// Network failures and malformed responses bubble up; callers treat
/// them as non-fatal warnings and carry on with the local CRCs.
pub fn fetch_checksums(id: &AccurateRipId) -> Result<Option<ArPressings>, SpindleError> {
	use std::io::Read;

	let url = id.checksum_url();
	match agent().get(&url).call() {
		Ok(res) => {
			let mut bin = Vec::new();
			res.into_reader()
				.read_to_end(&mut bin)
				.map_err(|_| SpindleError::Io(url))?;
			parse_checksums(id, &bin).map(Some)
		},
		Err(ureq::Error::Status(404, _)) => Ok(None),
		Err(_) => Err(SpindleError::Io(url)),
	}
}



#[derive(Debug, Clone, Default)]
/// # Verification Outcome.
pub struct ArVerdict {
	/// # Per-Track Matches.
	///
	/// `(track number, confidence, matched v2?)`; tracks with no match
	/// report a confidence of zero.
	pub tracks: Vec<(u8, u8, bool)>,

	/// # Everything Matched Something?
	pub accurate: bool,
}

/// # Verify a Rip.
///
/// Compare the local checksums against every known pressing. The rip as
/// a whole is "accurate" iff every checksummed track matched at least
/// one pressing. Pressings are addressed by track number, so a partial
/// rip verifies the tracks it has.
pub(crate) fn verify(local: &[(u8, TrackCrc)], pressings: &ArPressings) -> ArVerdict {
	let mut out = ArVerdict {
		tracks: Vec::with_capacity(local.len()),
		accurate: ! local.is_empty(),
	};

	for (track, crc) in local {
		let chk = usize::from(*track)
			.checked_sub(1)
			.and_then(|idx| pressings.get(idx));
		let (conf, v2) = chk.map_or((0, false), |chk|
			if let Some(c) = chk.get(&crc.v2) { (*c, true) }
			else if let Some(c) = chk.get(&crc.v1) { (*c, false) }
			else { (0, false) }
		);

		if conf == 0 { out.accurate = false; }
		out.tracks.push((*track, conf, v2));
	}

	out
}



impl<G: crate::CdbGate> crate::Disc<G> {
	/// # Look Up and Verify Against AccurateRip.
	///
	/// Checksum the ripped tracks, fetch the disc's pressing records,
	/// and compare. `Ok(None)` means the database has never seen this
	/// disc — a perfectly respectable outcome, not an error.
	///
	/// ## Errors
	///
	/// Nothing-ripped-yet and oversized track counts are `InvalidInput`;
	/// network trouble surfaces as `Io` for the caller to downgrade to a
	/// warning. (The local checksums still get logged either way.)
	pub fn verify_accuraterip(&self) -> Result<Option<ArVerdict>, SpindleError> {
		let info = self.info();
		let local = crc_disc(info);
		if local.is_empty() {
			return Err(SpindleError::InvalidInput("nothing has been ripped yet"));
		}

		let id = info.accuraterip_id();
		match fetch_checksums(&id)? {
			Some(pressings) => Ok(Some(verify(&local, &pressings))),
			None => Ok(None),
		}
	}
}



/// # Connection Agent.
///
/// Storing the agent statically saves a little bit of overhead on reuse.
fn agent() -> &'static Agent {
	AGENT.get_or_init(||
		AgentBuilder::new()
			.timeout(Duration::from_secs(15))
			.user_agent(concat!("spindle/", env!("CARGO_PKG_VERSION")))
			.max_idle_connections(0)
			.build()
	)
}



#[cfg(test)]
mod test {
	use super::*;
	use crate::disc::test::three_track;

	/// # Tiny Track Checksum.
	///
	/// A hand-checkable case: an interior track (no exclusions) of three
	/// samples valued 1, 2, 3.
	#[test]
	fn t_crc_v1_v2() {
		let mut data = Vec::new();
		for v in [1_u32, 2, 3] { data.extend_from_slice(&v.to_le_bytes()); }

		// v1: 1·1 + 2·2 + 3·3 = 14.
		let crc = crc_track(&data, false, false);
		assert_eq!(crc.v1, 14);
		// No product overflows 32 bits, so v2 matches v1 here.
		assert_eq!(crc.v2, 14);

		// Now force a big product: position 2 × 0xFFFF_FFFF.
		let mut data = Vec::new();
		for v in [0_u32, 0xFFFF_FFFF, 0] { data.extend_from_slice(&v.to_le_bytes()); }
		let crc = crc_track(&data, false, false);

		let kv = 2_u64 * 0xFFFF_FFFF;
		assert_eq!(crc.v1, (kv & 0xFFFF_FFFF) as u32);
		assert_eq!(crc.v2, ((kv >> 32) + (kv & 0xFFFF_FFFF)) as u32);
		assert_ne!(crc.v1, crc.v2);
	}

	#[test]
	fn t_crc_edges() {
		// A first track shorter than the exclusion zone checksums to
		// zero; likewise a last track.
		let data = vec![1_u8; SKIP_HEAD * 4];
		assert_eq!(crc_track(&data, true, false), TrackCrc::default());

		let data = vec![1_u8; SKIP_TAIL * 4];
		assert_eq!(crc_track(&data, false, true), TrackCrc::default());

		// Interior samples of a first track still count, with their
		// absolute positions.
		let mut data = vec![0_u8; (SKIP_HEAD + 1) * 4];
		let len = data.len();
		data[len - 4..].copy_from_slice(&1_u32.to_le_bytes());
		let crc = crc_track(&data, true, false);
		assert_eq!(crc.v1, SKIP_HEAD as u32 + 1, "Excluded samples must still advance the index.");
	}

	/// # Synthesize a dBAR Record.
	fn dbar(id: &AccurateRipId, tracks: &[(u8, u32)]) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(id.as_ref());
		for &(conf, crc) in tracks {
			out.push(conf);
			out.extend_from_slice(&crc.to_le_bytes());
			out.extend_from_slice(&[0; 4]);
		}
		out
	}

	#[test]
	fn t_parse_and_verify() {
		let info = three_track();
		let id = info.accuraterip_id();

		// Two pressings with different checksums; our local rip matches
		// pressing two for tracks one and three, pressing one for two.
		let mut bin = dbar(&id, &[(11, 0xAAAA_0001), (12, 0xAAAA_0002), (13, 0xAAAA_0003)]);
		bin.extend_from_slice(&dbar(&id, &[(21, 0xBBBB_0001), (22, 0xBBBB_0002), (23, 0xBBBB_0003)]));

		let pressings = parse_checksums(&id, &bin).expect("dBAR parse failed.");
		assert_eq!(pressings.len(), 3);
		assert_eq!(pressings[0].get(&0xAAAA_0001), Some(&11));
		assert_eq!(pressings[0].get(&0xBBBB_0001), Some(&21));

		let local = vec![
			(1, TrackCrc { v1: 0xBBBB_0001, v2: 1 }),
			(2, TrackCrc { v1: 0xAAAA_0002, v2: 2 }),
			(3, TrackCrc { v1: 3, v2: 0xBBBB_0003 }),
		];
		let verdict = verify(&local, &pressings);
		assert!(verdict.accurate, "Every track matched a pressing.");
		assert_eq!(verdict.tracks[0], (1, 21, false));
		assert_eq!(verdict.tracks[1], (2, 12, false));
		assert_eq!(verdict.tracks[2], (3, 23, true));

		// Remove track two's match and the disc is no longer accurate.
		let local = vec![
			(1, TrackCrc { v1: 0xBBBB_0001, v2: 1 }),
			(2, TrackCrc { v1: 2, v2: 2 }),
			(3, TrackCrc { v1: 3, v2: 0xBBBB_0003 }),
		];
		let verdict = verify(&local, &pressings);
		assert!(! verdict.accurate);
		assert_eq!(verdict.tracks[1], (2, 0, false));
	}

	#[test]
	fn t_parse_garbage() {
		let info = three_track();
		let id = info.accuraterip_id();

		// Mismatched headers are skipped; all-mismatched is a not-found.
		let mut bin = dbar(&id, &[(1, 1), (1, 2), (1, 3)]);
		bin[0] ^= 0xFF;
		assert!(matches!(
			parse_checksums(&id, &bin),
			Err(SpindleError::NotFound),
		));

		// Empty input likewise.
		assert!(parse_checksums(&id, &[]).is_err());
	}
}
