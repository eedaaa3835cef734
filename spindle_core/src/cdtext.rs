/*!
# Spindle: CD-Text
*/

use crate::subq::crc16;



/// # Pack Size.
const PACK_SIZE: usize = 18;

/// # Text Payload Bytes Per Pack.
const PACK_TEXT: usize = 12;

/// # Pack Type: Title.
const PACK_TITLE: u8 = 0x80;

/// # Pack Type: Performer.
const PACK_PERFORMER: u8 = 0x81;

/// # Pack Type: Size Information.
///
/// Carries the character code for the block, among other bookkeeping we
/// don't need.
const PACK_SIZE_INFO: u8 = 0x8F;

/// # Maximum Packs Per Buffer.
const MAX_PACKS: usize = 2048;



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Character Code.
///
/// The lead-in announces one character set per block. We only ever write
/// 8859-1; on the read side the East Asian sets degrade to Latin-1 rather
/// than being misdecoded as something else.
enum Charset {
	/// # ISO 8859-1.
	Latin1,

	/// # 7-bit ASCII.
	Ascii,

	/// # MS-JIS (Unhandled).
	MsJis,

	/// # Korean (Unhandled).
	Korean,
}

impl Charset {
	/// # From Size-Info Byte.
	///
	/// Unknown values fall back to Latin-1.
	const fn from_u8(src: u8) -> Self {
		match src {
			0x01 => Self::Ascii,
			0x80 => Self::MsJis,
			0x81 => Self::Korean,
			_ => Self::Latin1,
		}
	}

	/// # Decode a Fragment.
	///
	/// Latin-1 maps bytes straight to code points; ASCII is a subset of
	/// that; the double-byte sets we can't properly decode keep their
	/// ASCII range and lose the rest.
	fn decode(self, src: &[u8]) -> String {
		match self {
			Self::Latin1 | Self::Ascii => src.iter().map(|&b| char::from(b)).collect(),
			Self::MsJis | Self::Korean => src.iter()
				.map(|&b| if b.is_ascii() { char::from(b) } else { '?' })
				.collect(),
		}
	}
}



#[derive(Debug, Clone, Default, Eq, PartialEq)]
/// # CD-Text.
///
/// Album- and track-level titles and performers, after charset
/// conversion. Track vectors are indexed `number - 1` and padded with
/// empties so lookups can stay simple.
pub struct CdTextInfo {
	/// # Album Title.
	pub album_title: String,

	/// # Album Artist.
	pub album_artist: String,

	/// # Per-Track Titles.
	pub track_titles: Vec<String>,

	/// # Per-Track Artists.
	pub track_artists: Vec<String>,
}

impl CdTextInfo {
	#[must_use]
	/// # Anything Here?
	pub fn is_empty(&self) -> bool {
		self.album_title.is_empty() &&
		self.album_artist.is_empty() &&
		self.track_titles.iter().all(String::is_empty) &&
		self.track_artists.iter().all(String::is_empty)
	}

	#[must_use]
	/// # Track Title (1-Based).
	pub fn title(&self, track: u8) -> &str {
		track.checked_sub(1)
			.and_then(|idx| self.track_titles.get(usize::from(idx)))
			.map_or("", String::as_str)
	}

	#[must_use]
	/// # Track Artist (1-Based).
	pub fn artist(&self, track: u8) -> &str {
		track.checked_sub(1)
			.and_then(|idx| self.track_artists.get(usize::from(idx)))
			.map_or("", String::as_str)
	}
}



/// # Decode a Pack Stream.
///
/// `raw` is a bare sequence of 18-byte packs (the 4-byte response header
/// having been stripped by the command layer).
///
/// Strings can span multiple packs, and a single 12-byte payload can hold
/// the tail of one string and the start of the next, separated by a NUL.
/// Decoding therefore keeps a running "next track" counter per pack type,
/// advanced at each NUL boundary, with track zero meaning the album
/// itself.
pub(crate) fn decode_packs(raw: &[u8], ntracks: usize) -> CdTextInfo {
	let mut out = CdTextInfo {
		album_title: String::new(),
		album_artist: String::new(),
		track_titles: vec![String::new(); ntracks],
		track_artists: vec![String::new(); ntracks],
	};

	// The character set is announced in the size-info packs; find it
	// before touching any text.
	let charset = raw.chunks_exact(PACK_SIZE)
		.find(|p| p[0] == PACK_SIZE_INFO)
		.map_or(Charset::Latin1, |p| Charset::from_u8(p[4]));

	// Running track index per pack type; -1 until the first pack of that
	// type seeds it from its header.
	let mut next_track: [i16; 2] = [-1, -1];

	for pack in raw.chunks_exact(PACK_SIZE) {
		let which = match pack[0] {
			PACK_TITLE => 0,
			PACK_PERFORMER => 1,
			_ => continue,
		};

		// A non-zero CRC that doesn't match means line noise; skip it.
		let stored = u16::from_be_bytes([pack[16], pack[17]]);
		if stored != 0 && stored != crc16(&pack[..16]) { continue; }

		if next_track[which] < 0 {
			next_track[which] = i16::from(pack[1] & 0x7F);
		}

		// Walk the payload, splitting on NULs.
		let text = &pack[4..4 + PACK_TEXT];
		let mut pos = 0;
		while pos < PACK_TEXT {
			let frag_end = text[pos..].iter()
				.position(|&b| b == 0)
				.map_or(PACK_TEXT, |p| pos + p);

			if pos < frag_end {
				push_fragment(&mut out, which, next_track[which], charset.decode(&text[pos..frag_end]));
			}

			if frag_end < PACK_TEXT {
				// String terminated; advance to the next track.
				next_track[which] += 1;
				pos = frag_end + 1;
			}
			// The string continues in the next pack.
			else { break; }
		}
	}

	out
}

/// # Append a Decoded Fragment.
fn push_fragment(info: &mut CdTextInfo, which: usize, track: i16, frag: String) {
	if track < 0 { return; }
	let dst = match (which, track) {
		(0, 0) => &mut info.album_title,
		(1, 0) => &mut info.album_artist,
		(0, t) => match info.track_titles.get_mut(t as usize - 1) {
			Some(s) => s,
			None => return,
		},
		(_, t) => match info.track_artists.get_mut(t as usize - 1) {
			Some(s) => s,
			None => return,
		},
	};
	dst.push_str(&frag);
}



/// # Encode a Pack Stream.
///
/// The inverse of [`decode_packs`]: titles then performers, block zero,
/// 8859-1, each string NUL-terminated and flowed across 12-byte payloads.
/// Every pack carries a CRC over its first sixteen bytes. The result is
/// always a multiple of eighteen bytes and capped at 2,048 packs.
///
/// ASCII content round-trips byte-for-byte; anything else is normalized
/// by the charset conversion first.
pub(crate) fn encode_packs(info: &CdTextInfo) -> Vec<u8> {
	let mut out = Vec::new();
	let mut seq: u8 = 0;

	encode_type(&mut out, &mut seq, PACK_TITLE, &info.album_title, &info.track_titles);
	encode_type(&mut out, &mut seq, PACK_PERFORMER, &info.album_artist, &info.track_artists);

	out.truncate(MAX_PACKS * PACK_SIZE);
	out
}

/// # Encode One Pack Type.
///
/// Flow the album string plus each track string — NUL-terminated — into
/// as many packs as it takes.
fn encode_type(out: &mut Vec<u8>, seq: &mut u8, kind: u8, album: &str, tracks: &[String]) {
	// Nothing at all? Don't waste the packs.
	if album.is_empty() && tracks.iter().all(String::is_empty) { return; }

	// Flatten everything into (track, byte) pairs, NULs included, so the
	// pack loop only has to think about twelve bytes at a time.
	let mut stream: Vec<(u8, u8)> = Vec::new();
	let mut feed = |track: u8, s: &str| {
		for c in s.chars() {
			let b = u32::from(c);
			stream.push((track, if b <= 0xFF { b as u8 } else { b'?' }));
		}
		stream.push((track, 0));
	};
	feed(0, album);
	for (k, s) in tracks.iter().enumerate() {
		feed(k as u8 + 1, s);
	}

	// Character positions reset per string; track them as we flow.
	let mut char_pos: Vec<usize> = vec![0; tracks.len() + 1];

	for chunk in stream.chunks(PACK_TEXT) {
		let mut pack = [0_u8; PACK_SIZE];
		pack[0] = kind;
		pack[1] = chunk[0].0;
		pack[2] = *seq;
		// Block zero, 8859-1; only the character position varies, capped
		// at fifteen like the field itself.
		pack[3] = char_pos[usize::from(chunk[0].0)].min(15) as u8;

		for (k, &(track, b)) in chunk.iter().enumerate() {
			pack[4 + k] = b;
			if b == 0 { char_pos[usize::from(track)] = 0; }
			else { char_pos[usize::from(track)] += 1; }
		}

		let crc = crc16(&pack[..16]).to_be_bytes();
		pack[16] = crc[0];
		pack[17] = crc[1];

		out.extend_from_slice(&pack);
		*seq = seq.wrapping_add(1);
	}
}



#[cfg(test)]
mod test {
	use super::*;

	/// # A Reasonable Album.
	fn sample() -> CdTextInfo {
		CdTextInfo {
			album_title: "Selected Ambient Works".to_owned(),
			album_artist: "Aphex Twin".to_owned(),
			track_titles: vec![
				"Xtal".to_owned(),
				"Tha".to_owned(),
				"Pulsewidth".to_owned(),
			],
			track_artists: vec![
				"Aphex Twin".to_owned(),
				"Aphex Twin".to_owned(),
				"Aphex Twin".to_owned(),
			],
		}
	}

	#[test]
	fn t_roundtrip_ascii() {
		let info = sample();
		let packs = encode_packs(&info);
		assert_eq!(packs.len() % PACK_SIZE, 0, "Pack buffer must be a multiple of 18.");

		let back = decode_packs(&packs, 3);
		assert_eq!(info, back, "ASCII CD-Text failed to round trip.");

		// And encoding the decoded copy must be byte-identical.
		assert_eq!(packs, encode_packs(&back), "Re-encoding changed the byte stream.");
	}

	#[test]
	fn t_split_payloads() {
		// Titles chosen so strings straddle pack boundaries and share
		// payloads with their neighbors.
		let info = CdTextInfo {
			album_title: "A".to_owned(),
			album_artist: String::new(),
			track_titles: vec![
				"BBBBBBBBBBBBBBBBBBBBBB".to_owned(), // Two packs' worth.
				"C".to_owned(),
				"DD".to_owned(),
			],
			track_artists: vec![String::new(); 3],
		};
		let packs = encode_packs(&info);
		let back = decode_packs(&packs, 3);
		assert_eq!(info, back, "Boundary-straddling CD-Text failed to round trip.");
	}

	#[test]
	fn t_corrupt_pack_skipped() {
		let info = sample();
		let mut packs = encode_packs(&info);

		// Flip a text byte in the very first pack without fixing the CRC;
		// its fragment should vanish rather than decode as garbage.
		packs[5] ^= 0xFF;
		let back = decode_packs(&packs, 3);
		assert_ne!(back.album_title, info.album_title);
	}

	#[test]
	fn t_empty() {
		let info = CdTextInfo::default();
		assert!(info.is_empty());
		assert!(encode_packs(&info).is_empty());
		assert_eq!(info.title(1), "");
		assert_eq!(info.artist(99), "");
	}
}
