/*!
# Spindle: TOC Decoding
*/

use crate::{
	CdbGate,
	CD_LEADIN,
	cdtext,
	disc::{
		DiscInfo,
		Isrc,
		Mcn,
		Track,
	},
	mmc::ReadForm,
	Mmc,
	subq::{
		deinterleave_q,
		SubQ,
	},
	SpindleError,
	BYTES_PER_SECTOR,
	CD_DATA_SUB_SIZE,
};



/// # Lead-Out Point/Track Number.
const LEADOUT_TRACK: u8 = 0xAA;

/// # Control: Data Track.
const CTRL_DATA: u8 = 0b0100;

/// # Control: Digital Copy Permitted.
const CTRL_DCP: u8 = 0b0010;

/// # Control: Pre-Emphasis.
const CTRL_PRE: u8 = 0b0001;

/// # Maximum Pregap Scan Depth (Sectors).
///
/// Pregaps are almost always exactly two seconds; four gives slack
/// without turning the scan into a second rip.
const PREGAP_SCAN: u32 = 300;

/// # Hidden-Track Probe Window (Sectors).
const HIDDEN_SCAN: u32 = 75;

/// # Hidden-Track Silence Threshold.
///
/// Any single sample louder than this within the probe window counts as
/// real audio.
const SILENCE_THRESHOLD: i16 = 100;

/// # Widest Plausible Lead-Out.
///
/// Roughly 89 minutes, beyond anything pressed; TOC entries past it are
/// garbage to be repaired.
const MAX_LEADOUT: u32 = 400_000;



/// # Read and Assemble the Disc Model.
///
/// The full ingress pipeline: TOC format 0 for the skeleton, format 1
/// for sessions, raw Q scanning for pregap boundaries, probes for hidden
/// audio at both ends, then ISRC/MCN/CD-Text to dress it all up.
///
/// ## Errors
///
/// Returns an error when no usable disc is present or the TOC is
/// unsalvageable; metadata failures (ISRC, MCN, CD-Text) are non-fatal
/// and simply leave their fields empty.
pub(crate) fn read_disc_info<G: CdbGate>(mmc: &mut Mmc<G>)
-> Result<DiscInfo, SpindleError> {
	mmc.test_unit_ready()?;

	// The skeleton.
	let raw = mmc.read_toc(0)?;
	let (first, last, entries, leadout, mut repaired) = parse_toc0(&raw)?;
	let mut tracks = build_tracks(&entries, leadout, &mut repaired)?;

	// Sessions, when the drive will say.
	let (session_count, selected_session) = mmc.read_toc(1)
		.ok()
		.and_then(|raw| parse_sessions(&raw))
		.unwrap_or((1, 1));

	// Refine pregap boundaries from Q, then look for hidden audio.
	refine_pregaps(mmc, &mut tracks);
	let has_hidden_track = probe_hidden_lead(mmc, &mut tracks);
	probe_hidden_tail(mmc, &mut tracks, leadout);

	// Decorations.
	for t in &mut tracks {
		if t.is_audio {
			t.isrc = mmc.read_isrc(t.number)
				.ok()
				.flatten()
				.and_then(|raw| Isrc::try_from(raw.as_slice()).ok());
		}
	}
	let mcn = mmc.read_mcn()
		.ok()
		.flatten()
		.and_then(|raw| Mcn::try_from(raw.as_slice()).ok());
	let cdtext = mmc.read_cdtext()
		.map(|raw| cdtext::decode_packs(&raw, usize::from(last)))
		.unwrap_or_default();

	let out = DiscInfo {
		first,
		last,
		leadout_lba: leadout,
		session_count,
		selected_session,
		tracks,
		cdtext,
		has_hidden_track,
		toc_repaired: repaired,
		mcn,
		audio: Default::default(),
	};
	out.validate()?;
	Ok(out)
}



/// # A Raw Format-0 Entry.
struct TocEntry {
	/// # Track Number.
	number: u8,

	/// # Control Nibble.
	control: u8,

	/// # Start LBA.
	lba: u32,
}

/// # Parse a Format-0 Response.
///
/// Yields `(first, last, track entries, leadout, repaired)`. Starts
/// beyond the plausible lead-out clamp rather than abort; the repair flag
/// remembers the disc fibbed.
fn parse_toc0(raw: &[u8])
-> Result<(u8, u8, Vec<TocEntry>, u32, bool), SpindleError> {
	if raw.len() < 4 + 8 {
		return Err(SpindleError::ProtocolMismatch("READ TOC response too short"));
	}
	let first = raw[2];
	let last = raw[3];
	if first == 0 || last < first || 99 < last {
		return Err(SpindleError::DiscMode);
	}

	let mut entries = Vec::new();
	let mut leadout = None;
	for desc in raw[4..].chunks_exact(8) {
		let control = desc[1] & 0x0F;
		let number = desc[2];
		let lba_raw = i32::from_be_bytes([desc[4], desc[5], desc[6], desc[7]]);
		let lba = u32::try_from(lba_raw).unwrap_or(0);

		if number == LEADOUT_TRACK { leadout.replace(lba); }
		else if (1..=99).contains(&number) {
			entries.push(TocEntry { number, control, lba });
		}
	}

	let mut leadout = leadout.ok_or(SpindleError::DiscMode)?;
	let mut repaired = false;
	if MAX_LEADOUT < leadout {
		leadout = MAX_LEADOUT;
		repaired = true;
	}
	if entries.is_empty() { return Err(SpindleError::DiscMode); }

	Ok((first, last, entries, leadout, repaired))
}

/// # Entries to Tracks.
///
/// Sort, clamp, and stitch the raw entries into contiguous tracks: each
/// ends one sector shy of its successor (or the lead-out). Pregaps start
/// out equal to the main starts; Q refinement fills them in after.
fn build_tracks(entries: &[TocEntry], leadout: u32, repaired: &mut bool)
-> Result<Vec<Track>, SpindleError> {
	let mut out: Vec<Track> = Vec::with_capacity(entries.len());

	for (k, e) in entries.iter().enumerate() {
		let mut start = e.lba;

		// Repair: starts at or past the lead-out get clamped to the
		// nearest valid boundary.
		if leadout <= start {
			start = leadout - 1;
			*repaired = true;
		}
		// Repair: non-monotonic starts likewise.
		if let Some(prev) = out.last() {
			if start <= prev.start_lba {
				start = prev.start_lba + 1;
				*repaired = true;
			}
		}

		let end = entries.get(k + 1)
			.map_or(leadout, |n| n.lba.min(leadout))
			.saturating_sub(1);
		if end < start { return Err(SpindleError::DiscMode); }

		out.push(Track {
			number: e.number,
			pregap_lba: start,
			start_lba: start,
			end_lba: end,
			is_audio: 0 == e.control & CTRL_DATA,
			isrc: None,
			pre_emphasis: 0 != e.control & CTRL_PRE,
			copy_permitted: 0 != e.control & CTRL_DCP,
			indices: vec![(1, start)],
		});
	}

	Ok(out)
}

/// # Parse a Format-1 (Session) Response.
fn parse_sessions(raw: &[u8]) -> Option<(u8, u8)> {
	if raw.len() < 4 { return None; }
	let first = raw[2];
	let last = raw[3];
	if first == 0 || last < first { return None; }
	Some((last - first + 1, 1))
}



/// # Refine Pregaps From Q.
///
/// For each track after the first, walk backward from INDEX 01 reading
/// raw P-W and checking the deinterleaved Q: while the (CRC-verified)
/// frames report this track at index zero, the pregap extends. Frames
/// failing the CRC are never allowed to move a boundary — a few in a row
/// just end the walk.
fn refine_pregaps<G: CdbGate>(mmc: &mut Mmc<G>, tracks: &mut [Track]) {
	let mut buf = [0_u8; CD_DATA_SUB_SIZE as usize];

	for k in 1..tracks.len() {
		if ! tracks[k].is_audio { continue; }

		let start = tracks[k].start_lba;
		let floor = start.saturating_sub(PREGAP_SCAN).max(tracks[k - 1].start_lba + 1);
		let mut pregap = start;
		let mut misses = 0_u8;

		for lba in (floor..start).rev() {
			if mmc.read_cd(lba as i32, 1, ReadForm::AudioRawSub, &mut buf).is_err() {
				break;
			}
			match deinterleave_q(&buf[BYTES_PER_SECTOR as usize..]).and_then(|q| SubQ::parse(&q)) {
				Some(q) if q.track == tracks[k].number && q.index == 0 => {
					pregap = lba;
					misses = 0;
				},
				// Unreadable frame: tolerate a couple without extending.
				None if misses < 3 => { misses += 1; },
				_ => break,
			}
		}

		if pregap < start {
			// The pregap belongs to this track; its neighbor shrinks.
			tracks[k].pregap_lba = pregap;
			tracks[k].indices.insert(0, (0, pregap));
			tracks[k - 1].end_lba = pregap - 1;
		}
	}
}

/// # Probe for Hidden Leading Audio.
///
/// When the first audio track begins beyond the standard two-second
/// offset, sniff the orphaned region for signal. Any sample magnitude
/// above the threshold in the first 75 sectors flags an HTOA and extends
/// track one's pregap all the way to LBA zero.
fn probe_hidden_lead<G: CdbGate>(mmc: &mut Mmc<G>, tracks: &mut [Track]) -> bool {
	let Some(t1) = tracks.first_mut() else { return false; };
	if ! t1.is_audio || t1.pregap_lba <= CD_LEADIN { return false; }

	if region_has_audio(mmc, CD_LEADIN, t1.pregap_lba.min(CD_LEADIN + HIDDEN_SCAN)) {
		t1.pregap_lba = 0;
		if t1.indices.first().is_some_and(|f| f.0 == 0) {
			t1.indices[0].1 = 0;
		}
		else { t1.indices.insert(0, (0, 0)); }
		true
	}
	else { false }
}

/// # Probe for Hidden Trailing Audio.
///
/// The mirror check between the last track's reported end and the
/// lead-out; real signal there folds into the last track so it gets
/// ripped rather than dropped.
fn probe_hidden_tail<G: CdbGate>(mmc: &mut Mmc<G>, tracks: &mut [Track], leadout: u32) {
	let Some(t) = tracks.last_mut() else { return; };
	if ! t.is_audio || leadout <= t.end_lba + 1 { return; }

	let from = t.end_lba + 1;
	if region_has_audio(mmc, from, leadout.min(from + HIDDEN_SCAN)) {
		t.end_lba = leadout - 1;
	}
}

/// # Any Signal In the Region?
fn region_has_audio<G: CdbGate>(mmc: &mut Mmc<G>, from: u32, to: u32) -> bool {
	// Slow and steady for a possibly beat-up region.
	let _res = mmc.set_speed(706, 0);
	let mut buf = [0_u8; BYTES_PER_SECTOR as usize];
	let mut found = false;

	for lba in from..to {
		if mmc.read_cd(lba as i32, 1, ReadForm::Audio, &mut buf).is_ok() &&
			buf.chunks_exact(2).any(|pair| {
				let v = i16::from_le_bytes([pair[0], pair[1]]);
				SILENCE_THRESHOLD < v.saturating_abs()
			})
		{
			found = true;
			break;
		}
	}

	let _res = mmc.set_speed(0, 0);
	found
}



#[cfg(test)]
mod test {
	use super::*;

	/// # Build a Format-0 Buffer.
	pub(crate) fn toc0_buf(entries: &[(u8, u8, u32)], leadout: u32) -> Vec<u8> {
		let mut out = vec![0_u8; 4];
		out[2] = entries.first().map_or(1, |e| e.0);
		out[3] = entries.last().map_or(1, |e| e.0);
		for &(number, control, lba) in entries {
			out.extend_from_slice(&[0, control, number, 0]);
			out.extend_from_slice(&(lba as i32).to_be_bytes());
		}
		out.extend_from_slice(&[0, 0, LEADOUT_TRACK, 0]);
		out.extend_from_slice(&(leadout as i32).to_be_bytes());

		let len = ((out.len() - 2) as u16).to_be_bytes();
		out[0] = len[0];
		out[1] = len[1];
		out
	}

	#[test]
	fn t_parse_toc0() {
		let raw = toc0_buf(
			&[(1, 0, 150), (2, 0, 7_500), (3, 0b0001, 15_000)],
			22_500,
		);
		let (first, last, entries, leadout, repaired) =
			parse_toc0(&raw).expect("TOC parse failed.");
		assert_eq!(first, 1);
		assert_eq!(last, 3);
		assert_eq!(leadout, 22_500);
		assert_eq!(entries.len(), 3);
		assert!(! repaired);

		let mut repaired = false;
		let tracks = build_tracks(&entries, leadout, &mut repaired)
			.expect("Track build failed.");
		assert_eq!(tracks[0].start_lba, 150);
		assert_eq!(tracks[0].end_lba, 7_499);
		assert_eq!(tracks[1].end_lba, 14_999);
		assert_eq!(tracks[2].end_lba, 22_499);
		assert!(tracks[2].pre_emphasis);
		assert!(! repaired);
	}

	#[test]
	fn t_parse_toc0_repair() {
		// Track three claims to start beyond the lead-out; it should be
		// clamped and flagged rather than trusted or fatal.
		let raw = toc0_buf(
			&[(1, 0, 150), (2, 0, 7_500), (3, 0, 900_000)],
			22_500,
		);
		let (_, _, entries, leadout, mut repaired) =
			parse_toc0(&raw).expect("TOC parse failed.");
		let tracks = build_tracks(&entries, leadout, &mut repaired)
			.expect("Track build failed.");
		assert!(repaired, "Clamping must set the repair flag.");
		assert_eq!(tracks[2].start_lba, 22_499);
		assert_eq!(tracks[2].end_lba, 22_499);
	}

	#[test]
	fn t_parse_toc0_garbage() {
		assert!(parse_toc0(&[]).is_err());
		assert!(parse_toc0(&[0, 2, 0, 0]).is_err());

		// A TOC with no lead-out entry is unusable.
		let mut raw = toc0_buf(&[(1, 0, 150)], 22_500);
		raw.truncate(12);
		assert!(parse_toc0(&raw).is_err());
	}

	#[test]
	fn t_parse_sessions() {
		let mut raw = vec![0, 10, 1, 2];
		raw.extend_from_slice(&[0; 8]);
		assert_eq!(parse_sessions(&raw), Some((2, 1)));
		assert_eq!(parse_sessions(&[0, 2, 0, 0]), None);
	}
}
