/*!
# Spindle: Simulated Drive

A scriptable, in-memory `CdbGate` implementation so the TOC decoder,
secure read engine, scans, and burner can all be exercised end-to-end
without shortening the life of any actual hardware.
*/

#![allow(clippy::cast_possible_truncation, reason = "Test values are small.")]

use crate::{
	BYTES_PER_SECTOR,
	CD_SUB_SIZE,
	Cdb,
	CdbGate,
	SpindleError,
	subq,
	Xfer,
};
use std::{
	collections::{
		BTreeMap,
		VecDeque,
	},
	time::Duration,
};



/// # One Scripted Read Outcome.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SimRead {
	/// # A Clean Read of a Uniform Payload.
	Good(u8),

	/// # A C2-Flagged Read of a Uniform Payload.
	C2(u8),

	/// # A Hard Failure.
	Error,
}

#[derive(Debug, Default)]
/// # The Fake Drive.
///
/// Configure the disc, scripts, and feature set; the command decoding
/// handles the rest. Write-side traffic is recorded for inspection.
pub(crate) struct SimDrive {
	/// # TOC Entries: (number, control, start LBA).
	pub(crate) toc: Vec<(u8, u8, u32)>,

	/// # Lead-Out LBA.
	pub(crate) leadout: u32,

	/// # Session Count.
	pub(crate) sessions: u8,

	/// # Media Catalog Number.
	pub(crate) mcn: Option<[u8; 13]>,

	/// # Per-Track ISRCs.
	pub(crate) isrcs: BTreeMap<u8, [u8; 12]>,

	/// # Raw CD-Text Packs (Headerless).
	pub(crate) cdtext: Vec<u8>,

	/// # Sectors Carrying Loud Audio.
	///
	/// Everything else plays deterministic near-silence.
	pub(crate) loud: Vec<u32>,

	/// # Scripted Read Outcomes, Consumed Front-First.
	pub(crate) flaky: BTreeMap<i32, VecDeque<SimRead>>,

	/// # Sectors That Never, Ever Read.
	pub(crate) broken: Vec<u32>,

	/// # Q Layout for Subchannel Reads: (track, pregap, start).
	///
	/// Empty means subchannel reads return zeros (Q CRC failures).
	pub(crate) sub_layout: Vec<(u8, u32, u32)>,

	/// # Advertised Feature Codes.
	pub(crate) features: Vec<u16>,

	/// # Media: Blank?
	pub(crate) blank: bool,

	/// # Media: Erasable?
	pub(crate) erasable: bool,

	/// # Every Opcode Seen, In Order.
	pub(crate) opcodes: Vec<u8>,

	/// # WRITE Payloads: (LBA, data).
	pub(crate) written: Vec<(i32, Vec<u8>)>,

	/// # SEND CUE SHEET Payloads.
	pub(crate) cue_sheets: Vec<Vec<u8>>,
}

impl SimDrive {
	/// # A Disc With the Given Audio TOC.
	pub(crate) fn with_toc(tracks: &[(u8, u32)], leadout: u32) -> Self {
		Self {
			toc: tracks.iter().map(|&(n, lba)| (n, 0, lba)).collect(),
			leadout,
			sessions: 1,
			erasable: false,
			..Self::default()
		}
	}

	/// # The Default Audio For a Sector.
	///
	/// Deterministic and quiet: every sample in sector `lba` has the
	/// value `lba % 50`, comfortably under the silence threshold.
	pub(crate) fn payload(&self, lba: i32) -> Vec<u8> {
		let byte =
			if self.loud.contains(&(lba as u32)) {
				return [0_u8, 0x40, 0, 0x40].repeat(588);
			}
			else { (lba % 50) as u8 };
		[byte, 0, byte, 0].repeat(588)
	}

	/// # Serve a READ CD.
	fn read_cd(&mut self, cdb: &[u8], buf: &mut [u8]) -> Result<usize, SpindleError> {
		let lba = i32::from_be_bytes([cdb[2], cdb[3], cdb[4], cdb[5]]);
		let count = usize::from(cdb[8]);
		let c2 = 0 != cdb[9] & 0b0000_0010;
		let sub = 0 != cdb[10] & 0b0000_0111;
		let block =
			if c2 { 2646 }
			else if sub { 2448 }
			else { usize::from(BYTES_PER_SECTOR) };
		if buf.len() != block * count {
			return Err(SpindleError::CheckCondition(5, 0x24, 0));
		}

		for k in 0..count {
			let lba = lba + k as i32;
			if lba < 0 || self.leadout as i32 <= lba {
				return Err(SpindleError::CheckCondition(5, 0x21, 0));
			}
			if self.broken.contains(&(lba as u32)) {
				return Err(SpindleError::CheckCondition(3, 0x11, 0));
			}

			// Scripted outcomes run first; the well never empties into
			// anything but default goodness.
			let outcome = self.flaky.get_mut(&lba)
				.and_then(VecDeque::pop_front)
				.unwrap_or(SimRead::Good(0));

			let chunk = &mut buf[k * block..(k + 1) * block];
			let (data, fill_c2) = match outcome {
				SimRead::Error => return Err(SpindleError::CheckCondition(3, 0x11, 0)),
				SimRead::Good(0) => (self.payload(lba), false),
				SimRead::Good(b) => ([b, 0, b, 0].repeat(588), false),
				SimRead::C2(0) => (self.payload(lba), true),
				SimRead::C2(b) => ([b, 0, b, 0].repeat(588), true),
			};
			chunk[..data.len()].copy_from_slice(&data);

			if c2 {
				let flag = if fill_c2 { 0b1111_1111 } else { 0 };
				for v in &mut chunk[data.len()..] { *v = flag; }
			}
			else if sub {
				let pw = self.subchannel(lba);
				chunk[data.len()..].copy_from_slice(&pw);
			}
		}

		Ok(buf.len())
	}

	/// # Raw P-W For a Sector.
	fn subchannel(&self, lba: i32) -> [u8; CD_SUB_SIZE as usize] {
		for &(track, pregap, start) in &self.sub_layout {
			let next = self.sub_layout.iter()
				.map(|&(_, p, _)| p)
				.filter(|&p| pregap < p)
				.min()
				.unwrap_or(self.leadout);
			if (pregap..next).contains(&(lba as u32)) {
				let index = u8::from(start <= lba as u32);
				let rel =
					if start <= lba as u32 { lba as u32 - start }
					else { start - lba as u32 };
				let q = subq::q_frame(0, track, index, rel, lba);
				return subq::interleave_pw(&q, index == 0);
			}
		}
		[0; CD_SUB_SIZE as usize]
	}

	/// # Serve a READ TOC.
	fn read_toc(&self, cdb: &[u8], buf: &mut [u8]) -> Result<usize, SpindleError> {
		let format = cdb[2] & 0x0F;
		let response = match format {
			0 => {
				let mut out = vec![0_u8; 4];
				out[2] = self.toc.first().map_or(1, |e| e.0);
				out[3] = self.toc.last().map_or(1, |e| e.0);
				for &(number, control, lba) in &self.toc {
					out.extend_from_slice(&[0, control, number, 0]);
					out.extend_from_slice(&(lba as i32).to_be_bytes());
				}
				out.extend_from_slice(&[0, 0, 0xAA, 0]);
				out.extend_from_slice(&(self.leadout as i32).to_be_bytes());
				let len = ((out.len() - 2) as u16).to_be_bytes();
				out[0] = len[0];
				out[1] = len[1];
				out
			},
			1 => vec![0, 10, 1, self.sessions.max(1), 0, 0, 0, 0, 0, 0, 0, 0],
			5 => {
				let mut out = vec![0_u8; 4];
				out.extend_from_slice(&self.cdtext);
				let len = ((out.len() - 2) as u16).to_be_bytes();
				out[0] = len[0];
				out[1] = len[1];
				out
			},
			_ => return Err(SpindleError::CheckCondition(5, 0x24, 0)),
		};

		let n = buf.len().min(response.len());
		buf[..n].copy_from_slice(&response[..n]);
		Ok(n)
	}

	/// # Serve a READ SUB-CHANNEL.
	fn read_subchannel_cmd(&self, cdb: &[u8], buf: &mut [u8]) -> usize {
		buf.fill(0);
		match cdb[3] {
			// MCN.
			0x02 => if let Some(mcn) = self.mcn {
				buf[8] = 0x80;
				buf[9..22].copy_from_slice(&mcn);
			},
			// ISRC.
			0x03 => if let Some(isrc) = self.isrcs.get(&cdb[6]) {
				buf[8] = 0x80;
				buf[9..21].copy_from_slice(isrc);
			},
			_ => {},
		}
		buf.len().min(24)
	}

	/// # Serve a GET CONFIGURATION.
	fn get_configuration(&self, cdb: &[u8], buf: &mut [u8]) -> usize {
		buf.fill(0);
		let feature = u16::from_be_bytes([cdb[2], cdb[3]]);
		if self.features.contains(&feature) && 12 <= buf.len() {
			buf[8..10].copy_from_slice(&feature.to_be_bytes());
			buf[10] = 0x03;
			buf[11] = 0;
			12
		}
		else { 8.min(buf.len()) }
	}
}

impl CdbGate for SimDrive {
	fn submit(
		&mut self,
		cdb: &Cdb,
		_dir: Xfer,
		buf: &mut [u8],
		_timeout: Duration,
	) -> Result<usize, SpindleError> {
		let raw = cdb.as_slice().to_vec();
		self.opcodes.push(raw[0]);

		match raw[0] {
			// TEST UNIT READY, SET SPEED, FLUSH, PREVENT/ALLOW, STOP,
			// BLANK, OPC, CLOSE: all quietly succeed.
			0x00 | 0xBB | 0x35 | 0x1E | 0x1B | 0xA1 | 0x54 | 0x5B => Ok(0),

			// INQUIRY.
			0x12 => {
				buf.fill(0);
				if 32 <= buf.len() {
					buf[8..16].copy_from_slice(b"SIMULATE");
					buf[16..32].copy_from_slice(b"FAKEDRIVE 9000  ");
				}
				Ok(buf.len())
			},

			// READ TOC.
			0x43 => self.read_toc(&raw, buf),

			// READ SUB-CHANNEL.
			0x42 => Ok(self.read_subchannel_cmd(&raw, buf)),

			// READ CD.
			0xBE => self.read_cd(&raw, buf),

			// GET CONFIGURATION.
			0x46 => Ok(self.get_configuration(&raw, buf)),

			// READ DISC INFORMATION.
			0x51 => {
				buf.fill(0);
				if 3 <= buf.len() {
					buf[2] = u8::from(! self.blank) | if self.erasable { 0x10 } else { 0 };
				}
				Ok(buf.len())
			},

			// READ BUFFER CAPACITY: a megabyte, mostly empty.
			0x5C => {
				buf.fill(0);
				if 12 <= buf.len() {
					buf[4..8].copy_from_slice(&1_048_576_u32.to_be_bytes());
					buf[8..12].copy_from_slice(&943_718_u32.to_be_bytes());
				}
				Ok(buf.len())
			},

			// SEND CUE SHEET.
			0x5D => {
				self.cue_sheets.push(buf.to_vec());
				Ok(buf.len())
			},

			// WRITE BUFFER.
			0x3B => Ok(buf.len()),

			// WRITE.
			0x2A => {
				let lba = i32::from_be_bytes([raw[2], raw[3], raw[4], raw[5]]);
				self.written.push((lba, buf.to_vec()));
				Ok(buf.len())
			},

			// Whatever that was, the fake firmware doesn't speak it.
			_ => Err(SpindleError::CheckCondition(5, 0x20, 0)),
		}
	}
}



#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		BurnConfig,
		Burner,
		BurnState,
		CueSheet,
		Disc,
		DiscImage,
		KillSwitch,
		Mmc,
		ReadOffset,
		RipMode,
		ScanConfig,
		ScanKind,
		SecureRipConfig,
	};
	use fyi_msg::Progless;
	use std::time::Duration;

	/// # The Canonical Three-Track Disc, as Hardware.
	fn scenario_a() -> SimDrive {
		let mut out = SimDrive::with_toc(
			&[(1, 150), (2, 7_500), (3, 15_000)],
			22_500,
		);
		out.mcn.replace(*b"0731455829921");
		out.isrcs.insert(1, *b"USRC17607839");
		out
	}

	/// # A Small Disc for Engine Tests.
	///
	/// One track covering LBA 0..=119, lead-out at 120: big enough to
	/// mean something, small enough to rip instantly.
	fn tiny() -> SimDrive {
		SimDrive::with_toc(&[(1, 0)], 120)
	}

	#[test]
	fn t_model_from_sim() {
		let disc = Disc::from_gate(scenario_a()).expect("Disc scan failed.");
		let info = disc.info();

		assert_eq!(info.first, 1);
		assert_eq!(info.last, 3);
		assert_eq!(info.leadout_lba, 22_500);
		assert_eq!(info.tracks.len(), 3);
		assert_eq!(info.tracks[0].start_lba, 150);
		assert_eq!(info.tracks[1].end_lba, 14_999);
		assert!(! info.has_hidden_track, "Quiet padding must not read as hidden audio.");
		assert!(! info.toc_repaired);
		assert_eq!(info.mcn.map(|m| m.to_string()).as_deref(), Some("0731455829921"));
		assert_eq!(
			info.tracks[0].isrc.map(|i| i.to_string()).as_deref(),
			Some("USRC17607839"),
		);

		// Scenario A's identifier math.
		let ar = info.accuraterip_id();
		assert_eq!(ar.id1(), 45_150);
		assert_eq!(ar.id2(), 127_650);
		assert_eq!(ar.audio_len(), 3);
	}

	#[test]
	fn t_hidden_track() {
		// Scenario B: track one reports a start of 450 and the orphaned
		// region carries real signal.
		let mut sim = SimDrive::with_toc(&[(1, 450), (2, 7_500)], 22_500);
		sim.loud.push(200);
		let disc = Disc::from_gate(sim).expect("Disc scan failed.");
		let info = disc.info();

		assert!(info.has_hidden_track);
		assert_eq!(info.tracks[0].pregap_lba, 0);
		assert_eq!(info.tracks[0].start_lba, 450);
		assert_eq!(info.first_sector(), 0);

		// The cue sees the hidden region as track one's pregap; INDEX 01
		// lands at six seconds.
		let sheet = CueSheet::from_disc(info, "b.bin");
		assert_eq!(sheet.tracks[0].index1.to_string(), "00:06:00");
	}

	#[test]
	fn t_pregap_refinement() {
		// Q frames mark 7350..7500 as track two's pregap; the decoder
		// should move the boundary without touching INDEX 01.
		let mut sim = SimDrive::with_toc(&[(1, 150), (2, 7_500)], 22_500);
		sim.sub_layout = vec![
			(1, 150, 150),
			(2, 7_350, 7_500),
		];
		let disc = Disc::from_gate(sim).expect("Disc scan failed.");
		let info = disc.info();

		assert_eq!(info.tracks[1].pregap_lba, 7_350);
		assert_eq!(info.tracks[1].start_lba, 7_500);
		assert_eq!(info.tracks[0].end_lba, 7_349);
		assert_eq!(info.tracks[1].indices, vec![(0, 7_350), (1, 7_500)]);
	}

	#[test]
	fn t_rip_flaky_consensus() {
		// Scenario D, miniaturized: one sector dissents twice before
		// settling; consensus must verify the stable value and leave
		// nothing unresolved.
		let mut sim = tiny();
		sim.flaky.insert(7, VecDeque::from([
			SimRead::Good(0xB1),
			SimRead::Good(0xC1),
		]));

		let mut disc = Disc::from_gate(sim).expect("Disc scan failed.");
		let cfg = SecureRipConfig::from(RipMode::Standard);
		let progress = Progless::default();
		let killed = KillSwitch::default();
		let result = disc.rip_secure(&cfg, ReadOffset::default(), &progress, &killed)
			.expect("Rip failed.");

		assert!(result.unresolved.is_empty(), "Nothing should be unresolved: {result:?}");
		assert!(! result.cancelled);
		assert!(2 <= result.passes);

		// Sector seven's audio must be the settled value, i.e. the
		// default payload.
		let audio = disc.info().audio(1).expect("Track audio missing.");
		let at = 7 * usize::from(crate::BYTES_PER_SECTOR);
		let expected = [7_u8, 0, 7, 0].repeat(588);
		assert_eq!(&audio.bytes()[at..at + expected.len()], expected.as_slice());

		// Invariant: the exported track equals the assembled stream.
		assert_eq!(audio.bytes().len(), 120 * usize::from(crate::BYTES_PER_SECTOR));
	}

	#[test]
	fn t_rip_c2_quarantine() {
		// A sector that reports C2 on the first two passes but reads
		// cleanly thereafter should end verified, with re-reads logged.
		let mut sim = tiny();
		sim.flaky.insert(3, VecDeque::from([
			SimRead::C2(0),
			SimRead::C2(0),
		]));

		let mut disc = Disc::from_gate(sim).expect("Disc scan failed.");
		let cfg = SecureRipConfig::from(RipMode::Standard);
		let progress = Progless::default();
		let killed = KillSwitch::default();
		let result = disc.rip_secure(&cfg, ReadOffset::default(), &progress, &killed)
			.expect("Rip failed.");

		assert!(result.unresolved.is_empty(), "Quarantine should have cleared: {result:?}");
	}

	#[test]
	fn t_rip_unresolvable() {
		// A sector that never reads — even after the command layer's
		// retries — is unresolved, not fatal.
		let mut sim = tiny();
		sim.broken.push(5);

		let mut disc = Disc::from_gate(sim).expect("Disc scan failed.");
		let cfg = SecureRipConfig::from(RipMode::Burst);
		let progress = Progless::default();
		let killed = KillSwitch::default();
		let result = disc.rip_secure(&cfg, ReadOffset::default(), &progress, &killed)
			.expect("Rip failed.");

		assert_eq!(result.unresolved, vec![5]);
		assert_eq!(result.tracks[0].unresolved, 1);
	}

	#[test]
	fn t_rip_offset() {
		// Scenario C in miniature: a +30-sample offset pulls the stream
		// 120 bytes forward.
		let mut disc = Disc::from_gate(tiny()).expect("Disc scan failed.");
		let cfg = SecureRipConfig::from(RipMode::Burst);
		let progress = Progless::default();
		let killed = KillSwitch::default();
		let offset = ReadOffset::try_from(30_i16).unwrap();
		let _result = disc.rip_secure(&cfg, offset, &progress, &killed)
			.expect("Rip failed.");

		let audio = disc.info().audio(1).expect("Track audio missing.");

		// Sector zero's samples are all zero (0 % 50); sector one's are
		// one. The first 558 samples now come from the tail of sector
		// zero, then sector one begins 120 bytes early.
		let bytes = audio.bytes();
		let boundary = (588 - 30) * 4;
		assert!(bytes[..boundary].iter().all(|&b| b == 0));
		assert_eq!(&bytes[boundary..boundary + 4], &[1, 0, 1, 0]);

		// And the tail is silence where the disc ran out.
		assert!(bytes[bytes.len() - 120..].iter().all(|&b| b == 0));
	}

	#[test]
	fn t_rip_cancelled() {
		let mut disc = Disc::from_gate(tiny()).expect("Disc scan failed.");
		let cfg = SecureRipConfig::from(RipMode::Standard);
		let progress = Progless::default();
		let killed = KillSwitch::default();
		killed.inner().store(true, std::sync::atomic::Ordering::SeqCst);

		let result = disc.rip_secure(&cfg, ReadOffset::default(), &progress, &killed)
			.expect("A cancelled rip still returns its partial result.");
		assert!(result.cancelled);
		assert_eq!(result.tracks[0].unresolved, 120, "Unread sectors must be unresolved.");
	}

	#[test]
	fn t_scan_c2() {
		let mut sim = tiny();
		// Sector nine is permanently damaged; eleven hiccups once, which
		// the command layer's retry should swallow entirely.
		sim.flaky.insert(9, VecDeque::from([SimRead::C2(0); 64]));
		sim.flaky.insert(11, VecDeque::from([SimRead::Error]));

		let mut disc = Disc::from_gate(sim).expect("Disc scan failed.");
		let progress = Progless::default();
		let killed = KillSwitch::default();
		let report = disc.scan(ScanKind::C2, &ScanConfig::default(), &progress, &killed)
			.expect("Scan failed.");

		assert_eq!(report.rows.len(), 120);
		assert_eq!(report.rows[9].1[0], 294 * 8);
		assert!(report.rows.iter().filter(|(l, _)| *l != 9).all(|(_, r)| r[0] == 0));
	}

	#[test]
	fn t_scan_qcheck_gate() {
		// The fake drive is no Plextor.
		let mut disc = Disc::from_gate(tiny()).expect("Disc scan failed.");
		let progress = Progless::default();
		let killed = KillSwitch::default();
		assert!(matches!(
			disc.scan(ScanKind::QCheck, &ScanConfig::default(), &progress, &killed),
			Err(SpindleError::FeatureUnsupported(_)),
		));
	}

	#[test]
	fn t_export_and_reload() {
		// Rip, export, reload: the image must validate and its cue must
		// reproduce the disc IDs (round-trip law).
		let mut disc = Disc::from_gate(scenario_a()).expect("Disc scan failed.");
		let cfg = SecureRipConfig::from(RipMode::Burst).with_subchannel(true);
		let progress = Progless::default();
		let killed = KillSwitch::default();
		let result = disc.rip_secure(&cfg, ReadOffset::default(), &progress, &killed)
			.expect("Rip failed.");

		let dir = tempfile::tempdir().expect("Tempdir failed.");
		let stem = dir.path().join("scenario_a");
		let saved = disc.export_rip(
			&cfg,
			ReadOffset::default(),
			&result,
			None,
			Duration::from_secs(1),
			&stem,
		).expect("Export failed.");
		assert_eq!(saved.len(), 4, "Expected bin/cue/sub/log: {saved:?}");

		// Scenario A's bin covers 22,350 sectors (the rip starts at the
		// first track's pregap, LBA 150).
		let bin_len = std::fs::metadata(stem.with_extension("bin"))
			.expect("Missing bin.")
			.len();
		assert_eq!(bin_len, 22_350 * 2_352);

		let image = DiscImage::load(dir.path()).expect("Image load failed.");
		assert_eq!(image.sectors, 22_350);
		assert!(image.sub.is_some());

		// Cue → model → IDs: the identifiers must survive the trip.
		// (The bin starts at LBA 150, so the reconstruction shifts.)
		let rebuilt = image.sheet.to_disc_info(image.sectors, 150)
			.expect("Cue reconstruction failed.");
		assert_eq!(rebuilt.accuraterip_id(), disc.info().accuraterip_id());
		assert_eq!(rebuilt.cddb_id(), disc.info().cddb_id());
		assert_eq!(
			rebuilt.tracks[0].isrc.map(|i| i.to_string()).as_deref(),
			Some("USRC17607839"),
		);
	}

	#[test]
	fn t_burn() {
		// Write a tiny prepared image and watch the state machine walk
		// its stations.
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		let bin = dir.path().join("x.bin");
		let cue = dir.path().join("x.cue");
		std::fs::write(&bin, vec![0_u8; 2_352 * 32]).expect("Bin write failed.");
		std::fs::write(&cue, concat!(
			"FILE \"x.bin\" BINARY\n",
			"  TRACK 01 AUDIO\n",
			"    INDEX 01 00:00:00\n",
		)).expect("Cue write failed.");

		let image = DiscImage::load(dir.path()).expect("Image load failed.");

		let mut sim = SimDrive::default();
		sim.blank = true;
		sim.erasable = true;
		sim.features.push(0x002E);
		let mut mmc = Mmc::new(sim);

		let mut burner = Burner::new(&mut mmc, image, BurnConfig::default());
		let progress = Progless::default();
		let killed = KillSwitch::default();
		burner.run(&progress, &killed).expect("Burn failed.");
		assert_eq!(burner.state(), BurnState::Closed);

		let sim = mmc.into_inner();

		// The cue sheet went down before any data.
		let cue_at = sim.opcodes.iter().position(|&o| o == 0x5D).expect("No cue sheet sent.");
		let write_at = sim.opcodes.iter().position(|&o| o == 0x2A).expect("No data written.");
		let close_at = sim.opcodes.iter().rposition(|&o| o == 0x5B).expect("Never closed.");
		assert!(cue_at < write_at && write_at < close_at);

		// 32 bin sectors plus the synthesized 150-sector pregap, 2448
		// bytes apiece, starting at -150.
		let total: usize = sim.written.iter().map(|(_, d)| d.len()).sum();
		assert_eq!(total, (150 + 32) * 2_448);
		assert_eq!(sim.written.first().map(|(l, _)| *l), Some(-150));

		// The cue payload brackets the program with lead-in and
		// lead-out entries.
		let sheet = &sim.cue_sheets[0];
		assert_eq!(sheet.len() % 8, 0);
		assert_eq!(sheet[1], 0, "The first entry must be the lead-in.");
		assert_eq!(sheet[sheet.len() - 8 + 1], 0xAA, "The last entry must be the lead-out.");
	}

	#[test]
	fn t_burn_not_writable() {
		// A full, non-erasable disc is a brick.
		let dir = tempfile::tempdir().expect("Tempdir failed.");
		let bin = dir.path().join("x.bin");
		let cue = dir.path().join("x.cue");
		std::fs::write(&bin, vec![0_u8; 2_352]).expect("Bin write failed.");
		std::fs::write(&cue, "FILE \"x.bin\" BINARY\n  TRACK 01 AUDIO\n    INDEX 01 00:00:00\n")
			.expect("Cue write failed.");
		let image = DiscImage::load(dir.path()).expect("Image load failed.");

		let mut sim = SimDrive::default();
		sim.features.push(0x002E);
		let mut mmc = Mmc::new(sim);
		let mut burner = Burner::new(&mut mmc, image, BurnConfig::default());
		let progress = Progless::default();
		let killed = KillSwitch::default();

		assert!(matches!(
			burner.run(&progress, &killed),
			Err(SpindleError::MediaNotWritable),
		));
		assert_eq!(burner.state(), BurnState::Failed);
	}
}
