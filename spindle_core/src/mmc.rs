/*!
# Spindle: MMC Command Layer
*/

use crate::{
	Cdb,
	CdbGate,
	CD_DATA_C2_SIZE,
	CD_DATA_SUB_SIZE,
	BYTES_PER_SECTOR,
	scsi::{
		TIMEOUT_BLANK,
		TIMEOUT_CLOSE,
		TIMEOUT_DEFAULT,
		TIMEOUT_READ,
	},
	SpindleError,
	Xfer,
};
use std::{
	thread::sleep,
	time::Duration,
};



/// # Read Retry Backoff Schedule.
///
/// Three local retries for read-class commands; writes never retry
/// because a partial write may already have happened.
const READ_BACKOFF: [Duration; 3] = [
	Duration::from_millis(50),
	Duration::from_millis(200),
	Duration::from_millis(800),
];

/// # CD-Text Pack Size.
pub(crate) const CDTEXT_PACK_SIZE: usize = 18;

/// # Accurate Stream Feature Code.
const FEATURE_ACCURATE_STREAM: u16 = 0x0107;

/// # CD Mastering (DAO) Feature Code.
const FEATURE_CD_MASTERING: u16 = 0x002E;



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # READ CD Payload Shape.
///
/// The flag combinations we actually use, tied to their exact block
/// sizes. The drive returning anything else for a given shape is a
/// protocol mismatch, not something to paper over.
pub enum ReadForm {
	/// # Audio Only (2352 B).
	Audio,

	/// # Audio + C2 Pointers (2646 B).
	AudioC2,

	/// # Audio + Raw P-W Subchannel (2448 B).
	AudioRawSub,
}

impl ReadForm {
	#[must_use]
	/// # Bytes Per Block.
	pub const fn block_size(self) -> usize {
		match self {
			Self::Audio => BYTES_PER_SECTOR as usize,
			Self::AudioC2 => CD_DATA_C2_SIZE as usize,
			Self::AudioRawSub => CD_DATA_SUB_SIZE as usize,
		}
	}

	/// # Byte Nine.
	///
	/// Main-channel selection: user data, plus C2 error bits if wanted.
	const fn flags(self) -> u8 {
		match self {
			Self::Audio | Self::AudioRawSub => 0b0001_0000,
			Self::AudioC2 => 0b0001_0010,
		}
	}

	/// # Byte Ten.
	///
	/// Subchannel selection: raw interleaved P-W or nothing.
	const fn sub(self) -> u8 {
		match self {
			Self::Audio | Self::AudioC2 => 0,
			Self::AudioRawSub => 0b0000_0001,
		}
	}
}



#[derive(Debug)]
/// # Typed MMC Commands.
///
/// Every drive conversation the rest of the crate has goes through one of
/// these methods; nothing else is allowed to cook up raw CDBs. The gate
/// underneath can be a real drive or the simulated one used in tests.
pub struct Mmc<G> {
	/// # The Transport.
	gate: G,
}

impl<G: CdbGate> Mmc<G> {
	#[inline]
	/// # New.
	pub const fn new(gate: G) -> Self { Self { gate } }

	/// # Into Inner.
	pub fn into_inner(self) -> G { self.gate }

	/// # Submit With Read Retries.
	///
	/// Retryable transport failures get three more chances, with the
	/// backoff schedule in between; everything else surfaces immediately.
	fn submit_read(&mut self, cdb: &Cdb, buf: &mut [u8], timeout: Duration)
	-> Result<usize, SpindleError> {
		let mut err = match self.gate.submit(cdb, Xfer::Read, buf, timeout) {
			Ok(n) => return Ok(n),
			Err(e) if e.is_retryable() => e,
			Err(e) => return Err(e),
		};

		for pause in READ_BACKOFF {
			sleep(pause);
			match self.gate.submit(cdb, Xfer::Read, buf, timeout) {
				Ok(n) => return Ok(n),
				Err(e) if e.is_retryable() => { err = e; },
				Err(e) => return Err(e),
			}
		}

		Err(err)
	}
}

/// # Reading.
impl<G: CdbGate> Mmc<G> {
	/// # READ CD (0xBE).
	///
	/// Read `count` sectors starting at `lba` in the given form. The
	/// buffer length must equal `count × form.block_size()` exactly; a
	/// disagreement means the caller and the flags have fallen out of
	/// sync, which is fatal.
	///
	/// ## Errors
	///
	/// Relays transport errors, after retries.
	pub fn read_cd(&mut self, lba: i32, count: u8, form: ReadForm, buf: &mut [u8])
	-> Result<(), SpindleError> {
		let expected = form.block_size() * usize::from(count);
		if buf.len() != expected {
			return Err(SpindleError::ProtocolMismatch("READ CD buffer/flag size disagreement"));
		}

		let lba_b = lba.to_be_bytes();
		let cdb = Cdb::new(&[
			0xBE,
			0b0000_0100, // Expected sector type: CD-DA.
			lba_b[0], lba_b[1], lba_b[2], lba_b[3],
			0, 0, count,
			form.flags(),
			form.sub(),
			0,
		]);

		let got = self.submit_read(&cdb, buf, TIMEOUT_READ)?;
		if got == expected { Ok(()) }
		else {
			Err(SpindleError::ShortTransfer(expected as u32, got as u32))
		}
	}

	/// # READ TOC (0x43).
	///
	/// Fetch the raw response for the given format; callers decode. The
	/// allocation runs the usual two-shot dance internally: a header read
	/// for the length, then the real thing.
	///
	/// ## Errors
	///
	/// Relays transport errors, and complains if the drive's length
	/// prefix makes no sense.
	pub fn read_toc(&mut self, format: u8) -> Result<Vec<u8>, SpindleError> {
		// First pass: just the four-byte header.
		let mut head = [0_u8; 4];
		let cdb = toc_cdb(format, 4);
		self.submit_read(&cdb, &mut head, TIMEOUT_DEFAULT)?;

		let len = usize::from(u16::from_be_bytes([head[0], head[1]])) + 2;
		if len < 4 { return Err(SpindleError::ProtocolMismatch("READ TOC length")); }

		// Second pass: the whole enchilada.
		let mut buf = vec![0_u8; len];
		let cdb = toc_cdb(format, len as u16);
		let got = self.submit_read(&cdb, &mut buf, TIMEOUT_DEFAULT)?;
		buf.truncate(got);
		Ok(buf)
	}

	/// # READ SUB-CHANNEL (0x42): MCN.
	///
	/// Returns the media catalog number as raw ASCII digits, or `None`
	/// when the validity bit is unset. (An absent MCN is normal, not an
	/// error.)
	///
	/// ## Errors
	///
	/// Relays transport errors.
	pub fn read_mcn(&mut self) -> Result<Option<[u8; 13]>, SpindleError> {
		let mut buf = [0_u8; 24];
		let cdb = Cdb::new(&[
			0x42, 0x02, 0x40, 0x02,
			0, 0, 0,
			0, 24, 0,
		]);
		self.submit_read(&cdb, &mut buf, TIMEOUT_DEFAULT)?;

		// Validity lives in bit seven; the digits right after.
		if 0 == buf[8] & 0x80 { return Ok(None); }
		let mut out = [0_u8; 13];
		out.copy_from_slice(&buf[9..22]);
		Ok(Some(out))
	}

	/// # READ SUB-CHANNEL (0x42): ISRC.
	///
	/// Returns the track's ISRC as raw ASCII, or `None` when the validity
	/// bit is unset.
	///
	/// ## Errors
	///
	/// Relays transport errors.
	pub fn read_isrc(&mut self, track: u8) -> Result<Option<[u8; 12]>, SpindleError> {
		let mut buf = [0_u8; 24];
		let cdb = Cdb::new(&[
			0x42, 0x02, 0x40, 0x03,
			0, 0, track,
			0, 24, 0,
		]);
		self.submit_read(&cdb, &mut buf, TIMEOUT_DEFAULT)?;

		if 0 == buf[8] & 0x80 { return Ok(None); }
		let mut out = [0_u8; 12];
		out.copy_from_slice(&buf[9..21]);
		Ok(Some(out))
	}

	/// # CD-Text (READ TOC Format 5).
	///
	/// Two-shot fetch of the lead-in CD-Text blob, returned as a bare
	/// sequence of 18-byte packs (header stripped). An empty vector means
	/// the disc simply has none.
	///
	/// ## Errors
	///
	/// Relays transport errors.
	pub fn read_cdtext(&mut self) -> Result<Vec<u8>, SpindleError> {
		let raw = match self.read_toc(5) {
			Ok(raw) => raw,
			// No CD-Text capability or none present: same difference.
			Err(SpindleError::FeatureUnsupported(_) | SpindleError::CheckCondition(_, _, _)) =>
				return Ok(Vec::new()),
			Err(e) => return Err(e),
		};
		if raw.len() <= 4 { return Ok(Vec::new()); }

		// Chop any trailing partial pack; drives pad all kinds of ways.
		let mut out = raw;
		out.drain(..4);
		out.truncate(out.len() / CDTEXT_PACK_SIZE * CDTEXT_PACK_SIZE);
		Ok(out)
	}
}

/// # Drive Management.
impl<G: CdbGate> Mmc<G> {
	/// # TEST UNIT READY (0x00).
	///
	/// ## Errors
	///
	/// Returns `MediaNotReady` (via sense) when the drive is empty or
	/// still spinning up.
	pub fn test_unit_ready(&mut self) -> Result<(), SpindleError> {
		let cdb = Cdb::new(&[0; 6]);
		self.gate.submit(&cdb, Xfer::None, &mut [], TIMEOUT_DEFAULT).map(|_| ())
	}

	/// # INQUIRY (0x12).
	///
	/// Return the raw (vendor, product) identification strings.
	///
	/// ## Errors
	///
	/// Relays transport errors.
	pub fn inquiry(&mut self) -> Result<(String, String), SpindleError> {
		let mut buf = [0_u8; 36];
		let cdb = Cdb::new(&[0x12, 0, 0, 0, 36, 0]);
		let got = self.submit_read(&cdb, &mut buf, TIMEOUT_DEFAULT)?;
		if got < 32 { return Err(SpindleError::ShortTransfer(36, got as u32)); }

		let vendor = String::from_utf8_lossy(&buf[8..16]).trim().to_owned();
		let product = String::from_utf8_lossy(&buf[16..32]).trim().to_owned();
		Ok((vendor, product))
	}

	/// # SET CD SPEED (0xBB).
	///
	/// Values are kB/s; zero means "drive default", which the wire
	/// encodes as `0xFFFF`.
	///
	/// ## Errors
	///
	/// Relays transport errors, though a refusal to change speed is
	/// ignorable by most callers.
	pub fn set_speed(&mut self, read_kb: u16, write_kb: u16) -> Result<(), SpindleError> {
		let r = if read_kb == 0 { 0xFFFF_u16 } else { read_kb }.to_be_bytes();
		let w = if write_kb == 0 { 0xFFFF_u16 } else { write_kb }.to_be_bytes();
		let cdb = Cdb::new(&[
			0xBB, 0,
			r[0], r[1],
			w[0], w[1],
			0, 0, 0, 0, 0, 0,
		]);
		self.gate.submit(&cdb, Xfer::None, &mut [], TIMEOUT_DEFAULT).map(|_| ())
	}

	/// # SYNCHRONIZE CACHE (0x35).
	///
	/// ## Errors
	///
	/// Relays transport errors.
	pub fn flush_cache(&mut self) -> Result<(), SpindleError> {
		let cdb = Cdb::new(&[0x35, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
		self.gate.submit(&cdb, Xfer::None, &mut [], TIMEOUT_DEFAULT).map(|_| ())
	}

	/// # PREVENT/ALLOW MEDIUM REMOVAL (0x1E).
	///
	/// ## Errors
	///
	/// Relays transport errors.
	pub fn prevent_removal(&mut self, lock: bool) -> Result<(), SpindleError> {
		let cdb = Cdb::new(&[0x1E, 0, 0, 0, u8::from(lock), 0]);
		self.gate.submit(&cdb, Xfer::None, &mut [], TIMEOUT_DEFAULT).map(|_| ())
	}

	/// # START STOP UNIT (0x1B): Stop.
	///
	/// Used to terminate a burn as cleanly as the drive allows.
	///
	/// ## Errors
	///
	/// Relays transport errors.
	pub fn stop_unit(&mut self) -> Result<(), SpindleError> {
		let cdb = Cdb::new(&[0x1B, 0, 0, 0, 0, 0]);
		self.gate.submit(&cdb, Xfer::None, &mut [], TIMEOUT_DEFAULT).map(|_| ())
	}

	/// # Feature Check (GET CONFIGURATION 0x46).
	///
	/// Returns `true` if the drive lists the feature descriptor at all.
	fn has_feature(&mut self, feature: u16) -> bool {
		let f = feature.to_be_bytes();
		let mut buf = [0_u8; 16];
		let cdb = Cdb::new(&[
			0x46, 0x02, f[0], f[1],
			0, 0, 0,
			0, 16, 0,
		]);
		self.gate.submit(&cdb, Xfer::Read, &mut buf, TIMEOUT_DEFAULT)
			.is_ok_and(|got| {
				// Anything beyond the 8-byte header is a descriptor, and
				// it must echo the feature code we asked about.
				8 < got && buf[8..10] == f
			})
	}

	#[must_use]
	/// # Accurate Stream?
	///
	/// Drives advertising MMC feature `0x0107` guarantee jitter-free
	/// consecutive reads, making cache defeat unnecessary.
	pub fn accurate_stream(&mut self) -> bool {
		self.has_feature(FEATURE_ACCURATE_STREAM)
	}

	#[must_use]
	/// # Raw DAO Writing?
	///
	/// The CD Mastering feature (`0x002E`) covers Session-at-Once and raw
	/// writing; without it there's no point offering the burn menu.
	pub fn can_write_dao(&mut self) -> bool {
		self.has_feature(FEATURE_CD_MASTERING)
	}

	/// # READ DISC INFORMATION (0x51).
	///
	/// Returns `(is_blank, is_erasable)`.
	///
	/// ## Errors
	///
	/// Relays transport errors.
	pub fn disc_writability(&mut self) -> Result<(bool, bool), SpindleError> {
		let mut buf = [0_u8; 34];
		let cdb = Cdb::new(&[0x51, 0, 0, 0, 0, 0, 0, 0, 34, 0]);
		let got = self.submit_read(&cdb, &mut buf, TIMEOUT_DEFAULT)?;
		if got < 3 { return Err(SpindleError::ShortTransfer(34, got as u32)); }

		let blank = 0 == buf[2] & 0b0000_0011;
		let erasable = 0 != buf[2] & 0b0001_0000;
		Ok((blank, erasable))
	}
}

/// # Writing.
impl<G: CdbGate> Mmc<G> {
	/// # BLANK (0xA1).
	///
	/// Type 0 erases the whole disc; type 1 is the minimal/quick variant.
	/// Only meaningful for CD-RW media.
	///
	/// ## Errors
	///
	/// Relays transport errors; never retried.
	pub fn blank(&mut self, quick: bool) -> Result<(), SpindleError> {
		let cdb = Cdb::new(&[
			0xA1, u8::from(quick),
			0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
		]);
		self.gate.submit(&cdb, Xfer::None, &mut [], TIMEOUT_BLANK).map(|_| ())
	}

	/// # SEND OPC INFORMATION (0x54).
	///
	/// Ask the drive to run power calibration for the current medium.
	///
	/// ## Errors
	///
	/// Relays transport errors.
	pub fn send_opc(&mut self) -> Result<(), SpindleError> {
		let cdb = Cdb::new(&[0x54, 0x01, 0, 0, 0, 0, 0, 0, 0, 0]);
		self.gate.submit(&cdb, Xfer::None, &mut [], TIMEOUT_CLOSE).map(|_| ())
	}

	/// # SEND CUE SHEET (0x5D).
	///
	/// ## Errors
	///
	/// Relays transport errors; the sheet length must fit 24 bits.
	pub fn send_cue_sheet(&mut self, sheet: &[u8]) -> Result<(), SpindleError> {
		let len = u32::try_from(sheet.len())
			.ok()
			.filter(|n| *n <= 0x00FF_FFFF)
			.ok_or(SpindleError::InvalidInput("cue sheet too large"))?
			.to_be_bytes();
		let cdb = Cdb::new(&[
			0x5D, 0, 0, 0, 0, 0,
			len[1], len[2], len[3],
			0,
		]);
		let mut buf = sheet.to_vec();
		self.gate.submit(&cdb, Xfer::Write, &mut buf, TIMEOUT_DEFAULT).map(|_| ())
	}

	/// # WRITE (0x2A).
	///
	/// Write `count` blocks at `lba`. The caller owns block-size
	/// agreement (2448 bytes each in our raw DAO-96 mode); mismatches are
	/// fatal here just like reads.
	///
	/// ## Errors
	///
	/// Relays transport errors; never retried, because a partial write
	/// may have occurred.
	pub fn write_sectors(&mut self, lba: i32, count: u16, data: &[u8])
	-> Result<(), SpindleError> {
		if data.len() != usize::from(count) * CD_DATA_SUB_SIZE as usize {
			return Err(SpindleError::ProtocolMismatch("WRITE buffer/count size disagreement"));
		}

		let lba_b = lba.to_be_bytes();
		let count_b = count.to_be_bytes();
		let cdb = Cdb::new(&[
			0x2A, 0,
			lba_b[0], lba_b[1], lba_b[2], lba_b[3],
			0,
			count_b[0], count_b[1],
			0,
		]);
		let mut buf = data.to_vec();
		self.gate.submit(&cdb, Xfer::Write, &mut buf, TIMEOUT_READ).map(|_| ())
	}

	/// # WRITE BUFFER (0x3B).
	///
	/// The fallback vehicle for CD-Text pack delivery on drives that
	/// won't take it through the cue-sheet channel.
	///
	/// ## Errors
	///
	/// Relays transport errors.
	pub fn write_buffer(&mut self, data: &[u8]) -> Result<(), SpindleError> {
		let len = u32::try_from(data.len())
			.ok()
			.filter(|n| *n <= 0x00FF_FFFF)
			.ok_or(SpindleError::InvalidInput("buffer payload too large"))?
			.to_be_bytes();
		let cdb = Cdb::new(&[
			0x3B, 0x02, // Data mode.
			0,          // Buffer ID.
			0, 0, 0,    // Offset.
			len[1], len[2], len[3],
			0,
		]);
		let mut buf = data.to_vec();
		self.gate.submit(&cdb, Xfer::Write, &mut buf, TIMEOUT_DEFAULT).map(|_| ())
	}

	/// # READ BUFFER CAPACITY (0x5C).
	///
	/// Returns `(total, blank)` buffer byte counts, used to pace writes.
	///
	/// ## Errors
	///
	/// Relays transport errors.
	pub fn read_buffer_capacity(&mut self) -> Result<(u32, u32), SpindleError> {
		let mut buf = [0_u8; 12];
		let cdb = Cdb::new(&[0x5C, 0, 0, 0, 0, 0, 0, 0, 12, 0]);
		let got = self.submit_read(&cdb, &mut buf, TIMEOUT_DEFAULT)?;
		if got < 12 { return Err(SpindleError::ShortTransfer(12, got as u32)); }

		Ok((
			u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
			u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
		))
	}

	/// # CLOSE TRACK/SESSION (0x5B).
	///
	/// ## Errors
	///
	/// Relays transport errors.
	pub fn close_session(&mut self) -> Result<(), SpindleError> {
		let cdb = Cdb::new(&[0x5B, 0, 0x02, 0, 0, 0, 0, 0, 0, 0]);
		self.gate.submit(&cdb, Xfer::None, &mut [], TIMEOUT_CLOSE).map(|_| ())
	}
}



/// # Build a READ TOC CDB.
const fn toc_cdb(format: u8, alloc: u16) -> Cdb {
	let len = alloc.to_be_bytes();
	let mut bytes = [0_u8; 16];
	bytes[0] = 0x43;
	bytes[2] = format & 0x0F;
	bytes[7] = len[0];
	bytes[8] = len[1];

	// Everything here is ten bytes.
	Cdb::from_parts(bytes, 10)
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_read_form() {
		assert_eq!(ReadForm::Audio.block_size(), 2352);
		assert_eq!(ReadForm::AudioC2.block_size(), 2646);
		assert_eq!(ReadForm::AudioRawSub.block_size(), 2448);

		// C2 selection must not leak into the subchannel byte and vice
		// versa.
		assert_eq!(ReadForm::AudioC2.sub(), 0);
		assert_eq!(ReadForm::AudioRawSub.flags(), ReadForm::Audio.flags());
	}

	#[test]
	fn t_toc_cdb() {
		let cdb = toc_cdb(2, 0x1234);
		let s = cdb.as_slice();
		assert_eq!(s.len(), 10);
		assert_eq!(s[0], 0x43);
		assert_eq!(s[2], 2);
		assert_eq!(s[7], 0x12);
		assert_eq!(s[8], 0x34);
	}
}
