/*!
# Spindle: Rip Buffer
*/

use crate::{
	BYTES_PER_SECTOR,
	CD_DATA_C2_SIZE,
	CD_DATA_SUB_SIZE,
	CD_SUB_SIZE,
	CdbGate,
	Mmc,
	mmc::ReadForm,
	SpindleError,
};



#[derive(Debug)]
/// # Rip Buffer.
///
/// All sorts of different block sizes are needed for different contexts.
/// This struct is sized for the biggest — audio + C2 — and sub-sliced
/// for everything smaller. One buffer for all!
pub(crate) struct RipBuffer([u8; CD_DATA_C2_SIZE as usize]);

impl RipBuffer {
	#[inline]
	/// # New Instance.
	pub(crate) const fn new() -> Self { Self([0; CD_DATA_C2_SIZE as usize]) }

	/// # Read a Sector.
	///
	/// Fetch audio (plus C2 pointers when enabled) for the given LBA.
	/// Returns `true` when no C2 error bits were raised.
	///
	/// Negative addresses sit in the unreadable lead-in; they come back
	/// as clean silence so offset handling doesn't need special cases.
	///
	/// ## Errors
	///
	/// Relays transport errors (already retried by the command layer).
	pub(crate) fn read_sector<G: CdbGate>(
		&mut self,
		mmc: &mut Mmc<G>,
		lba: i32,
		c2: bool,
	) -> Result<bool, SpindleError> {
		if lba < 0 {
			self.0.fill(0);
			return Ok(true);
		}

		if c2 {
			// Assume the worst until the read says otherwise.
			self.set_bad();
			mmc.read_cd(lba, 1, ReadForm::AudioC2, &mut self.0)?;
			Ok(self.all_good())
		}
		else {
			mmc.read_cd(lba, 1, ReadForm::Audio, self.data_mut())?;
			Ok(true)
		}
	}

	/// # Read a Sector With Raw Subchannel.
	///
	/// Fill `sub` with the sector's 96 raw P-W bytes. The audio half of
	/// the response lands in the buffer too, but doesn't vote; the
	/// consensus only trusts the C2-accompanied reads.
	///
	/// ## Errors
	///
	/// Relays transport errors.
	pub(crate) fn read_raw_sub<G: CdbGate>(
		&mut self,
		mmc: &mut Mmc<G>,
		lba: i32,
		sub: &mut [u8],
	) -> Result<(), SpindleError> {
		if sub.len() != CD_SUB_SIZE as usize {
			return Err(SpindleError::Bug("invalid subchannel buffer size"));
		}
		if lba < 0 {
			sub.fill(0);
			return Ok(());
		}

		mmc.read_cd(lba, 1, ReadForm::AudioRawSub, &mut self.0[..CD_DATA_SUB_SIZE as usize])?;
		sub.copy_from_slice(&self.0[BYTES_PER_SECTOR as usize..CD_DATA_SUB_SIZE as usize]);
		Ok(())
	}
}

impl RipBuffer {
	#[must_use]
	/// # The Audio Payload.
	pub(crate) fn data(&self) -> &[u8] { &self.0[..BYTES_PER_SECTOR as usize] }

	/// # The Audio Payload (Mutable).
	fn data_mut(&mut self) -> &mut [u8] { &mut self.0[..BYTES_PER_SECTOR as usize] }

	#[must_use]
	/// # Count C2-Flagged Bytes.
	///
	/// One bit per payload byte; the popcount of the trailing 294 bytes.
	pub(crate) fn c2_errors(&self) -> u32 {
		self.0[BYTES_PER_SECTOR as usize..]
			.iter()
			.map(|v| v.count_ones())
			.sum()
	}

	/// # No C2 Errors?
	fn all_good(&self) -> bool {
		self.0.iter().skip(BYTES_PER_SECTOR as usize).all(|v| 0.eq(v))
	}

	#[inline]
	/// # Mark All C2 Bad.
	fn set_bad(&mut self) {
		for v in &mut self.0[BYTES_PER_SECTOR as usize..] { *v = 0b1111_1111; }
	}
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_c2_accounting() {
		let mut buf = RipBuffer::new();
		assert!(buf.all_good());
		assert_eq!(buf.c2_errors(), 0);

		buf.set_bad();
		assert!(! buf.all_good());
		assert_eq!(buf.c2_errors(), 294 * 8);

		buf.0.fill(0);
		buf.0[BYTES_PER_SECTOR as usize] = 0b0000_1010;
		assert!(! buf.all_good());
		assert_eq!(buf.c2_errors(), 2);
	}
}
