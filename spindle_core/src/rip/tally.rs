/*!
# Spindle: Sector Consensus
*/

use crate::BYTES_PER_SECTOR;



/// # Maximum Distinct Payloads Tracked.
///
/// A sector legitimately has one value; a handful of contenders is
/// already pathological. Beyond four, newcomers can only displace a
/// single-vote straggler.
const MAX_VARIANTS: usize = 4;

/// # Consecutive Clean C2 Reads to Clear Quarantine.
pub(super) const C2_CLEAR_STREAK: u8 = 2;



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Final Per-Sector Confidence.
pub(crate) enum SectorConfidence {
	/// # Verified.
	///
	/// The winning payload cleared the agreement threshold with no real
	/// competition.
	Verified,

	/// # Best Effort.
	///
	/// A plurality exists, but either it fell short of the threshold or
	/// something contradicted it along the way.
	BestEffort,

	/// # Unresolved.
	///
	/// Contested, error-riddled, or never successfully read at all.
	Unresolved,
}



#[derive(Debug, Default)]
/// # One Sector's Evidence.
///
/// A small multiset of observed 2352-byte payloads with vote counts,
/// ordered best-first, plus the running C2/error bookkeeping the
/// quarantine logic feeds on.
///
/// Payloads arriving under a C2 cloud don't get a vote; the best of them
/// is kept only as a last resort for sectors that never read cleanly.
pub(crate) struct SectorTally {
	/// # Clean Observations, Sorted by Votes (Descending).
	obs: Vec<(Box<[u8]>, u16)>,

	/// # Least-Bad C2-Flagged Payload.
	dirty: Option<Box<[u8]>>,

	/// # Any C2 Trouble, Ever?
	c2_dirty: bool,

	/// # Consecutive C2-Clean Reads.
	clean_streak: u8,

	/// # Failed Reads.
	errors: u16,
}

impl SectorTally {
	/// # New.
	pub(crate) fn new() -> Self { Self::default() }

	/// # Record a Clean Read.
	///
	/// The payload earns a vote, entering the list if it's new — or, when
	/// the list is full, displacing a single-vote also-ran.
	pub(crate) fn record_good(&mut self, data: &[u8]) {
		debug_assert!(data.len() == BYTES_PER_SECTOR as usize, "Sector payload size mismatch.");
		self.clean_streak = self.clean_streak.saturating_add(1);

		if let Some(pos) = self.obs.iter().position(|(v, _)| v.as_ref() == data) {
			self.obs[pos].1 = self.obs[pos].1.saturating_add(1);
			// Stable sort keeps first-seen ahead among ties.
			self.obs.sort_by(|a, b| b.1.cmp(&a.1));
		}
		else if self.obs.len() < MAX_VARIANTS {
			self.obs.push((data.into(), 1));
		}
		else if self.obs.last().is_some_and(|(_, c)| *c == 1) {
			// Enough already; recycle the worst straggler.
			let last = self.obs.len() - 1;
			self.obs[last].0 = data.into();
		}
	}

	/// # Record a C2-Flagged Read.
	///
	/// No vote, but remember the payload in case nothing better ever
	/// arrives, and reset the clean streak the quarantine loop watches.
	pub(crate) fn record_c2(&mut self, data: &[u8]) {
		self.c2_dirty = true;
		self.clean_streak = 0;
		if self.dirty.is_none() { self.dirty.replace(data.into()); }
	}

	/// # Record a Failed Read.
	pub(crate) fn record_error(&mut self) {
		self.clean_streak = 0;
		self.errors = self.errors.saturating_add(1);
	}
}

impl SectorTally {
	#[must_use]
	/// # The Winning Payload, If Any.
	pub(crate) fn best(&self) -> Option<&[u8]> {
		self.obs.first()
			.map(|(v, _)| v.as_ref())
			.or(self.dirty.as_deref())
	}

	#[must_use]
	/// # Judge the Evidence.
	///
	/// Verified needs the winner at or above the agreement threshold
	/// with no competitor holding more than one vote; a mere plurality
	/// is best-effort; ties, empties, and C2-only data are unresolved.
	pub(crate) fn confidence(&self, agreement: u8) -> SectorConfidence {
		let Some(&(_, top)) = self.obs.first() else {
			return SectorConfidence::Unresolved;
		};
		let runner_up = self.obs.get(1).map_or(0, |(_, c)| *c);

		if u16::from(agreement) <= top && runner_up <= 1 {
			SectorConfidence::Verified
		}
		else if runner_up < top { SectorConfidence::BestEffort }
		else { SectorConfidence::Unresolved }
	}

	#[must_use]
	/// # Spotless?
	///
	/// One value, no C2, no errors: the fast-path exit condition.
	pub(crate) fn spotless(&self) -> bool {
		! self.c2_dirty && self.errors == 0 && self.obs.len() == 1
	}

	#[must_use]
	/// # Ever Read Successfully?
	pub(crate) const fn touched(&self) -> bool {
		! self.obs.is_empty() || self.dirty.is_some()
	}

	#[must_use]
	/// # C2 Cloud Still Hanging?
	///
	/// True until the sector has read cleanly twice in a row after any
	/// C2 report.
	pub(crate) const fn c2_pending(&self) -> bool {
		self.c2_dirty && self.clean_streak < C2_CLEAR_STREAK
	}
}
