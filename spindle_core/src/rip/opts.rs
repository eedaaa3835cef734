/*!
# Spindle: Secure Rip Options
*/



/// # FLAG: Cache Defeat.
const FLAG_CACHE_DEFEAT: u8 = 0b0000_0001;

/// # FLAG: C2-Guided Re-Reads.
const FLAG_C2: u8 =           0b0000_0010;

/// # FLAG: Capture Raw Subchannel.
const FLAG_SUB: u8 =          0b0000_0100;

/// # FLAG: Default.
const FLAG_DEFAULT: u8 = FLAG_CACHE_DEFEAT | FLAG_C2;



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Rip Mode.
///
/// The coarse dial. Each mode seeds pass counts and agreement, which can
/// then be fine-tuned through the builder methods.
pub enum RipMode {
	/// # No Security Theater.
	///
	/// A single pass trusting whatever the hardware says, C2 included.
	Disabled,

	/// # Fast.
	///
	/// One pass when it comes back spotless, a second to confirm when it
	/// doesn't.
	Fast,

	#[default]
	/// # Standard.
	///
	/// Two agreeing passes, re-reading until consensus.
	Standard,

	/// # Paranoid.
	///
	/// Three agreeing passes and a bigger budget for arguments.
	Paranoid,

	/// # Burst.
	///
	/// One pass, no C2, no consensus; strictly for discs in a hurry.
	Burst,
}

impl RipMode {
	#[must_use]
	/// # As Str.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Disabled => "Disabled",
			Self::Fast => "Fast",
			Self::Standard => "Standard",
			Self::Paranoid => "Paranoid",
			Self::Burst => "Burst",
		}
	}

	/// # Preset (min passes, max passes, agreement).
	const fn preset(self) -> (u8, u8, u8) {
		match self {
			Self::Disabled | Self::Burst => (1, 1, 1),
			Self::Fast => (1, 2, 2),
			Self::Standard => (2, 4, 2),
			Self::Paranoid => (3, 8, 3),
		}
	}

	#[must_use]
	/// # Uses C2 Pointers?
	pub const fn c2(self) -> bool {
		! matches!(self, Self::Burst)
	}

	#[must_use]
	/// # Consensus Required?
	pub const fn consensus(self) -> bool {
		! matches!(self, Self::Disabled | Self::Burst)
	}
}



#[derive(Debug, Clone, Copy)]
/// # Secure Rip Configuration.
///
/// Options are set using builder-style methods, like:
///
/// ```
/// use spindle_core::{RipMode, SecureRipConfig};
///
/// let opts = SecureRipConfig::from(RipMode::Paranoid)
///     .with_passes(3, 10)
///     .with_cache_defeat(false);
///
/// assert_eq!(opts.min_passes(), 3);
/// assert_eq!(opts.max_passes(), 10);
/// assert!(! opts.cache_defeat());
/// ```
pub struct SecureRipConfig {
	/// # The Mode.
	mode: RipMode,

	/// # Minimum Full Passes.
	min_passes: u8,

	/// # Maximum Full Passes.
	max_passes: u8,

	/// # Agreement Threshold.
	agreement: u8,

	/// # Boolean Options.
	flags: u8,
}

impl Default for SecureRipConfig {
	#[inline]
	fn default() -> Self { Self::from(RipMode::Standard) }
}

impl From<RipMode> for SecureRipConfig {
	fn from(mode: RipMode) -> Self {
		let (min_passes, max_passes, agreement) = mode.preset();
		let flags =
			if mode.c2() { FLAG_DEFAULT }
			else { FLAG_DEFAULT & ! FLAG_C2 };
		Self { mode, min_passes, max_passes, agreement, flags }
	}
}

impl SecureRipConfig {
	#[must_use]
	/// # With Pass Bounds.
	///
	/// At least one pass, and never fewer maximums than minimums. Values
	/// cap at sixteen to give the drive a break.
	pub const fn with_passes(self, mut min: u8, mut max: u8) -> Self {
		if min == 0 { min = 1; }
		else if 16 < min { min = 16; }
		if max < min { max = min; }
		else if 16 < max { max = 16; }
		Self {
			min_passes: min,
			max_passes: max,
			..self
		}
	}

	#[must_use]
	/// # With Agreement Threshold.
	///
	/// The number of identical observations a sector needs before its
	/// samples count as verified. Capped at `1..=8`.
	pub const fn with_agreement(self, mut agreement: u8) -> Self {
		if agreement == 0 { agreement = 1; }
		else if 8 < agreement { agreement = 8; }
		Self {
			agreement,
			..self
		}
	}

	#[must_use]
	/// # With Cache Defeat.
	///
	/// Purge the drive's read buffer between re-reads of the same sector
	/// so "agreement" means the laser agreed, not the RAM. Automatically
	/// skipped at run time when the drive advertises Accurate Stream.
	///
	/// The default is enabled.
	pub const fn with_cache_defeat(self, cache_defeat: bool) -> Self {
		let flags =
			if cache_defeat { self.flags | FLAG_CACHE_DEFEAT }
			else { self.flags & ! FLAG_CACHE_DEFEAT };

		Self {
			flags,
			..self
		}
	}

	#[must_use]
	/// # With C2-Guided Re-Reads.
	///
	/// Quarantine sectors whose C2 bitmap lights up and re-read them in
	/// isolation after the sequential pass.
	///
	/// The default follows the mode (on for everything but Burst).
	pub const fn with_c2(self, c2: bool) -> Self {
		let flags =
			if c2 { self.flags | FLAG_C2 }
			else { self.flags & ! FLAG_C2 };

		Self {
			flags,
			..self
		}
	}

	#[must_use]
	/// # With Raw Subchannel Capture.
	///
	/// Collect the 96-byte raw P-W stream alongside the audio so a `.sub`
	/// file can ride along with the bin.
	///
	/// The default is disabled.
	pub const fn with_subchannel(self, sub: bool) -> Self {
		let flags =
			if sub { self.flags | FLAG_SUB }
			else { self.flags & ! FLAG_SUB };

		Self {
			flags,
			..self
		}
	}
}

impl SecureRipConfig {
	#[must_use]
	/// # Mode.
	pub const fn mode(&self) -> RipMode { self.mode }

	#[must_use]
	/// # Minimum Passes.
	pub const fn min_passes(&self) -> u8 { self.min_passes }

	#[must_use]
	/// # Maximum Passes.
	pub const fn max_passes(&self) -> u8 { self.max_passes }

	#[must_use]
	/// # Agreement Threshold.
	pub const fn agreement(&self) -> u8 { self.agreement }

	#[must_use]
	/// # Bust Cache?
	pub const fn cache_defeat(&self) -> bool {
		FLAG_CACHE_DEFEAT == self.flags & FLAG_CACHE_DEFEAT
	}

	#[must_use]
	/// # C2-Guided?
	pub const fn c2_guided(&self) -> bool { FLAG_C2 == self.flags & FLAG_C2 }

	#[must_use]
	/// # Capture Subchannel?
	pub const fn subchannel(&self) -> bool { FLAG_SUB == self.flags & FLAG_SUB }
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_presets() {
		let opts = SecureRipConfig::from(RipMode::Fast);
		assert_eq!(opts.min_passes(), 1);
		assert_eq!(opts.max_passes(), 2);
		assert_eq!(opts.agreement(), 2);
		assert!(opts.c2_guided());

		let opts = SecureRipConfig::from(RipMode::Burst);
		assert_eq!(opts.max_passes(), 1);
		assert!(! opts.c2_guided());

		let opts = SecureRipConfig::from(RipMode::Paranoid);
		assert_eq!(opts.agreement(), 3);
	}

	#[test]
	fn t_clamps() {
		let opts = SecureRipConfig::default().with_passes(0, 0);
		assert_eq!(opts.min_passes(), 1);
		assert_eq!(opts.max_passes(), 1);

		let opts = SecureRipConfig::default().with_passes(99, 2);
		assert_eq!(opts.min_passes(), 16);
		assert_eq!(opts.max_passes(), 16);

		let opts = SecureRipConfig::default().with_agreement(0);
		assert_eq!(opts.agreement(), 1);
		let opts = SecureRipConfig::default().with_agreement(200);
		assert_eq!(opts.agreement(), 8);
	}

	#[test]
	fn t_flags() {
		for v in [false, true] {
			assert_eq!(SecureRipConfig::default().with_cache_defeat(v).cache_defeat(), v);
			assert_eq!(SecureRipConfig::default().with_c2(v).c2_guided(), v);
			assert_eq!(SecureRipConfig::default().with_subchannel(v).subchannel(), v);
		}
	}
}
