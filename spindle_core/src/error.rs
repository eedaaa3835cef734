/*!
# Spindle: Errors
*/

use fyi_msg::Msg;
use std::{
	error::Error,
	fmt,
};



#[cfg(feature = "bin")]
/// # Help Text.
const HELP: &str = concat!(r"
   ______
  /      \    ", "\x1b[38;5;199mSpindle\x1b[0;38;5;69m v", env!("CARGO_PKG_VERSION"), "\x1b[0m", r"
 | () () |   Secure audio CD ripping,
  \  ==  /   verification, and raw
   |----|    DAO-96 writing.
   |____|

USAGE:
    spindle [OPTIONS]

Spindle is menu-driven; no arguments are required.

OPTIONS:
    -d, --dev <PATH>  The device path for the optical drive of interest,
                      like /dev/cdrom. [default: auto]
    -h, --help        Print help information to STDOUT and exit.
        --no-update   Skip the release check on startup.
    -V, --version     Print version information to STDOUT and exit.
");



#[derive(Debug, Clone, Eq, PartialEq)]
/// # Errors.
///
/// The taxonomy mirrors the failure modes of the drive stack: transport
/// problems first, then media, then plain old local I/O.
pub enum SpindleError {
	/// # Bug!
	Bug(&'static str),

	/// # User Abort.
	Cancelled,

	/// # Drive Returned Non-Zero Sense.
	///
	/// Carries the sense key, ASC, and ASCQ so post-mortem diagnosis is
	/// always possible.
	CheckCondition(u8, u8, u8),

	/// # Cue Sheet Parsing.
	CueParse(u32),

	/// # Drive Handle Gone.
	DeviceGone,

	/// # Unable to Open Device.
	DeviceOpen(Option<String>),

	/// # Unsupported Disc.
	DiscMode,

	/// # Invalid drive model.
	DriveModel,

	/// # Invalid drive vendor.
	DriveVendor,

	/// # Missing Drive Feature.
	FeatureUnsupported(&'static str),

	/// # Invalid Input.
	InvalidInput(&'static str),

	/// # Local Disk I/O.
	Io(String),

	/// # Command Timed Out.
	IoTimeout,

	/// # Invalid ISRC.
	Isrc,

	/// # Invalid Media Catalog Number.
	Mcn,

	/// # No (Usable) Media.
	MediaNotReady,

	/// # Media Cannot Be Written.
	MediaNotWritable,

	/// # No Track.
	NoTrack(u8),

	/// # Empty Lookup.
	///
	/// Note: an AccurateRip miss is *not* reported this way; the lookup
	/// returns an empty result instead. This covers genuinely absent
	/// things, like a bin/cue set that isn't there.
	NotFound,

	/// # Block Size/Flag Disagreement.
	ProtocolMismatch(&'static str),

	/// # Invalid Read Offset.
	ReadOffset,

	/// # Numbers Too Big.
	RipOverflow,

	/// # Short Transfer.
	///
	/// The drive returned fewer bytes than the CDB asked for.
	ShortTransfer(u32, u32),

	/// # Invalid Track Number.
	TrackNumber(u8),

	/// # Writing to Disk.
	Write(String),

	#[cfg(feature = "bin")]
	/// # CLI Parsing Failure.
	CliParse(&'static str),

	#[cfg(feature = "bin")]
	/// # Print Help (Not an Error).
	PrintHelp,

	#[cfg(feature = "bin")]
	/// # Print Version (Not an Error).
	PrintVersion,
}

impl Error for SpindleError {}

impl From<SpindleError> for Msg {
	#[inline]
	fn from(src: SpindleError) -> Self { Self::error(src.to_string()) }
}

impl fmt::Display for SpindleError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Bug(s) => write!(f, "Bug: {s}."),
			Self::Cancelled => f.write_str("Operation cancelled."),
			Self::CheckCondition(sk, asc, ascq) => write!(
				f,
				"Drive reported an error (SK {sk:02X} ASC {asc:02X} ASCQ {ascq:02X}); check the disc and try again.",
			),
			Self::CueParse(line) => write!(f, "Unable to parse cue sheet (line {line})."),
			Self::DeviceGone => f.write_str("The drive has vanished; reconnect it and restart."),
			Self::DeviceOpen(s) =>
				if let Some(s) = s { write!(f, "Unable to open connection with {s}.") }
				else {
					f.write_str("Unable to open connection with default optical drive.")
				},
			Self::DiscMode => f.write_str("Missing or unsupported disc type; only Red Book audio is supported."),
			Self::DriveModel => f.write_str("Invalid drive model."),
			Self::DriveVendor => f.write_str("Invalid drive vendor."),
			Self::FeatureUnsupported(s) => write!(f, "This drive does not support {s}."),
			Self::InvalidInput(s) => write!(f, "Invalid input: {s}."),
			Self::Io(s) => write!(f, "I/O error: {s}."),
			Self::IoTimeout => f.write_str("The drive did not respond in time; it may be struggling with the disc."),
			Self::Isrc => f.write_str("Invalid/unsupported ISRC."),
			Self::Mcn => f.write_str("Invalid/unsupported media catalog number."),
			Self::MediaNotReady => f.write_str("No usable disc in the drive; insert one and try again."),
			Self::MediaNotWritable => f.write_str("The disc cannot be written; use a blank CD-R or a CD-RW."),
			Self::NoTrack(n) =>
				if *n == 0 { f.write_str("There is no HTOA on this disc.") }
				else { write!(f, "There is no track #{n} on this disc.") },
			Self::NotFound => f.write_str("Nothing found."),
			Self::ProtocolMismatch(s) => write!(f, "Protocol mismatch: {s}."),
			Self::ReadOffset => f.write_str("Invalid read offset."),
			Self::RipOverflow => f.write_str("The numbers are too big for this system architecture."),
			Self::ShortTransfer(want, got) => write!(
				f,
				"Short transfer: wanted {want} bytes, got {got}.",
			),
			Self::TrackNumber(n) => write!(f, "Invalid track number ({n})."),
			Self::Write(s) => write!(f, "Unable to write to {s}."),

			#[cfg(feature = "bin")]
			Self::CliParse(s) => write!(f, "Unable to parse {s}."),

			#[cfg(feature = "bin")]
			Self::PrintHelp => f.write_str(HELP),

			#[cfg(feature = "bin")]
			Self::PrintVersion => f.write_str(concat!("Spindle v", env!("CARGO_PKG_VERSION"))),
		}
	}
}

impl SpindleError {
	#[must_use]
	/// # Retryable?
	///
	/// Returns `true` for transient transport conditions worth a second
	/// attempt. Device loss and protocol errors are terminal.
	pub const fn is_retryable(&self) -> bool {
		matches!(
			self,
			Self::IoTimeout | Self::CheckCondition(_, _, _) | Self::ShortTransfer(_, _)
		)
	}
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_retryable() {
		assert!(SpindleError::IoTimeout.is_retryable());
		assert!(SpindleError::CheckCondition(3, 0x11, 0).is_retryable());
		assert!(! SpindleError::DeviceGone.is_retryable());
		assert!(! SpindleError::Cancelled.is_retryable());
		assert!(! SpindleError::ProtocolMismatch("size").is_retryable());
	}
}
