/*!
# Spindle: Library
*/

#![deny(
	clippy::allow_attributes_without_reason,
	clippy::correctness,
	unreachable_pub,
	unsafe_code,
)]

#![warn(
	clippy::complexity,
	clippy::nursery,
	clippy::pedantic,
	clippy::perf,
	clippy::style,

	clippy::allow_attributes,
	clippy::clone_on_ref_ptr,
	clippy::create_dir,
	clippy::filetype_is_file,
	clippy::format_push_string,
	clippy::get_unwrap,
	clippy::impl_trait_in_params,
	clippy::lossy_float_literal,
	clippy::missing_assert_message,
	clippy::missing_docs_in_private_items,
	clippy::needless_raw_strings,
	clippy::panic_in_result_fn,
	clippy::pub_without_shorthand,
	clippy::rest_pat_in_fully_bound_structs,
	clippy::semicolon_inside_block,
	clippy::str_to_string,
	clippy::string_to_string,
	clippy::todo,
	clippy::undocumented_unsafe_blocks,
	clippy::unneeded_field_pattern,
	clippy::unseparated_literal_suffix,
	clippy::unwrap_in_result,

	macro_use_extern_crate,
	missing_copy_implementations,
	missing_docs,
	non_ascii_idents,
	trivial_casts,
	trivial_numeric_casts,
	unused_crate_dependencies,
	unused_extern_crates,
	unused_import_braces,
)]

#![expect(clippy::redundant_pub_crate, reason = "Unresolvable.")]

mod abort;
mod accuraterip;
mod cdtext;
mod disc;
mod drive;
mod error;
mod ids;
mod image;
mod mmc;
mod msf;
mod rip;
mod scan;
mod scsi;
mod subq;
mod toc;
mod update;
mod write;

#[cfg(test)]
mod sim;

pub use abort::KillSwitch;
pub use accuraterip::{
	ArPressings,
	ArVerdict,
	fetch_checksums,
	TrackCrc,
};
pub use cdtext::CdTextInfo;
pub use disc::{
	Disc,
	DiscInfo,
	Isrc,
	Mcn,
	Track,
	TrackAudio,
};
pub use drive::{
	DriveVendorModel,
	ReadOffset,
};
pub use error::SpindleError;
pub use ids::{
	AccurateRipId,
	CddbId,
};
pub use image::{
	CueSheet,
	CueTrack,
	DiscImage,
};
pub use mmc::{
	Mmc,
	ReadForm,
};
pub use msf::Msf;
pub use rip::{
	opts::{
		RipMode,
		SecureRipConfig,
	},
	SecureRipResult,
	TrackRipStats,
};
pub use scan::{
	ScanConfig,
	ScanKind,
	ScanReport,
};
pub use scsi::{
	Cdb,
	CdbGate,
	CdDrive,
	Sense,
	Xfer,
};
pub use subq::SubQ;
pub use update::check_for_update;
pub use write::{
	BlankKind,
	BurnConfig,
	Burner,
	BurnState,
};



// Sector Geometry
// ---------------

/// # Bytes Per Sample.
pub(crate) const BYTES_PER_SAMPLE: u16 = 4;

/// # Samples Per Sector.
pub const SAMPLES_PER_SECTOR: u16 = 588;

/// # Bytes Per (Audio) Sector.
///
/// This is the number of bytes per sector of _audio_ data. Block sizes
/// may carry additional information.
pub const BYTES_PER_SECTOR: u16 = SAMPLES_PER_SECTOR * BYTES_PER_SAMPLE;

/// # Size of a C2 Block.
///
/// One bit per audio byte: 294 bytes. (Some drives also speak a 296-byte
/// variant with a redundant block bit; we don't ask for it.)
pub(crate) const CD_C2_SIZE: u16 = 294;

/// # Combined Size of Data + C2.
pub(crate) const CD_DATA_C2_SIZE: u16 = BYTES_PER_SECTOR + CD_C2_SIZE;

/// # Size of the Raw P-W Subchannel Block.
pub const CD_SUB_SIZE: u16 = 96;

/// # Combined Size of Data + Raw Subchannel.
pub(crate) const CD_DATA_SUB_SIZE: u16 = BYTES_PER_SECTOR + CD_SUB_SIZE;

/// # Number of Lead-In Sectors.
///
/// All discs have a two-second region at the start before any user
/// data. Different contexts include or exclude this amount, so it's good
/// to keep it handy.
pub(crate) const CD_LEADIN: u32 = 150;
