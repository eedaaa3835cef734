/*!
# Spindle: SCSI Transport

Somewhat useful documentation:
<https://www.t10.org/ftp/t10/document.97/97-117r0.pdf>
*/

use crate::{
	DriveVendorModel,
	SpindleError,
};
use libcdio_sys::{
	driver_id_t_DRIVER_DEVICE, // The equivalent of "use whatever's best".
	driver_return_code_t_DRIVER_OP_NOT_PERMITTED,
	driver_return_code_t_DRIVER_OP_SUCCESS,
	driver_return_code_t_DRIVER_OP_UNSUPPORTED,
};
use std::{
	ffi::CString,
	os::unix::ffi::OsStrExt,
	path::Path,
	sync::Once,
	time::Duration,
};



/// # Default Command Timeout.
pub(crate) const TIMEOUT_DEFAULT: Duration = Duration::from_secs(10);

/// # READ CD Timeout.
pub(crate) const TIMEOUT_READ: Duration = Duration::from_secs(30);

/// # Full-Blank Timeout.
pub(crate) const TIMEOUT_BLANK: Duration = Duration::from_secs(60 * 60);

/// # CLOSE TRACK/SESSION Timeout.
pub(crate) const TIMEOUT_CLOSE: Duration = Duration::from_secs(5 * 60);

/// # Initialization Counter.
static LIBCDIO_INIT: Once = Once::new();



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Transfer Direction.
pub enum Xfer {
	/// # No Data Phase.
	None,

	/// # Drive to Host.
	Read,

	/// # Host to Drive.
	Write,
}



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # A Command Descriptor Block.
///
/// Six, ten, twelve, or sixteen bytes of opaque command, padded out to a
/// fixed-size array so the whole thing stays `Copy`.
pub struct Cdb {
	/// # The Bytes.
	bytes: [u8; 16],

	/// # Meaningful Length.
	len: u8,
}

impl Cdb {
	#[must_use]
	/// # New.
	///
	/// Build a CDB from a 6/10/12/16-byte slice. Anything else is a
	/// programming error and gets the empty TEST UNIT READY treatment.
	pub fn new(src: &[u8]) -> Self {
		let mut bytes = [0_u8; 16];
		if matches!(src.len(), 6 | 10 | 12 | 16) {
			bytes[..src.len()].copy_from_slice(src);
			Self { bytes, len: src.len() as u8 }
		}
		else { Self { bytes, len: 6 } }
	}

	#[must_use]
	/// # From Pre-Padded Parts.
	///
	/// Const-friendly constructor for the command builders; the length is
	/// trusted.
	pub(crate) const fn from_parts(bytes: [u8; 16], len: u8) -> Self {
		Self { bytes, len }
	}

	#[must_use]
	/// # As Slice.
	pub fn as_slice(&self) -> &[u8] { &self.bytes[..usize::from(self.len)] }

	#[must_use]
	/// # Full (Padded) Array.
	pub(crate) const fn raw(&self) -> [u8; 16] { self.bytes }

	#[must_use]
	/// # Operation Code.
	pub const fn opcode(&self) -> u8 { self.bytes[0] }
}



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Decoded Sense Data.
///
/// The sense key/ASC/ASCQ triple from a CHECK CONDITION response, pulled
/// from either fixed (0x70/0x71) or descriptor (0x72/0x73) format data.
pub struct Sense {
	/// # Sense Key.
	pub key: u8,

	/// # Additional Sense Code.
	pub asc: u8,

	/// # Additional Sense Code Qualifier.
	pub ascq: u8,
}

impl Sense {
	/// # Parse Raw Sense Bytes.
	pub(crate) fn parse(raw: &[u8]) -> Option<Self> {
		let fmt = raw.first()? & 0x7F;
		match fmt {
			// Fixed format: key at 2, ASC/ASCQ at 12/13.
			0x70 | 0x71 if 14 <= raw.len() => Some(Self {
				key: raw[2] & 0x0F,
				asc: raw[12],
				ascq: raw[13],
			}),
			// Descriptor format keeps them up front.
			0x72 | 0x73 if 4 <= raw.len() => Some(Self {
				key: raw[1] & 0x0F,
				asc: raw[2],
				ascq: raw[3],
			}),
			_ => None,
		}
	}

	#[must_use]
	/// # As Error.
	///
	/// Promote the triple to the corresponding crate error, special-casing
	/// the media conditions worth telling users about by name.
	pub(crate) const fn into_error(self) -> SpindleError {
		match (self.key, self.asc) {
			// NOT READY: no disc, tray open, becoming ready…
			(0x02, _) | (_, 0x3A) => SpindleError::MediaNotReady,
			// Write-protected or incompatible medium.
			(0x07, _) | (_, 0x30) => SpindleError::MediaNotWritable,
			_ => SpindleError::CheckCondition(self.key, self.asc, self.ascq),
		}
	}
}



/// # CDB Gate.
///
/// The one and only transport operation: submit a command descriptor
/// block, move some bytes, return how many came back. Everything above
/// this trait is portable; everything below it is host glue.
///
/// Discipline: at most one outstanding CDB per gate, enforced by `&mut`.
pub trait CdbGate {
	/// # Submit a CDB.
	///
	/// ## Errors
	///
	/// Returns `DeviceGone` if the handle has been invalidated, `IoTimeout`
	/// if the device stayed silent, `CheckCondition` (or a more specific
	/// media error) when the drive reports non-zero sense, and
	/// `ShortTransfer` when fewer bytes arrived than requested.
	fn submit(
		&mut self,
		cdb: &Cdb,
		dir: Xfer,
		buf: &mut [u8],
		timeout: Duration,
	) -> Result<usize, SpindleError>;
}



#[derive(Debug)]
/// # A Real Optical Drive.
///
/// All drive communications funnel through a single `libcdio` object whose
/// generic MMC pass-through does the actual CDB exchange. Every interface
/// on the C side is unsafe and awkward, so this struct exists to abstract
/// away the noise and handle cleanup.
pub struct CdDrive {
	/// # Device Path, If Explicit.
	dev: Option<CString>,

	/// # The Instance.
	ptr: *mut libcdio_sys::CdIo_t,
}

impl Drop for CdDrive {
	#[allow(unsafe_code, reason = "Releasing the C memory.")]
	fn drop(&mut self) {
		if ! self.ptr.is_null() {
			// Safety: the pointer was non-null at construction and is only
			// ever freed here.
			unsafe { libcdio_sys::cdio_destroy(self.ptr); }
			self.dev.take();
		}
	}
}

impl CdDrive {
	#[allow(unsafe_code, reason = "The C library requires it.")]
	/// # Open a Drive.
	///
	/// Connect to the given device, or whatever `libcdio` considers the
	/// default optical drive if `None`.
	///
	/// ## Errors
	///
	/// This will return an error if initialization fails or the provided
	/// device path is obviously wrong.
	pub fn open<P>(dev: Option<P>) -> Result<Self, SpindleError>
	where P: AsRef<Path> {
		// Make sure the library has been initialized.
		init();

		// Take a look at the desired device.
		let dev = {
			if let Some(dev) = dev {
				let dev = dev.as_ref();
				let original: String = dev.to_string_lossy().into_owned();
				if ! dev.exists() {
					return Err(SpindleError::DeviceOpen(Some(original)));
				}
				let dev = CString::new(dev.as_os_str().as_bytes())
					.map_err(|_| SpindleError::DeviceOpen(Some(original)))?;
				Some(dev)
			}
			else { None }
		};

		// Connect to it.
		// Safety: null device pointers select the system default.
		let ptr = unsafe {
			libcdio_sys::cdio_open(
				dev.as_ref().map_or_else(std::ptr::null, |v| v.as_ptr()),
				driver_id_t_DRIVER_DEVICE,
			)
		};

		// NULL is bad.
		if ptr.is_null() {
			Err(SpindleError::DeviceOpen(dev.map(|v| v.to_string_lossy().into_owned())))
		}
		else { Ok(Self { dev, ptr }) }
	}

	#[allow(unsafe_code, reason = "The C library requires it.")]
	#[must_use]
	/// # Drive Vendor/Model.
	///
	/// Fetch the hardware identification, used for offset/cache lookups
	/// and log headers.
	pub fn vendor_model(&self) -> Option<DriveVendorModel> {
		use dactyl::traits::SaturatingFrom;

		let mut raw = libcdio_sys::cdio_hwinfo {
			psz_vendor: [0; 9],
			psz_model: [0; 17],
			psz_revision: [0; 5],
		};

		// The return code is a bool, true for good, instead of the usual
		// 0 for good.
		// Safety: the struct is sized per the header.
		if 1 == unsafe { libcdio_sys::cdio_get_hwinfo(self.ptr, &mut raw) } {
			// Recast the signs since we have everything right here.
			let vendor_u8 = raw.psz_vendor.map(u8::saturating_from);
			let model_u8 = raw.psz_model.map(u8::saturating_from);

			let vendor = nul_str(&vendor_u8);
			let model = nul_str(&model_u8);
			if model.is_empty() { None }
			else { DriveVendorModel::new(vendor, model).ok() }
		}
		else { None }
	}
}

impl CdbGate for CdDrive {
	#[allow(unsafe_code, reason = "The C library requires it.")]
	#[allow(non_upper_case_globals, reason = "These aren't our globals.")]
	/// # Submit a CDB.
	///
	/// Hand the command to `libcdio`'s generic MMC runner and translate
	/// its unhelpfully flat return codes back into the error taxonomy,
	/// fishing out the sense data where there is any.
	fn submit(
		&mut self,
		cdb: &Cdb,
		dir: Xfer,
		buf: &mut [u8],
		timeout: Duration,
	) -> Result<usize, SpindleError> {
		if self.ptr.is_null() { return Err(SpindleError::DeviceGone); }

		let raw = libcdio_sys::mmc_cdb_t { field: cdb.raw() };
		let direction = match dir {
			Xfer::Read | Xfer::None => libcdio_sys::cdio_mmc_direction_e_SCSI_MMC_DATA_READ,
			Xfer::Write => libcdio_sys::cdio_mmc_direction_e_SCSI_MMC_DATA_WRITE,
		};
		let len =
			if matches!(dir, Xfer::None) { 0 }
			else {
				u32::try_from(buf.len()).map_err(|_| SpindleError::RipOverflow)?
			};
		let timeout_ms = u32::try_from(timeout.as_millis())
			.map_err(|_| SpindleError::RipOverflow)?;

		// Safety: buffer and CDB live for the duration of the call; the
		// length is the buffer's true length.
		let res = unsafe {
			libcdio_sys::mmc_run_cmd(
				self.ptr,
				timeout_ms,
				std::ptr::addr_of!(raw),
				direction,
				len,
				buf.as_mut_ptr().cast(),
			)
		};

		match res {
			driver_return_code_t_DRIVER_OP_SUCCESS => Ok(buf.len()),
			driver_return_code_t_DRIVER_OP_NOT_PERMITTED |
			driver_return_code_t_DRIVER_OP_UNSUPPORTED =>
				Err(SpindleError::FeatureUnsupported("this command")),
			_ => Err(self.last_sense().map_or(SpindleError::IoTimeout, Sense::into_error)),
		}
	}
}

impl CdDrive {
	#[allow(unsafe_code, reason = "The C library requires it.")]
	/// # Last-Command Sense.
	///
	/// Pull (and free) the sense data from the previous command, if the
	/// driver captured any.
	fn last_sense(&self) -> Option<Sense> {
		let mut pp: *mut libcdio_sys::cdio_mmc_request_sense_t = std::ptr::null_mut();

		// Safety: libcdio allocates the buffer; we free it below.
		let size = unsafe {
			libcdio_sys::mmc_last_cmd_sense(self.ptr, std::ptr::addr_of_mut!(pp))
		};
		if size <= 0 || pp.is_null() { return None; }

		// Read the raw bytes rather than fight the C bitfields.
		// Safety: `size` bytes were allocated for us.
		let raw = unsafe {
			std::slice::from_raw_parts(pp.cast::<u8>(), size.unsigned_abs() as usize)
		};
		let out = Sense::parse(raw);
		// Safety: libcdio handed us ownership.
		unsafe { libcdio_sys::cdio_free(pp.cast()); }
		out
	}
}



/// # Bytes Until NUL.
///
/// Return the leading non-NUL portion of a fixed C buffer as a string,
/// empty when the content isn't UTF-8.
fn nul_str(src: &[u8]) -> &str {
	let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
	std::str::from_utf8(&src[..end]).unwrap_or("")
}

/// # Initialize `libcdio`.
///
/// This is only called once, but to be safe, it is also wrapped in a
/// static to make sure it can never re-initialize.
#[allow(unsafe_code, reason = "The C library requires it.")]
fn init() {
	LIBCDIO_INIT.call_once(|| unsafe { libcdio_sys::cdio_init(); });
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_cdb() {
		let cdb = Cdb::new(&[0xBE, 0, 0, 0, 0x12, 0x34, 0, 0, 1, 0xF8, 0, 0]);
		assert_eq!(cdb.as_slice().len(), 12);
		assert_eq!(cdb.opcode(), 0xBE);

		// Bogus lengths collapse to a 6-byte no-op.
		let cdb = Cdb::new(&[0xBE, 0, 0]);
		assert_eq!(cdb.as_slice(), &[0, 0, 0, 0, 0, 0]);
	}

	#[test]
	fn t_sense() {
		// Fixed format: 02/3A/01 (medium not present, tray closed).
		let mut raw = [0_u8; 18];
		raw[0] = 0x70;
		raw[2] = 0x02;
		raw[12] = 0x3A;
		raw[13] = 0x01;
		let sense = Sense::parse(&raw).expect("Sense parse failed.");
		assert_eq!(sense, Sense { key: 0x02, asc: 0x3A, ascq: 0x01 });
		assert_eq!(sense.into_error(), SpindleError::MediaNotReady);

		// Descriptor format: 05/24/00 (invalid field in CDB).
		let raw = [0x72, 0x05, 0x24, 0x00];
		let sense = Sense::parse(&raw).expect("Sense parse failed.");
		assert_eq!(sense.into_error(), SpindleError::CheckCondition(5, 0x24, 0));

		// Garbage is garbage.
		assert!(Sense::parse(&[0xFF, 0, 0]).is_none());
		assert!(Sense::parse(&[]).is_none());
	}
}
