/*!
# Spindle: Offset Correction
*/

use crate::{
	BYTES_PER_SAMPLE,
	ReadOffset,
};



/// # Shift the Disc Stream.
///
/// Apply a drive read offset to the whole concatenated program, in
/// place: a positive offset discards that many samples from the head and
/// appends silence at the tail; negative is the mirror image. Tracks get
/// sliced *after* this, so a sample straddling a boundary lands in
/// whichever track it belongs to.
pub(crate) fn shift_stream(data: &mut [u8], offset: ReadOffset) {
	let shift = usize::from(offset.samples_abs()) * usize::from(BYTES_PER_SAMPLE);
	if shift == 0 || data.is_empty() { return; }

	let len = data.len();
	if len <= shift {
		// A pathological offset on a microscopic stream: all silence.
		data.fill(0);
	}
	else if offset.is_negative() {
		// Push everything later; the head becomes silence.
		data.copy_within(0..len - shift, shift);
		data[..shift].fill(0);
	}
	else {
		// Pull everything earlier; the tail becomes silence.
		data.copy_within(shift.., 0);
		data[len - shift..].fill(0);
	}
}



#[cfg(test)]
mod test {
	use super::*;

	/// # A Recognizable Stream.
	fn stream(samples: usize) -> Vec<u8> {
		(0..samples * 4).map(|k| (k % 251) as u8).collect()
	}

	#[test]
	fn t_shift_positive() {
		// Scenario: +30 samples drops 120 bytes from the head and
		// appends 120 zero bytes at the tail.
		let original = stream(588 * 5);
		let mut shifted = original.clone();
		shift_stream(&mut shifted, ReadOffset::try_from(30_i16).unwrap());

		assert_eq!(shifted[..original.len() - 120], original[120..]);
		assert!(shifted[original.len() - 120..].iter().all(|&b| b == 0));
	}

	#[test]
	fn t_shift_negative() {
		let original = stream(588 * 5);
		let mut shifted = original.clone();
		shift_stream(&mut shifted, ReadOffset::try_from(-30_i16).unwrap());

		assert_eq!(shifted[120..], original[..original.len() - 120]);
		assert!(shifted[..120].iter().all(|&b| b == 0));
	}

	#[test]
	fn t_shift_reversible() {
		// Applying +N then −N recovers the original except for the first
		// and last N samples, which zero out.
		let original = stream(588 * 3);
		let mut data = original.clone();
		let n = 17_i16;

		shift_stream(&mut data, ReadOffset::try_from(n).unwrap());
		shift_stream(&mut data, ReadOffset::try_from(-n).unwrap());

		let edge = usize::from(n.unsigned_abs()) * 4;
		assert!(data[..edge].iter().all(|&b| b == 0));
		assert!(data[data.len() - edge..].iter().all(|&b| b == 0));
		assert_eq!(
			data[edge..data.len() - edge],
			original[edge..original.len() - edge],
		);
	}

	#[test]
	fn t_shift_degenerate() {
		// Zero offset: untouched.
		let original = stream(588);
		let mut data = original.clone();
		shift_stream(&mut data, ReadOffset::default());
		assert_eq!(data, original);

		// Offset bigger than the stream: all silence.
		let mut data = stream(4);
		shift_stream(&mut data, ReadOffset::try_from(588_i16).unwrap());
		assert!(data.iter().all(|&b| b == 0));
	}
}
