/*!
# Spindle: Release Check
*/

use serde::Deserialize;
use std::time::Duration;



/// # Latest-Release Endpoint.
const RELEASES_URL: &str = "https://api.github.com/repos/spindle-rs/spindle/releases/latest";



#[derive(Debug, Deserialize)]
/// # The Two Fields We Care About.
struct Release {
	/// # Version Tag.
	tag_name: String,

	/// # Human Landing Page.
	html_url: String,
}

/// # Check for a Newer Release.
///
/// Returns `(version, url)` when the latest published tag outranks this
/// build. Every possible failure — offline, rate-limited, weird JSON —
/// collapses to `None`; an update nag is never worth an error message.
#[must_use]
pub fn check_for_update() -> Option<(String, String)> {
	let agent = ureq::AgentBuilder::new()
		.timeout(Duration::from_secs(5))
		.user_agent(concat!("spindle/", env!("CARGO_PKG_VERSION")))
		.build();

	let raw = agent.get(RELEASES_URL)
		.set("Accept", "application/vnd.github+json")
		.call()
		.ok()?
		.into_string()
		.ok()?;
	let release: Release = serde_json::from_str(&raw).ok()?;

	let remote = parse_version(&release.tag_name)?;
	let local = parse_version(env!("CARGO_PKG_VERSION"))?;
	if local < remote {
		Some((release.tag_name, release.html_url))
	}
	else { None }
}

/// # Loose Semver Triplet.
///
/// Accepts an optional leading `v` and ignores anything after the third
/// number.
fn parse_version(src: &str) -> Option<(u16, u16, u16)> {
	let src = src.trim().trim_start_matches(['v', 'V']);
	let mut parts = src.split('.');
	let a = parts.next()?.parse().ok()?;
	let b = parts.next().unwrap_or("0").parse().ok()?;
	let c = parts.next()
		.map_or(Some(0), |v| {
			v.chars()
				.take_while(char::is_ascii_digit)
				.collect::<String>()
				.parse()
				.ok()
		})?;
	Some((a, b, c))
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_parse_version() {
		assert_eq!(parse_version("1.2.3"), Some((1, 2, 3)));
		assert_eq!(parse_version("v0.3.0"), Some((0, 3, 0)));
		assert_eq!(parse_version("v2.1"), Some((2, 1, 0)));
		assert_eq!(parse_version("1.2.3-rc1"), Some((1, 2, 3)));
		assert_eq!(parse_version("bananas"), None);

		// Ordering works the tuple way.
		assert!(parse_version("0.3.1") > parse_version("0.3.0"));
		assert!(parse_version("1.0.0") > parse_version("0.99.99"));
	}
}
