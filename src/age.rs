use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use smartstring::alias::{String as SmartString};

use super::error::Error;


/// Standard age bucket of the tidy tables.
///
/// Ordering follows the natural age order, with `Total` sorting last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Age {
	/// Ten-year bucket `10*n`..=`10*n+9`, with `n` in `0..=8`.
	Decade(u8),
	Over90,
	/// Unbucketed total over all ages ("TOT").
	Total,
}

impl Age {
	pub const BUCKETS: [Age; 10] = [
		Age::Decade(0),
		Age::Decade(1),
		Age::Decade(2),
		Age::Decade(3),
		Age::Decade(4),
		Age::Decade(5),
		Age::Decade(6),
		Age::Decade(7),
		Age::Decade(8),
		Age::Over90,
	];

	pub fn from_years(years: u32) -> Self {
		if years >= 90 {
			Self::Over90
		} else {
			Self::Decade((years / 10) as u8)
		}
	}
}

impl fmt::Display for Age {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Decade(n) => {
				let lower = 10 * (*n as u32);
				write!(f, "{}-{}", lower, lower + 9)
			},
			Self::Over90 => f.write_str("90+"),
			Self::Total => f.write_str("TOT"),
		}
	}
}

impl FromStr for Age {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"TOT" => return Ok(Self::Total),
			"90+" => return Ok(Self::Over90),
			_ => (),
		}
		let (low, high) = match s.split_once('-') {
			Some(v) => v,
			None => return Err(Error::UnknownAge(s.into())),
		};
		let (low, high) = match (low.parse::<u32>(), high.parse::<u32>()) {
			(Ok(low), Ok(high)) => (low, high),
			_ => return Err(Error::UnknownAge(s.into())),
		};
		if low % 10 != 0 || high != low + 9 || low >= 90 {
			return Err(Error::UnknownAge(s.into()))
		}
		Ok(Self::Decade((low / 10) as u8))
	}
}

impl Serialize for Age {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
		where S: Serializer
	{
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for Age {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
		where D: Deserializer<'de>
	{
		let s = String::deserialize(deserializer)?;
		FromStr::from_str(&s).map_err(de::Error::custom)
	}
}


fn parse_years(s: &str) -> Option<u32> {
	s.trim().parse::<u32>().ok()
}

/// Resolve a raw age label to its standard bucket.
///
/// Understands plain integers, `<N`, `>N`, `N+`, `N and above`,
/// `N or above`, ranges within a single bucket and anything mentioning
/// months (infants). Returns `None` for everything else.
pub fn resolve_age(raw: &str) -> Option<Age> {
	let s = raw.trim();
	if let Some(years) = parse_years(s) {
		return Some(Age::from_years(years))
	}
	let lower = s.to_lowercase();
	if lower.contains("month") {
		return Some(Age::Decade(0))
	}
	if let Some(rest) = s.strip_prefix('<') {
		return Some(Age::from_years(parse_years(rest)?.saturating_sub(1)))
	}
	if let Some(rest) = s.strip_prefix('>') {
		return Some(Age::from_years(parse_years(rest)?.checked_add(1)?))
	}
	if let Some(rest) = s.strip_suffix('+') {
		return Some(Age::from_years(parse_years(rest)?))
	}
	for suffix in ["and above", "or above", "and over", "or over"].iter() {
		if let Some(rest) = lower.strip_suffix(suffix) {
			return Some(Age::from_years(parse_years(rest)?))
		}
	}
	let (low, high) = s.split_once('-')?;
	let low = Age::from_years(parse_years(low)?);
	let high = Age::from_years(parse_years(high)?);
	if low == high {
		Some(low)
	} else {
		None
	}
}

/// Map a raw age label to the label of its standard bucket.
///
/// Unparseable labels come back verbatim; callers filter them against
/// the bucket set afterwards.
pub fn map_age(raw: &str) -> SmartString {
	match resolve_age(raw) {
		Some(age) => age.to_string().into(),
		None => raw.into(),
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	fn m(s: &str) -> String {
		map_age(s).to_string()
	}

	#[test]
	fn integer_ages_map_to_decades() {
		for a in 0u32..90 {
			let lower = 10 * (a / 10);
			assert_eq!(m(&a.to_string()), format!("{}-{}", lower, lower + 9));
		}
		for a in &[90u32, 91, 99, 100, 117] {
			assert_eq!(m(&a.to_string()), "90+");
		}
	}

	#[test]
	fn boundaries() {
		assert_eq!(m("0"), "0-9");
		assert_eq!(m("10"), "10-19");
		assert_eq!(m("80"), "80-89");
		assert_eq!(m("89"), "80-89");
	}

	#[test]
	fn months_are_infants() {
		assert_eq!(m("6 months"), "0-9");
		assert_eq!(m("11 Months"), "0-9");
	}

	#[test]
	fn qualifiers() {
		assert_eq!(m("<1"), "0-9");
		assert_eq!(m("<10"), "0-9");
		assert_eq!(m("<18"), "10-19");
		assert_eq!(m(">90"), "90+");
		assert_eq!(m(">70"), "70-79");
		assert_eq!(m("80+"), "80-89");
		assert_eq!(m("90 and above"), "90+");
		assert_eq!(m("60 or above"), "60-69");
		assert_eq!(m("90-99"), "90+");
		assert_eq!(m("100-109"), "90+");
		assert_eq!(m("20-29"), "20-29");
	}

	#[test]
	fn unparseable_labels_pass_through() {
		assert_eq!(m("Not Reported"), "Not Reported");
		assert_eq!(m("65-79"), "65-79");
		assert_eq!(m("TOT"), "TOT");
		assert_eq!(m(">4294967295"), ">4294967295");
		assert_eq!(m("<0"), "0-9");
	}

	#[test]
	fn parse_accepts_only_bucket_set() {
		for age in Age::BUCKETS.iter() {
			assert_eq!(age.to_string().parse::<Age>().unwrap(), *age);
		}
		assert_eq!("TOT".parse::<Age>().unwrap(), Age::Total);
		assert!("65-79".parse::<Age>().is_err());
		assert!("90-99".parse::<Age>().is_err());
		assert!("5".parse::<Age>().is_err());
	}

	#[test]
	fn ordering_follows_age() {
		let mut ages = vec![Age::Total, Age::Over90, Age::Decade(3), Age::Decade(0)];
		ages.sort();
		assert_eq!(ages, vec![Age::Decade(0), Age::Decade(3), Age::Over90, Age::Total]);
	}
}
