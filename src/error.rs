use std::fmt;
use std::io;

use smartstring::alias::{String as SmartString};

use super::tidy::Sex;


#[derive(Debug)]
pub enum Error {
	Io(io::Error),
	Csv(csv::Error),
	Request(reqwest::Error),
	Status{url: String, status: reqwest::StatusCode},
	InvalidDate(String),
	InvalidValue(String),
	UnknownAge(String),
	UnknownSex(String),
	MissingColumn(String),
	UnknownEncoding(String),
	/// `add_both_sexes` needs exactly male and female in the input.
	SexCount(Vec<Sex>),
	NoBothSexes,
	NotBothSexesOnly,
	InvalidWindow(usize),
	InvalidStep(String),
	/// A pipeline step needs an input which was not supplied.
	MissingInput(&'static str),
	InvalidProvider(String),
	/// Every candidate location failed; carries the number of attempts.
	Exhausted(usize),
	IsoCollision{iso: SmartString, first: SmartString, second: SmartString},
	MandatorySource{iso: SmartString, cause: Box<Error>},
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Io(e) => fmt::Display::fmt(e, f),
			Self::Csv(e) => fmt::Display::fmt(e, f),
			Self::Request(e) => fmt::Display::fmt(e, f),
			Self::Status{url, status} => write!(f, "GET {} returned {}", url, status),
			Self::InvalidDate(s) => write!(f, "invalid date: {:?}", s),
			Self::InvalidValue(s) => write!(f, "invalid value: {:?}", s),
			Self::UnknownAge(s) => write!(f, "age label outside of the bucket set: {:?}", s),
			Self::UnknownSex(s) => write!(f, "unknown sex label: {:?}", s),
			Self::MissingColumn(s) => write!(f, "missing column: {}", s),
			Self::UnknownEncoding(s) => write!(f, "unknown character encoding: {:?}", s),
			Self::SexCount(found) => write!(f, "expecting exactly the sexes m and f, but found {} ({:?})", found.len(), found),
			Self::NoBothSexes => f.write_str("table has no rows for both sexes combined"),
			Self::NotBothSexesOnly => f.write_str("table must only contain rows for both sexes combined"),
			Self::InvalidWindow(w) => write!(f, "invalid window size: {}", w),
			Self::InvalidStep(s) => write!(f, "invalid pipeline step: {:?}", s),
			Self::MissingInput(what) => write!(f, "no {} available", what),
			Self::InvalidProvider(s) => write!(f, "invalid excess mortality provider: {:?}", s),
			Self::Exhausted(n) => write!(f, "all {} candidate locations failed", n),
			Self::IsoCollision{iso, first, second} => write!(f, "ISO code {} provided by both {} and {}", iso, first, second),
			Self::MandatorySource{iso, cause} => write!(f, "mandatory source {} failed: {}", iso, cause),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Io(e) => Some(e),
			Self::Csv(e) => Some(e),
			Self::Request(e) => Some(e),
			Self::MandatorySource{cause, ..} => Some(&**cause),
			_ => None,
		}
	}
}

impl From<io::Error> for Error {
	fn from(err: io::Error) -> Self {
		Self::Io(err)
	}
}

impl From<csv::Error> for Error {
	fn from(err: csv::Error) -> Self {
		Self::Csv(err)
	}
}

impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		Self::Request(err)
	}
}

pub type Result<T> = std::result::Result<T, Error>;
