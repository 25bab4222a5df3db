use std::io;
use std::io::{Read, Write};
use std::fs;
use std::path::Path;

use flate2;

use log::debug;

use super::calendar::naive_today;
use super::error::Result;
use super::fetch::{dated_candidates, Fetcher};


/// Days to walk back when a remote location is published under a date.
pub static DATED_LOOKBACK_DAYS: u32 = 7;


pub fn magic_open<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn Read>> {
	let path = path.as_ref();
	match path.extension() {
		Some(x) if x == "gz" => {
			Ok(Box::new(flate2::read::GzDecoder::new(fs::File::open(path)?)))
		},
		_ => Ok(Box::new(fs::File::open(path)?)),
	}
}

pub fn is_remote(location: &str) -> bool {
	location.starts_with("http://") || location.starts_with("https://")
}

/// Open a local path or a URL, decompressing `.gz` transparently.
///
/// URLs containing `{date}` are tried for today and the preceding days,
/// newest first, with the date formatted as `%Y-%m-%d`.
pub fn open_location(fetcher: &Fetcher, location: &str) -> Result<Box<dyn Read>> {
	if !is_remote(location) {
		return Ok(magic_open(location)?)
	}
	let body = if location.contains("{date}") {
		let candidates = dated_candidates(location, "%Y-%m-%d", naive_today(), DATED_LOOKBACK_DAYS);
		let (url, body) = fetcher.fetch_first(candidates.iter().map(|c| c.as_str()))?;
		debug!("resolved {} to {}", location, url);
		body
	} else {
		fetcher.fetch(location)?
	};
	let body = io::Cursor::new(body);
	if location.ends_with(".gz") {
		Ok(Box::new(flate2::read::GzDecoder::new(body)))
	} else {
		Ok(Box::new(body))
	}
}

/// Create `path` and hand a writer to `f`, gzip-compressing if the path
/// ends in `.gz`.
pub fn write_output<P: AsRef<Path>, F: FnOnce(&mut dyn Write) -> Result<()>>(path: P, f: F) -> Result<()> {
	let path = path.as_ref();
	let w = fs::File::create(path)?;
	match path.extension() {
		Some(x) if x == "gz" => {
			let mut w = flate2::write::GzEncoder::new(w, flate2::Compression::best());
			f(&mut w)?;
			w.finish()?;
		},
		_ => {
			let mut w = io::BufWriter::new(w);
			f(&mut w)?;
			w.flush()?;
		},
	}
	Ok(())
}
