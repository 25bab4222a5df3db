use std::env;
use std::time::Duration;

use bytes::Bytes;

use chrono::NaiveDate;

use log::{debug, warn};

use super::error::{Error, Result};


static DEFAULT_USER_AGENT: &'static str = concat!("covid-age/", env!("CARGO_PKG_VERSION"));
static REQUEST_TIMEOUT: Duration = Duration::from_secs(120);


/// Blocking HTTP access to the upstream data providers.
pub struct Fetcher {
	client: reqwest::blocking::Client,
}

impl Fetcher {
	pub fn new(user_agent: &str) -> Result<Self> {
		let client = reqwest::blocking::Client::builder()
			.user_agent(user_agent)
			.timeout(REQUEST_TIMEOUT)
			.build()?;
		Ok(Self{client})
	}

	/// Client configured from `COVID_AGE_USER_AGENT`, if set.
	pub fn from_env() -> Result<Self> {
		let ua = env::var("COVID_AGE_USER_AGENT").unwrap_or(DEFAULT_USER_AGENT.into());
		Self::new(&ua)
	}

	pub fn fetch(&self, url: &str) -> Result<Bytes> {
		debug!("GET {}", url);
		let resp = self.client.get(url).send()?;
		let status = resp.status();
		if !status.is_success() {
			return Err(Error::Status{url: url.into(), status})
		}
		Ok(resp.bytes()?)
	}

	/// Try the candidates in order and return the first one that could be
	/// retrieved, together with its URL.
	pub fn fetch_first<'u, I: IntoIterator<Item = &'u str>>(&self, candidates: I) -> Result<(String, Bytes)> {
		let mut attempts = 0;
		for url in candidates {
			attempts += 1;
			match self.fetch(url) {
				Ok(body) => return Ok((url.into(), body)),
				Err(e) => warn!("failed to fetch {}: {}", url, e),
			}
		}
		Err(Error::Exhausted(attempts))
	}
}


/// Expand a URL template containing `{date}` for `latest` and the
/// `days_back` days before it, newest first.
pub fn dated_candidates(template: &str, format: &str, latest: NaiveDate, days_back: u32) -> Vec<String> {
	let mut result = Vec::with_capacity(days_back as usize + 1);
	let mut date = latest;
	for _ in 0..=days_back {
		result.push(template.replace("{date}", &date.format(format).to_string()));
		date = match date.pred_opt() {
			Some(d) => d,
			None => break,
		};
	}
	result
}


#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn candidates_walk_backwards() {
		let latest = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
		let urls = dated_candidates("https://example.org/report_{date}.csv", "%Y%m%d", latest, 2);
		assert_eq!(urls, vec![
			"https://example.org/report_20200301.csv",
			"https://example.org/report_20200229.csv",
			"https://example.org/report_20200228.csv",
		]);
	}

	#[test]
	fn no_candidates_is_exhausted() {
		let fetcher = Fetcher::new("test").unwrap();
		match fetcher.fetch_first(Vec::<&str>::new()) {
			Err(Error::Exhausted(0)) => (),
			other => panic!("unexpected result: {:?}", other.map(|(url, _)| url)),
		}
	}
}
