use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use smartstring::alias::{String as SmartString};

use chrono::{Duration, NaiveDate};

use log::{debug, info};

use super::age::Age;
use super::calendar::last_day_of_week;
use super::error::{Error, Result};
use super::eurostat;
use super::fetch::Fetcher;
use super::hmd;
use super::ioutil::open_location;
use super::progress::{CountMeter, ProgressSink};
use super::tidy::Sex;


/// One weekly death count of a region.
///
/// Age classes are provider specific (`0-14`, `85+`, ...), so they are
/// carried as labels; the class covering all ages is `TOT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyDeaths {
	#[serde(rename = "ISO")]
	pub iso: SmartString,
	#[serde(rename = "Age")]
	pub age: SmartString,
	#[serde(rename = "Sex")]
	pub sex: Sex,
	#[serde(rename = "Year")]
	pub year: i32,
	#[serde(rename = "Week")]
	pub week: u32,
	#[serde(rename = "Deaths")]
	pub deaths: f64,
}

impl WeeklyDeaths {
	pub fn is_total(&self) -> bool {
		self.sex == Sex::Both && self.age == total_age_label()
	}
}

pub fn total_age_label() -> SmartString {
	Age::Total.to_string().into()
}


/// Which years before the current one make up the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineWindow {
	AllPrior,
	/// The `n` years immediately preceding the current year.
	Years(u32),
}

impl BaselineWindow {
	pub fn contains(&self, year: i32, current_year: i32) -> bool {
		if year >= current_year {
			return false
		}
		match self {
			Self::AllPrior => true,
			Self::Years(n) => year >= current_year - *n as i32,
		}
	}
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcessRecord {
	#[serde(rename = "ISO")]
	pub iso: SmartString,
	#[serde(rename = "Age")]
	pub age: SmartString,
	#[serde(rename = "Sex")]
	pub sex: Sex,
	#[serde(rename = "Week")]
	pub week: u32,
	#[serde(rename = "DATE")]
	pub date: NaiveDate,
	pub deaths_expected: f64,
	pub deaths_observed: f64,
	pub deaths_excess_weekly: f64,
}

impl ExcessRecord {
	pub fn weekly(&self) -> WeeklyExcess {
		WeeklyExcess{
			iso: self.iso.clone(),
			date: self.date,
			deaths_excess_weekly: self.deaths_excess_weekly,
		}
	}
}


type WeekKey = (SmartString, SmartString, Sex, u32);

fn week_key(row: &WeeklyDeaths) -> WeekKey {
	(row.iso.clone(), row.age.clone(), row.sex, row.week)
}

/// Excess deaths of `current_year` against the mean of the same
/// (region, age, sex, week) over the baseline years.
///
/// Weeks without a current observation, or without any baseline year,
/// produce no record. Output is ordered by region, age, sex and week.
pub fn compute_excess(rows: &[WeeklyDeaths], current_year: i32, window: BaselineWindow) -> Vec<ExcessRecord> {
	let mut baseline: HashMap<WeekKey, (f64, usize)> = HashMap::new();
	let mut current: BTreeMap<WeekKey, f64> = BTreeMap::new();
	let mut duplicates = 0;
	for row in rows {
		if row.year == current_year {
			let key = week_key(row);
			if current.contains_key(&key) {
				duplicates += 1;
			} else {
				current.insert(key, row.deaths);
			}
		} else if window.contains(row.year, current_year) {
			let acc = baseline.entry(week_key(row)).or_insert((0., 0));
			acc.0 += row.deaths;
			acc.1 += 1;
		}
	}
	if duplicates > 0 {
		debug!("ignored {} duplicate weekly observations for {}", duplicates, current_year);
	}

	let mut result = Vec::with_capacity(current.len());
	let mut unmatched = 0;
	for (key, observed) in current {
		let expected = match baseline.get(&key) {
			Some((sum, n)) => sum / *n as f64,
			None => {
				unmatched += 1;
				continue
			},
		};
		let (iso, age, sex, week) = key;
		let date = match last_day_of_week(current_year, week) {
			Some(d) => d,
			None => continue,
		};
		result.push(ExcessRecord{
			iso,
			age,
			sex,
			week,
			date,
			deaths_expected: expected,
			deaths_observed: observed,
			deaths_excess_weekly: observed - expected,
		});
	}
	if unmatched > 0 {
		debug!("{} weeks of {} have no baseline", unmatched, current_year);
	}
	result
}


/// Weekly excess of one region, dated by the last day of the week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyExcess {
	#[serde(rename = "ISO")]
	pub iso: SmartString,
	#[serde(rename = "DATE")]
	pub date: NaiveDate,
	pub deaths_excess_weekly: f64,
}

/// Read published weekly excess (`ISO`, `DATE`, `deaths_excess_weekly`).
/// Rows without a value are skipped.
pub fn read_weekly_excess<R: io::Read, S: ProgressSink + ?Sized>(s: &mut S, r: R) -> Result<Vec<WeeklyExcess>> {
	#[derive(Deserialize)]
	struct Row {
		#[serde(rename = "ISO")]
		iso: SmartString,
		#[serde(rename = "DATE")]
		date: NaiveDate,
		deaths_excess_weekly: Option<f64>,
	}

	let mut r = csv::Reader::from_reader(r);
	let mut result = Vec::new();
	let mut pm = CountMeter::new(s);
	let mut n = 0;
	for (i, row) in r.deserialize().enumerate() {
		let row: Row = row?;
		n = i + 1;
		if let Some(v) = row.deaths_excess_weekly {
			result.push(WeeklyExcess{iso: row.iso, date: row.date, deaths_excess_weekly: v});
		}
		if i % 100000 == 99999 {
			pm.update(i+1);
		}
	}
	pm.finish(n);
	Ok(result)
}

/// Read a long weekly death table (`ISO,Age,Sex,Year,Week,Deaths`).
pub fn read_weekly_deaths<R: io::Read, S: ProgressSink + ?Sized>(s: &mut S, r: R) -> Result<Vec<WeeklyDeaths>> {
	let mut r = csv::Reader::from_reader(r);
	let mut result = Vec::new();
	let mut pm = CountMeter::new(s);
	let mut n = 0;
	for (i, row) in r.deserialize().enumerate() {
		result.push(row?);
		n = i + 1;
		if i % 100000 == 99999 {
			pm.update(i+1);
		}
	}
	pm.finish(n);
	Ok(result)
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyPolicy {
	/// A seventh of the weekly excess on each of the seven days ending on
	/// the week's date.
	Average,
	/// A seventh of the weekly excess back-filled over every day since
	/// the previous week's date.
	Fill,
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyExcess {
	#[serde(rename = "ISO")]
	pub iso: SmartString,
	#[serde(rename = "DATE")]
	pub date: NaiveDate,
	pub deaths_excess_daily_avg: f64,
	/// Only set on the last day of each week.
	pub deaths_excess_weekly: Option<f64>,
}

/// Spread weekly excess onto days, region by region.
pub fn to_daily(weekly: &[WeeklyExcess], policy: DailyPolicy) -> Vec<DailyExcess> {
	let mut by_iso: BTreeMap<&str, Vec<(NaiveDate, f64)>> = BTreeMap::new();
	for w in weekly {
		by_iso.entry(w.iso.as_str()).or_insert_with(Vec::new).push((w.date, w.deaths_excess_weekly));
	}

	let mut result = Vec::new();
	for (iso, mut weeks) in by_iso {
		weeks.sort_by_key(|(date, _)| *date);
		weeks.dedup_by_key(|(date, _)| *date);
		let mut prev_end: Option<NaiveDate> = None;
		for (end, total) in weeks {
			let week_start = end - Duration::days(6);
			let first = match (policy, prev_end) {
				(DailyPolicy::Fill, Some(prev)) => prev + Duration::days(1),
				(DailyPolicy::Average, Some(prev)) if prev >= week_start => prev + Duration::days(1),
				_ => week_start,
			};
			let avg = total / 7.;
			for date in first.iter_days().take_while(|d| *d <= end) {
				result.push(DailyExcess{
					iso: iso.into(),
					date,
					deaths_excess_daily_avg: avg,
					deaths_excess_weekly: if date == end { Some(total) } else { None },
				});
			}
			prev_end = Some(end);
		}
	}
	result
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
	/// Human Mortality Database short-term mortality fluctuations.
	Hmd,
	Eurostat,
	/// Long weekly death table, see `read_weekly_deaths`.
	Weekly,
	/// Published weekly excess, see `read_weekly_excess`.
	Excess,
}

impl ProviderKind {
	pub fn baseline(&self) -> BaselineWindow {
		match self {
			Self::Hmd => BaselineWindow::Years(5),
			_ => BaselineWindow::AllPrior,
		}
	}

	pub fn daily_policy(&self) -> DailyPolicy {
		match self {
			Self::Excess => DailyPolicy::Fill,
			_ => DailyPolicy::Average,
		}
	}
}

impl fmt::Display for ProviderKind {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Hmd => f.write_str("hmd"),
			Self::Eurostat => f.write_str("eurostat"),
			Self::Weekly => f.write_str("weekly"),
			Self::Excess => f.write_str("excess"),
		}
	}
}

impl FromStr for ProviderKind {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"hmd" => Ok(Self::Hmd),
			"eurostat" => Ok(Self::Eurostat),
			"weekly" => Ok(Self::Weekly),
			"excess" => Ok(Self::Excess),
			other => Err(Error::InvalidProvider(other.into())),
		}
	}
}


/// A provider of excess mortality restricted to the regions it is
/// trusted for.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcessProvider {
	pub kind: ProviderKind,
	pub allowed: Vec<SmartString>,
	pub location: String,
}

impl ExcessProvider {
	pub fn new(kind: ProviderKind, allowed: Vec<SmartString>, location: String) -> Self {
		Self{kind, allowed, location}
	}

	/// Weekly excess of the allowed regions for all ages and both sexes.
	pub fn weekly_excess<R: io::Read, S: ProgressSink + ?Sized>(
			&self,
			s: &mut S,
			r: R,
			current_year: i32,
	) -> Result<Vec<WeeklyExcess>> {
		let mut weekly = match self.kind {
			ProviderKind::Excess => read_weekly_excess(s, r)?,
			kind => {
				let deaths = match kind {
					ProviderKind::Hmd => hmd::read_stmf(s, r)?,
					ProviderKind::Eurostat => eurostat::read_weekly(s, r)?,
					_ => read_weekly_deaths(s, r)?,
				};
				let totals: Vec<WeeklyDeaths> = deaths.into_iter().filter(|row| {
					row.is_total() && self.allows(&row.iso)
				}).collect();
				compute_excess(&totals, current_year, kind.baseline()).iter().map(|rec| rec.weekly()).collect()
			},
		};
		weekly.retain(|w| self.allows(&w.iso));
		Ok(weekly)
	}

	pub fn load<S: ProgressSink + ?Sized>(&self, fetcher: &Fetcher, s: &mut S, current_year: i32) -> Result<Vec<DailyExcess>> {
		info!("loading {} excess mortality from {}", self.kind, self.location);
		let r = open_location(fetcher, &self.location)?;
		let weekly = self.weekly_excess(s, r, current_year)?;
		Ok(to_daily(&weekly, self.kind.daily_policy()))
	}

	pub fn allows(&self, iso: &str) -> bool {
		self.allowed.iter().any(|a| a.as_str() == iso)
	}
}

impl fmt::Display for ExcessProvider {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}:{}", self.kind, self.location)
	}
}

/// Parse `KIND:ISO,ISO,...:LOCATION`. The location may be left out for
/// `hmd`, which then reads the published STMF file.
impl FromStr for ExcessProvider {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		let mut parts = s.splitn(3, ':');
		let (kind, isos) = match (parts.next(), parts.next()) {
			(Some(k), Some(i)) => (k.parse::<ProviderKind>()?, i),
			_ => return Err(Error::InvalidProvider(s.into())),
		};
		let location = match (parts.next(), kind) {
			(Some(l), _) if !l.is_empty() => l,
			(_, ProviderKind::Hmd) => hmd::STMF_URL,
			_ => return Err(Error::InvalidProvider(s.into())),
		};
		let allowed = isos.split(',').map(|iso| iso.trim()).filter(|iso| !iso.is_empty()).map(|iso| iso.into()).collect();
		Ok(Self::new(kind, allowed, location.into()))
	}
}


/// Concatenate the daily excess of several providers, each restricted to
/// its allowed regions. A region allowed for two providers is an error.
pub fn combine_providers(tables: Vec<(&ExcessProvider, Vec<DailyExcess>)>) -> Result<Vec<DailyExcess>> {
	let mut owners: HashMap<&str, &ExcessProvider> = HashMap::new();
	for (provider, _) in tables.iter() {
		for iso in provider.allowed.iter() {
			if let Some(first) = owners.insert(iso.as_str(), *provider) {
				return Err(Error::IsoCollision{
					iso: iso.clone(),
					first: first.to_string().into(),
					second: provider.to_string().into(),
				})
			}
		}
	}

	let mut result = Vec::new();
	for (provider, rows) in tables {
		result.extend(rows.into_iter().filter(|row| provider.allows(&row.iso)));
	}
	result.sort_by(|a, b| (&a.iso, a.date).cmp(&(&b.iso, b.date)));
	Ok(result)
}

pub fn write_daily<W: io::Write>(w: W, rows: &[DailyExcess]) -> Result<()> {
	let mut w = csv::Writer::from_writer(w);
	for row in rows {
		w.serialize(row)?;
	}
	w.flush()?;
	Ok(())
}
