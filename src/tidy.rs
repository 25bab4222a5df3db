use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::io::Read;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use enum_map::Enum;

use encoding_rs::Encoding;

use smartstring::alias::{String as SmartString};

use chrono::NaiveDate;

use log::{debug, warn};

use super::age::{map_age, Age};
use super::error::{Error, Result};
use super::progress::{CountMeter, ProgressSink};
use super::timeseries::{Dense, Sparse};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Enum, Serialize, Deserialize)]
pub enum Sex {
	#[serde(rename = "m")]
	Male,
	#[serde(rename = "f")]
	Female,
	/// Both sexes combined.
	#[serde(rename = "b")]
	Both,
}

impl Sex {
	/// Accept the labels used by the various providers, case-insensitively.
	pub fn from_label(s: &str) -> Result<Self> {
		match s.trim().to_lowercase().as_str() {
			"m" | "male" | "males" => Ok(Self::Male),
			"f" | "female" | "females" => Ok(Self::Female),
			"b" | "both" | "total" => Ok(Self::Both),
			_ => Err(Error::UnknownSex(s.into())),
		}
	}
}

impl fmt::Display for Sex {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Male => f.write_str("m"),
			Self::Female => f.write_str("f"),
			Self::Both => f.write_str("b"),
		}
	}
}

impl FromStr for Sex {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		Self::from_label(s)
	}
}


/// The quantity a tidy table counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
	#[serde(rename = "cases_new")]
	CasesNew,
	#[serde(rename = "deaths_new")]
	DeathsNew,
}

impl Field {
	pub fn column(&self) -> &'static str {
		match self {
			Self::CasesNew => "cases_new",
			Self::DeathsNew => "deaths_new",
		}
	}
}

impl fmt::Display for Field {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.column())
	}
}


pub type SeriesKey = (Age, Sex);


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
	pub date: NaiveDate,
	pub age: Age,
	pub sex: Sex,
	pub value: f64,
}

impl Observation {
	pub fn new(date: NaiveDate, age: Age, sex: Sex, value: f64) -> Self {
		Self{date, age, sex, value}
	}

	pub fn key(&self) -> SeriesKey {
		(self.age, self.sex)
	}
}


/// An observation as published by a source, labels not yet validated.
#[derive(Debug, Clone)]
pub struct RawObservation {
	pub date: NaiveDate,
	pub age: SmartString,
	pub sex: SmartString,
	pub value: f64,
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidPolicy {
	/// Fail on the first row with an unknown age or sex label.
	Reject,
	/// Drop such rows and carry on.
	Drop,
}


/// Column layout of a raw tidy CSV.
#[derive(Debug, Clone)]
pub struct Columns {
	pub date: String,
	pub date_format: String,
	pub age: String,
	/// Without a sex column every row counts for both sexes combined.
	pub sex: Option<String>,
	pub value: String,
	/// Label of the character encoding (`cp1252`, `latin1`, ...); UTF-8
	/// when unset.
	pub encoding: Option<String>,
}

impl Columns {
	pub fn standard(field: Field) -> Self {
		Self{
			date: "Date".into(),
			date_format: "%Y-%m-%d".into(),
			age: "Age".into(),
			sex: Some("Sex".into()),
			value: field.column().into(),
			encoding: None,
		}
	}
}


fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
	headers.iter().position(|h| h.trim() == name).ok_or_else(|| Error::MissingColumn(name.into()))
}

fn is_missing(s: &str) -> bool {
	matches!(s.trim(), "" | "NA" | "NaN" | "nan" | ":")
}

/// Read raw rows according to `columns`. Rows without a value are skipped.
///
/// Input in another encoding than UTF-8 is decoded as a whole before
/// parsing.
pub fn read_raw<R: io::Read, S: ProgressSink + ?Sized>(
		s: &mut S,
		mut r: R,
		columns: &Columns,
) -> Result<Vec<RawObservation>> {
	let label = match &columns.encoding {
		Some(label) => label,
		None => return read_records(s, r, columns),
	};
	let encoding = Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| Error::UnknownEncoding(label.clone()))?;
	let mut buf = Vec::new();
	r.read_to_end(&mut buf)?;
	let (text, _, malformed) = encoding.decode(&buf);
	if malformed {
		warn!("input is not valid {}, replaced undecodable bytes", encoding.name());
	}
	read_records(s, text.as_bytes(), columns)
}

fn read_records<R: io::Read, S: ProgressSink + ?Sized>(
		s: &mut S,
		r: R,
		columns: &Columns,
) -> Result<Vec<RawObservation>> {
	let mut r = csv::Reader::from_reader(r);
	let headers = r.headers()?.clone();
	let date_i = column_index(&headers, &columns.date)?;
	let age_i = column_index(&headers, &columns.age)?;
	let sex_i = match &columns.sex {
		Some(name) => Some(column_index(&headers, name)?),
		None => None,
	};
	let value_i = column_index(&headers, &columns.value)?;

	let mut result = Vec::new();
	let mut pm = CountMeter::new(s);
	let mut n = 0;
	let mut missing = 0;
	for (i, row) in r.records().enumerate() {
		let rec = row?;
		n = i + 1;
		let value_s = rec.get(value_i).unwrap_or("");
		if is_missing(value_s) {
			missing += 1;
			continue
		}
		let value = value_s.trim().replace(',', "").parse::<f64>().map_err(|_| Error::InvalidValue(value_s.into()))?;
		let date_s = rec.get(date_i).unwrap_or("");
		let date = NaiveDate::parse_from_str(date_s.trim(), &columns.date_format).map_err(|_| Error::InvalidDate(date_s.into()))?;
		let sex = match sex_i {
			Some(i) => rec.get(i).unwrap_or("").into(),
			None => "b".into(),
		};
		result.push(RawObservation{
			date,
			age: rec.get(age_i).unwrap_or("").into(),
			sex,
			value,
		});
		if i % 100000 == 99999 {
			pm.update(i+1);
		}
	}
	pm.finish(n);
	if missing > 0 {
		debug!("skipped {} rows without a value", missing);
	}
	Ok(result)
}


/// Observations of one quantity, one row per (Date, Age, Sex).
#[derive(Debug, Clone, PartialEq)]
pub struct TidyTable {
	field: Field,
	rows: Vec<Observation>,
}

impl TidyTable {
	pub fn new(field: Field, rows: Vec<Observation>) -> Self {
		Self{field, rows}
	}

	/// Validate raw rows: ages go through `map_age` and must land in the
	/// bucket set (or be `TOT`), sexes must be a known label.
	///
	/// Raw rows falling into the same (Date, Age, Sex) are summed, so the
	/// result holds one row per key, ordered by date, age and sex.
	pub fn from_raw<I: IntoIterator<Item = RawObservation>>(field: Field, raw: I, policy: InvalidPolicy) -> Result<Self> {
		let mut sums: BTreeMap<(NaiveDate, Age, Sex), f64> = BTreeMap::new();
		let mut dropped = 0;
		for rec in raw {
			let parsed = map_age(&rec.age).parse::<Age>().and_then(|age| {
				Ok((age, Sex::from_label(&rec.sex)?))
			});
			match parsed {
				Ok((age, sex)) => *sums.entry((rec.date, age, sex)).or_insert(0.) += rec.value,
				Err(e) => match policy {
					InvalidPolicy::Reject => return Err(e),
					InvalidPolicy::Drop => dropped += 1,
				},
			}
		}
		if dropped > 0 {
			warn!("dropped {} {} rows with unknown age or sex labels", dropped, field);
		}
		let rows = sums.into_iter().map(|((date, age, sex), value)| {
			Observation::new(date, age, sex, value)
		}).collect();
		Ok(Self{field, rows})
	}

	pub fn field(&self) -> Field {
		self.field
	}

	pub fn rows(&self) -> &[Observation] {
		&self.rows
	}

	pub fn into_rows(self) -> Vec<Observation> {
		self.rows
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn push(&mut self, row: Observation) {
		self.rows.push(row);
	}

	pub fn extend<I: IntoIterator<Item = Observation>>(&mut self, rows: I) {
		self.rows.extend(rows);
	}

	/// Distinct sexes present, in their natural order.
	pub fn sexes(&self) -> Vec<Sex> {
		let set: BTreeSet<Sex> = self.rows.iter().map(|r| r.sex).collect();
		set.into_iter().collect()
	}

	pub fn ages(&self) -> Vec<Age> {
		let set: BTreeSet<Age> = self.rows.iter().map(|r| r.age).collect();
		set.into_iter().collect()
	}

	pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
		let first = self.rows.iter().map(|r| r.date).min()?;
		let last = self.rows.iter().map(|r| r.date).max()?;
		Some((first, last))
	}

	pub fn get(&self, date: NaiveDate, age: Age, sex: Sex) -> Option<f64> {
		self.rows.iter()
			.find(|r| r.date == date && r.age == age && r.sex == sex)
			.map(|r| r.value)
	}

	pub fn without_total_age(mut self) -> Self {
		self.rows.retain(|r| r.age != Age::Total);
		self
	}

	/// Order rows by date, then age, then sex.
	pub fn sort(&mut self) {
		self.rows.sort_by(|a, b| {
			(a.date, a.age, a.sex).cmp(&(b.date, b.age, b.sex))
		});
	}

	/// Spread the table onto a daily grid over its date range. Duplicate
	/// (Date, Age, Sex) rows keep the first value.
	pub fn to_grid(&self) -> Option<Sparse<SeriesKey>> {
		let (first, last) = self.date_range()?;
		let mut grid = Sparse::spanning(first, last);
		let mut duplicates = 0;
		for row in self.rows.iter() {
			let i = grid.date_index(row.date)?;
			let slot = &mut grid.get_or_fill(row.key(), None)[i];
			if slot.is_some() {
				duplicates += 1;
			} else {
				*slot = Some(row.value);
			}
		}
		if duplicates > 0 {
			debug!("ignored {} duplicate {} rows", duplicates, self.field);
		}
		Some(grid)
	}

	/// Collect the present cells of a grid, ordered by date, age, sex.
	pub fn from_grid(field: Field, grid: &Sparse<SeriesKey>) -> Self {
		let keys = grid.sorted_keys();
		let mut rows = Vec::new();
		for (i, date) in grid.dates().enumerate() {
			for k in keys.iter() {
				if let Some(Some(v)) = grid.get_value(k, i) {
					rows.push(Observation::new(date, k.0, k.1, v));
				}
			}
		}
		Self{field, rows}
	}

	/// Collect every series of a dense grid at the given indices.
	pub fn from_dense(field: Field, grid: &Dense<SeriesKey>, indices: &[usize]) -> Self {
		let keys = grid.sorted_keys();
		let mut rows = Vec::with_capacity(keys.len() * indices.len());
		for i in indices.iter() {
			let date = match grid.index_date(*i as i64) {
				Some(d) => d,
				None => continue,
			};
			for k in keys.iter() {
				if let Some(v) = grid.get_value(k, *i) {
					rows.push(Observation::new(date, k.0, k.1, v));
				}
			}
		}
		Self{field, rows}
	}

	pub fn read_csv<R: io::Read, S: ProgressSink + ?Sized>(s: &mut S, field: Field, r: R, policy: InvalidPolicy) -> Result<Self> {
		let raw = read_raw(s, r, &Columns::standard(field))?;
		Self::from_raw(field, raw, policy)
	}

	pub fn write_csv<W: io::Write>(&self, w: W) -> Result<()> {
		let mut w = csv::Writer::from_writer(w);
		w.write_record(&["Date", "Age", "Sex", self.field.column()])?;
		for row in self.rows.iter() {
			w.write_record(&[
				row.date.to_string(),
				row.age.to_string(),
				row.sex.to_string(),
				row.value.to_string(),
			])?;
		}
		w.flush()?;
		Ok(())
	}
}
