use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;

use serde::Deserialize;

use enum_map::EnumMap;

use smartstring::alias::{String as SmartString};

use chrono::NaiveDate;

use super::error::{Error, Result};
use super::progress::{CountMeter, ProgressSink};
use super::tidy::{Field, Sex};


/// Trusted daily totals (both sexes, all ages) of one country, used to
/// rescale a less trusted age/sex breakdown.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTotals {
	totals: BTreeMap<NaiveDate, f64>,
}

impl ReferenceTotals {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, date: NaiveDate, total: f64) {
		self.totals.insert(date, total);
	}

	pub fn get(&self, date: NaiveDate) -> Option<f64> {
		self.totals.get(&date).copied()
	}

	pub fn len(&self) -> usize {
		self.totals.len()
	}

	pub fn is_empty(&self) -> bool {
		self.totals.is_empty()
	}
}

impl std::iter::FromIterator<(NaiveDate, f64)> for ReferenceTotals {
	fn from_iter<I: IntoIterator<Item = (NaiveDate, f64)>>(iter: I) -> Self {
		Self{totals: iter.into_iter().collect()}
	}
}


/// The trusted combined country dataset (`ISO`, `DATE`, `cases_new`,
/// `deaths_new`), split into reference totals per country and field.
#[derive(Debug, Clone, Default)]
pub struct ReferenceDataset {
	totals: HashMap<(SmartString, Field), ReferenceTotals>,
}

impl ReferenceDataset {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn totals(&self, iso: &str, field: Field) -> Option<&ReferenceTotals> {
		let key: (SmartString, Field) = (iso.into(), field);
		self.totals.get(&key)
	}

	pub fn countries(&self) -> usize {
		let isos: HashSet<&SmartString> = self.totals.keys().map(|(iso, _)| iso).collect();
		isos.len()
	}

	pub fn read<R: io::Read, S: ProgressSink + ?Sized>(s: &mut S, r: R) -> Result<Self> {
		let mut r = csv::Reader::from_reader(r);
		let headers = r.headers()?.clone();
		let find = |name: &str| headers.iter().position(|h| h == name).ok_or_else(|| Error::MissingColumn(name.into()));
		let iso_i = find("ISO")?;
		let date_i = find("DATE")?;
		let fields = [
			(Field::CasesNew, find(Field::CasesNew.column())?),
			(Field::DeathsNew, find(Field::DeathsNew.column())?),
		];

		let mut result = Self::new();
		let mut pm = CountMeter::new(s);
		let mut n = 0;
		for (i, row) in r.records().enumerate() {
			let rec = row?;
			n = i + 1;
			let iso: SmartString = rec.get(iso_i).unwrap_or("").into();
			let date_s = rec.get(date_i).unwrap_or("");
			let date = date_s.parse::<NaiveDate>().map_err(|_| Error::InvalidDate(date_s.into()))?;
			for (field, value_i) in fields.iter() {
				if let Some(v) = rec.get(*value_i).and_then(|v| v.parse::<f64>().ok()) {
					result.totals.entry((iso.clone(), *field)).or_insert_with(ReferenceTotals::new).insert(date, v);
				}
			}
			if i % 100000 == 99999 {
				pm.update(i+1);
			}
		}
		pm.finish(n);
		Ok(result)
	}
}


/// Per-date share of male and female among the both-sexes count.
#[derive(Debug, Clone, Default)]
pub struct SexFractions {
	fractions: BTreeMap<NaiveDate, EnumMap<Sex, f64>>,
}

impl SexFractions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, date: NaiveDate, male: f64, female: f64) {
		let entry = self.fractions.entry(date).or_insert_with(EnumMap::default);
		entry[Sex::Male] = male;
		entry[Sex::Female] = female;
	}

	/// Build from long rows of (date, sex, fraction); `b` rows are ignored.
	pub fn from_rows<I: IntoIterator<Item = (NaiveDate, Sex, f64)>>(rows: I) -> Self {
		let mut result = Self::new();
		for (date, sex, fraction) in rows {
			if sex == Sex::Both {
				continue
			}
			let entry = result.fractions.entry(date).or_insert_with(EnumMap::default);
			entry[sex] = fraction;
		}
		result
	}

	pub fn get(&self, date: NaiveDate) -> Option<&EnumMap<Sex, f64>> {
		self.fractions.get(&date)
	}

	/// Read long rows of `Date`, `Sex` and `Value`.
	pub fn read_csv<R: io::Read>(r: R) -> Result<Self> {
		#[derive(Deserialize)]
		struct Row {
			#[serde(rename = "Date")]
			date: NaiveDate,
			#[serde(rename = "Sex")]
			sex: Sex,
			#[serde(rename = "Value")]
			value: f64,
		}

		let mut r = csv::Reader::from_reader(r);
		let mut rows = Vec::new();
		for row in r.deserialize() {
			let row: Row = row?;
			rows.push((row.date, row.sex, row.value));
		}
		Ok(Self::from_rows(rows))
	}
}
