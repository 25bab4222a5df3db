use std::collections::HashMap;
use std::io;

use serde::{Deserialize, Serialize};

use smartstring::alias::{String as SmartString};

use chrono::NaiveDate;

use log::{info, warn};

use super::age::Age;
use super::cache::DatasetCache;
use super::error::{Error, Result};
use super::fetch::Fetcher;
use super::ioutil::open_location;
use super::progress::{NullMeter, ProgressSink, StepMeter};
use super::reference::ReferenceDataset;
use super::source::{Inputs, Source};
use super::tidy::{Field, Sex, TidyTable};


/// One row of the combined age/sex dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedRecord {
	#[serde(rename = "ISO")]
	pub iso: SmartString,
	#[serde(rename = "Date")]
	pub date: NaiveDate,
	#[serde(rename = "Age")]
	pub age: Age,
	#[serde(rename = "Sex")]
	pub sex: Sex,
	pub cases_new: f64,
	pub deaths_new: f64,
}


/// Inner join of cases and deaths on (Date, Age, Sex), ordered by date,
/// age and sex.
pub fn join_fields(iso: &str, cases: &TidyTable, deaths: &TidyTable) -> Vec<CombinedRecord> {
	let deaths_by_key: HashMap<(NaiveDate, Age, Sex), f64> = deaths.rows().iter()
		.map(|r| ((r.date, r.age, r.sex), r.value))
		.collect();
	let mut result: Vec<CombinedRecord> = cases.rows().iter().filter_map(|r| {
		let deaths_new = *deaths_by_key.get(&(r.date, r.age, r.sex))?;
		Some(CombinedRecord{
			iso: iso.into(),
			date: r.date,
			age: r.age,
			sex: r.sex,
			cases_new: r.value,
			deaths_new,
		})
	}).collect();
	result.sort_by(|a, b| (a.date, a.age, a.sex).cmp(&(b.date, b.age, b.sex)));
	result
}

fn reference_dataset<'c>(
		cache: &'c mut DatasetCache<ReferenceDataset>,
		fetcher: &Fetcher,
		location: Option<&str>,
) -> Result<&'c ReferenceDataset> {
	cache.get_or_load(|| {
		let location = location.ok_or(Error::MissingInput("reference dataset location"))?;
		info!("loading reference dataset from {}", location);
		ReferenceDataset::read(&mut NullMeter, open_location(fetcher, location)?)
	})
}

fn load_source(source: &dyn Source, reference: Option<&ReferenceDataset>) -> Result<Vec<CombinedRecord>> {
	let iso = source.iso();
	let cases_fractions = source.fractions(Field::CasesNew)?;
	let cases = source.cases(Inputs{
		reference: reference.and_then(|r| r.totals(iso, Field::CasesNew)),
		fractions: cases_fractions.as_ref(),
	})?;
	let deaths_fractions = source.fractions(Field::DeathsNew)?;
	let deaths = source.deaths(Inputs{
		reference: reference.and_then(|r| r.totals(iso, Field::DeathsNew)),
		fractions: deaths_fractions.as_ref(),
	})?;
	Ok(join_fields(iso, &cases, &deaths))
}


/// Builds the combined dataset out of all country sources.
pub struct Generator<'a> {
	fetcher: &'a Fetcher,
	sources: Vec<Box<dyn Source + 'a>>,
	reference_location: Option<String>,
	reference: DatasetCache<ReferenceDataset>,
}

impl<'a> Generator<'a> {
	pub fn new(fetcher: &'a Fetcher, reference_location: Option<String>) -> Self {
		Self{
			fetcher,
			sources: Vec::new(),
			reference_location,
			reference: DatasetCache::new(),
		}
	}

	pub fn add_source<S: Source + 'a>(&mut self, source: S) {
		self.sources.push(Box::new(source));
	}

	pub fn set_reference(&mut self, dataset: ReferenceDataset) {
		self.reference.insert(dataset);
	}

	pub fn reload_reference(&mut self) -> Result<()> {
		let location = self.reference_location.as_deref();
		let fetcher = self.fetcher;
		self.reference.reload(|| {
			let location = location.ok_or(Error::MissingInput("reference dataset location"))?;
			ReferenceDataset::read(&mut NullMeter, open_location(fetcher, location)?)
		})?;
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.sources.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sources.is_empty()
	}

	/// Load every source and concatenate their rows.
	///
	/// An optional source which fails is logged and left out; a failing
	/// mandatory source aborts the whole run.
	pub fn generate<S: ProgressSink + ?Sized>(&mut self, s: &mut S) -> Result<Vec<CombinedRecord>> {
		let mut result = Vec::new();
		let mut pm = StepMeter::new(s, self.sources.len());
		for (i, source) in self.sources.iter().enumerate() {
			let outcome = if source.needs_reference() {
				reference_dataset(&mut self.reference, self.fetcher, self.reference_location.as_deref())
					.and_then(|reference| load_source(source.as_ref(), Some(reference)))
			} else {
				load_source(source.as_ref(), None)
			};
			match outcome {
				Ok(records) => {
					info!("{}: {} rows", source.iso(), records.len());
					result.extend(records);
				},
				Err(e) if source.mandatory() => {
					return Err(Error::MandatorySource{iso: source.iso().into(), cause: Box::new(e)})
				},
				Err(e) => warn!("{}: skipping source: {}", source.iso(), e),
			}
			pm.update(i+1);
		}
		pm.finish();
		Ok(result)
	}
}


pub fn write_combined<W: io::Write>(w: W, records: &[CombinedRecord]) -> Result<()> {
	let mut w = csv::Writer::from_writer(w);
	for record in records {
		w.serialize(record)?;
	}
	w.flush()?;
	Ok(())
}
