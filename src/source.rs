//! Per-country sources of age and sex resolved case and death counts.
use std::fmt;
use std::io;
use std::str::FromStr;

use serde::Deserialize;

use smartstring::alias::{String as SmartString};

use log::{debug, info};

use super::error::{Error, Result};
use super::fetch::Fetcher;
use super::ioutil::open_location;
use super::progress::NullMeter;
use super::reference::{ReferenceTotals, SexFractions};
use super::tidy::{read_raw, Columns, Field, InvalidPolicy, TidyTable};
use super::transform::*;


/// One step of the normalization applied to a source table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
	EnsureContiguous(FillPolicy),
	EnsureNonDecreasing,
	CumulativeToNew,
	PeriodicToDaily,
	Round,
	AddBothSexes,
	Smooth(usize),
	Rescale(f64),
	SplitBySexFractions,
	DropTotalAge,
}

impl fmt::Display for Step {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::EnsureContiguous(FillPolicy::Forward) => f.write_str("contiguous:ffill"),
			Self::EnsureContiguous(FillPolicy::Zero) => f.write_str("contiguous:zero"),
			Self::EnsureNonDecreasing => f.write_str("monotonic"),
			Self::CumulativeToNew => f.write_str("new"),
			Self::PeriodicToDaily => f.write_str("daily"),
			Self::Round => f.write_str("round"),
			Self::AddBothSexes => f.write_str("both"),
			Self::Smooth(w) => write!(f, "smooth:{}", w),
			Self::Rescale(t) => write!(f, "rescale:{}", t),
			Self::SplitBySexFractions => f.write_str("split"),
			Self::DropTotalAge => f.write_str("nototal"),
		}
	}
}

impl FromStr for Step {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		let s = s.trim();
		let (name, arg) = match s.split_once(':') {
			Some((name, arg)) => (name, Some(arg)),
			None => (s, None),
		};
		let invalid = || Error::InvalidStep(s.into());
		match (name, arg) {
			("contiguous", None) | ("contiguous", Some("ffill")) => Ok(Self::EnsureContiguous(FillPolicy::Forward)),
			("contiguous", Some("zero")) => Ok(Self::EnsureContiguous(FillPolicy::Zero)),
			("monotonic", None) => Ok(Self::EnsureNonDecreasing),
			("new", None) => Ok(Self::CumulativeToNew),
			("daily", None) => Ok(Self::PeriodicToDaily),
			("round", None) => Ok(Self::Round),
			("both", None) => Ok(Self::AddBothSexes),
			("smooth", None) => Ok(Self::Smooth(DEFAULT_SMOOTHING_WINDOW)),
			("smooth", Some(w)) => match w.parse::<usize>() {
				Ok(w) if w > 0 => Ok(Self::Smooth(w)),
				_ => Err(invalid()),
			},
			("rescale", None) => Ok(Self::Rescale(DEFAULT_RESCALE_THRESHOLD)),
			("rescale", Some(t)) => t.parse::<f64>().map(Self::Rescale).map_err(|_| invalid()),
			("split", None) => Ok(Self::SplitBySexFractions),
			("nototal", None) => Ok(Self::DropTotalAge),
			_ => Err(invalid()),
		}
	}
}


/// External inputs some steps need.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inputs<'a> {
	pub reference: Option<&'a ReferenceTotals>,
	pub fractions: Option<&'a SexFractions>,
}


/// Ordered list of steps, written as `;`-separated step names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
	steps: Vec<Step>,
}

impl Pipeline {
	pub fn new(steps: Vec<Step>) -> Self {
		Self{steps}
	}

	pub fn steps(&self) -> &[Step] {
		&self.steps
	}

	pub fn needs_reference(&self) -> bool {
		self.steps.iter().any(|s| matches!(s, Step::Rescale(_)))
	}

	pub fn needs_fractions(&self) -> bool {
		self.steps.contains(&Step::SplitBySexFractions)
	}

	pub fn apply(&self, mut table: TidyTable, inputs: Inputs) -> Result<TidyTable> {
		for step in self.steps.iter() {
			debug!("{}: {} ({} rows)", table.field(), step, table.len());
			table = match step {
				Step::EnsureContiguous(fill) => ensure_contiguous(&table, *fill),
				Step::EnsureNonDecreasing => ensure_non_decreasing(&table),
				Step::CumulativeToNew => cumulative_to_new(&table),
				Step::PeriodicToDaily => periodic_to_daily(&table),
				Step::Round => round_counts(&table),
				Step::AddBothSexes => add_both_sexes(&table)?,
				Step::Smooth(window) => smooth_sample(&table, *window)?,
				Step::Rescale(threshold) => {
					let reference = inputs.reference.ok_or(Error::MissingInput("reference totals"))?;
					rescale(&table, reference, *threshold)?
				},
				Step::SplitBySexFractions => {
					let fractions = inputs.fractions.ok_or(Error::MissingInput("sex fractions"))?;
					split_by_sex_fractions(&table, fractions)?
				},
				Step::DropTotalAge => table.without_total_age(),
			};
		}
		Ok(table)
	}
}

impl fmt::Display for Pipeline {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		for (i, step) in self.steps.iter().enumerate() {
			if i > 0 {
				f.write_str(";")?;
			}
			fmt::Display::fmt(step, f)?;
		}
		Ok(())
	}
}

impl FromStr for Pipeline {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		let steps = s.split(';')
			.filter(|part| !part.trim().is_empty())
			.map(|part| part.parse())
			.collect::<Result<Vec<Step>>>()?;
		Ok(Self::new(steps))
	}
}


/// A country's source of age/sex resolved counts.
pub trait Source {
	fn iso(&self) -> &str;
	fn cases(&self, inputs: Inputs) -> Result<TidyTable>;
	fn deaths(&self, inputs: Inputs) -> Result<TidyTable>;

	/// Failures of optional sources are logged and the source skipped.
	fn mandatory(&self) -> bool {
		false
	}

	fn needs_reference(&self) -> bool {
		false
	}

	fn fractions(&self, _field: Field) -> Result<Option<SexFractions>> {
		Ok(None)
	}
}


/// How one field of a `CsvSource` is obtained.
#[derive(Debug, Clone)]
pub struct FieldSource {
	pub location: String,
	pub columns: Columns,
	pub pipeline: Pipeline,
	pub fractions: Option<String>,
}


/// Source backed by tidy CSV files (local, gzipped or remote).
pub struct CsvSource<'f> {
	iso: SmartString,
	fetcher: &'f Fetcher,
	cases: FieldSource,
	deaths: FieldSource,
	mandatory: bool,
	policy: InvalidPolicy,
}

impl<'f> CsvSource<'f> {
	pub fn new(iso: SmartString, fetcher: &'f Fetcher, cases: FieldSource, deaths: FieldSource) -> Self {
		Self{
			iso,
			fetcher,
			cases,
			deaths,
			mandatory: false,
			policy: InvalidPolicy::Drop,
		}
	}

	pub fn with_mandatory(mut self, mandatory: bool) -> Self {
		self.mandatory = mandatory;
		self
	}

	pub fn with_policy(mut self, policy: InvalidPolicy) -> Self {
		self.policy = policy;
		self
	}

	fn field_source(&self, field: Field) -> &FieldSource {
		match field {
			Field::CasesNew => &self.cases,
			Field::DeathsNew => &self.deaths,
		}
	}

	fn load(&self, field: Field, inputs: Inputs) -> Result<TidyTable> {
		let fs = self.field_source(field);
		info!("{}: loading {} from {}", self.iso, field, fs.location);
		let r = open_location(self.fetcher, &fs.location)?;
		let raw = read_raw(&mut NullMeter, r, &fs.columns)?;
		let table = TidyTable::from_raw(field, raw, self.policy)?;
		fs.pipeline.apply(table, inputs)
	}
}

impl<'f> Source for CsvSource<'f> {
	fn iso(&self) -> &str {
		&self.iso
	}

	fn cases(&self, inputs: Inputs) -> Result<TidyTable> {
		self.load(Field::CasesNew, inputs)
	}

	fn deaths(&self, inputs: Inputs) -> Result<TidyTable> {
		self.load(Field::DeathsNew, inputs)
	}

	fn mandatory(&self) -> bool {
		self.mandatory
	}

	fn needs_reference(&self) -> bool {
		self.cases.pipeline.needs_reference() || self.deaths.pipeline.needs_reference()
	}

	fn fractions(&self, field: Field) -> Result<Option<SexFractions>> {
		let fs = self.field_source(field);
		match &fs.fractions {
			Some(location) => Ok(Some(SexFractions::read_csv(open_location(self.fetcher, location)?)?)),
			None => Ok(None),
		}
	}
}


/// One row of the source manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
	pub iso: SmartString,
	pub field: Field,
	pub location: String,
	#[serde(default)]
	pub steps: String,
	#[serde(default)]
	pub mandatory: bool,
	#[serde(default)]
	pub date_column: Option<String>,
	#[serde(default)]
	pub date_format: Option<String>,
	#[serde(default)]
	pub age_column: Option<String>,
	/// `-` means the source has no sex column.
	#[serde(default)]
	pub sex_column: Option<String>,
	#[serde(default)]
	pub value_column: Option<String>,
	#[serde(default)]
	pub fractions: Option<String>,
	#[serde(default)]
	pub encoding: Option<String>,
}

impl ManifestEntry {
	pub fn columns(&self) -> Columns {
		let mut columns = Columns::standard(self.field);
		if let Some(c) = &self.date_column {
			columns.date = c.clone();
		}
		if let Some(f) = &self.date_format {
			columns.date_format = f.clone();
		}
		if let Some(c) = &self.age_column {
			columns.age = c.clone();
		}
		match self.sex_column.as_deref() {
			Some("-") => columns.sex = None,
			Some(c) => columns.sex = Some(c.into()),
			None => (),
		}
		if let Some(c) = &self.value_column {
			columns.value = c.clone();
		}
		columns.encoding = self.encoding.clone();
		columns
	}

	pub fn field_source(&self) -> Result<FieldSource> {
		Ok(FieldSource{
			location: self.location.clone(),
			columns: self.columns(),
			pipeline: self.steps.parse()?,
			fractions: self.fractions.clone(),
		})
	}
}

pub fn read_manifest<R: io::Read>(r: R) -> Result<Vec<ManifestEntry>> {
	let mut r = csv::Reader::from_reader(r);
	let mut result = Vec::new();
	for row in r.deserialize() {
		result.push(row?);
	}
	Ok(result)
}

/// Pair up the cases and deaths entries of each country, in manifest
/// order. A country lacking one of the two fields is skipped.
pub fn sources_from_manifest<'f>(entries: &[ManifestEntry], fetcher: &'f Fetcher) -> Result<Vec<CsvSource<'f>>> {
	let mut isos: Vec<&SmartString> = Vec::new();
	for entry in entries {
		if !isos.contains(&&entry.iso) {
			isos.push(&entry.iso);
		}
	}

	let mut result = Vec::with_capacity(isos.len());
	for iso in isos {
		let find = |field: Field| entries.iter().find(|e| &e.iso == iso && e.field == field);
		let (cases, deaths) = match (find(Field::CasesNew), find(Field::DeathsNew)) {
			(Some(c), Some(d)) => (c, d),
			_ => {
				info!("{}: manifest needs both a cases and a deaths entry, skipping", iso);
				continue
			},
		};
		let source = CsvSource::new(iso.clone(), fetcher, cases.field_source()?, deaths.field_source()?)
			.with_mandatory(cases.mandatory || deaths.mandatory);
		result.push(source);
	}
	Ok(result)
}
