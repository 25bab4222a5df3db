//! Short-term mortality fluctuation series of the Human Mortality Database.
use std::io;

use smartstring::alias::{String as SmartString};

use log::debug;

use super::error::{Error, Result};
use super::excess::{total_age_label, WeeklyDeaths};
use super::progress::{CountMeter, ProgressSink};
use super::tidy::Sex;


pub static STMF_URL: &'static str = "https://www.mortality.org/Public/STMF/Outputs/stmf.csv";

/// Death count columns and the age class each one covers.
static DEATH_COLUMNS: [(&'static str, &'static str); 6] = [
	("D0_14", "0-14"),
	("D15_64", "15-64"),
	("D65_74", "65-74"),
	("D75_84", "75-84"),
	("D85p", "85+"),
	("DTotal", ""),
];


/// HMD country codes carry a population suffix on some countries
/// (`DEUTNP`, `NZL_NP`); strip it to get the ISO code.
pub fn iso_from_country_code(code: &str) -> SmartString {
	let code = code.trim();
	if code.len() > 3 && (code.ends_with("TNP") || code.ends_with("_NP")) {
		if let Some(prefix) = code.get(..3) {
			return prefix.into()
		}
	}
	code.into()
}

fn field<'r>(rec: &'r csv::StringRecord, i: usize) -> &'r str {
	rec.get(i).unwrap_or("").trim()
}

/// Read the wide STMF file into one row per (country, age class, sex,
/// year, week). Preamble lines before the `CountryCode` header are
/// skipped.
pub fn read_stmf<R: io::Read, S: ProgressSink + ?Sized>(s: &mut S, r: R) -> Result<Vec<WeeklyDeaths>> {
	let mut r = csv::ReaderBuilder::new()
		.has_headers(false)
		.flexible(true)
		.from_reader(r);

	let mut header: Option<Vec<usize>> = None;
	let mut fixed = (0, 0, 0, 0);
	let mut result = Vec::new();
	let mut pm = CountMeter::new(s);
	let mut n = 0;
	let mut skipped = 0;
	for (i, row) in r.records().enumerate() {
		let rec = row?;
		n = i + 1;
		if header.is_none() {
			if field(&rec, 0) == "CountryCode" {
				let find = |name: &str| rec.iter().position(|h| h.trim() == name).ok_or_else(|| Error::MissingColumn(name.into()));
				fixed = (find("CountryCode")?, find("Year")?, find("Week")?, find("Sex")?);
				let mut columns = Vec::with_capacity(DEATH_COLUMNS.len());
				for (name, _) in DEATH_COLUMNS.iter() {
					columns.push(find(*name)?);
				}
				header = Some(columns);
			}
			continue
		}
		let deaths_i = match &header {
			Some(h) => h,
			None => continue,
		};

		let (code_i, year_i, week_i, sex_i) = fixed;
		let year = field(&rec, year_i).parse::<i32>().map_err(|_| Error::InvalidValue(field(&rec, year_i).into()))?;
		let week = field(&rec, week_i).parse::<u32>().map_err(|_| Error::InvalidValue(field(&rec, week_i).into()))?;
		let sex = Sex::from_label(field(&rec, sex_i))?;
		let iso = iso_from_country_code(field(&rec, code_i));
		for (column, (_, label)) in deaths_i.iter().zip(DEATH_COLUMNS.iter()) {
			let deaths = match field(&rec, *column).parse::<f64>() {
				Ok(v) => v,
				Err(_) => {
					skipped += 1;
					continue
				},
			};
			let age = if label.is_empty() {
				total_age_label()
			} else {
				(*label).into()
			};
			result.push(WeeklyDeaths{iso: iso.clone(), age, sex, year, week, deaths});
		}
		if i % 100000 == 99999 {
			pm.update(i+1);
		}
	}
	pm.finish(n);
	if header.is_none() {
		return Err(Error::MissingColumn("CountryCode".into()))
	}
	if skipped > 0 {
		debug!("skipped {} empty STMF cells", skipped);
	}
	Ok(result)
}
