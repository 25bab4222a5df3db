//! Weekly deaths by sex and age published by Eurostat.
use std::io;

use smartstring::alias::{String as SmartString};

use log::debug;

use super::error::{Error, Result};
use super::excess::{total_age_label, WeeklyDeaths};
use super::progress::{CountMeter, ProgressSink};
use super::tidy::Sex;


static COUNTRIES: [(&'static str, &'static str); 40] = [
	("Albania", "ALB"),
	("Andorra", "AND"),
	("Armenia", "ARM"),
	("Austria", "AUT"),
	("Belgium", "BEL"),
	("Bulgaria", "BGR"),
	("Croatia", "HRV"),
	("Cyprus", "CYP"),
	("Czechia", "CZE"),
	("Denmark", "DNK"),
	("Estonia", "EST"),
	("Finland", "FIN"),
	("France", "FRA"),
	("Georgia", "GEO"),
	("Germany", "DEU"),
	("Germany (until 1990 former territory of the FRG)", "DEU"),
	("Greece", "GRC"),
	("Hungary", "HUN"),
	("Iceland", "ISL"),
	("Ireland", "IRL"),
	("Italy", "ITA"),
	("Latvia", "LVA"),
	("Liechtenstein", "LIE"),
	("Lithuania", "LTU"),
	("Luxembourg", "LUX"),
	("Malta", "MLT"),
	("Montenegro", "MNE"),
	("Netherlands", "NLD"),
	("Norway", "NOR"),
	("Poland", "POL"),
	("Portugal", "PRT"),
	("Romania", "ROU"),
	("Serbia", "SRB"),
	("Slovakia", "SVK"),
	("Slovenia", "SVN"),
	("Spain", "ESP"),
	("Sweden", "SWE"),
	("Switzerland", "CHE"),
	("United Kingdom", "GBR"),
	("Kosovo (under United Nations Security Council Resolution 1244/99)", "RKS"),
];


/// ISO code for a Eurostat `GEO` label. Labels which already look like an
/// ISO code are passed through.
pub fn iso_from_geo(geo: &str) -> Option<SmartString> {
	let geo = geo.trim();
	if let Some((_, iso)) = COUNTRIES.iter().find(|(name, _)| *name == geo) {
		return Some((*iso).into())
	}
	if geo.len() == 3 && geo.chars().all(|c| c.is_ascii_uppercase()) {
		return Some(geo.into())
	}
	None
}

/// Split `2020W05` into year and week.
pub fn parse_time(s: &str) -> Option<(i32, u32)> {
	let (year, week) = s.trim().split_once('W')?;
	Some((year.parse().ok()?, week.parse().ok()?))
}

fn parse_value(s: &str) -> Option<f64> {
	let s = s.trim();
	if s.is_empty() || s == ":" {
		return None
	}
	s.replace(',', "").parse().ok()
}

/// Read the long `demo_r_mweek3` export (`TIME`, `GEO`, `SEX`, `AGE`,
/// `Value`). Missing values and unknown countries are skipped.
pub fn read_weekly<R: io::Read, S: ProgressSink + ?Sized>(s: &mut S, r: R) -> Result<Vec<WeeklyDeaths>> {
	let mut r = csv::Reader::from_reader(r);
	let headers = r.headers()?.clone();
	let find = |name: &str| headers.iter().position(|h| h.trim() == name).ok_or_else(|| Error::MissingColumn(name.into()));
	let time_i = find("TIME")?;
	let geo_i = find("GEO")?;
	let sex_i = find("SEX")?;
	let age_i = find("AGE")?;
	let value_i = find("Value")?;

	let mut result = Vec::new();
	let mut pm = CountMeter::new(s);
	let mut n = 0;
	let mut missing = 0;
	let mut unknown = 0;
	for (i, row) in r.records().enumerate() {
		let rec = row?;
		n = i + 1;
		let get = |i: usize| rec.get(i).unwrap_or("");
		let deaths = match parse_value(get(value_i)) {
			Some(v) => v,
			None => {
				missing += 1;
				continue
			},
		};
		let iso = match iso_from_geo(get(geo_i)) {
			Some(iso) => iso,
			None => {
				unknown += 1;
				continue
			},
		};
		let (year, week) = parse_time(get(time_i)).ok_or_else(|| Error::InvalidDate(get(time_i).into()))?;
		let age = match get(age_i).trim() {
			"Total" => total_age_label(),
			other => other.into(),
		};
		result.push(WeeklyDeaths{
			iso,
			age,
			sex: Sex::from_label(get(sex_i))?,
			year,
			week,
			deaths,
		});
		if i % 100000 == 99999 {
			pm.update(i+1);
		}
	}
	pm.finish(n);
	if missing > 0 || unknown > 0 {
		debug!("skipped {} rows without a value and {} rows of unknown regions", missing, unknown);
	}
	Ok(result)
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::excess::{compute_excess, BaselineWindow};
	use crate::progress::NullMeter;

	#[test]
	fn time_labels() {
		assert_eq!(parse_time("2020W05"), Some((2020, 5)));
		assert_eq!(parse_time("2019W53"), Some((2019, 53)));
		assert_eq!(parse_time("2019-53"), None);
	}

	#[test]
	fn geo_labels() {
		assert_eq!(iso_from_geo("Czechia").unwrap().as_str(), "CZE");
		assert_eq!(iso_from_geo("LUX").unwrap().as_str(), "LUX");
		assert!(iso_from_geo("Atlantis").is_none());
	}

	#[test]
	fn reads_and_computes_excess() {
		let input = "\
TIME,GEO,SEX,AGE,UNIT,Value,Flag and Footnotes
2018W01,Czechia,Total,Total,Number,\"2,000\",
2019W01,Czechia,Total,Total,Number,\"2,200\",
2020W01,Czechia,Total,Total,Number,\"2,500\",
2020W01,Czechia,Males,Total,Number,:,
2020W01,Atlantis,Total,Total,Number,10,
2020W01,Estonia,Females,From 5 to 9 years,Number,1,
";
		let rows = read_weekly(&mut NullMeter, input.as_bytes()).unwrap();
		assert_eq!(rows.len(), 4);
		assert_eq!(rows[3].age.as_str(), "From 5 to 9 years");
		assert_eq!(rows[3].sex, Sex::Female);
		let totals: Vec<_> = rows.into_iter().filter(|r| r.is_total()).collect();
		let excess = compute_excess(&totals, 2020, BaselineWindow::AllPrior);
		assert_eq!(excess.len(), 1);
		assert_eq!(excess[0].deaths_expected, 2100.);
		assert_eq!(excess[0].deaths_excess_weekly, 400.);
	}
}
