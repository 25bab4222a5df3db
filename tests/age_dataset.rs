use std::fs;
use std::path::Path;

use chrono::NaiveDate;

use covid_age::{
	magic_open, read_manifest, sources_from_manifest, write_combined, write_output, Age,
	CombinedRecord, Fetcher, Generator, NullMeter, Sex,
};


fn write(dir: &Path, name: &str, contents: &str) -> String {
	let path = dir.join(name);
	fs::write(&path, contents).unwrap();
	path.to_str().unwrap().to_string()
}

fn day(d: u32) -> NaiveDate {
	NaiveDate::from_ymd_opt(2020, 4, d).unwrap()
}

fn find<'r>(rows: &'r [CombinedRecord], iso: &str, date: NaiveDate, age: Age, sex: Sex) -> &'r CombinedRecord {
	rows.iter()
		.find(|r| r.iso.as_str() == iso && r.date == date && r.age == age && r.sex == sex)
		.unwrap()
}

#[test]
fn manifest_to_combined_dataset() {
	let dir = tempfile::tempdir().unwrap();
	let p = dir.path();

	let bel_cases = write(p, "bel_cases.csv", "\
Date,Age,Sex,cases_new
2020-04-01,30,m,10
2020-04-01,30,f,12
2020-04-03,30,m,16
2020-04-03,30,f,12
");
	let bel_deaths = write(p, "bel_deaths.csv", "\
Date,Age,Sex,deaths_new
2020-04-02,30-39,Male,1
2020-04-02,30-39,Female,1
2020-04-03,30-39,Male,1
2020-04-03,30-39,Female,1
");
	let can_cases = write(p, "can_cases.csv", "\
Date,Age,Sex,cases_new
2020-04-01,0-9,b,10
2020-04-01,10-19,b,30
2020-04-02,0-9,b,20
2020-04-02,10-19,b,20
");
	let can_fractions = write(p, "can_fractions.csv", "\
Date,Sex,Value
2020-04-01,m,0.5
2020-04-01,f,0.5
2020-04-02,m,0.25
2020-04-02,f,0.75
");
	let can_deaths = write(p, "can_deaths.csv", "\
fecha,edad,muertes
01/04/2020,5,1
01/04/2020,15,2
02/04/2020,5,0
02/04/2020,15,3
");
	let reference = write(p, "reference.csv", "\
ISO,DATE,cases_new,deaths_new
CAN,2020-04-01,80,3
CAN,2020-04-02,5,3
BEL,2020-04-01,1000,10
");
	let manifest = write(p, "manifest.csv", &format!("\
iso,field,location,steps,mandatory,date_column,date_format,age_column,sex_column,value_column,fractions
BEL,cases_new,{},contiguous;new;both,true,,,,,,
BEL,deaths_new,{},both,true,,,,,,
CAN,cases_new,{},split;rescale,false,,,,,,{}
CAN,deaths_new,{},,false,fecha,%d/%m/%Y,edad,-,muertes,
FRA,cases_new,{},,false,,,,,,
FRA,deaths_new,{},,false,,,,,,
",
		bel_cases, bel_deaths,
		can_cases, can_fractions,
		can_deaths,
		p.join("missing.csv").display(), p.join("missing.csv").display(),
	));

	let fetcher = Fetcher::new("test").unwrap();
	let entries = read_manifest(magic_open(&manifest).unwrap()).unwrap();
	let mut generator = Generator::new(&fetcher, Some(reference));
	for source in sources_from_manifest(&entries, &fetcher).unwrap() {
		generator.add_source(source);
	}
	assert_eq!(generator.len(), 3);
	let rows = generator.generate(&mut NullMeter).unwrap();
	assert_eq!(rows.len(), 10);

	let bel = find(&rows, "BEL", day(3), Age::Decade(3), Sex::Both);
	assert_eq!(bel.cases_new, 6.);
	assert_eq!(bel.deaths_new, 2.);
	assert_eq!(find(&rows, "BEL", day(2), Age::Decade(3), Sex::Male).cases_new, 0.);

	// doubled to match the reference total of 80
	let can = find(&rows, "CAN", day(1), Age::Decade(1), Sex::Both);
	assert_eq!(can.cases_new, 60.);
	assert_eq!(can.deaths_new, 2.);
	// reference below the threshold leaves the day alone
	assert_eq!(find(&rows, "CAN", day(2), Age::Decade(0), Sex::Both).cases_new, 20.);
	assert!(rows.iter().all(|r| r.iso.as_str() != "FRA"));

	let out = dir.path().join("out.csv.gz");
	write_output(&out, |w| write_combined(w, &rows)).unwrap();
	let mut r = csv::Reader::from_reader(magic_open(&out).unwrap());
	let back: Vec<CombinedRecord> = r.deserialize().collect::<Result<_, _>>().unwrap();
	assert_eq!(back, rows);
}

#[test]
fn mandatory_source_failure_aborts() {
	let dir = tempfile::tempdir().unwrap();
	let missing = dir.path().join("missing.csv");
	let manifest = format!("\
iso,field,location,steps,mandatory
DEU,cases_new,{0},,true
DEU,deaths_new,{0},,true
", missing.display());

	let fetcher = Fetcher::new("test").unwrap();
	let entries = read_manifest(manifest.as_bytes()).unwrap();
	let mut generator = Generator::new(&fetcher, None);
	for source in sources_from_manifest(&entries, &fetcher).unwrap() {
		generator.add_source(source);
	}
	match generator.generate(&mut NullMeter) {
		Err(covid_age::Error::MandatorySource{iso, ..}) => assert_eq!(iso.as_str(), "DEU"),
		other => panic!("unexpected: {:?}", other),
	}
}
