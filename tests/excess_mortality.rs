use std::fs;

use chrono::NaiveDate;

use covid_age::{
	combine_providers, magic_open, write_daily, write_output, DailyExcess, Error, ExcessProvider,
	Fetcher, NullMeter,
};


fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
	NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn providers_to_daily_excess() {
	let dir = tempfile::tempdir().unwrap();
	let stmf = dir.path().join("stmf.csv");
	let mut contents = String::from("\
Short-term Mortality Fluctuations
CountryCode,Year,Week,Sex,D0_14,D15_64,D65_74,D75_84,D85p,DTotal,RTotal
");
	for year in 2015..2020 {
		contents.push_str(&format!("AUT,{},10,b,1,10,20,30,39,100,0.1\n", year));
		contents.push_str(&format!("DEUTNP,{},10,b,1,10,20,30,39,100,0.1\n", year));
	}
	contents.push_str("AUT,2020,10,b,1,10,20,30,109,170,0.1\n");
	contents.push_str("DEUTNP,2020,10,b,1,10,20,30,39,100,0.1\n");
	fs::write(&stmf, contents).unwrap();

	let published = dir.path().join("published.csv");
	fs::write(&published, "ISO,DATE,deaths_excess_weekly\nGBR,2020-03-01,14\nGBR,2020-03-08,28\n").unwrap();

	let hmd: ExcessProvider = format!("hmd:AUT:{}", stmf.display()).parse().unwrap();
	let economist: ExcessProvider = format!("excess:GBR:{}", published.display()).parse().unwrap();

	let fetcher = Fetcher::new("test").unwrap();
	let hmd_rows = hmd.load(&fetcher, &mut NullMeter, 2020).unwrap();
	let economist_rows = economist.load(&fetcher, &mut NullMeter, 2020).unwrap();
	assert_eq!(hmd_rows.len(), 7);
	assert!(hmd_rows.iter().all(|r| r.deaths_excess_daily_avg == 10.));
	assert_eq!(hmd_rows[6].date, ymd(2020, 3, 8));
	assert_eq!(hmd_rows[6].deaths_excess_weekly, Some(70.));

	let daily = combine_providers(vec![(&hmd, hmd_rows), (&economist, economist_rows)]).unwrap();
	assert_eq!(daily.len(), 21);
	assert!(daily.iter().all(|r| r.iso.as_str() != "DEU"));
	let gbr_last = daily.iter().filter(|r| r.iso.as_str() == "GBR").last().unwrap();
	assert_eq!(gbr_last.date, ymd(2020, 3, 8));
	assert_eq!(gbr_last.deaths_excess_daily_avg, 4.);
	assert_eq!(gbr_last.deaths_excess_weekly, Some(28.));

	let out = dir.path().join("excess.csv");
	write_output(&out, |w| write_daily(w, &daily)).unwrap();
	let mut r = csv::Reader::from_reader(magic_open(&out).unwrap());
	let back: Vec<DailyExcess> = r.deserialize().collect::<Result<_, _>>().unwrap();
	assert_eq!(back, daily);
}

#[test]
fn overlapping_providers_are_rejected() {
	let a: ExcessProvider = "hmd:AUT,SWE:a.csv".parse().unwrap();
	let b: ExcessProvider = "eurostat:SWE:b.csv".parse().unwrap();
	match combine_providers(vec![(&a, Vec::new()), (&b, Vec::new())]) {
		Err(Error::IsoCollision{iso, ..}) => assert_eq!(iso.as_str(), "SWE"),
		other => panic!("unexpected: {:?}", other),
	}
}
