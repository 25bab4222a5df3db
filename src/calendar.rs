use chrono::{Datelike, Duration, NaiveDate, Utc};


pub fn naive_today() -> NaiveDate {
	Utc::now().naive_utc().date()
}

/// The Sunday closing ISO week `week` of `year`.
///
/// Weeks past the end of the year keep counting forward, so week 53 of a
/// 52-week year lands on the first Sunday of the next ISO year.
pub fn last_day_of_week(year: i32, week: u32) -> Option<NaiveDate> {
	let first = NaiveDate::from_ymd_opt(year, 1, 1)?;
	let base: i64 = if first.iso_week().week() == 1 {
		1
	} else {
		8
	};
	let weekday = first.weekday().number_from_monday() as i64;
	let offset = base - weekday + 7 * (week as i64 - 1) + 6;
	first.checked_add_signed(Duration::days(offset))
}

/// ISO (year, week) a date belongs to.
pub fn iso_year_week(date: NaiveDate) -> (i32, u32) {
	let w = date.iso_week();
	(w.year(), w.week())
}
