//! Reshaping operations over tidy tables.
//!
//! Every operation spreads the table onto a daily grid keyed by
//! (Age, Sex), works series by series and collects the result back into
//! a tidy table ordered by date, age and sex.
use std::collections::BTreeMap;

use chrono::NaiveDate;

use log::{debug, warn};

use super::error::{Error, Result};
use super::reference::{ReferenceTotals, SexFractions};
use super::tidy::{Observation, SeriesKey, Sex, TidyTable};
use super::timeseries::{Dense, Sparse};


pub const DEFAULT_SMOOTHING_WINDOW: usize = 3;
pub const DEFAULT_RESCALE_THRESHOLD: f64 = 10.;


/// How dates without any observation are filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPolicy {
	Zero,
	/// Repeat the most recent observed value (cumulative series).
	Forward,
}


/// Round to the nearest integer, ties to the even neighbour.
pub fn round_half_even(v: f64) -> f64 {
	let r = v.round();
	if (v - v.trunc()).abs() == 0.5 {
		2. * (v / 2.).round()
	} else {
		r
	}
}

fn empty(table: &TidyTable) -> TidyTable {
	TidyTable::new(table.field(), Vec::new())
}

fn observed_mask(grid: &Sparse<SeriesKey>) -> Vec<bool> {
	let mut mask = vec![false; grid.len()];
	for i in grid.observed_indices() {
		mask[i] = true;
	}
	mask
}


/// Turn running totals into per-period increments.
///
/// Each (Age, Sex) series is differenced against its previous
/// observation; the first observation of a series has nothing to diff
/// against and is dropped. Decreases are clamped to zero.
pub fn cumulative_to_new(table: &TidyTable) -> TidyTable {
	let grid = match table.to_grid() {
		Some(g) => g,
		None => return empty(table),
	};
	let mut out: Sparse<SeriesKey> = grid.empty_like();
	let mut clamped = 0;
	for (k, src) in grid.iter() {
		let dst = out.get_or_fill(*k, None);
		let mut prev: Option<f64> = None;
		for (i, v) in src.iter().enumerate() {
			let v = match v {
				Some(v) => *v,
				None => continue,
			};
			if let Some(p) = prev {
				let d = v - p;
				dst[i] = Some(if d < 0. {
					clamped += 1;
					0.
				} else {
					d
				});
			}
			prev = Some(v);
		}
	}
	if clamped > 0 {
		debug!("clamped {} negative increments of {}", clamped, table.field());
	}
	TidyTable::from_grid(table.field(), &out)
}


/// Redistribute values reported for irregular periods onto single days.
///
/// A value observed on date `d` is taken to cover the days since the
/// previous date on which the table has any observation, and is divided
/// evenly over them. Series lacking a value on an observed date count as
/// zero there. The earliest date has no preceding period and keeps its
/// value. The result covers every day of the table's range and is not
/// rounded.
pub fn periodic_to_daily(table: &TidyTable) -> TidyTable {
	let grid = match table.to_grid() {
		Some(g) => g,
		None => return empty(table),
	};
	let observed = grid.observed_indices();
	let mut out: Dense<SeriesKey> = grid.empty_like();
	for (k, src) in grid.iter() {
		let dst = out.get_or_create(*k);
		if let Some(first) = observed.first() {
			dst[*first] = src[*first].unwrap_or(0.);
		}
		for pair in observed.windows(2) {
			let (prev, cur) = (pair[0], pair[1]);
			let share = src[cur].unwrap_or(0.) / (cur - prev) as f64;
			for slot in dst[prev+1..=cur].iter_mut() {
				*slot = share;
			}
		}
	}
	let clamped = out.clamp_negative();
	if clamped > 0 {
		debug!("clamped {} negative daily values of {}", clamped, table.field());
	}
	let indices: Vec<usize> = (0..out.len()).collect();
	TidyTable::from_dense(table.field(), &out, &indices)
}


/// Make the table complete: one row per day of its range and per
/// combination of the observed ages and sexes.
///
/// Duplicate rows keep their first value. Holes in the age/sex cross
/// product on observed dates become zero; days without any observation
/// are filled according to `fill`.
pub fn ensure_contiguous(table: &TidyTable, fill: FillPolicy) -> TidyTable {
	let grid = match table.to_grid() {
		Some(g) => g,
		None => return empty(table),
	};
	let mask = observed_mask(&grid);
	let mut out: Dense<SeriesKey> = grid.empty_like();
	for age in table.ages() {
		for sex in table.sexes() {
			let k = (age, sex);
			let src = grid.get(&k);
			let dst = out.get_or_create(k);
			for i in 0..dst.len() {
				dst[i] = if mask[i] {
					src.and_then(|s| s[i]).unwrap_or(0.)
				} else {
					// the first day of the range is always observed
					match fill {
						FillPolicy::Forward => dst[i-1],
						FillPolicy::Zero => 0.,
					}
				};
			}
		}
	}
	let indices: Vec<usize> = (0..out.len()).collect();
	TidyTable::from_dense(table.field(), &out, &indices)
}


/// Repair cumulative series which go down: a value below the running
/// maximum of its series is replaced by that maximum.
pub fn ensure_non_decreasing(table: &TidyTable) -> TidyTable {
	let mut grid = match table.to_grid() {
		Some(g) => g,
		None => return empty(table),
	};
	let mut repaired = 0;
	for vec in grid.iter_mut() {
		let mut max: Option<f64> = None;
		for v in vec.iter_mut() {
			let cur = match v {
				Some(cur) => *cur,
				None => continue,
			};
			match max {
				Some(m) if cur < m => {
					*v = Some(m);
					repaired += 1;
				},
				_ => max = Some(cur),
			}
		}
	}
	if repaired > 0 {
		debug!("repaired {} decreasing cumulative values of {}", repaired, table.field());
	}
	TidyTable::from_grid(table.field(), &grid)
}


/// Centered moving average over the observed dates.
///
/// Missing values count as zero, windows shrink at the edges instead of
/// producing gaps, and the result is rounded half to even.
pub fn smooth_sample(table: &TidyTable, window: usize) -> Result<TidyTable> {
	if window == 0 {
		return Err(Error::InvalidWindow(window))
	}
	let grid = match table.to_grid() {
		Some(g) => g,
		None => return Ok(empty(table)),
	};
	let observed = grid.observed_indices();
	let dense = grid.densify(0.);
	let before = window / 2;
	let after = (window - 1) / 2;
	let mut out: Dense<SeriesKey> = dense.empty_like();
	for (k, src) in dense.iter() {
		let dst = out.get_or_create(*k);
		for (pos, i) in observed.iter().enumerate() {
			let lo = pos.saturating_sub(before);
			let hi = (pos + after).min(observed.len() - 1);
			let sum: f64 = observed[lo..=hi].iter().map(|j| src[*j]).sum();
			dst[*i] = round_half_even(sum / (hi - lo + 1) as f64);
		}
	}
	Ok(TidyTable::from_dense(table.field(), &out, &observed))
}


/// Append `b` rows holding the sum of `m` and `f` per (Date, Age).
///
/// The table must contain exactly the sexes `m` and `f`.
pub fn add_both_sexes(table: &TidyTable) -> Result<TidyTable> {
	let sexes = table.sexes();
	if sexes != vec![Sex::Male, Sex::Female] {
		return Err(Error::SexCount(sexes))
	}
	let grid = match table.to_grid() {
		Some(g) => g,
		None => return Ok(empty(table)),
	};
	let both = grid.rekeyed(|(age, _)| Some((*age, Sex::Both)));
	let mut result = table.clone();
	result.extend(TidyTable::from_grid(table.field(), &both).into_rows());
	result.sort();
	Ok(result)
}


/// Scale every row so that the daily both-sexes total matches the
/// trusted reference total.
///
/// Where the reference total is below `threshold` the factor is forced to
/// one. Dates missing from the reference, or lacking `b` rows, are
/// dropped. Values are rounded after scaling.
pub fn rescale(table: &TidyTable, reference: &ReferenceTotals, threshold: f64) -> Result<TidyTable> {
	let mut observed: BTreeMap<NaiveDate, f64> = BTreeMap::new();
	for row in table.rows().iter().filter(|r| r.sex == Sex::Both) {
		*observed.entry(row.date).or_insert(0.) += row.value;
	}
	if observed.is_empty() {
		return Err(Error::NoBothSexes)
	}

	let mut factors: BTreeMap<NaiveDate, f64> = BTreeMap::new();
	let mut unreferenced = 0;
	for (date, total) in observed {
		let reference_total = match reference.get(date) {
			Some(v) => v,
			None => {
				unreferenced += 1;
				continue
			},
		};
		let factor = if reference_total < threshold {
			1.
		} else if total <= 0. {
			warn!("no {} observed on {} but reference reports {}, not rescaling", table.field(), date, reference_total);
			1.
		} else {
			reference_total / total
		};
		factors.insert(date, factor);
	}
	if unreferenced > 0 {
		debug!("dropped {} dates of {} without reference totals", unreferenced, table.field());
	}

	let rows = table.rows().iter().filter_map(|row| {
		let factor = factors.get(&row.date)?;
		Some(Observation::new(row.date, row.age, row.sex, round_half_even(row.value * factor)))
	}).collect();
	Ok(TidyTable::new(table.field(), rows))
}


/// Derive `m` and `f` rows from a both-sexes-only table using per-date
/// fractions. Dates without fractions keep only their `b` rows.
pub fn split_by_sex_fractions(table: &TidyTable, fractions: &SexFractions) -> Result<TidyTable> {
	if table.rows().iter().any(|r| r.sex != Sex::Both) {
		return Err(Error::NotBothSexesOnly)
	}
	let mut result = table.clone();
	let mut unsplit = 0;
	for row in table.rows() {
		let f = match fractions.get(row.date) {
			Some(f) => f,
			None => {
				unsplit += 1;
				continue
			},
		};
		for sex in [Sex::Male, Sex::Female].iter() {
			result.push(Observation::new(row.date, row.age, *sex, round_half_even(row.value * f[*sex])));
		}
	}
	if unsplit > 0 {
		debug!("{} {} rows without sex fractions", unsplit, table.field());
	}
	result.sort();
	Ok(result)
}


pub fn round_counts(table: &TidyTable) -> TidyTable {
	let rows = table.rows().iter().map(|r| {
		Observation::new(r.date, r.age, r.sex, round_half_even(r.value))
	}).collect();
	TidyTable::new(table.field(), rows)
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::age::Age;
	use crate::tidy::Field;

	fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
		NaiveDate::from_ymd_opt(y, m, d).unwrap()
	}

	fn day(d: u32) -> NaiveDate {
		ymd(2020, 4, d)
	}

	fn obs(date: NaiveDate, age: Age, sex: Sex, value: f64) -> Observation {
		Observation::new(date, age, sex, value)
	}

	fn series(table: &TidyTable, age: Age, sex: Sex) -> Vec<(NaiveDate, f64)> {
		table.rows().iter()
			.filter(|r| r.age == age && r.sex == sex)
			.map(|r| (r.date, r.value))
			.collect()
	}

	const A: Age = Age::Decade(2);
	const B: Age = Age::Decade(5);

	#[test]
	fn cumulative_to_new_drops_first_and_clamps() {
		let table = TidyTable::new(Field::CasesNew, vec![
			obs(day(1), A, Sex::Male, 10.),
			obs(day(2), A, Sex::Male, 15.),
			obs(day(4), A, Sex::Male, 14.),
			obs(day(5), A, Sex::Male, 20.),
		]);
		let new = cumulative_to_new(&table);
		assert_eq!(series(&new, A, Sex::Male), vec![(day(2), 5.), (day(4), 0.), (day(5), 6.)]);
	}

	#[test]
	fn cumulative_to_new_round_trip() {
		let cum = [3., 3., 7., 12., 20., 20., 31.];
		let mut rows = Vec::new();
		for (i, v) in cum.iter().enumerate() {
			rows.push(obs(day(i as u32 + 1), A, Sex::Female, *v));
			rows.push(obs(day(i as u32 + 1), B, Sex::Female, *v * 2.));
		}
		let table = TidyTable::new(Field::DeathsNew, rows);
		let new = cumulative_to_new(&table);
		for (age, scale) in [(A, 1.), (B, 2.)].iter() {
			let mut acc = cum[0] * scale;
			let mut rebuilt = vec![acc];
			for (_, v) in series(&new, *age, Sex::Female) {
				acc += v;
				rebuilt.push(acc);
			}
			let expected: Vec<f64> = cum.iter().map(|v| v * scale).collect();
			assert_eq!(rebuilt, expected);
		}
	}

	#[test]
	fn periodic_to_daily_spreads_evenly() {
		let table = TidyTable::new(Field::CasesNew, vec![
			obs(day(1), A, Sex::Male, 0.),
			obs(day(11), A, Sex::Male, 100.),
		]);
		let daily = periodic_to_daily(&table);
		let s = series(&daily, A, Sex::Male);
		assert_eq!(s.len(), 11);
		assert_eq!(s[0], (day(1), 0.));
		for (i, (date, v)) in s[1..].iter().enumerate() {
			assert_eq!(*date, day(i as u32 + 2));
			assert_eq!(*v, 10.);
		}
		let total: f64 = s.iter().map(|(_, v)| v).sum();
		assert_eq!(total, 100.);
	}

	#[test]
	fn periodic_to_daily_unequal_gaps() {
		let table = TidyTable::new(Field::CasesNew, vec![
			obs(day(1), A, Sex::Male, 4.),
			obs(day(3), A, Sex::Male, 6.),
			obs(day(7), A, Sex::Male, 10.),
			obs(day(7), B, Sex::Male, 8.),
		]);
		let daily = periodic_to_daily(&table);
		let a: Vec<f64> = series(&daily, A, Sex::Male).into_iter().map(|(_, v)| v).collect();
		assert_eq!(a, vec![4., 3., 3., 2.5, 2.5, 2.5, 2.5]);
		// B only reported on the last date, earlier periods count as zero
		let b: Vec<f64> = series(&daily, B, Sex::Male).into_iter().map(|(_, v)| v).collect();
		assert_eq!(b, vec![0., 0., 0., 2., 2., 2., 2.]);
	}

	#[test]
	fn periodic_to_daily_leaves_daily_data_alone() {
		let table = TidyTable::new(Field::CasesNew, vec![
			obs(day(1), A, Sex::Male, 1.),
			obs(day(2), A, Sex::Male, 2.),
			obs(day(3), A, Sex::Male, 3.),
		]);
		assert_eq!(periodic_to_daily(&table), table);
	}

	#[test]
	fn ensure_contiguous_fills_cross_product_and_dates() {
		let table = TidyTable::new(Field::CasesNew, vec![
			obs(day(1), A, Sex::Male, 1.),
			obs(day(1), A, Sex::Male, 99.),
			obs(day(1), B, Sex::Female, 2.),
			obs(day(4), A, Sex::Male, 5.),
		]);
		let filled = ensure_contiguous(&table, FillPolicy::Forward);
		assert_eq!(filled.len(), 4 * 4);
		assert_eq!(series(&filled, A, Sex::Male), vec![(day(1), 1.), (day(2), 1.), (day(3), 1.), (day(4), 5.)]);
		assert_eq!(series(&filled, B, Sex::Female), vec![(day(1), 2.), (day(2), 2.), (day(3), 2.), (day(4), 0.)]);
		assert_eq!(series(&filled, A, Sex::Female), vec![(day(1), 0.), (day(2), 0.), (day(3), 0.), (day(4), 0.)]);

		let zeroed = ensure_contiguous(&table, FillPolicy::Zero);
		assert_eq!(series(&zeroed, A, Sex::Male), vec![(day(1), 1.), (day(2), 0.), (day(3), 0.), (day(4), 5.)]);
	}

	#[test]
	fn ensure_non_decreasing_uses_running_max() {
		let table = TidyTable::new(Field::CasesNew, vec![
			obs(day(1), A, Sex::Male, 5.),
			obs(day(2), A, Sex::Male, 3.),
			obs(day(3), A, Sex::Male, 4.),
			obs(day(4), A, Sex::Male, 8.),
		]);
		let fixed = ensure_non_decreasing(&table);
		let v: Vec<f64> = series(&fixed, A, Sex::Male).into_iter().map(|(_, v)| v).collect();
		assert_eq!(v, vec![5., 5., 5., 8.]);
	}

	#[test]
	fn smooth_sample_shrinks_at_edges() {
		let table = TidyTable::new(Field::CasesNew, vec![
			obs(day(1), A, Sex::Male, 3.),
			obs(day(2), A, Sex::Male, 6.),
			obs(day(3), A, Sex::Male, 9.),
			obs(day(4), A, Sex::Male, 0.),
			obs(day(4), B, Sex::Male, 12.),
		]);
		let smoothed = smooth_sample(&table, 3).unwrap();
		let a: Vec<f64> = series(&smoothed, A, Sex::Male).into_iter().map(|(_, v)| v).collect();
		assert_eq!(a, vec![4., 6., 5., 4.]);
		// B is missing on the first days, which count as zero
		let b: Vec<f64> = series(&smoothed, B, Sex::Male).into_iter().map(|(_, v)| v).collect();
		assert_eq!(b, vec![0., 0., 4., 6.]);

		let wide = smooth_sample(&table, 5).unwrap();
		let a: Vec<f64> = series(&wide, A, Sex::Male).into_iter().map(|(_, v)| v).collect();
		assert_eq!(a, vec![6., 4., 4., 5.]);

		assert!(smooth_sample(&table, 0).is_err());
	}

	#[test]
	fn ties_round_to_even() {
		assert_eq!(round_half_even(2.5), 2.);
		assert_eq!(round_half_even(3.5), 4.);
		assert_eq!(round_half_even(-2.5), -2.);
		assert_eq!(round_half_even(2.4), 2.);
		assert_eq!(round_half_even(2.6), 3.);

		let table = TidyTable::new(Field::CasesNew, vec![
			obs(day(1), A, Sex::Male, 2.),
			obs(day(2), A, Sex::Male, 3.),
			obs(day(3), A, Sex::Male, 3.),
		]);
		let smoothed = smooth_sample(&table, 3).unwrap();
		assert_eq!(smoothed.get(day(1), A, Sex::Male), Some(2.));

		let periodic = TidyTable::new(Field::CasesNew, vec![
			obs(day(1), A, Sex::Male, 0.),
			obs(day(3), A, Sex::Male, 5.),
			obs(day(5), A, Sex::Male, 7.),
		]);
		let daily = round_counts(&periodic_to_daily(&periodic));
		let v: Vec<f64> = series(&daily, A, Sex::Male).into_iter().map(|(_, v)| v).collect();
		assert_eq!(v, vec![0., 2., 2., 4., 4.]);
	}

	#[test]
	fn add_both_sexes_sums_male_and_female() {
		let d = ymd(2020, 1, 1);
		let table = TidyTable::new(Field::CasesNew, vec![
			obs(d, Age::Decade(0), Sex::Male, 5.),
			obs(d, Age::Decade(0), Sex::Female, 3.),
		]);
		let result = add_both_sexes(&table).unwrap();
		assert_eq!(result.len(), 3);
		assert_eq!(result.get(d, Age::Decade(0), Sex::Both), Some(8.));
	}

	#[test]
	fn add_both_sexes_requires_exactly_two() {
		let d = day(1);
		let one = TidyTable::new(Field::CasesNew, vec![obs(d, A, Sex::Male, 1.)]);
		match add_both_sexes(&one) {
			Err(Error::SexCount(found)) => assert_eq!(found, vec![Sex::Male]),
			other => panic!("unexpected: {:?}", other),
		}
		let three = TidyTable::new(Field::CasesNew, vec![
			obs(d, A, Sex::Male, 1.),
			obs(d, A, Sex::Female, 1.),
			obs(d, A, Sex::Both, 2.),
		]);
		assert!(add_both_sexes(&three).is_err());
	}

	#[test]
	fn rescale_matches_reference() {
		let table = TidyTable::new(Field::DeathsNew, vec![
			obs(day(1), A, Sex::Male, 2.),
			obs(day(1), A, Sex::Female, 3.),
			obs(day(1), A, Sex::Both, 5.),
			obs(day(2), A, Sex::Male, 10.),
			obs(day(2), A, Sex::Female, 10.),
			obs(day(2), A, Sex::Both, 20.),
			obs(day(3), A, Sex::Both, 7.),
		]);
		let reference: ReferenceTotals = vec![(day(1), 8.), (day(2), 40.)].into_iter().collect();
		let scaled = rescale(&table, &reference, DEFAULT_RESCALE_THRESHOLD).unwrap();
		// below the threshold nothing changes
		assert_eq!(scaled.get(day(1), A, Sex::Male), Some(2.));
		assert_eq!(scaled.get(day(1), A, Sex::Both), Some(5.));
		// twice the observed total doubles everything
		assert_eq!(scaled.get(day(2), A, Sex::Male), Some(20.));
		assert_eq!(scaled.get(day(2), A, Sex::Both), Some(40.));
		// no reference for day 3
		assert_eq!(scaled.get(day(3), A, Sex::Both), None);
		assert_eq!(scaled.len(), 6);
	}

	#[test]
	fn rescale_needs_both_sexes() {
		let table = TidyTable::new(Field::DeathsNew, vec![obs(day(1), A, Sex::Male, 2.)]);
		let reference: ReferenceTotals = vec![(day(1), 8.)].into_iter().collect();
		assert!(matches!(rescale(&table, &reference, 10.), Err(Error::NoBothSexes)));
	}

	#[test]
	fn split_by_fractions() {
		let table = TidyTable::new(Field::CasesNew, vec![
			obs(day(1), A, Sex::Both, 10.),
			obs(day(2), A, Sex::Both, 7.),
		]);
		let mut fractions = SexFractions::new();
		fractions.insert(day(1), 0.44, 0.56);
		let split = split_by_sex_fractions(&table, &fractions).unwrap();
		assert_eq!(split.get(day(1), A, Sex::Male), Some(4.));
		assert_eq!(split.get(day(1), A, Sex::Female), Some(6.));
		assert_eq!(split.get(day(2), A, Sex::Both), Some(7.));
		assert_eq!(split.get(day(2), A, Sex::Male), None);

		let mixed = TidyTable::new(Field::CasesNew, vec![obs(day(1), A, Sex::Male, 1.)]);
		assert!(split_by_sex_fractions(&mixed, &fractions).is_err());
	}

	#[test]
	fn empty_tables_pass_through() {
		let table = TidyTable::new(Field::CasesNew, Vec::new());
		assert!(cumulative_to_new(&table).is_empty());
		assert!(periodic_to_daily(&table).is_empty());
		assert!(ensure_contiguous(&table, FillPolicy::Forward).is_empty());
		assert!(smooth_sample(&table, 3).unwrap().is_empty());
	}
}
