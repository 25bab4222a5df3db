use std::collections::HashMap;
use std::hash::Hash;

use num_traits::Zero;

use chrono::{Duration, NaiveDate};


pub trait TimeSeriesKey: Hash + Eq + Clone + std::fmt::Debug {}
impl<T: Hash + Eq + Clone + std::fmt::Debug> TimeSeriesKey for T {}


/// Values which can be summed up when several series are merged into one.
pub trait Accumulate: Copy {
	fn empty() -> Self;
	fn accumulate(&mut self, other: Self);
}

impl Accumulate for f64 {
	fn empty() -> Self {
		0.
	}

	fn accumulate(&mut self, other: Self) {
		*self += other;
	}
}

// absent + absent stays absent, otherwise absent counts as zero
impl Accumulate for Option<f64> {
	fn empty() -> Self {
		None
	}

	fn accumulate(&mut self, other: Self) {
		*self = match (*self, other) {
			(None, None) => None,
			(a, b) => Some(a.unwrap_or(0.) + b.unwrap_or(0.)),
		};
	}
}


/// One daily series per key, all sharing the same date range.
#[derive(Debug, Clone)]
pub struct TimeSeries<T: Hash + Eq, V: Copy> {
	start: NaiveDate,
	keys: HashMap<T, usize>,
	time_series: Vec<Vec<V>>,
	len: usize,
}

impl<T: Hash + Eq, V: Copy> TimeSeries<T, V> {
	/// Daily range `start..end`, end exclusive.
	pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
		let len = (end - start).num_days();
		assert!(len >= 0);
		let len = len as usize;
		Self{
			start,
			len,
			keys: HashMap::new(),
			time_series: Vec::new(),
		}
	}

	/// Daily range `first..=last`.
	pub fn spanning(first: NaiveDate, last: NaiveDate) -> Self {
		Self::new(first, last + Duration::days(1))
	}

	#[inline(always)]
	pub fn date_index(&self, other: NaiveDate) -> Option<usize> {
		let days = (other - self.start).num_days();
		if days < 0 || days as usize >= self.len {
			return None
		}
		return Some(days as usize)
	}

	#[inline(always)]
	pub fn index_date(&self, i: i64) -> Option<NaiveDate> {
		if i < 0 || i as usize >= self.len {
			return None
		}
		return Some(self.start + Duration::days(i))
	}

	#[inline(always)]
	pub fn start(&self) -> NaiveDate {
		self.start
	}

	#[inline(always)]
	pub fn len(&self) -> usize {
		self.len
	}

	pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
		self.start.iter_days().take(self.len)
	}

	pub fn is_empty(&self) -> bool {
		self.time_series.is_empty()
	}
}

impl<T: TimeSeriesKey, V: Copy> TimeSeries<T, V> {
	pub fn get_or_fill(&mut self, k: T, fill: V) -> &mut [V] {
		let len = self.len;
		let index = self.get_index_or_insert(k, || vec![fill; len]);
		&mut self.time_series[index][..]
	}

	fn get_index_or_insert<F: FnOnce() -> Vec<V>>(&mut self, k: T, f: F) -> usize {
		match self.keys.get(&k) {
			Some(v) => *v,
			None => {
				let vec = f();
				assert_eq!(vec.len(), self.len);
				let v = self.time_series.len();
				self.time_series.push(vec);
				self.keys.insert(k, v);
				v
			},
		}
	}

	pub fn get_index(&self, k: &T) -> Option<usize> {
		Some(*self.keys.get(k)?)
	}

	pub fn get(&self, k: &T) -> Option<&[V]> {
		let index = self.get_index(k)?;
		Some(&self.time_series[index][..])
	}

	pub fn get_value(&self, k: &T, i: usize) -> Option<V> {
		if i >= self.len {
			return None
		}
		self.get(k).and_then(|v| { Some(v[i]) })
	}

	pub fn iter(&self) -> impl Iterator<Item = (&T, &[V])> {
		let series = &self.time_series;
		self.keys.iter().map(move |(k, i)| (k, &series[*i][..]))
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Vec<V>> {
		self.time_series.iter_mut()
	}

	/// Same date range, no series.
	pub fn empty_like<U: Hash + Eq, W: Copy>(&self) -> TimeSeries<U, W> {
		TimeSeries::<U, W>{
			start: self.start,
			len: self.len,
			keys: HashMap::new(),
			time_series: Vec::new(),
		}
	}

	pub fn map<W: Copy, F: Fn(V) -> W>(&self, f: F) -> TimeSeries<T, W> {
		TimeSeries::<T, W>{
			start: self.start,
			len: self.len,
			keys: self.keys.clone(),
			time_series: self.time_series.iter().map(|vec| vec.iter().map(|v| f(*v)).collect()).collect(),
		}
	}
}

impl<T: TimeSeriesKey + Ord, V: Copy> TimeSeries<T, V> {
	pub fn sorted_keys(&self) -> Vec<&T> {
		let mut keys: Vec<_> = self.keys.keys().collect();
		keys.sort();
		keys
	}
}

impl<T: TimeSeriesKey, V: Copy + Zero> TimeSeries<T, V> {
	pub fn get_or_create(&mut self, k: T) -> &mut [V] {
		self.get_or_fill(k, V::zero())
	}
}

impl<T: TimeSeriesKey, V: Accumulate> TimeSeries<T, V> {
	/// Merge series by mapping their keys; keys mapped to the same new key
	/// are accumulated, keys mapped to `None` are dropped.
	pub fn rekeyed<U: TimeSeriesKey, F: Fn(&T) -> Option<U>>(&self, f: F) -> TimeSeries<U, V> {
		let mut result = self.empty_like::<U, V>();
		for (k_old, index_old) in self.keys.iter() {
			let k_new = match f(&k_old) {
				Some(k) => k,
				None => continue,
			};
			let ts_new = result.get_or_fill(k_new, V::empty());
			let ts_old = &self.time_series[*index_old][..];
			assert_eq!(ts_new.len(), ts_old.len());
			for (dst, src) in ts_new.iter_mut().zip(ts_old.iter()) {
				dst.accumulate(*src);
			}
		}
		result
	}

}

impl<T: TimeSeriesKey> TimeSeries<T, f64> {
	/// Replace negative values with zero, returning how many were hit.
	pub fn clamp_negative(&mut self) -> usize {
		let mut n = 0;
		for vec in self.time_series.iter_mut() {
			for v in vec.iter_mut() {
				if *v < 0. {
					*v = 0.;
					n += 1;
				}
			}
		}
		n
	}

}

impl<T: TimeSeriesKey> TimeSeries<T, Option<f64>> {
	/// Indices at which at least one series holds a value, ascending.
	pub fn observed_indices(&self) -> Vec<usize> {
		(0..self.len).filter(|i| {
			self.time_series.iter().any(|vec| vec[*i].is_some())
		}).collect()
	}

	pub fn densify(&self, fill: f64) -> Dense<T> {
		self.map(|v| v.unwrap_or(fill))
	}
}


pub type Sparse<T> = TimeSeries<T, Option<f64>>;
pub type Dense<T> = TimeSeries<T, f64>;
