use chrono::{DateTime, Utc};

use log::debug;

use super::error::Result;


/// Holds a dataset once it has been loaded so that later users share it.
///
/// A failed reload keeps the previously loaded data.
#[derive(Debug)]
pub struct DatasetCache<T> {
	data: Option<T>,
	loaded_at: Option<DateTime<Utc>>,
}

impl<T> Default for DatasetCache<T> {
	fn default() -> Self {
		Self{
			data: None,
			loaded_at: None,
		}
	}
}

impl<T> DatasetCache<T> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn load<F: FnOnce() -> Result<T>>(&mut self, force: bool, loader: F) -> Result<&T> {
		let data = match self.data.take() {
			Some(data) if !force => data,
			previous => match loader() {
				Ok(data) => {
					let now = Utc::now();
					debug!("dataset loaded at {}", now);
					self.loaded_at = Some(now);
					data
				},
				Err(e) => {
					self.data = previous;
					return Err(e)
				},
			},
		};
		Ok(self.data.get_or_insert(data))
	}

	pub fn get_or_load<F: FnOnce() -> Result<T>>(&mut self, loader: F) -> Result<&T> {
		self.load(false, loader)
	}

	pub fn reload<F: FnOnce() -> Result<T>>(&mut self, loader: F) -> Result<&T> {
		self.load(true, loader)
	}

	/// Store data obtained elsewhere as if it had just been loaded.
	pub fn insert(&mut self, data: T) -> &T {
		self.loaded_at = Some(Utc::now());
		self.data = None;
		self.data.get_or_insert(data)
	}

	pub fn get(&self) -> Option<&T> {
		self.data.as_ref()
	}

	pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
		self.loaded_at
	}

	pub fn clear(&mut self) {
		self.data = None;
		self.loaded_at = None;
	}
}
