use std::io;
use std::io::Write;
use std::time;


pub trait ProgressSink {
	fn start(&mut self, n: Option<usize>);
	fn update(&mut self, inow: usize);
	fn finish(&mut self, inow: Option<usize>);
}


pub struct ProgressMeter {
	t0: time::Instant,
	tprev: time::Instant,
	iprev: usize,
	n: Option<usize>,
}

impl ProgressMeter {
	pub fn new() -> Self {
		let now = time::Instant::now();
		Self{
			t0: now,
			tprev: now,
			iprev: 0,
			n: None,
		}
	}
}

impl ProgressSink for ProgressMeter {
	fn start(&mut self, n: Option<usize>) {
		let now = time::Instant::now();
		self.t0 = now;
		self.tprev = now;
		self.iprev = 0;
		self.n = n;
		match n {
			Some(_) => print!("{:6.0}% [{:6.2}/s]\r", 0.0, 0),
			None => print!("{:12} [{:6.2}/s]\r", 0, 0),
		}
		let _ = io::stdout().flush();
	}

	fn update(&mut self, inow: usize) {
		let now = time::Instant::now();
		let dt = (now - self.tprev).as_secs_f64();
		let rate = inow.saturating_sub(self.iprev) as f64 / dt;
		match self.n {
			Some(n) => {
				let done = (inow as f64) / (n as f64);
				print!("{:6.0}% [{:6.2}/s]\r", done * 100.0, rate);
			},
			None => {
				print!("{:12} [{:6.2}/s]\r", inow, rate);
			},
		}
		let _ = io::stdout().flush();
		self.iprev = inow;
		self.tprev = now;
	}

	fn finish(&mut self, inow: Option<usize>) {
		let (inow, tnow) = match inow.or(self.n) {
			Some(inow) => (inow, time::Instant::now()),
			None => (self.iprev, self.tprev),
		};
		let dt = (tnow - self.t0).as_secs_f64();
		let rate = inow as f64 / dt;
		match self.n {
			Some(_) => {
				println!("{:6.0}% [{:6.2}/s]\r", 100.0, rate);
			},
			None => {
				println!("{:12} [{:6.2}/s]\r", inow, rate);
			},
		}
	}
}


/// Swallows all progress, used when stdout is not a terminal.
pub struct NullMeter;

impl ProgressSink for NullMeter {
	fn start(&mut self, _n: Option<usize>) {}
	fn update(&mut self, _inow: usize) {}
	fn finish(&mut self, _inow: Option<usize>) {}
}


/// Progress over a known number of steps.
pub struct StepMeter<'s, S: ProgressSink + ?Sized> {
	sink: &'s mut S,
}

impl<'s, S: ProgressSink + ?Sized> StepMeter<'s, S> {
	pub fn new(sink: &'s mut S, n: usize) -> Self {
		sink.start(Some(n));
		Self{sink}
	}

	pub fn update(&mut self, inow: usize) {
		self.sink.update(inow);
	}

	pub fn finish(self) {
		self.sink.finish(None);
	}
}


/// Progress over an open-ended stream of items.
pub struct CountMeter<'s, S: ProgressSink + ?Sized> {
	sink: &'s mut S,
}

impl<'s, S: ProgressSink + ?Sized> CountMeter<'s, S> {
	pub fn new(sink: &'s mut S) -> Self {
		sink.start(None);
		Self{sink}
	}

	pub fn update(&mut self, inow: usize) {
		self.sink.update(inow);
	}

	pub fn finish(self, n: usize) {
		self.sink.finish(Some(n));
	}
}


pub fn default_output() -> Box<dyn ProgressSink> {
	if isatty::stdout_isatty() {
		Box::new(ProgressMeter::new())
	} else {
		Box::new(NullMeter)
	}
}
