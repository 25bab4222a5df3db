use std::env;

use covid_age::{
	combine_providers, default_output, write_daily, write_output, ExcessProvider, Fetcher,
};


fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.init();

	let argv: Vec<String> = env::args().collect();
	if argv.len() < 4 {
		eprintln!("usage: {} OUTPUT CURRENT_YEAR KIND:ISO,ISO,...[:LOCATION] ...", argv[0]);
		eprintln!("hmd without a location reads {}", covid_age::hmd::STMF_URL);
		std::process::exit(2);
	}
	let outfile = &argv[1];
	let current_year: i32 = argv[2].parse()?;
	let providers = argv[3..].iter().map(|s| s.parse()).collect::<Result<Vec<ExcessProvider>, _>>()?;

	let fetcher = Fetcher::from_env()?;
	let mut tables = Vec::with_capacity(providers.len());
	for provider in providers.iter() {
		println!("loading {} ...", provider);
		let rows = provider.load(&fetcher, &mut *default_output(), current_year)?;
		tables.push((provider, rows));
	}

	println!("combining ...");
	let daily = combine_providers(tables)?;

	println!("writing {} rows ...", daily.len());
	write_output(outfile, |w| write_daily(w, &daily))?;
	Ok(())
}
