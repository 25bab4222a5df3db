use std::env;

use covid_age::{
	default_output, magic_open, read_manifest, sources_from_manifest, write_combined, write_output,
	Fetcher, Generator, REFERENCE_ENV,
};


fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.init();

	let argv: Vec<String> = env::args().collect();
	if argv.len() != 3 {
		eprintln!("usage: {} MANIFEST OUTPUT", argv[0]);
		std::process::exit(2);
	}
	let manifest = &argv[1];
	let outfile = &argv[2];

	let fetcher = Fetcher::from_env()?;
	let reference = env::var(REFERENCE_ENV).ok();

	println!("reading manifest ...");
	let entries = read_manifest(magic_open(manifest)?)?;
	let mut generator = Generator::new(&fetcher, reference);
	for source in sources_from_manifest(&entries, &fetcher)? {
		generator.add_source(source);
	}

	println!("loading {} sources ...", generator.len());
	let records = generator.generate(&mut *default_output())?;

	println!("writing {} rows ...", records.len());
	write_output(outfile, |w| write_combined(w, &records))?;
	Ok(())
}
