use clap::{Arg, Command};
use csv_upload::{Record, COLUMNS};
use std::io::{self, Write};

fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .about("Write a synthetic user CSV to stdout")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("no_header")
                .long("no-header")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("invalid_every")
                .long("invalid-every")
                .help("Blank out CreditScore on every Nth row (0 = never)")
                .value_parser(clap::value_parser!(u64))
                .default_value("0"),
        )
        .get_matches();

    let rows: u64 = *matches.get_one("rows").unwrap();
    let with_header = !matches.get_flag("no_header");
    let invalid_every: u64 = *matches.get_one("invalid_every").unwrap();

    let mut out = io::BufWriter::new(io::stdout().lock());

    if with_header {
        writeln!(&mut out, "{}", COLUMNS.join(","))?;
    }

    // Deterministic data: user<i>@example.com, User <i>, 300..=849, 0..=9
    for i in 0..rows {
        let invalid = invalid_every > 0 && i % invalid_every == invalid_every - 1;
        let record = Record {
            email: format!("user{i}@example.com"),
            name: format!("User {i}"),
            credit_score: (!invalid).then(|| 300 + (i % 550) as i64),
            credit_lines: Some((i % 10) as i64),
            masked_phone_number: format!("***{:04}", i % 10_000),
        };
        writeln!(&mut out, "{}", record.to_fields().join(","))?;
        if i % 10_000 == 0 {
            out.flush()?;
        } // keep buffers moving on huge runs
    }

    out.flush()?;
    Ok(())
}
