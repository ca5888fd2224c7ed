use clap::{Arg, Command};
use csv_upload::store::{Page, RecordStore};
use csv_upload::{ingest_path, MemoryStore};
use std::path::PathBuf;
use std::time::Instant;

/// Ingest a local CSV (plain, .gz or .zst) into the in-memory store and
/// report throughput.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("bench")
        .arg(
            Arg::new("path")
                .long("path")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("page-size")
                .long("page-size")
                .help("Also page through the stored records with this limit")
                .value_parser(clap::value_parser!(u64)),
        )
        .get_matches();

    let path = matches
        .get_one::<PathBuf>("path")
        .ok_or_else(|| anyhow::anyhow!("Provide --path <file>"))?;
    let store = MemoryStore::new();

    let start = Instant::now();
    let inserted = ingest_path(path, &store).await?;
    let elapsed = start.elapsed().as_secs_f64();
    let rps = (inserted.len() as f64) / elapsed;

    let invalid = inserted
        .iter()
        .filter(|r| r.record.credit_score.is_none() || r.record.credit_lines.is_none())
        .count();
    println!(
        "source={} rows={} invalid_numeric={}\nelapsed={:.3}s rows/sec={:.0}",
        path.display(),
        inserted.len(),
        invalid,
        elapsed,
        rps
    );

    if let Some(&limit) = matches.get_one::<u64>("page-size") {
        let start = Instant::now();
        let mut number = 1;
        let mut seen = 0usize;
        loop {
            let page = store.query(Page::new(number, limit)).await?;
            if page.data.is_empty() {
                break;
            }
            seen += page.data.len();
            number += 1;
        }
        println!(
            "pages={} records={} elapsed={:.3}s",
            number - 1,
            seen,
            start.elapsed().as_secs_f64()
        );
    }
    Ok(())
}
