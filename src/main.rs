use eyre::{Result, WrapErr};
use std::sync::Arc;
use std::time::Instant;

use dnscheck::pretty;
use dnscheck::{ExportFormat, GeoLookup, Progress, ResultSet, ScanScheduler, SortDirection};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = dnscheck::cli::parse();

    // Initialize logging first
    if let Err(e) = dnscheck::init_logging(cli.verbose) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }
    log::info!("================================================================================");
    log::info!("NEW DNSCHECK SESSION STARTING");
    log::info!("================================================================================");

    let targets = cli.load_targets()?;
    if targets.is_empty() {
        eyre::bail!("The target list contains no addresses");
    }

    let geo = GeoLookup::open(&cli.city_db_path(), &cli.asn_db_path())
        .wrap_err("Failed to open GeoLite2 databases")?;
    if !geo.has_city_table() {
        eprintln!("Warning: {} not found, locations will show N/A", cli.city_db_path().display());
    }
    if !geo.has_asn_table() {
        eprintln!("Warning: {} not found, providers will show N/A", cli.asn_db_path().display());
    }

    let scheduler = ScanScheduler::from_config(&cli.scan_config(), Arc::new(geo));
    pretty::print_header(targets.len());

    let mut stream = scheduler.start(targets)?;
    let run_start = Instant::now();

    // Ctrl-C cancels the scan; in-flight probes still report
    let ctrl_c = scheduler.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && ctrl_c.cancel() {
            eprintln!("Cancelling, waiting for in-flight probes...");
        }
    });

    // SIGUSR1 toggles pause
    #[cfg(unix)]
    {
        let toggler = scheduler.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};
            let Ok(mut usr1) = signal(SignalKind::user_defined1()) else {
                return;
            };
            while usr1.recv().await.is_some() {
                if toggler.pause().is_ok() {
                    eprintln!("PAUSED.");
                } else if toggler.resume().is_ok() {
                    eprintln!("RESUMED.");
                }
            }
        });
    }

    let mut results = ResultSet::new();
    let mut ticker = tokio::time::interval(cli.poll_interval());
    loop {
        ticker.tick().await;
        let (batch, done) = stream.drain();
        let progress = stream.progress();
        let first = progress.completed - batch.len();
        for (i, result) in batch.into_iter().enumerate() {
            pretty::print_result_line(&result, Progress { completed: first + i + 1, ..progress });
            results.push(result);
        }
        if done {
            break;
        }
    }
    scheduler.wait().await;

    if let Some(field) = cli.sort {
        let direction = if cli.descending { SortDirection::Descending } else { SortDirection::Ascending };
        results.sort_with(field, direction);
    }

    pretty::print_summary(&results, stream.progress(), run_start.elapsed());

    if let Some(path) = &cli.csv {
        results.export(ExportFormat::Csv, path)?;
        println!("Results saved to {}", path.display());
    }
    if let Some(path) = &cli.txt {
        results.export(ExportFormat::Txt, path)?;
        println!("Results saved to {}", path.display());
    }

    Ok(())
}
