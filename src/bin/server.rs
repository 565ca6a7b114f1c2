use std::{net::SocketAddr, process::exit, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::{MatchedPath, Request},
};
use axum_server::Handle;
use clap::Parser;
use rusqlite::Connection;
use tower_http::trace::TraceLayer;

use ledger_archiver::{
    AppState, ArchiveConfig, DEFAULT_EXPORT_BATCH_SIZE, DEFAULT_RETENTION_MONTHS, Job, JobQueue,
    LogMailer, WorkSummary, Worker, build_router, graceful_shutdown, setup_logging,
};

/// The HTTP server for ledger_archiver, which also archives transactions in the background.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long, env = "LEDGER_DB_PATH")]
    db_path: String,

    /// The port to serve the API from.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Transactions older than this many months are archived.
    #[arg(long, env = "RETENTION_MONTHS", default_value_t = DEFAULT_RETENTION_MONTHS)]
    retention_months: u32,

    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    #[arg(long, env = "LOCAL_TIMEZONE", default_value = "Etc/UTC")]
    local_timezone: String,

    /// How many transactions to read at a time when writing report files.
    #[arg(long, default_value_t = DEFAULT_EXPORT_BATCH_SIZE)]
    export_batch_size: u32,

    /// How often, in seconds, to schedule the monthly reports.
    #[arg(long, default_value_t = 60 * 60)]
    schedule_interval: u64,

    /// How often, in seconds, to run queued jobs.
    #[arg(long, default_value_t = 5)]
    worker_interval: u64,
}

#[tokio::main]
async fn main() {
    if let Err(error) = setup_logging() {
        eprintln!("Could not set up logging: {error}");
        exit(1);
    }

    let args = Args::parse();

    let config = ArchiveConfig {
        retention_months: args.retention_months,
        local_timezone: args.local_timezone,
        export_batch_size: args.export_batch_size,
    };

    if let Err(error) = config.today() {
        tracing::error!("Invalid configuration: {error}");
        exit(1);
    }

    let connection = match Connection::open(&args.db_path) {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("Could not open database file {}: {error}", args.db_path);
            exit(1);
        }
    };

    let state = match AppState::new(connection, config.clone(), JobQueue::new()) {
        Ok(state) => state,
        Err(error) => {
            tracing::error!("Could not initialize the database: {error}");
            exit(1);
        }
    };

    let worker = Worker::new(
        state.job_queue.clone(),
        state.db_connection.clone(),
        Arc::new(LogMailer),
        config,
    );

    if let Err(error) = worker.resume_unfinished_reports() {
        tracing::error!("Could not resume unfinished reports: {error}");
        exit(1);
    }

    tokio::spawn(schedule_reports(
        state.job_queue.clone(),
        Duration::from_secs(args.schedule_interval),
    ));
    tokio::spawn(run_jobs(worker, Duration::from_secs(args.worker_interval)));

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = add_tracing_layer(build_router(state));

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    tracing::info!("HTTP server listening on {}", addr);

    if let Err(error) = axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
    {
        tracing::error!("Server stopped with an error: {error}");
        exit(1);
    }
}

/// Enqueue the monthly report schedule every `period`.
///
/// Scheduling more than once per month is harmless because existing reports are skipped.
async fn schedule_reports(queue: JobQueue, period: Duration) {
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;

        if let Err(error) = queue.enqueue(Job::ScheduleMonthlyReports) {
            tracing::error!("Could not schedule monthly reports: {error}");
        }
    }
}

/// Run queued jobs every `period` on a blocking thread.
async fn run_jobs(worker: Worker, period: Duration) {
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;

        let worker = worker.clone();
        match tokio::task::spawn_blocking(move || worker.run_until_idle()).await {
            Ok(Ok(summary)) if summary != WorkSummary::default() => {
                tracing::info!("Finished jobs: {summary:?}");
            }
            Ok(Ok(_)) => {}
            Ok(Err(error)) => tracing::error!("Could not run jobs: {error}"),
            Err(error) => tracing::error!("Job worker panicked: {error}"),
        }
    }
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // By default, `TraceLayer` will log 5xx responses but we're doing our specific
        // logging of errors so disable that
        .on_failure(());

    router.layer(tracing_layer)
}
