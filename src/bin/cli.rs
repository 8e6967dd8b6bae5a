//! Kivio command-line client.
//!
//! Point operations, bulk population and a latency benchmark against a
//! running server.

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use rand::Rng;

use kivio::{ClientError, RemoteStoreClient};

const OP_TIMEOUT: Duration = Duration::from_secs(20);
const POPULATE_WORKERS: usize = 16;

#[derive(Parser)]
#[command(name = "kivio")]
#[command(about = "Client for the kivio key-value server")]
#[command(version)]
struct Cli {
    /// Server address (host:port)
    #[arg(long, global = true, default_value = "localhost:50051")]
    addr: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a value under a key
    Set { key: String, value: String },
    /// Fetch the value stored under a key
    Get { key: String },
    /// List every pair whose key starts with a prefix
    Getprefix { prefix: String },
    /// Print server statistics
    Stats,
    /// Bulk-load generated keys through concurrent workers
    Populate {
        /// Number of keys to insert
        #[arg(short = 'n', long = "n", default_value_t = 100_000)]
        count: usize,
        /// Size of each generated value in bytes
        #[arg(long, default_value_t = 4096)]
        value_size: usize,
    },
    /// Measure per-operation latency and overall throughput
    Benchmark {
        #[arg(long, value_enum, default_value = "50-50")]
        workload: Workload,
        /// Size of each generated value in bytes
        #[arg(long, default_value_t = 4096)]
        value_size: usize,
        /// Number of concurrent clients
        #[arg(long, default_value_t = 1)]
        clients: usize,
        /// Operations per client
        #[arg(long, default_value_t = 1000)]
        ops: usize,
        /// CSV file for per-operation results
        #[arg(long, default_value = "benchmark_results.csv")]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Workload {
    ReadOnly,
    WriteOnly,
    #[value(name = "50-50")]
    Mixed,
}

impl Workload {
    fn as_str(self) -> &'static str {
        match self {
            Workload::ReadOnly => "read-only",
            Workload::WriteOnly => "write-only",
            Workload::Mixed => "50-50",
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Set { key, value } => {
            let mut client = connect(&cli.addr)?;
            client.set(&key, value.as_bytes())?;
            println!("OK: key '{key}' set.");
        }
        Command::Get { key } => {
            let mut client = connect(&cli.addr)?;
            match client.get(&key)? {
                Some(value) => {
                    println!("{key}: {}", String::from_utf8_lossy(value.as_slice()))
                }
                None => println!("Key '{key}' not found."),
            }
        }
        Command::Getprefix { prefix } => {
            let mut client = connect(&cli.addr)?;
            println!("Keys with prefix '{prefix}':");
            let count = client.get_prefix(&prefix, |key, value| {
                println!(" - {key}: {}", String::from_utf8_lossy(value.as_slice()));
            })?;
            if count == 0 {
                println!(" (no matches found)");
            }
        }
        Command::Stats => {
            let mut client = connect(&cli.addr)?;
            let stats = client.stat()?;
            println!("--- Server Statistics ---");
            println!("Total keys:          {}", stats.total_keys);
            println!("Total size (bytes):  {}", stats.total_size_bytes);
            println!("Set operations:      {}", stats.set_ops);
            println!("Get operations:      {}", stats.get_ops);
            println!("GetPrefix operations: {}", stats.prefix_ops);
            println!("-------------------------");
        }
        Command::Populate { count, value_size } => populate(&cli.addr, count, value_size)?,
        Command::Benchmark {
            workload,
            value_size,
            clients,
            ops,
            out,
        } => benchmark(&cli.addr, workload, value_size, clients, ops, &out)?,
    }
    Ok(())
}

fn connect(addr: &str) -> Result<RemoteStoreClient, ClientError> {
    RemoteStoreClient::connect_with_timeout(addr, OP_TIMEOUT)
}

fn random_value(size: usize) -> Vec<u8> {
    let mut value = vec![0u8; size];
    rand::thread_rng().fill(&mut value[..]);
    value
}

fn populate(addr: &str, count: usize, value_size: usize) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Populating {count} keys ({value_size} B values) with {POPULATE_WORKERS} workers...");

    let value = random_value(value_size);
    let started = Instant::now();

    std::thread::scope(|scope| {
        for worker in 0..POPULATE_WORKERS {
            let value = &value;
            scope.spawn(move || {
                let mut client = match connect(addr) {
                    Ok(client) => client,
                    Err(err) => {
                        eprintln!("worker {worker}: connect failed: {err}");
                        return;
                    }
                };
                let mut index = worker;
                while index < count {
                    let key = format!("key-{index}");
                    if let Err(err) = client.set(&key, value) {
                        eprintln!("worker {worker}: set {key} failed: {err}");
                    }
                    index += POPULATE_WORKERS;
                }
            });
        }
    });

    eprintln!("Population finished in {:.2?}.", started.elapsed());
    Ok(())
}

fn benchmark(
    addr: &str,
    workload: Workload,
    value_size: usize,
    clients: usize,
    ops: usize,
    out: &PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut csv_writer = csv::Writer::from_path(out)?;
    csv_writer.write_record([
        "workload",
        "value_size_bytes",
        "client_id",
        "op_id",
        "op_type",
        "latency_ms",
    ])?;

    // Reads need keys to hit, so every benchmark key is written up front.
    println!("Pre-populating benchmark keys...");
    let prepopulate_value = random_value(value_size);
    let mut setup = connect(addr)?;
    for client_id in 0..clients {
        for op_id in 0..ops {
            setup.set(
                &format!("bench-w{client_id}-op{op_id}"),
                &prepopulate_value,
            )?;
        }
    }

    println!(
        "Starting benchmark: [workload: {}] [value size: {value_size} B] [clients: {clients}] [ops/client: {ops}]",
        workload.as_str()
    );

    let (results_tx, results_rx) = mpsc::channel::<[String; 6]>();

    // Rows stream to disk on a dedicated thread so workers never wait on
    // file IO.
    let writer_handle = std::thread::spawn(move || -> Result<(), csv::Error> {
        let mut csv_writer = csv_writer;
        for row in results_rx {
            csv_writer.write_record(&row)?;
        }
        csv_writer.flush()?;
        Ok(())
    });

    let started = Instant::now();
    std::thread::scope(|scope| {
        for client_id in 0..clients {
            let results_tx = results_tx.clone();
            scope.spawn(move || {
                let mut client = match connect(addr) {
                    Ok(client) => client,
                    Err(err) => {
                        eprintln!("client {client_id}: connect failed: {err}");
                        return;
                    }
                };
                let value = random_value(value_size);
                let mut rng = rand::thread_rng();

                for op_id in 0..ops {
                    let key = format!("bench-w{client_id}-op{op_id}");
                    let is_get = match workload {
                        Workload::ReadOnly => true,
                        Workload::WriteOnly => false,
                        Workload::Mixed => rng.gen_bool(0.5),
                    };

                    let op_started = Instant::now();
                    let result = if is_get {
                        client.get(&key).map(|_| ())
                    } else {
                        client.set(&key, &value)
                    };
                    let latency = op_started.elapsed();

                    if let Err(err) = result {
                        eprintln!("client {client_id}: op {op_id} failed: {err}");
                        continue;
                    }

                    let row = [
                        workload.as_str().to_owned(),
                        value_size.to_string(),
                        client_id.to_string(),
                        op_id.to_string(),
                        if is_get { "GET" } else { "SET" }.to_owned(),
                        format!("{:.6}", latency.as_secs_f64() * 1000.0),
                    ];
                    if results_tx.send(row).is_err() {
                        return;
                    }
                }
            });
        }
    });
    drop(results_tx);
    writer_handle
        .join()
        .expect("csv writer thread panicked")?;

    let total_duration = started.elapsed();
    let total_ops = clients * ops;
    let throughput = total_ops as f64 / total_duration.as_secs_f64();

    println!();
    println!("--- Benchmark Results ---");
    println!("Total time:          {total_duration:.2?}");
    println!("Total operations:    {total_ops}");
    println!("Throughput (ops/s):  {throughput:.2}");
    println!("Results written to:  {}", out.display());
    println!("-------------------------");
    Ok(())
}
