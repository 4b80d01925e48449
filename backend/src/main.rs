//! Partlens CLI - reshape product, reference and application tables
//!
//! # Main Commands
//!
//! ```bash
//! partlens serve                                   # Start HTTP server (port 3000)
//! partlens process --products p.csv \
//!     --references r.csv --applications a.xlsx -o out/
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! partlens parse input.csv         # Load one file and dump it as JSON
//! partlens pivot references.csv    # Print the pivoted reference table as CSV
//! ```

use clap::{Parser, Subcommand};
use partlens::{
    parse_file_auto, pivot_references, run_pipeline, InputFile, PipelineInputs, PipelineOptions,
    Snapshot, Table,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "partlens")]
#[command(about = "Reshape product, cross-reference and application tables", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Run the full pipeline on three files
    Process {
        /// Product table (CSV or workbook)
        #[arg(long)]
        products: PathBuf,

        /// Cross-reference table
        #[arg(long)]
        references: PathBuf,

        /// Application table
        #[arg(long)]
        applications: PathBuf,

        /// Directory for the output tables (summary only if omitted)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Load a file and output JSON records
    Parse {
        /// Input file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Pivot a reference file and print the wide table as CSV
    Pivot {
        /// Reference file
        input: PathBuf,

        /// Minimum number of brand/reference column pairs
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
        min_width: u64,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = if verbose {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };

    // A subscriber may already be installed by the embedding process
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Serve { port } => cmd_serve(port).await,

        Commands::Process {
            products,
            references,
            applications,
            output_dir,
        } => cmd_process(&products, &references, &applications, output_dir.as_deref()),

        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Pivot { input, min_width } => cmd_pivot(&input, min_width as usize),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    partlens::server::start_server(port, PipelineOptions::from_env()).await
}

fn cmd_process(
    products: &Path,
    references: &Path,
    applications: &Path,
    output_dir: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let inputs = PipelineInputs::new(
        read_input(products)?,
        read_input(references)?,
        read_input(applications)?,
    );
    let snapshot = run_pipeline(&inputs, &PipelineOptions::from_env())?;

    print_summary(&snapshot);

    if let Some(dir) = output_dir {
        fs::create_dir_all(dir)?;
        write_csv(&snapshot.merged, &dir.join("merged_products.csv"))?;
        write_csv(&snapshot.references, &dir.join("references.csv"))?;
        write_csv(&snapshot.applications, &dir.join("applications.csv"))?;

        let categories = serde_json::to_string_pretty(&snapshot.category_columns)?;
        fs::write(dir.join("category_columns.json"), categories)?;
        eprintln!("💾 Output written to: {}", dir.display());
    }

    Ok(())
}

fn read_input(path: &Path) -> Result<InputFile, Box<dyn std::error::Error>> {
    InputFile::read(path).map_err(|e| format!("{}: {}", path.display(), e).into())
}

fn print_summary(snapshot: &Snapshot) {
    let diag = &snapshot.diagnostics;
    eprintln!("\n📊 Summary");
    eprintln!("   Products:       {}", snapshot.merged.len());
    eprintln!("   Pivot width:    {}", snapshot.pivot_width);
    eprintln!("   Matched:        {}", snapshot.merged.len().saturating_sub(diag.unmatched_products));
    eprintln!("   Unmatched:      {}", diag.unmatched_products);
    eprintln!("   References:     {}", snapshot.references.len());
    eprintln!("   Applications:   {}", snapshot.applications.len());
    eprintln!("   Categories:     {}", snapshot.category_columns.len());

    if diag.dropped_references > 0 {
        eprintln!("   Dropped references (empty code): {}", diag.dropped_references);
    }
    if diag.key_collisions > 0 {
        eprintln!("   Key collisions: {}", diag.key_collisions);
    }
    for degradation in &diag.degradations {
        eprintln!("   ⚠️  {}", degradation);
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing: {}", input.display());

    let loaded = parse_file_auto(input)?;
    eprintln!("   Format: {}", loaded.format);
    eprintln!("   Columns: {}", loaded.table.headers.join(", "));
    eprintln!("✅ Parsed {} records", loaded.table.len());

    let records: Vec<_> = loaded.table.iter().map(|row| row.to_map()).collect();
    let json = serde_json::to_string_pretty(&records)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_pivot(input: &Path, min_width: usize) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = parse_file_auto(input)?;
    let pivot = pivot_references(&loaded.table, min_width);

    for degradation in &pivot.degradations {
        eprintln!("⚠️  {}", degradation);
    }
    eprintln!(
        "🔄 {} codes, width {} ({} rows dropped)",
        pivot.rows.len(),
        pivot.width,
        pivot.dropped
    );

    let mut writer = csv::Writer::from_writer(io::stdout().lock());
    write_table(&mut writer, &pivot.to_table())?;
    Ok(())
}

fn write_csv(table: &Table, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    write_table(&mut writer, table)
}

fn write_table<W: io::Write>(writer: &mut csv::Writer<W>, table: &Table) -> Result<(), Box<dyn std::error::Error>> {
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
