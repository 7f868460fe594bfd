use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser};
use tracing_subscriber::EnvFilter;
use xc_lib::{api, HttpTransport, QueryResult, SearchCriteria, SearchField, XenoCanto};

#[derive(Parser, Debug)]
#[command(
    name = "xc-fetch",
    about = "Search xeno-canto and download the matching recordings"
)]
struct Cli {
    /// Basic search terms
    #[arg(short, long)]
    query: String,

    /// Page number of the results to fetch
    #[arg(short, long)]
    page: Option<u32>,

    /// Directory to download to
    #[arg(short, long, default_value = "sounds")]
    dir: PathBuf,

    #[command(flatten)]
    filters: Filters,

    /// Search endpoint
    #[arg(long, env = "XC_API_URL", default_value = api::API_BASE)]
    endpoint: String,

    /// Request timeout in seconds (default: no timeout)
    #[arg(long, env = "XC_TIMEOUT")]
    timeout: Option<u64>,

    /// Only run the search and list the results
    #[arg(long)]
    dry_run: bool,

    /// With --dry-run, print the raw result as JSON
    #[arg(long, requires = "dry_run")]
    json: bool,

    /// More log output (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Advanced search filters, sent only when given.
#[derive(Args, Debug, Default)]
struct Filters {
    /// Genus
    #[arg(long)]
    gen: Option<String>,
    /// Recordist
    #[arg(long)]
    rec: Option<String>,
    /// Country
    #[arg(long)]
    cnt: Option<String>,
    /// Location
    #[arg(long)]
    loc: Option<String>,
    /// Remarks
    #[arg(long)]
    rmk: Option<String>,
    /// Latitude
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<String>,
    /// Longitude
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<String>,
    /// Bounding box: LAT_MIN,LON_MIN,LAT_MAX,LON_MAX
    #[arg(long = "box", allow_hyphen_values = true)]
    bbox: Option<String>,
    /// Background species
    #[arg(long)]
    also: Option<String>,
    /// Sound type (song, call, ...)
    #[arg(long = "type")]
    sound_type: Option<String>,
    /// Catalogue number (928094, XC928094 or a recording URL)
    #[arg(long)]
    nr: Option<String>,
    /// License
    #[arg(long)]
    lic: Option<String>,
    /// Quality rating (A-E)
    #[arg(long)]
    q: Option<String>,
    /// Area (africa, america, asia, australia, europe)
    #[arg(long)]
    area: Option<String>,
    /// Uploaded since (days, or YYYY-MM-DD)
    #[arg(long)]
    since: Option<String>,
    /// Recording year
    #[arg(long)]
    year: Option<String>,
    /// Recording month
    #[arg(long)]
    month: Option<String>,
}

impl Cli {
    fn criteria(&self) -> anyhow::Result<SearchCriteria> {
        let f = &self.filters;
        let nr = f
            .nr
            .as_deref()
            .map(api::parse_xc_number)
            .transpose()?
            .map(|n| n.to_string());

        let mut criteria = SearchCriteria::query(&self.query);
        for (field, value) in [
            (SearchField::Genus, &f.gen),
            (SearchField::Recordist, &f.rec),
            (SearchField::Country, &f.cnt),
            (SearchField::Location, &f.loc),
            (SearchField::Remarks, &f.rmk),
            (SearchField::Latitude, &f.lat),
            (SearchField::Longitude, &f.lon),
            (SearchField::BoundingBox, &f.bbox),
            (SearchField::Also, &f.also),
            (SearchField::SoundType, &f.sound_type),
            (SearchField::Number, &nr),
            (SearchField::License, &f.lic),
            (SearchField::Quality, &f.q),
            (SearchField::Area, &f.area),
            (SearchField::Since, &f.since),
            (SearchField::Year, &f.year),
            (SearchField::Month, &f.month),
        ] {
            criteria.set(field, value.clone());
        }
        criteria.set_page(self.page);
        Ok(criteria)
    }

    fn client(&self) -> anyhow::Result<XenoCanto> {
        let transport = match self.timeout {
            Some(secs) => HttpTransport::with_timeout(Duration::from_secs(secs))
                .context("failed to build HTTP client")?,
            None => HttpTransport::new(),
        };
        Ok(XenoCanto::with_transport(transport).with_endpoint(&self.endpoint))
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_results(result: &QueryResult) {
    println!(
        "{} recordings, {} species (page {}/{})",
        result.num_recordings, result.num_species, result.page, result.num_pages
    );
    println!();
    for rec in &result.recordings {
        let field = |key: &str| {
            rec.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };
        println!(
            "  XC{:<10} {:30} {:30} {}",
            rec.id().unwrap_or_default(),
            field("en"),
            format!("{} {}", field("gen"), field("sp")),
            field("cnt"),
        );
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let criteria = cli.criteria()?;
    let xc = cli.client()?;

    if cli.dry_run {
        let result = xc.query(&criteria).await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print_results(&result);
        }
        return Ok(());
    }

    let summary = xc.download_files(&criteria, &cli.dir).await?;
    println!(
        "Downloaded {} recordings to {}",
        summary.audio_files.len(),
        cli.dir.display()
    );
    println!("Metadata: {}", summary.metadata_file.display());
    Ok(())
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
