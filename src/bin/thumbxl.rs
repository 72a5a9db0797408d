use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use thumbxl::{
    export_sheet, resolve_sources, Dataset, ExportFormat, ExportOptions, Exporter, ImagePlacement,
    HeaderLabels, LayoutConfig, Product, SheetData, SourceFetcher,
};

/// Export a grid or a product listing to XLSX with embedded thumbnails.
#[derive(Parser, Debug)]
#[command(name = "thumbxl", version)]
#[command(about = "Write spreadsheets with cell-anchored thumbnails", long_about = None)]
struct Args {
    /// JSON job file: either {"rows", "images"} or {"keyword", "products", "with_details"}
    job: PathBuf,

    /// Output file for grid jobs, output directory for product jobs
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = ExportFormat::Xlsx)]
    format: ExportFormat,

    /// Worksheet name
    #[arg(long)]
    sheet_name: Option<String>,

    /// Fail on the first image that cannot be decoded instead of skipping it
    #[arg(long)]
    strict_images: bool,

    /// Header row language for product jobs; overrides the job file
    #[arg(long, value_enum)]
    labels: Option<HeaderLabels>,

    /// Thumbnail edge in pixels; row heights and the image column follow it
    #[arg(long)]
    thumbnail_px: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Deserialize)]
struct GridJob {
    rows: Vec<Vec<Option<String>>>,
    #[serde(default)]
    images: Vec<ImagePlacement>,
}

#[derive(Deserialize)]
struct DatasetJob {
    keyword: String,
    products: Vec<Product>,
    #[serde(default)]
    with_details: bool,
    #[serde(default)]
    labels: HeaderLabels,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Job {
    Grid(GridJob),
    Dataset(DatasetJob),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = if args.verbose {
        "debug"
    } else if args.quiet {
        "error"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let layout = match args.thumbnail_px {
        Some(px) => LayoutConfig::for_thumbnail(px),
        None => LayoutConfig::default(),
    };
    let options = ExportOptions {
        sheet_name: args.sheet_name.clone(),
        layout,
        strict_images: args.strict_images,
        created: None,
    };

    let text = fs::read_to_string(&args.job)?;
    let job: Job = serde_json::from_str(&text).map_err(thumbxl::ExportError::from)?;

    let outcome = match job {
        Job::Grid(grid) => {
            let sheet = SheetData {
                name: args.sheet_name.clone().unwrap_or_else(|| "Sheet1".to_string()),
                rows: grid.rows,
            };
            let images = resolve_sources(&grid.images, &SourceFetcher::new());
            let path = args
                .output
                .clone()
                .unwrap_or_else(|| args.job.with_extension(args.format.extension()));
            log::info!("exporting {} rows, {} images", sheet.num_rows(), images.len());
            export_sheet(&sheet, &images, args.format, &path, &options)?
        }
        Job::Dataset(job) => {
            let dataset = Dataset::new(job.keyword, job.products, job.with_details)
                .with_labels(args.labels.unwrap_or(job.labels));
            let out_dir = args.output.clone().unwrap_or_else(|| PathBuf::from("."));
            Exporter::new(options).export(&dataset, args.format, &out_dir)?
        }
    };

    if outcome.fell_back {
        log::warn!(
            "wrote fallback table instead of a workbook: {}",
            outcome.fallback_reason.as_deref().unwrap_or("unknown reason")
        );
    }
    if let Some(report) = &outcome.report {
        for skipped in &report.skipped_images {
            log::warn!("image #{} skipped: {}", skipped.index, skipped.reason);
        }
    }
    println!("{} ({})", outcome.path.display(), outcome.media_type());
    Ok(())
}
