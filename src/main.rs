use std::error::Error;
use std::path::PathBuf;

use aisle_route::{generate_route, load_font, EngineConfig, RouteRequest};
use clap::Parser;
use common_types::RequiredList;
use log::{debug, info, warn};
use map_tools::{barrier_mask_image, parse_store_markup};
use simplelog::{Config, LevelFilter, SimpleLogger};

#[derive(Parser, Debug)]
#[command(name = "aisle_route", about = "Draw a shopping route on a store floor map")]
struct Cli {
    /// Base floor-map image (PNG or JPEG)
    #[arg(long)]
    base: PathBuf,

    /// Barrier image of the same map, open floor in the open-floor color
    #[arg(long)]
    barrier: PathBuf,

    /// Saved store page holding the inline SVG map
    #[arg(long)]
    markup: PathBuf,

    /// Classified shopping list: JSON object of region name -> item names
    #[arg(long)]
    required: PathBuf,

    /// Where to write the rendered route PNG
    #[arg(short, long, default_value = "route.png")]
    output: PathBuf,

    /// TOML file overriding the engine defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Font for label and item text instead of the bundled one
    #[arg(long)]
    font: Option<PathBuf>,

    /// Seed for region colors, for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// Also write the planned segments as JSON
    #[arg(long)]
    segments_output: Option<PathBuf>,

    /// Also write the segmentation canvas
    #[arg(long)]
    regions_output: Option<PathBuf>,

    /// Also write the barrier grid (free black, occupied white)
    #[arg(long)]
    mask_output: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    SimpleLogger::init(level, Config::default())?;

    //CONFIG ================================================
    let mut cfg = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if cli.seed.is_some() {
        cfg.segmentation.seed = cli.seed;
    }
    let font = cli.font.as_deref().map(load_font).transpose()?;

    //INPUTS ================================================
    info!("Reading markup from {}", cli.markup.display());
    let markup_text = std::fs::read_to_string(&cli.markup)?;
    let markup = parse_store_markup(&markup_text)?;
    debug!("Reference rectangle: {:?}", markup.reference);

    let required: RequiredList = serde_json::from_str(&std::fs::read_to_string(&cli.required)?)?;
    let base = std::fs::read(&cli.base)?;
    let barrier = std::fs::read(&cli.barrier)?;

    //ROUTE ================================================
    let req = RouteRequest::from_markup(&base, &barrier, &markup, &required);
    let outcome = generate_route(&req, &cfg, font.as_ref())?;

    for region in &outcome.skipped_regions {
        warn!("Skipped '{}': not on this map", region);
    }
    for d in &outcome.degradations {
        warn!("{}", d);
    }

    //OUTPUT ================================================
    std::fs::write(&cli.output, outcome.encode_png()?)?;
    info!("Route written to {}", cli.output.display());

    if let Some(path) = &cli.segments_output {
        std::fs::write(path, serde_json::to_string_pretty(&outcome.segments)?)?;
        info!("Segments written to {}", path.display());
    }
    if let Some(path) = &cli.regions_output {
        outcome.segmentation.canvas.save(path)?;
        info!("Regions written to {}", path.display());
    }

    if let Some(path) = &cli.mask_output {
        barrier_mask_image(&outcome.grid).save(path)?;
        info!("Barrier mask written to {}", path.display());
    }

    println!("{}", outcome.route.stops.join(" -> "));
    println!("walking distance: {:.0} px", outcome.walking_distance());
    if outcome.is_degraded() {
        println!("route is approximate: {} issue(s)", outcome.degradations.len());
    }
    Ok(())
}
