use anyhow::{Context, Result};
use biofilm_common::{CellFields, CellState, Coord, EngineConfig, Snapshot};
use clap::{Parser, ValueEnum};
use env_logger::Builder;
use image::{ImageBuffer, Rgba, RgbaImage};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use log::{info, warn, LevelFilter};
use palette::{FromColor, Hsv, Srgb};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

/// Which per-cell field to render
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Total,
    State,
    Age,
}

/// Command-line arguments for the visualizer
#[derive(Parser, Debug)]
#[command(author, version, about = "Renders z slices of recorded biofilm snapshots to PNG", long_about = None)]
struct Args {
    /// Input snapshot file path (.bin, written with format = "bincode")
    #[arg(short, long)]
    input: PathBuf,

    /// Directory for the PNG frames
    #[arg(short, long, default_value = "frames")]
    output_dir: PathBuf,

    /// Field to render
    #[arg(long, value_enum, default_value_t = Field::Total)]
    field: Field,

    /// z index of the slice (middle of the grid if omitted)
    #[arg(long)]
    z: Option<usize>,

    /// Pixels per grid cell
    #[arg(long, default_value_t = 8)]
    scale: u32,

    /// Optional path to the config.toml file to normalise totals by bmax
    #[arg(long)]
    config: Option<PathBuf>,

    /// Background color for solid and wall cells (black, white, gray)
    #[arg(long, default_value = "gray")]
    bg_color: String,
}

// Color definitions for named colors (RGBA format)
const COLOR_MAP: &[(&str, [u8; 4])] = &[
    ("black", [0, 0, 0, 255]),
    ("white", [255, 255, 255, 255]),
    ("gray", [96, 96, 96, 255]),
];

/// Parse a color name to RGBA values
fn parse_color(color_name: &str) -> [u8; 4] {
    for &(name, color) in COLOR_MAP {
        if name.eq_ignore_ascii_case(color_name) {
            return color;
        }
    }
    warn!("Color '{}' not recognized, using black.", color_name);
    [0, 0, 0, 255]
}

/// Maps `t` in [0, 1] from blue (low) to red (high).
fn heat_color(t: f64) -> [u8; 4] {
    let t = t.clamp(0.0, 1.0) as f32;
    let hsv = Hsv::new(240.0 * (1.0 - t), 0.85, 0.95);
    let rgb = Srgb::from_color(hsv);
    [(rgb.red * 255.0) as u8, (rgb.green * 255.0) as u8, (rgb.blue * 255.0) as u8, 255]
}

/// Stable color per biofilm type id.
fn type_color(type_id: u16) -> [u8; 4] {
    let hue = (type_id as f32 * 137.5) % 360.0;
    let rgb = Srgb::from_color(Hsv::new(hue, 0.7, 0.8));
    [(rgb.red * 255.0) as u8, (rgb.green * 255.0) as u8, (rgb.blue * 255.0) as u8, 255]
}

struct RenderSettings {
    field: Field,
    z: usize,
    scale: u32,
    /// Value mapped to the top of the color scale
    full_scale: f64,
    excluded_color: [u8; 4],
}

fn cell_color(fields: &CellFields, idx: usize, settings: &RenderSettings) -> [u8; 4] {
    let state = fields.state[idx];
    if state.is_excluded() {
        return if state == CellState::Wall { [0, 0, 0, 255] } else { settings.excluded_color };
    }
    match settings.field {
        Field::Total => heat_color(fields.total[idx] / settings.full_scale),
        Field::Age => heat_color(fields.age[idx] as f64 / settings.full_scale),
        Field::State => match state {
            CellState::Pore(_) => [240, 248, 255, 255],
            CellState::Biofilm(t) => type_color(t),
            CellState::Solid | CellState::Wall => settings.excluded_color,
        },
    }
}

/// Draws one z slice of a snapshot, y pointing up.
fn draw_slice(snapshot: &Snapshot, fields: &CellFields, settings: &RenderSettings) -> RgbaImage {
    let e = snapshot.extents;
    let (w, h) = (e.nx as u32 * settings.scale, e.ny as u32 * settings.scale);
    let mut image = ImageBuffer::from_pixel(w, h, Rgba(settings.excluded_color));
    for y in 0..e.ny {
        for x in 0..e.nx {
            let idx = e.index(Coord::new(x, y, settings.z));
            let color = Rgba(cell_color(fields, idx, settings));
            let px0 = x as u32 * settings.scale;
            let py0 = (e.ny - 1 - y) as u32 * settings.scale;
            for dy in 0..settings.scale {
                for dx in 0..settings.scale {
                    image.put_pixel(px0 + dx, py0 + dy, color);
                }
            }
        }
    }
    image
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    Builder::from_default_env()
        .filter(None, LevelFilter::Info)
        .init();

    info!("Starting Biofilm Visualizer...");
    info!("Input file: {}", args.input.display());

    // --- Open and Parse Snapshot File ---
    let input_file = File::open(&args.input)
        .with_context(|| format!("Failed to open input file: {}", args.input.display()))?;
    let snapshots: Vec<Snapshot> = bincode::deserialize_from(BufReader::new(input_file))
        .context("Failed to decode snapshots (expected bincode output)")?;
    info!("Found {} snapshots in the file", snapshots.len());

    let with_fields: Vec<(&Snapshot, &CellFields)> =
        snapshots.iter().filter_map(|s| s.fields.as_ref().map(|f| (s, f))).collect();
    if with_fields.is_empty() {
        warn!("No snapshot carries cell fields; rerun with output.save_fields_in_snapshot = true.");
        return Ok(());
    }

    let extents = with_fields[0].0.extents;
    let z = args.z.unwrap_or(extents.nz / 2);
    if z >= extents.nz {
        anyhow::bail!("slice z = {} is outside the grid (nz = {})", z, extents.nz);
    }

    // --- Color scale ---
    let full_scale = match args.field {
        Field::Total => match &args.config {
            Some(path) => EngineConfig::load(path)?.biomass.bmax,
            None => with_fields.iter().map(|(s, _)| s.max_total).fold(0.0, f64::max),
        },
        Field::Age => with_fields.iter().map(|(s, _)| s.max_age as f64).fold(0.0, f64::max),
        Field::State => 1.0,
    }
    .max(f64::MIN_POSITIVE);
    info!("Rendering {:?} at z = {} (full scale {:.4})", args.field, z, full_scale);

    let settings = RenderSettings {
        field: args.field,
        z,
        scale: args.scale.max(1),
        full_scale,
        excluded_color: parse_color(&args.bg_color),
    };

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create output directory: {}", args.output_dir.display()))?;

    // Set up progress bar
    let progress_bar = ProgressBar::new(with_fields.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) [{eta}]")?
            .progress_chars("#>-"),
    );

    let start_time = Instant::now();
    let field_name = format!("{:?}", args.field).to_lowercase();
    with_fields
        .par_iter()
        .progress_with(progress_bar.clone())
        .try_for_each(|(snapshot, fields)| -> Result<()> {
            let image = draw_slice(snapshot, fields, &settings);
            let path = args.output_dir.join(format!("{}_step{:06}.png", field_name, snapshot.step));
            image
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(())
        })?;
    progress_bar.finish();

    info!(
        "Wrote {} frames to {} in {:.2} s",
        with_fields.len(),
        args.output_dir.display(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}
