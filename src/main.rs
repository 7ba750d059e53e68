use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use ebsd_volume::{
    Attribute, FileList, ImportConfig, Orientation, StackingOrder, VolumeLoader,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "ebsd-volume", version, about = "Assemble stacks of EBSD scans into volumes")]
struct Cli {
    /// TOML import description
    #[arg(long, global = true, env = "EBSD_VOLUME_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Infer the file template and slice range of a directory
    Scan(StackArgs),
    /// List the expected slice files and whether they exist
    List(StackArgs),
    /// Assemble the stack into a volume
    Build {
        #[command(flatten)]
        stack: StackArgs,

        /// Render this axial slice of the volume to a PNG
        #[arg(long)]
        render_slice: Option<usize>,

        /// Attribute to render (euler1, euler2, euler3, x, y, iq, ci, phase, sem, fit)
        #[arg(long, default_value = "iq")]
        attribute: String,

        #[arg(long, default_value = "slice.png")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct StackArgs {
    /// Directory holding the scans, overrides `input_dir` of the config
    directory: Option<PathBuf>,

    /// Scan file extension without the dot
    #[arg(long)]
    extension: Option<String>,

    /// Stack the highest slice index at z = 0
    #[arg(long)]
    high_to_low: bool,
}

impl StackArgs {
    fn apply(&self, mut config: ImportConfig) -> Result<(PathBuf, ImportConfig)> {
        if let Some(ext) = &self.extension {
            config.extension = Some(ext.clone());
        }
        if self.high_to_low {
            config.stacking_order = StackingOrder::HighToLow;
        }
        let directory = self
            .directory
            .clone()
            .or_else(|| config.input_dir.clone())
            .context("no input directory given on the command line or in the config")?;
        Ok((directory, config))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ImportConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ImportConfig::default(),
    };

    match cli.command {
        Command::Scan(stack) => {
            let (directory, config) = stack.apply(config)?;
            scan(&directory, &config)
        }
        Command::List(stack) => {
            let (directory, config) = stack.apply(config)?;
            list(&directory, &config)
        }
        Command::Build {
            stack,
            render_slice,
            attribute,
            output,
        } => {
            let (directory, config) = stack.apply(config)?;
            build(&directory, &config, render_slice, &attribute, &output)
        }
    }
}

fn scan(directory: &Path, config: &ImportConfig) -> Result<()> {
    let range = config.resolve_range(directory);
    if range.is_empty() {
        println!("No scan files found in {}", directory.display());
        return Ok(());
    }
    let example = FileList::new(directory, range.clone(), config.stacking_order)
        .file_name(range.start_index);

    println!("Directory:    {}", directory.display());
    println!("Files found:  {}", range.total_files);
    println!("Extension:    {}", range.extension);
    println!("Prefix:       {:?}", range.prefix);
    println!("Suffix:       {:?}", range.suffix);
    println!("Digits:       {}", range.digit_width);
    println!("Slices:       {}..={}", range.start_index, range.end_index);
    println!("Example name: {example}");
    Ok(())
}

fn list(directory: &Path, config: &ImportConfig) -> Result<()> {
    let range = config.resolve_range(directory);
    let list = FileList::new(directory, range, config.stacking_order);
    let mut missing = 0;
    for file in &list {
        let marker = if file.exists { "ok" } else { "MISSING" };
        if !file.exists {
            missing += 1;
        }
        println!("{:>5}  {:<7}  {}", file.index, marker, file.path.display());
    }

    if list.is_empty() {
        println!("No slice files to list");
    } else if missing > 0 {
        println!("{missing} of {} file(s) do not exist", list.len());
    } else {
        println!("All {} files exist", list.len());
    }
    Ok(())
}

fn build(
    directory: &Path,
    config: &ImportConfig,
    render_slice: Option<usize>,
    attribute: &str,
    output: &Path,
) -> Result<()> {
    let attribute = match Attribute::from_name(attribute) {
        Some(attribute) => attribute,
        None => bail!("unknown attribute '{attribute}'"),
    };
    let range = config.resolve_range(directory);
    if range.is_empty() {
        bail!("no scan files found in {}", directory.display());
    }

    let volume = VolumeLoader::load_from_range(directory, &range, &config.assembly_options())
        .with_context(|| format!("assembling {}", directory.display()))?;
    let (zpoints, ypoints, xpoints) = volume.dim();
    info!(xpoints, ypoints, zpoints, "volume ready");

    println!("Volume:      {xpoints} x {ypoints} x {zpoints}");
    println!(
        "Resolution:  {} x {} x {}",
        volume.resolution.0, volume.resolution.1, volume.resolution.2
    );
    for phase in &volume.phases {
        println!(
            "Phase {}:     {} (symmetry {})",
            phase.index, phase.material_name, phase.symmetry
        );
    }

    if let Some(index) = render_slice {
        let image = volume
            .get_image_from_axis(index, Orientation::Axial, attribute)
            .with_context(|| format!("slice {index} is outside the volume (0..{zpoints})"))?;
        image
            .save(output)
            .with_context(|| format!("writing {}", output.display()))?;
        println!("Wrote {} slice {index} to {}", attribute.name(), output.display());
    }
    Ok(())
}
