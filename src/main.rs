use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use fret_ratio_rs::fret_pipeline::{
    BatchProcessor, BatchState, CalibrationFactors, GaussianBlur, LsmReader, PipelineConfig,
    StandardTiffWriter,
};
use fret_ratio_rs::logger;

use tracing::{error, info};

const USAGE: &str = "usage: fret_ratio <dir> <S1> <S2> <S3> <S4> <alpha>";

struct Args {
    dir: PathBuf,
    factors: CalibrationFactors,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 6 {
        bail!("{}", USAGE);
    }

    let mut values = [0.0f64; 5];
    for (value, (name, raw)) in values
        .iter_mut()
        .zip(["S1", "S2", "S3", "S4", "alpha"].into_iter().zip(&args[1..]))
    {
        *value = raw
            .parse()
            .with_context(|| format!("{} must be a number, got '{}'", name, raw))?;
    }

    Ok(Args {
        dir: PathBuf::from(&args[0]),
        factors: CalibrationFactors::new(values[0], values[1], values[2], values[3], values[4]),
    })
}

/// `<stem>_fret.tif` next to the input file.
fn output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{}_fret.tif", stem))
}

fn process_current(batch: &mut BatchProcessor<LsmReader, GaussianBlur>, input: &Path) -> anyhow::Result<()> {
    let label = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    batch.session_mut().compose_fret(label)?;

    let output = output_path(input);
    let file = File::create(&output).with_context(|| format!("creating {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    batch
        .session()
        .export_fret(&StandardTiffWriter, &mut writer)
        .with_context(|| format!("writing {}", output.display()))?;
    info!("FRET image written to {}", output.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    logger::init();

    info!("Starting fret_ratio...");

    let args = parse_args()?;
    let config = PipelineConfig::default();
    info!("Background corner: 1/{} of each side", config.background_fraction);
    info!("Export compression: {:?}", config.export_compression);

    let mut batch = BatchProcessor::new(config);
    batch.session_mut().set_factors(args.factors);

    let mut state = batch.start(&args.dir)?;
    while let BatchState::ProcessingFile(_) = state {
        if let Some(input) = batch.current_file().map(Path::to_path_buf) {
            if let Err(e) = process_current(&mut batch, &input) {
                error!("{}: {:#}", input.display(), e);
            }
        }
        state = batch.next();
    }

    let skipped = batch.skipped().len();
    if skipped > 0 {
        info!("{} file(s) skipped", skipped);
    }

    print!("{}", batch.session().results().to_tsv());
    Ok(())
}
