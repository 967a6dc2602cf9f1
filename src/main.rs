use std::path::PathBuf;

use anyhow::{bail, Result};
use raman_glucose::config::PipelineConfig;
use raman_glucose::pipeline;

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (Some(path), None) = (args.next(), args.next()) else {
        bail!("usage: raman-glucose <config.json>");
    };

    let config = PipelineConfig::from_file(&PathBuf::from(path))?;
    let output = pipeline::run(&config)?;
    pipeline::write_outputs(&output, &config.output)?;

    println!(
        "{}: {} points, R² = {:.4} -> {}",
        output.report.name,
        output.report.points,
        output.report.score,
        config.output.display()
    );
    Ok(())
}
