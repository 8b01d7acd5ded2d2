pub mod model;
pub mod output;
pub mod parameters;
pub mod simulation;

use anyhow::Context;
use mrp::Environment;
use parameters::Parameters;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    println!("{}", simulation::TITLE);

    // Overrides come from an optional JSON document on stdin
    let ctx = Environment::<Parameters>::load().context("failed to load run input")?;
    let parameters = ctx.input.as_ref().context("missing parameters")?;

    let output = simulation::simulate(parameters)?;

    for (filename, plot) in simulation::plots(&output, parameters.population) {
        let svg = plot
            .render_svg(&output.times)
            .with_context(|| format!("failed to render {filename}"))?;
        ctx.write(filename, svg.as_bytes())?;
    }
    Ok(())
}
