use std::io;

use anyhow::{anyhow, bail, Context, Result};
use quartier::{Drawing, OverrideSpec, RunConfig, RunOutcome};
use tracing::{info, warn};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::AggregateArgs) -> Result<()> {
    let mut config = match (&args.config, &args.grid) {
        (Some(path), grid) => {
            let mut config = RunConfig::read(path)?;
            if let Some(grid) = grid { config.grid = grid.clone(); }
            config
        }
        (None, Some(grid)) => RunConfig::new(grid.as_str()),
        (None, None) => bail!("either --config or --grid is required"),
    };
    if args.epsg.is_some() { config.epsg = args.epsg; }
    for arg in &args.overrides {
        config.overrides.push(parse_override(arg)?);
    }

    let mut session = config.session()?;
    let drawing = Drawing::read(&args.drawing)?;

    let outcome = session.set_drawing(drawing, &mut |percent: u8, status: &str| info!(percent, "{status}"))?;
    if outcome == RunOutcome::OutOfBoundary {
        warn!("drawing lies outside the grid; no indicators computed");
    }

    let grid = session.grid()?;
    let catalog = args.labels.then(|| grid.catalog());
    match &args.output {
        Some(path) => {
            session.result().write_csv_file(path, catalog)?;
            info!(path = %path.display(), variables = session.result().len(), "wrote result table");
        }
        None => session.result().write_csv(io::stdout().lock(), catalog)?,
    }

    Ok(())
}

/// Parse `VARIABLE=PATH:COLUMN`. The column follows the last colon so URLs may be used as paths.
fn parse_override(arg: &str) -> Result<OverrideSpec> {
    let (variable, rest) = arg.split_once('=')
        .ok_or_else(|| anyhow!("override must look like VARIABLE=PATH:COLUMN, got {arg}"))?;
    let (source, column) = rest.rsplit_once(':')
        .with_context(|| format!("override for {variable} names no column: {arg}"))?;
    if variable.is_empty() || source.is_empty() || column.is_empty() {
        bail!("override must look like VARIABLE=PATH:COLUMN, got {arg}");
    }
    Ok(OverrideSpec { variable: variable.into(), source: source.into(), column: column.into() })
}
