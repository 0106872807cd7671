use anyhow::Result;
use quartier::{Layer, VariableCatalog};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::InspectArgs) -> Result<()> {
    let mut layer = Layer::read_source(&args.source)?;
    if let Some(epsg) = args.epsg { layer = layer.with_epsg(epsg); }

    println!("{}: {} features, EPSG {}", args.source, layer.len(),
        layer.epsg().map_or("unknown".to_string(), |epsg| epsg.to_string()));

    match VariableCatalog::infer(layer.data()) {
        Ok(catalog) => {
            for variable in catalog.iter() {
                println!("  {:<24} {}", variable.name, variable.kind.to_str());
            }
        }
        Err(err) => {
            // Not usable as a grid as is; list raw columns instead.
            println!("  not a grid without declared variables: {err}");
            for column in layer.columns() {
                println!("  {column}");
            }
        }
    }

    Ok(())
}
