use anyhow::anyhow;
use clap::Parser;
use indicatif::ProgressBar;
use proximity_rust::{
    analysis::search::SearchMode,
    config::Config,
    geofile::output::{output_prefix, write_layer_result, write_search_area},
};
use std::{fs, path::Path};

/// Rank, group and summarize the features around an incident or inside a map extent.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input config file.
    #[arg(short, long)]
    config_filepath: String,
}

fn try_main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }

    let args = Args::try_parse()?;
    let config_filepath = Path::new(&args.config_filepath);
    let config = Config::from_file(config_filepath)?;
    let base_dir = config_filepath.parent().unwrap_or(Path::new("."));
    let sources = config.feature_sources(base_dir)?;

    let mut session = config.session();
    let show_all = session.settings().mode() == SearchMode::ShowAll;
    if !show_all && session.area().is_none() {
        return Err(anyhow!("Config sets neither an incident nor a map extent"));
    }
    log::info!(
        "Searching {} layers from {} data sources",
        config.analysis_layers.len(),
        sources.len()
    );
    session.run(&sources)?;

    let data_dir = base_dir.join(&config.data_dir);
    fs::create_dir_all(&data_dir)?;
    let area = session.area().filter(|_| !show_all);
    let prefix = output_prefix(area)?;
    if let Some(area) = area {
        if let Some(filepath) = write_search_area(area, &prefix, &data_dir)? {
            log::info!("Wrote search area to {:?}", filepath);
        }
    }

    let results = session.results();
    let bar = ProgressBar::new(results.len() as u64);
    for result in results {
        let filepath = write_layer_result(result, &prefix, &data_dir)?;
        log::info!(
            "{}: {} records written to {:?}",
            result.layer.label,
            result.records().len(),
            filepath
        );
        bar.inc(1);
    }
    bar.finish();
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(e) = try_main() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1)
    }
}
