use std::path::PathBuf;
use std::process;

use eframe::{NativeOptions, egui};
use env_logger::Env;
use hub_search::{app, feed};
use pico_args::Arguments;
use shellexpand::full;

fn main() -> eframe::Result<()> {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(""))
        .format_timestamp_secs()
        .try_init();

    let mut args = Arguments::from_env();

    let feed_arg = match args.opt_value_from_str::<_, String>("--feed") {
        Ok(value) => value,
        Err(err) => {
            eprintln!("hubsearch: {err}");
            process::exit(1);
        }
    };

    let download_arg = match args.opt_value_from_str::<_, String>("--download-dir") {
        Ok(value) => value,
        Err(err) => {
            eprintln!("hubsearch: {err}");
            process::exit(1);
        }
    };

    let sort_workers = match args.opt_value_from_str::<_, usize>("--sort-workers") {
        Ok(value) => value,
        Err(err) => {
            eprintln!("hubsearch: {err}");
            process::exit(1);
        }
    };

    let strict_dedup = args.contains("--strict-dedup");

    let initial_search: Option<String> = match args.opt_free_from_str() {
        Ok(value) => value,
        Err(err) => {
            eprintln!("hubsearch: {err}");
            process::exit(1);
        }
    };

    let leftover = args.finish();
    if !leftover.is_empty() {
        let extras: Vec<String> = leftover
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        eprintln!("hubsearch: unexpected arguments: {}", extras.join(" "));
        process::exit(1);
    }

    let mut app_config = app::AppConfig {
        strict_dedup,
        sort_workers,
        initial_search,
        ..Default::default()
    };

    if let Some(raw) = feed_arg {
        app_config.feed = Some(if raw == "-" {
            feed::FeedSource::Stdin
        } else {
            match expand_path(&raw) {
                Ok(path) => feed::FeedSource::File(path),
                Err(err) => {
                    eprintln!("hubsearch: {err}");
                    process::exit(1);
                }
            }
        });
    }

    if let Some(raw) = download_arg {
        match expand_path(&raw) {
            Ok(path) => app_config.download_dir = path,
            Err(err) => {
                eprintln!("hubsearch: {err}");
                process::exit(1);
            }
        }
    }

    let native_options = NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1280.0, 800.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Hub Search",
        native_options,
        Box::new(move |cc| Box::new(app::SearchPanel::new(cc, app_config.clone()))),
    )
}

fn expand_path(raw: &str) -> Result<PathBuf, String> {
    let expanded = full(raw).map_err(|err| err.to_string())?;
    Ok(PathBuf::from(expanded.as_ref()))
}
