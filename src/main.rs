mod candidate_search;
mod config;
mod error;
mod filter_engine;
mod filter_manager;
mod match_selector;
mod metadata_parser;
mod model;
mod providers;
mod request_pacer;
mod resolution_cache;
mod title_normalizer;

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};

use config::{default_config_path, load_or_create_config, resolve_cache_path};
use filter_manager::FilterManager;
use log::{debug, info, warn};
use model::Item;
use providers::imdb::ImdbProvider;
use resolution_cache::{CacheStore, CacheTtl, MemoryCacheStore, SqliteCacheStore};
use serde_json::Value;

fn parse_item_line(line: &str, line_number: usize) -> Result<Item, Box<dyn std::error::Error>> {
    let value: Value = serde_json::from_str(line)
        .map_err(|error| format!("line {line_number}: invalid JSON: {error}"))?;
    match value {
        Value::String(title) => Ok(Item::new(title)),
        other => serde_json::from_value(other)
            .map_err(|error| format!("line {line_number}: invalid item: {error}").into()),
    }
}

fn read_items(reader: impl BufRead) -> Result<Vec<Item>, Box<dyn std::error::Error>> {
    let mut items = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        items.push(parse_item_line(trimmed, index + 1)?);
    }
    Ok(items)
}

fn open_cache_store(config: &config::CacheConfig) -> Box<dyn CacheStore> {
    let Some(path) = resolve_cache_path(config) else {
        warn!("No data directory available. Using an in-memory cache");
        return Box::new(MemoryCacheStore::new());
    };
    match SqliteCacheStore::open(&path, CacheTtl::from_config(config)) {
        Ok(store) => {
            debug!("Opened resolution cache at {}", path.display());
            Box::new(store)
        }
        Err(error) => {
            warn!(
                "Failed to open resolution cache at {}: {}. Using an in-memory cache",
                path.display(),
                error
            );
            Box::new(MemoryCacheStore::new())
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Debug);
    clog.init();
    log::set_max_level(log::LevelFilter::Info);

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_path = default_config_path()?;
    let config = load_or_create_config(&config_path)?;
    if config.resolver.debug {
        log::set_max_level(log::LevelFilter::Debug);
        debug!("Debug mode enabled");
    }

    let mut items = match std::env::args().nth(1) {
        Some(path) => read_items(BufReader::new(File::open(&path)?))?,
        None => read_items(io::stdin().lock())?,
    };
    info!("Loaded {} item(s)", items.len());

    let mut store = open_cache_store(&config.cache);
    let provider = ImdbProvider::new(&config.resolver)?;
    let mut manager = FilterManager::new(provider, &config)?;
    let report = manager.run_batch(&mut items, store.as_mut())?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for item in &items {
        serde_json::to_writer(&mut out, item)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    info!(
        "Batch finished: {} accepted, {} rejected, {} unverified",
        report.accepted, report.rejected, report.unverified
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::read_items;

    #[test]
    fn test_read_items_accepts_objects_and_bare_titles() {
        let input = "\"Heat.1995.720p\"\n\n{\"title\":\"Heat\",\"votes\":12}\n";
        let items = read_items(Cursor::new(input)).expect("items should parse");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Heat.1995.720p");
        assert_eq!(items[1].attributes.get("votes"), Some(&serde_json::json!(12)));
    }

    #[test]
    fn test_read_items_reports_line_number() {
        let error = read_items(Cursor::new("\"ok\"\n[1, 2]\n")).expect_err("array is not an item");
        assert!(error.to_string().starts_with("line 2:"));
    }
}
