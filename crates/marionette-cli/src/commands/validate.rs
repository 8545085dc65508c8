//! Catalog validation command

use anyhow::{bail, Result};
use marionette_animation::catalog::ClipCategory;
use marionette_animation::{AnimationCatalog, ClipCache, DirectoryClipSource};
use std::path::Path;
use std::rc::Rc;

pub fn run(catalog_path: &str, clips: Option<&str>) -> Result<()> {
    let catalog = AnimationCatalog::load_from_file(Path::new(catalog_path))?;

    println!(
        "Catalog OK: {} clip(s) in {} categor(ies)",
        catalog.total_count(),
        catalog.categories().count()
    );
    for category in ClipCategory::ALL {
        let entries = catalog.category(category);
        if entries.is_empty() {
            continue;
        }
        let names: Vec<&str> = entries.iter().map(|d| d.name.as_str()).collect();
        println!("  {:<10} {}", category, names.join(", "));
    }
    println!("  preferences: {}", catalog.preference_keys().join(", "));
    println!(
        "  emotions:    {}",
        catalog.emotion_ids().collect::<Vec<_>>().join(", ")
    );

    let Some(dir) = clips else {
        return Ok(());
    };

    println!("\nLoading clips from {}:", dir);
    let cache = ClipCache::new(Rc::new(DirectoryClipSource::new(dir)));
    let mut failed = 0;
    for name in catalog.all_names() {
        let Some(descriptor) = catalog.get(name) else {
            continue;
        };
        match pollster::block_on(cache.load(descriptor)) {
            Ok(loaded) => println!(
                "  ok    {:<20} {:>6.2}s  {} track(s)",
                loaded.name,
                loaded.runtime_duration,
                loaded.clip.tracks.len()
            ),
            Err(err) => {
                failed += 1;
                println!("  FAIL  {}", err);
            }
        }
    }

    if failed > 0 {
        bail!("{} clip(s) failed to load", failed);
    }
    println!("All {} clip(s) loaded.", cache.loaded_count());
    Ok(())
}
