use colored::*;
use eyre::Result;

use crate::config::Config;
use crate::memory::MemoryStore;
use crate::persona::PersonaLoader;

pub fn run(config: &Config) -> Result<()> {
    let personas_dir = Config::expand_path(&config.paths.personas);
    let memories = MemoryStore::new(Config::expand_path(&config.paths.memories));
    let definitions = PersonaLoader::new(personas_dir.clone()).load_all()?;

    println!("{}", "Available Personas:".bold());
    println!();

    for definition in &definitions {
        let marker = if definition.name == config.persona.default {
            "*".green().to_string()
        } else {
            " ".to_string()
        };
        let count = memories.fragments(&definition.name).len();

        println!(
            "{} {} - {} {}",
            marker,
            definition.name.cyan(),
            definition.description,
            format!("({} memories)", count).dimmed()
        );
    }

    println!();
    println!("  Personas: {}", personas_dir.display().to_string().dimmed());
    println!("  Memories: {}", memories.root().display().to_string().dimmed());
    Ok(())
}
