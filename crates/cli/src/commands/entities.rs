//! `switchboard entities` and `switchboard forget`: inspect and prune the
//! knowledge graph.

use switchboard_core::knowledge::EntityKind;

use crate::runtime::{Options, Stores};

pub async fn list(
    options: &Options,
    kind: Option<&str>,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind = kind.map(str::parse::<EntityKind>).transpose()?;
    let config = options
        .load_config()
        .map_err(|e| format!("Failed to load config: {e}"))?;
    let stores = Stores::open(&config, options.ephemeral).await?;

    let entities = stores.knowledge.list_entities(kind, limit).await?;
    if entities.is_empty() {
        println!("No entities remembered yet.");
        return Ok(());
    }

    println!("{:>6}  {:<7} {:>5}  {:<10}  NAME", "ID", "KIND", "SEEN", "LAST");
    for entity in entities {
        println!(
            "{:>6}  {:<7} {:>5}  {:<10}  {}",
            entity.id,
            entity.kind.as_str(),
            entity.frequency,
            entity.last_seen.format("%Y-%m-%d"),
            entity.name
        );
    }
    Ok(())
}

pub async fn forget(options: &Options, id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let config = options
        .load_config()
        .map_err(|e| format!("Failed to load config: {e}"))?;
    let stores = Stores::open(&config, options.ephemeral).await?;

    if stores.knowledge.delete_entity(id).await? {
        println!("Forgot entity {id} and its relations.");
        Ok(())
    } else {
        Err(format!("No entity with id {id}").into())
    }
}
