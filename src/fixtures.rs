use std::path::Path;

use serde::de::DeserializeOwned;

use crate::{
    actions::{import_ingredients, import_tags},
    cache::{invalidate, CacheLifetime},
    error::{Error, TypeError},
    schema::{NewIngredient, NewTag},
    state::State,
};

/// Reads a JSON array fixture.
pub async fn read_fixture<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, TypeError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        log::error!("Failed to read fixture {}: {e}", path.display());
        TypeError::new(&format!("Unreadable fixture {}", path.display()))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        log::error!("Failed to parse fixture {}: {e}", path.display());
        TypeError::new(&format!("Malformed fixture {}", path.display()))
    })
}

/// Imports the configured tag and ingredient fixtures and drops the cached
/// listings they affect.
pub async fn load_fixtures(state: &State) -> Result<(), Error> {
    if let Some(path) = &state.config.tags_fixture {
        let tags: Vec<NewTag> = read_fixture(path).await?;
        let inserted = import_tags(&tags, &state.pool).await?;
        log::info!("Imported {inserted} of {} tags from {}", tags.len(), path.display());
        invalidate(CacheLifetime::BindTagCache, state.cache.clone()).await;
    }

    if let Some(path) = &state.config.ingredients_fixture {
        let ingredients: Vec<NewIngredient> = read_fixture(path).await?;
        let inserted = import_ingredients(&ingredients, &state.pool).await?;
        log::info!(
            "Imported {inserted} of {} ingredients from {}",
            ingredients.len(),
            path.display()
        );
        invalidate(CacheLifetime::BindIngredientCache, state.cache.clone()).await;
    }

    Ok(())
}
