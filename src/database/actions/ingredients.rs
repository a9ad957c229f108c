use std::collections::HashSet;

use crate::{
    error::{Error, QueryError},
    schema::{Ingredient, NewIngredient, Uuid},
    validators::validate_ingredient,
};

use sqlx::{Pool, Postgres, QueryBuilder};

/// Rows per insert statement when importing; keeps the bind count well below
/// the protocol limit.
const IMPORT_CHUNK_SIZE: usize = 1000;

/// Escapes `LIKE` wildcards so the prefix is matched literally.
pub fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Ingredients whose name starts with `prefix`, ignoring case, ordered by
/// name. An empty prefix lists everything.
pub async fn search_ingredients(
    prefix: &str,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, Error> {
    let list: Vec<Ingredient> = sqlx::query_as(
        "
        SELECT * FROM ingredients
        WHERE LOWER(name) LIKE LOWER($1)
        ORDER BY name, measurement_unit
    ",
    )
    .bind(like_prefix(prefix.trim()))
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(list)
}

pub async fn get_ingredient(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, Error> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Which of `ids` name an existing ingredient.
pub async fn existing_ingredient_ids(
    ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<HashSet<Uuid>, Error> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }

    let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM ingredients WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

/// Loads an ingredient fixture. Invalid entries are skipped with a warning and
/// existing (name, unit) pairs are kept. Returns the number of inserted rows.
pub async fn import_ingredients(
    ingredients: &[NewIngredient],
    pool: &Pool<Postgres>,
) -> Result<u64, Error> {
    let valid: Vec<&NewIngredient> = ingredients
        .iter()
        .filter(|ingredient| match validate_ingredient(ingredient) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Skipping ingredient {:?}: {e:?}", ingredient.name);
                false
            }
        })
        .collect();

    let mut inserted = 0;
    for chunk in valid.chunks(IMPORT_CHUNK_SIZE) {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO ingredients (name, measurement_unit) ");
        query_builder.push_values(chunk, |mut b, ingredient| {
            b.push_bind(ingredient.name.trim())
                .push_bind(ingredient.measurement_unit.trim());
        });
        query_builder.push(" ON CONFLICT DO NOTHING");

        let result = query_builder
            .build()
            .execute(pool)
            .await
            .map_err(QueryError::from)?;
        inserted += result.rows_affected();
    }

    Ok(inserted)
}
