use std::collections::HashSet;

use crate::{
    error::{Error, QueryError},
    schema::{LinkedRecipeTag, NewTag, Tag, Uuid},
    validators::validate_tag,
};

use sqlx::{Pool, Postgres, QueryBuilder};

pub async fn list_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, Error> {
    let list: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name")
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(list)
}

pub async fn get_tag(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Tag>, Error> {
    let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(tag)
}

/// Which of `ids` name an existing tag.
pub async fn existing_tag_ids(ids: &[Uuid], pool: &Pool<Postgres>) -> Result<HashSet<Uuid>, Error> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }

    let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

/// Tags of every recipe in `recipe_ids`, ordered by name.
pub async fn list_tags_for_recipes(
    recipe_ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<Vec<LinkedRecipeTag>, Error> {
    let list: Vec<LinkedRecipeTag> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.color, t.slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.name
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(list)
}

/// Loads a tag fixture. Invalid entries are skipped with a warning; tags that
/// clash with an existing name, colour or slug are left alone. Returns the
/// number of inserted tags.
pub async fn import_tags(tags: &[NewTag], pool: &Pool<Postgres>) -> Result<u64, Error> {
    let valid: Vec<&NewTag> = tags
        .iter()
        .filter(|tag| match validate_tag(tag) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Skipping tag {:?}: {e:?}", tag.name);
                false
            }
        })
        .collect();

    if valid.is_empty() {
        return Ok(0);
    }

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO tags (name, color, slug) ");
    query_builder.push_values(valid, |mut b, tag| {
        b.push_bind(tag.name.trim())
            .push_bind(tag.color.to_uppercase())
            .push_bind(tag.slug.trim());
    });
    query_builder.push(" ON CONFLICT DO NOTHING");

    let result = query_builder
        .build()
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(result.rows_affected())
}
