use std::collections::HashMap;

use crate::{
    error::{Error, HtmlError, QueryError},
    pagination::PageRequest,
    schema::{Recipe, UserRow, Uuid},
    serializers::{FollowRead, ShortRecipe, UserRead},
};

use super::users::{get_user_by_id, get_user_profile};

use sqlx::{Pool, Postgres};

/// Subscribes `user_id` to `author_id` and returns the author profile.
pub async fn follow_author(
    user_id: Uuid,
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<UserRow, Error> {
    if get_user_by_id(pool, author_id).await?.is_none() {
        return Err(HtmlError::NotFound.default());
    }
    if user_id == author_id {
        return Err(HtmlError::InvalidRequest.new("You cannot subscribe to yourself"));
    }

    let result = sqlx::query(
        "INSERT INTO follows (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(author_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::InvalidRequest.new("You are already subscribed to this author"));
    }

    get_user_profile(author_id, Some(user_id), pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.default())
}

/// Unknown authors are 404; a missing subscription is 400.
pub async fn unfollow_author(
    user_id: Uuid,
    author_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    if get_user_by_id(pool, author_id).await?.is_none() {
        return Err(HtmlError::NotFound.default());
    }
    if user_id == author_id {
        return Err(HtmlError::InvalidRequest.new("You cannot unsubscribe from yourself"));
    }

    let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
        .bind(user_id)
        .bind(author_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::InvalidRequest.new("You are not subscribed to this author"));
    }

    Ok(())
}

/// Authors `user_id` follows, ordered by username.
pub async fn fetch_subscriptions(
    user_id: Uuid,
    request: PageRequest,
    pool: &Pool<Postgres>,
) -> Result<Vec<UserRow>, Error> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
            TRUE AS is_subscribed,
            COUNT(*) OVER() AS count
        FROM follows f
        INNER JOIN users u ON u.id = f.author_id
        WHERE f.user_id = $1
        ORDER BY u.username, u.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(user_id)
    .bind(request.limit)
    .bind(request.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

/// Adds each author's newest recipes (at most `recipes_limit` per author) and
/// their total recipe count.
pub async fn build_follow_reads(
    authors: Vec<UserRow>,
    recipes_limit: Option<i64>,
    media_url: &str,
    pool: &Pool<Postgres>,
) -> Result<Vec<FollowRead>, Error> {
    if authors.is_empty() {
        return Ok(vec![]);
    }
    let author_ids: Vec<Uuid> = authors.iter().map(|a| a.id).collect();

    let recipes: Vec<Recipe> = sqlx::query_as(
        "
        SELECT id, author_id, name, image, text, cooking_time, pub_date
        FROM (
            SELECT r.*, ROW_NUMBER() OVER (
                PARTITION BY r.author_id ORDER BY r.pub_date DESC, r.id DESC
            ) AS position
            FROM recipes r
            WHERE r.author_id = ANY($1)
        ) ranked
        WHERE $2::BIGINT IS NULL OR position <= $2
        ORDER BY pub_date DESC, id DESC
    ",
    )
    .bind(&author_ids)
    .bind(recipes_limit)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let counts: HashMap<Uuid, i64> = sqlx::query_as::<_, (Uuid, i64)>(
        "SELECT author_id, COUNT(*) FROM recipes WHERE author_id = ANY($1) GROUP BY author_id",
    )
    .bind(&author_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?
    .into_iter()
    .collect();

    let mut by_author: HashMap<Uuid, Vec<ShortRecipe>> = HashMap::new();
    for recipe in &recipes {
        by_author
            .entry(recipe.author_id)
            .or_default()
            .push(ShortRecipe::from_recipe(recipe, media_url));
    }

    Ok(authors
        .into_iter()
        .map(|author| FollowRead {
            recipes: by_author.remove(&author.id).unwrap_or_default(),
            recipes_count: counts.get(&author.id).copied().unwrap_or(0),
            author: UserRead::from(author),
        })
        .collect())
}
