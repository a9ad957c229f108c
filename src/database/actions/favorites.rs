use crate::{
    error::{Error, HtmlError, QueryError},
    schema::{RecipeList, Uuid},
    serializers::ShortRecipe,
};

use super::recipes::get_recipe;

use sqlx::{Pool, Postgres};

/// Puts a recipe on one of the user's lists. 404 for an unknown recipe, 400
/// when it is already listed.
pub async fn add_to_list(
    list: RecipeList,
    user_id: Uuid,
    recipe_id: Uuid,
    media_url: &str,
    pool: &Pool<Postgres>,
) -> Result<ShortRecipe, Error> {
    let recipe = get_recipe(recipe_id, pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.default())?;

    // A concurrent duplicate is swallowed by the unique pair and reported
    // like any other duplicate.
    let result = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        list.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::InvalidRequest.new(list.already_added()));
    }

    Ok(ShortRecipe::from_recipe(&recipe, media_url))
}

/// Takes a recipe off one of the user's lists; 400 when it was not listed.
pub async fn remove_from_list(
    list: RecipeList,
    user_id: Uuid,
    recipe_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        list.table()
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if result.rows_affected() == 0 {
        return Err(HtmlError::InvalidRequest.new(list.not_added()));
    }

    Ok(())
}
