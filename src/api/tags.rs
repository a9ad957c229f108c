use warp::{
    reject::Rejection,
    reply::{self, Reply, Response},
};

use crate::{
    actions::{get_ingredient, get_tag, list_tags, search_ingredients},
    cache::{get_or_list, CacheKeyType},
    error::HtmlError,
    form::{Form, FormData},
    schema::Uuid,
    serializers::{IngredientRead, TagRead},
    state::State,
};

pub async fn list_all_tags(state: State) -> Result<Response, Rejection> {
    let tags: Vec<TagRead> = get_or_list(CacheKeyType::Tags, state.cache.clone(), || {
        list_tags(&state.pool)
    })
    .await?;

    Ok(reply::json(&tags).into_response())
}

pub async fn get_one_tag(id: Uuid, state: State) -> Result<Response, Rejection> {
    let tag: TagRead = get_tag(id, &state.pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.default())?;

    Ok(reply::json(&tag).into_response())
}

/// `?name=` narrows the list to names starting with the given prefix.
pub async fn list_ingredients(query: FormData, state: State) -> Result<Response, Rejection> {
    let form = Form::from_data(query);
    let prefix = form.get_str("name").unwrap_or_default().trim().to_owned();

    let ingredients: Vec<IngredientRead> = get_or_list(
        CacheKeyType::Ingredients(prefix.to_owned()),
        state.cache.clone(),
        || search_ingredients(&prefix, &state.pool),
    )
    .await?;

    Ok(reply::json(&ingredients).into_response())
}

pub async fn get_one_ingredient(id: Uuid, state: State) -> Result<Response, Rejection> {
    let ingredient: IngredientRead = get_ingredient(id, &state.pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.default())?;

    Ok(reply::json(&ingredient).into_response())
}
