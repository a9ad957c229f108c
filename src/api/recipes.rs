use chrono::Local;
use warp::{
    http::{
        header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    reject::Rejection,
    reply::{self, Reply, Response},
};

use crate::{
    actions::{
        add_to_list, build_recipe_reads, create_recipe, delete_recipe, download_shopping_list,
        fetch_recipes, get_recipe_mut, get_recipe_read, get_user_by_id, known_references,
        remove_from_list, shopping_list_filename, update_recipe, RecipeFilter,
    },
    error::{Error, HtmlError},
    form::{Form, FormData},
    jwt::SessionData,
    pagination::{PageContext, PageRequest},
    permissions::ActionType,
    schema::{Recipe, RecipeList, Uuid},
    serializers::RecipeWrite,
    state::State,
    validators::{validate_recipe, WriteMode},
};

pub async fn list_recipes(
    query: FormData,
    session: Option<SessionData>,
    state: State,
) -> Result<Response, Rejection> {
    let form = Form::from_data(query);
    let viewer = session.map(|s| s.user_id);

    let request = PageRequest::from_form(&form, state.config.page_size)?;
    let filter = RecipeFilter::from_form(&form, viewer)?;

    let rows = fetch_recipes(&filter, request, &state.pool).await?;
    let total = rows.first().map(|row| row.count).unwrap_or(0);
    let recipes: Vec<Recipe> = rows.into_iter().map(Recipe::from).collect();

    let reads = build_recipe_reads(recipes, viewer, &state.config.media_url, &state.pool).await?;
    let page = PageContext::from_rows(reads, total, request, "/api/recipes/", &form)?;

    Ok(reply::json(&page).into_response())
}

pub async fn get_recipe(
    id: Uuid,
    session: Option<SessionData>,
    state: State,
) -> Result<Response, Rejection> {
    let viewer = session.map(|s| s.user_id);
    let recipe = get_recipe_read(id, viewer, &state.config.media_url, &state.pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.default())?;

    Ok(reply::json(&recipe).into_response())
}

pub async fn post_recipe(
    session: SessionData,
    payload: RecipeWrite,
    state: State,
) -> Result<Response, Rejection> {
    session.authenticate(ActionType::CreateRecipes)?;

    let known = known_references(&payload, &state.pool).await?;
    let recipe = validate_recipe(payload, WriteMode::Create, &known).map_err(Error::from)?;
    let id = create_recipe(session.user_id, recipe, &state.config, &state.pool).await?;

    let recipe = get_recipe_read(id, Some(session.user_id), &state.config.media_url, &state.pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.default())?;

    Ok(reply::with_status(reply::json(&recipe), StatusCode::CREATED).into_response())
}

/// `PUT` and `PATCH`; `mode` decides which fields must be present.
pub async fn patch_recipe(
    id: Uuid,
    mode: WriteMode,
    session: SessionData,
    payload: RecipeWrite,
    state: State,
) -> Result<Response, Rejection> {
    let recipe = get_recipe_mut(id, &session, &state.pool).await?;

    let known = known_references(&payload, &state.pool).await?;
    let update = validate_recipe(payload, mode, &known).map_err(Error::from)?;
    update_recipe(&recipe, update, &state.config, &state.pool).await?;

    let recipe = get_recipe_read(id, Some(session.user_id), &state.config.media_url, &state.pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.default())?;

    Ok(reply::json(&recipe).into_response())
}

pub async fn remove_recipe(
    id: Uuid,
    session: SessionData,
    state: State,
) -> Result<Response, Rejection> {
    let recipe = get_recipe_mut(id, &session, &state.pool).await?;
    delete_recipe(&recipe, &state.config, &state.pool).await?;

    Ok(reply::with_status(reply::reply(), StatusCode::NO_CONTENT).into_response())
}

pub async fn post_to_list(
    id: Uuid,
    list: RecipeList,
    session: SessionData,
    state: State,
) -> Result<Response, Rejection> {
    session.authenticate(ActionType::ManageOwnLists)?;

    let recipe = add_to_list(
        list,
        session.user_id,
        id,
        &state.config.media_url,
        &state.pool,
    )
    .await?;

    Ok(reply::with_status(reply::json(&recipe), StatusCode::CREATED).into_response())
}

pub async fn delete_from_list(
    id: Uuid,
    list: RecipeList,
    session: SessionData,
    state: State,
) -> Result<Response, Rejection> {
    session.authenticate(ActionType::ManageOwnLists)?;
    remove_from_list(list, session.user_id, id, &state.pool).await?;

    Ok(reply::with_status(reply::reply(), StatusCode::NO_CONTENT).into_response())
}

fn attachment(body: String, filename: &str) -> Result<Response, Error> {
    let disposition = HeaderValue::from_bytes(format!("attachment; filename={filename}").as_bytes())
        .map_err(|e| {
            log::error!("Invalid attachment name {filename:?}: {e}");
            HtmlError::InternalServerError.default()
        })?;

    let mut response = Response::new(body.into());
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(CONTENT_DISPOSITION, disposition);

    Ok(response)
}

pub async fn download_shopping_cart(
    session: SessionData,
    state: State,
) -> Result<Response, Rejection> {
    session.authenticate(ActionType::ManageOwnLists)?;

    let user = get_user_by_id(&state.pool, session.user_id)
        .await?
        .ok_or_else(|| HtmlError::InvalidSession.default())?;

    let text = download_shopping_list(
        user.id,
        &user.first_name,
        Local::now().naive_local(),
        &state.pool,
    )
    .await?;

    Ok(attachment(text, &shopping_list_filename(&user.username))?)
}
