use std::path::PathBuf;

use serde::de::DeserializeOwned;
use warp::{
    filters::BoxedFilter,
    reject::Rejection,
    reply::{Reply, Response},
    Filter,
};

use super::{recipes, tags, users};
use crate::{
    error::handle_rejection,
    form::FormData,
    middleware::{with_possible_session, with_session},
    schema::{RecipeList, Uuid},
    state::{with_state, State},
    validators::WriteMode,
};

/// Request bodies carry base64 images; anything above this is refused.
const MAX_BODY_SIZE: u64 = 10 * 1024 * 1024;

fn json_body<T: DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_SIZE).and(warp::body::json())
}

fn query() -> impl Filter<Extract = (FormData,), Error = Rejection> + Clone {
    warp::query::<FormData>()
}

fn recipe_routes(state: &State) -> BoxedFilter<(Response,)> {
    let list = warp::path!("recipes")
        .and(warp::get())
        .and(query())
        .and(with_possible_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(recipes::list_recipes);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(recipes::post_recipe);

    let download = warp::path!("recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(recipes::download_shopping_cart);

    let detail = warp::path!("recipes" / Uuid)
        .and(warp::get())
        .and(with_possible_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(recipes::get_recipe);

    let replace = warp::path!("recipes" / Uuid)
        .and(warp::put().map(|| WriteMode::Replace))
        .or(warp::path!("recipes" / Uuid).and(warp::patch().map(|| WriteMode::Partial)))
        .unify()
        .and(with_session(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(recipes::patch_recipe);

    let delete = warp::path!("recipes" / Uuid)
        .and(warp::delete())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(recipes::remove_recipe);

    list.or(create)
        .unify()
        .or(download)
        .unify()
        .or(detail)
        .unify()
        .or(replace)
        .unify()
        .or(delete)
        .unify()
        .or(list_routes("favorite", RecipeList::Favorites, state))
        .unify()
        .or(list_routes("shopping_cart", RecipeList::ShoppingCart, state))
        .unify()
        .boxed()
}

/// `POST` and `DELETE` on `/recipes/{id}/<segment>/`.
fn list_routes(segment: &'static str, list: RecipeList, state: &State) -> BoxedFilter<(Response,)> {
    let recipe_list = warp::path("recipes")
        .and(warp::path::param::<Uuid>())
        .and(warp::path(segment))
        .and(warp::path::end())
        .map(move |id: Uuid| (id, list))
        .untuple_one();

    let add = recipe_list
        .clone()
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(recipes::post_to_list);

    let remove = recipe_list
        .and(warp::delete())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(recipes::delete_from_list);

    add.or(remove).unify().boxed()
}

fn user_routes(state: &State) -> BoxedFilter<(Response,)> {
    let list = warp::path!("users")
        .and(warp::get())
        .and(query())
        .and(with_possible_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(users::list_users);

    let register = warp::path!("users")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(users::post_user);

    let me = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(users::get_me);

    let set_password = warp::path!("users" / "set_password")
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(users::post_set_password);

    let subscriptions = warp::path!("users" / "subscriptions")
        .and(warp::get())
        .and(query())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(users::list_subscriptions);

    let detail = warp::path!("users" / Uuid)
        .and(warp::get())
        .and(with_possible_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(users::get_user);

    let subscribe = warp::path!("users" / Uuid / "subscribe")
        .and(warp::post())
        .and(query())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(users::post_subscribe);

    let unsubscribe = warp::path!("users" / Uuid / "subscribe")
        .and(warp::delete())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(users::delete_subscribe);

    let login = warp::path!("auth" / "token" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(users::post_login);

    let logout = warp::path!("auth" / "token" / "logout")
        .and(warp::post())
        .and(with_session(state.clone()))
        .and(with_state(state.clone()))
        .and_then(users::post_logout);

    list.or(register)
        .unify()
        .or(me)
        .unify()
        .or(set_password)
        .unify()
        .or(subscriptions)
        .unify()
        .or(detail)
        .unify()
        .or(subscribe)
        .unify()
        .or(unsubscribe)
        .unify()
        .or(login)
        .unify()
        .or(logout)
        .unify()
        .boxed()
}

fn tag_routes(state: &State) -> BoxedFilter<(Response,)> {
    let tag_list = warp::path!("tags")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(tags::list_all_tags);

    let tag = warp::path!("tags" / Uuid)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(tags::get_one_tag);

    let ingredient_list = warp::path!("ingredients")
        .and(warp::get())
        .and(query())
        .and(with_state(state.clone()))
        .and_then(tags::list_ingredients);

    let ingredient = warp::path!("ingredients" / Uuid)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(tags::get_one_ingredient);

    tag_list
        .or(tag)
        .unify()
        .or(ingredient_list)
        .unify()
        .or(ingredient)
        .unify()
        .boxed()
}

/// Serves uploaded files below `media_url`, e.g. `/media/recipes/images/..`.
fn media_routes(media_url: &str, media_root: PathBuf) -> BoxedFilter<(Response,)> {
    media_url
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(warp::any().boxed(), |filter, segment| {
            filter.and(warp::path(segment.to_owned())).boxed()
        })
        .and(warp::get())
        .and(warp::fs::dir(media_root))
        .map(|file: warp::filters::fs::File| file.into_response())
        .boxed()
}

/// The whole application: `/api/..` plus media, with every rejection turned
/// into a JSON error and every request logged.
pub fn routes(
    state: State,
) -> impl Filter<Extract = (impl Reply,), Error = std::convert::Infallible> + Clone {
    let api = warp::path("api").and(
        recipe_routes(&state)
            .or(user_routes(&state))
            .unify()
            .or(tag_routes(&state))
            .unify(),
    );

    let media = media_routes(&state.config.media_url, state.config.media_root.clone());

    api.or(media)
        .unify()
        .recover(handle_rejection)
        .unify()
        .with(warp::log("foodgram"))
}
