use std::path::{Path, PathBuf};

use foodgram::{
    actions::{import_ingredients, import_tags, search_ingredients},
    api::routes::routes,
    config::Config,
    schema::{NewIngredient, NewTag},
    state::State,
};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use warp::{http::StatusCode, test::RequestBuilder, Filter, Reply};

// 1x1 transparent png
const IMAGE: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

fn offline_state(media_root: PathBuf) -> State {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://foodgram@localhost/foodgram")
        .unwrap();
    State::new(pool, None, Config::for_tests(media_root))
}

/// A migrated database from `FOODGRAM_TEST_DATABASE_URL`. Tests using it are
/// ignored by default; run them with `cargo test -- --ignored`.
async fn database_state(media_root: &Path) -> State {
    let url = std::env::var("FOODGRAM_TEST_DATABASE_URL")
        .expect("FOODGRAM_TEST_DATABASE_URL must point at a PostgreSQL database");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    State::new(pool, None, Config::for_tests(media_root.to_owned()))
}

fn request(method: &str, path: &str, token: Option<&str>) -> RequestBuilder {
    let builder = warp::test::request().method(method).path(path);
    match token {
        Some(token) => builder.header("authorization", format!("Token {token}")),
        None => builder,
    }
}

async fn send<F>(api: &F, request: RequestBuilder) -> (StatusCode, Value)
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let response = request.reply(api).await;
    let body = serde_json::from_slice(response.body()).unwrap_or(Value::Null);
    (response.status(), body)
}

fn unique() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..10].to_owned()
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let media = tempfile::tempdir().unwrap();
    let api = routes(offline_state(media.path().to_owned()));

    for (method, path) in [
        ("GET", "/api/users/me/"),
        ("GET", "/api/users/me"),
        ("POST", "/api/recipes/"),
        ("GET", "/api/recipes/download_shopping_cart/"),
        ("POST", "/api/recipes/1/favorite/"),
        ("DELETE", "/api/recipes/1/shopping_cart/"),
        ("GET", "/api/users/subscriptions/"),
        ("POST", "/api/users/1/subscribe/"),
        ("POST", "/api/auth/token/logout/"),
    ] {
        let (status, body) = send(&api, request(method, path, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {path}");
        assert!(body["detail"].is_string(), "{method} {path}");
    }
}

#[tokio::test]
async fn malformed_tokens_are_rejected() {
    let media = tempfile::tempdir().unwrap();
    let api = routes(offline_state(media.path().to_owned()));

    let (status, _) = send(&api, request("GET", "/api/users/me/", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let builder = warp::test::request()
        .path("/api/users/me/")
        .header("authorization", "Basic dXNlcjpwYXNz");
    let (status, _) = send(&api, builder).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_routes_and_methods() {
    let media = tempfile::tempdir().unwrap();
    let api = routes(offline_state(media.path().to_owned()));

    let (status, body) = send(&api, request("GET", "/api/nothing/", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "detail": "Not found." }));

    let (status, _) = send(&api, request("PUT", "/api/recipes/", None)).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn registration_payload_is_validated() {
    let media = tempfile::tempdir().unwrap();
    let api = routes(offline_state(media.path().to_owned()));

    let builder = request("POST", "/api/users/", None).json(&json!({
        "email": "not-an-email",
        "username": "me",
        "first_name": "Anna",
    }));
    let (status, body) = send(&api, builder).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    for field in ["email", "username", "last_name", "password"] {
        assert!(body[field].is_array(), "{field} missing in {body}");
    }
    assert!(body.get("first_name").is_none());
}

#[tokio::test]
async fn bad_pagination_is_a_client_error() {
    let media = tempfile::tempdir().unwrap();
    let api = routes(offline_state(media.path().to_owned()));

    let (status, _) = send(&api, request("GET", "/api/recipes/?page=0", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&api, request("GET", "/api/users/?limit=many", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let path = format!("/api/recipes/?page={}", i64::MAX);
    let (status, _) = send(&api, request("GET", &path, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_is_a_client_error() {
    let media = tempfile::tempdir().unwrap();
    let api = routes(offline_state(media.path().to_owned()));

    let builder = request("POST", "/api/auth/token/login/", None)
        .header("content-type", "application/json")
        .body("{ nope");
    let (status, _) = send(&api, builder).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn media_files_are_served() {
    let media = tempfile::tempdir().unwrap();
    let images = media.path().join("recipes/images");
    std::fs::create_dir_all(&images).unwrap();
    std::fs::write(images.join("pixel.png"), b"not really a png").unwrap();

    let api = routes(offline_state(media.path().to_owned()));
    let response = request("GET", "/media/recipes/images/pixel.png", None)
        .reply(&api)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), b"not really a png");
}

// Everything below runs against PostgreSQL and is ignored unless asked for.

/// Registers a user and returns its id and token.
async fn sign_up<F>(api: &F, name: &str) -> (i64, String)
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let email = format!("{name}@example.com");
    let builder = request("POST", "/api/users/", None).json(&json!({
        "email": email,
        "username": name,
        "first_name": "Анна",
        "last_name": "Иванова",
        "password": "s3cret-pass",
    }));
    let (status, body) = send(api, builder).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert!(body.get("password").is_none());
    let id = body["id"].as_i64().unwrap();

    let builder = request("POST", "/api/auth/token/login/", None).json(&json!({
        "email": email,
        "password": "s3cret-pass",
    }));
    let (status, body) = send(api, builder).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    (id, body["auth_token"].as_str().unwrap().to_owned())
}

struct Catalog {
    tags: Vec<i64>,
    ingredients: Vec<i64>,
    tag_slug: String,
}

/// Unique tags and ingredients for one test.
async fn catalog(state: &State, suffix: &str) -> Catalog {
    let color = |n: usize| {
        let seed = u32::from_str_radix(&suffix[..6], 16).unwrap_or(0);
        format!("#{:06X}", (seed + n as u32) & 0xFF_FFFF)
    };
    let tags = vec![
        NewTag {
            name: format!("Завтрак {suffix}"),
            color: color(0),
            slug: format!("breakfast_{suffix}"),
        },
        NewTag {
            name: format!("Ужин {suffix}"),
            color: color(1),
            slug: format!("dinner_{suffix}"),
        },
    ];
    assert_eq!(import_tags(&tags, &state.pool).await.unwrap(), 2);

    let ingredients = vec![
        NewIngredient {
            name: format!("молоко {suffix}"),
            measurement_unit: "мл".to_owned(),
        },
        NewIngredient {
            name: format!("яйца {suffix}"),
            measurement_unit: "шт".to_owned(),
        },
        NewIngredient {
            name: format!("сыр {suffix}"),
            measurement_unit: "г".to_owned(),
        },
    ];
    assert_eq!(import_ingredients(&ingredients, &state.pool).await.unwrap(), 3);

    let tag_ids: Vec<(i32,)> =
        sqlx::query_as("SELECT id FROM tags WHERE slug LIKE $1 ORDER BY slug")
            .bind(format!("%_{suffix}"))
            .fetch_all(&state.pool)
            .await
            .unwrap();
    let mut ingredient_ids = vec![];
    for ingredient in &ingredients {
        let id: (i32,) = sqlx::query_as("SELECT id FROM ingredients WHERE name = $1")
            .bind(&ingredient.name)
            .fetch_one(&state.pool)
            .await
            .unwrap();
        ingredient_ids.push(id.0 as i64);
    }

    Catalog {
        // breakfast_, dinner_
        tags: tag_ids.into_iter().map(|t| t.0 as i64).collect(),
        ingredients: ingredient_ids,
        tag_slug: format!("breakfast_{suffix}"),
    }
}

fn ingredient_pairs(recipe: &Value) -> Vec<(i64, i64)> {
    let mut pairs: Vec<(i64, i64)> = recipe["ingredients"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| (i["id"].as_i64().unwrap(), i["amount"].as_i64().unwrap()))
        .collect();
    pairs.sort_unstable();
    pairs
}

fn tag_ids(recipe: &Value) -> Vec<i64> {
    let mut ids: Vec<i64> = recipe["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_i64().unwrap())
        .collect();
    ids.sort_unstable();
    ids
}

#[tokio::test]
#[ignore = "needs FOODGRAM_TEST_DATABASE_URL"]
async fn recipe_lifecycle() {
    let media = tempfile::tempdir().unwrap();
    let state = database_state(media.path()).await;
    let suffix = unique();
    let catalog = catalog(&state, &suffix).await;
    let api = routes(state.clone());

    let (author_id, author) = sign_up(&api, &format!("author_{suffix}")).await;
    let (_, stranger) = sign_up(&api, &format!("stranger_{suffix}")).await;

    let (milk, eggs, cheese) = (
        catalog.ingredients[0],
        catalog.ingredients[1],
        catalog.ingredients[2],
    );
    let payload = json!({
        "ingredients": [{"id": milk, "amount": 200}, {"id": eggs, "amount": 3}],
        "tags": [catalog.tags[0]],
        "image": IMAGE,
        "name": "Омлет",
        "text": "Взбить и пожарить",
        "cooking_time": 10,
    });
    let builder = request("POST", "/api/recipes/", Some(&author)).json(&payload);
    let (status, created) = send(&api, builder).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(ingredient_pairs(&created), vec![(milk, 200), (eggs, 3)]);
    assert_eq!(tag_ids(&created), vec![catalog.tags[0]]);
    assert_eq!(created["author"]["id"], author_id);
    assert!(created["image"].as_str().unwrap().starts_with("/media/recipes/images/"));
    let id = created["id"].as_i64().unwrap();

    let (status, fetched) = send(&api, request("GET", &format!("/api/recipes/{id}/"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ingredient_pairs(&fetched), ingredient_pairs(&created));
    assert_eq!(fetched["is_favorited"], false);

    let (status, page) = send(
        &api,
        request("GET", &format!("/api/recipes/?tags={}", catalog.tag_slug), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 1);
    assert_eq!(page["results"][0]["id"], id);

    // Replacing ingredients and tags drops the old associations.
    let update = json!({
        "ingredients": [{"id": cheese, "amount": 50}],
        "tags": [catalog.tags[1]],
        "name": "Сырный омлет",
        "text": "Посыпать сыром",
        "cooking_time": 12,
    });
    let path = format!("/api/recipes/{id}/");
    let (status, _) = send(&api, request("PUT", &path, Some(&stranger)).json(&update)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = send(&api, request("PUT", &path, Some(&author)).json(&update)).await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(ingredient_pairs(&updated), vec![(cheese, 50)]);
    assert_eq!(tag_ids(&updated), vec![catalog.tags[1]]);
    assert_eq!(updated["image"], created["image"]);

    let (status, patched) = send(
        &api,
        request("PATCH", &path, Some(&author)).json(&json!({ "cooking_time": 15 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["cooking_time"], 15);
    assert_eq!(ingredient_pairs(&patched), vec![(cheese, 50)]);

    let (status, _) = send(&api, request("DELETE", &path, Some(&stranger))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&api, request("DELETE", &path, Some(&author))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&api, request("GET", &path, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "needs FOODGRAM_TEST_DATABASE_URL"]
async fn invalid_recipes_are_rejected() {
    let media = tempfile::tempdir().unwrap();
    let state = database_state(media.path()).await;
    let suffix = unique();
    let catalog = catalog(&state, &suffix).await;
    let api = routes(state.clone());
    let (_, token) = sign_up(&api, &format!("cook_{suffix}")).await;

    let milk = catalog.ingredients[0];
    for (field, payload) in [
        (
            "cooking_time",
            json!({"ingredients": [{"id": milk, "amount": 1}], "tags": [catalog.tags[0]],
                   "image": IMAGE, "name": "x", "text": "x", "cooking_time": 0}),
        ),
        (
            "amount",
            json!({"ingredients": [{"id": milk, "amount": 0}], "tags": [catalog.tags[0]],
                   "image": IMAGE, "name": "x", "text": "x", "cooking_time": 1}),
        ),
        (
            "ingredients",
            json!({"ingredients": [{"id": milk, "amount": 1}, {"id": milk, "amount": 2}],
                   "tags": [catalog.tags[0]], "image": IMAGE, "name": "x", "text": "x",
                   "cooking_time": 1}),
        ),
        (
            "tags",
            json!({"ingredients": [{"id": milk, "amount": 1}], "tags": [],
                   "image": IMAGE, "name": "x", "text": "x", "cooking_time": 1}),
        ),
    ] {
        let builder = request("POST", "/api/recipes/", Some(&token)).json(&payload);
        let (status, body) = send(&api, builder).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{field}: {body}");
        assert!(body[field].is_array(), "{field}: {body}");
    }
}

#[tokio::test]
#[ignore = "needs FOODGRAM_TEST_DATABASE_URL"]
async fn favorites_cart_and_shopping_list() {
    let media = tempfile::tempdir().unwrap();
    let state = database_state(media.path()).await;
    let suffix = unique();
    let catalog = catalog(&state, &suffix).await;
    let api = routes(state.clone());
    let (_, token) = sign_up(&api, &format!("shopper_{suffix}")).await;
    let token = Some(token.as_str());

    let download = "/api/recipes/download_shopping_cart/";
    let (status, _) = send(&api, request("GET", download, token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let milk = catalog.ingredients[0];
    let mut ids = vec![];
    for amount in [2, 3] {
        let payload = json!({
            "ingredients": [{"id": milk, "amount": amount}],
            "tags": [catalog.tags[0]],
            "image": IMAGE,
            "name": format!("Каша {amount}"),
            "text": "Варить",
            "cooking_time": 5,
        });
        let builder = request("POST", "/api/recipes/", token).json(&payload);
        let (status, body) = send(&api, builder).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        ids.push(body["id"].as_i64().unwrap());
    }

    let favorite = format!("/api/recipes/{}/favorite/", ids[0]);
    let (status, short) = send(&api, request("POST", &favorite, token)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(short["id"], ids[0]);
    assert!(short.get("text").is_none());
    let (status, body) = send(&api, request("POST", &favorite, token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"].is_string());

    let (status, page) = send(&api, request("GET", "/api/recipes/?is_favorited=1", token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 1);
    assert_eq!(page["results"][0]["is_favorited"], true);

    let (status, _) = send(&api, request("DELETE", &favorite, token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&api, request("DELETE", &favorite, token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&api, request("POST", "/api/recipes/999999999/favorite/", token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    for id in &ids {
        let path = format!("/api/recipes/{id}/shopping_cart/");
        let (status, _) = send(&api, request("POST", &path, token)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let response = request("GET", download, token).reply(&api).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-disposition"],
        format!("attachment; filename=shopper_{suffix}_shopping_list.txt").as_str()
    );
    let text = String::from_utf8(response.body().to_vec()).unwrap();
    assert!(text.starts_with("Список покупок для:\n\nАнна\n"));
    assert!(text.contains(&format!("\nмолоко {suffix}: 5 мл\n")), "{text}");
    assert!(text.ends_with("\n\nПосчитано в Foodgram"));
}

#[tokio::test]
#[ignore = "needs FOODGRAM_TEST_DATABASE_URL"]
async fn subscriptions() {
    let media = tempfile::tempdir().unwrap();
    let state = database_state(media.path()).await;
    let suffix = unique();
    let catalog = catalog(&state, &suffix).await;
    let api = routes(state.clone());
    let (reader_id, reader) = sign_up(&api, &format!("reader_{suffix}")).await;
    let (author_id, author) = sign_up(&api, &format!("writer_{suffix}")).await;

    for n in 0..3 {
        let payload = json!({
            "ingredients": [{"id": catalog.ingredients[1], "amount": 1}],
            "tags": [catalog.tags[0]],
            "image": IMAGE,
            "name": format!("Рецепт {n}"),
            "text": "Текст",
            "cooking_time": 1,
        });
        let builder = request("POST", "/api/recipes/", Some(&author)).json(&payload);
        let (status, _) = send(&api, builder).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, _) = send(
        &api,
        request("POST", &format!("/api/users/{reader_id}/subscribe/"), Some(&reader)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let subscribe = format!("/api/users/{author_id}/subscribe/?recipes_limit=2");
    let (status, follow) = send(&api, request("POST", &subscribe, Some(&reader))).await;
    assert_eq!(status, StatusCode::CREATED, "{follow}");
    assert_eq!(follow["is_subscribed"], true);
    assert_eq!(follow["recipes"].as_array().unwrap().len(), 2);
    assert_eq!(follow["recipes_count"], 3);
    assert_eq!(follow["recipes"][0]["name"], "Рецепт 2");

    let (status, _) = send(&api, request("POST", &subscribe, Some(&reader))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let subscriptions = request("GET", "/api/users/subscriptions/", Some(&reader));
    let (status, page) = send(&api, subscriptions).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 1);
    assert_eq!(page["results"][0]["id"], author_id);

    let path = format!("/api/users/{author_id}/");
    let (status, profile) = send(&api, request("GET", &path, Some(&reader))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["is_subscribed"], true);

    let unsubscribe = format!("/api/users/{author_id}/subscribe/");
    let (status, _) = send(&api, request("DELETE", &unsubscribe, Some(&reader))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&api, request("DELETE", &unsubscribe, Some(&reader))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = "/api/users/999999999/subscribe/";
    let (status, _) = send(&api, request("DELETE", unknown, Some(&reader))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&api, request("POST", unknown, Some(&reader))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "needs FOODGRAM_TEST_DATABASE_URL"]
async fn logout_revokes_tokens() {
    let media = tempfile::tempdir().unwrap();
    let state = database_state(media.path()).await;
    let suffix = unique();
    let api = routes(state.clone());
    let (id, token) = sign_up(&api, &format!("leaver_{suffix}")).await;

    let (status, me) = send(&api, request("GET", "/api/users/me/", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], id);

    let (status, _) = send(&api, request("POST", "/api/auth/token/logout/", Some(&token))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&api, request("GET", "/api/users/me/", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &api,
        request("POST", "/api/users/", None).json(&json!({
            "email": format!("leaver_{suffix}@example.com"),
            "username": format!("other_{suffix}"),
            "first_name": "a",
            "last_name": "b",
            "password": "pass",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["email"].is_array());
}

#[tokio::test]
#[ignore = "needs FOODGRAM_TEST_DATABASE_URL"]
async fn ingredient_search_matches_prefix_only() {
    let media = tempfile::tempdir().unwrap();
    let state = database_state(media.path()).await;
    let suffix = unique();
    catalog(&state, &suffix).await;

    let found = search_ingredients("мол", &state.pool).await.unwrap();
    assert!(found.iter().any(|i| i.name == format!("молоко {suffix}")));
    assert!(found.iter().all(|i| i.name.to_lowercase().starts_with("мол")));

    let api = routes(state.clone());
    let search = request("GET", "/api/ingredients/?name=%D0%9C%D0%9E%D0%9B", None);
    let (status, body) = send(&api, search).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&format!("молоко {suffix}").as_str()));
    assert!(!names.contains(&format!("сыр {suffix}").as_str()));
}
