use std::collections::{HashMap, HashSet};

use crate::{
    authentication::permissions::ActionType,
    config::Config,
    error::{Error, HtmlError, QueryError, TypeError, ValidationErrors},
    form::Form,
    jwt::SessionData,
    media::{image_url, remove_image, store_image},
    pagination::PageRequest,
    schema::{Recipe, RecipeList, RecipePart, RecipeRow, Tag, Uuid},
    serializers::{IngredientAmountRead, RecipeRead, RecipeWrite, UserRead},
    validators::{referenced_ids, IngredientLine, KnownReferences, ValidatedRecipe},
};

use super::{
    ingredients::existing_ingredient_ids,
    tags::{existing_tag_ids, list_tags_for_recipes},
    users::list_user_profiles,
};

use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

/// Narrows `GET /recipes/`. The per-user filters hold the id of the
/// requesting user and stay `None` for anonymous requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    /// Tag slugs; a recipe matches when it carries any of them.
    pub tags: Vec<String>,
    pub author: Option<Uuid>,
    pub favorited_by: Option<Uuid>,
    pub in_cart_of: Option<Uuid>,
}

impl RecipeFilter {
    pub fn from_form(form: &Form, viewer: Option<Uuid>) -> Result<Self, TypeError> {
        let is_favorited = form.get_flag("is_favorited")?;
        let is_in_shopping_cart = form.get_flag("is_in_shopping_cart")?;

        Ok(Self {
            tags: form.get_all("tags"),
            author: form.get_number::<Uuid>("author")?,
            favorited_by: viewer.filter(|_| is_favorited),
            in_cart_of: viewer.filter(|_| is_in_shopping_cart),
        })
    }
}

/// Newest first, with the total number of matches in every row.
pub async fn fetch_recipes(
    filter: &RecipeFilter,
    request: PageRequest,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeRow>, Error> {
    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    if let Some(author) = filter.author {
        query_builder.push(" AND r.author_id = ").push_bind(author);
    }
    if !filter.tags.is_empty() {
        query_builder
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(&filter.tags)
            .push("))");
    }
    for (list, user_id) in [
        (RecipeList::Favorites, filter.favorited_by),
        (RecipeList::ShoppingCart, filter.in_cart_of),
    ] {
        if let Some(user_id) = user_id {
            query_builder
                .push(format!(
                    " AND EXISTS (SELECT 1 FROM {} l WHERE l.recipe_id = r.id AND l.user_id = ",
                    list.table()
                ))
                .push_bind(user_id)
                .push(")");
        }
    }

    query_builder
        .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
        .push_bind(request.limit)
        .push(" OFFSET ")
        .push_bind(request.offset());

    let rows: Vec<RecipeRow> = query_builder
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn get_recipe(id: Uuid, pool: &Pool<Postgres>) -> Result<Option<Recipe>, Error> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Loads a recipe the session is about to change: 404 when it does not
/// exist, 403 when the session is neither its author nor an admin.
pub async fn get_recipe_mut(
    id: Uuid,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    let recipe = get_recipe(id, pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.default())?;

    session.authenticate(ActionType::ManageOwnRecipes)?;
    session.authorize_owner(recipe.author_id, ActionType::ManageAllRecipes)?;

    Ok(recipe)
}

/// Ingredient lines of every recipe in `recipe_ids`, in insertion order.
pub async fn list_recipe_parts(
    recipe_ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipePart>, Error> {
    let rows: Vec<RecipePart> = sqlx::query_as(
        "
        SELECT ia.recipe_id, ia.ingredient_id, i.name, i.measurement_unit, ia.amount
        FROM ingredient_amounts ia
        INNER JOIN ingredients i ON i.id = ia.ingredient_id
        WHERE ia.recipe_id = ANY($1)
        ORDER BY ia.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

/// Which of `recipe_ids` the user has put on `list`.
pub async fn listed_recipe_ids(
    list: RecipeList,
    user_id: Uuid,
    recipe_ids: &[Uuid],
    pool: &Pool<Postgres>,
) -> Result<HashSet<Uuid>, Error> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(&format!(
        "SELECT recipe_id FROM {} WHERE user_id = $1 AND recipe_id = ANY($2)",
        list.table()
    ))
    .bind(user_id)
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

/// Looks up which ingredient and tag ids of the payload exist.
pub async fn known_references(
    payload: &RecipeWrite,
    pool: &Pool<Postgres>,
) -> Result<KnownReferences, Error> {
    let (ingredients, tags) = referenced_ids(payload);

    Ok(KnownReferences {
        ingredients: existing_ingredient_ids(&ingredients, pool).await?,
        tags: existing_tag_ids(&tags, pool).await?,
    })
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, Error> {
    value.ok_or_else(|| {
        let mut errors = ValidationErrors::new();
        errors.add(field, "This field is required.");
        errors.into()
    })
}

async fn insert_recipe_parts(
    recipe_id: Uuid,
    lines: &[IngredientLine],
    conn: &mut PgConnection,
) -> Result<(), Error> {
    if lines.is_empty() {
        return Ok(());
    }

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO ingredient_amounts (recipe_id, ingredient_id, amount) ");
    query_builder.push_values(lines, |mut b, line| {
        b.push_bind(recipe_id)
            .push_bind(line.id)
            .push_bind(line.amount);
    });

    query_builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

async fn insert_recipe_tags(
    recipe_id: Uuid,
    tags: &[Uuid],
    conn: &mut PgConnection,
) -> Result<(), Error> {
    if tags.is_empty() {
        return Ok(());
    }

    let mut query_builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
    query_builder.push_values(tags, |mut b, tag| {
        b.push_bind(recipe_id).push_bind(*tag);
    });
    query_builder.push(" ON CONFLICT DO NOTHING");

    query_builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

async fn insert_recipe(
    author_id: Uuid,
    recipe: ValidatedRecipe,
    image: &str,
    pool: &Pool<Postgres>,
) -> Result<Uuid, Error> {
    let name = required(recipe.name, "name")?;
    let text = required(recipe.text, "text")?;
    let cooking_time = required(recipe.cooking_time, "cooking_time")?;
    let ingredients = required(recipe.ingredients, "ingredients")?;
    let tags = required(recipe.tags, "tags")?;

    let mut tx = pool.begin().await.map_err(QueryError::from)?;

    let id: (Uuid,) = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
    ",
    )
    .bind(author_id)
    .bind(name)
    .bind(image)
    .bind(text)
    .bind(cooking_time)
    .fetch_one(&mut *tx)
    .await
    .map_err(QueryError::from)?;

    insert_recipe_parts(id.0, &ingredients, &mut *tx).await?;
    insert_recipe_tags(id.0, &tags, &mut *tx).await?;

    tx.commit().await.map_err(QueryError::from)?;

    Ok(id.0)
}

/// Stores the image and inserts the recipe with its ingredient lines and tags
/// in one transaction. The image is removed again when the insert fails.
pub async fn create_recipe(
    author_id: Uuid,
    mut recipe: ValidatedRecipe,
    config: &Config,
    pool: &Pool<Postgres>,
) -> Result<Uuid, Error> {
    let image = required(recipe.image.take(), "image")?;
    let image = store_image(&config.media_root, &image).await?;

    match insert_recipe(author_id, recipe, &image, pool).await {
        Ok(id) => {
            log::info!("Recipe {id} created by user {author_id}");
            Ok(id)
        }
        Err(e) => {
            remove_image(&config.media_root, &image).await;
            Err(e)
        }
    }
}

async fn apply_recipe_update(
    recipe_id: Uuid,
    update: ValidatedRecipe,
    image: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let mut tx = pool.begin().await.map_err(QueryError::from)?;

    sqlx::query(
        "
        UPDATE recipes SET
            name = COALESCE($2, name),
            text = COALESCE($3, text),
            cooking_time = COALESCE($4, cooking_time),
            image = COALESCE($5, image)
        WHERE id = $1
    ",
    )
    .bind(recipe_id)
    .bind(update.name)
    .bind(update.text)
    .bind(update.cooking_time)
    .bind(image)
    .execute(&mut *tx)
    .await
    .map_err(QueryError::from)?;

    if let Some(ingredients) = update.ingredients {
        sqlx::query("DELETE FROM ingredient_amounts WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *tx)
            .await
            .map_err(QueryError::from)?;
        insert_recipe_parts(recipe_id, &ingredients, &mut *tx).await?;
    }

    if let Some(tags) = update.tags {
        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *tx)
            .await
            .map_err(QueryError::from)?;
        insert_recipe_tags(recipe_id, &tags, &mut *tx).await?;
    }

    tx.commit().await.map_err(QueryError::from)?;

    Ok(())
}

/// Applies the fields present in `update`. Ingredient lines and tags, when
/// given, replace the current sets. A replaced image file is removed.
pub async fn update_recipe(
    recipe: &Recipe,
    mut update: ValidatedRecipe,
    config: &Config,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let image = match update.image.take() {
        Some(image) => Some(store_image(&config.media_root, &image).await?),
        None => None,
    };

    if let Err(e) = apply_recipe_update(recipe.id, update, image.as_deref(), pool).await {
        if let Some(image) = &image {
            remove_image(&config.media_root, image).await;
        }
        return Err(e);
    }

    if image.is_some() {
        remove_image(&config.media_root, &recipe.image).await;
    }

    Ok(())
}

pub async fn delete_recipe(
    recipe: &Recipe,
    config: &Config,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe.id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    remove_image(&config.media_root, &recipe.image).await;
    log::info!("Recipe {} deleted", recipe.id);

    Ok(())
}

/// Assembles full read shapes for `recipes`, keeping their order. Authors,
/// tags, ingredient lines and the viewer's list flags are fetched in one
/// query each.
pub async fn build_recipe_reads(
    recipes: Vec<Recipe>,
    viewer: Option<Uuid>,
    media_url: &str,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeRead>, Error> {
    if recipes.is_empty() {
        return Ok(vec![]);
    }

    let recipe_ids: Vec<Uuid> = recipes.iter().map(|r| r.id).collect();
    let mut author_ids: Vec<Uuid> = recipes.iter().map(|r| r.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let authors: HashMap<Uuid, UserRead> = list_user_profiles(&author_ids, viewer, pool)
        .await?
        .into_iter()
        .map(|row| (row.id, UserRead::from(row)))
        .collect();

    let mut tags: HashMap<Uuid, Vec<Tag>> = HashMap::new();
    for tag in list_tags_for_recipes(&recipe_ids, pool).await? {
        tags.entry(tag.recipe_id).or_default().push(tag.into());
    }

    let mut parts: HashMap<Uuid, Vec<IngredientAmountRead>> = HashMap::new();
    for part in list_recipe_parts(&recipe_ids, pool).await? {
        parts.entry(part.recipe_id).or_default().push(part.into());
    }

    let (favorited, in_cart) = match viewer {
        Some(user_id) => (
            listed_recipe_ids(RecipeList::Favorites, user_id, &recipe_ids, pool).await?,
            listed_recipe_ids(RecipeList::ShoppingCart, user_id, &recipe_ids, pool).await?,
        ),
        None => (HashSet::new(), HashSet::new()),
    };

    recipes
        .into_iter()
        .map(|recipe| -> Result<RecipeRead, Error> {
            let author = authors.get(&recipe.author_id).cloned().ok_or_else(|| {
                log::error!("Author {} of recipe {} is missing", recipe.author_id, recipe.id);
                HtmlError::InternalServerError.default()
            })?;

            Ok(RecipeRead {
                id: recipe.id,
                tags: tags.remove(&recipe.id).unwrap_or_default(),
                author,
                ingredients: parts.remove(&recipe.id).unwrap_or_default(),
                is_favorited: favorited.contains(&recipe.id),
                is_in_shopping_cart: in_cart.contains(&recipe.id),
                image: image_url(media_url, &recipe.image),
                name: recipe.name,
                text: recipe.text,
                cooking_time: recipe.cooking_time,
            })
        })
        .collect()
}

pub async fn get_recipe_read(
    id: Uuid,
    viewer: Option<Uuid>,
    media_url: &str,
    pool: &Pool<Postgres>,
) -> Result<Option<RecipeRead>, Error> {
    let Some(recipe) = get_recipe(id, pool).await? else {
        return Ok(None);
    };

    let mut reads = build_recipe_reads(vec![recipe], viewer, media_url, pool).await?;
    Ok(reads.pop())
}
