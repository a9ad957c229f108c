//! Wire shapes. Read shapes are what the API returns, write shapes are what
//! it accepts; a handler always picks one of each explicitly.

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::schema::{Ingredient, Recipe, RecipePart, Tag, User, UserRow, Uuid};

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UserRead {
    pub email: String,
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl From<UserRow> for UserRead {
    fn from(row: UserRow) -> Self {
        Self {
            email: row.email,
            id: row.id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            is_subscribed: row.is_subscribed,
        }
    }
}

/// Returned by registration; no `is_subscribed`.
#[derive(Serialize, Debug, Clone)]
pub struct UserCreated {
    pub email: String,
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&User> for UserCreated {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.to_owned(),
            id: user.id,
            username: user.username.to_owned(),
            first_name: user.first_name.to_owned(),
            last_name: user.last_name.to_owned(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IngredientAmountRead {
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

impl From<RecipePart> for IngredientAmountRead {
    fn from(part: RecipePart) -> Self {
        Self {
            id: part.ingredient_id,
            name: part.name,
            measurement_unit: part.measurement_unit,
            amount: part.amount,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct RecipeRead {
    pub id: Uuid,
    pub tags: Vec<Tag>,
    pub author: UserRead,
    pub ingredients: Vec<IngredientAmountRead>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ShortRecipe {
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl ShortRecipe {
    pub fn from_recipe(recipe: &Recipe, media_url: &str) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.to_owned(),
            image: crate::media::image_url(media_url, &recipe.image),
            cooking_time: recipe.cooking_time,
        }
    }
}

/// An author as seen from the subscriptions endpoints.
#[derive(Serialize, Debug, Clone)]
pub struct FollowRead {
    #[serde(flatten)]
    pub author: UserRead,
    pub recipes: Vec<ShortRecipe>,
    pub recipes_count: i64,
}

#[derive(Serialize, Debug, Clone)]
pub struct TokenRead {
    pub auth_token: String,
}

pub type TagRead = Tag;
pub type IngredientRead = Ingredient;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct IngredientInput {
    #[serde(default, deserialize_with = "lenient_int")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub amount: Option<i64>,
}

/// Recipe write payload. Every field is optional here; which ones are
/// required depends on the write mode (see `validators::WriteMode`).
#[derive(Deserialize, Debug, Clone, Default)]
pub struct RecipeWrite {
    pub ingredients: Option<Vec<IngredientInput>>,
    pub tags: Option<Vec<i64>>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub cooking_time: Option<i64>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct UserCreate {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SetPassword {
    pub new_password: String,
    pub current_password: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TokenCreate {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientInt {
    Int(i64),
    Text(String),
}

/// Accepts `5` as well as `"5"`; forms and some clients send numbers as
/// strings.
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<LenientInt>::deserialize(deserializer)? {
        None => Ok(None),
        Some(LenientInt::Int(value)) => Ok(Some(value)),
        Some(LenientInt::Text(value)) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("A valid integer is required, got {value:?}"))),
    }
}
