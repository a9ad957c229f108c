use std::{collections::HashSet, sync::OnceLock};

use regex::Regex;

use crate::{
    constants::{
        MAX_LEN_EMAIL, MAX_LEN_INGREDIENT_NAME, MAX_LEN_MEASUREMENT_UNIT, MAX_LEN_RECIPE_NAME,
        MAX_LEN_TAG_FIELD, MAX_LEN_USER_FIELD, MIN_AMOUNT, MIN_COOKING_TIME, RESERVED_USERNAMES,
    },
    error::ValidationErrors,
    media::{decode_data_uri, DecodedImage},
    schema::{NewIngredient, NewTag, Uuid},
    serializers::{RecipeWrite, UserCreate},
};

/// Largest value a `SMALLINT` column holds.
pub const MAX_SMALL_INT: i64 = i16::MAX as i64;

const REQUIRED: &str = "This field is required.";

/// Which fields a recipe write must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// `POST`: everything, including the image.
    Create,
    /// `PUT`: everything except the image, which is kept when omitted.
    Replace,
    /// `PATCH`: any subset.
    Partial,
}

impl WriteMode {
    fn requires(&self, field: &str) -> bool {
        match self {
            WriteMode::Create => true,
            WriteMode::Replace => field != "image",
            WriteMode::Partial => false,
        }
    }
}

/// Ids from the payload that exist in the database.
#[derive(Debug, Clone, Default)]
pub struct KnownReferences {
    pub ingredients: HashSet<Uuid>,
    pub tags: HashSet<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientLine {
    pub id: Uuid,
    pub amount: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ValidatedRecipe {
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image: Option<DecodedImage>,
    pub ingredients: Option<Vec<IngredientLine>>,
    pub tags: Option<Vec<Uuid>>,
}

/// Ingredient and tag ids mentioned by the payload that fit an id column,
/// for looking up `KnownReferences`.
pub fn referenced_ids(payload: &RecipeWrite) -> (Vec<Uuid>, Vec<Uuid>) {
    let ingredients = payload
        .ingredients
        .iter()
        .flatten()
        .filter_map(|i| i.id)
        .filter_map(|id| Uuid::try_from(id).ok())
        .collect();
    let tags = payload
        .tags
        .iter()
        .flatten()
        .filter_map(|id| Uuid::try_from(*id).ok())
        .collect();

    (ingredients, tags)
}

/// Checks a recipe payload. Collects every problem instead of stopping at the
/// first one; touches nothing outside its arguments.
pub fn validate_recipe(
    payload: RecipeWrite,
    mode: WriteMode,
    known: &KnownReferences,
) -> Result<ValidatedRecipe, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut recipe = ValidatedRecipe::default();

    match payload.name.map(|n| n.trim().to_owned()) {
        Some(name) if name.is_empty() => errors.add("name", "This field may not be blank."),
        Some(name) if name.chars().count() > MAX_LEN_RECIPE_NAME => errors.add(
            "name",
            format!("Ensure this field has no more than {MAX_LEN_RECIPE_NAME} characters."),
        ),
        Some(name) => recipe.name = Some(name),
        None if mode.requires("name") => errors.add("name", REQUIRED),
        None => {}
    }

    match payload.text {
        Some(text) if text.trim().is_empty() => {
            errors.add("text", "This field may not be blank.")
        }
        Some(text) => recipe.text = Some(text),
        None if mode.requires("text") => errors.add("text", REQUIRED),
        None => {}
    }

    match payload.cooking_time {
        Some(time) if time < MIN_COOKING_TIME => errors.add(
            "cooking_time",
            format!("Cooking time must be at least {MIN_COOKING_TIME} minute."),
        ),
        Some(time) if time > MAX_SMALL_INT => errors.add(
            "cooking_time",
            format!("Cooking time must be at most {MAX_SMALL_INT} minutes."),
        ),
        Some(time) => recipe.cooking_time = Some(time as i32),
        None if mode.requires("cooking_time") => errors.add("cooking_time", REQUIRED),
        None => {}
    }

    match payload.image {
        Some(image) => match decode_data_uri(&image) {
            Ok(image) => recipe.image = Some(image),
            Err(e) => errors.add("image", e.info()),
        },
        None if mode.requires("image") => errors.add("image", REQUIRED),
        None => {}
    }

    match payload.ingredients {
        Some(ingredients) => {
            recipe.ingredients = validate_ingredients(&ingredients, known, &mut errors)
        }
        None if mode.requires("ingredients") => errors.add("ingredients", REQUIRED),
        None => {}
    }

    match payload.tags {
        Some(tags) => recipe.tags = validate_tags(&tags, known, &mut errors),
        None if mode.requires("tags") => errors.add("tags", REQUIRED),
        None => {}
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(recipe)
}

fn validate_ingredients(
    ingredients: &[crate::serializers::IngredientInput],
    known: &KnownReferences,
    errors: &mut ValidationErrors,
) -> Option<Vec<IngredientLine>> {
    if ingredients.is_empty() {
        errors.add("ingredients", "At least one ingredient is required.");
        return None;
    }

    let mut seen = HashSet::new();
    let mut lines = Vec::with_capacity(ingredients.len());
    let mut valid = true;

    for ingredient in ingredients {
        let Some(id) = ingredient.id else {
            errors.add("ingredients", "Ingredient id is missing.");
            valid = false;
            continue;
        };
        let id = match Uuid::try_from(id) {
            Ok(id) if known.ingredients.contains(&id) => id,
            _ => {
                errors.add("ingredients", format!("Ingredient {id} does not exist."));
                valid = false;
                continue;
            }
        };
        if !seen.insert(id) {
            errors.add("ingredients", format!("Ingredient {id} is listed twice."));
            valid = false;
            continue;
        }

        match ingredient.amount {
            Some(amount) if amount < MIN_AMOUNT => {
                errors.add(
                    "amount",
                    format!("Amount must be at least {MIN_AMOUNT}."),
                );
                valid = false;
            }
            Some(amount) if amount > MAX_SMALL_INT => {
                errors.add("amount", format!("Amount must be at most {MAX_SMALL_INT}."));
                valid = false;
            }
            Some(amount) => lines.push(IngredientLine {
                id,
                amount: amount as i32,
            }),
            None => {
                errors.add("amount", REQUIRED);
                valid = false;
            }
        }
    }

    valid.then_some(lines)
}

fn validate_tags(
    tags: &[i64],
    known: &KnownReferences,
    errors: &mut ValidationErrors,
) -> Option<Vec<Uuid>> {
    if tags.is_empty() {
        errors.add("tags", "At least one tag is required.");
        return None;
    }

    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(tags.len());
    let mut valid = true;

    for &tag in tags {
        let id = match Uuid::try_from(tag) {
            Ok(id) if known.tags.contains(&id) => id,
            _ => {
                errors.add("tags", format!("Tag {tag} does not exist."));
                valid = false;
                continue;
            }
        };
        if !seen.insert(id) {
            errors.add("tags", format!("Tag {id} is listed twice."));
            valid = false;
            continue;
        }
        ids.push(id);
    }

    valid.then_some(ids)
}

fn username_regex() -> &'static Regex {
    static USERNAME: OnceLock<Regex> = OnceLock::new();
    USERNAME.get_or_init(|| Regex::new(r"^[\w.@+-]+$").expect("hard-coded pattern"))
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("hard-coded pattern"))
}

fn color_regex() -> &'static Regex {
    static COLOR: OnceLock<Regex> = OnceLock::new();
    COLOR.get_or_init(|| {
        Regex::new(r"^#(?:[0-9a-fA-F]{3}){1,2}$").expect("hard-coded pattern")
    })
}

fn slug_regex() -> &'static Regex {
    static SLUG: OnceLock<Regex> = OnceLock::new();
    SLUG.get_or_init(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("hard-coded pattern"))
}

pub fn validate_username(username: &str, errors: &mut ValidationErrors) {
    if username.chars().count() > MAX_LEN_USER_FIELD {
        errors.add(
            "username",
            format!("Ensure this field has no more than {MAX_LEN_USER_FIELD} characters."),
        );
    } else if !username_regex().is_match(username) {
        errors.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    } else if RESERVED_USERNAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(username))
    {
        errors.add("username", format!("Username {username:?} is not allowed."));
    }
}

pub fn validate_email(email: &str, errors: &mut ValidationErrors) {
    if email.chars().count() > MAX_LEN_EMAIL {
        errors.add(
            "email",
            format!("Ensure this field has no more than {MAX_LEN_EMAIL} characters."),
        );
    } else if !email_regex().is_match(email) {
        errors.add("email", "Enter a valid email address.");
    }
}

pub fn validate_password(password: &str, field: &str, errors: &mut ValidationErrors) {
    if password.trim().is_empty() {
        errors.add(field, "This field may not be blank.");
    } else if password.chars().count() > MAX_LEN_USER_FIELD {
        errors.add(
            field,
            format!("Ensure this field has no more than {MAX_LEN_USER_FIELD} characters."),
        );
    }
}

/// Registration fields after trimming (except the password), in the order the
/// insert expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

pub fn validate_user(payload: UserCreate) -> Result<ValidatedUser, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let mut required = |field: &str, value: Option<String>| -> String {
        match value.map(|v| v.trim().to_owned()) {
            Some(v) if !v.is_empty() => v,
            Some(_) => {
                errors.add(field, "This field may not be blank.");
                String::new()
            }
            None => {
                errors.add(field, REQUIRED);
                String::new()
            }
        }
    };

    let email = required("email", payload.email).to_lowercase();
    let username = required("username", payload.username);
    let first_name = required("first_name", payload.first_name);
    let last_name = required("last_name", payload.last_name);

    // Passwords are stored exactly as sent; login compares the raw value.
    let password = match payload.password {
        Some(password) if password.trim().is_empty() => {
            errors.add("password", "This field may not be blank.");
            String::new()
        }
        Some(password) => password,
        None => {
            errors.add("password", REQUIRED);
            String::new()
        }
    };

    if !email.is_empty() {
        validate_email(&email, &mut errors);
    }
    if !username.is_empty() {
        validate_username(&username, &mut errors);
    }
    for (field, value) in [("first_name", &first_name), ("last_name", &last_name)] {
        if value.chars().count() > MAX_LEN_USER_FIELD {
            errors.add(
                field,
                format!("Ensure this field has no more than {MAX_LEN_USER_FIELD} characters."),
            );
        }
    }
    if !password.is_empty() {
        validate_password(&password, "password", &mut errors);
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(ValidatedUser {
        email,
        username,
        first_name,
        last_name,
        password,
    })
}

pub fn validate_tag(tag: &NewTag) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if tag.name.trim().is_empty() || tag.name.chars().count() > MAX_LEN_TAG_FIELD {
        errors.add("name", format!("Name must be 1 to {MAX_LEN_TAG_FIELD} characters."));
    }
    if !color_regex().is_match(&tag.color) {
        errors.add("color", "Enter a valid hex color, e.g. #49B64E.");
    }
    if tag.slug.chars().count() > MAX_LEN_TAG_FIELD || !slug_regex().is_match(&tag.slug) {
        errors.add(
            "slug",
            "Enter a valid slug consisting of letters, numbers, underscores or hyphens.",
        );
    }

    errors.into_result()
}

pub fn validate_ingredient(ingredient: &NewIngredient) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let name = ingredient.name.trim();
    if name.is_empty() || name.chars().count() > MAX_LEN_INGREDIENT_NAME {
        errors.add(
            "name",
            format!("Name must be 1 to {MAX_LEN_INGREDIENT_NAME} characters."),
        );
    }
    let unit = ingredient.measurement_unit.trim();
    if unit.is_empty() || unit.chars().count() > MAX_LEN_MEASUREMENT_UNIT {
        errors.add(
            "measurement_unit",
            format!("Measurement unit must be 1 to {MAX_LEN_MEASUREMENT_UNIT} characters."),
        );
    }

    errors.into_result()
}
