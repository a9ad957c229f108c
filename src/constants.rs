pub const DEFAULT_PAGE_SIZE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const MAX_LEN_EMAIL: usize = 254;
pub const MAX_LEN_USER_FIELD: usize = 150;
pub const MAX_LEN_TAG_FIELD: usize = 64;
pub const MAX_LEN_INGREDIENT_NAME: usize = 64;
pub const MAX_LEN_MEASUREMENT_UNIT: usize = 256;
pub const MAX_LEN_RECIPE_NAME: usize = 200;

pub const MIN_COOKING_TIME: i64 = 1;
pub const MIN_AMOUNT: i64 = 1;

/// Usernames that would shadow `/users/<name>/` routes.
pub const RESERVED_USERNAMES: &[&str] = &["me"];

pub const IMAGE_FORMATS: &[(&str, &str)] = &[
    ("png", "png"),
    ("jpeg", "jpg"),
    ("jpg", "jpg"),
    ("gif", "gif"),
    ("webp", "webp"),
];

pub const RECIPE_IMAGE_DIR: &str = "recipes/images";

pub const SHOPPING_LIST_DATE_FORMAT: &str = "%d.%m.%Y %H:%M";
pub const SHOPPING_LIST_HEADER: &str = "Список покупок для:";
pub const SHOPPING_LIST_FOOTER: &str = "Посчитано в Foodgram";

pub const TAG_CACHE_KEY: &str = "tag-cache-key";
pub const INGREDIENT_CACHE_KEY: &str = "ingredient-cache-key";
/// Seconds an ingredient search result stays in redis.
pub const INGREDIENT_SEARCH_TTL: u64 = 10 * 60;
