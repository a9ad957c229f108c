use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::{
    constants::{SHOPPING_LIST_DATE_FORMAT, SHOPPING_LIST_FOOTER, SHOPPING_LIST_HEADER},
    error::{Error, HtmlError, QueryError},
    schema::{RecipePart, ShoppingListItem, Uuid},
};

use super::recipes::list_recipe_parts;

use sqlx::{Pool, Postgres};

/// Sums amounts per (name, unit), ordered by name then unit. The same
/// ingredient in another unit stays a separate line.
pub fn sum_recipe_parts(parts: &[RecipePart]) -> Vec<ShoppingListItem> {
    let mut totals: BTreeMap<(&str, &str), i64> = BTreeMap::new();
    for part in parts {
        *totals
            .entry((part.name.as_str(), part.measurement_unit.as_str()))
            .or_default() += i64::from(part.amount);
    }

    totals
        .into_iter()
        .map(|((name, unit), amount)| ShoppingListItem {
            name: name.to_owned(),
            measurement_unit: unit.to_owned(),
            amount,
        })
        .collect()
}

/// Ingredient totals over every recipe in the user's cart.
pub async fn aggregate_shopping_cart(
    user_id: Uuid,
    pool: &Pool<Postgres>,
) -> Result<Vec<ShoppingListItem>, Error> {
    let recipe_ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT recipe_id FROM shopping_carts WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;

    let parts = list_recipe_parts(&recipe_ids, pool).await?;
    Ok(sum_recipe_parts(&parts))
}

pub fn render_shopping_list(
    first_name: &str,
    items: &[ShoppingListItem],
    generated_at: NaiveDateTime,
) -> String {
    let mut lines = vec![format!(
        "{SHOPPING_LIST_HEADER}\n\n{first_name}\n{}\n",
        generated_at.format(SHOPPING_LIST_DATE_FORMAT)
    )];
    lines.extend(
        items
            .iter()
            .map(|item| format!("{}: {} {}", item.name, item.amount, item.measurement_unit)),
    );
    lines.push(format!("\n{SHOPPING_LIST_FOOTER}"));

    lines.join("\n")
}

pub fn shopping_list_filename(username: &str) -> String {
    format!("{username}_shopping_list.txt")
}

/// Renders the cart of `user_id`; an empty cart is refused.
pub async fn download_shopping_list(
    user_id: Uuid,
    first_name: &str,
    generated_at: NaiveDateTime,
    pool: &Pool<Postgres>,
) -> Result<String, Error> {
    let items = aggregate_shopping_cart(user_id, pool).await?;
    if items.is_empty() {
        return Err(HtmlError::InvalidRequest.new("Shopping cart is empty"));
    }

    Ok(render_shopping_list(first_name, &items, generated_at))
}
