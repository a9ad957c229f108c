use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::generate_jwt_session,
    },
    config::Config,
    error::{Error, HtmlError, QueryError, ValidationErrors},
    pagination::PageRequest,
    schema::{NewUser, User, UserRow, Uuid},
    serializers::SetPassword,
    validators::{validate_password, ValidatedUser},
};

use sqlx::{Pool, Postgres};

const INVALID_CREDENTIALS: &str = "Unable to log in with provided credentials.";

pub async fn get_user_by_id(pool: &Pool<Postgres>, user_id: Uuid) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_user_by_email(pool: &Pool<Postgres>, email: &str) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = LOWER($1)")
        .bind(email.trim())
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Hashes the password of an already validated registration.
pub fn prepare_user(user: ValidatedUser) -> Result<NewUser, Error> {
    Ok(NewUser {
        password_hash: hash_password(&user.password)?,
        email: user.email,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
    })
}

fn duplicate_user_errors(email_taken: bool, username_taken: bool) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    if email_taken {
        errors.add("email", "A user with that email already exists.");
    }
    if username_taken {
        errors.add("username", "A user with that username already exists.");
    }
    errors
}

/// Inserts a new user. Taken emails or usernames are reported per field.
pub async fn register_user(user: &NewUser, pool: &Pool<Postgres>) -> Result<User, Error> {
    let taken: (bool, bool) = sqlx::query_as(
        "
        SELECT
            EXISTS(SELECT 1 FROM users WHERE email = $1),
            EXISTS(SELECT 1 FROM users WHERE username = $2)
    ",
    )
    .bind(&user.email)
    .bind(&user.username)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    if taken.0 || taken.1 {
        return Err(duplicate_user_errors(taken.0, taken.1).into());
    }

    let row: User = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
    ",
    )
    .bind(&user.email)
    .bind(&user.username)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.password_hash)
    .fetch_one(pool)
    .await
    .map_err(|e| match QueryError::from(e) {
        // Lost a race against a concurrent registration.
        QueryError::Conflict(constraint) => {
            let email = constraint.contains("email");
            duplicate_user_errors(email, !email).into()
        }
        e => Error::from(e),
    })?;

    log::info!("Registered user {}", row.username);
    Ok(row)
}

pub async fn login_user(
    email: &str,
    password: &str,
    config: &Config,
    pool: &Pool<Postgres>,
) -> Result<String, Error> {
    let user = get_user_by_email(pool, email)
        .await?
        .ok_or_else(|| HtmlError::InvalidRequest.new(INVALID_CREDENTIALS))?;

    if !verify_password(password, &user.password) {
        return Err(HtmlError::InvalidRequest.new(INVALID_CREDENTIALS));
    }

    generate_jwt_session(&user, &config.jwt_secret, config.token_lifetime_hours)
}

/// Revokes every token issued to the user so far.
pub async fn logout_user(user_id: Uuid, pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::query("UPDATE users SET token_version = token_version + 1 WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

/// Changes the password after checking the current one; issued tokens are
/// revoked.
pub async fn set_password(
    user_id: Uuid,
    payload: &SetPassword,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let user = get_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| HtmlError::NotFound.default())?;

    let mut errors = ValidationErrors::new();
    validate_password(&payload.new_password, "new_password", &mut errors);
    if !verify_password(&payload.current_password, &user.password) {
        errors.add("current_password", "Invalid password.");
    }
    errors.into_result()?;

    let password_hash = hash_password(&payload.new_password)?;
    sqlx::query(
        "UPDATE users SET password = $2, token_version = token_version + 1 WHERE id = $1",
    )
    .bind(user_id)
    .bind(password_hash)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(())
}

/// Users ordered by username, with `is_subscribed` relative to `viewer`.
pub async fn fetch_users(
    viewer: Option<Uuid>,
    request: PageRequest,
    pool: &Pool<Postgres>,
) -> Result<Vec<UserRow>, Error> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
            EXISTS(
                SELECT 1 FROM follows f WHERE f.user_id = $1 AND f.author_id = u.id
            ) AS is_subscribed,
            COUNT(*) OVER() AS count
        FROM users u
        ORDER BY u.username, u.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(viewer)
    .bind(request.limit)
    .bind(request.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn get_user_profile(
    user_id: Uuid,
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<Option<UserRow>, Error> {
    let row: Option<UserRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
            EXISTS(
                SELECT 1 FROM follows f WHERE f.user_id = $2 AND f.author_id = u.id
            ) AS is_subscribed
        FROM users u
        WHERE u.id = $1
    ",
    )
    .bind(user_id)
    .bind(viewer)
    .fetch_optional(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row)
}

/// Profiles for `ids`, in no particular order.
pub async fn list_user_profiles(
    ids: &[Uuid],
    viewer: Option<Uuid>,
    pool: &Pool<Postgres>,
) -> Result<Vec<UserRow>, Error> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
            EXISTS(
                SELECT 1 FROM follows f WHERE f.user_id = $2 AND f.author_id = u.id
            ) AS is_subscribed
        FROM users u
        WHERE u.id = ANY($1)
    ",
    )
    .bind(ids)
    .bind(viewer)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{serializers::UserCreate, validators::validate_user};

    #[test]
    fn duplicate_errors_name_the_taken_fields() {
        let errors = duplicate_user_errors(true, false);
        assert!(errors.contains("email"));
        assert!(!errors.contains("username"));

        let errors = duplicate_user_errors(true, true);
        assert!(errors.contains("email") && errors.contains("username"));
    }

    #[test]
    fn prepared_users_carry_a_hash() {
        let user = prepare_user(ValidatedUser {
            email: "chef@example.com".to_owned(),
            username: "chef".to_owned(),
            first_name: "Anna".to_owned(),
            last_name: "Ivanova".to_owned(),
            password: "s3cret-pass".to_owned(),
        })
        .unwrap();

        assert_ne!(user.password_hash, "s3cret-pass");
        assert!(verify_password("s3cret-pass", &user.password_hash));
    }

    #[test]
    fn registered_password_logs_in_verbatim() {
        let user = validate_user(UserCreate {
            email: Some("chef@example.com".to_owned()),
            username: Some("chef".to_owned()),
            first_name: Some("Anna".to_owned()),
            last_name: Some("Ivanova".to_owned()),
            password: Some("  s3cret pass  ".to_owned()),
        })
        .unwrap();
        let user = prepare_user(user).unwrap();

        assert!(verify_password("  s3cret pass  ", &user.password_hash));
        assert!(!verify_password("s3cret pass", &user.password_hash));
    }
}
