use warp::{
    http::StatusCode,
    reject::Rejection,
    reply::{self, Reply, Response},
};

use crate::{
    actions::{
        build_follow_reads, fetch_subscriptions, fetch_users, follow_author, get_user_profile,
        login_user, logout_user, prepare_user, register_user, set_password, unfollow_author,
    },
    error::{Error, HtmlError, TypeError},
    form::{Form, FormData},
    jwt::SessionData,
    pagination::{PageContext, PageRequest},
    permissions::ActionType,
    schema::Uuid,
    serializers::{SetPassword, TokenCreate, TokenRead, UserCreate, UserCreated, UserRead},
    state::State,
    validators::validate_user,
};

/// `?recipes_limit=` of the subscription endpoints.
pub fn recipes_limit(form: &Form) -> Result<Option<i64>, TypeError> {
    match form.get_number::<i64>("recipes_limit")? {
        Some(limit) if limit < 0 => Err(TypeError::new("recipes_limit must not be negative")),
        limit => Ok(limit),
    }
}

fn no_content() -> Response {
    reply::with_status(reply::reply(), StatusCode::NO_CONTENT).into_response()
}

pub async fn list_users(
    query: FormData,
    session: Option<SessionData>,
    state: State,
) -> Result<Response, Rejection> {
    let form = Form::from_data(query);
    let viewer = session.map(|s| s.user_id);
    let request = PageRequest::from_form(&form, state.config.page_size)?;

    let rows = fetch_users(viewer, request, &state.pool).await?;
    let total = rows.first().map(|row| row.count).unwrap_or(0);
    let users: Vec<UserRead> = rows.into_iter().map(UserRead::from).collect();

    let page = PageContext::from_rows(users, total, request, "/api/users/", &form)?;
    Ok(reply::json(&page).into_response())
}

pub async fn post_user(payload: UserCreate, state: State) -> Result<Response, Rejection> {
    let user = validate_user(payload).map_err(Error::from)?;
    let user = register_user(&prepare_user(user)?, &state.pool).await?;

    let body = reply::json(&UserCreated::from(&user));
    Ok(reply::with_status(body, StatusCode::CREATED).into_response())
}

pub async fn get_user(
    id: Uuid,
    session: Option<SessionData>,
    state: State,
) -> Result<Response, Rejection> {
    let viewer = session.map(|s| s.user_id);
    let user = get_user_profile(id, viewer, &state.pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.default())?;

    Ok(reply::json(&UserRead::from(user)).into_response())
}

pub async fn get_me(session: SessionData, state: State) -> Result<Response, Rejection> {
    let user = get_user_profile(session.user_id, Some(session.user_id), &state.pool)
        .await?
        .ok_or_else(|| HtmlError::InvalidSession.default())?;

    Ok(reply::json(&UserRead::from(user)).into_response())
}

pub async fn post_set_password(
    session: SessionData,
    payload: SetPassword,
    state: State,
) -> Result<Response, Rejection> {
    set_password(session.user_id, &payload, &state.pool).await?;
    log::info!("User {} changed their password", session.user_id);

    Ok(no_content())
}

pub async fn list_subscriptions(
    query: FormData,
    session: SessionData,
    state: State,
) -> Result<Response, Rejection> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;

    let form = Form::from_data(query);
    let request = PageRequest::from_form(&form, state.config.page_size)?;
    let limit = recipes_limit(&form)?;

    let rows = fetch_subscriptions(session.user_id, request, &state.pool).await?;
    let total = rows.first().map(|row| row.count).unwrap_or(0);
    let follows = build_follow_reads(rows, limit, &state.config.media_url, &state.pool).await?;

    let page = PageContext::from_rows(follows, total, request, "/api/users/subscriptions/", &form)?;
    Ok(reply::json(&page).into_response())
}

pub async fn post_subscribe(
    id: Uuid,
    query: FormData,
    session: SessionData,
    state: State,
) -> Result<Response, Rejection> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    let limit = recipes_limit(&Form::from_data(query))?;

    let author = follow_author(session.user_id, id, &state.pool).await?;
    let follow = build_follow_reads(vec![author], limit, &state.config.media_url, &state.pool)
        .await?
        .pop()
        .ok_or_else(|| HtmlError::NotFound.default())?;

    Ok(reply::with_status(reply::json(&follow), StatusCode::CREATED).into_response())
}

pub async fn delete_subscribe(
    id: Uuid,
    session: SessionData,
    state: State,
) -> Result<Response, Rejection> {
    session.authenticate(ActionType::ManageOwnSubscriptions)?;
    unfollow_author(session.user_id, id, &state.pool).await?;

    Ok(no_content())
}

pub async fn post_login(payload: TokenCreate, state: State) -> Result<Response, Rejection> {
    let auth_token =
        login_user(&payload.email, &payload.password, &state.config, &state.pool).await?;

    Ok(reply::json(&TokenRead { auth_token }).into_response())
}

pub async fn post_logout(session: SessionData, state: State) -> Result<Response, Rejection> {
    logout_user(session.user_id, &state.pool).await?;
    log::info!("User {} logged out", session.user_id);

    Ok(no_content())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> Form {
        Form::from_data(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn recipes_limit_is_optional_and_non_negative() {
        assert_eq!(recipes_limit(&form(&[])).unwrap(), None);
        assert_eq!(recipes_limit(&form(&[("recipes_limit", "3")])).unwrap(), Some(3));
        assert!(recipes_limit(&form(&[("recipes_limit", "-1")])).is_err());
        assert!(recipes_limit(&form(&[("recipes_limit", "all")])).is_err());
    }
}
