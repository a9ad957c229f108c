use warp::{reject::Rejection, Filter};

use super::jwt::{verify_jwt_session, SessionData};
use crate::{
    actions::get_user_by_id,
    error::{Error, HtmlError},
    state::{with_state, State},
};

/// Extracts the token from `Authorization: Token <jwt>` (or `Bearer <jwt>`).
pub fn parse_authorization(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !(scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer")) {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// `None` without an `Authorization` header; an error when a header is sent
/// but does not resolve to a live session.
pub async fn resolve_session(
    header: Option<String>,
    state: &State,
) -> Result<Option<SessionData>, Error> {
    let Some(header) = header else {
        return Ok(None);
    };
    let token = parse_authorization(&header)
        .ok_or_else(|| HtmlError::InvalidSession.new("Invalid token header."))?;

    let claims = verify_jwt_session(token, &state.config.jwt_secret)?;
    let user = get_user_by_id(&state.pool, claims.user_id)
        .await?
        .ok_or_else(|| HtmlError::InvalidSession.new("User not found."))?;

    if user.token_version != claims.version {
        return Err(HtmlError::InvalidSession.new("Token has been revoked."));
    }

    Ok(Some(SessionData::from(&user)))
}

pub fn with_session(
    state: State,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_state(state))
        .and_then(|header: Option<String>, state: State| async move {
            match resolve_session(header, &state).await {
                Ok(Some(session)) => Ok(session),
                Ok(None) => Err(Rejection::from(HtmlError::Unauthorized.default())),
                Err(e) => Err(Rejection::from(e)),
            }
        })
}

pub fn with_possible_session(
    state: State,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_state(state))
        .and_then(|header: Option<String>, state: State| async move {
            resolve_session(header, &state)
                .await
                .map_err(Rejection::from)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_and_bearer_schemes() {
        assert_eq!(parse_authorization("Token abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(parse_authorization("bearer abc"), Some("abc"));
        assert_eq!(parse_authorization("Basic abc"), None);
        assert_eq!(parse_authorization("Token "), None);
        assert_eq!(parse_authorization("abc"), None);
    }
}
