use async_trait::async_trait;
use axum::extract::{FromRequest, RequestParts};
use axum::http::HeaderMap;
use uuid::Uuid;

use crate::auth::{Role, User};
use crate::error::{unauthorized_error, Error};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The identity provider sits in front of this service and forwards the
/// caller as two headers. Anything missing or malformed is unauthenticated.
#[async_trait]
impl<B> FromRequest<B> for User
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        user_from_headers(req.headers())
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, Error> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(unauthorized_error)
}

pub(crate) fn user_from_headers(headers: &HeaderMap) -> Result<User, Error> {
    let id = Uuid::parse_str(header(headers, USER_ID_HEADER)?).map_err(|_| unauthorized_error())?;
    let role: Role = header(headers, USER_ROLE_HEADER)?.parse()?;

    Ok(User::new(id, role))
}

#[test]
fn identity_from_headers() {
    use axum::http::HeaderValue;

    let id = Uuid::new_v4();
    let mut headers = HeaderMap::new();

    assert!(user_from_headers(&headers).unwrap_err().is_unauthorized_error());

    headers.insert(USER_ID_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
    assert!(user_from_headers(&headers).unwrap_err().is_unauthorized_error());

    headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("dispatcher"));
    assert!(user_from_headers(&headers).unwrap_err().is_unauthorized_error());

    headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("carrier"));
    assert_eq!(user_from_headers(&headers).unwrap(), User::new(id, Role::Carrier));

    headers.insert(USER_ID_HEADER, HeaderValue::from_static("not-a-uuid"));
    assert!(user_from_headers(&headers).unwrap_err().is_unauthorized_error());
}
