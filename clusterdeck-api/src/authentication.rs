use actix_web::{Error, dev::ServiceRequest, web::Data};
use actix_web_httpauth::extractors::{
    AuthenticationError,
    bearer::{BearerAuth, Config},
};
use constant_time_eq::constant_time_eq_n;

use crate::config::{ApiConfig, ApiKey};

/// Accepts the request when its bearer token matches any configured API key.
///
/// Every configured key is compared in constant time, whether or not an
/// earlier one matched.
pub async fn auth_validator(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    let config = req
        .app_data::<Config>()
        .cloned()
        .unwrap_or_default()
        .scope("v1");

    let token: ApiKey = match credentials.token().try_into() {
        Ok(token) => token,
        Err(_) => {
            return Err((AuthenticationError::from(config).into(), req));
        }
    };

    let Some(api_config) = req.app_data::<Data<ApiConfig>>() else {
        return Err((AuthenticationError::from(config).into(), req));
    };

    let mut authenticated = false;
    for api_key in &api_config.api_keys {
        let Ok(api_key) = ApiKey::try_from(api_key.as_str()) else {
            continue;
        };
        authenticated |= constant_time_eq_n(&api_key.key, &token.key);
    }

    if !authenticated {
        return Err((AuthenticationError::from(config).into(), req));
    }

    Ok(req)
}
