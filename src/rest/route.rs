//! API routes: how a REST event turns into an HTTP request.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::config::ApiConfig;
use crate::domain::{ApiRequest, EventId, HttpMethod, RestEvent};
use crate::error::{RestlaneError, Result};

/// Endpoint plus the parameters it is called with
#[derive(Debug, Clone, PartialEq)]
pub enum ApiRoute {
    Login { params: BTreeMap<String, String> },
}

impl ApiRoute {
    /// Build the route for a REST event.
    ///
    /// Returns `Ok(None)` for events that carry no request (e.g. network
    /// error notices). Login requires an object of parameters.
    pub fn for_event(event_id: EventId, params: &Value) -> Result<Option<Self>> {
        match RestEvent::from_id(event_id) {
            Some(RestEvent::Login) => {
                let Value::Object(map) = params else {
                    return Err(RestlaneError::InvalidArgument("parameter missing for login".to_string()));
                };
                let params = map.iter().map(|(k, v)| (k.clone(), form_value(v))).collect();
                Ok(Some(Self::Login { params }))
            }
            Some(RestEvent::NetworkError) => Ok(None),
            None => Err(RestlaneError::UnrecognizedEvent(event_id.raw())),
        }
    }

    pub fn method(&self) -> HttpMethod {
        match self {
            Self::Login { .. } => HttpMethod::Post,
        }
    }

    pub fn path<'a>(&self, api: &'a ApiConfig) -> &'a str {
        match self {
            Self::Login { .. } => &api.login_path,
        }
    }

    /// URL-encoded form request against `api.base_url`
    pub fn to_request(&self, api: &ApiConfig) -> ApiRequest {
        let mut request = ApiRequest::new(self.method(), &api.url_for(self.path(api))).with_timeout_ms(api.timeout_ms);
        match self {
            Self::Login { params } => {
                for (key, value) in params {
                    request = request.with_param(key, value);
                }
            }
        }
        request
    }
}

fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
