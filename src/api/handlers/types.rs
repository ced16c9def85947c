use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StartQuery {
    /// Pre-fills the IdP sign-in form.
    pub email_hint: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub authorization_url: String,
    pub state: String,
    pub callback_scheme: String,
}

/// Fields are optional so a partial body, like one that fails to parse, is
/// answered with 400 `Missing code/state` instead of a deserialization error.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallbackRequest {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Overrides the configured redirect URI for the token exchange.
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_token: String,
    /// Seconds until `sessionToken` expires.
    pub expires_in: u64,
    pub email: String,
    pub is_student: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub email: String,
    pub is_student: bool,
}
