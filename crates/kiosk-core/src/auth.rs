use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::api::{CallApi, JoinRequest};
use crate::errors::KioskError;
use crate::events::Role;

/// Credentials for one session attempt. Immutable once resolved,
/// never persisted.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    pub session_name: String,
    pub session_token: String,
    pub display_name: String,
}

/// Legacy meeting clients cannot use session credentials; the browser is
/// sent to their web client instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectInstruction {
    pub url: String,
}

/// Outcome of credential resolution. Callers must check for the redirect
/// variant before touching credentials.
#[derive(Debug, Clone)]
pub enum Resolution {
    Credentials(SessionCredentials),
    Redirect(RedirectInstruction),
}

#[derive(Debug, Clone)]
pub struct ResolveArgs {
    pub deep_link_token: Option<String>,
    pub call_id: String,
    pub role: Role,
    pub location_name: Option<String>,
    pub user_id: Option<String>,
}

/// Claims embedded in a session token payload.
#[derive(Debug, Default, Deserialize)]
struct TokenClaims {
    /// Session (topic) name. Required for deep-link joins.
    tpc: Option<String>,
    user_identity: Option<String>,
}

/// Turns a deep-link token or a call id into session credentials.
///
/// No side effects beyond network I/O; safe to retry.
pub struct CredentialResolver {
    api: Arc<dyn CallApi>,
    legacy_meeting_base_url: String,
}

impl CredentialResolver {
    pub fn new(api: Arc<dyn CallApi>, legacy_meeting_base_url: impl Into<String>) -> Self {
        Self {
            api,
            legacy_meeting_base_url: legacy_meeting_base_url
                .into()
                .trim_end_matches('/')
                .to_string(),
        }
    }

    pub async fn resolve(&self, args: &ResolveArgs) -> Result<Resolution, KioskError> {
        let synthesized = synthesized_display_name(args.role, args.location_name.as_deref());

        if let Some(token) = &args.deep_link_token {
            let claims = decode_claims(token)?;
            let session_name = claims.tpc.filter(|s| !s.is_empty()).ok_or_else(|| {
                KioskError::MalformedToken("token is missing the session name claim".into())
            })?;
            let display_name = claims
                .user_identity
                .filter(|s| !s.is_empty())
                .unwrap_or(synthesized);
            tracing::info!("resolved session {session_name} from deep-link token");
            return Ok(Resolution::Credentials(SessionCredentials {
                session_name,
                session_token: token.clone(),
                display_name,
            }));
        }

        let response = self
            .api
            .join_call(&JoinRequest {
                role: args.role,
                user_id: args.user_id.clone(),
                call_id: args.call_id.clone(),
                user_name: synthesized.clone(),
                location_name: args.location_name.clone(),
            })
            .await?;

        if let Some(meeting_number) = response.meeting_number {
            let mut url = format!(
                "{}/wc/join/{}",
                self.legacy_meeting_base_url,
                urlencoding::encode(&meeting_number)
            );
            if let Some(password) = &response.password {
                url.push_str(&format!("?pwd={}", urlencoding::encode(password)));
            }
            tracing::info!("join for call {} redirects to legacy meeting client", args.call_id);
            return Ok(Resolution::Redirect(RedirectInstruction { url }));
        }

        let (Some(token), Some(session_name)) = (response.token, response.session_name) else {
            return Err(KioskError::UnexpectedJoinPayload(
                "join response carries neither session credentials nor a meeting redirect".into(),
            ));
        };

        let display_name = decode_claims(&token)
            .ok()
            .and_then(|c| c.user_identity)
            .filter(|s| !s.is_empty())
            .unwrap_or(synthesized);

        tracing::info!("resolved session {session_name} for call {}", args.call_id);
        Ok(Resolution::Credentials(SessionCredentials {
            session_name,
            session_token: token,
            display_name,
        }))
    }
}

/// Decode the claims segment of a JWT-shaped token.
fn decode_claims(token: &str) -> Result<TokenClaims, KioskError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next()) {
        (Some(_), Some(payload)) if !payload.is_empty() => payload,
        _ => {
            return Err(KioskError::MalformedToken(
                "token does not have a claims segment".into(),
            ));
        }
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| KioskError::MalformedToken(format!("claims segment is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| KioskError::MalformedToken(format!("claims segment is not JSON: {e}")))
}

fn synthesized_display_name(role: Role, location_name: Option<&str>) -> String {
    match (role, location_name) {
        (Role::Physician, Some(location)) => format!("Doctor – {location}"),
        (Role::Physician, None) => "Doctor".to_string(),
        (Role::Patient, Some(location)) => format!("Clinic – {location}"),
        (Role::Patient, None) => "Clinic".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::JoinResponse;
    use crate::api::fake::ScriptedCallApi;

    fn make_token(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        format!("{header}.{payload}.sig")
    }

    fn args(token: Option<String>) -> ResolveArgs {
        ResolveArgs {
            deep_link_token: token,
            call_id: "42".to_string(),
            role: Role::Patient,
            location_name: Some("Main St".to_string()),
            user_id: None,
        }
    }

    fn resolver(api: Arc<ScriptedCallApi>) -> CredentialResolver {
        CredentialResolver::new(api, "https://zoom.us")
    }

    #[tokio::test]
    async fn deep_link_token_with_claims_resolves_locally() {
        let api = Arc::new(ScriptedCallApi::default());
        let token = make_token(serde_json::json!({"tpc": "call-42", "user_identity": "Dr Rey"}));
        let resolution = resolver(api.clone())
            .resolve(&args(Some(token.clone())))
            .await
            .unwrap();
        match resolution {
            Resolution::Credentials(c) => {
                assert_eq!(c.session_name, "call-42");
                assert_eq!(c.session_token, token);
                assert_eq!(c.display_name, "Dr Rey");
            }
            Resolution::Redirect(_) => panic!("expected credentials"),
        }
        assert_eq!(api.join_call_count(), 0);
    }

    #[tokio::test]
    async fn deep_link_token_without_session_name_is_malformed() {
        let api = Arc::new(ScriptedCallApi::default());
        let token = make_token(serde_json::json!({"user_identity": "Dr Rey"}));
        let err = resolver(api.clone())
            .resolve(&args(Some(token)))
            .await
            .unwrap_err();
        assert!(matches!(err, KioskError::MalformedToken(_)));
        // no network join request was made
        assert_eq!(api.join_call_count(), 0);
    }

    #[tokio::test]
    async fn garbage_deep_link_token_is_malformed() {
        let api = Arc::new(ScriptedCallApi::default());
        let err = resolver(api)
            .resolve(&args(Some("not-a-token".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, KioskError::MalformedToken(_)));
    }

    #[tokio::test]
    async fn deep_link_token_falls_back_to_synthesized_name() {
        let api = Arc::new(ScriptedCallApi::default());
        let token = make_token(serde_json::json!({"tpc": "call-42"}));
        let mut a = args(Some(token));
        a.role = Role::Physician;
        let resolution = resolver(api).resolve(&a).await.unwrap();
        match resolution {
            Resolution::Credentials(c) => assert_eq!(c.display_name, "Doctor – Main St"),
            Resolution::Redirect(_) => panic!("expected credentials"),
        }
    }

    #[tokio::test]
    async fn join_path_extracts_credentials_from_response() {
        let token = make_token(serde_json::json!({"tpc": "call-42", "user_identity": "Room 3"}));
        let api = Arc::new(ScriptedCallApi::with_join_response(JoinResponse {
            token: Some(token.clone()),
            session_name: Some("call-42".to_string()),
            meeting_number: None,
            password: None,
        }));
        let resolution = resolver(api.clone()).resolve(&args(None)).await.unwrap();
        match resolution {
            Resolution::Credentials(c) => {
                assert_eq!(c.session_name, "call-42");
                assert_eq!(c.session_token, token);
                assert_eq!(c.display_name, "Room 3");
            }
            Resolution::Redirect(_) => panic!("expected credentials"),
        }
        assert_eq!(api.join_call_count(), 1);
        let sent = api.last_join_request.lock().unwrap().clone().unwrap();
        assert_eq!(sent.user_name, "Clinic – Main St");
        assert_eq!(sent.call_id, "42");
    }

    #[tokio::test]
    async fn join_path_synthesizes_display_name_when_claim_absent() {
        let token = make_token(serde_json::json!({"tpc": "call-42"}));
        let api = Arc::new(ScriptedCallApi::with_join_response(JoinResponse {
            token: Some(token),
            session_name: Some("call-42".to_string()),
            meeting_number: None,
            password: None,
        }));
        let resolution = resolver(api).resolve(&args(None)).await.unwrap();
        match resolution {
            Resolution::Credentials(c) => assert_eq!(c.display_name, "Clinic – Main St"),
            Resolution::Redirect(_) => panic!("expected credentials"),
        }
    }

    #[tokio::test]
    async fn legacy_meeting_fields_short_circuit_to_redirect() {
        let api = Arc::new(ScriptedCallApi::with_join_response(JoinResponse {
            token: None,
            session_name: None,
            meeting_number: Some("5551234".to_string()),
            password: Some("s3cret".to_string()),
        }));
        let resolution = resolver(api).resolve(&args(None)).await.unwrap();
        match resolution {
            Resolution::Redirect(r) => {
                assert_eq!(r.url, "https://zoom.us/wc/join/5551234?pwd=s3cret");
            }
            Resolution::Credentials(_) => panic!("expected redirect"),
        }
    }

    #[tokio::test]
    async fn join_response_without_credentials_or_redirect_is_unexpected() {
        let api = Arc::new(ScriptedCallApi::with_join_response(JoinResponse {
            token: None,
            session_name: None,
            meeting_number: None,
            password: None,
        }));
        let err = resolver(api).resolve(&args(None)).await.unwrap_err();
        assert!(matches!(err, KioskError::UnexpectedJoinPayload(_)));
    }
}
