//! # Auth Operations
//!
//! Password, OTP and provider sign-in plus session lifecycle.
//!
//! ## Invariants
//! - Every failure is an `Authentication` error; no falsy returns
//! - A failed login leaves no session behind
//! - `logout` always clears the local session, even if the backend call fails

use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use url::Url;

use super::{failed, Client};
use crate::errors::{ClientError, ClientResult, TransportError};
use crate::observability::{CallArgs, Summarize};
use crate::operation::Operation;
use crate::session::{split_auth_payload, Session, User};

/// Result of a signup
#[derive(Debug, Clone, Serialize)]
pub struct SignupOutcome {
    pub user: Option<User>,
    /// Present when the backend signs the user in immediately
    pub session: Option<Session>,
    /// The account exists but the email address must be confirmed first
    pub needs_email_confirmation: bool,
}

/// Where to send the user for a provider sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OAuthRedirect {
    pub provider: String,
    pub url: String,
}

impl Summarize for Session {
    fn summarize(&self) -> String {
        match self.user_id() {
            Some(id) => format!("session for {}", id),
            None => "session".to_string(),
        }
    }
}

impl Summarize for User {
    fn summarize(&self) -> String {
        format!("user {}", self.id)
    }
}

impl Summarize for SignupOutcome {
    fn summarize(&self) -> String {
        format!(
            "signed up (session: {}, needs confirmation: {})",
            self.session.is_some(),
            self.needs_email_confirmation
        )
    }
}

impl Summarize for OAuthRedirect {
    fn summarize(&self) -> String {
        format!("redirect for {}", self.provider)
    }
}

fn require(value: &str, what: &str) -> ClientResult<()> {
    if value.trim().is_empty() {
        return Err(ClientError::authentication(format!("{} is required", what)));
    }
    Ok(())
}

impl Client {
    async fn auth_call(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Value, TransportError> {
        let mut request = match token {
            Some(token) => self.conn.request_with_token(method, url, token),
            None => self.conn.request(method, url),
        };
        if let Some(body) = body {
            request = request.json(body);
        }
        self.conn.send_json(request).await
    }

    fn token_url(&self, grant_type: &str) -> Url {
        let mut url = self.conn.auth_url(&["token"]);
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        url
    }

    /// Store a session from a token response, or fail
    fn adopt_session(&self, payload: Value, op: Operation) -> ClientResult<Session> {
        let (_, session) = split_auth_payload(payload, Utc::now())
            .map_err(|e| failed(op)(TransportError::Decode(e)))?;
        let session = session.ok_or_else(|| {
            ClientError::authentication(format!("Failed to {}: response carried no session", op.action()))
        })?;
        self.conn.session().replace(session.clone());
        Ok(session)
    }

    fn current_session(&self, op: Operation) -> ClientResult<Arc<Session>> {
        self.conn.session().get().ok_or_else(|| {
            ClientError::authentication(format!("Failed to {}: no active session", op.action()))
        })
    }

    /// Sign in with email and password
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<Session> {
        let args = CallArgs::new().with("email", email).secret("password");

        self.observer
            .observe(Operation::Login, args, async {
                self.conn.session().clear();
                require(email, "Email")?;
                require(password, "Password")?;

                let body = json!({"email": email, "password": password});
                let payload = self
                    .auth_call(Method::POST, self.token_url("password"), Some(&body), None)
                    .await
                    .map_err(failed(Operation::Login))?;
                self.adopt_session(payload, Operation::Login)
            })
            .await
    }

    /// Provider sign-in URL; no request is made
    pub fn login_with_provider(&self, provider: &str, redirect_to: Option<&str>) -> ClientResult<OAuthRedirect> {
        let args = CallArgs::new()
            .with("provider", provider)
            .with("redirect_to", redirect_to.unwrap_or("none"));

        self.observer.observe_sync(Operation::LoginWithProvider, args, || {
            require(provider, "Provider")?;

            let mut url = self.conn.auth_url(&["authorize"]);
            {
                let mut pairs = url.query_pairs_mut();
                pairs.append_pair("provider", provider);
                if let Some(redirect) = redirect_to {
                    pairs.append_pair("redirect_to", redirect);
                }
            }
            Ok(OAuthRedirect {
                provider: provider.to_string(),
                url: url.to_string(),
            })
        })
    }

    /// Sign out; the local session is cleared even if the backend refuses
    pub async fn logout(&self) -> ClientResult<()> {
        self.observer
            .observe(Operation::Logout, CallArgs::new(), async {
                let Some(session) = self.conn.session().get() else {
                    return Ok(());
                };
                self.conn.session().clear();

                self.auth_call(
                    Method::POST,
                    self.conn.auth_url(&["logout"]),
                    None,
                    Some(&session.access_token),
                )
                .await
                .map_err(failed(Operation::Logout))?;
                Ok(())
            })
            .await
    }

    /// Create an account; signs in when the backend returns a session
    pub async fn signup(&self, email: &str, password: &str, metadata: Option<Value>) -> ClientResult<SignupOutcome> {
        let args = CallArgs::new().with("email", email).secret("password");

        self.observer
            .observe(Operation::Signup, args, async {
                require(email, "Email")?;
                require(password, "Password")?;

                let mut body = json!({"email": email, "password": password});
                if let Some(data) = metadata {
                    body["data"] = data;
                }

                let payload = self
                    .auth_call(Method::POST, self.conn.auth_url(&["signup"]), Some(&body), None)
                    .await
                    .map_err(failed(Operation::Signup))?;
                let (user, session) = split_auth_payload(payload, Utc::now())
                    .map_err(|e| failed(Operation::Signup)(TransportError::Decode(e)))?;

                if user.is_none() && session.is_none() {
                    return Err(ClientError::authentication(
                        "Failed to signup: response carried no user",
                    ));
                }
                if let Some(session) = &session {
                    self.conn.session().replace(session.clone());
                }

                Ok(SignupOutcome {
                    needs_email_confirmation: session.is_none(),
                    user,
                    session,
                })
            })
            .await
    }

    /// Send a password recovery email
    pub async fn reset_password(&self, email: &str) -> ClientResult<()> {
        let args = CallArgs::new().with("email", email);

        self.observer
            .observe(Operation::ResetPassword, args, async {
                require(email, "Email")?;
                let body = json!({"email": email});
                self.auth_call(Method::POST, self.conn.auth_url(&["recover"]), Some(&body), None)
                    .await
                    .map_err(failed(Operation::ResetPassword))?;
                Ok(())
            })
            .await
    }

    /// The signed-in user, or `None` without a session
    pub async fn get_user(&self) -> ClientResult<Option<User>> {
        self.observer
            .observe(Operation::GetUser, CallArgs::new(), async {
                let Some(session) = self.conn.session().get() else {
                    return Ok(None);
                };
                let user = self.fetch_user(&session.access_token, Operation::GetUser).await?;
                Ok(Some(user))
            })
            .await
    }

    async fn fetch_user(&self, token: &str, op: Operation) -> ClientResult<User> {
        let payload = self
            .auth_call(Method::GET, self.conn.auth_url(&["user"]), None, Some(token))
            .await
            .map_err(failed(op))?;
        serde_json::from_value(payload).map_err(|e| failed(op)(TransportError::Decode(e)))
    }

    /// Exchange the refresh token for a new session
    pub async fn refresh_session(&self) -> ClientResult<Session> {
        self.observer
            .observe(Operation::RefreshSession, CallArgs::new(), async {
                let current = self.current_session(Operation::RefreshSession)?;
                self.refresh_with(&current.refresh_token, Operation::RefreshSession)
                    .await
            })
            .await
    }

    async fn refresh_with(&self, refresh_token: &str, op: Operation) -> ClientResult<Session> {
        let body = json!({"refresh_token": refresh_token});
        let payload = self
            .auth_call(Method::POST, self.token_url("refresh_token"), Some(&body), None)
            .await
            .map_err(failed(op))?;
        self.adopt_session(payload, op)
    }

    /// Update the signed-in user's attributes (email, password, data)
    pub async fn update_user(&self, attributes: Value) -> ClientResult<User> {
        let args = CallArgs::new().with(
            "fields",
            attributes
                .as_object()
                .map(|m| m.keys().cloned().collect::<Vec<_>>().join(","))
                .unwrap_or_default(),
        );

        self.observer
            .observe(Operation::UpdateUser, args, async {
                if !attributes.is_object() {
                    return Err(ClientError::authentication(
                        "Failed to update user: attributes must be an object",
                    ));
                }
                let current = self.current_session(Operation::UpdateUser)?;

                let payload = self
                    .auth_call(
                        Method::PUT,
                        self.conn.auth_url(&["user"]),
                        Some(&attributes),
                        Some(&current.access_token),
                    )
                    .await
                    .map_err(failed(Operation::UpdateUser))?;
                let user: User = serde_json::from_value(payload)
                    .map_err(|e| failed(Operation::UpdateUser)(TransportError::Decode(e)))?;

                self.conn.session().update(|session| {
                    (session.access_token == current.access_token).then(|| {
                        let mut refreshed = session.clone();
                        refreshed.user = Some(user.clone());
                        refreshed
                    })
                });
                Ok(user)
            })
            .await
    }

    /// Adopt externally obtained tokens
    ///
    /// An expired access token is refreshed; a live one is validated by
    /// fetching its user.
    pub async fn set_session(&self, access_token: &str, refresh_token: &str) -> ClientResult<Session> {
        let args = CallArgs::new().secret("access_token").secret("refresh_token");

        self.observer
            .observe(Operation::SetSession, args, async {
                require(access_token, "Access token")?;
                require(refresh_token, "Refresh token")?;

                let mut session = Session::from_tokens(access_token, refresh_token);
                if session.is_expired() {
                    return self.refresh_with(refresh_token, Operation::SetSession).await;
                }

                let user = self.fetch_user(access_token, Operation::SetSession).await?;
                session.user = Some(user);
                self.conn.session().replace(session.clone());
                Ok(session)
            })
            .await
    }

    /// Confirm an email one-time password and sign in
    pub async fn verify_otp(&self, email: &str, token: &str) -> ClientResult<Session> {
        let args = CallArgs::new().with("email", email).secret("token");

        self.observer
            .observe(Operation::VerifyOtp, args, async {
                require(email, "Email")?;
                require(token, "Token")?;

                let body = json!({"type": "email", "email": email, "token": token});
                let payload = self
                    .auth_call(Method::POST, self.conn.auth_url(&["verify"]), Some(&body), None)
                    .await
                    .map_err(failed(Operation::VerifyOtp))?;
                self.adopt_session(payload, Operation::VerifyOtp)
            })
            .await
    }
}
