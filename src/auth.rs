//! Owner tokens handed out by the identity provider.
//!
//! A token reads `{owner_id}.{exp_unix}.{hex(hmac_sha256(secret, "{owner_id}:{exp_unix}"))}`.
//! The HTTP layer verifies it once per request and passes the resulting
//! [`Owner`] explicitly into every management call.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::{
    error::AppError,
    types::{AppState, Owner},
};

fn owner_mac(secret: &str, owner_id: &str, exp: i64) -> Option<Hmac<Sha256>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(format!("{owner_id}:{exp}").as_bytes());
    Some(mac)
}

pub fn sign_owner_token(secret: &str, owner_id: &str, exp: i64) -> Option<String> {
    if secret.is_empty() || owner_id.is_empty() {
        return None;
    }
    let mac = owner_mac(secret, owner_id, exp)?;
    let sig = hex::encode(mac.finalize().into_bytes());
    Some(format!("{owner_id}.{exp}.{sig}"))
}

pub fn verify_owner_token(secret: &str, token: &str) -> Option<Owner> {
    if secret.is_empty() {
        return None;
    }
    let mut parts = token.trim().rsplitn(3, '.');
    let sig = parts.next()?;
    let exp = parts.next()?.parse::<i64>().ok()?;
    let owner_id = parts.next()?;
    if owner_id.is_empty() || exp < Utc::now().timestamp() {
        return None;
    }
    let Ok(signature_bytes) = hex::decode(sig) else {
        return None;
    };
    let mac = owner_mac(secret, owner_id, exp)?;
    mac.verify_slice(&signature_bytes).ok()?;
    Some(Owner::new(owner_id))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get("authorization")?.to_str().ok()?;
    header.strip_prefix("Bearer ").map(str::trim)
}

pub fn owner_from_headers(secret: &str, headers: &HeaderMap) -> Result<Owner, AppError> {
    let token = bearer_token(headers).ok_or(AppError::Unauthorized)?;
    verify_owner_token(secret, token).ok_or_else(|| {
        debug!("rejected owner token");
        AppError::Unauthorized
    })
}

impl FromRequestParts<Arc<AppState>> for Owner {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        owner_from_headers(&state.config.auth_signing_secret, &parts.headers)
    }
}
