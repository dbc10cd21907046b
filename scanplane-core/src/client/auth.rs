//! Authorization modes an adapter endpoint can be registered with.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::RequestBuilder;
use reqwest::header::AUTHORIZATION;

use crate::error::{Result, ScanError};

pub const API_KEY_HEADER: &str = "X-ScannerAdapter-API-Key";

/// Decorates outgoing adapter requests with credentials.
pub trait Authorizer: Send + Sync + fmt::Debug {
    fn mode(&self) -> &'static str;

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl Authorizer for NoAuth {
    fn mode(&self) -> &'static str {
        ""
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
    }
}

/// `Authorization: Basic base64(user:password)`.
#[derive(Clone)]
pub struct BasicAuth {
    encoded: String,
}

impl Authorizer for BasicAuth {
    fn mode(&self) -> &'static str {
        "Basic"
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, format!("Basic {}", self.encoded))
    }
}

#[derive(Clone)]
pub struct BearerAuth {
    token: String,
}

impl Authorizer for BearerAuth {
    fn mode(&self) -> &'static str {
        "Bearer"
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }
}

#[derive(Clone)]
pub struct ApiKeyAuth {
    key: String,
}

impl Authorizer for ApiKeyAuth {
    fn mode(&self) -> &'static str {
        API_KEY_HEADER
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(API_KEY_HEADER, &self.key)
    }
}

// Credentials never reach logs.
macro_rules! redacted_debug {
    ($($ty:ident),+) => {
        $(impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty)).finish_non_exhaustive()
            }
        })+
    };
}

redacted_debug!(BasicAuth, BearerAuth, ApiKeyAuth);

type Constructor = fn(&str) -> Result<Box<dyn Authorizer>>;

fn basic(credential: &str) -> Result<Box<dyn Authorizer>> {
    if !credential.contains(':') {
        return Err(ScanError::Validation(
            "basic auth credential must be 'user:password'".into(),
        ));
    }
    Ok(Box::new(BasicAuth {
        encoded: STANDARD.encode(credential),
    }))
}

fn bearer(credential: &str) -> Result<Box<dyn Authorizer>> {
    Ok(Box::new(BearerAuth {
        token: credential.to_string(),
    }))
}

fn api_key(credential: &str) -> Result<Box<dyn Authorizer>> {
    Ok(Box::new(ApiKeyAuth {
        key: credential.to_string(),
    }))
}

static AUTHORIZERS: [(&str, Constructor); 3] = [
    ("Basic", basic),
    ("Bearer", bearer),
    (API_KEY_HEADER, api_key),
];

/// Names accepted as an endpoint's auth mode besides the empty string.
pub fn supported_modes() -> impl Iterator<Item = &'static str> {
    AUTHORIZERS.iter().map(|(mode, _)| *mode)
}

/// Resolves the authorizer registered under `mode`. Mode names compare
/// case-insensitively; an empty mode means no authorization.
pub fn authorizer_for(mode: &str, credential: &str) -> Result<Box<dyn Authorizer>> {
    let mode = mode.trim();
    if mode.is_empty() {
        return Ok(Box::new(NoAuth));
    }
    let (_, construct) = AUTHORIZERS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(mode))
        .ok_or_else(|| {
            ScanError::Validation(format!("unsupported auth mode '{mode}'"))
        })?;
    if credential.is_empty() {
        return Err(ScanError::Validation(format!(
            "auth mode '{mode}' requires an access credential"
        )));
    }
    construct(credential)
}
