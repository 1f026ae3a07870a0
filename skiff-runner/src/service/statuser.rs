//! Status reporting
//!
//! Reports job state transitions to the location named by the job's
//! `job_state_url`. The URL is a template with a `{job_id}` variable; after
//! expansion its scheme decides how the update is delivered:
//! - `file://<path>`: the new state name is written to the file
//! - `http://`, `https://`: the update is `PATCH`ed with the job's bearer token

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use skiff_client::{CallbackClient, ClientError};
use skiff_core::dto::state::StateUpdateBody;
use skiff_core::{JobRecord, StateUpdate};
use thiserror::Error;
use tracing::debug;

use crate::scope::{Cancelled, Scope};

/// Everything except the URI unreserved characters
const UNRESERVED_ONLY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Like [`UNRESERVED_ONLY`] but keeps the URI reserved characters as well
const RESERVED_ALLOWED: &AsciiSet = &UNRESERVED_ONLY
    .remove(b':')
    .remove(b'/')
    .remove(b'?')
    .remove(b'#')
    .remove(b'[')
    .remove(b']')
    .remove(b'@')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=');

/// Service trait for reporting state transitions
#[async_trait]
pub trait Statuser: Send + Sync {
    async fn status(
        &self,
        scope: &Scope,
        job: &JobRecord,
        update: &StateUpdate,
    ) -> Result<(), StatusError>;
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("invalid job state URL template {template:?}: {reason}")]
    Template { template: String, reason: String },

    #[error("unsupported job state URL scheme in {0:?}")]
    UnsupportedScheme(String),

    #[error("failed to write job state to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("job state endpoint rejected update: {0}")]
    Protocol(#[source] ClientError),

    #[error("job state endpoint unreachable: {0}")]
    Transport(#[source] ClientError),

    #[error("status report interrupted: {0}")]
    Cancelled(#[from] Cancelled),
}

impl From<ClientError> for StatusError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::RequestFailed(_) => Self::Transport(err),
            _ => Self::Protocol(err),
        }
    }
}

/// Statuser that dispatches on the scheme of the expanded state URL
#[derive(Debug, Clone, Default)]
pub struct UrlStatuser {
    callbacks: CallbackClient,
}

impl UrlStatuser {
    pub fn new(callbacks: CallbackClient) -> Self {
        Self { callbacks }
    }
}

#[async_trait]
impl Statuser for UrlStatuser {
    async fn status(
        &self,
        scope: &Scope,
        job: &JobRecord,
        update: &StateUpdate,
    ) -> Result<(), StatusError> {
        let template = job.job_state_url();
        let url = expand_template(template, &[("job_id", job.id())])?;

        if let Some(path) = url.strip_prefix("file://") {
            debug!(job_id = %job.id(), path, state = %update.new, "Writing job state");
            let contents = format!("{}\n", update.new);
            return scope
                .run(tokio::fs::write(path, contents))
                .await?
                .map_err(|source| StatusError::Io {
                    path: path.to_string(),
                    source,
                });
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            debug!(
                job_id = %job.id(),
                cur = %update.cur,
                new = %update.new,
                "Sending job state update"
            );
            let body = StateUpdateBody::from(update);
            scope
                .run(self.callbacks.patch_state(&url, job.jwt(), &body))
                .await??;
            return Ok(());
        }

        Err(StatusError::UnsupportedScheme(url))
    }
}

/// Expands a URI template with string variables
///
/// Supports simple expansion (`{var}`, `{a,b}`) and reserved expansion
/// (`{+var}`). Simple expansion percent-encodes everything outside the
/// unreserved set; reserved expansion also keeps reserved characters.
/// Undefined variables expand to nothing.
pub fn expand_template(template: &str, vars: &[(&str, &str)]) -> Result<String, StatusError> {
    let invalid = |reason: &str| StatusError::Template {
        template: template.to_string(),
        reason: reason.to_string(),
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find(['{', '}']) {
        if rest.as_bytes()[open] == b'}' {
            return Err(invalid("unmatched '}'"));
        }
        out.push_str(&rest[..open]);

        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
        let mut expr = &after[..close];
        rest = &after[close + 1..];

        let reserved = expr.starts_with('+');
        if reserved {
            expr = &expr[1..];
        }
        if expr.is_empty() {
            return Err(invalid("empty expression"));
        }

        let mut first = true;
        for name in expr.split(',') {
            if name.is_empty() || !name.chars().all(is_varchar) {
                return Err(invalid("invalid variable name"));
            }
            let Some((_, value)) = vars.iter().find(|(key, _)| *key == name) else {
                continue;
            };
            if !first {
                out.push(',');
            }
            first = false;
            encode_into(&mut out, value, reserved);
        }
    }

    out.push_str(rest);
    Ok(out)
}

fn is_varchar(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn encode_into(out: &mut String, value: &str, reserved: bool) {
    let set = if reserved { RESERVED_ALLOWED } else { UNRESERVED_ONLY };
    out.extend(utf8_percent_encode(value, set));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::patch;
    use axum::{Json, Router};
    use serde_json::json;
    use skiff_core::State as JobState;
    use std::sync::{Arc, Mutex};

    fn job(state_url: &str) -> JobRecord {
        JobRecord::from_value(json!({
            "version": 1,
            "data": {"job": {"id": 42}},
            "job_state_url": state_url,
            "jwt": "secret-jwt",
        }))
        .unwrap()
    }

    #[test]
    fn test_expand_simple() {
        let url = expand_template("http://board/jobs/{job_id}/state", &[("job_id", "42")]).unwrap();
        assert_eq!(url, "http://board/jobs/42/state");
    }

    #[test]
    fn test_expand_encodes_reserved_characters() {
        let vars = [("job_id", "a/b c")];
        assert_eq!(expand_template("/{job_id}", &vars).unwrap(), "/a%2Fb%20c");
        assert_eq!(expand_template("/{+job_id}", &vars).unwrap(), "/a/b%20c");
    }

    #[test]
    fn test_expand_encodes_non_ascii_as_utf8() {
        let vars = [("job_id", "café~1")];
        assert_eq!(expand_template("/{job_id}", &vars).unwrap(), "/caf%C3%A9~1");
        assert_eq!(expand_template("/{+job_id}", &vars).unwrap(), "/caf%C3%A9~1");
    }

    #[test]
    fn test_expand_undefined_and_lists() {
        let vars = [("a", "1"), ("b", "2")];
        assert_eq!(expand_template("{a,b}", &vars).unwrap(), "1,2");
        assert_eq!(expand_template("x{missing}y", &vars).unwrap(), "xy");
        assert_eq!(expand_template("no vars", &vars).unwrap(), "no vars");
    }

    #[test]
    fn test_expand_rejects_malformed_templates() {
        for template in ["{job_id", "job_id}", "{}", "{job id}"] {
            assert!(
                matches!(
                    expand_template(template, &[("job_id", "1")]),
                    Err(StatusError::Template { .. })
                ),
                "{template}"
            );
        }
    }

    #[tokio::test]
    async fn test_file_status_writes_new_state() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("file://{}/state-{{job_id}}", dir.path().display());
        let update = StateUpdate::new("42", JobState::Received, JobState::Started);

        UrlStatuser::default()
            .status(&Scope::new(), &job(&template), &update)
            .await
            .unwrap();

        let written = std::fs::read_to_string(dir.path().join("state-42")).unwrap();
        assert_eq!(written, "started\n");
    }

    #[tokio::test]
    async fn test_http_status_patches_with_bearer() {
        type Seen = Arc<Mutex<Vec<(String, Option<String>, serde_json::Value)>>>;
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route(
                "/jobs/{id}/state",
                patch(
                    |State(seen): State<Seen>,
                     Path(id): Path<String>,
                     headers: HeaderMap,
                     Json(body): Json<serde_json::Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        seen.lock().unwrap().push((id, auth, body));
                        StatusCode::OK
                    },
                ),
            )
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let template = format!("http://{}/jobs/{{job_id}}/state", addr);
        let update = StateUpdate::new("42", JobState::Started, JobState::Passed);
        UrlStatuser::default()
            .status(&Scope::new(), &job(&template), &update)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "42");
        assert_eq!(seen[0].1.as_deref(), Some("Bearer secret-jwt"));
        assert_eq!(seen[0].2["state"], "passed");
        assert_eq!(seen[0].2["cur"], "started");
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let update = StateUpdate::new("42", JobState::Queued, JobState::Received);
        let err = UrlStatuser::default()
            .status(&Scope::new(), &job("ftp://board/{job_id}"), &update)
            .await
            .unwrap_err();

        assert!(matches!(err, StatusError::UnsupportedScheme(url) if url == "ftp://board/42"));
    }

    #[tokio::test]
    async fn test_cancelled_scope_skips_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");
        let scope = Scope::new();
        scope.cancel();

        let update = StateUpdate::new("42", JobState::Queued, JobState::Received);
        let err = UrlStatuser::default()
            .status(&scope, &job(&format!("file://{}", path.display())), &update)
            .await
            .unwrap_err();

        assert!(matches!(err, StatusError::Cancelled(Cancelled::Canceled)));
        assert!(!path.exists());
    }
}
