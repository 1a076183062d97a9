//! The RA session: one server, one authentication state, two connections.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::{AuthProvider, Credentials};
use crate::config::SessionConfig;
use crate::error::RaError;
use crate::wc::WorkingCopy;
use crate::xml;

/// Base revision pin on commit-time DELETE.
pub(crate) const SVN_VERSION_NAME_HEADER: &str = "X-SVN-Version-Name";
/// Declared MD5 of a PUT body's base text.
pub(crate) const SVN_BASE_FULLTEXT_MD5_HEADER: &str = "X-SVN-Base-Fulltext-MD5";
/// Declared MD5 of a PUT body's result text.
pub(crate) const SVN_RESULT_FULLTEXT_MD5_HEADER: &str = "X-SVN-Result-Fulltext-MD5";
/// Ask the server to answer a GET as an svndiff against a version resource.
pub(crate) const SVN_DELTA_BASE_HEADER: &str = "SVN-Delta-Base";
/// Per-request behavior switches understood by the server.
pub(crate) const SVN_OPTIONS_HEADER: &str = "X-SVN-Options";
/// Baseline selector on PROPFIND.
pub(crate) const LABEL_HEADER: &str = "Label";
pub(crate) const DEPTH_HEADER: &str = "Depth";
pub(crate) const DESTINATION_HEADER: &str = "Destination";

/// Client capabilities advertised to the server.
pub(crate) const CAPABILITIES: &[&str] = &[
    "http://subversion.tigris.org/xmlns/dav/svn/depth",
    "http://subversion.tigris.org/xmlns/dav/svn/mergeinfo",
    "http://subversion.tigris.org/xmlns/dav/svn/log-revprops",
];

// Server-side error codes worth mapping back onto local kinds.
const SVN_ERR_FS_CONFLICT: u64 = 160024;
const SVN_ERR_FS_NOT_FOUND: u64 = 160013;
const SVN_ERR_FS_ALREADY_EXISTS: u64 = 160020;

/// A request body for [`Session::dispatch`].
pub(crate) enum RequestBody {
    /// A small XML document (`text/xml`).
    Xml(String),
    /// A staged file, re-read on every (re)send.
    File {
        content_type: &'static str,
        path: std::path::PathBuf,
    },
}

pub(crate) struct DavResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl DavResponse {
    pub fn body_str(&self) -> Result<&str, RaError> {
        std::str::from_utf8(&self.body)
            .map_err(|_| RaError::MalformedXml("response body is not UTF-8".to_string()))
    }
}

#[derive(Default)]
struct SessionCache {
    vcc: Option<String>,
    repos_uuid: Option<String>,
    credentials: Option<Credentials>,
}

/// An open session against one repository URL.
///
/// Owns the HTTP connections (a primary, plus a secondary so property and
/// content fetches can overlap a streaming REPORT), the authentication
/// state, and the small set of discovered-once properties (VCC, repository
/// UUID).
pub struct Session {
    url: Url,
    config: SessionConfig,
    client: Client,
    aux: Client,
    auth: Arc<dyn AuthProvider>,
    wc: Arc<dyn WorkingCopy>,
    cancel: CancellationToken,
    cache: Mutex<SessionCache>,
}

impl Session {
    /// Open a session. No network traffic happens here; discovery is lazy.
    pub fn open(
        url: &str,
        config: SessionConfig,
        auth: Arc<dyn AuthProvider>,
        wc: Arc<dyn WorkingCopy>,
    ) -> Result<Session, RaError> {
        let parsed = Url::parse(url).map_err(|_| RaError::BadUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RaError::BadUrl(url.to_string()));
        }
        let build = |cfg: &SessionConfig| -> Result<Client, RaError> {
            Client::builder()
                .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
                .read_timeout(Duration::from_secs(cfg.read_timeout_secs))
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .map_err(|e| RaError::ConnectionFailed(e.to_string()))
        };
        let client = build(&config)?;
        let aux = build(&config)?;
        debug!(url = %parsed, "opened RA session");
        Ok(Session {
            url: parsed,
            config,
            client,
            aux,
            auth,
            wc,
            cancel: CancellationToken::new(),
            cache: Mutex::new(SessionCache::default()),
        })
    }

    /// The repository URL this session was opened against.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The URL's path portion, with no trailing slash.
    pub fn root_path(&self) -> &str {
        self.url.path().trim_end_matches('/')
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn working_copy(&self) -> &Arc<dyn WorkingCopy> {
        &self.wc
    }

    /// Token cancelling every operation on this session.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn check_cancel(&self) -> Result<(), RaError> {
        if self.cancel.is_cancelled() {
            Err(RaError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve a possibly path-absolute or relative reference against the
    /// session URL.
    pub(crate) fn absolute_url(&self, reference: &str) -> Result<Url, RaError> {
        self.url
            .join(reference)
            .map_err(|_| RaError::BadUrl(reference.to_string()))
    }

    pub(crate) fn cached_vcc(&self) -> Option<String> {
        self.cache.lock().unwrap().vcc.clone()
    }

    pub(crate) fn store_vcc(&self, vcc: &str) {
        self.cache.lock().unwrap().vcc = Some(vcc.to_string());
    }

    /// The repository UUID, once any discovery PROPFIND has seen it.
    pub fn repos_uuid(&self) -> Option<String> {
        self.cache.lock().unwrap().repos_uuid.clone()
    }

    pub(crate) fn store_repos_uuid(&self, uuid: &str) {
        self.cache.lock().unwrap().repos_uuid = Some(uuid.to_string());
    }

    /// Issue one WebDAV request and translate the outcome.
    ///
    /// `ok` lists the statuses the caller treats as success beyond plain
    /// 2xx. Authentication challenges are answered by iterating the
    /// credential provider; a connection lost mid-exchange is re-run once.
    #[instrument(level = "debug", skip(self, body, headers, ok))]
    pub(crate) async fn dispatch(
        &self,
        method: &str,
        url: &str,
        body: Option<&RequestBody>,
        headers: &[(&str, String)],
        ok: &[u16],
        use_aux: bool,
    ) -> Result<DavResponse, RaError> {
        self.check_cancel()?;
        let m = Method::from_bytes(method.as_bytes()).map_err(|_| RaError::RequestCreation {
            method: method.to_string(),
            url: url.to_string(),
        })?;
        let target = self.absolute_url(url)?;
        let client = if use_aux { &self.aux } else { &self.client };

        let mut auth_attempt: u32 = 0;
        let mut challenged = false;
        let mut rerun_used = false;
        loop {
            self.check_cancel()?;
            let mut req = client.request(m.clone(), target.clone());
            if !self.config.compression {
                req = req.header("Accept-Encoding", "identity");
            }
            for (name, value) in headers {
                req = req.header(*name, value);
            }
            req = match body {
                None => req,
                Some(RequestBody::Xml(text)) => req
                    .header(CONTENT_TYPE, "text/xml; charset=\"utf-8\"")
                    .body(text.clone()),
                Some(RequestBody::File { content_type, path }) => {
                    let bytes = tokio::fs::read(path).await?;
                    req.header(CONTENT_TYPE, *content_type).body(bytes)
                }
            };
            let creds = self.cache.lock().unwrap().credentials.clone();
            if let Some(c) = &creds {
                req = req.basic_auth(&c.username, Some(&c.password));
            }

            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) if e.is_timeout() => return Err(RaError::ConnectionTimedOut),
                Err(e) if e.is_connect() => {
                    return Err(RaError::ConnectionFailed(e.to_string()))
                }
                Err(e) if !rerun_used => {
                    // Connection dropped mid-exchange; re-run once.
                    warn!(error = %e, "request failed mid-exchange, re-running");
                    rerun_used = true;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED {
                if auth_attempt >= self.config.auth_attempts {
                    return Err(RaError::AuthnFailed {
                        attempts: auth_attempt,
                    });
                }
                let realm = realm_of(resp.headers());
                let Some(next) = self.auth.credentials(&realm, auth_attempt) else {
                    return Err(RaError::NotAuthorized);
                };
                debug!(attempt = auth_attempt, %realm, "answering auth challenge");
                self.cache.lock().unwrap().credentials = Some(next);
                challenged = true;
                auth_attempt += 1;
                continue;
            }

            let resp_headers = resp.headers().clone();
            let body_bytes = match self.read_body(resp).await {
                Ok(b) => b,
                Err(RaError::Cancelled) => return Err(RaError::Cancelled),
                Err(e) if !rerun_used => {
                    warn!(error = %e, "response body lost mid-read, re-running request");
                    rerun_used = true;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let code = status.as_u16();
            if status.is_success() || ok.contains(&code) {
                if challenged {
                    if let Some(c) = &creds {
                        self.auth.save(c);
                    }
                }
                return Ok(DavResponse {
                    status: code,
                    headers: resp_headers,
                    body: body_bytes,
                });
            }
            return Err(self.translate_status(method, &target, code, &resp_headers, &body_bytes));
        }
    }

    async fn read_body(&self, mut resp: reqwest::Response) -> Result<Vec<u8>, RaError> {
        let mut out = Vec::new();
        loop {
            self.check_cancel()?;
            match resp.chunk().await {
                Ok(Some(chunk)) => out.extend_from_slice(&chunk),
                Ok(None) => return Ok(out),
                Err(e) if e.is_timeout() => return Err(RaError::ConnectionTimedOut),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn translate_status(
        &self,
        method: &str,
        url: &Url,
        status: u16,
        headers: &HeaderMap,
        body: &[u8],
    ) -> RaError {
        // A marshalled server error is more precise than the status line.
        if let Some((errcode, message)) = xml::parse_server_error(body) {
            match errcode {
                Some(SVN_ERR_FS_CONFLICT) => return RaError::OutOfDate(message),
                Some(SVN_ERR_FS_NOT_FOUND) => return RaError::PathNotFound(message),
                Some(SVN_ERR_FS_ALREADY_EXISTS) => return RaError::AlreadyExists(message),
                _ => {
                    return RaError::RequestFailed {
                        context: format!("{} of '{}'", method, url.path()),
                        status: Some(status),
                        message,
                    }
                }
            }
        }
        match status {
            404 => RaError::PathNotFound(url.path().to_string()),
            301 | 302 | 307 => {
                let location = headers
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                RaError::Relocated { location }
            }
            403 => RaError::Forbidden(url.path().to_string()),
            405 => RaError::MethodNotAllowed {
                method: method.to_string(),
                url: url.path().to_string(),
            },
            409 => RaError::OutOfDate(url.path().to_string()),
            423 => RaError::NoLockToken(url.path().to_string()),
            501 => RaError::UnsupportedFeature(format!("{} on '{}'", method, url.path())),
            _ => RaError::RequestFailed {
                context: format!("{} of '{}'", method, url.path()),
                status: Some(status),
                message: format!("server sent unexpected return value ({})", status),
            },
        }
    }
}

fn realm_of(headers: &HeaderMap) -> String {
    let Some(value) = headers
        .get(reqwest::header::WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
    else {
        return String::new();
    };
    match value.split("realm=\"").nth(1) {
        Some(rest) => rest.split('"').next().unwrap_or("").to_string(),
        None => String::new(),
    }
}
