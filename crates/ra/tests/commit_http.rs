//! Commit drives against a mock DeltaV server.
//!
//! The mock understands just enough of the protocol to answer the baseline
//! walk, activity lifecycle, and working-resource methods, and records every
//! request so tests can assert on the wire sequence.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;

use subdav_delta::{Editor, WindowSink};
use subdav_ra::{NullWorkingCopy, RaError, Session, SessionConfig, StaticAuth};
use subdav_types::{Md5, Revision};

#[derive(Clone)]
struct Mock {
    log: Arc<Mutex<Vec<String>>>,
    require_auth: bool,
}

impl Mock {
    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn saw(&self, method: &str, path_prefix: &str) -> bool {
        self.log()
            .iter()
            .any(|line| line.starts_with(&format!("{method} ")) && line.contains(path_prefix))
    }

    fn position(&self, method: &str, path_prefix: &str) -> Option<usize> {
        self.log().iter().position(|line| {
            line.starts_with(&format!("{method} ")) && line.contains(path_prefix)
        })
    }
}

fn xml_response(status: StatusCode, body: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/xml; charset=\"utf-8\"")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_response(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .unwrap()
}

fn propfind_answer(href: &str, props: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:" xmlns:V="http://subversion.tigris.org/xmlns/dav/">
<D:response><D:href>{href}</D:href>
<D:propstat><D:prop>{props}</D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat>
</D:response></D:multistatus>"#
    )
}

async fn handler(State(mock): State<Mock>, req: Request<Body>) -> Response<Body> {
    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();
    let label = req
        .headers()
        .get("Label")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let authorized = req.headers().contains_key(header::AUTHORIZATION);
    mock.log.lock().unwrap().push(format!("{method} {path}"));

    if mock.require_auth && !authorized {
        return Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header(header::WWW_AUTHENTICATE, "Basic realm=\"mock repo\"")
            .body(Body::empty())
            .unwrap();
    }

    match (method.as_str(), path.as_str()) {
        ("OPTIONS", _) => xml_response(
            StatusCode::OK,
            r#"<?xml version="1.0" encoding="utf-8"?>
<D:options-response xmlns:D="DAV:">
<D:activity-collection-set><D:href>/repo/!svn/act/</D:href></D:activity-collection-set>
</D:options-response>"#,
        ),
        ("MKACTIVITY", _) => empty_response(StatusCode::CREATED),
        ("PROPFIND", "/repo") => xml_response(
            StatusCode::MULTI_STATUS,
            &propfind_answer(
                "/repo/",
                r#"<D:version-controlled-configuration><D:href>/repo/!svn/vcc/default</D:href></D:version-controlled-configuration>
<D:resourcetype><D:collection/></D:resourcetype>
<V:baseline-relative-path></V:baseline-relative-path>
<V:repository-uuid>13f79535-47bb-0310-9956-ffa450edef68</V:repository-uuid>
<D:checked-in><D:href>/repo/!svn/ver/42/</D:href></D:checked-in>"#,
            ),
        ),
        ("PROPFIND", "/repo/trunk") => xml_response(
            StatusCode::MULTI_STATUS,
            &propfind_answer(
                "/repo/trunk/",
                r#"<D:version-controlled-configuration><D:href>/repo/!svn/vcc/default</D:href></D:version-controlled-configuration>
<D:resourcetype><D:collection/></D:resourcetype>
<V:baseline-relative-path>trunk</V:baseline-relative-path>
<D:checked-in><D:href>/repo/!svn/ver/42/trunk</D:href></D:checked-in>"#,
            ),
        ),
        ("PROPFIND", "/repo/!svn/vcc/default") => match label {
            Some(rev) => xml_response(
                StatusCode::MULTI_STATUS,
                &propfind_answer(
                    &format!("/repo/!svn/bln/{rev}/"),
                    &format!(
                        r#"<D:baseline-collection><D:href>/repo/!svn/bc/{rev}/</D:href></D:baseline-collection>
<D:version-name>{rev}</D:version-name>
<D:resourcetype><D:baseline/></D:resourcetype>"#
                    ),
                ),
            ),
            None => xml_response(
                StatusCode::MULTI_STATUS,
                &propfind_answer(
                    "/repo/!svn/vcc/default",
                    r#"<D:checked-in><D:href>/repo/!svn/bln/42</D:href></D:checked-in>"#,
                ),
            ),
        },
        ("PROPFIND", "/repo/!svn/bln/42") => xml_response(
            StatusCode::MULTI_STATUS,
            &propfind_answer(
                "/repo/!svn/bln/42/",
                r#"<D:baseline-collection><D:href>/repo/!svn/bc/42/</D:href></D:baseline-collection>
<D:version-name>42</D:version-name>
<D:resourcetype><D:baseline/></D:resourcetype>"#,
            ),
        ),
        ("PROPFIND", p) if p.starts_with("/repo/!svn/ver/") => xml_response(
            StatusCode::MULTI_STATUS,
            &propfind_answer(
                p,
                &format!(r#"<D:checked-in><D:href>{p}</D:href></D:checked-in>"#),
            ),
        ),
        // Nothing else exists in HEAD.
        ("PROPFIND", _) => empty_response(StatusCode::NOT_FOUND),
        ("CHECKOUT", p) => {
            let working = p
                .replace("!svn/bln/", "!svn/wbl/")
                .replace("!svn/ver/", "!svn/wrk/");
            Response::builder()
                .status(StatusCode::CREATED)
                .header(header::LOCATION, format!("http://mock{working}"))
                .body(Body::empty())
                .unwrap()
        }
        ("PROPPATCH", _) => xml_response(
            StatusCode::MULTI_STATUS,
            r#"<D:multistatus xmlns:D="DAV:"/>"#,
        ),
        ("MKCOL", _) => empty_response(StatusCode::CREATED),
        ("COPY", _) => empty_response(StatusCode::CREATED),
        ("PUT", _) => empty_response(StatusCode::CREATED),
        ("DELETE", p) if p.contains("stale.c") => empty_response(StatusCode::CONFLICT),
        ("DELETE", p) if p.contains("ghost.c") => empty_response(StatusCode::NOT_FOUND),
        ("DELETE", _) => empty_response(StatusCode::NO_CONTENT),
        ("MERGE", _) => xml_response(
            StatusCode::OK,
            r#"<?xml version="1.0" encoding="utf-8"?>
<D:merge-response xmlns:D="DAV:">
<D:updated-set>
<D:response><D:href>/repo/!svn/bln/43</D:href>
<D:propstat><D:prop>
<D:resourcetype><D:baseline/></D:resourcetype>
<D:version-name>43</D:version-name>
<D:creationdate>2026-08-01T09:30:00.000000Z</D:creationdate>
<D:creator-displayname>alice</D:creator-displayname>
</D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>
<D:response><D:href>/repo/feature</D:href>
<D:propstat><D:prop>
<D:resourcetype><D:collection/></D:resourcetype>
<D:checked-in><D:href>/repo/!svn/ver/43/feature</D:href></D:checked-in>
<D:version-name>43</D:version-name>
</D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>
</D:updated-set>
</D:merge-response>"#,
        ),
        ("REPORT", _) => xml_response(
            StatusCode::OK,
            r#"<?xml version="1.0" encoding="utf-8"?>
<S:update-report xmlns:S="svn:" send-all="true">
<S:target-revision rev="42"/>
<S:open-directory rev="42">
</S:open-directory>
</S:update-report>"#,
        ),
        _ => empty_response(StatusCode::METHOD_NOT_ALLOWED),
    }
}

async fn start_mock(require_auth: bool) -> (Mock, String) {
    let mock = Mock {
        log: Arc::new(Mutex::new(Vec::new())),
        require_auth,
    };
    let app = Router::new().fallback(handler).with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (mock, format!("http://{addr}/repo"))
}

fn session_for(url: &str) -> Session {
    Session::open(
        url,
        SessionConfig::default(),
        Arc::new(StaticAuth::new("alice", "secret")),
        Arc::new(NullWorkingCopy),
    )
    .unwrap()
}

#[tokio::test]
async fn s4_commit_with_copied_directory() {
    let (mock, url) = start_mock(false).await;
    let session = session_for(&url);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    let mut editor = session
        .get_commit_editor(
            "Branch feature from trunk",
            Some(Box::new(move |info| {
                seen_cb
                    .lock()
                    .unwrap()
                    .push((info.revision, info.author.clone()));
            })),
        )
        .await
        .unwrap();

    let mut root = editor.open_root(Revision::INVALID).await.unwrap();
    let feature = editor
        .add_directory("feature", &mut root, Some(("/repo/trunk", Revision::new(42))))
        .await
        .unwrap();
    editor.close_directory(feature).await.unwrap();
    editor.close_directory(root).await.unwrap();
    editor.close_edit().await.unwrap();

    // Callback fired exactly once with the merge outcome.
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, Revision::new(43));
    assert_eq!(seen[0].1.as_deref(), Some("alice"));
    let info = editor.commit_info().unwrap();
    assert_eq!(info.revision, Revision::new(43));
    assert!(info.date.is_some());

    // The wire sequence of the drive.
    assert!(mock.saw("MKACTIVITY", "/repo/!svn/act/"));
    assert!(mock.saw("PROPPATCH", "/repo/!svn/wbl/42"));
    assert!(mock.saw("CHECKOUT", "/repo/!svn/ver/42/"));
    assert!(mock.saw("COPY", "/repo/!svn/bc/42/trunk"));
    assert!(mock.saw("MERGE", "/repo"));
    assert!(mock.saw("DELETE", "/repo/!svn/act/"));

    let merge_at = mock.position("MERGE", "/repo").unwrap();
    let delete_at = mock.position("DELETE", "/repo/!svn/act/").unwrap();
    assert!(merge_at < delete_at, "activity must outlive the MERGE");
}

#[tokio::test]
async fn s5_commit_race_surfaces_out_of_date_and_tears_down() {
    let (mock, url) = start_mock(false).await;
    let session = session_for(&url);

    let mut editor = session.get_commit_editor("remove stale.c", None).await.unwrap();
    // Even with a concrete base revision, the root opens against HEAD; the
    // DELETE below carries its own base pin instead.
    let mut root = editor.open_root(Revision::new(7)).await.unwrap();
    let err = editor
        .delete_entry("stale.c", Revision::new(7), &mut root)
        .await
        .unwrap_err();
    let ra: &RaError = match &err {
        subdav_delta::DeltaError::External { source } => {
            source.downcast_ref().expect("an RA error")
        }
        other => panic!("expected a wrapped RA error, got {other}"),
    };
    assert_eq!(ra.kind(), "out-of-date");

    // The root was checked out at HEAD's version resource, the base pin
    // travelled with the DELETE, and the drive tears down.
    assert!(mock.saw("CHECKOUT", "/repo/!svn/ver/42/"));
    assert!(mock.saw("DELETE", "stale.c"));
    editor.abort_edit().await.unwrap();
    assert!(mock.saw("DELETE", "/repo/!svn/act/"));
}

#[tokio::test]
async fn idempotent_delete_is_opt_in() {
    let (mock, url) = start_mock(false).await;

    // Default: a 404 on the child DELETE is an error.
    let session = session_for(&url);
    let mut editor = session.get_commit_editor("rm ghost", None).await.unwrap();
    let mut root = editor.open_root(Revision::INVALID).await.unwrap();
    assert!(editor
        .delete_entry("ghost.c", Revision::new(7), &mut root)
        .await
        .is_err());
    editor.abort_edit().await.unwrap();

    // Opted in: the same 404 counts as success.
    let mut config = SessionConfig::default();
    config.idempotent_delete = true;
    let session = Session::open(
        &url,
        config,
        Arc::new(StaticAuth::new("alice", "secret")),
        Arc::new(NullWorkingCopy),
    )
    .unwrap();
    let mut editor = session.get_commit_editor("rm ghost", None).await.unwrap();
    let mut root = editor.open_root(Revision::INVALID).await.unwrap();
    editor
        .delete_entry("ghost.c", Revision::new(7), &mut root)
        .await
        .unwrap();
    editor.abort_edit().await.unwrap();
    assert!(mock.saw("DELETE", "ghost.c"));
}

#[tokio::test]
async fn commit_transmits_file_content() {
    let (mock, url) = start_mock(false).await;
    let session = session_for(&url);

    let mut editor = session.get_commit_editor("add hello", None).await.unwrap();
    let mut root = editor.open_root(Revision::INVALID).await.unwrap();
    let mut file = editor.add_file("hello.txt", &mut root, None).await.unwrap();
    let mut sink = editor.apply_textdelta(&mut file, None).await.unwrap();
    for w in subdav_delta::fulltext_windows(b"hello\n") {
        sink.window(&w).await.unwrap();
    }
    sink.close().await.unwrap();
    editor
        .close_file(file, Some(Md5::digest(b"hello\n")))
        .await
        .unwrap();
    editor.close_directory(root).await.unwrap();
    editor.close_edit().await.unwrap();

    assert!(mock.saw("PUT", "hello.txt"));
    assert_eq!(editor.commit_info().unwrap().revision, Revision::new(43));
}

#[tokio::test]
async fn get_latest_revnum_walks_the_baseline() {
    let (_mock, url) = start_mock(false).await;
    let session = session_for(&url);
    assert_eq!(session.get_latest_revnum().await.unwrap(), Revision::new(42));
    // The discovery PROPFIND fills the session's one-shot caches.
    assert_eq!(
        session.repos_uuid().as_deref(),
        Some("13f79535-47bb-0310-9956-ffa450edef68")
    );
}

#[tokio::test]
async fn update_report_round_trip_over_http() {
    let (mock, url) = start_mock(false).await;
    let session = session_for(&url);

    let mut reporter = session
        .do_update(subdav_delta::NullEditor::new(), Revision::new(42), "", true)
        .unwrap();
    reporter.set_path("", Revision::new(42), false).unwrap();
    reporter.finish_report().await.unwrap();

    assert!(mock.saw("REPORT", "/repo/!svn/vcc/default"));
}

#[tokio::test]
async fn auth_challenge_is_answered_and_saved() {
    let (mock, url) = start_mock(true).await;
    let auth = Arc::new(StaticAuth::new("alice", "secret"));
    let session = Session::open(
        &url,
        SessionConfig::default(),
        auth.clone(),
        Arc::new(NullWorkingCopy),
    )
    .unwrap();

    assert_eq!(session.get_latest_revnum().await.unwrap(), Revision::new(42));
    assert!(auth.was_saved(), "working credentials must be persisted");
    // The first exchange was challenged and re-run.
    let log = mock.log();
    assert!(log.len() >= 2);
    assert_eq!(log[0], log[1]);
}
