//! End-to-end update-report drives against a recording editor.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;

use subdav_delta::{DeltaError, DeltaWindow, Editor, WindowSink};
use subdav_ra::{drive_report_response, DriveOptions, NoAuth, NullWorkingCopy, RaError, Session, SessionConfig};
use subdav_types::{Md5, Revision};

fn session() -> Session {
    // Offline: send-all responses never touch the network.
    Session::open(
        "http://127.0.0.1:1/repo",
        SessionConfig::default(),
        Arc::new(NoAuth),
        Arc::new(NullWorkingCopy),
    )
    .unwrap()
}

fn options() -> DriveOptions {
    DriveOptions {
        target: String::new(),
        is_switch: false,
        fetch_content: true,
    }
}

#[derive(Clone, Default)]
struct Recording {
    events: Arc<Mutex<Vec<String>>>,
    content: Arc<Mutex<Vec<u8>>>,
}

impl Recording {
    fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

/// Records every editor call; file content is reconstructed from the
/// window stream and checked against `close_file`'s checksum.
#[derive(Default)]
struct RecordingEditor {
    rec: Recording,
}

struct RecSink {
    rec: Recording,
}

#[async_trait]
impl WindowSink for RecSink {
    async fn window(&mut self, window: &DeltaWindow) -> Result<(), DeltaError> {
        self.rec.push(format!("window {}", window.target_len));
        let produced = window.apply(&[])?;
        self.rec.content.lock().unwrap().extend_from_slice(&produced);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DeltaError> {
        self.rec.push("textdelta-end");
        Ok(())
    }
}

#[async_trait]
impl Editor for RecordingEditor {
    type Dir = String;
    type File = String;
    type Sink = RecSink;

    async fn set_target_revision(&mut self, revision: Revision) -> Result<(), DeltaError> {
        self.rec.push(format!("set_target_revision {revision}"));
        Ok(())
    }

    async fn open_root(&mut self, base_revision: Revision) -> Result<String, DeltaError> {
        self.rec.push(format!("open_root {base_revision}"));
        Ok(String::new())
    }

    async fn delete_entry(
        &mut self,
        path: &str,
        revision: Revision,
        _parent: &mut String,
    ) -> Result<(), DeltaError> {
        self.rec.push(format!("delete_entry {path} {revision}"));
        Ok(())
    }

    async fn add_directory(
        &mut self,
        path: &str,
        _parent: &mut String,
        copyfrom: Option<(&str, Revision)>,
    ) -> Result<String, DeltaError> {
        match copyfrom {
            Some((from, rev)) => self.rec.push(format!("add_directory {path} from {from}@{rev}")),
            None => self.rec.push(format!("add_directory {path}")),
        }
        Ok(path.to_string())
    }

    async fn open_directory(
        &mut self,
        path: &str,
        _parent: &mut String,
        base_revision: Revision,
    ) -> Result<String, DeltaError> {
        self.rec.push(format!("open_directory {path} {base_revision}"));
        Ok(path.to_string())
    }

    async fn change_dir_prop(
        &mut self,
        dir: &mut String,
        name: &str,
        value: Option<&[u8]>,
    ) -> Result<(), DeltaError> {
        let rendered = value
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .unwrap_or_else(|| "<deleted>".to_string());
        self.rec.push(format!("change_dir_prop {dir} {name}={rendered}"));
        Ok(())
    }

    async fn close_directory(&mut self, dir: String) -> Result<(), DeltaError> {
        self.rec.push(format!("close_directory {dir}"));
        Ok(())
    }

    async fn absent_directory(
        &mut self,
        path: &str,
        _parent: &mut String,
    ) -> Result<(), DeltaError> {
        self.rec.push(format!("absent_directory {path}"));
        Ok(())
    }

    async fn add_file(
        &mut self,
        path: &str,
        _parent: &mut String,
        _copyfrom: Option<(&str, Revision)>,
    ) -> Result<String, DeltaError> {
        self.rec.push(format!("add_file {path}"));
        Ok(path.to_string())
    }

    async fn open_file(
        &mut self,
        path: &str,
        _parent: &mut String,
        base_revision: Revision,
    ) -> Result<String, DeltaError> {
        self.rec.push(format!("open_file {path} {base_revision}"));
        Ok(path.to_string())
    }

    async fn absent_file(&mut self, path: &str, _parent: &mut String) -> Result<(), DeltaError> {
        self.rec.push(format!("absent_file {path}"));
        Ok(())
    }

    async fn apply_textdelta(
        &mut self,
        file: &mut String,
        base_checksum: Option<Md5>,
    ) -> Result<RecSink, DeltaError> {
        self.rec.push(format!(
            "apply_textdelta {file} base={}",
            base_checksum.map(|c| c.to_hex()).unwrap_or_else(|| "none".into())
        ));
        Ok(RecSink {
            rec: self.rec.clone(),
        })
    }

    async fn change_file_prop(
        &mut self,
        file: &mut String,
        name: &str,
        value: Option<&[u8]>,
    ) -> Result<(), DeltaError> {
        let rendered = value
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .unwrap_or_else(|| "<deleted>".to_string());
        self.rec.push(format!("change_file_prop {file} {name}={rendered}"));
        Ok(())
    }

    async fn close_file(
        &mut self,
        file: String,
        text_checksum: Option<Md5>,
    ) -> Result<(), DeltaError> {
        if let Some(expected) = text_checksum {
            let actual = Md5::digest(&self.rec.content.lock().unwrap());
            if !expected.matches(&actual) {
                return Err(DeltaError::ChecksumMismatch {
                    expected: expected.to_hex(),
                    actual: actual.to_hex(),
                });
            }
        }
        self.rec.push(format!(
            "close_file {file} checksum={}",
            text_checksum.map(|c| c.to_hex()).unwrap_or_else(|| "none".into())
        ));
        Ok(())
    }

    async fn close_edit(&mut self) -> Result<(), DeltaError> {
        self.rec.push("close_edit");
        Ok(())
    }

    async fn abort_edit(&mut self) -> Result<(), DeltaError> {
        self.rec.push("abort_edit");
        Ok(())
    }
}

fn hello_txdelta_base64() -> String {
    let mut stream = vec![b'S', b'V', b'N', 0, 0, 0, 6, 1, 6, 0x86];
    stream.extend_from_slice(b"hello\n");
    B64.encode(stream)
}

const HELLO_MD5: &str = "b1946ac92492d2347c6235b4d2611184";

#[tokio::test]
async fn s1_update_noop() {
    let body = r#"<?xml version="1.0" encoding="utf-8"?>
<S:update-report xmlns:S="svn:" send-all="true">
<S:target-revision rev="5"/>
<S:open-directory rev="5">
</S:open-directory>
</S:update-report>"#;

    let session = session();
    let mut editor = RecordingEditor::default();
    drive_report_response(&session, &mut editor, body, &options())
        .await
        .unwrap();
    assert_eq!(
        editor.rec.events(),
        vec![
            "set_target_revision 5",
            "open_root 5",
            "close_directory ",
            "close_edit",
        ]
    );
}

#[tokio::test]
async fn s2_add_one_file() {
    let body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<S:update-report xmlns:S="svn:" xmlns:V="http://subversion.tigris.org/xmlns/dav/" send-all="true">
<S:target-revision rev="6"/>
<S:open-directory rev="5">
<S:add-file name="hello.txt">
<S:prop><V:md5-checksum>{HELLO_MD5}</V:md5-checksum></S:prop>
<S:txdelta>{}</S:txdelta>
</S:add-file>
</S:open-directory>
</S:update-report>"#,
        hello_txdelta_base64()
    );

    let session = session();
    let mut editor = RecordingEditor::default();
    drive_report_response(&session, &mut editor, &body, &options())
        .await
        .unwrap();

    assert_eq!(
        editor.rec.events(),
        vec![
            "set_target_revision 6".to_string(),
            "open_root 5".to_string(),
            "add_file hello.txt".to_string(),
            "apply_textdelta hello.txt base=none".to_string(),
            "window 6".to_string(),
            "textdelta-end".to_string(),
            format!("close_file hello.txt checksum={HELLO_MD5}"),
            "close_directory ".to_string(),
            "close_edit".to_string(),
        ]
    );
    assert_eq!(&*editor.rec.content.lock().unwrap(), b"hello\n");
}

#[tokio::test]
async fn s3_delete_one_file() {
    let body = r#"<?xml version="1.0" encoding="utf-8"?>
<S:update-report xmlns:S="svn:" send-all="true">
<S:target-revision rev="6"/>
<S:open-directory rev="5">
<S:delete-entry name="hello.txt"/>
</S:open-directory>
</S:update-report>"#;

    let session = session();
    let mut editor = RecordingEditor::default();
    drive_report_response(&session, &mut editor, body, &options())
        .await
        .unwrap();
    assert_eq!(
        editor.rec.events(),
        vec![
            "set_target_revision 6",
            "open_root 5",
            "delete_entry hello.txt HEAD",
            "close_directory ",
            "close_edit",
        ]
    );
}

#[tokio::test]
async fn nested_tree_with_properties() {
    let body = r#"<?xml version="1.0" encoding="utf-8"?>
<S:update-report xmlns:S="svn:" send-all="true">
<S:target-revision rev="9"/>
<S:open-directory rev="8">
<S:open-directory name="sub" rev="8">
<S:set-prop name="svn:ignore">*.o</S:set-prop>
<S:set-prop name="binary-prop" encoding="base64">AAEC</S:set-prop>
<S:remove-prop name="obsolete"/>
<S:absent-file name="secret.txt"/>
</S:open-directory>
</S:open-directory>
</S:update-report>"#;

    let session = session();
    let mut editor = RecordingEditor::default();
    drive_report_response(&session, &mut editor, body, &options())
        .await
        .unwrap();
    let events = editor.rec.events();
    assert!(events.contains(&"open_directory sub 8".to_string()));
    assert!(events.contains(&"change_dir_prop sub svn:ignore=*.o".to_string()));
    assert!(events.contains(&"change_dir_prop sub obsolete=<deleted>".to_string()));
    assert!(events.contains(&"absent_file sub/secret.txt".to_string()));
    assert_eq!(events.last().unwrap(), "close_edit");
    // binary property decoded from base64
    assert!(events.iter().any(|e| e.starts_with("change_dir_prop sub binary-prop=")));
}

#[tokio::test]
async fn checksum_mismatch_aborts_the_drive() {
    let wrong = "00112233445566778899aabbccddeeff";
    let body = format!(
        r#"<S:update-report xmlns:S="svn:" xmlns:V="http://subversion.tigris.org/xmlns/dav/" send-all="true">
<S:target-revision rev="6"/>
<S:open-directory rev="5">
<S:add-file name="hello.txt">
<S:prop><V:md5-checksum>{wrong}</V:md5-checksum></S:prop>
<S:txdelta>{}</S:txdelta>
</S:add-file>
</S:open-directory>
</S:update-report>"#,
        hello_txdelta_base64()
    );

    let session = session();
    let mut editor = RecordingEditor::default();
    let err = drive_report_response(&session, &mut editor, &body, &options())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "checksum-mismatch");
    assert_eq!(editor.rec.events().last().unwrap(), "abort_edit");
}

#[tokio::test]
async fn delete_outside_a_directory_is_rejected() {
    let body = r#"<S:update-report xmlns:S="svn:" send-all="true">
<S:delete-entry name="hello.txt"/>
</S:update-report>"#;

    let session = session();
    let mut editor = RecordingEditor::default();
    let err = drive_report_response(&session, &mut editor, body, &options())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "unexpected-element");
    assert_eq!(editor.rec.events().last().unwrap(), "abort_edit");
}

#[tokio::test]
async fn wrong_root_element_is_rejected() {
    let session = session();
    let mut editor = RecordingEditor::default();
    let err = drive_report_response(&session, &mut editor, "<S:nonsense xmlns:S=\"svn:\"/>", &options())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "unexpected-element");
}

#[tokio::test]
async fn unsupported_svndiff_version_surfaces() {
    let b64 = B64.encode(b"SVN\x09");
    let body = format!(
        r#"<S:update-report xmlns:S="svn:" send-all="true">
<S:target-revision rev="6"/>
<S:open-directory rev="5">
<S:add-file name="f"><S:txdelta>{b64}</S:txdelta></S:add-file>
</S:open-directory>
</S:update-report>"#
    );

    let session = session();
    let mut editor = RecordingEditor::default();
    let err = drive_report_response(&session, &mut editor, &body, &options())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "unsupported-version");
}

#[tokio::test]
async fn anchor_bookkeeping_is_suppressed_for_named_targets() {
    // The report is anchored one above the real target, so the anchor's
    // checked-in href must not be recorded.
    let body = r#"<S:update-report xmlns:S="svn:" xmlns:D="DAV:" send-all="true">
<S:target-revision rev="6"/>
<S:open-directory rev="5">
<D:checked-in><D:href>/repo/!svn/ver/6/</D:href></D:checked-in>
<S:open-directory name="sub" rev="5">
<D:checked-in><D:href>/repo/!svn/ver/6/sub</D:href></D:checked-in>
</S:open-directory>
</S:open-directory>
</S:update-report>"#;

    let session = session();
    let mut editor = RecordingEditor::default();
    let opts = DriveOptions {
        target: "sub".to_string(),
        is_switch: false,
        fetch_content: true,
    };
    drive_report_response(&session, &mut editor, body, &opts)
        .await
        .unwrap();
    let events = editor.rec.events();
    assert!(!events.iter().any(|e| e.contains("change_dir_prop  ")));
    assert!(events
        .iter()
        .any(|e| e.contains("change_dir_prop sub svn:wc:ra_dav:version-url=/repo/!svn/ver/6/sub")));
}

#[tokio::test]
async fn delta_errors_keep_their_kind_across_the_editor_boundary() {
    let err: RaError = DeltaError::EditOrder("x".into()).into();
    assert!(matches!(err, RaError::Delta(_)));
}
