use assert_cmd::Command;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const IMAGE: &str = "data:image/png;base64,iVBORw0KGgo=";

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn outbox(&self) -> PathBuf {
        self.dir.path().join("outbox")
    }

    fn covenant(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("covenant"));
        for key in ["COVENANT_CONFIG", "OPENAI_API_KEY", "COVENANT_PDF_COMMAND"] {
            cmd.env_remove(key);
        }
        cmd.env("COVENANT_DRAFTER_MODE", "stub")
            .env("COVENANT_STORE_DIR", self.dir.path().join("store"))
            .env("COVENANT_OUTBOX_DIR", self.outbox())
            .env("COVENANT_BASE_URL", "https://sign.example.com")
            .env("COVENANT_USER_ID", "u-alice")
            .env("COVENANT_USER_EMAIL", "alice@example.com")
            .env("COVENANT_USER_NAME", "Alice");
        cmd
    }

    fn run(&self, request: Value) -> Value {
        let output = self
            .covenant()
            .arg("command")
            .arg("--json")
            .arg(request.to_string())
            .output()
            .unwrap();
        serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
            panic!(
                "stdout is not JSON ({err}): {}",
                String::from_utf8_lossy(&output.stdout)
            )
        })
    }

    fn run_ok(&self, request: Value) -> Value {
        let response = self.run(request);
        assert_eq!(response["status"], "ok", "{response}");
        response["data"].clone()
    }
}

fn bob() -> Value {
    json!({ "id": "u-bob", "email": "bob@example.com", "name": "Bob" })
}

fn files_named(root: &Path, name: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut found = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            found.extend(files_named(&path, name));
        } else if path.file_name().is_some_and(|n| n == name) {
            found.push(path);
        }
    }
    found
}

#[test]
fn contract_lifecycle_across_processes() {
    let ws = Workspace::new();

    let contract = ws.run_ok(json!({
        "action": "generate",
        "payload": { "prompt": "Website redesign for Acme", "title": "Acme redesign" }
    }));
    let id = contract["id"].as_str().unwrap().to_string();
    assert_eq!(contract["status"], "draft");
    assert_eq!(contract["title"], "Acme redesign");

    let early = ws.run(json!({
        "action": "send",
        "payload": { "id": id, "email": "bob@example.com", "name": "Bob" }
    }));
    assert_eq!(early["error"]["code"], "incomplete_signatures");

    ws.run_ok(json!({
        "action": "sign",
        "payload": { "id": id, "block": 2, "ordinal": 0, "image": IMAGE }
    }));
    let sent = ws.run_ok(json!({
        "action": "send",
        "payload": { "id": id, "email": "bob@example.com", "name": "Bob" }
    }));
    assert_eq!(sent["status"], "sent");

    let invites = files_named(&ws.outbox(), "message.json");
    assert_eq!(invites.len(), 1);
    let invite = std::fs::read_to_string(&invites[0]).unwrap();
    assert!(invite.contains(&format!("https://sign.example.com/sign/{id}")));

    let view = ws.run_ok(json!({
        "action": "render",
        "user": bob(),
        "payload": { "id": id, "view": "interactive" }
    }));
    assert_eq!(view["viewer"], "PartyB");
    assert_eq!(view["outstanding"].as_array().unwrap().len(), 1);

    let signed = ws.run_ok(json!({
        "action": "sign",
        "user": bob(),
        "payload": { "id": id, "block": 3, "ordinal": 0, "image": IMAGE }
    }));
    assert_eq!(signed["finalized"], true);
    assert_eq!(signed["contract"]["status"], "completed");

    let pdfs = files_named(&ws.outbox(), &format!("contract-{id}.pdf"));
    assert_eq!(pdfs.len(), 2, "one copy per party");
    assert!(std::fs::read(&pdfs[0]).unwrap().starts_with(b"%PDF-"));

    let frozen = ws.run(json!({
        "action": "edit_block",
        "payload": { "id": id, "block": 0, "text": "AGREEMENT" }
    }));
    assert_eq!(frozen["error"]["code"], "document_frozen");

    let listed = ws.run_ok(json!({ "action": "list", "user": bob() }));
    assert_eq!(listed["contracts"][0]["id"], id.as_str());
}

#[test]
fn export_writes_pdf_file() {
    let ws = Workspace::new();
    let contract = ws.run_ok(json!({
        "action": "generate",
        "payload": { "prompt": "Dog walking twice a week" }
    }));
    let id = contract["id"].as_str().unwrap();
    let target = ws.dir.path().join("out.pdf");

    let exported = ws.run_ok(json!({
        "action": "export",
        "payload": { "id": id, "output": target }
    }));
    assert_eq!(exported["filename"], format!("contract-{id}.pdf"));
    assert!(exported.get("pdf_base64").is_none());
    assert!(std::fs::read(&target).unwrap().starts_with(b"%PDF-"));
}

#[test]
fn strangers_cannot_read_contracts() {
    let ws = Workspace::new();
    let contract = ws.run_ok(json!({
        "action": "generate",
        "payload": { "prompt": "Catering for a wedding" }
    }));

    let response = ws.run(json!({
        "action": "get",
        "user": { "id": "u-mallory", "email": "mallory@example.com" },
        "payload": { "id": contract["id"] }
    }));
    assert_eq!(response["status"], "error");
    assert_eq!(response["error"]["code"], "forbidden");
}

#[test]
fn command_errors_exit_nonzero_with_envelope() {
    let ws = Workspace::new();
    let output = ws
        .covenant()
        .args(["command", "--json", r#"{"action":"get","payload":{"id":"missing"}}"#])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let response: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(response["error"]["code"], "not_found");
    assert_eq!(response["meta"]["action"], "get");
}

#[test]
fn openai_mode_without_key_reports_config_error() {
    let ws = Workspace::new();
    let output = ws
        .covenant()
        .env("COVENANT_DRAFTER_MODE", "openai")
        .args(["command", "--json", r#"{"action":"capabilities"}"#])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let response: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(response["error"]["code"], "invalid_config");
    assert!(response["error"]["hint"]
        .as_str()
        .unwrap()
        .contains("COVENANT_DRAFTER_MODE=stub"));
}

#[test]
fn capabilities_describe_markers() {
    let ws = Workspace::new();
    let caps = ws.run_ok(json!({ "action": "capabilities" }));
    assert_eq!(caps["command_api"], "v1");
    assert_eq!(caps["drafter"], "stub");
    assert_eq!(caps["markers"]["glyph"], "_");
    assert!(caps["actions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|a| a == "regenerate_block"));
}

#[test]
fn empty_stdin_is_rejected() {
    let ws = Workspace::new();
    ws.covenant()
        .arg("command")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicates::str::contains("Command request is empty"));
}
