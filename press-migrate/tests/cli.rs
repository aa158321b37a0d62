use assert_cmd::Command;
use predicates::prelude::*;
use press_migrate::cli::{run, Cli, Commands};
use std::fmt::Debug;
use std::fs::write;
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, NamedTempFile};
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

fn html_file(html: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("Creating temp html file failed");
    write(file.path(), html).expect("Writing temp html failed");
    file
}

#[test]
fn transform_prints_document_json() {
    let input = html_file("<h1>Title</h1><p>Hello <strong>world</strong></p>");
    let mut cmd = Command::cargo_bin("press-migrate").expect("Binary exists");

    cmd.arg("transform").arg("--input").arg(input.path());

    cmd.assert()
        .success()
        .stdout(
            predicate::str::contains("\"nodeType\": \"document\"")
                .and(predicate::str::contains("\"nodeType\": \"heading-2\""))
                .and(predicate::str::contains("\"type\": \"bold\"")),
        );
}

#[test]
fn transform_reports_degradations_on_stderr() {
    let input = html_file(
        r#"<table><tr><td>a</td><td>b</td></tr></table><img src="https://blog.test/missing.png" alt="Gone">"#,
    );
    let mut cmd = Command::cargo_bin("press-migrate").expect("Binary exists");

    cmd.arg("transform").arg("--input").arg(input.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("a | b").and(predicate::str::contains("[Image: Gone]")))
        .stderr(
            predicate::str::contains("warning: table converted to text")
                .and(predicate::str::contains("warning: asset not found for image")),
        );
}

#[test]
fn transform_resolves_images_from_a_state_dir() {
    let state = tempdir().unwrap();
    write(state.path().join("asset-map.json"), r#"{ "31": "asset-abc" }"#).unwrap();
    let input = html_file(r#"<figure><img class="wp-image-31" src="/cat.jpg"></figure>"#);

    let mut cmd = Command::cargo_bin("press-migrate").expect("Binary exists");
    cmd.arg("transform")
        .arg("--input")
        .arg(input.path())
        .arg("--state-dir")
        .arg(state.path());

    cmd.assert()
        .success()
        .stdout(
            predicate::str::contains("embedded-asset-block")
                .and(predicate::str::contains("\"id\": \"asset-abc\"")),
        );
}

#[test]
fn transform_fails_on_missing_input() {
    let mut cmd = Command::cargo_bin("press-migrate").expect("Binary exists");
    cmd.arg("transform").arg("--input").arg("/definitely/not/here.html");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read input file"));
}

#[test]
fn migration_refuses_to_start_without_an_export() {
    let dir = tempdir().unwrap();
    let config = NamedTempFile::new().unwrap();
    write(
        config.path(),
        format!(
            "source:\n  base_url: https://blog.test\n  export_dir: {}\nmigrate:\n  state_dir: {}\n",
            dir.path().join("no-export").display(),
            dir.path().join("state").display()
        ),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("press-migrate").expect("Binary exists");
    cmd.arg("run")
        .arg("--config")
        .arg(config.path())
        .env_remove("CONTENTFUL_MANAGEMENT_TOKEN");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("export directory"));
    assert!(!dir.path().join("state").exists());
}

#[test]
fn status_counts_mapped_entities() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("state");
    std::fs::create_dir_all(&state).unwrap();
    write(state.join("asset-map.json"), r#"{ "1": "a1", "2": "a2" }"#).unwrap();
    write(
        state.join("entry-map.json"),
        r#"{ "post:1": "e1", "post:2": "e2", "page:3": "e3" }"#,
    )
    .unwrap();
    let config = NamedTempFile::new().unwrap();
    write(
        config.path(),
        format!(
            "source:\n  base_url: https://blog.test\n  export_dir: {}\nmigrate:\n  state_dir: {}\n",
            dir.path().display(),
            state.display()
        ),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("press-migrate").expect("Binary exists");
    cmd.arg("status").arg("--config").arg(config.path());

    cmd.assert().success().stdout(
        predicate::str::contains("assets     2")
            .and(predicate::str::contains("entries    3"))
            .and(predicate::str::contains("post     2")),
    );
}

/// Records the `message` field of every event.
#[derive(Clone, Default)]
struct MessageLog(Arc<Mutex<Vec<String>>>);

struct MessageField<'a>(&'a mut Option<String>);

impl Visit for MessageField<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            *self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for MessageLog {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut message = None;
        event.record(&mut MessageField(&mut message));
        if let Some(message) = message {
            self.0.lock().unwrap().push(message);
        }
    }
}

#[tokio::test]
async fn run_logs_trace_initialised_before_loading_config() {
    let log = MessageLog::default();
    let _guard = tracing::subscriber::set_default(Registry::default().with(log.clone()));

    let result = run(Cli {
        command: Commands::Status {
            config: "missing-config.yaml".into(),
        },
    })
    .await;

    assert!(result.is_err());
    let messages = log.0.lock().unwrap();
    assert_eq!(messages.first().map(String::as_str), Some("trace_initialised"));
}
