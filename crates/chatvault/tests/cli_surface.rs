use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_FAILURE: i32 = 1;
const EXIT_INPUT_FAILURE: i32 = 2;
const EXIT_USAGE_ERROR: i32 = 64;

const BASIC: &str = include_str!("../../../fixtures/lobechat/backup_basic.json");
const MIXED: &str = include_str!("../../../fixtures/lobechat/backup_mixed.json");

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}-{nanos}"))
}

struct Workspace {
    home_dir: PathBuf,
    cwd: PathBuf,
}

impl Workspace {
    fn new(prefix: &str) -> Self {
        let root = unique_temp_dir(prefix);
        let home_dir = root.join("home");
        let cwd = root.join("cwd");
        std::fs::create_dir_all(&home_dir).expect("home dir should be creatable");
        std::fs::create_dir_all(&cwd).expect("cwd dir should be creatable");
        Self { home_dir, cwd }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.cwd.join(name);
        std::fs::write(&path, contents).expect("fixture write should succeed");
        path
    }

    fn command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_chatvault"));
        command
            .arg("--home-dir")
            .arg(&self.home_dir)
            .arg("--cwd")
            .arg(&self.cwd)
            .env_remove("NOTION_TOKEN");
        command
    }

    fn run(&self, args: &[&str]) -> Output {
        self.command()
            .args(args)
            .output()
            .expect("command should execute")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("temp paths should be utf-8")
}

#[test]
fn missing_required_args_exit_with_usage_code() {
    let status = Command::new(env!("CARGO_BIN_EXE_chatvault"))
        .arg("inspect")
        .status()
        .expect("command should execute");
    assert_eq!(status.code(), Some(EXIT_USAGE_ERROR));

    let status = Command::new(env!("CARGO_BIN_EXE_chatvault"))
        .args(["export", "backup.json", "--format", "tarball"])
        .status()
        .expect("command should execute");
    assert_eq!(status.code(), Some(EXIT_USAGE_ERROR));
}

#[test]
fn help_exits_zero() {
    let output = Command::new(env!("CARGO_BIN_EXE_chatvault"))
        .arg("--help")
        .output()
        .expect("command should execute");
    assert_eq!(output.status.code(), Some(EXIT_SUCCESS));
    let text = stdout(&output);
    for command in ["inspect", "export", "sync"] {
        assert!(text.contains(command), "help should list `{command}`");
    }
}

#[test]
fn inspect_prints_tree_with_counts() {
    let workspace = Workspace::new("chatvault-cli-inspect");
    workspace.write("backup_mixed.json", MIXED);

    let output = workspace.run(&["inspect", "backup_mixed.json"]);
    assert_eq!(output.status.code(), Some(EXIT_SUCCESS), "{}", stderr(&output));

    let text = stdout(&output);
    assert!(text.starts_with("chatvault: starting `inspect`\n"));
    assert!(text.contains("stats.agent_count: 4"));
    assert!(text.contains("stats.message_count: 8"));
    assert!(text.contains(
        "- Helper\n  - 2024-05-01 Hello\n    - Hello (2 messages)\n    - Follow up (1 messages)\n"
    ));
    assert!(text.contains("- Loose ends [unassigned]\n"));
    assert!(text.contains("chatvault: completed `inspect` (exit_code=0)"));
}

#[test]
fn inspect_json_report_is_machine_readable() {
    let workspace = Workspace::new("chatvault-cli-inspect-json");
    let input = workspace.write("backup_basic.json", BASIC);

    let output = workspace.run(&["inspect", path_arg(&input), "--json"]);
    assert_eq!(output.status.code(), Some(EXIT_SUCCESS), "{}", stderr(&output));

    let text = stdout(&output);
    let start = text.find('{').expect("json report should be printed");
    let end = text.rfind('}').expect("json report should be closed");
    let report: Value =
        serde_json::from_str(&text[start..=end]).expect("report should be valid JSON");

    assert_eq!(report["stats"]["agentCount"], 1);
    assert_eq!(report["stats"]["messageCount"], 1);
    assert_eq!(report["assistants"][0]["label"], "Helper");
    assert_eq!(report["assistants"][0]["unassigned"], false);
    assert_eq!(report["assistants"][0]["sessions"][0]["topics"][0]["message_count"], 1);
}

#[test]
fn invalid_backup_exits_with_input_code() {
    let workspace = Workspace::new("chatvault-cli-invalid");
    workspace.write("broken.json", r#"{"version": 7}"#);

    let output = workspace.run(&["inspect", "broken.json"]);
    assert_eq!(output.status.code(), Some(EXIT_INPUT_FAILURE));

    let errors = stderr(&output);
    assert!(errors.contains("chatvault: failed `inspect` (exit_code=2)"));
    assert!(errors.contains("missing `data` payload"));
}

#[test]
fn missing_backup_file_exits_with_runtime_code() {
    let workspace = Workspace::new("chatvault-cli-missing");

    let output = workspace.run(&["export", "nowhere.json"]);
    assert_eq!(output.status.code(), Some(EXIT_RUNTIME_FAILURE));
    assert!(stderr(&output).contains("backup file does not exist"));
}

#[test]
fn relative_home_dir_exits_with_runtime_code() {
    let workspace = Workspace::new("chatvault-cli-relative-home");
    let input = workspace.write("backup_basic.json", BASIC);

    let status = Command::new(env!("CARGO_BIN_EXE_chatvault"))
        .args(["--home-dir", "relative", "inspect"])
        .arg(&input)
        .status()
        .expect("command should execute");
    assert_eq!(status.code(), Some(EXIT_RUNTIME_FAILURE));
}

#[test]
fn sync_without_token_exits_with_input_code_before_any_request() {
    let workspace = Workspace::new("chatvault-cli-sync-token");
    workspace.write("backup_basic.json", BASIC);

    let output = workspace.run(&["sync", "backup_basic.json", "--token", "   "]);
    assert_eq!(output.status.code(), Some(EXIT_INPUT_FAILURE));
    assert!(stderr(&output).contains("missing Notion integration token"));
    assert!(!stdout(&output).contains("sync: start"));
}
