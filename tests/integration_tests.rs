use parsort::cli::{Command, run_cli_with_prompter};
use parsort::config::PathConfig;
use parsort::guided::Prompter;
use parsort::paths::AppPaths;
use parsort::run_log::RunLogStore;
use parsort::undo::UndoManager;
/// Integration tests for parsort
///
/// These tests drive the commands end to end against temporary inbox, PARA
/// root and state directories.
///
/// Test categories:
/// 1. Automatic sorting
/// 2. Dry-run mode verification
/// 3. Undo and conflict resolution
/// 4. Guided placement
/// 5. Config bootstrap and filters
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::PathBuf;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

const CONFIG: &str = r#"
[buckets]
projects = "1_Projects"
areas = "2_Areas"
resources = "3_Resources"
archive = "4_Archive"

[[rules]]
name = "PDFs"
ext = ["pdf"]
bucket = "resources"
path = "PDFs"

[[rules]]
name = "Images"
ext = ["png", "jpg"]
bucket = "resources"
path = "Images"

[[rules]]
name = "Archives"
ext = ["zip"]
bucket = "archive"
"#;

/// A test fixture with an inbox, a PARA root, a state directory and a config
/// file pointing at the PARA root.
struct TestFixture {
    temp_dir: TempDir,
}

impl TestFixture {
    /// Create a new fixture with the standard config.
    fn new() -> Self {
        Self::with_config(CONFIG)
    }

    /// Create a fixture whose config is `body` below the `root` line.
    fn with_config(body: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let fixture = TestFixture { temp_dir };
        fs::create_dir(fixture.inbox()).expect("Failed to create inbox");
        fs::create_dir(fixture.para()).expect("Failed to create PARA root");
        fs::write(
            fixture.config_file(),
            format!("root = '{}'\n{}", fixture.para().display(), body),
        )
        .expect("Failed to write config");
        fixture
    }

    fn inbox(&self) -> PathBuf {
        self.temp_dir.path().join("inbox")
    }

    fn para(&self) -> PathBuf {
        self.temp_dir.path().join("para")
    }

    fn state(&self) -> PathBuf {
        self.temp_dir.path().join("state")
    }

    fn config_file(&self) -> PathBuf {
        self.temp_dir.path().join("config.toml")
    }

    fn paths(&self) -> AppPaths {
        AppPaths::new(self.config_file(), self.state())
    }

    fn store(&self) -> RunLogStore {
        RunLogStore::new(self.state())
    }

    /// Create a file with content in the inbox.
    fn create_inbox_file(&self, name: &str, content: &str) {
        fs::write(self.inbox().join(name), content).expect("Failed to create file");
    }

    /// Create a file (and its parents) below the PARA root.
    fn create_para_file(&self, rel_path: &str, content: &str) {
        let path = self.para().join(rel_path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).expect("Failed to create file");
    }

    fn sort(&self, dry_run: bool) -> anyhow::Result<()> {
        self.run(
            Command::Sort {
                inbox: self.inbox(),
                config: None,
                dry_run,
                guided: false,
            },
            &mut Scripted::new(&[]),
        )
    }

    fn sort_guided(&self, answers: &[&str]) -> anyhow::Result<Scripted> {
        let mut prompter = Scripted::new(answers);
        self.run(
            Command::Sort {
                inbox: self.inbox(),
                config: None,
                dry_run: false,
                guided: true,
            },
            &mut prompter,
        )?;
        Ok(prompter)
    }

    fn undo(&self, dry_run: bool) -> anyhow::Result<()> {
        self.run(
            Command::Undo {
                inbox: self.inbox(),
                dry_run,
            },
            &mut Scripted::new(&[]),
        )
    }

    fn run(&self, command: Command, prompter: &mut Scripted) -> anyhow::Result<()> {
        run_cli_with_prompter(command, &self.paths(), prompter)
    }

    fn assert_inbox_file(&self, name: &str) {
        let path = self.inbox().join(name);
        assert!(path.is_file(), "File should be in inbox: {}", path.display());
    }

    fn assert_para_file(&self, rel_path: &str) {
        let path = self.para().join(rel_path);
        assert!(path.is_file(), "File should exist: {}", path.display());
    }

    fn assert_para_missing(&self, rel_path: &str) {
        let path = self.para().join(rel_path);
        assert!(!path.exists(), "Path should not exist: {}", path.display());
    }

    /// Records of the latest run, or an empty list when there is none.
    fn latest_records(&self) -> Vec<(String, PathBuf, PathBuf)> {
        let store = self.store();
        let inbox = fs::canonicalize(self.inbox()).unwrap();
        match store.latest_run(&inbox).unwrap() {
            Some(log) => RunLogStore::read_records(&log)
                .unwrap()
                .into_iter()
                .map(|r| (r.rule_name, r.source, r.destination))
                .collect(),
            None => Vec::new(),
        }
    }

    fn read(&self, path: PathBuf) -> String {
        fs::read_to_string(path).expect("Failed to read file")
    }
}

/// Operator that answers from a script and keeps everything shown to it.
struct Scripted {
    answers: VecDeque<String>,
    transcript: Vec<String>,
}

impl Scripted {
    fn new(answers: &[&str]) -> Self {
        Scripted {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            transcript: Vec::new(),
        }
    }

    fn saw(&self, text: &str) -> bool {
        self.transcript.iter().any(|line| line.contains(text))
    }
}

impl Prompter for Scripted {
    fn say(&mut self, line: &str) {
        self.transcript.push(line.to_string());
    }

    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.transcript.push(prompt.to_string());
        Ok(self.answers.pop_front())
    }
}

// ============================================================================
// Automatic Sorting
// ============================================================================

#[test]
fn test_sort_moves_matching_files() {
    let fixture = TestFixture::new();
    fixture.create_inbox_file("a.png", "image");
    fixture.create_inbox_file("b.txt", "text");
    fixture.create_inbox_file("c.pdf", "pdf");

    fixture.sort(false).unwrap();

    fixture.assert_para_file("3_Resources/Images/a.png");
    fixture.assert_para_file("3_Resources/PDFs/c.pdf");
    fixture.assert_inbox_file("b.txt");
    assert_eq!(fixture.read(fixture.para().join("3_Resources/Images/a.png")), "image");

    let records = fixture.latest_records();
    let rules: Vec<_> = records.iter().map(|(rule, _, _)| rule.as_str()).collect();
    assert_eq!(rules, vec!["Images", "PDFs"]);
}

#[test]
fn test_sort_collision_gets_numbered_name() {
    let fixture = TestFixture::new();
    fixture.create_para_file("3_Resources/Images/x.png", "old");
    fixture.create_inbox_file("x.png", "new");

    fixture.sort(false).unwrap();

    assert_eq!(fixture.read(fixture.para().join("3_Resources/Images/x.png")), "old");
    assert_eq!(fixture.read(fixture.para().join("3_Resources/Images/x (2).png")), "new");
}

#[test]
fn test_sort_rule_without_subpath_targets_bucket_root() {
    let fixture = TestFixture::new();
    fixture.create_inbox_file("backup.ZIP", "zip");

    fixture.sort(false).unwrap();

    fixture.assert_para_file("4_Archive/backup.ZIP");
}

#[test]
fn test_sort_empty_inbox_leaves_no_log() {
    let fixture = TestFixture::new();

    fixture.sort(false).unwrap();

    assert!(fixture.latest_records().is_empty());
    assert!(fixture.undo(false).is_err());
}

#[test]
fn test_sort_leaves_directories_and_extensionless_files() {
    let fixture = TestFixture::new();
    fixture.create_inbox_file("README", "readme");
    fs::create_dir(fixture.inbox().join("photos.png")).unwrap();

    fixture.sort(false).unwrap();

    fixture.assert_inbox_file("README");
    assert!(fixture.inbox().join("photos.png").is_dir());
    fixture.assert_para_missing("3_Resources");
}

#[test]
fn test_sort_missing_inbox_fails() {
    let fixture = TestFixture::new();
    let result = fixture.run(
        Command::Sort {
            inbox: fixture.inbox().join("nope"),
            config: None,
            dry_run: false,
            guided: false,
        },
        &mut Scripted::new(&[]),
    );
    assert!(result.is_err());
}

#[test]
fn test_sort_failure_keeps_earlier_moves_undoable() {
    let fixture = TestFixture::new();
    // Images target is a plain file, so the second move cannot create it.
    fixture.create_para_file("3_Resources/Images", "not a folder");
    fixture.create_inbox_file("a.pdf", "pdf");
    fixture.create_inbox_file("b.png", "png");

    assert!(fixture.sort(false).is_err());
    fixture.assert_para_file("3_Resources/PDFs/a.pdf");
    fixture.assert_inbox_file("b.png");
    assert_eq!(fixture.latest_records().len(), 1);

    fixture.undo(false).unwrap();
    fixture.assert_inbox_file("a.pdf");
}

#[cfg(unix)]
#[test]
fn test_sort_leaves_non_utf8_names_and_stays_undoable() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let fixture = TestFixture::new();
    let bad = fixture.inbox().join(OsStr::from_bytes(b"bad\xff.png"));
    fs::write(&bad, "bad").unwrap();
    fixture.create_inbox_file("good.png", "good");

    fixture.sort(false).unwrap();

    assert!(bad.is_file());
    fixture.assert_para_file("3_Resources/Images/good.png");
    assert_eq!(fixture.latest_records().len(), 1);

    fixture.undo(false).unwrap();
    fixture.assert_inbox_file("good.png");
    assert!(bad.is_file());
}

#[cfg(unix)]
#[test]
fn test_guided_move_into_non_utf8_folder_is_not_performed() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let fixture = TestFixture::new();
    let odd = fixture.para().join("2_Areas").join(OsStr::from_bytes(b"odd\xff"));
    fs::create_dir_all(&odd).unwrap();
    fixture.create_inbox_file("notes.txt", "n");

    // areas, descend into the odd folder, accept.
    fixture.sort_guided(&["2", "1", ""]).unwrap();

    fixture.assert_inbox_file("notes.txt");
    assert!(!odd.join("notes.txt").exists());
    assert!(fixture.latest_records().is_empty());
}

// ============================================================================
// Dry Run
// ============================================================================

#[test]
fn test_dry_run_touches_nothing() {
    let fixture = TestFixture::new();
    fixture.create_inbox_file("a.png", "image");
    fixture.create_inbox_file("c.pdf", "pdf");

    fixture.sort(true).unwrap();

    fixture.assert_inbox_file("a.png");
    fixture.assert_inbox_file("c.pdf");
    fixture.assert_para_missing("3_Resources");
    assert!(!fixture.state().join("runs").exists());
}

// ============================================================================
// Undo
// ============================================================================

#[test]
fn test_undo_round_trip_then_second_undo_is_noop() {
    let fixture = TestFixture::new();
    fixture.create_inbox_file("a.png", "image");
    fixture.create_inbox_file("c.pdf", "pdf");
    fixture.create_para_file("3_Resources/Images/a.png", "existing");

    fixture.sort(false).unwrap();
    fixture.assert_para_file("3_Resources/Images/a (2).png");

    fixture.undo(false).unwrap();
    assert_eq!(fixture.read(fixture.inbox().join("a.png")), "image");
    fixture.assert_inbox_file("c.pdf");
    fixture.assert_para_missing("3_Resources/Images/a (2).png");
    assert_eq!(fixture.read(fixture.para().join("3_Resources/Images/a.png")), "existing");

    let store = fixture.store();
    let inbox = fs::canonicalize(fixture.inbox()).unwrap();
    let report = UndoManager::new(&store).undo_latest(&inbox, false).unwrap();
    assert_eq!(report.restored, 0);
    assert_eq!(report.missing.len(), 2);
}

#[test]
fn test_undo_without_history_fails() {
    let fixture = TestFixture::new();

    let err = fixture.undo(false).unwrap_err();

    assert!(format!("{:#}", err).contains("No previous parsort runs"));
}

#[test]
fn test_undo_dry_run_moves_nothing() {
    let fixture = TestFixture::new();
    fixture.create_inbox_file("a.png", "image");
    fixture.sort(false).unwrap();

    fixture.undo(true).unwrap();

    fixture.assert_para_file("3_Resources/Images/a.png");
    assert!(!fixture.inbox().join("a.png").exists());
}

#[test]
fn test_undo_skips_files_removed_since() {
    let fixture = TestFixture::new();
    fixture.create_inbox_file("a.png", "image");
    fixture.create_inbox_file("c.pdf", "pdf");
    fixture.sort(false).unwrap();
    fs::remove_file(fixture.para().join("3_Resources/PDFs/c.pdf")).unwrap();

    fixture.undo(false).unwrap();

    fixture.assert_inbox_file("a.png");
    assert!(!fixture.inbox().join("c.pdf").exists());
}

#[test]
fn test_undo_backs_up_occupied_source() {
    let fixture = TestFixture::new();
    fixture.create_inbox_file("a.png", "sorted");
    fixture.sort(false).unwrap();
    fixture.create_inbox_file("a.png", "newer");

    fixture.undo(false).unwrap();

    assert_eq!(fixture.read(fixture.inbox().join("a.png")), "sorted");
    let backups: Vec<_> = fs::read_dir(fixture.inbox())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("a.png.bak."))
        .collect();
    assert_eq!(backups.len(), 1);
    assert_eq!(fixture.read(backups[0].path()), "newer");
}

#[test]
fn test_undo_recreates_removed_inbox() {
    let fixture = TestFixture::new();
    fixture.create_inbox_file("a.png", "image");
    fixture.sort(false).unwrap();

    let store = fixture.store();
    let inbox = fs::canonicalize(fixture.inbox()).unwrap();
    fs::remove_dir(&inbox).unwrap();

    let report = UndoManager::new(&store).undo_latest(&inbox, false).unwrap();

    assert_eq!(report.restored, 1);
    fixture.assert_inbox_file("a.png");
}

// ============================================================================
// Guided Placement
// ============================================================================

#[test]
fn test_guided_accepting_suggestions() {
    let fixture = TestFixture::new();
    fs::create_dir_all(fixture.para().join("3_Resources/Images")).unwrap();
    fixture.create_inbox_file("a.png", "image");

    // Enter at the bucket menu, Enter in the suggested folder.
    let prompter = fixture.sort_guided(&["", ""]).unwrap();

    assert!(prompter.saw("Suggested: resources/Images"));
    fixture.assert_para_file("3_Resources/Images/a.png");
    let records = fixture.latest_records();
    assert_eq!(records[0].0, "Images");
}

#[test]
fn test_guided_other_bucket_is_logged_as_guided() {
    let fixture = TestFixture::new();
    fs::create_dir_all(fixture.para().join("2_Areas/Health")).unwrap();
    fixture.create_inbox_file("scan.pdf", "pdf");

    // areas, descend into Health, accept.
    fixture.sort_guided(&["2", "1", ""]).unwrap();

    fixture.assert_para_file("2_Areas/Health/scan.pdf");
    assert_eq!(fixture.latest_records()[0].0, "guided");
}

#[test]
fn test_guided_skip_and_quit() {
    let fixture = TestFixture::new();
    fixture.create_inbox_file("a.png", "a");
    fixture.create_inbox_file("b.txt", "b");
    fixture.create_inbox_file("c.pdf", "c");

    // a.png: projects, accept. b.txt: skip. c.pdf: quit.
    let prompter = fixture.sort_guided(&["1", "", "s", "q"]).unwrap();

    assert!(prompter.saw("Suggested: (no suggestion)"));
    fixture.assert_para_file("1_Projects/a.png");
    fixture.assert_inbox_file("b.txt");
    fixture.assert_inbox_file("c.pdf");
    assert_eq!(fixture.latest_records().len(), 1);

    fixture.undo(false).unwrap();
    fixture.assert_inbox_file("a.png");
}

#[test]
fn test_guided_invalid_input_reprompts() {
    let fixture = TestFixture::new();
    fixture.create_inbox_file("notes.txt", "n");

    // No suggestion, so Enter is invalid; 9 is out of range.
    let prompter = fixture.sort_guided(&["", "9", "2", ""]).unwrap();

    assert!(prompter.saw("No suggestion available"));
    assert!(prompter.saw("Invalid input"));
    fixture.assert_para_file("2_Areas/notes.txt");
}

#[test]
fn test_guided_end_of_input_quits_without_log() {
    let fixture = TestFixture::new();
    fixture.create_inbox_file("a.png", "a");

    fixture.sort_guided(&[]).unwrap();

    fixture.assert_inbox_file("a.png");
    assert!(fixture.latest_records().is_empty());
}

// ============================================================================
// Config Bootstrap and Filters
// ============================================================================

#[test]
fn test_init_writes_config_and_keeps_existing() {
    let fixture = TestFixture::new();
    let paths = AppPaths::new(fixture.state().join("conf/config.toml"), fixture.state());

    run_cli_with_prompter(
        Command::Init {
            guided: false,
            force: false,
        },
        &paths,
        &mut Scripted::new(&[]),
    )
    .unwrap();

    let config = PathConfig::load_from_file(&paths.config_file).unwrap();
    assert_eq!(config.buckets.menu_order(), vec!["projects", "areas", "resources", "archive"]);
    assert!(config.rules.iter().any(|r| r.name == "Images"));

    fs::write(&paths.config_file, "# mine\n").unwrap();
    let init = |force| {
        run_cli_with_prompter(
            Command::Init { guided: false, force },
            &paths,
            &mut Scripted::new(&[]),
        )
    };

    init(false).unwrap();
    assert_eq!(fs::read_to_string(&paths.config_file).unwrap(), "# mine\n");

    init(true).unwrap();
    assert!(PathConfig::load_from_file(&paths.config_file).is_ok());
}

#[test]
fn test_init_guided_uses_answers_and_creates_folders() {
    let fixture = TestFixture::new();
    let root = fixture.temp_dir.path().join("life");
    let paths = AppPaths::new(fixture.state().join("config.toml"), fixture.state());
    let root_answer = root.display().to_string();

    run_cli_with_prompter(
        Command::Init {
            guided: true,
            force: false,
        },
        &paths,
        &mut Scripted::new(&[&root_answer, "Work", "", "", "", "y"]),
    )
    .unwrap();

    let config = PathConfig::load_from_file(&paths.config_file).unwrap();
    assert_eq!(config.root, root);
    assert_eq!(config.bucket_dir("projects"), root.join("Work"));
    assert!(root.join("Work").is_dir());
    assert!(root.join("4_Archive").is_dir());
}

#[test]
fn test_filters_keep_partial_downloads() {
    let fixture = TestFixture::with_config(&format!("{}\n[filters]\nignore = [\"*.part\"]\n", CONFIG));
    fixture.create_inbox_file("movie.zip.part", "partial");
    fixture.create_inbox_file("done.zip", "zip");

    fixture.sort(false).unwrap();

    fixture.assert_inbox_file("movie.zip.part");
    fixture.assert_para_file("4_Archive/done.zip");
}

#[test]
fn test_explicit_config_overrides_user_config() {
    let fixture = TestFixture::new();
    let other = fixture.temp_dir.path().join("other.toml");
    let elsewhere = fixture.temp_dir.path().join("elsewhere");
    fs::write(
        &other,
        format!(
            "root = '{}'\n[buckets]\nresources = \"R\"\n[[rules]]\nname = \"Images\"\next = [\"png\"]\nbucket = \"resources\"\n",
            elsewhere.display()
        ),
    )
    .unwrap();
    fixture.create_inbox_file("a.png", "image");

    fixture
        .run(
            Command::Sort {
                inbox: fixture.inbox(),
                config: Some(other),
                dry_run: false,
                guided: false,
            },
            &mut Scripted::new(&[]),
        )
        .unwrap();

    assert!(elsewhere.join("R/a.png").is_file());
}

#[test]
fn test_missing_explicit_config_fails() {
    let fixture = TestFixture::new();
    fixture.create_inbox_file("a.png", "image");

    let result = fixture.run(
        Command::Sort {
            inbox: fixture.inbox(),
            config: Some(fixture.temp_dir.path().join("missing.toml")),
            dry_run: false,
            guided: false,
        },
        &mut Scripted::new(&[]),
    );

    assert!(result.is_err());
    fixture.assert_inbox_file("a.png");
}

#[test]
fn test_rules_with_unknown_bucket_are_dropped() {
    let fixture = TestFixture::with_config(&format!(
        "{}\n[[rules]]\nname = \"Docs\"\next = [\"txt\"]\nbucket = \"nowhere\"\n",
        CONFIG
    ));
    fixture.create_inbox_file("notes.txt", "n");

    fixture.sort(false).unwrap();

    fixture.assert_inbox_file("notes.txt");
    let config = PathConfig::load_from_file(&fixture.config_file()).unwrap();
    assert_eq!(config.warnings.len(), 1);
}
