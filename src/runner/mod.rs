//! Run Orchestrator -- launch the external runner once per test file, in order,
//! and record every outcome in the Result Store.

pub mod launcher;
pub mod uploads;

pub use self::launcher::{
    CapturedOutput, Execution, Invocation, LaunchFault, Launcher, ProcessLauncher,
};

use crate::config::{DurationMetric, RunnerConfig};
use crate::storage::{ResultStore, StoreError, TestStatus};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Browser handed to the suite as the `BROWSER` variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chrome,
    Firefox,
    Edge,
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Browser::Chrome => write!(f, "chrome"),
            Browser::Firefox => write!(f, "firefox"),
            Browser::Edge => write!(f, "edge"),
        }
    }
}

/// What one file's run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub test_name: String,
    pub status: TestStatus,
    /// Runner output, or the fault description when the runner never ran.
    pub output: String,
}

pub struct Orchestrator {
    config: RunnerConfig,
    store: ResultStore,
    launcher: Box<dyn Launcher>,
}

impl Orchestrator {
    /// Orchestrator that spawns `config.program` for every file.
    pub fn new(config: RunnerConfig, store: ResultStore) -> Self {
        let launcher = ProcessLauncher::from_config(&config);
        Self::with_launcher(config, store, Box::new(launcher))
    }

    pub fn with_launcher(config: RunnerConfig, store: ResultStore, launcher: Box<dyn Launcher>) -> Self {
        Self {
            config,
            store,
            launcher,
        }
    }

    /// Run every file sequentially and persist one row per file.
    ///
    /// A file that fails, or whose runner cannot even start, does not stop the
    /// batch. A storage error does.
    pub fn run<P: AsRef<Path>>(
        &self,
        file_paths: &[P],
        browser: Browser,
    ) -> Result<Vec<RunOutcome>, StoreError> {
        info!(files = file_paths.len(), %browser, "starting test batch");

        let mut outcomes = Vec::with_capacity(file_paths.len());
        for path in file_paths {
            outcomes.push(self.run_one(path.as_ref(), browser)?);
        }

        let failed = outcomes
            .iter()
            .filter(|o| o.status == TestStatus::Fail)
            .count();
        info!(files = outcomes.len(), failed, "test batch finished");
        Ok(outcomes)
    }

    fn run_one(&self, path: &Path, browser: Browser) -> Result<RunOutcome, StoreError> {
        let test_name = display_name(path);
        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        let stem = Path::new(&test_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| test_name.clone());

        let launched = launcher::reserve_log_path(&self.config.log_dir, &stem, &stamp).and_then(|log_file| {
            let invocation = Invocation {
                test_file: path.to_path_buf(),
                browser,
                log_file,
            };
            info!(test = %test_name, %browser, log = %invocation.log_file.display(), "running test file");
            self.launcher.launch(&invocation)
        });

        let (status, duration, output) = match launched {
            Ok(execution) => {
                let status = TestStatus::from_exit_code(execution.exit_code);
                let duration = match self.config.duration_metric {
                    DurationMetric::OutputLines => execution.output.line_count() as f64,
                    DurationMetric::ElapsedSeconds => execution.elapsed.as_secs_f64(),
                };
                info!(
                    test = %test_name,
                    %status,
                    exit_code = ?execution.exit_code,
                    lines = execution.output.line_count(),
                    "runner exited"
                );
                (status, duration, execution.output.into_text())
            }
            Err(fault) => {
                warn!(test = %test_name, error = %fault, "runner could not be launched");
                (TestStatus::Fail, 0.0, fault.to_string())
            }
        };

        self.store.insert(&test_name, duration, status)?;

        Ok(RunOutcome {
            test_name,
            status,
            output,
        })
    }
}

/// Base name of `path`, falling back to the whole path when there is none.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use std::collections::HashMap;
    use std::io;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    enum Scripted {
        Exit(i32, &'static [&'static str]),
        Fault,
    }

    /// Launcher that replays canned results keyed by file name.
    struct FakeLauncher {
        script: HashMap<&'static str, Scripted>,
        seen: Mutex<Vec<Invocation>>,
        /// When this file is launched, drop the results table in this database.
        drop_table_on: Mutex<Option<(&'static str, PathBuf)>>,
    }

    impl FakeLauncher {
        fn new(script: Vec<(&'static str, Scripted)>) -> Self {
            Self {
                script: script.into_iter().collect(),
                seen: Mutex::new(Vec::new()),
                drop_table_on: Mutex::new(None),
            }
        }
    }

    impl Launcher for &'static FakeLauncher {
        fn launch(&self, invocation: &Invocation) -> Result<Execution, LaunchFault> {
            self.seen.lock().unwrap().push(invocation.clone());
            let name = display_name(&invocation.test_file);
            if let Some((target, db_path)) = self.drop_table_on.lock().unwrap().as_ref() {
                if *target == name {
                    rusqlite::Connection::open(db_path)
                        .unwrap()
                        .execute_batch("DROP TABLE test_results;")
                        .unwrap();
                }
            }
            match self.script.get(name.as_str()) {
                Some(Scripted::Exit(code, lines)) => {
                    let mut output = CapturedOutput::new(100);
                    for line in lines.iter() {
                        output.push(line.to_string());
                    }
                    Ok(Execution {
                        exit_code: Some(*code),
                        output,
                        elapsed: Duration::from_millis(1500),
                    })
                }
                Some(Scripted::Fault) | None => Err(LaunchFault::Spawn {
                    program: "robot".to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
                }),
            }
        }
    }

    fn setup(
        script: Vec<(&'static str, Scripted)>,
        metric: DurationMetric,
    ) -> (TempDir, ResultStore, Orchestrator, &'static FakeLauncher) {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(&StorageConfig {
            db_path: dir.path().join("results.db"),
            max_connections: 2,
        })
        .unwrap();
        let config = RunnerConfig {
            log_dir: dir.path().join("logs"),
            duration_metric: metric,
            ..RunnerConfig::default()
        };
        let fake: &'static FakeLauncher = Box::leak(Box::new(FakeLauncher::new(script)));
        let orchestrator = Orchestrator::with_launcher(config, store.clone(), Box::new(fake));
        (dir, store, orchestrator, fake)
    }

    #[test]
    fn test_batch_continues_past_launch_fault() {
        let (_dir, store, orchestrator, _) = setup(
            vec![
                ("one.robot", Scripted::Exit(0, &["ok", "passed"])),
                ("two.robot", Scripted::Fault),
                ("three.robot", Scripted::Exit(1, &["boom"])),
            ],
            DurationMetric::OutputLines,
        );

        let outcomes = orchestrator
            .run(&["suites/one.robot", "suites/two.robot", "suites/three.robot"], Browser::Chrome)
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].test_name, "one.robot");
        assert_eq!(outcomes[0].status, TestStatus::Pass);
        assert_eq!(outcomes[0].output, "ok\npassed");
        assert_eq!(outcomes[1].test_name, "two.robot");
        assert_eq!(outcomes[1].status, TestStatus::Fail);
        assert!(outcomes[1].output.contains("No such file or directory"));
        assert_eq!(outcomes[2].status, TestStatus::Fail);

        let mut rows = store.query_recent(50, None).unwrap();
        rows.sort_by_key(|r| r.id);
        assert_eq!(rows.len(), 3);
        assert_eq!(
            (rows[0].test_name.as_str(), rows[0].status, rows[0].duration),
            ("one.robot", TestStatus::Pass, Some(2.0))
        );
        assert_eq!(
            (rows[1].test_name.as_str(), rows[1].status, rows[1].duration),
            ("two.robot", TestStatus::Fail, Some(0.0))
        );
        assert_eq!(
            (rows[2].test_name.as_str(), rows[2].status, rows[2].duration),
            ("three.robot", TestStatus::Fail, Some(1.0))
        );
    }

    #[test]
    fn test_store_failure_aborts_batch() {
        let (dir, store, orchestrator, fake) = setup(
            vec![
                ("one.robot", Scripted::Exit(0, &["ok"])),
                ("two.robot", Scripted::Exit(0, &["ok"])),
                ("three.robot", Scripted::Exit(0, &["ok"])),
            ],
            DurationMetric::OutputLines,
        );
        *fake.drop_table_on.lock().unwrap() = Some(("two.robot", dir.path().join("results.db")));

        let err = orchestrator
            .run(&["one.robot", "two.robot", "three.robot"], Browser::Chrome)
            .unwrap_err();

        assert!(matches!(err, StoreError::Sqlite(_)));
        let seen: Vec<PathBuf> = fake
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|inv| inv.test_file.clone())
            .collect();
        assert_eq!(seen, vec![PathBuf::from("one.robot"), PathBuf::from("two.robot")]);
        assert!(store.query_recent(50, None).is_err());
    }

    #[test]
    fn test_invocations_are_sequential_and_well_formed() {
        let (dir, _store, orchestrator, fake) = setup(
            vec![
                ("a.robot", Scripted::Exit(0, &[])),
                ("b.robot", Scripted::Exit(0, &[])),
            ],
            DurationMetric::OutputLines,
        );

        orchestrator.run(&["a.robot", "b.robot"], Browser::Edge).unwrap();

        let seen = fake.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].test_file, PathBuf::from("a.robot"));
        assert_eq!(seen[1].test_file, PathBuf::from("b.robot"));
        for inv in seen.iter() {
            assert_eq!(inv.browser, Browser::Edge);
            assert_eq!(inv.log_file.parent(), Some(dir.path().join("logs").as_path()));
            assert_eq!(inv.log_file.extension().unwrap(), "html");
        }
        assert!(seen[0]
            .log_file
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("a_"));
    }

    #[test]
    fn test_elapsed_seconds_metric() {
        let (_dir, store, orchestrator, _) = setup(
            vec![("slow.robot", Scripted::Exit(0, &["x", "y", "z"]))],
            DurationMetric::ElapsedSeconds,
        );

        orchestrator.run(&["slow.robot"], Browser::Chrome).unwrap();

        let rows = store.query_recent(1, None).unwrap();
        assert_eq!(rows[0].duration, Some(1.5));
    }

    #[test]
    fn test_empty_batch() {
        let (_dir, store, orchestrator, _) = setup(vec![], DurationMetric::OutputLines);
        let outcomes = orchestrator.run::<&str>(&[], Browser::Chrome).unwrap();
        assert!(outcomes.is_empty());
        assert!(store.query_recent(50, None).unwrap().is_empty());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(Path::new("suites/smoke/login.robot")), "login.robot");
        assert_eq!(display_name(Path::new("login.robot")), "login.robot");
    }

    #[test]
    fn test_browser_display_and_serde() {
        assert_eq!(Browser::Chrome.to_string(), "chrome");
        assert_eq!(Browser::Firefox.to_string(), "firefox");
        assert_eq!(Browser::Edge.to_string(), "edge");
        let parsed: Browser = serde_json::from_str("\"firefox\"").unwrap();
        assert_eq!(parsed, Browser::Firefox);
        assert_eq!(Browser::default(), Browser::Chrome);
    }
}
