//! Runner output keeps the order in which stdout and stderr lines were written.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use testhub::runner::{Browser, Invocation, Launcher, ProcessLauncher};

const INTERLEAVED: &str = r#"#!/bin/sh
i=1
while [ "$i" -le 200 ]; do
  echo "out$i"
  echo "err$i" >&2
  i=$((i + 1))
done
"#;

#[test]
fn test_stdout_and_stderr_interleave_in_write_order() {
    let dir = tempfile::tempdir().unwrap();
    let runner = dir.path().join("interleaved.sh");
    std::fs::write(&runner, INTERLEAVED).unwrap();
    std::fs::set_permissions(&runner, std::fs::Permissions::from_mode(0o755)).unwrap();

    let expected: Vec<String> = (1..=200)
        .flat_map(|i| [format!("out{i}"), format!("err{i}")])
        .collect();

    let launcher = ProcessLauncher::new(runner.display().to_string(), 10_000);
    let invocation = Invocation {
        test_file: PathBuf::from("suite.robot"),
        browser: Browser::Chrome,
        log_file: dir.path().join("log.html"),
    };

    for _ in 0..5 {
        let execution = launcher.launch(&invocation).unwrap();
        assert_eq!(execution.exit_code, Some(0));
        assert_eq!(execution.output.line_count(), 400);
        assert_eq!(execution.output.lines(), expected.as_slice());
    }
}
