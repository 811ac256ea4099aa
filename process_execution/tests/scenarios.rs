// Copyright 2024 Atomic Command contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The concrete scenarios of spec.md §8, run against real child processes.
//! Grounded in `pantsbuild-pants`' convention of exercising process spawning
//! through crate-local integration tests rather than mocking `Command`.

use process_execution::{Command, RawValue};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn trivial_success_cleans_up_its_own_temp_dir() {
    init_logging();
    let temp = tempfile::tempdir().unwrap();

    let command = Command::new(vec!["/bin/true".to_string()], false, vec![]).unwrap();
    command.run(temp.path()).unwrap();
    let codes = command.join().unwrap();
    assert_eq!(codes, vec![0]);

    command.commit(temp.path()).unwrap();
    let remaining: Vec<_> = std::fs::read_dir(temp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert!(
        remaining.is_empty(),
        "expected the auto-generated stdout/stderr files to be removed, found {remaining:?}"
    );
}

#[test]
fn file_promotion_moves_output_to_its_final_destination() {
    init_logging();
    let temp = tempfile::tempdir().unwrap();
    let dest_dir = tempfile::tempdir().unwrap();
    let dest = dest_dir.path().join("out.txt");

    let command = Command::new(
        vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "echo hi > %(OUT_FILE)s".to_string(),
        ],
        false,
        vec![("OUT_FILE".to_string(), RawValue::Path(dest.clone()))],
    )
    .unwrap();

    command.run(temp.path()).unwrap();
    assert_eq!(command.join().unwrap(), vec![0]);
    command.commit(temp.path()).unwrap();

    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "hi\n");
    assert!(!temp.path().join("out.txt").exists());
}

#[test]
fn missing_output_fails_commit_and_leaves_no_destination() {
    init_logging();
    let temp = tempfile::tempdir().unwrap();
    let dest_dir = tempfile::tempdir().unwrap();
    let dest = dest_dir.path().join("x");

    let command = Command::new(
        vec!["/bin/true".to_string()],
        false,
        vec![("OUT_FILE".to_string(), RawValue::Path(dest.clone()))],
    )
    .unwrap();

    command.run(temp.path()).unwrap();
    assert_eq!(command.join().unwrap(), vec![0]);

    let err = command.commit(temp.path()).unwrap_err();
    assert!(err.to_string().contains('x'), "error was: {err}");
    assert!(!dest.exists());
}

#[test]
fn chained_stdout_feeds_a_downstream_command() {
    init_logging();
    let producer_temp = tempfile::tempdir().unwrap();
    let consumer_temp = tempfile::tempdir().unwrap();
    let dest_dir = tempfile::tempdir().unwrap();
    let dest = dest_dir.path().join("count.txt");

    let producer = Command::new(
        vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "printf abc".to_string(),
        ],
        false,
        vec![("OUT_STDOUT".to_string(), RawValue::Pipe)],
    )
    .unwrap();

    let consumer = Command::new(
        vec!["/usr/bin/wc".to_string(), "-c".to_string()],
        false,
        vec![
            ("IN_STDIN".to_string(), RawValue::Upstream(producer.clone())),
            ("OUT_STDOUT".to_string(), RawValue::Path(dest.clone())),
        ],
    )
    .unwrap();

    producer.run(producer_temp.path()).unwrap();
    consumer.run(consumer_temp.path()).unwrap();

    assert_eq!(producer.join().unwrap(), vec![0]);
    assert_eq!(consumer.join().unwrap(), vec![0]);

    producer.commit(producer_temp.path()).unwrap();
    consumer.commit(consumer_temp.path()).unwrap();

    assert_eq!(std::fs::read_to_string(&dest).unwrap().trim(), "3");
}

#[test]
fn failed_command_leaves_destination_untouched() {
    init_logging();
    let temp = tempfile::tempdir().unwrap();
    let dest_dir = tempfile::tempdir().unwrap();
    let dest = dest_dir.path().join("out.txt");
    std::fs::write(&dest, "original\n").unwrap();

    let command = Command::new(
        vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "echo partial > %(OUT_FILE)s; exit 1".to_string(),
        ],
        false,
        vec![("OUT_FILE".to_string(), RawValue::Path(dest.clone()))],
    )
    .unwrap();

    command.run(temp.path()).unwrap();
    assert_eq!(command.join().unwrap(), vec![1]);

    // Caller observes the non-zero exit and skips commit.
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "original\n");
    assert_eq!(
        std::fs::read_to_string(temp.path().join("out.txt")).unwrap(),
        "partial\n"
    );
}

#[test]
fn terminate_kills_the_whole_process_group() {
    init_logging();
    let temp = tempfile::tempdir().unwrap();

    let command = Command::new(
        vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            "sleep 30 & wait".to_string(),
        ],
        false,
        vec![],
    )
    .unwrap();

    command.run(temp.path()).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(200));
    command.terminate().unwrap();

    let started = std::time::Instant::now();
    let codes = command.join().unwrap();
    assert!(
        started.elapsed() < std::time::Duration::from_secs(5),
        "join took too long after terminate: {:?}",
        started.elapsed()
    );
    assert_ne!(codes, vec![0]);
}

#[test]
fn terminate_applied_twice_is_idempotent() {
    init_logging();
    let temp = tempfile::tempdir().unwrap();

    let command = Command::new(
        vec!["/bin/sleep".to_string(), "30".to_string()],
        false,
        vec![],
    )
    .unwrap();

    command.run(temp.path()).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(100));
    command.terminate().unwrap();
    command.terminate().unwrap();

    let codes = command.join().unwrap();
    assert_ne!(codes, vec![0]);
}

#[test]
fn two_identical_commands_against_disjoint_temp_roots_produce_identical_output() {
    init_logging();
    let dest_dir = tempfile::tempdir().unwrap();

    let run_once = |name: &str| {
        let temp = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join(name);
        let command = Command::new(
            vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                "printf 'deterministic output' > %(OUT_FILE)s".to_string(),
            ],
            false,
            vec![("OUT_FILE".to_string(), RawValue::Path(dest.clone()))],
        )
        .unwrap();
        command.run(temp.path()).unwrap();
        assert_eq!(command.join().unwrap(), vec![0]);
        command.commit(temp.path()).unwrap();
        std::fs::read(&dest).unwrap()
    };

    let a = run_once("a.txt");
    let b = run_once("b.txt");
    assert_eq!(a, b);
}

#[test]
fn spec_validation_failure_leaves_no_filesystem_side_effects() {
    init_logging();
    let dest_dir = tempfile::tempdir().unwrap();
    let before: Vec<_> = std::fs::read_dir(dest_dir.path()).unwrap().collect();
    assert!(before.is_empty());

    let err = Command::new(
        vec!["/bin/true".to_string()],
        false,
        vec![(
            "TEMP_OUT_FILE".to_string(),
            RawValue::Path("sub/dir/out.txt".into()),
        )],
    )
    .unwrap_err();
    assert!(err.to_string().contains("directory component"));

    let after: Vec<_> = std::fs::read_dir(dest_dir.path()).unwrap().collect();
    assert!(after.is_empty());
}
