//! Filter protocol tests using `sh` as a stand-in for an interactive finder

use afx::{AfxError, Environment, Filter, Package, PackageSet, PackageSource, select_one};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

fn packages() -> PackageSet {
    PackageSet::new(
        ["alpha", "beta", "gamma"]
            .into_iter()
            .map(|name| {
                Package::new(
                    name,
                    PackageSource::Http {
                        url: format!("https://example.com/{}", name),
                    },
                )
            })
            .collect(),
    )
    .unwrap()
}

fn sh(script: &str) -> Filter {
    Filter::new("sh").arg("-c").arg(script)
}

#[test]
fn test_select_reads_choice_from_stdout() {
    let set = packages();
    let pkg = select_one(&set, &sh("cat >/dev/null; echo beta"), &Environment::default()).unwrap();
    assert_eq!(pkg.name, "beta");
}

#[test]
fn test_select_receives_candidates_on_stdin() {
    let set = packages();
    let pkg = select_one(&set, &sh("tail -n 1"), &Environment::default()).unwrap();
    assert_eq!(pkg.name, "gamma");
}

#[test]
fn test_filter_closing_stdin_early_is_fine() {
    let set = packages();
    let pkg = select_one(&set, &sh("head -n 1"), &Environment::default()).unwrap();
    assert_eq!(pkg.name, "alpha");
}

#[test]
fn test_filter_sees_resolved_environment() {
    let set = packages();
    let env = Environment::from_vars([("AFX_PICK", "gamma")]);
    let pkg = select_one(&set, &sh("cat >/dev/null; echo \"$AFX_PICK\""), &env).unwrap();
    assert_eq!(pkg.name, "gamma");
}

#[test]
fn test_unknown_output_is_selection_not_found() {
    let set = packages();
    let err = select_one(&set, &sh("cat >/dev/null; echo nonexistent"), &Environment::default())
        .unwrap_err();
    assert!(matches!(err, AfxError::SelectionNotFound));
}

#[test]
fn test_empty_output_is_selection_not_found() {
    let set = packages();
    let err = select_one(&set, &sh("cat >/dev/null"), &Environment::default()).unwrap_err();
    assert!(matches!(err, AfxError::SelectionNotFound));
}

#[test]
fn test_nonzero_exit_is_filter_failure() {
    let set = packages();
    let err = select_one(&set, &sh("cat >/dev/null; echo alpha; exit 3"), &Environment::default())
        .unwrap_err();
    assert!(matches!(err, AfxError::FilterProcessFailed { .. }));
}

#[test]
fn test_missing_command_is_filter_failure() {
    let set = packages();
    let filter = Filter::new("afx-no-such-filter-binary");
    let err = select_one(&set, &filter, &Environment::default()).unwrap_err();
    assert!(matches!(err, AfxError::FilterProcessFailed { .. }));
}

#[test]
fn test_timeout_kills_filter() {
    let set = packages();
    let filter = sh("exec sleep 30").timeout(Duration::from_secs(1));

    let start = Instant::now();
    let err = select_one(&set, &filter, &Environment::default()).unwrap_err();

    assert!(matches!(err, AfxError::FilterProcessFailed { .. }));
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_echoing_filter_with_more_input_than_a_pipe_holds() {
    // Roughly 1 MiB of candidates, far past the kernel pipe buffer
    let set = PackageSet::new(
        (0..50_000)
            .map(|i| {
                Package::new(
                    format!("package-number-{:08}", i),
                    PackageSource::Http {
                        url: format!("https://example.com/{}", i),
                    },
                )
            })
            .collect(),
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let filter = Filter::new("cat").timeout(Duration::from_secs(20));
        let result = select_one(&set, &filter, &Environment::default()).map(|p| p.name.clone());
        let _ = tx.send(result);
    });

    let selected = rx
        .recv_timeout(Duration::from_secs(60))
        .expect("filter exchange should finish within its timeout")
        .unwrap();
    assert_eq!(selected, "package-number-00000000");
}
