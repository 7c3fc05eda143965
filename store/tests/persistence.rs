//! On-disk behavior of the SQLite backend: reopen, shared files, history.

use std::thread;

use proposald_core::{Backend, ErrorKind};
use proposald_store::SqliteBackend;
use proposald_types::{ContentPolicy, File, MIME_PNG, MIME_TEXT_UTF8, PsrStatus};

fn index(body: &str) -> File {
    File::from_bytes("index.md", MIME_TEXT_UTF8, body.as_bytes())
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proposals.db");

    let (vetted, censored, pending) = {
        let store = SqliteBackend::open(&path, ContentPolicy::default()).unwrap();
        let vetted = store.new_proposal("vetted", vec![index("v")]).unwrap();
        let censored = store.new_proposal("censored", vec![index("c")]).unwrap();
        let pending = store
            .new_proposal(
                "pending",
                vec![
                    index("p1"),
                    File::from_bytes("chart.png", MIME_PNG, &[0x89, 0x50]),
                ],
            )
            .unwrap();
        store
            .set_unvetted_status(&vetted.token, PsrStatus::Vetted)
            .unwrap();
        store
            .set_unvetted_status(&censored.token, PsrStatus::Censored)
            .unwrap();
        let pending = store
            .update_unvetted(&pending.token, vec![index("p2")])
            .unwrap();
        store.close();
        (vetted, censored, pending)
    };

    let store = SqliteBackend::open(&path, ContentPolicy::default()).unwrap();

    let reopened = store.get_vetted(&vetted.token).unwrap();
    assert_eq!(reopened.record.name, "vetted");
    assert_eq!(reopened.record.merkle, vetted.merkle);
    assert_eq!(reopened.files, vec![index("v")]);

    assert_eq!(
        store.get_vetted(&censored.token).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        store.get_unvetted(&censored.token).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        store
            .set_unvetted_status(&censored.token, PsrStatus::Vetted)
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidTransition
    );

    let reopened = store.get_unvetted(&pending.token).unwrap();
    assert_eq!(reopened.record, pending);
    assert_eq!(reopened.record.version, 2);
    assert_eq!(reopened.files, vec![index("p2")]);

    let history = store.status_history(&censored.token).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].to, PsrStatus::Censored);
}

#[test]
fn two_handles_on_one_file_agree() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("proposals.db");
    let first = SqliteBackend::open(&path, ContentPolicy::default()).unwrap();
    let second = SqliteBackend::open(&path, ContentPolicy::default()).unwrap();

    let token = first.new_proposal("A", vec![index("C")]).unwrap().token;
    assert!(second.get_unvetted(&token).is_ok());

    let (a, b) = thread::scope(|scope| {
        let a = scope.spawn(|| first.set_unvetted_status(&token, PsrStatus::Vetted));
        let b = scope.spawn(|| second.set_unvetted_status(&token, PsrStatus::Censored));
        (a.join().unwrap(), b.join().unwrap())
    });

    assert!(a.is_ok() ^ b.is_ok(), "exactly one handle may decide");
    let loser = a.err().or(b.err()).unwrap();
    assert_eq!(loser.kind(), ErrorKind::InvalidTransition);
    assert_eq!(first.status_history(&token).unwrap().len(), 1);
}

#[test]
fn rejected_update_leaves_stored_state_alone() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteBackend::open(dir.path().join("p.db"), ContentPolicy::default()).unwrap();
    let record = store.new_proposal("A", vec![index("v1")]).unwrap();

    let pdf = File::from_bytes("paper.pdf", "application/pdf", b"%PDF-1.7");
    assert_eq!(
        store
            .update_unvetted(&record.token, vec![pdf])
            .unwrap_err()
            .kind(),
        ErrorKind::ContentVerification
    );

    let current = store.get_unvetted(&record.token).unwrap();
    assert_eq!(current.record, record);
    assert_eq!(current.files, vec![index("v1")]);
}
