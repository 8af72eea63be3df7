use super::helpers::*;
use crate::*;
use anyhow::Result;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use table::TableError;
use tempfile::tempdir;

#[test]
fn missing_manifest_is_an_empty_stack() -> Result<()> {
    let root = tempdir()?;
    let stack = open_stack(root.path())?;
    assert!(stack.is_empty());
    assert_eq!(stack.next_update_index(), 1);
    assert!(stack.merged().read_ref("refs/heads/main")?.is_none());
    Ok(())
}

#[test]
fn reload_sees_an_external_add() -> Result<()> {
    let root = tempdir()?;
    let mut one = open_stack(root.path())?;
    let mut two = open_stack(root.path())?;

    put_ref(&mut one, "refs/heads/main", b"v1")?;
    assert!(two.is_empty(), "no reload yet");

    two.reload()?;
    assert_eq!(two.len(), 1);
    assert_eq!(
        live_refs(&two)?,
        [("refs/heads/main".to_string(), b"v1".to_vec())]
    );
    Ok(())
}

#[test]
fn reload_reuses_readers_that_are_still_listed() -> Result<()> {
    let root = tempdir()?;
    let mut one = open_stack(root.path())?;
    let mut two = open_stack(root.path())?;

    put_ref(&mut one, "refs/heads/a", &[b'a'; 4096])?;
    two.reload()?;
    let kept = Arc::clone(&two.readers[0]);

    // A second table lands in a different tier, so the first survives.
    put_ref(&mut one, "refs/heads/b", &[b'b'; 600])?;
    two.reload()?;

    assert_eq!(two.len(), 2);
    assert!(
        Arc::ptr_eq(&kept, &two.readers[0]),
        "unchanged tables must not be reopened"
    );
    Ok(())
}

#[test]
fn reload_converges_after_an_external_compaction() -> Result<()> {
    let root = tempdir()?;
    let mut one = open_stack(root.path())?;
    let mut two = open_stack(root.path())?;

    put_ref(&mut one, "refs/heads/main", &[b'a'; 4096])?;
    delete_ref(&mut one, "refs/heads/main")?;
    put_ref(&mut one, "refs/heads/topic", &[b'b'; 600])?;
    two.reload()?;
    assert_eq!(two.len(), 3);

    // `one` rewrites the world: new table names, old files deleted.
    one.compact_all()?;

    two.reload()?;
    assert_eq!(two.len(), 1);
    assert_eq!(
        live_refs(&two)?,
        [("refs/heads/topic".to_string(), vec![b'b'; 600])]
    );
    Ok(())
}

#[test]
fn missing_table_with_a_stable_manifest_is_not_found() -> Result<()> {
    let root = tempdir()?;
    fs::create_dir_all(tables_dir(root.path()))?;
    fs::write(
        list_path(root.path()),
        "000000000001-000000000001.ref\n",
    )?;

    let err = open_stack(root.path()).unwrap_err();
    match err {
        Error::Table(TableError::Io(e)) => {
            assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected a not-found error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn reload_converges_while_the_manifest_moves_underneath() -> Result<()> {
    let root = tempdir()?;
    let mut stack = open_stack(root.path())?;
    put_ref(&mut stack, "refs/heads/main", b"v1")?;

    let list = list_path(root.path());
    let real_manifest = fs::read_to_string(&list)?;

    // Simulate an external compaction mid-swap: the manifest temporarily
    // names a table that does not exist, then flips back.
    fs::write(&list, "00000000000f-00000000000f.ref\n")?;
    let restore = {
        let list = list.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            fs::write(&list, real_manifest).expect("restore manifest");
        })
    };

    // Reloads during the window surface not-found at worst; once the real
    // manifest is back they converge well inside the retry deadline.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match stack.reload() {
            Ok(()) => break,
            Err(e) if e.is_not_found() && Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(1));
            }
            Err(e) => return Err(e.into()),
        }
    }
    restore.join().expect("restore thread");

    assert_eq!(
        live_refs(&stack)?,
        [("refs/heads/main".to_string(), b"v1".to_vec())]
    );
    Ok(())
}

#[test]
fn every_mutation_leaves_readers_matching_the_manifest() -> Result<()> {
    let root = tempdir()?;
    let mut stack = open_stack(root.path())?;

    for i in 0..6 {
        put_ref(&mut stack, &format!("refs/heads/k{i}"), &[b'v'; 256])?;
        let names: Vec<String> = stack
            .readers
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(stack.read_names()?, names);
    }
    stack.compact_all()?;
    let names: Vec<String> = stack
        .readers
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    assert_eq!(stack.read_names()?, names);
    Ok(())
}
