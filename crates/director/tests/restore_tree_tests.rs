//! Restore tree population from the catalog and interactive marking.

use director::catalog::FileEntry;
use director::{JobId, MemoryCatalog, NodeId, RestoreTree};

fn catalog_of(rows: &[(u32, &str, u32)]) -> MemoryCatalog {
    let catalog = MemoryCatalog::new();
    catalog.insert_files(
        rows.iter()
            .map(|(job, path, fi)| FileEntry::new(JobId(*job), path, *fi)),
    );
    catalog
}

fn tree_of(paths: &[&str]) -> RestoreTree {
    let rows: Vec<(u32, &str, u32)> = paths
        .iter()
        .enumerate()
        .map(|(i, p)| (1, *p, i as u32 + 1))
        .collect();
    RestoreTree::from_catalog(&catalog_of(&rows), &[JobId(1)]).unwrap()
}

/// Every node's `extract_descendant` must equal a brute-force subtree scan.
fn assert_ancestors_consistent(tree: &RestoreTree) {
    fn any_marked(tree: &RestoreTree, id: NodeId) -> bool {
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if tree.node(n).extract {
                return true;
            }
            stack.extend(tree.node(n).child_ids());
        }
        false
    }
    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        assert_eq!(
            tree.node(id).extract_descendant(),
            any_marked(tree, id),
            "inconsistent at {}",
            tree.path_of(id)
        );
        stack.extend(tree.node(id).child_ids());
    }
}

#[test]
fn test_glob_segment_marks_matching_siblings() {
    let mut tree = tree_of(&["/data/subA/file1", "/data/subB/file1", "/data/subA/file2"]);
    tree.cd("/data").unwrap();
    assert_eq!(tree.mark("sub*/file1").unwrap(), 2);
    assert_eq!(tree.marked_count(), 2);
    assert_ancestors_consistent(&tree);
}

#[test]
fn test_any_depth_marks_every_level() {
    let mut tree = tree_of(&[
        "/srv/file1",
        "/srv/a/file1",
        "/srv/a/b/c/file1",
        "/srv/a/b/c/file2",
    ]);
    assert_eq!(tree.mark("**/file1").unwrap(), 3);
    assert_eq!(tree.mark("**/file1").unwrap(), 0);
    assert_ancestors_consistent(&tree);
}

#[test]
fn test_unmark_restores_consistency() {
    let mut tree = tree_of(&["/etc/hosts", "/etc/ssh/sshd_config", "/home/u/notes"]);
    assert!(tree.mark("/etc").unwrap() > 0);
    assert!(tree.mark("/home/u/notes").unwrap() == 1);
    assert_ancestors_consistent(&tree);

    assert_eq!(tree.unmark("/home/**/notes").unwrap(), 1);
    assert_eq!(tree.unmark("/home/**/notes").unwrap(), 0);
    assert_ancestors_consistent(&tree);
    assert!(tree.node(tree.root()).extract_descendant());
}

#[test]
fn test_later_job_wins_for_same_path() {
    let catalog = catalog_of(&[
        (2, "/etc/hosts", 7),
        (1, "/etc/hosts", 3),
        (1, "/etc/passwd", 4),
    ]);
    let mut tree = RestoreTree::from_catalog(&catalog, &[JobId(1), JobId(2)]).unwrap();
    tree.mark("/etc/*").unwrap();
    let mut selected = tree.selected();
    selected.sort();
    assert_eq!(selected, vec![(JobId(1), 4), (JobId(2), 7)]);
}

#[test]
fn test_catalog_outage_fails_the_build() {
    let catalog = catalog_of(&[(1, "/etc/hosts", 1)]);
    catalog.set_unavailable(Some("connection lost"));
    assert!(RestoreTree::from_catalog(&catalog, &[JobId(1)]).is_err());
}

#[test]
fn test_cd_then_relative_glob() {
    let mut tree = tree_of(&["/srv/www/index.html", "/srv/www/app.js", "/srv/db/data"]);
    assert_eq!(tree.cd("/s*/www").unwrap(), "/srv/www/");
    assert_eq!(tree.mark("*.js").unwrap(), 1);
    assert_eq!(tree.mark("../db/*").unwrap(), 1);
    assert_eq!(tree.pwd(), "/srv/www/");
    let marked: Vec<String> = tree
        .walk()
        .filter(|(_, n)| n.extract)
        .map(|(p, _)| p)
        .collect();
    assert_eq!(marked, vec!["/srv/db/data", "/srv/www/app.js"]);
}

#[test]
fn test_drive_letter_anchors_at_drive() {
    let mut tree = tree_of(&["C:/Users/a/file1", "D:/backup/file1"]);
    tree.cd("D:/backup").unwrap();
    assert_eq!(tree.mark("c:/Users/**/file1").unwrap(), 1);
    let marked: Vec<String> = tree
        .walk()
        .filter(|(_, n)| n.extract)
        .map(|(p, _)| p)
        .collect();
    assert_eq!(marked, vec!["/C:/Users/a/file1"]);
}

#[test]
fn test_tree_feeds_bootstrap() {
    let mut tree = tree_of(&["/etc/", "/etc/hosts", "/etc/passwd", "/var/log"]);
    tree.mark("/etc").unwrap();
    let mut bsr = director::BootstrapRecord::new();
    assert_eq!(tree.add_to_bootstrap(&mut bsr), 3);
    assert_eq!(bsr.job_ids(), vec![JobId(1)]);
}
