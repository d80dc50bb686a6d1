//! Tree operations for tables and rows.
//!
//! In Git, a tree is a directory. Here the root tree holds one directory per
//! table and each table directory holds one `{key}.json` blob per row. Trees
//! are immutable: every write produces a new root tree and leaves the old one
//! untouched.

use git2::{FileMode, ObjectType, Oid, Repository, Tree};

use crate::storage::blob::{self, Row};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::types::{RowKey, TableName};

/// Write an empty tree and return its id.
pub(crate) fn empty_tree(repo: &Repository) -> StoreResult<Oid> {
    Ok(repo.treebuilder(None)?.write()?)
}

/// The directory tree of `table`, if the table has any rows.
fn table_tree<'repo>(
    repo: &'repo Repository,
    root: &Tree<'_>,
    table: &TableName,
) -> StoreResult<Option<Tree<'repo>>> {
    let entry = match root.get_name(table.as_str()) {
        Some(entry) => entry,
        None => return Ok(None),
    };

    if entry.kind() != Some(ObjectType::Tree) {
        return Err(StoreError::CorruptedData {
            path: table.to_string(),
            reason: format!("expected a directory, found {:?}", entry.kind()),
        });
    }

    Ok(Some(repo.find_tree(entry.id())?))
}

/// Read one row.
pub(crate) fn read_row(
    repo: &Repository,
    root: &Tree<'_>,
    table: &TableName,
    key: &RowKey,
) -> StoreResult<Option<Row>> {
    let Some(dir) = table_tree(repo, root, table)? else {
        return Ok(None);
    };

    let entry = match dir.get_name(&key.file_name()) {
        Some(entry) => entry,
        None => return Ok(None),
    };

    if entry.kind() != Some(ObjectType::Blob) {
        return Err(StoreError::CorruptedData {
            path: format!("{}/{}", table, key.file_name()),
            reason: format!("expected a file, found {:?}", entry.kind()),
        });
    }

    let blob = repo.find_blob(entry.id())?;
    blob::deserialize_row(blob.content(), key).map(Some)
}

/// List the keys of every row in `table`, sorted. A missing table is empty.
pub(crate) fn list_keys(
    repo: &Repository,
    root: &Tree<'_>,
    table: &TableName,
) -> StoreResult<Vec<RowKey>> {
    let Some(dir) = table_tree(repo, root, table)? else {
        return Ok(Vec::new());
    };

    let mut keys: Vec<RowKey> = dir
        .iter()
        .filter(|entry| entry.kind() == Some(ObjectType::Blob))
        .filter_map(|entry| {
            let name = entry.name()?;
            RowKey::new(name.strip_suffix(".json")?).ok()
        })
        .collect();
    keys.sort();

    Ok(keys)
}

/// Write `row` into `table`, replacing any row with the same key.
///
/// Returns the new root tree.
pub(crate) fn put_row(
    repo: &Repository,
    root: &Tree<'_>,
    table: &TableName,
    row: &Row,
) -> StoreResult<Oid> {
    let blob = repo.blob(&blob::serialize_row(row)?)?;

    let existing = table_tree(repo, root, table)?;
    let mut dir = repo.treebuilder(existing.as_ref())?;
    dir.insert(row.key.file_name(), blob, FileMode::Blob.into())?;
    let dir_id = dir.write()?;

    let mut top = repo.treebuilder(Some(root))?;
    top.insert(table.as_str(), dir_id, FileMode::Tree.into())?;
    Ok(top.write()?)
}

/// Remove a row. An emptied table directory is removed with it.
///
/// Returns the new root tree.
pub(crate) fn remove_row(
    repo: &Repository,
    root: &Tree<'_>,
    table: &TableName,
    key: &RowKey,
) -> StoreResult<Oid> {
    let not_found = || StoreError::RowNotFound {
        table: table.clone(),
        key: key.clone(),
    };

    let existing = table_tree(repo, root, table)?.ok_or_else(not_found)?;
    let mut dir = repo.treebuilder(Some(&existing))?;
    if dir.get(key.file_name())?.is_none() {
        return Err(not_found());
    }
    dir.remove(key.file_name())?;

    let mut top = repo.treebuilder(Some(root))?;
    if dir.is_empty() {
        top.remove(table.as_str())?;
    } else {
        let dir_id = dir.write()?;
        top.insert(table.as_str(), dir_id, FileMode::Tree.into())?;
    }
    Ok(top.write()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::storage::blob::columns;

    fn setup_repo() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn row(key: &str, value: serde_json::Value) -> Row {
        Row::new(RowKey::new(key).unwrap(), columns(value).unwrap())
    }

    #[test]
    fn test_put_and_read() {
        let (_dir, repo) = setup_repo();
        let users = TableName::new("users").unwrap();
        let empty = repo.find_tree(empty_tree(&repo).unwrap()).unwrap();

        let alice = row("alice", json!({"name": "Alice"}));
        let root_id = put_row(&repo, &empty, &users, &alice).unwrap();
        let root = repo.find_tree(root_id).unwrap();

        let found = read_row(&repo, &root, &users, &alice.key).unwrap().unwrap();
        assert_eq!(found, alice);

        // The old tree is a snapshot and did not change.
        assert!(read_row(&repo, &empty, &users, &alice.key).unwrap().is_none());
    }

    #[test]
    fn test_missing_table_reads_empty() {
        let (_dir, repo) = setup_repo();
        let root = repo.find_tree(empty_tree(&repo).unwrap()).unwrap();
        let orders = TableName::new("orders").unwrap();

        assert!(list_keys(&repo, &root, &orders).unwrap().is_empty());
        assert!(read_row(&repo, &root, &orders, &RowKey::new("o1").unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_list_keys_sorted() {
        let (_dir, repo) = setup_repo();
        let users = TableName::new("users").unwrap();
        let mut root_id = empty_tree(&repo).unwrap();

        for key in ["carol", "alice", "bob"] {
            let root = repo.find_tree(root_id).unwrap();
            root_id = put_row(&repo, &root, &users, &row(key, json!({}))).unwrap();
        }

        let root = repo.find_tree(root_id).unwrap();
        let keys: Vec<String> = list_keys(&repo, &root, &users)
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(keys, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_remove_row() {
        let (_dir, repo) = setup_repo();
        let users = TableName::new("users").unwrap();
        let empty = repo.find_tree(empty_tree(&repo).unwrap()).unwrap();
        let alice = row("alice", json!({"name": "Alice"}));

        let with_row = repo
            .find_tree(put_row(&repo, &empty, &users, &alice).unwrap())
            .unwrap();
        let without = repo
            .find_tree(remove_row(&repo, &with_row, &users, &alice.key).unwrap())
            .unwrap();

        assert!(read_row(&repo, &without, &users, &alice.key).unwrap().is_none());
        // The emptied table directory is gone too.
        assert!(without.get_name("users").is_none());

        let missing = remove_row(&repo, &without, &users, &alice.key);
        assert!(matches!(missing, Err(StoreError::RowNotFound { .. })));
    }
}
