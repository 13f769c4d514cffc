//! Pairing of listed data objects with their pass files
//!
//! A backup item is only considered complete when its pass file has been
//! observed: the pass file is always uploaded after the data it belongs to.

use crate::gateway::ObjectInfo;
use std::collections::HashSet;
use stowage_core::DatePartition;

/// Suffix of encrypted data objects
pub const DATA_SUFFIX: &str = ".cpt";
/// Suffix appended to a data key to name its pass file
pub const PASS_SUFFIX: &str = ".pass";
/// Suffix of folders holding a chunked upload
pub const SPLIT_FOLDER_SUFFIX: &str = "-split_parts/";

/// Where the data of a backup item lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataRef {
    /// A single object
    File(String),
    /// A folder prefix holding `.part<N>` objects
    Folder(String),
}

impl DataRef {
    /// Object key or folder prefix
    pub fn key(&self) -> &str {
        match self {
            DataRef::File(key) | DataRef::Folder(key) => key,
        }
    }
}

/// A complete data + pass pair found under one listing prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupItem {
    /// Logical name, e.g. `app-pgdata.tar.gz`
    pub name: String,
    pub data: DataRef,
    pub pass_key: String,
    /// Prefix both objects were listed under
    pub base_prefix: String,
}

impl BackupItem {
    pub fn is_folder(&self) -> bool {
        matches!(self.data, DataRef::Folder(_))
    }

    /// Local file name of the encrypted payload once fetched and joined
    pub fn data_file_name(&self) -> String {
        format!("{}{}", self.name, DATA_SUFFIX)
    }

    /// Local file name of the pass file
    pub fn pass_file_name(&self) -> String {
        format!("{}{}{}", self.name, DATA_SUFFIX, PASS_SUFFIX)
    }
}

/// Group a delimiter listing of `prefix` into complete backup items.
///
/// Folder-form items come first, in common-prefix order, followed by
/// file-form items in object order. Candidates without their exact pass
/// key in `objects`, or whose name would contain a `/`, are dropped.
pub fn reconcile(prefix: &str, objects: &[ObjectInfo], common_prefixes: &[String]) -> Vec<BackupItem> {
    let keys: HashSet<&str> = objects.iter().map(|o| o.key.as_str()).collect();
    let folder_marker = format!("{}{}", DATA_SUFFIX, SPLIT_FOLDER_SUFFIX);
    let mut items = Vec::new();

    for folder in common_prefixes {
        let Some(name) = folder
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(&folder_marker))
        else {
            continue;
        };
        if name.is_empty() || name.contains('/') {
            continue;
        }

        let pass_key = format!("{}{}{}{}", prefix, name, DATA_SUFFIX, PASS_SUFFIX);
        if keys.contains(pass_key.as_str()) {
            items.push(BackupItem {
                name: name.to_string(),
                data: DataRef::Folder(folder.clone()),
                pass_key,
                base_prefix: prefix.to_string(),
            });
        }
    }

    for object in objects {
        let Some(name) = object
            .key
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(DATA_SUFFIX))
        else {
            continue;
        };
        if name.is_empty() || name.contains('/') {
            continue;
        }

        let pass_key = format!("{}{}", object.key, PASS_SUFFIX);
        if keys.contains(pass_key.as_str()) {
            items.push(BackupItem {
                name: name.to_string(),
                data: DataRef::File(object.key.clone()),
                pass_key,
                base_prefix: prefix.to_string(),
            });
        }
    }

    items
}

/// Turn the common prefixes of a root listing into partitions, newest first
pub fn partitions_from_prefixes(root: &str, prefixes: &[String]) -> Vec<DatePartition> {
    let root = root.trim_matches('/');
    let mut partitions: Vec<DatePartition> = prefixes
        .iter()
        .filter_map(|p| {
            let rest = if root.is_empty() {
                p.as_str()
            } else {
                p.strip_prefix(root)?.strip_prefix('/')?
            };
            let name = rest.trim_end_matches('/');
            (!name.is_empty() && !name.contains('/')).then(|| DatePartition::new(name))
        })
        .collect();
    partitions.sort();
    partitions.dedup();
    partitions
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "backup/2024-01-05/";

    fn objects(keys: &[&str]) -> Vec<ObjectInfo> {
        keys.iter()
            .map(|k| ObjectInfo::new(format!("{}{}", PREFIX, k), 1))
            .collect()
    }

    fn prefixes(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| format!("{}{}", PREFIX, n)).collect()
    }

    #[test]
    fn test_unpaired_data_is_excluded() {
        let items = reconcile(PREFIX, &objects(&["vol1.cpt", "vol1.cpt.pass", "vol2.cpt"]), &[]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "vol1");
        assert_eq!(items[0].data, DataRef::File(format!("{}vol1.cpt", PREFIX)));
        assert_eq!(items[0].pass_key, format!("{}vol1.cpt.pass", PREFIX));
        assert!(!items[0].is_folder());
    }

    #[test]
    fn test_folder_form_requires_pass() {
        let objs = objects(&["big.tar.gz.cpt.pass"]);
        let folders = prefixes(&["big.tar.gz.cpt-split_parts/", "orphan.cpt-split_parts/"]);
        let items = reconcile(PREFIX, &objs, &folders);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "big.tar.gz");
        assert!(items[0].is_folder());
        assert_eq!(
            items[0].data.key(),
            format!("{}big.tar.gz.cpt-split_parts/", PREFIX)
        );
        assert_eq!(items[0].data_file_name(), "big.tar.gz.cpt");
        assert_eq!(items[0].pass_file_name(), "big.tar.gz.cpt.pass");
    }

    #[test]
    fn test_both_forms_returned_folders_first() {
        let objs = objects(&["x.cpt", "x.cpt.pass"]);
        let folders = prefixes(&["x.cpt-split_parts/"]);
        let items = reconcile(PREFIX, &objs, &folders);

        assert_eq!(items.len(), 2);
        assert!(items[0].is_folder());
        assert!(!items[1].is_folder());
        assert_eq!(items[0].pass_key, items[1].pass_key);
    }

    #[test]
    fn test_pass_never_missing() {
        let objs = objects(&["a.cpt", "a.pass", "b.cpt.pass", "c.cpt", "c.cpt.pass.old"]);
        for item in reconcile(PREFIX, &objs, &[]) {
            assert!(objs.iter().any(|o| o.key == item.pass_key));
        }
        assert!(reconcile(PREFIX, &objs, &[]).is_empty());
    }

    #[test]
    fn test_nested_names_ignored() {
        let objs = vec![
            ObjectInfo::new(format!("{}nested/a.cpt", PREFIX), 1),
            ObjectInfo::new(format!("{}nested/a.cpt.pass", PREFIX), 1),
            ObjectInfo::new("elsewhere/b.cpt", 1),
            ObjectInfo::new("elsewhere/b.cpt.pass", 1),
        ];
        assert!(reconcile(PREFIX, &objs, &[]).is_empty());
    }

    #[test]
    fn test_partitions_sorted_newest_first() {
        let listed = vec![
            "backup/2024-01-01/".to_string(),
            "backup/2024-01-02/".to_string(),
            "backup/2023-12-31/".to_string(),
        ];
        let names: Vec<_> = partitions_from_prefixes("backup", &listed)
            .into_iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["2024-01-02", "2024-01-01", "2023-12-31"]);
    }

    #[test]
    fn test_partitions_ignore_foreign_prefixes() {
        let listed = vec!["backup/".to_string(), "other/2024-01-01/".to_string()];
        assert!(partitions_from_prefixes("/backup/", &listed).is_empty());
    }
}
