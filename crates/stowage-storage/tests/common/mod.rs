//! Common test helpers for stowage-storage integration tests

use stowage_storage::MemoryStore;

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// Backup root used by every fixture
pub const ROOT: &str = "backup";

/// Store seeded with the objects a few finished backup runs leave behind.
///
/// - 2024-01-01: one file-form item (`app-pgdata.tar.gz`)
/// - 2024-01-02: one folder-form item (`app-0.tar.gz`, three parts) and an
///   unfinished file-form upload without its pass file (`app-cache.tar.gz`)
/// - 2023-12-31: empty partition marker
#[allow(dead_code)]
pub fn seeded_store(page_size: usize) -> MemoryStore {
    let store = MemoryStore::with_page_size(page_size);

    store.insert("backup/2023-12-31/", "");

    store.insert("backup/2024-01-01/app-pgdata.tar.gz.cpt", "pgdata");
    store.insert("backup/2024-01-01/app-pgdata.tar.gz.cpt.pass", "pass");

    for n in 1..=3 {
        store.insert(
            format!(
                "backup/2024-01-02/app-0.tar.gz.cpt-split_parts/app-0.tar.gz.cpt.part{}",
                n
            ),
            format!("part{}", n),
        );
    }
    store.insert("backup/2024-01-02/app-0.tar.gz.cpt.pass", "pass");
    store.insert("backup/2024-01-02/app-cache.tar.gz.cpt", "cache");

    store
}
