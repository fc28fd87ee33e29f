//! Common fixtures: identities, rosters, and state directories.

use tempfile::TempDir;
use vaultward_crypto::key_store::LocalIdentity;
use vaultward_storage::StateDir;
use vaultward_types::identity::{KeyHolder, Role, StaticDirectory};
use vaultward_types::time::unix_now;

/// A temporary state directory that lives as long as the returned guard.
pub fn temp_state() -> (TempDir, StateDir) {
    let tmp = TempDir::new().expect("create temp dir");
    let state = StateDir::new(tmp.path());
    state.ensure().expect("ensure state dir");
    (tmp, state)
}

/// A fresh Owner identity.
pub fn owner_identity() -> LocalIdentity {
    LocalIdentity::generate(Role::Owner).expect("generate owner identity")
}

/// A fresh Host identity.
pub fn host_identity() -> LocalIdentity {
    LocalIdentity::generate(Role::Host).expect("generate host identity")
}

/// `n` named key holders with their signing identities; holder 0 is the
/// Owner.
pub fn roster(n: usize) -> (Vec<(KeyHolder, LocalIdentity)>, StaticDirectory) {
    let holders: Vec<(KeyHolder, LocalIdentity)> = (0..n)
        .map(|i| {
            let identity = LocalIdentity::generate(if i == 0 { Role::Owner } else { Role::Host })
                .expect("generate holder identity");
            let holder = KeyHolder::from_public_key(
                &format!("holder-{i}"),
                &identity.public_key,
                i == 0,
                unix_now(),
            );
            (holder, identity)
        })
        .collect();
    let directory = StaticDirectory::new(holders.iter().map(|(h, _)| h.clone()).collect());
    (holders, directory)
}
