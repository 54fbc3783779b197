//! File-backed VM slot pool.
//!
//! State is shared between independent server processes through three JSON files
//! in the state directory, guarded by an exclusive `flock` on `file.lock`:
//!
//! * `available.json`: free ids, used as a stack (the last entry is handed out next)
//! * `active.json`: ids currently leased
//! * `vm_map.json`: lease bookkeeping per active id

use crate::domain::model::{ReleaseTarget, VmLease};
use crate::utils::error::{FleetError, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

const AVAILABLE_FILE: &str = "available.json";
const ACTIVE_FILE: &str = "active.json";
const VM_MAP_FILE: &str = "vm_map.json";
const LOCK_FILE: &str = "file.lock";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub available: Vec<u32>,
    pub active: Vec<u32>,
    pub leases: BTreeMap<u32, VmLease>,
}

#[derive(Debug, Clone)]
pub struct VmPool {
    state_dir: PathBuf,
    max_vm_id: u32,
}

impl VmPool {
    /// Open the pool, seeding missing state files with ids `max_vm_id..=0` all available.
    pub fn open(state_dir: impl Into<PathBuf>, max_vm_id: u32) -> Result<Self> {
        let pool = Self {
            state_dir: state_dir.into(),
            max_vm_id,
        };
        fs::create_dir_all(&pool.state_dir)?;

        let _lock = pool.lock()?;
        let seed: Vec<u32> = (0..=max_vm_id).rev().collect();
        pool.init_file(AVAILABLE_FILE, &seed)?;
        pool.init_file(ACTIVE_FILE, &Vec::<u32>::new())?;
        pool.init_file(VM_MAP_FILE, &BTreeMap::<u32, VmLease>::new())?;
        Ok(pool)
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.state_dir.join(name)
    }

    fn lock(&self) -> Result<PoolLock> {
        let path = self.path(LOCK_FILE);
        let file = File::create(&path).map_err(|source| FleetError::LockError {
            path: path.clone(),
            source,
        })?;
        file.lock_exclusive()
            .map_err(|source| FleetError::LockError { path, source })?;
        Ok(PoolLock { file })
    }

    fn init_file<T: Serialize>(&self, name: &str, default: &T) -> Result<()> {
        let path = self.path(name);
        if !path.exists() {
            fs::write(&path, serde_json::to_string(default)?)?;
        }
        Ok(())
    }

    fn read_file<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let path = self.path(name);
        if !path.exists() {
            return Ok(T::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_file<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        fs::write(self.path(name), serde_json::to_string(value)?)?;
        Ok(())
    }

    fn load(&self) -> Result<PoolSnapshot> {
        Ok(PoolSnapshot {
            available: self.read_file(AVAILABLE_FILE)?,
            active: self.read_file(ACTIVE_FILE)?,
            leases: self.read_file(VM_MAP_FILE)?,
        })
    }

    fn store(&self, state: &PoolSnapshot) -> Result<()> {
        self.write_file(ACTIVE_FILE, &state.active)?;
        self.write_file(AVAILABLE_FILE, &state.available)?;
        self.write_file(VM_MAP_FILE, &state.leases)?;
        Ok(())
    }

    /// Read-modify-write under the exclusive lock.
    fn transact<T>(&self, f: impl FnOnce(&mut PoolSnapshot) -> Result<T>) -> Result<T> {
        let _lock = self.lock()?;
        let mut state = self.load()?;
        let value = f(&mut state)?;
        self.store(&state)?;
        Ok(value)
    }

    pub fn snapshot(&self) -> Result<PoolSnapshot> {
        let _lock = self.lock()?;
        self.load()
    }

    pub fn allocate(&self) -> Result<u32> {
        let vm_id = self.transact(|state| {
            let vm_id = state.available.pop().ok_or(FleetError::NoAvailableVm)?;
            if !state.active.contains(&vm_id) {
                state.active.push(vm_id);
            }
            Ok(vm_id)
        })?;
        tracing::info!("Allocated VM ID: {}", vm_id);
        Ok(vm_id)
    }

    /// Returns the ids that went back to the available stack.
    pub fn release(&self, target: ReleaseTarget) -> Result<Vec<u32>> {
        let max_vm_id = self.max_vm_id;
        let released = self.transact(|state| {
            let ids: Vec<u32> = match target {
                ReleaseTarget::One(vm_id) if vm_id <= max_vm_id && state.active.contains(&vm_id) => {
                    vec![vm_id]
                }
                ReleaseTarget::One(_) => Vec::new(),
                ReleaseTarget::All => state.active.clone(),
            };
            for vm_id in &ids {
                state.active.retain(|id| id != vm_id);
                state.available.push(*vm_id);
                state.leases.remove(vm_id);
            }
            Ok(ids)
        })?;

        match target {
            ReleaseTarget::All => tracing::info!("Released all VMs ({})", released.len()),
            ReleaseTarget::One(vm_id) if released.is_empty() => {
                tracing::debug!("VM ID {} was not active, nothing to release", vm_id)
            }
            ReleaseTarget::One(vm_id) => tracing::info!("Released VM ID: {}", vm_id),
        }
        Ok(released)
    }

    pub fn set_timeout(&self, vm_id: u32, timeout_secs: u64) -> Result<()> {
        self.transact(|state| {
            if !state.active.contains(&vm_id) {
                return Err(FleetError::VmNotActive { vm_id });
            }
            state.leases.insert(vm_id, VmLease::with_timeout(timeout_secs));
            Ok(())
        })?;
        tracing::info!("Set timeout for VM ID {} to {} seconds", vm_id, timeout_secs);
        Ok(())
    }

    /// Record activity so the next sweep renews the lease.
    pub fn touch(&self, vm_id: u32) -> Result<()> {
        self.transact(|state| {
            if !state.active.contains(&vm_id) {
                return Err(FleetError::VmNotActive { vm_id });
            }
            state.leases.entry(vm_id).or_default().visited = true;
            Ok(())
        })
    }

    /// Age every lease by `interval_secs`; reclaim ids whose lifetime reaches zero.
    ///
    /// A visited lease is renewed to its full timeout instead of aging. Active ids
    /// without a lease have no lifetime and are reclaimed immediately.
    pub fn sweep(&self, interval_secs: u64) -> Result<Vec<u32>> {
        let reclaimed = self.transact(|state| {
            let mut reclaimed = Vec::new();
            for vm_id in state.active.clone() {
                let mut lease = state.leases.get(&vm_id).copied().unwrap_or_default();
                if lease.visited {
                    lease.visited = false;
                    lease.lifetime = lease.timeout;
                } else {
                    lease.lifetime = lease.lifetime.saturating_sub(interval_secs);
                }

                if lease.lifetime == 0 {
                    state.active.retain(|id| *id != vm_id);
                    state.available.push(vm_id);
                    state.leases.remove(&vm_id);
                    reclaimed.push(vm_id);
                } else {
                    state.leases.insert(vm_id, lease);
                }
            }
            Ok(reclaimed)
        })?;

        if !reclaimed.is_empty() {
            tracing::info!("⏰ Reclaimed idle VMs: {:?}", reclaimed);
        }
        Ok(reclaimed)
    }
}

struct PoolLock {
    file: File,
}

impl Drop for PoolLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_seeds_state_files() {
        let dir = TempDir::new().unwrap();
        let pool = VmPool::open(dir.path().join("vm_cache"), 3).unwrap();

        let snapshot = pool.snapshot().unwrap();
        assert_eq!(snapshot.available, vec![3, 2, 1, 0]);
        assert!(snapshot.active.is_empty());
        assert!(snapshot.leases.is_empty());
        assert!(dir.path().join("vm_cache/file.lock").exists());
    }

    #[test]
    fn test_allocate_hands_out_lowest_first_and_runs_dry() {
        let dir = TempDir::new().unwrap();
        let pool = VmPool::open(dir.path(), 1).unwrap();

        assert_eq!(pool.allocate().unwrap(), 0);
        assert_eq!(pool.allocate().unwrap(), 1);
        assert!(matches!(pool.allocate(), Err(FleetError::NoAvailableVm)));
        assert_eq!(pool.snapshot().unwrap().active, vec![0, 1]);
    }

    #[test]
    fn test_release_returns_id_to_top_of_stack() {
        let dir = TempDir::new().unwrap();
        let pool = VmPool::open(dir.path(), 5).unwrap();
        let first = pool.allocate().unwrap();
        let _second = pool.allocate().unwrap();

        assert_eq!(pool.release(ReleaseTarget::One(first)).unwrap(), vec![first]);
        assert_eq!(pool.allocate().unwrap(), first);

        // Unknown, inactive and out-of-range ids are ignored.
        assert!(pool.release(ReleaseTarget::One(4)).unwrap().is_empty());
        assert!(pool.release(ReleaseTarget::One(99)).unwrap().is_empty());
    }

    #[test]
    fn test_release_all() {
        let dir = TempDir::new().unwrap();
        let pool = VmPool::open(dir.path(), 5).unwrap();
        for _ in 0..3 {
            pool.allocate().unwrap();
        }
        pool.set_timeout(1, 120).unwrap();

        let released = pool.release(ReleaseTarget::All).unwrap();
        assert_eq!(released.len(), 3);

        let snapshot = pool.snapshot().unwrap();
        assert!(snapshot.active.is_empty());
        assert!(snapshot.leases.is_empty());
        assert_eq!(snapshot.available.len(), 6);
    }

    #[test]
    fn test_sweep_ages_renews_and_reclaims() {
        let dir = TempDir::new().unwrap();
        let pool = VmPool::open(dir.path(), 5).unwrap();
        let idle = pool.allocate().unwrap();
        let busy = pool.allocate().unwrap();
        let unleased = pool.allocate().unwrap();
        pool.set_timeout(idle, 120).unwrap();
        pool.set_timeout(busy, 120).unwrap();

        assert_eq!(pool.sweep(60).unwrap(), vec![unleased]);
        assert_eq!(pool.snapshot().unwrap().leases[&idle].lifetime, 60);

        pool.touch(busy).unwrap();
        assert_eq!(pool.sweep(60).unwrap(), vec![idle]);

        let snapshot = pool.snapshot().unwrap();
        assert_eq!(snapshot.active, vec![busy]);
        assert_eq!(
            snapshot.leases[&busy],
            VmLease {
                timeout: 120,
                lifetime: 120,
                visited: false
            }
        );
    }

    #[test]
    fn test_touch_and_timeout_require_active_vm() {
        let dir = TempDir::new().unwrap();
        let pool = VmPool::open(dir.path(), 2).unwrap();

        assert!(matches!(pool.touch(1), Err(FleetError::VmNotActive { vm_id: 1 })));
        assert!(matches!(
            pool.set_timeout(1, 30),
            Err(FleetError::VmNotActive { vm_id: 1 })
        ));
    }

    #[test]
    fn test_state_is_shared_between_handles() {
        let dir = TempDir::new().unwrap();
        let a = VmPool::open(dir.path(), 10).unwrap();
        let b = VmPool::open(dir.path(), 10).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = if i % 2 == 0 { a.clone() } else { b.clone() };
                std::thread::spawn(move || pool.allocate().unwrap())
            })
            .collect();
        let mut ids: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();

        assert_eq!(ids, (0..8).collect::<Vec<_>>());
        assert_eq!(a.snapshot().unwrap().active.len(), 8);
    }
}
