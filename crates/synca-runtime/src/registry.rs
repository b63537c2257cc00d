//! Process-wide scheduler / service registry
//!
//! Backends are attached under a marker type (a [`Tag`]) once at setup
//! and looked up by collaborators that only know the tag:
//!
//! ```ignore
//! let pool = ThreadPool::new(2, "net")?;
//! registry::attach_scheduler::<NetworkTag>(Arc::new(pool.handle()));
//! registry::attach_service::<NetworkTag>(Arc::new(pool.handle()));
//!
//! // elsewhere
//! let net = registry::scheduler::<NetworkTag>()?;
//! ```
//!
//! Schedulers and services live in separate tables, so one tag may map
//! to different backends for the two capabilities. Teardown is explicit
//! with `detach_*` or `clear`, after the pools behind the entries have
//! stopped.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use synca_core::error::{SyncaError, SyncaResult};
use synca_core::kdebug;

use crate::backend::{Scheduler, Service};

/// Marker type naming a logical destination
pub trait Tag: 'static {}

/// Where `go` sends tasks unless told otherwise
pub struct DefaultTag;
impl Tag for DefaultTag {}

/// Network reactor
pub struct NetworkTag;
impl Tag for NetworkTag {}

/// Timer reactor used by `sleep`
pub struct TimerTag;
impl Tag for TimerTag {}

struct Tables {
    schedulers: RwLock<HashMap<TypeId, Arc<dyn Scheduler>>>,
    services: RwLock<HashMap<TypeId, Arc<dyn Service>>>,
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| Tables {
        schedulers: RwLock::new(HashMap::new()),
        services: RwLock::new(HashMap::new()),
    })
}

/// Bind `T` to a scheduler, replacing any previous binding
pub fn attach_scheduler<T: Tag>(scheduler: Arc<dyn Scheduler>) {
    let name = scheduler.name().to_string();
    if tables().schedulers.write().insert(TypeId::of::<T>(), scheduler).is_some() {
        kdebug!("scheduler for {} replaced by {}", type_name::<T>(), name);
    } else {
        kdebug!("scheduler for {} attached: {}", type_name::<T>(), name);
    }
}

/// Bind `T` to a service, replacing any previous binding
pub fn attach_service<T: Tag>(service: Arc<dyn Service>) {
    if tables().services.write().insert(TypeId::of::<T>(), service).is_some() {
        kdebug!("service for {} replaced", type_name::<T>());
    } else {
        kdebug!("service for {} attached", type_name::<T>());
    }
}

/// Scheduler attached under `T`
pub fn scheduler<T: Tag>() -> SyncaResult<Arc<dyn Scheduler>> {
    tables()
        .schedulers
        .read()
        .get(&TypeId::of::<T>())
        .cloned()
        .ok_or(SyncaError::NotAttached {
            kind: "scheduler",
            tag: type_name::<T>(),
        })
}

/// Service attached under `T`
pub fn service<T: Tag>() -> SyncaResult<Arc<dyn Service>> {
    tables()
        .services
        .read()
        .get(&TypeId::of::<T>())
        .cloned()
        .ok_or(SyncaError::NotAttached {
            kind: "service",
            tag: type_name::<T>(),
        })
}

pub fn detach_scheduler<T: Tag>() -> Option<Arc<dyn Scheduler>> {
    tables().schedulers.write().remove(&TypeId::of::<T>())
}

pub fn detach_service<T: Tag>() -> Option<Arc<dyn Service>> {
    tables().services.write().remove(&TypeId::of::<T>())
}

/// Drop every binding
pub fn clear() {
    let t = tables();
    t.schedulers.write().clear();
    t.services.write().clear();
    kdebug!("registry cleared");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Job;
    use crate::pool::ThreadPool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl Scheduler for Counting {
        fn schedule(&self, job: Job) -> SyncaResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            job();
            Ok(())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn test_lookup_unattached() {
        struct Nowhere;
        impl Tag for Nowhere {}

        let err = scheduler::<Nowhere>().err().unwrap();
        match err {
            SyncaError::NotAttached { kind, tag } => {
                assert_eq!(kind, "scheduler");
                assert!(tag.ends_with("Nowhere"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(
            service::<Nowhere>(),
            Err(SyncaError::NotAttached { kind: "service", .. })
        ));
    }

    #[test]
    fn test_attach_lookup_detach() {
        struct Local;
        impl Tag for Local {}

        let backend = Arc::new(Counting(AtomicUsize::new(0)));
        attach_scheduler::<Local>(backend.clone());

        let found = scheduler::<Local>().unwrap();
        assert_eq!(found.name(), "counting");
        found.schedule(Box::new(|| {})).unwrap();
        assert_eq!(backend.0.load(Ordering::SeqCst), 1);

        assert!(detach_scheduler::<Local>().is_some());
        assert!(scheduler::<Local>().is_err());
        assert!(detach_scheduler::<Local>().is_none());
    }

    #[test]
    fn test_reattach_replaces() {
        struct Swapped;
        impl Tag for Swapped {}

        let first = ThreadPool::new(1, "first").unwrap();
        let second = ThreadPool::new(1, "second").unwrap();
        attach_scheduler::<Swapped>(Arc::new(first.handle()));
        attach_scheduler::<Swapped>(Arc::new(second.handle()));
        assert_eq!(scheduler::<Swapped>().unwrap().name(), "second");
        detach_scheduler::<Swapped>();
    }

    #[test]
    fn test_capabilities_independent() {
        struct Split;
        impl Tag for Split {}

        let pool = ThreadPool::new(1, "svc").unwrap();
        attach_service::<Split>(Arc::new(pool.handle()));
        assert!(service::<Split>().is_ok());
        assert!(scheduler::<Split>().is_err());
        assert!(detach_service::<Split>().is_some());
    }
}
