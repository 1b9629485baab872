//! Role registry snapshots and authorization tiers.
//!
//! [`RoleAuthority`] loads the super admin, the admin set and the user set
//! from the ledger and caches the resulting [`RoleSnapshot`] for a short
//! TTL.
//!
//! # Cache Strategy
//!
//! - **TTL**: Default 30 seconds, see [`LibraryConfig`](crate::LibraryConfig)
//! - **Invalidation**: after every role mutation and registration
//! - **Stale loads**: a snapshot loaded while an invalidation ran is returned to its caller but
//!   not cached
//!
//! Tiers and permissions are advisory: they decide what a caller is shown,
//! while the ledger re-validates every write.

use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use moka::future::Cache;

use crate::{error::LedgerResult, ledger::LedgerClient, types::Address};

/// Authorization tier of an address, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// The deployer; manages roles and books.
    SuperAdmin,
    /// Manages books.
    Admin,
    /// Borrows and returns books.
    User,
    /// Not known to the role registry.
    Unregistered,
}

impl Tier {
    /// UX gates for this tier.
    #[must_use]
    pub fn permissions(self) -> Permissions {
        match self {
            Self::SuperAdmin => {
                Permissions { manage_roles: true, manage_books: true, borrow: true }
            },
            Self::Admin => Permissions { manage_roles: false, manage_books: true, borrow: true },
            Self::User => Permissions { manage_roles: false, manage_books: false, borrow: true },
            Self::Unregistered => Permissions::default(),
        }
    }
}

/// What the presentation layer may offer an address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    /// May add and remove users and admins.
    pub manage_roles: bool,
    /// May add, update and delete books.
    pub manage_books: bool,
    /// May borrow and return books.
    pub borrow: bool,
}

/// Point-in-time copy of the role registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSnapshot {
    /// The super admin.
    pub super_admin: Address,
    /// Admins, excluding the super admin.
    pub admins: BTreeSet<Address>,
    /// Registered users.
    pub users: BTreeSet<Address>,
}

impl RoleSnapshot {
    /// Builds a snapshot from registry reads.
    #[must_use]
    pub fn new(
        super_admin: Address,
        admins: impl IntoIterator<Item = Address>,
        users: impl IntoIterator<Item = Address>,
    ) -> Self {
        Self {
            super_admin,
            admins: admins.into_iter().collect(),
            users: users.into_iter().collect(),
        }
    }

    /// Returns the single tier of `address`.
    ///
    /// Precedence is `SuperAdmin > Admin > User > Unregistered`, so the
    /// super admin is never reported as an admin or user.
    #[must_use]
    pub fn tier_of(&self, address: &Address) -> Tier {
        if address == &self.super_admin {
            Tier::SuperAdmin
        } else if self.admins.contains(address) {
            Tier::Admin
        } else if self.users.contains(address) {
            Tier::User
        } else {
            Tier::Unregistered
        }
    }
}

/// Cached view of the ledger's role registry.
#[derive(Clone)]
pub struct RoleAuthority {
    ledger: Arc<dyn LedgerClient>,
    cache: Cache<(), Arc<RoleSnapshot>>,
    invalidation_gen: Arc<AtomicU64>,
}

impl RoleAuthority {
    /// Creates an authority caching snapshots for `ttl`.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>, ttl: Duration) -> Self {
        Self {
            ledger,
            cache: Cache::builder().time_to_live(ttl).max_capacity(1).build(),
            invalidation_gen: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Reads the registry from the ledger, bypassing the cache.
    ///
    /// The three reads are issued concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first ledger error.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) -> LedgerResult<RoleSnapshot> {
        let (super_admin, admins, users) = tokio::try_join!(
            self.ledger.get_super_admin(),
            self.ledger.get_all_admins(),
            self.ledger.get_all_users(),
        )?;
        Ok(RoleSnapshot::new(super_admin, admins, users))
    }

    /// Returns the cached snapshot, loading it on a miss.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if a load was needed and failed.
    pub async fn snapshot(&self) -> LedgerResult<Arc<RoleSnapshot>> {
        if let Some(snapshot) = self.cache.get(&()).await {
            tracing::debug!("role cache hit");
            return Ok(snapshot);
        }
        tracing::debug!("role cache miss");

        let gen_before = self.invalidation_gen.load(Ordering::Acquire);
        let snapshot = Arc::new(self.load().await?);
        if self.invalidation_gen.load(Ordering::Acquire) != gen_before {
            tracing::debug!("discarding role snapshot: invalidation occurred during load");
            return Ok(snapshot);
        }
        self.cache.insert((), Arc::clone(&snapshot)).await;
        Ok(snapshot)
    }

    /// Returns the tier of `address`.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the registry could not be read.
    pub async fn tier_of(&self, address: &Address) -> LedgerResult<Tier> {
        Ok(self.snapshot().await?.tier_of(address))
    }

    /// Returns the UX gates for `address`.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the registry could not be read.
    pub async fn permissions(&self, address: &Address) -> LedgerResult<Permissions> {
        Ok(self.tier_of(address).await?.permissions())
    }

    /// Drops the cached snapshot.
    pub async fn invalidate(&self) {
        self.invalidation_gen.fetch_add(1, Ordering::Release);
        self.cache.invalidate(&()).await;
        tracing::info!("role cache invalidated");
    }
}

impl std::fmt::Debug for RoleAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleAuthority")
            .field("invalidation_gen", &self.invalidation_gen.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
