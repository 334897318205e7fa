//! # Pathguard: Security-Aware Execution Engine
//!
//! Pathguard tracks the artifact call-path a program is currently executing
//! and mediates every access check against the acting user's effective
//! permission tree, resolved from raw grants through a wildcard path trie
//! and kept hot in named concurrent caches.
//!
//! ## Core Concepts
//!
//! - **Artifacts**: Named units of code (screens, services, entities,
//!   templates) pushed onto a per-worker stack as they execute
//! - **Execution context**: Worker-scoped state carrying user identity,
//!   locale bundle, a property bag, and the artifact stack
//! - **Permission trie**: Grants anchored at path patterns with `*` and `?`
//!   wildcards, merged along every matching walk
//! - **Access controller**: Per-user decision point combining the trie,
//!   programmable permission services, and row-level filters
//! - **Caches**: Named, bounded, expiring, optionally disk-backed maps with
//!   hit/miss accounting
//!
//! ## Quick Start
//!
//! ### Tracking the execution path
//!
//! ```
//! use pathguard::artifact::ExecutionArtifact;
//! use pathguard::context::{self, ExecutionContext};
//!
//! let handle = ExecutionContext::builder().build_handle();
//! context::scope_sync(handle, || {
//!     let ctx = context::current().unwrap();
//!     let _outer = ctx.enter(ExecutionArtifact::screen("accounting"));
//!     let _inner = ctx.enter(ExecutionArtifact::service("postInvoice"));
//!     assert_eq!(ctx.execution_path().to_string(), "/accounting/postInvoice");
//! });
//! ```
//!
//! ### Checking a permission
//!
//! ```no_run
//! use std::sync::Arc;
//! use pathguard::artifact::ExecutionArtifact;
//! use pathguard::authz::AuthorizationManager;
//! use pathguard::cache::CacheManager;
//! use pathguard::config::EngineSettings;
//! use pathguard::context::{self, ExecutionContext};
//! use pathguard::delegator::{InMemoryDelegator, UserLogin};
//! use pathguard::dispatch::FnDispatcher;
//! use pathguard::permission::{Permission, PermissionAtom};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let delegator = Arc::new(
//!     InMemoryDelegator::new("main").with_user_grant("alice", "/accounting/*", "VIEW=true"),
//! );
//! let dispatcher = Arc::new(FnDispatcher::new());
//! let caches = CacheManager::new(EngineSettings::default());
//! let security = Arc::new(AuthorizationManager::new(delegator, dispatcher, &caches));
//!
//! let handle = ExecutionContext::builder()
//!     .user_login(UserLogin::new("alice"))
//!     .security(security.clone())
//!     .build_handle();
//!
//! context::scope(handle, async {
//!     let ctx = context::current()?;
//!     let _frame = ctx.enter(ExecutionArtifact::screen("accounting"));
//!     let controller = security.access_controller().await?;
//!     controller
//!         .check_permission(&Permission::atom(PermissionAtom::View))
//!         .await?;
//!     Ok::<_, Box<dyn std::error::Error>>(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### A bounded, expiring cache
//!
//! ```
//! use std::time::Duration;
//! use pathguard::cache::Cache;
//!
//! let cache: std::sync::Arc<Cache<String, String>> = Cache::builder("session.tokens")
//!     .max_in_memory(1024)
//!     .expire_after(Duration::from_secs(300))
//!     .build();
//! cache.put("alice".into(), "tok-1".into());
//! assert_eq!(cache.get(&"alice".into()).as_deref(), Some("tok-1"));
//! ```
//!
//! ## Module Guide
//!
//! - [`artifact`] - Execution artifacts and the per-worker stack
//! - [`path`] - Artifact paths and the pattern grammar
//! - [`permission`] - Atoms, composite permissions, accumulated sets
//! - [`trie`] - The wildcard path trie
//! - [`context`] - Worker-scoped execution state and the bypass guard
//! - [`authz`] - Grant loading, access controllers, audit logging
//! - [`cache`] - Named caches, the manager, and the disk-store contract
//! - [`delegator`] - The entity-layer capability and row types
//! - [`dispatch`] - The service-dispatch capability
//! - [`directive`] - The secured-render template surface
//! - [`config`] - Environment-driven settings
//! - [`telemetry`] - Tracing setup

pub mod artifact;
pub mod authz;
pub mod cache;
pub mod config;
pub mod context;
pub mod delegator;
pub mod directive;
pub mod dispatch;
pub mod path;
pub mod permission;
pub mod telemetry;
pub mod trie;
