//! Per-request caller context
//!
//! Carries the caller's identity (for audit stamps) and a registry of shared
//! services. Built by the HTTP layer for each request and passed explicitly
//! to anything that stamps or resolves services.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Utc};

/// Name recorded in audit columns when the caller is anonymous.
pub const ANONYMOUS: &str = "-";

/// Source of "now" for audit stamps and age calculations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Clock {
    fixed: Option<NaiveDateTime>,
}

impl Clock {
    /// Wall clock, UTC.
    pub fn system() -> Self {
        Self { fixed: None }
    }

    /// Always reports `at`.
    pub fn fixed(at: NaiveDateTime) -> Self {
        Self { fixed: Some(at) }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.fixed.unwrap_or_else(|| Utc::now().naive_utc())
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Type-keyed registry of shared services.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service`, replacing any earlier one of the same type.
    pub fn register<S: Any + Send + Sync>(&mut self, service: S) -> &mut Self {
        self.services.insert(TypeId::of::<S>(), Arc::new(service));
        self
    }

    pub fn resolve<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        self.services
            .get(&TypeId::of::<S>())
            .cloned()
            .and_then(|s| s.downcast::<S>().ok())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.len())
            .finish()
    }
}

/// Who is calling, plus shared services.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    display_name: Option<String>,
    tenant: Option<String>,
    services: Arc<ServiceRegistry>,
}

impl CallerContext {
    pub fn new(services: Arc<ServiceRegistry>) -> Self {
        Self {
            display_name: None,
            tenant: None,
            services,
        }
    }

    /// Context with no identity and no services.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Blank names count as anonymous.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        self.display_name = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        };
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    /// Name for audit columns: the display name, or `"-"`.
    pub fn audit_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(ANONYMOUS)
    }

    pub fn service<S: Any + Send + Sync>(&self) -> Option<Arc<S>> {
        self.services.resolve::<S>()
    }

    /// The registered clock, or the system clock.
    pub fn clock(&self) -> Clock {
        self.service::<Clock>()
            .map(|c| *c)
            .unwrap_or_else(Clock::system)
    }
}
