//! Access-code resolution.
//!
//! A code names either a one-time access code or a shared access code; the
//! one-time form wins. Both lead to a scheduled event through the
//! `scheduledevent` label.
use gargantua_core::{clock::ClockHandle, informer::Lister, runtime::ReconcileError};
use gargantua_model::{
    AccessCode, LABEL_SCHEDULED_EVENT, OneTimeAccessCode, Resource, ScheduledEvent, Selector,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("access code {0} not found")]
    NotFound(String),

    #[error("access code {0} has expired")]
    Expired(String),

    #[error("access code {code} points at missing event {event:?}")]
    Orphaned { code: String, event: String },
}

impl From<AccessError> for ReconcileError {
    fn from(e: AccessError) -> Self {
        match e {
            // The cache may not have seen the code or its event yet.
            AccessError::NotFound(_) | AccessError::Orphaned { .. } => {
                ReconcileError::Internal(e.to_string())
            }
            AccessError::Expired(_) => ReconcileError::Validation(e.to_string()),
        }
    }
}

/// Result of resolving a code.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub event: ScheduledEvent,
    /// Shared code of the event; absent if the event's code was never created.
    pub access_code: Option<AccessCode>,
    /// Name of the one-time code the lookup went through.
    pub one_time: Option<String>,
}

pub struct AccessCodeResolver {
    access_codes: Lister<AccessCode>,
    otacs: Lister<OneTimeAccessCode>,
    events: Lister<ScheduledEvent>,
    clock: ClockHandle,
}

impl AccessCodeResolver {
    pub fn new(
        access_codes: Lister<AccessCode>,
        otacs: Lister<OneTimeAccessCode>,
        events: Lister<ScheduledEvent>,
        clock: ClockHandle,
    ) -> Self {
        Self {
            access_codes,
            otacs,
            events,
            clock,
        }
    }

    pub fn resolve(&self, namespace: &str, code: &str) -> Result<Resolved, AccessError> {
        let now = self.clock.now();

        if let Some(otac) = self.otacs.get(namespace, code) {
            match otac.expires_at() {
                Ok(Some(at)) if at <= now => return Err(AccessError::Expired(code.to_string())),
                Err(_) => return Err(AccessError::Expired(code.to_string())),
                _ => {}
            }
            let event = self.event_of(namespace, code, otac.labels().get(LABEL_SCHEDULED_EVENT))?;
            let access_code = self.access_codes.get(namespace, &event.spec.access_code);
            return Ok(Resolved {
                event,
                access_code,
                one_time: Some(otac.name().to_string()),
            });
        }

        let ac = self
            .access_codes
            .get(namespace, code)
            .ok_or_else(|| AccessError::NotFound(code.to_string()))?;
        if ac.is_expired(now) {
            return Err(AccessError::Expired(code.to_string()));
        }
        let event = self.event_of(namespace, code, ac.labels().get(LABEL_SCHEDULED_EVENT))?;
        Ok(Resolved {
            event,
            access_code: Some(ac),
            one_time: None,
        })
    }

    /// Unexpired access codes matching `selector`.
    pub fn active(&self, namespace: &str, selector: &Selector) -> Vec<AccessCode> {
        let now = self.clock.now();
        self.access_codes
            .list_in(namespace, selector)
            .into_iter()
            .filter(|ac| !ac.is_expired(now))
            .collect()
    }

    fn event_of(
        &self,
        namespace: &str,
        code: &str,
        event: Option<&str>,
    ) -> Result<ScheduledEvent, AccessError> {
        let orphaned = || AccessError::Orphaned {
            code: code.to_string(),
            event: event.unwrap_or_default().to_string(),
        };
        let name = event.filter(|e| !e.is_empty()).ok_or_else(orphaned)?;
        self.events.get(namespace, name).ok_or_else(orphaned)
    }
}
