//! Password reset token expiry.
use std::{sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use gargantua_core::{
    runtime::{Action, ReconcileResult, Reconciler},
    store::{OptionalExt, ignore_not_found},
};
use gargantua_model::split_key;
use time::Duration;
use tracing::{debug, info};

use crate::context::Context;

pub struct PasswordResetTokenReconciler {
    ctx: Arc<Context>,
}

impl PasswordResetTokenReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for PasswordResetTokenReconciler {
    fn name(&self) -> &'static str {
        "passwordresettoken"
    }

    async fn reconcile(&self, key: &str) -> ReconcileResult {
        let (ns, name) = split_key(key);
        let Some(token) = self.ctx.store.tokens.get(ns, name).await.optional()? else {
            return Ok(Action::Done);
        };

        let ttl = Duration::try_from(self.ctx.config.password_reset_ttl).unwrap_or(Duration::HOUR);
        let expires = token.expires_at(ttl)?;
        let now = self.ctx.clock.now();
        if expires <= now {
            ignore_not_found(self.ctx.store.tokens.delete(ns, name).await)?;
            info!(token = name, user = %token.spec.user, "password reset token expired");
            return Ok(Action::Done);
        }

        let wait = StdDuration::try_from(expires - now).unwrap_or_default();
        debug!(token = name, wait_secs = wait.as_secs(), "token still valid");
        Ok(Action::RequeueAfter(wait))
    }
}
