//! Welcome emails for newly registered users.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::UserId;
use consumer::{Handler, HandlerError, ServiceContext};
use events::UserRegistered;

use crate::error::{Result, WorkerError};

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_welcome(&self, user_id: UserId, email: &str) -> Result<()>;
}

/// Mailer that only waits and records recipients.
#[derive(Debug, Clone)]
pub struct SimulatedMailer {
    delay: Duration,
    sent: Arc<Mutex<Vec<String>>>,
    fail: Arc<Mutex<bool>>,
}

impl SimulatedMailer {
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            sent: Arc::default(),
            fail: Arc::default(),
        }
    }

    /// Recipients in send order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }
}

impl Default for SimulatedMailer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

#[async_trait]
impl Mailer for SimulatedMailer {
    async fn send_welcome(&self, _user_id: UserId, email: &str) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        if *self.fail.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(WorkerError::Mail {
                recipient: email.to_string(),
                reason: "smtp relay refused connection".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(email.to_string());
        Ok(())
    }
}

/// Sends one welcome email per user, skipping redeliveries.
#[derive(Clone)]
pub struct EmailWorker {
    mailer: Arc<dyn Mailer>,
    welcomed: Arc<Mutex<HashSet<UserId>>>,
}

impl EmailWorker {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self {
            mailer,
            welcomed: Arc::default(),
        }
    }

    pub fn welcomed_count(&self) -> usize {
        self.welcomed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn already_welcomed(&self, user_id: UserId) -> bool {
        self.welcomed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&user_id)
    }
}

#[async_trait]
impl Handler<UserRegistered> for EmailWorker {
    fn name(&self) -> &'static str {
        "welcome_email"
    }

    #[tracing::instrument(skip(self, event, _ctx), fields(user_id = %event.user_id))]
    async fn handle(&self, event: UserRegistered, _ctx: &ServiceContext) -> std::result::Result<(), HandlerError> {
        if self.already_welcomed(event.user_id) {
            tracing::info!("user already welcomed, skipping");
            return Ok(());
        }

        self.mailer.send_welcome(event.user_id, &event.email).await?;
        self.welcomed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event.user_id);

        tracing::info!(email = %event.email, "welcome email sent");
        metrics::counter!("emails_sent_total").increment(1);
        Ok(())
    }
}
