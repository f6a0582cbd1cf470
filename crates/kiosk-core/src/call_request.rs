use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::api::{CallApi, CallStatus};
use crate::errors::KioskError;
use crate::events::{CallPhase, EventEmitter, KioskEvent, Role, SessionRoute};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const GENERIC_CALL_FAILURE: &str = "Unable to reach the on-call service. Please try again.";

#[derive(Debug, Clone)]
pub struct CallRequestOptions {
    pub role: Role,
    pub user_id: Option<String>,
    pub location_name: Option<String>,
    pub poll_interval: Duration,
}

impl Default for CallRequestOptions {
    fn default() -> Self {
        Self {
            role: Role::Patient,
            user_id: None,
            location_name: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Requests a call for a location and polls its status until a doctor
/// accepts, nobody is available, or the controller is cancelled.
///
/// Owns the polling task outright: `cancel` (also run on drop) clears the
/// liveness flag synchronously and aborts the task, and every tick checks
/// the flag again after its fetch so a late response is never applied.
/// One controller drives one call lifecycle; `start_call` is rejected
/// unless the phase is `Idle`.
pub struct CallRequestController {
    api: Arc<dyn CallApi>,
    emitter: EventEmitter,
    options: CallRequestOptions,
    phase: Arc<Mutex<CallPhase>>,
    live: Arc<AtomicBool>,
    navigated: Arc<AtomicBool>,
    poll_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CallRequestController {
    pub fn new(api: Arc<dyn CallApi>, emitter: EventEmitter, options: CallRequestOptions) -> Self {
        Self {
            api,
            emitter,
            options,
            phase: Arc::new(Mutex::new(CallPhase::Idle)),
            live: Arc::new(AtomicBool::new(true)),
            navigated: Arc::new(AtomicBool::new(false)),
            poll_task: std::sync::Mutex::new(None),
        }
    }

    pub async fn phase(&self) -> CallPhase {
        self.phase.lock().await.clone()
    }

    /// Whether the status poll is currently running.
    pub fn is_polling(&self) -> bool {
        self.poll_task
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Request a call for the given location and start polling its status.
    pub async fn start_call(&self, location_id: &str) -> Result<(), KioskError> {
        if location_id.trim().is_empty() {
            return Err(KioskError::Validation(
                "a location must be selected before requesting a call".into(),
            ));
        }
        {
            let phase = self.phase.lock().await;
            if *phase != CallPhase::Idle {
                return Err(KioskError::Session(
                    "a call request is already in progress for this view".into(),
                ));
            }
        }

        set_phase(&self.phase, &self.emitter, CallPhase::Requesting).await;
        let requested_at = Utc::now();

        match self.api.start_call(location_id).await {
            Ok(resp) => {
                if !self.live.load(Ordering::SeqCst) {
                    return Ok(());
                }
                tracing::info!("call {} is ringing", resp.call_id);
                set_phase(
                    &self.phase,
                    &self.emitter,
                    CallPhase::Ringing {
                        call_id: resp.call_id.clone(),
                    },
                )
                .await;
                self.spawn_poll(resp.call_id, requested_at);
                Ok(())
            }
            Err(e) => {
                let message = user_message(&e);
                tracing::warn!("call start failed: {e}");
                if self.live.load(Ordering::SeqCst) {
                    set_phase(&self.phase, &self.emitter, CallPhase::Failed { message }).await;
                }
                Err(e)
            }
        }
    }

    /// Stop polling. Synchronous so view teardown can call it directly;
    /// no tick result is applied after this returns.
    pub fn cancel(&self) {
        self.live.store(false, Ordering::SeqCst);
        if let Some(handle) = self.poll_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn spawn_poll(&self, call_id: String, requested_at: chrono::DateTime<Utc>) {
        let api = self.api.clone();
        let emitter = self.emitter.clone();
        let phase = self.phase.clone();
        let live = self.live.clone();
        let navigated = self.navigated.clone();
        let interval = self.options.poll_interval;
        let route = SessionRoute {
            call_id: call_id.clone(),
            token: None,
            role: self.options.role,
            user_id: self.options.user_id.clone(),
            location_name: self.options.location_name.clone(),
        };

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately; consume it so the
            // first fetch happens one interval after Ringing
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !live.load(Ordering::SeqCst) {
                    break;
                }
                let result = api.call_status(&call_id).await;
                // re-check after the await: cancellation may have raced
                // with the in-flight fetch
                if !live.load(Ordering::SeqCst) {
                    break;
                }
                match result {
                    Ok(resp) => match resp.status {
                        CallStatus::Ringing => {}
                        CallStatus::Accepted => {
                            if navigated
                                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                                .is_ok()
                            {
                                let elapsed = (Utc::now() - requested_at).num_seconds();
                                tracing::info!("call {call_id} accepted after {elapsed}s");
                                set_phase(
                                    &phase,
                                    &emitter,
                                    CallPhase::Accepted {
                                        call_id: call_id.clone(),
                                    },
                                )
                                .await;
                                emitter.emit(KioskEvent::NavigateToSession(route.clone()));
                            }
                            break;
                        }
                        CallStatus::NoDoctor => {
                            tracing::info!("no doctor available for call {call_id}");
                            set_phase(&phase, &emitter, CallPhase::NoDoctor).await;
                            break;
                        }
                        CallStatus::Unknown => {
                            tracing::debug!(
                                "unrecognized status for call {call_id}, keeping poll alive"
                            );
                        }
                    },
                    Err(e) => {
                        tracing::warn!("status poll for call {call_id} failed: {e}");
                    }
                }
            }
        });
        *self.poll_task.lock().unwrap() = Some(handle);
    }
}

impl Drop for CallRequestController {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn set_phase(phase: &Arc<Mutex<CallPhase>>, emitter: &EventEmitter, next: CallPhase) {
    *phase.lock().await = next.clone();
    emitter.emit(KioskEvent::CallPhaseChanged(next));
}

fn user_message(error: &KioskError) -> String {
    match error {
        KioskError::Transport(msg) if !msg.trim().is_empty() => msg.clone(),
        _ => GENERIC_CALL_FAILURE.to_string(),
    }
}
