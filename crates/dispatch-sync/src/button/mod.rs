//! # Action Button
//!
//! Drives the host's primary action button from form validity.
//!
//! [`ActionButtonController::evaluate`] runs the validity predicate and talks to the host
//! only when the visible state flips: invalid → valid shows the button with its label,
//! valid → invalid hides it. Exactly one activation callback is registered at a time,
//! and presses that arrive while the button is hidden are ignored.

pub mod phone;

pub use phone::*;

use crate::model::LatLng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

pub type ActivateCallback = Arc<dyn Fn() + Send + Sync>;

/// The host platform's primary button.
pub trait HostButton: Send + Sync {
    fn show(&self);
    fn hide(&self);
    fn set_text(&self, text: &str);
    fn subscribe(&self, callback: ActivateCallback) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Calls a [`RecordingHostButton`] has received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Show,
    Hide,
    SetText(String),
    Subscribe(SubscriptionId),
    Unsubscribe(SubscriptionId),
}

#[derive(Default)]
struct Recorded {
    visible: bool,
    text: String,
    calls: Vec<HostCall>,
    subscribers: Vec<(SubscriptionId, ActivateCallback)>,
}

/// In-memory host button that records every call.
#[derive(Default)]
pub struct RecordingHostButton {
    inner: Mutex<Recorded>,
    next_id: AtomicU64,
}

impl RecordingHostButton {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulates the user pressing the button. Returns how many callbacks fired.
    pub fn press(&self) -> usize {
        let callbacks: Vec<ActivateCallback> = self
            .lock()
            .subscribers
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }

    pub fn is_visible(&self) -> bool {
        self.lock().visible
    }

    pub fn text(&self) -> String {
        self.lock().text.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.lock().calls.clone()
    }
}

impl HostButton for RecordingHostButton {
    fn show(&self) {
        let mut inner = self.lock();
        inner.visible = true;
        inner.calls.push(HostCall::Show);
    }

    fn hide(&self) {
        let mut inner = self.lock();
        inner.visible = false;
        inner.calls.push(HostCall::Hide);
    }

    fn set_text(&self, text: &str) {
        let mut inner = self.lock();
        inner.text = text.to_string();
        inner.calls.push(HostCall::SetText(text.to_string()));
    }

    fn subscribe(&self, callback: ActivateCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut inner = self.lock();
        inner.subscribers.push((id, callback));
        inner.calls.push(HostCall::Subscribe(id));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.lock();
        inner.subscribers.retain(|(sub, _)| *sub != id);
        inner.calls.push(HostCall::Unsubscribe(id));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonState {
    pub visible: bool,
    pub label: String,
    pub enabled: bool,
}

pub struct ActionButtonController<F> {
    host: Arc<dyn HostButton>,
    predicate: Box<dyn Fn(&F) -> bool + Send + Sync>,
    state: ButtonState,
    shown: Arc<AtomicBool>,
    subscription: Option<SubscriptionId>,
}

impl<F> ActionButtonController<F> {
    pub fn new(
        host: Arc<dyn HostButton>,
        label: impl Into<String>,
        predicate: impl Fn(&F) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            host,
            predicate: Box::new(predicate),
            state: ButtonState {
                visible: false,
                label: label.into(),
                enabled: false,
            },
            shown: Arc::new(AtomicBool::new(false)),
            subscription: None,
        }
    }

    pub fn state(&self) -> &ButtonState {
        &self.state
    }

    /// Re-checks `form` and updates the host on a visibility transition.
    pub fn evaluate(&mut self, form: &F) -> ButtonState {
        let valid = (self.predicate)(form);
        if valid != self.state.visible {
            if valid {
                self.host.set_text(&self.state.label);
                self.host.show();
            } else {
                self.host.hide();
            }
            debug!(visible = valid, label = %self.state.label, "Button toggled");
            self.state.visible = valid;
            self.state.enabled = valid;
            self.shown.store(valid, Ordering::SeqCst);
        }
        self.state.clone()
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        let label = label.into();
        if label == self.state.label {
            return;
        }
        if self.state.visible {
            self.host.set_text(&label);
        }
        self.state.label = label;
    }

    /// Registers the activation callback, replacing any previous one.
    pub fn on_activate(&mut self, callback: impl Fn() + Send + Sync + 'static) {
        if let Some(previous) = self.subscription.take() {
            self.host.unsubscribe(previous);
        }
        let shown = self.shown.clone();
        let guarded: ActivateCallback = Arc::new(move || {
            if shown.load(Ordering::SeqCst) {
                callback();
            } else {
                debug!("Ignoring press on hidden button");
            }
        });
        self.subscription = Some(self.host.subscribe(guarded));
    }

    /// Deregisters the activation callback. Idempotent.
    pub fn teardown(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.host.unsubscribe(id);
            info!("Button callback released");
        }
    }
}

impl<F> Drop for ActionButtonController<F> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Passenger ride request form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RideForm {
    pub pickup: Option<LatLng>,
    pub dropoff: Option<LatLng>,
    pub tariff: Option<String>,
}

impl RideForm {
    pub fn is_valid(&self) -> bool {
        self.pickup.is_some()
            && self.dropoff.is_some()
            && self
                .tariff
                .as_deref()
                .is_some_and(|t| crate::pricing::tariff(t).is_ok())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhoneForm {
    pub phone: PhoneInput,
}

impl PhoneForm {
    pub fn is_valid(&self) -> bool {
        self.phone.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn ride() -> RideForm {
        RideForm {
            pickup: Some(LatLng::new(60.70, 28.75)),
            dropoff: Some(LatLng::new(60.71, 28.76)),
            tariff: Some("eco".into()),
        }
    }

    #[test]
    fn test_toggle_hides_and_restores_label() {
        let host = Arc::new(RecordingHostButton::new());
        let mut button = ActionButtonController::new(host.clone(), "Order a ride", RideForm::is_valid);

        let mut form = ride();
        assert!(button.evaluate(&form).visible);
        assert_eq!(host.text(), "Order a ride");

        form.dropoff = None;
        let state = button.evaluate(&form);
        assert!(!state.visible && !state.enabled);
        assert!(!host.is_visible());

        form.dropoff = Some(LatLng::new(60.72, 28.77));
        let state = button.evaluate(&form);
        assert!(state.visible);
        assert_eq!(state.label, "Order a ride");
        assert!(host.is_visible());
    }

    #[test]
    fn test_host_is_only_called_on_transitions() {
        let host = Arc::new(RecordingHostButton::new());
        let mut button = ActionButtonController::new(host.clone(), "Go", RideForm::is_valid);

        button.evaluate(&RideForm::default());
        button.evaluate(&ride());
        button.evaluate(&ride());
        button.evaluate(&ride());

        assert_eq!(
            host.calls(),
            vec![HostCall::SetText("Go".into()), HostCall::Show]
        );
    }

    #[test]
    fn test_single_callback_and_hidden_presses_ignored() {
        let host = Arc::new(RecordingHostButton::new());
        let mut button = ActionButtonController::new(host.clone(), "Go", PhoneForm::is_valid);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        button.on_activate(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = second.clone();
        button.on_activate(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(host.subscriber_count(), 1);

        // hidden: ignored
        host.press();
        assert_eq!(second.load(Ordering::SeqCst), 0);

        let mut form = PhoneForm::default();
        form.phone.set("+79991234567").unwrap();
        button.evaluate(&form);
        host.press();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_deregisters() {
        let host = Arc::new(RecordingHostButton::new());
        {
            let mut button = ActionButtonController::<RideForm>::new(host.clone(), "Go", |_| true);
            button.on_activate(|| {});
            assert_eq!(host.subscriber_count(), 1);
            button.teardown();
            button.teardown();
            button.on_activate(|| {});
        }
        assert_eq!(host.subscriber_count(), 0);
    }

    #[test]
    fn test_unknown_tariff_invalidates_ride_form() {
        let mut form = ride();
        form.tariff = Some("limo".into());
        assert!(!form.is_valid());
        form.tariff = Some("Comfort".into());
        assert!(form.is_valid());
    }
}
