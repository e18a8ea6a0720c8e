//! # Passenger Booking
//!
//! Ties the ride form, the phone form and the fare quote to the action button.
//!
//! [`PassengerBooking::edit`] changes the draft and re-evaluates the button. A press on
//! the visible button turns the current draft into an [`OrderSubmission`] and queues it
//! for [`run_submitter`], which posts it to `POST /order-data`.
//!
//! ```rust
//! use dispatch_sync::booking::{BookingDraft, PassengerBooking};
//! use dispatch_sync::button::RecordingHostButton;
//! use dispatch_sync::model::SessionIdentity;
//! use std::sync::Arc;
//!
//! let host = Arc::new(RecordingHostButton::new());
//! let (tx, _rx) = tokio::sync::mpsc::channel(4);
//! let identity = SessionIdentity { user_id: 7, username: None };
//! let mut booking = PassengerBooking::new(host.clone(), identity, tx);
//! let state = booking.edit(|draft: &mut BookingDraft| draft.ride.tariff = Some("eco".into()));
//! assert!(!state.visible);
//! ```

use crate::api::{OrderSubmission, RestClient};
use crate::button::{ActionButtonController, ButtonState, HostButton, PhoneForm, RideForm};
use crate::model::{LatLng, SessionIdentity};
use crate::pricing::{self, TariffQuote, TripQuote};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub const BOOK_LABEL: &str = "Order a ride";

/// Everything the passenger has entered so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingDraft {
    pub ride: RideForm,
    pub phone: PhoneForm,
    /// Short addresses from the geocoder; coordinates are sent when empty.
    pub pickup_address: String,
    pub dropoff_address: String,
    pub quote: Option<TripQuote>,
}

impl BookingDraft {
    /// Ride and phone are valid and the quote has a fare for the chosen tariff.
    pub fn is_complete(&self) -> bool {
        self.phone.is_valid() && self.selected_fare().is_some()
    }

    fn selected_fare(&self) -> Option<(&TripQuote, &TariffQuote)> {
        if !self.ride.is_valid() {
            return None;
        }
        let tariff = pricing::tariff(self.ride.tariff.as_deref()?).ok()?;
        let trip = self.quote.as_ref()?;
        let fare = trip.quotes.iter().find(|q| q.tariff_id == tariff.id)?;
        Some((trip, fare))
    }

    /// The order to send, or `None` while the draft is incomplete.
    pub fn submission(&self, identity: &SessionIdentity) -> Option<OrderSubmission> {
        if !self.phone.is_valid() {
            return None;
        }
        let (trip, fare) = self.selected_fare()?;
        let pickup_coords = self.ride.pickup?;
        let dropoff_coords = self.ride.dropoff?;
        Some(OrderSubmission {
            identity: identity.clone(),
            phone: self.phone.phone.value().to_string(),
            pickup: address_or_coords(&self.pickup_address, pickup_coords),
            dropoff: address_or_coords(&self.dropoff_address, dropoff_coords),
            pickup_coords,
            dropoff_coords,
            tariff: fare.tariff_id.clone(),
            distance_km: trip.route.distance_km,
            price: fare.price,
        })
    }
}

fn address_or_coords(address: &str, point: LatLng) -> String {
    let address = address.trim();
    if address.is_empty() {
        format!("{:.5}, {:.5}", point.lat, point.lon)
    } else {
        address.to_string()
    }
}

/// The passenger screen: one draft and the button that confirms it.
pub struct PassengerBooking {
    button: ActionButtonController<BookingDraft>,
    draft: watch::Sender<BookingDraft>,
}

impl PassengerBooking {
    /// Confirmed orders are queued on `submissions`; a full queue drops the press.
    pub fn new(
        host: Arc<dyn HostButton>,
        identity: SessionIdentity,
        submissions: mpsc::Sender<OrderSubmission>,
    ) -> Self {
        let (draft, current) = watch::channel(BookingDraft::default());
        let mut button = ActionButtonController::new(host, BOOK_LABEL, BookingDraft::is_complete);
        button.on_activate(move || {
            let Some(order) = current.borrow().submission(&identity) else {
                debug!("Press on an incomplete draft");
                return;
            };
            match submissions.try_send(order) {
                Ok(()) => debug!("Order queued"),
                Err(e) => warn!(error = %e, "Order not queued"),
            }
        });
        Self { button, draft }
    }

    /// Applies `change` to the draft and updates the button.
    pub fn edit(&mut self, change: impl FnOnce(&mut BookingDraft)) -> ButtonState {
        self.draft.send_modify(change);
        let draft = self.draft.borrow().clone();
        self.button.evaluate(&draft)
    }

    pub fn draft(&self) -> BookingDraft {
        self.draft.borrow().clone()
    }

    pub fn button(&self) -> &ButtonState {
        self.button.state()
    }
}

/// Posts queued orders until the queue closes.
pub async fn run_submitter(api: RestClient, mut submissions: mpsc::Receiver<OrderSubmission>) {
    info!("Submitter started");
    while let Some(order) = submissions.recv().await {
        match api.submit_order(&order).await {
            Ok(()) => info!(tariff = %order.tariff, price = %order.price, "Order submitted"),
            Err(e) => warn!(error = %e, "Order submission failed"),
        }
    }
    info!("Submitter shutdown");
}
