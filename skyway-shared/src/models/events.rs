use uuid::Uuid;

/// Published whenever a booking row changes so that subscribers watching a
/// single PNR can refresh without polling.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingEvent {
    pub booking_id: Uuid,
    pub pnr: String,
    pub kind: BookingEventKind,
    pub status: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingEventKind {
    Created,
    StatusChanged,
    PaymentRecorded,
}

impl BookingEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingEventKind::Created => "created",
            BookingEventKind::StatusChanged => "status_changed",
            BookingEventKind::PaymentRecorded => "payment_recorded",
        }
    }
}
