use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use skyway_core::booking::{BookedAncillary, BookingDetail, BookingStatus, FareBreakdown};
use skyway_core::flight::FlightSnapshot;
use skyway_core::passenger::DocumentType;
use skyway_core::payment::format_major;
use skyway_shared::pii::{mask_email, mask_tail};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketPassenger {
    pub full_name: String,
    pub age: i32,
    pub document_type: Option<DocumentType>,
    /// Last four characters only.
    pub document_hint: Option<String>,
    pub ancillaries: Vec<String>,
}

/// What the confirmation page shows and what gets printed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ETicket {
    pub pnr: String,
    pub status: BookingStatus,
    pub flight: FlightSnapshot,
    pub passengers: Vec<TicketPassenger>,
    pub fare: FareBreakdown,
    pub currency: String,
    pub payment_reference: Option<String>,
    pub contact_email: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TicketError {
    #[error("Booking {pnr} is {status}; tickets are issued for confirmed bookings only")]
    NotConfirmed { pnr: String, status: BookingStatus },
}

impl ETicket {
    pub fn from_detail(detail: &BookingDetail, issued_at: DateTime<Utc>) -> Result<Self, TicketError> {
        let booking = &detail.booking;
        if booking.status != BookingStatus::Confirmed {
            return Err(TicketError::NotConfirmed {
                pnr: booking.pnr.clone(),
                status: booking.status,
            });
        }

        // Rows may come back in any order; ancillaries are keyed by party position
        let mut ordered: Vec<_> = detail.passengers.iter().collect();
        ordered.sort_by_key(|p| p.seq);

        let passengers = ordered
            .into_iter()
            .map(|p| TicketPassenger {
                full_name: p.full_name.clone(),
                age: p.age,
                document_type: p.document_type,
                document_hint: p.document_number.as_ref().map(|d| mask_tail(d.expose())),
                ancillaries: ancillaries_for(&booking.ancillaries, p.seq as u32),
            })
            .collect();

        Ok(Self {
            pnr: booking.pnr.clone(),
            status: booking.status,
            flight: booking.flight.clone(),
            passengers,
            fare: booking.fare.clone(),
            currency: booking.currency.clone(),
            payment_reference: booking.payment_id.clone(),
            contact_email: mask_email(booking.contact_email.expose()),
            issued_at,
        })
    }

    /// Plain-text rendering for print and email bodies.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let f = &self.flight;

        let _ = writeln!(out, "E-TICKET  PNR {}", self.pnr);
        let _ = writeln!(out, "{} {}  {} -> {}", f.airline, f.flight_number, f.origin, f.destination);
        let _ = writeln!(
            out,
            "Departs {}  Arrives {}",
            f.departure_time.format("%d %b %Y %H:%M UTC"),
            f.arrival_time.format("%d %b %Y %H:%M UTC")
        );
        let _ = writeln!(out);

        for (i, p) in self.passengers.iter().enumerate() {
            let _ = write!(out, "{}. {} ({})", i + 1, p.full_name, p.age);
            if let Some(hint) = &p.document_hint {
                let _ = write!(out, "  doc {}", hint);
            }
            if !p.ancillaries.is_empty() {
                let _ = write!(out, "  + {}", p.ancillaries.join(", "));
            }
            let _ = writeln!(out);
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Base fare      {} {}", self.currency, format_major(self.fare.base_fare_minor));
        let _ = writeln!(out, "Taxes          {} {}", self.currency, format_major(self.fare.taxes_minor));
        let _ = writeln!(out, "Convenience    {} {}", self.currency, format_major(self.fare.convenience_fee_minor));
        if self.fare.ancillaries_minor > 0 {
            let _ = writeln!(out, "Add-ons        {} {}", self.currency, format_major(self.fare.ancillaries_minor));
        }
        let _ = writeln!(out, "Total paid     {} {}", self.currency, format_major(self.fare.total_minor));
        if let Some(reference) = &self.payment_reference {
            let _ = writeln!(out, "Payment ref    {}", reference);
        }
        let _ = writeln!(out, "Issued {} to {}", self.issued_at.format("%d %b %Y %H:%M UTC"), self.contact_email);
        out
    }
}

fn ancillaries_for(ancillaries: &[BookedAncillary], passenger_index: u32) -> Vec<String> {
    ancillaries
        .iter()
        .filter(|a| a.passenger_index == passenger_index)
        .map(|a| a.name.clone())
        .collect()
}
