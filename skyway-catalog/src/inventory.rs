/// Seat inventory lives on the flight row; these checks run before a session
/// is opened and again before seats are taken at confirmation.
pub fn check_availability(seats_available: i32, requested: u32) -> Result<(), InventoryError> {
    if requested == 0 {
        return Err(InventoryError::EmptyRequest);
    }
    if seats_available < 0 || (seats_available as u32) < requested {
        return Err(InventoryError::InsufficientInventory {
            requested,
            available: seats_available.max(0),
        });
    }
    Ok(())
}

pub fn remaining_after(seats_available: i32, requested: u32) -> Result<i32, InventoryError> {
    check_availability(seats_available, requested)?;
    Ok(seats_available - requested as i32)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("At least one seat must be requested")]
    EmptyRequest,

    #[error("Insufficient seats: requested {requested}, available {available}")]
    InsufficientInventory {
        requested: u32,
        available: i32,
    },
}
