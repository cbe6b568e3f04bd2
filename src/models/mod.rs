pub mod availability;
pub mod booking;
pub mod group;
pub mod provider;
pub mod series;

pub use availability::{AvailabilityException, DayHours, TimeSlot, WeeklyHours};
pub use booking::{Booking, BookingStatus, InvalidTransition};
pub use group::{GroupParticipant, GroupRequest, GroupStatus, ParticipantStatus};
pub use provider::{Coordinates, Provider, ServiceOffering};
pub use series::{BookingSeries, IntervalUnit, Recurrence, RecurrenceError, SeriesStatus};
