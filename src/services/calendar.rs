use crate::models::Booking;

pub fn generate_ics(booking: &Booking, provider_name: &str, service_name: &str) -> String {
    let dtstart = booking
        .booking_date
        .and_time(booking.start_time)
        .format("%Y%m%dT%H%M%S")
        .to_string();
    let dtend = booking
        .booking_date
        .and_time(booking.end_time)
        .format("%Y%m%dT%H%M%S")
        .to_string();
    let dtstamp = booking.created_at.format("%Y%m%dT%H%M%S").to_string();
    let uid = format!("{}@stablebook", booking.id);

    let summary = match &booking.horse_name {
        Some(horse) => format!("{service_name} for {horse} with {provider_name}"),
        None => format!("{service_name} with {provider_name}"),
    };
    let description = booking.notes.as_deref().unwrap_or("No additional notes");

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Stablebook//Booking//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}
